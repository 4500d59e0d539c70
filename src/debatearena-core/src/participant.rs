//! Scripted debater definitions.
//!
//! A debate refers to its participants by identity only; the roster here
//! is what the capabilities resolve those identities against.

use serde::{Deserialize, Serialize};

/// Which seat a participant occupies in a debate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    First,
    Second,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::First => Side::Second,
            Side::Second => Side::First,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::First => 0,
            Side::Second => 1,
        }
    }
}

/// A scripted participant available to this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    /// Identity used in debates and transcripts.
    pub name: String,
    /// The LLM model to use (e.g., "gpt-4", "llama3:8b").
    pub model: String,
    /// Optional persona prompt overriding the default debater prompt.
    #[serde(default)]
    pub persona: Option<String>,
    /// Voice ID for audio synthesis.
    #[serde(default)]
    pub voice: Option<String>,
}

impl Participant {
    /// Create a new participant with the given name and model.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            persona: None,
            voice: None,
        }
    }

    /// Set a custom persona prompt.
    pub fn with_persona(mut self, prompt: impl Into<String>) -> Self {
        self.persona = Some(prompt.into());
        self
    }

    /// Set the voice ID for audio synthesis.
    pub fn with_voice(mut self, voice_id: impl Into<String>) -> Self {
        self.voice = Some(voice_id.into());
        self
    }
}
