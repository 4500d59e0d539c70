//! Error types for the debate system.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DebateError {
    #[error("Generation failed for {speaker}: {message}")]
    Generation { speaker: String, message: String },

    #[error("Scoring failed: {0}")]
    Scoring(String),

    #[error("Audio synthesis failed: {0}")]
    Audio(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("OpenAI API error: {0}")]
    OpenAIError(#[from] async_openai::error::OpenAIError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("Debate not found: {0}")]
    NotFound(String),

    #[error("Debate already finished: {0}")]
    AlreadyFinished(String),

    #[error("Turn loop already started for debate {0}")]
    LoopAlreadyStarted(String),

    #[error("Turn loop fault: {0}")]
    Fault(String),
}

impl From<rusqlite::Error> for DebateError {
    fn from(e: rusqlite::Error) -> Self {
        DebateError::Persistence(e.to_string())
    }
}

impl DebateError {
    pub(crate) fn generation(speaker: &str, message: impl Into<String>) -> Self {
        DebateError::Generation {
            speaker: speaker.to_string(),
            message: message.into(),
        }
    }
}
