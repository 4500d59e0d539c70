//! Configuration module for loading TOML config files.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::DebateError;
use crate::participant::Participant;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub arena: ArenaConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default = "default_participants")]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Game rules and loop timing.
///
/// The damage constants are empirical; they are defaults, not invariants.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// HP both sides start with.
    pub starting_hp: i32,
    /// Upper bound of the normalized (display) HP range.
    pub display_cap: i32,
    /// Multiplier applied to the score difference.
    pub damage_scale: f64,
    pub damage_floor: i32,
    pub damage_ceiling: i32,
    /// Differences within +/- this band deal no damage.
    pub neutral_band: f64,
    /// How many of the opponent's recent scores are averaged.
    pub opponent_window: usize,
    /// How many transcript entries are handed to the generator.
    pub context_window: usize,
    /// How many transcript entries a snapshot carries.
    pub snapshot_window: usize,
    pub debate_timeout_secs: u64,
    pub inactivity_timeout_secs: u64,
    pub turn_delay_ms: u64,
    pub sweep_interval_secs: u64,
    /// Per-listener event buffer; a full buffer drops events for that listener only.
    pub listener_capacity: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            starting_hp: 100,
            display_cap: 100,
            damage_scale: 4.0,
            damage_floor: 3,
            damage_ceiling: 20,
            neutral_band: 0.5,
            opponent_window: 3,
            context_window: 5,
            snapshot_window: 20,
            debate_timeout_secs: 15 * 60,
            inactivity_timeout_secs: 5 * 60,
            turn_delay_ms: 2000,
            sweep_interval_secs: 60,
            listener_capacity: 64,
        }
    }
}

impl ArenaConfig {
    pub fn debate_timeout(&self) -> Duration {
        Duration::from_secs(self.debate_timeout_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn turn_delay(&self) -> Duration {
        Duration::from_millis(self.turn_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// OpenAI-compatible endpoint settings shared by the generator and the scorer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    /// Usually supplied through `OPENAI_API_KEY` rather than the file.
    pub api_key: String,
    pub scorer_model: String,
    pub max_tokens: u32,
    pub scorer_max_tokens: u32,
    /// For local endpoints with self-signed certificates.
    pub accept_invalid_certs: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            scorer_model: "gpt-4o-mini".to_string(),
            max_tokens: 300,
            scorer_max_tokens: 200,
            accept_invalid_certs: false,
        }
    }
}

/// System prompts configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Persona used for participants without their own.
    pub debater_prompt: String,
    pub judge_prompt: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            debater_prompt: DEFAULT_DEBATER_PROMPT.to_string(),
            judge_prompt: DEFAULT_JUDGE_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub enabled: bool,
    pub output_dir: PathBuf,
    pub default_voice: String,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            output_dir: PathBuf::from("audio"),
            default_voice: "af_sky".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("debatearena.db"),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DebateError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| DebateError::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::from_str(&content)
    }

    /// Load configuration from string content.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, DebateError> {
        let config: Config = toml::from_str(content)
            .map_err(|e| DebateError::ConfigError(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), DebateError> {
        let arena = &self.arena;
        if arena.starting_hp <= 0 {
            return Err(DebateError::ConfigError(
                "arena.starting_hp must be positive".to_string(),
            ));
        }
        if arena.damage_floor > arena.damage_ceiling {
            return Err(DebateError::ConfigError(format!(
                "arena.damage_floor ({}) exceeds arena.damage_ceiling ({})",
                arena.damage_floor, arena.damage_ceiling
            )));
        }
        if arena.opponent_window == 0 {
            return Err(DebateError::ConfigError(
                "arena.opponent_window must be at least 1".to_string(),
            ));
        }
        if arena.listener_capacity == 0 {
            return Err(DebateError::ConfigError(
                "arena.listener_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Look up a roster entry by identity.
    pub fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name == name)
    }

    /// Get the system prompt for a participant, with placeholders replaced.
    pub fn get_prompt(&self, participant: &Participant, topic: &str, opponent_name: &str) -> String {
        let template = participant
            .persona
            .as_deref()
            .unwrap_or(&self.prompts.debater_prompt);

        template
            .replace("{name}", &participant.name)
            .replace("{topic}", topic)
            .replace("{opponent_name}", opponent_name)
    }

    /// Get the voice for a participant, falling back to the default voice.
    pub fn get_voice<'a>(&'a self, participant: &'a Participant) -> &'a str {
        participant
            .voice
            .as_deref()
            .unwrap_or(&self.audio.default_voice)
    }
}

/// Default configuration embedded in the binary.
pub fn default_config() -> Config {
    Config {
        arena: ArenaConfig::default(),
        llm: LlmConfig::default(),
        prompts: PromptsConfig::default(),
        participants: default_participants(),
        audio: AudioConfig::default(),
        storage: StorageConfig::default(),
    }
}

fn default_participants() -> Vec<Participant> {
    vec![
        Participant::new("Candidate A", "gpt-4o-mini").with_voice("bf_emma"),
        Participant::new("Candidate B", "gpt-4o-mini").with_voice("bm_george"),
    ]
}

const DEFAULT_DEBATER_PROMPT: &str = r#"You are {name} in a live, scored debate.

DEBATE TOPIC: {topic}
YOUR OPPONENT: {opponent_name}

Every line you speak is judged on strength, relevance, logic, truth and humor.
Each weak answer costs you health; each strong one costs your opponent.

DEBATE RULES:
- Take a clear side and defend it
- Respond to the most recent thing your opponent said
- Keep it short: two to four sentences
- Do NOT acknowledge being an AI - stay fully in character

CRITICAL OUTPUT RULES:
- Output ONLY your spoken words - no scene directions or stage actions
- Do NOT include narration, descriptions of gestures, movements, or tone
- Do NOT include asterisks for emphasis or any markdown formatting
"#;

const DEFAULT_JUDGE_PROMPT: &str = r#"You are an impartial debate judge.

Rate the statement below, made in a debate about "{topic}", on five dimensions
from 0 to 10:
- strength: how persuasive it is
- relevance: how closely it addresses the topic and the exchange
- logic: soundness of the reasoning
- truth: factual accuracy
- humor: wit and entertainment value

Reply with ONLY a JSON object, for example:
{"strength": 7, "relevance": 8, "logic": 6, "truth": 7, "humor": 3}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = default_config();
        assert_eq!(config.arena.starting_hp, 100);
        assert_eq!(config.arena.debate_timeout(), Duration::from_secs(900));
        assert_eq!(config.arena.inactivity_timeout(), Duration::from_secs(300));
        assert_eq!(config.arena.context_window, 5);
        assert_eq!(config.arena.opponent_window, 3);
        assert_eq!(config.participants.len(), 2);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config = Config::from_str(
            r#"
            [arena]
            starting_hp = 50
            turn_delay_ms = 10

            [[participants]]
            name = "Socrates"
            model = "llama3:8b"
            "#,
        )
        .unwrap();

        assert_eq!(config.arena.starting_hp, 50);
        assert_eq!(config.arena.turn_delay(), Duration::from_millis(10));
        assert_eq!(config.arena.damage_ceiling, 20);
        assert_eq!(config.participants.len(), 1);
        assert!(config.participant("Socrates").is_some());
        assert!(config.participant("Candidate A").is_none());
        assert_eq!(config.llm.api_base, "https://api.openai.com/v1");
    }

    #[test]
    fn test_empty_file_is_valid() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.participants.len(), 2);
    }

    #[test]
    fn test_rejects_inverted_damage_clamp() {
        let err = Config::from_str("[arena]\ndamage_floor = 30\ndamage_ceiling = 20\n").unwrap_err();
        assert!(err.to_string().contains("damage_floor"));
    }

    #[test]
    fn test_get_prompt_replaces_placeholders() {
        let config = default_config();
        let participant = config.participant("Candidate A").unwrap();
        let prompt = config.get_prompt(participant, "Cats vs dogs", "Candidate B");
        assert!(prompt.contains("You are Candidate A"));
        assert!(prompt.contains("DEBATE TOPIC: Cats vs dogs"));
        assert!(prompt.contains("YOUR OPPONENT: Candidate B"));
    }

    #[test]
    fn test_get_voice_falls_back_to_default() {
        let config = default_config();
        let voiced = config.participant("Candidate B").unwrap();
        assert_eq!(config.get_voice(voiced), "bm_george");

        let plain = Participant::new("Plain", "m");
        assert_eq!(config.get_voice(&plain), "af_sky");
    }
}
