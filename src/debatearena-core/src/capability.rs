//! External services the turn loop depends on.
//!
//! The loop only knows these traits; production implementations live in
//! [`crate::generator`], [`crate::scorer`], [`crate::audio`] and
//! [`crate::persistence`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DebateError;
use crate::rules::Score;
use crate::session::DebateStatus;

/// Produces the next utterance for a speaker.
#[async_trait]
pub trait Generator: Send + Sync {
    /// `context` is the recent transcript as `speaker: text` lines.
    async fn generate(&self, context: &str, topic: &str, speaker: &str) -> Result<String, DebateError>;
}

/// Rates a single utterance.
#[async_trait]
pub trait Scorer: Send + Sync {
    async fn score(&self, text: &str, topic: &str) -> Result<Score, DebateError>;
}

/// Optional text-to-speech. Returns a reference to the produced artifact.
#[async_trait]
pub trait AudioSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, speaker: &str) -> Result<String, DebateError>;
}

/// Stored form of a debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRecord {
    pub id: String,
    pub topic: String,
    pub status: DebateStatus,
    pub participant1: String,
    pub participant2: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub winner: Option<String>,
}

/// Durable storage of debate records.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn create_debate(&self, record: &DebateRecord) -> Result<(), DebateError>;

    async fn update_status(&self, id: &str, status: DebateStatus) -> Result<(), DebateError>;

    /// Record the end of a debate. `winner` is `None` for a draw, timeout or fault.
    async fn update_end(
        &self,
        id: &str,
        status: DebateStatus,
        winner: Option<&str>,
    ) -> Result<(), DebateError>;

    /// Every debate whose status is `waiting` or `active`.
    async fn list_active(&self) -> Result<Vec<DebateRecord>, DebateError>;
}
