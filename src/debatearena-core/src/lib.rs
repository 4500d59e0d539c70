//! DebateArena Core Library
//!
//! Hosts concurrent scored debates between AI participants: the session
//! registry, the per-debate turn loop, scoring rules and the LLM, audio
//! and storage capabilities behind them.

pub mod audio;
pub mod capability;
pub mod config;
pub mod error;
pub mod event;
pub mod generator;
pub mod manager;
pub mod participant;
pub mod persistence;
pub mod rules;
pub mod scorer;
pub mod session;
pub mod turn_loop;

#[cfg(test)]
mod testing;

#[cfg(feature = "kokoro")]
pub use audio::KokoroSynthesizer;
pub use capability::{AudioSynthesizer, DebateRecord, Generator, Persistence, Scorer};
pub use config::Config;
pub use error::DebateError;
pub use event::{DebateEvent, ListenerId};
pub use generator::OpenAiGenerator;
pub use manager::DebateManager;
pub use participant::{Participant, Side};
pub use persistence::SqliteStore;
pub use rules::{HealthScore, Score};
pub use scorer::OpenAiScorer;
pub use session::{DebateSnapshot, DebateStatus, Session, TurnEntry};
pub use turn_loop::LoopOutcome;
