//! Deterministic capability fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::capability::{AudioSynthesizer, DebateRecord, Generator, Persistence, Scorer};
use crate::config::ArenaConfig;
use crate::error::DebateError;
use crate::rules::Score;
use crate::session::DebateStatus;

/// Rules with a short delay so paused-clock tests stay quick.
pub fn fast_rules() -> ArenaConfig {
    ArenaConfig {
        turn_delay_ms: 10,
        ..ArenaConfig::default()
    }
}

pub fn uniform(avg: f64) -> Score {
    Score::new(avg, avg, avg, avg, avg)
}

/// Replies `"<speaker>: point <n>"`, optionally failing.
#[derive(Default)]
pub struct ScriptedGenerator {
    calls: AtomicUsize,
    fail_all: bool,
    /// Zero-based call indices that fail.
    fail_calls: Vec<usize>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always_failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn failing_on(calls: &[usize]) -> Self {
        Self {
            fail_calls: calls.to_vec(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, _context: &str, _topic: &str, speaker: &str) -> Result<String, DebateError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || self.fail_calls.contains(&n) {
            return Err(DebateError::generation(speaker, "scripted failure"));
        }
        Ok(format!("{}: point {}", speaker, n))
    }
}

/// Scores by the speaker prefix the scripted generator writes.
#[derive(Default)]
pub struct ScriptedScorer {
    by_speaker: HashMap<String, f64>,
    calls: AtomicUsize,
    fail_calls: Vec<usize>,
    panic_on: Option<usize>,
    delay: Option<Duration>,
}

impl ScriptedScorer {
    pub fn by_speaker(scores: &[(&str, f64)]) -> Self {
        Self {
            by_speaker: scores.iter().map(|(n, s)| (n.to_string(), *s)).collect(),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.fail_calls = calls.to_vec();
        self
    }

    pub fn panicking_on(mut self, call: usize) -> Self {
        self.panic_on = Some(call);
        self
    }

    /// Every judgement takes this long.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(&self, text: &str, _topic: &str) -> Result<Score, DebateError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on == Some(n) {
            panic!("scorer blew up on call {}", n);
        }
        if self.fail_calls.contains(&n) {
            return Err(DebateError::Scoring("scripted failure".to_string()));
        }
        let avg = text
            .split_once(": ")
            .and_then(|(speaker, _)| self.by_speaker.get(speaker))
            .copied()
            .unwrap_or(5.0);
        Ok(uniform(avg))
    }
}

pub struct FixedAudio {
    pub fail: bool,
}

#[async_trait]
impl AudioSynthesizer for FixedAudio {
    async fn synthesize(&self, _text: &str, speaker: &str) -> Result<String, DebateError> {
        if self.fail {
            return Err(DebateError::Audio("no speakers attached".to_string()));
        }
        Ok(format!("mem://{}.wav", speaker))
    }
}

/// In-memory persistence with switchable failures.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, DebateRecord>>,
    pub fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn get(&self, id: &str) -> Option<DebateRecord> {
        self.records.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn insert(&self, record: DebateRecord) {
        self.records.lock().insert(record.id.clone(), record);
    }

    fn check(&self) -> Result<(), DebateError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DebateError::Persistence("disk on fire".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn create_debate(&self, record: &DebateRecord) -> Result<(), DebateError> {
        self.check()?;
        self.insert(record.clone());
        Ok(())
    }

    async fn update_status(&self, id: &str, status: DebateStatus) -> Result<(), DebateError> {
        self.check()?;
        let mut records = self.records.lock();
        let record = records
            .get_mut(id)
            .ok_or_else(|| DebateError::NotFound(id.to_string()))?;
        record.status = status;
        Ok(())
    }

    async fn update_end(
        &self,
        id: &str,
        status: DebateStatus,
        winner: Option<&str>,
    ) -> Result<(), DebateError> {
        self.check()?;
        let mut records = self.records.lock();
        let record = records
            .get_mut(id)
            .ok_or_else(|| DebateError::NotFound(id.to_string()))?;
        record.status = status;
        record.winner = winner.map(str::to_string);
        record.ended_at = Some(chrono::Utc::now());
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<DebateRecord>, DebateError> {
        Ok(self
            .records
            .lock()
            .values()
            .filter(|r| r.status != DebateStatus::Finished)
            .cloned()
            .collect())
    }
}
