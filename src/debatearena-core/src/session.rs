//! In-memory state of one debate.
//!
//! All mutable fields sit behind a single reader/writer lock. The lock is
//! never held across an await point or while events are being delivered.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::error::DebateError;
use crate::event::{DebateEvent, Delivery, ListenerHandle, ListenerId};
use crate::participant::Side;
use crate::rules::{HealthDelta, HealthScore, NEUTRAL_SCORE, Score};

/// Lifecycle of a debate. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    Waiting,
    Active,
    Finished,
}

impl DebateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebateStatus::Waiting => "waiting",
            DebateStatus::Active => "active",
            DebateStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for DebateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DebateStatus {
    type Err = DebateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(DebateStatus::Waiting),
            "active" => Ok(DebateStatus::Active),
            "finished" => Ok(DebateStatus::Finished),
            other => Err(DebateError::Persistence(format!(
                "unknown debate status '{}'",
                other
            ))),
        }
    }
}

/// One utterance in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEntry {
    pub speaker: String,
    /// Immutable once appended.
    pub text: String,
    /// Attached after the fact; generation and scoring are separate steps.
    pub score: Option<Score>,
    /// Contributed by a live participant rather than a scripted one.
    pub is_live: bool,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view handed to reconnecting clients.
#[derive(Debug, Clone, Serialize)]
pub struct DebateSnapshot {
    pub id: String,
    pub status: DebateStatus,
    pub topic: String,
    pub participants: [String; 2],
    pub normalized_scores: HealthScore,
    pub raw_scores: HealthScore,
    pub recent_transcript: Vec<TurnEntry>,
    pub listener_count: usize,
    pub winner: Option<String>,
}

struct SessionState {
    status: DebateStatus,
    health: HealthScore,
    transcript: Vec<TurnEntry>,
    last_activity: Instant,
    listeners: Vec<ListenerHandle>,
    ended_at: Option<DateTime<Utc>>,
    winner: Option<String>,
}

/// One debate's record: fixed identity plus lock-guarded mutable state.
pub struct Session {
    id: String,
    topic: String,
    participants: [String; 2],
    created_by: String,
    created_at: DateTime<Utc>,
    state: RwLock<SessionState>,
    loop_started: AtomicBool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("participants", &self.participants)
            .field("status", &self.status())
            .finish()
    }
}

impl Session {
    /// A fresh debate in `waiting` status.
    pub fn new(
        id: impl Into<String>,
        topic: impl Into<String>,
        participant1: impl Into<String>,
        participant2: impl Into<String>,
        created_by: impl Into<String>,
        starting_hp: i32,
    ) -> Self {
        Self::restore(
            id.into(),
            topic.into(),
            [participant1.into(), participant2.into()],
            created_by.into(),
            Utc::now(),
            DebateStatus::Waiting,
            starting_hp,
        )
    }

    /// Rebuild a session from its stored record; status is taken verbatim.
    pub(crate) fn restore(
        id: String,
        topic: String,
        participants: [String; 2],
        created_by: String,
        created_at: DateTime<Utc>,
        status: DebateStatus,
        starting_hp: i32,
    ) -> Self {
        Self {
            id,
            topic,
            participants,
            created_by,
            created_at,
            state: RwLock::new(SessionState {
                status,
                health: HealthScore::new(starting_hp),
                transcript: Vec::new(),
                last_activity: Instant::now(),
                listeners: Vec::new(),
                ended_at: None,
                winner: None,
            }),
            loop_started: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn participants(&self) -> &[String; 2] {
        &self.participants
    }

    pub fn participant(&self, side: Side) -> &str {
        &self.participants[side.index()]
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> DebateStatus {
        self.state.read().status
    }

    /// Move the status forward, returning the previous one.
    ///
    /// Backward moves are ignored.
    pub fn update_status(&self, status: DebateStatus) -> DebateStatus {
        let mut state = self.state.write();
        let previous = state.status;
        if status > previous {
            state.status = status;
        } else if status < previous {
            debug!(debate_id = %self.id, from = %previous, to = %status, "ignored backward status change");
        }
        previous
    }

    /// Move `waiting` to `active`. Returns false if the debate already finished.
    pub fn activate(&self) -> bool {
        let mut state = self.state.write();
        match state.status {
            DebateStatus::Finished => false,
            _ => {
                state.status = DebateStatus::Active;
                true
            }
        }
    }

    /// Mark the debate finished. Returns false if it already was.
    pub fn finish(&self, winner: Option<&str>) -> bool {
        let mut state = self.state.write();
        if state.status == DebateStatus::Finished {
            return false;
        }
        state.status = DebateStatus::Finished;
        state.ended_at = Some(Utc::now());
        state.winner = winner.map(str::to_string);
        true
    }

    pub fn winner(&self) -> Option<String> {
        self.state.read().winner.clone()
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().ended_at
    }

    pub fn health(&self) -> HealthScore {
        self.state.read().health
    }

    /// Atomically apply a delta and return the updated pair.
    pub fn apply_health_delta(&self, delta: HealthDelta) -> HealthScore {
        let mut state = self.state.write();
        state.health.apply(delta);
        state.health
    }

    /// Apply a delta only if the debate is still active.
    ///
    /// Status check and update happen under one lock, so a concurrent stop
    /// either lands before (and nothing changes) or after.
    pub fn apply_health_delta_while_active(&self, delta: HealthDelta) -> Option<HealthScore> {
        let mut state = self.state.write();
        if state.status != DebateStatus::Active {
            return None;
        }
        state.health.apply(delta);
        Some(state.health)
    }

    /// Append an unscored entry and refresh the activity clock.
    ///
    /// Returns the new transcript length.
    pub fn append_turn(&self, speaker: &str, text: &str, is_live: bool) -> usize {
        let mut state = self.state.write();
        let now = Utc::now();
        // Wall-clock can step backwards; the transcript must not.
        let timestamp = state
            .transcript
            .last()
            .map_or(now, |last| last.timestamp.max(now));
        state.transcript.push(TurnEntry {
            speaker: speaker.to_string(),
            text: text.to_string(),
            score: None,
            is_live,
            timestamp,
        });
        state.last_activity = Instant::now();
        state.transcript.len()
    }

    /// Attach a score to the most recent entry. Returns false on an empty transcript.
    pub fn attach_score_to_last_turn(&self, score: Score) -> bool {
        match self.state.write().transcript.last_mut() {
            Some(entry) => {
                entry.score = Some(score);
                true
            }
            None => false,
        }
    }

    /// The last `min(n, len)` entries, oldest first.
    pub fn recent_transcript(&self, n: usize) -> Vec<TurnEntry> {
        let state = self.state.read();
        let start = state.transcript.len().saturating_sub(n);
        state.transcript[start..].to_vec()
    }

    pub fn transcript_len(&self) -> usize {
        self.state.read().transcript.len()
    }

    /// Average of the last `last_n` scored entries by `identity`.
    ///
    /// Returns the neutral midpoint when the speaker has no scored entries yet.
    pub fn recent_speaker_average(&self, identity: &str, last_n: usize) -> f64 {
        let state = self.state.read();
        let averages: Vec<f64> = state
            .transcript
            .iter()
            .rev()
            .filter(|entry| entry.speaker == identity)
            .filter_map(|entry| entry.score.map(|s| s.average))
            .take(last_n)
            .collect();

        if averages.is_empty() {
            NEUTRAL_SCORE
        } else {
            averages.iter().sum::<f64>() / averages.len() as f64
        }
    }

    pub fn last_activity(&self) -> Instant {
        self.state.read().last_activity
    }

    /// Reset the inactivity clock without appending.
    pub fn touch(&self) {
        self.state.write().last_activity = Instant::now();
    }

    pub fn add_listener(&self, handle: ListenerHandle) {
        self.state.write().listeners.push(handle);
    }

    /// Returns false if no listener had that id.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.write();
        let before = state.listeners.len();
        state.listeners.retain(|l| l.id() != id);
        state.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.state.read().listeners.len()
    }

    /// Fan an event out to every listener.
    ///
    /// The listener set is snapshotted under the lock and delivered to
    /// after it is released. Listeners whose receiver is gone are pruned.
    /// Returns how many listeners accepted the event.
    pub fn broadcast(&self, event: DebateEvent) -> usize {
        let listeners = self.state.read().listeners.clone();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for listener in &listeners {
            match listener.deliver(event.clone()) {
                Delivery::Delivered => delivered += 1,
                Delivery::Dropped => {
                    debug!(debate_id = %self.id, listener = %listener.id(), "listener lagging, event dropped")
                }
                Delivery::Closed => closed.push(listener.id()),
            }
        }

        if !closed.is_empty() {
            self.state
                .write()
                .listeners
                .retain(|l| !closed.contains(&l.id()));
        }
        delivered
    }

    /// Claim the right to run this session's turn loop. Succeeds once.
    pub(crate) fn mark_loop_started(&self) -> bool {
        self.loop_started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn loop_started(&self) -> bool {
        self.loop_started.load(Ordering::Acquire)
    }

    pub fn snapshot(&self, recent: usize, display_cap: i32) -> DebateSnapshot {
        let state = self.state.read();
        let start = state.transcript.len().saturating_sub(recent);
        DebateSnapshot {
            id: self.id.clone(),
            status: state.status,
            topic: self.topic.clone(),
            participants: self.participants.clone(),
            normalized_scores: state.health.normalized(display_cap),
            raw_scores: state.health,
            recent_transcript: state.transcript[start..].to_vec(),
            listener_count: state.listeners.len(),
            winner: state.winner.clone(),
        }
    }
}
