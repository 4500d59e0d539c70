//! Debate registry.
//!
//! Owns every in-memory session, addressed only by ID, and the turn-loop
//! task of each one. The registry map has its own lock; each session
//! guards its own fields.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::capability::{AudioSynthesizer, DebateRecord, Generator, Persistence, Scorer};
use crate::config::Config;
use crate::error::DebateError;
use crate::event::{DebateEvent, ListenerHandle, ListenerId};
use crate::rules::normalize;
use crate::session::{DebateSnapshot, DebateStatus, Session};
use crate::turn_loop::{LoopOutcome, TurnLoop};

/// Creates, runs, looks up and evicts debates.
pub struct DebateManager {
    config: Config,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    loops: Mutex<HashMap<String, JoinHandle<LoopOutcome>>>,
    generator: Arc<dyn Generator>,
    scorer: Arc<dyn Scorer>,
    audio: Option<Arc<dyn AudioSynthesizer>>,
    store: Arc<dyn Persistence>,
    shutdown: CancellationToken,
}

impl DebateManager {
    pub fn new(
        config: Config,
        generator: Arc<dyn Generator>,
        scorer: Arc<dyn Scorer>,
        store: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            config,
            sessions: RwLock::new(HashMap::new()),
            loops: Mutex::new(HashMap::new()),
            generator,
            scorer,
            audio: None,
            store,
            shutdown: CancellationToken::new(),
        }
    }

    /// Enable best-effort audio for every debate started afterwards.
    pub fn with_audio(mut self, audio: Arc<dyn AudioSynthesizer>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create a debate in `waiting` status.
    ///
    /// The record is persisted first; the session is registered only if
    /// that write succeeds.
    #[instrument(skip(self), fields(debate_id))]
    pub async fn create_debate(
        &self,
        topic: &str,
        participant1: &str,
        participant2: &str,
        created_by: &str,
    ) -> Result<String, DebateError> {
        self.check_participants(participant1, participant2)?;

        let id = Uuid::new_v4().to_string();
        tracing::Span::current().record("debate_id", id.as_str());

        let session = Session::new(
            id.clone(),
            topic,
            participant1,
            participant2,
            created_by,
            self.config.arena.starting_hp,
        );
        self.store.create_debate(&record_of(&session)).await?;

        self.sessions.write().insert(id.clone(), Arc::new(session));
        info!(debate_id = %id, topic, participant1, participant2, "debate created");
        Ok(id)
    }

    fn check_participants(&self, participant1: &str, participant2: &str) -> Result<(), DebateError> {
        if participant1 == participant2 {
            return Err(DebateError::InvalidParticipants(format!(
                "{} cannot debate themselves",
                participant1
            )));
        }
        for name in [participant1, participant2] {
            if self.config.participant(name).is_none() {
                return Err(DebateError::UnknownParticipant(name.to_string()));
            }
        }
        Ok(())
    }

    pub fn get_debate(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// View for a reconnecting client.
    pub fn snapshot(&self, id: &str) -> Option<DebateSnapshot> {
        self.get_debate(id).map(|s| {
            s.snapshot(
                self.config.arena.snapshot_window,
                self.config.arena.display_cap,
            )
        })
    }

    /// Attach a new listener to a debate's event stream.
    pub fn subscribe(&self, id: &str) -> Result<(ListenerId, mpsc::Receiver<DebateEvent>), DebateError> {
        let session = self
            .get_debate(id)
            .ok_or_else(|| DebateError::NotFound(id.to_string()))?;
        let (handle, rx) = ListenerHandle::channel(self.config.arena.listener_capacity);
        let listener_id = handle.id();
        session.add_listener(handle);
        Ok((listener_id, rx))
    }

    pub fn unsubscribe(&self, id: &str, listener: ListenerId) -> bool {
        self.get_debate(id)
            .is_some_and(|s| s.remove_listener(listener))
    }

    /// Spawn the one turn-loop task for `session`.
    pub fn start_loop(&self, session: Arc<Session>) -> Result<(), DebateError> {
        if !session.mark_loop_started() {
            return Err(DebateError::LoopAlreadyStarted(session.id().to_string()));
        }

        let id = session.id().to_string();
        let turn_loop = TurnLoop {
            session,
            generator: self.generator.clone(),
            scorer: self.scorer.clone(),
            audio: self.audio.clone(),
            store: self.store.clone(),
            rules: self.config.arena.clone(),
            shutdown: self.shutdown.child_token(),
        };
        let handle = tokio::spawn(turn_loop.run());
        self.loops.lock().insert(id.clone(), handle);
        debug!(debate_id = %id, "turn loop spawned");
        Ok(())
    }

    /// Start the loop of a registered debate.
    pub fn start_debate(&self, id: &str) -> Result<(), DebateError> {
        let session = self
            .get_debate(id)
            .ok_or_else(|| DebateError::NotFound(id.to_string()))?;
        if session.status() == DebateStatus::Finished {
            return Err(DebateError::AlreadyFinished(id.to_string()));
        }
        self.start_loop(session)
    }

    /// Restart a debate reloaded at startup.
    ///
    /// Turn order cannot be recovered, so play restarts with the first
    /// participant against an empty transcript and fresh health.
    pub fn resume_debate(&self, id: &str) -> Result<(), DebateError> {
        self.start_debate(id)?;
        info!(debate_id = %id, "resumed reloaded debate");
        Ok(())
    }

    /// End a debate from outside its loop.
    ///
    /// The loop notices at its next status poll and exits cleanly.
    #[instrument(skip(self))]
    pub async fn stop_debate(&self, id: &str) -> Result<(), DebateError> {
        let session = self
            .get_debate(id)
            .ok_or_else(|| DebateError::NotFound(id.to_string()))?;
        if !session.finish(None) {
            return Ok(());
        }

        if let Err(e) = self.store.update_end(id, DebateStatus::Finished, None).await {
            error!(debate_id = %id, error = %e, "failed to persist stopped debate");
        }
        session.broadcast(DebateEvent::system("Debate stopped"));
        info!(debate_id = %id, "debate stopped");
        Ok(())
    }

    /// Wait for a debate's loop to exit. `None` if no loop is tracked for it.
    pub async fn wait_for(&self, id: &str) -> Option<LoopOutcome> {
        let handle = self.loops.lock().remove(id)?;
        match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => Some(LoopOutcome::Faulted(e.to_string())),
        }
    }

    /// Reconstruct waiting and active debates from storage.
    ///
    /// Loops are not started; see [`DebateManager::resume_debate`]. Debates
    /// whose participants are not in the roster are skipped.
    #[instrument(skip(self))]
    pub async fn load_active_on_startup(&self) -> Result<usize, DebateError> {
        let records = self.store.list_active().await?;
        let mut loaded = 0;

        for record in records {
            let missing: Vec<&str> = [record.participant1.as_str(), record.participant2.as_str()]
                .into_iter()
                .filter(|name| self.config.participant(name).is_none())
                .collect();
            if !missing.is_empty() {
                warn!(debate_id = %record.id, ?missing, "skipping stored debate with unavailable participants");
                continue;
            }

            let mut sessions = self.sessions.write();
            if sessions.contains_key(&record.id) {
                continue;
            }
            let session = Session::restore(
                record.id.clone(),
                record.topic,
                [record.participant1, record.participant2],
                record.created_by,
                record.created_at,
                record.status,
                self.config.arena.starting_hp,
            );
            sessions.insert(record.id, Arc::new(session));
            loaded += 1;
        }

        info!(loaded, "reloaded debates from storage");
        Ok(loaded)
    }

    /// Drop a debate from memory. Storage is untouched; unknown IDs are fine.
    pub fn remove_debate(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    /// Evict every finished debate from memory.
    pub fn sweep_finished(&self) -> usize {
        let removed: Vec<String> = {
            let mut sessions = self.sessions.write();
            let finished: Vec<String> = sessions
                .iter()
                .filter(|(_, s)| s.status() == DebateStatus::Finished)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &finished {
                sessions.remove(id);
            }
            finished
        };

        self.loops.lock().retain(|_, handle| !handle.is_finished());
        if !removed.is_empty() {
            debug!(count = removed.len(), "swept finished debates");
        }
        removed.len()
    }

    /// Run [`DebateManager::sweep_finished`] on its own timer until shutdown.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let shutdown = self.shutdown.child_token();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.arena.sweep_interval());
            // The first tick fires immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.sweep_finished();
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }

    /// Clamp a raw HP value into the display range.
    pub fn normalize(&self, raw: i32) -> i32 {
        normalize(raw, self.config.arena.display_cap)
    }

    pub fn debate_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn debate_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Stop the sweeper and every loop, then wait for the loops to exit.
    ///
    /// Stored statuses are left alone so the next startup reloads them.
    pub async fn shutdown(&self) {
        info!("debate manager shutting down");
        self.shutdown.cancel();

        let handles: Vec<(String, JoinHandle<LoopOutcome>)> = self.loops.lock().drain().collect();
        for (id, handle) in handles {
            match handle.await {
                Ok(outcome) => debug!(debate_id = %id, ?outcome, "loop exited"),
                Err(e) => warn!(debate_id = %id, error = %e, "loop task ended abnormally"),
            }
        }
    }
}

fn record_of(session: &Session) -> DebateRecord {
    let [participant1, participant2] = session.participants().clone();
    DebateRecord {
        id: session.id().to_string(),
        topic: session.topic().to_string(),
        status: session.status(),
        participant1,
        participant2,
        created_by: session.created_by().to_string(),
        created_at: session.created_at(),
        ended_at: session.ended_at(),
        winner: session.winner(),
    }
}
