//! The per-debate turn loop.
//!
//! One task per active session. Each pass checks the watchdogs, lets the
//! next speaker generate a turn, scores it, converts the score into damage
//! and broadcasts the result. The loop ends on a knockout, a watchdog, an
//! external status change, process shutdown or a fault.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capability::{AudioSynthesizer, Generator, Persistence, Scorer};
use crate::config::ArenaConfig;
use crate::error::DebateError;
use crate::event::DebateEvent;
use crate::participant::Side;
use crate::rules::{Score, compute_delta};
use crate::session::{DebateStatus, Session, TurnEntry};

/// How a turn loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    GameOver { winner: String },
    /// Wall-clock debate limit reached.
    Timeout,
    /// No turn appended within the inactivity limit.
    Stalled,
    /// Status changed away from `active` by someone else.
    Cancelled,
    /// Process shutdown; the stored status is left as is.
    Shutdown,
    Faulted(String),
}

enum TurnResult {
    /// Generation failed; nothing was appended.
    Skipped,
    /// Status left `active` mid-turn; game state was not touched.
    Stopped,
    Completed,
    Knockout(Side),
}

/// Everything one loop needs. Cheap to build; consumed by [`TurnLoop::run`].
pub struct TurnLoop {
    pub(crate) session: Arc<Session>,
    pub(crate) generator: Arc<dyn Generator>,
    pub(crate) scorer: Arc<dyn Scorer>,
    pub(crate) audio: Option<Arc<dyn AudioSynthesizer>>,
    pub(crate) store: Arc<dyn Persistence>,
    pub(crate) rules: ArenaConfig,
    pub(crate) shutdown: CancellationToken,
}

/// Strict alternation; the first participant opens.
pub fn next_speaker(previous: Option<Side>) -> Side {
    previous.map_or(Side::First, Side::opponent)
}

/// Recent entries as `speaker: text` lines.
pub fn format_context(entries: &[TurnEntry]) -> String {
    entries
        .iter()
        .map(|e| format!("{}: {}", e.speaker, e.text))
        .collect::<Vec<_>>()
        .join("\n")
}

impl TurnLoop {
    /// Run to completion. Never panics; faults end the debate instead.
    pub async fn run(self) -> LoopOutcome {
        let outcome = match AssertUnwindSafe(self.drive()).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => self.fail(e.to_string()).await,
            Err(panic) => self.fail(panic_message(panic.as_ref())).await,
        };

        info!(debate_id = %self.session.id(), ?outcome, turns = self.session.transcript_len(), "turn loop finished");
        outcome
    }

    async fn drive(&self) -> Result<LoopOutcome, DebateError> {
        let id = self.session.id();
        if !self.session.activate() {
            debug!(debate_id = %id, "debate finished before its loop started");
            return Ok(LoopOutcome::Cancelled);
        }
        if let Err(e) = self.store.update_status(id, DebateStatus::Active).await {
            error!(debate_id = %id, error = %e, "failed to persist active status");
        }

        let started = Instant::now();
        self.session.touch();
        self.session.broadcast(DebateEvent::system(format!(
            "Debate started: {} vs {} on \"{}\"",
            self.session.participant(Side::First),
            self.session.participant(Side::Second),
            self.session.topic()
        )));
        info!(debate_id = %id, "turn loop started");

        let mut previous = None;
        let mut turn = 0usize;
        loop {
            if let Some(outcome) = self.check_termination(started).await {
                return Ok(outcome);
            }

            let speaker = next_speaker(previous);
            match self.take_turn(speaker, turn).await? {
                TurnResult::Skipped => {}
                TurnResult::Stopped => return Ok(LoopOutcome::Cancelled),
                TurnResult::Completed => {
                    previous = Some(speaker);
                    turn += 1;
                }
                TurnResult::Knockout(winner) => return Ok(self.finish_game(winner).await),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.rules.turn_delay()) => {}
                _ = self.shutdown.cancelled() => return Ok(LoopOutcome::Shutdown),
            }
        }
    }

    /// Watchdogs first, then the cooperative status poll.
    async fn check_termination(&self, started: Instant) -> Option<LoopOutcome> {
        if started.elapsed() >= self.rules.debate_timeout() {
            let message = format!(
                "Debate timed out after {} seconds",
                self.rules.debate_timeout().as_secs()
            );
            return Some(self.end_without_winner(LoopOutcome::Timeout, message).await);
        }

        if self.session.last_activity().elapsed() >= self.rules.inactivity_timeout() {
            let message = format!(
                "Debate stalled: no new turn for {} seconds",
                self.rules.inactivity_timeout().as_secs()
            );
            return Some(self.end_without_winner(LoopOutcome::Stalled, message).await);
        }

        if self.session.status() != DebateStatus::Active {
            // Whatever moved it, the loop leaves the session finished.
            self.session.finish(None);
            return Some(LoopOutcome::Cancelled);
        }

        if self.shutdown.is_cancelled() {
            return Some(LoopOutcome::Shutdown);
        }

        None
    }

    async fn take_turn(&self, speaker: Side, turn: usize) -> Result<TurnResult, DebateError> {
        let session = &self.session;
        let id = session.id();
        let name = session.participant(speaker);
        let topic = session.topic();

        let context = format_context(&session.recent_transcript(self.rules.context_window));
        let text = match self.generator.generate(&context, topic, name).await {
            Ok(text) => text,
            Err(e) => {
                warn!(debate_id = %id, speaker = name, turn, error = %e, "generation failed, skipping turn");
                return Ok(TurnResult::Skipped);
            }
        };

        // Stopped while we were waiting on the generator.
        if session.status() != DebateStatus::Active {
            return Ok(TurnResult::Stopped);
        }

        session.append_turn(name, &text, false);

        let artifact = match &self.audio {
            Some(audio) => match audio.synthesize(&text, name).await {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    debug!(debate_id = %id, speaker = name, error = %e, "audio synthesis failed");
                    None
                }
            },
            None => None,
        };

        let score = match self.scorer.score(&text, topic).await {
            Ok(score) => score,
            Err(e) => {
                warn!(debate_id = %id, speaker = name, turn, error = %e, "scoring failed, using neutral score");
                Score::neutral()
            }
        };

        if !session.attach_score_to_last_turn(score) {
            return Err(DebateError::Fault(
                "transcript empty right after append".to_string(),
            ));
        }

        let opponent_average = session.recent_speaker_average(
            session.participant(speaker.opponent()),
            self.rules.opponent_window,
        );
        let delta = compute_delta(speaker, score.average, opponent_average, &self.rules);
        // Stopped while audio or scoring was in flight.
        let Some(health) = session.apply_health_delta_while_active(delta) else {
            debug!(debate_id = %id, speaker = name, turn, "debate stopped during scoring");
            return Ok(TurnResult::Stopped);
        };
        debug!(
            debate_id = %id,
            speaker = name,
            turn,
            average = score.average,
            opponent_average,
            hp_first = health.first,
            hp_second = health.second,
            "turn scored"
        );

        session.broadcast(DebateEvent::Message {
            speaker: name.to_string(),
            text,
            score: Some(score),
        });
        if let Some(artifact_ref) = artifact {
            session.broadcast(DebateEvent::Audio {
                artifact_ref,
                speaker: name.to_string(),
            });
        }

        session.broadcast(DebateEvent::ScoreUpdate {
            normalized: health.normalized(self.rules.display_cap),
            raw: health,
        });

        Ok(match health.survivor() {
            Some(winner) => TurnResult::Knockout(winner),
            None => TurnResult::Completed,
        })
    }

    async fn finish_game(&self, winner: Side) -> LoopOutcome {
        let id = self.session.id();
        let winner_name = self.session.participant(winner).to_string();
        let loser_name = self.session.participant(winner.opponent());

        if !self.session.finish(Some(&winner_name)) {
            return LoopOutcome::Cancelled;
        }
        if let Err(e) = self
            .store
            .update_end(id, DebateStatus::Finished, Some(&winner_name))
            .await
        {
            error!(debate_id = %id, error = %e, "failed to persist debate result");
        }

        info!(debate_id = %id, winner = %winner_name, "game over");
        self.session.broadcast(DebateEvent::GameOver {
            message: format!("{} wins! {} has run out of health.", winner_name, loser_name),
            winner: winner_name.clone(),
        });
        LoopOutcome::GameOver {
            winner: winner_name,
        }
    }

    async fn end_without_winner(&self, outcome: LoopOutcome, message: String) -> LoopOutcome {
        let id = self.session.id();
        if !self.session.finish(None) {
            return LoopOutcome::Cancelled;
        }
        if let Err(e) = self.store.update_end(id, DebateStatus::Finished, None).await {
            error!(debate_id = %id, error = %e, "failed to persist debate end");
        }

        warn!(debate_id = %id, ?outcome, "{}", message);
        self.session.broadcast(DebateEvent::Timeout { message });
        outcome
    }

    /// Force the debate to finished after a fault.
    async fn fail(&self, message: String) -> LoopOutcome {
        let id = self.session.id();
        error!(debate_id = %id, error = %message, "turn loop fault");

        if !self.session.finish(None) {
            return LoopOutcome::Faulted(message);
        }
        if let Err(e) = self.store.update_end(id, DebateStatus::Finished, None).await {
            error!(debate_id = %id, error = %e, "failed to persist debate end after fault");
        }
        self.session.broadcast(DebateEvent::Error {
            message: format!("Debate ended due to an internal error: {}", message),
        });
        LoopOutcome::Faulted(message)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::DebateRecord;
    use crate::event::ListenerHandle;
    use crate::rules::HealthScore;
    use crate::testing::{FixedAudio, MemoryStore, ScriptedGenerator, ScriptedScorer, fast_rules};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Harness {
        session: Arc<Session>,
        store: Arc<MemoryStore>,
        events: mpsc::Receiver<DebateEvent>,
    }

    fn harness(starting_hp: i32) -> Harness {
        let session = Arc::new(Session::new("d1", "Tabs vs spaces", "Ada", "Linus", "tester", starting_hp));
        let store = Arc::new(MemoryStore::default());
        let (listener, events) = ListenerHandle::channel(1024);
        session.add_listener(listener);
        Harness {
            session,
            store,
            events,
        }
    }

    fn turn_loop(
        h: &Harness,
        generator: Arc<dyn Generator>,
        scorer: Arc<dyn Scorer>,
        audio: Option<Arc<dyn AudioSynthesizer>>,
        rules: ArenaConfig,
    ) -> TurnLoop {
        TurnLoop {
            session: h.session.clone(),
            generator,
            scorer,
            audio,
            store: h.store.clone(),
            rules,
            shutdown: CancellationToken::new(),
        }
    }

    fn drain(rx: &mut mpsc::Receiver<DebateEvent>) -> Vec<DebateEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_next_speaker_alternates() {
        let mut previous = None;
        let mut seen = Vec::new();
        for _ in 0..6 {
            let speaker = next_speaker(previous);
            seen.push(speaker);
            previous = Some(speaker);
        }
        assert_eq!(seen[0], Side::First);
        for pair in seen.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_format_context() {
        let s = Session::new("d", "t", "Ada", "Linus", "u", 100);
        s.append_turn("Ada", "Tabs.", false);
        s.append_turn("Linus", "Spaces.", false);
        assert_eq!(format_context(&s.recent_transcript(5)), "Ada: Tabs.\nLinus: Spaces.");
        assert_eq!(format_context(&[]), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_knockout_ends_loop_with_winner() {
        let mut h = harness(100);
        let scorer = Arc::new(ScriptedScorer::by_speaker(&[("Ada", 9.0), ("Linus", 1.0)]));
        let outcome = turn_loop(&h, Arc::new(ScriptedGenerator::new()), scorer, None, fast_rules())
            .run()
            .await;

        assert_eq!(outcome, LoopOutcome::GameOver { winner: "Ada".to_string() });
        assert_eq!(h.session.status(), DebateStatus::Finished);
        assert_eq!(h.session.winner().as_deref(), Some("Ada"));
        // 84, 64, 44, 24, 4, -16
        assert_eq!(h.session.transcript_len(), 6);
        assert_eq!(h.session.health().second, -16);

        let events = drain(&mut h.events);
        assert!(matches!(events.first(), Some(DebateEvent::System { .. })));
        assert!(matches!(
            events.last(),
            Some(DebateEvent::GameOver { winner, .. }) if winner == "Ada"
        ));
        let speakers: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                DebateEvent::Message { speaker, .. } => Some(speaker.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(speakers, vec!["Ada", "Linus", "Ada", "Linus", "Ada", "Linus"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_score_update_carries_normalized_and_raw() {
        let mut h = harness(10);
        let scorer = Arc::new(ScriptedScorer::by_speaker(&[("Ada", 9.0), ("Linus", 1.0)]));
        turn_loop(&h, Arc::new(ScriptedGenerator::new()), scorer, None, fast_rules())
            .run()
            .await;

        let updates: Vec<(i32, i32)> = drain(&mut h.events)
            .into_iter()
            .filter_map(|e| match e {
                DebateEvent::ScoreUpdate { normalized, raw } => Some((normalized.second, raw.second)),
                _ => None,
            })
            .collect();
        // Ada's opener deals 16 damage against a 10 HP opponent.
        assert_eq!(updates, vec![(0, -6)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generation_failure_skips_without_advancing() {
        let h = harness(100);
        let generator = Arc::new(ScriptedGenerator::failing_on(&[0, 1]));
        let scorer = Arc::new(ScriptedScorer::by_speaker(&[("Ada", 9.0), ("Linus", 1.0)]));
        let outcome = turn_loop(&h, generator.clone(), scorer, None, fast_rules())
            .run()
            .await;

        assert!(matches!(outcome, LoopOutcome::GameOver { .. }));
        assert_eq!(generator.calls(), 8);
        let transcript = h.session.recent_transcript(100);
        assert_eq!(transcript.len(), 6);
        assert_eq!(transcript[0].speaker, "Ada");
        assert!(transcript.iter().all(|e| e.score.is_some()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoring_failure_substitutes_neutral() {
        let mut h = harness(100);
        let scorer = Arc::new(ScriptedScorer::by_speaker(&[("Ada", 9.0)]).failing_on(&[0]));
        let mut rules = fast_rules();
        rules.debate_timeout_secs = 1;
        turn_loop(&h, Arc::new(ScriptedGenerator::new()), scorer, None, rules)
            .run()
            .await;

        let first = &h.session.recent_transcript(100)[0];
        assert_eq!(first.score, Some(Score::neutral()));

        // Neutral against the neutral default deals no damage.
        let first_update = drain(&mut h.events).into_iter().find_map(|e| match e {
            DebateEvent::ScoreUpdate { raw, .. } => Some(raw),
            _ => None,
        });
        assert_eq!(first_update.map(|r| (r.first, r.second)), Some((100, 100)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_ends_without_winner() {
        let mut h = harness(100);
        let mut rules = fast_rules();
        rules.debate_timeout_secs = 2;
        rules.turn_delay_ms = 500;
        let outcome = turn_loop(
            &h,
            Arc::new(ScriptedGenerator::always_failing()),
            Arc::new(ScriptedScorer::default()),
            None,
            rules,
        )
        .run()
        .await;

        assert_eq!(outcome, LoopOutcome::Timeout);
        assert_eq!(h.session.status(), DebateStatus::Finished);
        assert_eq!(h.session.winner(), None);
        assert_eq!(h.session.transcript_len(), 0);
        assert!(matches!(drain(&mut h.events).last(), Some(DebateEvent::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_watchdog_stalls() {
        let h = harness(100);
        let mut rules = fast_rules();
        rules.inactivity_timeout_secs = 3;
        rules.turn_delay_ms = 1000;
        let outcome = turn_loop(
            &h,
            Arc::new(ScriptedGenerator::always_failing()),
            Arc::new(ScriptedScorer::default()),
            None,
            rules,
        )
        .run()
        .await;

        assert_eq!(outcome, LoopOutcome::Stalled);
        assert_eq!(h.session.status(), DebateStatus::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_status_change_cancels() {
        let h = harness(100);
        let session = h.session.clone();
        let mut rules = fast_rules();
        rules.turn_delay_ms = 1000;
        let task = tokio::spawn(
            turn_loop(
                &h,
                Arc::new(ScriptedGenerator::new()),
                Arc::new(ScriptedScorer::default()),
                None,
                rules,
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(2500)).await;
        session.finish(None);
        let outcome = task.await.unwrap();

        assert_eq!(outcome, LoopOutcome::Cancelled);
        let appended = session.transcript_len();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(session.transcript_len(), appended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_leaves_status_untouched() {
        let h = harness(100);
        let token = CancellationToken::new();
        let mut tl = turn_loop(
            &h,
            Arc::new(ScriptedGenerator::new()),
            Arc::new(ScriptedScorer::default()),
            None,
            fast_rules(),
        );
        tl.shutdown = token.clone();
        let task = tokio::spawn(tl.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();

        assert_eq!(task.await.unwrap(), LoopOutcome::Shutdown);
        assert_eq!(h.session.status(), DebateStatus::Active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_in_scorer_forces_finished() {
        let mut h = harness(100);
        let scorer = Arc::new(ScriptedScorer::default().panicking_on(1));
        let outcome = turn_loop(&h, Arc::new(ScriptedGenerator::new()), scorer, None, fast_rules())
            .run()
            .await;

        assert!(matches!(outcome, LoopOutcome::Faulted(ref m) if m.contains("scorer blew up")));
        assert_eq!(h.session.status(), DebateStatus::Finished);
        assert!(matches!(drain(&mut h.events).last(), Some(DebateEvent::Error { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_is_best_effort() {
        let mut h = harness(10);
        let scorer: Arc<dyn Scorer> = Arc::new(ScriptedScorer::by_speaker(&[("Ada", 9.0)]));
        let audio: Arc<dyn AudioSynthesizer> = Arc::new(FixedAudio { fail: false });
        turn_loop(&h, Arc::new(ScriptedGenerator::new()), scorer.clone(), Some(audio), fast_rules())
            .run()
            .await;
        let events = drain(&mut h.events);
        assert!(events.iter().any(|e| matches!(
            e,
            DebateEvent::Audio { artifact_ref, speaker } if artifact_ref == "mem://Ada.wav" && speaker == "Ada"
        )));

        let mut h = harness(10);
        let broken: Arc<dyn AudioSynthesizer> = Arc::new(FixedAudio { fail: true });
        let outcome = turn_loop(&h, Arc::new(ScriptedGenerator::new()), scorer, Some(broken), fast_rules())
            .run()
            .await;
        assert_eq!(outcome, LoopOutcome::GameOver { winner: "Ada".to_string() });
        assert!(!drain(&mut h.events).iter().any(|e| matches!(e, DebateEvent::Audio { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistence_failure_does_not_stop_loop() {
        let h = harness(100);
        h.store.fail_writes.store(true, std::sync::atomic::Ordering::SeqCst);
        let scorer = Arc::new(ScriptedScorer::by_speaker(&[("Ada", 9.0), ("Linus", 1.0)]));
        let outcome = turn_loop(&h, Arc::new(ScriptedGenerator::new()), scorer, None, fast_rules())
            .run()
            .await;

        assert_eq!(outcome, LoopOutcome::GameOver { winner: "Ada".to_string() });
        assert_eq!(h.session.status(), DebateStatus::Finished);
    }

    #[tokio::test]
    async fn test_loop_on_finished_session_is_cancelled() {
        let h = harness(100);
        h.session.finish(None);
        let outcome = turn_loop(
            &h,
            Arc::new(ScriptedGenerator::new()),
            Arc::new(ScriptedScorer::default()),
            None,
            fast_rules(),
        )
        .run()
        .await;
        assert_eq!(outcome, LoopOutcome::Cancelled);
        assert_eq!(h.session.transcript_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backward_status_change_does_not_strand_loop() {
        let h = harness(100);
        let session = h.session.clone();
        let task = tokio::spawn(
            turn_loop(
                &h,
                Arc::new(ScriptedGenerator::new()),
                Arc::new(ScriptedScorer::default()),
                None,
                fast_rules(),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert_eq!(session.update_status(DebateStatus::Waiting), DebateStatus::Active);
        assert_eq!(session.status(), DebateStatus::Active);

        let before = session.transcript_len();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(session.transcript_len() > before);

        session.finish(None);
        assert_eq!(task.await.unwrap(), LoopOutcome::Cancelled);
        assert_eq!(session.status(), DebateStatus::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_scoring_failures_are_all_neutral() {
        let h = harness(100);
        let every_call: Vec<usize> = (0..1000).collect();
        let scorer = Arc::new(
            ScriptedScorer::by_speaker(&[("Ada", 9.0), ("Linus", 1.0)]).failing_on(&every_call),
        );
        let mut rules = fast_rules();
        rules.debate_timeout_secs = 1;
        let outcome = turn_loop(&h, Arc::new(ScriptedGenerator::new()), scorer, None, rules)
            .run()
            .await;

        assert_eq!(outcome, LoopOutcome::Timeout);
        let midpoint = Score {
            strength: 5.0,
            relevance: 5.0,
            logic: 5.0,
            truth: 5.0,
            humor: 5.0,
            average: 5.0,
        };
        let transcript = h.session.recent_transcript(usize::MAX);
        assert!(transcript.len() > 4);
        assert!(transcript.iter().all(|e| e.score == Some(midpoint)));
        assert_eq!(h.session.health(), HealthScore::new(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fault_after_stop_emits_nothing() {
        let mut h = harness(100);
        h.store.insert(DebateRecord {
            id: "d1".to_string(),
            topic: "Tabs vs spaces".to_string(),
            status: DebateStatus::Waiting,
            participant1: "Ada".to_string(),
            participant2: "Linus".to_string(),
            created_by: "tester".to_string(),
            created_at: chrono::Utc::now(),
            ended_at: None,
            winner: None,
        });
        let session = h.session.clone();
        let scorer = Arc::new(
            ScriptedScorer::default()
                .panicking_on(0)
                .with_delay(Duration::from_secs(1)),
        );
        let task = tokio::spawn(
            turn_loop(&h, Arc::new(ScriptedGenerator::new()), scorer, None, fast_rules()).run(),
        );

        tokio::time::sleep(Duration::from_millis(500)).await;
        session.finish(None);

        assert!(matches!(task.await.unwrap(), LoopOutcome::Faulted(_)));
        assert!(!drain(&mut h.events).iter().any(|e| e.is_terminal()));
        // Whoever stopped it owns the end record.
        let record = h.store.get("d1").unwrap();
        assert_eq!(record.status, DebateStatus::Active);
        assert_eq!(record.ended_at, None);
    }
}
