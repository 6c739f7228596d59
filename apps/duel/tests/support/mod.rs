#![allow(dead_code)]

//! In-memory harness for driving whole games through the worker loop.

pub mod notifier;

use std::sync::Arc;
use std::time::Duration;

use duel::clock::ManualClock;
use duel::dispatch::stage_dispatcher;
use duel::domain::{SessionId, SessionState, UserId};
use duel::services::matchmaking::MemoryPresence;
use duel::services::notify::Notifier;
use duel::store::{MemorySessionStore, SessionStore};
use duel::timers::{MemoryTimerRegistry, TimerRegistry};
use duel::worker::{PollStats, Worker};
use duel::{AppState, GameFlowService, GameSettings, MatchOutcome};
use time::macros::datetime;

pub use notifier::{FailingNotifier, RecordingNotifier, Sent, UnreachableUser};

pub const SECOND: Duration = Duration::from_secs(1);

pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemorySessionStore>,
    pub timers: Arc<MemoryTimerRegistry>,
    pub notifier: Arc<RecordingNotifier>,
    pub presence: Arc<MemoryPresence>,
    pub state: AppState,
    pub flow: GameFlowService,
    pub worker: Worker,
}

impl Harness {
    pub fn new(online: &[UserId]) -> Self {
        Self::with_settings(online, GameSettings::default())
    }

    pub fn with_settings(online: &[UserId], settings: GameSettings) -> Self {
        let notifier = Arc::new(RecordingNotifier::default());
        Self::assemble(online, settings, notifier.clone(), notifier)
    }

    /// Harness whose outward notifications all fail.
    pub fn with_failing_notifier(online: &[UserId]) -> Self {
        Self::assemble(
            online,
            GameSettings::default(),
            Arc::new(FailingNotifier),
            Arc::new(RecordingNotifier::default()),
        )
    }

    /// Harness whose notifications to `user` fail; everyone else is recorded.
    pub fn with_unreachable(online: &[UserId], user: UserId) -> Self {
        let recorder = Arc::new(RecordingNotifier::default());
        let notifier = Arc::new(UnreachableUser {
            user,
            inner: recorder.clone(),
        });
        Self::assemble(online, GameSettings::default(), notifier, recorder)
    }

    fn assemble(
        online: &[UserId],
        settings: GameSettings,
        notifier: Arc<dyn Notifier>,
        recorder: Arc<RecordingNotifier>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(datetime!(2025-01-01 12:00 UTC)));
        let store = Arc::new(MemorySessionStore::new(clock.clone()));
        let timers = Arc::new(MemoryTimerRegistry::new(clock.clone()));
        let presence = Arc::new(MemoryPresence::with_users(
            clock.clone(),
            settings.presence_window,
            online.iter().copied(),
        ));
        let state = AppState::new(
            store.clone(),
            timers.clone(),
            notifier,
            presence.clone(),
            clock.clone(),
            settings,
        );
        let flow = GameFlowService::new(state.clone());
        let worker = Worker::new(
            0,
            timers.clone(),
            Arc::new(stage_dispatcher(flow.clone())),
            clock.clone(),
            Duration::from_millis(10),
        );
        Self {
            clock,
            store,
            timers,
            notifier: recorder,
            presence,
            state,
            flow,
            worker,
        }
    }

    /// Pair two users and return the session id.
    pub async fn pair(&self, user: UserId, opponent: UserId) -> SessionId {
        match self.flow.start_matchmaking(user).await.unwrap() {
            MatchOutcome::Paired {
                session_id,
                opponent_id,
            } => {
                assert_eq!(opponent_id, opponent, "unexpected opponent picked");
                session_id
            }
            other => panic!("expected a pairing, got {other:?}"),
        }
    }

    /// Pair, accept on both sides and let the worker open round one.
    pub async fn start_game(&self, user: UserId, opponent: UserId) -> SessionId {
        let session_id = self.pair(user, opponent).await;
        self.play(user, "start_game").await;
        self.play(opponent, "start_game").await;
        self.step().await;
        assert_eq!(self.session(&session_id).await.round, 1);
        session_id
    }

    pub async fn play(&self, user: UserId, action: &str) {
        if let Err(err) = self.flow.submit_move(user, action).await {
            panic!("move {action} by {user} rejected: {err}");
        }
    }

    /// Throw both hands for `user`.
    pub async fn throw(&self, user: UserId, first: &str, second: &str) {
        self.play(user, first).await;
        self.play(user, second).await;
    }

    /// Advance the clock one second and run one poll.
    pub async fn step(&self) -> PollStats {
        self.clock.advance(SECOND);
        self.worker.poll_once().await.unwrap()
    }

    /// Step until the session is finished, failing after `max_steps`.
    pub async fn run_until_finished(&self, session_id: &str, max_steps: usize) {
        for _ in 0..max_steps {
            if self.session(session_id).await.is_finished() {
                return;
            }
            self.step().await;
        }
        assert!(
            self.session(session_id).await.is_finished(),
            "session {session_id} still running after {max_steps} steps"
        );
    }

    pub async fn session(&self, session_id: &str) -> SessionState {
        self.store
            .get(session_id)
            .await
            .unwrap()
            .unwrap_or_else(|| panic!("session {session_id} missing"))
    }

    pub async fn has_timer(&self, session_id: &str, timer_name: &str) -> bool {
        self.timers
            .lookup(session_id, timer_name)
            .await
            .unwrap()
            .is_some()
    }
}
