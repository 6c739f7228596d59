//! Timer registry and worker loop behaviour, independent of the game.

mod common;
mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use duel::clock::{Clock, ManualClock};
use duel::dispatch::{Dispatcher, TickOutcome, TimerHandler};
use duel::timers::{MemoryTimerRegistry, TimerEntry, TimerRegistry};
use duel::worker::{EntryOutcome, Worker};
use duel::AppError;
use parking_lot::Mutex;
use support::SECOND;
use time::macros::datetime;

#[derive(Default)]
struct Recorder {
    ticks: Mutex<Vec<f64>>,
    timeouts: AtomicUsize,
}

#[async_trait]
impl TimerHandler for Recorder {
    async fn on_tick(&self, _: &str, time_remaining: f64) -> Result<TickOutcome, AppError> {
        self.ticks.lock().push(time_remaining);
        Ok(TickOutcome::Continue)
    }

    async fn on_timeout(&self, _: &str) -> Result<bool, AppError> {
        self.timeouts.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }
}

struct Rig {
    clock: Arc<ManualClock>,
    timers: Arc<MemoryTimerRegistry>,
    recorder: Arc<Recorder>,
    worker: Worker,
}

fn rig(timer_name: &str) -> Rig {
    let clock = Arc::new(ManualClock::new(datetime!(2025-01-01 0:00 UTC)));
    let timers = Arc::new(MemoryTimerRegistry::new(clock.clone()));
    let recorder = Arc::new(Recorder::default());
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(timer_name, recorder.clone());
    let worker = Worker::new(
        0,
        timers.clone(),
        Arc::new(dispatcher),
        clock.clone(),
        Duration::from_millis(10),
    );
    Rig {
        clock,
        timers,
        recorder,
        worker,
    }
}

#[tokio::test]
async fn ticks_every_frequency_then_times_out_once() {
    let rig = rig("hands_completion");
    rig.timers
        .schedule("1:2", "hands_completion", 2 * SECOND, 10 * SECOND)
        .await
        .unwrap();

    for _ in 0..5 {
        rig.clock.advance(2 * SECOND);
        rig.worker.poll_once().await.unwrap();
    }

    assert_eq!(*rig.recorder.ticks.lock(), vec![8.0, 6.0, 4.0, 2.0]);
    assert_eq!(rig.recorder.timeouts.load(Ordering::SeqCst), 1);
    assert!(rig.timers.is_empty());

    rig.clock.advance(2 * SECOND);
    let stats = rig.worker.poll_once().await.unwrap();
    assert_eq!(stats.total(), 0);
    assert_eq!(rig.recorder.timeouts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn nothing_is_due_before_the_first_tick() {
    let rig = rig("hands_completion");
    rig.timers
        .schedule("1:2", "hands_completion", 2 * SECOND, 10 * SECOND)
        .await
        .unwrap();

    rig.clock.advance(SECOND);
    let stats = rig.worker.poll_once().await.unwrap();
    assert_eq!(stats.total(), 0);
    assert!(rig.recorder.ticks.lock().is_empty());
}

#[tokio::test]
async fn second_schedule_for_same_pair_changes_nothing() {
    let rig = rig("opponent_consent");
    assert!(rig
        .timers
        .schedule("1:2", "opponent_consent", SECOND, 10 * SECOND)
        .await
        .unwrap());
    let original = rig.timers.lookup("1:2", "opponent_consent").await.unwrap();

    rig.clock.advance(3 * SECOND);
    assert!(!rig
        .timers
        .schedule("1:2", "opponent_consent", 5 * SECOND, 60 * SECOND)
        .await
        .unwrap());
    assert_eq!(
        rig.timers.lookup("1:2", "opponent_consent").await.unwrap(),
        original
    );
    assert_eq!(rig.timers.len(), 1);
}

#[tokio::test]
async fn removing_an_absent_entry_is_harmless() {
    let rig = rig("remaining_hand");
    let ghost = TimerEntry::new("3:4", "remaining_hand", SECOND, 10 * SECOND, 0.0);
    assert!(!rig.timers.remove(&ghost).await.unwrap());
    assert!(!rig.timers.cancel("3:4", "remaining_hand").await.unwrap());
}

#[tokio::test]
async fn unknown_timer_name_is_kept_for_a_capable_worker() {
    let rig = rig("hands_completion");
    rig.timers
        .schedule("1:2", "mystery", SECOND, SECOND)
        .await
        .unwrap();
    rig.clock.advance(SECOND);

    let entry = rig.timers.lookup("1:2", "mystery").await.unwrap().unwrap();
    assert_eq!(
        rig.worker.evaluate(&entry).await.unwrap(),
        EntryOutcome::Retained
    );
    assert_eq!(rig.timers.len(), 1);

    let mut dispatcher = Dispatcher::new();
    dispatcher.register("mystery", rig.recorder.clone());
    let capable = Worker::new(
        1,
        rig.timers.clone(),
        Arc::new(dispatcher),
        rig.clock.clone(),
        Duration::from_millis(10),
    );
    let stats = capable.poll_once().await.unwrap();
    assert_eq!(stats.completed, 1);
    assert!(rig.timers.is_empty());
}

#[tokio::test]
async fn malformed_members_are_purged_while_polling() {
    let rig = rig("hands_completion");
    rig.timers.insert_raw_member(0.0, "{not json");
    rig.timers
        .schedule("1:2", "hands_completion", SECOND, 10 * SECOND)
        .await
        .unwrap();
    rig.clock.advance(SECOND);

    let stats = rig.worker.poll_once().await.unwrap();
    assert_eq!(stats.rescheduled, 1);
    assert_eq!(rig.recorder.ticks.lock().len(), 1);

    // the garbage member is gone, so the next poll sees nothing new
    let stats = rig.worker.poll_once().await.unwrap();
    assert_eq!(stats.total(), 0);
}

#[tokio::test]
async fn repair_restores_entries_lost_between_writes() {
    let rig = rig("hands_completion");
    rig.timers
        .schedule("1:2", "hands_completion", SECOND, 10 * SECOND)
        .await
        .unwrap();
    rig.timers.drop_pointer("1:2", "hands_completion");
    rig.clock.advance(SECOND);

    assert_eq!(rig.worker.poll_once().await.unwrap().total(), 0);
    assert_eq!(rig.timers.repair().await.unwrap(), 1);
    assert_eq!(rig.worker.poll_once().await.unwrap().rescheduled, 1);
}

#[tokio::test]
async fn second_worker_on_same_entry_is_a_no_op() {
    let rig = rig("hands_completion");
    rig.timers
        .schedule("1:2", "hands_completion", SECOND, 10 * SECOND)
        .await
        .unwrap();
    rig.clock.advance(SECOND);
    let entry = rig.timers.due(rig.clock.unix_now()).await.unwrap().remove(0);

    assert_eq!(
        rig.worker.evaluate(&entry).await.unwrap(),
        EntryOutcome::Rescheduled
    );
    assert_eq!(
        rig.worker.evaluate(&entry).await.unwrap(),
        EntryOutcome::Retained
    );
    assert_eq!(rig.timers.len(), 1);
}


/// Times out with a transient failure, then a permanent one, then succeeds.
#[derive(Default)]
struct Flaky {
    timeouts: AtomicUsize,
}

#[async_trait]
impl TimerHandler for Flaky {
    async fn on_tick(&self, _: &str, _: f64) -> Result<TickOutcome, AppError> {
        Ok(TickOutcome::Continue)
    }

    async fn on_timeout(&self, _: &str) -> Result<bool, AppError> {
        let io = || std::io::Error::other("boom");
        match self.timeouts.fetch_add(1, Ordering::SeqCst) {
            0 => Err(AppError::store("store down", io())),
            1 => Err(AppError::corrupted("bad record", io())),
            _ => Ok(true),
        }
    }
}

#[tokio::test]
async fn failing_handlers_keep_their_entry_whatever_the_error() {
    let clock = Arc::new(ManualClock::new(datetime!(2025-01-01 0:00 UTC)));
    let timers = Arc::new(MemoryTimerRegistry::new(clock.clone()));
    let handler = Arc::new(Flaky::default());
    let mut dispatcher = Dispatcher::new();
    dispatcher.register("hands_completion", handler.clone());
    let worker = Worker::new(
        0,
        timers.clone(),
        Arc::new(dispatcher),
        clock.clone(),
        Duration::from_millis(10),
    );
    timers
        .schedule("1:2", "hands_completion", SECOND, SECOND)
        .await
        .unwrap();
    clock.advance(SECOND);

    assert_eq!(worker.poll_once().await.unwrap().retained, 1);
    assert_eq!(worker.poll_once().await.unwrap().retained, 1);
    assert_eq!(timers.len(), 1);

    assert_eq!(worker.poll_once().await.unwrap().completed, 1);
    assert!(timers.is_empty());
    assert_eq!(handler.timeouts.load(Ordering::SeqCst), 3);
}
