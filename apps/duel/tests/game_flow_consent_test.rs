//! Consent stage outcomes, matchmaking edge cases, cancel and restart.

mod common;
mod support;

use duel::domain::{Phase, SessionStatus};
use duel::errors::ErrorCode;
use duel::services::notify::MessageKey;
use duel::{MatchOutcome, MoveOutcome};
use support::Harness;

#[tokio::test]
async fn refusal_ends_the_game_on_next_tick() {
    let h = Harness::new(&[1, 2]);
    let session_id = h.pair(1, 2).await;

    h.play(2, "refuse").await;
    assert_eq!(h.notifier.count(2, MessageKey::RefusedToPlay), 1);
    assert!(!h.session(&session_id).await.is_finished());

    h.step().await;
    let s = h.session(&session_id).await;
    assert!(s.is_finished());
    assert!(s.players.iter().all(|p| p.phase == Phase::Terminated));
    assert_eq!(h.notifier.count(1, MessageKey::OpponentRefused), 1);
    assert_eq!(h.notifier.count(1, MessageKey::GameFinished), 1);
    assert!(h.timers.is_empty());
}

#[tokio::test]
async fn one_silent_player_is_blamed_on_consent_timeout() {
    let h = Harness::new(&[1, 2]);
    let session_id = h.pair(1, 2).await;

    h.play(1, "start_game").await;
    assert_eq!(h.notifier.count(1, MessageKey::WaitingOpponent), 1);
    assert_eq!(h.notifier.count(2, MessageKey::OpponentReadyToPlay), 1);

    h.run_until_finished(&session_id, 12).await;
    assert_eq!(h.notifier.count(2, MessageKey::YouAreTooLong), 1);
    assert_eq!(h.notifier.count(1, MessageKey::TooLongWaitingResponse), 1);
    assert_eq!(h.session(&session_id).await.winner, None);
}

#[tokio::test]
async fn both_silent_players_are_told_so() {
    let h = Harness::new(&[1, 2]);
    let session_id = h.pair(1, 2).await;

    h.run_until_finished(&session_id, 12).await;
    assert_eq!(h.notifier.count(1, MessageKey::BothAreTooLong), 1);
    assert_eq!(h.notifier.count(2, MessageKey::BothAreTooLong), 1);
    // the countdown asked both to hurry before the end
    assert_eq!(h.notifier.count(1, MessageKey::GameWillCancel), 1);
}

#[tokio::test]
async fn lonely_player_gets_no_opponent() {
    let h = Harness::new(&[7]);
    assert_eq!(
        h.flow.start_matchmaking(7).await.unwrap(),
        MatchOutcome::NoOpponent
    );
    assert_eq!(h.notifier.keys_for(7), vec![MessageKey::NoOnlineUsers]);
    assert!(h.state.store.session_of(7).await.unwrap().is_none());
}

#[tokio::test]
async fn busy_players_cannot_be_picked_or_re_paired() {
    let h = Harness::new(&[1, 2, 3]);
    h.flow.start_matchmaking(1).await.unwrap();
    let session_id = h.state.store.session_of(1).await.unwrap().unwrap();
    let paired_with = h.session(&session_id).await.player_ids();

    let outsider = [1, 2, 3]
        .into_iter()
        .find(|id| !paired_with.contains(id))
        .unwrap();
    assert!(matches!(
        h.flow.start_matchmaking(outsider).await.unwrap(),
        MatchOutcome::OpponentBusy(_)
    ));
    assert_eq!(h.notifier.count(outsider, MessageKey::OpponentNotFound), 1);

    assert_eq!(
        h.flow.start_matchmaking(1).await.unwrap(),
        MatchOutcome::AlreadyInGame(session_id)
    );
    assert_eq!(h.notifier.count(1, MessageKey::AlreadyInGame), 1);
}

#[tokio::test]
async fn invalid_actions_leave_the_session_untouched() {
    let h = Harness::new(&[1, 2]);
    let session_id = h.pair(1, 2).await;
    let before = h.session(&session_id).await;

    let err = h.flow.submit_move(1, "spock").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnknownAction);

    let err = h.flow.submit_move(1, "rock").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PhaseMismatch);

    h.play(1, "start_game").await;
    let err = h.flow.submit_move(1, "refuse").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PhaseMismatch);

    let after = h.session(&session_id).await;
    assert_eq!(after.version, before.version + 1);
    assert_eq!(after.players[0].ready_to_play, Some(true));
    assert_eq!(h.notifier.count(1, MessageKey::InvalidMoveChoice), 3);
}

#[tokio::test]
async fn move_without_a_game_reports_missing_opponent() {
    let h = Harness::new(&[1, 2]);
    let err = h.flow.submit_move(1, "rock").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoActiveGame);
    assert_eq!(h.notifier.keys_for(1), vec![MessageKey::OpponentNotFound]);
}

#[tokio::test]
async fn cancel_ends_the_game_once() {
    let h = Harness::new(&[1, 2]);
    let session_id = h.start_game(1, 2).await;
    h.play(1, "rock").await;

    assert_eq!(
        h.flow.submit_move(2, "cancel").await.unwrap(),
        MoveOutcome::Cancelled
    );
    let s = h.session(&session_id).await;
    assert_eq!(s.status, SessionStatus::Finished);
    assert!(s.players.iter().all(|p| p.phase == Phase::Terminated));
    assert_eq!(h.notifier.count(1, MessageKey::OpponentCancelledGame), 1);
    assert!(h.timers.is_empty());

    let err = h.flow.submit_move(1, "cancel").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::GameFinished);
    assert_eq!(h.notifier.count(1, MessageKey::GameFinished), 2);
}

#[tokio::test]
async fn restart_mid_game_frees_both_players() {
    let h = Harness::new(&[1, 2]);
    let session_id = h.start_game(1, 2).await;

    h.flow.restart(1).await.unwrap();
    assert!(h.session(&session_id).await.is_finished());
    assert!(h.state.store.session_of(1).await.unwrap().is_none());
    assert_eq!(h.notifier.count(2, MessageKey::OpponentCancelledGame), 1);

    // the finished record no longer blocks a fresh pairing
    let again = h.pair(2, 1).await;
    assert_eq!(again, session_id);
    let s = h.session(&again).await;
    assert_eq!(s.status, SessionStatus::Pending);
    assert_eq!(s.version, 0);
}

#[tokio::test]
async fn restart_without_a_game_is_a_no_op() {
    let h = Harness::new(&[1]);
    h.flow.restart(1).await.unwrap();
    assert!(h.notifier.all().is_empty());
}

#[tokio::test]
async fn undecodable_session_is_cleared() {
    let h = Harness::new(&[1, 2]);
    let session_id = h.pair(1, 2).await;
    h.store
        .put_raw("session:1:2", "{\"status\":", h.state.settings.session_ttl);

    let err = h.flow.submit_move(1, "start_game").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::SessionNotFound);
    assert_eq!(h.notifier.count(1, MessageKey::OpponentNotFound), 1);
    assert!(h.state.store.get(&session_id).await.unwrap().is_none());
    assert!(h.state.store.session_of(1).await.unwrap().is_none());

    // the consent timer finds nothing left to watch and goes away
    h.step().await;
    assert!(h.timers.is_empty());
}
