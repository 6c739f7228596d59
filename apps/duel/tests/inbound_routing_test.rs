//! Inbound commands routed into the game flow without a live Redis.

mod common;
mod support;

use std::time::Duration;

use duel::services::notify::MessageKey;
use duel::transport::inbound::handle_event;
use duel::transport::InboundEvent;
use support::Harness;

fn decode(raw: &str) -> InboundEvent {
    serde_json::from_str(raw).unwrap()
}

#[tokio::test]
async fn commands_drive_a_game() {
    let h = Harness::new(&[2]);

    handle_event(&h.flow, decode(r#"{"type":"matchmaking","user_id":1}"#))
        .await
        .unwrap();
    assert_eq!(h.notifier.keys_for(1), vec![MessageKey::YourOpponent]);

    for user in [1, 2] {
        let event = InboundEvent::Move {
            user_id: user,
            action: "start_game".into(),
        };
        handle_event(&h.flow, event).await.unwrap();
    }
    h.step().await;
    assert_eq!(h.session("1:2").await.round, 1);

    handle_event(&h.flow, decode(r#"{"type":"restart","user_id":2}"#))
        .await
        .unwrap();
    assert!(h.session("1:2").await.is_finished());
    assert_eq!(h.notifier.count(1, MessageKey::OpponentCancelledGame), 1);
}

#[tokio::test]
async fn offline_players_are_not_picked() {
    let h = Harness::new(&[1, 2]);
    handle_event(&h.flow, InboundEvent::Offline { user_id: 2 })
        .await
        .unwrap();

    handle_event(&h.flow, InboundEvent::Matchmaking { user_id: 1 })
        .await
        .unwrap();
    assert_eq!(h.notifier.keys_for(1), vec![MessageKey::NoOnlineUsers]);
}

#[tokio::test]
async fn rejected_moves_surface_as_errors() {
    let h = Harness::new(&[1, 2]);
    let err = handle_event(
        &h.flow,
        InboundEvent::Move {
            user_id: 1,
            action: "lizard".into(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), duel::errors::ErrorCode::UnknownAction);
}

#[tokio::test]
async fn activity_keeps_players_pickable() {
    let h = Harness::new(&[1, 2, 3]);
    h.clock.advance(Duration::from_secs(59));
    handle_event(
        &h.flow,
        InboundEvent::QuickGame {
            user_id: 2,
            action: "rock".into(),
        },
    )
    .await
    .unwrap();

    // 3 has been silent for a full window; only 2 is left to pick
    h.clock.advance(Duration::from_secs(2));
    handle_event(&h.flow, InboundEvent::Matchmaking { user_id: 1 })
        .await
        .unwrap();
    assert!(h.notifier.keys_for(1).contains(&MessageKey::YourOpponent));
    assert_eq!(h.session("1:2").await.player_ids(), [1, 2]);
    assert_eq!(h.presence.online_count(), 2);
}

#[tokio::test]
async fn silent_players_leave_the_pool() {
    let h = Harness::new(&[1, 2]);
    h.clock.advance(h.state.settings.presence_window);
    handle_event(&h.flow, InboundEvent::Matchmaking { user_id: 1 })
        .await
        .unwrap();
    assert_eq!(h.notifier.keys_for(1), vec![MessageKey::NoOnlineUsers]);
}

#[tokio::test]
async fn quick_game_answers_without_a_session() {
    let h = Harness::new(&[1]);
    handle_event(&h.flow, decode(r#"{"type":"quick_game","user_id":1,"action":"paper"}"#))
        .await
        .unwrap();

    let keys = h.notifier.keys_for(1);
    assert_eq!(keys.len(), 1);
    assert!(matches!(
        keys[0],
        MessageKey::UserWon | MessageKey::BotWon | MessageKey::NobodyWon
    ));
    let payload = h.notifier.last_payload(1, keys[0]).unwrap();
    assert_eq!(payload.params["your_hand"], "paper");
    assert!(["rock", "paper", "scissors"].contains(&payload.params["bot_hand"].as_str()));
    assert!(h.state.store.session_of(1).await.unwrap().is_none());

    let err = handle_event(
        &h.flow,
        InboundEvent::QuickGame {
            user_id: 1,
            action: "first_hand".into(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), duel::errors::ErrorCode::UnknownAction);
    assert_eq!(h.notifier.count(1, MessageKey::InvalidMoveChoice), 1);
}
