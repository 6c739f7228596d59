//! Redis pub/sub subscriber for inbound player commands.
//!
//! Front ends publish JSON [`InboundEvent`]s on [`INBOUND_CHANNEL`]. Any
//! number of coordinators may subscribe; pub/sub fans every command out to
//! all of them, so run exactly one subscriber per deployment.

use redis::Client;
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::retry::{calculate_retry_delay, is_transient_error};
use crate::domain::session::UserId;
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::services::game_flow::GameFlowService;

pub const INBOUND_CHANNEL: &str = "duel:inbound";

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    Matchmaking { user_id: UserId },
    Move { user_id: UserId, action: String },
    /// Single throw against the bot.
    QuickGame { user_id: UserId, action: String },
    Restart { user_id: UserId },
    Offline { user_id: UserId },
}

impl InboundEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            InboundEvent::Matchmaking { user_id }
            | InboundEvent::Move { user_id, .. }
            | InboundEvent::QuickGame { user_id, .. }
            | InboundEvent::Restart { user_id }
            | InboundEvent::Offline { user_id } => *user_id,
        }
    }
}

/// Route one command into the game flow. Every command except `offline`
/// counts as activity and keeps the sender in the presence window.
pub async fn handle_event(flow: &GameFlowService, event: InboundEvent) -> Result<(), AppError> {
    if !matches!(event, InboundEvent::Offline { .. }) {
        flow.state().matchmaker.mark_online(event.user_id()).await?;
    }
    match event {
        InboundEvent::Matchmaking { user_id } => {
            let outcome = flow.start_matchmaking(user_id).await?;
            debug!(user_id, ?outcome, "Matchmaking handled");
        }
        InboundEvent::Move { user_id, action } => {
            let outcome = flow.submit_move(user_id, &action).await?;
            debug!(user_id, ?outcome, "Move handled");
        }
        InboundEvent::QuickGame { user_id, action } => {
            let round = flow.play_bot(user_id, &action).await?;
            debug!(user_id, ?round, "Quick game handled");
        }
        InboundEvent::Restart { user_id } => flow.restart(user_id).await?,
        InboundEvent::Offline { user_id } => flow.state().matchmaker.mark_offline(user_id).await?,
    }
    Ok(())
}

pub fn spawn_subscriber(
    redis_url: &str,
    flow: GameFlowService,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let redis_url = redis_url.to_string();
    tokio::spawn(async move {
        tokio::select! {
            _ = shutdown.cancelled() => info!("Inbound subscriber stopped"),
            _ = run_subscription_loop_with_retry(&redis_url, &flow) => {}
        }
    })
}

async fn run_subscription_loop_with_retry(redis_url: &str, flow: &GameFlowService) {
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match run_subscription_loop(redis_url, flow).await {
            Ok(()) => {
                info!("Inbound subscription ended, reconnecting");
                attempt = 0;
            }
            Err(err) => {
                if !is_transient_error(&err) {
                    error!(
                        error = %err,
                        attempt,
                        "Inbound subscription failed with permanent error, exiting"
                    );
                    break;
                }

                let delay = calculate_retry_delay(attempt);
                warn!(
                    error = %err,
                    attempt,
                    retry_delay_secs = delay.as_secs_f64(),
                    "Inbound subscription failed, retrying"
                );
                sleep(delay).await;

                if attempt >= 20 {
                    attempt = 10;
                }
            }
        }
    }
}

async fn run_subscription_loop(redis_url: &str, flow: &GameFlowService) -> Result<(), AppError> {
    let client = Client::open(redis_url).map_err(|err| AppError::Config {
        detail: format!("Invalid REDIS_URL: {err}"),
        source: Box::new(err),
    })?;

    let mut pubsub = client
        .get_async_pubsub()
        .await
        .map_err(|err| AppError::Internal {
            code: ErrorCode::TransportError,
            detail: format!("Failed to connect to Redis for subscription: {err}"),
            source: Box::new(err),
        })?;

    pubsub
        .subscribe(INBOUND_CHANNEL)
        .await
        .map_err(|err| AppError::Internal {
            code: ErrorCode::TransportError,
            detail: format!("Failed to subscribe to {INBOUND_CHANNEL}: {err}"),
            source: Box::new(err),
        })?;

    info!(channel = INBOUND_CHANNEL, "Inbound subscription established");

    let mut stream = pubsub.into_on_message();
    while let Some(msg) = stream.next().await {
        let Ok(payload) = msg.get_payload::<String>() else {
            continue;
        };

        let event = match serde_json::from_str::<InboundEvent>(&payload) {
            Ok(event) => event,
            Err(err) => {
                error!(error = %err, payload = %payload, "Failed to decode inbound event");
                continue;
            }
        };

        let user_id = event.user_id();
        if let Err(err) = handle_event(flow, event).await {
            // rejected moves are answered to the player by the flow itself
            debug!(user_id, error = %err, "Inbound event rejected");
        }
    }

    Ok(())
}
