//! Redis pub/sub publisher for outbound player notifications.
//!
//! Every notification lands on `user:<id>` as a JSON [`OutboundEnvelope`].
//! Whatever front end owns the player's connection subscribes to that channel
//! and renders the message; the message id lets it edit or delete later.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;
use uuid::Uuid;

use super::retry::{is_transient_error, publisher_retry_delay, PUBLISHER_MAX_ATTEMPTS};
use crate::domain::session::{MessageRef, UserId};
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::services::notify::{Notifier, Payload};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    Notify {
        message_id: Uuid,
        #[serde(flatten)]
        payload: Payload,
    },
    Edit {
        message_id: Uuid,
        #[serde(flatten)]
        payload: Payload,
    },
    Delete {
        message_id: Uuid,
    },
}

pub fn user_channel(user_id: UserId) -> String {
    format!("user:{user_id}")
}

pub struct RedisNotifier {
    publisher: Mutex<ConnectionManager>,
}

impl RedisNotifier {
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        let client = Client::open(redis_url).map_err(|err| AppError::Config {
            detail: format!("Invalid REDIS_URL: {err}"),
            source: Box::new(err),
        })?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|err| AppError::Internal {
                code: ErrorCode::TransportError,
                detail: "Unable to initialize Redis publisher".to_string(),
                source: Box::new(err),
            })?;
        Ok(Self::new(manager))
    }

    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            publisher: Mutex::new(manager),
        }
    }

    async fn publish(&self, recipient: UserId, envelope: &OutboundEnvelope) -> Result<(), AppError> {
        let channel = user_channel(recipient);
        let encoded = serde_json::to_string(envelope).map_err(|err| AppError::Internal {
            code: ErrorCode::InternalError,
            detail: "Failed to serialize outbound envelope".to_string(),
            source: Box::new(err),
        })?;

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let publish_res = {
                let mut publisher = self.publisher.lock().await;
                publisher
                    .publish::<_, _, ()>(channel.clone(), encoded.clone())
                    .await
            };

            match publish_res {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let app_err = AppError::Internal {
                        code: ErrorCode::TransportError,
                        detail: format!("Failed to publish notification: {err}"),
                        source: Box::new(err),
                    };

                    if attempt >= PUBLISHER_MAX_ATTEMPTS || !is_transient_error(&app_err) {
                        return Err(app_err);
                    }

                    let delay = publisher_retry_delay(attempt);
                    warn!(
                        error = %app_err,
                        channel = %channel,
                        attempt,
                        retry_delay_ms = delay.as_millis() as u64,
                        "Redis publish failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, recipient: UserId, payload: &Payload) -> Result<MessageRef, AppError> {
        let message_id = Uuid::new_v4();
        let envelope = OutboundEnvelope::Notify {
            message_id,
            payload: payload.clone(),
        };
        self.publish(recipient, &envelope).await?;
        Ok(message_id)
    }

    async fn edit(
        &self,
        recipient: UserId,
        message: MessageRef,
        payload: &Payload,
    ) -> Result<(), AppError> {
        let envelope = OutboundEnvelope::Edit {
            message_id: message,
            payload: payload.clone(),
        };
        self.publish(recipient, &envelope).await
    }

    async fn delete(&self, recipient: UserId, message: MessageRef) -> Result<(), AppError> {
        self.publish(recipient, &OutboundEnvelope::Delete { message_id: message })
            .await
    }
}
