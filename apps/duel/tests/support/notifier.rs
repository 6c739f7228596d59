use async_trait::async_trait;
use duel::domain::{MessageRef, UserId};
use duel::errors::ErrorCode;
use duel::services::notify::{MessageKey, Notifier, Payload};
use duel::AppError;
use parking_lot::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Notify {
        recipient: UserId,
        message: MessageRef,
        payload: Payload,
    },
    Edit {
        recipient: UserId,
        message: MessageRef,
        payload: Payload,
    },
    Delete {
        recipient: UserId,
        message: MessageRef,
    },
}

/// Notifier that remembers everything it was asked to do.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    /// Keys of new messages sent to `recipient`, in order.
    pub fn keys_for(&self, recipient: UserId) -> Vec<MessageKey> {
        self.sent
            .lock()
            .iter()
            .filter_map(|sent| match sent {
                Sent::Notify {
                    recipient: r,
                    payload,
                    ..
                } if *r == recipient => Some(payload.key),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, recipient: UserId, key: MessageKey) -> usize {
        self.keys_for(recipient)
            .into_iter()
            .filter(|k| *k == key)
            .count()
    }

    pub fn last_payload(&self, recipient: UserId, key: MessageKey) -> Option<Payload> {
        self.sent.lock().iter().rev().find_map(|sent| match sent {
            Sent::Notify {
                recipient: r,
                payload,
                ..
            } if *r == recipient && payload.key == key => Some(payload.clone()),
            _ => None,
        })
    }

    pub fn deletes_for(&self, recipient: UserId) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|sent| matches!(sent, Sent::Delete { recipient: r, .. } if *r == recipient))
            .count()
    }

    pub fn edits_for(&self, recipient: UserId) -> usize {
        self.sent
            .lock()
            .iter()
            .filter(|sent| matches!(sent, Sent::Edit { recipient: r, .. } if *r == recipient))
            .count()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, recipient: UserId, payload: &Payload) -> Result<MessageRef, AppError> {
        let message = Uuid::new_v4();
        self.sent.lock().push(Sent::Notify {
            recipient,
            message,
            payload: payload.clone(),
        });
        Ok(message)
    }

    async fn edit(
        &self,
        recipient: UserId,
        message: MessageRef,
        payload: &Payload,
    ) -> Result<(), AppError> {
        self.sent.lock().push(Sent::Edit {
            recipient,
            message,
            payload: payload.clone(),
        });
        Ok(())
    }

    async fn delete(&self, recipient: UserId, message: MessageRef) -> Result<(), AppError> {
        self.sent.lock().push(Sent::Delete { recipient, message });
        Ok(())
    }
}

/// Notifier whose every call fails, as if no client were reachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingNotifier;

fn unreachable_client() -> AppError {
    AppError::internal(
        ErrorCode::TransportError,
        "client unreachable",
        std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
    )
}

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _: UserId, _: &Payload) -> Result<MessageRef, AppError> {
        Err(unreachable_client())
    }

    async fn edit(&self, _: UserId, _: MessageRef, _: &Payload) -> Result<(), AppError> {
        Err(unreachable_client())
    }

    async fn delete(&self, _: UserId, _: MessageRef) -> Result<(), AppError> {
        Err(unreachable_client())
    }
}

/// Records like [`RecordingNotifier`] but fails every call aimed at one user.
#[derive(Debug)]
pub struct UnreachableUser {
    pub user: UserId,
    pub inner: std::sync::Arc<RecordingNotifier>,
}

#[async_trait]
impl Notifier for UnreachableUser {
    async fn notify(&self, recipient: UserId, payload: &Payload) -> Result<MessageRef, AppError> {
        if recipient == self.user {
            return Err(unreachable_client());
        }
        self.inner.notify(recipient, payload).await
    }

    async fn edit(
        &self,
        recipient: UserId,
        message: MessageRef,
        payload: &Payload,
    ) -> Result<(), AppError> {
        if recipient == self.user {
            return Err(unreachable_client());
        }
        self.inner.edit(recipient, message, payload).await
    }

    async fn delete(&self, recipient: UserId, message: MessageRef) -> Result<(), AppError> {
        if recipient == self.user {
            return Err(unreachable_client());
        }
        self.inner.delete(recipient, message).await
    }
}
