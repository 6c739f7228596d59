use std::time::Duration;

use tracing::{debug, warn};

use super::{GameFlowService, MAX_COMMIT_ATTEMPTS};
use crate::domain::session::SessionState;
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::store::CasOutcome;

/// Result of a read-modify-write against the session store.
#[derive(Debug)]
pub(super) enum Mutated<T> {
    /// The change was written; `state` is what is stored now.
    Committed { state: SessionState, value: T },
    /// The mutation declined to write; `state` is what it saw.
    Unchanged(SessionState),
    /// No session under that id.
    Gone,
}

impl GameFlowService {
    /// Store lifetime for a record in this state.
    pub(super) fn ttl_for(&self, state: &SessionState) -> Duration {
        if state.is_finished() {
            self.state.settings.finished_ttl
        } else {
            self.state.settings.session_ttl
        }
    }

    /// Read a session. A record that no longer decodes is deleted and
    /// reported as absent, so every caller clears it the same way.
    pub(super) async fn load(&self, session_id: &str) -> Result<Option<SessionState>, AppError> {
        match self.state.store.get(session_id).await {
            Err(err) if err.code() == ErrorCode::StoreCorrupted => {
                warn!(session_id, error = %err, "Discarding undecodable session record");
                self.state.store.delete(session_id).await?;
                Ok(None)
            }
            loaded => loaded,
        }
    }

    /// Load, mutate and compare-and-swap until the write lands.
    ///
    /// `mutation` runs against a fresh copy on every attempt; returning
    /// `Ok(None)` skips the write. The version bump is done here.
    pub(super) async fn mutate<T, F>(
        &self,
        session_id: &str,
        mut mutation: F,
    ) -> Result<Mutated<T>, AppError>
    where
        F: FnMut(&mut SessionState) -> Result<Option<T>, AppError> + Send,
        T: Send,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let Some(current) = self.load(session_id).await? else {
                return Ok(Mutated::Gone);
            };
            let mut next = current.clone();
            let Some(value) = mutation(&mut next)? else {
                return Ok(Mutated::Unchanged(current));
            };
            next.version = current.version + 1;

            let ttl = self.ttl_for(&next);
            match self
                .state
                .store
                .compare_and_swap(current.version, &next, ttl)
                .await?
            {
                CasOutcome::Swapped => {
                    return Ok(Mutated::Committed { state: next, value });
                }
                CasOutcome::Missing => return Ok(Mutated::Gone),
                CasOutcome::Conflict => {
                    debug!(session_id, attempt, "Session changed underneath, retrying");
                }
            }
        }
        Err(AppError::conflict(
            ErrorCode::CommitConflict,
            format!("session {session_id} kept changing after {MAX_COMMIT_ATTEMPTS} attempts"),
        ))
    }
}
