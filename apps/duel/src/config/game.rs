use std::time::Duration;

use crate::domain::stage::Stage;
use crate::error::AppError;

/// Game pacing and lifetime settings shared by every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSettings {
    /// Interval between timer ticks.
    pub tick_frequency: Duration,
    pub consent_timeout: Duration,
    pub hands_timeout: Duration,
    pub remaining_hand_timeout: Duration,
    pub rounds_to_win: u8,
    pub max_rounds: u8,
    /// Expiry of a live session record and of the player pointers.
    pub session_ttl: Duration,
    /// How long a finished record lingers so late events see "already finished".
    pub finished_ttl: Duration,
    /// A user counts as online this long after their last inbound event.
    pub presence_window: Duration,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            tick_frequency: Duration::from_secs(1),
            consent_timeout: Duration::from_secs(10),
            hands_timeout: Duration::from_secs(10),
            remaining_hand_timeout: Duration::from_secs(10),
            rounds_to_win: 2,
            max_rounds: 5,
            session_ttl: Duration::from_secs(3600),
            finished_ttl: Duration::from_secs(60),
            presence_window: Duration::from_secs(60),
        }
    }
}

impl GameSettings {
    pub fn timeout_for(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Consent => self.consent_timeout,
            Stage::Hands => self.hands_timeout,
            Stage::RemainingHand => self.remaining_hand_timeout,
        }
    }

    /// Longest time a session can spend waiting on timers before it ends.
    pub fn max_waiting(&self) -> Duration {
        let per_round = self.hands_timeout + self.remaining_hand_timeout;
        self.consent_timeout + per_round * u32::from(self.max_rounds)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.tick_frequency.is_zero() {
            return Err(invalid("tick frequency must be positive"));
        }
        if self.rounds_to_win == 0 {
            return Err(invalid("rounds to win must be at least 1"));
        }
        if self.max_rounds < self.rounds_to_win {
            return Err(invalid(format!(
                "max rounds ({}) must be at least rounds to win ({})",
                self.max_rounds, self.rounds_to_win
            )));
        }
        if self.session_ttl <= self.max_waiting() {
            return Err(invalid(format!(
                "session TTL {}s must exceed the accumulated timeout windows {}s",
                self.session_ttl.as_secs(),
                self.max_waiting().as_secs()
            )));
        }
        if self.finished_ttl.is_zero() {
            return Err(invalid("finished TTL must be positive"));
        }
        if self.presence_window.is_zero() {
            return Err(invalid("presence window must be positive"));
        }
        Ok(())
    }
}

fn invalid(detail: impl Into<String>) -> AppError {
    let detail = detail.into();
    AppError::config(
        detail.clone(),
        std::io::Error::new(std::io::ErrorKind::InvalidInput, detail),
    )
}
