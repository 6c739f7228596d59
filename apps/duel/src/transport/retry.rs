//! Retry policy shared by the Redis publisher and the inbound subscriber.

use std::error::Error as StdError;
use std::time::Duration;

use rand::random;

use crate::error::AppError;

// Subscriber reconnect (background task)
pub const INITIAL_RETRY_DELAY_SECS: u64 = 1;
pub const MAX_RETRY_DELAY_SECS: u64 = 60;
const RETRY_DELAY_MULTIPLIER: f64 = 2.0;
const JITTER_PERCENT: f64 = 0.2;

// Publisher (per notification)
pub const PUBLISHER_MAX_ATTEMPTS: u32 = 3;
pub const PUBLISHER_INITIAL_RETRY_DELAY_MS: u64 = 50;
pub const PUBLISHER_MAX_RETRY_DELAY_MS: u64 = 200;

/// Whether a Redis failure is worth another attempt.
pub fn is_transient_error(err: &AppError) -> bool {
    if let AppError::Config { .. } = err {
        return false;
    }

    let error_msg = err.to_string().to_lowercase();

    if error_msg.contains("authentication failed")
        || error_msg.contains("invalid redis_url")
        || error_msg.contains("unsupported")
        || error_msg.contains("noscript")
    {
        return false;
    }

    if error_msg.contains("connection refused")
        || error_msg.contains("connection reset")
        || error_msg.contains("connection aborted")
        || error_msg.contains("timed out")
        || error_msg.contains("timeout")
        || error_msg.contains("broken pipe")
        || error_msg.contains("io error")
        || error_msg.contains("stream ended")
    {
        return true;
    }

    if let Some(source) = StdError::source(err) {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
            match io_err.kind() {
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::Interrupted => return true,
                std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::Unsupported => {
                    return false
                }
                _ => {}
            }
        }
    }

    true
}

/// Exponential back-off with +/-20% jitter, capped at a minute.
pub fn calculate_retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16) as i32;
    let base_delay = INITIAL_RETRY_DELAY_SECS as f64 * RETRY_DELAY_MULTIPLIER.powi(exponent);
    let capped_delay = base_delay.min(MAX_RETRY_DELAY_SECS as f64);

    let jitter_range = capped_delay * JITTER_PERCENT;
    let jitter = (random::<f64>() * 2.0 - 1.0) * jitter_range;
    let final_delay = (capped_delay + jitter).max(0.1);

    Duration::from_secs_f64(final_delay)
}

/// Short fixed-ladder delay between publish attempts.
pub fn publisher_retry_delay(attempt: u32) -> Duration {
    let delay_ms = PUBLISHER_INITIAL_RETRY_DELAY_MS
        .saturating_mul(2_u64.pow(attempt.saturating_sub(1).min(16)))
        .min(PUBLISHER_MAX_RETRY_DELAY_MS);
    Duration::from_millis(delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    #[test]
    fn config_errors_are_permanent() {
        let err = AppError::config("bad url", std::io::Error::other("x"));
        assert!(!is_transient_error(&err));
    }

    #[test]
    fn connection_failures_are_transient() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = AppError::internal(ErrorCode::TransportError, "publish failed", io);
        assert!(is_transient_error(&err));
    }

    #[test]
    fn subscriber_delay_grows_and_caps() {
        let first = calculate_retry_delay(1).as_secs_f64();
        assert!((0.8..=1.2).contains(&first));
        let late = calculate_retry_delay(30).as_secs_f64();
        assert!(late <= MAX_RETRY_DELAY_SECS as f64 * 1.2);
        assert!(late >= MAX_RETRY_DELAY_SECS as f64 * 0.8);
    }

    #[test]
    fn publisher_delay_ladder() {
        assert_eq!(publisher_retry_delay(1), Duration::from_millis(50));
        assert_eq!(publisher_retry_delay(2), Duration::from_millis(100));
        assert_eq!(publisher_retry_delay(3), Duration::from_millis(200));
        assert_eq!(publisher_retry_delay(9), Duration::from_millis(200));
    }
}
