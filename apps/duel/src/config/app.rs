//! Worker process configuration loaded from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::config::game::GameSettings;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    /// Polling loops spawned by this process.
    pub workers: usize,
    pub poll_interval: Duration,
    pub game: GameSettings,
}

impl Config {
    /// Load and validate all configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let redis_url = lookup("REDIS_URL").ok_or_else(|| AppError::Config {
            detail: "REDIS_URL must be set".to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "REDIS_URL environment variable not found",
            )),
        })?;

        let workers: usize = parse_or(&lookup, "DUEL_WORKERS", 4)?;
        if workers == 0 {
            return Err(AppError::Config {
                detail: "DUEL_WORKERS must be at least 1".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "zero workers",
                )),
            });
        }
        let poll_interval = Duration::from_millis(parse_or(&lookup, "DUEL_POLL_INTERVAL_MS", 100)?);

        let defaults = GameSettings::default();
        let game = GameSettings {
            tick_frequency: secs_or(&lookup, "DUEL_TICK_FREQUENCY_SECS", defaults.tick_frequency)?,
            consent_timeout: secs_or(&lookup, "DUEL_CONSENT_TIMEOUT_SECS", defaults.consent_timeout)?,
            hands_timeout: secs_or(&lookup, "DUEL_HANDS_TIMEOUT_SECS", defaults.hands_timeout)?,
            remaining_hand_timeout: secs_or(
                &lookup,
                "DUEL_REMAINING_HAND_TIMEOUT_SECS",
                defaults.remaining_hand_timeout,
            )?,
            rounds_to_win: parse_or(&lookup, "DUEL_ROUNDS_TO_WIN", defaults.rounds_to_win)?,
            max_rounds: parse_or(&lookup, "DUEL_MAX_ROUNDS", defaults.max_rounds)?,
            session_ttl: secs_or(&lookup, "DUEL_SESSION_TTL_SECS", defaults.session_ttl)?,
            finished_ttl: secs_or(&lookup, "DUEL_FINISHED_TTL_SECS", defaults.finished_ttl)?,
            presence_window: secs_or(
                &lookup,
                "DUEL_PRESENCE_WINDOW_SECS",
                defaults.presence_window,
            )?,
        };
        game.validate()?;

        Ok(Config {
            redis_url,
            workers,
            poll_interval,
            game,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| AppError::Config {
            detail: format!("{name} must be a valid number, got '{raw}'"),
            source: Box::new(e),
        }),
        None => Ok(default),
    }
}

fn secs_or<F>(lookup: &F, name: &str, default: Duration) -> Result<Duration, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, name, default.as_secs()).map(Duration::from_secs)
}
