//! Application configuration loaded from environment variables.
//!
//! Mirrors the reference server's `Config::from_env` shape: required
//! variables fail fast via `anyhow::Context`, optional ones fall back to
//! documented defaults.

use anyhow::{Context, Result};
use std::env;
use std::time::Duration;

/// Recognized configuration options.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,

    /// Public base URL used to build answer/webhook URLs.
    pub public_base_url: String,

    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_from_number: String,

    /// AI realtime peer connection details.
    pub ai_realtime_url: String,
    pub ai_realtime_api_key: String,
    pub ai_voice: String,

    /// Number of parallel Worker Pool consumers (default 5).
    pub worker_concurrency: usize,
    /// Token-bucket rate limit: (count, window).
    pub rate_limit_count: u32,
    pub rate_limit_window: Duration,
    /// Default max attempts for a job (default 3).
    pub default_max_attempts: i32,
    /// Initial retry delay in milliseconds (default 2000).
    pub default_backoff_base_ms: i64,

    /// JS retention sweep policy.
    pub completed_retention_age: Duration,
    pub completed_retention_count: i64,
    pub failed_retention_age: Duration,

    /// Per-attempt AI connect deadline (default 10s).
    pub ai_connect_deadline: Duration,
    /// Session-level reconnect cap (default 3).
    pub ai_max_retries: u32,
}

impl Config {
    /// Load configuration from environment variables, loading a `.env`
    /// file first if present (development convenience).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env_parse_or("PORT", 8080)?,
            public_base_url: env::var("PUBLIC_BASE_URL").context("PUBLIC_BASE_URL must be set")?,

            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID")
                .context("TWILIO_ACCOUNT_SID must be set")?,
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN")
                .context("TWILIO_AUTH_TOKEN must be set")?,
            twilio_from_number: env::var("TWILIO_FROM_NUMBER")
                .context("TWILIO_FROM_NUMBER must be set")?,

            ai_realtime_url: env::var("AI_REALTIME_URL")
                .unwrap_or_else(|_| "wss://api.openai.com/v1/realtime".to_string()),
            ai_realtime_api_key: env::var("AI_REALTIME_API_KEY")
                .context("AI_REALTIME_API_KEY must be set")?,
            ai_voice: env::var("AI_VOICE").unwrap_or_else(|_| "alloy".to_string()),

            worker_concurrency: env_parse_or("WORKER_CONCURRENCY", 5)?,
            rate_limit_count: env_parse_or("RATE_LIMIT_COUNT", 10)?,
            rate_limit_window: Duration::from_secs(env_parse_or("RATE_LIMIT_WINDOW_SECS", 60)?),
            default_max_attempts: env_parse_or("DEFAULT_MAX_ATTEMPTS", 3)?,
            default_backoff_base_ms: env_parse_or("DEFAULT_BACKOFF_BASE_MS", 2000)?,

            completed_retention_age: Duration::from_secs(
                env_parse_or::<u64>("COMPLETED_RETENTION_DAYS", 7)? * 86_400,
            ),
            completed_retention_count: env_parse_or("COMPLETED_RETENTION_COUNT", 1000)?,
            failed_retention_age: Duration::from_secs(
                env_parse_or::<u64>("FAILED_RETENTION_DAYS", 30)? * 86_400,
            ),

            ai_connect_deadline: Duration::from_secs(env_parse_or(
                "AI_CONNECT_DEADLINE_SECS",
                10,
            )?),
            ai_max_retries: env_parse_or("AI_MAX_RETRIES", 3)?,
        })
    }
}

fn env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{} must be a valid value: {}", name, e)),
        Err(_) => Ok(default),
    }
}
