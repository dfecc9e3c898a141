//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::error::ConfigError;

/// Default number of contacts handled per maintenance pass.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Contact store location. `None` means no store is connected.
    pub db_path: Option<PathBuf>,
    /// JSON sequence catalog.
    pub sequences_path: PathBuf,
    /// Directory of `.eml` files backing mail search (optional).
    pub mailbox_dir: Option<PathBuf>,
    /// The user's own sending address.
    pub self_address: String,
    /// Owner of the cache namespace.
    pub user_id: String,
    /// Port for the HTTP API.
    pub api_port: u16,
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
}

/// Maintenance scheduling.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Maximum contacts handled per pass (thread resolution, reply detection).
    pub batch_size: usize,
    /// Offset that defines the calendar day for the last-run marker and readiness.
    pub utc_offset: FixedOffset,
    /// Cron expression (seconds resolution) for the daily ticker.
    pub schedule: String,
    /// How often the ticker wakes up to compare the clock against the schedule.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            utc_offset: utc(),
            schedule: "0 0 6 * * *".to_string(),
            tick_interval: Duration::from_secs(60),
        }
    }
}

/// Contact cache bounds.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
    /// Rows loaded by `prefetch` at startup.
    pub prefetch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(2 * 3600), // 2 hours
            capacity: 50,
            prefetch: 20,
        }
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}

/// Parse a `+HH:MM` / `-HH:MM` offset, or a plain number of minutes.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = |message: &str| ConfigError::InvalidValue {
        key: "OUTREACH_UTC_OFFSET".to_string(),
        message: format!("{message}: {raw:?}"),
    };

    let raw = raw.trim();
    let seconds = if let Some((h, m)) = raw.split_once(':') {
        let sign = if h.starts_with('-') { -1 } else { 1 };
        let hours: i32 = h
            .trim_start_matches(['+', '-'])
            .parse()
            .map_err(|_| invalid("bad hours"))?;
        let minutes: i32 = m.parse().map_err(|_| invalid("bad minutes"))?;
        hours
            .checked_mul(3600)
            .and_then(|h| minutes.checked_mul(60).and_then(|mins| h.checked_add(mins)))
            .map(|total| sign * total)
            .ok_or_else(|| invalid("offset out of range"))?
    } else {
        let minutes: i32 = raw.parse().map_err(|_| invalid("expected minutes"))?;
        minutes
            .checked_mul(60)
            .ok_or_else(|| invalid("offset out of range"))?
    };

    FixedOffset::east_opt(seconds).ok_or_else(|| invalid("offset out of range"))
}

impl EngineConfig {
    /// Build config from `OUTREACH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let db_path = std::env::var("OUTREACH_DB_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let sequences_path = std::env::var("OUTREACH_SEQUENCES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/sequences.json"));

        let mailbox_dir = std::env::var("OUTREACH_MAILBOX_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let self_address = std::env::var("OUTREACH_SELF_ADDRESS")
            .map_err(|_| ConfigError::MissingEnvVar("OUTREACH_SELF_ADDRESS".into()))?;

        let user_id = std::env::var("OUTREACH_USER").unwrap_or_else(|_| "default".to_string());

        let utc_offset = match std::env::var("OUTREACH_UTC_OFFSET") {
            Ok(raw) if !raw.trim().is_empty() => parse_utc_offset(&raw)?,
            _ => utc(),
        };

        let defaults = SchedulerConfig::default();
        let scheduler = SchedulerConfig {
            batch_size: env_parse("OUTREACH_BATCH_SIZE", DEFAULT_BATCH_SIZE)?.max(1),
            utc_offset,
            schedule: std::env::var("OUTREACH_MAINTENANCE_CRON").unwrap_or(defaults.schedule),
            tick_interval: Duration::from_secs(
                env_parse("OUTREACH_TICK_SECS", defaults.tick_interval.as_secs())?.max(1),
            ),
        };

        let cache_defaults = CacheConfig::default();
        let cache = CacheConfig {
            ttl: Duration::from_secs(env_parse(
                "OUTREACH_CACHE_TTL_SECS",
                cache_defaults.ttl.as_secs(),
            )?),
            capacity: env_parse("OUTREACH_CACHE_CAPACITY", cache_defaults.capacity)?,
            prefetch: env_parse("OUTREACH_CACHE_PREFETCH", cache_defaults.prefetch)?,
        };

        Ok(Self {
            db_path,
            sequences_path,
            mailbox_dir,
            self_address,
            user_id,
            api_port: env_parse("OUTREACH_API_PORT", 8080)?,
            scheduler,
            cache,
        })
    }
}
