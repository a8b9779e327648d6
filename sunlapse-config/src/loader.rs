//! Environment-variable loading.
//!
//! Every documented variable overrides one field of the default [`Config`];
//! anything unset keeps its default. Parsing failures are hard errors so a
//! cron deployment fails loudly instead of running with a typo'd value.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::models::Config;
use crate::validation::{self, ConfigWarnings};

/// Parse `$key` if set and non-empty.
fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("invalid {key}: {raw:?}"))?;
            Ok(Some(value))
        }
        _ => Ok(None),
    }
}

impl Config {
    /// Build a config from defaults plus environment overrides, then run
    /// the guard rails. Returns the config together with any non-fatal
    /// warnings for the caller to log.
    pub fn load_from_env() -> Result<(Self, ConfigWarnings)> {
        let mut config = Config::default();

        if let Some(dir) = env_parse::<PathBuf>("BASE_DIR")? {
            config.storage.base_dir = dir;
        }
        if let Some(base) = env_parse::<String>("UPSTREAM_BASE")? {
            config.fetch.upstream_base = base;
        }
        if let Some(n) = env_parse::<usize>("FETCH_CONCURRENCY")? {
            config.fetch.concurrency = n;
        }
        if let Some(n) = env_parse::<usize>("COMPOSITE_CONCURRENCY")? {
            config.composite.concurrency = n;
        }
        if let Some(fps) = env_parse::<u32>("FPS")? {
            config.encode.fps = fps;
        }
        if let Some(crf) = env_parse::<u8>("CRF")? {
            config.encode.crf = crf;
        }
        if let Some(preset) = env_parse::<String>("PRESET")? {
            config.encode.preset = preset;
        }
        if let Some(days) = env_parse::<u32>("SAFE_DELAY_DAYS")? {
            config.window.safe_delay_days = days;
        }
        if let Some(days) = env_parse::<u32>("TOTAL_DAYS")? {
            config.window.total_days = days;
        }
        if let Some(minutes) = env_parse::<u32>("INTERVAL_MINUTES")? {
            config.window.interval_minutes = minutes;
        }

        let warnings = validation::validate(&config)?;
        Ok((config, warnings))
    }
}
