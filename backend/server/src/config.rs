use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{engine::EngineSettings, keys::DEFAULT_PREFIX};

pub const MEMORY_STORE_URL: &str = "memory://";

pub struct Config {
    pub port: u16,
    pub store_url: String,
    pub key_prefix: String,
    pub vote_window_secs: i64,
    pub vote_weight: f64,
    pub cache_ttl_secs: u64,
    pub store_timeout_ms: u64,
    pub vote_lock_shards: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            port: try_load("RUST_PORT", "1111")?,
            store_url: try_load("STORE_URL", "redis://127.0.0.1:6379")?,
            key_prefix: try_load("KEY_PREFIX", DEFAULT_PREFIX)?,
            vote_window_secs: try_load("VOTE_WINDOW_SECS", "604800")?,
            vote_weight: try_load("VOTE_WEIGHT", "432")?,
            cache_ttl_secs: try_load("CACHE_TTL_SECS", "60")?,
            store_timeout_ms: try_load("STORE_TIMEOUT_MS", "500")?,
            vote_lock_shards: try_load("VOTE_LOCK_SHARDS", "64")?,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.store_url == MEMORY_STORE_URL
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            key_prefix: self.key_prefix.clone(),
            vote_window_secs: self.vote_window_secs,
            vote_weight: self.vote_weight,
            cache_ttl_secs: self.cache_ttl_secs,
            vote_lock_shards: self.vote_lock_shards.max(1),
            vote_commit_timeout: self.store_timeout(),
        }
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key)
        .map_err(|_| {
            warn!("Environment variable {key} not found, using default");
        })
        .ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value: {raw}"))
}
