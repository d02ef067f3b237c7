use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct MeterConfig {
    pub server_host: String,
    pub server_port: u16,
    pub data_dir: PathBuf,
    pub store_timeout_ms: u64,
    pub reaper_interval_secs: u64,
    pub window_retention_secs: u64,
    pub tier_cache_capacity: usize,
    pub tier_cache_ttl_secs: u64,
    pub pricing_file: Option<PathBuf>,
    pub log_level: String,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 8187,
            data_dir: PathBuf::from("data/meter"),
            store_timeout_ms: 2_000,
            reaper_interval_secs: 300,
            window_retention_secs: 7 * 86_400,
            tier_cache_capacity: 10_000,
            tier_cache_ttl_secs: 60,
            pricing_file: None,
            log_level: "info".to_string(),
        }
    }
}

impl MeterConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(host) = env::var("METER_HOST") {
            cfg.server_host = host;
        }
        if let Ok(port) = env::var("METER_PORT") {
            cfg.server_port = port.parse().context("METER_PORT must be a valid u16")?;
        }
        if let Ok(dir) = env::var("METER_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Ok(timeout) = env::var("STORE_TIMEOUT_MS") {
            cfg.store_timeout_ms = timeout
                .parse()
                .context("STORE_TIMEOUT_MS must be a positive integer")?;
        }
        if let Ok(interval) = env::var("REAPER_INTERVAL_SECS") {
            cfg.reaper_interval_secs = interval
                .parse()
                .context("REAPER_INTERVAL_SECS must be a positive integer")?;
        }
        if let Ok(retention) = env::var("WINDOW_RETENTION_SECS") {
            cfg.window_retention_secs = retention
                .parse()
                .context("WINDOW_RETENTION_SECS must be a positive integer")?;
        }
        if let Ok(capacity) = env::var("TIER_CACHE_CAPACITY") {
            cfg.tier_cache_capacity = capacity
                .parse()
                .context("TIER_CACHE_CAPACITY must be a positive integer")?;
        }
        if let Ok(ttl) = env::var("TIER_CACHE_TTL_SECS") {
            cfg.tier_cache_ttl_secs = ttl
                .parse()
                .context("TIER_CACHE_TTL_SECS must be a positive integer")?;
        }
        if let Ok(path) = env::var("PRICING_FILE") {
            cfg.pricing_file = Some(PathBuf::from(path));
        }
        if let Ok(level) = env::var("LOG_LEVEL") {
            cfg.log_level = level;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        ensure_directory(&self.data_dir)?;

        if self.store_timeout_ms == 0 {
            anyhow::bail!("STORE_TIMEOUT_MS must be greater than zero");
        }
        if self.reaper_interval_secs == 0 {
            anyhow::bail!("REAPER_INTERVAL_SECS must be greater than zero");
        }
        if self.window_retention_secs < 86_400 {
            anyhow::bail!("WINDOW_RETENTION_SECS must cover at least one day window");
        }
        if self.tier_cache_capacity == 0 {
            anyhow::bail!("TIER_CACHE_CAPACITY must be greater than zero");
        }
        if let Some(path) = &self.pricing_file {
            if !path.is_file() {
                anyhow::bail!("PRICING_FILE {} does not exist", path.display());
            }
        }

        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn window_retention(&self) -> Duration {
        Duration::from_secs(self.window_retention_secs)
    }

    pub fn tier_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.tier_cache_ttl_secs)
    }
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            anyhow::bail!("{} exists but is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path)
            .with_context(|| format!("unable to create data directory {}", path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &Path) -> MeterConfig {
        MeterConfig {
            data_dir: dir.to_path_buf(),
            ..MeterConfig::default()
        }
    }

    #[test]
    fn default_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        config_in(dir.path()).validate().unwrap();
    }

    #[test]
    fn zero_store_timeout_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config_in(dir.path());
        cfg.store_timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn retention_below_one_day_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config_in(dir.path());
        cfg.window_retention_secs = 3_600;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn missing_pricing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config_in(dir.path());
        cfg.pricing_file = Some(dir.path().join("nope.json"));
        assert!(cfg.validate().is_err());
    }
}
