use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::db::DbConfig;
use crate::engine::DEFAULT_OPERATION_TIMEOUT;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    /// Deadline applied to every engine operation.
    pub operation_timeout: Duration,
    pub database: DbConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("REVIEWER_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .context("REVIEWER_LISTEN_ADDR is not a socket address")?;

        let log_level = std::env::var("REVIEWER_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("REVIEWER_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let operation_timeout = match std::env::var("REVIEWER_OPERATION_TIMEOUT_SECS") {
            Ok(raw) => parse_timeout_secs(&raw)?,
            Err(_) => DEFAULT_OPERATION_TIMEOUT,
        };

        let database = DbConfig::from_env();

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            operation_timeout,
            database,
        })
    }
}

fn parse_timeout_secs(raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("REVIEWER_OPERATION_TIMEOUT_SECS must be an integer, got {raw:?}"))?;
    anyhow::ensure!(secs > 0, "REVIEWER_OPERATION_TIMEOUT_SECS must be positive");
    Ok(Duration::from_secs(secs))
}
