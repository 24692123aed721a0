use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use soko_chat::config::{DEFAULT_MAX_ATTACHMENT_BYTES, DEFAULT_SUBSCRIPTION_BUFFER};
use soko_chat::{ChatConfig, ReadRetry};

/// Used when `RUST_LOG` is unset. Targets are crate names, so each
/// workspace crate is listed on its own.
pub const DEFAULT_LOG_FILTER: &str =
    "soko=debug,soko_api=debug,soko_chat=debug,soko_db=debug,tower_http=debug";

/// Placeholder JWT secrets that must never reach production.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub blob_dir: PathBuf,
    pub public_url: String,
    pub jwt_secret: String,
    pub max_attachment_bytes: usize,
    pub sweep_interval_secs: u64,
    pub read_retry_attempts: u32,
    pub read_retry_base: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let host = lookup("SOKO_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or(&lookup, "SOKO_PORT", 3000)?;

        Ok(Self {
            public_url: lookup("SOKO_PUBLIC_URL")
                .unwrap_or_else(|| format!("http://localhost:{}", port)),
            host,
            port,
            db_path: lookup("SOKO_DB_PATH").unwrap_or_else(|| "soko.db".into()).into(),
            blob_dir: lookup("SOKO_BLOB_DIR")
                .unwrap_or_else(|| "./blob-storage".into())
                .into(),
            jwt_secret: lookup("SOKO_JWT_SECRET").unwrap_or_default(),
            max_attachment_bytes: parse_or(
                &lookup,
                "SOKO_MAX_ATTACHMENT_BYTES",
                DEFAULT_MAX_ATTACHMENT_BYTES,
            )?,
            sweep_interval_secs: parse_or(&lookup, "SOKO_SWEEP_INTERVAL_SECS", 3600)?,
            read_retry_attempts: parse_or(&lookup, "SOKO_READ_RETRY_ATTEMPTS", 4)?,
            read_retry_base: Duration::from_millis(parse_or(
                &lookup,
                "SOKO_READ_RETRY_BASE_MS",
                100,
            )?),
        })
    }

    pub fn has_usable_secret(&self) -> bool {
        !self.jwt_secret.is_empty() && !PLACEHOLDER_SECRETS.contains(&self.jwt_secret.as_str())
    }

    pub fn chat_config(&self) -> ChatConfig {
        ChatConfig {
            max_attachment_bytes: self.max_attachment_bytes,
            read_retry: ReadRetry {
                attempts: self.read_retry_attempts.max(1),
                base_delay: self.read_retry_base,
                ..ReadRetry::default()
            },
            subscription_buffer: DEFAULT_SUBSCRIPTION_BUFFER,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", key, raw)),
        None => Ok(default),
    }
}
