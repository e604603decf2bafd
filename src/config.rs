use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{CaptureOptions, DEFAULT_READ_TIMEOUT, DEFAULT_SNAPLEN};
use crate::error::ConfigError;
use crate::publisher::{PayloadFormat, PublisherConfig};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/pktstream.conf";
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;
const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 2000;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Interface to capture on; first available when unset
    pub interface: Option<String>,
    /// Kafka REST proxy base URL; records are only logged when unset
    pub broker_url: Option<String>,
    pub queue_capacity: usize,
    pub read_timeout_ms: u64,
    pub snaplen: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub drain_timeout_ms: u64,
    pub payload: PayloadFormat,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interface: None,
            broker_url: None,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            snaplen: DEFAULT_SNAPLEN,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            payload: PayloadFormat::Label,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Load from `PKTSTREAM_CONFIG` (or the default path), then apply
    /// environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("PKTSTREAM_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load_from(&path)
    }

    /// Load from a specific file. A missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            config.apply_file(&content)?;
        }

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, content: &str) -> Result<(), ConfigError> {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                self.set(key.trim(), value.trim())?;
            }
        }
        Ok(())
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        const OVERRIDES: [(&str, &str); 6] = [
            ("PKTSTREAM_INTERFACE", "interface"),
            ("PKTSTREAM_BROKER_URL", "broker_url"),
            ("PKTSTREAM_QUEUE_CAPACITY", "queue_capacity"),
            ("PKTSTREAM_READ_TIMEOUT_MS", "read_timeout_ms"),
            ("PKTSTREAM_PAYLOAD", "payload"),
            ("PKTSTREAM_LOG_LEVEL", "log_level"),
        ];

        for (var, key) in OVERRIDES {
            if let Some(value) = lookup(var) {
                self.set(key, value.trim())
                    .map_err(|e| ConfigError::Invalid(format!("{}: {}", var, e)))?;
            }
        }
        Ok(())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "interface" => self.interface = non_empty(value),
            "broker_url" => self.broker_url = non_empty(value),
            "queue_capacity" => self.queue_capacity = parse(key, value)?,
            "read_timeout_ms" => self.read_timeout_ms = parse(key, value)?,
            "snaplen" => self.snaplen = parse(key, value)?,
            "max_retries" => self.max_retries = parse(key, value)?,
            "retry_backoff_ms" => self.retry_backoff_ms = parse(key, value)?,
            "drain_timeout_ms" => self.drain_timeout_ms = parse(key, value)?,
            "payload" => {
                self.payload = value.parse().map_err(ConfigError::Invalid)?;
            }
            "log_level" => self.log_level = value.to_string(),
            _ => {}
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".to_string()));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::Invalid("read_timeout_ms must be at least 1".to_string()));
        }
        if self.snaplen == 0 {
            return Err(ConfigError::Invalid("snaplen must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            snaplen: self.snaplen,
            promiscuous: true,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }

    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            queue_capacity: self.queue_capacity,
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            payload: self.payload,
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Filter directive for the tracing subscriber.
    pub fn tracing_filter(&self) -> String {
        format!("pktstream={}", self.log_level)
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("Invalid {}: {}", key, value)))
}
