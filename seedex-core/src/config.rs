// SPDX-License-Identifier: MIT
//
// Seedex: Network Entropy Exchange
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara
//
// https://github.com/vbocan/qrng-data-diode

//! Configuration management for seedex components

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable prefix shared by every component
pub const ENV_PREFIX: &str = "SEEDEX";

/// Load a configuration file (YAML, TOML or JSON by extension), letting
/// `SEEDEX_*` environment variables override individual keys
fn load_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix(ENV_PREFIX))
        .build()?;
    Ok(settings.try_deserialize()?)
}

fn load_env<T: DeserializeOwned>() -> Result<T> {
    envy::prefixed(format!("{}_", ENV_PREFIX))
        .from_env()
        .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))
}

fn validate_read_size(read_size: usize) -> Result<()> {
    if read_size == 0 || read_size > crate::MAX_READ_SIZE {
        return Err(Error::Config(format!(
            "read_size must be between 1 and {}",
            crate::MAX_READ_SIZE
        )));
    }
    Ok(())
}

fn validate_address(name: &str, address: &str) -> Result<SocketAddr> {
    address
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {} '{}': {}", name, address, e)))
}

/// HTTP(S) gateway configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Bind address for the plain HTTP listener
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Bind address for the HTTPS listener (disabled when unset)
    #[serde(default)]
    pub tls_listen_address: Option<String>,

    /// PEM certificate chain for HTTPS
    #[serde(default = "default_tls_cert_path")]
    pub tls_cert_path: PathBuf,

    /// PEM private key for HTTPS
    #[serde(default = "default_tls_key_path")]
    pub tls_key_path: PathBuf,

    /// Entropy pool device
    #[serde(default = "default_device")]
    pub device: PathBuf,

    /// Pool bytes drawn per exchange
    #[serde(default = "default_read_size")]
    pub read_size: usize,

    /// Serve Prometheus metrics on /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            tls_listen_address: None,
            tls_cert_path: default_tls_cert_path(),
            tls_key_path: default_tls_key_path(),
            device: default_device(),
            read_size: default_read_size(),
            metrics_enabled: true,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config: Self = load_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_read_size(self.read_size)?;
        validate_address("listen_address", &self.listen_address)?;
        if let Some(tls) = &self.tls_listen_address {
            validate_address("tls_listen_address", tls)?;
        }
        Ok(())
    }
}

/// UDP broadcast stirrer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StirrerConfig {
    /// Entropy pool device
    #[serde(default = "default_device")]
    pub device: PathBuf,

    /// Pool bytes drawn per exchange and per broadcast
    #[serde(default = "default_read_size")]
    pub read_size: usize,

    /// Well-known UDP port for both roles
    #[serde(default = "default_stir_port")]
    pub port: u16,

    /// Seconds between broadcasts; zero or negative disables the client role
    #[serde(default = "default_interval_secs")]
    pub interval_secs: i64,

    /// How long to collect replies after each broadcast (defaults to the interval)
    #[serde(default)]
    pub reply_wait_ms: Option<u64>,

    /// Destination of client broadcasts
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: Ipv4Addr,

    /// Largest datagram accepted by either role
    #[serde(default = "default_datagram_size")]
    pub datagram_size: usize,
}

impl Default for StirrerConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            read_size: default_read_size(),
            port: default_stir_port(),
            interval_secs: default_interval_secs(),
            reply_wait_ms: None,
            broadcast_address: default_broadcast_address(),
            datagram_size: default_datagram_size(),
        }
    }
}

impl StirrerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config: Self = load_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_read_size(self.read_size)?;
        if self.datagram_size == 0 || self.datagram_size > crate::MAX_DATAGRAM_SIZE {
            return Err(Error::Config(format!(
                "datagram_size must be between 1 and {}",
                crate::MAX_DATAGRAM_SIZE
            )));
        }
        if self.read_size > crate::MAX_DATAGRAM_SIZE {
            return Err(Error::Config(
                "read_size must fit in a single datagram".to_string(),
            ));
        }
        Ok(())
    }

    /// Broadcast interval, or `None` when the client role is disabled
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs as u64))
    }

    /// Reply collection window, never longer than the interval
    pub fn reply_wait(&self) -> Option<Duration> {
        let interval = self.interval()?;
        Some(match self.reply_wait_ms {
            Some(ms) => Duration::from_millis(ms).min(interval),
            None => interval,
        })
    }

    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::from((self.broadcast_address, self.port))
    }
}

/// Seeder configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeederConfig {
    /// Gateways to request seeds from
    #[serde(default)]
    pub gateway_urls: Vec<String>,

    /// Entropy pool device that absorbs fetched seeds
    #[serde(default = "default_device")]
    pub device: PathBuf,

    /// Request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum retry attempts per gateway
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Refuse plain-HTTP gateways
    #[serde(default)]
    pub https_only: bool,
}

impl SeederConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config: Self = load_env()?;

        // Handle comma-separated GATEWAY_URLS if provided as single string
        if config.gateway_urls.is_empty() {
            if let Ok(urls) = std::env::var("SEEDEX_GATEWAY_URLS") {
                config.gateway_urls = urls
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config: Self = load_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.gateway_urls.is_empty() {
            return Err(Error::Config(
                "Must provide at least one gateway URL via SEEDEX_GATEWAY_URLS".to_string(),
            ));
        }

        for url in &self.gateway_urls {
            let parsed = Url::parse(url)
                .map_err(|e| Error::Config(format!("Invalid gateway URL '{}': {}", url, e)))?;
            if self.https_only && parsed.scheme() != "https" {
                return Err(Error::Config(format!(
                    "Gateway URL '{}' is not HTTPS but https_only is set",
                    url
                )));
            }
        }

        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_string()));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

// Default value functions
fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_tls_cert_path() -> PathBuf {
    PathBuf::from("/etc/seedex/cert.pem")
}

fn default_tls_key_path() -> PathBuf {
    PathBuf::from("/etc/seedex/key.pem")
}

fn default_device() -> PathBuf {
    PathBuf::from(crate::pool::DEFAULT_DEVICE)
}

fn default_read_size() -> usize {
    crate::exchange::DEFAULT_READ_SIZE
}

fn default_stir_port() -> u16 {
    crate::protocol::DEFAULT_STIR_PORT
}

fn default_interval_secs() -> i64 {
    60
}

fn default_broadcast_address() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_datagram_size() -> usize {
    64
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}
