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

//! Error types for the seedex system
//!
//! Provides a unified error taxonomy using `thiserror` for ergonomic error handling.

pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for entropy exchange operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration validation failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writing into the entropy pool failed (recoverable)
    #[error("Pool write failed: {0}")]
    PoolWrite(#[source] std::io::Error),

    /// Reading from the entropy pool failed (fatal to the exchange)
    #[error("Pool read failed: {0}")]
    PoolRead(#[source] std::io::Error),

    /// Network communication failed
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Data validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,
}

impl Error {
    /// Check if error is transient and retryable
    ///
    /// Pool faults are never retryable: a single failed read ends the exchange.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Network(_) | Error::Timeout)
    }

    /// Check if error originated from the entropy pool
    pub fn is_pool_fault(&self) -> bool {
        matches!(self, Error::PoolWrite(_) | Error::PoolRead(_))
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}
