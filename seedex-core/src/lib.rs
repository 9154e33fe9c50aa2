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

//! Seedex Core Library
//!
//! Entropy-as-a-service: a requester contributes unpredictable challenge bytes
//! and receives a freshly derived seed, while the challenge is stirred into a
//! shared local entropy pool. This crate holds the transport-independent parts;
//! the HTTP and UDP bindings live in `seedex-gateway` and `seedex-stirrer`.
//!
//! # Architecture
//!
//! - `exchange`: the mix-then-derive exchange primitive
//! - `pool`: pool device abstraction (kernel device, in-memory FIFO)
//! - `log`: severity-leveled protocol event log
//! - `crypto`: SHA-512 digests, datagram checksums, time-derived salt
//! - `protocol`: reply body format and fixed messages
//! - `config`: configuration management with validation
//! - `fetcher`: HTTP client that requests seeds from a remote gateway
//! - `error`: unified error types

pub mod config;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod fetcher;
pub mod log;
pub mod metrics;
pub mod pool;
pub mod protocol;
pub mod retry;

pub use error::{Error, Result};
pub use exchange::{EntropyExchange, ExchangeOutcome, SeedResponse};
pub use log::{EventLog, MemoryLog, TracingLog};
pub use pool::{DevicePool, MemoryPool, PoolDevice};

/// Library version for protocol compatibility
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest pool draw a single exchange may request (64 KiB)
pub const MAX_READ_SIZE: usize = 65_536;

/// Largest UDP payload either stirrer role will handle
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
