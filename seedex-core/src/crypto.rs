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

//! Digest, checksum and salt primitives shared by both transport bindings

use crate::{Error, Result};
use chrono::Utc;
use sha2::{Digest, Sha512};

/// Size of a SHA-512 digest in bytes
pub const DIGEST_LEN: usize = 64;

/// Size of a hex-encoded digest in characters
pub const DIGEST_HEX_LEN: usize = DIGEST_LEN * 2;

/// Compute the lowercase hex SHA-512 digest of `data`
pub fn digest_hex(data: &[u8]) -> String {
    hex::encode(Sha512::digest(data))
}

/// Encode bytes to lowercase hexadecimal
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode hexadecimal string to bytes
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| Error::Validation(format!("Invalid hex: {}", e)))
}

/// Unsigned byte sum of a datagram, used to fingerprint payloads in logs
pub fn byte_sum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

/// Time-derived 64-bit nonce mixed into the pool alongside peer replies
///
/// Each call to [`Salt::next`] folds the current wall-clock microseconds into
/// the previous value with XOR. The first call seeds the state from `rand`.
#[derive(Debug, Clone, Default)]
pub struct Salt {
    state: u64,
}

impl Salt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the salt and return its new value
    pub fn next(&mut self) -> u64 {
        let micros = Utc::now().timestamp_micros() as u64;
        if self.state == 0 {
            self.state = rand::random();
        }
        self.state = fold_salt(self.state, micros);
        self.state
    }

    /// Current salt as raw native-endian bytes
    pub fn to_bytes(&self) -> [u8; 8] {
        self.state.to_ne_bytes()
    }
}

/// Fold a microsecond timestamp into a previous salt (wraps, never errors)
pub fn fold_salt(prev: u64, micros: u64) -> u64 {
    prev ^ micros
}
