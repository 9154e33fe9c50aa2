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

//! Wire formats for the HTTP binding
//!
//! A successful reply is plain text, exactly two newline-terminated lines:
//! the challenge digest followed by the response digest, both lowercase hex.
//! The UDP binding has no framing at all and carries raw pool bytes.

use crate::crypto::DIGEST_HEX_LEN;
use crate::{Error, Result};
use percent_encoding::percent_decode;

/// Form/query field carrying the challenge
pub const CHALLENGE_FIELD: &str = "challenge";

/// Body returned when a request carries no challenge
pub const MISSING_CHALLENGE_MESSAGE: &str =
    "Please send a challenge, e.g. GET /?challenge=<unpredictable string> or POST challenge=<unpredictable string>";

/// Body returned when the pool cannot be read
pub const READ_FAILURE_MESSAGE: &str = "Failed to read from random device";

/// Content type of every HTTP reply
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Default UDP port of the broadcast binding
pub const DEFAULT_STIR_PORT: u16 = 26373;

/// First non-empty `challenge` value in an urlencoded query or form body
///
/// Values are percent-decoded to raw bytes; nothing is assumed about their
/// encoding, so a challenge that is not UTF-8 reaches the pool unchanged.
pub fn find_challenge(encoded: &[u8]) -> Option<Vec<u8>> {
    encoded
        .split(|&b| b == b'&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, |&b| b == b'=');
            let name = parts.next()?;
            let value = parts.next().unwrap_or_default();
            if decode_component(name) == CHALLENGE_FIELD.as_bytes() {
                Some(decode_component(value))
            } else {
                None
            }
        })
        .find(|value| !value.is_empty())
}

fn decode_component(raw: &[u8]) -> Vec<u8> {
    let spaced: Vec<u8> = raw
        .iter()
        .map(|&b| if b == b'+' { b' ' } else { b })
        .collect();
    percent_decode(&spaced).collect()
}

/// Successful HTTP exchange reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReply {
    pub challenge_digest: String,
    pub response_digest: String,
}

impl ExchangeReply {
    pub fn new(challenge_digest: impl Into<String>, response_digest: impl Into<String>) -> Self {
        Self {
            challenge_digest: challenge_digest.into(),
            response_digest: response_digest.into(),
        }
    }

    /// Render the two-line reply body
    pub fn to_body(&self) -> String {
        format!("{}\n{}\n", self.challenge_digest, self.response_digest)
    }

    /// Parse and validate a reply body
    pub fn parse(body: &str) -> Result<Self> {
        let mut lines = body.lines();
        let challenge_digest = lines
            .next()
            .ok_or_else(|| Error::Validation("Missing challenge digest line".to_string()))?;
        let response_digest = lines
            .next()
            .ok_or_else(|| Error::Validation("Missing response digest line".to_string()))?;

        for line in [challenge_digest, response_digest] {
            if line.len() != DIGEST_HEX_LEN || !line.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(Error::Validation(format!(
                    "Expected {} hex characters, got '{}'",
                    DIGEST_HEX_LEN, line
                )));
            }
        }

        Ok(Self::new(
            challenge_digest.to_ascii_lowercase(),
            response_digest.to_ascii_lowercase(),
        ))
    }
}
