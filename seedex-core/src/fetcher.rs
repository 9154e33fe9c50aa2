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

//! HTTP client that requests seeds from a remote gateway
//!
//! Sends a freshly generated challenge, checks that the gateway hashed exactly
//! that challenge, and hands back the decoded response digest.

use crate::crypto::{decode_hex, digest_hex, encode_hex};
use crate::protocol::{ExchangeReply, CHALLENGE_FIELD};
use crate::{retry::RetryPolicy, Error, Result};
use bytes::Bytes;
use rand::Rng;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Random bytes behind each generated challenge
const CHALLENGE_BYTES: usize = 64;

/// Configuration for the seed fetcher
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Gateway URL
    pub url: Url,
    /// Request timeout
    pub timeout: Duration,
    /// Retry policy
    pub retry_policy: RetryPolicy,
    /// Refuse plain-HTTP gateways
    pub https_only: bool,
}

impl FetcherConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
            https_only: false,
        }
    }
}

/// HTTP client for requesting seeds from a gateway
#[derive(Clone)]
pub struct SeedFetcher {
    client: Client,
    config: FetcherConfig,
}

impl SeedFetcher {
    /// Create a new fetcher with configuration
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .use_rustls_tls()
            .https_only(config.https_only)
            .user_agent(concat!("seedex-seeder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(Error::Network)?;

        Ok(Self { client, config })
    }

    /// Request a seed with a fresh random challenge
    ///
    /// Transient failures are retried according to the retry policy.
    #[instrument(skip(self), fields(url = %self.config.url))]
    pub async fn fetch(&self) -> Result<Bytes> {
        self.config
            .retry_policy
            .execute(|| async {
                let challenge = generate_challenge();
                self.fetch_with_challenge(&challenge).await
            })
            .await
    }

    /// Request a seed for a caller-chosen challenge, without retry
    pub async fn fetch_with_challenge(&self, challenge: &str) -> Result<Bytes> {
        debug!("Sending challenge to {}", self.config.url);

        let response = self
            .client
            .post(self.config.url.clone())
            .form(&[(CHALLENGE_FIELD, challenge)])
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach {}: {}", self.config.url, e);
                if e.is_timeout() {
                    Error::Timeout
                } else {
                    Error::Network(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("HTTP error {}: {}", status, body.trim_end());
            return Err(Error::Validation(format!("HTTP {}: {}", status, body.trim_end())));
        }

        let body = response.text().await.map_err(Error::Network)?;
        let seed = verify_reply(challenge, &body)?;

        debug!("Received {} byte seed", seed.len());
        Ok(seed)
    }

    /// Get fetcher configuration
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }
}

/// Hex encoding of fresh random bytes
fn generate_challenge() -> String {
    let mut raw = [0u8; CHALLENGE_BYTES];
    rand::thread_rng().fill(&mut raw[..]);
    encode_hex(&raw)
}

/// Check that the gateway hashed our challenge and decode its response digest
fn verify_reply(challenge: &str, body: &str) -> Result<Bytes> {
    let reply = ExchangeReply::parse(body)?;
    if reply.challenge_digest != digest_hex(challenge.as_bytes()) {
        return Err(Error::Validation(
            "Gateway returned a digest for a different challenge".to_string(),
        ));
    }
    if reply.response_digest == reply.challenge_digest {
        return Err(Error::Validation(
            "Gateway echoed the challenge digest as its response".to_string(),
        ));
    }
    Ok(Bytes::from(decode_hex(&reply.response_digest)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DIGEST_LEN;
    use mockito::Matcher;

    const PORK_CHOP_SHA512: &str = "a75751ccd71ba00d7b6c3b74cc0c02373f3f26c14dfe47afd580b0d87bf9fd8cebc73ea29b1cae15586e0d118922342ea7e94d0cb73a0f918d7d8c7ec065e873";

    fn seed_line() -> String {
        "5e".repeat(DIGEST_LEN)
    }

    fn fetcher_for(url: &str) -> SeedFetcher {
        let mut config = FetcherConfig::new(Url::parse(url).unwrap());
        config.retry_policy = RetryPolicy {
            jitter: false,
            ..RetryPolicy::new(2, Duration::from_millis(1))
        };
        SeedFetcher::new(config).unwrap()
    }

    #[test]
    fn test_generated_challenges_are_fresh() {
        let a = generate_challenge();
        let b = generate_challenge();
        assert_eq!(a.len(), CHALLENGE_BYTES * 2);
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_reply() {
        let body = format!("{}\n{}\n", PORK_CHOP_SHA512, seed_line());
        let seed = verify_reply("pork chop sandwiches", &body).unwrap();
        assert_eq!(seed.as_ref(), &[0x5e; DIGEST_LEN][..]);

        assert!(verify_reply("another challenge", &body).is_err());

        let echoed = format!("{}\n{}\n", PORK_CHOP_SHA512, PORK_CHOP_SHA512);
        assert!(verify_reply("pork chop sandwiches", &echoed).is_err());
    }

    #[tokio::test]
    async fn test_fetch_with_challenge() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::UrlEncoded(
                "challenge".into(),
                "pork chop sandwiches".into(),
            ))
            .with_status(200)
            .with_body(format!("{}\n{}\n", PORK_CHOP_SHA512, seed_line()))
            .create_async()
            .await;

        let fetcher = fetcher_for(&format!("{}/", server.url()));
        let seed = fetcher
            .fetch_with_challenge("pork chop sandwiches")
            .await
            .unwrap();

        assert_eq!(seed.len(), DIGEST_LEN);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_rejects_foreign_digest() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body(format!("{}\n{}\n", PORK_CHOP_SHA512, seed_line()))
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher_for(&format!("{}/", server.url()));
        let err = fetcher.fetch().await.unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_surfaces_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("Failed to read from random device")
            .create_async()
            .await;

        let fetcher = fetcher_for(&format!("{}/", server.url()));
        let err = fetcher
            .fetch_with_challenge("pork chop sandwiches")
            .await
            .unwrap_err();

        assert!(err.to_string().contains("500"));
    }
}
