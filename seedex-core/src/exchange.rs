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

//! The entropy exchange primitive
//!
//! Given peer-supplied challenge bytes, an exchange:
//!
//! 1. hashes the challenge with SHA-512,
//! 2. writes the challenge digest into the pool (failure is reported, not fatal),
//! 3. draws `read_size` bytes from the pool (failure ends the exchange),
//! 4. extends the same hash state with the drawn bytes to form the response digest.
//!
//! The write always happens before the read of the same exchange. No ordering
//! is imposed between concurrent exchanges.

use crate::pool::PoolDevice;
use crate::{Error, Result};
use bytes::Bytes;
use sha2::{Digest, Sha512};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Default number of pool bytes drawn per exchange
pub const DEFAULT_READ_SIZE: usize = 64;

/// Mixes challenges into a shared pool and derives response digests
#[derive(Clone)]
pub struct EntropyExchange {
    pool: Arc<dyn PoolDevice>,
    read_size: usize,
}

/// Successful half of an exchange
#[derive(Debug, Clone)]
pub struct SeedResponse {
    /// Hex SHA-512 over the challenge followed by the drawn pool bytes
    pub digest: String,
    /// Raw pool bytes drawn for this exchange
    pub pool_bytes: Bytes,
}

/// Everything one exchange produced
#[derive(Debug)]
pub struct ExchangeOutcome {
    /// Hex SHA-512 of the raw challenge
    pub challenge_digest: String,
    /// Set when the challenge digest could not be written into the pool
    pub write_error: Option<Error>,
    /// Response digest, or the pool read fault that prevented it
    pub response: Result<SeedResponse>,
}

impl EntropyExchange {
    pub fn new(pool: Arc<dyn PoolDevice>, read_size: usize) -> Self {
        Self { pool, read_size }
    }

    pub fn read_size(&self) -> usize {
        self.read_size
    }

    pub fn pool(&self) -> &Arc<dyn PoolDevice> {
        &self.pool
    }

    /// Run one exchange against the pool
    ///
    /// Blocks on pool I/O; async callers should run it on the blocking pool.
    #[instrument(skip_all, fields(challenge_len = challenge.len(), read_size = self.read_size))]
    pub fn mix(&self, challenge: &[u8]) -> ExchangeOutcome {
        let mut hasher = Sha512::new();
        hasher.update(challenge);
        let challenge_sum = hasher.clone().finalize();
        let challenge_digest = hex::encode(challenge_sum);

        let write_error = self
            .pool
            .absorb(&challenge_sum)
            .err()
            .map(Error::PoolWrite);

        let response = self
            .pool
            .draw(self.read_size)
            .map_err(Error::PoolRead)
            .map(|pool_bytes| {
                hasher.update(&pool_bytes);
                SeedResponse {
                    digest: hex::encode(hasher.finalize()),
                    pool_bytes,
                }
            });

        debug!(
            write_fault = write_error.is_some(),
            read_fault = response.is_err(),
            "Exchange complete"
        );

        ExchangeOutcome {
            challenge_digest,
            write_error,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{digest_hex, DIGEST_HEX_LEN, DIGEST_LEN};
    use crate::pool::{DevicePool, MemoryPool, DEFAULT_DEVICE};
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::io;

    const PORK_CHOP_SHA512: &str = "a75751ccd71ba00d7b6c3b74cc0c02373f3f26c14dfe47afd580b0d87bf9fd8cebc73ea29b1cae15586e0d118922342ea7e94d0cb73a0f918d7d8c7ec065e873";

    /// 64 bytes of pure nines
    const NINES: &str = "ninenineninenineninenineninenineninenineninenineninenineninenine";

    struct ReadOnlyPool(MemoryPool);

    impl PoolDevice for ReadOnlyPool {
        fn absorb(&self, _data: &[u8]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "write denied"))
        }

        fn draw(&self, n: usize) -> io::Result<Bytes> {
            self.0.draw(n)
        }
    }

    struct WriteOnlyPool;

    impl PoolDevice for WriteOnlyPool {
        fn absorb(&self, _data: &[u8]) -> io::Result<()> {
            Ok(())
        }

        fn draw(&self, _n: usize) -> io::Result<Bytes> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read denied"))
        }
    }

    fn urandom_exchange() -> EntropyExchange {
        let pool = DevicePool::open(DEFAULT_DEVICE).unwrap();
        EntropyExchange::new(Arc::new(pool), DEFAULT_READ_SIZE)
    }

    #[test]
    fn test_canned_pool_content() {
        let pool = MemoryPool::with_contents(NINES);
        let exchange = EntropyExchange::new(Arc::new(pool.clone()), DEFAULT_READ_SIZE);

        let outcome = exchange.mix(b"pork chop sandwiches");
        assert!(outcome.write_error.is_none());
        assert_eq!(outcome.challenge_digest, PORK_CHOP_SHA512);

        let response = outcome.response.unwrap();
        assert_eq!(response.pool_bytes.as_ref(), NINES.as_bytes());
        assert_ne!(response.digest, digest_hex(NINES.as_bytes()));

        let mut expected = Sha512::new();
        expected.update(b"pork chop sandwiches");
        expected.update(NINES);
        assert_eq!(response.digest, hex::encode(expected.finalize()));

        // Only the challenge digest is left behind, never the raw challenge
        assert_eq!(hex::encode(pool.contents()), PORK_CHOP_SHA512);
    }

    #[test]
    fn test_read_size_controls_draw() {
        let pool = MemoryPool::with_contents(NINES);
        let exchange = EntropyExchange::new(Arc::new(pool.clone()), 32);
        assert!(exchange.mix(b"xxx").response.is_ok());
        assert_eq!(pool.len(), 64 + 64 - 32);

        let pool = MemoryPool::with_contents(NINES);
        let exchange = EntropyExchange::new(Arc::new(pool.clone()), 128);
        assert!(exchange.mix(b"xxx").response.is_ok());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn test_short_pool_is_a_read_fault() {
        let pool = MemoryPool::with_contents(NINES);
        let exchange = EntropyExchange::new(Arc::new(pool), 129);
        let outcome = exchange.mix(b"xxx");
        assert!(matches!(outcome.response, Err(Error::PoolRead(_))));
        assert_eq!(outcome.challenge_digest.len(), DIGEST_HEX_LEN);
    }

    #[test]
    fn test_write_fault_is_recoverable() {
        let pool = ReadOnlyPool(MemoryPool::with_contents(NINES));
        let exchange = EntropyExchange::new(Arc::new(pool), DEFAULT_READ_SIZE);
        let outcome = exchange.mix(b"xxx");
        assert!(matches!(outcome.write_error, Some(Error::PoolWrite(_))));
        let response = outcome.response.unwrap();
        assert_ne!(response.digest, outcome.challenge_digest);
    }

    #[test]
    fn test_read_fault_is_fatal() {
        let exchange = EntropyExchange::new(Arc::new(WriteOnlyPool), DEFAULT_READ_SIZE);
        let outcome = exchange.mix(b"xxx");
        assert!(outcome.write_error.is_none());
        assert!(matches!(outcome.response, Err(Error::PoolRead(_))));
    }

    #[test]
    fn test_concurrent_exchanges_keep_digests_whole() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;
        const READ_SIZE: usize = 16;
        const TOTAL: usize = THREADS * PER_THREAD;

        // Draws consume exactly the prefill, leaving only absorbed digests
        let pool = MemoryPool::with_contents(vec![0x99u8; TOTAL * READ_SIZE]);
        let exchange = EntropyExchange::new(Arc::new(pool.clone()), READ_SIZE);

        let digests: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..THREADS)
                .map(|t| {
                    let exchange = exchange.clone();
                    scope.spawn(move || {
                        (0..PER_THREAD)
                            .map(|i| {
                                let challenge = format!("thread {} round {}", t, i);
                                let outcome = exchange.mix(challenge.as_bytes());
                                assert!(outcome.write_error.is_none());
                                assert!(outcome.response.is_ok());
                                outcome.challenge_digest
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });

        let stats = pool.stats();
        assert_eq!(stats.total_absorbs, TOTAL as u64);
        assert_eq!(stats.total_draws, TOTAL as u64);
        assert_eq!(stats.bytes_absorbed, (TOTAL * DIGEST_LEN) as u64);
        assert_eq!(stats.bytes_drawn, (TOTAL * READ_SIZE) as u64);
        assert_eq!(pool.len(), TOTAL * DIGEST_LEN);

        let expected: HashSet<String> = digests.into_iter().collect();
        let found: HashSet<String> = pool
            .contents()
            .chunks(DIGEST_LEN)
            .map(hex::encode)
            .collect();
        assert_eq!(expected.len(), TOTAL);
        assert_eq!(found, expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_not_idempotent() {
        let exchange = urandom_exchange();
        let first = exchange.mix(b"the bassomatic '76");
        let second = exchange.mix(b"the bassomatic '76");
        assert_eq!(first.challenge_digest, second.challenge_digest);
        assert_ne!(
            first.response.unwrap().digest,
            second.response.unwrap().digest
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unique_chaining() {
        const ROUNDS: usize = 100;
        let exchange = urandom_exchange();
        let mut challenges = HashSet::new();
        let mut responses = HashSet::new();
        let mut challenge = String::from("the bassomatic '76");

        for _ in 0..ROUNDS {
            let outcome = exchange.mix(challenge.as_bytes());
            let response = outcome.response.unwrap();
            challenges.insert(outcome.challenge_digest);
            responses.insert(response.digest.clone());
            challenge = response.digest;
        }

        assert_eq!(challenges.len(), ROUNDS);
        assert_eq!(responses.len(), ROUNDS);
    }

    proptest! {
        #[test]
        fn prop_digests_are_distinct_fixed_length_hex(
            challenge in proptest::collection::vec(any::<u8>(), 1..256),
            seed in proptest::collection::vec(any::<u8>(), 64),
        ) {
            let pool = MemoryPool::with_contents(seed);
            let exchange = EntropyExchange::new(Arc::new(pool), DEFAULT_READ_SIZE);
            let outcome = exchange.mix(&challenge);
            let response = outcome.response.unwrap();

            prop_assert_eq!(outcome.challenge_digest.len(), DIGEST_HEX_LEN);
            prop_assert_eq!(response.digest.len(), DIGEST_HEX_LEN);
            prop_assert!(hex::decode(&outcome.challenge_digest).is_ok());
            prop_assert!(hex::decode(&response.digest).is_ok());
            prop_assert_ne!(outcome.challenge_digest, response.digest);
        }
    }
}
