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

//! Seedex Seeder - one-shot pool seeding from remote gateways
//!
//! Meant to run once at boot, before anything reads from the pool.
//!
//! ```text
//! ┌──────────────┐   POST challenge   ┌──────────────┐
//! │    Seeder    │ ─────────────────> │   Gateway    │
//! │              │ <───────────────── │   (remote)   │
//! └──────────────┘   two digests      └──────────────┘
//!        │
//!   response digest
//!        v
//!   local pool
//! ```
//!
//! Every configured gateway is tried in turn. The run fails only if no
//! gateway contributed a seed.

use anyhow::{Context, Result};
use clap::Parser;
use seedex_core::{
    config::SeederConfig,
    fetcher::{FetcherConfig, SeedFetcher},
    retry::RetryPolicy,
    DevicePool, EventLog, PoolDevice, TracingLog,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "seedex-seeder")]
#[command(about = "Seedex Seeder - Seeds the local pool from remote gateways", long_about = None)]
struct Args {
    /// Path to configuration file (ignored if --env-mode is set)
    #[arg(short, long, default_value = "config/seeder.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Load configuration from environment variables instead of file
    #[arg(long, default_value = "false")]
    env_mode: bool,
}

fn build_fetchers(config: &SeederConfig) -> Result<Vec<SeedFetcher>> {
    config
        .gateway_urls
        .iter()
        .map(|raw| {
            let url = Url::parse(raw).with_context(|| format!("Invalid gateway URL: {}", raw))?;
            let fetcher_config = FetcherConfig {
                url,
                timeout: config.request_timeout(),
                retry_policy: RetryPolicy::new(config.max_retries, config.initial_backoff()),
                https_only: config.https_only,
            };
            SeedFetcher::new(fetcher_config)
                .with_context(|| format!("Failed to create client for {}", raw))
        })
        .collect()
}

/// Fetch from every gateway and absorb each seed; returns how many landed
async fn seed_pool(
    fetchers: &[SeedFetcher],
    pool: Arc<dyn PoolDevice>,
    log: &dyn EventLog,
) -> usize {
    let mut seeded = 0;

    for fetcher in fetchers {
        let url = fetcher.config().url.clone();

        let seed = match fetcher.fetch().await {
            Ok(seed) => seed,
            Err(e) => {
                log.error(&format!("Cannot fetch seed from [{}]: {}", url, e));
                continue;
            }
        };

        let len = seed.len();
        let pool = Arc::clone(&pool);
        let absorbed = tokio::task::spawn_blocking(move || pool.absorb(&seed)).await;

        match absorbed {
            Ok(Ok(())) => {
                log.info(&format!("Seeded pool with [{}] bytes from [{}]", len, url));
                seeded += 1;
            }
            Ok(Err(e)) => {
                log.error(&format!("Cannot write to random device: {}", e));
            }
            Err(e) => {
                log.critical(&format!("Pool write task failed: {}", e));
            }
        }
    }

    seeded
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing
    let log_level = args
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .json()
        .init();

    info!("Seedex Seeder v{}", env!("CARGO_PKG_VERSION"));

    let config = if args.env_mode {
        info!("Loading configuration from environment variables");
        SeederConfig::from_env().context("Failed to load configuration from environment")?
    } else {
        info!("Loading configuration from file: {:?}", args.config);
        SeederConfig::from_file(&args.config).context("Failed to load configuration from file")?
    };

    info!("Pool device: {:?}", config.device);
    info!("Gateways: {}", config.gateway_urls.len());

    let pool = DevicePool::open(&config.device)
        .with_context(|| format!("Failed to open pool device {:?}", config.device))?;
    let fetchers = build_fetchers(&config)?;
    let log = TracingLog;

    let seeded = seed_pool(&fetchers, Arc::new(pool), &log).await;
    log.close();

    if seeded == 0 {
        anyhow::bail!("No gateway contributed a seed");
    }

    info!("Seeded from {} of {} gateways", seeded, fetchers.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use seedex_core::crypto::{digest_hex, DIGEST_LEN};
    use seedex_core::log::Severity;
    use seedex_core::{MemoryLog, MemoryPool};

    fn config_for(urls: Vec<String>) -> SeederConfig {
        SeederConfig {
            gateway_urls: urls,
            device: PathBuf::from("/dev/null"),
            request_timeout_ms: 2_000,
            max_retries: 1,
            initial_backoff_ms: 1,
            https_only: false,
        }
    }

    async fn honest_gateway(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body_from_request(|request| {
                let body = request.utf8_lossy_body().unwrap_or_default();
                let challenge = body.strip_prefix("challenge=").unwrap_or_default();
                format!("{}\n{}\n", digest_hex(challenge.as_bytes()), "5e".repeat(DIGEST_LEN))
                    .into_bytes()
            })
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_seed_lands_in_pool() {
        let mut server = mockito::Server::new_async().await;
        let mock = honest_gateway(&mut server).await;

        let fetchers = build_fetchers(&config_for(vec![format!("{}/", server.url())])).unwrap();
        let pool = MemoryPool::new();
        let log = MemoryLog::new();

        let seeded = seed_pool(&fetchers, Arc::new(pool.clone()), &log).await;

        assert_eq!(seeded, 1);
        assert_eq!(pool.contents().as_ref(), &[0x5e; DIGEST_LEN][..]);
        assert!(log.entries()[0].matches(Severity::Info, "Seeded pool with [64] bytes"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_gateway_is_skipped() {
        let mut broken = mockito::Server::new_async().await;
        let _broken = broken
            .mock("POST", "/")
            .with_status(500)
            .with_body("Failed to read from random device")
            .create_async()
            .await;
        let mut honest = mockito::Server::new_async().await;
        let _honest = honest_gateway(&mut honest).await;

        let fetchers = build_fetchers(&config_for(vec![
            format!("{}/", broken.url()),
            format!("{}/", honest.url()),
        ]))
        .unwrap();
        let pool = MemoryPool::new();
        let log = MemoryLog::new();

        let seeded = seed_pool(&fetchers, Arc::new(pool.clone()), &log).await;

        assert_eq!(seeded, 1);
        assert_eq!(pool.len(), DIGEST_LEN);
        let entries = log.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].matches(Severity::Error, "Cannot fetch seed from"));
        assert!(entries[1].matches(Severity::Info, "Seeded pool"));
    }

    #[tokio::test]
    async fn test_nothing_seeded_when_all_fail() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body("not a reply")
            .create_async()
            .await;

        let fetchers = build_fetchers(&config_for(vec![format!("{}/", server.url())])).unwrap();
        let pool = MemoryPool::new();
        let log = MemoryLog::new();

        let seeded = seed_pool(&fetchers, Arc::new(pool.clone()), &log).await;

        assert_eq!(seeded, 0);
        assert!(pool.is_empty());
    }
}
