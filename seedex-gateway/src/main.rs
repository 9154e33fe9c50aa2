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

//! Seedex Gateway - serves the entropy exchange over HTTP and HTTPS
//!
//! Both listeners share one pool device. Failing to bind either listener or to
//! load the TLS material stops the whole process.

use anyhow::{Context, Result};
use clap::Parser;
use seedex_core::{config::GatewayConfig, DevicePool, EntropyExchange, EventLog, TracingLog};
use seedex_gateway::{router, serve_http, serve_https, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "seedex-gateway")]
#[command(about = "Seedex Gateway - Mixes challenges into the local pool and serves seeds over HTTP(S)", long_about = None)]
struct Args {
    /// Path to configuration file (ignored if --env-mode is set)
    #[arg(short, long, default_value = "config/gateway.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Load configuration from environment variables instead of file
    #[arg(long, default_value = "false")]
    env_mode: bool,
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use futures::stream::StreamExt;
        use signal_hook::consts::signal::*;
        use signal_hook_tokio::Signals;

        match Signals::new([SIGINT, SIGTERM]) {
            Ok(mut signals) => {
                if let Some(signal) = signals.next().await {
                    info!("Received signal: {:?}", signal);
                }
            }
            Err(e) => {
                tracing::error!("Failed to register signal handlers: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }

    #[cfg(windows)]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C signal");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments
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

    info!("Seedex Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.env_mode {
        info!("Loading configuration from environment variables");
        GatewayConfig::from_env().context("Failed to load configuration from environment")?
    } else {
        info!("Loading configuration from file: {:?}", args.config);
        GatewayConfig::from_file(&args.config).context("Failed to load configuration from file")?
    };

    info!("Pool device: {:?}", config.device);
    info!("Read size: {} bytes", config.read_size);

    // Pin the process-wide rustls provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    let pool = DevicePool::open(&config.device)
        .with_context(|| format!("Failed to open pool device {:?}", config.device))?;
    let exchange = EntropyExchange::new(Arc::new(pool), config.read_size);
    let log: Arc<dyn EventLog> = Arc::new(TracingLog);
    let state = AppState::new(exchange, Arc::clone(&log));
    let app = router(state, config.metrics_enabled);

    let shutdown = CancellationToken::new();

    let addr: SocketAddr = config
        .listen_address
        .parse()
        .context("Invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind HTTP listener on {}", addr))?;

    let tls_addr: Option<SocketAddr> = config
        .tls_listen_address
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("Invalid TLS listen address")?;

    let http = async {
        serve_http(listener, app.clone(), shutdown.clone())
            .await
            .context("HTTP listener failed")
    };
    let https = async {
        match tls_addr {
            Some(tls_addr) => serve_https(
                tls_addr,
                &config.tls_cert_path,
                &config.tls_key_path,
                app.clone(),
                shutdown.clone(),
            )
            .await
            .context("HTTPS listener failed"),
            None => {
                info!("HTTPS disabled");
                Ok(())
            }
        }
    };

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown signal received, draining connections...");
        signal_token.cancel();
    });

    let result = tokio::try_join!(http, https).map(|_| ());

    log.close();
    info!("Gateway shut down");
    result
}
