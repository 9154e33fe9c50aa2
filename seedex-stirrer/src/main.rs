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

//! Seedex Stirrer - continuous entropy stirring across the local network
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   bcast raw pool bytes   ┌──────────────┐
//! │   Stirrer    │ ───────────────────────> │   Stirrer    │
//! │   (client)   │                          │   (server)   │
//! │              │ <─────────────────────── │              │
//! └──────────────┘   direct raw pool bytes  └──────────────┘
//!        │                                         │
//!   reply + salt                             bcast digest
//!        v                                         v
//!   local pool                               remote pool
//! ```
//!
//! Both roles run as tokio tasks over one pool device. Failing to set up
//! either socket stops the process.

use anyhow::{Context, Result};
use clap::Parser;
use seedex_core::{config::StirrerConfig, DevicePool, EntropyExchange, EventLog, TracingLog};
use seedex_stirrer::{bind_client, bind_server, Stirrer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "seedex-stirrer")]
#[command(about = "Seedex Stirrer - Exchanges pool entropy with peers on the local network", long_about = None)]
struct Args {
    /// Path to configuration file (ignored if --env-mode is set)
    #[arg(short, long, default_value = "config/stirrer.yaml")]
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

    info!("Seedex Stirrer v{}", env!("CARGO_PKG_VERSION"));

    let config = if args.env_mode {
        info!("Loading configuration from environment variables");
        StirrerConfig::from_env().context("Failed to load configuration from environment")?
    } else {
        info!("Loading configuration from file: {:?}", args.config);
        StirrerConfig::from_file(&args.config).context("Failed to load configuration from file")?
    };

    info!("Pool device: {:?}", config.device);
    info!("Port: {}", config.port);
    info!("Broadcast target: {}", config.broadcast_target());
    info!("Interval: {} sec.", config.interval_secs);

    let pool = DevicePool::open(&config.device)
        .with_context(|| format!("Failed to open pool device {:?}", config.device))?;
    let exchange = EntropyExchange::new(Arc::new(pool), config.read_size);
    let log: Arc<dyn EventLog> = Arc::new(TracingLog);
    let stirrer = Stirrer::new(exchange, Arc::clone(&log), config.datagram_size);

    let server_socket = bind_server(config.port)
        .await
        .with_context(|| format!("Failed to bind UDP port {}", config.port))?;
    let client_socket = bind_client()
        .await
        .context("Failed to set up broadcast socket")?;

    // Spawn server task
    let server_handle = {
        let stirrer = stirrer.clone();
        tokio::spawn(async move { stirrer.run_server(server_socket).await })
    };

    // Spawn client task
    let client_handle = {
        let stirrer = stirrer.clone();
        let target = config.broadcast_target();
        let interval = config.interval();
        let reply_wait = config.reply_wait().unwrap_or_default();
        tokio::spawn(async move {
            stirrer
                .run_client(client_socket, target, interval, reply_wait)
                .await
        })
    };

    // A disabled client finishes at once; only a crash is worth reacting to
    let client_watch = async {
        match client_handle.await {
            Err(e) => e,
            Ok(()) => std::future::pending().await,
        }
    };

    let result = tokio::select! {
        res = server_handle => {
            log.emergency("Stirrer server role stopped");
            Err(anyhow::anyhow!("Server role stopped unexpectedly: {:?}", res.err()))
        }
        e = client_watch => {
            log.emergency("Stirrer client role stopped");
            Err(anyhow::anyhow!("Client role failed: {}", e))
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received");
            Ok(())
        }
    };

    log.close();
    info!("Stirrer shut down");
    result
}
