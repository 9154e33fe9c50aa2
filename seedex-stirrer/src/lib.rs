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

//! Seedex Stirrer - UDP broadcast binding of the entropy exchange
//!
//! Two roles share one pool:
//!
//! - **server**: every inbound datagram is mixed into the pool as a challenge
//!   and the drawn pool bytes are sent straight back to the sender, raw.
//! - **client**: every interval, raw pool bytes are broadcast to the subnet;
//!   replies arriving within the wait budget are salted and absorbed.
//!
//! ```text
//!  client ──bcast pool bytes──> every server on the subnet
//!  client <──direct pool bytes── each server (after mixing the bcast)
//!  pool   <── reply || salt
//! ```

use bytes::{BufMut, BytesMut};
use seedex_core::crypto::{byte_sum, Salt};
use seedex_core::{EntropyExchange, EventLog};
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Pause after a failed receive before listening again
const RECV_RETRY_PAUSE: Duration = Duration::from_millis(50);

/// Where the client role listens for direct replies
pub trait ReplySource {
    fn recv_reply<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a;
}

impl ReplySource for UdpSocket {
    fn recv_reply<'a>(
        &'a self,
        buf: &'a mut [u8],
    ) -> impl Future<Output = io::Result<(usize, SocketAddr)>> + Send + 'a {
        self.recv_from(buf)
    }
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Bind the server socket on the well-known port, all interfaces
pub async fn bind_server(port: u16) -> io::Result<UdpSocket> {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await
}

/// Bind an ephemeral client socket allowed to broadcast
pub async fn bind_client() -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

/// Both stirrer roles over one shared exchange
#[derive(Clone)]
pub struct Stirrer {
    exchange: EntropyExchange,
    log: Arc<dyn EventLog>,
    datagram_size: usize,
}

impl Stirrer {
    pub fn new(exchange: EntropyExchange, log: Arc<dyn EventLog>, datagram_size: usize) -> Self {
        Self {
            exchange,
            log,
            datagram_size,
        }
    }

    /// Server role: answer datagrams forever
    pub async fn run_server(&self, socket: UdpSocket) {
        let mut buf = vec![0u8; self.datagram_size];
        if let Ok(addr) = socket.local_addr() {
            info!("Stirrer server listening on {}", addr);
        }

        loop {
            match socket.recv_from(&mut buf).await {
                Ok((n, peer)) => self.answer(&socket, &buf[..n], peer).await,
                Err(e) => {
                    self.log.error(&format!("Server recv failed: {}", e));
                    tokio::time::sleep(RECV_RETRY_PAUSE).await;
                }
            }
        }
    }

    /// Mix one datagram into the pool and reply with the drawn pool bytes
    pub async fn answer(&self, socket: &UdpSocket, payload: &[u8], peer: SocketAddr) {
        let exchange = self.exchange.clone();
        let challenge = payload.to_vec();
        let outcome = match tokio::task::spawn_blocking(move || exchange.mix(&challenge)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Exchange task failed: {}", e);
                return;
            }
        };

        self.log.info(&format!(
            "Server recv bcast [{}] bytes [{}] from [{}]",
            payload.len(),
            byte_sum(payload),
            peer
        ));
        if let Some(e) = &outcome.write_error {
            self.log
                .error(&format!("Cannot write to random device at [{}]: {}", now_nanos(), e));
        }

        let seed = match outcome.response {
            Ok(seed) => seed,
            Err(e) => {
                // No error channel back to an anonymous peer; drop the reply
                self.log
                    .error(&format!("Cannot read from random device at [{}]: {}", now_nanos(), e));
                return;
            }
        };

        match socket.send_to(&seed.pool_bytes, peer).await {
            Ok(sent) => self.log.info(&format!(
                "Server sent direct [{}] bytes [{}] to [{}]",
                sent,
                byte_sum(&seed.pool_bytes),
                peer
            )),
            Err(e) => self
                .log
                .error(&format!("Server cannot reply to [{}]: {}", peer, e)),
        }
    }

    /// Client role: stir the network every `interval`, collecting replies for
    /// `reply_wait` after each broadcast
    ///
    /// With no interval the role does nothing and returns immediately.
    pub async fn run_client(
        &self,
        socket: UdpSocket,
        target: SocketAddr,
        interval_period: Option<Duration>,
        reply_wait: Duration,
    ) {
        let Some(period) = interval_period else {
            info!("Broadcast interval is not positive, client role disabled");
            return;
        };

        info!("Stirring {} every {:?}", target, period);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut salt = Salt::new();

        loop {
            ticker.tick().await;
            let absorbed = self.stir(&socket, target, reply_wait, &mut salt).await;
            debug!("Stir cycle absorbed {} replies", absorbed);
        }
    }

    /// One client cycle: broadcast raw pool bytes, then absorb every reply
    /// that arrives before the wait budget runs out
    ///
    /// Returns the number of replies absorbed.
    pub async fn stir(
        &self,
        socket: &UdpSocket,
        target: SocketAddr,
        reply_wait: Duration,
        salt: &mut Salt,
    ) -> usize {
        let pool = Arc::clone(self.exchange.pool());
        let size = self.exchange.read_size();
        match tokio::task::spawn_blocking(move || pool.draw(size)).await {
            Ok(Ok(data)) => {
                self.log.info(&format!(
                    "Client sent bcast [{}] bytes [{}] to [{}]",
                    data.len(),
                    byte_sum(&data),
                    target
                ));
                if let Err(e) = socket.send_to(&data, target).await {
                    self.log
                        .error(&format!("Client cannot broadcast to [{}]: {}", target, e));
                }
            }
            Ok(Err(e)) => self
                .log
                .error(&format!("Cannot read from random device at [{}]: {}", now_nanos(), e)),
            Err(e) => error!("Pool task failed: {}", e),
        }

        self.collect_replies(socket, Instant::now() + reply_wait, salt).await
    }

    /// Absorb every reply that arrives before `deadline`, salted
    ///
    /// A failed receive pauses briefly before listening again.
    pub async fn collect_replies<S: ReplySource + Sync>(
        &self,
        source: &S,
        deadline: Instant,
        salt: &mut Salt,
    ) -> usize {
        let mut buf = vec![0u8; self.datagram_size];
        let mut absorbed = 0;

        loop {
            let (n, peer) = match timeout_at(deadline, source.recv_reply(&mut buf)).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    self.log.error(&format!("Client recv failed: {}", e));
                    sleep_until(deadline.min(Instant::now() + RECV_RETRY_PAUSE)).await;
                    if Instant::now() >= deadline {
                        break;
                    }
                    continue;
                }
                Ok(Ok(received)) => received,
            };

            self.log.info(&format!(
                "Client recv direct [{}] bytes [{}] from [{}]",
                n,
                byte_sum(&buf[..n]),
                peer
            ));

            salt.next();
            let mut mixed = BytesMut::with_capacity(n + 8);
            mixed.put_slice(&buf[..n]);
            mixed.put_slice(&salt.to_bytes());

            let pool = Arc::clone(self.exchange.pool());
            match tokio::task::spawn_blocking(move || pool.absorb(&mixed)).await {
                Ok(Ok(())) => absorbed += 1,
                Ok(Err(e)) => self
                    .log
                    .error(&format!("Cannot write to random device at [{}]: {}", now_nanos(), e)),
                Err(e) => error!("Pool task failed: {}", e),
            }
        }

        absorbed
    }
}
