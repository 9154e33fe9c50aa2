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

//! Metrics collection and reporting

use crate::exchange::ExchangeOutcome;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Exchange metrics shared by a binding's handlers
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    start_time: Instant,

    // Exchange metrics
    exchanges_total: AtomicU64,
    rejected_total: AtomicU64,
    read_faults: AtomicU64,
    write_faults: AtomicU64,
    bytes_drawn: AtomicU64,

    // Latency tracking (microseconds)
    exchange_latencies: RwLock<Vec<u64>>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                start_time: Instant::now(),
                exchanges_total: AtomicU64::new(0),
                rejected_total: AtomicU64::new(0),
                read_faults: AtomicU64::new(0),
                write_faults: AtomicU64::new(0),
                bytes_drawn: AtomicU64::new(0),
                exchange_latencies: RwLock::new(Vec::with_capacity(10000)),
            }),
        }
    }

    /// Record a finished exchange and how long it took
    pub fn record_exchange(&self, outcome: &ExchangeOutcome, latency_micros: u64) {
        self.inner.exchanges_total.fetch_add(1, Ordering::Relaxed);
        if outcome.write_error.is_some() {
            self.inner.write_faults.fetch_add(1, Ordering::Relaxed);
        }
        match &outcome.response {
            Ok(response) => {
                self.inner
                    .bytes_drawn
                    .fetch_add(response.pool_bytes.len() as u64, Ordering::Relaxed);
            }
            Err(_) => {
                self.inner.read_faults.fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut latencies = self.inner.exchange_latencies.write();
        latencies.push(latency_micros);
        if latencies.len() > 10000 {
            latencies.drain(0..5000);
        }
    }

    /// Record a request turned away before any pool I/O
    pub fn record_rejected(&self) {
        self.inner.rejected_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exchanges_total(&self) -> u64 {
        self.inner.exchanges_total.load(Ordering::Relaxed)
    }

    pub fn rejected_total(&self) -> u64 {
        self.inner.rejected_total.load(Ordering::Relaxed)
    }

    pub fn read_faults(&self) -> u64 {
        self.inner.read_faults.load(Ordering::Relaxed)
    }

    pub fn write_faults(&self) -> u64 {
        self.inner.write_faults.load(Ordering::Relaxed)
    }

    pub fn bytes_drawn(&self) -> u64 {
        self.inner.bytes_drawn.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.inner.start_time.elapsed().as_secs()
    }

    pub fn latency_percentile(&self, percentile: f64) -> Option<u64> {
        let latencies = self.inner.exchange_latencies.read();
        if latencies.is_empty() {
            return None;
        }

        let mut sorted = latencies.clone();
        sorted.sort_unstable();
        let index = ((sorted.len() as f64 * percentile).ceil() as usize).min(sorted.len() - 1);
        Some(sorted[index])
    }

    pub fn latency_p50(&self) -> Option<u64> {
        self.latency_percentile(0.50)
    }

    pub fn latency_p99(&self) -> Option<u64> {
        self.latency_percentile(0.99)
    }

    /// Generate Prometheus-compatible metrics output
    pub fn prometheus_format(&self) -> String {
        let mut output = String::new();

        let counters = [
            (
                "seedex_exchanges_total",
                "Total number of exchanges",
                self.exchanges_total(),
            ),
            (
                "seedex_rejected_total",
                "Requests rejected for lack of a challenge",
                self.rejected_total(),
            ),
            (
                "seedex_pool_read_faults",
                "Exchanges aborted by a pool read fault",
                self.read_faults(),
            ),
            (
                "seedex_pool_write_faults",
                "Challenge digests the pool refused",
                self.write_faults(),
            ),
            (
                "seedex_bytes_drawn",
                "Total pool bytes drawn",
                self.bytes_drawn(),
            ),
        ];
        for (name, help, value) in counters {
            output.push_str(&format!("# HELP {} {}\n", name, help));
            output.push_str(&format!("# TYPE {} counter\n", name));
            output.push_str(&format!("{} {}\n", name, value));
        }

        output.push_str("# HELP seedex_uptime_seconds Service uptime in seconds\n");
        output.push_str("# TYPE seedex_uptime_seconds gauge\n");
        output.push_str(&format!("seedex_uptime_seconds {}\n", self.uptime_seconds()));

        if let Some(p50) = self.latency_p50() {
            output.push_str(
                "# HELP seedex_latency_p50_microseconds Exchange latency 50th percentile\n",
            );
            output.push_str("# TYPE seedex_latency_p50_microseconds gauge\n");
            output.push_str(&format!("seedex_latency_p50_microseconds {}\n", p50));
        }

        if let Some(p99) = self.latency_p99() {
            output.push_str(
                "# HELP seedex_latency_p99_microseconds Exchange latency 99th percentile\n",
            );
            output.push_str("# TYPE seedex_latency_p99_microseconds gauge\n");
            output.push_str(&format!("seedex_latency_p99_microseconds {}\n", p99));
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::EntropyExchange;
    use crate::pool::MemoryPool;

    #[test]
    fn test_metrics() {
        let metrics = Metrics::new();
        let pool = MemoryPool::with_contents(vec![7u8; 64]);
        let exchange = EntropyExchange::new(Arc::new(pool), 64);

        metrics.record_exchange(&exchange.mix(b"first"), 100);
        metrics.record_exchange(&exchange.mix(b"second"), 200);
        metrics.record_rejected();

        assert_eq!(metrics.exchanges_total(), 2);
        assert_eq!(metrics.bytes_drawn(), 128);
        assert_eq!(metrics.read_faults(), 0);
        assert_eq!(metrics.rejected_total(), 1);

        // Each exchange leaves its challenge digest behind, so the pool never runs dry
        metrics.record_exchange(&exchange.mix(b"third"), 300);
        assert_eq!(metrics.read_faults(), 0);
        let text = metrics.prometheus_format();
        assert!(text.contains("seedex_exchanges_total 3"));
    }

    #[test]
    fn test_latency_percentiles() {
        let metrics = Metrics::new();
        let pool = MemoryPool::with_contents(vec![0u8; 64]);
        let exchange = EntropyExchange::new(Arc::new(pool), 0);
        let outcome = exchange.mix(b"x");

        for i in 1..=100 {
            metrics.record_exchange(&outcome, i);
        }

        let p50 = metrics.latency_p50().unwrap();
        assert!((45..=55).contains(&p50));

        let p99 = metrics.latency_p99().unwrap();
        assert!((95..=100).contains(&p99));
    }
}
