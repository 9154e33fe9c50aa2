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

//! Entropy pool devices
//!
//! A pool is the shared randomness source-and-sink that every exchange writes
//! into and reads from. One instance serves all concurrent exchanges, so each
//! implementation serializes its own access.

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Default pool device path
pub const DEFAULT_DEVICE: &str = "/dev/urandom";

/// Duplex byte pool shared by every exchange
pub trait PoolDevice: Send + Sync {
    /// Write all of `data` into the pool
    fn absorb(&self, data: &[u8]) -> io::Result<()>;

    /// Read exactly `n` bytes from the pool
    fn draw(&self, n: usize) -> io::Result<Bytes>;
}

impl<P: PoolDevice + ?Sized> PoolDevice for Arc<P> {
    fn absorb(&self, data: &[u8]) -> io::Result<()> {
        (**self).absorb(data)
    }

    fn draw(&self, n: usize) -> io::Result<Bytes> {
        (**self).draw(n)
    }
}

/// Pool backed by a character device such as `/dev/urandom`
///
/// All reads and writes go through a single critical section so concurrent
/// exchanges never interleave partial writes. The handle is closed on drop.
pub struct DevicePool {
    path: PathBuf,
    file: Mutex<File>,
}

impl DevicePool {
    /// Open the device for reading and writing
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PoolDevice for DevicePool {
    fn absorb(&self, data: &[u8]) -> io::Result<()> {
        let mut file = self.file.lock();
        file.write_all(data)?;
        file.flush()
    }

    fn draw(&self, n: usize) -> io::Result<Bytes> {
        let mut data = vec![0u8; n];
        self.file.lock().read_exact(&mut data)?;
        Ok(Bytes::from(data))
    }
}

impl std::fmt::Debug for DevicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePool").field("path", &self.path).finish()
    }
}

/// In-memory FIFO pool
///
/// Writes append to the back, reads consume from the front. Cloning yields
/// another handle to the same buffer, which lets tests inspect what an
/// exchange left behind.
#[derive(Clone, Default)]
pub struct MemoryPool {
    inner: Arc<RwLock<PoolInner>>,
}

#[derive(Default)]
struct PoolInner {
    chunks: VecDeque<Bytes>,
    current_size: usize,
    stats: PoolStats,
}

impl PoolInner {
    fn push(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        self.current_size += data.len();
        self.chunks.push_back(data);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub total_absorbs: u64,
    pub total_draws: u64,
    pub bytes_absorbed: u64,
    pub bytes_drawn: u64,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool pre-filled with `data`
    pub fn with_contents(data: impl Into<Bytes>) -> Self {
        let pool = Self::new();
        pool.inner.write().push(data.into());
        pool
    }

    /// Peek at N bytes without consuming
    pub fn peek(&self, n: usize) -> Option<Bytes> {
        let inner = self.inner.read();

        if inner.current_size < n {
            return None;
        }

        let mut result = BytesMut::with_capacity(n);
        let mut remaining = n;
        let mut iter = inner.chunks.iter();

        while remaining > 0 {
            let chunk = iter.next()?;
            let available = chunk.len();

            if available <= remaining {
                result.put(chunk.clone());
                remaining -= available;
            } else {
                result.put(chunk.slice(0..remaining));
                remaining = 0;
            }
        }

        Some(result.freeze())
    }

    /// Everything currently held, front to back
    pub fn contents(&self) -> Bytes {
        self.peek(self.len()).unwrap_or_default()
    }

    /// Bytes currently held
    pub fn len(&self) -> usize {
        self.inner.read().current_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.read().stats.clone()
    }
}

impl PoolDevice for MemoryPool {
    fn absorb(&self, data: &[u8]) -> io::Result<()> {
        let mut inner = self.inner.write();
        inner.push(Bytes::copy_from_slice(data));
        inner.stats.total_absorbs += 1;
        inner.stats.bytes_absorbed += data.len() as u64;
        Ok(())
    }

    fn draw(&self, n: usize) -> io::Result<Bytes> {
        let mut inner = self.inner.write();

        if inner.current_size < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("pool holds {} bytes, {} requested", inner.current_size, n),
            ));
        }

        let mut result = BytesMut::with_capacity(n);
        let mut remaining = n;

        while remaining > 0 {
            let Some(chunk) = inner.chunks.front_mut() else {
                break;
            };
            let available = chunk.len();

            if available <= remaining {
                if let Some(consumed) = inner.chunks.pop_front() {
                    result.put(consumed);
                }
                remaining -= available;
                inner.current_size -= available;
            } else {
                let part = chunk.split_to(remaining);
                result.put(part);
                inner.current_size -= remaining;
                remaining = 0;
            }
        }

        inner.stats.total_draws += 1;
        inner.stats.bytes_drawn += n as u64;

        Ok(result.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_draw_fifo() {
        let pool = MemoryPool::with_contents(vec![1, 2, 3]);
        pool.absorb(&[4, 5]).unwrap();
        assert_eq!(pool.len(), 5);

        let data = pool.draw(4).unwrap();
        assert_eq!(data.as_ref(), &[1, 2, 3, 4]);
        assert_eq!(pool.contents().as_ref(), &[5]);
    }

    #[test]
    fn test_short_draw_consumes_nothing() {
        let pool = MemoryPool::with_contents(vec![9; 10]);
        let err = pool.draw(11).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert_eq!(pool.len(), 10);
        assert_eq!(pool.stats().total_draws, 0);
    }

    #[test]
    fn test_peek() {
        let pool = MemoryPool::with_contents(vec![1, 2, 3, 4, 5]);
        let peeked = pool.peek(3).unwrap();
        assert_eq!(peeked.as_ref(), &[1, 2, 3]);
        assert_eq!(pool.len(), 5);
        assert!(pool.peek(6).is_none());
    }

    #[test]
    fn test_stats() {
        let pool = MemoryPool::new();
        pool.absorb(&[0; 8]).unwrap();
        pool.draw(3).unwrap();
        assert_eq!(
            pool.stats(),
            PoolStats {
                total_absorbs: 1,
                total_draws: 1,
                bytes_absorbed: 8,
                bytes_drawn: 3,
            }
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_device_pool_urandom() {
        let pool = DevicePool::open(DEFAULT_DEVICE).unwrap();
        pool.absorb(b"stir").unwrap();
        let a = pool.draw(32).unwrap();
        let b = pool.draw(32).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_device_pool_missing_path() {
        assert!(DevicePool::open("/nonexistent/seedex/pool").is_err());
    }
}
