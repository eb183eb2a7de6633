//! Bounded connection pool shared by the ASR and TTS adapters (spec.md §4.1).
//!
//! A fixed number of channels are pre-established; `acquire` blocks until
//! one is available, `release` is idempotent and happens on every exit path
//! via the guard's `Drop`. `initialize` is idempotent; `close` drains the
//! pool so no leased channel leaks past shutdown.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

use crate::errors::ProviderErrorKind;

/// Keep-alive parameters applied to every channel the pool establishes
/// (spec.md §4.1: 10s ping interval, 5s ping timeout, pings permitted
/// without in-flight calls, 10 MiB max message size).
#[derive(Debug, Clone, Copy)]
pub struct PoolKeepAlive {
    pub ping_interval: std::time::Duration,
    pub ping_timeout: std::time::Duration,
    pub permit_without_calls: bool,
    pub max_message_size: usize,
}

impl Default for PoolKeepAlive {
    fn default() -> Self {
        Self {
            ping_interval: std::time::Duration::from_secs(10),
            ping_timeout: std::time::Duration::from_secs(5),
            permit_without_calls: true,
            max_message_size: 10 * 1024 * 1024,
        }
    }
}

/// Creates a fresh channel of type `T`. Implemented once per adapter (ASR,
/// TTS) over the concrete transport (a Riva gRPC channel).
#[async_trait]
pub trait ChannelFactory<T>: Send + Sync {
    async fn connect(&self) -> Result<T, ProviderErrorKind>;
}

pub struct ChannelPool<T> {
    factory: Arc<dyn ChannelFactory<T>>,
    size: usize,
    semaphore: Arc<Semaphore>,
    channels: Mutex<VecDeque<T>>,
    initialized: AtomicBool,
}

impl<T: Send + 'static> ChannelPool<T> {
    pub fn new(factory: Arc<dyn ChannelFactory<T>>, size: usize) -> Arc<Self> {
        Arc::new(Self {
            factory,
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            channels: Mutex::new(VecDeque::with_capacity(size)),
            initialized: AtomicBool::new(false),
        })
    }

    /// Establish `size` channels up front. Idempotent: a second call is a
    /// no-op. A connection failure here is fatal to the pool (spec.md
    /// §4.1).
    pub async fn initialize(&self) -> Result<(), ProviderErrorKind> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut channels = self.channels.lock().await;
        for _ in 0..self.size {
            match self.factory.connect().await {
                Ok(channel) => channels.push_back(channel),
                Err(e) => {
                    self.initialized.store(false, Ordering::SeqCst);
                    tracing::error!(error = %e, "pool initialization failed");
                    return Err(e);
                }
            }
        }
        tracing::info!(size = self.size, "pool initialized");
        Ok(())
    }

    /// Block until a channel is available, creating one lazily if the pool
    /// was never `initialize`d (tests and one-off callers).
    pub async fn acquire(self: &Arc<Self>) -> Result<PoolGuard<T>, ProviderErrorKind> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ProviderErrorKind::ProviderUnavailable("pool closed".to_string()))?;

        let existing = {
            let mut channels = self.channels.lock().await;
            channels.pop_front()
        };
        let channel = match existing {
            Some(channel) => channel,
            None => self.factory.connect().await?,
        };

        Ok(PoolGuard {
            pool: self.clone(),
            channel: Some(channel),
            _permit: permit,
        })
    }

    /// Idempotent: callers should prefer letting `PoolGuard` drop, but this
    /// is exposed for callers that want to return a channel without waiting
    /// on the async drop-spawned task.
    pub async fn release(&self, channel: T) {
        let mut channels = self.channels.lock().await;
        channels.push_back(channel);
    }

    /// Drains the pool. Outstanding guards still release safely (into a now
    /// briefly-repopulated, but otherwise unused, queue).
    pub async fn close(&self) {
        let mut channels = self.channels.lock().await;
        channels.clear();
        self.initialized.store(false, Ordering::SeqCst);
    }

    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Whether `initialize` has succeeded and not since been `close`d, for
    /// `GET /ready`.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }
}

/// A leased channel. Returns itself to the pool on drop so release happens
/// on every exit path, including early returns and panics.
pub struct PoolGuard<T: Send + 'static> {
    pool: Arc<ChannelPool<T>>,
    channel: Option<T>,
    _permit: OwnedSemaphorePermit,
}

impl<T: Send + 'static> std::ops::Deref for PoolGuard<T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.channel.as_ref().expect("channel taken before guard dropped")
    }
}

impl<T: Send + 'static> std::ops::DerefMut for PoolGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.channel.as_mut().expect("channel taken before guard dropped")
    }
}

impl<T: Send + 'static> Drop for PoolGuard<T> {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            let pool = self.pool.clone();
            tokio::spawn(async move {
                pool.release(channel).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingFactory {
        connects: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ChannelFactory<u32> for CountingFactory {
        async fn connect(&self) -> Result<u32, ProviderErrorKind> {
            if self.fail {
                return Err(ProviderErrorKind::ProviderUnavailable("nope".to_string()));
            }
            Ok(self.connects.fetch_add(1, Ordering::SeqCst) as u32)
        }
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let factory = Arc::new(CountingFactory { connects: AtomicUsize::new(0), fail: false });
        let pool = ChannelPool::new(factory.clone(), 3);
        pool.initialize().await.unwrap();
        pool.initialize().await.unwrap();
        assert_eq!(factory.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn acquire_blocks_until_release() {
        let factory = Arc::new(CountingFactory { connects: AtomicUsize::new(0), fail: false });
        let pool = ChannelPool::new(factory, 1);
        pool.initialize().await.unwrap();

        let guard = pool.acquire().await.unwrap();
        let pool2 = pool.clone();
        let handle = tokio::spawn(async move {
            let _second = pool2.acquire().await.unwrap();
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        drop(guard);
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("acquire should unblock after release")
            .unwrap();
    }

    #[tokio::test]
    async fn initialize_failure_is_fatal() {
        let factory = Arc::new(CountingFactory { connects: AtomicUsize::new(0), fail: true });
        let pool = ChannelPool::new(factory, 2);
        assert!(pool.initialize().await.is_err());
    }

    #[tokio::test]
    async fn close_drains_pool() {
        let factory = Arc::new(CountingFactory { connects: AtomicUsize::new(0), fail: false });
        let pool = ChannelPool::new(factory, 2);
        pool.initialize().await.unwrap();
        pool.close().await;
        assert_eq!(pool.channels.lock().await.len(), 0);
    }
}
