//! Reusable buffer pools.
//!
//! # Responsibilities
//! - Hand out reset objects (response bodies, copy scratch space)
//! - Return them automatically when the owning guard drops
//! - Keep acquire/release accounting for balance checks
//!
//! # Design Decisions
//! - Items are reset on acquire, so nothing stale leaks into a new request
//! - Release is tied to `Drop` of [`Pooled`], which makes it exactly-once
//! - Idle items are capped; surplus is simply dropped

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Size of the scratch buffers used for bulk copies.
pub const COPY_BUF_SIZE: usize = 32 * 1024;

/// Objects that can be returned to a blank state before reuse.
pub trait Reset {
    fn reset(&mut self);
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Point-in-time pool accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
    pub idle: usize,
}

impl PoolStats {
    /// Items currently checked out.
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

/// A bounded free-list of reusable objects.
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    make: Box<dyn Fn() -> T + Send + Sync>,
    max_idle: usize,
    acquired: AtomicU64,
    released: AtomicU64,
}

impl<T> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("max_idle", &self.max_idle)
            .field("acquired", &self.acquired.load(Ordering::Relaxed))
            .field("released", &self.released.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Reset + Default + Send + 'static> Pool<T> {
    /// Create a pool keeping at most `max_idle` spare items.
    pub fn new(max_idle: usize, make: impl Fn() -> T + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(Vec::new()),
            make: Box::new(make),
            max_idle,
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
        })
    }

    /// Take an item from the pool (or make a fresh one), reset and ready to use.
    pub fn acquire(self: &Arc<Self>) -> Pooled<T> {
        let recycled = self.idle.lock().expect("pool mutex poisoned").pop();
        let mut item = recycled.unwrap_or_else(|| (self.make)());
        item.reset();

        self.acquired.fetch_add(1, Ordering::Relaxed);
        Pooled {
            item,
            pool: Arc::clone(self),
        }
    }

    fn release(&self, item: T) {
        self.released.fetch_add(1, Ordering::Relaxed);
        let mut idle = self.idle.lock().expect("pool mutex poisoned");
        if idle.len() < self.max_idle {
            idle.push(item);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            idle: self.idle.lock().expect("pool mutex poisoned").len(),
        }
    }
}

/// An item on loan from a [`Pool`]; goes back on drop.
pub struct Pooled<T: Reset + Default + Send + 'static> {
    item: T,
    pool: Arc<Pool<T>>,
}

impl<T: Reset + Default + Send + 'static> Deref for Pooled<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        &self.item
    }
}

impl<T: Reset + Default + Send + 'static> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.item
    }
}

impl<T: Reset + Default + Send + 'static> Drop for Pooled<T> {
    fn drop(&mut self) {
        let item = std::mem::take(&mut self.item);
        self.pool.release(item);
    }
}

impl<T: Reset + Default + Send + std::fmt::Debug + 'static> std::fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Pooled").field(&self.item).finish()
    }
}

/// Pool of response body buffers.
pub fn body_pool() -> Arc<Pool<Vec<u8>>> {
    Pool::new(256, Vec::new)
}

/// Pool of fixed-size scratch buffers for bulk copies.
pub fn scratch_pool() -> Arc<Pool<Vec<u8>>> {
    Pool::new(64, || Vec::with_capacity(COPY_BUF_SIZE))
}
