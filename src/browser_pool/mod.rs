//! Fixed-size pool of expensive automation resources
//!
//! A counting semaphore with `pool_size` permits bounds the number of
//! outstanding leases; the idle set is a queue behind a short mutex.
//! Resources are created lazily on first demand (or all at once through
//! [`ResourcePool::start`]) and reused for the lifetime of the pool.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::harvest_engine::errors::{HarvestError, HarvestResult};

// =============================================================================
// Factory seam
// =============================================================================

/// Creates, checks and tears down pooled resources
#[async_trait]
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Send + Sync + 'static;

    /// Create resource number `id`
    async fn launch(&self, id: u64) -> HarvestResult<Self::Resource>;

    /// Cheap liveness probe run before an idle resource is handed out
    async fn is_healthy(&self, _resource: &Self::Resource) -> bool {
        true
    }

    /// Tear a resource down
    async fn close(&self, resource: Self::Resource) -> HarvestResult<()>;
}

// =============================================================================
// Pooled resource
// =============================================================================

/// A resource with pool metadata
#[derive(Debug)]
struct PooledResource<R> {
    id: u64,
    resource: R,
    created_at: Instant,
    last_used: Instant,
}

impl<R> PooledResource<R> {
    fn new(id: u64, resource: R) -> Self {
        let now = Instant::now();
        Self {
            id,
            resource,
            created_at: now,
            last_used: now,
        }
    }
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub pool_size: usize,
    pub live: usize,
    pub available: usize,
    pub leased: usize,
}

// =============================================================================
// Pool
// =============================================================================

/// Pool of at most `pool_size` live resources
pub struct ResourcePool<F: ResourceFactory> {
    factory: Arc<F>,
    pool_size: usize,
    permits: Arc<Semaphore>,
    available: Mutex<VecDeque<PooledResource<F::Resource>>>,
    live: AtomicUsize,
    leased: AtomicUsize,
    next_id: AtomicU64,
    shutdown: AtomicBool,
}

impl<F: ResourceFactory> std::fmt::Debug for ResourcePool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("stats", &self.stats())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl<F: ResourceFactory> ResourcePool<F> {
    /// Create an empty pool; nothing is launched yet
    ///
    /// # Errors
    /// `InvalidConfiguration` when `pool_size` is zero.
    pub fn new(factory: F, pool_size: usize) -> HarvestResult<Arc<Self>> {
        if pool_size == 0 {
            return Err(HarvestError::config("pool_size must be > 0"));
        }
        Ok(Arc::new(Self {
            factory: Arc::new(factory),
            pool_size,
            permits: Arc::new(Semaphore::new(pool_size)),
            available: Mutex::new(VecDeque::with_capacity(pool_size)),
            live: AtomicUsize::new(0),
            leased: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        }))
    }

    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            pool_size: self.pool_size,
            live: self.live.load(Ordering::Acquire),
            available: self.available.lock().len(),
            leased: self.leased.load(Ordering::Acquire),
        }
    }

    /// Pre-warm: launch resources concurrently until `pool_size` are live
    ///
    /// Call before the first `acquire`. Individual launch failures are
    /// logged; the pool falls back to lazy creation for the missing slots.
    /// Returns how many resources were launched.
    pub async fn start(&self) -> HarvestResult<usize> {
        if self.is_shutdown() {
            return Err(HarvestError::PoolClosed);
        }

        let missing = self.pool_size.saturating_sub(self.live.load(Ordering::Acquire));
        info!("Starting resource pool: pre-warming {missing} of {}", self.pool_size);

        let futs: Vec<_> = (0..missing).map(|_| self.launch_one()).collect();
        let results = futures::future::join_all(futs).await;

        let mut launched = 0;
        for result in results {
            match result {
                Ok(pooled) => {
                    let rejected = {
                        let mut available = self.available.lock();
                        if self.is_shutdown() {
                            Some(pooled)
                        } else {
                            available.push_back(pooled);
                            None
                        }
                    };
                    match rejected {
                        Some(pooled) => self.retire(pooled).await,
                        None => launched += 1,
                    }
                }
                Err(e) => warn!("Failed to pre-warm pooled resource: {e}"),
            }
        }

        info!("Resource pool started with {launched} pre-warmed resources");
        Ok(launched)
    }

    /// Lease a resource, waiting at most `timeout` for a free slot
    ///
    /// # Errors
    /// `PoolExhausted` on timeout, `PoolClosed` after shutdown, or the
    /// factory's error if a new resource cannot be launched.
    pub async fn acquire(self: &Arc<Self>, timeout: Duration) -> HarvestResult<PoolLease<F>> {
        if self.is_shutdown() {
            return Err(HarvestError::PoolClosed);
        }

        let permit = match tokio::time::timeout(timeout, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(HarvestError::PoolClosed),
            Err(_) => {
                warn!("Resource pool exhausted: no resource within {timeout:?}");
                return Err(HarvestError::PoolExhausted { timeout });
            }
        };

        // Holding a permit means fewer than pool_size resources are leased,
        // so reusing or creating one keeps live <= pool_size.
        loop {
            let idle = self.available.lock().pop_front();

            match idle {
                Some(mut pooled) => {
                    if self.factory.is_healthy(&pooled.resource).await {
                        pooled.last_used = Instant::now();
                        debug!("Acquired resource {} from pool", pooled.id);
                        return Ok(self.lease(pooled, permit));
                    }
                    warn!("Resource {} failed health check, replacing", pooled.id);
                    self.retire(pooled).await;
                }
                None => {
                    let pooled = self.launch_one().await?;
                    debug!("Launched resource {} on demand", pooled.id);
                    return Ok(self.lease(pooled, permit));
                }
            }
        }
    }

    /// Return a lease early; equivalent to dropping it
    pub fn release(&self, lease: PoolLease<F>) {
        drop(lease);
    }

    /// Close every idle resource and refuse further acquires
    ///
    /// Idempotent. Outstanding leases are closed when they are released.
    /// Close failures are logged, never returned.
    pub async fn shutdown(&self) {
        // Flag and drain under the idle-set lock so `give_back` sees either
        // an open pool or an empty, closed one.
        let drained: Vec<_> = {
            let mut available = self.available.lock();
            if self.shutdown.swap(true, Ordering::AcqRel) {
                debug!("Resource pool already shut down");
                return;
            }
            available.drain(..).collect()
        };
        info!("Shutting down resource pool");
        self.permits.close();

        for pooled in drained {
            self.retire(pooled).await;
        }

        let outstanding = self.leased.load(Ordering::Acquire);
        if outstanding > 0 {
            warn!("{outstanding} resources still leased; they will be closed on release");
        }
        info!("Resource pool shutdown complete");
    }

    async fn launch_one(&self) -> HarvestResult<PooledResource<F::Resource>> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resource = self.factory.launch(id).await?;
        self.live.fetch_add(1, Ordering::AcqRel);
        Ok(PooledResource::new(id, resource))
    }

    async fn retire(&self, pooled: PooledResource<F::Resource>) {
        self.live.fetch_sub(1, Ordering::AcqRel);
        debug!(
            "Closing resource {} (age {:?})",
            pooled.id,
            pooled.created_at.elapsed()
        );
        if let Err(e) = self.factory.close(pooled.resource).await {
            warn!("Failed to close resource {}: {e}", pooled.id);
        }
    }

    fn lease(self: &Arc<Self>, pooled: PooledResource<F::Resource>, permit: OwnedSemaphorePermit) -> PoolLease<F> {
        self.leased.fetch_add(1, Ordering::AcqRel);
        PoolLease {
            pooled: Some(pooled),
            pool: Arc::clone(self),
            _permit: permit,
        }
    }

    /// Put a resource back, or close it if the pool is gone
    fn give_back(&self, mut pooled: PooledResource<F::Resource>) {
        self.leased.fetch_sub(1, Ordering::AcqRel);
        pooled.last_used = Instant::now();

        {
            let mut available = self.available.lock();
            if !self.is_shutdown() {
                debug!("Released resource {} back to pool", pooled.id);
                available.push_back(pooled);
                return;
            }
        }

        self.live.fetch_sub(1, Ordering::AcqRel);
        let factory = Arc::clone(&self.factory);
        let id = pooled.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = factory.close(pooled.resource).await {
                        warn!("Failed to close resource {id} after shutdown: {e}");
                    }
                });
            }
            Err(_) => warn!("No runtime to close resource {id} after shutdown; dropping it"),
        }
    }
}

// =============================================================================
// RAII lease
// =============================================================================

/// Exclusive lease on one pooled resource
///
/// The resource goes back to the pool when the lease is dropped, on every
/// exit path. The slot permit is released only after the resource is back.
pub struct PoolLease<F: ResourceFactory> {
    pooled: Option<PooledResource<F::Resource>>,
    pool: Arc<ResourcePool<F>>,
    _permit: OwnedSemaphorePermit,
}

impl<F: ResourceFactory> PoolLease<F> {
    /// Pool-unique id of the leased resource
    pub fn id(&self) -> u64 {
        self.pooled.as_ref().expect("resource present until drop").id
    }

    pub fn resource(&self) -> &F::Resource {
        &self.pooled.as_ref().expect("resource present until drop").resource
    }
}

impl<F: ResourceFactory> std::fmt::Debug for PoolLease<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolLease")
            .field("id", &self.pooled.as_ref().map(|p| p.id))
            .finish_non_exhaustive()
    }
}

impl<F: ResourceFactory> Deref for PoolLease<F> {
    type Target = F::Resource;

    fn deref(&self) -> &Self::Target {
        self.resource()
    }
}

impl<F: ResourceFactory> Drop for PoolLease<F> {
    fn drop(&mut self) {
        if let Some(pooled) = self.pooled.take() {
            self.pool.give_back(pooled);
        }
    }
}
