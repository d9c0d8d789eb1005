//! Per-product write serialization inside one process.
//!
//! Movements for the same product queue behind one async mutex; movements for
//! different products never wait on each other. Entries are dropped from the
//! registry once no task holds or waits for them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use stockledger_core::ProductId;

type Registry = Arc<Mutex<HashMap<ProductId, Arc<AsyncMutex<()>>>>>;

#[derive(Debug, Default, Clone)]
pub struct ProductLocks {
    registry: Registry,
}

/// Held while a product's stock write is in flight.
#[derive(Debug)]
pub struct ProductLockGuard {
    product_id: ProductId,
    guard: Option<OwnedMutexGuard<()>>,
    registry: Registry,
}

fn lock_registry(registry: &Registry) -> MutexGuard<'_, HashMap<ProductId, Arc<AsyncMutex<()>>>> {
    // The map holds no invariant a panicking holder could break.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProductLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, product_id: ProductId) -> ProductLockGuard {
        let lock = {
            let mut map = lock_registry(&self.registry);
            Arc::clone(map.entry(product_id).or_default())
        };
        let guard = lock.lock_owned().await;
        ProductLockGuard {
            product_id,
            guard: Some(guard),
            registry: Arc::clone(&self.registry),
        }
    }

    /// Number of products with a live lock entry.
    pub fn tracked(&self) -> usize {
        lock_registry(&self.registry).len()
    }
}

impl ProductLockGuard {
    pub fn product_id(&self) -> ProductId {
        self.product_id
    }
}

impl Drop for ProductLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = lock_registry(&self.registry);
        let idle = map
            .get(&self.product_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            map.remove(&self.product_id);
        }
    }
}
