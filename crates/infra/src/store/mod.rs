//! Persistence contracts for products, the movement ledger and reference parties.
//!
//! Stores are dumb: they validate nothing about business rules except the
//! optimistic version check on product writes and uniqueness of keys.
//! Everything else (sign policy, non-negativity) is decided before a write
//! reaches a store.

mod in_memory;
mod postgres;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;

use stockledger_core::{MovementId, ProductId};
use stockledger_inventory::{Movement, MovementType};
use stockledger_parties::NamedEntity;
use stockledger_products::Product;

pub use in_memory::{InMemoryNamedStore, InMemoryStore};
pub use postgres::PostgresStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend could not be reached or did not answer in time.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Optimistic version check failed; someone else wrote first.
    #[error("version conflict: {0}")]
    Conflict(String),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// A persisted record could not be turned back into a valid domain value.
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn find_by_code(&self, code: &str) -> Result<Option<Product>, StoreError>;

    async fn exists_by_code(&self, code: &str) -> Result<bool, StoreError> {
        Ok(self.find_by_code(code).await?.is_some())
    }

    /// All products, ordered by name.
    async fn find_all(&self) -> Result<Vec<Product>, StoreError>;

    async fn find_by_category(&self, category: &str) -> Result<Vec<Product>, StoreError>;

    async fn find_by_supplier(&self, supplier: &str) -> Result<Vec<Product>, StoreError>;

    /// Products at or below their minimum stock.
    async fn find_low_stock(&self) -> Result<Vec<Product>, StoreError>;

    /// Case-insensitive substring match on name, code and description.
    async fn search(&self, term: &str) -> Result<Vec<Product>, StoreError>;

    /// Insert a new product. Fails with `Duplicate` on a taken id or code.
    async fn insert(&self, product: Product) -> Result<Product, StoreError>;

    /// Replace a product's descriptive fields, guarded by its version.
    async fn update(&self, product: Product) -> Result<Product, StoreError>;

    /// Returns `false` when nothing was deleted.
    async fn delete_by_id(&self, id: ProductId) -> Result<bool, StoreError>;
}

/// Read side of the ledger. Every list is newest first.
#[async_trait]
pub trait MovementStore: Send + Sync {
    async fn find_all(&self) -> Result<Vec<Movement>, StoreError>;

    async fn find_by_id(&self, id: MovementId) -> Result<Option<Movement>, StoreError>;

    async fn find_by_product_id(&self, product_id: ProductId) -> Result<Vec<Movement>, StoreError>;

    async fn find_by_type(&self, movement_type: MovementType) -> Result<Vec<Movement>, StoreError>;

    /// Inclusive on both ends.
    async fn find_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Movement>, StoreError>;

    async fn find_most_recent(&self, limit: usize) -> Result<Vec<Movement>, StoreError>;

    async fn find_since(&self, since: DateTime<Utc>) -> Result<Vec<Movement>, StoreError>;

    /// Append a movement without touching its product.
    ///
    /// Used for imports; stock changes go through [`LedgerStore::commit`].
    async fn save(&self, movement: Movement) -> Result<Movement, StoreError>;
}

/// Atomic stock write: the product's new stock and its ledger entry land together or not at all.
#[async_trait]
pub trait LedgerStore: ProductStore + MovementStore {
    /// Persist `product` (compared against its current version) and append `movement`.
    ///
    /// On any error neither write is visible.
    async fn commit(
        &self,
        product: Product,
        movement: Movement,
    ) -> Result<(Product, Movement), StoreError>;
}

/// Store for entities with a unique name (categories, suppliers).
#[async_trait]
pub trait NamedStore<T: NamedEntity>: Send + Sync {
    /// All entities, ordered by name.
    async fn find_all(&self) -> Result<Vec<T>, StoreError>;

    async fn find_by_id(&self, id: T::Id) -> Result<Option<T>, StoreError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<T>, StoreError>;

    async fn exists_by_name(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.find_by_name(name).await?.is_some())
    }

    async fn insert(&self, entity: T) -> Result<T, StoreError>;

    async fn update(&self, entity: T) -> Result<T, StoreError>;

    async fn delete_by_id(&self, id: T::Id) -> Result<bool, StoreError>;
}

/// Bound a store call by `timeout`; an elapsed call is reported as unavailable.
pub(crate) async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| StoreError::Unavailable(format!("store call timed out after {timeout:?}")))?
}

/// Current time at the precision every backend persists (microseconds).
///
/// Timestamps handed to a store must come from here so that what a write
/// returns equals what a later read yields.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn newest_first(movements: &mut [Movement]) {
    movements.sort_by(|a, b| b.recency_key().cmp(&a.recency_key()));
}
