//! Stock ledger engine: the only path through which product stock changes.
//!
//! ## Movement Flow
//!
//! ```text
//! MovementRequest
//!   ↓
//! 1. Validate the request (no store access on failure)
//!   ↓
//! 2. Take the per-product lock
//!   ↓
//! 3. Load the product (bounded by the store timeout)
//!   ↓
//! 4. Plan: sign policy, previous/new stock, non-negativity
//!   ↓
//! 5. Commit product + movement atomically, version-checked
//!   ↓  (version lost: back to 3, up to the retry limit)
//! Movement
//! ```
//!
//! Step 5 runs on its own task, so a caller that stops polling cannot cut a
//! commit in half. The store's version check catches writers outside this
//! process; the lock keeps writers inside it from racing at all.
//!
//! Store faults log at `error`. Refused movements (invalid request, unknown
//! product, insufficient stock) log at `warn`.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{Span, error, info, instrument, warn};

use stockledger_core::{DomainResult, MovementId, ProductId};
use stockledger_inventory::{
    LedgerAudit, Movement, MovementRequest, PlannedMovement, audit_ledger, plan_movement,
    plan_stock_override,
};
use stockledger_products::Product;

use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::locks::ProductLocks;
use crate::store::{self, LedgerStore, MovementStore, ProductStore, StoreError, with_timeout};

pub struct LedgerEngine<S> {
    store: Arc<S>,
    locks: ProductLocks,
    config: InventoryConfig,
}

impl<S> Clone for LedgerEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            locks: self.locks.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S> LedgerEngine<S>
where
    S: LedgerStore + 'static,
{
    pub fn new(store: Arc<S>, config: InventoryConfig) -> Self {
        Self {
            store,
            locks: ProductLocks::new(),
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    /// Apply one stock movement and return the committed ledger entry.
    ///
    /// On any error the product and the ledger are exactly as before the call.
    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            movement_type = %request.movement_type,
            quantity = ?request.quantity,
            attempts
        ),
        err(level = "warn")
    )]
    pub async fn apply_movement(&self, request: MovementRequest) -> Result<Movement, InventoryError> {
        let command = request.validate().inspect_err(|err| {
            warn!(error = %err, "movement request rejected");
        })?;

        let committed = self
            .write_stock(command.product_id, |product, now| {
                plan_movement(product, &command, MovementId::new(), now).map(Some)
            })
            .await?;

        committed.ok_or_else(|| InventoryError::InvariantViolation("movement planned no change".to_string()))
    }

    /// Set a product's stock to `target_stock`, recording the difference as an adjustment.
    ///
    /// Returns `None` when the stock already equals the target; nothing is written then.
    #[instrument(skip(self, comments), fields(attempts), err(level = "warn"))]
    pub async fn set_stock(
        &self,
        product_id: ProductId,
        target_stock: i64,
        created_by: &str,
        comments: Option<String>,
    ) -> Result<Option<Movement>, InventoryError> {
        self.write_stock(product_id, |product, now| {
            plan_stock_override(
                product,
                target_stock,
                created_by,
                comments.clone(),
                MovementId::new(),
                now,
            )
        })
        .await
    }

    /// Reconcile a product's stock against its movement history.
    #[instrument(skip(self), err(level = "warn"))]
    pub async fn audit_product(&self, product_id: ProductId) -> Result<LedgerAudit, InventoryError> {
        let product = self.load_product(product_id).await?;
        let movements = self
            .bounded(MovementStore::find_by_product_id(&*self.store, product_id))
            .await?;
        let audit = audit_ledger(&product, &movements);
        if !audit.is_consistent() {
            warn!(
                current_stock = audit.current_stock,
                expected_stock = audit.expected_stock(),
                chain_breaks = audit.chain_breaks.len(),
                "ledger does not explain current stock"
            );
        }
        Ok(audit)
    }

    /// Serialize, load, plan, commit; retry the whole step when the version check loses.
    async fn write_stock<P>(&self, product_id: ProductId, plan: P) -> Result<Option<Movement>, InventoryError>
    where
        P: Fn(&Product, DateTime<Utc>) -> DomainResult<Option<PlannedMovement>>,
    {
        let _lock = self.locks.acquire(product_id).await;
        let attempts = self.config.commit_attempts();

        for attempt in 1..=attempts {
            Span::current().record("attempts", attempt);
            let product = self.load_product(product_id).await?;

            let planned = match plan(&product, store::now()) {
                Ok(Some(planned)) => planned,
                Ok(None) => return Ok(None),
                Err(err) => {
                    warn!(error = %err, current_stock = product.current_stock(), "movement rejected");
                    return Err(err.into());
                }
            };

            match self.commit(planned).await {
                Ok(movement) => {
                    info!(
                        movement_id = %movement.id_typed(),
                        movement_type = %movement.movement_type(),
                        previous_stock = movement.previous_stock(),
                        new_stock = movement.new_stock(),
                        "stock movement committed"
                    );
                    return Ok(Some(movement));
                }
                Err(StoreError::Conflict(msg)) => {
                    warn!(attempt, %msg, "stock write lost a version race");
                }
                Err(err @ (StoreError::Unavailable(_) | StoreError::Corrupt(_))) => {
                    error!(error = %err, "stock commit failed");
                    return Err(err.into());
                }
                Err(err) => {
                    warn!(error = %err, "stock commit refused");
                    return Err(err.into());
                }
            }
        }

        Err(InventoryError::ConcurrencyConflict { attempts })
    }

    async fn load_product(&self, product_id: ProductId) -> Result<Product, InventoryError> {
        self.bounded(ProductStore::find_by_id(&*self.store, product_id))
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("product {product_id}")))
    }

    /// Run the commit detached from the caller and wait for its outcome.
    ///
    /// The commit is not raced against the store timeout: abandoning a commit
    /// half-way would leave its outcome unknown.
    async fn commit(&self, planned: PlannedMovement) -> Result<Movement, StoreError> {
        let store = Arc::clone(&self.store);
        let task = tokio::spawn(async move { store.commit(planned.product, planned.movement).await });
        match task.await {
            Ok(result) => result.map(|(_, movement)| movement),
            Err(join_err) => Err(StoreError::Unavailable(format!("commit task failed: {join_err}"))),
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, InventoryError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        with_timeout(self.config.store_timeout, call).await.map_err(|err| {
            if matches!(err, StoreError::Unavailable(_) | StoreError::Corrupt(_)) {
                error!(error = %err, "store read failed");
            }
            err.into()
        })
    }
}
