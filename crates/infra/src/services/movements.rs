use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use stockledger_core::{MovementId, ProductId};
use stockledger_inventory::{Movement, MovementType};

use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::store::{MovementStore, with_timeout};

/// Read-only queries over the movement ledger. Every list is newest first.
pub struct MovementQueries<S> {
    store: Arc<S>,
    config: InventoryConfig,
}

impl<S: MovementStore> MovementQueries<S> {
    pub fn new(store: Arc<S>, config: InventoryConfig) -> Self {
        Self { store, config }
    }

    pub async fn all(&self) -> Result<Vec<Movement>, InventoryError> {
        Ok(with_timeout(self.config.store_timeout, self.store.find_all()).await?)
    }

    pub async fn by_id(&self, id: MovementId) -> Result<Movement, InventoryError> {
        with_timeout(self.config.store_timeout, self.store.find_by_id(id))
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("movement {id}")))
    }

    pub async fn by_product(&self, product_id: ProductId) -> Result<Vec<Movement>, InventoryError> {
        Ok(with_timeout(self.config.store_timeout, self.store.find_by_product_id(product_id)).await?)
    }

    pub async fn by_type(&self, movement_type: MovementType) -> Result<Vec<Movement>, InventoryError> {
        Ok(with_timeout(self.config.store_timeout, self.store.find_by_type(movement_type)).await?)
    }

    /// Movements dated within `[start, end]`.
    pub async fn by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Movement>, InventoryError> {
        if start > end {
            return Err(InventoryError::validation(
                "date_range",
                format!("start {start} is after end {end}"),
            ));
        }
        Ok(with_timeout(self.config.store_timeout, self.store.find_by_date_range(start, end)).await?)
    }

    /// The configured number of most recent movements.
    pub async fn latest(&self) -> Result<Vec<Movement>, InventoryError> {
        let limit = self.config.latest_movements_limit;
        Ok(with_timeout(self.config.store_timeout, self.store.find_most_recent(limit)).await?)
    }

    /// Movements from the last `days` days; `None` uses the configured window.
    pub async fn recent(&self, days: Option<i64>) -> Result<Vec<Movement>, InventoryError> {
        let since = self.window_start(days)?;
        Ok(with_timeout(self.config.store_timeout, self.store.find_since(since)).await?)
    }

    pub async fn count_since(&self, since: DateTime<Utc>) -> Result<usize, InventoryError> {
        let movements = with_timeout(self.config.store_timeout, self.store.find_since(since)).await?;
        Ok(movements.len())
    }

    pub(crate) fn window_start(&self, days: Option<i64>) -> Result<DateTime<Utc>, InventoryError> {
        let days = days.unwrap_or(self.config.recent_window_days);
        if days < 0 {
            return Err(InventoryError::validation("days", "cannot be negative"));
        }
        let window = Duration::try_days(days)
            .ok_or_else(|| InventoryError::validation("days", "window is too large"))?;
        Utc::now()
            .checked_sub_signed(window)
            .ok_or_else(|| InventoryError::validation("days", "window is too large"))
    }
}
