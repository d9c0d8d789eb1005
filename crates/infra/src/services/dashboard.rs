use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::services::{MovementQueries, ProductCatalog};
use crate::store::{MovementStore, ProductStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: usize,
}

/// Summary figures for the inventory overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_products: usize,
    /// Stock valued at sale price, in minor currency units.
    pub total_value: u128,
    pub low_stock_items: usize,
    /// Movements inside the configured recent window.
    pub recent_movements: usize,
    /// Product count per category name, sorted by name.
    pub categories: Vec<CategoryCount>,
}

pub struct Dashboard<S> {
    catalog: ProductCatalog<S>,
    movements: MovementQueries<S>,
}

impl<S> Dashboard<S>
where
    S: ProductStore + MovementStore,
{
    pub fn new(store: Arc<S>, config: InventoryConfig) -> Self {
        Self {
            catalog: ProductCatalog::new(Arc::clone(&store), config.clone()),
            movements: MovementQueries::new(store, config),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn stats(&self) -> Result<DashboardStats, InventoryError> {
        let products = self.catalog.list_products().await?;
        let since = self.movements.window_start(None)?;
        let recent_movements = self.movements.count_since(since).await?;

        let mut per_category: BTreeMap<&str, usize> = BTreeMap::new();
        for product in &products {
            *per_category.entry(product.category()).or_default() += 1;
        }

        Ok(DashboardStats {
            total_products: products.len(),
            total_value: products.iter().map(|p| p.stock_value()).sum(),
            low_stock_items: products.iter().filter(|p| p.is_low_stock()).count(),
            recent_movements,
            categories: per_category
                .into_iter()
                .map(|(name, count)| CategoryCount {
                    name: name.to_string(),
                    count,
                })
                .collect(),
        })
    }
}
