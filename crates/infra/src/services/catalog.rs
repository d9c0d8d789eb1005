use std::sync::Arc;

use tracing::{info, instrument, warn};

use stockledger_core::ProductId;
use stockledger_products::{Product, ProductDetails};

use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::store::{self, ProductStore, StoreError, with_timeout};

/// Product catalog: descriptive data and stock-level reads.
pub struct ProductCatalog<S> {
    store: Arc<S>,
    config: InventoryConfig,
}

impl<S: ProductStore> ProductCatalog<S> {
    pub fn new(store: Arc<S>, config: InventoryConfig) -> Self {
        Self { store, config }
    }

    /// Register a new product with zero stock.
    #[instrument(skip(self, details), fields(code = %details.code), err)]
    pub async fn create_product(&self, details: ProductDetails) -> Result<Product, InventoryError> {
        let product = Product::create(ProductId::new(), details, store::now())?;
        if self
            .bounded(self.store.exists_by_code(product.code()))
            .await?
        {
            return Err(InventoryError::AlreadyExists(format!("product code {}", product.code())));
        }
        let stored = self.bounded(self.store.insert(product)).await?;
        info!(product_id = %stored.id_typed(), "product created");
        Ok(stored)
    }

    /// Replace descriptive fields. Stock is never touched here.
    #[instrument(skip(self, details), err)]
    pub async fn update_product(
        &self,
        id: ProductId,
        details: ProductDetails,
    ) -> Result<Product, InventoryError> {
        details.validate()?;
        let attempts = self.config.commit_attempts();

        for attempt in 1..=attempts {
            let mut product = self.get_product(id).await?;
            if product.code() != details.code
                && self.bounded(self.store.exists_by_code(&details.code)).await?
            {
                return Err(InventoryError::AlreadyExists(format!("product code {}", details.code)));
            }
            product.edit(details.clone(), store::now())?;

            match with_timeout(self.config.store_timeout, self.store.update(product)).await {
                Ok(stored) => return Ok(stored),
                // A stock movement bumped the version; re-read and re-apply the edit.
                Err(StoreError::Conflict(msg)) => warn!(attempt, %msg, "product edit lost a version race"),
                Err(err) => return Err(err.into()),
            }
        }
        Err(InventoryError::ConcurrencyConflict { attempts })
    }

    /// Remove a product. Its movements stay in the ledger.
    #[instrument(skip(self), err)]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), InventoryError> {
        if self.bounded(self.store.delete_by_id(id)).await? {
            info!("product deleted");
            Ok(())
        } else {
            Err(InventoryError::NotFound(format!("product {id}")))
        }
    }

    pub async fn get_product(&self, id: ProductId) -> Result<Product, InventoryError> {
        self.bounded(self.store.find_by_id(id))
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("product {id}")))
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Product, InventoryError> {
        self.bounded(self.store.find_by_code(code.trim()))
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("product code {}", code.trim())))
    }

    pub async fn list_products(&self) -> Result<Vec<Product>, InventoryError> {
        self.bounded(self.store.find_all()).await
    }

    pub async fn by_category(&self, category: &str) -> Result<Vec<Product>, InventoryError> {
        self.bounded(self.store.find_by_category(category)).await
    }

    pub async fn by_supplier(&self, supplier: &str) -> Result<Vec<Product>, InventoryError> {
        self.bounded(self.store.find_by_supplier(supplier)).await
    }

    pub async fn low_stock(&self) -> Result<Vec<Product>, InventoryError> {
        self.bounded(self.store.find_low_stock()).await
    }

    pub async fn search(&self, term: &str) -> Result<Vec<Product>, InventoryError> {
        self.bounded(self.store.search(term)).await
    }

    /// Sum of `current_stock * sale_price` over the catalog, in minor units.
    pub async fn total_inventory_value(&self) -> Result<u128, InventoryError> {
        let products = self.list_products().await?;
        Ok(products.iter().map(Product::stock_value).sum())
    }

    async fn bounded<T>(
        &self,
        call: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, InventoryError> {
        Ok(with_timeout(self.config.store_timeout, call).await?)
    }
}
