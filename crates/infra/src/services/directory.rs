//! Category and supplier directories.
//!
//! Products refer to these by name only, so deletes never cascade.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{info, instrument};

use stockledger_core::{CategoryId, DomainResult, SupplierId};
use stockledger_parties::{Category, CategoryDetails, NamedEntity, Supplier, SupplierDetails};

use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::store::{NamedStore, with_timeout};

/// Uniquely-named reference entities of one kind.
pub struct Directory<T, S> {
    store: Arc<S>,
    config: InventoryConfig,
    _kind: PhantomData<fn() -> T>,
}

pub type CategoryDirectory<S> = Directory<Category, S>;
pub type SupplierDirectory<S> = Directory<Supplier, S>;

impl<T, S> Directory<T, S>
where
    T: NamedEntity,
    S: NamedStore<T>,
{
    pub fn new(store: Arc<S>, config: InventoryConfig) -> Self {
        Self {
            store,
            config,
            _kind: PhantomData,
        }
    }

    pub async fn list(&self) -> Result<Vec<T>, InventoryError> {
        Ok(with_timeout(self.config.store_timeout, self.store.find_all()).await?)
    }

    pub async fn get(&self, id: T::Id) -> Result<T, InventoryError> {
        with_timeout(self.config.store_timeout, self.store.find_by_id(id.clone()))
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("{} {:?}", T::KIND, id)))
    }

    pub async fn get_by_name(&self, name: &str) -> Result<T, InventoryError> {
        let name = name.trim();
        with_timeout(self.config.store_timeout, self.store.find_by_name(name))
            .await?
            .ok_or_else(|| InventoryError::NotFound(format!("{} {name}", T::KIND)))
    }

    async fn create(&self, entity: T) -> Result<T, InventoryError> {
        if with_timeout(self.config.store_timeout, self.store.exists_by_name(entity.name())).await? {
            return Err(InventoryError::AlreadyExists(format!("{} {}", T::KIND, entity.name())));
        }
        let stored = with_timeout(self.config.store_timeout, self.store.insert(entity)).await?;
        info!(kind = T::KIND, name = stored.name(), "directory entry created");
        Ok(stored)
    }

    async fn update_with<F>(&self, id: T::Id, apply: F) -> Result<T, InventoryError>
    where
        F: FnOnce(&mut T) -> DomainResult<()>,
    {
        let mut entity = self.get(id).await?;
        let old_name = entity.name().to_string();
        apply(&mut entity)?;
        if entity.name() != old_name
            && with_timeout(self.config.store_timeout, self.store.exists_by_name(entity.name())).await?
        {
            return Err(InventoryError::AlreadyExists(format!("{} {}", T::KIND, entity.name())));
        }
        Ok(with_timeout(self.config.store_timeout, self.store.update(entity)).await?)
    }

    /// Remove an entry. Products naming it are left alone.
    #[instrument(skip(self), fields(kind = T::KIND), err)]
    pub async fn delete(&self, id: T::Id) -> Result<(), InventoryError> {
        if with_timeout(self.config.store_timeout, self.store.delete_by_id(id.clone())).await? {
            Ok(())
        } else {
            Err(InventoryError::NotFound(format!("{} {:?}", T::KIND, id)))
        }
    }
}

impl<S: NamedStore<Category>> Directory<Category, S> {
    #[instrument(skip(self, details), fields(name = %details.name), err)]
    pub async fn create_category(&self, details: CategoryDetails) -> Result<Category, InventoryError> {
        self.create(Category::create(CategoryId::new(), details)?).await
    }

    #[instrument(skip(self, details), err)]
    pub async fn update_category(
        &self,
        id: CategoryId,
        details: CategoryDetails,
    ) -> Result<Category, InventoryError> {
        self.update_with(id, |category| category.update(details)).await
    }
}

impl<S: NamedStore<Supplier>> Directory<Supplier, S> {
    #[instrument(skip(self, details), fields(name = %details.name), err)]
    pub async fn create_supplier(&self, details: SupplierDetails) -> Result<Supplier, InventoryError> {
        self.create(Supplier::create(SupplierId::new(), details)?).await
    }

    #[instrument(skip(self, details), err)]
    pub async fn update_supplier(
        &self,
        id: SupplierId,
        details: SupplierDetails,
    ) -> Result<Supplier, InventoryError> {
        self.update_with(id, |supplier| supplier.update(details)).await
    }
}
