use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stockledger_core::{AggregateRoot, Entity, MovementId, ProductId};
use stockledger_inventory::{Movement, MovementType};
use stockledger_parties::NamedEntity;
use stockledger_products::Product;

use super::{LedgerStore, MovementStore, NamedStore, ProductStore, StoreError, newest_first};

#[derive(Debug, Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    movements: Vec<Movement>,
}

impl Tables {
    fn code_taken(&self, code: &str, except: Option<ProductId>) -> bool {
        self.products
            .values()
            .any(|p| p.code() == code && Some(p.id_typed()) != except)
    }

    /// Version-checked replace. Returns the stored (re-stamped) product.
    fn replace(&mut self, product: Product) -> Result<Product, StoreError> {
        let id = product.id_typed();
        let current = self
            .products
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))?;
        if current.version() != product.version() {
            return Err(StoreError::Conflict(format!(
                "product {id}: expected version {}, found {}",
                product.version(),
                current.version()
            )));
        }
        let stored = product.stamped(current.version() + 1);
        self.products.insert(id, stored.clone());
        Ok(stored)
    }

    fn append(&mut self, movement: &Movement) -> Result<(), StoreError> {
        if self.movements.iter().any(|m| m.id_typed() == movement.id_typed()) {
            return Err(StoreError::Duplicate(format!("movement {}", movement.id_typed())));
        }
        self.movements.push(movement.clone());
        Ok(())
    }
}

/// In-memory product and ledger store.
///
/// Intended for tests/dev. One lock guards both tables, so `commit` is
/// trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn products_where(&self, keep: impl Fn(&Product) -> bool) -> Result<Vec<Product>, StoreError> {
        let tables = self.read()?;
        let mut out: Vec<Product> = tables.products.values().filter(|&p| keep(p)).cloned().collect();
        out.sort_by(|a, b| a.name().cmp(b.name()).then(a.id_typed().cmp(&b.id_typed())));
        Ok(out)
    }

    fn movements_where(&self, keep: impl Fn(&Movement) -> bool) -> Result<Vec<Movement>, StoreError> {
        let tables = self.read()?;
        let mut out: Vec<Movement> = tables.movements.iter().filter(|&m| keep(m)).cloned().collect();
        newest_first(&mut out);
        Ok(out)
    }
}

#[async_trait]
impl ProductStore for InMemoryStore {
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.read()?.products.values().find(|p| p.code() == code).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Product>, StoreError> {
        self.products_where(|_| true)
    }

    async fn find_by_category(&self, category: &str) -> Result<Vec<Product>, StoreError> {
        self.products_where(|p| p.category() == category)
    }

    async fn find_by_supplier(&self, supplier: &str) -> Result<Vec<Product>, StoreError> {
        self.products_where(|p| p.supplier() == supplier)
    }

    async fn find_low_stock(&self) -> Result<Vec<Product>, StoreError> {
        self.products_where(Product::is_low_stock)
    }

    async fn search(&self, term: &str) -> Result<Vec<Product>, StoreError> {
        self.products_where(|p| p.matches_search(term))
    }

    async fn insert(&self, product: Product) -> Result<Product, StoreError> {
        let mut tables = self.write()?;
        let id = product.id_typed();
        if tables.products.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("product {id}")));
        }
        if tables.code_taken(product.code(), None) {
            return Err(StoreError::Duplicate(format!("product code {}", product.code())));
        }
        let stored = product.stamped(1);
        tables.products.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&self, product: Product) -> Result<Product, StoreError> {
        let mut tables = self.write()?;
        if tables.code_taken(product.code(), Some(product.id_typed())) {
            return Err(StoreError::Duplicate(format!("product code {}", product.code())));
        }
        tables.replace(product)
    }

    async fn delete_by_id(&self, id: ProductId) -> Result<bool, StoreError> {
        Ok(self.write()?.products.remove(&id).is_some())
    }
}

#[async_trait]
impl MovementStore for InMemoryStore {
    async fn find_all(&self) -> Result<Vec<Movement>, StoreError> {
        self.movements_where(|_| true)
    }

    async fn find_by_id(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        Ok(self
            .read()?
            .movements
            .iter()
            .find(|m| m.id_typed() == id)
            .cloned())
    }

    async fn find_by_product_id(&self, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        self.movements_where(|m| m.product_id() == product_id)
    }

    async fn find_by_type(&self, movement_type: MovementType) -> Result<Vec<Movement>, StoreError> {
        self.movements_where(|m| m.movement_type() == movement_type)
    }

    async fn find_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Movement>, StoreError> {
        self.movements_where(|m| m.date() >= start && m.date() <= end)
    }

    async fn find_most_recent(&self, limit: usize) -> Result<Vec<Movement>, StoreError> {
        let mut all = self.movements_where(|_| true)?;
        all.truncate(limit);
        Ok(all)
    }

    async fn find_since(&self, since: DateTime<Utc>) -> Result<Vec<Movement>, StoreError> {
        self.movements_where(|m| m.date() >= since)
    }

    async fn save(&self, movement: Movement) -> Result<Movement, StoreError> {
        self.write()?.append(&movement)?;
        Ok(movement)
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn commit(
        &self,
        product: Product,
        movement: Movement,
    ) -> Result<(Product, Movement), StoreError> {
        if movement.product_id() != product.id_typed() {
            return Err(StoreError::Corrupt(format!(
                "movement {} targets product {}, not {}",
                movement.id_typed(),
                movement.product_id(),
                product.id_typed()
            )));
        }

        let mut tables = self.write()?;
        // Check both writes before applying either.
        if tables.movements.iter().any(|m| m.id_typed() == movement.id_typed()) {
            return Err(StoreError::Duplicate(format!("movement {}", movement.id_typed())));
        }
        let stored = tables.replace(product)?;
        tables.append(&movement)?;
        Ok((stored, movement))
    }
}

/// In-memory store for categories and suppliers.
#[derive(Debug)]
pub struct InMemoryNamedStore<T: NamedEntity> {
    rows: RwLock<HashMap<T::Id, T>>,
}

impl<T: NamedEntity> Default for InMemoryNamedStore<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: NamedEntity> InMemoryNamedStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<T::Id, T>>, StoreError> {
        self.rows
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<T::Id, T>>, StoreError> {
        self.rows
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))
    }
}

fn name_taken<T: NamedEntity>(rows: &HashMap<T::Id, T>, name: &str, except: Option<&T::Id>) -> bool {
    rows.values()
        .any(|e| e.name() == name && Some(e.id()) != except)
}

#[async_trait]
impl<T: NamedEntity> NamedStore<T> for InMemoryNamedStore<T> {
    async fn find_all(&self) -> Result<Vec<T>, StoreError> {
        let mut all: Vec<T> = self.read()?.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(all)
    }

    async fn find_by_id(&self, id: T::Id) -> Result<Option<T>, StoreError> {
        Ok(self.read()?.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<T>, StoreError> {
        Ok(self.read()?.values().find(|e| e.name() == name).cloned())
    }

    async fn insert(&self, entity: T) -> Result<T, StoreError> {
        let mut rows = self.write()?;
        if rows.contains_key(entity.id()) || name_taken(&rows, entity.name(), None) {
            return Err(StoreError::Duplicate(format!("{} {}", T::KIND, entity.name())));
        }
        rows.insert(entity.id().clone(), entity.clone());
        Ok(entity)
    }

    async fn update(&self, entity: T) -> Result<T, StoreError> {
        let mut rows = self.write()?;
        if !rows.contains_key(entity.id()) {
            return Err(StoreError::NotFound(format!("{} {:?}", T::KIND, entity.id())));
        }
        if name_taken(&rows, entity.name(), Some(entity.id())) {
            return Err(StoreError::Duplicate(format!("{} {}", T::KIND, entity.name())));
        }
        rows.insert(entity.id().clone(), entity.clone());
        Ok(entity)
    }

    async fn delete_by_id(&self, id: T::Id) -> Result<bool, StoreError> {
        Ok(self.write()?.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_inventory::{MovementRequest, plan_movement};
    use stockledger_parties::{Category, CategoryDetails};
    use stockledger_products::ProductDetails;
    use stockledger_core::CategoryId;

    fn details(code: &str) -> ProductDetails {
        ProductDetails {
            code: code.to_string(),
            name: format!("Product {code}"),
            description: None,
            category: "Electronics".to_string(),
            supplier: "TechCorp".to_string(),
            purchase_price: 1_000,
            sale_price: 1_500,
            unit: "units".to_string(),
            minimum_stock: 2,
        }
    }

    fn entry(product: &Product, quantity: i64) -> (Product, Movement) {
        let command = MovementRequest {
            product_id: product.id_typed().to_string(),
            movement_type: "entry".to_string(),
            quantity: Some(quantity),
            comments: None,
            created_by: "tester".to_string(),
        }
        .validate()
        .unwrap();
        let planned = plan_movement(product, &command, MovementId::new(), Utc::now()).unwrap();
        (planned.product, planned.movement)
    }

    #[tokio::test]
    async fn insert_stamps_version_and_rejects_duplicate_code() {
        let store = InMemoryStore::new();
        let product = Product::create(ProductId::new(), details("A1"), Utc::now()).unwrap();
        let stored = store.insert(product).await.unwrap();
        assert_eq!(stored.version(), 1);

        let clash = Product::create(ProductId::new(), details("A1"), Utc::now()).unwrap();
        assert!(matches!(store.insert(clash).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn commit_applies_both_writes() {
        let store = InMemoryStore::new();
        let product = store
            .insert(Product::create(ProductId::new(), details("B1"), Utc::now()).unwrap())
            .await
            .unwrap();

        let (next, movement) = entry(&product, 4);
        let (stored, _) = store.commit(next, movement.clone()).await.unwrap();
        assert_eq!(stored.current_stock(), 4);
        assert_eq!(stored.version(), 2);
        assert_eq!(
            MovementStore::find_by_id(&store, movement.id_typed()).await.unwrap(),
            Some(movement)
        );
    }

    #[tokio::test]
    async fn stale_commit_writes_nothing() {
        let store = InMemoryStore::new();
        let product = store
            .insert(Product::create(ProductId::new(), details("C1"), Utc::now()).unwrap())
            .await
            .unwrap();

        let (first, first_movement) = entry(&product, 3);
        let (second, second_movement) = entry(&product, 4);
        store.commit(first, first_movement).await.unwrap();

        let err = store.commit(second, second_movement).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let stored = ProductStore::find_by_id(&store, product.id_typed()).await.unwrap().unwrap();
        assert_eq!(stored.current_stock(), 3);
        assert_eq!(MovementStore::find_all(&store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn movements_are_listed_newest_first() {
        let store = InMemoryStore::new();
        let mut product = store
            .insert(Product::create(ProductId::new(), details("D1"), Utc::now()).unwrap())
            .await
            .unwrap();
        for q in 1..=3 {
            let (next, movement) = entry(&product, q);
            product = store.commit(next, movement).await.unwrap().0;
        }
        let listed = store.find_by_product_id(product.id_typed()).await.unwrap();
        let quantities: Vec<i64> = listed.iter().map(Movement::quantity).collect();
        assert_eq!(quantities, vec![3, 2, 1]);
        assert_eq!(store.find_most_recent(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn named_store_enforces_unique_names() {
        let store = InMemoryNamedStore::<Category>::new();
        let details = CategoryDetails {
            name: "Electronics".to_string(),
            description: None,
        };
        store
            .insert(Category::create(CategoryId::new(), details.clone()).unwrap())
            .await
            .unwrap();
        let err = store
            .insert(Category::create(CategoryId::new(), details).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert!(store.exists_by_name("Electronics").await.unwrap());
    }
}
