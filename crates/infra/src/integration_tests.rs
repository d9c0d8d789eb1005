//! End-to-end tests: engine + services over the in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use tracing::Level;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use stockledger_core::{AggregateRoot, MovementId, ProductId};
use stockledger_inventory::{Movement, MovementRequest, MovementType};
use stockledger_parties::{Category, Supplier};
use stockledger_products::{Product, ProductDetails};

use crate::config::InventoryConfig;
use crate::error::InventoryError;
use crate::ledger_engine::LedgerEngine;
use crate::seed::seed_defaults;
use crate::services::{Dashboard, Directory, MovementQueries, ProductCatalog};
use crate::store::{
    InMemoryNamedStore, InMemoryStore, LedgerStore, MovementStore, ProductStore, StoreError,
};

fn init_tracing() {
    stockledger_observability::init();
}

fn details(code: &str) -> ProductDetails {
    ProductDetails {
        code: code.to_string(),
        name: "Laptop HP Pavilion".to_string(),
        description: Some("15 inch laptop".to_string()),
        category: "Electronics".to_string(),
        supplier: "TechCorp".to_string(),
        purchase_price: 80_000,
        sale_price: 120_000,
        unit: "units".to_string(),
        minimum_stock: 5,
    }
}

fn request(product_id: ProductId, movement_type: &str, quantity: i64) -> MovementRequest {
    MovementRequest {
        product_id: product_id.to_string(),
        movement_type: movement_type.to_string(),
        quantity: Some(quantity),
        comments: None,
        created_by: "tester".to_string(),
    }
}

struct Fixture<S> {
    store: Arc<S>,
    engine: LedgerEngine<S>,
    catalog: ProductCatalog<S>,
}

impl<S: LedgerStore + 'static> Fixture<S> {
    fn new(store: S, config: InventoryConfig) -> Self {
        init_tracing();
        let store = Arc::new(store);
        Self {
            engine: LedgerEngine::new(Arc::clone(&store), config.clone()),
            catalog: ProductCatalog::new(Arc::clone(&store), config),
            store,
        }
    }

    async fn product_with_stock(&self, code: &str, stock: i64) -> ProductId {
        let product = self.catalog.create_product(details(code)).await.unwrap();
        if stock > 0 {
            self.engine
                .set_stock(product.id_typed(), stock, "tester", None)
                .await
                .unwrap();
        }
        product.id_typed()
    }

    async fn stock(&self, id: ProductId) -> i64 {
        self.catalog.get_product(id).await.unwrap().current_stock()
    }

    async fn history(&self, id: ProductId) -> Vec<Movement> {
        MovementStore::find_by_product_id(&*self.store, id).await.unwrap()
    }
}

fn in_memory() -> Fixture<InMemoryStore> {
    Fixture::new(InMemoryStore::new(), InventoryConfig::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_entries_are_both_applied_in_sequence() {
    let fx = in_memory();
    let id = fx.product_with_stock("LAPTOP001", 0).await;

    let a = {
        let engine = fx.engine.clone();
        tokio::spawn(async move { engine.apply_movement(request(id, "entry", 3)).await })
    };
    let b = {
        let engine = fx.engine.clone();
        tokio::spawn(async move { engine.apply_movement(request(id, "entry", 4)).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(fx.stock(id).await, 7);

    let mut history = fx.history(id).await;
    assert_eq!(history.len(), 2);
    history.reverse();
    assert_eq!(history[0].previous_stock(), 0);
    assert_eq!(history[1].previous_stock(), history[0].new_stock());
    assert_eq!(history[1].new_stock(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_movements_keep_the_ledger_consistent() {
    let fx = in_memory();
    let id = fx.product_with_stock("MOUSE001", 20).await;

    let mut tasks = Vec::new();
    for i in 0..40 {
        let engine = fx.engine.clone();
        let (kind, quantity) = if i % 4 == 0 {
            ("negative_adjustment", 2)
        } else {
            ("entry", 1)
        };
        tasks.push(tokio::spawn(async move {
            engine.apply_movement(request(id, kind, quantity)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // 30 entries of +1, 10 adjustments of -2, on top of 20.
    assert_eq!(fx.stock(id).await, 30);
    let audit = fx.engine.audit_product(id).await.unwrap();
    assert!(audit.is_consistent(), "{audit:?}");
    assert_eq!(audit.movement_count, 41);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_engines_sharing_a_store_fall_back_to_version_checks() {
    let fx = in_memory();
    let id = fx.product_with_stock("SHIRT001", 0).await;
    let other = LedgerEngine::new(Arc::clone(&fx.store), InventoryConfig {
        max_conflict_retries: 50,
        ..InventoryConfig::default()
    });
    let ours = LedgerEngine::new(Arc::clone(&fx.store), InventoryConfig {
        max_conflict_retries: 50,
        ..InventoryConfig::default()
    });

    let mut tasks = Vec::new();
    for i in 0..20 {
        let engine = if i % 2 == 0 { ours.clone() } else { other.clone() };
        tasks.push(tokio::spawn(async move {
            engine.apply_movement(request(id, "entry", 1)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(fx.stock(id).await, 20);
    assert!(fx.engine.audit_product(id).await.unwrap().is_consistent());
}

#[tokio::test]
async fn insufficient_stock_leaves_everything_untouched() {
    let fx = in_memory();
    let id = fx.product_with_stock("LAPTOP001", 10).await;
    let before = fx.catalog.get_product(id).await.unwrap();

    let err = fx
        .engine
        .apply_movement(request(id, "negative_adjustment", 20))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        InventoryError::InsufficientStock {
            current_stock: 10,
            requested_adjustment: -20
        }
    );

    let after = fx.catalog.get_product(id).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(fx.history(id).await.len(), 1);
}

#[tokio::test]
async fn invalid_requests_never_reach_the_store() {
    let fx = Fixture::new(FlakyStore::default(), InventoryConfig::default());
    let id = fx.product_with_stock("LAPTOP001", 10).await;
    let reads_before = fx.store.reads.load(Ordering::SeqCst);
    let commits_before = fx.store.commit_calls.load(Ordering::SeqCst);

    let mut missing_quantity = request(id, "entry", 1);
    missing_quantity.quantity = None;
    let mut blank_author = request(id, "entry", 1);
    blank_author.created_by = "  ".to_string();
    let rejected = [
        (missing_quantity, "quantity"),
        (request(id, "entry", 0), "quantity"),
        (request(id, "transfer", 1), "type"),
        (blank_author, "created_by"),
    ];
    for (req, expected) in rejected {
        let err = fx.engine.apply_movement(req).await.unwrap_err();
        assert!(matches!(err, InventoryError::Validation { ref field, .. } if field == expected));
    }
    let mut malformed_id = request(id, "entry", 1);
    malformed_id.product_id = "not-a-uuid".to_string();
    let err = fx.engine.apply_movement(malformed_id).await.unwrap_err();
    assert!(matches!(err, InventoryError::Validation { ref field, .. } if field == "product_id"));

    assert_eq!(fx.store.reads.load(Ordering::SeqCst), reads_before);
    assert_eq!(fx.store.commit_calls.load(Ordering::SeqCst), commits_before);

    // A well-formed request for an unknown product is read, then refused.
    let err = fx
        .engine
        .apply_movement(request(ProductId::new(), "entry", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::NotFound(_)));
    assert_eq!(fx.store.reads.load(Ordering::SeqCst), reads_before + 1);
    assert_eq!(fx.store.commit_calls.load(Ordering::SeqCst), commits_before);

    assert_eq!(fx.stock(id).await, 10);
    assert_eq!(fx.history(id).await.len(), 1);
}

#[tokio::test]
async fn committed_movement_is_immediately_readable() {
    let fx = in_memory();
    let id = fx.product_with_stock("LAPTOP001", 10).await;

    let movement = fx
        .engine
        .apply_movement(request(id, "negative_adjustment", 4))
        .await
        .unwrap();
    assert_eq!(movement.movement_type(), MovementType::NegativeAdjustment);
    assert_eq!(movement.quantity(), -4);
    assert_eq!(movement.previous_stock(), 10);
    assert_eq!(movement.new_stock(), 6);

    let queries = MovementQueries::new(Arc::clone(&fx.store), InventoryConfig::default());
    assert_eq!(queries.by_id(movement.id_typed()).await.unwrap(), movement);
    assert_eq!(fx.stock(id).await, movement.new_stock());
    assert_eq!(fx.history(id).await[0], movement);
}

#[tokio::test]
async fn written_timestamps_survive_microsecond_storage() {
    let fx = in_memory();
    let id = fx.product_with_stock("LAPTOP001", 0).await;

    let movement = fx.engine.apply_movement(request(id, "entry", 3)).await.unwrap();
    assert_eq!(movement.date().nanosecond() % 1_000, 0);

    let product = fx.catalog.get_product(id).await.unwrap();
    assert_eq!(product.created_at().nanosecond() % 1_000, 0);
    assert_eq!(product.updated_at(), movement.date());
}

#[tokio::test]
async fn movement_snapshots_survive_product_edits() {
    let fx = in_memory();
    let id = fx.product_with_stock("LAPTOP001", 0).await;
    let movement = fx.engine.apply_movement(request(id, "entry", 2)).await.unwrap();

    let mut renamed = details("LAPTOP002");
    renamed.name = "Laptop HP Envy".to_string();
    let edited = fx.catalog.update_product(id, renamed).await.unwrap();
    assert_eq!(edited.current_stock(), 2);

    let stored = MovementStore::find_by_id(&*fx.store, movement.id_typed())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.product_name(), "Laptop HP Pavilion");
    assert_eq!(stored.product_code(), "LAPTOP001");

    let next = fx.engine.apply_movement(request(id, "return", 1)).await.unwrap();
    assert_eq!(next.product_code(), "LAPTOP002");
}

#[tokio::test]
async fn set_stock_records_the_difference() {
    let fx = in_memory();
    let id = fx.product_with_stock("LAPTOP001", 10).await;

    let down = fx.engine.set_stock(id, 4, "auditor", None).await.unwrap().unwrap();
    assert_eq!(down.movement_type(), MovementType::NegativeAdjustment);
    assert_eq!(down.quantity(), -6);
    assert_eq!(down.comments(), Some("stock set from 10 to 4"));

    assert_eq!(fx.engine.set_stock(id, 4, "auditor", None).await.unwrap(), None);

    let err = fx.engine.set_stock(id, -1, "auditor", None).await.unwrap_err();
    assert!(matches!(err, InventoryError::Validation { ref field, .. } if field == "stock"));

    assert_eq!(fx.stock(id).await, 4);
    assert!(fx.engine.audit_product(id).await.unwrap().is_consistent());
}

/// Wraps the in-memory store with injectable latency and failures.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    read_delay: Duration,
    commit_delay: Duration,
    commit_failure: Option<StoreError>,
    reads: AtomicU32,
    conflicts_to_inject: AtomicU32,
    commit_calls: AtomicU32,
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl ProductStore for FlakyStore {
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        pause(self.read_delay).await;
        ProductStore::find_by_id(&self.inner, id).await
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Product>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_code(code).await
    }

    async fn find_all(&self) -> Result<Vec<Product>, StoreError> {
        ProductStore::find_all(&self.inner).await
    }

    async fn find_by_category(&self, category: &str) -> Result<Vec<Product>, StoreError> {
        self.inner.find_by_category(category).await
    }

    async fn find_by_supplier(&self, supplier: &str) -> Result<Vec<Product>, StoreError> {
        self.inner.find_by_supplier(supplier).await
    }

    async fn find_low_stock(&self) -> Result<Vec<Product>, StoreError> {
        self.inner.find_low_stock().await
    }

    async fn search(&self, term: &str) -> Result<Vec<Product>, StoreError> {
        self.inner.search(term).await
    }

    async fn insert(&self, product: Product) -> Result<Product, StoreError> {
        self.inner.insert(product).await
    }

    async fn update(&self, product: Product) -> Result<Product, StoreError> {
        self.inner.update(product).await
    }

    async fn delete_by_id(&self, id: ProductId) -> Result<bool, StoreError> {
        self.inner.delete_by_id(id).await
    }
}

#[async_trait]
impl MovementStore for FlakyStore {
    async fn find_all(&self) -> Result<Vec<Movement>, StoreError> {
        MovementStore::find_all(&self.inner).await
    }

    async fn find_by_id(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        MovementStore::find_by_id(&self.inner, id).await
    }

    async fn find_by_product_id(&self, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        self.inner.find_by_product_id(product_id).await
    }

    async fn find_by_type(&self, movement_type: MovementType) -> Result<Vec<Movement>, StoreError> {
        self.inner.find_by_type(movement_type).await
    }

    async fn find_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Movement>, StoreError> {
        self.inner.find_by_date_range(start, end).await
    }

    async fn find_most_recent(&self, limit: usize) -> Result<Vec<Movement>, StoreError> {
        self.inner.find_most_recent(limit).await
    }

    async fn find_since(&self, since: DateTime<Utc>) -> Result<Vec<Movement>, StoreError> {
        self.inner.find_since(since).await
    }

    async fn save(&self, movement: Movement) -> Result<Movement, StoreError> {
        self.inner.save(movement).await
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn commit(
        &self,
        product: Product,
        movement: Movement,
    ) -> Result<(Product, Movement), StoreError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        pause(self.commit_delay).await;
        if let Some(err) = &self.commit_failure {
            return Err(err.clone());
        }
        let injected = self
            .conflicts_to_inject
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Conflict(format!(
                "product {} moved past version {}",
                product.id_typed(),
                product.version()
            )));
        }
        self.inner.commit(product, movement).await
    }
}

#[tokio::test]
async fn slow_reads_surface_as_store_unavailable() {
    let config = InventoryConfig {
        store_timeout: Duration::from_millis(20),
        ..InventoryConfig::default()
    };
    let fx = Fixture::new(
        FlakyStore {
            read_delay: Duration::from_millis(200),
            ..FlakyStore::default()
        },
        config,
    );
    let product = fx
        .store
        .inner
        .insert(Product::create(ProductId::new(), details("SLOW1"), Utc::now()).unwrap())
        .await
        .unwrap();

    let err = fx
        .engine
        .apply_movement(request(product.id_typed(), "entry", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, InventoryError::StoreUnavailable(_)));
    assert!(err.is_transient());
    assert_eq!(fx.store.commit_calls.load(Ordering::SeqCst), 0);
    assert!(fx.history(product.id_typed()).await.is_empty());
}

#[tokio::test]
async fn failed_commit_writes_nothing() {
    let fx = Fixture::new(
        FlakyStore {
            commit_failure: Some(StoreError::Unavailable("connection reset".to_string())),
            ..FlakyStore::default()
        },
        InventoryConfig::default(),
    );
    let id = fx.catalog.create_product(details("FAIL1")).await.unwrap().id_typed();

    let err = fx.engine.apply_movement(request(id, "entry", 5)).await.unwrap_err();
    assert!(matches!(err, InventoryError::StoreUnavailable(_)));
    assert_eq!(fx.stock(id).await, 0);
    assert!(fx.history(id).await.is_empty());
}

/// Collects the level of every event emitted while installed.
#[derive(Clone, Default)]
struct EventLevels(Arc<Mutex<Vec<Level>>>);

impl EventLevels {
    fn recorded(&self) -> Vec<Level> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl<S: tracing::Subscriber> Layer<S> for EventLevels {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*event.metadata().level());
    }
}

async fn levels_logged_for_commit_failure(failure: StoreError) -> Vec<Level> {
    let fx = Fixture::new(
        FlakyStore {
            commit_failure: Some(failure),
            ..FlakyStore::default()
        },
        InventoryConfig::default(),
    );
    let id = fx.catalog.create_product(details("LOG1")).await.unwrap().id_typed();

    let levels = EventLevels::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(levels.clone()));
    assert!(fx.engine.apply_movement(request(id, "entry", 1)).await.is_err());
    levels.recorded()
}

#[tokio::test]
async fn refused_commits_log_below_error() {
    for failure in [
        StoreError::NotFound("product deleted".to_string()),
        StoreError::Duplicate("movement id".to_string()),
    ] {
        let levels = levels_logged_for_commit_failure(failure).await;
        assert!(levels.contains(&Level::WARN));
        assert!(!levels.contains(&Level::ERROR), "{levels:?}");
    }
}

#[tokio::test]
async fn store_faults_during_commit_log_at_error() {
    let levels =
        levels_logged_for_commit_failure(StoreError::Unavailable("connection reset".to_string())).await;
    assert!(levels.contains(&Level::ERROR));
}

#[tokio::test]
async fn lost_version_races_are_retried() {
    let fx = Fixture::new(
        FlakyStore {
            conflicts_to_inject: AtomicU32::new(2),
            ..FlakyStore::default()
        },
        InventoryConfig::default(),
    );
    let id = fx.catalog.create_product(details("RACE1")).await.unwrap().id_typed();

    let movement = fx.engine.apply_movement(request(id, "entry", 5)).await.unwrap();
    assert_eq!(movement.new_stock(), 5);
    assert_eq!(fx.store.commit_calls.load(Ordering::SeqCst), 3);
    assert_eq!(fx.history(id).await.len(), 1);
}

#[tokio::test]
async fn retries_are_bounded() {
    let config = InventoryConfig {
        max_conflict_retries: 2,
        ..InventoryConfig::default()
    };
    let fx = Fixture::new(
        FlakyStore {
            conflicts_to_inject: AtomicU32::new(10),
            ..FlakyStore::default()
        },
        config,
    );
    let id = fx.catalog.create_product(details("RACE2")).await.unwrap().id_typed();

    let err = fx.engine.apply_movement(request(id, "entry", 5)).await.unwrap_err();
    assert_eq!(err, InventoryError::ConcurrencyConflict { attempts: 3 });
    assert_eq!(fx.stock(id).await, 0);
    assert!(fx.history(id).await.is_empty());
}

#[tokio::test]
async fn abandoned_caller_does_not_split_a_commit() {
    let fx = Fixture::new(
        FlakyStore {
            commit_delay: Duration::from_millis(50),
            ..FlakyStore::default()
        },
        InventoryConfig::default(),
    );
    let id = fx.catalog.create_product(details("CANCEL1")).await.unwrap().id_typed();

    let gave_up = tokio::time::timeout(
        Duration::from_millis(10),
        fx.engine.apply_movement(request(id, "entry", 3)),
    )
    .await;
    assert!(gave_up.is_err());

    tokio::time::sleep(Duration::from_millis(150)).await;
    let history = fx.history(id).await;
    assert_eq!(history.len(), 1);
    assert_eq!(fx.stock(id).await, history[0].new_stock());
}

#[tokio::test]
async fn seeding_writes_defaults_once_and_feeds_the_dashboard() {
    let fx = in_memory();
    let categories: Directory<Category, _> =
        Directory::new(Arc::new(InMemoryNamedStore::<Category>::new()), InventoryConfig::default());
    let suppliers: Directory<Supplier, _> =
        Directory::new(Arc::new(InMemoryNamedStore::<Supplier>::new()), InventoryConfig::default());

    let report = seed_defaults(&fx.engine, &fx.catalog, &categories, &suppliers)
        .await
        .unwrap();
    assert_eq!(report.categories, 5);
    assert_eq!(report.suppliers, 4);
    assert_eq!(report.products, 3);
    assert_eq!(report.movements, 3);

    let again = seed_defaults(&fx.engine, &fx.catalog, &categories, &suppliers)
        .await
        .unwrap();
    assert_eq!(again.products + again.categories + again.suppliers, 0);

    for product in fx.catalog.list_products().await.unwrap() {
        let audit = fx.engine.audit_product(product.id_typed()).await.unwrap();
        assert!(audit.is_consistent());
        assert_eq!(audit.opening_stock, 0);
    }

    let dashboard = Dashboard::new(Arc::clone(&fx.store), InventoryConfig::default());
    let stats = dashboard.stats().await.unwrap();
    assert_eq!(stats.total_products, 3);
    // 15 * 1200.00 + 3 * 45.00 + 25 * 60.00
    assert_eq!(stats.total_value, 1_963_500);
    assert_eq!(stats.low_stock_items, 1);
    assert_eq!(stats.recent_movements, 3);
    let names: Vec<&str> = stats.categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Clothing", "Electronics"]);
    assert_eq!(stats.categories[1].count, 2);
}

#[tokio::test]
async fn deleting_a_product_keeps_its_movements() {
    let fx = in_memory();
    let id = fx.product_with_stock("GONE1", 4).await;
    fx.catalog.delete_product(id).await.unwrap();

    assert!(matches!(
        fx.catalog.get_product(id).await,
        Err(InventoryError::NotFound(_))
    ));
    assert_eq!(fx.history(id).await.len(), 1);
    assert!(matches!(
        fx.engine.apply_movement(request(id, "entry", 1)).await,
        Err(InventoryError::NotFound(_))
    ));
}
