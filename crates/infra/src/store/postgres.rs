//! Postgres-backed product, ledger and party stores.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (check constraint violation) | `23514` | `Corrupt` |
//! | Database (other) | Any other | `Unavailable` |
//! | PoolTimedOut / PoolClosed / Io / Tls | N/A | `Unavailable` |
//! | ColumnDecode / Decode | N/A | `Corrupt` |
//! | RowNotFound | N/A | `NotFound` |
//!
//! ## Atomicity
//!
//! `commit` runs the version-guarded product update and the movement insert
//! in one transaction. A lost version check rolls back and reports `Conflict`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use stockledger_core::{AggregateRoot, CategoryId, MovementId, ProductId, SupplierId};
use stockledger_inventory::{Movement, MovementParts, MovementType};
use stockledger_parties::{Category, CategoryDetails, Supplier, SupplierDetails};
use stockledger_products::{Product, ProductDetails, ProductParts};

use super::{LedgerStore, MovementStore, NamedStore, ProductStore, StoreError};

/// Schema statements, applied in order by [`PostgresStore::migrate`].
pub const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id UUID PRIMARY KEY,
        code TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        description TEXT,
        category TEXT NOT NULL,
        supplier TEXT NOT NULL,
        purchase_price BIGINT NOT NULL CHECK (purchase_price > 0),
        sale_price BIGINT NOT NULL CHECK (sale_price > 0),
        unit TEXT NOT NULL,
        current_stock BIGINT NOT NULL CHECK (current_stock >= 0),
        minimum_stock BIGINT NOT NULL CHECK (minimum_stock >= 0),
        version BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS movements (
        id UUID PRIMARY KEY,
        product_id UUID NOT NULL,
        product_name TEXT NOT NULL,
        product_code TEXT NOT NULL,
        movement_type TEXT NOT NULL
            CHECK (movement_type IN ('entry', 'positive_adjustment', 'negative_adjustment', 'return')),
        quantity BIGINT NOT NULL,
        previous_stock BIGINT NOT NULL CHECK (previous_stock >= 0),
        new_stock BIGINT NOT NULL CHECK (new_stock >= 0),
        date TIMESTAMPTZ NOT NULL,
        comments TEXT,
        created_by TEXT NOT NULL,
        CHECK (new_stock = previous_stock + quantity)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS movements_product_date_idx ON movements (product_id, date DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS movements_date_idx ON movements (date DESC, id DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        description TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS suppliers (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        contact TEXT NOT NULL,
        phone TEXT,
        email TEXT
    )
    "#,
];

const PRODUCT_COLUMNS: &str = "id, code, name, description, category, supplier, purchase_price, \
     sale_price, unit, current_stock, minimum_stock, version, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, product_id, product_name, product_code, movement_type, \
     quantity, previous_stock, new_stock, date, comments, created_by";

const NEWEST_FIRST: &str = "ORDER BY date DESC, id DESC";

/// Postgres store for products, movements, categories and suppliers.
///
/// `Send + Sync`; the SQLx pool handles connection sharing.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    #[instrument(skip(database_url), err)]
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("migrate", e))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn products_where(
        &self,
        operation: &str,
        condition: &str,
        binds: &[&str],
    ) -> Result<Vec<Product>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products {condition} ORDER BY name ASC, id ASC");
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(product_from_row).collect()
    }

    async fn movements_where<'q>(
        &self,
        operation: &str,
        sql: &'q str,
        bind: impl FnOnce(
            sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
        ) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    ) -> Result<Vec<Movement>, StoreError> {
        let rows = bind(sqlx::query(sql))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        let movements: Vec<Movement> = rows
            .iter()
            .map(movement_from_row)
            .collect::<Result<_, _>>()?;
        Span::current().record("movement_count", movements.len());
        Ok(movements)
    }
}

#[async_trait]
impl ProductStore for PostgresStore {
    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn find_by_id(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_product_by_id", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_by_code(&self, code: &str) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE code = $1");
        let row = sqlx::query(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_product_by_code", e))?;
        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn exists_by_code(&self, code: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM products WHERE code = $1)")
            .bind(code)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("exists_product_by_code", e))
    }

    async fn find_all(&self) -> Result<Vec<Product>, StoreError> {
        self.products_where("find_all_products", "", &[]).await
    }

    async fn find_by_category(&self, category: &str) -> Result<Vec<Product>, StoreError> {
        self.products_where("find_products_by_category", "WHERE category = $1", &[category])
            .await
    }

    async fn find_by_supplier(&self, supplier: &str) -> Result<Vec<Product>, StoreError> {
        self.products_where("find_products_by_supplier", "WHERE supplier = $1", &[supplier])
            .await
    }

    async fn find_low_stock(&self) -> Result<Vec<Product>, StoreError> {
        self.products_where("find_low_stock", "WHERE current_stock <= minimum_stock", &[])
            .await
    }

    #[instrument(skip(self), err)]
    async fn search(&self, term: &str) -> Result<Vec<Product>, StoreError> {
        let term = term.trim();
        if term.is_empty() {
            return ProductStore::find_all(self).await;
        }
        let pattern = like_pattern(term);
        self.products_where(
            "search_products",
            "WHERE name ILIKE $1 ESCAPE '\\' OR code ILIKE $1 ESCAPE '\\' \
             OR description ILIKE $1 ESCAPE '\\'",
            &[pattern.as_str()],
        )
        .await
    }

    #[instrument(skip(self, product), fields(product_id = %product.id_typed(), code = product.code()), err)]
    async fn insert(&self, product: Product) -> Result<Product, StoreError> {
        let stored = product.stamped(1);
        let sql = format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        );
        sqlx::query(&sql)
            .bind(stored.id_typed().as_uuid())
            .bind(stored.code())
            .bind(stored.name())
            .bind(stored.description())
            .bind(stored.category())
            .bind(stored.supplier())
            .bind(to_db_price("purchase_price", stored.purchase_price())?)
            .bind(to_db_price("sale_price", stored.sale_price())?)
            .bind(stored.unit())
            .bind(stored.current_stock())
            .bind(stored.minimum_stock())
            .bind(to_db_version(stored.version())?)
            .bind(stored.created_at())
            .bind(stored.updated_at())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;
        Ok(stored)
    }

    #[instrument(skip(self, product), fields(product_id = %product.id_typed(), version = product.version()), err)]
    async fn update(&self, product: Product) -> Result<Product, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE products SET
                code = $3, name = $4, description = $5, category = $6, supplier = $7,
                purchase_price = $8, sale_price = $9, unit = $10, minimum_stock = $11,
                updated_at = $12, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(product.id_typed().as_uuid())
        .bind(to_db_version(product.version())?)
        .bind(product.code())
        .bind(product.name())
        .bind(product.description())
        .bind(product.category())
        .bind(product.supplier())
        .bind(to_db_price("purchase_price", product.purchase_price())?)
        .bind(to_db_price("sale_price", product.sale_price())?)
        .bind(product.unit())
        .bind(product.minimum_stock())
        .bind(product.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_product", e))?;

        if result.rows_affected() == 0 {
            return Err(self.explain_missed_write(&product).await);
        }
        let version = product.version() + 1;
        Ok(product.stamped(version))
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_by_id(&self, id: ProductId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;
        Ok(result.rows_affected() > 0)
    }
}

impl PostgresStore {
    /// A guarded write touched no rows: either the product is gone or its version moved on.
    async fn explain_missed_write(&self, product: &Product) -> StoreError {
        match ProductStore::find_by_id(self, product.id_typed()).await {
            Ok(None) => StoreError::NotFound(format!("product {}", product.id_typed())),
            Ok(Some(current)) => StoreError::Conflict(format!(
                "product {}: expected version {}, found {}",
                product.id_typed(),
                product.version(),
                current.version()
            )),
            Err(err) => err,
        }
    }
}

#[async_trait]
impl MovementStore for PostgresStore {
    #[instrument(skip(self), fields(movement_count), err)]
    async fn find_all(&self) -> Result<Vec<Movement>, StoreError> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements {NEWEST_FIRST}");
        self.movements_where("find_all_movements", &sql, |q| q).await
    }

    #[instrument(skip(self), fields(movement_id = %id), err)]
    async fn find_by_id(&self, id: MovementId) -> Result<Option<Movement>, StoreError> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_movement_by_id", e))?;
        row.as_ref().map(movement_from_row).transpose()
    }

    #[instrument(skip(self), fields(product_id = %product_id, movement_count), err)]
    async fn find_by_product_id(&self, product_id: ProductId) -> Result<Vec<Movement>, StoreError> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE product_id = $1 {NEWEST_FIRST}");
        self.movements_where("find_movements_by_product", &sql, |q| {
            q.bind(*product_id.as_uuid())
        })
        .await
    }

    #[instrument(skip(self), fields(movement_count), err)]
    async fn find_by_type(&self, movement_type: MovementType) -> Result<Vec<Movement>, StoreError> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE movement_type = $1 {NEWEST_FIRST}");
        self.movements_where("find_movements_by_type", &sql, |q| q.bind(movement_type.as_str()))
            .await
    }

    #[instrument(skip(self), fields(movement_count), err)]
    async fn find_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Movement>, StoreError> {
        let sql = format!(
            "SELECT {MOVEMENT_COLUMNS} FROM movements WHERE date >= $1 AND date <= $2 {NEWEST_FIRST}"
        );
        self.movements_where("find_movements_by_date_range", &sql, |q| q.bind(start).bind(end))
            .await
    }

    #[instrument(skip(self), fields(movement_count), err)]
    async fn find_most_recent(&self, limit: usize) -> Result<Vec<Movement>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements {NEWEST_FIRST} LIMIT $1");
        self.movements_where("find_most_recent_movements", &sql, |q| q.bind(limit))
            .await
    }

    #[instrument(skip(self), fields(movement_count), err)]
    async fn find_since(&self, since: DateTime<Utc>) -> Result<Vec<Movement>, StoreError> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE date >= $1 {NEWEST_FIRST}");
        self.movements_where("find_movements_since", &sql, |q| q.bind(since))
            .await
    }

    #[instrument(skip(self, movement), fields(movement_id = %movement.id_typed()), err)]
    async fn save(&self, movement: Movement) -> Result<Movement, StoreError> {
        insert_movement(&self.pool, &movement)
            .await
            .map_err(|e| map_sqlx_error("save_movement", e))?;
        Ok(movement)
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    #[instrument(
        skip(self, product, movement),
        fields(
            product_id = %product.id_typed(),
            movement_id = %movement.id_typed(),
            expected_version = product.version(),
            new_stock = movement.new_stock()
        ),
        err
    )]
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

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let result = sqlx::query(
            r#"
            UPDATE products
            SET current_stock = $3, updated_at = $4, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(product.id_typed().as_uuid())
        .bind(to_db_version(product.version())?)
        .bind(product.current_stock())
        .bind(product.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_stock", e))?;

        if result.rows_affected() == 0 {
            // Dropping `tx` rolls back.
            drop(tx);
            return Err(self.explain_missed_write(&product).await);
        }

        insert_movement(&mut *tx, &movement)
            .await
            .map_err(|e| map_sqlx_error("insert_movement", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let version = product.version() + 1;
        Ok((product.stamped(version), movement))
    }
}

async fn insert_movement<'e, E>(executor: E, movement: &Movement) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Postgres>,
{
    let sql = format!(
        "INSERT INTO movements ({MOVEMENT_COLUMNS}) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
    );
    sqlx::query(&sql)
        .bind(movement.id_typed().as_uuid())
        .bind(movement.product_id().as_uuid())
        .bind(movement.product_name())
        .bind(movement.product_code())
        .bind(movement.movement_type().as_str())
        .bind(movement.quantity())
        .bind(movement.previous_stock())
        .bind(movement.new_stock())
        .bind(movement.date())
        .bind(movement.comments())
        .bind(movement.created_by())
        .execute(executor)
        .await?;
    Ok(())
}

#[async_trait]
impl NamedStore<Category> for PostgresStore {
    async fn find_all(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query("SELECT id, name, description FROM categories ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_all_categories", e))?;
        rows.iter().map(category_from_row).collect()
    }

    async fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query("SELECT id, name, description FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_category_by_id", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query("SELECT id, name, description FROM categories WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_category_by_name", e))?;
        row.as_ref().map(category_from_row).transpose()
    }

    async fn insert(&self, category: Category) -> Result<Category, StoreError> {
        sqlx::query("INSERT INTO categories (id, name, description) VALUES ($1, $2, $3)")
            .bind(category.id_typed().as_uuid())
            .bind(stockledger_parties::NamedEntity::name(&category))
            .bind(category.description())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_category", e))?;
        Ok(category)
    }

    async fn update(&self, category: Category) -> Result<Category, StoreError> {
        let result = sqlx::query("UPDATE categories SET name = $2, description = $3 WHERE id = $1")
            .bind(category.id_typed().as_uuid())
            .bind(stockledger_parties::NamedEntity::name(&category))
            .bind(category.description())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_category", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("category {}", category.id_typed())));
        }
        Ok(category)
    }

    async fn delete_by_id(&self, id: CategoryId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl NamedStore<Supplier> for PostgresStore {
    async fn find_all(&self) -> Result<Vec<Supplier>, StoreError> {
        let rows = sqlx::query("SELECT id, name, contact, phone, email FROM suppliers ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_all_suppliers", e))?;
        rows.iter().map(supplier_from_row).collect()
    }

    async fn find_by_id(&self, id: SupplierId) -> Result<Option<Supplier>, StoreError> {
        let row = sqlx::query("SELECT id, name, contact, phone, email FROM suppliers WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_supplier_by_id", e))?;
        row.as_ref().map(supplier_from_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Supplier>, StoreError> {
        let row = sqlx::query("SELECT id, name, contact, phone, email FROM suppliers WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_supplier_by_name", e))?;
        row.as_ref().map(supplier_from_row).transpose()
    }

    async fn insert(&self, supplier: Supplier) -> Result<Supplier, StoreError> {
        sqlx::query("INSERT INTO suppliers (id, name, contact, phone, email) VALUES ($1, $2, $3, $4, $5)")
            .bind(supplier.id_typed().as_uuid())
            .bind(stockledger_parties::NamedEntity::name(&supplier))
            .bind(supplier.contact())
            .bind(supplier.phone())
            .bind(supplier.email())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_supplier", e))?;
        Ok(supplier)
    }

    async fn update(&self, supplier: Supplier) -> Result<Supplier, StoreError> {
        let result = sqlx::query(
            "UPDATE suppliers SET name = $2, contact = $3, phone = $4, email = $5 WHERE id = $1",
        )
        .bind(supplier.id_typed().as_uuid())
        .bind(stockledger_parties::NamedEntity::name(&supplier))
        .bind(supplier.contact())
        .bind(supplier.phone())
        .bind(supplier.email())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_supplier", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("supplier {}", supplier.id_typed())));
        }
        Ok(supplier)
    }

    async fn delete_by_id(&self, id: SupplierId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM suppliers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_supplier", e))?;
        Ok(result.rows_affected() > 0)
    }
}

// Row decoding

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_product", e);
    let parts = ProductParts {
        id: ProductId::from_uuid(row.try_get("id").map_err(decode)?),
        details: ProductDetails {
            code: row.try_get("code").map_err(decode)?,
            name: row.try_get("name").map_err(decode)?,
            description: row.try_get("description").map_err(decode)?,
            category: row.try_get("category").map_err(decode)?,
            supplier: row.try_get("supplier").map_err(decode)?,
            purchase_price: from_db_u64("purchase_price", row.try_get("purchase_price").map_err(decode)?)?,
            sale_price: from_db_u64("sale_price", row.try_get("sale_price").map_err(decode)?)?,
            unit: row.try_get("unit").map_err(decode)?,
            minimum_stock: row.try_get("minimum_stock").map_err(decode)?,
        },
        current_stock: row.try_get("current_stock").map_err(decode)?,
        version: from_db_u64("version", row.try_get("version").map_err(decode)?)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    };
    Product::restore(parts).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn movement_from_row(row: &PgRow) -> Result<Movement, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_movement", e);
    let raw_type: String = row.try_get("movement_type").map_err(decode)?;
    let movement_type: MovementType = raw_type
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown movement type '{raw_type}'")))?;
    let parts = MovementParts {
        id: MovementId::from_uuid(row.try_get("id").map_err(decode)?),
        product_id: ProductId::from_uuid(row.try_get("product_id").map_err(decode)?),
        product_name: row.try_get("product_name").map_err(decode)?,
        product_code: row.try_get("product_code").map_err(decode)?,
        movement_type,
        quantity: row.try_get("quantity").map_err(decode)?,
        previous_stock: row.try_get("previous_stock").map_err(decode)?,
        new_stock: row.try_get("new_stock").map_err(decode)?,
        date: row.try_get("date").map_err(decode)?,
        comments: row.try_get("comments").map_err(decode)?,
        created_by: row.try_get("created_by").map_err(decode)?,
    };
    Movement::restore(parts).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn category_from_row(row: &PgRow) -> Result<Category, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_category", e);
    let details = CategoryDetails {
        name: row.try_get("name").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
    };
    Category::create(CategoryId::from_uuid(row.try_get("id").map_err(decode)?), details)
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn supplier_from_row(row: &PgRow) -> Result<Supplier, StoreError> {
    let decode = |e: sqlx::Error| map_sqlx_error("decode_supplier", e);
    let details = SupplierDetails {
        name: row.try_get("name").map_err(decode)?,
        contact: row.try_get("contact").map_err(decode)?,
        phone: row.try_get("phone").map_err(decode)?,
        email: row.try_get("email").map_err(decode)?,
    };
    Supplier::create(SupplierId::from_uuid(row.try_get("id").map_err(decode)?), details)
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn to_db_price(column: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} {value} exceeds BIGINT")))
}

fn to_db_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("version {version} exceeds BIGINT")))
}

fn from_db_u64(column: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} is negative: {value}")))
}

/// `%term%` with LIKE metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                Some("23514") => StoreError::Corrupt(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::RowNotFound => {
            StoreError::NotFound(format!("unexpected row not found in {}", operation))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Corrupt(format!("decode error in {}: {}", operation, err))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {}: {}", operation, err)),
    }
}
