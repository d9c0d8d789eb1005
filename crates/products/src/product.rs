use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{AggregateRoot, DomainError, DomainResult, ProductId};

/// Descriptive, caller-editable attributes of a product.
///
/// Stock is deliberately absent: it is owned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    /// Free-text category name (lookup by value, not a foreign key).
    pub category: String,
    /// Free-text supplier name (lookup by value, not a foreign key).
    pub supplier: String,
    /// Purchase price in the smallest currency unit (e.g. cents).
    pub purchase_price: u64,
    /// Sale price in the smallest currency unit (e.g. cents).
    pub sale_price: u64,
    pub unit: String,
    pub minimum_stock: i64,
}

impl ProductDetails {
    pub fn validate(&self) -> DomainResult<()> {
        ensure_not_blank("code", &self.code)?;
        ensure_not_blank("name", &self.name)?;
        ensure_not_blank("category", &self.category)?;
        ensure_not_blank("supplier", &self.supplier)?;
        ensure_not_blank("unit", &self.unit)?;

        if self.purchase_price == 0 {
            return Err(DomainError::validation(
                "purchase_price",
                "must be greater than 0",
            ));
        }
        if self.sale_price == 0 {
            return Err(DomainError::validation("sale_price", "must be greater than 0"));
        }
        if self.minimum_stock < 0 {
            return Err(DomainError::validation("minimum_stock", "cannot be negative"));
        }
        Ok(())
    }

    /// Trim surrounding whitespace; a blank description becomes `None`.
    fn normalized(self) -> Self {
        Self {
            code: self.code.trim().to_string(),
            name: self.name.trim().to_string(),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            category: self.category.trim().to_string(),
            supplier: self.supplier.trim().to_string(),
            unit: self.unit.trim().to_string(),
            ..self
        }
    }
}

fn ensure_not_blank(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(field, "cannot be empty"));
    }
    Ok(())
}

/// Full persisted state of a product, as read back from a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductParts {
    pub id: ProductId,
    pub details: ProductDetails,
    pub current_stock: i64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregate root: Product.
///
/// `current_stock` is an eagerly persisted projection of the movement ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    details: ProductDetails,
    current_stock: i64,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Product {
    /// Create a new, not-yet-persisted product with zero stock.
    pub fn create(id: ProductId, details: ProductDetails, now: DateTime<Utc>) -> DomainResult<Self> {
        details.validate()?;
        Ok(Self {
            id,
            details: details.normalized(),
            current_stock: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild a product from persisted state.
    pub fn restore(parts: ProductParts) -> DomainResult<Self> {
        if parts.current_stock < 0 {
            return Err(DomainError::invariant(format!(
                "product {} has negative stock {}",
                parts.id, parts.current_stock
            )));
        }
        Ok(Self {
            id: parts.id,
            details: parts.details,
            current_stock: parts.current_stock,
            version: parts.version,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn code(&self) -> &str {
        &self.details.code
    }

    pub fn name(&self) -> &str {
        &self.details.name
    }

    pub fn description(&self) -> Option<&str> {
        self.details.description.as_deref()
    }

    pub fn category(&self) -> &str {
        &self.details.category
    }

    pub fn supplier(&self) -> &str {
        &self.details.supplier
    }

    pub fn purchase_price(&self) -> u64 {
        self.details.purchase_price
    }

    pub fn sale_price(&self) -> u64 {
        self.details.sale_price
    }

    pub fn unit(&self) -> &str {
        &self.details.unit
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn minimum_stock(&self) -> i64 {
        self.details.minimum_stock
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Low stock: at or below the configured minimum.
    pub fn is_low_stock(&self) -> bool {
        self.current_stock <= self.details.minimum_stock
    }

    /// Stock valued at sale price, in the smallest currency unit.
    pub fn stock_value(&self) -> u128 {
        // current_stock is never negative, see `restore` and `transition_stock`.
        (self.current_stock.max(0) as u128) * u128::from(self.details.sale_price)
    }

    /// Case-insensitive substring match over name, code and description.
    pub fn matches_search(&self, term: &str) -> bool {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.details.name.to_lowercase().contains(&needle)
            || self.details.code.to_lowercase().contains(&needle)
            || self
                .details
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&needle))
    }

    /// Replace descriptive attributes. Stock is left untouched.
    pub fn edit(&mut self, details: ProductDetails, now: DateTime<Utc>) -> DomainResult<()> {
        details.validate()?;
        self.details = details.normalized();
        self.updated_at = now;
        Ok(())
    }

    /// Move stock from `previous_stock` to `new_stock`.
    ///
    /// The caller must state the stock level it based its computation on; a
    /// mismatch means the caller worked from a stale read.
    pub fn transition_stock(
        &mut self,
        previous_stock: i64,
        new_stock: i64,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if previous_stock != self.current_stock {
            return Err(DomainError::conflict(format!(
                "stale stock for product {}: expected {}, found {}",
                self.id, previous_stock, self.current_stock
            )));
        }
        if new_stock < 0 {
            return Err(DomainError::InsufficientStock {
                current_stock: self.current_stock,
                requested_adjustment: new_stock - previous_stock,
            });
        }
        self.current_stock = new_stock;
        self.updated_at = now;
        Ok(())
    }

    /// Stamp the persisted version. Used by stores after a successful write.
    pub fn stamped(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn details() -> ProductDetails {
        ProductDetails {
            code: "LAPTOP001".to_string(),
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

    fn new_product() -> Product {
        Product::create(ProductId::new(), details(), Utc::now()).unwrap()
    }

    fn expect_field(result: DomainResult<Product>, field: &str) {
        match result {
            Err(DomainError::Validation { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected validation error on {field}, got {other:?}"),
        }
    }

    #[test]
    fn create_starts_with_zero_stock() {
        let product = new_product();
        assert_eq!(product.current_stock(), 0);
        assert_eq!(product.version(), 0);
        assert_eq!(product.created_at(), product.updated_at());
    }

    #[test]
    fn create_rejects_blank_required_fields() {
        for field in ["code", "name", "category", "supplier", "unit"] {
            let mut d = details();
            match field {
                "code" => d.code = "  ".to_string(),
                "name" => d.name = String::new(),
                "category" => d.category = " ".to_string(),
                "supplier" => d.supplier = String::new(),
                _ => d.unit = "\t".to_string(),
            }
            expect_field(Product::create(ProductId::new(), d, Utc::now()), field);
        }
    }

    #[test]
    fn create_rejects_non_positive_prices_and_negative_minimum() {
        let mut d = details();
        d.purchase_price = 0;
        expect_field(Product::create(ProductId::new(), d, Utc::now()), "purchase_price");

        let mut d = details();
        d.sale_price = 0;
        expect_field(Product::create(ProductId::new(), d, Utc::now()), "sale_price");

        let mut d = details();
        d.minimum_stock = -1;
        expect_field(Product::create(ProductId::new(), d, Utc::now()), "minimum_stock");
    }

    #[test]
    fn edit_changes_descriptive_fields_but_not_stock() {
        let mut product = new_product();
        product.transition_stock(0, 12, Utc::now()).unwrap();

        let mut d = details();
        d.name = "Renamed".to_string();
        d.code = "LAPTOP002".to_string();
        let later = Utc::now() + Duration::seconds(5);
        product.edit(d, later).unwrap();

        assert_eq!(product.name(), "Renamed");
        assert_eq!(product.code(), "LAPTOP002");
        assert_eq!(product.current_stock(), 12);
        assert_eq!(product.updated_at(), later);
    }

    #[test]
    fn transition_rejects_stale_previous_stock() {
        let mut product = new_product();
        product.transition_stock(0, 10, Utc::now()).unwrap();

        let err = product.transition_stock(0, 5, Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(product.current_stock(), 10);
    }

    #[test]
    fn transition_rejects_negative_result() {
        let mut product = new_product();
        product.transition_stock(0, 10, Utc::now()).unwrap();

        let err = product.transition_stock(10, -10, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                current_stock: 10,
                requested_adjustment: -20
            }
        );
        assert_eq!(product.current_stock(), 10);
    }

    #[test]
    fn low_stock_is_inclusive_of_minimum() {
        let mut product = new_product();
        assert!(product.is_low_stock());
        product.transition_stock(0, 5, Utc::now()).unwrap();
        assert!(product.is_low_stock());
        product.transition_stock(5, 6, Utc::now()).unwrap();
        assert!(!product.is_low_stock());
    }

    #[test]
    fn stock_value_uses_sale_price() {
        let mut product = new_product();
        product.transition_stock(0, 3, Utc::now()).unwrap();
        assert_eq!(product.stock_value(), 360_000);
    }

    #[test]
    fn search_matches_name_code_and_description_case_insensitively() {
        let product = new_product();
        assert!(product.matches_search("pavilion"));
        assert!(product.matches_search("laptop001"));
        assert!(product.matches_search("15 INCH"));
        assert!(!product.matches_search("mouse"));
    }

    #[test]
    fn restore_rejects_negative_stock() {
        let product = new_product();
        let parts = ProductParts {
            id: product.id_typed(),
            details: product.details().clone(),
            current_stock: -1,
            version: 3,
            created_at: product.created_at(),
            updated_at: product.updated_at(),
        };
        assert!(matches!(
            Product::restore(parts),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Property: descriptive edits never move stock.
            #[test]
            fn edits_never_change_stock(
                stock in 0i64..10_000,
                name in "[A-Za-z][A-Za-z0-9 ]{0,40}",
                code in "[A-Z0-9]{1,12}",
                minimum in 0i64..500
            ) {
                let mut product = new_product();
                product.transition_stock(0, stock, Utc::now()).unwrap();

                let mut d = details();
                d.name = name;
                d.code = code;
                d.minimum_stock = minimum;
                product.edit(d, Utc::now()).unwrap();

                prop_assert_eq!(product.current_stock(), stock);
            }

            /// Property: a transition either lands exactly on the target or leaves stock unchanged.
            #[test]
            fn transition_is_all_or_nothing(start in 0i64..1_000, target in -1_000i64..1_000) {
                let mut product = new_product();
                product.transition_stock(0, start, Utc::now()).unwrap();

                match product.transition_stock(start, target, Utc::now()) {
                    Ok(()) => prop_assert_eq!(product.current_stock(), target),
                    Err(_) => {
                        prop_assert!(target < 0);
                        prop_assert_eq!(product.current_stock(), start);
                    }
                }
            }
        }
    }
}
