//! Default reference data and sample products for a fresh installation.

use serde::Serialize;
use tracing::{info, instrument};

use stockledger_parties::{Category, CategoryDetails, Supplier, SupplierDetails};
use stockledger_products::ProductDetails;

use crate::error::InventoryError;
use crate::ledger_engine::LedgerEngine;
use crate::services::{Directory, ProductCatalog};
use crate::store::{LedgerStore, NamedStore};

pub const SEED_USER: &str = "system";

const CATEGORIES: [(&str, &str); 5] = [
    ("Electronics", "Electronic products"),
    ("Clothing", "Apparel and accessories"),
    ("Home", "Household goods"),
    ("Sports", "Sporting goods"),
    ("Books", "Books and educational material"),
];

const SUPPLIERS: [(&str, &str, &str, &str); 4] = [
    ("TechCorp", "Juan Perez", "555-0101", "juan@techcorp.com"),
    ("FashionPlus", "Maria Garcia", "555-0102", "maria@fashionplus.com"),
    ("HomeMart", "Carlos Lopez", "555-0103", "carlos@homemart.com"),
    ("SportZone", "Ana Martinez", "555-0104", "ana@sportzone.com"),
];

struct SampleProduct {
    code: &'static str,
    name: &'static str,
    description: &'static str,
    category: &'static str,
    supplier: &'static str,
    purchase_price: u64,
    sale_price: u64,
    minimum_stock: i64,
    opening_stock: i64,
}

const PRODUCTS: [SampleProduct; 3] = [
    SampleProduct {
        code: "LAPTOP001",
        name: "Laptop HP Pavilion",
        description: "HP Pavilion 15 inch laptop",
        category: "Electronics",
        supplier: "TechCorp",
        purchase_price: 80_000,
        sale_price: 120_000,
        minimum_stock: 5,
        opening_stock: 15,
    },
    SampleProduct {
        code: "MOUSE001",
        name: "Wireless Mouse",
        description: "Ergonomic wireless mouse",
        category: "Electronics",
        supplier: "TechCorp",
        purchase_price: 2_500,
        sale_price: 4_500,
        minimum_stock: 10,
        opening_stock: 3,
    },
    SampleProduct {
        code: "SHIRT001",
        name: "Casual Shirt",
        description: "Cotton casual shirt",
        category: "Clothing",
        supplier: "FashionPlus",
        purchase_price: 3_000,
        sale_price: 6_000,
        minimum_stock: 15,
        opening_stock: 25,
    },
];

/// What [`seed_defaults`] actually wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub categories: usize,
    pub suppliers: usize,
    pub products: usize,
    pub movements: usize,
}

/// Populate each empty table with defaults. Tables that already hold data are left alone.
///
/// Opening stock goes through the ledger engine, so every sample product's
/// stock is explained by a movement.
#[instrument(skip_all, err)]
pub async fn seed_defaults<S, C, P>(
    engine: &LedgerEngine<S>,
    catalog: &ProductCatalog<S>,
    categories: &Directory<Category, C>,
    suppliers: &Directory<Supplier, P>,
) -> Result<SeedReport, InventoryError>
where
    S: LedgerStore + 'static,
    C: NamedStore<Category>,
    P: NamedStore<Supplier>,
{
    let mut report = SeedReport::default();

    if categories.list().await?.is_empty() {
        for (name, description) in CATEGORIES {
            categories
                .create_category(CategoryDetails {
                    name: name.to_string(),
                    description: Some(description.to_string()),
                })
                .await?;
            report.categories += 1;
        }
    }

    if suppliers.list().await?.is_empty() {
        for (name, contact, phone, email) in SUPPLIERS {
            suppliers
                .create_supplier(SupplierDetails {
                    name: name.to_string(),
                    contact: contact.to_string(),
                    phone: Some(phone.to_string()),
                    email: Some(email.to_string()),
                })
                .await?;
            report.suppliers += 1;
        }
    }

    if catalog.list_products().await?.is_empty() {
        for sample in &PRODUCTS {
            let product = catalog
                .create_product(ProductDetails {
                    code: sample.code.to_string(),
                    name: sample.name.to_string(),
                    description: Some(sample.description.to_string()),
                    category: sample.category.to_string(),
                    supplier: sample.supplier.to_string(),
                    purchase_price: sample.purchase_price,
                    sale_price: sample.sale_price,
                    unit: "units".to_string(),
                    minimum_stock: sample.minimum_stock,
                })
                .await?;
            report.products += 1;

            let opening = engine
                .set_stock(
                    product.id_typed(),
                    sample.opening_stock,
                    SEED_USER,
                    Some("opening stock".to_string()),
                )
                .await?;
            if opening.is_some() {
                report.movements += 1;
            }
        }
    }

    info!(
        categories = report.categories,
        suppliers = report.suppliers,
        products = report.products,
        movements = report.movements,
        "seed complete"
    );
    Ok(report)
}
