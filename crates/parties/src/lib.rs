//! Reference parties for the catalog: product categories and suppliers.
//!
//! Products refer to these by name (free text), not by id. Nothing here is
//! enforced against products; deleting a supplier leaves its products alone.

pub mod category;
pub mod supplier;

pub use category::{Category, CategoryDetails};
pub use supplier::{Supplier, SupplierDetails};

use stockledger_core::Entity;

/// An entity whose `name` is unique within its kind.
pub trait NamedEntity: Entity<Id: Send + Sync + 'static> + Clone + Send + Sync + 'static {
    /// Human-readable kind, used in error messages ("category", "supplier").
    const KIND: &'static str;

    fn name(&self) -> &str;
}
