//! Application services around the catalog and the ledger.
//!
//! None of these write stock; stock only changes through
//! [`LedgerEngine`](crate::LedgerEngine).

pub mod catalog;
pub mod dashboard;
pub mod directory;
pub mod movements;

pub use catalog::ProductCatalog;
pub use dashboard::{CategoryCount, Dashboard, DashboardStats};
pub use directory::{CategoryDirectory, Directory, SupplierDirectory};
pub use movements::MovementQueries;
