//! Infrastructure layer: stores, the stock ledger engine, read-side services.

pub mod config;
pub mod error;
pub mod ledger_engine;
pub mod locks;
pub mod seed;
pub mod services;
pub mod store;

pub use config::{ConfigError, InventoryConfig};
pub use error::InventoryError;
pub use ledger_engine::LedgerEngine;
pub use store::{
    InMemoryNamedStore, InMemoryStore, LedgerStore, MovementStore, NamedStore, PostgresStore,
    ProductStore, StoreError,
};

#[cfg(test)]
mod integration_tests;
