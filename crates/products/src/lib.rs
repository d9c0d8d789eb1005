//! Products domain module.
//!
//! This crate contains business rules for catalog products and their cached
//! stock level, implemented purely as deterministic domain logic (no IO, no
//! storage). Stock only changes through guarded transitions that the ledger
//! engine drives.

pub mod product;

pub use product::{Product, ProductDetails, ProductParts};
