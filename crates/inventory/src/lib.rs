//! Inventory ledger domain module.
//!
//! This crate contains the movement model and the stock ledger rules, implemented
//! purely as deterministic domain logic (no IO, no storage). The infrastructure
//! layer loads a product, asks [`ledger::plan_movement`] what to write, and
//! commits the result atomically.

pub mod ledger;
pub mod movement;
pub mod request;

pub use ledger::{
    ChainBreak, LedgerAudit, PlannedMovement, audit_ledger, plan_movement, plan_stock_override,
};
pub use movement::{Movement, MovementParts, MovementType, SignPolicy};
pub use request::{MovementCommand, MovementRequest};
