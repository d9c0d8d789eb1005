//! Aggregate root trait.

/// Aggregate root marker + minimal interface.
///
/// An aggregate root owns state that other records are derived from or checked
/// against (for inventory: the product whose `current_stock` the ledger explains).
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the aggregate's persisted state.
    ///
    /// Stores bump this on every successful write and reject writes whose
    /// loaded version is stale.
    fn version(&self) -> u64;
}
