//! Typed outcomes surfaced to callers of the ledger engine and the services.

use thiserror::Error;

use stockledger_core::DomainError;

use crate::store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// Malformed or missing request field; nothing was read or written.
    #[error("validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    /// A referenced record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A unique code or name is already taken.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The movement would drive stock below zero; nothing was written.
    #[error(
        "insufficient stock: current stock is {current_stock}, requested adjustment is {requested_adjustment}"
    )]
    InsufficientStock {
        current_stock: i64,
        requested_adjustment: i64,
    },

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Every optimistic write attempt lost a race. Safe to retry.
    #[error("concurrent update lost after {attempts} attempt(s)")]
    ConcurrencyConflict { attempts: u32 },

    /// Persistence failed or timed out; no partial write was left behind.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl InventoryError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InventoryError::ConcurrencyConflict { .. } | InventoryError::StoreUnavailable(_)
        )
    }
}

impl From<DomainError> for InventoryError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation { field, reason } => InventoryError::Validation { field, reason },
            DomainError::InvalidId(msg) => InventoryError::validation("id", msg),
            DomainError::InvariantViolation(msg) => InventoryError::InvariantViolation(msg),
            DomainError::InsufficientStock {
                current_stock,
                requested_adjustment,
            } => InventoryError::InsufficientStock {
                current_stock,
                requested_adjustment,
            },
            DomainError::Conflict(_) => InventoryError::ConcurrencyConflict { attempts: 1 },
        }
    }
}

impl From<StoreError> for InventoryError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(msg) => InventoryError::StoreUnavailable(msg),
            StoreError::Corrupt(msg) => InventoryError::StoreUnavailable(format!("corrupt record: {msg}")),
            StoreError::Conflict(_) => InventoryError::ConcurrencyConflict { attempts: 1 },
            StoreError::Duplicate(what) => InventoryError::AlreadyExists(what),
            StoreError::NotFound(what) => InventoryError::NotFound(what),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_keep_their_kind() {
        let err: InventoryError = DomainError::validation("quantity", "is required").into();
        assert_eq!(err, InventoryError::validation("quantity", "is required"));

        let err: InventoryError = DomainError::InsufficientStock {
            current_stock: 10,
            requested_adjustment: -20,
        }
        .into();
        assert!(matches!(err, InventoryError::InsufficientStock { current_stock: 10, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn store_errors_map_to_transient_kinds() {
        let err: InventoryError = StoreError::Unavailable("timeout".to_string()).into();
        assert!(err.is_transient());

        let err: InventoryError = StoreError::Conflict("version".to_string()).into();
        assert_eq!(err, InventoryError::ConcurrencyConflict { attempts: 1 });

        let err: InventoryError = StoreError::Duplicate("code LAPTOP001".to_string()).into();
        assert_eq!(err, InventoryError::AlreadyExists("code LAPTOP001".to_string()));
    }
}
