//! Stock ledger rules: planning a movement and reconciling a product's ledger.
//!
//! Planning is pure. Given the product as currently stored and a validated
//! command, it returns both writes that must be committed together: the product
//! with its new stock, and the movement that explains the change. Nothing is
//! returned when the change would break the ledger invariants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, MovementId, ProductId};
use stockledger_products::Product;

use crate::movement::{Movement, MovementType};
use crate::request::MovementCommand;

/// The two writes produced by one ledger step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMovement {
    /// Product with `current_stock = movement.new_stock()`; version is still
    /// the loaded one so stores can compare-and-swap on it.
    pub product: Product,
    pub movement: Movement,
}

/// Plan one movement against the loaded product.
pub fn plan_movement(
    product: &Product,
    command: &MovementCommand,
    movement_id: MovementId,
    now: DateTime<Utc>,
) -> DomainResult<PlannedMovement> {
    if product.id_typed() != command.product_id {
        return Err(DomainError::invariant("product_id mismatch"));
    }
    if command.quantity <= 0 {
        return Err(DomainError::validation("quantity", "must be a positive integer"));
    }

    let movement = Movement::record(
        movement_id,
        product,
        command.movement_type,
        command.signed_quantity(),
        now,
        command.comments.clone(),
        command.created_by.clone(),
    )?;

    let mut updated = product.clone();
    updated.transition_stock(movement.previous_stock(), movement.new_stock(), now)?;

    Ok(PlannedMovement {
        product: updated,
        movement,
    })
}

/// Plan an administrative stock override as a synthetic adjustment movement.
///
/// Returns `None` when the product already holds `target_stock`.
pub fn plan_stock_override(
    product: &Product,
    target_stock: i64,
    created_by: &str,
    comments: Option<String>,
    movement_id: MovementId,
    now: DateTime<Utc>,
) -> DomainResult<Option<PlannedMovement>> {
    if target_stock < 0 {
        return Err(DomainError::validation("stock", "cannot be negative"));
    }
    if created_by.trim().is_empty() {
        return Err(DomainError::validation("created_by", "cannot be empty"));
    }

    let delta = target_stock - product.current_stock();
    let movement_type = match delta {
        0 => return Ok(None),
        d if d > 0 => MovementType::PositiveAdjustment,
        _ => MovementType::NegativeAdjustment,
    };

    let comments = comments.or_else(|| {
        Some(format!(
            "stock set from {} to {}",
            product.current_stock(),
            target_stock
        ))
    });

    let command = MovementCommand {
        product_id: product.id_typed(),
        movement_type,
        quantity: delta.abs(),
        comments,
        created_by: created_by.trim().to_string(),
    };

    plan_movement(product, &command, movement_id, now).map(Some)
}

/// A movement whose `previous_stock` does not continue from its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    pub movement_id: MovementId,
    pub expected_previous_stock: i64,
    pub recorded_previous_stock: i64,
}

/// Reconciliation of a product's cached stock against its ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub product_id: ProductId,
    pub current_stock: i64,
    /// Stock before the oldest recorded movement.
    pub opening_stock: i64,
    /// Signed sum of every movement.
    pub ledger_sum: i64,
    pub movement_count: usize,
    pub chain_breaks: Vec<ChainBreak>,
}

impl LedgerAudit {
    pub fn expected_stock(&self) -> i64 {
        self.opening_stock + self.ledger_sum
    }

    pub fn is_consistent(&self) -> bool {
        self.chain_breaks.is_empty() && self.expected_stock() == self.current_stock
    }
}

/// Reconcile `product` against its movements (any order).
pub fn audit_ledger(product: &Product, movements: &[Movement]) -> LedgerAudit {
    let mut ordered: Vec<&Movement> = movements
        .iter()
        .filter(|m| m.product_id() == product.id_typed())
        .collect();
    ordered.sort_by_key(|m| m.recency_key());

    let opening_stock = ordered
        .first()
        .map(|m| m.previous_stock())
        .unwrap_or_else(|| product.current_stock());

    let mut chain_breaks = Vec::new();
    let mut running = opening_stock;
    let mut ledger_sum = 0i64;
    for m in &ordered {
        if m.previous_stock() != running {
            chain_breaks.push(ChainBreak {
                movement_id: m.id_typed(),
                expected_previous_stock: running,
                recorded_previous_stock: m.previous_stock(),
            });
        }
        ledger_sum += m.quantity();
        running = m.new_stock();
    }

    LedgerAudit {
        product_id: product.id_typed(),
        current_stock: product.current_stock(),
        opening_stock,
        ledger_sum,
        movement_count: ordered.len(),
        chain_breaks,
    }
}
