//! Inbound movement requests and their validation.

use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, ProductId};

use crate::movement::MovementType;

/// A movement request as submitted by a caller.
///
/// Fields are kept loosely typed so that every malformed input is reported as a
/// validation failure naming the offending field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: String,
    #[serde(rename = "type")]
    pub movement_type: String,
    /// Magnitude of the change; the movement type decides the sign.
    pub quantity: Option<i64>,
    pub comments: Option<String>,
    pub created_by: String,
}

/// A validated movement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementCommand {
    pub product_id: ProductId,
    pub movement_type: MovementType,
    /// Strictly positive magnitude.
    pub quantity: i64,
    pub comments: Option<String>,
    pub created_by: String,
}

impl MovementRequest {
    /// Validate every field, failing on the first offending one.
    pub fn validate(&self) -> DomainResult<MovementCommand> {
        if self.product_id.trim().is_empty() {
            return Err(DomainError::validation("product_id", "cannot be empty"));
        }
        let product_id: ProductId = self
            .product_id
            .parse()
            .map_err(|e: DomainError| DomainError::validation("product_id", e.to_string()))?;

        let movement_type: MovementType = self.movement_type.parse()?;

        let quantity = match self.quantity {
            None => return Err(DomainError::validation("quantity", "is required")),
            Some(q) if q <= 0 => {
                return Err(DomainError::validation(
                    "quantity",
                    format!("must be a positive integer, got {q}"),
                ));
            }
            Some(q) => q,
        };

        if self.created_by.trim().is_empty() {
            return Err(DomainError::validation("created_by", "cannot be empty"));
        }

        let comments = self
            .comments
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        Ok(MovementCommand {
            product_id,
            movement_type,
            quantity,
            comments,
            created_by: self.created_by.trim().to_string(),
        })
    }
}

impl MovementCommand {
    /// Quantity after the movement type's sign policy.
    pub fn signed_quantity(&self) -> i64 {
        self.movement_type.signed_quantity(self.quantity)
    }
}
