use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, MovementId, ProductId};
use stockledger_products::Product;

/// How a movement type treats the magnitude submitted by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignPolicy {
    /// The magnitude is recorded as submitted.
    AsSubmitted,
    /// The magnitude is always recorded as a decrease.
    ForceNegative,
}

/// Closed set of movement kinds. Each one carries its own sign policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    /// Stock received.
    Entry,
    /// Correction increasing stock.
    PositiveAdjustment,
    /// Correction decreasing stock.
    NegativeAdjustment,
    /// Stock returned to inventory.
    Return,
}

impl MovementType {
    pub const ALL: [MovementType; 4] = [
        MovementType::Entry,
        MovementType::PositiveAdjustment,
        MovementType::NegativeAdjustment,
        MovementType::Return,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Entry => "entry",
            MovementType::PositiveAdjustment => "positive_adjustment",
            MovementType::NegativeAdjustment => "negative_adjustment",
            MovementType::Return => "return",
        }
    }

    pub fn sign_policy(self) -> SignPolicy {
        match self {
            MovementType::Entry => SignPolicy::AsSubmitted,
            MovementType::PositiveAdjustment => SignPolicy::AsSubmitted,
            MovementType::NegativeAdjustment => SignPolicy::ForceNegative,
            MovementType::Return => SignPolicy::AsSubmitted,
        }
    }

    /// Apply this type's sign policy to a submitted quantity.
    pub fn signed_quantity(self, submitted: i64) -> i64 {
        match self.sign_policy() {
            SignPolicy::AsSubmitted => submitted,
            SignPolicy::ForceNegative => -submitted.saturating_abs(),
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| {
                DomainError::validation(
                    "type",
                    format!(
                        "'{needle}' is not one of: entry, positive_adjustment, negative_adjustment, return"
                    ),
                )
            })
    }
}

/// Persisted state of a movement, as read back from a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementParts {
    pub id: MovementId,
    pub product_id: ProductId,
    pub product_name: String,
    pub product_code: String,
    pub movement_type: MovementType,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub date: DateTime<Utc>,
    pub comments: Option<String>,
    pub created_by: String,
}

/// Immutable ledger entry recording one change to a product's stock.
///
/// `product_name` / `product_code` are snapshots taken when the movement was
/// recorded; later product edits do not touch them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    id: MovementId,
    product_id: ProductId,
    product_name: String,
    product_code: String,
    #[serde(rename = "type")]
    movement_type: MovementType,
    quantity: i64,
    previous_stock: i64,
    new_stock: i64,
    date: DateTime<Utc>,
    comments: Option<String>,
    created_by: String,
}

impl Movement {
    /// Record a signed `quantity` against the product's current stock.
    pub fn record(
        id: MovementId,
        product: &Product,
        movement_type: MovementType,
        quantity: i64,
        date: DateTime<Utc>,
        comments: Option<String>,
        created_by: impl Into<String>,
    ) -> DomainResult<Self> {
        let previous_stock = product.current_stock();
        let new_stock = previous_stock
            .checked_add(quantity)
            .ok_or_else(|| DomainError::invariant("stock arithmetic overflow"))?;

        if new_stock < 0 {
            return Err(DomainError::InsufficientStock {
                current_stock: previous_stock,
                requested_adjustment: quantity,
            });
        }

        Ok(Self {
            id,
            product_id: product.id_typed(),
            product_name: product.name().to_string(),
            product_code: product.code().to_string(),
            movement_type,
            quantity,
            previous_stock,
            new_stock,
            date,
            comments,
            created_by: created_by.into(),
        })
    }

    /// Rebuild a movement from persisted state, re-checking its arithmetic.
    pub fn restore(parts: MovementParts) -> DomainResult<Self> {
        if parts.previous_stock < 0 || parts.new_stock < 0 {
            return Err(DomainError::invariant(format!(
                "movement {} has negative stock snapshot",
                parts.id
            )));
        }
        if parts.previous_stock.checked_add(parts.quantity) != Some(parts.new_stock) {
            return Err(DomainError::invariant(format!(
                "movement {} does not satisfy new_stock = previous_stock + quantity",
                parts.id
            )));
        }
        Ok(Self {
            id: parts.id,
            product_id: parts.product_id,
            product_name: parts.product_name,
            product_code: parts.product_code,
            movement_type: parts.movement_type,
            quantity: parts.quantity,
            previous_stock: parts.previous_stock,
            new_stock: parts.new_stock,
            date: parts.date,
            comments: parts.comments,
            created_by: parts.created_by,
        })
    }

    pub fn id_typed(&self) -> MovementId {
        self.id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn product_code(&self) -> &str {
        &self.product_code
    }

    pub fn movement_type(&self) -> MovementType {
        self.movement_type
    }

    /// Signed quantity (negative for decreases).
    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn previous_stock(&self) -> i64 {
        self.previous_stock
    }

    pub fn new_stock(&self) -> i64 {
        self.new_stock
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn comments(&self) -> Option<&str> {
        self.comments.as_deref()
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Newest-first ordering key: date, then time-ordered id.
    pub fn recency_key(&self) -> (DateTime<Utc>, MovementId) {
        (self.date, self.id)
    }
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
