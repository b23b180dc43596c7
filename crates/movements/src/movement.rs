use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bodega_consignment::BatchId;
use bodega_core::{AggregateId, LedgerError, LedgerResult};
use bodega_products::ProductId;

/// Movement identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub AggregateId);

impl MovementId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The kind of stock-affecting event a movement records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Owned goods received from purchasing.
    Receipt,
    /// Units sold through any channel (owned or consigned).
    Sale,
    /// Customer return of previously sold owned units.
    Return,
    /// Manual correction (count difference, breakage, shrinkage).
    Adjustment,
    /// Consigned goods placed by a third-party supplier.
    ConsignmentReceipt,
    /// Unsold consigned units physically returned to the supplier.
    ConsignmentSettle,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Receipt => "receipt",
            MovementKind::Sale => "sale",
            MovementKind::Return => "return",
            MovementKind::Adjustment => "adjustment",
            MovementKind::ConsignmentReceipt => "consignment_receipt",
            MovementKind::ConsignmentSettle => "consignment_settle",
        }
    }
}

/// Reference to the transaction a movement originated from.
///
/// Carried as an opaque identifier; resolving it is the caller's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRef {
    Sale(Uuid),
    PurchaseOrder(Uuid),
    Liquidation(Uuid),
    Manual,
}

/// Immutable fact: one stock-affecting event.
///
/// Never mutated or deleted once appended. Corrections are made with
/// compensating `Return`/`Adjustment` movements, never by editing history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub movement_id: MovementId,
    pub product_id: ProductId,
    pub kind: MovementKind,
    /// Signed quantity delta. Positive for inbound, negative for outbound.
    pub quantity: i64,
    /// Acquisition cost per unit, required on inbound owned movements.
    pub unit_cost: Option<Decimal>,
    /// Channel-assigned sale price per unit, required on sales.
    pub unit_price: Option<Decimal>,
    /// Originating consignment batch, required on consigned movements.
    pub batch_id: Option<BatchId>,
    pub source: SourceRef,
    pub occurred_at: DateTime<Utc>,
}

impl StockMovement {
    /// Whether this movement touches the consigned balance (as opposed to owned).
    pub fn is_consigned(&self) -> bool {
        match self.kind {
            MovementKind::ConsignmentReceipt | MovementKind::ConsignmentSettle => true,
            MovementKind::Sale => self.batch_id.is_some(),
            _ => false,
        }
    }

    /// Shape validation: kind-dependent field requirements.
    ///
    /// A movement failing validation is never appended; the caller must
    /// correct and resubmit.
    pub fn validate(&self) -> LedgerResult<()> {
        if self.quantity == 0 {
            return Err(LedgerError::invalid_movement("quantity delta cannot be zero"));
        }

        if let Some(cost) = self.unit_cost {
            if cost < Decimal::ZERO {
                return Err(LedgerError::invalid_movement("unit cost cannot be negative"));
            }
        }
        if let Some(price) = self.unit_price {
            if price < Decimal::ZERO {
                return Err(LedgerError::invalid_movement("unit price cannot be negative"));
            }
        }

        match self.kind {
            MovementKind::Receipt => {
                self.ensure_positive()?;
                self.ensure_unit_cost()?;
                self.ensure_no_batch()
            }
            MovementKind::Sale => {
                self.ensure_negative()?;
                if self.unit_price.is_none() {
                    return Err(LedgerError::invalid_movement("sale requires a unit price"));
                }
                Ok(())
            }
            MovementKind::Return => {
                self.ensure_positive()?;
                self.ensure_unit_cost()?;
                self.ensure_no_batch()
            }
            MovementKind::Adjustment => {
                if self.quantity > 0 {
                    self.ensure_unit_cost()?;
                }
                self.ensure_no_batch()
            }
            MovementKind::ConsignmentReceipt => {
                self.ensure_positive()?;
                self.ensure_batch()
            }
            MovementKind::ConsignmentSettle => {
                self.ensure_negative()?;
                self.ensure_batch()
            }
        }
    }

    fn ensure_positive(&self) -> LedgerResult<()> {
        if self.quantity <= 0 {
            return Err(LedgerError::invalid_movement(format!(
                "{} requires a positive quantity",
                self.kind.as_str()
            )));
        }
        Ok(())
    }

    fn ensure_negative(&self) -> LedgerResult<()> {
        if self.quantity >= 0 {
            return Err(LedgerError::invalid_movement(format!(
                "{} requires a negative quantity",
                self.kind.as_str()
            )));
        }
        Ok(())
    }

    fn ensure_unit_cost(&self) -> LedgerResult<()> {
        if self.unit_cost.is_none() {
            return Err(LedgerError::invalid_movement(format!(
                "{} requires a unit cost",
                self.kind.as_str()
            )));
        }
        Ok(())
    }

    fn ensure_batch(&self) -> LedgerResult<()> {
        if self.batch_id.is_none() {
            return Err(LedgerError::invalid_movement(format!(
                "{} requires a batch reference",
                self.kind.as_str()
            )));
        }
        Ok(())
    }

    fn ensure_no_batch(&self) -> LedgerResult<()> {
        if self.batch_id.is_some() {
            return Err(LedgerError::invalid_movement(format!(
                "{} cannot reference a consignment batch",
                self.kind.as_str()
            )));
        }
        Ok(())
    }
}
