use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bodega_consignment::{BatchId, ConsignmentBatch, SupplierId};
use bodega_core::{AggregateId, LedgerError, LedgerResult};
use bodega_movements::{MovementKind, StoredMovement};

/// Liquidation identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LiquidationId(pub AggregateId);

impl LiquidationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for LiquidationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Immutable settlement output for one consignment batch.
///
/// Written once when the batch settles; never mutated afterwards. The unsold,
/// unreturned remainder is reported as `pending_return` for external
/// reconciliation; it is not auto-returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationRecord {
    pub liquidation_id: LiquidationId,
    pub batch_id: BatchId,
    pub supplier_id: SupplierId,
    pub quantity_sold: i64,
    pub quantity_returned: i64,
    pub pending_return: i64,
    /// Gross value of recorded sales: Σ quantity × sale unit price.
    pub sales_value: Decimal,
    /// sales_value × commission percentage, rounded to currency precision.
    pub commission: Decimal,
    /// What the supplier is owed: sales_value − commission.
    pub net_payable: Decimal,
    pub settled_at: DateTime<Utc>,
}

/// Compute the settlement for a batch from its recorded movement history.
///
/// Pure: the caller drives the batch's `SettleBatch` command (which carries
/// the idempotency guard) and persists the record. Sales value is derived
/// from the `Sale` movements referencing the batch; a tally that disagrees
/// with the batch's own sold counter indicates a double-counted or missing
/// movement and fails the settlement.
pub fn compute_settlement(
    liquidation_id: LiquidationId,
    batch: &ConsignmentBatch,
    movements: &[StoredMovement],
    settled_at: DateTime<Utc>,
) -> LedgerResult<LiquidationRecord> {
    let batch_id = batch.id_typed();
    let supplier_id = batch
        .supplier_id()
        .ok_or_else(|| LedgerError::not_found(format!("batch {batch_id} has no supplier")))?;

    let mut tallied_sold: i64 = 0;
    let mut sales_value = Decimal::ZERO;

    for stored in movements {
        let movement = &stored.movement;
        if movement.batch_id != Some(batch_id) || movement.kind != MovementKind::Sale {
            continue;
        }

        let quantity = -movement.quantity;
        let unit_price = movement.unit_price.ok_or_else(|| {
            LedgerError::invalid_movement(format!(
                "sale movement {} has no unit price",
                movement.movement_id
            ))
        })?;

        tallied_sold += quantity;
        sales_value += Decimal::from(quantity) * unit_price;
    }

    if tallied_sold != batch.quantity_sold() {
        return Err(LedgerError::conflict(format!(
            "batch {batch_id} sold counter ({}) does not reconcile with movement history ({tallied_sold})",
            batch.quantity_sold()
        )));
    }

    let commission = batch.commission().of(sales_value).round_dp(2);
    let net_payable = sales_value - commission;

    Ok(LiquidationRecord {
        liquidation_id,
        batch_id,
        supplier_id,
        quantity_sold: batch.quantity_sold(),
        quantity_returned: batch.quantity_returned(),
        pending_return: batch.remaining(),
        sales_value,
        commission,
        net_payable,
        settled_at,
    })
}
