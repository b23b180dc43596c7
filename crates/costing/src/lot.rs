use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stable, per-product ordinal identifier of a cost lot.
///
/// Lots live in an ordered arena per product; the ordinal doubles as receipt
/// order, so "oldest first" is simply ascending `LotId`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LotId(pub u64);

impl core::fmt::Display for LotId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "lot-{}", self.0)
    }
}

/// One inbound batch of owned stock under FIFO costing.
///
/// Created by a receipt, shrunk in place by sales, removed from the arena
/// when fully consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostLot {
    pub lot_id: LotId,
    pub received_at: DateTime<Utc>,
    pub unit_cost: Decimal,
    pub quantity_received: i64,
    pub quantity_remaining: i64,
}

impl CostLot {
    pub fn is_exhausted(&self) -> bool {
        self.quantity_remaining == 0
    }
}

/// Audit detail: how many units a sale drew from one lot, at what cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotConsumption {
    pub lot_id: LotId,
    pub quantity: i64,
    pub unit_cost: Decimal,
}

impl LotConsumption {
    pub fn cost(&self) -> Decimal {
        Decimal::from(self.quantity) * self.unit_cost
    }
}
