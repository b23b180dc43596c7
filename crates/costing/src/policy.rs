use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bodega_core::LedgerResult;
use bodega_products::CostingMethod;

use crate::average::AverageCosting;
use crate::fifo::FifoCosting;
use crate::lot::LotConsumption;

/// Planned cost of one sale: the per-unit cost basis and, under FIFO, the
/// exact lots it will draw from.
///
/// Produced by [`CostingPolicy::plan_sale`] without touching state; handed
/// back to [`CostingPolicy::commit_sale`] once the movement is durably
/// appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCost {
    pub quantity: i64,
    /// Per-unit cost basis. Under FIFO this is the quantity-weighted average
    /// of the consumed lots.
    pub unit_cost: Decimal,
    /// Per-lot consumption detail (empty under average costing).
    pub consumption: Vec<LotConsumption>,
}

impl SaleCost {
    /// Total cost basis of the sale, exact.
    pub fn total_cost(&self) -> Decimal {
        if self.consumption.is_empty() {
            Decimal::from(self.quantity) * self.unit_cost
        } else {
            self.consumption.iter().map(LotConsumption::cost).sum()
        }
    }
}

/// Per-product costing behaviour, dispatched through one interface.
///
/// The read-check (`plan_sale`) and the write (`commit_sale`) are split so
/// the caller can serialize them around the movement-log append under its
/// per-product lock; nothing here is internally synchronized.
pub trait CostingPolicy: Send + core::fmt::Debug {
    fn method(&self) -> CostingMethod;

    /// Owned units currently covered by this policy's state.
    fn owned_quantity(&self) -> i64;

    /// Current per-unit cost basis of on-hand stock (the weighted average, or
    /// the blend the next single unit would cost under FIFO). `None` when
    /// nothing is on hand.
    fn current_unit_cost(&self) -> Option<Decimal>;

    /// Fold an inbound receipt (or restock) into the cost basis.
    fn record_receipt(&mut self, quantity: i64, unit_cost: Decimal, received_at: DateTime<Utc>);

    /// Cost a prospective sale of `quantity` units.
    ///
    /// Pure: fails with `InsufficientStock` if owned stock cannot cover the
    /// request, and never mutates state either way.
    fn plan_sale(&self, quantity: i64) -> LedgerResult<SaleCost>;

    /// Apply a planned consumption. Must be called with a plan produced from
    /// the current state; infallible by construction.
    fn commit_sale(&mut self, sale: &SaleCost);
}

/// Costing state for one product: the method tag resolved to its
/// implementation at product registration, never re-inspected per call.
#[derive(Debug)]
pub enum CostingState {
    Average(AverageCosting),
    Fifo(FifoCosting),
}

impl CostingState {
    pub fn for_method(method: CostingMethod) -> Self {
        match method {
            CostingMethod::Average => CostingState::Average(AverageCosting::new()),
            CostingMethod::Fifo => CostingState::Fifo(FifoCosting::new()),
        }
    }

    pub fn policy(&self) -> &dyn CostingPolicy {
        match self {
            CostingState::Average(p) => p,
            CostingState::Fifo(p) => p,
        }
    }

    pub fn policy_mut(&mut self) -> &mut dyn CostingPolicy {
        match self {
            CostingState::Average(p) => p,
            CostingState::Fifo(p) => p,
        }
    }
}
