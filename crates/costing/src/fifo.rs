use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use bodega_core::{LedgerError, LedgerResult};
use bodega_products::CostingMethod;

use crate::lot::{CostLot, LotConsumption, LotId};
use crate::policy::{CostingPolicy, SaleCost};

/// FIFO costing: an ordered arena of cost lots, consumed oldest-first.
///
/// The arena is a plain `Vec` in receipt order; consumption walks it from the
/// front and mutates remaining quantities in place, under the caller's
/// per-product lock. Lot ids are ordinals and stay stable for audit even
/// after the lot itself is removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FifoCosting {
    lots: Vec<CostLot>,
    next_lot_id: u64,
}

impl FifoCosting {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open lots in receipt order (oldest first).
    pub fn lots(&self) -> &[CostLot] {
        &self.lots
    }
}

impl CostingPolicy for FifoCosting {
    fn method(&self) -> CostingMethod {
        CostingMethod::Fifo
    }

    fn owned_quantity(&self) -> i64 {
        self.lots.iter().map(|l| l.quantity_remaining).sum()
    }

    fn current_unit_cost(&self) -> Option<Decimal> {
        self.lots.first().map(|l| l.unit_cost)
    }

    fn record_receipt(&mut self, quantity: i64, unit_cost: Decimal, received_at: DateTime<Utc>) {
        let lot_id = LotId(self.next_lot_id);
        self.next_lot_id += 1;
        self.lots.push(CostLot {
            lot_id,
            received_at,
            unit_cost,
            quantity_received: quantity,
            quantity_remaining: quantity,
        });
    }

    fn plan_sale(&self, quantity: i64) -> LedgerResult<SaleCost> {
        if quantity <= 0 {
            return Err(LedgerError::invalid_movement(
                "sale quantity must be positive",
            ));
        }

        let available = self.owned_quantity();
        if quantity > available {
            return Err(LedgerError::InsufficientStock {
                requested: quantity,
                available,
            });
        }

        let mut outstanding = quantity;
        let mut consumption = Vec::new();
        for lot in &self.lots {
            if outstanding == 0 {
                break;
            }
            let take = outstanding.min(lot.quantity_remaining);
            if take == 0 {
                continue;
            }
            consumption.push(LotConsumption {
                lot_id: lot.lot_id,
                quantity: take,
                unit_cost: lot.unit_cost,
            });
            outstanding -= take;
        }

        let total: Decimal = consumption.iter().map(LotConsumption::cost).sum();
        Ok(SaleCost {
            quantity,
            unit_cost: total / Decimal::from(quantity),
            consumption,
        })
    }

    fn commit_sale(&mut self, sale: &SaleCost) {
        for consumed in &sale.consumption {
            if let Some(lot) = self.lots.iter_mut().find(|l| l.lot_id == consumed.lot_id) {
                lot.quantity_remaining -= consumed.quantity;
            }
        }
        self.lots.retain(|l| !l.is_exhausted());
    }
}
