use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use bodega_core::{LedgerError, LedgerResult};
use bodega_products::CostingMethod;

use crate::policy::{CostingPolicy, SaleCost};

/// Weighted-average costing: one running average cost per product.
///
/// Receipts fold into the average; sales draw at the current average and
/// never move it.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AverageCosting {
    quantity: i64,
    average_cost: Decimal,
}

impl AverageCosting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn average_cost(&self) -> Decimal {
        self.average_cost
    }
}

impl CostingPolicy for AverageCosting {
    fn method(&self) -> CostingMethod {
        CostingMethod::Average
    }

    fn owned_quantity(&self) -> i64 {
        self.quantity
    }

    fn current_unit_cost(&self) -> Option<Decimal> {
        (self.quantity > 0).then_some(self.average_cost)
    }

    fn record_receipt(&mut self, quantity: i64, unit_cost: Decimal, _received_at: DateTime<Utc>) {
        if self.quantity <= 0 {
            self.average_cost = unit_cost;
            self.quantity = quantity;
            return;
        }

        let old_qty = Decimal::from(self.quantity);
        let in_qty = Decimal::from(quantity);
        self.average_cost =
            (old_qty * self.average_cost + in_qty * unit_cost) / (old_qty + in_qty);
        self.quantity += quantity;
    }

    fn plan_sale(&self, quantity: i64) -> LedgerResult<SaleCost> {
        if quantity <= 0 {
            return Err(LedgerError::invalid_movement(
                "sale quantity must be positive",
            ));
        }
        if quantity > self.quantity {
            return Err(LedgerError::InsufficientStock {
                requested: quantity,
                available: self.quantity,
            });
        }

        Ok(SaleCost {
            quantity,
            unit_cost: self.average_cost,
            consumption: Vec::new(),
        })
    }

    fn commit_sale(&mut self, sale: &SaleCost) {
        self.quantity -= sale.quantity;
    }
}
