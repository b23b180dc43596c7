use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use bodega_core::{LedgerError, LedgerResult};
use bodega_movements::{StockMovement, StoredMovement};
use bodega_products::ProductId;

/// Current on-hand quantities for one product, owned and consigned tracked
/// separately.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    pub owned: i64,
    pub consigned: i64,
}

impl StockBalance {
    pub fn total(&self) -> i64 {
        self.owned + self.consigned
    }
}

/// Materialized stock projection over the movement log.
///
/// Balances are a disposable read model, rebuildable from the log at any
/// time; the log remains the sole source of truth. A per-product cursor
/// tracks the last applied sequence number, making application idempotent
/// (replays at or below the cursor are ignored) and gap-free.
#[derive(Debug, Default)]
pub struct StockLedger {
    balances: RwLock<HashMap<ProductId, StockBalance>>,
    cursors: RwLock<HashMap<ProductId, u64>>,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the current balance. Always consistent with the movement log up
    /// to the last applied movement; there is no eventual-consistency gap
    /// visible to callers.
    pub fn current_stock(&self, product_id: ProductId) -> StockBalance {
        match self.balances.read() {
            Ok(balances) => balances.get(&product_id).copied().unwrap_or_default(),
            Err(_) => StockBalance::default(),
        }
    }

    /// Balance the movement would produce, without applying it.
    ///
    /// This is the pre-append check: a movement that would take either
    /// balance negative is rejected here, before anything is written.
    pub fn peek(&self, movement: &StockMovement) -> LedgerResult<StockBalance> {
        let current = self.current_stock(movement.product_id);
        Self::project(current, movement)
    }

    /// Apply an appended movement to the projection.
    ///
    /// Duplicate deliveries (sequence at or below the cursor) are ignored;
    /// a gap in sequence numbers is an error.
    pub fn apply(&self, stored: &StoredMovement) -> LedgerResult<StockBalance> {
        let product_id = stored.movement.product_id;
        let seq = stored.sequence_number;

        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| LedgerError::conflict("stock ledger lock poisoned"))?;
        let last = *cursors.get(&product_id).unwrap_or(&0);

        if seq == 0 {
            return Err(LedgerError::conflict(format!(
                "non-monotonic sequence number (last={last}, found={seq})"
            )));
        }
        if seq <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(self.current_stock(product_id));
        }
        if seq != last + 1 && last != 0 {
            return Err(LedgerError::conflict(format!(
                "non-monotonic sequence number (last={last}, found={seq})"
            )));
        }

        let mut balances = self
            .balances
            .write()
            .map_err(|_| LedgerError::conflict("stock ledger lock poisoned"))?;

        let current = balances.get(&product_id).copied().unwrap_or_default();
        let next = Self::project(current, &stored.movement)?;

        balances.insert(product_id, next);
        cursors.insert(product_id, seq);
        Ok(next)
    }

    /// Rebuild the projection from scratch by replaying movements.
    pub fn rebuild_from_scratch(
        &self,
        movements: impl IntoIterator<Item = StoredMovement>,
    ) -> LedgerResult<()> {
        {
            let mut balances = self
                .balances
                .write()
                .map_err(|_| LedgerError::conflict("stock ledger lock poisoned"))?;
            balances.clear();
        }
        {
            let mut cursors = self
                .cursors
                .write()
                .map_err(|_| LedgerError::conflict("stock ledger lock poisoned"))?;
            cursors.clear();
        }

        let mut all: Vec<_> = movements.into_iter().collect();

        // Deterministic replay order: product, then sequence.
        all.sort_by_key(|m| (m.movement.product_id, m.sequence_number));

        for stored in &all {
            self.apply(stored)?;
        }

        Ok(())
    }

    fn project(current: StockBalance, movement: &StockMovement) -> LedgerResult<StockBalance> {
        let mut next = current;
        let (balance, side) = if movement.is_consigned() {
            (&mut next.consigned, current.consigned)
        } else {
            (&mut next.owned, current.owned)
        };

        *balance += movement.quantity;
        if *balance < 0 {
            return Err(LedgerError::NegativeStock {
                balance: side,
                delta: movement.quantity,
            });
        }

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bodega_consignment::BatchId;
    use bodega_core::AggregateId;
    use bodega_movements::{MovementId, MovementKind, SourceRef};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn stored(product_id: ProductId, kind: MovementKind, quantity: i64, seq: u64) -> StoredMovement {
        let (unit_cost, unit_price, batch_id) = match kind {
            MovementKind::Receipt | MovementKind::Return => (Some(dec!(2000)), None, None),
            MovementKind::Sale => (None, Some(dec!(3500)), None),
            MovementKind::Adjustment => {
                ((quantity > 0).then_some(dec!(2000)), None, None)
            }
            MovementKind::ConsignmentReceipt | MovementKind::ConsignmentSettle => {
                (None, None, Some(BatchId::new(AggregateId::new())))
            }
        };

        StoredMovement {
            sequence_number: seq,
            movement: StockMovement {
                movement_id: MovementId::new(AggregateId::new()),
                product_id,
                kind,
                quantity,
                unit_cost,
                unit_price,
                batch_id,
                source: SourceRef::Manual,
                occurred_at: Utc::now(),
            },
        }
    }

    #[test]
    fn balances_track_signed_deltas_per_side() {
        let ledger = StockLedger::new();
        let product_id = test_product_id();

        ledger.apply(&stored(product_id, MovementKind::Receipt, 10, 1)).unwrap();
        ledger.apply(&stored(product_id, MovementKind::ConsignmentReceipt, 20, 2)).unwrap();
        ledger.apply(&stored(product_id, MovementKind::Sale, -4, 3)).unwrap();

        let balance = ledger.current_stock(product_id);
        assert_eq!(balance.owned, 6);
        assert_eq!(balance.consigned, 20);
        assert_eq!(balance.total(), 26);
    }

    #[test]
    fn peek_rejects_negative_stock_without_applying() {
        let ledger = StockLedger::new();
        let product_id = test_product_id();

        ledger.apply(&stored(product_id, MovementKind::Receipt, 3, 1)).unwrap();

        let oversell = stored(product_id, MovementKind::Sale, -4, 2);
        let err = ledger.peek(&oversell.movement).unwrap_err();
        match err {
            LedgerError::NegativeStock { balance: 3, delta: -4 } => {}
            other => panic!("Expected NegativeStock, got {other:?}"),
        }
        assert_eq!(ledger.current_stock(product_id).owned, 3);
    }

    #[test]
    fn apply_rejects_negative_stock_and_leaves_state_unchanged() {
        let ledger = StockLedger::new();
        let product_id = test_product_id();

        ledger.apply(&stored(product_id, MovementKind::Receipt, 3, 1)).unwrap();
        assert!(ledger.apply(&stored(product_id, MovementKind::Sale, -4, 2)).is_err());

        let balance = ledger.current_stock(product_id);
        assert_eq!(balance.owned, 3);

        // The rejected movement did not advance the cursor.
        ledger.apply(&stored(product_id, MovementKind::Sale, -2, 2)).unwrap();
        assert_eq!(ledger.current_stock(product_id).owned, 1);
    }

    #[test]
    fn duplicate_application_is_idempotent() {
        let ledger = StockLedger::new();
        let product_id = test_product_id();

        let receipt = stored(product_id, MovementKind::Receipt, 10, 1);
        ledger.apply(&receipt).unwrap();
        ledger.apply(&receipt).unwrap();

        assert_eq!(ledger.current_stock(product_id).owned, 10);
    }

    #[test]
    fn sequence_gaps_are_rejected() {
        let ledger = StockLedger::new();
        let product_id = test_product_id();

        ledger.apply(&stored(product_id, MovementKind::Receipt, 10, 1)).unwrap();
        let err = ledger.apply(&stored(product_id, MovementKind::Receipt, 5, 3)).unwrap_err();
        match err {
            LedgerError::Conflict(msg) if msg.contains("non-monotonic") => {}
            other => panic!("Expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn rebuild_replays_deterministically() {
        let ledger = StockLedger::new();
        let a = test_product_id();
        let b = test_product_id();

        let movements = vec![
            stored(b, MovementKind::Receipt, 7, 1),
            stored(a, MovementKind::Sale, -4, 2),
            stored(a, MovementKind::Receipt, 10, 1),
        ];

        ledger.rebuild_from_scratch(movements).unwrap();
        assert_eq!(ledger.current_stock(a).owned, 6);
        assert_eq!(ledger.current_stock(b).owned, 7);
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// The balance always equals the running sum of applied deltas
            /// and never goes negative, whatever movements are thrown at it.
            #[test]
            fn balance_is_running_sum_of_applied_deltas(
                deltas in prop::collection::vec(-20i64..40, 1..40)
            ) {
                let ledger = StockLedger::new();
                let product_id = test_product_id();

                let mut expected: i64 = 0;
                let mut seq: u64 = 0;

                for delta in deltas {
                    prop_assume!(delta != 0);
                    let kind = if delta > 0 { MovementKind::Receipt } else { MovementKind::Sale };
                    let movement = stored(product_id, kind, delta, seq + 1);

                    match ledger.apply(&movement) {
                        Ok(balance) => {
                            seq += 1;
                            expected += delta;
                            prop_assert_eq!(balance.owned, expected);
                        }
                        Err(LedgerError::NegativeStock { .. }) => {
                            // Rejected movements must not change the balance.
                            prop_assert_eq!(ledger.current_stock(product_id).owned, expected);
                        }
                        Err(other) => return Err(TestCaseError::fail(format!("{other:?}"))),
                    }

                    prop_assert!(ledger.current_stock(product_id).owned >= 0);
                }
            }
        }
    }
}
