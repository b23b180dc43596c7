use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bodega_consignment::{
    BatchId, ConsignmentBatch, ConsignmentCommand, ConsignmentTracker, ExpireBatch, ReceiveBatch,
    ReturnUnsold, SellFromBatch, SettleBatch, SupplierId,
};
use bodega_core::{AggregateId, ExpectedVersion, LedgerError, LedgerResult};
use bodega_costing::{CostingState, LotConsumption};
use bodega_liquidation::{compute_settlement, LiquidationId, LiquidationRecord};
use bodega_movements::{
    InMemoryMovementLog, MovementId, MovementKind, MovementLog, SourceRef, StockMovement,
    StoredMovement,
};
use bodega_products::{Product, ProductId};

use crate::stock::{StockBalance, StockLedger};

/// Audit record for one costed sale: the per-unit cost basis reported to the
/// channel and, under FIFO, the lots the sale consumed. Read by margin
/// reporting; never consumed back into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCostRecord {
    pub movement_id: MovementId,
    pub product_id: ProductId,
    pub sale_id: Uuid,
    pub quantity: i64,
    pub unit_cost: Decimal,
    pub consumption: Vec<LotConsumption>,
    pub occurred_at: DateTime<Utc>,
}

/// Per-product state guarded by that product's lock: catalog entry plus
/// costing policy state.
#[derive(Debug)]
struct ProductEntry {
    product: Product,
    costing: CostingState,
}

/// The composed inventory ledger.
///
/// Every mutating operation for a product runs its read-check-write sequence
/// under that product's mutex, so no two concurrent sales can both pass a
/// stock or lot check against the same units. Operations on different
/// products never contend. The movement-log append is the only fallible step
/// between check and state change; when it fails, nothing has been applied.
#[derive(Debug)]
pub struct InventoryLedger<L: MovementLog = InMemoryMovementLog> {
    log: L,
    stock: StockLedger,
    tracker: ConsignmentTracker,
    entries: RwLock<HashMap<ProductId, Arc<Mutex<ProductEntry>>>>,
    liquidations: RwLock<HashMap<LiquidationId, LiquidationRecord>>,
    batch_liquidations: RwLock<HashMap<BatchId, LiquidationId>>,
    sale_costs: RwLock<HashMap<ProductId, Vec<SaleCostRecord>>>,
}

impl InventoryLedger<InMemoryMovementLog> {
    pub fn new() -> Self {
        Self::with_log(InMemoryMovementLog::new())
    }
}

impl Default for InventoryLedger<InMemoryMovementLog> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: MovementLog> InventoryLedger<L> {
    pub fn with_log(log: L) -> Self {
        Self {
            log,
            stock: StockLedger::new(),
            tracker: ConsignmentTracker::new(),
            entries: RwLock::new(HashMap::new()),
            liquidations: RwLock::new(HashMap::new()),
            batch_liquidations: RwLock::new(HashMap::new()),
            sale_costs: RwLock::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Register (or update) a product.
    ///
    /// The costing method is immutable once movements exist for the product;
    /// changing it requires an explicit migration, which the ledger rejects.
    pub fn register_product(&self, product: Product) -> LedgerResult<()> {
        let product_id = product.id_typed();

        let mut entries = self
            .entries
            .write()
            .map_err(|_| LedgerError::conflict("ledger registry lock poisoned"))?;

        if let Some(existing) = entries.get(&product_id) {
            let mut entry = lock_entry(existing)?;
            if entry.product.costing_method() != product.costing_method() {
                if self.log.stream_version(product_id)? > 0 {
                    return Err(LedgerError::conflict(
                        "costing method is immutable once movements exist",
                    ));
                }
                entry.costing = CostingState::for_method(product.costing_method());
            }
            entry.product = product;
            return Ok(());
        }

        tracing::debug!(%product_id, sku = product.sku(), "product registered");
        entries.insert(
            product_id,
            Arc::new(Mutex::new(ProductEntry {
                costing: CostingState::for_method(product.costing_method()),
                product,
            })),
        );
        Ok(())
    }

    pub fn product(&self, product_id: ProductId) -> LedgerResult<Product> {
        let entry = self.entry(product_id)?;
        let entry = lock_entry(&entry)?;
        Ok(entry.product.clone())
    }

    /// Products whose owned stock is at or below their replenishment threshold.
    pub fn below_min_stock(&self) -> LedgerResult<Vec<ProductId>> {
        self.threshold_report(|product, owned| product.is_below_min(owned))
    }

    /// Products whose owned stock exceeds their overstock threshold.
    pub fn above_max_stock(&self) -> LedgerResult<Vec<ProductId>> {
        self.threshold_report(|product, owned| product.is_above_max(owned))
    }

    // ------------------------------------------------------------------
    // Owned stock
    // ------------------------------------------------------------------

    /// Record an owned-goods receipt, folding the cost into the product's
    /// cost basis.
    pub fn receive(
        &self,
        product_id: ProductId,
        quantity: i64,
        unit_cost: Decimal,
        source: SourceRef,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<StockBalance> {
        let entry = self.entry(product_id)?;
        let mut entry = lock_entry(&entry)?;

        let movement = StockMovement {
            movement_id: MovementId::new(AggregateId::new()),
            product_id,
            kind: MovementKind::Receipt,
            quantity,
            unit_cost: Some(unit_cost),
            unit_price: None,
            batch_id: None,
            source,
            occurred_at,
        };
        let stored = self.append_and_project(movement)?;

        entry
            .costing
            .policy_mut()
            .record_receipt(quantity, unit_cost, occurred_at);

        tracing::info!(%product_id, quantity, %unit_cost, "receipt recorded");
        Ok(self.stock.current_stock(stored.movement.product_id))
    }

    /// Record an owned sale: cost the units under the product's policy,
    /// append the movement, and return the cost-of-sale audit record.
    pub fn sell(
        &self,
        product_id: ProductId,
        quantity: i64,
        unit_price: Decimal,
        sale_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<SaleCostRecord> {
        let entry = self.entry(product_id)?;
        let mut entry = lock_entry(&entry)?;

        // Plan first: pure feasibility + cost computation. Nothing has
        // mutated yet if the plan (or the append below) fails.
        let plan = entry.costing.policy().plan_sale(quantity)?;

        let movement = StockMovement {
            movement_id: MovementId::new(AggregateId::new()),
            product_id,
            kind: MovementKind::Sale,
            quantity: -quantity,
            unit_cost: None,
            unit_price: Some(unit_price),
            batch_id: None,
            source: SourceRef::Sale(sale_id),
            occurred_at,
        };
        let stored = self.append_and_project(movement)?;

        entry.costing.policy_mut().commit_sale(&plan);

        let record = SaleCostRecord {
            movement_id: stored.movement.movement_id,
            product_id,
            sale_id,
            quantity,
            unit_cost: plan.unit_cost,
            consumption: plan.consumption,
            occurred_at,
        };
        self.push_sale_cost(record.clone())?;

        tracing::info!(%product_id, quantity, unit_cost = %record.unit_cost, "sale costed");
        Ok(record)
    }

    /// Record a customer return of owned units, restocking them at the given
    /// cost basis (typically the original sale's reported unit cost).
    pub fn record_return(
        &self,
        product_id: ProductId,
        quantity: i64,
        unit_cost: Decimal,
        sale_id: Uuid,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<StockBalance> {
        let entry = self.entry(product_id)?;
        let mut entry = lock_entry(&entry)?;

        let movement = StockMovement {
            movement_id: MovementId::new(AggregateId::new()),
            product_id,
            kind: MovementKind::Return,
            quantity,
            unit_cost: Some(unit_cost),
            unit_price: None,
            batch_id: None,
            source: SourceRef::Sale(sale_id),
            occurred_at,
        };
        self.append_and_project(movement)?;

        entry
            .costing
            .policy_mut()
            .record_receipt(quantity, unit_cost, occurred_at);

        Ok(self.stock.current_stock(product_id))
    }

    /// Record a manual stock correction. Positive deltas require a unit cost
    /// and restock like a receipt; negative deltas consume under the costing
    /// policy like a sale, so lot remainders keep reconciling.
    pub fn adjust(
        &self,
        product_id: ProductId,
        delta: i64,
        unit_cost: Option<Decimal>,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<StockBalance> {
        let entry = self.entry(product_id)?;
        let mut entry = lock_entry(&entry)?;

        let plan = if delta < 0 {
            Some(entry.costing.policy().plan_sale(-delta)?)
        } else {
            None
        };

        let movement = StockMovement {
            movement_id: MovementId::new(AggregateId::new()),
            product_id,
            kind: MovementKind::Adjustment,
            quantity: delta,
            unit_cost,
            unit_price: None,
            batch_id: None,
            source: SourceRef::Manual,
            occurred_at,
        };
        self.append_and_project(movement)?;

        match plan {
            Some(plan) => entry.costing.policy_mut().commit_sale(&plan),
            None => {
                // validate() has already guaranteed the unit cost is present.
                if let Some(cost) = unit_cost {
                    entry.costing.policy_mut().record_receipt(delta, cost, occurred_at);
                }
            }
        }

        tracing::info!(%product_id, delta, "stock adjusted");
        Ok(self.stock.current_stock(product_id))
    }

    // ------------------------------------------------------------------
    // Consignment
    // ------------------------------------------------------------------

    /// Receive a consignment batch from a third-party supplier.
    pub fn receive_batch(
        &self,
        product_id: ProductId,
        supplier_id: SupplierId,
        quantity: i64,
        commission_percent: Decimal,
        received_on: chrono::NaiveDate,
        return_by: chrono::NaiveDate,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<BatchId> {
        let entry = self.entry(product_id)?;
        let _entry = lock_entry(&entry)?;

        let batch_id = BatchId::new(AggregateId::new());
        let command = ConsignmentCommand::ReceiveBatch(ReceiveBatch {
            batch_id,
            product_id,
            supplier_id,
            quantity,
            commission_percent,
            received_on,
            return_by,
            occurred_at,
        });
        let events = self.tracker.prepare(batch_id, &command)?;

        let movement = StockMovement {
            movement_id: MovementId::new(AggregateId::new()),
            product_id,
            kind: MovementKind::ConsignmentReceipt,
            quantity,
            unit_cost: None,
            unit_price: None,
            batch_id: Some(batch_id),
            source: SourceRef::Manual,
            occurred_at,
        };
        self.append_and_project(movement)?;
        self.tracker.apply_events(batch_id, &events)?;

        tracing::info!(%product_id, %batch_id, quantity, "consignment batch received");
        Ok(batch_id)
    }

    /// Record a consigned sale. When no batch is given, the tracker resolves
    /// the oldest-expiring sellable batch for the product.
    pub fn sell_consigned(
        &self,
        product_id: ProductId,
        quantity: i64,
        unit_price: Decimal,
        sale_id: Uuid,
        batch: Option<BatchId>,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<ConsignmentBatch> {
        let entry = self.entry(product_id)?;
        let _entry = lock_entry(&entry)?;

        let on_date = occurred_at.date_naive();
        let batch_id = match batch {
            Some(batch_id) => batch_id,
            None => self.tracker.infer_batch(product_id, on_date)?,
        };

        let existing = self.tracker.batch(batch_id)?;
        if existing.product_id() != Some(product_id) {
            return Err(LedgerError::conflict(format!(
                "batch {batch_id} belongs to a different product"
            )));
        }

        let command = ConsignmentCommand::SellFromBatch(SellFromBatch {
            batch_id,
            quantity,
            on_date,
            occurred_at,
        });
        let events = self.tracker.prepare(batch_id, &command)?;

        let movement = StockMovement {
            movement_id: MovementId::new(AggregateId::new()),
            product_id,
            kind: MovementKind::Sale,
            quantity: -quantity,
            unit_cost: None,
            unit_price: Some(unit_price),
            batch_id: Some(batch_id),
            source: SourceRef::Sale(sale_id),
            occurred_at,
        };
        self.append_and_project(movement)?;
        let batch = self.tracker.apply_events(batch_id, &events)?;

        tracing::info!(%product_id, %batch_id, quantity, "consigned sale recorded");
        Ok(batch)
    }

    /// Physically return unsold consigned units to their supplier ahead of
    /// settlement.
    pub fn return_unsold(
        &self,
        batch_id: BatchId,
        quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<ConsignmentBatch> {
        let product_id = self.batch_product(batch_id)?;
        let entry = self.entry(product_id)?;
        let _entry = lock_entry(&entry)?;

        let command = ConsignmentCommand::ReturnUnsold(ReturnUnsold {
            batch_id,
            quantity,
            occurred_at,
        });
        let events = self.tracker.prepare(batch_id, &command)?;

        let movement = StockMovement {
            movement_id: MovementId::new(AggregateId::new()),
            product_id,
            kind: MovementKind::ConsignmentSettle,
            quantity: -quantity,
            unit_cost: None,
            unit_price: None,
            batch_id: Some(batch_id),
            source: SourceRef::Manual,
            occurred_at,
        };
        self.append_and_project(movement)?;
        let batch = self.tracker.apply_events(batch_id, &events)?;

        tracing::info!(%batch_id, quantity, "unsold consigned units returned");
        Ok(batch)
    }

    /// Sweep batches whose return-by date has passed into `Expired`. Expired
    /// batches reject new sales and wait for settlement or return.
    pub fn expire_due(&self, occurred_at: DateTime<Utc>) -> LedgerResult<Vec<BatchId>> {
        let on_date = occurred_at.date_naive();
        let mut expired = Vec::new();

        for batch_id in self.tracker.overdue(on_date)? {
            let product_id = self.batch_product(batch_id)?;
            let entry = self.entry(product_id)?;
            let _entry = lock_entry(&entry)?;

            let command = ConsignmentCommand::ExpireBatch(ExpireBatch {
                batch_id,
                on_date,
                occurred_at,
            });
            match self.tracker.execute(batch_id, &command) {
                Ok(_) => {
                    tracing::warn!(%batch_id, "consignment batch expired unsettled");
                    expired.push(batch_id);
                }
                // Already closed by a racing settlement; nothing to do.
                Err(LedgerError::Conflict(_)) | Err(LedgerError::AlreadySettled(_)) => {}
                Err(other) => return Err(other),
            }
        }

        Ok(expired)
    }

    /// Close out a consignment batch: compute commission from the recorded
    /// sale movements and write the immutable liquidation record.
    ///
    /// Idempotent: settling an already closed batch fails `AlreadySettled`
    /// and writes nothing.
    pub fn settle(
        &self,
        batch_id: BatchId,
        occurred_at: DateTime<Utc>,
    ) -> LedgerResult<LiquidationRecord> {
        let product_id = self.batch_product(batch_id)?;
        let entry = self.entry(product_id)?;
        let _entry = lock_entry(&entry)?;

        let batch = self.tracker.batch(batch_id)?;
        let command = ConsignmentCommand::SettleBatch(SettleBatch {
            batch_id,
            occurred_at,
        });
        // Carries the idempotency guard: closed batches are rejected here.
        let events = self.tracker.prepare(batch_id, &command)?;

        let liquidation_id = LiquidationId::new(AggregateId::new());
        let movements = self.log.load_batch_movements(batch_id)?;
        let record = compute_settlement(liquidation_id, &batch, &movements, occurred_at)?;

        // Title to the unsold remainder reverts to the supplier at
        // settlement; it leaves the consigned balance and is reported as
        // pending physical return on the record.
        if record.pending_return > 0 {
            let movement = StockMovement {
                movement_id: MovementId::new(AggregateId::new()),
                product_id,
                kind: MovementKind::ConsignmentSettle,
                quantity: -record.pending_return,
                unit_cost: None,
                unit_price: None,
                batch_id: Some(batch_id),
                source: SourceRef::Liquidation(liquidation_id.0.into()),
                occurred_at,
            };
            self.append_and_project(movement)?;
        }

        self.tracker.apply_events(batch_id, &events)?;

        {
            let mut liquidations = self
                .liquidations
                .write()
                .map_err(|_| LedgerError::conflict("liquidation store lock poisoned"))?;
            liquidations.insert(liquidation_id, record.clone());
        }
        {
            let mut by_batch = self
                .batch_liquidations
                .write()
                .map_err(|_| LedgerError::conflict("liquidation store lock poisoned"))?;
            by_batch.insert(batch_id, liquidation_id);
        }

        tracing::info!(
            %batch_id,
            %liquidation_id,
            sales_value = %record.sales_value,
            commission = %record.commission,
            net_payable = %record.net_payable,
            "consignment batch settled"
        );
        Ok(record)
    }

    // ------------------------------------------------------------------
    // Read-only projections
    // ------------------------------------------------------------------

    pub fn current_stock(&self, product_id: ProductId) -> StockBalance {
        self.stock.current_stock(product_id)
    }

    /// Current per-unit cost basis of owned stock: the weighted average under
    /// `Average`, the oldest open lot's cost under `Fifo`. `None` when
    /// nothing is on hand.
    pub fn cost_basis(&self, product_id: ProductId) -> LedgerResult<Option<Decimal>> {
        let entry = self.entry(product_id)?;
        let entry = lock_entry(&entry)?;
        Ok(entry.costing.policy().current_unit_cost())
    }

    pub fn movements(&self, product_id: ProductId) -> LedgerResult<Vec<StoredMovement>> {
        self.log.load_stream(product_id)
    }

    /// Cost-of-sale audit trail for a product, in sale order.
    pub fn sale_costs(&self, product_id: ProductId) -> LedgerResult<Vec<SaleCostRecord>> {
        let sale_costs = self
            .sale_costs
            .read()
            .map_err(|_| LedgerError::conflict("sale cost store lock poisoned"))?;
        Ok(sale_costs.get(&product_id).cloned().unwrap_or_default())
    }

    pub fn batch(&self, batch_id: BatchId) -> LedgerResult<ConsignmentBatch> {
        self.tracker.batch(batch_id)
    }

    pub fn liquidation(&self, liquidation_id: LiquidationId) -> LedgerResult<LiquidationRecord> {
        let liquidations = self
            .liquidations
            .read()
            .map_err(|_| LedgerError::conflict("liquidation store lock poisoned"))?;
        liquidations
            .get(&liquidation_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("liquidation {liquidation_id}")))
    }

    pub fn liquidation_for_batch(&self, batch_id: BatchId) -> LedgerResult<LiquidationRecord> {
        let liquidation_id = {
            let by_batch = self
                .batch_liquidations
                .read()
                .map_err(|_| LedgerError::conflict("liquidation store lock poisoned"))?;
            by_batch.get(&batch_id).copied()
        };
        match liquidation_id {
            Some(id) => self.liquidation(id),
            None => Err(LedgerError::not_found(format!(
                "no liquidation for batch {batch_id}"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn entry(&self, product_id: ProductId) -> LedgerResult<Arc<Mutex<ProductEntry>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LedgerError::conflict("ledger registry lock poisoned"))?;
        entries
            .get(&product_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("product {product_id}")))
    }

    fn batch_product(&self, batch_id: BatchId) -> LedgerResult<ProductId> {
        self.tracker
            .batch(batch_id)?
            .product_id()
            .ok_or_else(|| LedgerError::not_found(format!("batch {batch_id} has no product")))
    }

    /// Balance-check, then append, then project. The append is the only
    /// fallible step once the check has passed; a rejected movement leaves
    /// every piece of state untouched.
    fn append_and_project(&self, movement: StockMovement) -> LedgerResult<StoredMovement> {
        movement.validate()?;
        self.stock.peek(&movement)?;

        let product_id = movement.product_id;
        let version = self.log.stream_version(product_id)?;
        let stored = self.log.append(movement, ExpectedVersion::Exact(version))?;
        self.stock.apply(&stored)?;
        Ok(stored)
    }

    fn push_sale_cost(&self, record: SaleCostRecord) -> LedgerResult<()> {
        let mut sale_costs = self
            .sale_costs
            .write()
            .map_err(|_| LedgerError::conflict("sale cost store lock poisoned"))?;
        sale_costs.entry(record.product_id).or_default().push(record);
        Ok(())
    }

    fn threshold_report(
        &self,
        matches: impl Fn(&Product, i64) -> bool,
    ) -> LedgerResult<Vec<ProductId>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| LedgerError::conflict("ledger registry lock poisoned"))?;

        let mut hits = Vec::new();
        for (product_id, entry) in entries.iter() {
            let entry = lock_entry(entry)?;
            let owned = self.stock.current_stock(*product_id).owned;
            if matches(&entry.product, owned) {
                hits.push(*product_id);
            }
        }
        hits.sort();
        Ok(hits)
    }
}

fn lock_entry<'a>(entry: &'a Arc<Mutex<ProductEntry>>) -> LedgerResult<MutexGuard<'a, ProductEntry>> {
    entry
        .lock()
        .map_err(|_| LedgerError::conflict("product lock poisoned"))
}
