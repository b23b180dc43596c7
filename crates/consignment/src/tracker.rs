use std::collections::HashMap;
use std::sync::RwLock;

use chrono::NaiveDate;

use bodega_core::{Aggregate, LedgerError, LedgerResult};
use bodega_products::ProductId;

use crate::batch::{BatchId, ConsignmentBatch, ConsignmentCommand, ConsignmentEvent};

/// Registry of consignment batches.
///
/// Drives the batch aggregate (handle → apply) and answers the two questions
/// the ledger needs: "which batch should this unattributed consigned sale
/// draw from?" and "which batches are overdue?". Mutations for one product's
/// batches are expected to run under that product's ledger lock.
#[derive(Debug, Default)]
pub struct ConsignmentTracker {
    batches: RwLock<HashMap<BatchId, ConsignmentBatch>>,
}

impl ConsignmentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide what a command would do, without mutating the registry.
    ///
    /// Returns the events the batch would emit. The caller applies them with
    /// [`ConsignmentTracker::apply_events`] once its own durable write has
    /// succeeded, so a failed write never leaves a half-updated batch.
    pub fn prepare(
        &self,
        batch_id: BatchId,
        command: &ConsignmentCommand,
    ) -> LedgerResult<Vec<ConsignmentEvent>> {
        let batches = self
            .batches
            .read()
            .map_err(|_| LedgerError::conflict("consignment tracker lock poisoned"))?;

        let batch = batches
            .get(&batch_id)
            .cloned()
            .unwrap_or_else(|| ConsignmentBatch::empty(batch_id));

        batch.handle(command)
    }

    /// Evolve a batch from previously prepared events.
    pub fn apply_events(
        &self,
        batch_id: BatchId,
        events: &[ConsignmentEvent],
    ) -> LedgerResult<ConsignmentBatch> {
        let mut batches = self
            .batches
            .write()
            .map_err(|_| LedgerError::conflict("consignment tracker lock poisoned"))?;

        let batch = batches
            .entry(batch_id)
            .or_insert_with(|| ConsignmentBatch::empty(batch_id));
        for event in events {
            batch.apply(event);
        }

        Ok(batch.clone())
    }

    /// Execute a command against a batch, applying the resulting events.
    ///
    /// Returns the updated batch and the events that were applied. A failed
    /// command leaves the registry untouched.
    pub fn execute(
        &self,
        batch_id: BatchId,
        command: &ConsignmentCommand,
    ) -> LedgerResult<(ConsignmentBatch, Vec<ConsignmentEvent>)> {
        let events = self.prepare(batch_id, command)?;
        let batch = self.apply_events(batch_id, &events)?;
        Ok((batch, events))
    }

    /// Look up a batch by id.
    pub fn batch(&self, batch_id: BatchId) -> LedgerResult<ConsignmentBatch> {
        let batches = self
            .batches
            .read()
            .map_err(|_| LedgerError::conflict("consignment tracker lock poisoned"))?;

        batches
            .get(&batch_id)
            .cloned()
            .ok_or_else(|| LedgerError::not_found(format!("batch {batch_id}")))
    }

    /// All batches for a product, in no particular order.
    pub fn batches_for_product(&self, product_id: ProductId) -> LedgerResult<Vec<ConsignmentBatch>> {
        let batches = self
            .batches
            .read()
            .map_err(|_| LedgerError::conflict("consignment tracker lock poisoned"))?;

        Ok(batches
            .values()
            .filter(|b| b.product_id() == Some(product_id))
            .cloned()
            .collect())
    }

    /// Resolve the batch an unattributed consigned sale should draw from:
    /// the sellable batch with the earliest return-by date, to minimize
    /// expiry losses. Ties break on batch id for determinism.
    pub fn infer_batch(&self, product_id: ProductId, on_date: NaiveDate) -> LedgerResult<BatchId> {
        let batches = self
            .batches
            .read()
            .map_err(|_| LedgerError::conflict("consignment tracker lock poisoned"))?;

        batches
            .values()
            .filter(|b| b.product_id() == Some(product_id) && b.is_sellable_on(on_date))
            .min_by_key(|b| (b.return_by(), b.id_typed()))
            .map(|b| b.id_typed())
            .ok_or_else(|| {
                LedgerError::not_found(format!("no sellable consignment batch for {product_id}"))
            })
    }

    /// Batches still on sale whose return-by date has passed.
    pub fn overdue(&self, on_date: NaiveDate) -> LedgerResult<Vec<BatchId>> {
        let batches = self
            .batches
            .read()
            .map_err(|_| LedgerError::conflict("consignment tracker lock poisoned"))?;

        let mut due: Vec<BatchId> = batches
            .values()
            .filter(|b| {
                b.status() == crate::batch::BatchStatus::OnSale
                    && b.return_by().is_some_and(|d| on_date > d)
            })
            .map(|b| b.id_typed())
            .collect();

        due.sort();
        Ok(due)
    }
}
