use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use bodega_consignment::BatchId;
use bodega_core::{ExpectedVersion, LedgerError, LedgerResult};
use bodega_products::ProductId;

use crate::movement::StockMovement;

/// A movement after append: assigned its position in the product's stream.
///
/// Sequence numbers are per-product, start at 1 and increase without gaps.
/// They give each product a total order over its movements while leaving
/// ordering across products unconstrained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMovement {
    pub sequence_number: u64,
    pub movement: StockMovement,
}

/// Append-only, per-product movement log.
///
/// The log is the ledger's single durable-write suspension point. Appends for
/// one product are serialized through `ExpectedVersion`; a failed append has
/// no effect. Movements are never mutated or deleted.
pub trait MovementLog: Send + Sync {
    /// Validate and append one movement to its product's stream.
    ///
    /// Fails with `InvalidMovement` if the fact is malformed and `Conflict`
    /// if `expected_version` does not match the current stream version.
    fn append(
        &self,
        movement: StockMovement,
        expected_version: ExpectedVersion,
    ) -> LedgerResult<StoredMovement>;

    /// Load the full ordered stream for a product.
    fn load_stream(&self, product_id: ProductId) -> LedgerResult<Vec<StoredMovement>>;

    /// Load every movement referencing a consignment batch, in append order.
    ///
    /// This is the liquidation engine's audit source: settlements are computed
    /// from recorded sale movements, never from current catalog prices.
    fn load_batch_movements(&self, batch_id: BatchId) -> LedgerResult<Vec<StoredMovement>>;

    /// Current stream version (sequence number of the last movement, 0 if empty).
    fn stream_version(&self, product_id: ProductId) -> LedgerResult<u64>;
}

impl<L> MovementLog for Arc<L>
where
    L: MovementLog + ?Sized,
{
    fn append(
        &self,
        movement: StockMovement,
        expected_version: ExpectedVersion,
    ) -> LedgerResult<StoredMovement> {
        (**self).append(movement, expected_version)
    }

    fn load_stream(&self, product_id: ProductId) -> LedgerResult<Vec<StoredMovement>> {
        (**self).load_stream(product_id)
    }

    fn load_batch_movements(&self, batch_id: BatchId) -> LedgerResult<Vec<StoredMovement>> {
        (**self).load_batch_movements(batch_id)
    }

    fn stream_version(&self, product_id: ProductId) -> LedgerResult<u64> {
        (**self).stream_version(product_id)
    }
}

/// In-memory append-only movement log.
///
/// The reference store; durable backends live outside the ledger.
#[derive(Debug, Default)]
pub struct InMemoryMovementLog {
    streams: RwLock<HashMap<ProductId, Vec<StoredMovement>>>,
}

impl InMemoryMovementLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredMovement]) -> u64 {
        stream.last().map(|m| m.sequence_number).unwrap_or(0)
    }
}

impl MovementLog for InMemoryMovementLog {
    fn append(
        &self,
        movement: StockMovement,
        expected_version: ExpectedVersion,
    ) -> LedgerResult<StoredMovement> {
        movement.validate()?;

        let mut streams = self
            .streams
            .write()
            .map_err(|_| LedgerError::conflict("movement log lock poisoned"))?;

        let stream = streams.entry(movement.product_id).or_default();
        let current = Self::current_version(stream);
        expected_version.check(current)?;

        let stored = StoredMovement {
            sequence_number: current + 1,
            movement,
        };
        stream.push(stored.clone());

        Ok(stored)
    }

    fn load_stream(&self, product_id: ProductId) -> LedgerResult<Vec<StoredMovement>> {
        let streams = self
            .streams
            .read()
            .map_err(|_| LedgerError::conflict("movement log lock poisoned"))?;

        Ok(streams.get(&product_id).cloned().unwrap_or_default())
    }

    fn load_batch_movements(&self, batch_id: BatchId) -> LedgerResult<Vec<StoredMovement>> {
        let streams = self
            .streams
            .read()
            .map_err(|_| LedgerError::conflict("movement log lock poisoned"))?;

        let mut hits: Vec<StoredMovement> = streams
            .values()
            .flatten()
            .filter(|m| m.movement.batch_id == Some(batch_id))
            .cloned()
            .collect();

        // Batches belong to a single product, so sequence numbers give a
        // total order over the hits.
        hits.sort_by_key(|m| m.sequence_number);
        Ok(hits)
    }

    fn stream_version(&self, product_id: ProductId) -> LedgerResult<u64> {
        let streams = self
            .streams
            .read()
            .map_err(|_| LedgerError::conflict("movement log lock poisoned"))?;

        Ok(streams.get(&product_id).map(|s| Self::current_version(s)).unwrap_or(0))
    }
}
