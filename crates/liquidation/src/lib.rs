//! `bodega-liquidation` — consignment settlement.
//!
//! Closes out a consignment batch: commission and net payable are computed
//! from the sale movements actually recorded against the batch, never from a
//! recomputation over current catalog prices. The output is an immutable
//! [`LiquidationRecord`], written once per batch.

pub mod settlement;

pub use settlement::{compute_settlement, LiquidationId, LiquidationRecord};
