//! `bodega-movements` — the append-only movement log.
//!
//! Every stock-affecting event in the system is recorded here as an immutable
//! [`StockMovement`] fact. The log is the sole source of truth: balances,
//! cost bases and settlements are all derived from it and can be rebuilt by
//! replay.

pub mod log;
pub mod movement;

pub use log::{InMemoryMovementLog, MovementLog, StoredMovement};
pub use movement::{MovementId, MovementKind, SourceRef, StockMovement};
