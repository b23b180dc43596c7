//! `bodega-consignment` — third-party consigned inventory.
//!
//! A [`ConsignmentBatch`] tracks goods a supplier has placed on sale in the
//! store: received → on-sale → settled/returned/expired. Sold consigned units
//! stay linked to their originating batch so commissions are computed once and
//! only once per unit at liquidation time.

pub mod batch;
pub mod tracker;

pub use batch::{
    BatchId, BatchStatus, CommissionRate, ConsignmentBatch, ConsignmentCommand, ConsignmentEvent,
    ExpireBatch, ReceiveBatch, ReturnUnsold, SellFromBatch, SettleBatch, SupplierId,
};
pub use tracker::ConsignmentTracker;
