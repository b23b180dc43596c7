//! `bodega-costing` — cost basis of sold units.
//!
//! Two costing policies behind one interface, selected per product at catalog
//! setup: a single weighted-average cost, or discrete FIFO cost lots consumed
//! oldest-first. Policies are two-phase: `plan_sale` is a pure feasibility
//! check + cost computation, `commit_sale` applies a previously planned
//! consumption, so the durable movement-log append can sit between the two
//! without ever leaving costing state half-updated.

pub mod average;
pub mod fifo;
pub mod lot;
pub mod policy;

pub use average::AverageCosting;
pub use fifo::FifoCosting;
pub use lot::{CostLot, LotConsumption, LotId};
pub use policy::{CostingPolicy, CostingState, SaleCost};
