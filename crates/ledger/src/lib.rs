//! `bodega-ledger` — the composed inventory ledger.
//!
//! Wires the movement log, stock projection, costing engine, consignment
//! tracker and liquidation engine behind one in-process service boundary.
//! Presentation and orchestration layers consume [`service::InventoryLedger`];
//! they never write into the underlying state directly.

pub mod service;
pub mod stock;


pub use service::{InventoryLedger, SaleCostRecord};
pub use stock::{StockBalance, StockLedger};
