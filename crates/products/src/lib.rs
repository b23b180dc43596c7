//! `bodega-products` — catalog entries the ledger costs and tracks.

pub mod product;

pub use product::{CostingMethod, Product, ProductId};
