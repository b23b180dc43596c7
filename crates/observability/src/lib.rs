//! Observability wiring for hosts embedding the ledger.

pub mod tracing;

pub use self::tracing::init;
