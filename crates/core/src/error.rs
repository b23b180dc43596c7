//! Ledger error model.

use thiserror::Error;

/// Result type used across the ledger crates.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger-level error.
///
/// Keep this focused on deterministic business failures. Every variant is
/// returned to the immediate caller synchronously; nothing is retried
/// internally, and a rejected operation leaves state unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A movement was malformed (zero delta, kind/field mismatch, bad reference).
    /// Not retryable without correction.
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    /// A sale requested more units than the owned stock can cover.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Applying the movement would take a stock balance below zero.
    #[error("negative stock: balance {balance} with delta {delta}")]
    NegativeStock { balance: i64, delta: i64 },

    /// A consigned sale exceeds the batch's remaining quantity.
    #[error("batch oversold: requested {requested}, remaining {remaining}")]
    BatchOversold { requested: i64, remaining: i64 },

    /// A physical return exceeds the batch's remaining quantity.
    #[error("over-return: requested {requested}, remaining {remaining}")]
    OverReturn { requested: i64, remaining: i64 },

    /// The batch's return-by date has passed; it can only be settled or returned.
    #[error("batch expired: {0}")]
    BatchExpired(String),

    /// The batch was already settled or returned; settlement is once-only.
    #[error("already settled: {0}")]
    AlreadySettled(String),

    /// A requested entity was not registered with the ledger.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conflict occurred (e.g. stale stream version, immutable field change).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl LedgerError {
    pub fn invalid_movement(msg: impl Into<String>) -> Self {
        Self::InvalidMovement(msg.into())
    }

    pub fn batch_expired(msg: impl Into<String>) -> Self {
        Self::BatchExpired(msg.into())
    }

    pub fn already_settled(msg: impl Into<String>) -> Self {
        Self::AlreadySettled(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}
