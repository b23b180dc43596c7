use serde::{Deserialize, Serialize};

use bodega_core::{AggregateId, LedgerError};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How the cost basis of sold units is derived for a product.
///
/// Selected at catalog setup and immutable once movements exist; changing it
/// afterwards requires an explicit migration, which the ledger rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostingMethod {
    /// Single weighted-average cost, recomputed on every receipt.
    Average,
    /// Oldest-first consumption of discrete cost lots.
    Fifo,
}

/// Catalog entry: identity, costing method, replenishment thresholds.
///
/// The product carries no balance; stock is always derived from the movement
/// log. `min_stock`/`max_stock` only feed replenishment and overstock reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    costing_method: CostingMethod,
    min_stock: i64,
    max_stock: Option<i64>,
}

impl Product {
    pub fn new(
        id: ProductId,
        sku: impl Into<String>,
        name: impl Into<String>,
        costing_method: CostingMethod,
    ) -> Result<Self, LedgerError> {
        let sku = sku.into();
        let name = name.into();

        if sku.trim().is_empty() {
            return Err(LedgerError::conflict("SKU cannot be empty"));
        }
        if name.trim().is_empty() {
            return Err(LedgerError::conflict("name cannot be empty"));
        }

        Ok(Self {
            id,
            sku,
            name,
            costing_method,
            min_stock: 0,
            max_stock: None,
        })
    }

    /// Set replenishment thresholds. `max_stock`, when present, must not be
    /// below `min_stock`.
    pub fn with_thresholds(
        mut self,
        min_stock: i64,
        max_stock: Option<i64>,
    ) -> Result<Self, LedgerError> {
        if min_stock < 0 {
            return Err(LedgerError::conflict("min_stock cannot be negative"));
        }
        if let Some(max) = max_stock {
            if max < min_stock {
                return Err(LedgerError::conflict("max_stock below min_stock"));
            }
        }
        self.min_stock = min_stock;
        self.max_stock = max_stock;
        Ok(self)
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn costing_method(&self) -> CostingMethod {
        self.costing_method
    }

    pub fn min_stock(&self) -> i64 {
        self.min_stock
    }

    pub fn max_stock(&self) -> Option<i64> {
        self.max_stock
    }

    /// Owned quantity at or below the replenishment threshold.
    pub fn is_below_min(&self, owned: i64) -> bool {
        owned <= self.min_stock
    }

    /// Owned quantity above the overstock threshold (if one is set).
    pub fn is_above_max(&self, owned: i64) -> bool {
        self.max_stock.is_some_and(|max| owned > max)
    }
}
