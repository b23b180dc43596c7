use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bodega_core::{Aggregate, AggregateId, AggregateRoot, LedgerError};
use bodega_products::ProductId;

/// Consignment batch identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub AggregateId);

impl BatchId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Third-party supplier identifier (opaque; resolved by the caller's storage).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupplierId(pub AggregateId);

impl SupplierId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for SupplierId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Commission percentage owed to the store on consigned sales.
///
/// Zero is a deliberate supported case: zero-commission suppliers are paid
/// the full sales value at settlement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommissionRate(Decimal);

impl CommissionRate {
    pub const ZERO: CommissionRate = CommissionRate(Decimal::ZERO);

    pub fn new(percent: Decimal) -> Result<Self, LedgerError> {
        if percent < Decimal::ZERO || percent > Decimal::ONE_HUNDRED {
            return Err(LedgerError::invalid_movement(format!(
                "commission percentage out of range: {percent}"
            )));
        }
        Ok(Self(percent))
    }

    pub fn percent(&self) -> Decimal {
        self.0
    }

    /// Commission amount on a gross sales value.
    pub fn of(&self, sales_value: Decimal) -> Decimal {
        sales_value * self.0 / Decimal::ONE_HUNDRED
    }
}

/// Batch lifecycle. `Settled`, `Returned` and `Expired` close the batch to
/// new sales; `Expired` can still be settled or returned to close it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    OnSale,
    Settled,
    Returned,
    Expired,
}

/// Aggregate root: ConsignmentBatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsignmentBatch {
    id: BatchId,
    product_id: Option<ProductId>,
    supplier_id: Option<SupplierId>,
    commission: CommissionRate,
    received_on: Option<NaiveDate>,
    return_by: Option<NaiveDate>,
    quantity_received: i64,
    quantity_sold: i64,
    quantity_returned: i64,
    status: BatchStatus,
    version: u64,
    created: bool,
}

impl ConsignmentBatch {
    /// Create an empty, not-yet-received aggregate instance for rehydration.
    pub fn empty(id: BatchId) -> Self {
        Self {
            id,
            product_id: None,
            supplier_id: None,
            commission: CommissionRate::ZERO,
            received_on: None,
            return_by: None,
            quantity_received: 0,
            quantity_sold: 0,
            quantity_returned: 0,
            status: BatchStatus::OnSale,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> BatchId {
        self.id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn supplier_id(&self) -> Option<SupplierId> {
        self.supplier_id
    }

    pub fn commission(&self) -> CommissionRate {
        self.commission
    }

    pub fn return_by(&self) -> Option<NaiveDate> {
        self.return_by
    }

    pub fn quantity_received(&self) -> i64 {
        self.quantity_received
    }

    pub fn quantity_sold(&self) -> i64 {
        self.quantity_sold
    }

    pub fn quantity_returned(&self) -> i64 {
        self.quantity_returned
    }

    /// Units still on hand: received − sold − returned.
    pub fn remaining(&self) -> i64 {
        self.quantity_received - self.quantity_sold - self.quantity_returned
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    /// Whether new sales may draw from this batch on the given date.
    pub fn is_sellable_on(&self, date: NaiveDate) -> bool {
        self.status == BatchStatus::OnSale
            && self.remaining() > 0
            && self.return_by.is_some_and(|due| date <= due)
    }
}

impl AggregateRoot for ConsignmentBatch {
    type Id = BatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ReceiveBatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveBatch {
    pub batch_id: BatchId,
    pub product_id: ProductId,
    pub supplier_id: SupplierId,
    pub quantity: i64,
    pub commission_percent: Decimal,
    pub received_on: NaiveDate,
    pub return_by: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SellFromBatch (units sold through any channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellFromBatch {
    pub batch_id: BatchId,
    pub quantity: i64,
    pub on_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnUnsold (physical return to the supplier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnUnsold {
    pub batch_id: BatchId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ExpireBatch (return-by date passed without settlement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireBatch {
    pub batch_id: BatchId,
    pub on_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SettleBatch (liquidation closes the batch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleBatch {
    pub batch_id: BatchId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsignmentCommand {
    ReceiveBatch(ReceiveBatch),
    SellFromBatch(SellFromBatch),
    ReturnUnsold(ReturnUnsold),
    ExpireBatch(ExpireBatch),
    SettleBatch(SettleBatch),
}

/// Event: BatchReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceived {
    pub batch_id: BatchId,
    pub product_id: ProductId,
    pub supplier_id: SupplierId,
    pub quantity: i64,
    pub commission: CommissionRate,
    pub received_on: NaiveDate,
    pub return_by: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchUnitsSold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUnitsSold {
    pub batch_id: BatchId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchUnitsReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUnitsReturned {
    pub batch_id: BatchId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchClosedReturned. Every received unit went back to the supplier
/// without a single sale; the batch closes with zero commission due.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchClosedReturned {
    pub batch_id: BatchId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchExpired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchExpired {
    pub batch_id: BatchId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: BatchSettled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettled {
    pub batch_id: BatchId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsignmentEvent {
    BatchReceived(BatchReceived),
    BatchUnitsSold(BatchUnitsSold),
    BatchUnitsReturned(BatchUnitsReturned),
    BatchClosedReturned(BatchClosedReturned),
    BatchExpired(BatchExpired),
    BatchSettled(BatchSettled),
}

impl Aggregate for ConsignmentBatch {
    type Command = ConsignmentCommand;
    type Event = ConsignmentEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ConsignmentEvent::BatchReceived(e) => {
                self.id = e.batch_id;
                self.product_id = Some(e.product_id);
                self.supplier_id = Some(e.supplier_id);
                self.commission = e.commission;
                self.received_on = Some(e.received_on);
                self.return_by = Some(e.return_by);
                self.quantity_received = e.quantity;
                self.quantity_sold = 0;
                self.quantity_returned = 0;
                self.status = BatchStatus::OnSale;
                self.created = true;
            }
            ConsignmentEvent::BatchUnitsSold(e) => {
                self.quantity_sold += e.quantity;
            }
            ConsignmentEvent::BatchUnitsReturned(e) => {
                self.quantity_returned += e.quantity;
            }
            ConsignmentEvent::BatchClosedReturned(_) => {
                self.status = BatchStatus::Returned;
            }
            ConsignmentEvent::BatchExpired(_) => {
                self.status = BatchStatus::Expired;
            }
            ConsignmentEvent::BatchSettled(_) => {
                self.status = BatchStatus::Settled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ConsignmentCommand::ReceiveBatch(cmd) => self.handle_receive(cmd),
            ConsignmentCommand::SellFromBatch(cmd) => self.handle_sell(cmd),
            ConsignmentCommand::ReturnUnsold(cmd) => self.handle_return(cmd),
            ConsignmentCommand::ExpireBatch(cmd) => self.handle_expire(cmd),
            ConsignmentCommand::SettleBatch(cmd) => self.handle_settle(cmd),
        }
    }
}

impl ConsignmentBatch {
    fn ensure_batch_id(&self, batch_id: BatchId) -> Result<(), LedgerError> {
        if self.id != batch_id {
            return Err(LedgerError::conflict("batch_id mismatch"));
        }
        Ok(())
    }

    /// Terminal statuses reject everything but a repeated settlement attempt,
    /// which gets the dedicated idempotency error.
    fn ensure_open(&self) -> Result<(), LedgerError> {
        match self.status {
            BatchStatus::OnSale | BatchStatus::Expired => Ok(()),
            BatchStatus::Settled | BatchStatus::Returned => Err(LedgerError::already_settled(
                format!("batch {} is closed", self.id),
            )),
        }
    }

    fn handle_receive(&self, cmd: &ReceiveBatch) -> Result<Vec<ConsignmentEvent>, LedgerError> {
        if self.created {
            return Err(LedgerError::conflict("batch already received"));
        }
        if cmd.quantity <= 0 {
            return Err(LedgerError::invalid_movement(
                "batch quantity must be positive",
            ));
        }
        if cmd.return_by < cmd.received_on {
            return Err(LedgerError::invalid_movement(
                "return-by date precedes received date",
            ));
        }
        let commission = CommissionRate::new(cmd.commission_percent)?;

        Ok(vec![ConsignmentEvent::BatchReceived(BatchReceived {
            batch_id: cmd.batch_id,
            product_id: cmd.product_id,
            supplier_id: cmd.supplier_id,
            quantity: cmd.quantity,
            commission,
            received_on: cmd.received_on,
            return_by: cmd.return_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sell(&self, cmd: &SellFromBatch) -> Result<Vec<ConsignmentEvent>, LedgerError> {
        if !self.created {
            return Err(LedgerError::not_found(format!("batch {}", cmd.batch_id)));
        }
        self.ensure_batch_id(cmd.batch_id)?;
        self.ensure_open()?;

        if cmd.quantity <= 0 {
            return Err(LedgerError::invalid_movement(
                "sale quantity must be positive",
            ));
        }

        // An expired batch can only be closed out by settlement or return;
        // the rejection is reported so the caller can trigger liquidation.
        if self.status == BatchStatus::Expired {
            return Err(LedgerError::batch_expired(format!(
                "batch {} is expired",
                self.id
            )));
        }
        if let Some(due) = self.return_by {
            if cmd.on_date > due {
                return Err(LedgerError::batch_expired(format!(
                    "batch {} was due back {due}",
                    self.id
                )));
            }
        }

        let remaining = self.remaining();
        if cmd.quantity > remaining {
            return Err(LedgerError::BatchOversold {
                requested: cmd.quantity,
                remaining,
            });
        }

        Ok(vec![ConsignmentEvent::BatchUnitsSold(BatchUnitsSold {
            batch_id: cmd.batch_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnUnsold) -> Result<Vec<ConsignmentEvent>, LedgerError> {
        if !self.created {
            return Err(LedgerError::not_found(format!("batch {}", cmd.batch_id)));
        }
        self.ensure_batch_id(cmd.batch_id)?;
        self.ensure_open()?;

        if cmd.quantity <= 0 {
            return Err(LedgerError::invalid_movement(
                "return quantity must be positive",
            ));
        }

        let remaining = self.remaining();
        if cmd.quantity > remaining {
            return Err(LedgerError::OverReturn {
                requested: cmd.quantity,
                remaining,
            });
        }

        let mut events = vec![ConsignmentEvent::BatchUnitsReturned(BatchUnitsReturned {
            batch_id: cmd.batch_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })];

        // Nothing ever sold and every unit back with the supplier: the batch
        // closes as Returned with zero commission due.
        if self.quantity_sold == 0 && self.quantity_returned + cmd.quantity == self.quantity_received
        {
            events.push(ConsignmentEvent::BatchClosedReturned(BatchClosedReturned {
                batch_id: cmd.batch_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_expire(&self, cmd: &ExpireBatch) -> Result<Vec<ConsignmentEvent>, LedgerError> {
        if !self.created {
            return Err(LedgerError::not_found(format!("batch {}", cmd.batch_id)));
        }
        self.ensure_batch_id(cmd.batch_id)?;

        if self.status != BatchStatus::OnSale {
            return Err(LedgerError::conflict("only on-sale batches can expire"));
        }
        match self.return_by {
            Some(due) if cmd.on_date > due => {}
            _ => {
                return Err(LedgerError::conflict("batch is not yet past its return-by date"));
            }
        }

        Ok(vec![ConsignmentEvent::BatchExpired(BatchExpired {
            batch_id: cmd.batch_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_settle(&self, cmd: &SettleBatch) -> Result<Vec<ConsignmentEvent>, LedgerError> {
        if !self.created {
            return Err(LedgerError::not_found(format!("batch {}", cmd.batch_id)));
        }
        self.ensure_batch_id(cmd.batch_id)?;
        self.ensure_open()?;

        Ok(vec![ConsignmentEvent::BatchSettled(BatchSettled {
            batch_id: cmd.batch_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_batch_id() -> BatchId {
        BatchId::new(AggregateId::new())
    }

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_supplier_id() -> SupplierId {
        SupplierId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn received_batch(quantity: i64, commission: Decimal) -> ConsignmentBatch {
        let batch_id = test_batch_id();
        let mut batch = ConsignmentBatch::empty(batch_id);
        let cmd = ReceiveBatch {
            batch_id,
            product_id: test_product_id(),
            supplier_id: test_supplier_id(),
            quantity,
            commission_percent: commission,
            received_on: date(2025, 3, 1),
            return_by: date(2025, 3, 8),
            occurred_at: test_time(),
        };
        let events = batch
            .handle(&ConsignmentCommand::ReceiveBatch(cmd))
            .unwrap();
        for e in &events {
            batch.apply(e);
        }
        batch
    }

    fn sell(batch: &mut ConsignmentBatch, quantity: i64, on_date: NaiveDate) -> Result<(), LedgerError> {
        let cmd = SellFromBatch {
            batch_id: batch.id_typed(),
            quantity,
            on_date,
            occurred_at: test_time(),
        };
        let events = batch.handle(&ConsignmentCommand::SellFromBatch(cmd))?;
        for e in &events {
            batch.apply(e);
        }
        Ok(())
    }

    #[test]
    fn receive_batch_opens_on_sale() {
        let batch = received_batch(20, dec!(15));
        assert_eq!(batch.status(), BatchStatus::OnSale);
        assert_eq!(batch.quantity_received(), 20);
        assert_eq!(batch.remaining(), 20);
        assert_eq!(batch.commission().percent(), dec!(15));
    }

    #[test]
    fn receive_rejects_out_of_range_commission() {
        let batch_id = test_batch_id();
        let batch = ConsignmentBatch::empty(batch_id);
        let cmd = ReceiveBatch {
            batch_id,
            product_id: test_product_id(),
            supplier_id: test_supplier_id(),
            quantity: 10,
            commission_percent: dec!(101),
            received_on: date(2025, 3, 1),
            return_by: date(2025, 3, 8),
            occurred_at: test_time(),
        };
        let err = batch
            .handle(&ConsignmentCommand::ReceiveBatch(cmd))
            .unwrap_err();
        match err {
            LedgerError::InvalidMovement(_) => {}
            _ => panic!("Expected InvalidMovement for commission out of range"),
        }
    }

    #[test]
    fn zero_commission_is_valid() {
        let batch = received_batch(15, Decimal::ZERO);
        assert_eq!(batch.commission().percent(), Decimal::ZERO);
        assert_eq!(batch.commission().of(dec!(4500)), Decimal::ZERO);
    }

    #[test]
    fn sell_decrements_remaining() {
        let mut batch = received_batch(20, dec!(15));
        sell(&mut batch, 5, date(2025, 3, 3)).unwrap();
        assert_eq!(batch.quantity_sold(), 5);
        assert_eq!(batch.remaining(), 15);
    }

    #[test]
    fn oversell_fails_and_leaves_batch_unchanged() {
        let mut batch = received_batch(20, dec!(15));
        sell(&mut batch, 18, date(2025, 3, 3)).unwrap();

        let before = batch.clone();
        let err = sell(&mut batch, 3, date(2025, 3, 3)).unwrap_err();
        match err {
            LedgerError::BatchOversold { requested: 3, remaining: 2 } => {}
            other => panic!("Expected BatchOversold, got {other:?}"),
        }
        assert_eq!(batch, before);
    }

    #[test]
    fn sell_past_return_by_reports_expired() {
        let mut batch = received_batch(20, dec!(15));
        let err = sell(&mut batch, 1, date(2025, 3, 9)).unwrap_err();
        match err {
            LedgerError::BatchExpired(_) => {}
            other => panic!("Expected BatchExpired, got {other:?}"),
        }
        assert_eq!(batch.quantity_sold(), 0);
    }

    #[test]
    fn return_unsold_tracks_quantity_returned() {
        let mut batch = received_batch(20, dec!(15));
        sell(&mut batch, 5, date(2025, 3, 3)).unwrap();

        let cmd = ReturnUnsold {
            batch_id: batch.id_typed(),
            quantity: 10,
            occurred_at: test_time(),
        };
        let events = batch.handle(&ConsignmentCommand::ReturnUnsold(cmd)).unwrap();
        assert_eq!(events.len(), 1);
        for e in &events {
            batch.apply(e);
        }

        assert_eq!(batch.quantity_returned(), 10);
        assert_eq!(batch.remaining(), 5);
        // Units were sold, so a partial return does not close the batch.
        assert_eq!(batch.status(), BatchStatus::OnSale);
    }

    #[test]
    fn over_return_fails() {
        let mut batch = received_batch(20, dec!(15));
        sell(&mut batch, 5, date(2025, 3, 3)).unwrap();

        let cmd = ReturnUnsold {
            batch_id: batch.id_typed(),
            quantity: 16,
            occurred_at: test_time(),
        };
        let err = batch.handle(&ConsignmentCommand::ReturnUnsold(cmd)).unwrap_err();
        match err {
            LedgerError::OverReturn { requested: 16, remaining: 15 } => {}
            other => panic!("Expected OverReturn, got {other:?}"),
        }
    }

    #[test]
    fn full_return_with_no_sales_closes_as_returned() {
        let mut batch = received_batch(20, dec!(15));

        let cmd = ReturnUnsold {
            batch_id: batch.id_typed(),
            quantity: 20,
            occurred_at: test_time(),
        };
        let events = batch.handle(&ConsignmentCommand::ReturnUnsold(cmd)).unwrap();
        assert_eq!(events.len(), 2);
        for e in &events {
            batch.apply(e);
        }

        assert_eq!(batch.status(), BatchStatus::Returned);
        assert_eq!(batch.remaining(), 0);
    }

    #[test]
    fn expire_requires_past_due_date() {
        let mut batch = received_batch(20, dec!(15));

        let premature = ExpireBatch {
            batch_id: batch.id_typed(),
            on_date: date(2025, 3, 8),
            occurred_at: test_time(),
        };
        assert!(batch
            .handle(&ConsignmentCommand::ExpireBatch(premature))
            .is_err());

        let due = ExpireBatch {
            batch_id: batch.id_typed(),
            on_date: date(2025, 3, 9),
            occurred_at: test_time(),
        };
        let events = batch.handle(&ConsignmentCommand::ExpireBatch(due)).unwrap();
        for e in &events {
            batch.apply(e);
        }
        assert_eq!(batch.status(), BatchStatus::Expired);
    }

    #[test]
    fn expired_batch_rejects_sales_but_settles() {
        let mut batch = received_batch(20, dec!(15));
        sell(&mut batch, 4, date(2025, 3, 3)).unwrap();

        let expire = ExpireBatch {
            batch_id: batch.id_typed(),
            on_date: date(2025, 3, 9),
            occurred_at: test_time(),
        };
        let events = batch.handle(&ConsignmentCommand::ExpireBatch(expire)).unwrap();
        for e in &events {
            batch.apply(e);
        }

        let err = sell(&mut batch, 1, date(2025, 3, 10)).unwrap_err();
        match err {
            LedgerError::BatchExpired(_) => {}
            other => panic!("Expected BatchExpired, got {other:?}"),
        }

        let settle = SettleBatch {
            batch_id: batch.id_typed(),
            occurred_at: test_time(),
        };
        let events = batch.handle(&ConsignmentCommand::SettleBatch(settle)).unwrap();
        for e in &events {
            batch.apply(e);
        }
        assert_eq!(batch.status(), BatchStatus::Settled);
    }

    #[test]
    fn settle_twice_fails_already_settled() {
        let mut batch = received_batch(20, dec!(15));

        let settle = SettleBatch {
            batch_id: batch.id_typed(),
            occurred_at: test_time(),
        };
        let events = batch
            .handle(&ConsignmentCommand::SettleBatch(settle.clone()))
            .unwrap();
        for e in &events {
            batch.apply(e);
        }

        let err = batch
            .handle(&ConsignmentCommand::SettleBatch(settle))
            .unwrap_err();
        match err {
            LedgerError::AlreadySettled(_) => {}
            other => panic!("Expected AlreadySettled, got {other:?}"),
        }
    }

    #[cfg(test)]
    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Invariant: sold + returned never exceeds received, whatever the
            /// interleaving of sells and returns.
            #[test]
            fn sold_plus_returned_bounded_by_received(
                received in 1i64..200,
                ops in prop::collection::vec((0u8..2, 1i64..50), 0..20)
            ) {
                let mut batch = received_batch(received, dec!(15));

                for (op, qty) in ops {
                    let result = if op == 0 {
                        sell(&mut batch, qty, date(2025, 3, 3))
                    } else {
                        let cmd = ReturnUnsold {
                            batch_id: batch.id_typed(),
                            quantity: qty,
                            occurred_at: test_time(),
                        };
                        batch.handle(&ConsignmentCommand::ReturnUnsold(cmd)).map(|events| {
                            for e in &events {
                                batch.apply(e);
                            }
                        })
                    };

                    // Rejected operations must leave the invariant intact too.
                    let _ = result;
                    prop_assert!(batch.quantity_sold() + batch.quantity_returned() <= batch.quantity_received());
                    prop_assert!(batch.remaining() >= 0);
                }
            }
        }
    }
}
