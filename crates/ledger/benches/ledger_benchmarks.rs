use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use bodega_core::AggregateId;
use bodega_ledger::InventoryLedger;
use bodega_movements::SourceRef;
use bodega_products::{CostingMethod, Product, ProductId};

/// Naive CRUD simulation: direct mutable balances (no log, no history).
#[derive(Debug, Clone)]
struct NaiveCrudStore {
    inner: Arc<RwLock<HashMap<ProductId, i64>>>,
}

impl NaiveCrudStore {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn receive(&self, product_id: ProductId, quantity: i64) {
        let mut map = self.inner.write().unwrap();
        *map.entry(product_id).or_insert(0) += quantity;
    }

    fn sell(&self, product_id: ProductId, quantity: i64) -> Result<(), ()> {
        let mut map = self.inner.write().unwrap();
        let balance = map.entry(product_id).or_insert(0);
        if *balance < quantity {
            return Err(());
        }
        *balance -= quantity;
        Ok(())
    }
}

fn setup_ledger(method: CostingMethod) -> (InventoryLedger, ProductId) {
    let ledger = InventoryLedger::new();
    let product_id = ProductId::new(AggregateId::new());
    let product = Product::new(product_id, "BEB001", "Coca-Cola 350ml", method).unwrap();
    ledger.register_product(product).unwrap();
    ledger
        .receive(
            product_id,
            10_000_000_000,
            Decimal::from(2000),
            SourceRef::Manual,
            Utc::now(),
        )
        .unwrap();
    (ledger, product_id)
}

fn bench_sale_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("sale_latency");
    group.throughput(Throughput::Elements(1));

    group.bench_function("ledger_average", |b| {
        let (ledger, product_id) = setup_ledger(CostingMethod::Average);
        b.iter(|| {
            ledger
                .sell(
                    black_box(product_id),
                    1,
                    Decimal::from(3500),
                    Uuid::now_v7(),
                    Utc::now(),
                )
                .unwrap()
        });
    });

    group.bench_function("ledger_fifo", |b| {
        let (ledger, product_id) = setup_ledger(CostingMethod::Fifo);
        b.iter(|| {
            ledger
                .sell(
                    black_box(product_id),
                    1,
                    Decimal::from(3500),
                    Uuid::now_v7(),
                    Utc::now(),
                )
                .unwrap()
        });
    });

    group.bench_function("naive_crud", |b| {
        let store = NaiveCrudStore::new();
        let product_id = ProductId::new(AggregateId::new());
        store.receive(product_id, 10_000_000_000);
        b.iter(|| store.sell(black_box(product_id), 1).unwrap());
    });

    group.finish();
}

fn bench_receipt_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("receipt_throughput");
    group.throughput(Throughput::Elements(100));

    group.bench_function("ledger_fifo_100_receipts", |b| {
        b.iter(|| {
            let (ledger, product_id) = setup_ledger(CostingMethod::Fifo);
            for _ in 0..100 {
                ledger
                    .receive(
                        product_id,
                        10,
                        Decimal::from(2000),
                        SourceRef::Manual,
                        Utc::now(),
                    )
                    .unwrap();
            }
            black_box(ledger.current_stock(product_id))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_sale_latency, bench_receipt_throughput);
criterion_main!(benches);
