use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use btc_watcher::models::{HeightRange, Transaction, TransactionPage, WatchedAddressSet};

fn create_test_transaction(id: u64, outputs: usize) -> Transaction {
    let vout: Vec<_> = (0..outputs)
        .map(|i| {
            serde_json::json!({
                "scriptpubkey_type": "v0_p2wpkh",
                "scriptpubkey_address": format!("bc1q{:038x}", id * 31 + i as u64),
                "value": 10_000 + i as u64,
            })
        })
        .collect();

    serde_json::from_value(serde_json::json!({
        "txid": format!("{:064x}", id),
        "vout": vout,
        "status": { "confirmed": true, "block_height": 883550 },
    }))
    .expect("Failed to build transaction")
}

fn bench_page_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_planning");

    for tx_count in [1usize, 250, 3_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("transaction_pages", tx_count), tx_count, |b, &tx_count| {
            b.iter(|| TransactionPage::plan(black_box("00000000000000000001"), 883_550, tx_count, 25));
        });
    }

    group.bench_function("height_ranges_1000", |b| {
        b.iter(|| HeightRange::partition(black_box(882_551), black_box(883_550), 10));
    });

    group.finish();
}

fn bench_address_filter(c: &mut Criterion) {
    let transactions: Vec<_> = (0..1_000).map(|id| create_test_transaction(id, 3)).collect();

    let mut group = c.benchmark_group("address_filter");

    for watched in [1usize, 100, 10_000].iter() {
        let set = WatchedAddressSet::new((0..*watched as u64).map(|i| format!("bc1q{:038x}", i * 7)));
        group.bench_with_input(BenchmarkId::new("match_1000_transactions", watched), &set, |b, set| {
            b.iter(|| transactions.iter().filter(|tx| set.matches(black_box(tx))).count());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_page_planning, bench_address_filter);
criterion_main!(benches);
