// Share/asset conversion and pricing benchmarks.
//
// Covers the u128 mul-div used by every vault conversion, simple interest
// accrual, rate schedule lookup, and ledger transfers at various holder
// counts.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rwa_protocol::asset::{FungibleAsset, TokenLedger};
use rwa_protocol::config::{RateSchedule, SECONDS_PER_DAY, SECONDS_PER_YEAR};
use rwa_protocol::math::{mul_div, simple_interest, Rounding};
use rwa_protocol::types::Address;

fn bench_mul_div(c: &mut Criterion) {
    let mut group = c.benchmark_group("math/mul_div");
    for rounding in [Rounding::Floor, Rounding::Ceil] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{rounding:?}")),
            &rounding,
            |b, &rounding| {
                b.iter(|| {
                    mul_div(
                        black_box(9_876_543_210_123),
                        black_box(1_000_000_000_001),
                        black_box(999_999_999_997),
                        rounding,
                    )
                    .unwrap()
                });
            },
        );
    }
    group.finish();
}

fn bench_simple_interest(c: &mut Criterion) {
    c.bench_function("math/simple_interest", |b| {
        b.iter(|| {
            simple_interest(
                black_box(250_000_000_000),
                black_box(1_200),
                black_box(SECONDS_PER_YEAR / 3),
            )
            .unwrap()
        });
    });
}

fn bench_rate_lookup(c: &mut Criterion) {
    let schedule = RateSchedule::default();
    c.bench_function("config/rate_for", |b| {
        b.iter(|| schedule.rate_for(black_box(5_502), black_box(90 * SECONDS_PER_DAY)));
    });
}

fn bench_ledger_transfer(c: &mut Criterion) {
    let mut group = c.benchmark_group("asset/transfer");

    for holders in [10, 1_000, 100_000] {
        let mut ledger = TokenLedger::new("USDC", 6);
        let accounts: Vec<Address> = (0..holders)
            .map(|i| Address::new(format!("holder-{i:06}")))
            .collect();
        for account in &accounts {
            ledger.mint(account, 1_000_000).unwrap();
        }
        let (from, to) = (accounts[0].clone(), accounts[holders - 1].clone());

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(holders), &holders, |b, _| {
            b.iter(|| {
                ledger.transfer(&from, &to, 1).unwrap();
                ledger.transfer(&to, &from, 1).unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_mul_div,
    bench_simple_interest,
    bench_rate_lookup,
    bench_ledger_transfer,
);
criterion_main!(benches);
