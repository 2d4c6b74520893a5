//! Benchmark suite for the engine's synchronous hot paths
//!
//! Pricing and admission run inline on every submission request, so their
//! cost is paid per HTTP request. These benchmarks use the divan framework.
//!
//! # Running Benchmarks
//!
//! ```bash
//! cargo bench
//! ```

use chrono::Utc;
use rust_decimal::Decimal;
use std::hint::black_box;

use commerce_engine::{compute_payable, CapacityController, Discount};

fn main() {
    divan::main();
}

/// Benchmark a quote with no discount code
#[divan::bench]
fn quote_without_code() {
    let quote = compute_payable(
        black_box(Decimal::new(2500, 2)),
        black_box(2),
        None,
        &[],
        Utc::now(),
    );
    black_box(quote);
}

/// Benchmark a quote resolving a code against a realistic catalog size
#[divan::bench]
fn quote_with_code_lookup() {
    let discounts: Vec<Discount> = (0..20)
        .map(|i| Discount::percent_off(format!("CODE{i}"), Decimal::new(10, 0)))
        .collect();

    let quote = compute_payable(
        black_box(Decimal::new(2500, 2)),
        black_box(2),
        Some(black_box("code19")),
        &discounts,
        Utc::now(),
    );
    black_box(quote);
}

/// Benchmark sequential admissions against one bounded ledger
#[divan::bench]
fn admissions_single_subject() {
    let controller = CapacityController::new();
    controller.set_capacity("gala", Some(1_000_000));

    for _ in 0..1_000 {
        black_box(controller.admit(black_box("gala"), 1, true));
    }
}
