//! Offload Pipeline Benchmark Runner
//!
//! Run with: cargo run --release --bin pipeline_bench
//! Set RUST_LOG=info for per-run planner and driver logs.

use txn_offload::bench::{benchmark_policies, run_benchmark, BenchmarkConfig, BenchmarkResult, Workload};
use txn_offload::{LayoutConfig, PlacementStrategy};

fn section(title: &str) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", title);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

fn report(results: Result<Vec<BenchmarkResult>, txn_offload::OffloadError>) -> Vec<BenchmarkResult> {
    match results {
        Ok(results) => {
            for r in &results {
                println!("{}", r);
            }
            results
        }
        Err(e) => {
            eprintln!("benchmark failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn main() {
    env_logger::init();

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              SWITCH OFFLOAD PIPELINE BENCHMARK               ║");
    println!("║         18 stages x 2 registers, 3 locks, 8 port groups      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let mut summary = Vec::new();

    // Test 1: skewed 8-key transactions (the common case)
    section("TEST 1: 20,000 txs, Hot8, every lock policy");
    let config = BenchmarkConfig::default();
    summary.extend(report(benchmark_policies(&config)));

    // Test 2: uniform keys, few conflicts
    section("TEST 2: 20,000 txs, Uniform 4-key, every lock policy");
    let config = BenchmarkConfig {
        workload: Workload::Uniform,
        num_keys: 10_000,
        layout: LayoutConfig {
            hot_fraction: 0.1,
            ..LayoutConfig::default()
        },
        ..BenchmarkConfig::default()
    };
    summary.extend(report(benchmark_policies(&config)));

    // Test 3: every transaction recirculates at least once
    section("TEST 3: 5,000 txs, Adversarial multi-pass, every lock policy");
    let config = BenchmarkConfig {
        workload: Workload::Adversarial,
        num_transactions: 5_000,
        num_keys: 2_000,
        layout: LayoutConfig {
            hot_fraction: 1.0,
            ..LayoutConfig::default()
        },
        ..BenchmarkConfig::default()
    };
    summary.extend(report(benchmark_policies(&config)));

    // Test 4: placement strategies under the same workload
    section("TEST 4: 20,000 txs, Hot8, placement strategies");
    for strategy in [
        PlacementStrategy::FrequencyHeuristic,
        PlacementStrategy::NaiveSpray,
        PlacementStrategy::RandomSpray { seed: 7 },
    ] {
        println!("Strategy: {:?}", strategy);
        let config = BenchmarkConfig {
            layout: LayoutConfig {
                strategy,
                ..BenchmarkConfig::default().layout
            },
            ..BenchmarkConfig::default()
        };
        report(run_benchmark(&config).map(|r| vec![r]));
    }

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                           SUMMARY                            ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    for r in &summary {
        println!(
            "║  {:<12} {:<14} {:>8.3} commits/cycle  {:>6} aborts ║",
            format!("{:?}", r.workload),
            format!("{:?}", r.policy),
            r.commits_per_cycle(),
            r.aborted
        );
    }
    println!("╚══════════════════════════════════════════════════════════════╝");

    if summary.iter().any(|r| !r.serializable) {
        eprintln!("non-serializable schedule observed");
        std::process::exit(1);
    }
}
