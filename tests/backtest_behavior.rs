//! Behavior-driven tests for the monthly backtest.
//!
//! These tests verify WHAT a replay does with the account: the first month
//! invests the capital, holdings that fall out of the keep band are sold to
//! cash, months without a ranking carry positions over, and fatal upstream
//! errors stop the run.

mod support;

use std::collections::BTreeSet;
use std::sync::Arc;

use momentum_core::{
    monthly_schedule, BacktestError, BacktestRequest, Backtester, CacheStore, PriceFetcher,
    RebalanceError, Strategy, Symbol,
};
use support::{fast_policy, instrument, Trend, TrendSource};
use time::macros::date;
use time::Date;

fn backtester(source: TrendSource) -> Backtester {
    let fetcher = PriceFetcher::new(Arc::new(source), CacheStore::in_memory(), fast_policy());
    Backtester::new(fetcher)
}

fn request(symbols: &[String], end: Date, months: u32) -> BacktestRequest {
    BacktestRequest {
        strategy: Strategy::SixMonth,
        end,
        months,
        universe: symbols.iter().map(|symbol| instrument(symbol)).collect(),
    }
}

fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

fn set(names: &[&str]) -> BTreeSet<Symbol> {
    names
        .iter()
        .map(|name| Symbol::parse(name).expect("valid symbol"))
        .collect()
}

// =============================================================================
// Backtest: Account
// =============================================================================

#[tokio::test]
async fn when_leaders_rise_steadily_account_compounds_with_them() {
    // Given: Two symbols rising 1% a month, priced at 100 on the first date
    let start = date!(2024 - 07 - 01);
    let end = date!(2025 - 07 - 01);
    let source = TrendSource::new(start)
        .with("AAA", Trend::steady(0.01))
        .with("BBB", Trend::steady(0.01));
    let expected_growth = source.price("AAA", end) / 100.0;

    // When: A twelve-month replay runs with one million of capital
    let report = backtester(source)
        .with_initial_capital(1_000_000.0)
        .run(&request(&symbols(&["AAA", "BBB"]), end, 12))
        .await
        .expect("backtest runs");

    // Then: The capital is invested on the first date and never traded again
    assert_eq!(report.start, start);
    assert_eq!(report.points.len(), 13);
    assert_eq!(report.points[0].buys, set(&["AAA", "BBB"]));
    assert!(report.points[0].cash.abs() < 1e-6);
    assert!(report.points[1..]
        .iter()
        .all(|point| point.buys.is_empty() && point.sells.is_empty()));

    // And: The account tracks the price growth
    let summary = report.summary;
    assert!((summary.final_value / 1_000_000.0 - expected_growth).abs() < 1e-9);
    assert!((summary.total_return - (expected_growth - 1.0)).abs() < 1e-9);
    assert!(summary.annualized_return > 0.0);
    assert_eq!(summary.max_drawdown, 0.0);
    assert_eq!(summary.rebalances, 13);
}

#[tokio::test]
async fn when_holding_collapses_out_of_keep_band_system_sells_it_to_cash() {
    // Given: Forty steady risers and one symbol that peaks on the first date
    let start = date!(2024 - 12 - 01);
    let end = date!(2025 - 03 - 01);
    let mut source = TrendSource::new(start).with(
        "CRASH",
        Trend {
            before: 0.10,
            after: -0.30,
        },
    );
    let mut names = vec![String::from("CRASH")];
    for i in 0..40 {
        let name = format!("S{i:02}");
        source = source.with(&name, Trend::steady(0.001 * f64::from(i + 1)));
        names.push(name);
    }

    // When: A three-month replay runs
    let report = backtester(source)
        .run(&request(&names, end, 3))
        .await
        .expect("backtest runs");

    // Then: The first month buys the leader among the top twenty
    let crash = Symbol::parse("CRASH").expect("valid symbol");
    assert_eq!(report.points[0].buys.len(), 20);
    assert!(report.points[0].buys.contains(&crash));

    // And: It is kept while inside the top forty, then sold once it ranks last
    assert!(report.points[1].sells.is_empty());
    assert_eq!(report.points[2].sells, BTreeSet::from([crash.clone()]));
    assert!(report.points[2].cash > 0.0);
    assert!(report.points[3..]
        .iter()
        .all(|point| !point.buys.contains(&crash)));
    assert_eq!(report.points[3].holdings, 20);
}

#[tokio::test]
async fn when_no_symbol_can_be_ranked_system_carries_positions_over() {
    // Given: A month in which every ranking window comes back empty
    let start = date!(2025 - 01 - 15);
    let end = date!(2025 - 03 - 15);
    let source = TrendSource::new(start)
        .with("AAA", Trend::steady(0.02))
        .with("BBB", Trend::steady(0.01))
        .unranked_on(date!(2025 - 02 - 15));

    // When: A two-month replay runs
    let report = backtester(source)
        .run(&request(&symbols(&["AAA", "BBB"]), end, 2))
        .await
        .expect("backtest runs");

    // Then: The middle month keeps both holdings and marks them up
    let skipped = &report.points[1];
    assert!(!skipped.rebalanced);
    assert_eq!(skipped.holdings, 2);
    assert!(skipped.value > report.points[0].value);
    assert_eq!(report.summary.rebalances, 2);
}

// =============================================================================
// Backtest: Failures
// =============================================================================

#[tokio::test]
async fn when_upstream_rejects_the_token_backtest_aborts() {
    let source = TrendSource::new(date!(2025 - 01 - 01))
        .with("AAA", Trend::steady(0.01))
        .fatal_for("BBB");

    let error = backtester(source)
        .run(&request(&symbols(&["AAA", "BBB"]), date!(2025 - 03 - 01), 2))
        .await
        .expect_err("fatal fetch must abort");

    assert!(matches!(
        error,
        BacktestError::Rebalance(RebalanceError::Fatal { .. })
    ));
}

#[tokio::test]
async fn when_capital_is_not_positive_backtest_is_rejected() {
    let source = TrendSource::new(date!(2025 - 01 - 01)).with("AAA", Trend::steady(0.01));

    let error = backtester(source)
        .with_initial_capital(0.0)
        .run(&request(&symbols(&["AAA"]), date!(2025 - 03 - 01), 2))
        .await
        .expect_err("capital must be positive");

    assert!(matches!(error, BacktestError::InvalidCapital(_)));
}

#[test]
fn schedule_ends_on_the_requested_date() {
    let schedule = monthly_schedule(date!(2025 - 05 - 31), 12).expect("schedule");

    assert_eq!(schedule.len(), 13);
    assert_eq!(schedule.first(), Some(&date!(2024 - 05 - 31)));
    assert_eq!(schedule[9], date!(2025 - 02 - 28));
    assert_eq!(schedule.last(), Some(&date!(2025 - 05 - 31)));
}
