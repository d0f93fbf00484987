//! backtest-runner: trains on one cohort, scores the next, reports.
//!
//! Usage:
//!   backtest-runner --config backtest.json
//!   backtest-runner --config backtest.json --db samples.db --run-id jan-apr
//!   backtest-runner --config backtest.json --data-dir ./data --json

use anyhow::{Context, Result};
use overdue_core::{backtest::Backtest, config::BacktestConfig, store::SampleStore, types::new_run_id};
use std::env;
use std::path::Path;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let config_path = flag_value(&args, "--config").context("--config <path> is required")?;
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir");
    let json = args.iter().any(|a| a == "--json");
    let run_id = flag_value(&args, "--run-id")
        .map(str::to_string)
        .unwrap_or_else(new_run_id);

    let mut config = BacktestConfig::load(config_path)?;
    if let Some(root) = data_dir {
        config = config.with_data_root(Path::new(root));
    }

    if !json {
        println!("Loan delinquency backtest");
        println!("  config:    {config_path}");
        println!("  db:        {db}");
        println!("  run_id:    {run_id}");
        println!("  train:     {:?} -> {:?}", config.train.feature_months, config.train.label_months);
        println!("  test:      {:?} -> {:?}", config.test.feature_months, config.test.label_months);
        println!();
    }

    let store = SampleStore::open(db)?;
    store.migrate()?;

    let mut backtest = Backtest::new(config)?;
    let summary = backtest.run(&store, &run_id)?;
    log::info!("run {run_id} complete");

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let output = &backtest.config().output;
    println!("=== RUN SUMMARY ===");
    println!("  features:          {}", summary.feature_count);
    println!("  train samples:     {}", summary.train_samples);
    println!("  test samples:      {}", summary.test_samples);
    println!("  actual overdue:    {}", summary.actual_overdue);
    println!("  predicted overdue: {}", summary.predicted_overdue);
    println!("  flagged in report: {}", summary.flagged_customers);
    println!();
    println!("=== METRICS ===");
    if summary.metrics.is_empty() {
        println!("  (no metrics configured)");
    }
    for metric in &summary.metrics {
        println!("  {}", metric.line);
    }
    println!();
    println!("  deviation report: {}", output.deviation_report.display());
    println!("  metrics report:   {}", output.metrics_report.display());

    Ok(())
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}
