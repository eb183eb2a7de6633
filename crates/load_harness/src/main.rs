//! CLI entry point for the voice gateway load harness (spec.md §4.6, §6
//! "Exit codes: Load harness: 0 on success-rate >= 95%, 1 on below-
//! threshold, 130 on SIGINT").

use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;

use load_harness::audio_pool::AudioPool;
use load_harness::config::{LoadTestConfig, Scenario, SelectionStrategy};
use load_harness::runner::LoadTestRunner;

const SUCCESS_RATE_THRESHOLD: f64 = 0.95;

#[derive(Parser, Debug)]
#[command(name = "voice-load-harness", about = "Load generator for the voice gateway's /ws/voice endpoint")]
struct Cli {
    /// Pre-defined load profile (overridable with the flags below).
    #[arg(long, value_enum, default_value = "baseline")]
    scenario: Scenario,

    /// Base URL of the gateway, e.g. ws://localhost:50060.
    #[arg(long, default_value = "ws://localhost:50060")]
    target_url: String,

    /// Directory of `*.wav` files to replay.
    #[arg(long, default_value = "./test_audio")]
    audio_dir: String,

    /// How virtual users pick their next audio file.
    #[arg(long, value_enum, default_value = "round-robin")]
    strategy: SelectionStrategy,

    /// Overrides the scenario's virtual-user count.
    #[arg(long)]
    users: Option<u32>,

    /// BCP-47 language tag sent in each session's config frame.
    #[arg(long, default_value = "en-US")]
    language: String,

    /// Write the final JSON report to this path.
    #[arg(long)]
    output: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()))
        .compact()
        .init();

    let mut config = LoadTestConfig::from_scenario(cli.scenario, cli.target_url, cli.audio_dir);
    config.strategy = cli.strategy;
    config.language_code = cli.language;
    config.output_file = cli.output;
    if let Some(users) = cli.users {
        config.max_users = users;
    }

    let audio_pool = match AudioPool::load(&config.audio_dir, config.strategy) {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            tracing::error!(error = %e, "failed to load audio pool");
            std::process::exit(1);
        }
    };
    tracing::info!(files = audio_pool.len(), "loaded audio pool");

    let (stop_tx, stop_rx) = watch::channel(false);
    let sigint = tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = stop_tx.send(true);
    });

    let runner = LoadTestRunner::new(config.clone(), audio_pool);
    let collector = runner.collector();
    runner.run(stop_rx.clone()).await;
    sigint.abort();

    let interrupted = *stop_rx.borrow();
    let report = collector.generate_report();
    print_summary(&report);

    if let Some(path) = &config.output_file {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    tracing::error!(error = %e, path = %path, "failed to write report");
                }
            }
            Err(e) => tracing::error!(error = %e, "failed to serialize report"),
        }
    }

    if interrupted {
        std::process::exit(130);
    }
    if report.success_rate < SUCCESS_RATE_THRESHOLD {
        tracing::error!(success_rate = report.success_rate, "success rate below threshold");
        std::process::exit(1);
    }
    std::process::exit(0);
}

fn print_summary(report: &load_harness::collector::Report) {
    println!("{}", "=".repeat(60));
    println!("LOAD TEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Duration:        {:.2}s", report.total_duration_seconds);
    println!("Total Requests:  {}", report.total_requests);
    println!("Successful:      {}", report.successful_requests);
    println!("Failed:          {}", report.failed_requests);
    println!("Timed out:       {}", report.timeout_requests);
    println!("Success Rate:    {:.1}%", report.success_rate * 100.0);
    println!("Throughput:      {:.2} req/s", report.requests_per_second);

    if let Some(e2e) = &report.latency.e2e {
        println!("\nEnd-to-End Latency:");
        println!("  P50:  {:.0}ms", e2e.median * 1000.0);
        println!("  P95:  {:.0}ms", e2e.p95 * 1000.0);
        println!("  P99:  {:.0}ms", e2e.p99 * 1000.0);
        println!("  Max:  {:.0}ms", e2e.max * 1000.0);
    }

    if !report.errors.is_empty() {
        println!("\nTop Errors:");
        for err in report.errors.iter().take(5) {
            println!("  [{}x] {}", err.count, err.message);
        }
    }
    println!("{}", "=".repeat(60));
}
