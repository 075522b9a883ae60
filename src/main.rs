use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;

use accrual_bot::binance::rest::BinanceFuturesClient;
use accrual_bot::config::{Config, DEFAULT_CONFIG_PATH};
use accrual_bot::executor::{OrderGateway, ReleaseExecutor};
use accrual_bot::model::release::RealizedRelease;
use accrual_bot::price_source::PriceSource;
use accrual_bot::release_stats::ReleaseStats;
use accrual_bot::release_store::{export_csv, ReleaseLedger};
use accrual_bot::runtime::{replay_file, spawn_pollers};
use accrual_bot::sink::{LogSink, QueueSink};

#[derive(Parser)]
#[command(name = "accrual-bot")]
#[command(version)]
#[command(about = "Accumulate price movement and realize it once a threshold is crossed", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll live prices and realize releases (default)
    Run,

    /// Feed a `symbol,timestamp_ms,price` CSV through the accumulators in dry-run mode
    Replay {
        file: PathBuf,

        /// Skip writing the releases CSV
        #[arg(long)]
        no_export: bool,
    },
}

fn init_tracing(config: &Config) -> Result<()> {
    // Log to file so the stdout summary stays readable
    let log_file = std::fs::File::create(&config.logging.file)
        .with_context(|| format!("failed to create {}", config.logging.file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();
    Ok(())
}

fn finish(
    stats: &ReleaseStats,
    started: Instant,
    pending: &BTreeMap<String, f64>,
    history: &[RealizedRelease],
    csv_dir: Option<&Path>,
) -> Result<()> {
    println!(
        "{}",
        stats.render_summary(started.elapsed().as_secs_f64(), pending)?
    );
    if let Some(dir) = csv_dir {
        match export_csv(history, dir)? {
            Some(path) => {
                tracing::info!(path = %path.display(), rows = history.len(), "Releases exported");
                println!("Releases saved to {}", path.display());
            }
            None => println!("No releases to export"),
        }
    }
    Ok(())
}

async fn run_live(config: Config) -> Result<()> {
    config.require_credentials()?;
    let symbols = config.binance.tradable_symbols();
    let accumulator = config.accumulator.to_config()?;
    let settings = config.execution_settings();
    let dry_run = settings.dry_run;

    tracing::info!(
        symbols = ?symbols,
        rest_url = %config.binance.rest_base_url,
        threshold = accumulator.threshold,
        min_delta = accumulator.min_delta,
        contribution = accumulator.contribution.label(),
        dry_run,
        "Starting accrual-bot"
    );

    let client = Arc::new(BinanceFuturesClient::new(
        &config.binance.rest_base_url,
        &config.binance.api_key,
        &config.binance.api_secret,
        config.binance.recv_window,
    ));

    client.ping().await.context("Binance futures ping failed")?;
    if let Err(e) = client.sync_time().await {
        if dry_run {
            tracing::warn!(error = %format!("{:#}", e), "Time sync failed, continuing in dry-run");
        } else {
            return Err(e.context("time sync failed"));
        }
    }

    if !dry_run {
        client.set_one_way_mode().await.context("failed to set one-way position mode")?;
        if let Some(leverage) = config.binance.leverage {
            for symbol in &symbols {
                if let Err(e) = client.change_leverage(symbol, leverage).await {
                    tracing::warn!(symbol = %symbol, leverage, error = %format!("{:#}", e), "Failed to set leverage");
                }
            }
        }
    }

    let stats = Arc::new(ReleaseStats::new(config.execution.initial_capital));
    let ledger = ReleaseLedger::open(&config.storage.db_path)?;
    let (queue, release_rx) = QueueSink::channel();

    let gateway: Arc<dyn OrderGateway> = client.clone();
    let executor = ReleaseExecutor::new(Some(gateway), settings, stats.clone()).with_ledger(ledger);
    let executor_handle = tokio::spawn(executor.run(release_rx));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let source: Arc<dyn PriceSource> = client.clone();
    let pollers = spawn_pollers(
        source,
        &symbols,
        &accumulator,
        &queue,
        config.poller_settings()?,
        &stats,
        &shutdown_rx,
    )?;
    // Pollers hold the remaining senders; the executor stops once they finish.
    drop(queue);

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Ctrl+C received");
        let _ = shutdown_tx.send(true);
    });

    let started = Instant::now();
    let mut pending = BTreeMap::new();
    for handle in pollers {
        match handle.await {
            Ok(report) => {
                pending.insert(report.symbol.clone(), report.trigger.state().accumulated());
            }
            Err(e) => tracing::error!(error = %e, "Poller task panicked"),
        }
    }

    let history = executor_handle.await.context("executor task failed")?;
    finish(&stats, started, &pending, &history, Some(&config.storage.csv_dir))?;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn run_replay(config: Config, file: &Path, export: bool) -> Result<()> {
    let accumulator = config.accumulator.to_config()?;
    let mut settings = config.execution_settings();
    settings.dry_run = true;
    settings.close_delay_ms = 0;

    let started = Instant::now();
    let stats = Arc::new(ReleaseStats::new(config.execution.initial_capital));
    let report = replay_file(file, accumulator, &mut LogSink)?;
    tracing::info!(
        observations = report.observations,
        rejected = report.rejected,
        releases = report.releases.len(),
        "Replay finished"
    );

    let mut executor = ReleaseExecutor::dry_run(settings, stats.clone());
    for event in report.releases {
        executor.realize(event).await;
    }

    let pending = report
        .book
        .symbols()
        .into_iter()
        .filter_map(|s| {
            report
                .book
                .get(&s)
                .map(|t| (s.clone(), t.state().accumulated()))
        })
        .collect::<BTreeMap<_, _>>();
    let csv_dir = export.then_some(config.storage.csv_dir.as_path());
    finish(&stats, started, &pending, executor.history(), csv_dir)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required by rustls 0.23+)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let cli = Cli::parse();
    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            eprintln!("Check {} and your .env file", cli.config.display());
            std::process::exit(1);
        }
    };
    init_tracing(&config)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_live(config).await,
        Command::Replay { file, no_export } => run_replay(config, &file, !no_export).await,
    }
}
