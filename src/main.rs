use anyhow::Result;
use backtester::ReplayHarness;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use configuration::{load_coin_params, load_config, ExecutionMode};
use engine::{Engine, TickReceiver};
use events::EngineEvent;
use executor::{ExecutionGateway, MarketObserver, PaperGateway};
use feed::TickFeed;
use ledger::{Ledger, LedgerPersistence, PerformanceSnapshot};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => handle_run(args).await?,
        Commands::Replay(args) => handle_replay(args).await?,
    }

    Ok(())
}

// ==============================================================================
// CLI Structure
// ==============================================================================

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live engine: exchange tick streams in, paper orders out.
    Run(RunArgs),
    /// Replay a recorded tick stream deterministically and report.
    Replay(ReplayArgs),
}

#[derive(Parser)]
struct RunArgs {
    /// The market-data environment. Order flow is always paper.
    #[arg(long, value_enum, default_value_t = ExecutionMode::Paper)]
    mode: ExecutionMode,

    /// Path to the application configuration file.
    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,

    /// Path to the per-symbol coin parameter file.
    #[arg(long, default_value = "coins.toml")]
    coins: PathBuf,
}

#[derive(Parser)]
struct ReplayArgs {
    /// Path to the recorded tick stream (JSON lines).
    #[arg(long)]
    ticks: PathBuf,

    #[arg(long, short, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long, default_value = "coins.toml")]
    coins: PathBuf,
}

// ==============================================================================
// Command Handlers
// ==============================================================================

async fn handle_run(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.to_str())?;
    configuration::init_tracing(&config.logging)?;

    let coins = load_coin_params(&args.coins)?;
    let tradable: Vec<String> = coins
        .values()
        .filter(|params| !params.excluded)
        .map(|params| params.symbol.clone())
        .collect();
    if tradable.is_empty() {
        anyhow::bail!("every symbol in the coin-parameter file is excluded");
    }

    let testnet = matches!(args.mode, ExecutionMode::Testnet);
    match args.mode {
        ExecutionMode::Paper => {
            info!("INITIALIZING IN PAPER TRADING MODE");
            info!(">> Production data feed | Simulated local execution <<");
        }
        ExecutionMode::Testnet => {
            info!("INITIALIZING IN TESTNET DATA MODE");
            info!(">> Testnet data feed | Simulated local execution <<");
        }
    }

    // Wire up the components: paper gateway, persistent ledger, engine.
    let gateway = Arc::new(PaperGateway::new(config.simulation.clone()));
    let persistence = LedgerPersistence::new(&config.persistence)?;
    let ledger = Arc::new(Mutex::new(
        Ledger::new(config.engine.initial_equity, config.simulation.clone())
            .with_persistence(persistence),
    ));

    let engine = Engine::new(
        config.clone(),
        coins,
        Arc::clone(&gateway) as Arc<dyn ExecutionGateway>,
        Some(Arc::clone(&gateway) as Arc<dyn MarketObserver>),
        Arc::clone(&ledger),
    );

    // Relay engine events into the log.
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => log_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "event relay lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Subscribe to the tick streams.
    let feed = TickFeed::new(testnet);
    let receivers = feed.subscribe(&tradable, config.engine.channel_capacity)?;
    let streams: HashMap<String, TickReceiver> = receivers
        .into_iter()
        .map(|(symbol, rx)| (symbol, TickReceiver::Lossy(rx)))
        .collect();

    // Ctrl-C flips the shutdown switch; workers finish their current
    // tick, persist open positions, and exit.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    engine.run(streams, shutdown_rx).await?;

    let snapshot = {
        let ledger = ledger.lock().await;
        PerformanceSnapshot::compute(&ledger, &gateway.marks(), chrono::Utc::now())
    };
    print_snapshot(&snapshot);
    info!("engine has stopped; open positions (if any) are persisted for resume");
    Ok(())
}

async fn handle_replay(args: ReplayArgs) -> Result<()> {
    let config = load_config(args.config.to_str())?;
    configuration::init_tracing(&config.logging)?;
    let coins = load_coin_params(&args.coins)?;

    info!("---===[ Starting Tick Replay ]===---");
    let ticks = ReplayHarness::load_ticks(&args.ticks)?;
    info!(ticks = ticks.len(), path = %args.ticks.display(), "recording loaded");

    let harness = ReplayHarness::new(config, coins);
    let report = harness.run(&ticks).await?;

    print_snapshot(&report.snapshot);
    if report.skipped_unknown_symbol > 0 {
        warn!(
            skipped = report.skipped_unknown_symbol,
            "ticks ignored for symbols without coin parameters"
        );
    }
    Ok(())
}

// ==============================================================================
// Output helpers
// ==============================================================================

fn log_event(event: &EngineEvent) {
    // One machine-readable line per event for scrapers, alongside the
    // human-readable fields below.
    match event.to_json() {
        Ok(json) => debug!(target: "straddle::events", %json),
        Err(e) => warn!(error = %e, "engine event could not be serialized"),
    }
    match event {
        EngineEvent::PositionOpened(position) => info!(
            symbol = %position.symbol,
            side = %position.side,
            entry = %position.entry_price,
            quantity = %position.quantity,
            "position opened"
        ),
        EngineEvent::TradeClosed(trade) => info!(
            symbol = %trade.symbol,
            side = %trade.side,
            exit_reason = %trade.exit_reason,
            net_pnl = %trade.net_pnl,
            "trade closed"
        ),
        EngineEvent::EntryAborted { symbol, detail } => {
            warn!(%symbol, %detail, "two-way entry aborted")
        }
        EngineEvent::EquityUpdated { account_equity, .. } => {
            info!(equity = %account_equity, "account equity updated")
        }
        EngineEvent::WorkerFailed { symbol, detail } => {
            warn!(%symbol, %detail, "symbol worker failed; manual intervention required")
        }
    }
}

fn print_snapshot(snapshot: &PerformanceSnapshot) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Metric", "Value"]);

    table.add_row(vec![
        Cell::new("Account equity"),
        Cell::new(format!("{:.2}", snapshot.account_equity)),
    ]);
    table.add_row(vec![
        Cell::new("Realized net P&L"),
        Cell::new(format!("{:.2}", snapshot.realized_net_pnl)),
    ]);
    table.add_row(vec![
        Cell::new("Unrealized P&L"),
        Cell::new(format!("{:.2}", snapshot.unrealized_pnl)),
    ]);
    table.add_row(vec![
        Cell::new("Total return %"),
        Cell::new(format!("{:.4}", snapshot.total_return_pct)),
    ]);
    table.add_row(vec![
        Cell::new("Win rate %"),
        Cell::new(
            snapshot
                .win_rate_pct
                .map(|w| format!("{w:.2}"))
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]);
    table.add_row(vec![
        Cell::new("Profit factor"),
        Cell::new(
            snapshot
                .profit_factor
                .map(|p| format!("{p:.2}"))
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]);
    table.add_row(vec![
        Cell::new("Max drawdown %"),
        Cell::new(format!("{:.4}", snapshot.max_drawdown_pct)),
    ]);
    table.add_row(vec![
        Cell::new("Closed trades"),
        Cell::new(snapshot.total_trades),
    ]);
    table.add_row(vec![
        Cell::new("Trades today"),
        Cell::new(snapshot.trades_today),
    ]);
    table.add_row(vec![
        Cell::new("Open positions"),
        Cell::new(snapshot.open_position_count),
    ]);
    table.add_row(vec![
        Cell::new("Total fees paid"),
        Cell::new(format!("{:.2}", snapshot.total_fees_paid)),
    ]);

    println!("{table}");
}
