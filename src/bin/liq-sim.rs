//! Liquidation scheduling simulator
//!
//! Drives the liquidator over several auction rounds on a manual timer, with
//! an optional host stall and governance repair.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use console::{style, Term};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use auction_liquidator::auction::{AuctionParameter, ManualAuctioneer, RoundPublisher};
use auction_liquidator::core::amount::{Amount, Brand};
use auction_liquidator::core::config::LiquidatorConfig;
use auction_liquidator::core::time::{RelativeTime, Timestamp};
use auction_liquidator::liquidation::{
    AtomicTransfer, CollateralizationCriteria, CustodyLedger, Keyword, LiquidationEngine,
    ManagedVault, VaultId, VaultQueue,
};
use auction_liquidator::scheduler::{LiquidationDirector, SchedulerState, SchedulerStatus};
use auction_liquidator::timer::{ManualTimer, TimerWaker};
use auction_liquidator::utils::constants::TICK;

const DEBT: Brand = Brand::new(1);
const COLLATERAL: Brand = Brand::new(2);

/// Auction liquidator simulator
#[derive(Parser)]
#[command(name = "liq-sim")]
#[command(version = auction_liquidator::VERSION)]
#[command(about = "Simulate liquidation wakeup scheduling over several auction rounds", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, env = "LIQ_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Run the simulation
    Run {
        /// Auction rounds to drive
        #[arg(short, long, default_value = "4")]
        rounds: u64,

        /// Vaults to open before the first round
        #[arg(long, default_value = "6")]
        vaults: u64,

        /// Round whose preparation the host sleeps through
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        stall_round: Option<u64>,

        /// Ticks past the stalled round's nominal start the host wakes at
        #[arg(long, default_value = "60")]
        late_by: u64,

        /// Publish a governance update when the liquidator pauses
        #[arg(long)]
        repair: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let term = Term::stdout();

    if let Err(e) = run_command(&cli, &term) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run_command(cli: &Cli, term: &Term) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init { force } => cmd_init(cli.config.as_deref(), *force, term),
        Commands::Run {
            rounds,
            vaults,
            stall_round,
            late_by,
            repair,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let plan = SimPlan {
                rounds: *rounds,
                vaults: *vaults,
                stall_round: *stall_round,
                late_by: *late_by,
                repair: *repair,
            };
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(simulate(config, plan, term))
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<LiquidatorConfig> {
    let config = match path {
        Some(path) => LiquidatorConfig::load(path)?.with_env_overrides()?,
        None => LiquidatorConfig::from_env()?,
    };
    config.validate()?;
    Ok(config)
}

fn cmd_init(path: Option<&Path>, force: bool, term: &Term) -> anyhow::Result<()> {
    let Some(path) = path else {
        anyhow::bail!("--config is required to write a configuration file");
    };
    if path.exists() && !force {
        anyhow::bail!(
            "Configuration already exists at {}. Use --force to overwrite.",
            path.display()
        );
    }

    LiquidatorConfig::default().save(path)?;
    term.write_line(&format!(
        "{} Wrote default configuration to {}",
        style("✓").green(),
        path.display()
    ))?;
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIMULATED VAULT MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

struct SimPlan {
    rounds: u64,
    vaults: u64,
    stall_round: Option<u64>,
    late_by: u64,
    repair: bool,
}

/// Vault manager state the wakers act on
struct Book {
    ledger: CustodyLedger,
    queue: VaultQueue<ManagedVault>,
    engine: LiquidationEngine,
    locked_price: Option<Decimal>,
}

impl Book {
    fn open(vaults: u64) -> anyhow::Result<Self> {
        let ledger = CustodyLedger::new();
        let mut queue = VaultQueue::new();
        for i in 0..vaults {
            let seat = ledger.make_empty_seat()?;
            let collateral = Amount::new(COLLATERAL, 1_000);
            ledger.deposit(seat, Keyword::Collateral, collateral)?;
            let debt = Amount::new(DEBT, 600 + 100 * i);
            queue.insert(Arc::new(ManagedVault::new(VaultId::new(i), seat, collateral, debt)));
        }
        Ok(Self {
            ledger,
            queue,
            engine: LiquidationEngine::new(),
            locked_price: None,
        })
    }
}

/// Locks a price that falls 0.20 per round from 2.00
struct PriceLockWaker {
    book: Arc<Mutex<Book>>,
    locks: AtomicU64,
}

#[async_trait]
impl TimerWaker for PriceLockWaker {
    async fn wake(&self, timestamp: Timestamp) -> auction_liquidator::error::Result<()> {
        let locks = self.locks.fetch_add(1, Ordering::SeqCst).min(9);
        let price = Decimal::new(200 - 20 * locks as i64, 2);
        self.book.lock().await.locked_price = Some(price);
        tracing::info!(%timestamp, %price, "Price locked");
        Ok(())
    }
}

/// Moves undercollateralized vaults to custody and settles at 90% of the locked price
struct LiquidationWaker {
    book: Arc<Mutex<Book>>,
}

#[async_trait]
impl TimerWaker for LiquidationWaker {
    async fn wake(&self, timestamp: Timestamp) -> auction_liquidator::error::Result<()> {
        let mut book = self.book.lock().await;
        let Some(price) = book.locked_price.take() else {
            tracing::warn!(%timestamp, "Liquidation fired without a locked price");
            return Ok(());
        };

        let criteria = CollateralizationCriteria::new(price, Decimal::ONE, Decimal::new(15, 1));
        let Book {
            ledger,
            queue,
            engine,
            ..
        } = &mut *book;
        let batch = engine.select_and_custody(ledger, &criteria, queue, DEBT, COLLATERAL)?;
        if batch.is_empty() {
            return Ok(());
        }

        let proceeds = Decimal::from(batch.total_collateral().value()) * price * Decimal::new(9, 1);
        let recovered = Amount::new(DEBT, proceeds.floor().to_u64().unwrap_or(u64::MAX));
        engine.settle(batch, &recovered)?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIMULATION
// ═══════════════════════════════════════════════════════════════════════════════

async fn simulate(config: LiquidatorConfig, plan: SimPlan, term: &Term) -> anyhow::Result<()> {
    let timer = Arc::new(ManualTimer::new(Timestamp::ZERO));
    let auctioneer = Arc::new(ManualAuctioneer::new(config.param_set()));
    let rounds = config.round_plan();
    RoundPublisher::new(auctioneer.clone(), timer.clone(), rounds)
        .start()
        .await?;

    let book = Arc::new(Mutex::new(Book::open(plan.vaults)?));
    let price_lock = Arc::new(PriceLockWaker {
        book: book.clone(),
        locks: AtomicU64::new(0),
    });
    let liquidation = Arc::new(LiquidationWaker { book: book.clone() });

    let director = LiquidationDirector::new(
        timer.clone(),
        auctioneer.clone(),
        SchedulerState::from_config(&config),
        price_lock,
        liquidation,
    );
    let (outcome, watcher) = director.start().await?;
    term.write_line(&format!("{} Started: {:?}", style("→").cyan(), outcome))?;

    for round in 0..plan.rounds {
        let nominal = rounds.round(round)?.nominal_start(&auctioneer.current_params())?;

        if plan.stall_round == Some(round) {
            let wake_at = nominal.add_rel(RelativeTime::from_ticks(plan.late_by))?;
            term.write_line(&format!(
                "{} Host asleep until {} ({} late for round {})",
                style("⚠").yellow(),
                wake_at,
                plan.late_by,
                round
            ))?;
            timer.jump_to(wake_at);
            timer.fire_due().await;
        } else {
            timer.advance_to(nominal).await;
        }

        let status = director.state().status().await;
        let stats = book.lock().await.engine.stats();
        term.write_line(&format!(
            "{} Round {} at {}: {:?}, {} vaults liquidated so far",
            style("ℹ").blue(),
            round,
            timer.now(),
            status,
            stats.vaults_liquidated
        ))?;

        if matches!(status, SchedulerStatus::Paused(_)) && plan.repair {
            repair(&auctioneer, &director, &timer, term).await?;
        }
    }

    watcher.abort();
    print_summary(&director, &book, &timer, term).await
}

async fn repair(
    auctioneer: &ManualAuctioneer,
    director: &LiquidationDirector<ManualTimer, ManualAuctioneer>,
    timer: &ManualTimer,
    term: &Term,
) -> anyhow::Result<()> {
    let current = auctioneer.current_params().price_lock_period.ticks();
    auctioneer.update_param(AuctionParameter::PriceLockPeriod, current)?;

    // The watcher runs on its own task; let it observe the update.
    for _ in 0..100 {
        if director.state().active_token().await.is_some() {
            break;
        }
        tokio::task::yield_now().await;
    }
    timer.advance_by(RelativeTime::from_ticks(TICK)).await?;

    term.write_line(&format!(
        "{} Governance repair: {:?}",
        style("✓").green(),
        director.state().status().await
    ))?;
    Ok(())
}

async fn print_summary(
    director: &LiquidationDirector<ManualTimer, ManualAuctioneer>,
    book: &Mutex<Book>,
    timer: &ManualTimer,
    term: &Term,
) -> anyhow::Result<()> {
    let book = book.lock().await;
    let stats = book.engine.stats();

    term.write_line(&format!("\n{}", style("Summary").bold()))?;
    term.write_line(&format!("  Time:               {}", timer.now()))?;
    term.write_line(&format!("  Status:             {:?}", director.state().status().await))?;
    term.write_line(&format!("  Decisions:          {}", director.state().events().await.len()))?;
    term.write_line(&format!("  Wakers fired:       {}", timer.fired_count()))?;
    term.write_line(&format!("  Vaults liquidated:  {}", style(stats.vaults_liquidated).yellow()))?;
    term.write_line(&format!("  Vaults remaining:   {}", book.queue.len()))?;
    term.write_line(&format!("  Debt burned:        {}", style(stats.total_burned).green()))?;
    term.write_line(&format!("  Shortfall:          {}", style(stats.total_shortfall).red()))?;
    term.write_line(&format!("  Overage:            {}", stats.total_overage))?;
    Ok(())
}
