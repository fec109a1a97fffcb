//! HATrend CLI: run the rebalancing engine, evaluate once, manage config.
//!
//! Commands:
//! - `run`: periodic rebalancing; type `r` to rebalance now, `q` to stop, `!` to abort
//! - `evaluate`: one manual cycle, printed as JSON
//! - `config init`: write the default config
//! - `config check`: validate a config and print its fingerprint

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use hatrend_runner::{
    CandleSource, CsvCandleSource, CycleTrigger, EngineConfig, EventSink, JsonlSink, PaperAccount,
    Ports, RebalanceOrchestrator, Scheduler, SchedulerOptions, SchedulerSummary, StepSizeNormalizer,
    SyntheticMarket, SystemClock, TracingSink,
};

#[derive(Parser)]
#[command(
    name = "hatrend",
    about = "HATrend: Heikin-Ashi multi-timeframe rebalancing engine"
)]
struct Cli {
    /// Emit log lines as JSON.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct SourceArgs {
    /// Path to a TOML config file. Defaults are used without one.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Read candles from `{dir}/{SYMBOL}_{timeframe}.csv` instead of the synthetic market.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Starting paper cash in USD.
    #[arg(long, default_value_t = 10_000.0)]
    cash: f64,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the periodic rebalancing loop against a paper account.
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Stop after this many cycles.
        #[arg(long)]
        cycles: Option<u64>,

        /// Append every cycle event to this JSONL file.
        #[arg(long)]
        events: Option<PathBuf>,

        /// Send orders to the paper account (overrides `trading_enabled`).
        #[arg(long, default_value_t = false)]
        trade: bool,
    },
    /// Run one manual cycle with trading disabled and print the report.
    Evaluate {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Config file commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default config.
    Init {
        /// Output path. Prints to stdout without one.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Validate a config file and print its fingerprint.
    Check {
        #[arg(required = true)]
        path: PathBuf,
    },
}

enum Control {
    Rebalance,
    Stop,
    Abort,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run {
            source,
            cycles,
            events,
            trade,
        } => run_engine(&source, cycles, events, trade),
        Commands::Evaluate { source } => run_evaluate(&source),
        Commands::Config { action } => match action {
            ConfigAction::Init { output, force } => run_config_init(output.as_deref(), force),
            ConfigAction::Check { path } => run_config_check(&path),
        },
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(p) => EngineConfig::from_file(p).with_context(|| format!("loading {}", p.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn build_orchestrator(
    config: EngineConfig,
    args: &SourceArgs,
    sinks: Vec<Arc<dyn EventSink>>,
) -> Result<RebalanceOrchestrator> {
    if !(args.cash >= 0.0) {
        bail!("--cash must be non-negative, got {}", args.cash);
    }
    let clock = Arc::new(SystemClock);
    let candles: Arc<dyn CandleSource> = match &args.data_dir {
        Some(dir) => Arc::new(CsvCandleSource::new(dir)),
        None => Arc::new(SyntheticMarket::new(clock.clone())),
    };
    let Some(pricing) = config.strategy.timeframe_list().first().copied() else {
        bail!("config has no timeframes");
    };
    let account = Arc::new(PaperAccount::new(args.cash).with_price_source(candles.clone(), pricing));

    let ports = Ports {
        candles,
        portfolio: account.clone(),
        executor: account,
        normalizer: Arc::new(StepSizeNormalizer::default()),
        clock,
        sinks,
    };
    Ok(RebalanceOrchestrator::new(config, ports)?)
}

fn run_engine(args: &SourceArgs, cycles: Option<u64>, events: Option<PathBuf>, trade: bool) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.trading_enabled |= trade;

    let mut sinks: Vec<Arc<dyn EventSink>> = vec![Arc::new(TracingSink)];
    if let Some(path) = events {
        sinks.push(Arc::new(JsonlSink::new(path)));
    }

    let options = SchedulerOptions {
        interval: config.update_interval(),
        max_cycles: cycles,
    };
    let orch = Arc::new(build_orchestrator(config, args, sinks)?);
    let scheduler = Scheduler::spawn(Arc::clone(&orch), options).context("spawning scheduler")?;

    let (tx, controls) = mpsc::channel();
    thread::Builder::new()
        .name("hatrend-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines().map_while(|line| line.ok()) {
                let control = match line.trim() {
                    "r" => Control::Rebalance,
                    "q" => Control::Stop,
                    "!" => Control::Abort,
                    "" => continue,
                    other => {
                        eprintln!("unknown command '{other}' (r = rebalance, q = stop, ! = abort)");
                        continue;
                    }
                };
                if tx.send(control).is_err() {
                    break;
                }
            }
        })
        .context("spawning stdin reader")?;

    let summary = loop {
        match controls.recv_timeout(Duration::from_millis(200)) {
            Ok(Control::Rebalance) => scheduler.rebalance_now(),
            Ok(Control::Stop) => break scheduler.stop(),
            Ok(Control::Abort) => break scheduler.abort(),
            Err(_) if scheduler.is_finished() => break scheduler.join(),
            Err(RecvTimeoutError::Timeout) => {}
            // stdin closed; keep running until the cycle limit or an error.
            Err(RecvTimeoutError::Disconnected) => thread::sleep(Duration::from_millis(200)),
        }
    };

    print_summary(&summary, &orch);
    if let Some(error) = summary.error {
        bail!("engine stopped on error: {error}");
    }
    Ok(())
}

fn run_evaluate(args: &SourceArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    config.trading_enabled = false;

    let orch = build_orchestrator(config, args, Vec::new())?;
    let report = orch.run_cycle(CycleTrigger::Manual)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_config_init(output: Option<&Path>, force: bool) -> Result<()> {
    let toml = EngineConfig::default().to_toml()?;
    match output {
        None => print!("{toml}"),
        Some(path) => {
            if path.exists() && !force {
                bail!("{} exists; pass --force to overwrite", path.display());
            }
            std::fs::write(path, toml).with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote default config to {}", path.display());
        }
    }
    Ok(())
}

fn run_config_check(path: &Path) -> Result<()> {
    let config = EngineConfig::from_file(path)?;
    println!("Config OK:    {}", path.display());
    println!("Fingerprint:  {}", config.fingerprint());
    println!("Symbols:      {}", config.symbols.join(", "));
    println!("Interval:     {}s", config.update_interval_secs);
    println!("Trading:      {}", if config.trading_enabled { "enabled" } else { "disabled (simulated)" });
    println!("Revert:       {:?}", config.strategy.revert_policy);
    println!();
    println!("{:<6} {:>8} {:>10}", "TF", "Weight", "Cooldown");
    println!("{}", "-".repeat(26));
    for (tf, tc) in &config.strategy.timeframes {
        println!("{:<6} {:>8.2} {:>9}s", tf.to_string(), tc.weight, tc.cooldown_secs);
    }
    Ok(())
}

fn print_summary(summary: &SchedulerSummary, orch: &RebalanceOrchestrator) {
    println!();
    println!("=== Engine Stopped ===");
    println!("Cycles:         {} ({} manual)", summary.cycles, summary.manual_cycles);
    let locks = orch.gate().active_locks();
    println!("Active locks:   {}", locks.len());
    for (key, lock) in &locks {
        println!(
            "  {key}: holding {} until {}",
            lock.accepted,
            lock.expiry.format("%H:%M:%S")
        );
    }
    if let Some(error) = &summary.error {
        println!("Error:          {error}");
    }
}
