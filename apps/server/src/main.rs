//! Price Bell - Headless Server
//!
//! Polls the ticker feed and pushes scheduled price updates and price alerts
//! to subscribed chat users.

mod config;

use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{AppConfig, ConfigError};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use pricebell_alerts::{
    ChatChannel, KvStore, LogChannel, MemoryKv, Notifier, PollError, Poller, RedisKv, RuleError,
    RuleManager, StoreError, SubscriptionStore, TelegramChannel, TelegramConfig,
};
use pricebell_core::RuleKind;
use pricebell_engine::Evaluator;
use pricebell_feeds::{FeedError, QuoteSource, RestQuoteFetcher};

/// Price Bell CLI
#[derive(Parser, Debug)]
#[command(name = "pricebell")]
#[command(about = "Scheduled price updates and price alerts over chat", long_about = None)]
struct Args {
    /// Configuration file path (JSON). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short, long)]
    log_level: Option<String>,

    /// Seconds between poll ticks
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Run a single tick and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Log messages instead of sending them
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

/// Rule management from the command line. Without a subcommand the poll
/// loop runs.
#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Push the price of ASSET to USER every MINUTES minutes
    SetInterval {
        user: String,
        asset: String,
        minutes: u32,
    },
    /// Alert USER while ASSET trades within BAND of CENTER
    SetAlert {
        user: String,
        asset: String,
        center: f64,
        band: f64,
    },
    /// Stop the scheduled updates of ASSET for USER
    RemoveInterval { user: String, asset: String },
    /// Stop the price alert on ASSET for USER
    RemoveAlert { user: String, asset: String },
    /// List the rules of USER
    List {
        user: String,
        #[arg(default_value_t = RuleKind::Interval)]
        kind: RuleKind,
    },
    /// Print the current price of ASSET
    Price { asset: String },
}

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Poll(#[from] PollError),
    #[error("TELEGRAM_BOT_TOKEN is not set (use --dry-run to log messages instead)")]
    MissingBotToken,
}

fn init_logging(level: &str) {
    let level = match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}

/// File config (or defaults) with command-line and environment overrides.
fn resolve_config(args: &Args) -> Result<AppConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if let Some(secs) = args.poll_interval_secs {
        config.poller.interval_secs = secs;
    }
    config.redis = config.redis.with_env();
    Ok(config)
}

async fn connect_store(config: &AppConfig) -> Result<SubscriptionStore, AppError> {
    let kv: Arc<dyn KvStore> = if config.redis.is_memory() {
        warn!("Using in-memory subscription store; rules are lost on exit");
        Arc::new(MemoryKv::new())
    } else {
        Arc::new(RedisKv::connect(&config.redis).await?)
    };
    let store = SubscriptionStore::new(kv);
    store.health_check().await?;
    Ok(store)
}

fn build_channel(dry_run: bool) -> Result<Arc<dyn ChatChannel>, AppError> {
    if dry_run {
        info!("Dry run: messages are logged, not sent");
        return Ok(Arc::new(LogChannel));
    }
    let telegram = TelegramConfig::from_env().ok_or(AppError::MissingBotToken)?;
    Ok(Arc::new(TelegramChannel::new(&telegram)))
}

async fn run_command(
    command: Command,
    config: &AppConfig,
    store: SubscriptionStore,
    quotes: Arc<dyn QuoteSource>,
) -> Result<(), AppError> {
    let manager = RuleManager::new(store, quotes, config.limits.clone());
    match command {
        Command::SetInterval {
            user,
            asset,
            minutes,
        } => {
            let sub = manager.set_interval(&user, &asset, minutes, Utc::now()).await?;
            println!("Set: {}", sub.key());
        }
        Command::SetAlert {
            user,
            asset,
            center,
            band,
        } => {
            let sub = manager
                .set_alert(&user, &asset, center, band, Utc::now())
                .await?;
            println!("Set: {}", sub.key());
        }
        Command::RemoveInterval { user, asset } => {
            manager.remove_interval(&user, &asset).await?;
            println!("Removed");
        }
        Command::RemoveAlert { user, asset } => {
            manager.remove_alert(&user, &asset).await?;
            println!("Removed");
        }
        Command::List { user, kind } => {
            println!("{}", manager.render_rules(&user, kind).await?);
        }
        Command::Price { asset } => {
            println!("{}", manager.current_price(&asset).await?);
        }
    }
    Ok(())
}

async fn run_poller(once: bool, config: &AppConfig, poller: Poller) -> Result<(), AppError> {
    if once {
        let report = poller.tick(Utc::now()).await?;
        info!(
            assets = report.assets,
            evaluated = report.evaluated,
            fired = report.fired,
            delivered = report.delivered,
            "Single tick complete"
        );
        return Ok(());
    }

    info!("  Poll interval: {} seconds", config.poller.interval_secs);
    let poll_handle = tokio::spawn(poller.run());

    info!("Press Ctrl+C to stop...");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    warn!("Shutdown signal received");

    poll_handle.abort();
    let _ = poll_handle.await;
    Ok(())
}

async fn run(args: Args, config: AppConfig) -> Result<(), AppError> {
    let store = connect_store(&config).await?;
    let quotes: Arc<dyn QuoteSource> = Arc::new(RestQuoteFetcher::new(&config.feed)?);
    info!("  Feed: {}", config.feed.url);

    if let Some(command) = args.command {
        return run_command(command, &config, store, quotes).await;
    }

    let channel = build_channel(args.dry_run)?;
    let poller = Poller::new(
        quotes,
        store,
        Evaluator::new(config.evaluator.clone()),
        Notifier::new(channel, &config.notifier),
        config.poller.clone(),
    );
    run_poller(args.once, &config, poller).await
}

#[tokio::main]
async fn main() {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let config = match resolve_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_logging(args.log_level.as_deref().unwrap_or("info"));
            error!("{}", e);
            std::process::exit(2);
        }
    };

    init_logging(&config.log_level);

    info!("🔔 Price Bell starting...");
    info!("  Dry Run: {}", args.dry_run);

    if let Err(e) = run(args, config).await {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("👋 Price Bell stopped");
}
