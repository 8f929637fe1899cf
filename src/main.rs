use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use scalper::api::{IndodaxClient, MarketDataFeed, OrderGateway};
use scalper::bot::report::format_amount;
use scalper::bot::TradingBot;
use scalper::config::{BotConfig, Credentials, Settings};
use scalper::db::{SqliteStore, TradeStore};
use scalper::logging::setup_logging;

#[derive(Parser)]
#[command(name = "scalper", about = "Indicator-voting scalping bot for Indodax")]
struct Cli {
    /// TOML settings file (defaults to config/bot.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Trade until Ctrl-C
    Run {
        /// Send real orders instead of paper trading
        #[arg(long)]
        live: bool,
    },
    /// Print the most recent stored trades
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;

    match cli.command.unwrap_or(Command::Run { live: false }) {
        Command::Run { live } => {
            if live {
                settings.paper_trading = false;
            }
            run(settings).await
        }
        Command::History { limit } => history(&settings.database_url, limit).await,
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let config = BotConfig::from_settings(settings, Credentials::from_env())
        .context("Invalid configuration")?;

    setup_logging(config.log_file.as_deref());

    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_url))?;
    let client = Arc::new(
        IndodaxClient::new(&config.api_base_url, config.credentials.clone())
            .context("Failed to build exchange client")?,
    );

    let feed: Arc<dyn MarketDataFeed> = client.clone();
    let gateway: Arc<dyn OrderGateway> = client;
    let bot = TradingBot::new(config, feed, gateway, Arc::new(store));

    let shutdown = bot.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, stopping after the current tick");
            shutdown.request();
        }
    });

    let mut ctx = bot.initial_context();
    bot.run(&mut ctx).await;

    Ok(())
}

async fn history(database_url: &str, limit: usize) -> anyhow::Result<()> {
    let store = SqliteStore::connect(database_url)
        .await
        .with_context(|| format!("Failed to open database {}", database_url))?;
    let trades = store
        .read_trade_history(limit)
        .await
        .context("Failed to read trade history")?;

    if trades.is_empty() {
        println!("No trades recorded");
        return Ok(());
    }

    println!(
        "{:<20} {:<10} {:<5} {:>16} {:>12} {:>16} {:<5} {:>14} {:>16}",
        "TIME", "PAIR", "SIDE", "PRICE", "AMOUNT", "TOTAL", "SIG", "P&L", "BALANCE"
    );
    for trade in trades {
        println!(
            "{:<20} {:<10} {:<5} {:>16} {:>12.8} {:>16} {:<5} {:>14} {:>16}",
            trade.timestamp.format("%Y-%m-%d %H:%M:%S"),
            trade.pair,
            trade.action,
            format_amount(trade.price),
            trade.amount,
            format_amount(trade.total),
            trade.signal,
            trade.profit_loss.map(format_amount).unwrap_or_else(|| "-".to_string()),
            format_amount(trade.balance)
        );
    }

    Ok(())
}
