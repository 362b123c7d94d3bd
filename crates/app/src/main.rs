mod admin;
mod api;
mod notify;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use ecopark_config::Config;
use ecopark_payments::PaymentSimulator;
use sqlx::SqlitePool;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::OffsetTime;

use crate::api::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_HASH: &str = env!("ECOPARK_GIT_HASH");

fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH})")
}

// --- CLI definition ---

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "ecopark")]
#[command(about = "EcoHarmony Park ticket sales")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("ECOPARK_GIT_HASH"), ")"))]
struct Cli {
    /// Log level [default: info, or log_level from the config file]
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// Display log timestamps in UTC (default: local time)
    #[arg(long, global = true)]
    utc: bool,

    /// Database URL [default: sqlite:ecopark.db]
    #[arg(long, global = true)]
    db_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on [default: 3000]
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List registered users
    ListUsers,
    /// List every purchase with its tickets, newest first
    ListPurchases,
    /// Show sales statistics
    Stats,
    /// Show a single purchase
    ShowPurchase {
        id: i64,
    },
    /// Delete all purchases and tickets, keeping users
    ClearPurchases {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Delete all users, purchases and tickets
    ClearAll {
        #[arg(long)]
        yes: bool,
    },
    /// Delete a purchase and its tickets
    DeletePurchase {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
    /// Delete a user along with their purchases
    DeleteUser {
        id: i64,
        #[arg(long)]
        yes: bool,
    },
}

/// CLI args take precedence over everything `Config::load()` layered up.
fn merge_cli(mut config: Config, cli: &Cli) -> Config {
    if let Some(level) = &cli.log_level {
        config.log_level = level.to_string();
    }
    if cli.utc {
        config.utc = true;
    }
    if let Some(url) = &cli.db_url {
        config.db_url = url.clone();
    }
    if let Commands::Serve { port: Some(port) } = cli.command {
        config.port = port;
    }
    config
}

// --- Logging ---

fn init_logging(config: &Config) {
    let filter = EnvFilter::new(&config.log_level);

    if config.utc {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(OffsetTime::new(
                time::UtcOffset::UTC,
                time::macros::format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
                ),
            ))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(LocalTimer)
            .init();
    }
}

struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

// --- Server ---

async fn run_server(config: &Config, pool: SqlitePool) -> anyhow::Result<()> {
    info!("EcoPark v{}", version_string());

    let state = AppState {
        pool,
        payments: Arc::new(Mutex::new(PaymentSimulator::new())),
        customer_email: config.customer_email.clone(),
        customer_name: config.customer_name.clone(),
        payment_delay: Duration::from_millis(config.payment_delay_ms),
    };
    let app = api::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Main ---

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = merge_cli(Config::load(), &cli);
    init_logging(&config);

    let pool = ecopark_db::connect(&config.db_url).await?;
    ecopark_db::migrate(&pool).await?;

    match cli.command {
        Commands::Serve { .. } => run_server(&config, pool).await?,
        Commands::ListUsers => admin::list_users(&pool).await?,
        Commands::ListPurchases => admin::list_purchases(&pool).await?,
        Commands::Stats => admin::show_stats(&pool).await?,
        Commands::ShowPurchase { id } => admin::show_purchase(&pool, id).await?,
        Commands::ClearPurchases { yes } => admin::clear_purchases(&pool, yes).await?,
        Commands::ClearAll { yes } => admin::clear_all(&pool, yes).await?,
        Commands::DeletePurchase { id, yes } => admin::delete_purchase(&pool, id, yes).await?,
        Commands::DeleteUser { id, yes } => admin::delete_user(&pool, id, yes).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "ecopark", "--log-level", "debug", "--db-url", "sqlite::memory:", "serve", "--port", "8081",
        ]);
        let config = merge_cli(Config::default(), &cli);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.db_url, "sqlite::memory:");
        assert_eq!(config.port, 8081);
        assert!(!config.utc);
    }

    #[test]
    fn absent_flags_keep_config_values() {
        let cli = Cli::parse_from(["ecopark", "stats"]);
        let config = merge_cli(Config::default(), &cli);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn destructive_commands_parse_confirmation() {
        let cli = Cli::parse_from(["ecopark", "delete-user", "7", "--yes"]);
        assert!(matches!(cli.command, Commands::DeleteUser { id: 7, yes: true }));

        let cli = Cli::parse_from(["ecopark", "clear-all"]);
        assert!(matches!(cli.command, Commands::ClearAll { yes: false }));
    }
}
