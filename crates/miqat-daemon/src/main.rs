use chrono::Utc;
use clap::{Parser, Subcommand};
use miqat_core::clock::local_date;
use miqat_core::MiqatConfig;
use miqat_scheduler::ForegroundAction;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod app;

use app::App;

#[derive(Parser)]
#[command(name = "miqat", version, about = "Prayer schedule cache and countdown timeline")]
struct Cli {
    /// Config file (defaults to MIQAT_CONFIG, then ~/.miqat/miqat.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keep the cache warm until interrupted
    Run,
    /// Load the upcoming days into the cache
    Preload {
        #[arg(long)]
        days: Option<u32>,
    },
    /// Print the countdown state as JSON
    Timeline {
        #[arg(long)]
        max: Option<usize>,
    },
    /// Drop schedules past the retention window
    Evict,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "miqat_daemon=info,miqat_scheduler=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // explicit flag > MIQAT_CONFIG env > ~/.miqat/miqat.toml
    let config_path = cli.config.or_else(|| std::env::var("MIQAT_CONFIG").ok());
    let config = MiqatConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        MiqatConfig::default()
    });

    let app = App::build(config)?;
    let now = Utc::now();
    let today = local_date(now, app.calculation.time_zone);

    match cli.command {
        Commands::Run => run(app).await,
        Commands::Preload { days } => {
            let days = days.unwrap_or(app.config.refresh.preload_days);
            let report = app
                .scheduler
                .preload_upcoming(today, days, &CancellationToken::new())
                .await;
            for (date, e) in &report.failed {
                eprintln!("{date}: {e}");
            }
            println!(
                "loaded {} of {} days starting {today}",
                report.loaded.len(),
                days
            );
            Ok(())
        }
        Commands::Timeline { max } => {
            let state = app.countdown(now, max);
            println!("{}", serde_json::to_string_pretty(&state)?);
            Ok(())
        }
        Commands::Evict => {
            let removed = app.provider.evict_expired(today)?;
            println!("evicted {removed} schedules");
            Ok(())
        }
    }
}

async fn run(app: App) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    match app.scheduler.on_foreground(Utc::now(), &shutdown).await? {
        ForegroundAction::Preloaded(report) | ForegroundAction::Refreshed(report) => {
            info!(loaded = report.loaded.len(), failed = report.failed.len(), "startup refresh");
        }
        ForegroundAction::UpToDate => info!("cache up to date"),
    }

    // No live location source here; the configured coordinate is used.
    let (_location_tx, locations) = watch::channel(None);
    let scheduler = tokio::spawn(app.scheduler.clone().run(locations, shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, stopping");
    shutdown.cancel();
    scheduler.await?;
    Ok(())
}
