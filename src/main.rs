mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use antarctica_today_social::config::Config;
use antarctica_today_social::publisher::{Manifest, PlatformOutcome, Publisher};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("Fatal error: {e:#}");
            std::process::exit(1);
        }
    }
}

/// Returns whether every platform succeeded.
async fn run() -> Result<bool> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_tracing()?;

    info!("Starting anttoday-social");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        platform_data = %config.platform_data_path.display(),
        platforms = ?config.platforms,
        "Configuration loaded"
    );

    let mut publisher = Publisher::from_config(&config).context("Failed to read platform table")?;

    match cli.command {
        Commands::Publish { manifest: path } => {
            let manifest = Manifest::load(&path)
                .await
                .with_context(|| format!("Failed to load manifest {}", path.display()))?;
            let outcomes = publisher
                .publish_update(&manifest, &manifest)
                .await
                .context("Failed to prepare update")?;
            Ok(report(&outcomes))
        }
        Commands::Sync {
            platform,
            date,
            comment,
        } => {
            let tail = publisher
                .sync(platform, date, comment.as_deref())
                .await
                .with_context(|| format!("Failed to sync {platform}"))?;
            println!(
                "{platform}: tip {} ({})",
                tail.post_id,
                tail.covered_date
                    .map_or_else(|| "no covered date".to_string(), |d| d.to_string())
            );
            Ok(true)
        }
    }
}

/// Print one line per platform. Returns false if any platform failed.
fn report(outcomes: &[PlatformOutcome]) -> bool {
    for outcome in outcomes {
        match &outcome.result {
            Ok(published) if published.created => {
                println!("{}: posted {}", outcome.platform, published.tip);
            }
            Ok(published) => {
                println!("{}: already covered, tip {}", outcome.platform, published.tip);
            }
            Err(e) => println!("{}: FAILED: {e}", outcome.platform),
        }
    }
    outcomes.iter().all(PlatformOutcome::is_ok)
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,antarctica_today_social=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
