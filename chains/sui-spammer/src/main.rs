use anyhow::Result;
use clap::{Parser, Subcommand};
use core_logic::{setup_logger, with_retry, ConfigError, RetryConfig, WorkerRunner};
use dotenv::dotenv;
use std::sync::Arc;
use sui_spammer::{fetch_report, LedgerClient, SimLedger, SpamController, SuiSpammerConfig};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "config/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the spam loop until Ctrl+C or a fatal error
    Spam,
    /// Show the user's counters
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Show protocol stats for the most recent epochs
    Stats {
        #[arg(long)]
        json: bool,
        /// Overrides `stats_epochs` from the config
        #[arg(short, long)]
        epochs: Option<usize>,
    },
    /// End the simulated ledger's current epoch
    AdvanceEpoch,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let _guard = setup_logger();

    let args = Args::parse();
    let config = load_config(&args.config)?;
    info!(
        "Network: {} | simulated ledger starting at epoch {}",
        config.network, config.simulation.start_epoch
    );

    let ledger = SimLedger::new(config.simulation.to_sim_config());
    let network = config.network;

    match args.command {
        Command::Spam => spam(ledger, &config).await,
        Command::Status { json } => {
            let ledger = &ledger;
            let data = with_retry(RetryConfig::default(), "fetch_user_data", || async move {
                ledger.fetch_user_data().await.map_err(anyhow::Error::from)
            })
            .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&data)?);
            } else {
                print!("{}", data.render());
            }
            Ok(())
        }
        Command::Stats { json, epochs } => {
            let ledger = &ledger;
            let epochs = epochs.unwrap_or(config.stats_epochs);
            let report = with_retry(RetryConfig::default(), "fetch_stats", || async move {
                fetch_report(ledger, network, epochs)
                    .await
                    .map_err(anyhow::Error::from)
            })
            .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render());
            }
            Ok(())
        }
        Command::AdvanceEpoch => {
            let epoch = ledger.advance_epoch();
            println!("Current epoch: {}", epoch);
            Ok(())
        }
    }
}

/// A missing file means defaults; a broken one is an error.
fn load_config(path: &str) -> Result<SuiSpammerConfig> {
    match SuiSpammerConfig::from_path(path) {
        Ok(config) => {
            info!("Loaded config from: {}", path);
            Ok(config)
        }
        Err(e) if matches!(
            e.downcast_ref::<ConfigError>(),
            Some(ConfigError::FileNotFound { .. })
        ) =>
        {
            warn!("{} not found, using default settings", path);
            Ok(SuiSpammerConfig::default())
        }
        Err(e) => Err(e),
    }
}

async fn spam(ledger: SimLedger, config: &SuiSpammerConfig) -> Result<()> {
    let controller = Arc::new(SpamController::new(ledger, config.spam.clone()));

    if let Some(data) = controller.boot().await {
        print!("{}", data.render());
    }
    if let Some(err) = controller.error() {
        anyhow::bail!("Boot failed: {}", err);
    }

    let result = WorkerRunner::run_until_interrupted(controller.clone()).await;

    info!("Metrics: {}", controller.metrics().to_json());
    if let Some(data) = controller.user_data() {
        print!("{}", data.render());
    }
    result.map(|_| ())
}
