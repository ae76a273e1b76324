//! Command-line front end
//!
//! `run` scrapes an identifier list into a workbook while printing progress
//! events; `marketplaces` and `config` are small helpers around it.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{info, warn};

use crate::application::{RunHandle, ScrapePipeline};
use crate::domain::marketplace::MARKETPLACES;
use crate::domain::{RunEvent, RunSummary};
use crate::infrastructure::auth::{AccountPageProbe, AuthState};
use crate::infrastructure::config::{AppConfig, ConfigManager};
use crate::infrastructure::logging::{init_logging_with_config, log_system_info};
use crate::infrastructure::{
    ChromiumSession, HttpClient, HttpClientConfig, XlsxSheetWriter, load_identifier_list,
};

#[derive(Parser, Debug)]
#[command(name = "product-gallery-scraper")]
#[command(about = "Scrape product fields and image galleries into a spreadsheet")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the per-user config)
    #[arg(long, global = true, env = "GALLERY_SCRAPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scrape every identifier in a CSV file (first column, no header)
    Run(RunArgs),

    /// List supported marketplaces
    Marketplaces,

    /// Inspect or reset the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Print the configuration file location
    Path,
    /// Overwrite the configuration file with defaults
    Reset,
}

/// Overrides for a single run; unset options keep the configured value
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// CSV file with one identifier per row
    pub input: PathBuf,

    /// Marketplace code or domain ("de", "uk", "amazon.fr", ...)
    #[arg(short, long)]
    pub marketplace: Option<String>,

    /// Minimum pause between identifiers, in seconds
    #[arg(long)]
    pub min_pause: Option<f64>,

    /// Maximum pause between identifiers, in seconds
    #[arg(long)]
    pub max_pause: Option<f64>,

    /// Image columns reserved on every row
    #[arg(long)]
    pub min_columns: Option<u32>,

    /// Directory for the workbook
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Also write every embedded image to this directory
    #[arg(long)]
    pub export_images: Option<PathBuf>,

    /// DevTools endpoint of the running browser
    #[arg(long)]
    pub debugger_url: Option<String>,

    /// Skip the account-page login check
    #[arg(long)]
    pub assume_signed_in: bool,

    /// Keep the browser's own user agent
    #[arg(long)]
    pub no_rotate_user_agent: bool,
}

impl RunArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(marketplace) = &self.marketplace {
            config.scraper.marketplace = marketplace.clone();
        }
        if let Some(min) = self.min_pause {
            config.scraper.min_pause_secs = min;
        }
        if let Some(max) = self.max_pause {
            config.scraper.max_pause_secs = max;
        }
        if let Some(columns) = self.min_columns {
            config.scraper.min_image_columns = columns;
        }
        if let Some(dir) = &self.output_dir {
            config.output.output_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.export_images {
            config.output.image_export_dir = Some(dir.clone());
        }
        if let Some(url) = &self.debugger_url {
            config.browser.debugger_url = url.clone();
        }
        if self.no_rotate_user_agent {
            config.scraper.rotate_user_agent = false;
        }
    }
}

fn config_manager(path: Option<&PathBuf>) -> Result<ConfigManager> {
    match path {
        Some(path) => Ok(ConfigManager::with_path(path)),
        None => ConfigManager::new(),
    }
}

/// Dispatch a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let manager = config_manager(cli.config.as_ref())?;

    match &cli.command {
        Commands::Marketplaces => {
            for m in MARKETPLACES {
                println!("{:<4} {:<16} {}", m.code, m.domain, m.label);
            }
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = manager.load_config().await?;
                println!("{}", serde_json::to_string_pretty(&config)?);
                Ok(())
            }
            ConfigCommands::Path => {
                println!("{}", manager.config_path().display());
                Ok(())
            }
            ConfigCommands::Reset => {
                manager.reset_to_defaults().await?;
                println!("Configuration reset: {}", manager.config_path().display());
                Ok(())
            }
        },
        Commands::Run(args) => {
            let mut config = manager.load_config().await?;
            args.apply(&mut config);
            if cli.verbose {
                config.logging.level = "debug".to_string();
            }
            config.validate()?;

            init_logging_with_config(&config.logging)?;
            log_system_info();

            run_scrape(config, args).await.map(|_| ())
        }
    }
}

async fn run_scrape(config: AppConfig, args: &RunArgs) -> Result<RunSummary> {
    let marketplace = config.marketplace()?;
    let identifiers = load_identifier_list(&args.input)?;

    let session = ChromiumSession::connect(&config.browser)
        .await
        .context("Could not attach to the browser; start it with --remote-debugging-port")?;

    if args.assume_signed_in {
        info!("Skipping login check");
        execute(&config, session, Arc::new(AtomicBool::new(true)), identifiers).await
    } else {
        // The probe navigates, so it gets its own tab
        let probe_session = ChromiumSession::connect(&config.browser).await?;
        let probe = AccountPageProbe::new(probe_session, &marketplace);
        execute(&config, session, probe, identifiers).await
    }
}

async fn execute<A>(
    config: &AppConfig,
    session: ChromiumSession,
    auth: A,
    identifiers: Vec<String>,
) -> Result<RunSummary>
where
    A: AuthState + 'static,
{
    let http = HttpClient::with_config(HttpClientConfig::from_image_config(
        &config.images,
        config.scraper.rotate_user_agent,
    ))?;
    let sink = XlsxSheetWriter::new(&config.output)?;
    let pipeline = ScrapePipeline::new(config, session, auth, http, sink)?;

    let RunHandle {
        mut events,
        cancel,
        task,
    } = pipeline.spawn(identifiers);

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Interrupt received, stopping after the current identifier");
            interrupt.cancel();
        }
    });

    while let Some(event) = events.recv().await {
        print_event(&event);
    }

    let summary = task.await.context("Run task panicked")??;
    Ok(summary)
}

fn print_event(event: &RunEvent) {
    match event {
        RunEvent::RunStarted { total, .. } => println!("Starting run over {total} rows"),
        RunEvent::AwaitingAuthentication => {
            println!("Please sign in in the browser window; waiting...");
        }
        RunEvent::IdentifierStarted {
            index,
            total,
            identifier,
        } => println!("[{index}/{total}] {identifier}"),
        RunEvent::AttemptFailed {
            attempt, reason, ..
        } => println!("    attempt {attempt} failed: {reason}"),
        RunEvent::IdentifierProcessed {
            images, percent, ..
        } => println!("    ok, {images} image(s) ({percent:.0}%)"),
        RunEvent::IdentifierFailed { reason, .. } => println!("    failed: {reason}"),
        RunEvent::IdentifierSkipped { index, reason } => {
            println!("Row {index} skipped: {reason}");
        }
        RunEvent::RunFinished(summary) => {
            println!();
            println!("{}", summary.headline());
            if summary.cancelled {
                println!("Run was cancelled");
            }
            for failure in &summary.failures {
                println!("  {}: {}", failure.identifier, failure.reason);
            }
            if let Some(path) = &summary.output_path {
                println!("Saved to {}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_overrides() {
        let cli = Cli::try_parse_from([
            "product-gallery-scraper",
            "run",
            "asins.csv",
            "--marketplace",
            "uk",
            "--min-pause",
            "1",
            "--max-pause",
            "3.5",
            "--min-columns",
            "4",
            "--no-rotate-user-agent",
        ])
        .unwrap();

        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut config = AppConfig::default();
        args.apply(&mut config);

        assert_eq!(args.input, PathBuf::from("asins.csv"));
        assert_eq!(config.scraper.marketplace, "uk");
        assert!((config.scraper.min_pause_secs - 1.0).abs() < f64::EPSILON);
        assert!((config.scraper.max_pause_secs - 3.5).abs() < f64::EPSILON);
        assert_eq!(config.scraper.min_image_columns, 4);
        assert!(!config.scraper.rotate_user_agent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unset_overrides_keep_config() {
        let mut config = AppConfig::default();
        config.scraper.marketplace = "fr".to_string();
        RunArgs {
            input: PathBuf::from("x.csv"),
            ..RunArgs::default()
        }
        .apply(&mut config);
        assert_eq!(config.scraper.marketplace, "fr");
        assert!(config.scraper.rotate_user_agent);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["product-gallery-scraper", "-v", "config", "path"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Path
            }
        ));
    }
}
