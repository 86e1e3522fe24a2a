//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::auth::{self, CredentialSource};
use crate::client::GmailMailClient;
use crate::config::Config;
use crate::error::{LabelerError, Result};
use crate::features::CorpusStats;
use crate::models::{RunRequest, RunSummary};
use crate::pipeline::{PipelineEvent, ReceiptPipeline};

#[derive(Parser, Debug)]
#[command(name = "receipt-labeler")]
#[command(version)]
#[command(about = "Find receipt emails in Gmail and label them", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".receipt-labeler/token.json")]
    pub token_cache: PathBuf,

    /// Pre-acquired bearer token (falls back to GMAIL_ACCESS_TOKEN, then OAuth)
    #[arg(long)]
    pub access_token: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search, classify and label receipt threads
    Run {
        /// Label to apply (created if missing)
        #[arg(short, long, default_value = "Receipts")]
        label: String,

        /// First day to search, YYYY-MM-DD or YYYY/MM/DD
        #[arg(long)]
        start: Option<String>,

        /// Day to search up to, YYYY-MM-DD or YYYY/MM/DD
        #[arg(long)]
        end: Option<String>,

        /// Classify only; don't create labels or modify threads
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Authenticate with Gmail API and cache the token
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
        }
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Clear the spinner and print a completion line
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }

    /// Drive one bar through the stages of a pipeline run
    pub fn pipeline_events(&self) -> crate::pipeline::EventCallback {
        let pb = self.add_spinner("Searching for receipt threads...");
        let bar_style = self.bar_style.clone();

        Arc::new(move |event| match event {
            PipelineEvent::Collected { total } => {
                pb.set_style(bar_style.clone());
                pb.set_length(total as u64);
                pb.set_position(0);
                pb.set_message(format!("Classifying {} threads...", total));
            }
            PipelineEvent::Classified { processed, .. } => {
                pb.set_position(processed as u64);
            }
            PipelineEvent::ReceiptsFound { count } => {
                pb.finish_with_message(format!("{} receipt threads identified", count));
            }
            PipelineEvent::Labeled(_) => {}
        })
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(MultiProgress::new())
    }
}

/// Execute the `run` subcommand
pub async fn run_labeling(
    cli: &Cli,
    request: RunRequest,
    multi: MultiProgress,
) -> Result<RunSummary> {
    let reporter = ProgressReporter::new(multi);

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let config = Config::load(&cli.config).await?;
    reporter.finish_spinner(&config_spinner, &format!("Configuration loaded from {:?}", cli.config));

    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let source = CredentialSource::resolve(
        cli.access_token.as_deref(),
        &cli.credentials,
        &cli.token_cache,
    );
    let hub = auth::connect(source).await?;
    reporter.finish_spinner(&auth_spinner, "Gmail API ready");

    let client = Arc::new(GmailMailClient::new(hub));
    let pipeline = ReceiptPipeline::new(client, config)
        .with_corpus(Arc::new(CorpusStats::new()))
        .with_events(reporter.pipeline_events());

    info!(
        "Labeling receipts with \"{}\" ({} to {})",
        request.label_name,
        request.start_date.as_deref().unwrap_or("beginning"),
        request.end_date.as_deref().unwrap_or("now")
    );

    Ok(pipeline.run(request).await)
}

/// Execute the `init-config` subcommand
pub async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(LabelerError::ConfigError(format!(
            "{} already exists (use --force to overwrite)",
            output.display()
        )));
    }
    Config::create_example(output).await
}

/// Execute the `auth` subcommand
pub async fn authenticate(cli: &Cli, force: bool) -> Result<()> {
    if let Some(parent) = cli.token_cache.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if force && cli.token_cache.exists() {
        tokio::fs::remove_file(&cli.token_cache).await?;
        info!("Removed existing token cache");
    }

    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    if cli.token_cache.exists() {
        auth::secure_token_file(&cli.token_cache).await?;
    }

    let (_, profile) = hub
        .users()
        .get_profile("me")
        .add_scope(auth::REQUIRED_SCOPES[0])
        .doit()
        .await?;

    println!("Successfully authenticated with Gmail API");
    println!("Token cached at: {:?}", cli.token_cache);
    println!(
        "Connected to account: {}",
        profile.email_address.unwrap_or_default()
    );
    Ok(())
}
