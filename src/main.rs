use anyhow::Result;
use clap::Parser;
use indicatif::MultiProgress;
use receipt_labeler::cli::{self, Cli, Commands};
use receipt_labeler::error::LabelerError;
use receipt_labeler::models::RunRequest;
use std::io::Write;
use std::process;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// One formatted log event, printed above the progress bars when dropped
struct LogLine {
    multi: MultiProgress,
    line: Vec<u8>,
}

impl Write for LogLine {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.line.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for LogLine {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.line);
        let text = text.trim_end_matches('\n');
        if !text.is_empty() {
            let _ = self.multi.println(text);
        }
    }
}

#[derive(Clone)]
struct ProgressAwareWriter(MultiProgress);

impl<'a> MakeWriter<'a> for ProgressAwareWriter {
    type Writer = LogLine;

    fn make_writer(&'a self) -> Self::Writer {
        LogLine {
            multi: self.0.clone(),
            line: Vec::new(),
        }
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            display_error(&e);
            eprintln!("\nFor help, run: receipt-labeler --help");
            process::exit(1);
        }
    }
}

/// Returns whether the command succeeded
async fn run() -> Result<bool> {
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "receipt_labeler=debug,info"
    } else {
        "receipt_labeler=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let multi_progress = MultiProgress::new();
    let make_writer = ProgressAwareWriter(multi_progress.clone());

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(make_writer)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(make_writer)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }

    match &cli.command {
        Commands::Run {
            label,
            start,
            end,
            dry_run,
        } => {
            if *dry_run {
                println!("Running in DRY RUN mode - no labels will be applied");
            }

            let request = RunRequest {
                label_name: label.clone(),
                start_date: start.clone(),
                end_date: end.clone(),
                dry_run: *dry_run,
            };
            let summary = cli::run_labeling(&cli, request, multi_progress.clone()).await?;

            if summary.success {
                println!("{}", summary.message);
            } else {
                eprintln!("{}", summary.message);
            }
            Ok(summary.success)
        }

        Commands::InitConfig { output, force } => {
            cli::init_config(output, *force).await?;
            println!("Created example configuration at {:?}", output);
            println!("Edit this file to customize batching, delays and scoring.");
            Ok(true)
        }

        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");
            cli::authenticate(&cli, *force).await?;
            Ok(true)
        }
    }
}

/// Display error with context
fn display_error(error: &anyhow::Error) {
    eprintln!("Error: {}", error);

    let mut cause = error.source();
    while let Some(e) = cause {
        eprintln!("  Caused by: {}", e);
        cause = e.source();
    }

    if let Some(labeler_err) = error.downcast_ref::<LabelerError>() {
        match labeler_err {
            LabelerError::AuthError(_) => {
                eprintln!("\nHint: Make sure your credentials.json file is valid,");
                eprintln!("      or pass a token with --access-token / GMAIL_ACCESS_TOKEN.");
                eprintln!("      Try running: receipt-labeler auth --force");
            }
            LabelerError::ConfigError(_) => {
                eprintln!("\nHint: Check your configuration file for errors.");
                eprintln!("      Run: receipt-labeler init-config --force");
            }
            _ => {}
        }
    }
}
