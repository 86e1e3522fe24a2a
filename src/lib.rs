//! Receipt Labeler
//!
//! Finds purchase receipts in a Gmail mailbox and applies a user label to
//! every thread that looks like one.
//!
//! # Overview
//!
//! A run moves through four stages:
//! - **Search**: a date-bounded Gmail query is paged through to collect thread ids
//! - **Enrichment**: threads are fetched in fixed-size concurrent groups
//! - **Classification**: a rule gate and a weighted feature scorer, combined by OR
//! - **Labeling**: matching threads are labeled in chunks of at most 1000 ids
//!
//! Rate limits are absorbed with backoff at the scope where they occur; a
//! partially applied label is reported as success with the applied count.
//!
//! # Example Usage
//!
//! ```no_run
//! use receipt_labeler::{auth, client::GmailMailClient, config::Config};
//! use receipt_labeler::models::RunRequest;
//! use receipt_labeler::pipeline::ReceiptPipeline;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".receipt-labeler/token.json".as_ref(),
//!     ).await?;
//!
//!     let pipeline = ReceiptPipeline::new(Arc::new(GmailMailClient::new(hub)), config);
//!     let summary = pipeline.run(RunRequest {
//!         label_name: "Receipts".to_string(),
//!         start_date: Some("2024-01-01".to_string()),
//!         end_date: None,
//!         dry_run: false,
//!     }).await;
//!
//!     println!("{}", summary.message);
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod features;
pub mod labeler;
pub mod labels;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod retry;
pub mod scheduler;

pub use error::{LabelerError, Result};

pub use models::{
    BatchOutcome, ClassificationResult, ConversationDetail, ConversationSummary, FeatureVector,
    Message, RunRequest, RunSummary,
};

pub use classifier::{ClassificationStrategy, ReceiptClassifier, RuleGate, WeightedScorer};
pub use client::{GmailMailClient, MailClient};
pub use config::Config;
pub use features::{CorpusStats, FeatureExtractor};
pub use pipeline::{PipelineEvent, ReceiptPipeline};
pub use retry::{Retrier, RetryPolicy};
