//! End-to-end receipt labeling run

use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::classifier::ReceiptClassifier;
use crate::client::MailClient;
use crate::collector::ThreadCollector;
use crate::config::Config;
use crate::error::Result;
use crate::features::{CorpusStats, FeatureExtractor};
use crate::labeler::BatchLabeler;
use crate::labels::LabelResolver;
use crate::models::{BatchOutcome, ConversationSummary, RunRequest, RunSummary};
use crate::query::build_query;
use crate::scheduler::ClassificationScheduler;

/// Milestones reported while a run progresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Collected { total: usize },
    Classified { processed: usize, total: usize },
    ReceiptsFound { count: usize },
    Labeled(BatchOutcome),
}

pub type EventCallback = Arc<dyn Fn(PipelineEvent) + Send + Sync>;

pub struct ReceiptPipeline {
    client: Arc<dyn MailClient>,
    config: Config,
    corpus: Option<Arc<CorpusStats>>,
    events: Option<EventCallback>,
}

impl ReceiptPipeline {
    pub fn new(client: Arc<dyn MailClient>, config: Config) -> Self {
        Self {
            client,
            config,
            corpus: None,
            events: None,
        }
    }

    /// Record token document frequencies of every analyzed message
    pub fn with_corpus(mut self, corpus: Arc<CorpusStats>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    pub fn with_events(mut self, events: EventCallback) -> Self {
        self.events = Some(events);
        self
    }

    /// Run once and summarize the outcome for the caller
    ///
    /// Never fails: fatal errors become `success = false` with the error text.
    pub async fn run(&self, request: RunRequest) -> RunSummary {
        let run_id = Uuid::new_v4();
        let span = info_span!("receipt_run", %run_id, label = %request.label_name);

        async {
            match self.execute(&request).await {
                Ok(summary) => {
                    info!("{}", summary.message);
                    summary
                }
                Err(e) => {
                    error!("Run failed: {}", e);
                    RunSummary::failure(format!("Error: {}", e))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, request: &RunRequest) -> Result<RunSummary> {
        let query = build_query(
            &request.label_name,
            request.start_date.as_deref(),
            request.end_date.as_deref(),
        )?;
        info!("Search query: {}", query);

        let summaries = ThreadCollector::from_config(Arc::clone(&self.client), &self.config)
            .collect(&query)
            .await?;
        self.emit(PipelineEvent::Collected {
            total: summaries.len(),
        });
        info!("Found {} candidate threads", summaries.len());

        let receipt_ids = self.classify(&summaries).await?;
        self.emit(PipelineEvent::ReceiptsFound {
            count: receipt_ids.len(),
        });

        if receipt_ids.is_empty() {
            return Ok(RunSummary::success("No receipt emails found in this date range."));
        }

        if request.dry_run {
            return Ok(RunSummary::success(format!(
                "Dry run: {} receipt threads would be labeled with \"{}\".",
                receipt_ids.len(),
                request.label_name
            )));
        }

        let label_id = LabelResolver::new(Arc::clone(&self.client))
            .resolve_or_create(&request.label_name)
            .await?;

        let outcome = BatchLabeler::from_config(Arc::clone(&self.client), &self.config)
            .apply(&receipt_ids, &label_id)
            .await?;
        self.emit(PipelineEvent::Labeled(outcome));

        Ok(RunSummary::success(format!(
            "Labeled {} out of {} receipt threads with \"{}\".",
            outcome.successfully_applied, outcome.total_requested, request.label_name
        )))
    }

    async fn classify(&self, summaries: &[ConversationSummary]) -> Result<Vec<String>> {
        let mut extractor = FeatureExtractor::new(&self.config.scoring);
        if let Some(corpus) = &self.corpus {
            extractor = extractor.with_corpus(Arc::clone(corpus));
        }
        let classifier = Arc::new(ReceiptClassifier::with_extractor(
            extractor,
            &self.config.scoring,
        ));

        let mut scheduler = ClassificationScheduler::new(
            Arc::clone(&self.client),
            classifier,
            self.config.classification.clone(),
        );

        if let Some(events) = &self.events {
            let events = Arc::clone(events);
            let total = summaries.len();
            scheduler = scheduler.with_progress(Arc::new(move |processed| {
                events(PipelineEvent::Classified { processed, total })
            }));
        }

        scheduler.classify_all(summaries).await
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            events(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMailClient;
    use crate::error::LabelerError;
    use crate::models::{ConversationDetail, LabelInfo, Message, ThreadPage};
    use std::sync::Mutex;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.search.page_delay_ms = 0;
        config.search.rate_limit_backoff_secs = 0;
        config.search.error_backoff_secs = 0;
        config.classification.item_delay_ms = 0;
        config.classification.group_delay_ms = 0;
        config.classification.rate_limit_backoff_secs = 0;
        config.classification.error_backoff_secs = 0;
        config.labeling.chunk_delay_ms = 0;
        config.labeling.rate_limit_backoff_secs = 0;
        config
    }

    fn request(dry_run: bool) -> RunRequest {
        RunRequest {
            label_name: "Receipts".to_string(),
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-02-01".to_string()),
            dry_run,
        }
    }

    fn receipt(id: &str) -> ConversationDetail {
        ConversationDetail {
            id: id.to_string(),
            messages: vec![Message::new("Total: $30.00")
                .with_header("Subject", "Your order #4411")
                .with_header("From", "orders@shop.example")],
        }
    }

    fn mock_with_threads(ids: &'static [&'static str]) -> MockMailClient {
        let mut mock = MockMailClient::new();
        mock.expect_list_threads().times(1).returning(move |_, _, _| {
            Ok(ThreadPage {
                threads: ids.iter().map(|id| ConversationSummary::new(*id)).collect(),
                next_page_token: None,
            })
        });
        mock.expect_get_thread().returning(|id| Ok(receipt(id)));
        mock
    }

    #[tokio::test]
    async fn test_full_run_labels_receipts() {
        let mut mock = mock_with_threads(&["a", "b"]);
        mock.expect_list_labels().times(1).returning(|| Ok(vec![]));
        mock.expect_create_label()
            .times(1)
            .returning(|_| Ok("Label_1".to_string()));
        mock.expect_batch_add_label()
            .withf(|ids, label| ids == ["a".to_string(), "b".to_string()] && label == "Label_1")
            .times(1)
            .returning(|_, _| Ok(()));

        let summary = ReceiptPipeline::new(Arc::new(mock), fast_config())
            .run(request(false))
            .await;
        assert_eq!(
            summary,
            RunSummary::success("Labeled 2 out of 2 receipt threads with \"Receipts\".")
        );
    }

    #[tokio::test]
    async fn test_no_results() {
        let mut mock = MockMailClient::new();
        mock.expect_list_threads()
            .returning(|_, _, _| Ok(ThreadPage::default()));
        mock.expect_list_labels().never();

        let summary = ReceiptPipeline::new(Arc::new(mock), fast_config())
            .run(request(false))
            .await;
        assert_eq!(
            summary,
            RunSummary::success("No receipt emails found in this date range.")
        );
    }

    #[tokio::test]
    async fn test_dry_run_skips_mutation() {
        let mut mock = mock_with_threads(&["a", "b", "c"]);
        mock.expect_list_labels().never();
        mock.expect_batch_add_label().never();

        let summary = ReceiptPipeline::new(Arc::new(mock), fast_config())
            .run(request(true))
            .await;
        assert!(summary.success);
        assert_eq!(
            summary.message,
            "Dry run: 3 receipt threads would be labeled with \"Receipts\"."
        );
    }

    #[tokio::test]
    async fn test_fatal_error_becomes_failure_summary() {
        let mut mock = MockMailClient::new();
        mock.expect_list_threads()
            .returning(|_, _, _| Err(LabelerError::AuthError("token expired".to_string())));

        let summary = ReceiptPipeline::new(Arc::new(mock), fast_config())
            .run(request(false))
            .await;
        assert_eq!(
            summary,
            RunSummary::failure("Error: Authentication failed: token expired")
        );
    }

    #[tokio::test]
    async fn test_invalid_dates_fail_before_any_call() {
        let mut mock = MockMailClient::new();
        mock.expect_list_threads().never();

        let mut bad = request(false);
        bad.start_date = Some("2024-03-01".to_string());

        let summary = ReceiptPipeline::new(Arc::new(mock), fast_config())
            .run(bad)
            .await;
        assert!(!summary.success);
        assert!(summary.message.starts_with("Error: Invalid input"));
    }

    #[tokio::test]
    async fn test_existing_label_and_no_progress() {
        let mut mock = mock_with_threads(&["a"]);
        mock.expect_list_labels().returning(|| {
            Ok(vec![LabelInfo {
                id: "Label_5".to_string(),
                name: "Receipts".to_string(),
            }])
        });
        mock.expect_create_label().never();
        mock.expect_batch_add_label().returning(|_, _| {
            Err(LabelerError::RemoteRequest {
                status: 400,
                body: "Invalid label".to_string(),
            })
        });

        let summary = ReceiptPipeline::new(Arc::new(mock), fast_config())
            .run(request(false))
            .await;
        assert_eq!(
            summary,
            RunSummary::failure("Error: Failed to apply labels to any of 1 threads")
        );
    }

    #[tokio::test]
    async fn test_events_and_corpus() {
        let mut mock = mock_with_threads(&["a", "b"]);
        mock.expect_list_labels().returning(|| Ok(vec![]));
        mock.expect_create_label().returning(|_| Ok("Label_1".to_string()));
        mock.expect_batch_add_label().returning(|_, _| Ok(()));

        let events: Arc<Mutex<Vec<PipelineEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let corpus = Arc::new(CorpusStats::new());

        let summary = ReceiptPipeline::new(Arc::new(mock), fast_config())
            .with_corpus(Arc::clone(&corpus))
            .with_events(Arc::new(move |event| sink.lock().unwrap().push(event)))
            .run(request(false))
            .await;
        assert!(summary.success);

        let events = events.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                PipelineEvent::Collected { total: 2 },
                PipelineEvent::Classified {
                    processed: 2,
                    total: 2
                },
                PipelineEvent::ReceiptsFound { count: 2 },
                PipelineEvent::Labeled(BatchOutcome {
                    total_requested: 2,
                    successfully_applied: 2
                }),
            ]
        );
    }
}
