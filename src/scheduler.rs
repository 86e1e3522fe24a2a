//! Group-wise enrichment and classification of collected threads
//!
//! Summaries are split into fixed-size groups that run strictly one after
//! another. Inside a group every item is fetched and classified concurrently,
//! bounded by a semaphore, and the group is joined before the next one starts.
//!
//! Failure scopes:
//! - per-item fetch failure: logged, item dropped
//! - rate limit on any item: pending fetches aborted, whole group re-queued at
//!   the front after a backoff
//! - task failure (panic, closed semaphore): counted against a run-wide ceiling

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::classifier::ReceiptClassifier;
use crate::client::MailClient;
use crate::config::ClassificationConfig;
use crate::error::{LabelerError, Result};
use crate::models::{ClassificationResult, ConversationSummary};
use crate::retry::pause;

/// Progress callback; receives the number of summaries processed so far
pub type ProgressCallback = Arc<dyn Fn(usize) + Send + Sync>;

/// A group waiting to be dispatched
#[derive(Debug)]
struct PendingGroup {
    index: usize,
    items: Vec<ConversationSummary>,
    requeues: u32,
}

enum GroupFailure {
    RateLimited(LabelerError),
    Failed(LabelerError),
}

pub struct ClassificationScheduler {
    client: Arc<dyn MailClient>,
    classifier: Arc<ReceiptClassifier>,
    settings: ClassificationConfig,
    progress: Option<ProgressCallback>,
}

impl ClassificationScheduler {
    pub fn new(
        client: Arc<dyn MailClient>,
        classifier: Arc<ReceiptClassifier>,
        settings: ClassificationConfig,
    ) -> Self {
        Self {
            client,
            classifier,
            settings,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Ids of every summary classified as a receipt, in input order
    pub async fn classify_all(&self, summaries: &[ConversationSummary]) -> Result<Vec<String>> {
        let group_size = self.settings.group_size.max(1);
        let mut queue: VecDeque<PendingGroup> = summaries
            .chunks(group_size)
            .enumerate()
            .map(|(index, items)| PendingGroup {
                index,
                items: items.to_vec(),
                requeues: 0,
            })
            .collect();

        let total_groups = queue.len();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut relevant = Vec::new();
        let mut processed = 0usize;
        let mut group_failures = 0u32;

        info!(
            "Classifying {} threads in {} groups of up to {}",
            summaries.len(),
            total_groups,
            group_size
        );

        while let Some(mut group) = queue.pop_front() {
            debug!(
                "Dispatching group {}/{} ({} items)",
                group.index + 1,
                total_groups,
                group.items.len()
            );

            match self.run_group(&group.items, &semaphore).await {
                Ok(ids) => {
                    processed += group.items.len();
                    info!(
                        "Group {}/{}: {} receipts",
                        group.index + 1,
                        total_groups,
                        ids.len()
                    );
                    relevant.extend(ids);

                    if let Some(progress) = &self.progress {
                        progress(processed);
                    }
                    if !queue.is_empty() {
                        pause(self.settings.group_delay()).await;
                    }
                }
                Err(GroupFailure::RateLimited(cause)) => {
                    group.requeues += 1;
                    if let Some(max) = self.settings.max_rate_limit_requeues {
                        if group.requeues > max {
                            error!("Group {} still rate limited after {} retries", group.index + 1, max);
                            return Err(LabelerError::RetriesExhausted {
                                operation: format!("classify group {}", group.index + 1),
                                attempts: group.requeues,
                                last: Box::new(cause),
                            });
                        }
                    }

                    let backoff = self.settings.rate_limit_backoff();
                    warn!(
                        "Group {} hit a rate limit ({}), retrying the whole group in {:?}",
                        group.index + 1,
                        cause,
                        backoff
                    );
                    pause(backoff).await;
                    queue.push_front(group);
                }
                Err(GroupFailure::Failed(cause)) => {
                    group_failures += 1;
                    if group_failures > self.settings.max_group_failures {
                        error!("Classification aborted: {}", cause);
                        return Err(LabelerError::RetriesExhausted {
                            operation: "classification".to_string(),
                            attempts: group_failures,
                            last: Box::new(cause),
                        });
                    }

                    let backoff = self.settings.error_backoff();
                    warn!(
                        "Group {} failed (failure {}/{}): {}. Retrying in {:?}...",
                        group.index + 1,
                        group_failures,
                        self.settings.max_group_failures,
                        cause,
                        backoff
                    );
                    pause(backoff).await;
                    queue.push_front(group);
                }
            }
        }

        info!("{} of {} threads look like receipts", relevant.len(), summaries.len());
        Ok(relevant)
    }

    /// Fan out one group and join it
    async fn run_group(
        &self,
        items: &[ConversationSummary],
        semaphore: &Arc<Semaphore>,
    ) -> std::result::Result<Vec<String>, GroupFailure> {
        let mut tasks = JoinSet::new();

        for (position, summary) in items.iter().enumerate() {
            let client = Arc::clone(&self.client);
            let classifier = Arc::clone(&self.classifier);
            let semaphore = Arc::clone(semaphore);
            let delay = stagger(self.settings.item_delay(), position);
            let id = summary.id.clone();

            tasks.spawn(async move {
                pause(delay).await;
                let _permit = semaphore.acquire_owned().await.map_err(|e| {
                    LabelerError::Api(format!("Failed to acquire fetch permit: {}", e))
                })?;

                match client.get_thread(&id).await {
                    Ok(detail) => Ok((position, Some(classifier.classify(&detail)))),
                    Err(e) if e.is_rate_limit() => Err(e),
                    Err(e) => {
                        warn!("Skipping thread {}: {}", id, e);
                        Ok((position, None))
                    }
                }
            });
        }

        let mut results: Vec<(usize, Option<ClassificationResult>)> = Vec::with_capacity(items.len());
        let mut failure: Option<LabelerError> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) if e.is_rate_limit() => {
                    tasks.abort_all();
                    return Err(GroupFailure::RateLimited(e));
                }
                Ok(Err(e)) => {
                    failure.get_or_insert(e);
                }
                Err(join_error) => {
                    failure.get_or_insert(LabelerError::Api(format!(
                        "Classification task failed: {}",
                        join_error
                    )));
                }
            }
        }

        if let Some(e) = failure {
            return Err(GroupFailure::Failed(e));
        }

        results.sort_by_key(|(position, _)| *position);
        Ok(results
            .into_iter()
            .filter_map(|(_, result)| result)
            .filter(|result| result.is_receipt)
            .map(|result| result.conversation_id)
            .collect())
    }
}

fn stagger(item_delay: Duration, position: usize) -> Duration {
    item_delay.saturating_mul(u32::try_from(position).unwrap_or(u32::MAX))
}
