//! Chunked label application with partial-success accounting

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::client::MailClient;
use crate::config::{Config, MAX_IDS_PER_MUTATION};
use crate::error::{LabelerError, Result};
use crate::models::BatchOutcome;
use crate::retry::{pause, Retrier, RetryPolicy};

pub struct BatchLabeler {
    client: Arc<dyn MailClient>,
    retrier: Retrier,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl BatchLabeler {
    /// `chunk_size` is clamped to 1..=1000
    pub fn new(
        client: Arc<dyn MailClient>,
        retrier: Retrier,
        chunk_size: usize,
        chunk_delay: Duration,
    ) -> Self {
        Self {
            client,
            retrier,
            chunk_size: chunk_size.clamp(1, MAX_IDS_PER_MUTATION),
            chunk_delay,
        }
    }

    pub fn from_config(client: Arc<dyn MailClient>, config: &Config) -> Self {
        Self::new(
            client,
            Retrier::new(RetryPolicy::for_labeling(config)),
            config.labeling.chunk_size,
            config.labeling.chunk_delay(),
        )
    }

    /// Add `label_id` to every id, one call per chunk
    ///
    /// A failed chunk is logged and skipped. Fails with
    /// [`LabelerError::NoProgress`] only when no chunk succeeded.
    pub async fn apply(&self, ids: &[String], label_id: &str) -> Result<BatchOutcome> {
        if ids.is_empty() {
            warn!("No threads to label");
            return Ok(BatchOutcome {
                total_requested: 0,
                successfully_applied: 0,
            });
        }

        let chunks: Vec<&[String]> = ids.chunks(self.chunk_size).collect();
        let total_chunks = chunks.len();
        let mut applied = 0usize;

        for (index, chunk) in chunks.into_iter().enumerate() {
            let result = self
                .retrier
                .execute("batch_add_label", || self.client.batch_add_label(chunk, label_id))
                .await;

            match result {
                Ok(()) => {
                    applied += chunk.len();
                    info!(
                        "Chunk {}/{}: labeled {} threads",
                        index + 1,
                        total_chunks,
                        chunk.len()
                    );
                }
                Err(e) => {
                    error!(
                        "Chunk {}/{} ({} threads) failed: {}",
                        index + 1,
                        total_chunks,
                        chunk.len(),
                        e
                    );
                }
            }

            if index + 1 < total_chunks {
                pause(self.chunk_delay).await;
            }
        }

        if applied == 0 {
            return Err(LabelerError::NoProgress {
                requested: ids.len(),
            });
        }

        info!("Labeled {} out of {} threads", applied, ids.len());
        Ok(BatchOutcome {
            total_requested: ids.len(),
            successfully_applied: applied,
        })
    }
}
