//! Gmail API client behind the `MailClient` seam

use async_trait::async_trait;
use google_gmail1::api::{
    BatchModifyMessagesRequest, Label, Message as ApiMessage, MessagePart, Thread,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::auth::GmailHub;
use crate::error::{LabelerError, Result};
use crate::models::{AttachmentPart, ConversationDetail, ConversationSummary, LabelInfo, Message, ThreadPage};

const MODIFY_SCOPE: &str = "https://www.googleapis.com/auth/gmail.modify";
const LABELS_SCOPE: &str = "https://www.googleapis.com/auth/gmail.labels";

/// Remote mail service operations used by the pipeline
///
/// Implementations return [`LabelerError::RateLimited`] for quota
/// exhaustion so callers can back off and repeat the identical request.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailClient: Send + Sync {
    /// One page of thread summaries matching `query`
    async fn list_threads(
        &self,
        query: &str,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<ThreadPage>;

    /// Full thread with message headers, snippets and part metadata
    async fn get_thread(&self, id: &str) -> Result<ConversationDetail>;

    /// Add `label_id` to every id in one call (at most 1000 ids)
    async fn batch_add_label(&self, ids: &[String], label_id: &str) -> Result<()>;

    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;

    /// Create a visible user label and return its id
    async fn create_label(&self, name: &str) -> Result<String>;
}

#[async_trait]
impl<T: MailClient + ?Sized> MailClient for Arc<T> {
    async fn list_threads(
        &self,
        query: &str,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<ThreadPage> {
        (**self).list_threads(query, page_token, page_size).await
    }

    async fn get_thread(&self, id: &str) -> Result<ConversationDetail> {
        (**self).get_thread(id).await
    }

    async fn batch_add_label(&self, ids: &[String], label_id: &str) -> Result<()> {
        (**self).batch_add_label(ids, label_id).await
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        (**self).list_labels().await
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        (**self).create_label(name).await
    }
}

/// Production client over the google-gmail1 hub
///
/// Every call is a single request; retry policy lives with the callers.
pub struct GmailMailClient {
    hub: GmailHub,
    request_timeout: Duration,
}

impl GmailMailClient {
    pub fn new(hub: GmailHub) -> Self {
        Self {
            hub,
            request_timeout: Duration::from_secs(30),
        }
    }

    /// Override the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Bound a hub call so a stalled connection surfaces as a network error
    async fn timed<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: std::future::Future<Output = std::result::Result<T, google_gmail1::Error>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result.map_err(LabelerError::from),
            Err(_) => {
                warn!("{} timed out after {:?}", operation, self.request_timeout);
                Err(LabelerError::NetworkError(format!(
                    "{} timed out after {:?}",
                    operation, self.request_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl MailClient for GmailMailClient {
    async fn list_threads(
        &self,
        query: &str,
        page_token: Option<String>,
        page_size: u32,
    ) -> Result<ThreadPage> {
        let mut call = self
            .hub
            .users()
            .threads_list("me")
            .q(query)
            .max_results(page_size);

        if let Some(token) = page_token.as_deref() {
            call = call.page_token(token);
        }

        let (_, response) = self
            .timed("threads.list", call.add_scope(MODIFY_SCOPE).doit())
            .await?;

        let threads: Vec<ConversationSummary> = response
            .threads
            .unwrap_or_default()
            .into_iter()
            .filter_map(|thread| thread.id.map(ConversationSummary::new))
            .collect();

        debug!("threads.list returned {} threads", threads.len());

        Ok(ThreadPage {
            threads,
            next_page_token: response.next_page_token.filter(|token| !token.is_empty()),
        })
    }

    async fn get_thread(&self, id: &str) -> Result<ConversationDetail> {
        let call = self
            .hub
            .users()
            .threads_get("me", id)
            .format("full")
            .add_scope(MODIFY_SCOPE)
            .doit();

        let (_, thread) = self.timed("threads.get", call).await?;
        thread_to_detail(thread)
    }

    async fn batch_add_label(&self, ids: &[String], label_id: &str) -> Result<()> {
        let request = BatchModifyMessagesRequest {
            ids: Some(ids.to_vec()),
            add_label_ids: Some(vec![label_id.to_string()]),
            remove_label_ids: None,
        };

        let call = self
            .hub
            .users()
            .messages_batch_modify(request, "me")
            .add_scope(MODIFY_SCOPE)
            .doit();

        self.timed("messages.batchModify", call).await?;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        let call = self
            .hub
            .users()
            .labels_list("me")
            .add_scope(LABELS_SCOPE)
            .doit();

        let (_, response) = self.timed("labels.list", call).await?;

        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|label| match (label.id, label.name) {
                (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                _ => None,
            })
            .collect())
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        let label = Label {
            name: Some(name.to_string()),
            message_list_visibility: Some("show".to_string()),
            label_list_visibility: Some("labelShow".to_string()),
            ..Default::default()
        };

        let call = self
            .hub
            .users()
            .labels_create(label, "me")
            .add_scope(LABELS_SCOPE)
            .doit();

        let (_, created) = self.timed("labels.create", call).await?;

        created
            .id
            .ok_or_else(|| LabelerError::InvalidMessageFormat("Created label has no ID".to_string()))
    }
}

/// Convert a full-format thread into the pipeline's model
pub fn thread_to_detail(thread: Thread) -> Result<ConversationDetail> {
    let id = thread
        .id
        .ok_or_else(|| LabelerError::InvalidMessageFormat("Missing thread ID".to_string()))?;

    let messages = thread
        .messages
        .unwrap_or_default()
        .into_iter()
        .map(convert_message)
        .collect();

    Ok(ConversationDetail { id, messages })
}

fn convert_message(api: ApiMessage) -> Message {
    let mut message = Message::new(api.snippet.unwrap_or_default());

    if let Some(payload) = api.payload {
        for header in payload.headers.iter().flatten() {
            if let (Some(name), Some(value)) = (&header.name, &header.value) {
                message.insert_header(name, value.clone());
            }
        }
        collect_attachment_parts(&payload, &mut message.attachment_parts);
    }

    message
}

/// Depth-first walk over nested MIME parts
fn collect_attachment_parts(part: &MessagePart, out: &mut Vec<AttachmentPart>) {
    let mime_type = part.mime_type.clone().unwrap_or_default();
    let filename = part.filename.clone().unwrap_or_default();

    let is_attachment_type =
        mime_type.starts_with("application/") || mime_type.starts_with("image/");
    if !filename.is_empty() || is_attachment_type {
        out.push(AttachmentPart { mime_type, filename });
    }

    for child in part.parts.iter().flatten() {
        collect_attachment_parts(child, out);
    }
}
