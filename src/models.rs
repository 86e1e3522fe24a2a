use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Thread reference returned by the listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
}

impl ConversationSummary {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// One page of a thread listing
#[derive(Debug, Clone, Default)]
pub struct ThreadPage {
    pub threads: Vec<ConversationSummary>,
    pub next_page_token: Option<String>,
}

/// Full thread, fetched lazily per summary
#[derive(Debug, Clone, Default)]
pub struct ConversationDetail {
    pub id: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Header names are stored lower-cased
    headers: HashMap<String, String>,
    pub snippet: String,
    pub attachment_parts: Vec<AttachmentPart>,
}

impl Message {
    pub fn new(snippet: impl Into<String>) -> Self {
        Self {
            snippet: snippet.into(),
            ..Default::default()
        }
    }

    /// Set a header; later values for the same (case-insensitive) name win
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn with_attachment(mut self, mime_type: &str, filename: &str) -> Self {
        self.attachment_parts.push(AttachmentPart {
            mime_type: mime_type.to_string(),
            filename: filename.to_string(),
        });
        self
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_lowercase(), value.into());
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn subject(&self) -> &str {
        self.header("subject").unwrap_or_default()
    }

    pub fn sender(&self) -> &str {
        self.header("from").unwrap_or_default()
    }

    /// Subject and snippet joined by a single space
    pub fn combined_text(&self) -> String {
        format!("{} {}", self.subject(), self.snippet)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentPart {
    pub mime_type: String,
    pub filename: String,
}

/// Signals derived from one thread's content
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub has_amount: bool,
    pub has_confirmation: bool,
    pub has_subscription: bool,
    pub has_download: bool,
    pub has_license: bool,
    pub has_order_number: bool,
    pub known_sender: bool,
    pub mentions_payment: bool,
    pub has_attachment: bool,
    pub has_invoice_attachment: bool,
    pub has_receipt_attachment: bool,
    /// Any message matched the currency/labeled-amount family
    pub amount_pattern: bool,
    /// Any message matched the order/confirmation reference family
    pub reference_pattern: bool,
    /// Vocabulary density scaled by 10, rounded, plus the attachment bonus
    pub lexical_score: i64,
}

impl FeatureVector {
    pub fn is_invoice_or_receipt(&self) -> bool {
        self.has_invoice_attachment || self.has_receipt_attachment
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub conversation_id: String,
    pub is_receipt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub total_requested: usize,
    pub successfully_applied: usize,
}

impl BatchOutcome {
    pub fn is_partial(&self) -> bool {
        self.successfully_applied < self.total_requested
    }
}

/// Label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// What the driving caller asks for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub label_name: String,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
}

/// What the driving caller gets back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: bool,
    pub message: String,
}

impl RunSummary {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
