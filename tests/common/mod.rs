//! Common test utilities and fixtures
#![allow(dead_code)]

use mockall::mock;
use receipt_labeler::client::MailClient;
use receipt_labeler::config::Config;
use receipt_labeler::error::Result;
use receipt_labeler::models::{ConversationDetail, ConversationSummary, LabelInfo, Message, ThreadPage};

// Mock implementation of MailClient for testing
mock! {
    pub MailClient {}

    #[async_trait::async_trait]
    impl MailClient for MailClient {
        async fn list_threads(
            &self,
            query: &str,
            page_token: Option<String>,
            page_size: u32,
        ) -> Result<ThreadPage>;
        async fn get_thread(&self, id: &str) -> Result<ConversationDetail>;
        async fn batch_add_label(&self, ids: &[String], label_id: &str) -> Result<()>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
        async fn create_label(&self, name: &str) -> Result<String>;
    }
}

/// Defaults with every delay and backoff set to zero
pub fn fast_config() -> Config {
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

pub fn summaries(ids: &[String]) -> Vec<ConversationSummary> {
    ids.iter().map(|id| ConversationSummary::new(id.as_str())).collect()
}

pub fn page(ids: &[String], next: Option<&str>) -> ThreadPage {
    ThreadPage {
        threads: summaries(ids),
        next_page_token: next.map(str::to_string),
    }
}

pub fn label_info(id: &str, name: &str) -> LabelInfo {
    LabelInfo {
        id: id.to_string(),
        name: name.to_string(),
    }
}

fn thread(id: &str, messages: Vec<Message>) -> ConversationDetail {
    ConversationDetail {
        id: id.to_string(),
        messages,
    }
}

/// Amount plus order reference: accepted by the rule gate
pub fn gate_receipt(id: &str) -> ConversationDetail {
    thread(
        id,
        vec![Message::new("Total: $48.20 charged to Visa ending 4242")
            .with_header("Subject", "Your order #88213 has been placed")
            .with_header("From", "Corner Shop <hello@cornershop.example>")],
    )
}

/// Subscription renewal with no amount or reference number
pub fn renewal_receipt(id: &str) -> ConversationDetail {
    thread(
        id,
        vec![
            Message::new("Your annual license renewal was paid. Activation key inside.")
                .with_header("Subject", "Subscription renewal")
                .with_header("From", "Plugins <hello@plugins.example>"),
        ],
    )
}

/// Statement delivered as an invoice PDF
pub fn statement_receipt(id: &str) -> ConversationDetail {
    thread(
        id,
        vec![Message::new("Please find attached your statement for March")
            .with_header("Subject", "March statement")
            .with_header("From", "Accounts <accounts@utility.example>")
            .with_attachment("application/pdf", "invoice-march.pdf")],
    )
}

/// Ordinary conversation
pub fn chatter(id: &str) -> ConversationDetail {
    thread(
        id,
        vec![
            Message::new("Agenda for tomorrow: roadmap review and hiring updates")
                .with_header("Subject", "Team sync notes")
                .with_header("From", "Dana <dana@company.example>"),
            Message::new("Sounds good, see you there")
                .with_header("Subject", "Re: Team sync notes")
                .with_header("From", "Lee <lee@company.example>"),
        ],
    )
}
