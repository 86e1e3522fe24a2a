//! Paginated thread collection

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::client::MailClient;
use crate::config::Config;
use crate::error::Result;
use crate::models::ConversationSummary;
use crate::retry::{pause, Retrier, RetryPolicy};

/// Walks every result page of a search, in server order
pub struct ThreadCollector {
    client: Arc<dyn MailClient>,
    retrier: Retrier,
    page_size: u32,
    page_delay: Duration,
}

impl ThreadCollector {
    pub fn new(
        client: Arc<dyn MailClient>,
        retrier: Retrier,
        page_size: u32,
        page_delay: Duration,
    ) -> Self {
        Self {
            client,
            retrier,
            page_size,
            page_delay,
        }
    }

    pub fn from_config(client: Arc<dyn MailClient>, config: &Config) -> Self {
        Self::new(
            client,
            Retrier::new(RetryPolicy::for_search(config)),
            config.search.page_size,
            config.search.page_delay(),
        )
    }

    /// Every thread summary matching `query`
    ///
    /// Each page request goes through the retrier; a fatal error on any page
    /// discards the pages gathered so far.
    pub async fn collect(&self, query: &str) -> Result<Vec<ConversationSummary>> {
        let mut summaries = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let token = page_token.clone();
            let page = self
                .retrier
                .execute("list_threads", || {
                    let token = token.clone();
                    let client = &self.client;
                    async move { client.list_threads(query, token, self.page_size).await }
                })
                .await?;

            pages += 1;
            debug!("Page {}: {} threads", pages, page.threads.len());
            summaries.extend(page.threads);

            match page.next_page_token {
                Some(next) => {
                    page_token = Some(next);
                    pause(self.page_delay).await;
                }
                None => break,
            }
        }

        info!("Collected {} threads over {} pages", summaries.len(), pages);
        Ok(summaries)
    }
}
