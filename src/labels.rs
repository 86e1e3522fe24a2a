//! Resolve a user label name to its id, creating the label when missing

use std::sync::Arc;
use tracing::{debug, info};

use crate::client::MailClient;
use crate::error::{LabelerError, Result};

pub struct LabelResolver {
    client: Arc<dyn MailClient>,
}

impl LabelResolver {
    pub fn new(client: Arc<dyn MailClient>) -> Self {
        Self { client }
    }

    /// Id of the label named exactly `name`, created on first use
    pub async fn resolve_or_create(&self, name: &str) -> Result<String> {
        if name.trim().is_empty() {
            return Err(LabelerError::InvalidInput(
                "Label name must not be empty".to_string(),
            ));
        }

        let labels = self.client.list_labels().await?;
        if let Some(existing) = labels.into_iter().find(|label| label.name == name) {
            debug!("Found existing label '{}' ({})", name, existing.id);
            return Ok(existing.id);
        }

        let id = self.client.create_label(name).await?;
        info!("Created label '{}' ({})", name, id);
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockMailClient;
    use crate::models::LabelInfo;

    fn label(id: &str, name: &str) -> LabelInfo {
        LabelInfo {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_existing_label_reused() {
        let mut mock = MockMailClient::new();
        mock.expect_list_labels()
            .times(1)
            .returning(|| Ok(vec![label("INBOX", "INBOX"), label("Label_3", "Receipts")]));
        mock.expect_create_label().never();

        let resolver = LabelResolver::new(Arc::new(mock));
        assert_eq!(resolver.resolve_or_create("Receipts").await.unwrap(), "Label_3");
    }

    #[tokio::test]
    async fn test_missing_label_created() {
        let mut mock = MockMailClient::new();
        mock.expect_list_labels()
            .times(1)
            .returning(|| Ok(vec![label("Label_3", "receipts")]));
        mock.expect_create_label()
            .withf(|name| name == "Receipts")
            .times(1)
            .returning(|_| Ok("Label_9".to_string()));

        let resolver = LabelResolver::new(Arc::new(mock));
        assert_eq!(resolver.resolve_or_create("Receipts").await.unwrap(), "Label_9");
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let mut mock = MockMailClient::new();
        mock.expect_list_labels().never();

        let resolver = LabelResolver::new(Arc::new(mock));
        let result = resolver.resolve_or_create("  ").await;
        assert!(matches!(result, Err(LabelerError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_list_failure_propagates() {
        let mut mock = MockMailClient::new();
        mock.expect_list_labels()
            .returning(|| Err(LabelerError::AuthError("expired".to_string())));

        let resolver = LabelResolver::new(Arc::new(mock));
        assert!(matches!(
            resolver.resolve_or_create("Receipts").await,
            Err(LabelerError::AuthError(_))
        ));
    }
}
