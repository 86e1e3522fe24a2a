//! End-to-end runs of the labeling pipeline against a mocked Gmail service

mod common;

use mockall::Sequence;
use receipt_labeler::classifier::ReceiptClassifier;
use receipt_labeler::config::ScoringConfig;
use receipt_labeler::error::LabelerError;
use receipt_labeler::labeler::BatchLabeler;
use receipt_labeler::models::{BatchOutcome, RunRequest, RunSummary};
use receipt_labeler::pipeline::ReceiptPipeline;
use receipt_labeler::retry::{Retrier, RetryPolicy};
use receipt_labeler::scheduler::ClassificationScheduler;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{
    chatter, fast_config, gate_receipt, label_info, page, renewal_receipt, statement_receipt,
    summaries, MockMailClient,
};

const GATE_IDS: [&str; 4] = ["t03", "t07", "t12", "t20"];
const SCORER_IDS: [&str; 2] = ["t09", "t16"];

fn mailbox_ids() -> Vec<String> {
    (0..25).map(|i| format!("t{:02}", i)).collect()
}

fn mailbox_thread(id: &str) -> receipt_labeler::models::ConversationDetail {
    match id {
        "t09" => renewal_receipt(id),
        "t16" => statement_receipt(id),
        _ if GATE_IDS.contains(&id) => gate_receipt(id),
        _ => chatter(id),
    }
}

fn expected_receipts() -> Vec<String> {
    ["t03", "t07", "t09", "t12", "t16", "t20"]
        .iter()
        .map(|id| id.to_string())
        .collect()
}

#[tokio::test]
async fn test_classification_combines_gate_and_scorer() {
    let mut mock = MockMailClient::new();
    mock.expect_get_thread()
        .times(25)
        .returning(|id| Ok(mailbox_thread(id)));

    let config = fast_config();
    let classifier = Arc::new(ReceiptClassifier::standard(&config.scoring));
    let scheduler =
        ClassificationScheduler::new(Arc::new(mock), classifier, config.classification.clone());

    let ids = scheduler
        .classify_all(&summaries(&mailbox_ids()))
        .await
        .unwrap();
    assert_eq!(ids, expected_receipts());

    // Two of them are only reachable through the weighted scorer
    let classifier = ReceiptClassifier::standard(&ScoringConfig::default());
    for id in SCORER_IDS {
        assert_eq!(
            classifier.decided_by(&mailbox_thread(id)),
            Some("weighted_scorer")
        );
    }
    for id in GATE_IDS {
        assert_eq!(classifier.decided_by(&mailbox_thread(id)), Some("rule_gate"));
    }

    let mut labeling = MockMailClient::new();
    labeling
        .expect_batch_add_label()
        .withf(|ids, label| ids.len() == 6 && label == "Label_R")
        .times(1)
        .returning(|_, _| Ok(()));
    let labeler = BatchLabeler::new(
        Arc::new(labeling),
        Retrier::new(RetryPolicy::fixed(Duration::ZERO, Duration::ZERO, 0)),
        900,
        Duration::ZERO,
    );
    let outcome = labeler.apply(&ids, "Label_R").await.unwrap();
    assert_eq!(
        outcome,
        BatchOutcome {
            total_requested: 6,
            successfully_applied: 6,
        }
    );
}

#[tokio::test]
async fn test_full_run_over_two_pages() {
    let ids = mailbox_ids();
    let first: Vec<String> = ids[..15].to_vec();
    let second: Vec<String> = ids[15..].to_vec();

    let mut mock = MockMailClient::new();
    let mut seq = Sequence::new();
    mock.expect_list_threads()
        .withf(|query, token, _| query.contains("after:2024-01-01") && token.is_none())
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_, _, _| Ok(page(&first, Some("page-2"))));
    mock.expect_list_threads()
        .withf(|_, token, _| token.as_deref() == Some("page-2"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(move |_, _, _| Ok(page(&second, None)));
    mock.expect_get_thread()
        .times(25)
        .returning(|id| Ok(mailbox_thread(id)));
    mock.expect_list_labels()
        .times(1)
        .returning(|| Ok(vec![label_info("INBOX", "INBOX"), label_info("Label_R", "Receipts")]));
    mock.expect_create_label().never();

    let labeled: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&labeled);
    mock.expect_batch_add_label()
        .withf(|_, label| label == "Label_R")
        .times(1)
        .returning(move |ids, _| {
            sink.lock().unwrap().extend(ids.iter().cloned());
            Ok(())
        });

    let summary = ReceiptPipeline::new(Arc::new(mock), fast_config())
        .run(RunRequest {
            label_name: "Receipts".to_string(),
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-06-30".to_string()),
            dry_run: false,
        })
        .await;

    assert_eq!(
        summary,
        RunSummary::success("Labeled 6 out of 6 receipt threads with \"Receipts\".")
    );
    assert_eq!(*labeled.lock().unwrap(), expected_receipts());
}

#[tokio::test]
async fn test_partial_labeling_is_reported_as_success() {
    let ids = mailbox_ids();

    let mut mock = MockMailClient::new();
    mock.expect_list_threads()
        .returning(move |_, _, _| Ok(page(&ids, None)));
    mock.expect_get_thread().returning(|id| Ok(mailbox_thread(id)));
    mock.expect_list_labels().returning(|| Ok(vec![]));
    mock.expect_create_label()
        .withf(|name| name == "Receipts")
        .returning(|_| Ok("Label_New".to_string()));

    // Chunks of 4: the second chunk fails
    let mut seq = Sequence::new();
    mock.expect_batch_add_label()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(()));
    mock.expect_batch_add_label()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| {
            Err(LabelerError::RemoteRequest {
                status: 503,
                body: "Service Unavailable".to_string(),
            })
        });

    let mut config = fast_config();
    config.labeling.chunk_size = 4;

    let summary = ReceiptPipeline::new(Arc::new(mock), config)
        .run(RunRequest {
            label_name: "Receipts".to_string(),
            start_date: None,
            end_date: None,
            dry_run: false,
        })
        .await;

    assert_eq!(
        summary,
        RunSummary::success("Labeled 4 out of 6 receipt threads with \"Receipts\".")
    );
}

#[tokio::test]
async fn test_rate_limited_group_recovers_end_to_end() {
    let ids = mailbox_ids();
    let fetches: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&fetches);

    let mut mock = MockMailClient::new();
    mock.expect_list_threads()
        .returning(move |_, _, _| Ok(page(&ids, None)));
    mock.expect_get_thread().returning(move |id| {
        let mut log = log.lock().unwrap();
        log.push(id.to_string());
        let attempts = log.iter().filter(|seen| seen.as_str() == id).count();
        if id == "t12" && attempts == 1 {
            return Err(LabelerError::RateLimited {
                reason: "rateLimitExceeded".to_string(),
            });
        }
        Ok(mailbox_thread(id))
    });

    let summary = ReceiptPipeline::new(Arc::new(mock), fast_config())
        .run(RunRequest {
            label_name: "Receipts".to_string(),
            start_date: None,
            end_date: None,
            dry_run: true,
        })
        .await;

    assert_eq!(
        summary,
        RunSummary::success("Dry run: 6 receipt threads would be labeled with \"Receipts\".")
    );

    // Second group (t10..t19) restarted from its first item, the others ran once
    let fetches = fetches.lock().unwrap();
    assert!(fetches.len() >= 28 && fetches.len() <= 35);
    assert_eq!(fetches.iter().filter(|id| id.as_str() == "t10").count(), 2);
    assert_eq!(fetches.iter().filter(|id| id.as_str() == "t12").count(), 2);
    assert_eq!(fetches.iter().filter(|id| id.as_str() == "t00").count(), 1);
}

#[tokio::test]
async fn test_search_failure_is_reported() {
    let mut mock = MockMailClient::new();
    mock.expect_list_threads().times(4).returning(|_, _, _| {
        Err(LabelerError::NetworkError("connection reset".to_string()))
    });
    mock.expect_get_thread().never();

    let summary = ReceiptPipeline::new(Arc::new(mock), fast_config())
        .run(RunRequest {
            label_name: "Receipts".to_string(),
            start_date: None,
            end_date: None,
            dry_run: false,
        })
        .await;

    assert!(!summary.success);
    assert_eq!(
        summary.message,
        "Error: list_threads failed after 4 attempts: Network error: connection reset"
    );
}
