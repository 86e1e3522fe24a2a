//! Property tests for the lexical score, the rule gate and the weighted scorer

use proptest::prelude::*;
use receipt_labeler::classifier::{RuleGate, WeightedScorer};
use receipt_labeler::config::ScoringConfig;
use receipt_labeler::features::{scaled_lexical_score, FeatureExtractor, RECEIPT_VOCABULARY};
use receipt_labeler::models::{FeatureVector, Message};

fn non_vocabulary_word() -> impl Strategy<Value = String> {
    "[a-z]{2,9}".prop_filter("must not be a receipt term", |word| {
        !RECEIPT_VOCABULARY.contains(&word.as_str())
    })
}

fn feature_vector() -> impl Strategy<Value = FeatureVector> {
    (
        prop::array::uniform11(any::<bool>()),
        0i64..=12,
    )
        .prop_map(|(flags, lexical_score)| FeatureVector {
            has_amount: flags[0],
            has_confirmation: flags[1],
            has_subscription: flags[2],
            has_download: flags[3],
            has_license: flags[4],
            has_order_number: flags[5],
            known_sender: flags[6],
            mentions_payment: flags[7],
            has_attachment: flags[8],
            has_invoice_attachment: flags[9],
            has_receipt_attachment: flags[10],
            amount_pattern: false,
            reference_pattern: false,
            lexical_score,
        })
}

proptest! {
    #[test]
    fn vocabulary_free_text_scores_zero(words in prop::collection::vec(non_vocabulary_word(), 1..30)) {
        prop_assert_eq!(scaled_lexical_score(&words.join(" ")), 0);
    }

    #[test]
    fn vocabulary_only_text_scores_maximum(
        words in prop::collection::vec(prop::sample::select(RECEIPT_VOCABULARY), 1..30)
    ) {
        let text = words
            .iter()
            .map(|word| word.to_uppercase())
            .collect::<Vec<_>>()
            .join(", ");
        prop_assert_eq!(scaled_lexical_score(&text), 10);
    }

    #[test]
    fn gate_stays_true_when_amount_and_sender_are_added(
        order in 1u32..1_000_000,
        filler in "[a-zA-Z ]{0,40}",
    ) {
        let base = Message::new(filler.clone())
            .with_header("Subject", format!("Order #{}", order));
        let enriched = Message::new(format!("{} Total: $19.99", filler))
            .with_header("Subject", format!("Order #{}", order))
            .with_header("From", "Billing <billing@vendor.example>");

        prop_assert!(RuleGate::matches_message(&enriched));
        if RuleGate::matches_message(&base) {
            prop_assert!(RuleGate::matches_message(&enriched));
        }
    }

    #[test]
    fn weighted_score_is_deterministic(features in feature_vector()) {
        let scoring = ScoringConfig::default();
        let scorer = WeightedScorer::new(FeatureExtractor::new(&scoring), &scoring);

        let first = scorer.score(&features);
        let second = scorer.score(&features);
        prop_assert_eq!(first, second);
        prop_assert_eq!(scorer.is_receipt_score(first), first >= scorer.threshold());
    }
}
