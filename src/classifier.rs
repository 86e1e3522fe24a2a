//! Receipt classification: an ordered list of strategies combined by OR

use std::fmt;
use tracing::debug;

use crate::config::{ScoringConfig, ScoringWeights};
use crate::features::{FeatureExtractor, MessageSignals};
use crate::models::{ClassificationResult, ConversationDetail, FeatureVector, Message};

/// One independent way of recognizing a receipt
pub trait ClassificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_receipt(&self, detail: &ConversationDetail) -> bool;
}

/// Cheap first pass over raw message text and headers
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleGate;

impl RuleGate {
    /// Amount plus (reference or sender), or reference plus sender
    pub fn decide(signals: MessageSignals) -> bool {
        let MessageSignals {
            amount_pattern,
            reference_pattern,
            known_sender,
        } = signals;
        (amount_pattern && (reference_pattern || known_sender))
            || (reference_pattern && known_sender)
    }

    pub fn matches_message(message: &Message) -> bool {
        Self::decide(MessageSignals::of(message))
    }
}

impl ClassificationStrategy for RuleGate {
    fn name(&self) -> &'static str {
        "rule_gate"
    }

    fn is_receipt(&self, detail: &ConversationDetail) -> bool {
        detail.messages.iter().any(Self::matches_message)
    }
}

/// Linear score over the full feature vector
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    extractor: FeatureExtractor,
    weights: ScoringWeights,
    threshold: f64,
}

impl WeightedScorer {
    pub fn new(extractor: FeatureExtractor, scoring: &ScoringConfig) -> Self {
        Self {
            extractor,
            weights: scoring.weights,
            threshold: scoring.threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn score(&self, features: &FeatureVector) -> f64 {
        let w = &self.weights;
        let flag = |on: bool, weight: f64| if on { weight } else { 0.0 };

        flag(features.has_amount, w.amount)
            + flag(features.has_confirmation, w.confirmation)
            + flag(features.has_subscription, w.subscription)
            + flag(features.has_attachment, w.attachment)
            + flag(features.is_invoice_or_receipt(), w.invoice_or_receipt)
            + w.lexical * features.lexical_score as f64
            + flag(features.known_sender, w.known_sender)
            + flag(features.has_order_number, w.order_number)
            + flag(features.mentions_payment, w.payment)
    }

    pub fn is_receipt_score(&self, score: f64) -> bool {
        score >= self.threshold
    }
}

impl ClassificationStrategy for WeightedScorer {
    fn name(&self) -> &'static str {
        "weighted_scorer"
    }

    fn is_receipt(&self, detail: &ConversationDetail) -> bool {
        let features = self.extractor.extract(detail);
        let score = self.score(&features);
        debug!(
            "Thread {} scored {:.2} (threshold {:.2})",
            detail.id, score, self.threshold
        );
        self.is_receipt_score(score)
    }
}

/// Runs strategies in order and stops at the first that says yes
pub struct ReceiptClassifier {
    strategies: Vec<Box<dyn ClassificationStrategy>>,
}

impl ReceiptClassifier {
    pub fn new(strategies: Vec<Box<dyn ClassificationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Rule gate first, then the weighted scorer
    pub fn standard(scoring: &ScoringConfig) -> Self {
        Self::with_extractor(FeatureExtractor::new(scoring), scoring)
    }

    pub fn with_extractor(extractor: FeatureExtractor, scoring: &ScoringConfig) -> Self {
        Self::new(vec![
            Box::new(RuleGate),
            Box::new(WeightedScorer::new(extractor, scoring)),
        ])
    }

    /// Name of the first strategy that accepts the thread
    pub fn decided_by(&self, detail: &ConversationDetail) -> Option<&'static str> {
        self.strategies
            .iter()
            .find(|strategy| strategy.is_receipt(detail))
            .map(|strategy| strategy.name())
    }

    pub fn classify(&self, detail: &ConversationDetail) -> ClassificationResult {
        let decided_by = self.decided_by(detail);
        if let Some(strategy) = decided_by {
            debug!("Thread {} accepted by {}", detail.id, strategy);
        }
        ClassificationResult {
            conversation_id: detail.id.clone(),
            is_receipt: decided_by.is_some(),
        }
    }
}

impl fmt::Debug for ReceiptClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("ReceiptClassifier")
            .field("strategies", &names)
            .finish()
    }
}
