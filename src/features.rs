//! Feature extraction for receipt detection
//!
//! Everything here is derived from a thread's subject, snippet, From header and
//! attachment metadata. The only state that can outlive a single thread is the
//! optional [`CorpusStats`] accumulator, which is fed but never read back into
//! the score.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::config::ScoringConfig;
use crate::models::{ConversationDetail, FeatureVector, Message};

/// Currency amounts and labeled amounts ("Total: $12.00", "19.99 USD")
static AMOUNT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\$\d+\.\d{2}",
        r"(?i)total:?\s*\$?\d+\.\d{2}",
        r"(?i)amount:?\s*\$?\d+\.\d{2}",
        r"(?i)payment:?\s*\$?\d+\.\d{2}",
        r"(?i)paid:?\s*\$?\d+\.\d{2}",
        r"(?i)\d+\.\d{2}\s*usd",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Order/confirmation references and canonical purchase phrases
static CONFIRMATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)order\s*#?\s*\d+",
        r"(?i)confirmation\s*#?\s*\d+",
        r"(?i)transaction\s*#?\s*\d+",
        r"(?i)receipt\s*#?\s*\d+",
        r"(?i)\byour order\b",
        r"(?i)\border confirmation\b",
        r"(?i)\byour receipt\b",
        r"(?i)\bpayment received\b",
        r"(?i)\bthanks for (?:your )?order\b",
        r"(?i)\bthanks for (?:your )?purchase\b",
        r"(?i)\bpurchase confirmation\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Commerce/subscription sender domains and billing-style local parts
static KNOWN_SENDER_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"@amazon\.",
        r"@paypal\.",
        r"@uber\.",
        r"@doordash\.",
        r"@grubhub\.",
        r"payment@",
        r"receipt@",
        r"order@",
        r"invoice@",
        r"@native-instruments\.",
        r"@mrbill\.",
        r"@soundcloud\.",
        r"@kilohearts\.",
        r"@zoom\.",
        r"@ableton\.",
        r"@splice\.",
        r"@waves\.",
        r"@izotope\.",
        r"@pluginalliance\.",
        r"@arturia\.",
        r"@sweetwater\.",
        r"@reverb\.",
        r"@bandcamp\.",
        r"subscription",
        r"billing@",
        r"licenses@",
        r"licensing@",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).unwrap())
    .collect()
});

/// Loose single-signal patterns used by the weighted scorer
static SIGNAL_PATTERNS: Lazy<SignalPatterns> = Lazy::new(|| SignalPatterns {
    amount: Regex::new(r"\$\d+\.\d{2}").unwrap(),
    confirmation: Regex::new(r"(?i)order|confirmation|receipt").unwrap(),
    subscription: Regex::new(r"(?i)subscription|recurring|monthly|yearly|annual").unwrap(),
    download: Regex::new(r"(?i)download|license key|serial|activation").unwrap(),
    license: Regex::new(r"(?i)license|licensed|licensing").unwrap(),
    order_number: Regex::new(r"(?i)order\s*#|confirmation\s*#").unwrap(),
    payment: Regex::new(r"(?i)payment|paid|charge|invoice").unwrap(),
});

struct SignalPatterns {
    amount: Regex,
    confirmation: Regex,
    subscription: Regex,
    download: Regex,
    license: Regex,
    order_number: Regex,
    payment: Regex,
}

/// Domain terms whose density drives the lexical score
pub const RECEIPT_VOCABULARY: &[&str] = &[
    "total",
    "subtotal",
    "tax",
    "payment",
    "paid",
    "amount",
    "invoice",
    "receipt",
    "order",
    "purchase",
    "transaction",
    "confirmation",
    "authorized",
    "charged",
    "billing",
    "license",
    "activation",
    "subscription",
    "renewal",
];

static VOCABULARY: Lazy<HashSet<&'static str>> =
    Lazy::new(|| RECEIPT_VOCABULARY.iter().copied().collect());

const ATTACHMENT_MIME_TYPES: &[&str] = &["application/pdf", "image/jpeg", "image/png"];
const INVOICE_FILENAME_HINTS: &[&str] = &["invoice", "bill", "statement"];
const RECEIPT_FILENAME_HINTS: &[&str] = &["receipt", "order", "confirmation"];

/// Per-message evidence consumed by the rule-based gate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageSignals {
    pub amount_pattern: bool,
    pub reference_pattern: bool,
    pub known_sender: bool,
}

impl MessageSignals {
    pub fn of(message: &Message) -> Self {
        let text = message.combined_text().to_lowercase();
        Self {
            amount_pattern: AMOUNT_PATTERNS.iter().any(|p| p.is_match(&text)),
            reference_pattern: CONFIRMATION_PATTERNS.iter().any(|p| p.is_match(&text)),
            known_sender: is_known_sender(message.sender()),
        }
    }
}

pub fn is_known_sender(from: &str) -> bool {
    KNOWN_SENDER_PATTERNS.iter().any(|p| p.is_match(from))
}

/// Lower-cased ASCII word tokens of at least two characters
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| token.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

/// Share of tokens that belong to the receipt vocabulary, in [0, 1]
pub fn vocabulary_density(text: &str) -> f64 {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens
        .iter()
        .filter(|token| VOCABULARY.contains(token.as_str()))
        .count();
    hits as f64 / tokens.len() as f64
}

/// Density scaled to 0..=10 and rounded
pub fn scaled_lexical_score(text: &str) -> i64 {
    (vocabulary_density(text) * 10.0).round() as i64
}

/// Document frequencies across every text the extractor has seen
#[derive(Debug, Default)]
pub struct CorpusStats {
    inner: Mutex<CorpusState>,
}

#[derive(Debug, Default)]
struct CorpusState {
    document_frequencies: HashMap<String, usize>,
    total_documents: usize,
}

impl CorpusStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count each distinct token of `text` once
    pub fn observe(&self, text: &str) {
        let distinct: HashSet<String> = tokenize(text).into_iter().collect();
        let mut state = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.total_documents += 1;
        for token in distinct {
            *state.document_frequencies.entry(token).or_insert(0) += 1;
        }
    }

    pub fn document_frequency(&self, token: &str) -> usize {
        let state = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state
            .document_frequencies
            .get(&token.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    pub fn total_documents(&self) -> usize {
        let state = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.total_documents
    }
}

/// Builds [`FeatureVector`]s from thread content
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    attachment_bonus: i64,
    bonus_min_lexical: i64,
    corpus: Option<Arc<CorpusStats>>,
}

impl FeatureExtractor {
    pub fn new(scoring: &ScoringConfig) -> Self {
        Self {
            attachment_bonus: scoring.attachment_bonus,
            bonus_min_lexical: scoring.bonus_min_lexical,
            corpus: None,
        }
    }

    /// Feed every analyzed text into `corpus`
    pub fn with_corpus(mut self, corpus: Arc<CorpusStats>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    pub fn corpus(&self) -> Option<&Arc<CorpusStats>> {
        self.corpus.as_ref()
    }

    /// Signals are OR-ed across the thread. The lexical score is replaced by
    /// each message in turn, so the last message decides it, and the bonus
    /// only sees attachments from that message or earlier ones.
    pub fn extract(&self, detail: &ConversationDetail) -> FeatureVector {
        let mut features = FeatureVector::default();
        let patterns = &*SIGNAL_PATTERNS;

        for message in &detail.messages {
            for part in &message.attachment_parts {
                if !ATTACHMENT_MIME_TYPES.contains(&part.mime_type.to_lowercase().as_str()) {
                    continue;
                }
                features.has_attachment = true;

                let filename = part.filename.to_lowercase();
                if INVOICE_FILENAME_HINTS.iter().any(|h| filename.contains(h)) {
                    features.has_invoice_attachment = true;
                }
                if RECEIPT_FILENAME_HINTS.iter().any(|h| filename.contains(h)) {
                    features.has_receipt_attachment = true;
                }
            }

            let text = message.combined_text();
            let signals = MessageSignals::of(message);

            features.amount_pattern |= signals.amount_pattern;
            features.reference_pattern |= signals.reference_pattern;
            features.known_sender |= signals.known_sender;
            features.has_amount |= patterns.amount.is_match(&text);
            features.has_confirmation |= patterns.confirmation.is_match(&text);
            features.has_subscription |= patterns.subscription.is_match(&text);
            features.has_download |= patterns.download.is_match(&text);
            features.has_license |= patterns.license.is_match(&text);
            features.has_order_number |= patterns.order_number.is_match(&text);
            features.mentions_payment |= patterns.payment.is_match(&text);

            let mut lexical = scaled_lexical_score(&text);
            if features.has_attachment && lexical > self.bonus_min_lexical {
                lexical += self.attachment_bonus;
            }
            features.lexical_score = lexical;

            if let Some(corpus) = &self.corpus {
                corpus.observe(&text);
            }
        }

        features
    }
}
