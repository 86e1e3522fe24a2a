//! Gmail search query construction

use chrono::NaiveDate;

use crate::error::{LabelerError, Result};

/// Subject phrases that commonly mark a purchase
pub const RECEIPT_TERMS: &[&str] = &[
    "receipt",
    "order confirmation",
    "your order",
    "invoice",
    "purchase",
    "transaction",
    "payment",
];

/// Commerce senders matched by `from:`
pub const COMMON_SENDERS: &[&str] = &[
    "amazon.com",
    "paypal",
    "square",
    "stripe",
    "walmart",
    "target",
    "bestbuy",
    "newegg",
    "homedepot",
    "lowes",
    "uber",
    "doordash",
    "grubhub",
    "ubereats",
    "stubhub",
    "ticketmaster",
    "steam",
];

/// Cancellations, order-status, tracking and shipping notices
const EXCLUSIONS: &str = "-subject:(cancel -confirmed -cancellation -refund) -subject:\"order status\" \
-subject:(tracking -number -confirmed) -subject:(shipped -confirmation)";

/// Parse `YYYY-MM-DD` or `YYYY/MM/DD`
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let trimmed = input.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y/%m/%d"))
        .map_err(|_| {
            LabelerError::InvalidInput(format!(
                "Invalid date '{}': expected YYYY-MM-DD or YYYY/MM/DD",
                input
            ))
        })
}

fn optional_date(input: Option<&str>) -> Result<Option<NaiveDate>> {
    match input.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_date(value).map(Some),
    }
}

/// Build the thread search query for the given date window
///
/// The label name does not narrow the search; it is accepted so callers can
/// pass the whole request through unchanged.
pub fn build_query(
    _label_name: &str,
    start_date: Option<&str>,
    end_date: Option<&str>,
) -> Result<String> {
    let start = optional_date(start_date)?;
    let end = optional_date(end_date)?;

    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(LabelerError::InvalidInput(format!(
                "Start date {} is after end date {}",
                start, end
            )));
        }
    }

    let mut query = String::new();
    if let Some(start) = start {
        query.push_str(&format!("after:{} ", start.format("%Y-%m-%d")));
    }
    if let Some(end) = end {
        query.push_str(&format!("before:{} ", end.format("%Y-%m-%d")));
    }

    let subjects = RECEIPT_TERMS
        .iter()
        .map(|term| format!("subject:({})", term));
    let senders = COMMON_SENDERS
        .iter()
        .map(|sender| format!("from:({})", sender));
    let any_of: Vec<String> = subjects.chain(senders).collect();

    query.push_str(&format!("({})", any_of.join(" OR ")));
    query.push(' ');
    query.push_str(EXCLUSIONS);

    Ok(query)
}
