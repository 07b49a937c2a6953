//! Watermark bookkeeping for historical replay.

use chrono::{DateTime, FixedOffset};
use logtap_core::Watermark;

/// Builds successive historical queries and decides when replay is done.
///
/// Each round asks for entries strictly after the watermark. A round whose
/// bound equals the previous round's bound found nothing new, which is the
/// signal to switch to tailing.
#[derive(Debug, Clone)]
pub struct HistoryCursor {
    watermark: Watermark,
    user_filter: Option<String>,
    last_bound: Option<String>,
}

impl HistoryCursor {
    pub fn new(start: Watermark, user_filter: Option<String>) -> Self {
        Self {
            watermark: start,
            user_filter: user_filter.filter(|f| !f.trim().is_empty()),
            last_bound: None,
        }
    }

    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    /// The watermark-only part of the next query.
    pub fn bound(&self) -> String {
        format!("timestamp > \"{}\"", self.watermark.to_rfc3339())
    }

    /// The full filter for the next round, or `None` once replay is exhausted.
    pub fn next_filter(&mut self) -> Option<String> {
        let bound = self.bound();
        if self.last_bound.as_deref() == Some(bound.as_str()) {
            return None;
        }
        let filter = combine_filters(&bound, self.user_filter.as_deref());
        self.last_bound = Some(bound);
        Some(filter)
    }

    /// Record an entry's own timestamp. Returns true if the watermark moved.
    pub fn observe(&mut self, entry_time: DateTime<FixedOffset>) -> bool {
        self.watermark.advance(entry_time)
    }
}

/// AND the user's filter onto `bound`, parenthesised so its own ORs stay scoped.
pub fn combine_filters(bound: &str, user_filter: Option<&str>) -> String {
    match user_filter.map(str::trim).filter(|f| !f.is_empty()) {
        Some(user) => format!("{bound} AND ({user})"),
        None => bound.to_string(),
    }
}
