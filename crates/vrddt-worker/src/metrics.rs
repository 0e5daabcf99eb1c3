//! Worker metrics.

use std::time::Duration;

use metrics::{counter, histogram};

pub mod names {
    /// Finished items by outcome.
    pub const ITEMS_TOTAL: &str = "vrddt_items_total";
    /// Failed items by error kind.
    pub const ITEM_ERRORS_TOTAL: &str = "vrddt_item_errors_total";
    pub const ITEM_DURATION_SECONDS: &str = "vrddt_item_duration_seconds";
}

pub fn record_outcome(outcome: &'static str, elapsed: Duration) {
    counter!(names::ITEMS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::ITEM_DURATION_SECONDS, "outcome" => outcome).record(elapsed.as_secs_f64());
}

pub fn record_error(kind: &'static str) {
    counter!(names::ITEM_ERRORS_TOTAL, "kind" => kind).increment(1);
}
