//! Structured per-item logging and subscriber setup.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: JSON when `LOG_FORMAT=json`, ANSI otherwise.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in [
        "vrddt_worker=info",
        "vrddt_coordinator=info",
        "vrddt_media=info",
        "vrddt_queue=info",
        "vrddt_store=info",
        "vrddt_storage=info",
        "lapin=warn",
    ] {
        if let Ok(d) = directive.parse() {
            env_filter = env_filter.add_directive(d);
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }
}

/// Logger carrying the item id and operation on every event.
#[derive(Debug, Clone)]
pub struct ItemLogger {
    item_id: String,
    operation: String,
}

impl ItemLogger {
    pub fn new(item_id: &str, operation: &str) -> Self {
        Self {
            item_id: item_id.to_string(),
            operation: operation.to_string(),
        }
    }

    pub fn log_start(&self, message: &str) {
        info!(item_id = %self.item_id, operation = %self.operation, "Item started: {}", message);
    }

    pub fn log_progress(&self, message: &str) {
        info!(item_id = %self.item_id, operation = %self.operation, "Item progress: {}", message);
    }

    pub fn log_warning(&self, message: &str) {
        warn!(item_id = %self.item_id, operation = %self.operation, "Item warning: {}", message);
    }

    pub fn log_error(&self, message: &str) {
        error!(item_id = %self.item_id, operation = %self.operation, "Item error: {}", message);
    }

    pub fn log_completion(&self, message: &str) {
        info!(item_id = %self.item_id, operation = %self.operation, "Item completed: {}", message);
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    pub fn span(&self) -> Span {
        tracing::info_span!("item", item_id = %self.item_id, operation = %self.operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_logger() {
        let logger = ItemLogger::new("abc", "convert");
        assert_eq!(logger.item_id(), "abc");
    }
}
