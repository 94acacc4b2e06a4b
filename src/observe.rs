//! Diagnostic sinks for HVG selection.
//!
//! Selection emits notices (ignored cutoffs, clamped `n_top_genes`, single-gene
//! bins, non-integer counts) through an [`Observer`] handed in by the caller.
//! [`LogObserver`] forwards to the `log` facade; [`CollectingObserver`] keeps
//! the messages in memory.

use log::Level;
use std::sync::Mutex;

/// Receives diagnostic messages emitted during a selection run.
pub trait Observer: Send + Sync {
    /// Handle one message at the given severity.
    fn event(&self, level: Level, message: &str);

    fn warn(&self, message: &str) {
        self.event(Level::Warn, message);
    }

    fn info(&self, message: &str) {
        self.event(Level::Info, message);
    }

    fn debug(&self, message: &str) {
        self.event(Level::Debug, message);
    }
}

/// Forwards every message to the `log` crate under the `composable_hvg` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn event(&self, level: Level, message: &str) {
        log::log!(target: "composable_hvg", level, "{}", message);
    }
}

/// Records messages for later inspection.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<(Level, String)>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded messages in emission order.
    pub fn events(&self) -> Vec<(Level, String)> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Recorded messages at exactly `level`.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }

    /// Whether any message at `level` contains `needle`.
    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.messages_at(level).iter().any(|m| m.contains(needle))
    }
}

impl Observer for CollectingObserver {
    fn event(&self, level: Level, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push((level, message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_observer_records_levels() {
        let obs = CollectingObserver::new();
        obs.warn("clamped");
        obs.info("starting");
        obs.debug("bin 3");

        assert_eq!(obs.events().len(), 3);
        assert_eq!(obs.messages_at(Level::Warn), vec!["clamped".to_string()]);
        assert!(obs.contains(Level::Debug, "bin"));
        assert!(!obs.contains(Level::Warn, "bin"));
    }

    #[test]
    fn test_log_observer_is_silent_without_logger() {
        // No logger installed: forwarding must not panic.
        LogObserver.warn("nothing listens");
    }
}
