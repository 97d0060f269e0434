//! Notice sink trait and implementations.

use std::sync::{Arc, Mutex};

use super::Notice;

/// Trait for surfacing notices to the user.
///
/// # Design Rules
///
/// - `notify()` must be fast and non-blocking
/// - Failure to display a notice must not affect the operation that raised it
pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// No-op implementation for contexts without a user surface.
#[derive(Clone, Default)]
pub struct NoOpNoticeSink;

impl NoticeSink for NoOpNoticeSink {
    fn notify(&self, _notice: Notice) {}
}

/// Mock sink for testing - collects notices.
#[derive(Clone, Default)]
pub struct MockNoticeSink {
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl MockNoticeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected notices.
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    /// Returns only the error notices.
    pub fn errors(&self) -> Vec<Notice> {
        self.notices().into_iter().filter(Notice::is_error).collect()
    }

    pub fn clear(&self) {
        self.notices.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.notices.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notices.lock().unwrap().is_empty()
    }
}

impl NoticeSink for MockNoticeSink {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_sink_does_not_panic() {
        NoOpNoticeSink.notify(Notice::error("boom"));
    }

    #[test]
    fn test_mock_sink_collects_notices() {
        let sink = MockNoticeSink::new();
        assert!(sink.is_empty());

        sink.notify(Notice::success("Saved"));
        sink.notify(Notice::error("Failed to save"));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.errors(), vec![Notice::error("Failed to save")]);

        sink.clear();
        assert!(sink.is_empty());
    }
}
