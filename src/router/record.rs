use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use log::debug;

use serde::Serialize;

use crate::{handlers::RequestHandler, request::HttpRequest, response::HttpResponse};

/// Whether a record may be swapped out at runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Mutability {
    Immutable,
    Replaceable,
}

/// One registered handler plus its runtime state.
pub struct HandlerRecord {
    handler: Arc<dyn RequestHandler>,
    mutability: Mutability,
    enabled: AtomicBool,
    success_count: AtomicU64,
    fail_count: AtomicU64,
    live_calls: AtomicUsize,
}

impl HandlerRecord {
    pub(super) fn new(handler: Arc<dyn RequestHandler>, mutability: Mutability) -> Self {
        Self {
            handler,
            mutability,
            enabled: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            fail_count: AtomicU64::new(0),
            live_calls: AtomicUsize::new(0),
        }
    }

    pub fn handler(&self) -> &Arc<dyn RequestHandler> {
        &self.handler
    }

    pub fn mutability(&self) -> Mutability {
        self.mutability
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub(super) fn set_enabled(&self, on: bool) {
        self.enabled.store(on, Ordering::Release);
    }

    pub fn success_count(&self) -> u64 {
        self.success_count.load(Ordering::Relaxed)
    }

    pub fn fail_count(&self) -> u64 {
        self.fail_count.load(Ordering::Relaxed)
    }

    /// Number of calls currently executing inside this handler.
    pub fn live_calls(&self) -> usize {
        self.live_calls.load(Ordering::Acquire)
    }
}

/// Scoped marker for one call executing inside a handler.
///
/// Acquired by the table while its read lock is held and released on drop,
/// so the count also falls when the call panics or its future is dropped.
pub struct LiveCall {
    record: Arc<HandlerRecord>,
}

impl LiveCall {
    pub(super) fn enter(record: Arc<HandlerRecord>) -> Self {
        record.live_calls.fetch_add(1, Ordering::AcqRel);
        Self { record }
    }

    pub fn record(&self) -> &HandlerRecord {
        &self.record
    }

    pub fn describe(&self) -> String {
        self.record.handler.describe()
    }

    /// Run the handler and count its reported outcome.
    pub async fn call(self, request: &HttpRequest<'_>) -> anyhow::Result<HttpResponse> {
        let result = self.record.handler.call(request).await;

        match &result {
            Ok(_) => {
                self.record.success_count.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                debug!("handler {} failed: {:#}", self.describe(), err);
                self.record.fail_count.fetch_add(1, Ordering::Relaxed);
            }
        }

        result
    }
}

impl Drop for LiveCall {
    fn drop(&mut self) {
        self.record.live_calls.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HandlerStatus {
    pub method: &'static str,
    pub pattern: String,
    pub description: String,
    pub mutability: Mutability,
    pub enabled: bool,
    pub success_count: u64,
    pub fail_count: u64,
    pub live_calls: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::handlers::tests::FixedHandler;

    fn record() -> Arc<HandlerRecord> {
        Arc::new(HandlerRecord::new(
            Arc::new(FixedHandler::new("fixed")),
            Mutability::Replaceable,
        ))
    }

    #[test]
    fn test_live_call_released_on_drop() {
        let record = record();

        let first = LiveCall::enter(Arc::clone(&record));
        let second = LiveCall::enter(Arc::clone(&record));
        assert_eq!(record.live_calls(), 2);

        drop(first);
        assert_eq!(record.live_calls(), 1);

        drop(second);
        assert_eq!(record.live_calls(), 0);
    }

    #[tokio::test]
    async fn test_call_counts_outcome() {
        let record = record();
        let request = HttpRequest::new("GET", "/");

        let response = LiveCall::enter(Arc::clone(&record))
            .call(&request)
            .await
            .unwrap();
        assert_eq!(response.body().as_deref(), Some("fixed"));
        assert_eq!(record.success_count(), 1);
        assert_eq!(record.fail_count(), 0);
        assert_eq!(record.live_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_call_counts_failure() {
        let record = Arc::new(HandlerRecord::new(
            Arc::new(FixedHandler::failing("broken")),
            Mutability::Replaceable,
        ));
        let request = HttpRequest::new("GET", "/");

        let result = LiveCall::enter(Arc::clone(&record)).call(&request).await;
        assert!(result.is_err());
        assert_eq!(record.success_count(), 0);
        assert_eq!(record.fail_count(), 1);
        assert_eq!(record.live_calls(), 0);
    }
}
