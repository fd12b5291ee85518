use crate::guard::PurgeGuard;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info_span, Span};

static CONTEXT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub fn next_request_id() -> u64 {
    CONTEXT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// One external triggering context: an incoming request, a CLI run, a batch
/// of fan-out events. Owns the guard that collapses repeated auto-purges.
///
/// Build a fresh one per request in a long-running host; a short-lived
/// process can build one at startup.
#[derive(Debug)]
pub struct TriggerContext {
    request_id: u64,
    source: String,
    guard: PurgeGuard,
    span: Span,
}

impl TriggerContext {
    pub fn new(source: &str) -> Self {
        let request_id = next_request_id();
        let span = info_span!("trigger", request_id = request_id, source = source);
        Self {
            request_id,
            source: source.to_string(),
            guard: PurgeGuard::new(),
            span,
        }
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn guard(&self) -> &PurgeGuard {
        &self.guard
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

/// Logs how long a purge stage took once dropped.
pub struct StageTimer {
    start: Instant,
    span: Span,
}

impl StageTimer {
    pub fn new(stage: &'static str) -> Self {
        let span = info_span!(
            "stage",
            stage = stage,
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );
        Self {
            start: Instant::now(),
            span,
        }
    }

    pub fn fail(self, error: &str) {
        self.span.record("status", "fail");
        let _enter = self.span.enter();
        tracing::error!(error = error, "stage failed");
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        let duration_ms = self.start.elapsed().as_millis() as u64;
        let _enter = self.span.enter();
        self.span.record("duration_ms", duration_ms);
        tracing::debug!(duration_ms = duration_ms, "stage finished");
    }
}
