//! Progress-callback trait for per-stage chain events.
//!
//! Inject an [`Arc<dyn ChainProgressCallback>`] via
//! [`crate::config::ChainConfigBuilder::progress_callback`] to receive events
//! as the chain moves through its model calls. Callers can forward events to
//! a terminal spinner, a log line or a channel; the library does not care.
//!
//! # Example
//!
//! ```rust
//! use scan2json::{ChainConfig, ChainProgressCallback, TaskKind};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ChainProgressCallback for CountingCallback {
//!     fn on_stage_complete(&self, stage: TaskKind, _index: usize, _total: usize, _output_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{stage} done");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//! let config = ChainConfig::builder()
//!     .progress_callback(counter as Arc<dyn ChainProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::prompts::TaskKind;
use std::time::Duration;
use std::sync::Arc;

/// Called by the chain controller as it runs each stage.
///
/// Stages run strictly one after another, but a server shares one
/// controller across requests, so implementations must be `Send + Sync`.
/// All methods default to no-ops.
pub trait ChainProgressCallback: Send + Sync {
    /// Called once before the first stage.
    fn on_chain_start(&self, total_stages: usize) {
        let _ = total_stages;
    }

    /// Called just before the first attempt of a stage (1-indexed `index`).
    fn on_stage_start(&self, stage: TaskKind, index: usize, total_stages: usize) {
        let _ = (stage, index, total_stages);
    }

    /// Called when the rate limiter or a retry backoff holds a stage back.
    fn on_stage_wait(&self, stage: TaskKind, wait: Duration) {
        let _ = (stage, wait);
    }

    /// Called when a stage produced a reply.
    fn on_stage_complete(&self, stage: TaskKind, index: usize, total_stages: usize, output_len: usize) {
        let _ = (stage, index, total_stages, output_len);
    }

    /// Called when a stage failed for good; the chain halts afterwards.
    fn on_stage_error(&self, stage: TaskKind, index: usize, total_stages: usize, error: &str) {
        let _ = (stage, index, total_stages, error);
    }

    /// Called once after the chain finished or halted.
    fn on_chain_complete(&self, total_stages: usize, completed_stages: usize) {
        let _ = (total_stages, completed_stages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ChainProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ChainConfig`].
pub type ProgressCallback = Arc<dyn ChainProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        starts: AtomicUsize,
        completes: AtomicUsize,
        errors: Mutex<Vec<String>>,
    }

    impl ChainProgressCallback for TrackingCallback {
        fn on_stage_start(&self, _stage: TaskKind, _index: usize, _total: usize) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_complete(&self, _stage: TaskKind, _index: usize, _total: usize, _len: usize) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_stage_error(&self, stage: TaskKind, _index: usize, _total: usize, error: &str) {
            self.errors.lock().unwrap().push(format!("{stage}: {error}"));
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_chain_start(2);
        cb.on_stage_start(TaskKind::StitchedPassageOcr, 1, 2);
        cb.on_stage_wait(TaskKind::VocabularyAnalysis, Duration::from_secs(10));
        cb.on_stage_complete(TaskKind::StitchedPassageOcr, 1, 2, 42);
        cb.on_stage_error(TaskKind::VocabularyAnalysis, 2, 2, "boom");
        cb.on_chain_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_stage_start(TaskKind::QuestionOcr, 1, 4);
        tracker.on_stage_complete(TaskKind::QuestionOcr, 1, 4, 120);
        tracker.on_stage_start(TaskKind::AnswerOcr, 2, 4);
        tracker.on_stage_error(TaskKind::AnswerOcr, 2, 4, "timed out");

        assert_eq!(tracker.starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(
            tracker.errors.lock().unwrap().as_slice(),
            ["answer-ocr: timed out"]
        );
    }
}
