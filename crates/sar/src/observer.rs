//! Fit progress reporting
//!
//! The core keeps no global state for progress; callers hand an observer to
//! [`Sar::with_observer`](crate::model::Sar::with_observer) instead.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FitStage {
    Indexing,
    Affinity,
    Cooccurrence,
    Similarity,
}

impl FitStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitStage::Indexing => "indexing",
            FitStage::Affinity => "affinity",
            FitStage::Cooccurrence => "cooccurrence",
            FitStage::Similarity => "similarity",
        }
    }
}

/// Receives fit stage events. All methods default to no-ops.
pub trait FitObserver: Send + Sync {
    fn stage_started(&self, _stage: FitStage) {}

    fn stage_finished(&self, _stage: FitStage, _elapsed: Duration, _nnz: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl FitObserver for NoopObserver {}

/// Forwards stage events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl FitObserver for TracingObserver {
    fn stage_started(&self, stage: FitStage) {
        tracing::debug!(stage = stage.as_str(), "SAR fit stage started");
    }

    fn stage_finished(&self, stage: FitStage, elapsed: Duration, nnz: usize) {
        tracing::info!(
            stage = stage.as_str(),
            elapsed_ms = elapsed.as_millis() as u64,
            nnz,
            "SAR fit stage finished"
        );
    }
}
