//! Structured log events of a build session

use crate::assets::Assets;
use crate::observability::TraceContext;

/// Emits the pipeline's log lines, all tagged with the session's trace id
#[derive(Debug, Clone)]
pub struct BuildLogger {
    trace_id: String,
    correlation_id: String,
}

impl BuildLogger {
    pub fn new(trace: &TraceContext) -> Self {
        Self {
            trace_id: trace.trace_id().to_string(),
            correlation_id: trace.correlation_id().to_string(),
        }
    }

    pub fn log_stage_enqueued(&self, label: &str, queued: usize) {
        tracing::debug!(
            trace_id = %self.trace_id,
            stage = %label,
            queued = %queued,
            "Stage enqueued"
        );
    }

    pub fn log_transition(&self, state: &str) {
        tracing::debug!(trace_id = %self.trace_id, state = %state, "Completion state");
    }

    pub fn log_drain(&self, span: &TraceContext, programs: usize, mutations: usize, latency_ms: u64) {
        tracing::debug!(
            trace_id = %self.trace_id,
            span_id = %span.span_id(),
            parent_span_id = ?span.parent_span_id,
            programs = %programs,
            mutations = %mutations,
            latency_ms = %latency_ms,
            "Deferred programs drained"
        );
    }

    pub fn log_selection(&self, selected: usize, available: usize, attempt: u32) {
        tracing::debug!(
            trace_id = %self.trace_id,
            selected = %selected,
            available = %available,
            attempt = %attempt,
            "Coin selection"
        );
    }

    pub fn log_collateral(&self, inputs: usize, posted: u64) {
        tracing::debug!(
            trace_id = %self.trace_id,
            inputs = %inputs,
            posted = %posted,
            "Collateral planned"
        );
    }

    pub fn log_fee_iteration(&self, iteration: u32, size: usize, fee: u64, required: u64) {
        tracing::debug!(
            trace_id = %self.trace_id,
            iteration = %iteration,
            size = %size,
            fee = %fee,
            required = %required,
            "Fee iteration"
        );
    }

    pub fn log_evaluation(&self, span: &TraceContext, redeemers: usize, mem: u64, steps: u64, local: bool) {
        tracing::info!(
            trace_id = %self.trace_id,
            span_id = %span.span_id(),
            parent_span_id = ?span.parent_span_id,
            redeemers = %redeemers,
            mem = %mem,
            steps = %steps,
            local = %local,
            "Scripts evaluated"
        );
    }

    pub fn log_build_success(&self, tx_hash: &str, fee: u64, size: usize, change: &Assets, latency_ms: u64) {
        tracing::info!(
            trace_id = %self.trace_id,
            correlation_id = %self.correlation_id,
            tx_hash = %tx_hash,
            fee = %fee,
            size = %size,
            change = %change,
            latency_ms = %latency_ms,
            "Transaction built"
        );
    }

    pub fn log_build_failure(&self, category: &str, error: &str, latency_ms: u64) {
        tracing::warn!(
            trace_id = %self.trace_id,
            correlation_id = %self.correlation_id,
            category = %category,
            error = %error,
            latency_ms = %latency_ms,
            "Transaction build failed"
        );
    }

    /// `span` is the submission's child of the session span
    pub fn log_submit(&self, span: &TraceContext, tx_hash: &str, success: bool, error: Option<&str>) {
        if success {
            tracing::info!(
                trace_id = %self.trace_id,
                span_id = %span.span_id(),
                correlation_id = %self.correlation_id,
                tx_hash = %tx_hash,
                "Transaction submitted"
            );
        } else {
            tracing::warn!(
                trace_id = %self.trace_id,
                span_id = %span.span_id(),
                correlation_id = %self.correlation_id,
                tx_hash = %tx_hash,
                error = ?error,
                "Transaction submission failed"
            );
        }
    }
}
