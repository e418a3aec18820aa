//! Trace identifiers for build sessions and tracing-subscriber setup
//!
//! Every [`TxBuilder`](crate::tx_builder::TxBuilder) session owns a
//! [`TraceContext`]. Draining, evaluation and submission each log under a
//! child span of it, and a chained build continues under a follow-up trace
//! sharing the correlation id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

/// Correlation ID shared by a session and every transaction chained from it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceContext {
    /// Identifier of the whole build session
    pub trace_id: String,

    /// Identifier of this stage of the session
    pub span_id: String,

    pub correlation_id: CorrelationId,

    pub parent_span_id: Option<String>,

    pub operation: String,

    pub started_at: DateTime<Utc>,
}

impl TraceContext {
    pub fn new(operation: &str) -> Self {
        Self {
            trace_id: Uuid::new_v4().to_string(),
            span_id: Uuid::new_v4().to_string(),
            correlation_id: CorrelationId::new(),
            parent_span_id: None,
            operation: operation.to_string(),
            started_at: Utc::now(),
        }
    }

    /// Same trace, new span
    pub fn child_span(&self, operation: &str) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: Uuid::new_v4().to_string(),
            correlation_id: self.correlation_id.clone(),
            parent_span_id: Some(self.span_id.clone()),
            operation: operation.to_string(),
            started_at: Utc::now(),
        }
    }

    /// New trace that keeps the correlation id, used when chaining transactions
    pub fn follow_up(&self, operation: &str) -> Self {
        Self {
            correlation_id: self.correlation_id.clone(),
            ..Self::new(operation)
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new("session")
    }
}

/// Install a global subscriber honouring `RUST_LOG`, falling back to `filter`
pub fn init_tracing(json: bool, filter: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(filter))?;
    let builder = fmt().with_env_filter(env_filter).with_target(true);
    if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_span_keeps_trace() {
        let root = TraceContext::new("session");
        let child = root.child_span("drain");
        assert_eq!(child.trace_id(), root.trace_id());
        assert_eq!(child.parent_span_id.as_deref(), Some(root.span_id()));
        assert_ne!(child.span_id(), root.span_id());
        assert_eq!(child.correlation_id(), root.correlation_id());
    }

    #[test]
    fn test_follow_up_keeps_correlation_only() {
        let root = TraceContext::new("session");
        let next = root.follow_up("chained");
        assert_ne!(next.trace_id(), root.trace_id());
        assert_eq!(next.correlation_id(), root.correlation_id());
        assert!(next.parent_span_id.is_none());
    }
}
