//! Query metrics sinks
//!
//! The service reports one [`QuerySample`] per call: fresh queries, cache hits
//! and failures (including validation failures) alike.

use super::models::QueryOperation;
use serde::Serialize;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuerySample {
    pub operation: QueryOperation,
    pub duration_ms: u64,
    pub result_count: usize,
    pub cache_hit: bool,
    /// Machine error code when the call failed
    pub error: Option<&'static str>,
    /// Depth searched, for operations that have one
    pub depth: Option<u32>,
}

pub trait QueryMetrics: Send + Sync {
    fn record(&self, sample: &QuerySample);
}

/// Logs each sample at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl QueryMetrics for TracingMetrics {
    fn record(&self, sample: &QuerySample) {
        match sample.error {
            Some(code) => tracing::debug!(
                "query {} failed with {} after {}ms",
                sample.operation,
                code,
                sample.duration_ms
            ),
            None => tracing::debug!(
                "query {} returned {} results in {}ms (cache_hit={}, depth={:?})",
                sample.operation,
                sample.result_count,
                sample.duration_ms,
                sample.cache_hit,
                sample.depth
            ),
        }
    }
}

/// Keeps every sample in memory
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    samples: Mutex<Vec<QuerySample>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<QuerySample> {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn cache_hits(&self) -> usize {
        self.samples().iter().filter(|s| s.cache_hit).count()
    }

    pub fn errors(&self) -> usize {
        self.samples().iter().filter(|s| s.error.is_some()).count()
    }
}

impl QueryMetrics for InMemoryMetrics {
    fn record(&self, sample: &QuerySample) {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(sample.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_metrics_counts() {
        let metrics = InMemoryMetrics::new();
        let base = QuerySample {
            operation: QueryOperation::Path,
            duration_ms: 3,
            result_count: 2,
            cache_hit: false,
            error: None,
            depth: Some(5),
        };
        metrics.record(&base);
        metrics.record(&QuerySample {
            cache_hit: true,
            ..base.clone()
        });
        metrics.record(&QuerySample {
            error: Some("TIMEOUT"),
            result_count: 0,
            ..base
        });

        assert_eq!(metrics.samples().len(), 3);
        assert_eq!(metrics.cache_hits(), 1);
        assert_eq!(metrics.errors(), 1);
    }
}
