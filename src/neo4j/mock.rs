//! In-memory mock implementation of GraphStore for testing.
//!
//! Serves canned responses (query rows by query name, one traversal result,
//! one dependency analysis) from `tokio::sync::RwLock` slots, records every
//! request it receives, and can be told to fail or to never answer.
//! Conditionally compiled with `#[cfg(test)]`.

use crate::neo4j::models::*;
use crate::neo4j::traits::GraphStore;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory mock implementation of GraphStore for testing.
pub struct MockGraphStore {
    // Canned responses
    pub query_rows: RwLock<HashMap<String, Vec<Row>>>,
    pub traversal: RwLock<TraversalResult>,
    pub dependency_analysis: RwLock<DependencyAnalysis>,

    // Recorded requests
    pub executed_queries: RwLock<Vec<GraphQuery>>,
    pub traversal_requests: RwLock<Vec<TraversalRequest>>,
    pub analysis_requests: RwLock<Vec<DependencyAnalysisRequest>>,

    // Behaviour switches
    pub failure: RwLock<Option<String>>,
    pub hang: AtomicBool,
    pub healthy: AtomicBool,
    pub store_calls: AtomicUsize,
}

impl Default for MockGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGraphStore {
    /// Create a new empty, healthy MockGraphStore.
    pub fn new() -> Self {
        Self {
            query_rows: RwLock::new(HashMap::new()),
            traversal: RwLock::new(TraversalResult::default()),
            dependency_analysis: RwLock::new(DependencyAnalysis::default()),
            executed_queries: RwLock::new(Vec::new()),
            traversal_requests: RwLock::new(Vec::new()),
            analysis_requests: RwLock::new(Vec::new()),
            failure: RwLock::new(None),
            hang: AtomicBool::new(false),
            healthy: AtomicBool::new(true),
            store_calls: AtomicUsize::new(0),
        }
    }

    // ========================================================================
    // Builder / seeding methods for tests
    // ========================================================================

    /// Rows returned for every query with the given name.
    pub async fn with_rows(self, query_name: &str, rows: Vec<serde_json::Value>) -> Self {
        let rows = rows
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect();
        self.query_rows
            .write()
            .await
            .insert(query_name.to_string(), rows);
        self
    }

    /// Result returned by every traversal.
    pub async fn with_traversal(self, traversal: TraversalResult) -> Self {
        *self.traversal.write().await = traversal;
        self
    }

    /// Result returned by every dependency analysis.
    pub async fn with_dependency_analysis(self, analysis: DependencyAnalysis) -> Self {
        *self.dependency_analysis.write().await = analysis;
        self
    }

    /// Make every store call fail with the given message.
    pub async fn failing_with(self, message: &str) -> Self {
        *self.failure.write().await = Some(message.to_string());
        self
    }

    /// Make every store call wait forever.
    pub fn hanging(self) -> Self {
        self.hang.store(true, Ordering::SeqCst);
        self
    }

    /// Make `health_check` report an unhealthy store.
    pub fn unhealthy(self) -> Self {
        self.healthy.store(false, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.store_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> Result<()> {
        self.store_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(message) = self.failure.read().await.clone() {
            anyhow::bail!("{}", message);
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for MockGraphStore {
    async fn run_query(&self, query: GraphQuery) -> Result<Vec<Row>> {
        self.executed_queries.write().await.push(query.clone());
        self.enter().await?;
        Ok(self
            .query_rows
            .read()
            .await
            .get(query.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn traverse(&self, request: &TraversalRequest) -> Result<TraversalResult> {
        self.traversal_requests.write().await.push(request.clone());
        self.enter().await?;
        let mut result = self.traversal.read().await.clone();
        if let Some(limit) = request.limit {
            result.nodes.truncate(limit);
        }
        Ok(result)
    }

    async fn analyze_dependencies(
        &self,
        request: &DependencyAnalysisRequest,
    ) -> Result<DependencyAnalysis> {
        self.analysis_requests.write().await.push(request.clone());
        self.enter().await?;
        Ok(self.dependency_analysis.read().await.clone())
    }

    async fn health_check(&self) -> bool {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.healthy.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_rows_by_query_name() {
        let store = MockGraphStore::new()
            .with_rows("files", vec![serde_json::json!({"path": "src/a.rs"})])
            .await;

        let rows = store
            .run_query(GraphQuery::new("files", "MATCH (f:File) RETURN f.path AS path"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["path"], "src/a.rs");

        let other = store
            .run_query(GraphQuery::new("other", "RETURN 1"))
            .await
            .unwrap();
        assert!(other.is_empty());
        assert_eq!(store.executed_queries.read().await.len(), 2);
        assert_eq!(store.calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let store = MockGraphStore::new().failing_with("boom").await;
        let err = store
            .run_query(GraphQuery::new("q", "RETURN 1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[tokio::test]
    async fn test_mock_health() {
        assert!(MockGraphStore::new().health_check().await);
        assert!(!MockGraphStore::new().unhealthy().health_check().await);
    }
}
