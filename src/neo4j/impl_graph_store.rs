//! `GraphStore` implementation for `Neo4jClient`.
//!
//! Every method simply delegates to the corresponding inherent method on `Neo4jClient`.

use async_trait::async_trait;

use super::client::Neo4jClient;
use super::models::*;
use super::traits::GraphStore;

#[async_trait]
impl GraphStore for Neo4jClient {
    async fn run_query(&self, query: GraphQuery) -> anyhow::Result<Vec<Row>> {
        self.run_query(query).await
    }

    async fn traverse(&self, request: &TraversalRequest) -> anyhow::Result<TraversalResult> {
        self.traverse(request).await
    }

    async fn analyze_dependencies(
        &self,
        request: &DependencyAnalysisRequest,
    ) -> anyhow::Result<DependencyAnalysis> {
        self.analyze_dependencies(request).await
    }

    async fn health_check(&self) -> bool {
        self.health_check().await
    }
}
