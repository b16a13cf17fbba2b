//! GraphStore trait definition
//!
//! The abstract contract the query layer needs from a graph database:
//! parameterized query execution, relationship-typed traversal with
//! depth/node limits, and aggregate dependency analysis. `Neo4jClient`
//! implements it over Bolt; `MockGraphStore` implements it in memory for tests.

use crate::neo4j::models::*;
use anyhow::Result;
use async_trait::async_trait;

/// Abstract interface for graph database reads used by the query service.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute a parameterized query and return one [`Row`] per result record,
    /// holding the columns listed in `query.columns`.
    async fn run_query(&self, query: GraphQuery) -> Result<Vec<Row>>;

    /// Explore outward from `request.start` along the given relationship
    /// types, bounded by `depth` hops and `limit` distinct nodes.
    ///
    /// The start node is part of the returned node set when it exists.
    async fn traverse(&self, request: &TraversalRequest) -> Result<TraversalResult>;

    /// Aggregate the dependencies (or dependents) of a target entity,
    /// including the store's impact score.
    async fn analyze_dependencies(
        &self,
        request: &DependencyAnalysisRequest,
    ) -> Result<DependencyAnalysis>;

    /// Returns true when the database answers a trivial query.
    async fn health_check(&self) -> bool;
}
