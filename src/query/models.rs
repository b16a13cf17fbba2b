//! Validated queries and result envelopes for the graph query service

use crate::neo4j::models::{EntityRef, RelationshipType};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Operations
// ============================================================================

/// The four query operations exposed by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOperation {
    Dependencies,
    Dependents,
    Path,
    Architecture,
}

impl QueryOperation {
    /// Short code prefixed to cache keys
    pub fn code(&self) -> &'static str {
        match self {
            QueryOperation::Dependencies => "dep",
            QueryOperation::Dependents => "dnt",
            QueryOperation::Path => "path",
            QueryOperation::Architecture => "arch",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QueryOperation::Dependencies => "get_dependencies",
            QueryOperation::Dependents => "get_dependents",
            QueryOperation::Path => "get_path",
            QueryOperation::Architecture => "get_architecture",
        }
    }
}

impl fmt::Display for QueryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Validated queries
// ============================================================================

/// Forward dependency query, immutable once validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyQuery {
    pub entity: EntityRef,
    pub depth: u32,
    pub include_transitive: bool,
    pub include_cross_repo: bool,
}

/// Reverse dependency query, immutable once validated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependentQuery {
    pub entity: EntityRef,
    pub depth: u32,
    pub include_transitive: bool,
    pub include_cross_repo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathQuery {
    pub from_entity: EntityRef,
    pub to_entity: EntityRef,
    pub max_hops: u32,
    /// Sorted and deduplicated
    pub relationship_types: Vec<RelationshipType>,
}

/// Granularity of an architecture overview. Each level is finer than the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    Packages,
    Modules,
    Files,
    Entities,
}

impl DetailLevel {
    pub const ALL: [DetailLevel; 4] = [
        DetailLevel::Packages,
        DetailLevel::Modules,
        DetailLevel::Files,
        DetailLevel::Entities,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DetailLevel::Packages => "packages",
            DetailLevel::Modules => "modules",
            DetailLevel::Files => "files",
            DetailLevel::Entities => "entities",
        }
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchitectureQuery {
    pub repository: String,
    pub scope: Option<String>,
    pub detail_level: DetailLevel,
}

// ============================================================================
// Result metadata
// ============================================================================

/// Timing and cache provenance, stamped on the copy returned to the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTiming {
    pub query_time_ms: u64,
    pub from_cache: bool,
}

/// Implemented by every result envelope so the service can run one
/// cache/timeout skeleton for all operations.
pub trait QueryOutput: Clone + Send + Sync + 'static {
    fn timing_mut(&mut self) -> &mut QueryTiming;

    /// Number of items reported to metrics
    fn result_count(&self) -> usize;
}

// ============================================================================
// Dependencies / dependents
// ============================================================================

/// One dependency or dependent of the queried entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyItem {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub path: String,
    pub relationship_type: String,
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyMetadata {
    #[serde(flatten)]
    pub timing: QueryTiming,
    pub depth_searched: u32,
    pub include_transitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyResult {
    pub entity: EntityRef,
    pub dependencies: Vec<DependencyItem>,
    pub total_count: usize,
    pub metadata: DependencyMetadata,
}

impl QueryOutput for DependencyResult {
    fn timing_mut(&mut self) -> &mut QueryTiming {
        &mut self.metadata.timing
    }

    fn result_count(&self) -> usize {
        self.total_count
    }
}

/// Blast radius of a change to the queried entity, as scored by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAnalysis {
    pub direct_impact_count: usize,
    pub transitive_impact_count: usize,
    pub impact_score: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependentMetadata {
    #[serde(flatten)]
    pub timing: QueryTiming,
    pub depth_searched: u32,
    pub repositories_searched: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependentResult {
    pub entity: EntityRef,
    pub dependents: Vec<DependencyItem>,
    pub total_count: usize,
    pub impact_analysis: ImpactAnalysis,
    pub metadata: DependentMetadata,
}

impl QueryOutput for DependentResult {
    fn timing_mut(&mut self) -> &mut QueryTiming {
        &mut self.metadata.timing
    }

    fn result_count(&self) -> usize {
        self.total_count
    }
}

// ============================================================================
// Path
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Type of the edge leading to the next step; `None` on the last step
    pub relationship_to_next: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathMetadata {
    #[serde(flatten)]
    pub timing: QueryTiming,
    pub hops: usize,
    pub nodes_explored: usize,
    /// Whether `to_entity` appeared in the explored subgraph at all. With
    /// `path_exists == false` this separates "unreachable within the explored
    /// depth" from "not found".
    pub target_in_traversal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    pub from_entity: EntityRef,
    pub to_entity: EntityRef,
    pub path_exists: bool,
    pub path: Option<Vec<PathStep>>,
    pub metadata: PathMetadata,
}

impl QueryOutput for PathResult {
    fn timing_mut(&mut self) -> &mut QueryTiming {
        &mut self.metadata.timing
    }

    fn result_count(&self) -> usize {
        self.path.as_ref().map(Vec::len).unwrap_or(0)
    }
}

// ============================================================================
// Architecture
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchitectureNodeType {
    Repository,
    Package,
    Module,
    File,
    Function,
    Class,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Recursive node of the architecture tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureNode {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: ArchitectureNodeType,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ArchitectureNode>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<NodeMetrics>,
}

impl ArchitectureNode {
    pub fn children(&self) -> &[ArchitectureNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Depth-first search by path
    pub fn find(&self, path: &str) -> Option<&ArchitectureNode> {
        if self.path == path {
            return Some(self);
        }
        self.children().iter().find_map(|c| c.find(path))
    }
}

/// Aggregated dependency between two top-level modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterModuleDependency {
    pub from_module: String,
    pub to_module: String,
    pub count: u64,
    pub relationship_types: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureMetrics {
    pub total_files: usize,
    /// Modules and packages
    pub total_modules: usize,
    /// Functions and classes
    pub total_entities: usize,
    pub inter_module_dependency_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureMetadata {
    #[serde(flatten)]
    pub timing: QueryTiming,
    pub detail_level: DetailLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureResult {
    pub repository: String,
    pub structure: ArchitectureNode,
    pub inter_module_dependencies: Vec<InterModuleDependency>,
    pub metrics: ArchitectureMetrics,
    pub metadata: ArchitectureMetadata,
}

impl QueryOutput for ArchitectureResult {
    fn timing_mut(&mut self) -> &mut QueryTiming {
        &mut self.metadata.timing
    }

    fn result_count(&self) -> usize {
        self.metrics.total_files + self.metrics.total_modules + self.metrics.total_entities
    }
}
