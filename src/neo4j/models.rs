//! Store-level models exchanged with the graph database

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A row returned by [`GraphStore::run_query`](super::GraphStore::run_query),
/// keyed by projected column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Entity references
// ============================================================================

/// Kind of code entity stored in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    File,
    Function,
    Class,
    Module,
    Interface,
    Method,
    Variable,
    Type,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        EntityType::File,
        EntityType::Function,
        EntityType::Class,
        EntityType::Module,
        EntityType::Interface,
        EntityType::Method,
        EntityType::Variable,
        EntityType::Type,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::File => "file",
            EntityType::Function => "function",
            EntityType::Class => "class",
            EntityType::Module => "module",
            EntityType::Interface => "interface",
            EntityType::Method => "method",
            EntityType::Variable => "variable",
            EntityType::Type => "type",
        }
    }

    /// Node label used in the graph (e.g. `File`, `Function`)
    pub fn label(&self) -> &'static str {
        match self {
            EntityType::File => "File",
            EntityType::Function => "Function",
            EntityType::Class => "Class",
            EntityType::Module => "Module",
            EntityType::Interface => "Interface",
            EntityType::Method => "Method",
            EntityType::Variable => "Variable",
            EntityType::Type => "Type",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or(())
    }
}

/// Identifies a node by logical coordinates rather than an internal ID.
///
/// `identifier` is a path (files, modules) or a name (functions, classes)
/// meaningful within `repository`. `None` means any repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl EntityRef {
    pub fn new(entity_type: EntityType, identifier: impl Into<String>) -> Self {
        Self {
            entity_type,
            identifier: identifier.into(),
            repository: None,
        }
    }

    pub fn in_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    /// Whether a traversed node is the entity this reference points at.
    ///
    /// Matches on `path` or `name`, and on repository when one is set.
    pub fn matches(&self, node: &GraphNode) -> bool {
        let identifier_matches = node.path.as_deref() == Some(self.identifier.as_str())
            || node.name.as_deref() == Some(self.identifier.as_str());
        let repository_matches = match &self.repository {
            Some(repo) => node.repository.as_deref() == Some(repo.as_str()),
            None => true,
        };
        identifier_matches && repository_matches
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// Relationship types the query layer can traverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    Imports,
    Calls,
    References,
    Extends,
    Implements,
    Contains,
    Defines,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 7] = [
        RelationshipType::Imports,
        RelationshipType::Calls,
        RelationshipType::References,
        RelationshipType::Extends,
        RelationshipType::Implements,
        RelationshipType::Contains,
        RelationshipType::Defines,
    ];

    /// Default set for path finding
    pub const PATH_DEFAULTS: [RelationshipType; 3] = [
        RelationshipType::Imports,
        RelationshipType::Calls,
        RelationshipType::References,
    ];

    /// Relationships that express a code dependency
    pub const DEPENDENCY: [RelationshipType; 5] = [
        RelationshipType::Imports,
        RelationshipType::Calls,
        RelationshipType::References,
        RelationshipType::Extends,
        RelationshipType::Implements,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Imports => "imports",
            RelationshipType::Calls => "calls",
            RelationshipType::References => "references",
            RelationshipType::Extends => "extends",
            RelationshipType::Implements => "implements",
            RelationshipType::Contains => "contains",
            RelationshipType::Defines => "defines",
        }
    }

    /// Relationship type name in the graph (e.g. `IMPORTS`)
    pub fn cypher_name(&self) -> &'static str {
        match self {
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::Calls => "CALLS",
            RelationshipType::References => "REFERENCES",
            RelationshipType::Extends => "EXTENDS",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::Defines => "DEFINES",
        }
    }

    /// Render a `A|B|C` alternation for a relationship pattern
    pub fn alternation(types: &[RelationshipType]) -> String {
        types
            .iter()
            .map(|t| t.cypher_name())
            .collect::<Vec<_>>()
            .join("|")
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        RelationshipType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s) || t.cypher_name() == s)
            .ok_or(())
    }
}

// ============================================================================
// Parameterized queries
// ============================================================================

/// A value bound to a query parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryParam {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    StringList(Vec<String>),
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        QueryParam::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        QueryParam::String(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        QueryParam::Integer(value)
    }
}

impl From<f64> for QueryParam {
    fn from(value: f64) -> Self {
        QueryParam::Float(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        QueryParam::Boolean(value)
    }
}

impl From<Vec<String>> for QueryParam {
    fn from(value: Vec<String>) -> Self {
        QueryParam::StringList(value)
    }
}

/// A parameterized query.
///
/// Untrusted strings must only ever reach the store through `params`, never
/// through `text`. `columns` lists the projected columns each row carries.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphQuery {
    pub name: &'static str,
    pub text: String,
    pub params: BTreeMap<String, QueryParam>,
    pub columns: Vec<String>,
}

impl GraphQuery {
    pub fn new(name: &'static str, text: impl Into<String>) -> Self {
        Self {
            name,
            text: text.into(),
            params: BTreeMap::new(),
            columns: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<QueryParam>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn returns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }
}

// ============================================================================
// Traversal
// ============================================================================

/// A node as returned by traversal and dependency analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
}

impl GraphNode {
    /// Lowercased primary label (`File` → `file`), or `unknown`
    pub fn kind(&self) -> String {
        self.labels
            .first()
            .map(|l| l.to_lowercase())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Path when present, else name, else the internal id
    pub fn display_path(&self) -> &str {
        self.path
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(self.id.as_str())
    }
}

/// A directed relationship between two traversed nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub id: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(rename = "start")]
    pub start_node_id: String,
    #[serde(rename = "end")]
    pub end_node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalRequest {
    pub start: EntityRef,
    pub relationships: Vec<RelationshipType>,
    pub depth: Option<u32>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalMetadata {
    pub query_time_ms: u64,
}

/// Subgraph explored by a traversal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraversalResult {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
    pub metadata: TraversalMetadata,
}

// ============================================================================
// Dependency analysis
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyDirection {
    /// Outgoing: what the target depends on
    DependsOn,
    /// Incoming: what depends on the target
    DependedOnBy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyAnalysisRequest {
    pub target: EntityRef,
    pub direction: DependencyDirection,
    pub transitive: bool,
    pub max_depth: Option<u32>,
    pub include_cross_repo: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub node: GraphNode,
    pub relationship_type: String,
    pub depth: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyAnalysisMetadata {
    pub direct_count: usize,
    pub transitive_count: usize,
    pub query_time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyAnalysis {
    pub direct: Vec<DependencyEdge>,
    pub transitive: Option<Vec<DependencyEdge>>,
    pub impact_score: f64,
    pub metadata: DependencyAnalysisMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: Option<&str>, name: Option<&str>, repo: Option<&str>) -> GraphNode {
        GraphNode {
            id: "n".into(),
            labels: vec!["File".into()],
            path: path.map(String::from),
            name: name.map(String::from),
            repository: repo.map(String::from),
        }
    }

    #[test]
    fn test_entity_type_parse_is_case_insensitive() {
        assert_eq!("File".parse::<EntityType>(), Ok(EntityType::File));
        assert_eq!(" class ".parse::<EntityType>(), Ok(EntityType::Class));
        assert!("widget".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_relationship_type_accepts_graph_names() {
        assert_eq!(
            "IMPORTS".parse::<RelationshipType>(),
            Ok(RelationshipType::Imports)
        );
        assert_eq!(
            "calls".parse::<RelationshipType>(),
            Ok(RelationshipType::Calls)
        );
        assert_eq!(
            RelationshipType::alternation(&RelationshipType::PATH_DEFAULTS),
            "IMPORTS|CALLS|REFERENCES"
        );
    }

    #[test]
    fn test_entity_ref_matches_path_or_name() {
        let by_path = EntityRef::new(EntityType::File, "src/a.ts");
        assert!(by_path.matches(&node(Some("src/a.ts"), None, None)));
        assert!(!by_path.matches(&node(Some("src/b.ts"), None, None)));

        let by_name = EntityRef::new(EntityType::Function, "parse");
        assert!(by_name.matches(&node(None, Some("parse"), None)));
    }

    #[test]
    fn test_entity_ref_matches_repository_when_set() {
        let target = EntityRef::new(EntityType::File, "src/a.ts").in_repository("web");
        assert!(target.matches(&node(Some("src/a.ts"), None, Some("web"))));
        assert!(!target.matches(&node(Some("src/a.ts"), None, Some("api"))));
        assert!(!target.matches(&node(Some("src/a.ts"), None, None)));
    }

    #[test]
    fn test_graph_node_kind_and_display_path() {
        let n = node(None, Some("parse"), None);
        assert_eq!(n.kind(), "file");
        assert_eq!(n.display_path(), "parse");
    }
}
