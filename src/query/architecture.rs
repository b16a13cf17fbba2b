//! Architecture overview: structure queries, typed rows and tree folding
//!
//! Each detail level has its own structure query and row shape. Group levels
//! (`packages`, `modules`) come back pre-aggregated and become direct children
//! of the repository root. File levels (`files`, `entities`) come back as one
//! row per file and are folded into a tree by walking path segments, creating
//! one `module` node per new prefix.

use super::models::*;
use crate::neo4j::models::{GraphQuery, Row};
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const STRUCTURE_QUERY: &str = "architecture_structure";
pub const DEPENDENCY_QUERY: &str = "architecture_dependencies";

// ============================================================================
// Queries
// ============================================================================

fn file_filter(query: &ArchitectureQuery) -> &'static str {
    if query.scope.is_some() {
        "f.repository = $repository AND (f.path = $scope OR f.path STARTS WITH $scope + '/')"
    } else {
        "f.repository = $repository"
    }
}

fn bind_scope(q: GraphQuery, query: &ArchitectureQuery) -> GraphQuery {
    let q = q.param("repository", query.repository.as_str());
    match &query.scope {
        Some(scope) => q.param("scope", scope.as_str()),
        None => q,
    }
}

/// Structure query for the requested detail level
pub fn structure_query(query: &ArchitectureQuery) -> GraphQuery {
    let filter = file_filter(query);
    let (text, columns): (String, &[&str]) = match query.detail_level {
        DetailLevel::Packages => (
            format!(
                r#"
                MATCH (f:File) WHERE {filter}
                WITH f, split(f.path, '/') AS parts
                WITH f, CASE WHEN size(parts) > 1 THEN parts[0] ELSE '.' END AS name
                RETURN name, count(f) AS file_count, head(collect(DISTINCT f.language)) AS language
                ORDER BY name
                "#
            ),
            &["name", "file_count", "language"],
        ),
        DetailLevel::Modules => (
            format!(
                r#"
                MATCH (f:File) WHERE {filter}
                WITH f, split(f.path, '/') AS parts
                WITH f, CASE WHEN size(parts) > 2 THEN parts[0] + '/' + parts[1] ELSE parts[0] END AS name
                RETURN name, count(f) AS file_count, head(collect(DISTINCT f.language)) AS language
                ORDER BY name
                "#
            ),
            &["name", "file_count", "language"],
        ),
        DetailLevel::Files => (
            format!(
                r#"
                MATCH (f:File) WHERE {filter}
                RETURN f.path AS path, f.language AS language
                ORDER BY path
                "#
            ),
            &["path", "language"],
        ),
        DetailLevel::Entities => (
            format!(
                r#"
                MATCH (f:File) WHERE {filter}
                OPTIONAL MATCH (f)-[:DEFINES]->(e)
                WHERE e:Function OR e:Class
                WITH f, collect(CASE WHEN e IS NULL THEN NULL
                                     ELSE {{name: e.name, type: toLower(head(labels(e)))}} END) AS entities
                RETURN f.path AS path, f.language AS language, entities
                ORDER BY path
                "#
            ),
            &["path", "language", "entities"],
        ),
    };
    bind_scope(GraphQuery::new(STRUCTURE_QUERY, text), query).returns(columns)
}

/// File-to-file dependency counts, aggregated into modules on our side
pub fn dependency_query(query: &ArchitectureQuery) -> GraphQuery {
    let scope_filter = if query.scope.is_some() {
        "AND (from_path = $scope OR from_path STARTS WITH $scope + '/') \
         AND (to_path = $scope OR to_path STARTS WITH $scope + '/')"
    } else {
        ""
    };
    let text = format!(
        r#"
        MATCH (a)-[r:IMPORTS|CALLS]->(b)
        WHERE a.repository = $repository AND b.repository = $repository
        WITH coalesce(a.path, a.file_path) AS from_path,
             coalesce(b.path, b.file_path) AS to_path,
             toLower(type(r)) AS relationship_type
        WHERE from_path IS NOT NULL AND to_path IS NOT NULL {scope_filter}
        RETURN from_path, to_path, relationship_type, count(*) AS count
        "#
    );
    bind_scope(GraphQuery::new(DEPENDENCY_QUERY, text), query).returns(&[
        "from_path",
        "to_path",
        "relationship_type",
        "count",
    ])
}

// ============================================================================
// Typed rows
// ============================================================================

/// Aggregate row for the `packages` and `modules` levels
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupRow {
    pub name: String,
    pub file_count: usize,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileRow {
    pub path: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityRow {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileEntitiesRow {
    pub path: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DependencyRow {
    pub from_path: String,
    pub to_path: String,
    pub relationship_type: String,
    pub count: u64,
}

/// Structure rows tagged by the detail level that produced them
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchitectureRows {
    Packages(Vec<GroupRow>),
    Modules(Vec<GroupRow>),
    Files(Vec<FileRow>),
    Entities(Vec<FileEntitiesRow>),
}

fn decode<T: DeserializeOwned>(rows: Vec<Row>, what: &str) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(serde_json::Value::Object(row))
                .with_context(|| format!("Malformed {} row", what))
        })
        .collect()
}

impl ArchitectureRows {
    pub fn decode(level: DetailLevel, rows: Vec<Row>) -> Result<Self> {
        Ok(match level {
            DetailLevel::Packages => ArchitectureRows::Packages(decode(rows, "package")?),
            DetailLevel::Modules => ArchitectureRows::Modules(decode(rows, "module")?),
            DetailLevel::Files => ArchitectureRows::Files(decode(rows, "file")?),
            DetailLevel::Entities => ArchitectureRows::Entities(decode(rows, "entity")?),
        })
    }
}

pub fn decode_dependencies(rows: Vec<Row>) -> Result<Vec<DependencyRow>> {
    decode(rows, "dependency")
}

// ============================================================================
// Tree building
// ============================================================================

struct ArenaNode {
    name: String,
    node_type: ArchitectureNodeType,
    path: String,
    metrics: Option<NodeMetrics>,
    children: Vec<usize>,
    /// Whether the node can carry children at all
    branch: bool,
}

struct TreeArena {
    nodes: Vec<ArenaNode>,
    by_path: HashMap<String, usize>,
}

impl TreeArena {
    fn new(repository: &str) -> Self {
        Self {
            nodes: vec![ArenaNode {
                name: repository.to_string(),
                node_type: ArchitectureNodeType::Repository,
                path: String::new(),
                metrics: None,
                children: Vec::new(),
                branch: true,
            }],
            by_path: HashMap::new(),
        }
    }

    fn attach(&mut self, parent: usize, node: ArenaNode) -> usize {
        let idx = self.nodes.len();
        self.by_path.insert(node.path.clone(), idx);
        self.nodes.push(node);
        self.nodes[parent].children.push(idx);
        idx
    }

    fn add_group(&mut self, node_type: ArchitectureNodeType, row: GroupRow) {
        if self.by_path.contains_key(&row.name) {
            return;
        }
        self.attach(
            0,
            ArenaNode {
                name: row.name.clone(),
                node_type,
                path: row.name,
                metrics: Some(NodeMetrics {
                    file_count: Some(row.file_count),
                    entity_count: None,
                    language: row.language,
                }),
                children: Vec::new(),
                branch: false,
            },
        );
    }

    /// Walk the segments of `path`, creating a module per new prefix and a file
    /// node at the full path. Returns the file node, or `None` for an empty path.
    fn add_file(&mut self, path: &str, language: Option<String>, branch: bool) -> Option<usize> {
        let segments: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();
        let (file_name, dirs) = segments.split_last()?;

        let mut parent = 0;
        let mut prefix = String::new();
        for dir in dirs {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(dir);
            parent = match self.by_path.get(&prefix) {
                Some(&idx) => idx,
                None => self.attach(
                    parent,
                    ArenaNode {
                        name: dir.to_string(),
                        node_type: ArchitectureNodeType::Module,
                        path: prefix.clone(),
                        metrics: None,
                        children: Vec::new(),
                        branch: true,
                    },
                ),
            };
        }

        let full = segments.join("/");
        if let Some(&existing) = self.by_path.get(&full) {
            return Some(existing);
        }
        Some(self.attach(
            parent,
            ArenaNode {
                name: file_name.to_string(),
                node_type: ArchitectureNodeType::File,
                path: full,
                metrics: Some(NodeMetrics {
                    file_count: None,
                    entity_count: None,
                    language,
                }),
                children: Vec::new(),
                branch,
            },
        ))
    }

    fn add_entities(&mut self, file: usize, entities: Vec<EntityRow>) {
        let mut count = 0;
        for entity in entities {
            let node_type = match entity.entity_type.as_str() {
                "class" | "interface" => ArchitectureNodeType::Class,
                _ => ArchitectureNodeType::Function,
            };
            let path = format!("{}#{}", self.nodes[file].path, entity.name);
            if self.by_path.contains_key(&path) {
                continue;
            }
            self.attach(
                file,
                ArenaNode {
                    name: entity.name,
                    node_type,
                    path,
                    metrics: None,
                    children: Vec::new(),
                    branch: false,
                },
            );
            count += 1;
        }
        if let Some(metrics) = self.nodes[file].metrics.as_mut() {
            metrics.entity_count = Some(metrics.entity_count.unwrap_or(0) + count);
        }
    }

    /// Materialize the owned tree rooted at `idx`; modules report how many
    /// files sit below them.
    fn materialize(&self, idx: usize) -> (ArchitectureNode, usize) {
        let node = &self.nodes[idx];
        let mut files_below = usize::from(node.node_type == ArchitectureNodeType::File);
        let children = if node.branch {
            let mut children = Vec::with_capacity(node.children.len());
            for &child in &node.children {
                let (built, files) = self.materialize(child);
                files_below += files;
                children.push(built);
            }
            Some(children)
        } else {
            None
        };

        let metrics = match node.node_type {
            ArchitectureNodeType::Module if node.branch => Some(NodeMetrics {
                file_count: Some(files_below),
                entity_count: None,
                language: None,
            }),
            _ => node.metrics.clone(),
        };

        (
            ArchitectureNode {
                name: node.name.clone(),
                node_type: node.node_type,
                path: node.path.clone(),
                children,
                metrics,
            },
            files_below,
        )
    }
}

/// Fold typed structure rows into the repository tree
pub fn build_tree(repository: &str, rows: ArchitectureRows) -> ArchitectureNode {
    let mut arena = TreeArena::new(repository);
    match rows {
        ArchitectureRows::Packages(groups) => {
            for row in groups {
                arena.add_group(ArchitectureNodeType::Package, row);
            }
        }
        ArchitectureRows::Modules(groups) => {
            for row in groups {
                arena.add_group(ArchitectureNodeType::Module, row);
            }
        }
        ArchitectureRows::Files(files) => {
            for row in files {
                arena.add_file(&row.path, row.language, false);
            }
        }
        ArchitectureRows::Entities(files) => {
            for row in files {
                if let Some(file) = arena.add_file(&row.path, row.language, true) {
                    arena.add_entities(file, row.entities);
                }
            }
        }
    }
    arena.materialize(0).0
}

// ============================================================================
// Metrics and inter-module dependencies
// ============================================================================

/// Count nodes by kind. Group nodes without children contribute their
/// `file_count` since their files are not part of the tree.
pub fn compute_metrics(root: &ArchitectureNode, inter_module_dependency_count: usize) -> ArchitectureMetrics {
    fn walk(node: &ArchitectureNode, metrics: &mut ArchitectureMetrics) {
        match node.node_type {
            ArchitectureNodeType::File => metrics.total_files += 1,
            ArchitectureNodeType::Package | ArchitectureNodeType::Module => {
                metrics.total_modules += 1;
                if node.children.is_none() {
                    metrics.total_files += node
                        .metrics
                        .as_ref()
                        .and_then(|m| m.file_count)
                        .unwrap_or(0);
                }
            }
            ArchitectureNodeType::Function | ArchitectureNodeType::Class => {
                metrics.total_entities += 1
            }
            ArchitectureNodeType::Repository => {}
        }
        for child in node.children() {
            walk(child, metrics);
        }
    }

    let mut metrics = ArchitectureMetrics {
        inter_module_dependency_count,
        ..Default::default()
    };
    walk(root, &mut metrics);
    metrics
}

/// Module a file belongs to: its top-level path segment, or `.` for files at
/// the repository root. Scope only narrows which files are considered.
pub fn module_of(path: &str) -> &str {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match (segments.next(), segments.next()) {
        (Some(top), Some(_)) => top,
        _ => ".",
    }
}

/// Aggregate file-level dependency rows into module-level edges. Edges within
/// one module are dropped; the result is sorted by descending count.
pub fn aggregate_inter_module(rows: Vec<DependencyRow>) -> Vec<InterModuleDependency> {
    let mut edges: BTreeMap<(String, String), (u64, BTreeSet<String>)> = BTreeMap::new();
    for row in rows {
        let from = module_of(&row.from_path);
        let to = module_of(&row.to_path);
        if from == to {
            continue;
        }
        let entry = edges
            .entry((from.to_string(), to.to_string()))
            .or_default();
        entry.0 += row.count;
        entry.1.insert(row.relationship_type);
    }

    let mut deps: Vec<InterModuleDependency> = edges
        .into_iter()
        .map(|((from_module, to_module), (count, types))| InterModuleDependency {
            from_module,
            to_module,
            count,
            relationship_types: types.into_iter().collect(),
        })
        .collect();
    deps.sort_by(|a, b| b.count.cmp(&a.count));
    deps
}
