//! Neo4j client for reading the code knowledge graph

use super::models::*;
use anyhow::{Context, Result};
use neo4rs::{query, Graph, Query};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Client for Neo4j operations
pub struct Neo4jClient {
    graph: Arc<Graph>,
}

/// Map projection of a node into the shape `GraphNode` deserializes from
fn node_map(alias: &str) -> String {
    format!(
        "{{id: elementId({a}), labels: labels({a}), path: {a}.path, name: {a}.name, repository: {a}.repository}}",
        a = alias
    )
}

/// Map projection of a relationship into the shape `GraphRelationship` deserializes from
fn relationship_map(alias: &str) -> String {
    format!(
        "{{id: elementId({a}), type: type({a}), start: elementId(startNode({a})), end: elementId(endNode({a}))}}",
        a = alias
    )
}

/// MATCH clause locating an entity by label, path-or-name and optional repository.
///
/// Binds `$identifier` and `$repository` (empty string = any repository).
fn entity_match(alias: &str, entity: &EntityRef) -> String {
    format!(
        r#"MATCH ({a}:{label})
            WHERE ({a}.path = $identifier OR {a}.name = $identifier)
              AND ($repository = '' OR {a}.repository = $repository)"#,
        a = alias,
        label = entity.entity_type.label()
    )
}

/// Store-side impact score in [0, 1): saturating in the number of dependents,
/// transitive dependents weighted at half.
pub fn impact_score(direct_count: usize, transitive_count: usize) -> f64 {
    let weighted = direct_count as f64 + 0.5 * transitive_count as f64;
    let score = 1.0 - (-weighted / 10.0).exp();
    (score * 1000.0).round() / 1000.0
}

fn bind(q: Query, key: &str, value: &QueryParam) -> Query {
    match value {
        QueryParam::String(s) => q.param(key, s.as_str()),
        QueryParam::Integer(i) => q.param(key, *i),
        QueryParam::Float(f) => q.param(key, *f),
        QueryParam::Boolean(b) => q.param(key, *b),
        QueryParam::StringList(list) => q.param(key, list.clone()),
    }
}

impl Neo4jClient {
    /// Create a new Neo4j client
    pub async fn new(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;

        let client = Self {
            graph: Arc::new(graph),
        };

        tracing::info!("Connected to Neo4j at {}", uri);
        Ok(client)
    }

    async fn execute_with_params(&self, q: Query) -> Result<Vec<neo4rs::Row>> {
        let mut result = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = result.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    fn entity_params(q: Query, entity: &EntityRef) -> Query {
        q.param("identifier", entity.identifier.as_str()).param(
            "repository",
            entity.repository.clone().unwrap_or_default(),
        )
    }

    // ========================================================================
    // Parameterized queries
    // ========================================================================

    /// Run a parameterized query and project the declared columns into rows
    pub async fn run_query(&self, graph_query: GraphQuery) -> Result<Vec<Row>> {
        let mut q = query(&graph_query.text);
        for (key, value) in &graph_query.params {
            q = bind(q, key, value);
        }

        let rows = self
            .execute_with_params(q)
            .await
            .with_context(|| format!("Query '{}' failed", graph_query.name))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let mut projected = Row::new();
            for column in &graph_query.columns {
                let value = row
                    .get::<serde_json::Value>(column)
                    .unwrap_or(serde_json::Value::Null);
                projected.insert(column.clone(), value);
            }
            out.push(projected);
        }

        tracing::debug!("Query '{}' returned {} rows", graph_query.name, out.len());
        Ok(out)
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Explore outward from the start entity along the requested relationships
    pub async fn traverse(&self, request: &TraversalRequest) -> Result<TraversalResult> {
        let started = Instant::now();
        let relationships = if request.relationships.is_empty() {
            RelationshipType::alternation(&RelationshipType::PATH_DEFAULTS)
        } else {
            RelationshipType::alternation(&request.relationships)
        };
        let depth = request.depth.unwrap_or(1).max(1);
        let limit = request.limit.unwrap_or(1000).max(1);

        // Variable-length bounds cannot be parameters; depth is a validated integer
        // and the alternation is built from enum names.
        let cypher = format!(
            r#"
            {start_match}
            WITH start LIMIT 1
            OPTIONAL MATCH p = (start)-[:{relationships}*1..{depth}]->(n)
            WITH start, p LIMIT $limit
            RETURN {start_node} AS start,
                   CASE WHEN p IS NULL THEN [] ELSE [x IN nodes(p) | {path_node}] END AS nodes,
                   CASE WHEN p IS NULL THEN [] ELSE [r IN relationships(p) | {path_rel}] END AS relationships
            "#,
            start_match = entity_match("start", &request.start),
            start_node = node_map("start"),
            path_node = node_map("x"),
            path_rel = relationship_map("r"),
        );

        let q = Self::entity_params(query(&cypher), &request.start).param("limit", limit as i64);
        let rows = self
            .execute_with_params(q)
            .await
            .context("Traversal query failed")?;

        let mut seen_nodes = HashSet::new();
        let mut seen_rels = HashSet::new();
        let mut result = TraversalResult::default();

        for row in rows {
            let start: GraphNode = row.get("start")?;
            let nodes: Vec<GraphNode> = row.get("nodes").unwrap_or_default();
            let rels: Vec<GraphRelationship> = row.get("relationships").unwrap_or_default();

            for node in std::iter::once(start).chain(nodes) {
                if result.nodes.len() >= limit {
                    break;
                }
                if seen_nodes.insert(node.id.clone()) {
                    result.nodes.push(node);
                }
            }

            for rel in rels {
                if seen_nodes.contains(&rel.start_node_id)
                    && seen_nodes.contains(&rel.end_node_id)
                    && seen_rels.insert(rel.id.clone())
                {
                    result.relationships.push(rel);
                }
            }
        }

        result.metadata.query_time_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            "Traversal from {} explored {} nodes, {} relationships",
            request.start.identifier,
            result.nodes.len(),
            result.relationships.len()
        );
        Ok(result)
    }

    // ========================================================================
    // Dependency analysis
    // ========================================================================

    /// Direct and transitive dependencies (or dependents) of an entity
    pub async fn analyze_dependencies(
        &self,
        request: &DependencyAnalysisRequest,
    ) -> Result<DependencyAnalysis> {
        let started = Instant::now();
        let relationships = RelationshipType::alternation(&RelationshipType::DEPENDENCY);
        let max_depth = if request.transitive {
            request.max_depth.unwrap_or(1).max(1)
        } else {
            1
        };
        let pattern = match request.direction {
            DependencyDirection::DependsOn => {
                format!("(target)-[:{}*1..{}]->(other)", relationships, max_depth)
            }
            DependencyDirection::DependedOnBy => {
                format!("(target)<-[:{}*1..{}]-(other)", relationships, max_depth)
            }
        };
        let limit = request.limit.unwrap_or(1000).max(1);

        let cypher = format!(
            r#"
            {target_match}
            WITH target LIMIT 1
            MATCH p = {pattern}
            WHERE other <> target
              AND ($cross_repo OR $repository = '' OR other.repository = $repository)
            WITH other, p ORDER BY length(p)
            WITH other, collect(p)[0] AS shortest
            RETURN {other_node} AS node,
                   type(last(relationships(shortest))) AS relationship_type,
                   length(shortest) AS depth
            ORDER BY depth, node.path
            LIMIT $limit
            "#,
            target_match = entity_match("target", &request.target),
            other_node = node_map("other"),
        );

        let q = Self::entity_params(query(&cypher), &request.target)
            .param("cross_repo", request.include_cross_repo)
            .param("limit", limit as i64);
        let rows = self
            .execute_with_params(q)
            .await
            .context("Dependency analysis query failed")?;

        let mut direct = Vec::new();
        let mut transitive = Vec::new();
        for row in rows {
            let edge = DependencyEdge {
                node: row.get("node")?,
                relationship_type: row.get("relationship_type")?,
                depth: row.get::<i64>("depth")?.max(1) as u32,
            };
            if edge.depth <= 1 {
                direct.push(edge);
            } else {
                transitive.push(edge);
            }
        }

        let metadata = DependencyAnalysisMetadata {
            direct_count: direct.len(),
            transitive_count: transitive.len(),
            query_time_ms: started.elapsed().as_millis() as u64,
        };

        Ok(DependencyAnalysis {
            impact_score: impact_score(metadata.direct_count, metadata.transitive_count),
            direct,
            transitive: request.transitive.then_some(transitive),
            metadata,
        })
    }

    // ========================================================================
    // Health
    // ========================================================================

    /// Returns true when Neo4j answers a trivial query
    pub async fn health_check(&self) -> bool {
        match self.graph.run(query("RETURN 1")).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Neo4j health check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impact_score_is_zero_without_dependents() {
        assert_eq!(impact_score(0, 0), 0.0);
    }

    #[test]
    fn test_impact_score_grows_and_saturates() {
        let small = impact_score(1, 0);
        let large = impact_score(20, 40);
        assert!(small > 0.0);
        assert!(large > small);
        assert!(large < 1.0);
        // transitive dependents count half
        assert_eq!(impact_score(0, 2), impact_score(1, 0));
    }

    #[test]
    fn test_entity_match_binds_user_strings_as_parameters() {
        let entity = EntityRef::new(EntityType::File, "src/'; DROP").in_repository("web");
        let clause = entity_match("start", &entity);
        assert!(clause.contains("(start:File)"));
        assert!(clause.contains("$identifier"));
        assert!(!clause.contains("DROP"));
        assert!(!clause.contains("web"));
    }

    #[test]
    fn test_node_map_projects_graph_node_fields() {
        let projection = node_map("n");
        for field in ["id:", "labels:", "path:", "name:", "repository:"] {
            assert!(projection.contains(field), "missing {}", field);
        }
    }
}
