//! Shortest-path reconstruction over a traversal subgraph
//!
//! The store only returns the subgraph reachable from the start entity; the
//! actual path is found here with a breadth-first search over the returned
//! relationships. A path is only ever built from edges the store returned.

use super::models::PathStep;
use crate::neo4j::models::{EntityRef, GraphNode, TraversalResult};
use std::collections::{HashMap, HashSet, VecDeque};

/// Outcome of a path search over one traversal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSearch {
    /// Steps from source to target, `None` when no path exists
    pub path: Option<Vec<PathStep>>,
    pub nodes_explored: usize,
    /// Whether any traversed node matched the target entity
    pub target_in_traversal: bool,
}

impl PathSearch {
    pub fn hops(&self) -> usize {
        self.path
            .as_ref()
            .map(|p| p.len().saturating_sub(1))
            .unwrap_or(0)
    }
}

/// Breadth-first search from every node matching `from` to the first dequeued
/// node matching `to`, over the edges of `traversal` (start → end only).
pub fn reconstruct_path(traversal: &TraversalResult, from: &EntityRef, to: &EntityRef) -> PathSearch {
    let nodes_explored = traversal.nodes.len();
    let by_id: HashMap<&str, &GraphNode> = traversal
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n))
        .collect();

    let targets: HashSet<&str> = traversal
        .nodes
        .iter()
        .filter(|n| to.matches(n))
        .map(|n| n.id.as_str())
        .collect();

    if targets.is_empty() {
        return PathSearch {
            path: None,
            nodes_explored,
            target_in_traversal: false,
        };
    }

    // Adjacency keeps the store's relationship order so results are stable
    let mut adjacency: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for rel in &traversal.relationships {
        if by_id.contains_key(rel.start_node_id.as_str())
            && by_id.contains_key(rel.end_node_id.as_str())
        {
            adjacency
                .entry(rel.start_node_id.as_str())
                .or_default()
                .push((rel.end_node_id.as_str(), rel.rel_type.as_str()));
        }
    }

    // node id -> (predecessor id, relationship type from predecessor)
    let mut came_from: HashMap<&str, Option<(&str, &str)>> = HashMap::new();
    let mut queue = VecDeque::new();
    for node in traversal.nodes.iter().filter(|n| from.matches(n)) {
        if came_from.insert(node.id.as_str(), None).is_none() {
            queue.push_back(node.id.as_str());
        }
    }

    let mut found = None;
    while let Some(current) = queue.pop_front() {
        if targets.contains(current) {
            found = Some(current);
            break;
        }
        for &(next, rel_type) in adjacency.get(current).map(Vec::as_slice).unwrap_or(&[]) {
            if !came_from.contains_key(next) {
                came_from.insert(next, Some((current, rel_type)));
                queue.push_back(next);
            }
        }
    }

    let path = found.map(|target| {
        // Walk predecessors back to a source, then reverse
        let mut chain: Vec<(&str, Option<&str>)> = vec![(target, None)];
        let mut cursor = target;
        while let Some(&Some((prev, rel_type))) = came_from.get(cursor) {
            chain.push((prev, Some(rel_type)));
            cursor = prev;
        }
        chain.reverse();

        chain
            .into_iter()
            .filter_map(|(id, rel_to_next)| {
                by_id.get(id).map(|node| PathStep {
                    entity_type: node.kind(),
                    path: node.display_path().to_string(),
                    name: node.name.clone(),
                    repository: node.repository.clone(),
                    relationship_to_next: rel_to_next.map(|r| r.to_lowercase()),
                })
            })
            .collect::<Vec<_>>()
    });

    PathSearch {
        path,
        nodes_explored,
        target_in_traversal: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neo4j::models::{EntityType, GraphRelationship};

    fn file(id: &str, path: &str) -> GraphNode {
        GraphNode {
            id: id.into(),
            labels: vec!["File".into()],
            path: Some(path.into()),
            name: None,
            repository: Some("web".into()),
        }
    }

    fn rel(id: &str, start: &str, end: &str, rel_type: &str) -> GraphRelationship {
        GraphRelationship {
            id: id.into(),
            rel_type: rel_type.into(),
            start_node_id: start.into(),
            end_node_id: end.into(),
        }
    }

    fn entity(path: &str) -> EntityRef {
        EntityRef::new(EntityType::File, path)
    }

    fn chain() -> TraversalResult {
        TraversalResult {
            nodes: vec![
                file("1", "src/a.ts"),
                file("2", "src/b.ts"),
                file("3", "src/c.ts"),
            ],
            relationships: vec![
                rel("r1", "1", "2", "IMPORTS"),
                rel("r2", "2", "3", "CALLS"),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_two_hop_chain() {
        let search = reconstruct_path(&chain(), &entity("src/a.ts"), &entity("src/c.ts"));
        let path = search.path.clone().unwrap();

        assert_eq!(search.hops(), 2);
        assert_eq!(search.nodes_explored, 3);
        assert!(search.target_in_traversal);
        let paths: Vec<&str> = path.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.ts", "src/b.ts", "src/c.ts"]);
        assert_eq!(path[0].relationship_to_next.as_deref(), Some("imports"));
        assert_eq!(path[1].relationship_to_next.as_deref(), Some("calls"));
        assert_eq!(path[2].relationship_to_next, None);
        assert_eq!(path[0].entity_type, "file");
    }

    #[test]
    fn test_target_missing_from_traversal() {
        let search = reconstruct_path(&chain(), &entity("src/a.ts"), &entity("src/z.ts"));
        assert_eq!(search.path, None);
        assert_eq!(search.hops(), 0);
        assert!(!search.target_in_traversal);
    }

    #[test]
    fn test_present_but_unreachable_target() {
        let mut traversal = chain();
        traversal.nodes.push(file("4", "src/d.ts"));
        // Edge points the wrong way
        traversal.relationships.push(rel("r3", "4", "3", "IMPORTS"));

        let search = reconstruct_path(&traversal, &entity("src/a.ts"), &entity("src/d.ts"));
        assert_eq!(search.path, None);
        assert!(search.target_in_traversal);
    }

    #[test]
    fn test_cycle_terminates_with_shortest_path() {
        let mut traversal = chain();
        traversal.relationships.push(rel("r3", "3", "1", "IMPORTS"));
        traversal.relationships.push(rel("r4", "1", "3", "REFERENCES"));

        let search = reconstruct_path(&traversal, &entity("src/a.ts"), &entity("src/c.ts"));
        let path = search.path.unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].relationship_to_next.as_deref(), Some("references"));
    }

    #[test]
    fn test_source_equal_to_target() {
        let search = reconstruct_path(&chain(), &entity("src/a.ts"), &entity("src/a.ts"));
        assert_eq!(search.path.map(|p| p.len()), Some(1));
    }

    #[test]
    fn test_edges_to_unknown_nodes_are_ignored() {
        let mut traversal = chain();
        traversal.relationships = vec![
            rel("r1", "1", "9", "IMPORTS"),
            rel("r2", "9", "3", "IMPORTS"),
        ];
        let search = reconstruct_path(&traversal, &entity("src/a.ts"), &entity("src/c.ts"));
        assert_eq!(search.path, None);
        assert!(search.target_in_traversal);
    }
}
