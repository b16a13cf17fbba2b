//! Graph query service
//!
//! Every operation runs the same skeleton: validate the input, look the
//! canonical key up in the operation's cache, otherwise run the store
//! round-trip under the timeout, shape the result, cache it, and stamp timing
//! metadata on the copy handed back. Failures come back as [`QueryError`].

use super::architecture::{
    aggregate_inter_module, build_tree, compute_metrics, decode_dependencies, dependency_query,
    structure_query, ArchitectureRows,
};
use super::cache::{generate_key, CacheConfig, CacheStats, QueryCache};
use super::error::{QueryError, QueryResult};
use super::metrics::{QueryMetrics, QuerySample, TracingMetrics};
use super::models::*;
use super::path::reconstruct_path;
use super::timeout::{with_timeout, DEFAULT_TIMEOUT_MS};
use super::validation::*;
use crate::neo4j::models::{
    DependencyAnalysis, DependencyAnalysisRequest, DependencyDirection, DependencyEdge,
    TraversalRequest,
};
use crate::neo4j::GraphStore;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_TRAVERSE_NODES: usize = 1000;

/// Service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphServiceConfig {
    /// Budget for each store round-trip
    pub timeout_ms: u64,
    /// Node limit passed to traversals
    pub max_traverse_nodes: usize,
    pub cache: CacheConfig,
}

impl Default for GraphServiceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_traverse_nodes: DEFAULT_MAX_TRAVERSE_NODES,
            cache: CacheConfig::default(),
        }
    }
}

/// One cache per query type
pub struct QueryCaches {
    pub dependency: QueryCache<DependencyResult>,
    pub dependent: QueryCache<DependentResult>,
    pub path: QueryCache<PathResult>,
    pub architecture: QueryCache<ArchitectureResult>,
}

impl QueryCaches {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            dependency: QueryCache::new(config),
            dependent: QueryCache::new(config),
            path: QueryCache::new(config),
            architecture: QueryCache::new(config),
        }
    }

    pub fn clear(&self) {
        self.dependency.clear();
        self.dependent.clear();
        self.path.clear();
        self.architecture.clear();
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            dependency: self.dependency.stats(),
            dependent: self.dependent.stats(),
            path: self.path.stats(),
            architecture: self.architecture.stats(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub dependency: CacheStats,
    pub dependent: CacheStats,
    pub path: CacheStats,
    pub architecture: CacheStats,
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn dependency_item(edge: DependencyEdge) -> DependencyItem {
    DependencyItem {
        entity_type: edge.node.kind(),
        path: edge.node.display_path().to_string(),
        relationship_type: edge.relationship_type.to_lowercase(),
        depth: edge.depth,
    }
}

fn dependency_items(analysis: DependencyAnalysis) -> Vec<DependencyItem> {
    analysis
        .direct
        .into_iter()
        .chain(analysis.transitive.unwrap_or_default())
        .map(dependency_item)
        .collect()
}

/// Query layer over a [`GraphStore`]
pub struct GraphService {
    store: Arc<dyn GraphStore>,
    config: GraphServiceConfig,
    caches: QueryCaches,
    metrics: Arc<dyn QueryMetrics>,
}

impl GraphService {
    pub fn new(store: Arc<dyn GraphStore>, config: GraphServiceConfig) -> Self {
        let caches = QueryCaches::new(&config.cache);
        Self {
            store,
            config,
            caches,
            metrics: Arc::new(TracingMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn QueryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace this instance's caches, e.g. with ones built from a different
    /// [`CacheConfig`] than the service config
    pub fn with_caches(mut self, caches: QueryCaches) -> Self {
        self.caches = caches;
        self
    }

    // ========================================================================
    // Query skeleton
    // ========================================================================

    fn record(&self, sample: QuerySample) {
        self.metrics.record(&sample);
    }

    fn validated<T>(
        &self,
        operation: QueryOperation,
        started: Instant,
        result: QueryResult<T>,
    ) -> QueryResult<T> {
        if let Err(err) = &result {
            tracing::warn!("Rejected {} query: {}", operation, err);
            self.record(QuerySample {
                operation,
                duration_ms: elapsed_ms(started),
                result_count: 0,
                cache_hit: false,
                error: Some(err.code()),
                depth: None,
            });
        }
        result
    }

    /// Serve from `cache` or run `fetch` under the timeout and cache its result.
    ///
    /// `fetch` is not polled on a cache hit, so a hit never reaches the store.
    async fn cached<Q, R, F>(
        &self,
        operation: QueryOperation,
        started: Instant,
        cache: &QueryCache<R>,
        query: &Q,
        depth: Option<u32>,
        fetch: F,
    ) -> QueryResult<R>
    where
        Q: Serialize,
        R: QueryOutput,
        F: Future<Output = Result<R>>,
    {
        let key = generate_key(operation, query);

        if let Some(mut hit) = cache.get(&key) {
            tracing::debug!("Cache hit for {}", key);
            let timing = hit.timing_mut();
            timing.from_cache = true;
            timing.query_time_ms = elapsed_ms(started);
            self.record(QuerySample {
                operation,
                duration_ms: timing.query_time_ms,
                result_count: hit.result_count(),
                cache_hit: true,
                error: None,
                depth,
            });
            return Ok(hit);
        }
        tracing::debug!("Cache miss for {}", key);

        match with_timeout(operation, self.config.timeout_ms, fetch).await {
            Ok(mut fresh) => {
                cache.set(key, fresh.clone());
                let timing = fresh.timing_mut();
                timing.from_cache = false;
                timing.query_time_ms = elapsed_ms(started);
                self.record(QuerySample {
                    operation,
                    duration_ms: timing.query_time_ms,
                    result_count: fresh.result_count(),
                    cache_hit: false,
                    error: None,
                    depth,
                });
                Ok(fresh)
            }
            Err(err) => {
                let err = QueryError::from_anyhow(operation, err);
                if let QueryError::Operation { source, .. } = &err {
                    tracing::error!("{} failed: {:#}", operation, source);
                }
                self.record(QuerySample {
                    operation,
                    duration_ms: elapsed_ms(started),
                    result_count: 0,
                    cache_hit: false,
                    error: Some(err.code()),
                    depth,
                });
                Err(err)
            }
        }
    }

    // ========================================================================
    // Dependencies
    // ========================================================================

    /// What the entity depends on
    pub async fn get_dependencies(&self, input: &DependencyQueryInput) -> QueryResult<DependencyResult> {
        let operation = QueryOperation::Dependencies;
        let started = Instant::now();
        let query = self.validated(operation, started, validate_dependency_query(input))?;

        self.cached(
            operation,
            started,
            &self.caches.dependency,
            &query,
            Some(query.depth),
            self.fetch_dependencies(&query),
        )
        .await
    }

    async fn fetch_dependencies(&self, query: &DependencyQuery) -> Result<DependencyResult> {
        let request = DependencyAnalysisRequest {
            target: query.entity.clone(),
            direction: DependencyDirection::DependsOn,
            transitive: query.include_transitive,
            max_depth: Some(query.depth),
            include_cross_repo: query.include_cross_repo,
            limit: Some(self.config.max_traverse_nodes),
        };
        let analysis = self.store.analyze_dependencies(&request).await?;
        let dependencies = dependency_items(analysis);

        Ok(DependencyResult {
            entity: query.entity.clone(),
            total_count: dependencies.len(),
            dependencies,
            metadata: DependencyMetadata {
                timing: QueryTiming::default(),
                depth_searched: query.depth,
                include_transitive: query.include_transitive,
            },
        })
    }

    /// What depends on the entity, with its impact analysis
    pub async fn get_dependents(&self, input: &DependentQueryInput) -> QueryResult<DependentResult> {
        let operation = QueryOperation::Dependents;
        let started = Instant::now();
        let query = self.validated(operation, started, validate_dependent_query(input))?;

        self.cached(
            operation,
            started,
            &self.caches.dependent,
            &query,
            Some(query.depth),
            self.fetch_dependents(&query),
        )
        .await
    }

    async fn fetch_dependents(&self, query: &DependentQuery) -> Result<DependentResult> {
        let request = DependencyAnalysisRequest {
            target: query.entity.clone(),
            direction: DependencyDirection::DependedOnBy,
            transitive: query.depth > 1,
            max_depth: Some(query.depth),
            include_cross_repo: query.include_cross_repo,
            limit: Some(self.config.max_traverse_nodes),
        };
        let analysis = self.store.analyze_dependencies(&request).await?;
        let impact_analysis = ImpactAnalysis {
            direct_impact_count: analysis.metadata.direct_count,
            transitive_impact_count: analysis.metadata.transitive_count,
            impact_score: analysis.impact_score,
        };
        let dependents = dependency_items(analysis);

        let repositories_searched = match &query.entity.repository {
            Some(repo) if !query.include_cross_repo => vec![repo.clone()],
            _ => vec!["all".to_string()],
        };

        Ok(DependentResult {
            entity: query.entity.clone(),
            total_count: dependents.len(),
            dependents,
            impact_analysis,
            metadata: DependentMetadata {
                timing: QueryTiming::default(),
                depth_searched: query.depth,
                repositories_searched,
            },
        })
    }

    // ========================================================================
    // Path
    // ========================================================================

    /// Shortest path between two entities within `max_hops`
    pub async fn get_path(&self, input: &PathQueryInput) -> QueryResult<PathResult> {
        let operation = QueryOperation::Path;
        let started = Instant::now();
        let query = self.validated(operation, started, validate_path_query(input))?;

        self.cached(
            operation,
            started,
            &self.caches.path,
            &query,
            Some(query.max_hops),
            self.fetch_path(&query),
        )
        .await
    }

    async fn fetch_path(&self, query: &PathQuery) -> Result<PathResult> {
        let request = TraversalRequest {
            start: query.from_entity.clone(),
            relationships: query.relationship_types.clone(),
            depth: Some(query.max_hops),
            limit: Some(self.config.max_traverse_nodes),
        };
        let traversal = self.store.traverse(&request).await?;
        let search = reconstruct_path(&traversal, &query.from_entity, &query.to_entity);

        Ok(PathResult {
            from_entity: query.from_entity.clone(),
            to_entity: query.to_entity.clone(),
            path_exists: search.path.is_some(),
            metadata: PathMetadata {
                timing: QueryTiming::default(),
                hops: search.hops(),
                nodes_explored: search.nodes_explored,
                target_in_traversal: search.target_in_traversal,
            },
            path: search.path,
        })
    }

    // ========================================================================
    // Architecture
    // ========================================================================

    /// Structural overview of a repository at the requested detail level
    pub async fn get_architecture(
        &self,
        input: &ArchitectureQueryInput,
    ) -> QueryResult<ArchitectureResult> {
        let operation = QueryOperation::Architecture;
        let started = Instant::now();
        let query = self.validated(operation, started, validate_architecture_query(input))?;

        self.cached(
            operation,
            started,
            &self.caches.architecture,
            &query,
            None,
            self.fetch_architecture(&query),
        )
        .await
    }

    async fn fetch_architecture(&self, query: &ArchitectureQuery) -> Result<ArchitectureResult> {
        let (structure_rows, dependency_rows) = tokio::try_join!(
            self.store.run_query(structure_query(query)),
            self.store.run_query(dependency_query(query)),
        )?;

        let rows = ArchitectureRows::decode(query.detail_level, structure_rows)?;
        let structure = build_tree(&query.repository, rows);
        let inter_module_dependencies = aggregate_inter_module(decode_dependencies(dependency_rows)?);
        let metrics = compute_metrics(&structure, inter_module_dependencies.len());

        Ok(ArchitectureResult {
            repository: query.repository.clone(),
            structure,
            inter_module_dependencies,
            metrics,
            metadata: ArchitectureMetadata {
                timing: QueryTiming::default(),
                detail_level: query.detail_level,
            },
        })
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Whether the store answers within the timeout
    pub async fn health_check(&self) -> bool {
        let budget = Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(budget, self.store.health_check()).await {
            Ok(healthy) => healthy,
            Err(_) => {
                tracing::warn!("Health check timed out after {}ms", self.config.timeout_ms);
                false
            }
        }
    }

    pub fn clear_cache(&self) {
        self.caches.clear();
        tracing::info!("Cleared graph query caches");
    }

    pub fn cache_stats(&self) -> CacheStatsReport {
        self.caches.stats()
    }
}
