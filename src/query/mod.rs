//! Graph query service: dependencies, dependents, paths and architecture
//!
//! Inputs are validated into immutable query values, served from
//! per-operation TTL caches when possible, and otherwise answered by a
//! [`GraphStore`](crate::neo4j::GraphStore) under a timeout.

pub mod architecture;
pub mod cache;
pub mod error;
pub mod metrics;
pub mod models;
pub mod path;
pub mod service;
pub mod timeout;
pub mod validation;

pub use cache::{CacheConfig, CacheStats, QueryCache};
pub use error::{QueryError, QueryResult, ValidationIssue};
pub use metrics::{InMemoryMetrics, QueryMetrics, QuerySample, TracingMetrics};
pub use models::*;
pub use service::{CacheStatsReport, GraphService, GraphServiceConfig, QueryCaches};
pub use validation::{
    ArchitectureQueryInput, DependencyQueryInput, DependentQueryInput, EntityInput, PathQueryInput,
};
