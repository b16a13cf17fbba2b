//! Knowledge Graph Query
//!
//! A query layer over a Neo4j code knowledge graph:
//! - Dependency and dependent analysis with impact scoring
//! - Shortest paths between code entities
//! - Repository architecture overviews at several detail levels
//! - Per-operation TTL caching, timeouts and a typed error taxonomy

pub mod neo4j;
pub mod query;

use anyhow::Result;
use query::{GraphService, GraphServiceConfig};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub neo4j: Neo4jYamlConfig,
    pub query: GraphServiceConfig,
}

/// Neo4j configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jYamlConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jYamlConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "password".into(),
        }
    }
}

// ============================================================================
// Runtime config
// ============================================================================

#[derive(Debug, Clone)]
pub struct Config {
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub service: GraphServiceConfig,
}

fn env_number<T: std::str::FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring {}={}: not a number", var, raw);
            None
        }
    }
}

impl Config {
    /// Load configuration from environment variables and `config.yaml` if present.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        let mut service = yaml.query;
        if let Some(timeout_ms) = env_number("GRAPH_QUERY_TIMEOUT_MS") {
            service.timeout_ms = timeout_ms;
        }
        if let Some(ttl_ms) = env_number("GRAPH_QUERY_CACHE_TTL_MS") {
            service.cache.ttl_ms = ttl_ms;
        }
        if let Some(max_size) = env_number("GRAPH_QUERY_CACHE_MAX_SIZE") {
            service.cache.max_size = max_size;
        }

        Ok(Self {
            neo4j_uri: std::env::var("NEO4J_URI").unwrap_or(yaml.neo4j.uri),
            neo4j_user: std::env::var("NEO4J_USER").unwrap_or(yaml.neo4j.user),
            neo4j_password: std::env::var("NEO4J_PASSWORD").unwrap_or(yaml.neo4j.password),
            service,
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

/// Connect to Neo4j and build a query service over it
pub async fn connect(config: &Config) -> Result<GraphService> {
    let store = Arc::new(
        neo4j::Neo4jClient::new(
            &config.neo4j_uri,
            &config.neo4j_user,
            &config.neo4j_password,
        )
        .await?,
    );
    Ok(GraphService::new(store, config.service.clone()))
}

// ============================================================================
// Tests
// ============================================================================
