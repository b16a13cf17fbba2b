//! Input validation for the four query operations
//!
//! Inputs are loose (`Option<String>`, `Option<i64>`) so tool
//! arguments can be deserialized straight into them. Validation collects every
//! violated field before failing, and produces fully defaulted, bounds-checked
//! query values.

use super::error::{QueryError, QueryResult, ValidationIssue};
use super::models::*;
use crate::neo4j::models::{EntityRef, EntityType, RelationshipType};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DEPTH: u32 = 1;
pub const MAX_DEPTH: u32 = 10;
pub const DEFAULT_MAX_HOPS: u32 = 5;
pub const MAX_HOPS: u32 = 10;
pub const DEFAULT_DETAIL_LEVEL: DetailLevel = DetailLevel::Modules;

// ============================================================================
// Inputs
// ============================================================================

/// Caller-supplied dependency (or dependent) query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyQueryInput {
    pub entity_type: Option<String>,
    #[serde(alias = "identifier")]
    pub entity_path: Option<String>,
    pub repository: Option<String>,
    pub depth: Option<i64>,
    pub include_transitive: Option<bool>,
    pub include_cross_repo: Option<bool>,
}

pub type DependentQueryInput = DependencyQueryInput;

/// Caller-supplied entity reference
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityInput {
    #[serde(rename = "type", alias = "entity_type")]
    pub entity_type: Option<String>,
    #[serde(alias = "path")]
    pub identifier: Option<String>,
    pub repository: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathQueryInput {
    pub from_entity: Option<EntityInput>,
    pub to_entity: Option<EntityInput>,
    pub max_hops: Option<i64>,
    pub relationship_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchitectureQueryInput {
    pub repository: Option<String>,
    pub scope: Option<String>,
    pub detail_level: Option<String>,
}

// ============================================================================
// Issue collection
// ============================================================================

#[derive(Default)]
struct Issues(Vec<ValidationIssue>);

impl Issues {
    fn push(&mut self, path: &str, message: impl Into<String>) {
        self.0.push(ValidationIssue {
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn finish<T>(self, value: impl FnOnce() -> T) -> QueryResult<T> {
        if self.0.is_empty() {
            Ok(value())
        } else {
            Err(QueryError::validation(self.0))
        }
    }
}

fn enum_message(values: &[&str]) -> String {
    format!("Invalid enum value. Expected one of: {}", values.join(", "))
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

fn required_string(issues: &mut Issues, path: &str, value: Option<&str>) -> Option<String> {
    match value.map(str::trim) {
        None => {
            issues.push(path, "Required");
            None
        }
        Some("") => {
            issues.push(path, "String must not be empty");
            None
        }
        Some(s) => Some(s.to_string()),
    }
}

fn optional_string(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn entity_type(issues: &mut Issues, path: &str, value: Option<&str>) -> Option<EntityType> {
    let Some(raw) = value else {
        issues.push(path, "Required");
        return None;
    };
    match raw.parse::<EntityType>() {
        Ok(t) => Some(t),
        Err(()) => {
            let allowed: Vec<&str> = EntityType::ALL.iter().map(|t| t.as_str()).collect();
            issues.push(path, enum_message(&allowed));
            None
        }
    }
}

fn bounded(issues: &mut Issues, path: &str, value: Option<i64>, default: u32, max: u32) -> u32 {
    match value {
        None => default,
        Some(v) if (1..=max as i64).contains(&v) => v as u32,
        Some(_) => {
            issues.push(path, format!("Number must be between 1 and {}", max));
            default
        }
    }
}

fn entity(issues: &mut Issues, prefix: &str, input: Option<&EntityInput>) -> Option<EntityRef> {
    let Some(input) = input else {
        issues.push(prefix, "Required");
        return None;
    };
    let entity_type = entity_type(
        issues,
        &join_path(prefix, "type"),
        input.entity_type.as_deref(),
    );
    let identifier = required_string(
        issues,
        &join_path(prefix, "identifier"),
        input.identifier.as_deref(),
    );
    Some(EntityRef {
        entity_type: entity_type?,
        identifier: identifier?,
        repository: optional_string(input.repository.as_deref()),
    })
}

/// Trim, strip a leading `./` and any trailing `/`; empty means no scope.
pub fn normalize_scope(scope: Option<&str>) -> Option<String> {
    let trimmed = scope?.trim();
    let without_dot = trimmed.strip_prefix("./").unwrap_or(trimmed);
    let normalized = without_dot.trim_end_matches('/');
    if normalized.is_empty() {
        None
    } else {
        Some(normalized.to_string())
    }
}

// ============================================================================
// Validators
// ============================================================================

struct EntityQueryParts {
    entity: EntityRef,
    depth: u32,
    include_transitive: bool,
    include_cross_repo: bool,
}

fn entity_query(input: &DependencyQueryInput) -> QueryResult<EntityQueryParts> {
    let mut issues = Issues::default();
    let entity_type = entity_type(&mut issues, "entity_type", input.entity_type.as_deref());
    let identifier = required_string(&mut issues, "entity_path", input.entity_path.as_deref());
    let depth = bounded(&mut issues, "depth", input.depth, DEFAULT_DEPTH, MAX_DEPTH);

    issues.finish(|| EntityQueryParts {
        entity: EntityRef {
            // Both are Some when no issue was recorded
            entity_type: entity_type.unwrap_or(EntityType::File),
            identifier: identifier.unwrap_or_default(),
            repository: optional_string(input.repository.as_deref()),
        },
        depth,
        include_transitive: input.include_transitive.unwrap_or(false),
        include_cross_repo: input.include_cross_repo.unwrap_or(false),
    })
}

pub fn validate_dependency_query(input: &DependencyQueryInput) -> QueryResult<DependencyQuery> {
    let parts = entity_query(input)?;
    Ok(DependencyQuery {
        entity: parts.entity,
        depth: parts.depth,
        include_transitive: parts.include_transitive,
        include_cross_repo: parts.include_cross_repo,
    })
}

pub fn validate_dependent_query(input: &DependentQueryInput) -> QueryResult<DependentQuery> {
    let parts = entity_query(input)?;
    Ok(DependentQuery {
        entity: parts.entity,
        depth: parts.depth,
        include_transitive: parts.include_transitive,
        include_cross_repo: parts.include_cross_repo,
    })
}

pub fn validate_path_query(input: &PathQueryInput) -> QueryResult<PathQuery> {
    let mut issues = Issues::default();
    let from_entity = entity(&mut issues, "from_entity", input.from_entity.as_ref());
    let to_entity = entity(&mut issues, "to_entity", input.to_entity.as_ref());
    let max_hops = bounded(
        &mut issues,
        "max_hops",
        input.max_hops,
        DEFAULT_MAX_HOPS,
        MAX_HOPS,
    );

    let mut relationship_types = match &input.relationship_types {
        None => RelationshipType::PATH_DEFAULTS.to_vec(),
        Some(raw) if raw.is_empty() => {
            issues.push("relationship_types", "Array must contain at least 1 element");
            Vec::new()
        }
        Some(raw) => {
            let allowed: Vec<&str> = RelationshipType::ALL.iter().map(|t| t.as_str()).collect();
            let mut parsed = Vec::with_capacity(raw.len());
            for (i, value) in raw.iter().enumerate() {
                match value.parse::<RelationshipType>() {
                    Ok(t) => parsed.push(t),
                    Err(()) => issues.push(
                        &format!("relationship_types.{}", i),
                        enum_message(&allowed),
                    ),
                }
            }
            parsed
        }
    };
    relationship_types.sort();
    relationship_types.dedup();

    match (from_entity, to_entity) {
        (Some(from_entity), Some(to_entity)) => issues.finish(|| PathQuery {
            from_entity,
            to_entity,
            max_hops,
            relationship_types,
        }),
        _ => Err(QueryError::validation(issues.0)),
    }
}

pub fn validate_architecture_query(
    input: &ArchitectureQueryInput,
) -> QueryResult<ArchitectureQuery> {
    let mut issues = Issues::default();
    let repository = required_string(&mut issues, "repository", input.repository.as_deref());
    let detail_level = match input.detail_level.as_deref().map(str::trim) {
        None => DEFAULT_DETAIL_LEVEL,
        Some(raw) => match DetailLevel::ALL
            .iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(raw))
        {
            Some(level) => *level,
            None => {
                let allowed: Vec<&str> = DetailLevel::ALL.iter().map(|l| l.as_str()).collect();
                issues.push("detail_level", enum_message(&allowed));
                DEFAULT_DETAIL_LEVEL
            }
        },
    };

    issues.finish(|| ArchitectureQuery {
        repository: repository.unwrap_or_default(),
        scope: normalize_scope(input.scope.as_deref()),
        detail_level,
    })
}
