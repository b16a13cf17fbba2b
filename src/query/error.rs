//! Error taxonomy for the graph query service
//!
//! Every public operation either returns a well-formed result or one of the
//! [`QueryError`] variants. The protocol boundary can decide what to show
//! callers from [`QueryError::code`], [`QueryError::is_retryable`] and the
//! message alone, without parsing free text.

use super::models::QueryOperation;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// One violated input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Dotted field path, e.g. `from_entity.identifier`
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Caller input failed validation. Never retryable, never reaches the store.
    #[error("Invalid query: {message}")]
    Validation {
        message: String,
        issues: Vec<ValidationIssue>,
    },

    /// A store round-trip exceeded its budget.
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: QueryOperation,
        timeout_ms: u64,
    },

    /// Unexpected failure from the store layer.
    #[error("{operation} failed: {message}")]
    Operation {
        operation: QueryOperation,
        message: String,
        retryable: bool,
        #[source]
        source: anyhow::Error,
    },
}

impl QueryError {
    /// Build a validation error aggregating every issue as `"<path>: <message>"`
    /// joined by `"; "`.
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        let message = issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        QueryError::Validation { message, issues }
    }

    /// Wrap an untyped store failure, deriving `retryable` from its message chain.
    pub fn operation(operation: QueryOperation, source: anyhow::Error) -> Self {
        let chain = format!("{:#}", source);
        QueryError::Operation {
            operation,
            message: source.to_string(),
            retryable: is_retryable_message(&chain),
            source,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::Validation { .. } => "VALIDATION_ERROR",
            QueryError::Timeout { .. } => "TIMEOUT",
            QueryError::Operation { .. } => "OPERATION_FAILED",
        }
    }

    /// Whether the caller may retry (timeouts with a larger budget or later).
    pub fn is_retryable(&self) -> bool {
        match self {
            QueryError::Validation { .. } => false,
            QueryError::Timeout { .. } => true,
            QueryError::Operation { retryable, .. } => *retryable,
        }
    }

    /// Recover a typed error carried inside an `anyhow::Error`, or wrap it.
    pub fn from_anyhow(operation: QueryOperation, err: anyhow::Error) -> Self {
        match err.downcast::<QueryError>() {
            Ok(typed) => typed,
            Err(err) => QueryError::operation(operation, err),
        }
    }
}

fn transient_signatures() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(connection reset|econnreset|econnrefused|connection refused|connection closed|broken pipe|deadlock|service ?unavailable|temporarily unavailable|session ?expired|leader ?switch|not a leader|timed out|too many connections)",
        )
        .expect("transient signature regex is valid")
    })
}

fn permanent_signatures() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(syntax ?error|invalid syntax|constraint ?(violation|validation)|already exists|unauthori[sz]ed|authentication|forbidden|invalid input|type ?mismatch)",
        )
        .expect("permanent signature regex is valid")
    })
}

/// Pattern-match a failure message against known transient and permanent
/// signatures. Permanent signatures win; unknown messages are not retryable.
pub fn is_retryable_message(message: &str) -> bool {
    if permanent_signatures().is_match(message) {
        return false;
    }
    transient_signatures().is_match(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_joins_issues() {
        let err = QueryError::validation(vec![
            ValidationIssue {
                path: "entity_type".into(),
                message: "Invalid enum value".into(),
            },
            ValidationIssue {
                path: "depth".into(),
                message: "Number must be between 1 and 10".into(),
            },
        ]);
        match &err {
            QueryError::Validation { message, issues } => {
                assert_eq!(
                    message,
                    "entity_type: Invalid enum value; depth: Number must be between 1 and 10"
                );
                assert_eq!(issues.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_transient_messages_are_retryable() {
        for msg in [
            "Connection reset by peer",
            "ECONNREFUSED 127.0.0.1:7687",
            "Neo.TransientError.Transaction.DeadlockDetected: deadlock",
            "ServiceUnavailable: no routing servers",
        ] {
            assert!(is_retryable_message(msg), "{}", msg);
        }
    }

    #[test]
    fn test_permanent_messages_are_not_retryable() {
        for msg in [
            "Neo.ClientError.Statement.SyntaxError: Invalid input 'X'",
            "Node(42) already exists with label `File`",
            "The client is unauthorized due to authentication failure",
            "something odd happened",
        ] {
            assert!(!is_retryable_message(msg), "{}", msg);
        }
    }

    #[test]
    fn test_operation_error_uses_context_chain() {
        let err = anyhow::anyhow!("connection reset by peer").context("Traversal query failed");
        let wrapped = QueryError::operation(QueryOperation::Path, err);
        assert!(wrapped.is_retryable());
        assert_eq!(wrapped.code(), "OPERATION_FAILED");
        assert_eq!(wrapped.to_string(), "get_path failed: Traversal query failed");
    }

    #[test]
    fn test_typed_errors_are_not_double_wrapped() {
        let inner: anyhow::Error = QueryError::Timeout {
            operation: QueryOperation::Dependencies,
            timeout_ms: 50,
        }
        .into();
        let recovered = QueryError::from_anyhow(QueryOperation::Dependencies, inner);
        assert!(matches!(
            recovered,
            QueryError::Timeout { timeout_ms: 50, .. }
        ));
        assert!(recovered.is_retryable());
    }
}
