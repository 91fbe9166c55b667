//! Textual firewall for store queries.
//!
//! Any host function that accepts a query string validates it against a
//! narrow allow-list grammar before it reaches the persistence
//! collaborator: one statement only, a fixed set of leading verbs, no
//! administrative or bulk-load operations, no query hints. This is a
//! firewall in front of the store, not a replacement for the store's own
//! authorization.

use once_cell::sync::Lazy;
use regex::Regex;

/// Leading verbs accepted for read queries
const READ_VERBS: &[&str] = &["MATCH", "OPTIONAL", "RETURN", "WITH", "UNWIND"];

/// Additional leading verbs accepted for write queries
const WRITE_VERBS: &[&str] = &["CREATE", "MERGE", "SET", "DELETE"];

/// Keywords that mutate data; forbidden anywhere in a read query
static MUTATION_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(CREATE|MERGE|SET|DELETE|REMOVE|DETACH)\b").expect("static pattern")
});

/// Administrative and bulk-load operations; forbidden everywhere
static ADMIN_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\b(DROP|ALTER|GRANT|REVOKE|COPY|IMPORT)\b|\bCREATE\s+(USER|ROLE|DATABASE|INDEX|CONSTRAINT)\b|\bLOAD\s+CSV\b|\bCALL\s+dbms\b|\bapoc\.)",
    )
    .expect("static pattern")
});

/// Query hints; forbidden everywhere
static HINT_KEYWORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bUSING\s+(INDEX|SCAN|JOIN|PERIODIC)\b|/\*\+").expect("static pattern")
});

/// Validates query text against the allow-list grammar
pub struct QueryGuard;

impl QueryGuard {
    /// Validate a read-only query
    ///
    /// # Errors
    ///
    /// Returns the first grammar violation found.
    pub fn validate_read(query: &str) -> Result<(), QueryError> {
        let statement = Self::single_statement(query)?;
        Self::check_common(statement)?;
        if let Some(m) = MUTATION_KEYWORDS.find(statement) {
            return Err(QueryError::DisallowedOperation {
                operation: m.as_str().to_uppercase(),
            });
        }
        Self::check_leading_verb(statement, READ_VERBS)
    }

    /// Validate a write query
    ///
    /// # Errors
    ///
    /// Returns the first grammar violation found.
    pub fn validate_write(query: &str) -> Result<(), QueryError> {
        let statement = Self::single_statement(query)?;
        Self::check_common(statement)?;
        let mut verbs = READ_VERBS.to_vec();
        verbs.extend_from_slice(WRITE_VERBS);
        Self::check_leading_verb(statement, &verbs)
    }

    /// Strip a trailing terminator and reject multi-statement input
    fn single_statement(query: &str) -> Result<&str, QueryError> {
        let trimmed = query.trim();
        if trimmed.is_empty() {
            return Err(QueryError::Empty);
        }
        let trimmed = trimmed.strip_suffix(';').unwrap_or(trimmed);
        if trimmed.contains(';') {
            return Err(QueryError::MultipleStatements);
        }
        Ok(trimmed)
    }

    fn check_common(statement: &str) -> Result<(), QueryError> {
        if let Some(m) = ADMIN_KEYWORDS.find(statement) {
            return Err(QueryError::DisallowedOperation {
                operation: m.as_str().to_uppercase(),
            });
        }
        if HINT_KEYWORDS.is_match(statement) {
            return Err(QueryError::QueryHint);
        }
        Ok(())
    }

    fn check_leading_verb(statement: &str, allowed: &[&str]) -> Result<(), QueryError> {
        let first = statement
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();
        if allowed.contains(&first.as_str()) {
            Ok(())
        } else {
            Err(QueryError::DisallowedVerb { verb: first })
        }
    }
}

/// Query validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Empty query text
    #[error("empty query")]
    Empty,

    /// More than one statement
    #[error("multi-statement queries are not allowed")]
    MultipleStatements,

    /// Administrative, bulk-load, or (in read mode) mutating operation
    #[error("disallowed operation: {operation}")]
    DisallowedOperation {
        /// The offending keyword
        operation: String,
    },

    /// Query hint present
    #[error("query hints are not allowed")]
    QueryHint,

    /// Leading verb outside the allow-list
    #[error("disallowed leading verb: {verb}")]
    DisallowedVerb {
        /// The offending verb
        verb: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_allows_match() {
        assert!(QueryGuard::validate_read("MATCH (n:Node) RETURN n LIMIT 10").is_ok());
        assert!(QueryGuard::validate_read("  match (n) return n;  ").is_ok());
    }

    #[test]
    fn test_read_rejects_mutation() {
        let err = QueryGuard::validate_read("MATCH (n) SET n.x = 1").unwrap_err();
        assert_eq!(
            err,
            QueryError::DisallowedOperation {
                operation: "SET".to_string()
            }
        );
    }

    #[test]
    fn test_write_allows_merge() {
        assert!(QueryGuard::validate_write("MERGE (n:Node {id: 1}) SET n.x = 2").is_ok());
        assert!(QueryGuard::validate_write("CREATE (n:Node {id: 1})").is_ok());
    }

    #[test]
    fn test_multi_statement_rejected() {
        let err = QueryGuard::validate_read("MATCH (n) RETURN n; MATCH (m) RETURN m").unwrap_err();
        assert_eq!(err, QueryError::MultipleStatements);
        // One trailing terminator is tolerated
        assert!(QueryGuard::validate_read("MATCH (n) RETURN n;").is_ok());
    }

    #[test]
    fn test_admin_operations_rejected_everywhere() {
        assert!(QueryGuard::validate_write("DROP DATABASE graph").is_err());
        assert!(QueryGuard::validate_write("CREATE INDEX ON :Node(id)").is_err());
        assert!(QueryGuard::validate_write("CREATE USER admin").is_err());
        assert!(QueryGuard::validate_read("CALL dbms.listConfig()").is_err());
        assert!(QueryGuard::validate_write("LOAD CSV FROM 'file:///x.csv' AS row").is_err());
    }

    #[test]
    fn test_hints_rejected() {
        assert!(QueryGuard::validate_read("MATCH (n) USING INDEX n:Node(id) RETURN n").is_err());
        assert!(QueryGuard::validate_read("MATCH (n) /*+ HASH_JOIN */ RETURN n").is_err());
        assert!(
            QueryGuard::validate_write("USING PERIODIC COMMIT CREATE (n)").is_err()
        );
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(QueryGuard::validate_read("   "), Err(QueryError::Empty));
    }

    #[test]
    fn test_unknown_verb_rejected() {
        let err = QueryGuard::validate_read("EXPLAIN MATCH (n) RETURN n").unwrap_err();
        assert_eq!(
            err,
            QueryError::DisallowedVerb {
                verb: "EXPLAIN".to_string()
            }
        );
    }
}
