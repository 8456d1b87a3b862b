//! Error types for etos-core
//!
//! Two families live here. Structural errors (unknown tags, missing or
//! malformed attributes, bad capacities) are raised while a document is
//! turned into processes and abort a run before it starts. Kernel misuse
//! errors (negative delays, over-capacity requests, released scopes) are
//! raised while the scheduler runs and abort the whole run.
//!
//! Control signals are *not* errors; see [`crate::ExceptionEvent`].

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // === Structural ===
    #[error("Unknown entity tag: {0}")]
    UnknownTag(String),

    #[error("Entity tag already registered: {0}")]
    DuplicateTag(String),

    #[error("Missing attribute '{attr}' on <{tag}>")]
    MissingAttribute { tag: String, attr: String },

    #[error("Invalid attribute '{attr}' on <{tag}>: {reason}")]
    InvalidAttribute {
        tag: String,
        attr: String,
        reason: String,
    },

    #[error("Unresolved parameter: {0}")]
    UnresolvedParameter(String),

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid capacity for '{key}': {reason}")]
    InvalidCapacity { key: String, reason: String },

    #[error("Invalid distribution: {0}")]
    InvalidDistribution(String),

    #[error("Invalid property path: {0}")]
    InvalidPropertyPath(String),

    // === Property access ===
    #[error("Property not found: {0}")]
    PropertyNotFound(String),

    #[error("Property is read-only: {0}")]
    ReadOnlyProperty(String),

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    // === Kernel misuse ===
    #[error("Negative delay: {0}")]
    NegativeDelay(f64),

    #[error("Request of {requested} exceeds capacity {capacity} of '{key}'")]
    CapacityExceeded {
        key: String,
        requested: f64,
        capacity: f64,
    },

    #[error("Negative amount {amount} for '{key}'")]
    NegativeAmount { key: String, amount: f64 },

    #[error("Process {pid} does not hold '{key}'")]
    NotHolding { key: String, pid: u64 },

    #[error("Unknown shared object: {0}")]
    UnknownSharedObject(String),

    #[error("Shared object '{key}' is a {actual}, not a {expected}")]
    SharedKindMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Scope {0} has been released")]
    ScopeReleased(u64),

    #[error("Process not found: {0}")]
    ProcessNotFound(u64),

    #[error("Unknown signal: {0}")]
    UnknownSignal(u64),

    #[error("<{tag}> cannot handle wake {wake}")]
    UnexpectedWake { tag: String, wake: String },
}

impl Error {
    /// Build a missing attribute error for a node tag
    pub fn missing(tag: &str, attr: &str) -> Self {
        Error::MissingAttribute {
            tag: tag.to_string(),
            attr: attr.to_string(),
        }
    }

    /// Build an invalid attribute error for a node tag
    pub fn invalid(tag: &str, attr: &str, reason: impl Into<String>) -> Self {
        Error::InvalidAttribute {
            tag: tag.to_string(),
            attr: attr.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error is detected while building processes (as opposed
    /// to while the scheduler is running)
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::UnknownTag(_)
                | Error::DuplicateTag(_)
                | Error::MissingAttribute { .. }
                | Error::InvalidAttribute { .. }
                | Error::UnresolvedParameter(_)
                | Error::InvalidStructure(_)
                | Error::InvalidCapacity { .. }
                | Error::InvalidDistribution(_)
                | Error::InvalidPropertyPath(_)
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_classification() {
        assert!(Error::UnknownTag("x".into()).is_structural());
        assert!(Error::missing("pause", "duration").is_structural());
        assert!(!Error::NegativeDelay(-1.0).is_structural());
        assert!(!Error::ScopeReleased(3).is_structural());
    }

    #[test]
    fn test_messages() {
        let err = Error::missing("pause", "duration");
        assert_eq!(err.to_string(), "Missing attribute 'duration' on <pause>");
        let err = Error::CapacityExceeded {
            key: "tank".into(),
            requested: 120.0,
            capacity: 100.0,
        };
        assert_eq!(
            err.to_string(),
            "Request of 120 exceeds capacity 100 of 'tank'"
        );
    }
}
