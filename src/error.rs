//! Error types for registration and resolution.
//!
//! Every failed top-level `resolve` surfaces exactly one [`DiError`]. The
//! engine performs no local recovery: any failure aborts the whole call and
//! the resolution stack is unwound on every exit path.

use thiserror::Error;

/// Error type for all container operations.
#[derive(Debug, Error)]
pub enum DiError {
    /// No descriptor is registered for the id and the id does not name a
    /// described constructible type.
    #[error("service '{id}' not found (requested by {requested_by})")]
    NotFound { id: String, requested_by: String },

    /// The id reappeared on the active resolution stack.
    #[error("circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Constructor metadata for a required type was never described.
    #[error("cannot introspect constructor of '{type_name}': {reason}")]
    Introspection { type_name: String, reason: String },

    /// A factory, hook, interceptor or constructor body failed during
    /// resolution. The original failure is preserved as the cause.
    #[error("construction of '{id}' failed: {source}")]
    Construction {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    /// Raised by a consumer's `validate()`; propagates unmodified through
    /// the engine.
    #[error("validation of '{type_name}' failed: {message}")]
    Validation { type_name: String, message: String },
}

impl DiError {
    pub fn not_found(id: impl Into<String>, requested_by: impl Into<String>) -> Self {
        DiError::NotFound {
            id: id.into(),
            requested_by: requested_by.into(),
        }
    }

    pub fn introspection(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        DiError::Introspection {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub fn construction(id: impl Into<String>, source: anyhow::Error) -> Self {
        DiError::Construction {
            id: id.into(),
            source,
        }
    }

    pub fn validation(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        DiError::Validation {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    /// Map a failure raised by user-supplied extension code (factory, hook,
    /// interceptor, constructor body) into the engine's error taxonomy.
    ///
    /// Typed engine errors pass through unmodified (a cycle hit by a nested
    /// resolve inside a factory is still a cycle; a validation failure stays
    /// a validation failure). Everything else wraps in `Construction` with
    /// the failing id.
    pub(crate) fn from_extension_failure(id: &str, err: anyhow::Error) -> Self {
        match err.downcast::<DiError>() {
            Ok(di) => di,
            Err(other) => DiError::construction(id, other),
        }
    }

    /// Error category for diagnostics and log filtering.
    pub fn category(&self) -> &'static str {
        match self {
            DiError::NotFound { .. } => "not_found",
            DiError::CircularDependency { .. } => "circular_dependency",
            DiError::Introspection { .. } => "introspection",
            DiError::Construction { .. } => "construction",
            DiError::Validation { .. } => "validation",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_cycle_display_names_full_path() {
        let err = DiError::CircularDependency {
            cycle: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "circular dependency detected: A -> B -> A");
        assert_eq!(err.category(), "circular_dependency");
    }

    #[test]
    fn test_construction_preserves_cause() {
        let err = DiError::construction("Widget", anyhow!("ctor blew up"));
        assert!(err.to_string().contains("Widget"));
        assert!(err.to_string().contains("ctor blew up"));
    }

    #[test]
    fn test_extension_failure_keeps_validation_unwrapped() {
        let inner = anyhow::Error::new(DiError::validation("Form", "missing field"));
        match DiError::from_extension_failure("form", inner) {
            DiError::Validation { type_name, .. } => assert_eq!(type_name, "Form"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_extension_failure_wraps_everything_else() {
        let inner = anyhow!("plain failure");
        match DiError::from_extension_failure("svc", inner) {
            DiError::Construction { id, .. } => assert_eq!(id, "svc"),
            other => panic!("expected Construction, got {other:?}"),
        }
    }
}
