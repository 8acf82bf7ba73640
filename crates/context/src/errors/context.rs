use std::sync::Arc;
use thiserror::Error;

use crate::config::ConfigError;

/// Diagnostics attached to a resolution failure
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionDetails {
    /// Name of the context the resolution was started from
    pub context: String,
    /// Key of the binding being resolved, if any
    pub binding_key: Option<String>,
    /// Rendered resolution path (`a --> @Class[0] --> b`)
    pub resolution_path: String,
}

impl std::fmt::Display for ResolutionDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "context: {}", self.context)?;
        if let Some(key) = &self.binding_key {
            write!(f, ", binding: {}", key)?;
        }
        if !self.resolution_path.is_empty() {
            write!(f, ", resolutionPath: {}", self.resolution_path)?;
        }
        Ok(())
    }
}

/// Error type for the context container
///
/// Errors are `Clone` because a single failed in-flight resolution is shared
/// by every caller waiting on the same cached future.
#[derive(Debug, Clone, Error)]
pub enum ContextError {
    #[error("Invalid binding key: {message}")]
    InvalidKey { message: String },

    #[error("Cannot rebind key \"{key}\" to a locked binding")]
    LockedRebind { key: String },

    #[error("Cannot unbind key \"{key}\" of a locked binding")]
    LockedUnbind { key: String },

    #[error("The key '{key}' is not bound to any value in context {context}")]
    NotBound { key: String, context: String },

    #[error("Binding \"{key}\" in context \"{context}\" cannot be resolved in scope \"{scope}\"")]
    ScopeNotFound {
        key: String,
        context: String,
        scope: String,
    },

    #[error("Resolution context \"{resolution_context}\" does not have visibility to binding \"{key} (scope:{scope})\" in context \"{owner}\"")]
    NotVisible {
        key: String,
        scope: String,
        owner: String,
        resolution_context: String,
    },

    #[error("Circular dependency detected: {path}")]
    CircularDependency { path: String },

    #[error("{message} ({details})")]
    Resolution {
        message: String,
        details: ResolutionDetails,
    },

    #[error("Cannot get {key} synchronously: the value is a promise")]
    AsyncValue { key: String },

    #[error("The value of {target} cannot be used as {expected}")]
    TypeMismatch { target: String, expected: String },

    #[error("Invalid injection for {target}: {message}")]
    InvalidInjection { target: String, message: String },

    #[error("Method {target}.{method} not found")]
    MethodNotFound { target: String, method: String },

    #[error("Interceptor {key} is not a function")]
    InvalidInterceptor { key: String },

    #[error("The ContextView has more than one value ({count}). Use values() to access them.")]
    MultipleValues { count: usize },

    #[error("Context \"{context}\" is closed")]
    ContextClosed { context: String },

    #[error("Observer failed on {event} of binding \"{key}\": {message}")]
    Observer {
        event: String,
        key: String,
        message: String,
    },

    #[error("Timed out after {millis}ms waiting for {operation}")]
    Timeout { operation: String, millis: u64 },

    #[error("Async runtime error: {message}")]
    Runtime { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{message}")]
    Custom { message: String },

    #[error(transparent)]
    Other(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl ContextError {
    /// Create an invalid key error
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }

    /// Create a not bound error
    pub fn not_bound(key: impl Into<String>, context: impl Into<String>) -> Self {
        Self::NotBound {
            key: key.into(),
            context: context.into(),
        }
    }

    /// Create a resolution error carrying diagnostics
    pub fn resolution(message: impl Into<String>, details: ResolutionDetails) -> Self {
        Self::Resolution {
            message: message.into(),
            details,
        }
    }

    /// Create a type mismatch error
    pub fn type_mismatch(target: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            target: target.into(),
            expected: expected.into(),
        }
    }

    /// Create an invalid injection error
    pub fn invalid_injection(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInjection {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Create an error with a free-form message
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }

    /// Wrap any error raised by user code (factories, providers, observers)
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Arc::new(error))
    }

    /// Check if the error reports a missing binding
    pub fn is_not_bound(&self) -> bool {
        matches!(self, Self::NotBound { .. })
    }

    /// Check if the error reports a dependency cycle
    pub fn is_circular_dependency(&self) -> bool {
        matches!(self, Self::CircularDependency { .. })
    }

    /// Check if the error comes from a locked binding
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::LockedRebind { .. } | Self::LockedUnbind { .. })
    }

    /// Check if the error is a resolution failure of any kind
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::NotBound { .. }
                | Self::ScopeNotFound { .. }
                | Self::NotVisible { .. }
                | Self::CircularDependency { .. }
                | Self::Resolution { .. }
        )
    }
}

/// Result type for context operations
pub type ContextResult<T> = Result<T, ContextError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_messages() {
        let err = ContextError::LockedRebind { key: "k".to_string() };
        assert_eq!(err.to_string(), "Cannot rebind key \"k\" to a locked binding");
        assert!(err.is_locked());

        let err = ContextError::LockedUnbind { key: "k".to_string() };
        assert_eq!(err.to_string(), "Cannot unbind key \"k\" of a locked binding");
    }

    #[test]
    fn test_resolution_error_carries_details() {
        let err = ContextError::resolution(
            "No value was configured for binding foo.",
            ResolutionDetails {
                context: "app".to_string(),
                binding_key: Some("foo".to_string()),
                resolution_path: "bar --> foo".to_string(),
            },
        );
        let message = err.to_string();
        assert!(message.contains("No value was configured for binding foo."));
        assert!(message.contains("context: app"));
        assert!(message.contains("resolutionPath: bar --> foo"));
        assert!(err.is_resolution());
    }

    #[test]
    fn test_other_wraps_user_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let err = ContextError::other(io);
        assert_eq!(err.to_string(), "disk on fire");
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), "disk on fire");
    }
}
