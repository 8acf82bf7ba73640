//! Errors raised while loading or checking a [`ContextConfig`](super::ContextConfig)

use std::env::VarError;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A setting could not be parsed
    #[error("Invalid value for '{field}': '{value}' (expected {expected})")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    /// Settings that parse but cannot be used together
    #[error("Invalid context configuration: {message}")]
    Inconsistent { message: String },

    /// A variable is set but cannot be read as a string
    #[error("Environment variable {var} is not valid unicode")]
    UnreadableEnv { var: String },
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, value: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent {
            message: message.into(),
        }
    }

    /// `None` when `var` is unset; set but non-unicode is an error
    pub fn read_env(var: &str) -> Result<Option<String>, ConfigError> {
        match std::env::var(var) {
            Ok(value) => Ok(Some(value)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => Err(Self::UnreadableEnv { var: var.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_message() {
        let err = ConfigError::invalid_value("scope", "galaxy", "a binding scope");
        assert_eq!(err.to_string(), "Invalid value for 'scope': 'galaxy' (expected a binding scope)");
    }

    #[test]
    fn test_read_env_unset_is_none() {
        assert_eq!(ConfigError::read_env("ELIF_CONTEXT_TEST_NEVER_SET"), Ok(None));
    }
}
