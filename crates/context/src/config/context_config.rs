//! Context configuration and builder

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use service_builder::builder;

use crate::binding::BindingScope;
use crate::config::ConfigError;

pub const ENV_CONTEXT_NAME: &str = "ELIF_CONTEXT_NAME";
pub const ENV_CONTEXT_SCOPE: &str = "ELIF_CONTEXT_SCOPE";
pub const ENV_INTERCEPTOR_GROUPS: &str = "ELIF_INTERCEPTOR_GROUPS";
pub const ENV_NOTIFICATION_TIMEOUT_MS: &str = "ELIF_NOTIFICATION_TIMEOUT_MS";

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value loaded from environment variable
    EnvVar(String),
    /// Default value used
    Default,
    /// Value provided programmatically
    Programmatic,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::EnvVar(var) => write!(f, "Environment variable: {}", var),
            ConfigSource::Default => write!(f, "Default value"),
            ConfigSource::Programmatic => write!(f, "Programmatically set"),
        }
    }
}

/// Settings applied when a context is created
#[derive(Debug, Clone)]
#[builder]
pub struct ContextConfig {
    /// Context name; a unique name is generated when absent
    #[builder(getter, default)]
    pub name: Option<String>,

    /// Scope tag of the context (request/server/application boundaries)
    #[builder(getter, default = "BindingScope::Context")]
    pub scope: BindingScope,

    /// Ordered global interceptor groups, bound at creation when non-empty
    #[builder(getter, default)]
    pub interceptor_groups: Vec<String>,

    /// Default timeout when waiting for observers to drain
    #[builder(getter, default)]
    pub notification_timeout: Option<Duration>,

    /// Panic instead of logging when an error reaches no error listener
    #[builder(getter, default)]
    pub panic_on_unhandled_error: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            name: None,
            scope: BindingScope::Context,
            interceptor_groups: Vec::new(),
            notification_timeout: None,
            panic_on_unhandled_error: false,
        }
    }
}

impl ContextConfig {
    /// Configuration for a named context
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(name) = ConfigError::read_env(ENV_CONTEXT_NAME)? {
            config.name = Some(name);
        }

        if let Some(scope) = ConfigError::read_env(ENV_CONTEXT_SCOPE)? {
            config.scope = scope.parse()?;
        }

        if let Some(groups) = ConfigError::read_env(ENV_INTERCEPTOR_GROUPS)? {
            config.interceptor_groups = groups
                .split(',')
                .map(|group| group.trim().to_string())
                .filter(|group| !group.is_empty())
                .collect();
        }

        if let Some(timeout) = ConfigError::read_env(ENV_NOTIFICATION_TIMEOUT_MS)? {
            let millis = timeout.parse::<u64>().map_err(|_| {
                ConfigError::invalid_value(ENV_NOTIFICATION_TIMEOUT_MS, &timeout, "milliseconds as an unsigned integer")
            })?;
            config.notification_timeout = Some(Duration::from_millis(millis));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(name) = &self.name {
            if name.trim().is_empty() {
                return Err(ConfigError::inconsistent("context name must not be blank"));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for group in &self.interceptor_groups {
            if group.is_empty() {
                return Err(ConfigError::inconsistent("interceptor group names must not be empty"));
            }
            if !seen.insert(group) {
                return Err(ConfigError::inconsistent(format!(
                    "interceptor group '{}' is listed more than once",
                    group
                )));
            }
        }

        Ok(())
    }

    /// Report where each value came from, for diagnostics
    pub fn config_sources(&self) -> HashMap<String, ConfigSource> {
        let source_of = |var: &str, is_set: bool| {
            if env::var_os(var).is_some() {
                ConfigSource::EnvVar(var.to_string())
            } else if is_set {
                ConfigSource::Programmatic
            } else {
                ConfigSource::Default
            }
        };

        let mut sources = HashMap::new();
        sources.insert("name".to_string(), source_of(ENV_CONTEXT_NAME, self.name.is_some()));
        sources.insert(
            "scope".to_string(),
            source_of(ENV_CONTEXT_SCOPE, self.scope != BindingScope::Context),
        );
        sources.insert(
            "interceptor_groups".to_string(),
            source_of(ENV_INTERCEPTOR_GROUPS, !self.interceptor_groups.is_empty()),
        );
        sources.insert(
            "notification_timeout".to_string(),
            source_of(ENV_NOTIFICATION_TIMEOUT_MS, self.notification_timeout.is_some()),
        );
        sources
    }
}
