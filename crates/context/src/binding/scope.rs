use serde::{Deserialize, Serialize};

/// Binding scope enumeration
///
/// The scope decides which context caches a resolved value and therefore how
/// widely that value is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingScope {
    /// New value on every resolution
    #[default]
    Transient,
    /// One value per resolution context
    Context,
    /// One value per owning context of the binding
    Singleton,
    /// One value per context tagged as the application boundary
    Application,
    /// One value per context tagged as a server boundary
    Server,
    /// One value per request context, falling back to the current context
    Request,
}

impl BindingScope {
    /// Check if the scope is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, BindingScope::Transient)
    }

    /// Check if the scope is singleton
    pub fn is_singleton(&self) -> bool {
        matches!(self, BindingScope::Singleton)
    }

    /// Scopes resolved against an explicitly tagged ancestor context
    pub fn is_boundary(&self) -> bool {
        matches!(
            self,
            BindingScope::Application | BindingScope::Server | BindingScope::Request
        )
    }

    /// Get the scope name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingScope::Transient => "transient",
            BindingScope::Context => "context",
            BindingScope::Singleton => "singleton",
            BindingScope::Application => "application",
            BindingScope::Server => "server",
            BindingScope::Request => "request",
        }
    }
}

impl std::fmt::Display for BindingScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BindingScope {
    type Err = crate::config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transient" => Ok(BindingScope::Transient),
            "context" => Ok(BindingScope::Context),
            "singleton" => Ok(BindingScope::Singleton),
            "application" => Ok(BindingScope::Application),
            "server" => Ok(BindingScope::Server),
            "request" => Ok(BindingScope::Request),
            _ => Err(crate::config::ConfigError::invalid_value(
                "scope",
                s,
                "transient, context, singleton, application, server or request",
            )),
        }
    }
}

/// Kind of value source configured on a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BindingType {
    Constant,
    DynamicValue,
    Class,
    Provider,
    Alias,
}

impl BindingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingType::Constant => "Constant",
            BindingType::DynamicValue => "DynamicValue",
            BindingType::Class => "Class",
            BindingType::Provider => "Provider",
            BindingType::Alias => "Alias",
        }
    }
}

impl std::fmt::Display for BindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
