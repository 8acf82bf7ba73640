//! Binding keys and well-known key/tag names

use uuid::Uuid;

use crate::errors::{ContextError, ContextResult};

/// Separator between a binding key and a deep property path
pub const PROPERTY_SEPARATOR: char = '#';

/// Suffix appended to a binding key to address its configuration
pub const CONFIG_KEY_SUFFIX: &str = "$config";

/// Address of a binding, optionally pointing into a property of its value
///
/// `BindingKey::create("app.config", Some("db.port"))` renders as
/// `app.config#db.port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingKey {
    key: String,
    property_path: Option<String>,
}

/// Anything that can address a binding
pub type BindingAddress = BindingKey;

impl BindingKey {
    /// Create a key with an optional property path
    pub fn create(key: impl Into<String>, property_path: Option<&str>) -> Self {
        let key = key.into();
        // `create("a#b", None)` is a parse, not a literal key
        if property_path.is_none() {
            return Self::parse_key_with_path(&key);
        }
        Self {
            key,
            property_path: property_path.filter(|p| !p.is_empty()).map(str::to_string),
        }
    }

    /// The key part, never containing the separator
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The deep property path, if any
    pub fn property_path(&self) -> Option<&str> {
        self.property_path.as_deref()
    }

    /// Validate a raw binding key
    pub fn validate(key: &str) -> ContextResult<&str> {
        if key.is_empty() {
            return Err(ContextError::invalid_key("Binding key must be provided."));
        }
        if key.contains(PROPERTY_SEPARATOR) {
            return Err(ContextError::invalid_key(format!(
                "Binding key {} cannot contain '{}'.",
                key, PROPERTY_SEPARATOR
            )));
        }
        Ok(key)
    }

    /// Split `key#path` on the first separator
    pub fn parse_key_with_path(key_with_path: &str) -> Self {
        match key_with_path.split_once(PROPERTY_SEPARATOR) {
            Some((key, path)) => Self {
                key: key.to_string(),
                property_path: if path.is_empty() {
                    None
                } else {
                    Some(path.to_string())
                },
            },
            None => Self {
                key: key_with_path.to_string(),
                property_path: None,
            },
        }
    }

    /// Generate a unique key within a namespace
    pub fn generate(namespace: &str) -> Self {
        let id = Uuid::new_v4();
        let key = if namespace.is_empty() {
            id.to_string()
        } else {
            format!("{}.{}", namespace, id)
        };
        Self {
            key,
            property_path: None,
        }
    }

    /// Build the key that holds configuration for `key`
    pub fn build_key_for_config(key: &str) -> Self {
        let key = if key.is_empty() {
            CONFIG_KEY_SUFFIX.to_string()
        } else {
            format!("{}:{}", key, CONFIG_KEY_SUFFIX)
        };
        Self {
            key,
            property_path: None,
        }
    }

    /// Return a copy of this key pointing at a deep property
    pub fn deep_property(&self, property_path: &str) -> Self {
        let path = match &self.property_path {
            Some(existing) => format!("{}.{}", existing, property_path),
            None => property_path.to_string(),
        };
        Self {
            key: self.key.clone(),
            property_path: Some(path),
        }
    }
}

impl std::fmt::Display for BindingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.property_path {
            Some(path) => write!(f, "{}{}{}", self.key, PROPERTY_SEPARATOR, path),
            None => write!(f, "{}", self.key),
        }
    }
}

impl From<&str> for BindingKey {
    fn from(value: &str) -> Self {
        Self::parse_key_with_path(value)
    }
}

impl From<String> for BindingKey {
    fn from(value: String) -> Self {
        Self::parse_key_with_path(&value)
    }
}

impl From<&String> for BindingKey {
    fn from(value: &String) -> Self {
        Self::parse_key_with_path(value)
    }
}

impl From<&BindingKey> for BindingKey {
    fn from(value: &BindingKey) -> Self {
        value.clone()
    }
}

/// Well-known tag names
pub struct ContextTags;

impl ContextTags {
    pub const CLASS: &'static str = "class";
    pub const PROVIDER: &'static str = "provider";
    pub const NAMESPACE: &'static str = "namespace";
    pub const TYPE: &'static str = "type";
    pub const KEY: &'static str = "key";
    pub const CONFIGURATION_FOR: &'static str = "configurationFor";
    pub const INTERCEPTOR: &'static str = "interceptor";
    pub const GLOBAL_INTERCEPTOR: &'static str = "globalInterceptor";
    pub const GLOBAL_INTERCEPTOR_SOURCE: &'static str = "globalInterceptorSource";
    pub const GLOBAL_INTERCEPTOR_GROUP: &'static str = "globalInterceptorGroup";
}

/// Well-known binding keys
pub struct ContextBindings;

impl ContextBindings {
    pub const CONFIGURATION_RESOLVER: &'static str = "context.configurationResolver";
    pub const GLOBAL_INTERCEPTOR_ORDERED_GROUPS: &'static str = "globalInterceptor.orderedGroups";
    pub const INTERCEPTOR_NAMESPACE: &'static str = "interceptors";
    pub const GLOBAL_INTERCEPTOR_NAMESPACE: &'static str = "globalInterceptors";
}
