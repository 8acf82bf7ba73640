use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{ContextError, ContextResult};
use crate::value_promise::{downcast_value, BoundValue, ResolvedValue};

/// Positional arguments of a constructor or method call
#[derive(Clone, Default)]
pub struct Arguments {
    target: String,
    values: Vec<ResolvedValue>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: Vec<ResolvedValue>) -> Self {
        Self {
            target: String::new(),
            values,
        }
    }

    /// Name used in error messages (`Class` or `Class.prototype.method`)
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Append a value
    pub fn arg<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.values.push(Some(Arc::new(value)));
        self
    }

    /// Append an already type-erased value
    pub fn arg_bound(mut self, value: ResolvedValue) -> Self {
        self.values.push(value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn slot_name(&self, index: usize) -> String {
        if self.target.is_empty() {
            format!("argument[{}]", index)
        } else {
            format!("{}[{}]", self.target, index)
        }
    }

    /// Raw value at `index`
    pub fn raw(&self, index: usize) -> Option<&BoundValue> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Typed value at `index`; a missing value is an error
    pub fn get<T: Any + Send + Sync>(&self, index: usize) -> ContextResult<Arc<T>> {
        match self.get_optional(index)? {
            Some(value) => Ok(value),
            None => Err(ContextError::invalid_injection(
                self.slot_name(index),
                "no value was resolved",
            )),
        }
    }

    /// Typed value at `index`, `None` when absent
    pub fn get_optional<T: Any + Send + Sync>(&self, index: usize) -> ContextResult<Option<Arc<T>>> {
        match self.raw(index) {
            Some(value) => downcast_value::<T>(&self.slot_name(index), value.clone()).map(Some),
            None => Ok(None),
        }
    }

    /// Clone of a typed value at `index`
    pub fn cloned<T: Any + Send + Sync + Clone>(&self, index: usize) -> ContextResult<T> {
        self.get::<T>(index).map(|value| value.as_ref().clone())
    }

    /// Typed list of values injected by filter or tag at `index`
    pub fn values<T: Any + Send + Sync>(&self, index: usize) -> ContextResult<Vec<Arc<T>>> {
        let list = self.get::<Vec<BoundValue>>(index)?;
        downcast_list(&self.slot_name(index), &list)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedValue> {
        self.values.iter()
    }

    pub fn into_values(self) -> Vec<ResolvedValue> {
        self.values
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arguments")
            .field("target", &self.target)
            .field("len", &self.values.len())
            .finish()
    }
}

/// Injected property values keyed by property name
#[derive(Clone, Default)]
pub struct Properties {
    target: String,
    values: HashMap<String, ResolvedValue>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(target: impl Into<String>, entries: Vec<(String, ResolvedValue)>) -> Self {
        Self {
            target: target.into(),
            values: entries.into_iter().collect(),
        }
    }

    fn slot_name(&self, name: &str) -> String {
        format!("{}.prototype.{}", self.target, name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> ContextResult<Arc<T>> {
        match self.get_optional(name)? {
            Some(value) => Ok(value),
            None => Err(ContextError::invalid_injection(self.slot_name(name), "no value was resolved")),
        }
    }

    pub fn get_optional<T: Any + Send + Sync>(&self, name: &str) -> ContextResult<Option<Arc<T>>> {
        match self.values.get(name).and_then(Option::as_ref) {
            Some(value) => downcast_value::<T>(&self.slot_name(name), value.clone()).map(Some),
            None => Ok(None),
        }
    }

    pub fn values<T: Any + Send + Sync>(&self, name: &str) -> ContextResult<Vec<Arc<T>>> {
        let list = self.get::<Vec<BoundValue>>(name)?;
        downcast_list(&self.slot_name(name), &list)
    }
}

impl std::fmt::Debug for Properties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("Properties")
            .field("target", &self.target)
            .field("names", &names)
            .finish()
    }
}

fn downcast_list<T: Any + Send + Sync>(target: &str, list: &[BoundValue]) -> ContextResult<Vec<Arc<T>>> {
    list.iter()
        .map(|value| downcast_value::<T>(target, value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_access() {
        let args = Arguments::new().arg(42u32).arg("hello".to_string()).arg_bound(None);
        assert_eq!(args.len(), 3);
        assert_eq!(*args.get::<u32>(0).unwrap(), 42);
        assert_eq!(args.cloned::<String>(1).unwrap(), "hello");
        assert!(args.get_optional::<u32>(2).unwrap().is_none());
        assert!(args.get::<u32>(2).is_err());
    }

    #[test]
    fn test_type_mismatch_names_slot() {
        let args = Arguments::new().arg(1u8).with_target("Greeter");
        let err = args.get::<String>(0).unwrap_err();
        assert!(err.to_string().contains("Greeter[0]"));
    }

    #[test]
    fn test_values_list() {
        let list: Vec<BoundValue> = vec![Arc::new(1i32), Arc::new(2i32)];
        let args = Arguments::new().arg(list);
        let values = args.values::<i32>(0).unwrap();
        assert_eq!(values.iter().map(|v| **v).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_properties() {
        let props = Properties::from_entries(
            "Server",
            vec![("port".to_string(), Some(Arc::new(8080u16) as BoundValue)), ("host".to_string(), None)],
        );
        assert_eq!(*props.get::<u16>("port").unwrap(), 8080);
        assert!(props.get_optional::<String>("host").unwrap().is_none());
        assert!(props.get::<String>("port").unwrap_err().to_string().contains("Server.prototype.port"));
    }
}
