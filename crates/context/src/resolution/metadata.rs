//! Class metadata: the injection points, interceptors and binding hints
//! registered for an injectable type

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{json, Value};

use crate::binding::{BindingScope, BindingTag, TagMap};
use crate::errors::ContextResult;
use crate::interception::{InterceptorOrKey, InvocationTarget};
use crate::resolution::arguments::{Arguments, Properties};
use crate::resolution::injection::Injection;

/// Injection and interception data of one method
#[derive(Debug, Clone, Default)]
pub struct MethodMetadata {
    pub arity: usize,
    pub injections: Vec<Option<Arc<Injection>>>,
    pub interceptors: Vec<InterceptorOrKey>,
}

/// Everything the resolver needs to know about a class
#[derive(Debug, Clone, Default)]
pub struct ClassMetadata {
    name: &'static str,
    constructor_arity: usize,
    constructor: Vec<Option<Arc<Injection>>>,
    properties: IndexMap<String, Arc<Injection>>,
    methods: HashMap<String, MethodMetadata>,
    interceptors: Vec<InterceptorOrKey>,
    namespace: Option<String>,
    scope: Option<BindingScope>,
    tags: TagMap,
}

impl ClassMetadata {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Declared number of constructor parameters
    pub fn constructor_arity(mut self, arity: usize) -> Self {
        self.constructor_arity = arity;
        self
    }

    /// Inject constructor parameter `index`
    pub fn inject(mut self, index: usize, injection: Injection) -> Self {
        let injection = injection.at_constructor(self.name, index);
        set_slot(&mut self.constructor, index, Arc::new(injection));
        self
    }

    /// Inject property `name`
    pub fn inject_property(mut self, name: &str, injection: Injection) -> Self {
        let injection = injection.at_property(self.name, name);
        self.properties.insert(name.to_string(), Arc::new(injection));
        self
    }

    /// Declare a method and its parameter count
    pub fn method(mut self, name: &str, arity: usize) -> Self {
        self.methods.entry(name.to_string()).or_default().arity = arity;
        self
    }

    /// Inject parameter `index` of `method`
    pub fn inject_method(mut self, method: &str, index: usize, injection: Injection) -> Self {
        let injection = injection.at_method(self.name, method, index);
        let entry = self.methods.entry(method.to_string()).or_default();
        set_slot(&mut entry.injections, index, Arc::new(injection));
        self
    }

    /// Class level interceptors
    pub fn intercept<I>(mut self, interceptors: I) -> Self
    where
        I: IntoIterator<Item = InterceptorOrKey>,
    {
        self.interceptors.extend(interceptors);
        self
    }

    /// Method level interceptors
    pub fn intercept_method<I>(mut self, method: &str, interceptors: I) -> Self
    where
        I: IntoIterator<Item = InterceptorOrKey>,
    {
        self.methods
            .entry(method.to_string())
            .or_default()
            .interceptors
            .extend(interceptors);
        self
    }

    /// Namespace used by `create_binding_from_class`
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Default scope of bindings created from this class
    pub fn scope(mut self, scope: BindingScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Tag applied to bindings created from this class
    pub fn tag(mut self, tag: impl Into<BindingTag>) -> Self {
        match tag.into() {
            BindingTag::Name(name) => {
                self.tags.insert(name.clone(), Value::String(name));
            }
            BindingTag::NameValue(name, value) => {
                self.tags.insert(name, value);
            }
            BindingTag::Map(map) => self.tags.extend(map),
        }
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get_namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn get_scope(&self) -> Option<BindingScope> {
        self.scope
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn class_interceptors(&self) -> &[InterceptorOrKey] {
        &self.interceptors
    }

    pub fn method_interceptors(&self, method: &str) -> &[InterceptorOrKey] {
        self.methods
            .get(method)
            .map(|m| m.interceptors.as_slice())
            .unwrap_or(&[])
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Declared parameter count of the constructor (`None`) or a method
    pub fn arity(&self, method: Option<&str>) -> usize {
        match method {
            None => self.constructor_arity,
            Some(name) => self.methods.get(name).map_or(0, |m| m.arity),
        }
    }

    /// Parameter injections of the constructor (`None`) or a method, by index
    pub fn injected_arguments(&self, method: Option<&str>) -> &[Option<Arc<Injection>>] {
        match method {
            None => &self.constructor,
            Some(name) => self
                .methods
                .get(name)
                .map(|m| m.injections.as_slice())
                .unwrap_or(&[]),
        }
    }

    pub fn injected_properties(&self) -> &IndexMap<String, Arc<Injection>> {
        &self.properties
    }

    /// `Class` or `Class.prototype.method`
    pub fn member_name(&self, method: Option<&str>) -> String {
        match method {
            None => self.name.to_string(),
            Some(method) => format!("{}.prototype.{}", self.name, method),
        }
    }

    /// Injection metadata as JSON, used by binding inspection
    pub fn inspect_injections(&self) -> Value {
        let constructor_arguments: Vec<Value> = self
            .constructor
            .iter()
            .map(|slot| slot.as_ref().map_or(Value::Null, |injection| injection.describe()))
            .collect();
        let properties: serde_json::Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, injection)| (name.clone(), injection.describe()))
            .collect();
        let mut json = json!({});
        if !constructor_arguments.is_empty() {
            json["constructorArguments"] = Value::Array(constructor_arguments);
        }
        if !properties.is_empty() {
            json["properties"] = Value::Object(properties);
        }
        json
    }
}

fn set_slot(slots: &mut Vec<Option<Arc<Injection>>>, index: usize, injection: Arc<Injection>) {
    if slots.len() <= index {
        slots.resize(index + 1, None);
    }
    slots[index] = Some(injection);
}

/// A type the container can construct
///
/// `metadata()` is evaluated once per type and cached.
pub trait Injectable: Sized + Send + Sync + 'static {
    fn metadata() -> ClassMetadata;

    /// Build an instance from resolved constructor arguments and properties
    fn construct(args: Arguments, properties: Properties) -> ContextResult<Self>;

    /// Expose the instance to interceptor proxies
    fn into_invocation_target(self: Arc<Self>) -> Option<Arc<dyn InvocationTarget>> {
        None
    }
}

fn registry() -> &'static RwLock<HashMap<TypeId, Arc<ClassMetadata>>> {
    static REGISTRY: OnceLock<RwLock<HashMap<TypeId, Arc<ClassMetadata>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Cached metadata of `T`
pub fn class_metadata<T: Injectable>() -> Arc<ClassMetadata> {
    let type_id = TypeId::of::<T>();
    if let Some(metadata) = registry().read().get(&type_id) {
        return metadata.clone();
    }
    let metadata = Arc::new(T::metadata());
    registry().write().entry(type_id).or_insert(metadata).clone()
}

/// Parameter injections of `T`'s constructor or of one of its methods
pub fn describe_injected_arguments<T: Injectable>(method: Option<&str>) -> Vec<Option<Arc<Injection>>> {
    class_metadata::<T>().injected_arguments(method).to_vec()
}

/// Property injections of `T`
pub fn describe_injected_properties<T: Injectable>() -> IndexMap<String, Arc<Injection>> {
    class_metadata::<T>().injected_properties().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Greeter;

    impl Injectable for Greeter {
        fn metadata() -> ClassMetadata {
            ClassMetadata::new("Greeter")
                .constructor_arity(2)
                .inject(1, Injection::key("greeting"))
                .inject_property("prefix", Injection::key("prefix").optional())
                .method("greet", 1)
                .inject_method("greet", 0, Injection::key("name"))
                .namespace("services")
                .tag("greeter")
                .scope(BindingScope::Singleton)
        }

        fn construct(_args: Arguments, _properties: Properties) -> ContextResult<Self> {
            Ok(Greeter)
        }
    }

    #[test]
    fn test_describe_injections() {
        let args = describe_injected_arguments::<Greeter>(None);
        assert_eq!(args.len(), 2);
        assert!(args[0].is_none());
        assert_eq!(args[1].as_ref().unwrap().target_name(), "Greeter[1]");

        let method_args = describe_injected_arguments::<Greeter>(Some("greet"));
        assert_eq!(method_args[0].as_ref().unwrap().target_name(), "Greeter.prototype.greet[0]");

        let props = describe_injected_properties::<Greeter>();
        assert!(props["prefix"].metadata.optional);
    }

    #[test]
    fn test_metadata_is_cached() {
        let first = class_metadata::<Greeter>();
        let second = class_metadata::<Greeter>();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.arity(None), 2);
        assert_eq!(first.arity(Some("greet")), 1);
        assert_eq!(first.get_scope(), Some(BindingScope::Singleton));
        assert_eq!(first.get_namespace(), Some("services"));
    }

    #[test]
    fn test_inspect_injections() {
        let json = class_metadata::<Greeter>().inspect_injections();
        assert_eq!(json["constructorArguments"][0], Value::Null);
        assert_eq!(json["constructorArguments"][1]["targetName"], json!("Greeter[1]"));
        assert_eq!(json["properties"]["prefix"]["metadata"]["optional"], json!(true));
    }
}
