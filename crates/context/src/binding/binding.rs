use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::binding::scope::{BindingScope, BindingType};
use crate::context::Context;
use crate::errors::{ContextError, ContextResult, ResolutionDetails};
use crate::interception::proxy::create_proxy_with_interceptors;
use crate::interception::InvocationTarget;
use crate::keys::{BindingAddress, BindingKey, ContextTags};
use crate::provider::Provider;
use crate::resolution::{instantiate_class, Arguments, ClassMetadata, Injectable, ResolutionOptions, ResolutionSession};
use crate::value_promise::{BoundValue, ResolvedValue, ValueOrPromise};

/// Tag values are JSON so they can be inspected and matched uniformly
pub type TagMap = BTreeMap<String, Value>;

/// Factory producing the value of a binding
pub type ValueFactory =
    Arc<dyn Fn(ResolutionContext) -> ContextResult<ValueOrPromise<ResolvedValue>> + Send + Sync>;

/// Reusable binding configuration
pub type BindingTemplate = Arc<dyn Fn(&Binding) + Send + Sync>;

/// Converts a resolved class instance into something the interceptor proxy can drive
pub(crate) type ProxyAdapter = fn(BoundValue) -> Option<Arc<dyn InvocationTarget>>;

/// A tag to add to a binding
#[derive(Debug, Clone, PartialEq)]
pub enum BindingTag {
    /// Tag whose value is its own name
    Name(String),
    /// Tag with an explicit value
    NameValue(String, Value),
    /// Several name/value tags at once
    Map(TagMap),
}

impl From<&str> for BindingTag {
    fn from(name: &str) -> Self {
        BindingTag::Name(name.to_string())
    }
}

impl From<String> for BindingTag {
    fn from(name: String) -> Self {
        BindingTag::Name(name)
    }
}

impl<V: Into<Value>> From<(&str, V)> for BindingTag {
    fn from((name, value): (&str, V)) -> Self {
        BindingTag::NameValue(name.to_string(), value.into())
    }
}

impl<V: Into<Value>> From<(String, V)> for BindingTag {
    fn from((name, value): (String, V)) -> Self {
        BindingTag::NameValue(name, value.into())
    }
}

impl From<TagMap> for BindingTag {
    fn from(map: TagMap) -> Self {
        BindingTag::Map(map)
    }
}

/// What changed on a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingOperation {
    Tag,
    Scope,
    Value,
    Lock,
}

/// Change notification emitted by a binding
#[derive(Debug, Clone)]
pub struct BindingEvent {
    pub binding: Binding,
    pub operation: BindingOperation,
}

pub type BindingEventListener = Arc<dyn Fn(&BindingEvent) + Send + Sync>;

/// Value source of a binding; exactly one kind at a time
#[derive(Clone)]
pub enum BindingSource {
    Constant(BoundValue),
    DynamicValue(ValueFactory),
    Class {
        metadata: Arc<ClassMetadata>,
        factory: ValueFactory,
        proxy_adapter: ProxyAdapter,
    },
    Provider {
        metadata: Arc<ClassMetadata>,
        factory: ValueFactory,
    },
    Alias(BindingKey),
}

impl BindingSource {
    pub fn binding_type(&self) -> BindingType {
        match self {
            BindingSource::Constant(_) => BindingType::Constant,
            BindingSource::DynamicValue(_) => BindingType::DynamicValue,
            BindingSource::Class { .. } => BindingType::Class,
            BindingSource::Provider { .. } => BindingType::Provider,
            BindingSource::Alias(_) => BindingType::Alias,
        }
    }

    fn resolve(&self, rc: ResolutionContext) -> ContextResult<ValueOrPromise<ResolvedValue>> {
        match self {
            BindingSource::Constant(value) => Ok(ValueOrPromise::Value(Some(value.clone()))),
            BindingSource::DynamicValue(factory) => factory(rc),
            BindingSource::Class { factory, .. } => factory(rc),
            BindingSource::Provider { factory, .. } => factory(rc),
            // Resolved at invocation time so the alias follows its target
            BindingSource::Alias(target) => rc.context.get_value_or_promise(target, rc.options),
        }
    }
}

impl std::fmt::Debug for BindingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingSource::Alias(target) => write!(f, "Alias({})", target),
            BindingSource::Class { metadata, .. } => write!(f, "Class({})", metadata.name()),
            BindingSource::Provider { metadata, .. } => write!(f, "Provider({})", metadata.name()),
            other => write!(f, "{}", other.binding_type()),
        }
    }
}

/// Everything a value factory knows about the current resolution
#[derive(Clone)]
pub struct ResolutionContext {
    /// Context the value is resolved (and cached) in
    pub context: Context,
    /// Binding being resolved
    pub binding: Binding,
    /// Options carrying the current session
    pub options: ResolutionOptions,
}

impl ResolutionContext {
    /// Resolve another binding within the current session
    pub fn get_value_or_promise(
        &self,
        address: impl Into<BindingAddress>,
    ) -> ContextResult<ValueOrPromise<ResolvedValue>> {
        let options = ResolutionOptions {
            session: self.options.session.clone(),
            ..ResolutionOptions::default()
        };
        self.context.get_value_or_promise(address, options)
    }

    /// Resolve another binding synchronously within the current session
    pub fn get_sync<T: Any + Send + Sync>(&self, address: impl Into<BindingAddress>) -> ContextResult<Arc<T>> {
        let options = ResolutionOptions {
            session: self.options.session.clone(),
            ..ResolutionOptions::default()
        };
        self.context.get_sync_with(address, options)
    }

    /// Resolve another binding within the current session
    pub async fn get<T: Any + Send + Sync>(&self, address: impl Into<BindingAddress>) -> ContextResult<Arc<T>> {
        let options = ResolutionOptions {
            session: self.options.session.clone(),
            ..ResolutionOptions::default()
        };
        self.context.get_with(address, options).await
    }
}

/// Options for [`Binding::inspect`] and [`Context::inspect`]
#[derive(Debug, Clone, Copy, Default)]
pub struct InspectionOptions {
    /// Include constructor and property injections of class/provider bindings
    pub include_injections: bool,
    /// Include the parent chain
    pub include_parent: bool,
}

struct BindingState {
    scope: BindingScope,
    tags: TagMap,
    source: Option<BindingSource>,
    is_locked: bool,
    generation: u64,
}

struct BindingInner {
    id: Uuid,
    key: String,
    state: RwLock<BindingState>,
    listeners: Mutex<Vec<(u64, BindingEventListener)>>,
    next_listener_id: AtomicU64,
}

/// A named slot in a context holding a value source, a scope and tags
///
/// `Binding` is a handle; clones refer to the same binding.
#[derive(Clone)]
pub struct Binding {
    inner: Arc<BindingInner>,
}

impl Binding {
    /// Create a binding for a validated key
    pub fn new(key: impl AsRef<str>) -> ContextResult<Self> {
        let key = BindingKey::validate(key.as_ref())?.to_string();
        Ok(Self {
            inner: Arc::new(BindingInner {
                id: Uuid::new_v4(),
                key,
                state: RwLock::new(BindingState {
                    scope: BindingScope::Transient,
                    tags: TagMap::new(),
                    source: None,
                    is_locked: false,
                    generation: 0,
                }),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        })
    }

    /// Create a binding from any binding address (the address must not carry a path)
    pub fn bind(key: impl Into<BindingAddress>) -> ContextResult<Self> {
        Self::new(key.into().to_string())
    }

    /// Create the binding holding configuration for `key`
    pub fn configure(key: impl Into<BindingAddress>) -> ContextResult<Self> {
        let target = key.into().to_string();
        let binding = Self::new(BindingKey::build_key_for_config(&target).key())?;
        binding.tag((ContextTags::CONFIGURATION_FOR, target));
        Ok(binding)
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Identity used to key cached values
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn scope(&self) -> BindingScope {
        self.inner.state.read().scope
    }

    pub fn is_locked(&self) -> bool {
        self.inner.state.read().is_locked
    }

    /// Kind of source configured, if any
    pub fn binding_type(&self) -> Option<BindingType> {
        self.inner.state.read().source.as_ref().map(BindingSource::binding_type)
    }

    pub fn source(&self) -> Option<BindingSource> {
        self.inner.state.read().source.clone()
    }

    /// Class name of a class or provider binding
    pub fn value_constructor(&self) -> Option<&'static str> {
        match self.inner.state.read().source.as_ref() {
            Some(BindingSource::Class { metadata, .. }) => Some(metadata.name()),
            Some(BindingSource::Provider { metadata, .. }) => Some(metadata.name()),
            _ => None,
        }
    }

    pub fn tag_map(&self) -> TagMap {
        self.inner.state.read().tags.clone()
    }

    pub fn tag_names(&self) -> Vec<String> {
        self.inner.state.read().tags.keys().cloned().collect()
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.inner.state.read().tags.contains_key(name)
    }

    pub fn tag_value(&self, name: &str) -> Option<Value> {
        self.inner.state.read().tags.get(name).cloned()
    }

    /// Check if two handles refer to the same binding
    pub fn ptr_eq(&self, other: &Binding) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Add a tag
    pub fn tag(&self, tag: impl Into<BindingTag>) -> &Self {
        {
            let mut state = self.inner.state.write();
            match tag.into() {
                BindingTag::Name(name) => {
                    state.tags.insert(name.clone(), Value::String(name));
                }
                BindingTag::NameValue(name, value) => {
                    state.tags.insert(name, value);
                }
                BindingTag::Map(map) => state.tags.extend(map),
            }
        }
        self.emit_changed(BindingOperation::Tag);
        self
    }

    /// Add several tags
    pub fn tags<I, T>(&self, tags: I) -> &Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BindingTag>,
    {
        for tag in tags {
            self.tag(tag);
        }
        self
    }

    pub fn in_scope(&self, scope: BindingScope) -> &Self {
        {
            let mut state = self.inner.state.write();
            if state.scope != scope {
                state.generation += 1;
            }
            state.scope = scope;
        }
        self.emit_changed(BindingOperation::Scope);
        self
    }

    pub fn lock(&self) -> &Self {
        self.inner.state.write().is_locked = true;
        self.emit_changed(BindingOperation::Lock);
        self
    }

    pub fn unlock(&self) -> &Self {
        self.inner.state.write().is_locked = false;
        self.emit_changed(BindingOperation::Lock);
        self
    }

    /// Apply a template
    pub fn apply<F>(&self, template: F) -> &Self
    where
        F: FnOnce(&Binding),
    {
        template(self);
        self
    }

    /// Apply several shared templates in order
    pub fn apply_all(&self, templates: &[BindingTemplate]) -> &Self {
        for template in templates {
            template(self);
        }
        self
    }

    fn set_source(&self, source: BindingSource) {
        {
            let mut state = self.inner.state.write();
            state.source = Some(source);
            state.generation += 1;
        }
        self.emit_changed(BindingOperation::Value);
    }

    /// Bind to a constant value
    ///
    /// Only `Send + Sync` values are accepted, which keeps boxed futures and
    /// [`ValueOrPromise`] out of constant bindings.
    ///
    /// ```compile_fail
    /// use elif_context::{Binding, ValueOrPromise};
    ///
    /// let binding = Binding::new("answer").unwrap();
    /// binding.to(ValueOrPromise::promise(async { Ok(42u32) }));
    /// ```
    pub fn to<T: Any + Send + Sync>(&self, value: T) -> &Self {
        self.to_bound_value(Arc::new(value))
    }

    /// Bind to an already type-erased value
    pub fn to_bound_value(&self, value: BoundValue) -> &Self {
        debug!(key = %self.key(), "bind to constant");
        self.set_source(BindingSource::Constant(value));
        self
    }

    /// Bind to a synchronous factory invoked on every (uncached) resolution
    pub fn to_dynamic_value<T, F>(&self, factory: F) -> &Self
    where
        T: Any + Send + Sync,
        F: Fn(&ResolutionContext) -> ContextResult<T> + Send + Sync + 'static,
    {
        self.set_source(BindingSource::DynamicValue(Arc::new(move |rc| {
            let value = factory(&rc)?;
            Ok(ValueOrPromise::Value(Some(Arc::new(value) as BoundValue)))
        })));
        self
    }

    /// Bind to an asynchronous factory
    pub fn to_async_dynamic_value<T, F, Fut>(&self, factory: F) -> &Self
    where
        T: Any + Send + Sync,
        F: Fn(ResolutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ContextResult<T>> + Send + 'static,
    {
        self.set_source(BindingSource::DynamicValue(Arc::new(move |rc| {
            let future = factory(rc);
            Ok(ValueOrPromise::promise(async move {
                future.await.map(|value| Some(Arc::new(value) as BoundValue))
            }))
        })));
        self
    }

    /// Bind to a factory that decides per call whether it is synchronous
    pub fn to_value_factory(&self, factory: ValueFactory) -> &Self {
        self.set_source(BindingSource::DynamicValue(factory));
        self
    }

    /// Bind to a class instantiated with dependency injection
    pub fn to_class<T: Injectable>(&self) -> &Self {
        let metadata = crate::resolution::class_metadata::<T>();
        let factory: ValueFactory = Arc::new(|rc: ResolutionContext| {
            let instance = instantiate_class::<T>(&rc.context, rc.options.session.clone(), Arguments::new())?;
            Ok(instance.map(|instance| Some(Arc::new(instance) as BoundValue)))
        });
        let proxy_adapter: ProxyAdapter = |value| {
            value
                .downcast::<T>()
                .ok()
                .and_then(T::into_invocation_target)
        };
        self.set_source(BindingSource::Class {
            metadata,
            factory,
            proxy_adapter,
        });
        self
    }

    /// Bind to a provider class whose `value()` produces the bound value
    pub fn to_provider<P: Provider + Injectable>(&self) -> &Self {
        let metadata = crate::resolution::class_metadata::<P>();
        let factory: ValueFactory = Arc::new(|rc: ResolutionContext| {
            let provider = instantiate_class::<P>(&rc.context, rc.options.session.clone(), Arguments::new())?;
            provider.and_then(|provider| {
                Ok(provider
                    .value()?
                    .map(|value| Some(Arc::new(value) as BoundValue)))
            })
        });
        self.set_source(BindingSource::Provider { metadata, factory });
        self
    }

    /// Bind as an alias of another binding (optionally a deep property of it)
    pub fn to_alias(&self, target: impl Into<BindingAddress>) -> &Self {
        self.set_source(BindingSource::Alias(target.into()));
        self
    }

    /// Drop the cached value for the resolution context of `ctx`
    pub fn refresh(&self, ctx: &Context) -> &Self {
        let options = ResolutionOptions {
            optional: true,
            ..ResolutionOptions::default()
        };
        if let Ok(Some(resolution_ctx)) = self.resolution_context(ctx, &options) {
            resolution_ctx.clear_cached_value(self.id());
        }
        self
    }

    /// Locate the context whose cache holds this binding's value
    pub fn resolution_context(&self, ctx: &Context, options: &ResolutionOptions) -> ContextResult<Option<Context>> {
        let scope = self.scope();
        let resolution_ctx = match scope {
            BindingScope::Singleton => match ctx.get_owner_context(self.key()) {
                Some(owner) => owner,
                None => {
                    if options.optional {
                        return Ok(None);
                    }
                    return Err(ContextError::ScopeNotFound {
                        key: self.key().to_string(),
                        context: ctx.name().to_string(),
                        scope: scope.to_string(),
                    });
                }
            },
            BindingScope::Transient | BindingScope::Context => ctx.clone(),
            BindingScope::Request => match ctx.get_scoped_context(scope) {
                Some(scoped) => scoped,
                None => {
                    warn!(
                        key = %self.key(),
                        context = %ctx.name(),
                        "no request context found, falling back to the current context"
                    );
                    ctx.clone()
                }
            },
            BindingScope::Application | BindingScope::Server => match ctx.get_scoped_context(scope) {
                Some(scoped) => scoped,
                None => {
                    let err = ContextError::ScopeNotFound {
                        key: self.key().to_string(),
                        context: ctx.name().to_string(),
                        scope: scope.to_string(),
                    };
                    if options.optional {
                        debug!("{}", err);
                        return Ok(None);
                    }
                    return Err(err);
                }
            },
        };

        if let Some(owner) = ctx.get_owner_context(self.key()) {
            if !owner.is_visible_to(&resolution_ctx) {
                let err = ContextError::NotVisible {
                    key: self.key().to_string(),
                    scope: scope.to_string(),
                    owner: owner.name().to_string(),
                    resolution_context: resolution_ctx.name().to_string(),
                };
                if options.optional {
                    debug!("{}", err);
                    return Ok(None);
                }
                return Err(err);
            }
        }

        Ok(Some(resolution_ctx))
    }

    /// Resolve the value of this binding for `ctx`
    pub fn get_value(&self, ctx: &Context, options: ResolutionOptions) -> ContextResult<ValueOrPromise<ResolvedValue>> {
        let resolution_ctx = match self.resolution_context(ctx, &options)? {
            Some(resolution_ctx) => resolution_ctx,
            None => return Ok(ValueOrPromise::Value(None)),
        };

        let (scope, source, generation) = {
            let state = self.inner.state.read();
            (state.scope, state.source.clone(), state.generation)
        };

        // A cached entry may be the pending future of this very resolution
        if let Some(session) = options.session.as_ref() {
            session.check_binding(self)?;
        }

        if !scope.is_transient() {
            if let Some(cached) = resolution_ctx.cached_value(self.id(), generation) {
                trace!(key = %self.key(), context = %resolution_ctx.name(), "cache hit");
                return Ok(self.value_or_proxy(&resolution_ctx, &options, cached));
            }
        }

        let source = match source {
            Some(source) => source,
            None => {
                // Placeholder bindings (e.g. created for `Injection::binding`)
                if options.optional {
                    return Ok(ValueOrPromise::Value(None));
                }
                let session = options.session.clone().unwrap_or_default();
                return Err(ContextError::resolution(
                    format!("No value was configured for binding {}.", self.key()),
                    ResolutionDetails {
                        context: resolution_ctx.name().to_string(),
                        binding_key: Some(self.key().to_string()),
                        resolution_path: session.resolution_path(),
                    },
                ));
            }
        };

        let result = ResolutionSession::run_with_binding(self, options.session.as_ref(), |session| {
            let factory_options = ResolutionOptions {
                session: Some(session),
                optional: options.optional,
                as_proxy_with_interceptors: false,
            };
            source.resolve(ResolutionContext {
                context: resolution_ctx.clone(),
                binding: self.clone(),
                options: factory_options,
            })
        })?;

        let value = if scope.is_transient() {
            result
        } else {
            resolution_ctx.cache_value(self.id(), generation, result)
        };
        Ok(self.value_or_proxy(&resolution_ctx, &options, value))
    }

    fn value_or_proxy(
        &self,
        resolution_ctx: &Context,
        options: &ResolutionOptions,
        value: ValueOrPromise<ResolvedValue>,
    ) -> ValueOrPromise<ResolvedValue> {
        if !options.as_proxy_with_interceptors {
            return value;
        }
        let adapter = match self.inner.state.read().source.as_ref() {
            Some(BindingSource::Class { proxy_adapter, .. }) => *proxy_adapter,
            _ => return value,
        };
        let ctx = resolution_ctx.clone();
        let session = options.session.clone();
        value.map(move |resolved| {
            resolved.map(|instance| match adapter(instance.clone()) {
                Some(target) => create_proxy_with_interceptors(target, &ctx, session),
                None => instance,
            })
        })
    }

    /// Register a change listener; returns an id for removal
    pub fn on_changed(&self, listener: BindingEventListener) -> u64 {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, listener));
        id
    }

    pub fn remove_changed_listener(&self, id: u64) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn emit_changed(&self, operation: BindingOperation) {
        let listeners: Vec<BindingEventListener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        if listeners.is_empty() {
            return;
        }
        let event = BindingEvent {
            binding: self.clone(),
            operation,
        };
        for listener in listeners {
            listener(&event);
        }
    }

    /// Plain JSON snapshot of the binding
    pub fn to_json(&self) -> Value {
        self.inspect(&InspectionOptions::default())
    }

    /// JSON snapshot, optionally including injection metadata
    pub fn inspect(&self, options: &InspectionOptions) -> Value {
        let state = self.inner.state.read();
        let mut json = json!({
            "key": self.key(),
            "scope": state.scope.as_str(),
            "tags": state.tags,
            "isLocked": state.is_locked,
        });
        if let Some(source) = &state.source {
            json["type"] = Value::String(source.binding_type().to_string());
            match source {
                BindingSource::Class { metadata, .. } => {
                    json["valueConstructor"] = Value::String(metadata.name().to_string());
                    if options.include_injections {
                        json["injections"] = metadata.inspect_injections();
                    }
                }
                BindingSource::Provider { metadata, .. } => {
                    json["providerConstructor"] = Value::String(metadata.name().to_string());
                    if options.include_injections {
                        json["injections"] = metadata.inspect_injections();
                    }
                }
                BindingSource::Alias(target) => {
                    json["alias"] = Value::String(target.to_string());
                }
                _ => {}
            }
        }
        json
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Binding {}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Binding")
            .field("key", &self.inner.key)
            .field("scope", &state.scope)
            .field("tags", &state.tags)
            .field("source", &state.source)
            .field("is_locked", &state.is_locked)
            .finish()
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Options for [`create_binding_from_class`]
#[derive(Debug, Clone, Default)]
pub struct BindingFromClassOptions {
    /// Explicit key; otherwise `namespace.Name`
    pub key: Option<String>,
    /// Namespace used when the class does not declare one
    pub default_namespace: Option<String>,
    /// Name overriding the class name in the generated key
    pub name: Option<String>,
    /// Scope used when the class does not declare one
    pub default_scope: Option<BindingScope>,
}

/// Derive a binding (key, scope, tags, source) from a class's metadata
pub fn create_binding_from_class<T: Injectable>(options: BindingFromClassOptions) -> ContextResult<Binding> {
    let binding = binding_from_metadata(&crate::resolution::class_metadata::<T>(), options)?;
    binding.to_class::<T>();
    Ok(binding)
}

/// Same as [`create_binding_from_class`] for a provider class
pub fn create_binding_from_provider<P: Provider + Injectable>(options: BindingFromClassOptions) -> ContextResult<Binding> {
    let binding = binding_from_metadata(&crate::resolution::class_metadata::<P>(), options)?;
    binding.to_provider::<P>();
    Ok(binding)
}

fn binding_from_metadata(metadata: &ClassMetadata, options: BindingFromClassOptions) -> ContextResult<Binding> {
    let key = match options.key {
        Some(key) => key,
        None => {
            let name = options.name.unwrap_or_else(|| metadata.name().to_string());
            let namespace = metadata
                .get_namespace()
                .map(str::to_string)
                .or(options.default_namespace);
            match namespace {
                Some(namespace) if !namespace.is_empty() => format!("{}.{}", namespace, name),
                _ => name,
            }
        }
    };

    let binding = Binding::new(&key)?;
    binding.tag(BindingTag::Map(metadata.tags().clone()));
    if let Some(scope) = metadata.get_scope().or(options.default_scope) {
        binding.in_scope(scope);
    }
    Ok(binding)
}
