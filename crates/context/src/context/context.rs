use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::binding::{Binding, BindingComparator, BindingFilter, BindingScope, BindingTagPattern, InspectionOptions};
use crate::config::{ConfigurationResolver, ContextConfig, DefaultConfigurationResolver};
use crate::context::events::{
    ContextEmitter, ContextEvent, ContextEventListener, ContextEventType, ErrorListener, ListenerId,
};
use crate::context::subscription::{ContextObserver, ContextSubscriptionManager, FnObserver, Subscription};
use crate::context::tag_indexer::ContextTagIndexer;
use crate::context::view::ContextView;
use crate::errors::{ContextError, ContextResult, ResolutionDetails};
use crate::keys::{BindingAddress, BindingKey, ContextBindings};
use crate::resolution::{BindingCreationPolicy, ResolutionOptions};
use crate::value_promise::{downcast_value, get_deep_property, ResolvedValue, ValueOrPromise};

type PendingValue = Shared<BoxFuture<'static, ContextResult<ResolvedValue>>>;

enum CachedValue {
    Ready(ResolvedValue),
    Pending(PendingValue),
}

struct CacheEntry {
    generation: u64,
    value: CachedValue,
}

pub(crate) struct ContextInner {
    name: String,
    parent: Option<Context>,
    scope: RwLock<BindingScope>,
    registry: RwLock<IndexMap<String, Binding>>,
    tag_indexer: ContextTagIndexer,
    subscription_manager: ContextSubscriptionManager,
    emitter: ContextEmitter,
    // Values of non-transient bindings resolved in this context, by binding id
    value_cache: Mutex<HashMap<Uuid, CacheEntry>>,
    notification_timeout: Option<Duration>,
    panic_on_unhandled_error: bool,
    closed: AtomicBool,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.subscription_manager.close();
        self.tag_indexer.close();
    }
}

/// A node in the context tree: a registry of bindings with a parent
///
/// `Context` is a handle; clones refer to the same context.
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

fn generate_name() -> String {
    format!("context-{}", Uuid::new_v4())
}

impl Context {
    /// Root context with a generated name
    pub fn new() -> Self {
        Self::create(None, generate_name(), BindingScope::Context, None, false)
    }

    /// Root context
    pub fn named(name: impl Into<String>) -> Self {
        Self::create(None, name.into(), BindingScope::Context, None, false)
    }

    /// Child of `parent`
    pub fn with_parent(parent: &Context, name: impl Into<String>) -> Self {
        Self::create(Some(parent.clone()), name.into(), BindingScope::Context, None, false)
    }

    /// Context configured from a [`ContextConfig`]
    pub fn from_config(parent: Option<&Context>, config: ContextConfig) -> ContextResult<Self> {
        config.validate()?;
        let name = config.get_name().clone().unwrap_or_else(generate_name);
        let ctx = Self::create(
            parent.cloned(),
            name,
            config.get_scope().clone(),
            *config.get_notification_timeout(),
            *config.get_panic_on_unhandled_error(),
        );
        if !config.get_interceptor_groups().is_empty() {
            ctx.bind(ContextBindings::GLOBAL_INTERCEPTOR_ORDERED_GROUPS)?
                .to(config.get_interceptor_groups().clone());
        }
        Ok(ctx)
    }

    fn create(
        parent: Option<Context>,
        name: String,
        scope: BindingScope,
        notification_timeout: Option<Duration>,
        panic_on_unhandled_error: bool,
    ) -> Self {
        debug!(name = %name, parent = ?parent.as_ref().map(|p| p.name().to_string()), "creating context");
        Self {
            inner: Arc::new(ContextInner {
                name,
                parent,
                scope: RwLock::new(scope),
                registry: RwLock::new(IndexMap::new()),
                tag_indexer: ContextTagIndexer::new(),
                subscription_manager: ContextSubscriptionManager::new(),
                emitter: ContextEmitter::default(),
                value_cache: Mutex::new(HashMap::new()),
                notification_timeout,
                panic_on_unhandled_error,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &Weak<ContextInner>) -> Option<Context> {
        weak.upgrade().map(|inner| Context { inner })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    pub fn scope(&self) -> BindingScope {
        *self.inner.scope.read()
    }

    /// Mark this context as the boundary for `scope`
    pub fn set_scope(&self, scope: BindingScope) -> &Self {
        *self.inner.scope.write() = scope;
        self
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn subscription_manager(&self) -> &ContextSubscriptionManager {
        &self.inner.subscription_manager
    }

    pub fn tag_indexer(&self) -> &ContextTagIndexer {
        &self.inner.tag_indexer
    }

    // ---- registry ---------------------------------------------------------

    /// Create a binding for `key` and add it, replacing any unlocked binding
    ///
    /// A locked binding with the same key makes this fail.
    pub fn bind(&self, key: impl Into<BindingAddress>) -> ContextResult<Binding> {
        let binding = Binding::bind(key)?;
        self.add(binding.clone())?;
        Ok(binding)
    }

    /// Add a binding, emitting `unbind` for a replaced binding before `bind`
    pub fn add(&self, binding: Binding) -> ContextResult<&Self> {
        let key = binding.key().to_string();
        let existing = {
            let mut registry = self.inner.registry.write();
            if let Some(existing) = registry.get(&key) {
                if existing.is_locked() {
                    return Err(ContextError::LockedRebind { key });
                }
            }
            registry.insert(key.clone(), binding.clone())
        };
        debug!(context = %self.name(), key = %key, "binding added");

        if let Some(existing) = existing {
            if !existing.ptr_eq(&binding) {
                self.inner.tag_indexer.remove_binding(&existing);
                self.clear_cached_value(existing.id());
                self.emit_event(&ContextEvent {
                    event_type: ContextEventType::Unbind,
                    binding: existing,
                    context: self.clone(),
                });
            }
        }

        self.inner.tag_indexer.add_binding(&binding);
        self.emit_event(&ContextEvent {
            event_type: ContextEventType::Bind,
            binding,
            context: self.clone(),
        });
        Ok(self)
    }

    /// Remove a binding; `false` if it was not bound here
    pub fn unbind(&self, key: impl Into<BindingAddress>) -> ContextResult<bool> {
        let address = key.into();
        let key = BindingKey::validate(address.key())?;
        let binding = {
            let mut registry = self.inner.registry.write();
            let locked = match registry.get(key) {
                Some(binding) => binding.is_locked(),
                None => return Ok(false),
            };
            if locked {
                return Err(ContextError::LockedUnbind { key: key.to_string() });
            }
            match registry.shift_remove(key) {
                Some(binding) => binding,
                None => return Ok(false),
            }
        };
        debug!(context = %self.name(), key = %key, "binding removed");

        self.inner.tag_indexer.remove_binding(&binding);
        self.clear_cached_value(binding.id());
        self.emit_event(&ContextEvent {
            event_type: ContextEventType::Unbind,
            binding,
            context: self.clone(),
        });
        Ok(true)
    }

    /// Bound in this context (ancestors are not consulted)
    pub fn contains(&self, key: impl Into<BindingAddress>) -> bool {
        self.inner.registry.read().contains_key(key.into().key())
    }

    /// Bound in this context or an ancestor
    pub fn is_bound(&self, key: impl Into<BindingAddress>) -> bool {
        let address = key.into();
        if self.contains(&address) {
            return true;
        }
        self.parent().map_or(false, |parent| parent.is_bound(&address))
    }

    /// Closest context (starting here) that owns `key`
    pub fn get_owner_context(&self, key: impl Into<BindingAddress>) -> Option<Context> {
        let address = key.into();
        if self.contains(&address) {
            return Some(self.clone());
        }
        self.parent().and_then(|parent| parent.get_owner_context(&address))
    }

    /// Closest context (starting here) marked with `scope`
    pub fn get_scoped_context(&self, scope: BindingScope) -> Option<Context> {
        if self.scope() == scope {
            return Some(self.clone());
        }
        self.parent().and_then(|parent| parent.get_scoped_context(scope))
    }

    /// Context caching values of `binding` when resolved from here
    pub fn get_resolution_context(&self, binding: &Binding) -> Option<Context> {
        binding
            .resolution_context(self, &ResolutionOptions::optional())
            .ok()
            .flatten()
    }

    /// Whether `ctx` is this context or one of its descendants
    pub fn is_visible_to(&self, ctx: &Context) -> bool {
        let mut current = Some(ctx);
        while let Some(candidate) = current {
            if candidate.ptr_eq(self) {
                return true;
            }
            current = candidate.parent();
        }
        false
    }

    /// Binding for `key` here or in an ancestor
    pub fn get_binding(&self, key: impl Into<BindingAddress>) -> ContextResult<Binding> {
        let address = key.into();
        self.get_binding_optional(&address)
            .ok_or_else(|| ContextError::not_bound(address.key(), self.name()))
    }

    pub fn get_binding_optional(&self, key: impl Into<BindingAddress>) -> Option<Binding> {
        let address = key.into();
        if let Some(binding) = self.inner.registry.read().get(address.key()) {
            return Some(binding.clone());
        }
        self.parent().and_then(|parent| parent.get_binding_optional(&address))
    }

    /// Existing binding or a new one, depending on `policy`
    pub fn find_or_create_binding(&self, key: &str, policy: BindingCreationPolicy) -> ContextResult<Binding> {
        match policy {
            BindingCreationPolicy::AlwaysCreate => self.bind(key),
            BindingCreationPolicy::NeverCreate => self.get_binding(key),
            BindingCreationPolicy::CreateIfNotBound => match self.get_binding_optional(key) {
                Some(binding) => Ok(binding),
                None => self.bind(key),
            },
        }
    }

    /// Bindings of this context and its ancestors matching `pattern`
    ///
    /// A child binding shadows parent bindings with the same key. Tag filters
    /// are answered from the tag index.
    pub fn find(&self, pattern: impl Into<BindingFilter>) -> Vec<Binding> {
        let filter = pattern.into();
        if let Some(tag_pattern) = filter.binding_tag_pattern() {
            return self.find_by_tag_index(tag_pattern);
        }
        self.find_by_scan(&filter)
    }

    /// Bindings matching a tag pattern
    pub fn find_by_tag(&self, pattern: impl Into<BindingTagPattern>) -> Vec<Binding> {
        self.find_by_tag_index(&pattern.into())
    }

    fn find_by_scan(&self, filter: &BindingFilter) -> Vec<Binding> {
        let candidates: Vec<Binding> = self.inner.registry.read().values().cloned().collect();
        let local: Vec<Binding> = candidates.into_iter().filter(|binding| filter.matches(binding)).collect();
        match self.parent() {
            Some(parent) => merge_with_parent(local, parent.find_by_scan(filter)),
            None => local,
        }
    }

    fn find_by_tag_index(&self, pattern: &BindingTagPattern) -> Vec<Binding> {
        let local = self.inner.tag_indexer.find_by_tag_index(pattern);
        match self.parent() {
            Some(parent) => merge_with_parent(local, parent.find_by_tag_index(pattern)),
            None => local,
        }
    }

    // ---- resolution -------------------------------------------------------

    /// Resolve `address`, synchronously when possible
    ///
    /// A `key#path` address projects a deep property of the value; missing
    /// segments resolve to `None`.
    pub fn get_value_or_promise(
        &self,
        address: impl Into<BindingAddress>,
        options: ResolutionOptions,
    ) -> ContextResult<ValueOrPromise<ResolvedValue>> {
        let address = address.into();
        let binding = match self.get_binding_optional(&address) {
            Some(binding) => binding,
            None if options.optional => return Ok(ValueOrPromise::Value(None)),
            None => return Err(ContextError::not_bound(address.key(), self.name())),
        };

        let value = binding.get_value(self, options)?;
        Ok(match address.property_path() {
            None => value,
            Some(path) => {
                let path = path.to_string();
                value.map(move |value| value.and_then(|value| get_deep_property(&value, &path)))
            }
        })
    }

    fn missing_value(&self, address: &BindingKey, options: &ResolutionOptions) -> ContextError {
        ContextError::resolution(
            format!("No value was resolved for key {}", address),
            ResolutionDetails {
                context: self.name().to_string(),
                binding_key: Some(address.key().to_string()),
                resolution_path: options
                    .session
                    .as_ref()
                    .map(|session| session.resolution_path())
                    .unwrap_or_default(),
            },
        )
    }

    pub async fn get<T: Any + Send + Sync>(&self, address: impl Into<BindingAddress>) -> ContextResult<Arc<T>> {
        self.get_with(address, ResolutionOptions::default()).await
    }

    pub async fn get_with<T: Any + Send + Sync>(
        &self,
        address: impl Into<BindingAddress>,
        options: ResolutionOptions,
    ) -> ContextResult<Arc<T>> {
        let address = address.into();
        let value = self
            .get_value_or_promise(&address, options.clone())?
            .resolve()
            .await?;
        match value {
            Some(value) => downcast_value::<T>(&address.to_string(), value),
            None => Err(self.missing_value(&address, &options)),
        }
    }

    /// Resolve to `None` when nothing is bound
    pub async fn get_optional<T: Any + Send + Sync>(
        &self,
        address: impl Into<BindingAddress>,
    ) -> ContextResult<Option<Arc<T>>> {
        let address = address.into();
        match self
            .get_value_or_promise(&address, ResolutionOptions::optional())?
            .resolve()
            .await?
        {
            Some(value) => downcast_value::<T>(&address.to_string(), value).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve without awaiting; fails if the value is produced asynchronously
    pub fn get_sync<T: Any + Send + Sync>(&self, address: impl Into<BindingAddress>) -> ContextResult<Arc<T>> {
        self.get_sync_with(address, ResolutionOptions::default())
    }

    pub fn get_sync_with<T: Any + Send + Sync>(
        &self,
        address: impl Into<BindingAddress>,
        options: ResolutionOptions,
    ) -> ContextResult<Arc<T>> {
        let address = address.into();
        match self.get_value_or_promise(&address, options.clone())? {
            ValueOrPromise::Value(Some(value)) => downcast_value::<T>(&address.to_string(), value),
            ValueOrPromise::Value(None) => Err(self.missing_value(&address, &options)),
            ValueOrPromise::Promise(_) => Err(ContextError::AsyncValue {
                key: address.to_string(),
            }),
        }
    }

    pub fn get_optional_sync<T: Any + Send + Sync>(
        &self,
        address: impl Into<BindingAddress>,
    ) -> ContextResult<Option<Arc<T>>> {
        let address = address.into();
        match self.get_value_or_promise(&address, ResolutionOptions::optional())? {
            ValueOrPromise::Value(Some(value)) => downcast_value::<T>(&address.to_string(), value).map(Some),
            ValueOrPromise::Value(None) => Ok(None),
            ValueOrPromise::Promise(_) => Err(ContextError::AsyncValue {
                key: address.to_string(),
            }),
        }
    }

    // ---- value cache ------------------------------------------------------

    pub(crate) fn cached_value(&self, binding_id: Uuid, generation: u64) -> Option<ValueOrPromise<ResolvedValue>> {
        let mut cache = self.inner.value_cache.lock();
        let entry = cache.get(&binding_id)?;
        if entry.generation != generation {
            return None;
        }
        let cached = match &entry.value {
            CachedValue::Ready(value) => Some(ValueOrPromise::Value(value.clone())),
            CachedValue::Pending(pending) => match pending.peek() {
                Some(Ok(value)) => Some(ValueOrPromise::Value(value.clone())),
                Some(Err(_)) => None,
                None => Some(ValueOrPromise::Promise(pending.clone().boxed())),
            },
        };
        // A failed computation is not reused
        if cached.is_none() {
            cache.remove(&binding_id);
        }
        cached
    }

    /// Cache a freshly produced value; pending values are shared so every
    /// caller awaits the same computation
    pub(crate) fn cache_value(
        &self,
        binding_id: Uuid,
        generation: u64,
        value: ValueOrPromise<ResolvedValue>,
    ) -> ValueOrPromise<ResolvedValue> {
        let (cached, result) = match value {
            ValueOrPromise::Value(value) => (CachedValue::Ready(value.clone()), ValueOrPromise::Value(value)),
            ValueOrPromise::Promise(promise) => {
                let shared = promise.shared();
                (
                    CachedValue::Pending(shared.clone()),
                    ValueOrPromise::Promise(shared.boxed()),
                )
            }
        };
        trace!(context = %self.name(), binding = %binding_id, "value cached");
        self.inner
            .value_cache
            .lock()
            .insert(binding_id, CacheEntry { generation, value: cached });
        result
    }

    pub(crate) fn clear_cached_value(&self, binding_id: Uuid) {
        self.inner.value_cache.lock().remove(&binding_id);
    }

    // ---- configuration ----------------------------------------------------

    /// Bind the configuration of `key` (`key:$config`)
    pub fn configure(&self, key: impl Into<BindingAddress>) -> ContextResult<Binding> {
        let binding = Binding::configure(key)?;
        self.add(binding.clone())?;
        Ok(binding)
    }

    fn configuration_resolver(&self) -> ContextResult<Arc<dyn ConfigurationResolver>> {
        if self.is_bound(ContextBindings::CONFIGURATION_RESOLVER) {
            let resolver = self.get_sync::<Arc<dyn ConfigurationResolver>>(ContextBindings::CONFIGURATION_RESOLVER)?;
            return Ok(resolver.as_ref().clone());
        }
        Ok(Arc::new(DefaultConfigurationResolver))
    }

    /// Resolve configuration of `key`, optionally a property of it
    pub fn get_config_as_value_or_promise(
        &self,
        key: &str,
        property_path: Option<&str>,
        options: ResolutionOptions,
    ) -> ContextResult<ValueOrPromise<ResolvedValue>> {
        self.configuration_resolver()?
            .get_config_as_value_or_promise(self, key, property_path, options)
    }

    pub async fn get_config<T: Any + Send + Sync>(
        &self,
        key: &str,
        property_path: Option<&str>,
    ) -> ContextResult<Option<Arc<T>>> {
        let target = config_target(key, property_path);
        match self
            .get_config_as_value_or_promise(key, property_path, ResolutionOptions::default())?
            .resolve()
            .await?
        {
            Some(value) => downcast_value::<T>(&target, value).map(Some),
            None => Ok(None),
        }
    }

    pub fn get_config_sync<T: Any + Send + Sync>(
        &self,
        key: &str,
        property_path: Option<&str>,
    ) -> ContextResult<Option<Arc<T>>> {
        let target = config_target(key, property_path);
        match self.get_config_as_value_or_promise(key, property_path, ResolutionOptions::default())? {
            ValueOrPromise::Value(Some(value)) => downcast_value::<T>(&target, value).map(Some),
            ValueOrPromise::Value(None) => Ok(None),
            ValueOrPromise::Promise(_) => Err(ContextError::AsyncValue { key: target }),
        }
    }

    // ---- events -----------------------------------------------------------

    fn emit_event(&self, event: &ContextEvent) {
        self.inner.emitter.emit(event);
        self.inner.subscription_manager.enqueue(event);
    }

    /// Re-emit an ancestor's event unless a local binding shadows the key
    pub(crate) fn handle_parent_event(&self, event: &ContextEvent) {
        if self.contains(event.binding.key()) {
            trace!(
                context = %self.name(),
                key = %event.binding.key(),
                "parent event ignored: key is shadowed"
            );
            return;
        }
        self.emit_event(event);
    }

    pub(crate) fn add_raw_event_listener(&self, listener: ContextEventListener) -> ListenerId {
        self.inner.emitter.add_listener(listener)
    }

    pub(crate) fn remove_raw_event_listener(&self, id: ListenerId) -> bool {
        self.inner.emitter.remove_listener(id)
    }

    /// Listen to `bind`/`unbind` events synchronously, including those of
    /// ancestors for keys not shadowed here
    pub fn on_event<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ContextEvent) + Send + Sync + 'static,
    {
        let id = self.add_raw_event_listener(Arc::new(listener));
        self.inner.subscription_manager.setup_parent_forwarding(self);
        id
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.remove_raw_event_listener(id)
    }

    /// Receive errors of this context and its descendants
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ContextError) + Send + Sync + 'static,
    {
        let listener: ErrorListener = Arc::new(listener);
        self.inner.emitter.add_error_listener(listener)
    }

    pub fn remove_error_listener(&self, id: ListenerId) -> bool {
        self.inner.emitter.remove_error_listener(id)
    }

    /// Deliver an error to the closest context with an error listener
    ///
    /// Without any listener in the chain the error is logged, or raised as a
    /// panic when a context in the chain was created with
    /// `panic_on_unhandled_error`. Inside the notification task that panic
    /// stops further observer notifications for the context.
    pub fn emit_error(&self, err: ContextError) {
        let mut escalate = false;
        let mut current = Some(self);
        while let Some(ctx) = current {
            if ctx.inner.emitter.emit_error(&err) {
                return;
            }
            escalate |= ctx.inner.panic_on_unhandled_error;
            current = ctx.parent();
        }
        error!(context = %self.name(), error = %err, "unhandled context error");
        if escalate {
            panic!("unhandled context error in \"{}\": {}", self.name(), err);
        }
    }

    // ---- observation ------------------------------------------------------

    /// Register an observer notified after registry changes of this context
    /// and of its ancestors
    ///
    /// Requires a tokio runtime, which runs the notification task.
    pub fn subscribe(&self, observer: Arc<dyn ContextObserver>) -> ContextResult<Subscription> {
        if self.is_closed() {
            return Err(ContextError::ContextClosed {
                context: self.name().to_string(),
            });
        }
        let manager = &self.inner.subscription_manager;
        manager.ensure_notification_task(self)?;
        manager.setup_parent_forwarding(self);
        manager.add_observer(observer.clone());
        debug!(context = %self.name(), "observer subscribed");
        Ok(Subscription::new(self.downgrade(), observer))
    }

    /// Subscribe a function observer
    pub fn subscribe_fn<F, Fut>(&self, observe: F) -> ContextResult<Subscription>
    where
        F: Fn(ContextEventType, Binding, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ContextResult<()>> + Send + 'static,
    {
        self.subscribe(Arc::new(FnObserver::new(observe)))
    }

    pub fn unsubscribe(&self, observer: &Arc<dyn ContextObserver>) -> bool {
        self.inner.subscription_manager.remove_observer(observer)
    }

    pub fn is_subscribed(&self, observer: &Arc<dyn ContextObserver>) -> bool {
        self.inner.subscription_manager.is_subscribed(observer)
    }

    /// Create and open a view
    pub fn create_view(
        &self,
        filter: impl Into<BindingFilter>,
        comparator: Option<BindingComparator>,
    ) -> ContextResult<ContextView> {
        let view = ContextView::new(self, filter.into(), comparator);
        view.open()?;
        Ok(view)
    }

    /// Wait for queued observer notifications of this context
    pub async fn wait_until_pending_notifications_done(&self, timeout: Option<Duration>) -> ContextResult<()> {
        let timeout = timeout.or(self.inner.notification_timeout);
        self.inner
            .subscription_manager
            .wait_until_pending_notifications_done(timeout)
            .await
    }

    /// Release observers, parent listeners and cached values
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(context = %self.name(), "closing context");
        self.inner.subscription_manager.close();
        self.inner.tag_indexer.close();
        self.inner.emitter.clear();
        self.inner.value_cache.lock().clear();
    }

    // ---- introspection ----------------------------------------------------

    /// Bindings of this context as JSON, keyed by binding key
    pub fn to_json(&self) -> Value {
        self.bindings_json(&InspectionOptions::default())
    }

    fn bindings_json(&self, options: &InspectionOptions) -> Value {
        let bindings: Vec<Binding> = self.inner.registry.read().values().cloned().collect();
        let map: Map<String, Value> = bindings
            .iter()
            .map(|binding| (binding.key().to_string(), binding.inspect(options)))
            .collect();
        Value::Object(map)
    }

    /// Name, bindings and (optionally) the parent chain as JSON
    pub fn inspect(&self, options: &InspectionOptions) -> Value {
        let mut json = json!({
            "name": self.name(),
            "bindings": self.bindings_json(options),
        });
        if options.include_parent {
            if let Some(parent) = self.parent() {
                json["parent"] = parent.inspect(options);
            }
        }
        json
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.inner.name)
            .field("scope", &self.scope())
            .field("parent", &self.parent().map(|parent| parent.name().to_string()))
            .field("bindings", &self.inner.registry.read().len())
            .finish()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Local bindings followed by parent bindings whose key is not shadowed
fn merge_with_parent(local: Vec<Binding>, parent: Vec<Binding>) -> Vec<Binding> {
    let mut merged = local;
    let shadowed: std::collections::HashSet<String> = merged.iter().map(|b| b.key().to_string()).collect();
    merged.extend(parent.into_iter().filter(|binding| !shadowed.contains(binding.key())));
    merged
}

fn config_target(key: &str, property_path: Option<&str>) -> String {
    let config_key = BindingKey::build_key_for_config(key);
    match property_path {
        Some(path) => format!("{}#{}", config_key, path),
        None => config_key.to_string(),
    }
}
