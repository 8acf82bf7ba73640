//! Live, cached projections of a context's bindings

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::binding::{Binding, BindingComparator, BindingFilter};
use crate::context::events::ContextEventType;
use crate::context::subscription::{ContextObserver, Subscription};
use crate::context::Context;
use crate::errors::{ContextError, ContextResult};
use crate::keys::BindingKey;
use crate::resolution::{Getter, ResolutionOptions, ResolutionSession};
use crate::value_promise::{downcast_value, get_deep_property, resolve_list, BoundValue, ValueOrPromise};

pub type RefreshListener = Arc<dyn Fn(&ContextView) + Send + Sync>;

struct ViewInner {
    context: Context,
    filter: BindingFilter,
    comparator: Option<BindingComparator>,
    property_path: Option<String>,
    cached_bindings: RwLock<Option<Vec<Binding>>>,
    cached_values: RwLock<Option<Vec<BoundValue>>>,
    generation: AtomicU64,
    subscription: Mutex<Option<Subscription>>,
    refresh_listeners: Mutex<Vec<(u64, RefreshListener)>>,
    next_listener_id: AtomicU64,
}

/// Bindings of a context (and its ancestors) matching a filter, with their
/// resolved values
///
/// An open view caches both lists and invalidates them whenever a matching
/// binding is bound or unbound anywhere in the visible chain. A view that is
/// not open recomputes on every access.
#[derive(Clone)]
pub struct ContextView {
    inner: Arc<ViewInner>,
}

struct ViewObserver {
    view: Weak<ViewInner>,
}

#[async_trait]
impl ContextObserver for ViewObserver {
    fn filter(&self, binding: &Binding) -> bool {
        self.view
            .upgrade()
            .map_or(false, |view| view.filter.matches(binding))
    }

    async fn observe(&self, event_type: ContextEventType, binding: &Binding, _context: &Context) -> ContextResult<()> {
        if let Some(inner) = self.view.upgrade() {
            trace!(event = %event_type, key = %binding.key(), "view invalidated");
            ContextView { inner }.refresh();
        }
        Ok(())
    }
}

impl ContextView {
    pub fn new(ctx: &Context, filter: BindingFilter, comparator: Option<BindingComparator>) -> Self {
        Self::build(ctx, filter, comparator, None)
    }

    fn build(
        ctx: &Context,
        filter: BindingFilter,
        comparator: Option<BindingComparator>,
        property_path: Option<String>,
    ) -> Self {
        Self {
            inner: Arc::new(ViewInner {
                context: ctx.clone(),
                filter,
                comparator,
                property_path,
                cached_bindings: RwLock::new(None),
                cached_values: RwLock::new(None),
                generation: AtomicU64::new(0),
                subscription: Mutex::new(None),
                refresh_listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        }
    }

    /// View over the configuration binding of `key`, projecting `property_path`
    pub fn for_config(ctx: &Context, key: &str, property_path: Option<String>) -> Self {
        let config_key = BindingKey::build_key_for_config(key).key().to_string();
        let filter = BindingFilter::new(move |binding| binding.key() == config_key);
        Self::build(ctx, filter, None, property_path)
    }

    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    pub fn filter(&self) -> &BindingFilter {
        &self.inner.filter
    }

    /// Start tracking changes
    pub fn open(&self) -> ContextResult<()> {
        let mut subscription = self.inner.subscription.lock();
        if subscription.is_some() {
            return Ok(());
        }
        let observer: Arc<dyn ContextObserver> = Arc::new(ViewObserver {
            view: Arc::downgrade(&self.inner),
        });
        *subscription = Some(self.inner.context.subscribe(observer)?);
        debug!(context = %self.inner.context.name(), "view opened");
        Ok(())
    }

    /// Stop tracking changes and drop cached results
    pub fn close(&self) {
        if let Some(subscription) = self.inner.subscription.lock().take() {
            subscription.unsubscribe();
            debug!(context = %self.inner.context.name(), "view closed");
        }
        self.invalidate();
    }

    pub fn is_open(&self) -> bool {
        self.inner.subscription.lock().is_some()
    }

    fn invalidate(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *self.inner.cached_bindings.write() = None;
        *self.inner.cached_values.write() = None;
    }

    /// Matching bindings, child bindings shadowing parent ones by key
    pub fn bindings(&self) -> Vec<Binding> {
        if let Some(bindings) = self.inner.cached_bindings.read().as_ref() {
            return bindings.clone();
        }
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let mut bindings = self.inner.context.find(self.inner.filter.clone());
        if let Some(comparator) = &self.inner.comparator {
            bindings.sort_by(|a, b| comparator(a, b));
        }
        if self.is_open() && generation == self.inner.generation.load(Ordering::SeqCst) {
            *self.inner.cached_bindings.write() = Some(bindings.clone());
        }
        bindings
    }

    /// Drop caches and notify refresh listeners
    pub fn refresh(&self) {
        self.invalidate();
        let listeners: Vec<RefreshListener> = self
            .inner
            .refresh_listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(self);
        }
    }

    pub fn on_refresh(&self, listener: RefreshListener) -> u64 {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.refresh_listeners.lock().push((id, listener));
        id
    }

    pub fn remove_refresh_listener(&self, id: u64) -> bool {
        let mut listeners = self.inner.refresh_listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }

    /// Resolve every matching binding; absent values are skipped
    pub fn resolve(&self, session: Option<ResolutionSession>) -> ContextResult<ValueOrPromise<Vec<BoundValue>>> {
        if let Some(values) = self.inner.cached_values.read().as_ref() {
            return Ok(ValueOrPromise::Value(values.clone()));
        }
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let bindings = self.bindings();
        let ctx = self.inner.context.clone();
        let resolved = resolve_list(bindings, |binding, _| {
            binding.get_value(
                &ctx,
                ResolutionOptions {
                    session: Some(ResolutionSession::fork(session.as_ref())),
                    ..ResolutionOptions::default()
                },
            )
        })?;

        let view = self.clone();
        Ok(resolved.map(move |values| {
            let path = view.inner.property_path.as_deref();
            let values: Vec<BoundValue> = values
                .into_iter()
                .flatten()
                .filter_map(|value| match path {
                    Some(path) => get_deep_property(&value, path),
                    None => Some(value),
                })
                .collect();
            if view.is_open() && generation == view.inner.generation.load(Ordering::SeqCst) {
                *view.inner.cached_values.write() = Some(values.clone());
            }
            values
        }))
    }

    pub async fn values(&self) -> ContextResult<Vec<BoundValue>> {
        self.resolve(None)?.resolve().await
    }

    pub async fn values_of<T: Any + Send + Sync>(&self) -> ContextResult<Vec<Arc<T>>> {
        self.values()
            .await?
            .into_iter()
            .map(|value| downcast_value::<T>("ContextView", value))
            .collect()
    }

    /// The only value, `None` when nothing matches
    pub async fn single_value(&self) -> ContextResult<Option<BoundValue>> {
        self.single_value_with(None).await
    }

    pub async fn single_value_with(&self, session: Option<ResolutionSession>) -> ContextResult<Option<BoundValue>> {
        let mut values = self.resolve(session)?.resolve().await?;
        match values.len() {
            0 => Ok(None),
            1 => Ok(values.pop()),
            count => Err(ContextError::MultipleValues { count }),
        }
    }

    pub async fn single_value_of<T: Any + Send + Sync>(&self) -> ContextResult<Option<Arc<T>>> {
        match self.single_value().await? {
            Some(value) => downcast_value::<T>("ContextView", value).map(Some),
            None => Ok(None),
        }
    }

    /// Getter resolving the view's values on demand
    pub fn as_getter(&self, session: Option<ResolutionSession>) -> Getter {
        Getter::for_view(self.clone(), session)
    }
}

impl fmt::Debug for ContextView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextView")
            .field("context", &self.inner.context.name())
            .field("open", &self.is_open())
            .finish()
    }
}
