//! Injection descriptors
//!
//! An [`Injection`] describes how one constructor parameter, method parameter
//! or property gets its value. Classes list their injections in
//! [`ClassMetadata`](crate::resolution::ClassMetadata).

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::binding::{Binding, BindingComparator, BindingFilter, BindingTagPattern, filter_by_tag};
use crate::context::{Context, ContextView};
use crate::errors::{ContextError, ContextResult};
use crate::keys::{BindingAddress, BindingKey};
use crate::resolution::getter::{Getter, Setter};
use crate::resolution::session::{ResolutionOptions, ResolutionSession};
use crate::value_promise::{BoundValue, ResolvedValue, ValueOrPromise};

/// Custom resolution function for an injection
pub type InjectionResolver = Arc<
    dyn Fn(&Context, &Arc<Injection>, ResolutionSession) -> ContextResult<ValueOrPromise<ResolvedValue>>
        + Send
        + Sync,
>;

/// What an injection resolves against
#[derive(Clone)]
pub enum BindingSelector {
    /// A binding key, optionally with a property path
    Key(BindingKey),
    /// Every binding matching the filter
    Filter(BindingFilter),
    /// No selector; the resolver decides
    None,
}

impl BindingSelector {
    pub fn as_key(&self) -> Option<&BindingKey> {
        match self {
            BindingSelector::Key(key) => Some(key),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, BindingSelector::None)
    }
}

impl fmt::Debug for BindingSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingSelector::Key(key) => write!(f, "{}", key),
            BindingSelector::Filter(filter) => write!(f, "{:?}", filter),
            BindingSelector::None => write!(f, "<none>"),
        }
    }
}

/// How setters and `Injection::binding` obtain their binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingCreationPolicy {
    /// Always bind a new binding
    AlwaysCreate,
    /// Use the existing binding; fail if the key is unbound
    NeverCreate,
    /// Use the existing binding or bind a new one
    #[default]
    CreateIfNotBound,
}

/// Where an injection is applied
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InjectionPoint {
    #[default]
    Unassigned,
    Constructor { index: usize },
    Method { name: String, index: usize },
    Property { name: String },
}

/// Extra information carried by an injection
#[derive(Clone, Default)]
pub struct InjectionMetadata {
    /// Name of the injection kind, e.g. `@inject.getter`
    pub decorator: &'static str,
    /// Resolve to `None` instead of failing when nothing is bound
    pub optional: bool,
    /// Path into the configuration value (`@config`)
    pub property_path: Option<String>,
    /// Read configuration of this key instead of the current binding's
    pub from_binding: Option<String>,
    pub binding_creation: Option<BindingCreationPolicy>,
    /// Ordering for filter/view injections
    pub binding_comparator: Option<BindingComparator>,
}

impl fmt::Debug for InjectionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectionMetadata")
            .field("decorator", &self.decorator)
            .field("optional", &self.optional)
            .field("property_path", &self.property_path)
            .field("from_binding", &self.from_binding)
            .field("binding_creation", &self.binding_creation)
            .finish()
    }
}

/// Describes how a single parameter or property is injected
#[derive(Clone)]
pub struct Injection {
    pub target: &'static str,
    pub point: InjectionPoint,
    pub binding_selector: BindingSelector,
    pub metadata: InjectionMetadata,
    pub resolve: Option<InjectionResolver>,
}

impl Injection {
    fn with_selector(decorator: &'static str, binding_selector: BindingSelector) -> Self {
        Self {
            target: "",
            point: InjectionPoint::Unassigned,
            binding_selector,
            metadata: InjectionMetadata {
                decorator,
                ..InjectionMetadata::default()
            },
            resolve: None,
        }
    }

    /// Inject the value bound to `key` (a `key#path` address projects a property)
    pub fn key(key: impl Into<BindingAddress>) -> Self {
        Self::with_selector("@inject", BindingSelector::Key(key.into()))
    }

    /// Inject the values of every binding matching `filter`
    pub fn filter(filter: BindingFilter) -> Self {
        Self::with_selector("@inject", BindingSelector::Filter(filter))
    }

    /// Inject the values of bindings matching a tag pattern
    pub fn tag(pattern: impl Into<BindingTagPattern>) -> Self {
        Self::with_selector("@inject.tag", BindingSelector::Filter(filter_by_tag(pattern)))
    }

    /// Inject a [`Getter`] resolving `key` lazily
    pub fn getter(key: impl Into<BindingAddress>) -> Self {
        Self::with_selector("@inject.getter", BindingSelector::Key(key.into())).with_resolver(resolve_as_getter)
    }

    /// Inject a [`Getter`] over every binding matching `filter`
    pub fn getter_by_filter(filter: BindingFilter) -> Self {
        Self::with_selector("@inject.getter", BindingSelector::Filter(filter)).with_resolver(resolve_as_getter)
    }

    /// Inject a [`Setter`] that binds values to `key`
    pub fn setter(key: impl Into<BindingAddress>) -> Self {
        Self::with_selector("@inject.setter", BindingSelector::Key(key.into())).with_resolver(resolve_as_setter)
    }

    /// Inject a live [`ContextView`] over `filter`
    pub fn view(filter: BindingFilter) -> Self {
        Self::with_selector("@inject.view", BindingSelector::Filter(filter)).with_resolver(resolve_as_view)
    }

    /// Inject the [`Binding`] for `key`, creating it if needed
    pub fn binding(key: impl Into<BindingAddress>) -> Self {
        Self::with_selector("@inject.binding", BindingSelector::Key(key.into())).with_resolver(resolve_as_binding)
    }

    /// Inject the binding currently being resolved
    pub fn current_binding() -> Self {
        Self::with_selector("@inject.binding", BindingSelector::None).with_resolver(resolve_as_binding)
    }

    /// Inject the resolution [`Context`]
    pub fn context() -> Self {
        Self::with_selector("@inject.context", BindingSelector::None)
            .with_resolver(|ctx, _, _| Ok(ValueOrPromise::Value(Some(Arc::new(ctx.clone()) as BoundValue))))
    }

    /// Inject configuration of the binding being resolved
    pub fn config(property_path: Option<&str>) -> Self {
        let mut injection = Self::with_selector("@config", BindingSelector::None).with_resolver(resolve_from_config);
        injection.metadata.property_path = property_path.map(str::to_string);
        injection.metadata.optional = true;
        injection
    }

    /// Inject configuration of another binding
    pub fn config_from(from_binding: impl Into<String>, property_path: Option<&str>) -> Self {
        let mut injection = Self::config(property_path);
        injection.metadata.from_binding = Some(from_binding.into());
        injection
    }

    /// Inject a [`Getter`] for configuration
    pub fn config_getter(property_path: Option<&str>) -> Self {
        let mut injection = Self::config(property_path).with_resolver(resolve_config_getter);
        injection.metadata.decorator = "@config.getter";
        injection
    }

    /// Inject a [`ContextView`] tracking configuration bindings
    pub fn config_view(property_path: Option<&str>) -> Self {
        let mut injection = Self::config(property_path).with_resolver(resolve_config_view);
        injection.metadata.decorator = "@config.view";
        injection
    }

    /// Resolve to `None` when nothing is bound
    pub fn optional(mut self) -> Self {
        self.metadata.optional = true;
        self
    }

    pub fn with_resolver<F>(mut self, resolve: F) -> Self
    where
        F: Fn(&Context, &Arc<Injection>, ResolutionSession) -> ContextResult<ValueOrPromise<ResolvedValue>>
            + Send
            + Sync
            + 'static,
    {
        self.resolve = Some(Arc::new(resolve));
        self
    }

    pub fn with_binding_creation(mut self, policy: BindingCreationPolicy) -> Self {
        self.metadata.binding_creation = Some(policy);
        self
    }

    pub fn with_comparator(mut self, comparator: BindingComparator) -> Self {
        self.metadata.binding_comparator = Some(comparator);
        self
    }

    pub fn at_constructor(mut self, target: &'static str, index: usize) -> Self {
        self.target = target;
        self.point = InjectionPoint::Constructor { index };
        self
    }

    pub fn at_method(mut self, target: &'static str, method: impl Into<String>, index: usize) -> Self {
        self.target = target;
        self.point = InjectionPoint::Method {
            name: method.into(),
            index,
        };
        self
    }

    pub fn at_property(mut self, target: &'static str, property: impl Into<String>) -> Self {
        self.target = target;
        self.point = InjectionPoint::Property { name: property.into() };
        self
    }

    pub fn is_constructor_or_property(&self) -> bool {
        matches!(
            self.point,
            InjectionPoint::Constructor { .. } | InjectionPoint::Property { .. }
        )
    }

    /// `Class[0]`, `Class.prototype.method[0]` or `Class.prototype.prop`
    pub fn target_name(&self) -> String {
        match &self.point {
            InjectionPoint::Unassigned => self.target.to_string(),
            InjectionPoint::Constructor { index } => format!("{}[{}]", self.target, index),
            InjectionPoint::Method { name, index } => format!("{}.prototype.{}[{}]", self.target, name, index),
            InjectionPoint::Property { name } => format!("{}.prototype.{}", self.target, name),
        }
    }

    /// Whether the resolver has anything to resolve
    pub fn is_resolvable(&self) -> bool {
        self.resolve.is_some() || !self.binding_selector.is_empty()
    }

    pub fn describe(&self) -> Value {
        let selector = match &self.binding_selector {
            BindingSelector::Key(key) => Value::String(key.to_string()),
            BindingSelector::Filter(_) => Value::String("<filter>".to_string()),
            BindingSelector::None => Value::String(String::new()),
        };
        let mut metadata = json!({
            "decorator": self.metadata.decorator,
            "optional": self.metadata.optional,
        });
        if let Some(path) = &self.metadata.property_path {
            metadata["propertyPath"] = Value::String(path.clone());
        }
        json!({
            "targetName": self.target_name(),
            "bindingSelector": selector,
            "metadata": metadata,
        })
    }
}

impl fmt::Debug for Injection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injection")
            .field("target", &self.target_name())
            .field("binding_selector", &self.binding_selector)
            .field("metadata", &self.metadata)
            .field("custom_resolve", &self.resolve.is_some())
            .finish()
    }
}

fn resolved<T: std::any::Any + Send + Sync>(value: T) -> ContextResult<ValueOrPromise<ResolvedValue>> {
    Ok(ValueOrPromise::Value(Some(Arc::new(value) as BoundValue)))
}

fn resolve_as_getter(
    ctx: &Context,
    injection: &Arc<Injection>,
    session: ResolutionSession,
) -> ContextResult<ValueOrPromise<ResolvedValue>> {
    match &injection.binding_selector {
        BindingSelector::Key(key) => {
            let options = ResolutionOptions {
                session: Some(session),
                optional: injection.metadata.optional,
                as_proxy_with_interceptors: false,
            };
            resolved(Getter::for_key(ctx.clone(), key.clone(), options))
        }
        BindingSelector::Filter(filter) => {
            let view = ContextView::new(ctx, filter.clone(), injection.metadata.binding_comparator.clone());
            view.open()?;
            resolved(view.as_getter(Some(session)))
        }
        BindingSelector::None => Err(ContextError::invalid_injection(
            injection.target_name(),
            "@inject.getter requires a binding key or filter",
        )),
    }
}

fn resolve_as_setter(
    ctx: &Context,
    injection: &Arc<Injection>,
    _session: ResolutionSession,
) -> ContextResult<ValueOrPromise<ResolvedValue>> {
    let key = injection.binding_selector.as_key().ok_or_else(|| {
        ContextError::invalid_injection(injection.target_name(), "@inject.setter requires a binding key")
    })?;
    // Setters never carry the session; they run after resolution finished
    resolved(Setter::new(
        ctx.clone(),
        key.clone(),
        injection.metadata.binding_creation.unwrap_or_default(),
    ))
}

fn resolve_as_view(
    ctx: &Context,
    injection: &Arc<Injection>,
    _session: ResolutionSession,
) -> ContextResult<ValueOrPromise<ResolvedValue>> {
    let filter = match &injection.binding_selector {
        BindingSelector::Filter(filter) => filter.clone(),
        _ => {
            return Err(ContextError::invalid_injection(
                injection.target_name(),
                "@inject.view requires a binding filter",
            ))
        }
    };
    let view = ContextView::new(ctx, filter, injection.metadata.binding_comparator.clone());
    view.open()?;
    resolved(view)
}

fn resolve_as_binding(
    ctx: &Context,
    injection: &Arc<Injection>,
    session: ResolutionSession,
) -> ContextResult<ValueOrPromise<ResolvedValue>> {
    let binding: Binding = match &injection.binding_selector {
        BindingSelector::Key(key) => {
            ctx.find_or_create_binding(key.key(), injection.metadata.binding_creation.unwrap_or_default())?
        }
        _ => match session.current_binding() {
            Some(binding) => binding.clone(),
            None => {
                return Err(ContextError::invalid_injection(
                    injection.target_name(),
                    "no binding is being resolved",
                ))
            }
        },
    };
    resolved(binding)
}

fn config_key(injection: &Arc<Injection>, session: &ResolutionSession) -> Option<String> {
    injection
        .metadata
        .from_binding
        .clone()
        .or_else(|| session.current_binding().map(|binding| binding.key().to_string()))
}

fn resolve_from_config(
    ctx: &Context,
    injection: &Arc<Injection>,
    session: ResolutionSession,
) -> ContextResult<ValueOrPromise<ResolvedValue>> {
    let key = match config_key(injection, &session) {
        Some(key) => key,
        None => return Ok(ValueOrPromise::Value(None)),
    };
    let options = ResolutionOptions {
        session: Some(session),
        optional: injection.metadata.optional,
        as_proxy_with_interceptors: false,
    };
    ctx.get_config_as_value_or_promise(&key, injection.metadata.property_path.as_deref(), options)
}

fn resolve_config_getter(
    ctx: &Context,
    injection: &Arc<Injection>,
    session: ResolutionSession,
) -> ContextResult<ValueOrPromise<ResolvedValue>> {
    let key = config_key(injection, &session).unwrap_or_default();
    let options = ResolutionOptions {
        session: Some(session),
        optional: injection.metadata.optional,
        as_proxy_with_interceptors: false,
    };
    resolved(Getter::for_config(
        ctx.clone(),
        key,
        injection.metadata.property_path.clone(),
        options,
    ))
}

fn resolve_config_view(
    ctx: &Context,
    injection: &Arc<Injection>,
    session: ResolutionSession,
) -> ContextResult<ValueOrPromise<ResolvedValue>> {
    let key = match config_key(injection, &session) {
        Some(key) => key,
        None => {
            return Err(ContextError::invalid_injection(
                injection.target_name(),
                "@config.view requires a binding to read configuration for",
            ))
        }
    };
    let view = ContextView::for_config(ctx, &key, injection.metadata.property_path.clone());
    view.open()?;
    resolved(view)
}
