//! Method invocations routed through interceptors

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::binding::{sort_bindings_by_phase, Binding};
use crate::context::Context;
use crate::errors::{ContextError, ContextResult};
use crate::interception::chain::{
    merge_interceptors, GenericInterceptor, GenericInterceptorChain, GenericInterceptorOrKey, InterceptionContext,
    InterceptorFuture, InvocationResult,
};
use crate::keys::{BindingKey, ContextBindings, ContextTags};
use crate::resolution::{invoke_method, Arguments, ClassMetadata, ResolutionSession};

/// Interceptor of method invocations
pub type Interceptor = dyn GenericInterceptor<InvocationContext>;

/// Interceptor of method invocations, or the key of a binding holding one
pub type InterceptorOrKey = GenericInterceptorOrKey<InvocationContext>;

/// An object whose methods can be invoked by name
///
/// Interceptor proxies and `invoke_method` drive targets through this trait.
pub trait InvocationTarget: Send + Sync + 'static {
    fn type_name(&self) -> &'static str;

    /// Injection and interceptor metadata of the target's class
    fn class_metadata(&self) -> Option<Arc<ClassMetadata>> {
        None
    }

    fn has_method(&self, method: &str) -> bool {
        self.class_metadata()
            .map_or(false, |metadata| metadata.has_method(method))
    }

    fn invoke_method(self: Arc<Self>, method: &str, args: Arguments) -> BoxFuture<'static, ContextResult<InvocationResult>>;
}

/// Origin of an invocation, used to scope global interceptors
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationSource {
    source_type: String,
    value: Value,
}

impl InvocationSource {
    pub fn new(source_type: impl Into<String>, value: Value) -> Self {
        Self {
            source_type: source_type.into(),
            value,
        }
    }

    /// Source of calls made through an interceptor proxy
    pub fn proxy(session: Option<&ResolutionSession>) -> Self {
        let path = session.map(ResolutionSession::binding_path).unwrap_or_default();
        Self::new("proxy", Value::String(path))
    }

    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    pub fn value(&self) -> &Value {
        &self.value
    }
}

impl fmt::Display for InvocationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::String(value) if !value.is_empty() => write!(f, "{}({})", self.source_type, value),
            _ => f.write_str(&self.source_type),
        }
    }
}

/// Options of `invoke_method` and `invoke_method_with_interceptors`
#[derive(Debug, Clone, Default)]
pub struct InvocationOptions {
    /// Session used to resolve parameter injections
    pub session: Option<ResolutionSession>,
    /// Call the target directly
    pub skip_interceptors: bool,
    /// Arguments are already complete
    pub skip_parameter_injection: bool,
    pub source: Option<InvocationSource>,
}

struct InvocationInner {
    context: Context,
    target: Arc<dyn InvocationTarget>,
    method_name: String,
    args: RwLock<Arguments>,
    source: Option<InvocationSource>,
}

/// A method invocation in progress
///
/// Owns a child context of the caller's context; interceptors can bind
/// values there without touching the caller's registry.
#[derive(Clone)]
pub struct InvocationContext {
    inner: Arc<InvocationInner>,
}

impl InvocationContext {
    pub fn new(
        parent: &Context,
        target: Arc<dyn InvocationTarget>,
        method_name: impl Into<String>,
        args: Arguments,
        source: Option<InvocationSource>,
    ) -> Self {
        let context = Context::with_parent(parent, format!("InvocationContext-{}", Uuid::new_v4()));
        Self {
            inner: Arc::new(InvocationInner {
                context,
                target,
                method_name: method_name.into(),
                args: RwLock::new(args),
                source,
            }),
        }
    }

    pub fn target(&self) -> &Arc<dyn InvocationTarget> {
        &self.inner.target
    }

    pub fn method_name(&self) -> &str {
        &self.inner.method_name
    }

    pub fn args(&self) -> Arguments {
        self.inner.args.read().clone()
    }

    /// Replace the arguments passed to the target
    pub fn set_args(&self, args: Arguments) {
        *self.inner.args.write() = args;
    }

    pub fn source(&self) -> Option<&InvocationSource> {
        self.inner.source.as_ref()
    }

    /// `Type.prototype.method`
    pub fn target_name(&self) -> String {
        format!("{}.prototype.{}", self.inner.target.type_name(), self.inner.method_name)
    }

    pub fn description(&self) -> String {
        format!("InvocationContext({}): {}", self.inner.context.name(), self.target_name())
    }

    pub fn assert_method_exists(&self) -> ContextResult<()> {
        if self.inner.target.has_method(&self.inner.method_name) {
            return Ok(());
        }
        Err(ContextError::MethodNotFound {
            target: self.inner.target.type_name().to_string(),
            method: self.inner.method_name.clone(),
        })
    }

    fn applicable_to(&self, binding: &Binding) -> bool {
        let source_type = match &self.inner.source {
            Some(source) => source.source_type(),
            None => return true,
        };
        match binding.tag_value(ContextTags::GLOBAL_INTERCEPTOR_SOURCE) {
            None | Some(Value::Null) => true,
            Some(Value::String(allowed)) => allowed == source_type,
            Some(Value::Array(allowed)) => allowed.iter().any(|item| item.as_str() == Some(source_type)),
            Some(_) => false,
        }
    }

    /// Keys of the global interceptors applying to this invocation, ordered
    /// by group
    pub fn get_global_interceptor_binding_keys(&self) -> Vec<BindingKey> {
        let mut bindings: Vec<Binding> = self
            .inner
            .context
            .find_by_tag(ContextTags::GLOBAL_INTERCEPTOR)
            .into_iter()
            .filter(|binding| self.applicable_to(binding))
            .collect();

        let ordered_groups: Vec<String> = self
            .inner
            .context
            .get_optional_sync::<Vec<String>>(ContextBindings::GLOBAL_INTERCEPTOR_ORDERED_GROUPS)
            .ok()
            .flatten()
            .map(|groups| groups.as_ref().clone())
            .unwrap_or_default();
        sort_bindings_by_phase(&mut bindings, ContextTags::GLOBAL_INTERCEPTOR_GROUP, &ordered_groups);

        let keys: Vec<BindingKey> = bindings.iter().map(|binding| BindingKey::from(binding.key())).collect();
        debug!(invocation = %self.description(), keys = ?keys, "global interceptors");
        keys
    }

    /// Global, class level and method level interceptors, in that order
    pub fn load_interceptors(&self) -> Vec<InterceptorOrKey> {
        let (class_level, method_level) = match self.inner.target.class_metadata() {
            Some(metadata) => (
                metadata.class_interceptors().to_vec(),
                metadata.method_interceptors(&self.inner.method_name).to_vec(),
            ),
            None => (Vec::new(), Vec::new()),
        };
        let interceptors = merge_interceptors(&class_level, &method_level);
        let global: Vec<InterceptorOrKey> = self
            .get_global_interceptor_binding_keys()
            .into_iter()
            .map(InterceptorOrKey::Key)
            .collect();
        merge_interceptors(&global, &interceptors)
    }

    /// Call the target method, injecting parameters unless told otherwise
    pub fn invoke_target_method(&self, options: &InvocationOptions) -> InterceptorFuture {
        let target = self.inner.target.clone();
        let method = self.inner.method_name.clone();
        let args = self.args();
        if options.skip_parameter_injection {
            return target.invoke_method(&method, args);
        }
        let ctx = self.inner.context.clone();
        let options = InvocationOptions {
            skip_interceptors: true,
            ..options.clone()
        };
        async move { invoke_method(target, &method, &ctx, args, options).await }.boxed()
    }

    /// Release the invocation's child context
    pub fn close(&self) {
        self.inner.context.close();
    }
}

impl InterceptionContext for InvocationContext {
    fn context(&self) -> &Context {
        &self.inner.context
    }
}

impl Deref for InvocationContext {
    type Target = Context;

    fn deref(&self) -> &Context {
        &self.inner.context
    }
}

impl fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationContext")
            .field("context", &self.inner.context.name())
            .field("target", &self.target_name())
            .field("source", &self.inner.source)
            .finish()
    }
}

/// Invoke `method` on `target` through its interceptors
///
/// Global interceptors come first, then class level, then method level ones.
pub async fn invoke_method_with_interceptors(
    ctx: &Context,
    target: Arc<dyn InvocationTarget>,
    method: &str,
    args: Arguments,
    options: InvocationOptions,
) -> ContextResult<InvocationResult> {
    let invocation = InvocationContext::new(ctx, target, method, args, options.source.clone());
    invocation.assert_method_exists()?;

    let interceptors = invocation.load_interceptors();
    debug!(
        invocation = %invocation.description(),
        interceptors = interceptors.len(),
        "invoking method with interceptors"
    );

    let result = GenericInterceptorChain::new(invocation.clone(), interceptors)
        .invoke_interceptors(move |invocation: InvocationContext| invocation.invoke_target_method(&options))
        .await;
    invocation.close();
    result
}
