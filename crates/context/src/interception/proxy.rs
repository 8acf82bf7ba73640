//! Interceptor proxies
//!
//! A proxy wraps an [`InvocationTarget`] so every method call goes through the
//! interceptors configured for it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::context::Context;
use crate::errors::ContextResult;
use crate::interception::chain::InvocationResult;
use crate::interception::invocation::{
    invoke_method_with_interceptors, InvocationOptions, InvocationSource, InvocationTarget,
};
use crate::resolution::{Arguments, ClassMetadata, ResolutionSession};
use crate::value_promise::{downcast_value, BoundValue};

/// Wrapper routing calls on a target through interceptors
pub struct InterceptedProxy {
    target: Arc<dyn InvocationTarget>,
    context: Context,
    session: Option<ResolutionSession>,
}

impl InterceptedProxy {
    pub fn new(target: Arc<dyn InvocationTarget>, ctx: &Context, session: Option<ResolutionSession>) -> Self {
        Self {
            target,
            context: ctx.clone(),
            session,
        }
    }

    pub fn target(&self) -> &Arc<dyn InvocationTarget> {
        &self.target
    }

    /// Invoke `method`, injecting parameters not supplied in `args`
    pub async fn invoke(&self, method: &str, args: Arguments) -> ContextResult<InvocationResult> {
        let options = InvocationOptions {
            source: Some(InvocationSource::proxy(self.session.as_ref())),
            ..InvocationOptions::default()
        };
        invoke_method_with_interceptors(&self.context, self.target.clone(), method, args, options).await
    }

    /// Invoke `method` and downcast its result
    pub async fn invoke_as<T: Any + Send + Sync>(&self, method: &str, args: Arguments) -> ContextResult<Option<Arc<T>>> {
        let target = format!("{}.{}", self.target.type_name(), method);
        match self.invoke(method, args).await? {
            Some(value) => downcast_value::<T>(&target, value).map(Some),
            None => Ok(None),
        }
    }
}

impl InvocationTarget for InterceptedProxy {
    fn type_name(&self) -> &'static str {
        self.target.type_name()
    }

    fn class_metadata(&self) -> Option<Arc<ClassMetadata>> {
        self.target.class_metadata()
    }

    fn has_method(&self, method: &str) -> bool {
        self.target.has_method(method)
    }

    fn invoke_method(self: Arc<Self>, method: &str, args: Arguments) -> BoxFuture<'static, ContextResult<InvocationResult>> {
        let method = method.to_string();
        async move { self.invoke(&method, args).await }.boxed()
    }
}

impl fmt::Debug for InterceptedProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptedProxy")
            .field("target", &self.target.type_name())
            .field("context", &self.context.name())
            .finish()
    }
}

/// Wrap `target` in an [`InterceptedProxy`] resolved against `ctx`
pub fn create_proxy_with_interceptors(
    target: Arc<dyn InvocationTarget>,
    ctx: &Context,
    session: Option<ResolutionSession>,
) -> BoundValue {
    Arc::new(InterceptedProxy::new(target, ctx, session))
}
