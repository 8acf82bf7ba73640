//! Generic interceptor chain
//!
//! Interceptors receive the invocation context and a [`Next`] handle; calling
//! `next.run()` continues with the following interceptor (and finally the
//! wrapped handler). Not calling it short-circuits the rest of the chain.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::trace;

use crate::binding::{BindingComparator, BindingFilter};
use crate::context::Context;
use crate::errors::{ContextError, ContextResult};
use crate::keys::BindingKey;
use crate::resolution::ResolutionOptions;
use crate::value_promise::ResolvedValue;

/// Result of an intercepted invocation
pub type InvocationResult = ResolvedValue;

/// Future returned by interceptors and by [`Next::run`]
pub type InterceptorFuture = BoxFuture<'static, ContextResult<InvocationResult>>;

/// Handler invoked once every interceptor has called `next`
pub type FinalHandler<C> = Arc<dyn Fn(C) -> InterceptorFuture + Send + Sync>;

/// Context type an interceptor chain runs against
///
/// Interceptors referenced by binding key are resolved from [`context`](Self::context).
pub trait InterceptionContext: Clone + Send + Sync + 'static {
    fn context(&self) -> &Context;
}

impl InterceptionContext for Context {
    fn context(&self) -> &Context {
        self
    }
}

/// A middleware around an invocation
pub trait GenericInterceptor<C>: Send + Sync {
    fn intercept(&self, context: C, next: Next<C>) -> InterceptorFuture;
}

impl<C, F, Fut> GenericInterceptor<C> for F
where
    C: InterceptionContext,
    F: Fn(C, Next<C>) -> Fut + Send + Sync,
    Fut: Future<Output = ContextResult<InvocationResult>> + Send + 'static,
{
    fn intercept(&self, context: C, next: Next<C>) -> InterceptorFuture {
        self(context, next).boxed()
    }
}

/// An interceptor, or the key of a binding whose value is one
///
/// Keys are resolved when the chain reaches them. The bound value must be an
/// `Arc<dyn GenericInterceptor<C>>`.
pub enum GenericInterceptorOrKey<C> {
    Interceptor(Arc<dyn GenericInterceptor<C>>),
    Key(BindingKey),
}

impl<C: InterceptionContext> GenericInterceptorOrKey<C> {
    /// Wrap a function interceptor
    pub fn from_fn<F, Fut>(interceptor: F) -> Self
    where
        F: Fn(C, Next<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ContextResult<InvocationResult>> + Send + 'static,
    {
        GenericInterceptorOrKey::Interceptor(Arc::new(interceptor))
    }
}

impl<C> GenericInterceptorOrKey<C> {
    pub fn as_key(&self) -> Option<&BindingKey> {
        match self {
            GenericInterceptorOrKey::Key(key) => Some(key),
            GenericInterceptorOrKey::Interceptor(_) => None,
        }
    }
}

impl<C> Clone for GenericInterceptorOrKey<C> {
    fn clone(&self) -> Self {
        match self {
            GenericInterceptorOrKey::Interceptor(interceptor) => GenericInterceptorOrKey::Interceptor(interceptor.clone()),
            GenericInterceptorOrKey::Key(key) => GenericInterceptorOrKey::Key(key.clone()),
        }
    }
}

/// Keys are equal by key, interceptors by identity
impl<C> PartialEq for GenericInterceptorOrKey<C> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GenericInterceptorOrKey::Key(a), GenericInterceptorOrKey::Key(b)) => a == b,
            (GenericInterceptorOrKey::Interceptor(a), GenericInterceptorOrKey::Interceptor(b)) => {
                std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
            }
            _ => false,
        }
    }
}

impl<C> fmt::Debug for GenericInterceptorOrKey<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenericInterceptorOrKey::Key(key) => write!(f, "Key({})", key),
            GenericInterceptorOrKey::Interceptor(interceptor) => {
                write!(f, "Interceptor({:p})", Arc::as_ptr(interceptor) as *const ())
            }
        }
    }
}

impl<C> From<BindingKey> for GenericInterceptorOrKey<C> {
    fn from(key: BindingKey) -> Self {
        GenericInterceptorOrKey::Key(key)
    }
}

impl<C> From<&str> for GenericInterceptorOrKey<C> {
    fn from(key: &str) -> Self {
        GenericInterceptorOrKey::Key(BindingKey::from(key))
    }
}

impl<C> From<Arc<dyn GenericInterceptor<C>>> for GenericInterceptorOrKey<C> {
    fn from(interceptor: Arc<dyn GenericInterceptor<C>>) -> Self {
        GenericInterceptorOrKey::Interceptor(interceptor)
    }
}

struct ChainState<C> {
    context: C,
    interceptors: Vec<GenericInterceptorOrKey<C>>,
    final_handler: FinalHandler<C>,
}

/// The rest of an interceptor chain
pub struct Next<C> {
    chain: Arc<ChainState<C>>,
    index: usize,
}

impl<C> Clone for Next<C> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            index: self.index,
        }
    }
}

impl<C: InterceptionContext> Next<C> {
    /// Continue with the following interceptor
    pub fn run(self) -> InterceptorFuture {
        invoke_from(self.chain, self.index)
    }

    pub fn context(&self) -> &C {
        &self.chain.context
    }
}

impl<C> fmt::Debug for Next<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &self.chain.interceptors.len().saturating_sub(self.index))
            .finish()
    }
}

fn invoke_from<C: InterceptionContext>(chain: Arc<ChainState<C>>, index: usize) -> InterceptorFuture {
    async move {
        let entry = match chain.interceptors.get(index) {
            Some(entry) => entry.clone(),
            None => {
                trace!(index, "invoking final handler");
                return (chain.final_handler)(chain.context.clone()).await;
            }
        };
        let interceptor = load_interceptor(chain.context.context(), &entry).await?;
        trace!(index, interceptor = ?entry, "invoking interceptor");
        let next = Next {
            chain: chain.clone(),
            index: index + 1,
        };
        interceptor.intercept(chain.context.clone(), next).await
    }
    .boxed()
}

async fn load_interceptor<C: InterceptionContext>(
    ctx: &Context,
    entry: &GenericInterceptorOrKey<C>,
) -> ContextResult<Arc<dyn GenericInterceptor<C>>> {
    let key = match entry {
        GenericInterceptorOrKey::Interceptor(interceptor) => return Ok(interceptor.clone()),
        GenericInterceptorOrKey::Key(key) => key,
    };
    let value = ctx
        .get_value_or_promise(key, ResolutionOptions::default())?
        .resolve()
        .await?;
    value
        .and_then(|value| value.downcast::<Arc<dyn GenericInterceptor<C>>>().ok())
        .map(|interceptor| interceptor.as_ref().clone())
        .ok_or_else(|| ContextError::InvalidInterceptor { key: key.to_string() })
}

/// An ordered list of interceptors bound to one context
pub struct GenericInterceptorChain<C> {
    context: C,
    interceptors: Vec<GenericInterceptorOrKey<C>>,
}

impl<C: InterceptionContext> GenericInterceptorChain<C> {
    pub fn new(context: C, interceptors: Vec<GenericInterceptorOrKey<C>>) -> Self {
        Self { context, interceptors }
    }

    /// Chain of the interceptors bound under keys matching `filter`
    pub fn from_filter(context: C, filter: BindingFilter, comparator: Option<BindingComparator>) -> Self {
        let mut bindings = context.context().find(filter);
        if let Some(comparator) = comparator {
            bindings.sort_by(|a, b| comparator(a, b));
        }
        let interceptors = bindings
            .iter()
            .map(|binding| GenericInterceptorOrKey::Key(BindingKey::from(binding.key())))
            .collect();
        Self::new(context, interceptors)
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn interceptors(&self) -> &[GenericInterceptorOrKey<C>] {
        &self.interceptors
    }

    /// Run the chain; the result of the last `next` is `None`
    pub fn invoke(self) -> InterceptorFuture {
        self.invoke_interceptors(|_| async { Ok(None) })
    }

    /// Run the chain, ending with `final_handler`
    pub fn invoke_interceptors<F, Fut>(self, final_handler: F) -> InterceptorFuture
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ContextResult<InvocationResult>> + Send + 'static,
    {
        let chain = Arc::new(ChainState {
            context: self.context,
            interceptors: self.interceptors,
            final_handler: Arc::new(move |context| final_handler(context).boxed()),
        });
        invoke_from(chain, 0)
    }
}

/// Compose several interceptors into one
///
/// The composed interceptor's `next` runs after the last inner interceptor.
pub fn compose_interceptors<C: InterceptionContext>(
    interceptors: Vec<GenericInterceptorOrKey<C>>,
) -> Arc<dyn GenericInterceptor<C>> {
    Arc::new(move |context: C, next: Next<C>| {
        let chain = GenericInterceptorChain::new(context, interceptors.clone());
        chain.invoke_interceptors(move |_| next.clone().run())
    })
}

/// Merge `incoming` into `existing`
///
/// Both lists are de-duplicated keeping the first occurrence. Entries of
/// `incoming` missing from `existing` go to the front; entries already in
/// `existing` keep their position there.
pub fn merge_interceptors<T: PartialEq + Clone>(incoming: &[T], existing: &[T]) -> Vec<T> {
    let incoming = dedupe(incoming);
    let existing = dedupe(existing);
    let mut merged: Vec<T> = incoming
        .into_iter()
        .filter(|interceptor| !existing.contains(interceptor))
        .collect();
    merged.extend(existing);
    merged
}

fn dedupe<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut unique: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !unique.contains(item) {
            unique.push(item.clone());
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, name: &'static str) -> GenericInterceptorOrKey<Context> {
        let log = log.clone();
        GenericInterceptorOrKey::from_fn(move |_ctx: Context, next: Next<Context>| {
            let log = log.clone();
            async move {
                log.lock().push(format!("before-{}", name));
                let result = next.run().await;
                log.lock().push(format!("after-{}", name));
                result
            }
        })
    }

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let ctx = Context::named("app");
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let chain = GenericInterceptorChain::new(ctx, vec![recording(&log, "a"), recording(&log, "b")]);

        let handler_log = log.clone();
        let result = chain
            .invoke_interceptors(move |_| {
                let log = handler_log.clone();
                async move {
                    log.lock().push("handler".to_string());
                    Ok(Some(Arc::new(42u32) as crate::value_promise::BoundValue))
                }
            })
            .await
            .unwrap();

        assert_eq!(result.unwrap().downcast_ref::<u32>(), Some(&42));
        assert_eq!(
            *log.lock(),
            vec!["before-a", "before-b", "handler", "after-b", "after-a"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_rest() {
        let ctx = Context::named("app");
        let calls = Arc::new(AtomicUsize::new(0));
        let first = GenericInterceptorOrKey::from_fn(|_ctx: Context, _next: Next<Context>| async {
            Ok(Some(Arc::new("cached".to_string()) as crate::value_promise::BoundValue))
        });
        let counter = calls.clone();
        let second = GenericInterceptorOrKey::from_fn(move |_ctx: Context, next: Next<Context>| {
            counter.fetch_add(1, Ordering::SeqCst);
            next.run()
        });

        let handler_calls = calls.clone();
        let result = GenericInterceptorChain::new(ctx, vec![first, second])
            .invoke_interceptors(move |_| {
                handler_calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(None) }
            })
            .await
            .unwrap();

        assert_eq!(result.unwrap().downcast_ref::<String>().map(String::as_str), Some("cached"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_interceptor_by_key() {
        let ctx = Context::named("app");
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        if let GenericInterceptorOrKey::Interceptor(interceptor) = recording(&log, "bound") {
            ctx.bind("interceptors.bound").unwrap().to(interceptor);
        }
        ctx.bind("interceptors.invalid").unwrap().to(1u8);

        GenericInterceptorChain::new(ctx.clone(), vec!["interceptors.bound".into()])
            .invoke()
            .await
            .unwrap();
        assert_eq!(*log.lock(), vec!["before-bound", "after-bound"]);

        let err = GenericInterceptorChain::new(ctx, vec!["interceptors.invalid".into()])
            .invoke()
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Interceptor interceptors.invalid is not a function");
    }

    #[tokio::test]
    async fn test_compose_interceptors() {
        let ctx = Context::named("app");
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let composed = compose_interceptors(vec![recording(&log, "a"), recording(&log, "b")]);

        GenericInterceptorChain::new(
            ctx,
            vec![GenericInterceptorOrKey::Interceptor(composed), recording(&log, "c")],
        )
        .invoke()
        .await
        .unwrap();

        assert_eq!(
            *log.lock(),
            vec!["before-a", "before-b", "before-c", "after-c", "after-b", "after-a"]
        );
    }

    #[test]
    fn test_merge_interceptors() {
        assert_eq!(merge_interceptors(&["log"], &["cache", "log"]), vec!["cache", "log"]);
        assert_eq!(merge_interceptors(&["log"], &["log", "cache"]), vec!["log", "cache"]);
        assert_eq!(merge_interceptors(&["log"], &["cache"]), vec!["log", "cache"]);
        assert_eq!(merge_interceptors(&["log", "log"], &["cache", "cache"]), vec!["log", "cache"]);
        assert_eq!(
            merge_interceptors(&["a", "b", "c"], &["c", "b", "d"]),
            vec!["a", "c", "b", "d"]
        );
    }

    #[test]
    fn test_interceptor_identity() {
        let a: GenericInterceptorOrKey<Context> =
            GenericInterceptorOrKey::from_fn(|_ctx: Context, next: Next<Context>| next.run());
        let b: GenericInterceptorOrKey<Context> =
            GenericInterceptorOrKey::from_fn(|_ctx: Context, next: Next<Context>| next.run());
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(
            GenericInterceptorOrKey::<Context>::from("x"),
            GenericInterceptorOrKey::<Context>::from("x")
        );
    }
}
