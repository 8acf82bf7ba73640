//! Values that are either available now or produced later
//!
//! Resolution stays synchronous end-to-end as long as every dependency is
//! synchronous. Only when a factory, provider or constructor dependency yields
//! a future does the caller receive a [`ValueOrPromise::Promise`].

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};

use crate::errors::{ContextError, ContextResult};

/// Type-erased value held by a binding
pub type BoundValue = Arc<dyn Any + Send + Sync>;

/// A resolved value; `None` stands for an optional dependency that is absent
pub type ResolvedValue = Option<BoundValue>;

/// Wrap a value so it can be stored in a binding or passed as an argument
pub fn bound<T: Any + Send + Sync>(value: T) -> BoundValue {
    Arc::new(value)
}

/// Downcast a type-erased value, naming `target` in the error
pub fn downcast_value<T: Any + Send + Sync>(target: &str, value: BoundValue) -> ContextResult<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| ContextError::type_mismatch(target, std::any::type_name::<T>()))
}

/// Either a value or a future resolving to it
pub enum ValueOrPromise<T> {
    Value(T),
    Promise(BoxFuture<'static, ContextResult<T>>),
}

impl<T> std::fmt::Debug for ValueOrPromise<T>
where
    T: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueOrPromise::Value(value) => f.debug_tuple("Value").field(value).finish(),
            ValueOrPromise::Promise(_) => write!(f, "Promise(<future>)"),
        }
    }
}

impl<T: Send + 'static> ValueOrPromise<T> {
    /// Wrap a future
    pub fn promise<F>(future: F) -> Self
    where
        F: Future<Output = ContextResult<T>> + Send + 'static,
    {
        ValueOrPromise::Promise(future.boxed())
    }

    /// Check if the value is still pending
    pub fn is_promise(&self) -> bool {
        matches!(self, ValueOrPromise::Promise(_))
    }

    /// Take the value if it is available synchronously
    pub fn into_value(self) -> Option<T> {
        match self {
            ValueOrPromise::Value(value) => Some(value),
            ValueOrPromise::Promise(_) => None,
        }
    }

    /// Convert into a future, whatever the variant
    pub fn into_future(self) -> BoxFuture<'static, ContextResult<T>> {
        match self {
            ValueOrPromise::Value(value) => future::ready(Ok(value)).boxed(),
            ValueOrPromise::Promise(promise) => promise,
        }
    }

    /// Wait for the value
    pub async fn resolve(self) -> ContextResult<T> {
        match self {
            ValueOrPromise::Value(value) => Ok(value),
            ValueOrPromise::Promise(promise) => promise.await,
        }
    }

    /// Transform the value without leaving the synchronous path when possible
    pub fn map<U, F>(self, f: F) -> ValueOrPromise<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        match self {
            ValueOrPromise::Value(value) => ValueOrPromise::Value(f(value)),
            ValueOrPromise::Promise(promise) => {
                ValueOrPromise::Promise(async move { promise.await.map(f) }.boxed())
            }
        }
    }

    /// Chain a computation that may itself be synchronous or not
    pub fn and_then<U, F>(self, f: F) -> ContextResult<ValueOrPromise<U>>
    where
        U: Send + 'static,
        F: FnOnce(T) -> ContextResult<ValueOrPromise<U>> + Send + 'static,
    {
        match self {
            ValueOrPromise::Value(value) => f(value),
            ValueOrPromise::Promise(promise) => Ok(ValueOrPromise::Promise(
                async move {
                    let value = promise.await?;
                    f(value)?.resolve().await
                }
                .boxed(),
            )),
        }
    }
}

/// Resolve every item, staying synchronous unless one resolver returns a future
///
/// Resolvers run eagerly in order; pending results are awaited together and
/// the output keeps the input order.
pub fn resolve_list<I, R, F>(items: Vec<I>, mut resolver: F) -> ContextResult<ValueOrPromise<Vec<R>>>
where
    R: Send + 'static,
    F: FnMut(I, usize) -> ContextResult<ValueOrPromise<R>>,
{
    let mut results: Vec<ValueOrPromise<R>> = Vec::with_capacity(items.len());
    let mut has_promise = false;
    for (index, item) in items.into_iter().enumerate() {
        let result = resolver(item, index)?;
        has_promise |= result.is_promise();
        results.push(result);
    }

    if !has_promise {
        let values = results
            .into_iter()
            .filter_map(ValueOrPromise::into_value)
            .collect();
        return Ok(ValueOrPromise::Value(values));
    }

    let futures: Vec<_> = results.into_iter().map(ValueOrPromise::into_future).collect();
    Ok(ValueOrPromise::promise(future::try_join_all(futures)))
}

/// Combine two independent results
pub fn resolve_pair<A, B>(
    first: ValueOrPromise<A>,
    second: ValueOrPromise<B>,
) -> ValueOrPromise<(A, B)>
where
    A: Send + 'static,
    B: Send + 'static,
{
    match (first, second) {
        (ValueOrPromise::Value(a), ValueOrPromise::Value(b)) => ValueOrPromise::Value((a, b)),
        (first, second) => ValueOrPromise::promise(future::try_join(
            first.into_future(),
            second.into_future(),
        )),
    }
}

/// Project a dot-separated property path out of a value
///
/// Supports `serde_json::Value` (objects and array indexes) and
/// `HashMap<String, BoundValue>` values. Missing segments yield `None`.
pub fn get_deep_property(value: &BoundValue, path: &str) -> ResolvedValue {
    if path.is_empty() {
        return Some(value.clone());
    }

    if let Some(json) = value.downcast_ref::<serde_json::Value>() {
        let mut current = json;
        for segment in path.split('.') {
            current = match current {
                serde_json::Value::Object(map) => map.get(segment)?,
                serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        return Some(Arc::new(current.clone()));
    }

    if let Some(map) = value.downcast_ref::<HashMap<String, BoundValue>>() {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let child = map.get(head)?;
        return match rest {
            Some(rest) => get_deep_property(child, rest),
            None => Some(child.clone()),
        };
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_list_sync() {
        let result = resolve_list(vec![1, 2, 3], |item, _| Ok(ValueOrPromise::Value(item * 2))).unwrap();
        assert!(!result.is_promise());
        assert_eq!(result.into_value().unwrap(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_resolve_list_mixed_keeps_order() {
        let result = resolve_list(vec![1, 2, 3], |item, index| {
            if index == 1 {
                Ok(ValueOrPromise::promise(async move {
                    tokio::task::yield_now().await;
                    Ok(item * 10)
                }))
            } else {
                Ok(ValueOrPromise::Value(item * 10))
            }
        })
        .unwrap();
        assert!(result.is_promise());
        assert_eq!(result.resolve().await.unwrap(), vec![10, 20, 30]);
    }

    #[test]
    fn test_resolve_list_sync_error_is_immediate() {
        let result: ContextResult<ValueOrPromise<Vec<i32>>> =
            resolve_list(vec![1, 2], |_, _| Err(ContextError::custom("boom")));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_and_then_on_promise() {
        let value = ValueOrPromise::promise(async { Ok(2) });
        let chained = value
            .and_then(|v| Ok(ValueOrPromise::Value(v + 1)))
            .unwrap();
        assert_eq!(chained.resolve().await.unwrap(), 3);
    }

    #[test]
    fn test_deep_property_json() {
        let value = bound(json!({"db": {"port": 5432, "hosts": ["a", "b"]}}));
        let port = get_deep_property(&value, "db.port").unwrap();
        assert_eq!(port.downcast_ref::<serde_json::Value>(), Some(&json!(5432)));
        let host = get_deep_property(&value, "db.hosts.1").unwrap();
        assert_eq!(host.downcast_ref::<serde_json::Value>(), Some(&json!("b")));
        assert!(get_deep_property(&value, "db.user.name").is_none());
    }

    #[test]
    fn test_deep_property_map() {
        let mut inner: HashMap<String, BoundValue> = HashMap::new();
        inner.insert("port".to_string(), bound(8080u16));
        let mut outer: HashMap<String, BoundValue> = HashMap::new();
        outer.insert("server".to_string(), bound(inner));
        let value = bound(outer);

        let port = get_deep_property(&value, "server.port").unwrap();
        assert_eq!(port.downcast_ref::<u16>(), Some(&8080));
        assert!(get_deep_property(&value, "server.host").is_none());
        assert!(get_deep_property(&bound(1u8), "anything").is_none());
    }
}
