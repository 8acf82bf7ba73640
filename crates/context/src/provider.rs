//! Provider classes
//!
//! A provider is instantiated with dependency injection like any class; the
//! binding's value is whatever its [`Provider::value`] returns.

use std::any::Any;

use crate::errors::ContextResult;
use crate::value_promise::ValueOrPromise;

/// Produces the value of a provider binding
pub trait Provider: Send + Sync + 'static {
    type Value: Any + Send + Sync;

    fn value(&self) -> ContextResult<ValueOrPromise<Self::Value>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::resolution::{Arguments, ClassMetadata, Injectable, Injection, Properties};
    use std::sync::Arc;

    struct DateProvider {
        prefix: Arc<String>,
    }

    impl Injectable for DateProvider {
        fn metadata() -> ClassMetadata {
            ClassMetadata::new("DateProvider")
                .constructor_arity(1)
                .inject(0, Injection::key("date.prefix"))
        }

        fn construct(args: Arguments, _properties: Properties) -> ContextResult<Self> {
            Ok(Self { prefix: args.get(0)? })
        }
    }

    impl Provider for DateProvider {
        type Value = String;

        fn value(&self) -> ContextResult<ValueOrPromise<String>> {
            Ok(ValueOrPromise::Value(format!("{}2024-01-01", self.prefix)))
        }
    }

    struct SlowProvider;

    impl Injectable for SlowProvider {
        fn metadata() -> ClassMetadata {
            ClassMetadata::new("SlowProvider")
        }

        fn construct(_args: Arguments, _properties: Properties) -> ContextResult<Self> {
            Ok(SlowProvider)
        }
    }

    impl Provider for SlowProvider {
        type Value = u64;

        fn value(&self) -> ContextResult<ValueOrPromise<u64>> {
            Ok(ValueOrPromise::promise(async {
                tokio::task::yield_now().await;
                Ok(42)
            }))
        }
    }

    #[test]
    fn test_sync_provider() {
        let ctx = Context::named("app");
        ctx.bind("date.prefix").unwrap().to("date:".to_string());
        ctx.bind("date").unwrap().to_provider::<DateProvider>();

        let value = ctx.get_sync::<String>("date").unwrap();
        assert_eq!(value.as_str(), "date:2024-01-01");
    }

    #[tokio::test]
    async fn test_async_provider() {
        let ctx = Context::named("app");
        ctx.bind("answer").unwrap().to_provider::<SlowProvider>();

        assert!(ctx.get_sync::<u64>("answer").unwrap_err().to_string().contains("synchronously"));
        assert_eq!(*ctx.get::<u64>("answer").await.unwrap(), 42);
        assert_eq!(ctx.get_binding("answer").unwrap().value_constructor(), Some("SlowProvider"));
    }
}
