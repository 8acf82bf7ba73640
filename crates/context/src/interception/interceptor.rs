//! Registration of interceptors in a context

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::binding::{create_binding_from_provider, Binding, BindingFromClassOptions};
use crate::context::Context;
use crate::errors::ContextResult;
use crate::interception::invocation::Interceptor;
use crate::keys::{BindingKey, ContextBindings, ContextTags};
use crate::provider::Provider;
use crate::resolution::Injectable;

/// How an interceptor is bound
#[derive(Debug, Clone, Default)]
pub struct InterceptorBindingOptions {
    /// Apply to every invocation; implied by `group` or `source` unless `Some(false)`
    pub global: Option<bool>,
    /// Ordering group of a global interceptor
    pub group: Option<String>,
    /// Invocation source types the global interceptor applies to
    pub source: Vec<String>,
    /// Explicit binding key
    pub key: Option<String>,
    /// Name used to build the key within the namespace
    pub name: Option<String>,
    /// Namespace overriding `interceptors` / `globalInterceptors`
    pub namespace: Option<String>,
}

impl InterceptorBindingOptions {
    fn is_global(&self) -> bool {
        if self.group.is_some() || !self.source.is_empty() {
            return self.global != Some(false);
        }
        self.global.unwrap_or(false)
    }

    fn namespace(&self, global: bool) -> String {
        self.namespace.clone().unwrap_or_else(|| {
            if global {
                ContextBindings::GLOBAL_INTERCEPTOR_NAMESPACE.to_string()
            } else {
                ContextBindings::INTERCEPTOR_NAMESPACE.to_string()
            }
        })
    }
}

/// Template marking a binding as a global interceptor in `group`
pub fn as_global_interceptor(group: Option<&str>) -> impl Fn(&Binding) {
    let group = group.map(str::to_string);
    move |binding: &Binding| {
        binding
            .tag(ContextTags::GLOBAL_INTERCEPTOR)
            .tag((ContextTags::NAMESPACE, ContextBindings::GLOBAL_INTERCEPTOR_NAMESPACE));
        if let Some(group) = &group {
            binding.tag((ContextTags::GLOBAL_INTERCEPTOR_GROUP, group.as_str()));
        }
    }
}

fn apply_options(binding: &Binding, global: bool, options: &InterceptorBindingOptions) {
    if global {
        binding.apply(as_global_interceptor(options.group.as_deref()));
    }
    match options.source.as_slice() {
        [] => {}
        [source] => {
            binding.tag((ContextTags::GLOBAL_INTERCEPTOR_SOURCE, source.as_str()));
        }
        sources => {
            let sources: Vec<Value> = sources.iter().cloned().map(Value::String).collect();
            binding.tag((ContextTags::GLOBAL_INTERCEPTOR_SOURCE, Value::Array(sources)));
        }
    }
}

/// Bind an interceptor function
///
/// The key is `options.key`, `<namespace>.<name>` or a generated one.
pub fn register_interceptor(
    ctx: &Context,
    interceptor: Arc<Interceptor>,
    options: InterceptorBindingOptions,
) -> ContextResult<Binding> {
    let global = options.is_global();
    let namespace = options.namespace(global);
    let key = match (&options.key, &options.name) {
        (Some(key), _) => key.clone(),
        (None, Some(name)) => format!("{}.{}", namespace, name),
        (None, None) => BindingKey::generate(&namespace).key().to_string(),
    };

    let binding = ctx.bind(key.as_str())?;
    binding.to(interceptor);
    apply_options(&binding, global, &options);
    debug!(key = %key, global, "interceptor registered");
    Ok(binding)
}

/// Bind a provider class producing an interceptor
///
/// A provider declaring the `globalInterceptor` tag is always global.
pub fn register_interceptor_provider<P>(ctx: &Context, options: InterceptorBindingOptions) -> ContextResult<Binding>
where
    P: Provider<Value = Arc<Interceptor>> + Injectable,
{
    let mut global = options.is_global();
    let binding = create_binding_from_provider::<P>(BindingFromClassOptions {
        key: options.key.clone(),
        default_namespace: Some(options.namespace(global)),
        name: options.name.clone(),
        default_scope: None,
    })?;
    if binding.has_tag(ContextTags::GLOBAL_INTERCEPTOR) {
        global = true;
    }
    ctx.add(binding.clone())?;
    apply_options(&binding, global, &options);
    debug!(key = %binding.key(), global, "interceptor provider registered");
    Ok(binding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interception::chain::Next;
    use crate::interception::invocation::InvocationContext;
    use crate::resolution::{Arguments, ClassMetadata, Properties};
    use crate::value_promise::ValueOrPromise;
    use serde_json::json;

    fn passthrough() -> Arc<Interceptor> {
        Arc::new(|_invocation: InvocationContext, next: Next<InvocationContext>| next.run())
    }

    #[test]
    fn test_register_local_interceptor() {
        let ctx = Context::named("app");
        let binding = register_interceptor(
            &ctx,
            passthrough(),
            InterceptorBindingOptions {
                name: Some("log".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(binding.key(), "interceptors.log");
        assert!(!binding.has_tag(ContextTags::GLOBAL_INTERCEPTOR));
    }

    #[test]
    fn test_group_implies_global() {
        let ctx = Context::named("app");
        let binding = register_interceptor(
            &ctx,
            passthrough(),
            InterceptorBindingOptions {
                group: Some("auth".to_string()),
                source: vec!["route".to_string(), "proxy".to_string()],
                ..Default::default()
            },
        )
        .unwrap();

        assert!(binding.key().starts_with("globalInterceptors."));
        assert!(binding.has_tag(ContextTags::GLOBAL_INTERCEPTOR));
        assert_eq!(binding.tag_value(ContextTags::GLOBAL_INTERCEPTOR_GROUP), Some(json!("auth")));
        assert_eq!(
            binding.tag_value(ContextTags::GLOBAL_INTERCEPTOR_SOURCE),
            Some(json!(["route", "proxy"]))
        );
    }

    struct TracingInterceptorProvider;

    impl Injectable for TracingInterceptorProvider {
        fn metadata() -> ClassMetadata {
            ClassMetadata::new("TracingInterceptorProvider").tag(ContextTags::GLOBAL_INTERCEPTOR)
        }

        fn construct(_args: Arguments, _properties: Properties) -> ContextResult<Self> {
            Ok(Self)
        }
    }

    impl Provider for TracingInterceptorProvider {
        type Value = Arc<Interceptor>;

        fn value(&self) -> ContextResult<ValueOrPromise<Self::Value>> {
            Ok(ValueOrPromise::Value(passthrough()))
        }
    }

    #[test]
    fn test_register_provider_tagged_global() {
        let ctx = Context::named("app");
        let binding = register_interceptor_provider::<TracingInterceptorProvider>(
            &ctx,
            InterceptorBindingOptions::default(),
        )
        .unwrap();

        assert_eq!(binding.key(), "interceptors.TracingInterceptorProvider");
        assert_eq!(
            binding.tag_value(ContextTags::NAMESPACE),
            Some(json!(ContextBindings::GLOBAL_INTERCEPTOR_NAMESPACE))
        );
        assert!(ctx.get_sync::<Arc<Interceptor>>(binding.key()).is_ok());
    }
}
