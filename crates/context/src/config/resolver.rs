//! Lookup of configuration bound for other bindings

use crate::context::Context;
use crate::errors::ContextResult;
use crate::keys::BindingKey;
use crate::resolution::ResolutionOptions;
use crate::value_promise::{ResolvedValue, ValueOrPromise};

/// Resolves the configuration of a binding key
///
/// A context uses the resolver bound at
/// [`ContextBindings::CONFIGURATION_RESOLVER`](crate::keys::ContextBindings::CONFIGURATION_RESOLVER)
/// (as an `Arc<dyn ConfigurationResolver>`) or [`DefaultConfigurationResolver`].
pub trait ConfigurationResolver: Send + Sync {
    fn get_config_as_value_or_promise(
        &self,
        ctx: &Context,
        key: &str,
        property_path: Option<&str>,
        options: ResolutionOptions,
    ) -> ContextResult<ValueOrPromise<ResolvedValue>>;
}

/// Reads configuration from the `<key>:$config` binding
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfigurationResolver;

impl ConfigurationResolver for DefaultConfigurationResolver {
    fn get_config_as_value_or_promise(
        &self,
        ctx: &Context,
        key: &str,
        property_path: Option<&str>,
        options: ResolutionOptions,
    ) -> ContextResult<ValueOrPromise<ResolvedValue>> {
        let config_key = BindingKey::create(BindingKey::build_key_for_config(key).key(), property_path);
        // Missing configuration is not an error
        let options = ResolutionOptions {
            optional: true,
            ..options
        };
        ctx.get_value_or_promise(&config_key, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::Arc;

    #[test]
    fn test_default_resolver_reads_config_binding() {
        let ctx = Context::named("app");
        ctx.configure("servers.rest")
            .unwrap()
            .to(json!({"port": 3000, "host": "localhost"}));

        let port = ctx.get_config_sync::<Value>("servers.rest", Some("port")).unwrap();
        assert_eq!(port.as_deref(), Some(&json!(3000)));

        let all = ctx.get_config_sync::<Value>("servers.rest", None).unwrap().unwrap();
        assert_eq!(all["host"], json!("localhost"));

        assert!(ctx.get_config_sync::<Value>("servers.grpc", None).unwrap().is_none());
    }

    struct FixedResolver;

    impl ConfigurationResolver for FixedResolver {
        fn get_config_as_value_or_promise(
            &self,
            _ctx: &Context,
            key: &str,
            _property_path: Option<&str>,
            _options: ResolutionOptions,
        ) -> ContextResult<ValueOrPromise<ResolvedValue>> {
            Ok(ValueOrPromise::Value(Some(Arc::new(format!("fixed:{}", key)))))
        }
    }

    #[test]
    fn test_custom_resolver_binding() {
        let ctx = Context::named("app");
        let resolver: Arc<dyn ConfigurationResolver> = Arc::new(FixedResolver);
        ctx.bind(crate::keys::ContextBindings::CONFIGURATION_RESOLVER)
            .unwrap()
            .to(resolver);

        let value = ctx.get_config_sync::<String>("anything", None).unwrap().unwrap();
        assert_eq!(value.as_str(), "fixed:anything");
    }
}
