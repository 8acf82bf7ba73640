pub mod binding;
pub mod config;
pub mod context;
pub mod errors;
pub mod interception;
pub mod keys;
pub mod provider;
pub mod resolution;
pub mod value_promise;

// Re-export key types for convenience
pub use binding::{
    as_class, as_provider, configure_binding, create_binding_from_class, create_binding_from_provider,
    filter_by_key, filter_by_tag, Binding, BindingComparator, BindingFilter, BindingFromClassOptions, BindingScope,
    BindingTag, BindingTagPattern, BindingType, InspectionOptions, ResolutionContext, TagValueMatcher,
};
pub use config::{ConfigError, ConfigurationResolver, ContextConfig, DefaultConfigurationResolver};
pub use context::{
    Context, ContextEvent, ContextEventType, ContextObserver, ContextView, FnObserver, ListenerId, Subscription,
};
pub use errors::{ContextError, ContextResult, ResolutionDetails};
pub use interception::{
    as_global_interceptor, compose_interceptors, invoke_method_with_interceptors, merge_interceptors,
    register_interceptor, register_interceptor_provider, GenericInterceptor, GenericInterceptorChain,
    GenericInterceptorOrKey, InterceptedProxy, Interceptor, InterceptorBindingOptions, InterceptorOrKey,
    InvocationContext, InvocationOptions, InvocationResult, InvocationSource, InvocationTarget, Next,
};
pub use keys::{BindingAddress, BindingKey, ContextBindings, ContextTags};
pub use provider::Provider;
pub use resolution::{
    class_metadata, instantiate_class, invoke_method, Arguments, BindingCreationPolicy, ClassMetadata, Getter, Injectable,
    Injection, Properties, ResolutionOptions, ResolutionSession, Setter,
};
pub use value_promise::{bound, BoundValue, ResolvedValue, ValueOrPromise};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const CRATE_NAME: &str = "elif-context";

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}

/// Get crate name
pub fn name() -> &'static str {
    CRATE_NAME
}
