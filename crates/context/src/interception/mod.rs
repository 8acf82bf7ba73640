pub mod chain;
pub mod interceptor;
pub mod invocation;
pub mod proxy;

pub use chain::{
    compose_interceptors, merge_interceptors, FinalHandler, GenericInterceptor, GenericInterceptorChain,
    GenericInterceptorOrKey, InterceptionContext, InterceptorFuture, InvocationResult, Next,
};
pub use interceptor::{as_global_interceptor, register_interceptor, register_interceptor_provider, InterceptorBindingOptions};
pub use invocation::{
    invoke_method_with_interceptors, Interceptor, InterceptorOrKey, InvocationContext, InvocationOptions,
    InvocationSource, InvocationTarget,
};
pub use proxy::{create_proxy_with_interceptors, InterceptedProxy};
