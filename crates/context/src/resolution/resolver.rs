//! Dependency injection: resolving injections, instantiating classes and
//! invoking methods with injected parameters

use std::sync::Arc;

use tracing::debug;

use crate::context::{Context, ContextView};
use crate::errors::{ContextError, ContextResult, ResolutionDetails};
use crate::interception::{invoke_method_with_interceptors, InvocationOptions, InvocationResult, InvocationTarget};
use crate::resolution::arguments::{Arguments, Properties};
use crate::resolution::injection::{BindingSelector, Injection};
use crate::resolution::metadata::{class_metadata, ClassMetadata, Injectable};
use crate::resolution::session::{ResolutionOptions, ResolutionSession};
use crate::value_promise::{resolve_list, resolve_pair, BoundValue, ResolvedValue, ValueOrPromise};

/// Context an injection is resolved against
///
/// Constructor and property injections of a singleton are resolved in the
/// context owning the singleton binding, so singletons never capture values
/// from shorter-lived child contexts.
fn resolve_context(ctx: &Context, injection: &Injection, session: &ResolutionSession) -> Context {
    match session.current_binding() {
        Some(binding) if binding.scope().is_singleton() && injection.is_constructor_or_property() => {
            ctx.get_owner_context(binding.key()).unwrap_or_else(|| ctx.clone())
        }
        _ => ctx.clone(),
    }
}

/// Resolve a single injection
pub fn resolve_injection(
    ctx: &Context,
    injection: &Arc<Injection>,
    session: Option<&ResolutionSession>,
) -> ContextResult<ValueOrPromise<ResolvedValue>> {
    ResolutionSession::run_with_injection(injection, session, |session| {
        let ctx = resolve_context(ctx, injection, &session);
        if let Some(resolve) = &injection.resolve {
            return resolve(&ctx, injection, session);
        }
        match &injection.binding_selector {
            BindingSelector::Key(key) => ctx.get_value_or_promise(
                key,
                ResolutionOptions {
                    session: Some(session),
                    optional: injection.metadata.optional,
                    as_proxy_with_interceptors: false,
                },
            ),
            BindingSelector::Filter(filter) => {
                let view = ContextView::new(&ctx, filter.clone(), injection.metadata.binding_comparator.clone());
                let values = view.resolve(Some(session))?;
                Ok(values.map(|values| Some(Arc::new(values) as BoundValue)))
            }
            BindingSelector::None => Err(ContextError::invalid_injection(
                injection.target_name(),
                "the injection has neither a binding selector nor a resolver",
            )),
        }
    })
}

fn resolution_error(ctx: &Context, session: Option<&ResolutionSession>, message: String) -> ContextError {
    ContextError::resolution(
        message,
        ResolutionDetails {
            context: ctx.name().to_string(),
            binding_key: session
                .and_then(ResolutionSession::current_binding)
                .map(|binding| binding.key().to_string()),
            resolution_path: session.map(ResolutionSession::resolution_path).unwrap_or_default(),
        },
    )
}

/// Build the argument list of the constructor (`method == None`) or a method
///
/// Injected positions are resolved; every other position takes the next
/// value of `non_injected`. The list is as long as the declared arity, or
/// longer when injected plus supplied values exceed it.
pub fn resolve_injected_arguments(
    ctx: &Context,
    metadata: &ClassMetadata,
    method: Option<&str>,
    session: Option<&ResolutionSession>,
    non_injected: Arguments,
) -> ContextResult<ValueOrPromise<Arguments>> {
    let injected = metadata.injected_arguments(method);
    let extra = non_injected.into_values();
    let injected_count = injected.iter().filter(|slot| slot.is_some()).count();
    let arg_length = metadata.arity(method).max(injected_count + extra.len());
    let target = metadata.member_name(method);
    debug!(target = %target, arg_length, injected = injected_count, "resolving arguments");

    let mut extra = extra.into_iter();
    let values = resolve_list((0..arg_length).collect(), |_, index| {
        let injection = injected
            .get(index)
            .and_then(Option::as_ref)
            .filter(|injection| injection.is_resolvable());
        match injection {
            Some(injection) => resolve_injection(ctx, injection, session),
            None => match extra.next() {
                Some(value) => Ok(ValueOrPromise::Value(value)),
                None => Err(resolution_error(
                    ctx,
                    session,
                    format!(
                        "The argument '{}[{}]' is not decorated for dependency injection but no value was supplied by the caller. Did you forget to apply @inject() to the argument?",
                        target, index
                    ),
                )),
            },
        }
    })?;

    Ok(values.map(move |values| Arguments::from_values(values).with_target(target)))
}

/// Resolve every injected property of a class
pub fn resolve_injected_properties(
    ctx: &Context,
    metadata: &ClassMetadata,
    session: Option<&ResolutionSession>,
) -> ContextResult<ValueOrPromise<Properties>> {
    let entries: Vec<(String, Arc<Injection>)> = metadata
        .injected_properties()
        .iter()
        .map(|(name, injection)| (name.clone(), injection.clone()))
        .collect();
    let names: Vec<String> = entries.iter().map(|(name, _)| name.clone()).collect();

    let values = resolve_list(entries, |(_, injection), _| resolve_injection(ctx, &injection, session))?;

    let target = metadata.name();
    Ok(values.map(move |values| Properties::from_entries(target, names.into_iter().zip(values).collect())))
}

/// Create an instance of `T`, injecting constructor arguments and properties
///
/// The result is synchronous when every dependency resolves synchronously.
pub fn instantiate_class<T: Injectable>(
    ctx: &Context,
    session: Option<ResolutionSession>,
    non_injected: Arguments,
) -> ContextResult<ValueOrPromise<T>> {
    let metadata = class_metadata::<T>();
    debug!(class = metadata.name(), context = %ctx.name(), "instantiating class");

    let args = resolve_injected_arguments(ctx, &metadata, None, session.as_ref(), non_injected)?;
    let properties = resolve_injected_properties(ctx, &metadata, session.as_ref())?;

    resolve_pair(args, properties).and_then(|(args, properties)| T::construct(args, properties).map(ValueOrPromise::Value))
}

/// Invoke `method` on `target`, injecting its parameters
///
/// Interceptors run unless `options.skip_interceptors` is set.
pub async fn invoke_method(
    target: Arc<dyn InvocationTarget>,
    method: &str,
    ctx: &Context,
    non_injected: Arguments,
    options: InvocationOptions,
) -> ContextResult<InvocationResult> {
    let metadata = target
        .class_metadata()
        .unwrap_or_else(|| Arc::new(ClassMetadata::new(target.type_name())));

    if !target.has_method(method) {
        return Err(ContextError::MethodNotFound {
            target: target.type_name().to_string(),
            method: method.to_string(),
        });
    }

    let args = resolve_injected_arguments(ctx, &metadata, Some(method), options.session.as_ref(), non_injected)?
        .resolve()
        .await?;

    if options.skip_interceptors {
        debug!(target = target.type_name(), method, "invoking method without interceptors");
        return target.invoke_method(method, args).await;
    }

    let options = InvocationOptions {
        skip_parameter_injection: true,
        ..options
    };
    invoke_method_with_interceptors(ctx, target, method, args, options).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingScope;

    struct Repository {
        url: Arc<String>,
    }

    impl Injectable for Repository {
        fn metadata() -> ClassMetadata {
            ClassMetadata::new("Repository")
                .constructor_arity(1)
                .inject(0, Injection::key("db.url"))
        }

        fn construct(args: Arguments, _properties: Properties) -> ContextResult<Self> {
            Ok(Self { url: args.get::<String>(0)? })
        }
    }

    struct Service {
        repository: Arc<Repository>,
        label: Arc<String>,
        retries: Option<Arc<u32>>,
    }

    impl Injectable for Service {
        fn metadata() -> ClassMetadata {
            ClassMetadata::new("Service")
                .constructor_arity(2)
                .inject(0, Injection::key("repository"))
                .inject_property("retries", Injection::key("retries").optional())
        }

        fn construct(args: Arguments, properties: Properties) -> ContextResult<Self> {
            Ok(Self {
                repository: args.get::<Repository>(0)?,
                label: args.get::<String>(1)?,
                retries: properties.get_optional::<u32>("retries")?,
            })
        }
    }

    #[test]
    fn test_instantiate_sync_with_non_injected_args() {
        let ctx = Context::named("app");
        ctx.bind("db.url").unwrap().to("postgres://localhost".to_string());
        ctx.bind("repository").unwrap().to_class::<Repository>();

        let service = instantiate_class::<Service>(&ctx, None, Arguments::new().arg("svc".to_string()))
            .unwrap()
            .into_value()
            .expect("resolved synchronously");

        assert_eq!(service.repository.url.as_str(), "postgres://localhost");
        assert_eq!(service.label.as_str(), "svc");
        assert!(service.retries.is_none());
    }

    #[test]
    fn test_missing_non_injected_argument() {
        let ctx = Context::named("app");
        ctx.bind("db.url").unwrap().to("x".to_string());
        ctx.bind("repository").unwrap().to_class::<Repository>();

        let err = instantiate_class::<Service>(&ctx, None, Arguments::new()).err().unwrap();
        let message = err.to_string();
        assert!(message.contains("The argument 'Service[1]' is not decorated for dependency injection"));
    }

    #[test]
    fn test_unbound_injection_names_path() {
        let ctx = Context::named("app");
        ctx.bind("repository").unwrap().to_class::<Repository>();

        let err = ctx.get_sync::<Repository>("repository").err().unwrap();
        assert!(err.to_string().contains("is not bound to any value in context app"));
    }

    #[tokio::test]
    async fn test_instantiate_async_dependency() {
        let ctx = Context::named("app");
        ctx.bind("db.url").unwrap().to_async_dynamic_value(|_| async {
            tokio::task::yield_now().await;
            Ok("async://db".to_string())
        });
        ctx.bind("repository").unwrap().to_class::<Repository>();

        let result = instantiate_class::<Repository>(&ctx, None, Arguments::new()).unwrap();
        assert!(result.is_promise());
        let repository = result.resolve().await.unwrap();
        assert_eq!(repository.url.as_str(), "async://db");
    }

    #[test]
    fn test_singleton_injections_use_owner_context() {
        let app = Context::named("app");
        app.bind("db.url").unwrap().to("app-db".to_string());
        app.bind("repository").unwrap().to_class::<Repository>().in_scope(BindingScope::Singleton);

        let request = Context::with_parent(&app, "request");
        request.bind("db.url").unwrap().to("request-db".to_string());

        let repository = request.get_sync::<Repository>("repository").unwrap();
        assert_eq!(repository.url.as_str(), "app-db");
    }
}
