//! Integration tests for the context container
//!
//! Covers the full flow from binding registration through scoped
//! resolution, hierarchy lookups and live views.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use elif_context::{
    filter_by_tag, Arguments, Binding, BindingKey, BindingScope, ClassMetadata, Context, ContextError, ContextResult,
    FnObserver, Injectable, Injection, Properties, ResolutionOptions,
};

/// Print library events when `RUST_LOG` is set
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Service depending on a configured greeting
struct GreetingService {
    greeting: Arc<String>,
}

impl Injectable for GreetingService {
    fn metadata() -> ClassMetadata {
        ClassMetadata::new("GreetingService")
            .constructor_arity(1)
            .inject(0, Injection::key("greeting"))
    }

    fn construct(args: Arguments, _properties: Properties) -> ContextResult<Self> {
        Ok(Self {
            greeting: args.get(0)?,
        })
    }
}

#[test]
fn test_singleton_resolves_same_instance() {
    let app = Context::named("app");
    app.bind("greeting").unwrap().to("Hello".to_string());
    app.bind("services.greeter")
        .unwrap()
        .to_class::<GreetingService>()
        .in_scope(BindingScope::Singleton);

    let request = Context::with_parent(&app, "request");
    let first = app.get_sync::<GreetingService>("services.greeter").unwrap();
    let second = request.get_sync::<GreetingService>("services.greeter").unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.greeting.as_str(), "Hello");
}

#[test]
fn test_transient_calls_factory_every_time() {
    let ctx = Context::named("app");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    ctx.bind("counter").unwrap().to_dynamic_value(move |_| {
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    });

    assert_eq!(*ctx.get_sync::<usize>("counter").unwrap(), 1);
    assert_eq!(*ctx.get_sync::<usize>("counter").unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_context_scope_caches_per_resolution_context() {
    let app = Context::named("app");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    app.bind("token")
        .unwrap()
        .to_dynamic_value(move |_| Ok(counter.fetch_add(1, Ordering::SeqCst)))
        .in_scope(BindingScope::Context);

    let child = Context::with_parent(&app, "child");
    let a = child.get_sync::<usize>("token").unwrap();
    let b = child.get_sync::<usize>("token").unwrap();
    let c = app.get_sync::<usize>("token").unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_binding_key_round_trip() {
    let key = BindingKey::create("config.db", Some("host.name"));
    assert_eq!(key.to_string(), "config.db#host.name");

    let parsed = BindingKey::parse_key_with_path(&key.to_string());
    assert_eq!(parsed.key(), "config.db");
    assert_eq!(parsed.property_path(), Some("host.name"));
    assert_eq!(parsed, key);
}

#[test]
fn test_find_is_idempotent_with_and_without_index() {
    let ctx = Context::named("app");
    ctx.bind("controllers.user").unwrap().to(1u8).tag("controller");
    ctx.bind("controllers.order").unwrap().to(2u8).tag("controller");
    ctx.bind("repositories.user").unwrap().to(3u8).tag("repository");

    let by_index = ctx.find_by_tag("controller");
    let keys: Vec<String> = by_index.iter().map(|b| b.key().to_string()).collect();
    assert_eq!(keys, vec!["controllers.user", "controllers.order"]);
    assert_eq!(ctx.find_by_tag("controller"), by_index);

    // A regex key filter never uses the tag index
    let by_scan = ctx.find(regex::Regex::new(r"^controllers\.").unwrap());
    assert_eq!(by_scan, by_index);

    let by_filter = ctx.find(filter_by_tag("controller"));
    assert_eq!(by_filter, by_index);
}

#[test]
fn test_circular_dependency_is_reported() {
    let ctx = Context::named("app");
    ctx.bind("a")
        .unwrap()
        .to_dynamic_value(|rc| rc.get_sync::<String>("b").map(|b| format!("a:{}", b)));
    ctx.bind("b")
        .unwrap()
        .to_dynamic_value(|rc| rc.get_sync::<String>("a").map(|a| format!("b:{}", a)));

    let err = ctx.get_sync::<String>("a").unwrap_err();
    assert!(err.is_circular_dependency());
    assert!(err.to_string().contains("a --> b --> a"), "unexpected message: {}", err);
}

#[tokio::test]
async fn test_async_singleton_cycle_is_reported() {
    let ctx = Context::named("app");
    ctx.bind("a")
        .unwrap()
        .to_async_dynamic_value(|rc| async move {
            let b = rc.get::<String>("b").await?;
            Ok(format!("a:{}", b))
        })
        .in_scope(BindingScope::Singleton);
    ctx.bind("b").unwrap().to_async_dynamic_value(|rc| async move {
        let a = rc.get::<String>("a").await?;
        Ok(format!("b:{}", a))
    });

    let err = tokio::time::timeout(Duration::from_secs(2), ctx.get::<String>("a"))
        .await
        .expect("resolution of a cycle must not hang")
        .unwrap_err();
    assert!(err.is_circular_dependency());
    assert!(err.to_string().contains("a --> b --> a"), "unexpected message: {}", err);

    // The failed attempt is not cached
    let err = tokio::time::timeout(Duration::from_secs(2), ctx.get::<String>("a"))
        .await
        .expect("second resolution must not hang")
        .unwrap_err();
    assert!(err.is_circular_dependency());
}

#[tokio::test]
async fn test_concurrent_singleton_resolution_shares_one_factory_call() {
    let ctx = Context::named("app");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    ctx.bind("db.pool")
        .unwrap()
        .to_async_dynamic_value(move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok("pool".to_string())
            }
        })
        .in_scope(BindingScope::Singleton);

    let (first, second, third) = tokio::join!(
        ctx.get::<String>("db.pool"),
        ctx.get::<String>("db.pool"),
        ctx.get::<String>("db.pool")
    );
    let (first, second, third) = (first.unwrap(), second.unwrap(), third.unwrap());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&second, &third));
}

#[test]
fn test_locked_binding_messages() {
    let ctx = Context::named("app");
    ctx.bind("app.name").unwrap().to("elif".to_string()).lock();

    let rebind = ctx.bind("app.name").unwrap_err();
    assert_eq!(rebind.to_string(), "Cannot rebind key \"app.name\" to a locked binding");
    let replacement = Binding::new("app.name").unwrap();
    replacement.to("other".to_string());
    assert!(ctx.add(replacement).unwrap_err().is_locked());
    assert_eq!(ctx.get_sync::<String>("app.name").unwrap().as_str(), "elif");

    let unbind = ctx.unbind("app.name").unwrap_err();
    assert_eq!(unbind.to_string(), "Cannot unbind key \"app.name\" of a locked binding");

    ctx.get_binding("app.name").unwrap().unlock();
    assert!(ctx.unbind("app.name").unwrap());
    assert!(!ctx.contains("app.name"));
}

#[test]
fn test_child_bindings_shadow_parent() {
    let app = Context::named("app");
    app.bind("logger.level").unwrap().to("info".to_string()).tag("setting");
    app.bind("logger.format").unwrap().to("json".to_string()).tag("setting");

    let child = Context::with_parent(&app, "request");
    child.bind("logger.level").unwrap().to("debug".to_string()).tag("setting");

    assert_eq!(child.get_sync::<String>("logger.level").unwrap().as_str(), "debug");
    assert_eq!(app.get_sync::<String>("logger.level").unwrap().as_str(), "info");

    let own = child.find("logger.level");
    assert_eq!(own.len(), 1);
    assert!(own[0].ptr_eq(&child.get_binding("logger.level").unwrap()));

    let settings = child.find_by_tag("setting");
    let keys: Vec<&str> = settings.iter().map(|b| b.key()).collect();
    assert_eq!(keys, vec!["logger.level", "logger.format"]);
    assert!(settings[0].ptr_eq(&child.get_binding("logger.level").unwrap()));
}

#[test]
fn test_request_scope_falls_back_to_current_context() {
    init_tracing();
    let app = Context::named("app");
    app.bind("request.id")
        .unwrap()
        .to_dynamic_value(|rc| Ok(rc.context.name().to_string()))
        .in_scope(BindingScope::Request);

    let child = Context::with_parent(&app, "handler");
    assert_eq!(child.get_sync::<String>("request.id").unwrap().as_str(), "handler");

    let request = Context::with_parent(&app, "request");
    request.set_scope(BindingScope::Request);
    let nested = Context::with_parent(&request, "nested");
    assert_eq!(nested.get_sync::<String>("request.id").unwrap().as_str(), "request");
}

#[test]
fn test_application_scope_requires_application_context() {
    let root = Context::named("root");
    root.bind("app.config")
        .unwrap()
        .to(42u32)
        .in_scope(BindingScope::Application);

    let err = root.get_sync::<u32>("app.config").unwrap_err();
    assert!(matches!(err, ContextError::ScopeNotFound { .. }));

    let missing = root
        .get_sync_with::<u32>("app.config", ResolutionOptions::optional())
        .unwrap_err();
    assert!(missing.is_resolution());

    assert!(root.get_optional_sync::<u32>("app.config").unwrap().is_none());

    root.set_scope(BindingScope::Application);
    assert_eq!(*root.get_sync::<u32>("app.config").unwrap(), 42);
}

#[tokio::test]
async fn test_async_value_requires_async_get() {
    let ctx = Context::named("app");
    ctx.bind("remote.config")
        .unwrap()
        .to_async_dynamic_value(|_| async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok("loaded".to_string())
        });

    let err = ctx.get_sync::<String>("remote.config").unwrap_err();
    assert!(matches!(err, ContextError::AsyncValue { .. }));
    assert_eq!(ctx.get::<String>("remote.config").await.unwrap().as_str(), "loaded");
}

#[tokio::test]
async fn test_view_refreshes_once_per_change() {
    let ctx = Context::named("app");
    ctx.bind("plugins.a").unwrap().to("a".to_string()).tag("plugin");

    let view = ctx.create_view(filter_by_tag("plugin"), None).unwrap();
    let refreshes = Arc::new(AtomicUsize::new(0));
    let counter = refreshes.clone();
    view.on_refresh(Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    assert_eq!(view.values_of::<String>().await.unwrap().len(), 1);

    ctx.bind("plugins.b").unwrap().to("b".to_string()).tag("plugin");
    ctx.bind("unrelated").unwrap().to(0u8);
    ctx.wait_until_pending_notifications_done(Some(Duration::from_secs(1)))
        .await
        .unwrap();

    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    let values: Vec<String> = view
        .values_of::<String>()
        .await
        .unwrap()
        .iter()
        .map(|v| v.as_str().to_string())
        .collect();
    assert_eq!(values, vec!["a", "b"]);

    ctx.unbind("plugins.a").unwrap();
    ctx.wait_until_pending_notifications_done(Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(refreshes.load(Ordering::SeqCst), 2);
    assert_eq!(view.bindings().len(), 1);
    view.close();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_observers_see_bindings_tagged_after_bind() {
    let ctx = Context::named("app");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _subscription = ctx
        .subscribe(Arc::new(
            FnObserver::new(move |event, binding: Binding, _ctx| {
                let sink = sink.clone();
                async move {
                    sink.lock().push(format!("{}:{}", event, binding.key()));
                    Ok(())
                }
            })
            .with_filter(filter_by_tag("plugin")),
        ))
        .unwrap();
    let view = ctx.create_view(filter_by_tag("plugin"), None).unwrap();
    assert!(view.bindings().is_empty());

    for i in 0..64 {
        ctx.bind(format!("plugins.p{}", i)).unwrap().to(i).tag("plugin");
        if i % 8 == 0 {
            tokio::task::yield_now().await;
        }
    }
    ctx.wait_until_pending_notifications_done(Some(Duration::from_secs(5)))
        .await
        .unwrap();

    let seen = seen.lock().clone();
    let unique: HashSet<&String> = seen.iter().collect();
    assert_eq!(seen.len(), 64, "every binding is observed exactly once");
    assert_eq!(unique.len(), 64);
    assert!(seen.iter().all(|entry| entry.starts_with("bind:plugins.p")));
    assert_eq!(view.bindings().len(), 64);
    assert_eq!(view.values_of::<i32>().await.unwrap().len(), 64);
}

#[tokio::test]
async fn test_child_view_observes_parent_bindings() {
    let app = Context::named("app");
    let request = Context::with_parent(&app, "request");
    let view = request.create_view(filter_by_tag("route"), None).unwrap();
    assert!(view.bindings().is_empty());

    app.bind("routes.home").unwrap().to("/".to_string()).tag("route");
    request
        .wait_until_pending_notifications_done(Some(Duration::from_secs(1)))
        .await
        .unwrap();

    assert_eq!(view.bindings().len(), 1);
    assert_eq!(
        view.single_value_of::<String>().await.unwrap().unwrap().as_str(),
        "/"
    );
}

#[test]
fn test_parent_events_skip_shadowed_keys() {
    let app = Context::named("app");
    let request = Context::with_parent(&app, "request");
    request.bind("logger").unwrap().to("request".to_string());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    request.on_event(move |event| {
        sink.lock().push(format!("{}:{}", event.event_type, event.binding.key()));
    });

    app.bind("logger").unwrap().to("app".to_string());
    app.bind("metrics").unwrap().to("app".to_string());
    app.unbind("logger").unwrap();

    assert_eq!(*seen.lock(), vec!["bind:metrics".to_string()]);
    assert_eq!(request.get_sync::<String>("logger").unwrap().as_str(), "request");
}

#[tokio::test]
async fn test_observer_added_during_notification_misses_that_event() {
    let ctx = Context::named("app");
    let late_seen = Arc::new(Mutex::new(Vec::new()));
    let late_subscription = Arc::new(Mutex::new(None));

    let sink = late_seen.clone();
    let holder = late_subscription.clone();
    let _early = ctx
        .subscribe_fn(move |_event, _binding, ctx: Context| {
            let sink = sink.clone();
            let holder = holder.clone();
            async move {
                let mut holder = holder.lock();
                if holder.is_none() {
                    let subscription = ctx.subscribe_fn(move |_event, binding, _ctx| {
                        let sink = sink.clone();
                        async move {
                            sink.lock().push(binding.key().to_string());
                            Ok(())
                        }
                    })?;
                    *holder = Some(subscription);
                }
                Ok::<(), ContextError>(())
            }
        })
        .unwrap();

    ctx.bind("first").unwrap().to(1u8);
    ctx.wait_until_pending_notifications_done(Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert!(late_subscription.lock().is_some());
    assert!(late_seen.lock().is_empty());

    ctx.bind("second").unwrap().to(2u8);
    ctx.wait_until_pending_notifications_done(Some(Duration::from_secs(1)))
        .await
        .unwrap();
    assert_eq!(*late_seen.lock(), vec!["second".to_string()]);
}

#[tokio::test]
async fn test_observer_errors_reach_error_listeners() {
    init_tracing();
    let ctx = Context::named("app");
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    ctx.on_error(move |err: &ContextError| sink.lock().push(err.to_string()));

    let _subscription = ctx
        .subscribe_fn(|_event, binding, _ctx| async move {
            Err::<(), _>(ContextError::custom(format!("rejected {}", binding.key())))
        })
        .unwrap();

    ctx.bind("broken").unwrap().to(1u8);
    ctx.wait_until_pending_notifications_done(Some(Duration::from_secs(1)))
        .await
        .unwrap();

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("rejected broken"));
}

#[test]
fn test_configuration_lookup() {
    let ctx = Context::named("app");
    ctx.configure("servers.rest")
        .unwrap()
        .to(serde_json::json!({ "port": 3000, "host": "localhost" }));

    let port = ctx
        .get_config_sync::<serde_json::Value>("servers.rest", Some("port"))
        .unwrap()
        .unwrap();
    assert_eq!(*port, serde_json::json!(3000));
    assert!(ctx
        .get_config_sync::<serde_json::Value>("servers.grpc", None)
        .unwrap()
        .is_none());
}
