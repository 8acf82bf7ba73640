//! Deferred observer notification
//!
//! Registry changes are delivered to observers by a background task draining
//! a queue, so code configuring a binding right after `bind()` usually
//! finishes before any observer sees it. Filters are evaluated on delivery.
//! An observer whose filter rejects a `bind` is notified again once the
//! binding changes, which covers a binding tagged after the task already
//! looked at it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::binding::{Binding, BindingEvent, BindingEventListener, BindingFilter};
use crate::context::events::{ContextEvent, ContextEventType, ListenerId};
use crate::context::Context;
use crate::errors::{ContextError, ContextResult};

/// Receives registry changes of a context and its ancestors
#[async_trait]
pub trait ContextObserver: Send + Sync {
    /// Only bindings passing the filter are observed
    fn filter(&self, _binding: &Binding) -> bool {
        true
    }

    async fn observe(&self, event_type: ContextEventType, binding: &Binding, context: &Context) -> ContextResult<()>;
}

pub type ObserverFn =
    Arc<dyn Fn(ContextEventType, Binding, Context) -> BoxFuture<'static, ContextResult<()>> + Send + Sync>;

/// Adapts a function (and optional filter) to [`ContextObserver`]
pub struct FnObserver {
    filter: Option<BindingFilter>,
    observe: ObserverFn,
}

impl FnObserver {
    pub fn new<F, Fut>(observe: F) -> Self
    where
        F: Fn(ContextEventType, Binding, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ContextResult<()>> + Send + 'static,
    {
        Self {
            filter: None,
            observe: Arc::new(move |event_type, binding, context| Box::pin(observe(event_type, binding, context))),
        }
    }

    pub fn with_filter(mut self, filter: BindingFilter) -> Self {
        self.filter = Some(filter);
        self
    }
}

#[async_trait]
impl ContextObserver for FnObserver {
    fn filter(&self, binding: &Binding) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter.matches(binding))
    }

    async fn observe(&self, event_type: ContextEventType, binding: &Binding, context: &Context) -> ContextResult<()> {
        (self.observe)(event_type, binding.clone(), context.clone()).await
    }
}

/// Handle returned by `subscribe`
#[derive(Clone)]
pub struct Subscription {
    context: Weak<super::context::ContextInner>,
    observer: Arc<dyn ContextObserver>,
    closed: Arc<AtomicBool>,
}

impl Subscription {
    pub(crate) fn new(context: Weak<super::context::ContextInner>, observer: Arc<dyn ContextObserver>) -> Self {
        Self {
            context,
            observer,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn observer(&self) -> &Arc<dyn ContextObserver> {
        &self.observer
    }

    pub fn unsubscribe(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(context) = Context::upgrade(&self.context) {
            context.unsubscribe(&self.observer);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("closed", &self.is_closed()).finish()
    }
}

struct Notification {
    event_type: ContextEventType,
    binding: Binding,
    context: Context,
    observers: Vec<Arc<dyn ContextObserver>>,
}

/// Observers that rejected a bound binding, waiting for it to change
struct Deferred {
    binding: Binding,
    context: Weak<super::context::ContextInner>,
    observers: Vec<Arc<dyn ContextObserver>>,
    listener: u64,
}

type DeferredMap = Mutex<HashMap<Uuid, Deferred>>;

#[derive(Default)]
struct Pending {
    count: AtomicUsize,
    done: Notify,
}

impl Pending {
    fn finish_one(&self) {
        // close() may have reset the counter while a notification was in flight
        let previous = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            self.done.notify_waiters();
        }
    }
}

/// Observers of one context and the task notifying them
#[derive(Default)]
pub struct ContextSubscriptionManager {
    observers: RwLock<Vec<Arc<dyn ContextObserver>>>,
    queue: Mutex<Option<mpsc::UnboundedSender<Notification>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    pending: Arc<Pending>,
    deferred: Arc<DeferredMap>,
    parent_listener: Mutex<Option<(Context, ListenerId)>>,
}

impl ContextSubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observers(&self) -> Vec<Arc<dyn ContextObserver>> {
        self.observers.read().clone()
    }

    pub fn has_observers(&self) -> bool {
        !self.observers.read().is_empty()
    }

    pub fn is_subscribed(&self, observer: &Arc<dyn ContextObserver>) -> bool {
        self.observers.read().iter().any(|existing| Arc::ptr_eq(existing, observer))
    }

    pub(crate) fn add_observer(&self, observer: Arc<dyn ContextObserver>) {
        let mut observers = self.observers.write();
        if !observers.iter().any(|existing| Arc::ptr_eq(existing, &observer)) {
            observers.push(observer);
        }
    }

    pub(crate) fn remove_observer(&self, observer: &Arc<dyn ContextObserver>) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|existing| !Arc::ptr_eq(existing, observer));
        before != observers.len()
    }

    pub fn pending_notifications(&self) -> usize {
        self.pending.count.load(Ordering::SeqCst)
    }

    /// Forward parent events into `ctx`, then do the same for every ancestor
    pub(crate) fn setup_parent_forwarding(&self, ctx: &Context) {
        let parent = match ctx.parent() {
            Some(parent) => parent,
            None => return,
        };
        {
            let mut parent_listener = self.parent_listener.lock();
            if parent_listener.is_some() {
                return;
            }
            let child = ctx.downgrade();
            let id = parent.add_raw_event_listener(Arc::new(move |event: &ContextEvent| {
                if let Some(child) = Context::upgrade(&child) {
                    child.handle_parent_event(event);
                }
            }));
            *parent_listener = Some((parent.clone(), id));
        }
        debug!(context = %ctx.name(), parent = %parent.name(), "forwarding parent events");
        parent.subscription_manager().setup_parent_forwarding(&parent);
    }

    /// Start the notification task if it is not running
    pub(crate) fn ensure_notification_task(&self, ctx: &Context) -> ContextResult<()> {
        let mut queue = self.queue.lock();
        if queue.is_some() {
            return Ok(());
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|err| ContextError::Runtime {
            message: format!("observing context \"{}\" requires a tokio runtime: {}", ctx.name(), err),
        })?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let task = handle.spawn(Self::process_notifications(
            ctx.downgrade(),
            ctx.name().to_string(),
            receiver,
            self.pending.clone(),
            self.deferred.clone(),
        ));
        *queue = Some(sender);
        *self.task.lock() = Some(task);
        debug!(context = %ctx.name(), "notification task started");
        Ok(())
    }

    async fn process_notifications(
        context: Weak<super::context::ContextInner>,
        name: String,
        mut receiver: mpsc::UnboundedReceiver<Notification>,
        pending: Arc<Pending>,
        deferred: Arc<DeferredMap>,
    ) {
        while let Some(notification) = receiver.recv().await {
            let result = Self::notify_observers(&notification, &context, &deferred).await;
            pending.finish_one();
            if let Err(err) = result {
                match Context::upgrade(&context) {
                    Some(ctx) => ctx.emit_error(err),
                    None => tracing::error!(context = %name, error = %err, "observer failed after context was dropped"),
                }
            }
        }
        trace!(context = %name, "notification task stopped");
    }

    async fn notify_observers(
        notification: &Notification,
        owner: &Weak<super::context::ContextInner>,
        deferred: &DeferredMap,
    ) -> ContextResult<()> {
        let observers = match notification.event_type {
            ContextEventType::Bind => Self::accepting_observers(notification, owner, deferred),
            ContextEventType::Unbind => {
                Self::forget_deferred(deferred, &notification.binding);
                notification
                    .observers
                    .iter()
                    .filter(|observer| observer.filter(&notification.binding))
                    .cloned()
                    .collect()
            }
        };
        for observer in observers {
            observer
                .observe(notification.event_type, &notification.binding, &notification.context)
                .await
                .map_err(|err| ContextError::Observer {
                    event: notification.event_type.to_string(),
                    key: notification.binding.key().to_string(),
                    message: err.to_string(),
                })?;
        }
        Ok(())
    }

    /// Observers of a `bind` whose filter accepts the binding
    ///
    /// The others are parked until the binding changes.
    fn accepting_observers(
        notification: &Notification,
        owner: &Weak<super::context::ContextInner>,
        deferred: &DeferredMap,
    ) -> Vec<Arc<dyn ContextObserver>> {
        let binding = &notification.binding;
        let mut accepted: Vec<bool> = notification
            .observers
            .iter()
            .map(|observer| observer.filter(binding))
            .collect();
        if accepted.iter().all(|accepted| *accepted) {
            return notification.observers.clone();
        }

        let mut deferred = deferred.lock();
        // Listen first, then look again: a change landing in between is
        // either seen here or by the listener
        let listener = match deferred.get(&binding.id()) {
            Some(entry) => entry.listener,
            None => binding.on_changed(Self::redeliver_on_change(owner.clone())),
        };
        for (observer, accepted) in notification.observers.iter().zip(accepted.iter_mut()) {
            if !*accepted {
                *accepted = observer.filter(binding);
            }
        }

        let rejected: Vec<Arc<dyn ContextObserver>> = notification
            .observers
            .iter()
            .zip(&accepted)
            .filter(|(_, accepted)| !**accepted)
            .map(|(observer, _)| observer.clone())
            .collect();
        if rejected.is_empty() {
            if !deferred.contains_key(&binding.id()) {
                binding.remove_changed_listener(listener);
            }
        } else {
            trace!(key = %binding.key(), observers = rejected.len(), "bind deferred until binding changes");
            let entry = deferred.entry(binding.id()).or_insert_with(|| Deferred {
                binding: binding.clone(),
                context: notification.context.downgrade(),
                observers: Vec::new(),
                listener,
            });
            for observer in rejected {
                if !entry.observers.iter().any(|existing| Arc::ptr_eq(existing, &observer)) {
                    entry.observers.push(observer);
                }
            }
        }

        notification
            .observers
            .iter()
            .zip(accepted)
            .filter(|(_, accepted)| *accepted)
            .map(|(observer, _)| observer.clone())
            .collect()
    }

    fn redeliver_on_change(owner: Weak<super::context::ContextInner>) -> BindingEventListener {
        Arc::new(move |event: &BindingEvent| {
            if let Some(ctx) = Context::upgrade(&owner) {
                ctx.subscription_manager().redeliver(&event.binding);
            }
        })
    }

    fn forget_deferred(deferred: &DeferredMap, binding: &Binding) {
        let entry = deferred.lock().remove(&binding.id());
        if let Some(entry) = entry {
            entry.binding.remove_changed_listener(entry.listener);
        }
    }

    /// Queue `bind` again for observers that rejected `binding` before it changed
    pub(crate) fn redeliver(&self, binding: &Binding) {
        let entry = self.deferred.lock().remove(&binding.id());
        let entry = match entry {
            Some(entry) => entry,
            None => return,
        };
        entry.binding.remove_changed_listener(entry.listener);
        let context = match Context::upgrade(&entry.context) {
            Some(context) => context,
            None => return,
        };
        let observers: Vec<Arc<dyn ContextObserver>> = entry
            .observers
            .into_iter()
            .filter(|observer| self.is_subscribed(observer))
            .collect();
        if observers.is_empty() {
            return;
        }
        trace!(key = %binding.key(), observers = observers.len(), "binding changed, redelivering bind");
        self.send(Notification {
            event_type: ContextEventType::Bind,
            binding: entry.binding,
            context,
            observers,
        });
    }

    /// Queue an event for the observers registered right now
    pub(crate) fn enqueue(&self, event: &ContextEvent) {
        let observers = self.observers();
        if observers.is_empty() {
            return;
        }
        self.send(Notification {
            event_type: event.event_type,
            binding: event.binding.clone(),
            context: event.context.clone(),
            observers,
        });
    }

    fn send(&self, notification: Notification) {
        let queue = self.queue.lock();
        let sender = match queue.as_ref() {
            Some(sender) => sender,
            None => return,
        };
        self.pending.count.fetch_add(1, Ordering::SeqCst);
        if sender.send(notification).is_err() {
            self.pending.finish_one();
        }
    }

    /// Wait until every queued notification has been delivered
    pub async fn wait_until_pending_notifications_done(&self, timeout: Option<Duration>) -> ContextResult<()> {
        let wait = async {
            loop {
                let done = self.pending.done.notified();
                if self.pending.count.load(Ordering::SeqCst) == 0 {
                    return;
                }
                done.await;
            }
        };
        match timeout {
            None => {
                wait.await;
                Ok(())
            }
            Some(timeout) => tokio::time::timeout(timeout, wait).await.map_err(|_| ContextError::Timeout {
                operation: "pending notifications".to_string(),
                millis: timeout.as_millis() as u64,
            }),
        }
    }

    /// Stop notifying and detach from the parent
    pub(crate) fn close(&self) {
        self.observers.write().clear();
        self.queue.lock().take();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        let outstanding = self.pending.count.swap(0, Ordering::SeqCst);
        if outstanding > 0 {
            debug!(outstanding, "dropping undelivered notifications");
        }
        self.pending.done.notify_waiters();
        let deferred: Vec<Deferred> = self.deferred.lock().drain().map(|(_, entry)| entry).collect();
        for entry in deferred {
            entry.binding.remove_changed_listener(entry.listener);
        }
        if let Some((parent, id)) = self.parent_listener.lock().take() {
            parent.remove_raw_event_listener(id);
        }
    }
}
