pub mod context;
pub mod events;
pub mod subscription;
pub mod tag_indexer;
pub mod view;

pub use context::Context;
pub use events::{ContextEvent, ContextEventListener, ContextEventType, ErrorListener, ListenerId};
pub use subscription::{ContextObserver, ContextSubscriptionManager, FnObserver, ObserverFn, Subscription};
pub use tag_indexer::ContextTagIndexer;
pub use view::{ContextView, RefreshListener};
