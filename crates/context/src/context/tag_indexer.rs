//! Secondary index of bindings by tag name

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use tracing::trace;
use uuid::Uuid;

use crate::binding::{Binding, BindingOperation, BindingTagPattern, TagValueMatcher};

type TagIndex = HashMap<String, IndexMap<Uuid, Binding>>;

/// Keeps `tag name -> bindings` in sync with a context's registry
#[derive(Default)]
pub struct ContextTagIndexer {
    index: Arc<RwLock<TagIndex>>,
    // binding id -> (binding, change listener id)
    listeners: Mutex<HashMap<Uuid, (Binding, u64)>>,
}

impl ContextTagIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    fn reindex(index: &RwLock<TagIndex>, binding: &Binding) {
        let tag_names = binding.tag_names();
        let mut index = index.write();
        for bindings in index.values_mut() {
            bindings.shift_remove(&binding.id());
        }
        index.retain(|_, bindings| !bindings.is_empty());
        for tag in tag_names {
            index.entry(tag).or_default().insert(binding.id(), binding.clone());
        }
        trace!(key = %binding.key(), "tag index updated");
    }

    /// Index a binding added to the registry and follow its tag changes
    pub(crate) fn add_binding(&self, binding: &Binding) {
        Self::reindex(&self.index, binding);

        let mut listeners = self.listeners.lock();
        if listeners.contains_key(&binding.id()) {
            return;
        }
        let index: Weak<RwLock<TagIndex>> = Arc::downgrade(&self.index);
        let listener_id = binding.on_changed(Arc::new(move |event| {
            if event.operation != BindingOperation::Tag {
                return;
            }
            if let Some(index) = index.upgrade() {
                Self::reindex(&index, &event.binding);
            }
        }));
        listeners.insert(binding.id(), (binding.clone(), listener_id));
    }

    /// Drop a binding removed from the registry
    pub(crate) fn remove_binding(&self, binding: &Binding) {
        if let Some((binding, listener_id)) = self.listeners.lock().remove(&binding.id()) {
            binding.remove_changed_listener(listener_id);
        }
        let mut index = self.index.write();
        for bindings in index.values_mut() {
            bindings.shift_remove(&binding.id());
        }
        index.retain(|_, bindings| !bindings.is_empty());
    }

    /// Bindings of this registry matching a tag pattern
    pub fn find_by_tag_index(&self, pattern: &BindingTagPattern) -> Vec<Binding> {
        let index = self.index.read();
        match pattern {
            BindingTagPattern::Name(name) => index
                .get(name)
                .map(|bindings| bindings.values().cloned().collect())
                .unwrap_or_default(),
            BindingTagPattern::Regex(regex) => {
                let mut union: IndexMap<Uuid, Binding> = IndexMap::new();
                for (tag, bindings) in index.iter() {
                    if regex.is_match(tag) {
                        for (id, binding) in bindings {
                            union.entry(*id).or_insert_with(|| binding.clone());
                        }
                    }
                }
                union.into_values().collect()
            }
            BindingTagPattern::Map(matchers) => {
                let mut result: Option<IndexMap<Uuid, Binding>> = None;
                for (tag, matcher) in matchers {
                    let tagged = match index.get(tag) {
                        Some(bindings) => bindings,
                        None => return Vec::new(),
                    };
                    let matched: IndexMap<Uuid, Binding> = tagged
                        .iter()
                        .filter(|(_, binding)| Self::matches_value(matcher, tag, binding))
                        .map(|(id, binding)| (*id, binding.clone()))
                        .collect();
                    if matched.is_empty() {
                        return Vec::new();
                    }
                    result = Some(match result {
                        None => matched,
                        Some(previous) => previous
                            .into_iter()
                            .filter(|(id, _)| matched.contains_key(id))
                            .collect(),
                    });
                }
                result.map(|bindings| bindings.into_values().collect()).unwrap_or_default()
            }
        }
    }

    fn matches_value(matcher: &TagValueMatcher, tag: &str, binding: &Binding) -> bool {
        matcher.matches(tag, &binding.tag_map())
    }

    /// Stop following tag changes of indexed bindings
    pub(crate) fn close(&self) {
        let listeners: Vec<(Binding, u64)> = self.listeners.lock().drain().map(|(_, entry)| entry).collect();
        for (binding, listener_id) in listeners {
            binding.remove_changed_listener(listener_id);
        }
    }
}
