pub mod binding;
pub mod filter;
pub mod scope;
pub mod sorter;

pub use binding::{
    create_binding_from_class, create_binding_from_provider, Binding, BindingEvent, BindingEventListener,
    BindingFromClassOptions, BindingOperation, BindingSource, BindingTag, BindingTemplate, InspectionOptions,
    ResolutionContext, TagMap, ValueFactory,
};
pub use filter::{
    filter_by_key, filter_by_tag, includes_tag_value, is_binding_tag_filter, wildcard_to_regex, BindingFilter,
    BindingKeyPattern, BindingTagPattern, TagValueMatcher, ANY_TAG_VALUE,
};
pub use scope::{BindingScope, BindingType};
pub use sorter::{compare_bindings_by_tag, compare_by_order, sort_bindings_by_phase, BindingComparator};

use crate::keys::ContextTags;

/// Template marking a binding as a provider of `type_name`
pub fn as_provider(type_name: &'static str) -> impl Fn(&Binding) {
    move |binding: &Binding| {
        binding.tag((ContextTags::TYPE, ContextTags::PROVIDER)).tag((ContextTags::PROVIDER, type_name));
    }
}

/// Template marking a binding as a class binding of `type_name`
pub fn as_class(type_name: &'static str) -> impl Fn(&Binding) {
    move |binding: &Binding| {
        binding.tag((ContextTags::TYPE, ContextTags::CLASS)).tag((ContextTags::CLASS, type_name));
    }
}

/// Template tagging a binding as the configuration of `key`
pub fn configure_binding(key: impl Into<String>) -> impl Fn(&Binding) {
    let key = key.into();
    move |binding: &Binding| {
        binding.tag((ContextTags::CONFIGURATION_FOR, key.clone()));
    }
}
