//! Binding filters used by `find`, views and tag lookups

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;

use crate::binding::{Binding, TagMap};

pub type BindingPredicate = Arc<dyn Fn(&Binding) -> bool + Send + Sync>;

/// Predicate over bindings, optionally carrying the tag pattern it was built
/// from so registries can answer it from their tag index
#[derive(Clone)]
pub struct BindingFilter {
    predicate: BindingPredicate,
    tag_pattern: Option<BindingTagPattern>,
}

impl BindingFilter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Binding) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            tag_pattern: None,
        }
    }

    /// Filter matching every binding
    pub fn all() -> Self {
        Self::new(|_| true)
    }

    pub fn matches(&self, binding: &Binding) -> bool {
        (self.predicate)(binding)
    }

    /// Tag pattern this filter was created from, if any
    pub fn binding_tag_pattern(&self) -> Option<&BindingTagPattern> {
        self.tag_pattern.as_ref()
    }

    /// Both filters must match; the result is no longer a tag filter
    pub fn and(self, other: BindingFilter) -> Self {
        Self::new(move |binding| self.matches(binding) && other.matches(binding))
    }

    /// Either filter may match
    pub fn or(self, other: BindingFilter) -> Self {
        Self::new(move |binding| self.matches(binding) || other.matches(binding))
    }
}

impl fmt::Debug for BindingFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingFilter")
            .field("tag_pattern", &self.tag_pattern)
            .finish()
    }
}

/// Check whether a filter can use the tag index
pub fn is_binding_tag_filter(filter: &BindingFilter) -> bool {
    filter.tag_pattern.is_some()
}

/// Custom tag value predicate: `(tag value, tag name, all tags)`
pub type TagValuePredicate = Arc<dyn Fn(Option<&Value>, &str, &TagMap) -> bool + Send + Sync>;

/// How a tag value is matched in a name/value tag pattern
#[derive(Clone)]
pub enum TagValueMatcher {
    /// Tag value must equal this value
    Equals(Value),
    /// Tag must be present with any value
    Any,
    /// Tag value equals one of the values, or is an array containing one of them
    Includes(Vec<Value>),
    Custom(TagValuePredicate),
}

/// Matches any value of a present tag
pub const ANY_TAG_VALUE: TagValueMatcher = TagValueMatcher::Any;

/// Matcher for tags whose value (or array value) includes one of `values`
pub fn includes_tag_value<I, V>(values: I) -> TagValueMatcher
where
    I: IntoIterator<Item = V>,
    V: Into<Value>,
{
    TagValueMatcher::Includes(values.into_iter().map(Into::into).collect())
}

impl TagValueMatcher {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(Option<&Value>, &str, &TagMap) -> bool + Send + Sync + 'static,
    {
        TagValueMatcher::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, tag_name: &str, tags: &TagMap) -> bool {
        let tag_value = tags.get(tag_name);
        match self {
            TagValueMatcher::Any => tag_value.is_some(),
            TagValueMatcher::Equals(expected) => tag_value == Some(expected),
            TagValueMatcher::Includes(values) => values.iter().any(|item| match tag_value {
                Some(Value::Array(items)) => items.contains(item),
                Some(value) => value == item,
                None => false,
            }),
            TagValueMatcher::Custom(predicate) => predicate(tag_value, tag_name, tags),
        }
    }
}

impl fmt::Debug for TagValueMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValueMatcher::Equals(value) => write!(f, "Equals({})", value),
            TagValueMatcher::Any => write!(f, "Any"),
            TagValueMatcher::Includes(values) => write!(f, "Includes({:?})", values),
            TagValueMatcher::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl From<Value> for TagValueMatcher {
    fn from(value: Value) -> Self {
        TagValueMatcher::Equals(value)
    }
}

impl From<&str> for TagValueMatcher {
    fn from(value: &str) -> Self {
        TagValueMatcher::Equals(Value::from(value))
    }
}

impl From<String> for TagValueMatcher {
    fn from(value: String) -> Self {
        TagValueMatcher::Equals(Value::from(value))
    }
}

impl From<i64> for TagValueMatcher {
    fn from(value: i64) -> Self {
        TagValueMatcher::Equals(Value::from(value))
    }
}

impl From<bool> for TagValueMatcher {
    fn from(value: bool) -> Self {
        TagValueMatcher::Equals(Value::from(value))
    }
}

/// Pattern over tag names (or tag names and values)
#[derive(Clone, Debug)]
pub enum BindingTagPattern {
    /// Exact tag name
    Name(String),
    /// Tag names matching a regular expression (wildcards are compiled to one)
    Regex(Regex),
    /// Every listed tag must match its value matcher
    Map(IndexMap<String, TagValueMatcher>),
}

impl BindingTagPattern {
    pub fn matches(&self, binding: &Binding) -> bool {
        match self {
            BindingTagPattern::Name(name) => binding.has_tag(name),
            BindingTagPattern::Regex(regex) => binding.tag_names().iter().any(|tag| regex.is_match(tag)),
            BindingTagPattern::Map(matchers) => {
                let tags = binding.tag_map();
                matchers.iter().all(|(name, matcher)| matcher.matches(name, &tags))
            }
        }
    }
}

impl From<&str> for BindingTagPattern {
    fn from(pattern: &str) -> Self {
        if is_wildcard(pattern) {
            BindingTagPattern::Regex(wildcard_to_regex(pattern))
        } else {
            BindingTagPattern::Name(pattern.to_string())
        }
    }
}

impl From<String> for BindingTagPattern {
    fn from(pattern: String) -> Self {
        BindingTagPattern::from(pattern.as_str())
    }
}

impl From<Regex> for BindingTagPattern {
    fn from(regex: Regex) -> Self {
        BindingTagPattern::Regex(regex)
    }
}

impl From<IndexMap<String, TagValueMatcher>> for BindingTagPattern {
    fn from(map: IndexMap<String, TagValueMatcher>) -> Self {
        BindingTagPattern::Map(map)
    }
}

impl<const N: usize, M: Into<TagValueMatcher>> From<[(&str, M); N]> for BindingTagPattern {
    fn from(pairs: [(&str, M); N]) -> Self {
        BindingTagPattern::Map(
            pairs
                .into_iter()
                .map(|(name, matcher)| (name.to_string(), matcher.into()))
                .collect(),
        )
    }
}

/// Pattern over binding keys
#[derive(Clone, Debug)]
pub enum BindingKeyPattern {
    Exact(String),
    Regex(Regex),
}

impl From<&str> for BindingKeyPattern {
    fn from(pattern: &str) -> Self {
        if is_wildcard(pattern) {
            BindingKeyPattern::Regex(wildcard_to_regex(pattern))
        } else {
            BindingKeyPattern::Exact(pattern.to_string())
        }
    }
}

impl From<String> for BindingKeyPattern {
    fn from(pattern: String) -> Self {
        BindingKeyPattern::from(pattern.as_str())
    }
}

impl From<Regex> for BindingKeyPattern {
    fn from(regex: Regex) -> Self {
        BindingKeyPattern::Regex(regex)
    }
}

fn is_wildcard(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// Compile a wildcard into an anchored regex: `*` matches any run of
/// characters other than `.` and `:`, `?` exactly one such character
pub fn wildcard_to_regex(pattern: &str) -> Regex {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str("[^.:]*"),
            '?' => source.push_str("[^.:]"),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    source.push('$');
    // Every literal is escaped, so the pattern is always valid
    Regex::new(&source).unwrap_or_else(|_| unreachable!("escaped wildcard pattern is a valid regex"))
}

/// Filter bindings by key: exact key, wildcard or regex
pub fn filter_by_key(pattern: impl Into<BindingKeyPattern>) -> BindingFilter {
    match pattern.into() {
        BindingKeyPattern::Exact(key) => BindingFilter::new(move |binding| binding.key() == key),
        BindingKeyPattern::Regex(regex) => BindingFilter::new(move |binding| regex.is_match(binding.key())),
    }
}

/// Filter bindings by tag; the pattern is kept for index lookups
pub fn filter_by_tag(pattern: impl Into<BindingTagPattern>) -> BindingFilter {
    let pattern = pattern.into();
    let matcher = pattern.clone();
    BindingFilter {
        predicate: Arc::new(move |binding| matcher.matches(binding)),
        tag_pattern: Some(pattern),
    }
}

impl From<&str> for BindingFilter {
    fn from(pattern: &str) -> Self {
        filter_by_key(pattern)
    }
}

impl From<String> for BindingFilter {
    fn from(pattern: String) -> Self {
        filter_by_key(pattern)
    }
}

impl From<Regex> for BindingFilter {
    fn from(regex: Regex) -> Self {
        filter_by_key(regex)
    }
}

impl From<&BindingFilter> for BindingFilter {
    fn from(filter: &BindingFilter) -> Self {
        filter.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn binding(key: &str) -> Binding {
        Binding::new(key).unwrap()
    }

    #[test]
    fn test_filter_by_key_exact_and_wildcard() {
        let exact = filter_by_key("controllers.Foo");
        assert!(exact.matches(&binding("controllers.Foo")));
        assert!(!exact.matches(&binding("controllers.Bar")));

        let wildcard = filter_by_key("controllers.*");
        assert!(wildcard.matches(&binding("controllers.Foo")));
        assert!(!wildcard.matches(&binding("controllers.Foo.bar")));
        assert!(!wildcard.matches(&binding("repositories.Foo")));

        let single = filter_by_key("c?");
        assert!(single.matches(&binding("c1")));
        assert!(!single.matches(&binding("c.")));
        assert!(!single.matches(&binding("c12")));
    }

    #[test]
    fn test_filter_by_key_escapes_literals() {
        let filter = filter_by_key("a+b.*");
        assert!(filter.matches(&binding("a+b.c")));
        assert!(!filter.matches(&binding("aab.c")));
    }

    #[test]
    fn test_filter_by_key_regex() {
        let filter = filter_by_key(Regex::new("^services\\.").unwrap());
        assert!(filter.matches(&binding("services.Email")));
        assert!(!filter.matches(&binding("repositories.Email")));
        assert!(!is_binding_tag_filter(&filter));
    }

    #[test]
    fn test_filter_by_tag_name_and_wildcard() {
        let b = binding("foo");
        b.tag("controller").tag("rest.endpoint");

        assert!(filter_by_tag("controller").matches(&b));
        assert!(!filter_by_tag("repository").matches(&b));
        assert!(filter_by_tag("rest.*").matches(&b));
        assert!(filter_by_tag(Regex::new("contr").unwrap()).matches(&b));
        assert!(is_binding_tag_filter(&filter_by_tag("controller")));
    }

    #[test]
    fn test_filter_by_tag_map_requires_all() {
        let b = binding("foo");
        b.tag(("name", "foo")).tag(("group", "g1"));

        assert!(filter_by_tag([("name", "foo"), ("group", "g1")]).matches(&b));
        assert!(!filter_by_tag([("name", "foo"), ("group", "g2")]).matches(&b));
        assert!(filter_by_tag([("group", ANY_TAG_VALUE)]).matches(&b));
        assert!(!filter_by_tag([("missing", ANY_TAG_VALUE)]).matches(&b));
    }

    #[test]
    fn test_includes_tag_value() {
        let b = binding("foo");
        b.tag(("roles", json!(["admin", "user"])));
        let other = binding("bar");
        other.tag(("roles", "guest"));

        let filter = filter_by_tag([("roles", includes_tag_value(["admin", "guest"]))]);
        assert!(filter.matches(&b));
        assert!(filter.matches(&other));
        assert!(!filter_by_tag([("roles", includes_tag_value(["root"]))]).matches(&b));
    }

    #[test]
    fn test_custom_tag_matcher() {
        let b = binding("foo");
        b.tag(("order", 5));
        let filter = filter_by_tag([(
            "order",
            TagValueMatcher::custom(|value, _, _| value.and_then(Value::as_i64).map_or(false, |v| v > 3)),
        )]);
        assert!(filter.matches(&b));
    }

    #[test]
    fn test_filter_composition() {
        let b = binding("services.Email");
        b.tag("service");
        let filter = filter_by_tag("service").and(filter_by_key("services.*"));
        assert!(filter.matches(&b));
        assert!(!is_binding_tag_filter(&filter));

        let either = filter_by_tag("missing").or(filter_by_key("services.Email"));
        assert!(either.matches(&b));
    }
}
