//! Ordering of bindings by a phase/group tag

use std::cmp::Ordering;
use std::sync::Arc;

use serde_json::Value;

use crate::binding::Binding;

pub type BindingComparator = Arc<dyn Fn(&Binding, &Binding) -> Ordering + Send + Sync>;

/// Compare two items by their position in `order`
///
/// Items missing from `order` sort before listed ones. When neither is
/// listed they are compared lexically.
pub fn compare_by_order(a: Option<&str>, b: Option<&str>, order: &[String]) -> Ordering {
    let a = a.unwrap_or("");
    let b = b.unwrap_or("");
    let i1 = order.iter().position(|item| item == a);
    let i2 = order.iter().position(|item| item == b);
    if i1.is_some() || i2.is_some() {
        let i1 = i1.map_or(-1, |i| i as i64);
        let i2 = i2.map_or(-1, |i| i as i64);
        return i1.cmp(&i2);
    }
    a.cmp(b)
}

fn tag_as_phase(binding: &Binding, tag: &str) -> Option<String> {
    binding.tag_value(tag).map(|value| match value {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// Comparator ordering bindings by the value of `phase_tag_name`
pub fn compare_bindings_by_tag(phase_tag_name: impl Into<String>, ordered_phases: Vec<String>) -> BindingComparator {
    let tag = phase_tag_name.into();
    Arc::new(move |a, b| {
        let pa = tag_as_phase(a, &tag);
        let pb = tag_as_phase(b, &tag);
        compare_by_order(pa.as_deref(), pb.as_deref(), &ordered_phases)
    })
}

/// Stable sort of bindings by phase
pub fn sort_bindings_by_phase(bindings: &mut [Binding], phase_tag_name: &str, ordered_phases: &[String]) {
    let comparator = compare_bindings_by_tag(phase_tag_name, ordered_phases.to_vec());
    bindings.sort_by(|a, b| comparator(a, b));
}
