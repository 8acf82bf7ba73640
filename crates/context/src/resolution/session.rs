use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::binding::Binding;
use crate::errors::{ContextError, ContextResult};
use crate::resolution::injection::Injection;

/// One frame of a resolution session
#[derive(Clone)]
pub enum ResolutionElement {
    Binding(Binding),
    Injection(Arc<Injection>),
}

impl ResolutionElement {
    fn describe(&self) -> String {
        match self {
            ResolutionElement::Binding(binding) => binding.key().to_string(),
            ResolutionElement::Injection(injection) => format!("@{}", injection.target_name()),
        }
    }
}

/// Stack of bindings and injections being resolved
///
/// Sessions are values: nested resolutions receive a forked copy, so sibling
/// resolutions never observe each other's frames.
#[derive(Clone, Default)]
pub struct ResolutionSession {
    stack: Vec<ResolutionElement>,
}

impl ResolutionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of `session`, or a fresh session
    pub fn fork(session: Option<&ResolutionSession>) -> Self {
        session.cloned().unwrap_or_default()
    }

    /// Run `action` with `binding` pushed onto a fork of `session`
    pub fn run_with_binding<R, F>(binding: &Binding, session: Option<&ResolutionSession>, action: F) -> ContextResult<R>
    where
        F: FnOnce(ResolutionSession) -> ContextResult<R>,
    {
        let mut session = Self::fork(session);
        session.push_binding(binding)?;
        action(session)
    }

    /// Run `action` with `injection` pushed onto a fork of `session`
    pub fn run_with_injection<R, F>(
        injection: &Arc<Injection>,
        session: Option<&ResolutionSession>,
        action: F,
    ) -> ContextResult<R>
    where
        F: FnOnce(ResolutionSession) -> ContextResult<R>,
    {
        let mut session = Self::fork(session);
        session.push_injection(injection.clone());
        action(session)
    }

    /// Fail if `binding` is already on the stack
    pub fn check_binding(&self, binding: &Binding) -> ContextResult<()> {
        let is_cycle = self.stack.iter().any(|element| match element {
            ResolutionElement::Binding(existing) => existing.ptr_eq(binding),
            ResolutionElement::Injection(_) => false,
        });
        if is_cycle {
            return Err(ContextError::CircularDependency {
                path: format!("{} --> {}", self.resolution_path(), binding.key()),
            });
        }
        Ok(())
    }

    /// Push a binding, failing if it is already being resolved
    pub fn push_binding(&mut self, binding: &Binding) -> ContextResult<()> {
        self.check_binding(binding)?;
        trace!(key = %binding.key(), depth = self.stack.len(), "enter binding");
        self.stack.push(ResolutionElement::Binding(binding.clone()));
        Ok(())
    }

    pub fn push_injection(&mut self, injection: Arc<Injection>) {
        trace!(target = %injection.target_name(), depth = self.stack.len(), "enter injection");
        self.stack.push(ResolutionElement::Injection(injection));
    }

    /// Pop the top frame if it is a binding
    pub fn pop_binding(&mut self) -> Option<Binding> {
        match self.stack.last() {
            Some(ResolutionElement::Binding(_)) => match self.stack.pop() {
                Some(ResolutionElement::Binding(binding)) => Some(binding),
                _ => None,
            },
            _ => None,
        }
    }

    /// Pop the top frame if it is an injection
    pub fn pop_injection(&mut self) -> Option<Arc<Injection>> {
        match self.stack.last() {
            Some(ResolutionElement::Injection(_)) => match self.stack.pop() {
                Some(ResolutionElement::Injection(injection)) => Some(injection),
                _ => None,
            },
            _ => None,
        }
    }

    /// Innermost binding being resolved
    pub fn current_binding(&self) -> Option<&Binding> {
        self.stack.iter().rev().find_map(|element| match element {
            ResolutionElement::Binding(binding) => Some(binding),
            ResolutionElement::Injection(_) => None,
        })
    }

    /// Innermost injection being resolved
    pub fn current_injection(&self) -> Option<&Arc<Injection>> {
        self.stack.iter().rev().find_map(|element| match element {
            ResolutionElement::Injection(injection) => Some(injection),
            ResolutionElement::Binding(_) => None,
        })
    }

    pub fn binding_stack(&self) -> Vec<Binding> {
        self.stack
            .iter()
            .filter_map(|element| match element {
                ResolutionElement::Binding(binding) => Some(binding.clone()),
                ResolutionElement::Injection(_) => None,
            })
            .collect()
    }

    pub fn injection_stack(&self) -> Vec<Arc<Injection>> {
        self.stack
            .iter()
            .filter_map(|element| match element {
                ResolutionElement::Injection(injection) => Some(injection.clone()),
                ResolutionElement::Binding(_) => None,
            })
            .collect()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Binding keys joined by ` --> `
    pub fn binding_path(&self) -> String {
        self.binding_stack()
            .iter()
            .map(|binding| binding.key().to_string())
            .collect::<Vec<_>>()
            .join(" --> ")
    }

    /// Injection targets joined by ` --> `
    pub fn injection_path(&self) -> String {
        self.injection_stack()
            .iter()
            .map(|injection| injection.target_name())
            .collect::<Vec<_>>()
            .join(" --> ")
    }

    /// Every frame, e.g. `a --> @Service[0] --> b`
    pub fn resolution_path(&self) -> String {
        self.stack
            .iter()
            .map(ResolutionElement::describe)
            .collect::<Vec<_>>()
            .join(" --> ")
    }

    /// JSON description of an injection for diagnostics
    pub fn describe_injection(injection: &Injection) -> serde_json::Value {
        injection.describe()
    }
}

impl fmt::Debug for ResolutionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionSession")
            .field("path", &self.resolution_path())
            .finish()
    }
}

/// Options accepted by `get_value_or_promise` and friends
#[derive(Debug, Clone, Default)]
pub struct ResolutionOptions {
    /// Session to continue; a new one is started when absent
    pub session: Option<ResolutionSession>,
    /// Resolve missing bindings (and unresolvable scopes) to `None`
    pub optional: bool,
    /// Wrap class instances in an interceptor proxy
    pub as_proxy_with_interceptors: bool,
}

impl ResolutionOptions {
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Self::default()
        }
    }

    pub fn with_session(session: ResolutionSession) -> Self {
        Self {
            session: Some(session),
            ..Self::default()
        }
    }

    pub fn as_proxy() -> Self {
        Self {
            as_proxy_with_interceptors: true,
            ..Self::default()
        }
    }
}

impl From<ResolutionSession> for ResolutionOptions {
    fn from(session: ResolutionSession) -> Self {
        Self::with_session(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::injection::Injection;

    #[test]
    fn test_push_binding_detects_cycle() {
        let a = Binding::new("a").unwrap();
        let b = Binding::new("b").unwrap();
        let mut session = ResolutionSession::new();
        session.push_binding(&a).unwrap();
        session.push_binding(&b).unwrap();

        let err = session.push_binding(&a).unwrap_err();
        assert!(err.is_circular_dependency());
        assert_eq!(err.to_string(), "Circular dependency detected: a --> b --> a");
    }

    #[test]
    fn test_check_binding_leaves_stack_untouched() {
        let a = Binding::new("a").unwrap();
        let b = Binding::new("b").unwrap();
        let mut session = ResolutionSession::new();
        session.push_binding(&a).unwrap();

        assert!(session.check_binding(&b).is_ok());
        assert!(session.check_binding(&a).unwrap_err().is_circular_dependency());
        assert_eq!(session.resolution_path(), "a");
    }

    #[test]
    fn test_same_key_different_binding_is_not_a_cycle() {
        let first = Binding::new("a").unwrap();
        let second = Binding::new("a").unwrap();
        let mut session = ResolutionSession::new();
        session.push_binding(&first).unwrap();
        assert!(session.push_binding(&second).is_ok());
    }

    #[test]
    fn test_fork_is_independent() {
        let a = Binding::new("a").unwrap();
        let b = Binding::new("b").unwrap();
        let mut session = ResolutionSession::new();
        session.push_binding(&a).unwrap();

        let result = ResolutionSession::run_with_binding(&b, Some(&session), |forked| {
            assert_eq!(forked.binding_path(), "a --> b");
            Ok(forked.depth())
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(session.binding_path(), "a");
    }

    #[test]
    fn test_resolution_path_includes_injections() {
        let a = Binding::new("a").unwrap();
        let injection = Arc::new(Injection::key("b").at_constructor("Service", 0));
        let mut session = ResolutionSession::new();
        session.push_binding(&a).unwrap();
        session.push_injection(injection.clone());

        assert_eq!(session.resolution_path(), "a --> @Service[0]");
        assert_eq!(session.injection_path(), "Service[0]");
        assert_eq!(session.current_binding().map(|b| b.key()), Some("a"));
        assert!(session.current_injection().is_some());

        assert!(session.pop_binding().is_none());
        assert!(session.pop_injection().is_some());
        assert_eq!(session.pop_binding().map(|b| b.key().to_string()), Some("a".to_string()));
    }
}
