pub mod arguments;
pub mod getter;
pub mod injection;
pub mod metadata;
pub mod resolver;
pub mod session;

pub use arguments::{Arguments, Properties};
pub use getter::{Getter, Setter};
pub use injection::{
    BindingCreationPolicy, BindingSelector, Injection, InjectionMetadata, InjectionPoint, InjectionResolver,
};
pub use metadata::{
    class_metadata, describe_injected_arguments, describe_injected_properties, ClassMetadata, Injectable,
    MethodMetadata,
};
pub use resolver::{
    instantiate_class, invoke_method, resolve_injected_arguments, resolve_injected_properties, resolve_injection,
};
pub use session::{ResolutionElement, ResolutionOptions, ResolutionSession};
