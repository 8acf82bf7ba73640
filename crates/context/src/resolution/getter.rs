use std::any::Any;
use std::sync::Arc;

use crate::binding::Binding;
use crate::context::{Context, ContextView};
use crate::errors::{ContextError, ContextResult};
use crate::keys::BindingKey;
use crate::resolution::injection::BindingCreationPolicy;
use crate::resolution::session::{ResolutionOptions, ResolutionSession};
use crate::value_promise::{downcast_value, BoundValue, ResolvedValue, ValueOrPromise};

#[derive(Clone)]
enum GetterSource {
    Key(BindingKey),
    Config { key: String, property_path: Option<String> },
    View(ContextView),
}

/// Deferred access to a binding's value (or a view's values)
#[derive(Clone)]
pub struct Getter {
    ctx: Option<Context>,
    source: GetterSource,
    options: ResolutionOptions,
}

impl Getter {
    pub fn for_key(ctx: Context, key: BindingKey, options: ResolutionOptions) -> Self {
        Self {
            ctx: Some(ctx),
            source: GetterSource::Key(key),
            options,
        }
    }

    pub fn for_config(ctx: Context, key: String, property_path: Option<String>, options: ResolutionOptions) -> Self {
        Self {
            ctx: Some(ctx),
            source: GetterSource::Config { key, property_path },
            options,
        }
    }

    pub fn for_view(view: ContextView, session: Option<ResolutionSession>) -> Self {
        Self {
            ctx: None,
            source: GetterSource::View(view),
            options: ResolutionOptions {
                session,
                ..ResolutionOptions::default()
            },
        }
    }

    fn context(&self) -> ContextResult<&Context> {
        self.ctx
            .as_ref()
            .ok_or_else(|| ContextError::custom("the getter has no context"))
    }

    /// Resolve the current value; view getters yield a `Vec<BoundValue>`
    pub fn value_or_promise(&self) -> ContextResult<ValueOrPromise<ResolvedValue>> {
        match &self.source {
            GetterSource::Key(key) => self.context()?.get_value_or_promise(key, self.options.clone()),
            GetterSource::Config { key, property_path } => {
                self.context()?
                    .get_config_as_value_or_promise(key, property_path.as_deref(), self.options.clone())
            }
            GetterSource::View(view) => {
                let values = view.resolve(self.options.session.clone())?;
                Ok(values.map(|values| Some(Arc::new(values) as BoundValue)))
            }
        }
    }

    /// Resolve the value, or `None` when it is absent
    pub async fn get_optional<T: Any + Send + Sync>(&self) -> ContextResult<Option<Arc<T>>> {
        if let GetterSource::View(view) = &self.source {
            return match view.single_value_with(self.options.session.clone()).await? {
                Some(value) => downcast_value::<T>("getter", value).map(Some),
                None => Ok(None),
            };
        }
        match self.value_or_promise()?.resolve().await? {
            Some(value) => downcast_value::<T>(&self.describe(), value).map(Some),
            None => Ok(None),
        }
    }

    /// Resolve the value
    pub async fn get<T: Any + Send + Sync>(&self) -> ContextResult<Arc<T>> {
        match self.get_optional::<T>().await? {
            Some(value) => Ok(value),
            None => Err(ContextError::resolution(
                format!("The getter for {} resolved to no value", self.describe()),
                Default::default(),
            )),
        }
    }

    /// Resolve the value without awaiting
    pub fn get_sync<T: Any + Send + Sync>(&self) -> ContextResult<Arc<T>> {
        match self.value_or_promise()? {
            ValueOrPromise::Value(Some(value)) => downcast_value::<T>(&self.describe(), value),
            ValueOrPromise::Value(None) => Err(ContextError::resolution(
                format!("The getter for {} resolved to no value", self.describe()),
                Default::default(),
            )),
            ValueOrPromise::Promise(_) => Err(ContextError::AsyncValue { key: self.describe() }),
        }
    }

    /// Values of a view getter (or the single value of a key getter)
    pub async fn values<T: Any + Send + Sync>(&self) -> ContextResult<Vec<Arc<T>>> {
        match &self.source {
            GetterSource::View(view) => {
                let values = view.resolve(self.options.session.clone())?.resolve().await?;
                values
                    .into_iter()
                    .map(|value| downcast_value::<T>("getter", value))
                    .collect()
            }
            _ => Ok(self.get_optional::<T>().await?.into_iter().collect()),
        }
    }

    fn describe(&self) -> String {
        match &self.source {
            GetterSource::Key(key) => key.to_string(),
            GetterSource::Config { key, property_path } => match property_path {
                Some(path) => format!("{}:$config#{}", key, path),
                None => format!("{}:$config", key),
            },
            GetterSource::View(_) => "view".to_string(),
        }
    }
}

impl std::fmt::Debug for Getter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Getter({})", self.describe())
    }
}

/// Binds values to a key after resolution has finished
#[derive(Clone)]
pub struct Setter {
    ctx: Context,
    key: BindingKey,
    policy: BindingCreationPolicy,
}

impl Setter {
    pub fn new(ctx: Context, key: BindingKey, policy: BindingCreationPolicy) -> Self {
        Self { ctx, key, policy }
    }

    pub fn key(&self) -> &BindingKey {
        &self.key
    }

    /// Bind `value` as a constant, returning the binding used
    pub fn set<T: Any + Send + Sync>(&self, value: T) -> ContextResult<Binding> {
        let binding = self.ctx.find_or_create_binding(self.key.key(), self.policy)?;
        binding.to(value);
        Ok(binding)
    }
}

impl std::fmt::Debug for Setter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Setter({}, {:?})", self.key, self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_getter_sees_latest_value() {
        let ctx = Context::named("app");
        ctx.bind("greeting").unwrap().to("hello".to_string());
        let getter = Getter::for_key(ctx.clone(), BindingKey::from("greeting"), ResolutionOptions::default());

        assert_eq!(getter.get::<String>().await.unwrap().as_str(), "hello");
        ctx.bind("greeting").unwrap().to("bonjour".to_string());
        assert_eq!(getter.get_sync::<String>().unwrap().as_str(), "bonjour");
    }

    #[tokio::test]
    async fn test_optional_getter() {
        let ctx = Context::named("app");
        let getter = Getter::for_key(ctx, BindingKey::from("missing"), ResolutionOptions::optional());
        assert!(getter.get_optional::<String>().await.unwrap().is_none());
        assert!(getter.get::<String>().await.is_err());
    }

    #[test]
    fn test_setter_policies() {
        let ctx = Context::named("app");
        let setter = Setter::new(ctx.clone(), BindingKey::from("counter"), BindingCreationPolicy::CreateIfNotBound);
        let first = setter.set(1u32).unwrap();
        let second = setter.set(2u32).unwrap();
        assert!(first.ptr_eq(&second));
        assert_eq!(*ctx.get_sync::<u32>("counter").unwrap(), 2);

        let always = Setter::new(ctx.clone(), BindingKey::from("counter"), BindingCreationPolicy::AlwaysCreate);
        let third = always.set(3u32).unwrap();
        assert!(!third.ptr_eq(&second));

        let never = Setter::new(ctx, BindingKey::from("absent"), BindingCreationPolicy::NeverCreate);
        assert!(never.set(4u32).unwrap_err().is_not_bound());
    }
}
