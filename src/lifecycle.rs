//! Collaborator contracts and the prebuilt hook bodies wired to them.
//!
//! The setter hook is the one general "registration-time setup" mechanism;
//! a provider's `setup()` method is simply one hook body
//! ([`provider_setup_hook`]), installed automatically by
//! `ServiceContainer::register_provider`.

use std::any::Any;
use std::sync::Arc;

use crate::engine::ResolveCtx;
use crate::error::DiError;
use crate::hooks::HookCallback;
use crate::instance::BoxedInstance;

/// A registered factory object. The engine autowires the provider itself,
/// runs setter hooks matching it (which call `setup` exactly once per
/// resolution), then asks it for the product instance.
pub trait Provider: Send + Sync {
    /// Lifecycle method invoked via setter hook before the provider is asked
    /// to produce a value. Default: nothing to set up.
    fn setup(&self) {}

    /// Produce the product instance. May resolve further dependencies
    /// through the context; those resolutions share the caller's stack.
    fn provide(&self, ctx: &mut ResolveCtx<'_>) -> anyhow::Result<BoxedInstance>;
}

/// Exposed by objects that can check their own consistency after
/// resolution. Failure must be signalled through the error, never a flag.
pub trait Validatable: Send + Sync {
    fn validate(&self) -> anyhow::Result<()>;
}

/// Exposed by objects needing one-time initialization after resolution.
pub trait Initializable: Send + Sync {
    fn init(&self) -> anyhow::Result<()>;
}

/// Setter-hook body calling `Provider::setup` on instances of `P`.
pub fn provider_setup_hook<P: Provider + Any + Send + Sync>() -> HookCallback {
    Arc::new(|instance, _descriptor| {
        if let Some(provider) = instance.downcast_ref::<P>() {
            provider.setup();
        }
        Ok(None)
    })
}

/// Post-resolution hook body calling `Validatable::validate` on instances of
/// `T`. Failures surface as [`DiError::Validation`] and propagate unmodified
/// through the engine.
pub fn validation_hook<T: Validatable + Any + Send + Sync>() -> HookCallback {
    Arc::new(|instance, _descriptor| {
        if let Some(subject) = instance.downcast_ref::<T>() {
            subject.validate().map_err(|e| {
                anyhow::Error::new(DiError::validation(
                    std::any::type_name::<T>(),
                    e.to_string(),
                ))
            })?;
        }
        Ok(None)
    })
}

/// Post-resolution hook body calling `Initializable::init` on instances of
/// `T`. Failures wrap in a construction error.
pub fn init_hook<T: Initializable + Any + Send + Sync>() -> HookCallback {
    Arc::new(|instance, _descriptor| {
        if let Some(subject) = instance.downcast_ref::<T>() {
            subject.init()?;
        }
        Ok(None)
    })
}
