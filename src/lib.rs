//! Dependency-resolution runtime: a registry mapping symbolic ids to
//! constructible types or factories, resolving object graphs on demand with
//! configurable lifecycle hooks.
//!
//! Constructor signatures are declared through [`Injectable`] since Rust has
//! no runtime reflection; the engine recursively resolves each declared
//! parameter, caches singleton-flagged ids, detects cycles with a per-call
//! resolution stack, and applies three distinct extension points:
//! pre-resolution interceptors (override construction entirely), setter
//! hooks (run right after construction) and post-resolution
//! hooks/interceptors (validate, initialize or replace the final instance).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use autowire::{Injectable, ParamSpec, ResolvedArgs, ServiceContainer};
//!
//! struct Database;
//!
//! impl Injectable for Database {
//!     fn construct(_args: &mut ResolvedArgs) -> anyhow::Result<Self> {
//!         Ok(Self)
//!     }
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! impl Injectable for UserService {
//!     fn dependencies() -> Vec<ParamSpec> {
//!         vec![ParamSpec::required::<Database>()]
//!     }
//!
//!     fn construct(args: &mut ResolvedArgs) -> anyhow::Result<Self> {
//!         Ok(Self {
//!             db: args.take::<Database>()?,
//!         })
//!     }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let container = ServiceContainer::new("app");
//! container.describe_type::<Database>();
//! container.register_singleton::<UserService>(None);
//!
//! let service = container.resolve_as::<UserService>("UserService")?;
//! let again = container.resolve_as::<UserService>("UserService")?;
//! assert!(Arc::ptr_eq(&service, &again));
//! # Ok(())
//! # }
//! ```

pub mod container;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod instance;
pub mod interceptor;
pub mod lifecycle;
pub mod metadata;

pub use container::{ContainerBuilder, ContainerStats, ServiceContainer};
pub use descriptor::{FactoryFn, ServiceDescriptor, ServiceRegistry, ServiceTarget};
pub use engine::{ResolutionEngine, ResolutionStack, ResolveCtx};
pub use error::DiError;
pub use hooks::{HookCallback, HookPhase, HookRegistry};
pub use instance::{BoxedInstance, ParameterBag, ResolvedArgs};
pub use interceptor::{
    InterceptorRegistry, PostResolutionInterceptor, PreResolutionInterceptor, ResolutionRequest,
};
pub use lifecycle::{
    init_hook, provider_setup_hook, validation_hook, Initializable, Provider, Validatable,
};
pub use metadata::{Injectable, ParamSpec, TypeIntrospector, TypeMetadata, TypeRef};
