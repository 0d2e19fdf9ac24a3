//! Public facade composing the registries and the resolution engine.
//!
//! A container is an explicitly constructed, explicitly owned value; there
//! is no hidden global. Cloning a container is cheap and shares the same
//! registries and singleton cache. Registration is expected to happen during
//! a startup phase; the shared tables use locks so reads during resolution
//! stay safe if the host application is multi-threaded, but registration
//! concurrent with resolution has no defined ordering.

use std::any::{Any, TypeId};
use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::descriptor::{ProviderCast, ServiceDescriptor, ServiceRegistry, ServiceTarget};
use crate::engine::{downcast_instance, ResolutionEngine, ResolveCtx};
use crate::error::DiError;
use crate::hooks::{HookCallback, HookPhase, HookRegistry};
use crate::instance::{BoxedInstance, ParameterBag};
use crate::interceptor::{
    InterceptorRegistry, PostResolutionInterceptor, PreResolutionInterceptor,
};
use crate::lifecycle::{
    init_hook, provider_setup_hook, validation_hook, Initializable, Provider, Validatable,
};
use crate::metadata::{Injectable, TypeIntrospector, TypeRef};

/// Snapshot of container state and counters for diagnostics.
#[derive(Debug, Clone)]
pub struct ContainerStats {
    pub name: String,
    pub registered_services: usize,
    pub described_types: usize,
    pub cached_singletons: usize,
    pub setter_hooks: usize,
    pub post_resolution_hooks: usize,
    pub pre_interceptors: usize,
    pub post_interceptors: usize,
    pub total_resolutions: u64,
    pub cache_hits: u64,
    pub failed_resolutions: u64,
}

/// The public container surface.
#[derive(Clone)]
pub struct ServiceContainer {
    name: String,
    registry: Arc<ServiceRegistry>,
    introspector: Arc<TypeIntrospector>,
    hooks: Arc<HookRegistry>,
    interceptors: Arc<InterceptorRegistry>,
    engine: Arc<ResolutionEngine>,
    // Guards against installing the provider setup hook twice for one type.
    provider_setups: Arc<Mutex<HashSet<TypeId>>>,
}

impl ServiceContainer {
    pub fn new(name: impl Into<String>) -> Self {
        ContainerBuilder::new().with_name(name).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record constructor metadata for `T`, making it autowirable and
    /// resolvable by its short type name without a registration.
    pub fn describe_type<T: Injectable>(&self) {
        self.introspector.register::<T>();
    }

    /// Register `T` under `id`. Overwrites any previous registration of the
    /// id; nothing is validated until resolution.
    pub fn register<T: Injectable>(&self, id: &str, singleton: bool) {
        self.describe_type::<T>();
        self.registry.insert(ServiceDescriptor::new(
            id,
            ServiceTarget::Type(TypeRef::of::<T>()),
            singleton,
        ));
    }

    /// Shorthand for a singleton registration; the id defaults to `T`'s
    /// short type name when not given (self-registration).
    pub fn register_singleton<T: Injectable>(&self, id: Option<&str>) {
        let type_ref = TypeRef::of::<T>();
        let id = id.unwrap_or_else(|| type_ref.short_name());
        self.register::<T>(id, true);
    }

    /// Register a closure factory under `id`. The factory may resolve its
    /// own dependencies through the context.
    pub fn register_factory<F>(&self, id: &str, singleton: bool, factory: F)
    where
        F: Fn(&mut ResolveCtx<'_>) -> anyhow::Result<BoxedInstance> + Send + Sync + 'static,
    {
        self.registry.insert(ServiceDescriptor::new(
            id,
            ServiceTarget::Factory(Arc::new(factory)),
            singleton,
        ));
    }

    /// Register a provider type under `id`. The provider itself is
    /// autowired; its `setup()` runs via the automatically installed setter
    /// hook before `provide()` produces the product instance.
    pub fn register_provider<P: Injectable + Provider>(&self, id: &str, singleton: bool) {
        self.describe_type::<P>();

        let type_id = TypeId::of::<P>();
        if self.provider_setups.lock().insert(type_id) {
            self.add_setter_hook_callback(TypeRef::of::<P>(), provider_setup_hook::<P>());
        }

        let cast: ProviderCast = Arc::new(|instance: BoxedInstance| {
            instance
                .downcast::<P>()
                .ok()
                .map(|provider| provider as Arc<dyn Provider>)
        });
        self.registry.insert(ServiceDescriptor::new(
            id,
            ServiceTarget::Provider {
                type_ref: TypeRef::of::<P>(),
                cast,
            },
            singleton,
        ));
    }

    /// Register an already constructed value as a singleton for `id`.
    pub fn register_instance<T: Any + Send + Sync>(&self, id: &str, value: T) {
        let shared: BoxedInstance = Arc::new(value);
        self.register_factory(id, true, move |_ctx| Ok(shared.clone()));
    }

    pub fn has(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    /// Resolve `id` to a type-erased instance.
    pub fn resolve(&self, id: &str) -> Result<BoxedInstance, DiError> {
        self.engine.resolve(id)
    }

    /// Resolve `id`, seeding the parameter bag a matching pre-resolution
    /// interceptor receives.
    pub fn resolve_with(
        &self,
        id: &str,
        bag: &mut ParameterBag,
    ) -> Result<BoxedInstance, DiError> {
        self.engine.resolve_with(id, bag)
    }

    /// Resolve `id` and downcast to `T`.
    pub fn resolve_as<T: Send + Sync + 'static>(&self, id: &str) -> Result<Arc<T>, DiError> {
        let instance = self.engine.resolve(id)?;
        downcast_instance(id, instance)
    }

    /// Like `resolve_as`, logging and swallowing the failure.
    pub fn try_resolve_as<T: Send + Sync + 'static>(&self, id: &str) -> Option<Arc<T>> {
        match self.resolve_as::<T>(id) {
            Ok(instance) => Some(instance),
            Err(err) => {
                debug!("failed to resolve '{}': {}", id, err);
                None
            }
        }
    }

    pub fn add_pre_resolution_interceptor<I>(&self, interceptor: I)
    where
        I: PreResolutionInterceptor + 'static,
    {
        self.interceptors.add_pre(Arc::new(interceptor));
    }

    pub fn add_post_resolution_interceptor<I>(&self, interceptor: I)
    where
        I: PostResolutionInterceptor + 'static,
    {
        self.interceptors.add_post(Arc::new(interceptor));
    }

    /// Attach a setter hook to `target` (a concrete type or a conformance
    /// tag). Runs immediately after construction, before caching.
    pub fn add_setter_hook<F>(&self, target: TypeRef, hook: F)
    where
        F: for<'a> Fn(BoxedInstance, Option<&'a ServiceDescriptor>) -> anyhow::Result<Option<BoxedInstance>>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.add_setter_hook(target, Arc::new(hook));
    }

    /// Attach a post-resolution hook to `target`. Runs after construction
    /// and setter hooks; may replace the returned instance.
    pub fn add_post_resolution_hook<F>(&self, target: TypeRef, hook: F)
    where
        F: for<'a> Fn(BoxedInstance, Option<&'a ServiceDescriptor>) -> anyhow::Result<Option<BoxedInstance>>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.add_post_resolution_hook(target, Arc::new(hook));
    }

    /// Attach a prebuilt hook body (see `lifecycle`) to `target`.
    pub fn add_setter_hook_callback(&self, target: TypeRef, hook: HookCallback) {
        self.hooks.add_setter_hook(target, hook);
    }

    pub fn add_post_resolution_hook_callback(&self, target: TypeRef, hook: HookCallback) {
        self.hooks.add_post_resolution_hook(target, hook);
    }

    /// Install the standard validation hook for `T`: after resolution,
    /// `T::validate` runs and failures propagate as validation errors.
    pub fn install_validation_hook<T: Validatable + Any + Send + Sync>(&self) {
        self.add_post_resolution_hook_callback(TypeRef::of::<T>(), validation_hook::<T>());
    }

    /// Install the standard init hook for `T`: after resolution and
    /// validation hooks registered earlier, `T::init` runs once per
    /// resolved instance.
    pub fn install_init_hook<T: Initializable + Any + Send + Sync>(&self) {
        self.add_post_resolution_hook_callback(TypeRef::of::<T>(), init_hook::<T>());
    }

    pub fn stats(&self) -> ContainerStats {
        ContainerStats {
            name: self.name.clone(),
            registered_services: self.registry.len(),
            described_types: self.introspector.described_count(),
            cached_singletons: self.engine.cached_singleton_count(),
            setter_hooks: self.hooks.count(HookPhase::Setter),
            post_resolution_hooks: self.hooks.count(HookPhase::PostResolution),
            pre_interceptors: self.interceptors.pre_count(),
            post_interceptors: self.interceptors.post_count(),
            total_resolutions: self.engine.total_resolutions(),
            cache_hits: self.engine.cache_hits(),
            failed_resolutions: self.engine.failed_resolutions(),
        }
    }

    /// Drop every registration, hook, interceptor, cached singleton and
    /// counter. Mainly for tests and full re-wiring.
    pub fn clear(&self) {
        self.registry.clear();
        self.introspector.clear();
        self.hooks.clear();
        self.interceptors.clear();
        self.engine.clear();
        self.provider_setups.lock().clear();
        debug!("container '{}' cleared", self.name);
    }
}

impl Default for ServiceContainer {
    fn default() -> Self {
        ContainerBuilder::new().build()
    }
}

/// Builder for a [`ServiceContainer`].
pub struct ContainerBuilder {
    name: String,
    warn_on_overwrite: bool,
    deferred_hooks: Vec<Box<dyn FnOnce(&ServiceContainer)>>,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            warn_on_overwrite: true,
            deferred_hooks: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Whether re-registering an id logs a warning (it always succeeds).
    pub fn warn_on_overwrite(mut self, warn: bool) -> Self {
        self.warn_on_overwrite = warn;
        self
    }

    /// Queue the standard validation and init post-resolution hooks for `T`;
    /// they are installed when `build` runs.
    pub fn with_standard_lifecycle_hooks<T>(mut self) -> Self
    where
        T: Validatable + Initializable + Any + Send + Sync,
    {
        self.deferred_hooks.push(Box::new(|container| {
            container.install_validation_hook::<T>();
            container.install_init_hook::<T>();
        }));
        self
    }

    pub fn build(self) -> ServiceContainer {
        let registry = Arc::new(ServiceRegistry::new(self.warn_on_overwrite));
        let introspector = Arc::new(TypeIntrospector::new());
        let hooks = Arc::new(HookRegistry::new());
        let interceptors = Arc::new(InterceptorRegistry::new());
        let engine = Arc::new(ResolutionEngine::new(
            registry.clone(),
            introspector.clone(),
            hooks.clone(),
            interceptors.clone(),
        ));

        debug!("built container '{}'", self.name);
        let container = ServiceContainer {
            name: self.name,
            registry,
            introspector,
            hooks,
            interceptors,
            engine,
            provider_setups: Arc::new(Mutex::new(HashSet::new())),
        };
        for install in self.deferred_hooks {
            install(&container);
        }
        container
    }
}

impl Default for ContainerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::ResolvedArgs;
    use crate::metadata::ParamSpec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Config {
        retries: u32,
    }

    impl Injectable for Config {
        fn construct(_args: &mut ResolvedArgs) -> anyhow::Result<Self> {
            Ok(Self { retries: 3 })
        }
    }

    #[derive(Debug)]
    struct Client {
        config: Arc<Config>,
    }

    impl Injectable for Client {
        fn dependencies() -> Vec<ParamSpec> {
            vec![ParamSpec::required::<Config>()]
        }

        fn construct(args: &mut ResolvedArgs) -> anyhow::Result<Self> {
            Ok(Self {
                config: args.take::<Config>()?,
            })
        }
    }

    struct Session {
        inits: AtomicUsize,
        valid: bool,
    }

    impl Injectable for Session {
        fn construct(_args: &mut ResolvedArgs) -> anyhow::Result<Self> {
            Ok(Self {
                inits: AtomicUsize::new(0),
                valid: true,
            })
        }
    }

    impl Validatable for Session {
        fn validate(&self) -> anyhow::Result<()> {
            if self.valid {
                Ok(())
            } else {
                Err(anyhow::anyhow!("session invalid"))
            }
        }
    }

    impl Initializable for Session {
        fn init(&self) -> anyhow::Result<()> {
            self.inits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_builder_sets_name() {
        let container = ContainerBuilder::new()
            .with_name("api")
            .warn_on_overwrite(false)
            .build();
        assert_eq!(container.name(), "api");
    }

    #[test]
    fn test_builder_installs_standard_lifecycle_hooks() {
        let container = ContainerBuilder::new()
            .with_name("lifecycle")
            .with_standard_lifecycle_hooks::<Session>()
            .build();
        assert_eq!(container.stats().post_resolution_hooks, 2);

        container.register::<Session>("session", false);
        let session = container.resolve_as::<Session>("session").expect("session");
        assert_eq!(session.inits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prebuilt_hook_body_attaches_as_setter() {
        let container = ServiceContainer::new("test");
        container.register::<Session>("session", false);
        container.add_setter_hook_callback(TypeRef::of::<Session>(), init_hook::<Session>());

        let session = container.resolve_as::<Session>("session").expect("session");
        assert_eq!(session.inits.load(Ordering::SeqCst), 1);
        assert_eq!(container.stats().setter_hooks, 1);
    }

    #[test]
    fn test_register_and_resolve_as() {
        let container = ServiceContainer::new("test");
        container.register::<Config>("Config", false);
        container.register::<Client>("client", false);

        let client = container.resolve_as::<Client>("client").expect("client");
        assert_eq!(client.config.retries, 3);
    }

    #[test]
    fn test_register_singleton_defaults_to_short_name() {
        let container = ServiceContainer::new("test");
        container.register_singleton::<Config>(None);

        assert!(container.has("Config"));
        let a = container.resolve_as::<Config>("Config").expect("first");
        let b = container.resolve_as::<Config>("Config").expect("second");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_register_instance_shares_value() {
        let container = ServiceContainer::new("test");
        container.register_instance("Config", Config { retries: 9 });

        let a = container.resolve_as::<Config>("Config").expect("first");
        let b = container.resolve_as::<Config>("Config").expect("second");
        assert_eq!(a.retries, 9);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_try_resolve_swallows_failure() {
        let container = ServiceContainer::new("test");
        assert!(container.try_resolve_as::<Config>("missing").is_none());
    }

    #[test]
    fn test_resolve_as_rejects_wrong_type() {
        let container = ServiceContainer::new("test");
        container.register::<Config>("Config", false);

        let err = container
            .resolve_as::<Client>("Config")
            .expect_err("wrong type");
        assert_eq!(err.category(), "construction");
    }

    #[test]
    fn test_clone_shares_state() {
        let container = ServiceContainer::new("shared");
        let clone = container.clone();

        container.register_singleton::<Config>(None);
        assert!(clone.has("Config"));

        let a = container.resolve_as::<Config>("Config").expect("original");
        let b = clone.resolve_as::<Config>("Config").expect("clone");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_stats_and_clear() {
        let container = ServiceContainer::new("stats");
        container.register_singleton::<Config>(None);
        container.resolve("Config").expect("resolve");
        container.resolve("Config").expect("cached resolve");

        let stats = container.stats();
        assert_eq!(stats.name, "stats");
        assert_eq!(stats.registered_services, 1);
        assert_eq!(stats.cached_singletons, 1);
        assert_eq!(stats.total_resolutions, 2);
        assert_eq!(stats.cache_hits, 1);

        container.clear();
        let stats = container.stats();
        assert_eq!(stats.registered_services, 0);
        assert_eq!(stats.cached_singletons, 0);
        assert_eq!(stats.total_resolutions, 0);
        assert!(!container.has("Config"));
    }
}
