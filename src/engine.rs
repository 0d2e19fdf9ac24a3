//! The resolution engine: descriptor lookup, interceptor short-circuit,
//! autowiring, hook application, singleton caching and cycle detection.
//!
//! Resolution is synchronous and performs no local recovery: any failure
//! aborts the whole top-level call with one typed error. The resolution
//! stack is scoped to a single top-level `resolve` invocation and is popped
//! on every exit path, so a failed call never poisons the next one.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::descriptor::{ServiceDescriptor, ServiceRegistry, ServiceTarget};
use crate::error::DiError;
use crate::hooks::{HookPhase, HookRegistry};
use crate::instance::{BoxedInstance, ParameterBag, ResolvedArgs};
use crate::interceptor::{InterceptorRegistry, ResolutionRequest};
use crate::metadata::{TypeIntrospector, TypeMetadata, TypeRef};

/// Ids currently mid-resolution, used for cycle detection. One stack exists
/// per top-level resolve call; it is never shared between calls.
#[derive(Debug, Default)]
pub struct ResolutionStack {
    ids: Vec<String>,
}

impl ResolutionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|entry| entry == id)
    }

    pub fn push(&mut self, id: String) {
        self.ids.push(id);
    }

    pub fn pop(&mut self) {
        self.ids.pop();
    }

    pub fn depth(&self) -> usize {
        self.ids.len()
    }

    /// The cycle that closes at `id`: everything from its first occurrence
    /// to the top of the stack, plus `id` again.
    fn cycle_path(&self, id: &str) -> Vec<String> {
        let start = self
            .ids
            .iter()
            .position(|entry| entry == id)
            .unwrap_or(0);
        let mut path: Vec<String> = self.ids[start..].to_vec();
        path.push(id.to_string());
        path
    }
}

/// Per-resolution context handed to factories and providers so nested
/// resolutions share the caller's stack and cycles stay visible.
pub struct ResolveCtx<'a> {
    engine: &'a ResolutionEngine,
    stack: &'a mut ResolutionStack,
    current: String,
}

impl ResolveCtx<'_> {
    pub fn resolve(&mut self, id: &str) -> Result<BoxedInstance, DiError> {
        let requested_by = self.current.clone();
        self.engine
            .resolve_inner(id, Some(&requested_by), self.stack, None)
    }

    pub fn resolve_as<T: Send + Sync + 'static>(&mut self, id: &str) -> Result<Arc<T>, DiError> {
        let instance = self.resolve(id)?;
        downcast_instance(id, instance)
    }

    /// The id whose construction is currently in progress.
    pub fn current_id(&self) -> &str {
        &self.current
    }
}

pub(crate) fn downcast_instance<T: Send + Sync + 'static>(
    id: &str,
    instance: BoxedInstance,
) -> Result<Arc<T>, DiError> {
    instance.downcast::<T>().map_err(|_| {
        DiError::construction(
            id,
            anyhow::anyhow!(
                "resolved instance for '{}' is not of type {}",
                id,
                std::any::type_name::<T>()
            ),
        )
    })
}

#[derive(Debug, Default)]
struct EngineMetrics {
    resolutions: AtomicU64,
    cache_hits: AtomicU64,
    failed: AtomicU64,
}

impl EngineMetrics {
    fn reset(&self) {
        self.resolutions.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
    }
}

/// Orchestrates the full resolve algorithm over the shared registries.
pub struct ResolutionEngine {
    registry: Arc<ServiceRegistry>,
    introspector: Arc<TypeIntrospector>,
    hooks: Arc<HookRegistry>,
    interceptors: Arc<InterceptorRegistry>,
    singletons: RwLock<HashMap<String, BoxedInstance>>,
    metrics: EngineMetrics,
}

impl ResolutionEngine {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        introspector: Arc<TypeIntrospector>,
        hooks: Arc<HookRegistry>,
        interceptors: Arc<InterceptorRegistry>,
    ) -> Self {
        Self {
            registry,
            introspector,
            hooks,
            interceptors,
            singletons: RwLock::new(HashMap::new()),
            metrics: EngineMetrics::default(),
        }
    }

    /// Resolve `id` with a fresh resolution stack and empty parameter bag.
    pub fn resolve(&self, id: &str) -> Result<BoxedInstance, DiError> {
        let mut bag = ParameterBag::new();
        self.resolve_with(id, &mut bag)
    }

    /// Resolve `id`, seeding the parameter bag seen by a matching
    /// pre-resolution interceptor of the top-level id.
    pub fn resolve_with(&self, id: &str, bag: &mut ParameterBag) -> Result<BoxedInstance, DiError> {
        self.metrics.resolutions.fetch_add(1, Ordering::Relaxed);
        let mut stack = ResolutionStack::new();
        let result = self.resolve_inner(id, None, &mut stack, Some(bag));
        debug_assert_eq!(stack.depth(), 0);
        if let Err(err) = &result {
            self.metrics.failed.fetch_add(1, Ordering::Relaxed);
            warn!("resolution of '{}' failed: {} [{}]", id, err, err.category());
        }
        result
    }

    fn resolve_inner(
        &self,
        id: &str,
        requested_by: Option<&str>,
        stack: &mut ResolutionStack,
        seed: Option<&mut ParameterBag>,
    ) -> Result<BoxedInstance, DiError> {
        if let Some(cached) = self.singletons.read().get(id) {
            self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("singleton cache hit for '{}'", id);
            return Ok(cached.clone());
        }

        if stack.contains(id) {
            let cycle = stack.cycle_path(id);
            return Err(DiError::CircularDependency { cycle });
        }

        stack.push(id.to_string());
        let result = self.resolve_pushed(id, requested_by, stack, seed);
        stack.pop();
        result
    }

    fn resolve_pushed(
        &self,
        id: &str,
        requested_by: Option<&str>,
        stack: &mut ResolutionStack,
        seed: Option<&mut ParameterBag>,
    ) -> Result<BoxedInstance, DiError> {
        let descriptor = self.registry.get(id);
        let type_ref = descriptor
            .as_ref()
            .and_then(|d| d.target().type_ref())
            .or_else(|| {
                self.introspector
                    .metadata_by_name(id)
                    .map(|m| *m.type_ref())
            });

        let request = ResolutionRequest { id, type_ref };
        let mut short_circuit = None;
        if let Some(interceptor) = self.interceptors.first_matching_pre(&request) {
            let mut local_bag = ParameterBag::new();
            let bag = match seed {
                Some(seeded) => seeded,
                None => &mut local_bag,
            };
            if let Some(instance) = interceptor
                .intercept(&request, bag)
                .map_err(|e| DiError::from_extension_failure(id, e))?
            {
                debug!("pre-resolution interceptor short-circuited '{}'", id);
                short_circuit = Some(instance);
            }
        }

        let instance = match short_circuit {
            // Externally constructed: autowiring and setter hooks are skipped.
            Some(instance) => instance,
            None => self.build(id, descriptor.as_ref(), requested_by, stack)?,
        };

        let instance = self.apply_post_resolution(id, instance, descriptor.as_ref())?;

        let singleton = descriptor.as_ref().map(|d| d.is_singleton()).unwrap_or(false);
        if singleton {
            self.singletons
                .write()
                .insert(id.to_string(), instance.clone());
            debug!("cached singleton '{}'", id);
        }

        Ok(instance)
    }

    fn build(
        &self,
        id: &str,
        descriptor: Option<&ServiceDescriptor>,
        requested_by: Option<&str>,
        stack: &mut ResolutionStack,
    ) -> Result<BoxedInstance, DiError> {
        match descriptor.map(|d| d.target()) {
            Some(ServiceTarget::Factory(factory)) => {
                let factory = factory.clone();
                let mut ctx = ResolveCtx {
                    engine: self,
                    stack,
                    current: id.to_string(),
                };
                let product = factory(&mut ctx).map_err(|e| DiError::from_extension_failure(id, e))?;
                self.apply_hooks(id, product, HookPhase::Setter, descriptor)
            }
            Some(ServiceTarget::Provider { type_ref, cast }) => {
                let provider_instance = self.autowire_type(type_ref, id, stack)?;
                let provider_instance =
                    self.apply_hooks(id, provider_instance, HookPhase::Setter, descriptor)?;
                let provider = cast(provider_instance).ok_or_else(|| {
                    DiError::construction(
                        id,
                        anyhow::anyhow!(
                            "instance registered as provider for '{}' does not implement Provider",
                            id
                        ),
                    )
                })?;
                let mut ctx = ResolveCtx {
                    engine: self,
                    stack,
                    current: id.to_string(),
                };
                provider
                    .provide(&mut ctx)
                    .map_err(|e| DiError::from_extension_failure(id, e))
            }
            Some(ServiceTarget::Type(type_ref)) => {
                let instance = self.autowire_type(type_ref, id, stack)?;
                self.apply_hooks(id, instance, HookPhase::Setter, descriptor)
            }
            None => {
                // No descriptor: the id itself may name a constructible type.
                let metadata = self.introspector.metadata_by_name(id).ok_or_else(|| {
                    DiError::not_found(id, requested_by.unwrap_or("<root>"))
                })?;
                let instance = self.autowire(&metadata, id, stack)?;
                self.apply_hooks(id, instance, HookPhase::Setter, None)
            }
        }
    }

    fn autowire_type(
        &self,
        type_ref: &TypeRef,
        id: &str,
        stack: &mut ResolutionStack,
    ) -> Result<BoxedInstance, DiError> {
        let metadata = self.introspector.metadata(type_ref.type_id()).ok_or_else(|| {
            DiError::introspection(
                type_ref.name(),
                "no constructor metadata recorded; describe the type before autowiring it",
            )
        })?;
        self.autowire(&metadata, id, stack)
    }

    /// Resolve each declared parameter recursively on the shared stack, then
    /// run the erased constructor. A declared default is substituted only
    /// when the parameter type itself is neither registered nor
    /// constructible; a `NotFound` raised deeper in the graph names a real
    /// mis-registration and propagates instead.
    fn autowire(
        &self,
        metadata: &TypeMetadata,
        id: &str,
        stack: &mut ResolutionStack,
    ) -> Result<BoxedInstance, DiError> {
        let mut values = Vec::with_capacity(metadata.params().len());
        for param in metadata.params() {
            let dep_id = param.type_ref().short_name();
            let value = match self.resolve_inner(dep_id, Some(id), stack, None) {
                Ok(instance) => Some(instance),
                Err(err @ DiError::NotFound { .. })
                    if matches!(&err, DiError::NotFound { id: missing, .. } if missing == dep_id) =>
                {
                    if let Some(default) = param.default_value() {
                        debug!("using declared default for parameter {}", dep_id);
                        Some(default)
                    } else if param.is_nullable() {
                        None
                    } else {
                        return Err(err);
                    }
                }
                Err(other) => return Err(other),
            };
            values.push(value);
        }

        let mut args = ResolvedArgs::new(values);
        let instance = metadata
            .construct(&mut args)
            .map_err(|e| DiError::from_extension_failure(id, e))?;
        debug!("autowired '{}' as {}", id, metadata.type_ref().name());
        Ok(instance)
    }

    fn apply_hooks(
        &self,
        id: &str,
        instance: BoxedInstance,
        phase: HookPhase,
        descriptor: Option<&ServiceDescriptor>,
    ) -> Result<BoxedInstance, DiError> {
        let type_id = instance.as_ref().type_id();
        let conforms = self.introspector.conformance_of(type_id);
        let mut current = instance;
        for hook in self.hooks.hooks_for(type_id, &conforms, phase) {
            if let Some(replacement) = hook(current.clone(), descriptor)
                .map_err(|e| DiError::from_extension_failure(id, e))?
            {
                current = replacement;
            }
        }
        Ok(current)
    }

    /// Step 7: first matching post-resolution interceptor (override, not a
    /// pipeline), then every matching post-resolution hook in order.
    fn apply_post_resolution(
        &self,
        id: &str,
        instance: BoxedInstance,
        descriptor: Option<&ServiceDescriptor>,
    ) -> Result<BoxedInstance, DiError> {
        let type_id = instance.as_ref().type_id();
        let conforms = self.introspector.conformance_of(type_id);

        let mut current = instance;
        if let Some(interceptor) = self
            .interceptors
            .first_matching_post(current.as_ref(), &conforms)
        {
            current = interceptor
                .intercept(current)
                .map_err(|e| DiError::from_extension_failure(id, e))?;
        }

        self.apply_hooks(id, current, HookPhase::PostResolution, descriptor)
    }

    pub fn cached_singleton_count(&self) -> usize {
        self.singletons.read().len()
    }

    pub fn total_resolutions(&self) -> u64 {
        self.metrics.resolutions.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.metrics.cache_hits.load(Ordering::Relaxed)
    }

    pub fn failed_resolutions(&self) -> u64 {
        self.metrics.failed.load(Ordering::Relaxed)
    }

    /// Drop all cached singletons and reset counters.
    pub fn clear(&self) {
        self.singletons.write().clear();
        self.metrics.reset();
        debug!("singleton cache cleared");
    }
}
