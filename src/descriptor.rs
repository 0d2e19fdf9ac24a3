//! Service descriptors and the id-keyed registry.
//!
//! A descriptor is created at registration and read-only afterwards;
//! re-registering the same id replaces the whole record (last write wins).
//! Nothing is validated at registration time: constructibility is checked at
//! resolution so late-bound types can be described after registration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::engine::ResolveCtx;
use crate::instance::BoxedInstance;
use crate::lifecycle::Provider;
use crate::metadata::TypeRef;

/// Closure factory registered for an id. Receives a resolution context so it
/// can resolve its own dependencies on the same stack (cycles through
/// factories are still caught).
pub type FactoryFn =
    Arc<dyn Fn(&mut ResolveCtx<'_>) -> anyhow::Result<BoxedInstance> + Send + Sync>;

/// Registration-time captured coercion from a constructed provider instance
/// to its `dyn Provider` handle.
pub(crate) type ProviderCast =
    Arc<dyn Fn(BoxedInstance) -> Option<Arc<dyn Provider>> + Send + Sync>;

/// What the engine builds when a descriptor's id is resolved.
#[derive(Clone)]
pub enum ServiceTarget {
    /// Autowire the implementation type.
    Type(TypeRef),
    /// Autowire the provider type, run its setter hooks, then ask it for the
    /// product instance.
    Provider {
        type_ref: TypeRef,
        cast: ProviderCast,
    },
    /// Invoke a plain closure factory.
    Factory(FactoryFn),
}

impl ServiceTarget {
    /// The implementation type token, when the target carries one.
    pub fn type_ref(&self) -> Option<TypeRef> {
        match self {
            ServiceTarget::Type(type_ref) => Some(*type_ref),
            ServiceTarget::Provider { type_ref, .. } => Some(*type_ref),
            ServiceTarget::Factory(_) => None,
        }
    }
}

impl fmt::Debug for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceTarget::Type(type_ref) => f.debug_tuple("Type").field(&type_ref.name()).finish(),
            ServiceTarget::Provider { type_ref, .. } => f
                .debug_struct("Provider")
                .field("type", &type_ref.name())
                .finish(),
            ServiceTarget::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Immutable metadata record for one registered id.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    id: String,
    target: ServiceTarget,
    singleton: bool,
}

impl ServiceDescriptor {
    pub fn new(id: impl Into<String>, target: ServiceTarget, singleton: bool) -> Self {
        Self {
            id: id.into(),
            target,
            singleton,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &ServiceTarget {
        &self.target
    }

    pub fn is_singleton(&self) -> bool {
        self.singleton
    }
}

/// Id-keyed descriptor table. Owned exclusively by the container; shared
/// read-mostly with the engine.
pub struct ServiceRegistry {
    descriptors: RwLock<HashMap<String, ServiceDescriptor>>,
    warn_on_overwrite: bool,
}

impl ServiceRegistry {
    pub fn new(warn_on_overwrite: bool) -> Self {
        Self {
            descriptors: RwLock::new(HashMap::new()),
            warn_on_overwrite,
        }
    }

    /// Store a descriptor, replacing any previous registration of the id.
    pub fn insert(&self, descriptor: ServiceDescriptor) {
        let mut descriptors = self.descriptors.write();
        if descriptors.contains_key(descriptor.id()) && self.warn_on_overwrite {
            warn!(
                "service '{}' is already registered, overwriting",
                descriptor.id()
            );
        }
        debug!(
            "registered '{}' as {:?} (singleton: {})",
            descriptor.id(),
            descriptor.target(),
            descriptor.is_singleton()
        );
        descriptors.insert(descriptor.id().to_string(), descriptor);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.descriptors.read().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<ServiceDescriptor> {
        self.descriptors.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.descriptors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.read().is_empty()
    }

    pub fn clear(&self) {
        self.descriptors.write().clear();
        debug!("service registry cleared");
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    #[test]
    fn test_last_registration_wins() {
        let registry = ServiceRegistry::default();
        registry.insert(ServiceDescriptor::new(
            "svc",
            ServiceTarget::Type(TypeRef::of::<Alpha>()),
            false,
        ));
        registry.insert(ServiceDescriptor::new(
            "svc",
            ServiceTarget::Type(TypeRef::of::<Beta>()),
            true,
        ));

        let descriptor = registry.get("svc").expect("descriptor");
        assert!(descriptor.is_singleton());
        assert_eq!(
            descriptor.target().type_ref().map(|t| t.short_name()),
            Some("Beta")
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_contains_and_clear() {
        let registry = ServiceRegistry::default();
        assert!(!registry.contains("svc"));

        registry.insert(ServiceDescriptor::new(
            "svc",
            ServiceTarget::Type(TypeRef::of::<Alpha>()),
            false,
        ));
        assert!(registry.contains("svc"));

        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_factory_target_has_no_type_ref() {
        let target = ServiceTarget::Factory(Arc::new(|_ctx| {
            Ok(Arc::new(Alpha) as BoxedInstance)
        }));
        assert!(target.type_ref().is_none());
        assert_eq!(format!("{target:?}"), "Factory(..)");
    }
}
