//! Lifecycle hooks: per-target-type callbacks run around construction.
//!
//! Two phases exist. Setter hooks run immediately after construction, before
//! caching (provider setup lives here). Post-resolution hooks run after the
//! final product exists and may validate, initialize or replace it. Within a
//! phase hooks run in registration order; lookup has no side effects.

use std::any::TypeId;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::descriptor::ServiceDescriptor;
use crate::instance::BoxedInstance;
use crate::metadata::TypeRef;

/// Point in the resolution flow a hook is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// Right after construction, before caching and post-resolution.
    Setter,
    /// After construction and setter hooks; may transform the result.
    PostResolution,
}

/// Hook body. `Ok(None)` keeps the current instance, `Ok(Some(x))` replaces
/// it. The descriptor is present when the id was resolved through one.
pub type HookCallback = Arc<
    dyn for<'a> Fn(BoxedInstance, Option<&'a ServiceDescriptor>) -> anyhow::Result<Option<BoxedInstance>>
        + Send
        + Sync,
>;

struct HookEntry {
    target: TypeRef,
    callback: HookCallback,
}

impl HookEntry {
    fn matches(&self, type_id: TypeId, conforms: &[TypeId]) -> bool {
        self.target.type_id() == type_id || conforms.contains(&self.target.type_id())
    }
}

/// Ordered hook tables, partitioned by phase.
#[derive(Default)]
pub struct HookRegistry {
    setter: RwLock<Vec<HookEntry>>,
    post: RwLock<Vec<HookEntry>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_setter_hook(&self, target: TypeRef, callback: HookCallback) {
        debug!("added setter hook for {}", target.name());
        self.setter.write().push(HookEntry { target, callback });
    }

    pub fn add_post_resolution_hook(&self, target: TypeRef, callback: HookCallback) {
        debug!("added post-resolution hook for {}", target.name());
        self.post.write().push(HookEntry { target, callback });
    }

    /// Callbacks applying to an instance of `type_id` (or conforming to one
    /// of its declared tags), in registration order.
    pub fn hooks_for(
        &self,
        type_id: TypeId,
        conforms: &[TypeId],
        phase: HookPhase,
    ) -> Vec<HookCallback> {
        let table = match phase {
            HookPhase::Setter => &self.setter,
            HookPhase::PostResolution => &self.post,
        };
        table
            .read()
            .iter()
            .filter(|entry| entry.matches(type_id, conforms))
            .map(|entry| entry.callback.clone())
            .collect()
    }

    pub fn count(&self, phase: HookPhase) -> usize {
        match phase {
            HookPhase::Setter => self.setter.read().len(),
            HookPhase::PostResolution => self.post.read().len(),
        }
    }

    pub fn clear(&self) {
        self.setter.write().clear();
        self.post.write().clear();
        debug!("hook registry cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Widget;
    trait Auditable: Send + Sync {}

    fn counting_hook(counter: Arc<AtomicUsize>) -> HookCallback {
        Arc::new(move |_instance, _descriptor| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        })
    }

    #[test]
    fn test_exact_match_lookup() {
        let registry = HookRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.add_setter_hook(TypeRef::of::<Widget>(), counting_hook(counter));

        let hooks = registry.hooks_for(TypeId::of::<Widget>(), &[], HookPhase::Setter);
        assert_eq!(hooks.len(), 1);

        let none = registry.hooks_for(TypeId::of::<u32>(), &[], HookPhase::Setter);
        assert!(none.is_empty());
    }

    #[test]
    fn test_conformance_match_lookup() {
        let registry = HookRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.add_post_resolution_hook(TypeRef::of::<dyn Auditable>(), counting_hook(counter));

        let conforms = vec![TypeId::of::<dyn Auditable>()];
        let hooks = registry.hooks_for(TypeId::of::<Widget>(), &conforms, HookPhase::PostResolution);
        assert_eq!(hooks.len(), 1);

        let without_tag = registry.hooks_for(TypeId::of::<Widget>(), &[], HookPhase::PostResolution);
        assert!(without_tag.is_empty());
    }

    #[test]
    fn test_phases_are_partitioned() {
        let registry = HookRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.add_setter_hook(TypeRef::of::<Widget>(), counting_hook(counter.clone()));
        registry.add_post_resolution_hook(TypeRef::of::<Widget>(), counting_hook(counter));

        assert_eq!(registry.count(HookPhase::Setter), 1);
        assert_eq!(registry.count(HookPhase::PostResolution), 1);
        assert_eq!(
            registry
                .hooks_for(TypeId::of::<Widget>(), &[], HookPhase::Setter)
                .len(),
            1
        );
    }

    #[test]
    fn test_registration_order_preserved() {
        let registry = HookRegistry::new();
        let order = Arc::new(RwLock::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            registry.add_setter_hook(
                TypeRef::of::<Widget>(),
                Arc::new(move |instance, _| {
                    order.write().push(tag);
                    Ok(Some(instance))
                }),
            );
        }

        let hooks = registry.hooks_for(TypeId::of::<Widget>(), &[], HookPhase::Setter);
        let instance: BoxedInstance = Arc::new(Widget);
        for hook in hooks {
            hook(instance.clone(), None).expect("hook runs");
        }
        assert_eq!(*order.read(), vec!["first", "second", "third"]);
    }
}
