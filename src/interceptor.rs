//! Resolution interceptors: override points around construction.
//!
//! A pre-resolution interceptor can substitute an entirely different
//! construction strategy for a matching id (route-derived lookup, test stub
//! injection); a post-resolution interceptor can inspect or replace the
//! final instance. Only the first matching interceptor of each kind runs:
//! this is an override mechanism, deliberately not a pipeline.

use std::any::{Any, TypeId};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::instance::{BoxedInstance, ParameterBag};
use crate::metadata::TypeRef;

/// What a pre-resolution interceptor is asked about: the id being resolved
/// and its implementation type when a descriptor or described type names one.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionRequest<'a> {
    pub id: &'a str,
    pub type_ref: Option<TypeRef>,
}

/// Pre-resolution override. A non-`None` return from `intercept` replaces
/// construction entirely; autowiring and setter hooks are skipped.
///
/// `supports` must be pure: it is invoked during lookup and may run for
/// requests the interceptor never handles.
pub trait PreResolutionInterceptor: Send + Sync {
    fn supports(&self, request: &ResolutionRequest<'_>) -> bool;

    fn intercept(
        &self,
        request: &ResolutionRequest<'_>,
        params: &mut ParameterBag,
    ) -> anyhow::Result<Option<BoxedInstance>>;
}

/// Post-resolution override. Runs after construction and setter hooks, may
/// mutate or replace the instance. `supports` must be pure.
pub trait PostResolutionInterceptor: Send + Sync {
    fn supports(&self, instance: &(dyn Any + Send + Sync), conforms: &[TypeId]) -> bool;

    fn intercept(&self, instance: BoxedInstance) -> anyhow::Result<BoxedInstance>;
}

/// Ordered interceptor tables with first-match-wins lookup.
#[derive(Default)]
pub struct InterceptorRegistry {
    pre: RwLock<Vec<Arc<dyn PreResolutionInterceptor>>>,
    post: RwLock<Vec<Arc<dyn PostResolutionInterceptor>>>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pre(&self, interceptor: Arc<dyn PreResolutionInterceptor>) {
        self.pre.write().push(interceptor);
        debug!("added pre-resolution interceptor");
    }

    pub fn add_post(&self, interceptor: Arc<dyn PostResolutionInterceptor>) {
        self.post.write().push(interceptor);
        debug!("added post-resolution interceptor");
    }

    /// First pre-resolution interceptor supporting the request, scanning in
    /// registration order. The table is snapshotted before `supports` runs
    /// so interceptor code never executes under the registry lock.
    pub fn first_matching_pre(
        &self,
        request: &ResolutionRequest<'_>,
    ) -> Option<Arc<dyn PreResolutionInterceptor>> {
        let snapshot: Vec<_> = self.pre.read().clone();
        snapshot.into_iter().find(|i| i.supports(request))
    }

    /// First post-resolution interceptor supporting the instance.
    pub fn first_matching_post(
        &self,
        instance: &(dyn Any + Send + Sync),
        conforms: &[TypeId],
    ) -> Option<Arc<dyn PostResolutionInterceptor>> {
        let snapshot: Vec<_> = self.post.read().clone();
        snapshot.into_iter().find(|i| i.supports(instance, conforms))
    }

    pub fn pre_count(&self) -> usize {
        self.pre.read().len()
    }

    pub fn post_count(&self) -> usize {
        self.post.read().len()
    }

    pub fn clear(&self) {
        self.pre.write().clear();
        self.post.write().clear();
        debug!("interceptor registry cleared");
    }
}
