//! Constructor metadata: type tokens, declared parameter lists and the
//! introspector registry the autowiring engine reads from.
//!
//! Rust has no runtime constructor reflection, so constructor signatures are
//! declared once at registration time through [`Injectable`]. The declared
//! [`ParamSpec`] list is exactly what the engine must satisfy when autowiring
//! a type; a type with no recorded metadata cannot be autowired and fails
//! with an introspection error.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::DiError;
use crate::instance::{BoxedInstance, ResolvedArgs};

/// Lightweight runtime type token.
///
/// Works for sized types and for trait-object types, so hook targets can
/// name a capability (`TypeRef::of::<dyn Auditable>()`) as well as a
/// concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef {
    type_id: TypeId,
    name: &'static str,
}

impl TypeRef {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the type name; doubles as the default service id.
    pub fn short_name(&self) -> &'static str {
        self.name.rsplit("::").next().unwrap_or(self.name)
    }
}

type DefaultFn = Arc<dyn Fn() -> BoxedInstance + Send + Sync>;

/// One declared constructor parameter.
#[derive(Clone)]
pub struct ParamSpec {
    type_ref: TypeRef,
    default: Option<DefaultFn>,
    nullable: bool,
}

impl ParamSpec {
    /// Parameter that must resolve from the container.
    pub fn required<T: Any + Send + Sync>() -> Self {
        Self {
            type_ref: TypeRef::of::<T>(),
            default: None,
            nullable: false,
        }
    }

    /// Parameter with a fallback value, used only when the type is neither
    /// registered nor constructible.
    pub fn with_default<T, F>(default: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            type_ref: TypeRef::of::<T>(),
            default: Some(Arc::new(move || Arc::new(default()) as BoxedInstance)),
            nullable: false,
        }
    }

    /// Parameter that may be absent; the constructor must read it with
    /// `ResolvedArgs::take_optional`.
    pub fn nullable<T: Any + Send + Sync>() -> Self {
        Self {
            type_ref: TypeRef::of::<T>(),
            default: None,
            nullable: true,
        }
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub(crate) fn default_value(&self) -> Option<BoxedInstance> {
        self.default.as_ref().map(|f| f())
    }
}

impl std::fmt::Debug for ParamSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamSpec")
            .field("type", &self.type_ref.name())
            .field("has_default", &self.has_default())
            .field("nullable", &self.nullable)
            .finish()
    }
}

/// A type the container can construct.
///
/// `dependencies()` declares the ordered constructor signature and
/// `construct` consumes the resolved arguments in the same order. The two
/// must stay aligned; a mismatch surfaces as a construction error at
/// resolution time.
pub trait Injectable: Any + Send + Sync + Sized {
    /// Ordered constructor parameter declarations. Empty by default.
    fn dependencies() -> Vec<ParamSpec> {
        Vec::new()
    }

    /// Build an instance from the resolved argument list.
    fn construct(args: &mut ResolvedArgs) -> anyhow::Result<Self>;

    /// Declared type-membership tags, typically trait-object ids such as
    /// `TypeId::of::<dyn Auditable>()`. Hooks and interceptors registered
    /// for a tag apply to every type declaring it.
    fn conforms_to() -> Vec<TypeId> {
        Vec::new()
    }
}

type ConstructFn = Arc<dyn Fn(&mut ResolvedArgs) -> anyhow::Result<BoxedInstance> + Send + Sync>;

/// Erased per-type record: token, declared parameters, constructor and
/// conformance tags.
#[derive(Clone)]
pub struct TypeMetadata {
    type_ref: TypeRef,
    params: Vec<ParamSpec>,
    construct: ConstructFn,
    conforms: Vec<TypeId>,
}

impl TypeMetadata {
    fn describe<T: Injectable>() -> Self {
        Self {
            type_ref: TypeRef::of::<T>(),
            params: T::dependencies(),
            construct: Arc::new(|args| Ok(Arc::new(T::construct(args)?) as BoxedInstance)),
            conforms: T::conforms_to(),
        }
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn conforms(&self) -> &[TypeId] {
        &self.conforms
    }

    pub(crate) fn construct(&self, args: &mut ResolvedArgs) -> anyhow::Result<BoxedInstance> {
        (self.construct)(args)
    }
}

impl std::fmt::Debug for TypeMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeMetadata")
            .field("type", &self.type_ref.name())
            .field("params", &self.params)
            .finish()
    }
}

/// Registry of constructor metadata, indexed by `TypeId` and by short type
/// name so a bare id can name a constructible type.
#[derive(Default)]
pub struct TypeIntrospector {
    by_id: RwLock<HashMap<TypeId, TypeMetadata>>,
    by_name: RwLock<HashMap<String, TypeId>>,
}

impl TypeIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record constructor metadata for `T`. Re-describing a type replaces
    /// the previous record (last write wins, same as service registration).
    pub fn register<T: Injectable>(&self) {
        let metadata = TypeMetadata::describe::<T>();
        let type_ref = *metadata.type_ref();
        let param_count = metadata.params.len();

        self.by_id.write().insert(type_ref.type_id(), metadata);
        {
            let mut by_name = self.by_name.write();
            by_name.insert(type_ref.short_name().to_string(), type_ref.type_id());
            by_name.insert(type_ref.name().to_string(), type_ref.type_id());
        }

        debug!(
            "described constructor of {} ({} parameters)",
            type_ref.name(),
            param_count
        );
    }

    /// The declared constructor signature of a type.
    pub fn parameters_of(&self, type_ref: &TypeRef) -> Result<Vec<ParamSpec>, DiError> {
        self.by_id
            .read()
            .get(&type_ref.type_id())
            .map(|m| m.params.clone())
            .ok_or_else(|| {
                DiError::introspection(
                    type_ref.name(),
                    "no constructor metadata recorded; describe the type before autowiring it",
                )
            })
    }

    pub fn metadata(&self, type_id: TypeId) -> Option<TypeMetadata> {
        self.by_id.read().get(&type_id).cloned()
    }

    /// Look a type up by short or fully qualified name.
    pub fn metadata_by_name(&self, name: &str) -> Option<TypeMetadata> {
        let type_id = *self.by_name.read().get(name)?;
        self.metadata(type_id)
    }

    /// Conformance tags of a type; empty when the type was never described.
    pub fn conformance_of(&self, type_id: TypeId) -> Vec<TypeId> {
        self.by_id
            .read()
            .get(&type_id)
            .map(|m| m.conforms.clone())
            .unwrap_or_default()
    }

    pub fn described_count(&self) -> usize {
        self.by_id.read().len()
    }

    pub fn clear(&self) {
        self.by_id.write().clear();
        self.by_name.write().clear();
        debug!("type metadata cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Engine {
        cylinders: u8,
    }

    impl Injectable for Engine {
        fn construct(_args: &mut ResolvedArgs) -> anyhow::Result<Self> {
            Ok(Self { cylinders: 4 })
        }
    }

    struct Car {
        engine: Arc<Engine>,
    }

    impl Injectable for Car {
        fn dependencies() -> Vec<ParamSpec> {
            vec![ParamSpec::required::<Engine>()]
        }

        fn construct(args: &mut ResolvedArgs) -> anyhow::Result<Self> {
            Ok(Self {
                engine: args.take::<Engine>()?,
            })
        }
    }

    #[test]
    fn test_short_name_strips_module_path() {
        let type_ref = TypeRef::of::<Car>();
        assert_eq!(type_ref.short_name(), "Car");
        assert!(type_ref.name().contains("metadata::tests::Car"));
    }

    #[test]
    fn test_parameters_of_described_type() {
        let introspector = TypeIntrospector::new();
        introspector.register::<Car>();

        let params = introspector
            .parameters_of(&TypeRef::of::<Car>())
            .expect("described type");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].type_ref().short_name(), "Engine");
        assert!(!params[0].has_default());
    }

    #[test]
    fn test_parameters_of_unknown_type_fails() {
        let introspector = TypeIntrospector::new();
        let err = introspector
            .parameters_of(&TypeRef::of::<Engine>())
            .expect_err("never described");
        assert_eq!(err.category(), "introspection");
    }

    #[test]
    fn test_lookup_by_short_and_full_name() {
        let introspector = TypeIntrospector::new();
        introspector.register::<Engine>();

        assert!(introspector.metadata_by_name("Engine").is_some());
        assert!(introspector
            .metadata_by_name(std::any::type_name::<Engine>())
            .is_some());
        assert!(introspector.metadata_by_name("Gearbox").is_none());
    }

    #[test]
    fn test_erased_constructor_builds_instance() {
        let introspector = TypeIntrospector::new();
        introspector.register::<Engine>();

        let metadata = introspector
            .metadata(TypeId::of::<Engine>())
            .expect("metadata");
        let mut args = ResolvedArgs::new(vec![]);
        let instance = metadata.construct(&mut args).expect("construct");
        let engine = instance.downcast::<Engine>().ok().expect("downcast");
        assert_eq!(engine.cylinders, 4);
    }

    #[test]
    fn test_default_value_is_fresh_per_call() {
        let param = ParamSpec::with_default::<u32, _>(|| 9);
        let a = param.default_value().expect("default");
        let b = param.default_value().expect("default");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
