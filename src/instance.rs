//! Type-erased instance handles and the argument carriers used by
//! constructors and pre-resolution interceptors.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{anyhow, Result};

/// A resolved service instance, shared and type-erased.
pub type BoxedInstance = Arc<dyn Any + Send + Sync>;

/// Ordered constructor arguments, aligned with the declared parameter list.
///
/// The engine fills one slot per [`crate::metadata::ParamSpec`], in order.
/// A slot is `None` only when the parameter was declared nullable and its
/// type could not be resolved.
pub struct ResolvedArgs {
    values: VecDeque<Option<BoxedInstance>>,
}

impl ResolvedArgs {
    pub(crate) fn new(values: Vec<Option<BoxedInstance>>) -> Self {
        Self {
            values: values.into(),
        }
    }

    /// Take the next argument, expecting it to be present and of type `T`.
    pub fn take<T: Any + Send + Sync>(&mut self) -> Result<Arc<T>> {
        match self.values.pop_front() {
            Some(Some(value)) => value.downcast::<T>().map_err(|_| {
                anyhow!(
                    "constructor argument type mismatch: expected {}",
                    std::any::type_name::<T>()
                )
            }),
            Some(None) => Err(anyhow!(
                "constructor argument of type {} was declared nullable and is absent; use take_optional",
                std::any::type_name::<T>()
            )),
            None => Err(anyhow!(
                "constructor requested more arguments than were declared"
            )),
        }
    }

    /// Take the next argument, which may be absent for nullable parameters.
    pub fn take_optional<T: Any + Send + Sync>(&mut self) -> Result<Option<Arc<T>>> {
        match self.values.pop_front() {
            Some(Some(value)) => value
                .downcast::<T>()
                .map(Some)
                .map_err(|_| {
                    anyhow!(
                        "constructor argument type mismatch: expected {}",
                        std::any::type_name::<T>()
                    )
                }),
            Some(None) => Ok(None),
            None => Err(anyhow!(
                "constructor requested more arguments than were declared"
            )),
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

/// Mutable key/value scratch space handed to pre-resolution interceptors.
///
/// Callers can seed it through `resolve_with` (route parameters, request
/// attributes); interceptors may read and extend it while deciding whether
/// to substitute construction.
#[derive(Default)]
pub struct ParameterBag {
    values: HashMap<String, BoxedInstance>,
}

impl ParameterBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: T) {
        self.values.insert(name.into(), Arc::new(value));
    }

    pub fn insert_instance(&mut self, name: impl Into<String>, value: BoxedInstance) {
        self.values.insert(name.into(), value);
    }

    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.values.get(name).cloned()?.downcast::<T>().ok()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_in_declared_order() {
        let mut args = ResolvedArgs::new(vec![
            Some(Arc::new(1u32) as BoxedInstance),
            Some(Arc::new("two".to_string()) as BoxedInstance),
        ]);

        let first = args.take::<u32>().expect("first argument");
        assert_eq!(*first, 1);
        let second = args.take::<String>().expect("second argument");
        assert_eq!(second.as_str(), "two");
        assert_eq!(args.remaining(), 0);
    }

    #[test]
    fn test_take_rejects_wrong_type() {
        let mut args = ResolvedArgs::new(vec![Some(Arc::new(1u32) as BoxedInstance)]);
        assert!(args.take::<String>().is_err());
    }

    #[test]
    fn test_take_optional_handles_absent_slot() {
        let mut args = ResolvedArgs::new(vec![None]);
        let value = args.take_optional::<u32>().expect("optional slot");
        assert!(value.is_none());
    }

    #[test]
    fn test_take_past_end_fails() {
        let mut args = ResolvedArgs::new(vec![]);
        assert!(args.take::<u32>().is_err());
    }

    #[test]
    fn test_parameter_bag_typed_access() {
        let mut bag = ParameterBag::new();
        bag.insert("user_id", 7u64);

        assert!(bag.contains("user_id"));
        assert_eq!(bag.get::<u64>("user_id").map(|v| *v), Some(7));
        assert!(bag.get::<String>("user_id").is_none());
        assert!(bag.get::<u64>("missing").is_none());
        assert_eq!(bag.len(), 1);
    }
}
