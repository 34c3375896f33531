//! Core, mostly non-public data structures shared by the factory.

use crate::error::FactoryError;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Boxed error returned by user supplied constructors, hooks and producers.
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// The universal "any object" type. Selecting it matches every registration.
pub type AnyObject = dyn Any + Send + Sync;

/// A live, type-erased object holding the concrete implementation value.
pub type Object = Arc<AnyObject>;

/// A resolved injection value: a boxed `Arc<D>` or `Instance<D>`.
pub(crate) type Resolved = Box<dyn Any + Send + Sync>;

thread_local! {
  // Ids of the object instances currently being created on this thread.
  static RESOLVING_STACK: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// An RAII guard detecting dependency cycles during creation.
///
/// Entering adds the object instance id to the thread-local stack. If the id
/// is already present the same registration is being created re-entrantly,
/// which is reported as [`FactoryError::Circular`]. Dropping the guard removes
/// the id again.
pub(crate) struct ResolutionGuard {
  id: usize,
}

impl ResolutionGuard {
  pub(crate) fn enter(id: usize, type_name: &'static str) -> Result<Self, FactoryError> {
    let fresh = RESOLVING_STACK.with(|stack| stack.borrow_mut().insert(id));
    if !fresh {
      return Err(FactoryError::Circular { type_name });
    }
    Ok(Self { id })
  }
}

impl Drop for ResolutionGuard {
  fn drop(&mut self) {
    RESOLVING_STACK.with(|stack| {
      stack.borrow_mut().remove(&self.id);
    });
  }
}

/// Type name and type id of a requested or declared type.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
  pub type_id: TypeId,
  pub type_name: &'static str,
}

impl TypeKey {
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
    }
  }

  /// The key of [`AnyObject`].
  pub fn any_object() -> Self {
    Self::of::<AnyObject>()
  }

  pub fn is_any_object(&self) -> bool {
    self.type_id == TypeId::of::<AnyObject>()
  }
}

impl fmt::Debug for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TypeKey({})", self.type_name)
  }
}

impl fmt::Display for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.type_name)
  }
}

/// Address of the value behind an `Arc`, ignoring any vtable metadata.
pub(crate) fn data_ptr<T: ?Sized>(value: &Arc<T>) -> *const () {
  Arc::as_ptr(value) as *const ()
}

/// Looks through `candidate` for a `P`: either a `P`, an `Arc<P>` or an
/// [`Object`] whose concrete type is `P`.
pub(crate) fn probe<P: Any>(candidate: &dyn Any) -> Option<&P> {
  if let Some(value) = candidate.downcast_ref::<P>() {
    return Some(value);
  }
  if let Some(shared) = candidate.downcast_ref::<Arc<P>>() {
    return Some(shared.as_ref());
  }
  candidate
    .downcast_ref::<Object>()
    .and_then(|object| (**object).downcast_ref::<P>())
}

/// Converts a boxed user error back into a `FactoryError` when it is one,
/// wrapping anything else as a creation failure of `type_name`.
pub(crate) fn into_factory_error(type_name: &'static str, error: DynError) -> FactoryError {
  match error.downcast::<FactoryError>() {
    Ok(factory_error) => *factory_error,
    Err(other) => FactoryError::Creation {
      type_name,
      error: Arc::new(other),
    },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn guard_rejects_reentry_and_releases_on_drop() {
    let first = ResolutionGuard::enter(usize::MAX, "Cyclic").unwrap();
    assert!(matches!(
      ResolutionGuard::enter(usize::MAX, "Cyclic"),
      Err(FactoryError::Circular { type_name: "Cyclic" })
    ));
    drop(first);
    assert!(ResolutionGuard::enter(usize::MAX, "Cyclic").is_ok());
  }

  #[test]
  fn data_ptr_ignores_trait_object_metadata() {
    trait Named {}
    struct Thing;
    impl Named for Thing {}
    let concrete = Arc::new(Thing);
    let erased: Arc<dyn Named> = concrete.clone();
    assert_eq!(data_ptr(&concrete), data_ptr(&erased));
  }

  #[test]
  fn probe_sees_through_arcs_and_objects() {
    struct Thing(u8);
    let shared = Arc::new(Thing(7));
    let object: Object = Arc::new(Thing(9));
    assert_eq!(probe::<Thing>(&shared).map(|t| t.0), Some(7));
    assert_eq!(probe::<Thing>(&object).map(|t| t.0), Some(9));
    assert!(probe::<String>(&object).is_none());
  }
}
