//! `Instance<T>`: a narrowed, lazily resolved view over matching
//! registrations.

use crate::container::ObjectFactory;
use crate::core::TypeKey;
use crate::error::{FactoryError, Result};
use crate::object_instance::ObjectInstance;
use crate::qualifier::Qualifiers;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// The registrations matching a requested type and qualifier set.
///
/// An `Instance` is immutable: narrowing with [`select`] or [`select_type`]
/// returns a new view over a subset of the candidates. Nothing is created
/// until [`get`] or iteration asks for it, and each candidate is then
/// resolved according to its scope.
///
/// [`select`]: Instance::select
/// [`select_type`]: Instance::select_type
/// [`get`]: Instance::get
pub struct Instance<T: ?Sized> {
  factory: ObjectFactory,
  key: TypeKey,
  qualifiers: Qualifiers,
  candidates: Vec<Arc<ObjectInstance>>,
  _type: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Any + Send + Sync> Instance<T> {
  pub(crate) fn new(
    factory: ObjectFactory,
    key: TypeKey,
    qualifiers: Qualifiers,
    candidates: Vec<Arc<ObjectInstance>>,
  ) -> Self {
    Self {
      factory,
      key,
      qualifiers,
      candidates,
      _type: PhantomData,
    }
  }

  /// The single matching object.
  ///
  /// Fails with [`FactoryError::Unsatisfied`] when nothing matches and
  /// [`FactoryError::Ambiguous`] when more than one registration does.
  pub fn get(&self) -> Result<Arc<T>> {
    match self.candidates.as_slice() {
      [only] => self.resolve(only),
      [] => Err(FactoryError::Unsatisfied {
        type_name: self.key.type_name,
        qualifiers: self.qualifiers.clone(),
        member: None,
      }),
      many => Err(FactoryError::Ambiguous {
        type_name: self.key.type_name,
        qualifiers: self.qualifiers.clone(),
        member: None,
        candidates: many.len(),
      }),
    }
  }

  /// Narrows to the candidates that also match `qualifiers`.
  ///
  /// `select(a).select(b)` has the same candidates as `select(a ∪ b)`.
  pub fn select(&self, qualifiers: impl Into<Qualifiers>) -> Instance<T> {
    self.narrow::<T>(qualifiers.into())
  }

  /// Narrows to the candidates that also declare `U` and match `qualifiers`,
  /// viewed as `U`.
  pub fn select_type<U: ?Sized + Any + Send + Sync>(
    &self,
    qualifiers: impl Into<Qualifiers>,
  ) -> Instance<U> {
    self.narrow::<U>(qualifiers.into())
  }

  fn narrow<U: ?Sized + Any + Send + Sync>(&self, extra: Qualifiers) -> Instance<U> {
    let key = TypeKey::of::<U>();
    let qualifiers = self.qualifiers.union(&extra);
    let candidates: Vec<_> = self
      .candidates
      .iter()
      .filter(|instance| instance.satisfies(key, &qualifiers))
      .cloned()
      .collect();
    tracing::trace!(
      component = key.type_name,
      %qualifiers,
      before = self.candidates.len(),
      after = candidates.len(),
      "narrowed"
    );
    Instance::new(self.factory.clone(), key, qualifiers, candidates)
  }

  /// Number of matching registrations.
  pub fn len(&self) -> usize {
    self.candidates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.candidates.is_empty()
  }

  pub fn is_unsatisfied(&self) -> bool {
    self.candidates.is_empty()
  }

  pub fn is_ambiguous(&self) -> bool {
    self.candidates.len() > 1
  }

  /// The accumulated qualifiers of this view.
  pub fn qualifiers(&self) -> &Qualifiers {
    &self.qualifiers
  }

  pub fn type_key(&self) -> TypeKey {
    self.key
  }

  pub fn candidates(&self) -> &[Arc<ObjectInstance>] {
    &self.candidates
  }

  /// Resolves each candidate as it is visited. Every call starts a new pass:
  /// prototypes are created afresh, singletons return their cached value.
  pub fn iter(&self) -> Iter<'_, T> {
    Iter {
      instance: self,
      candidates: self.candidates.iter(),
    }
  }

  /// Hands `value` back to the registration it came from for destruction.
  ///
  /// A singleton is destroyed only if `value` is its cached object. For
  /// prototypes the destroy hook runs when `T` is the registration's concrete
  /// type, or [`AnyObject`](crate::AnyObject). Returns whether anything was
  /// destroyed.
  pub fn destroy(&self, value: &Arc<T>) -> bool {
    self
      .candidates
      .iter()
      .any(|instance| instance.destroy_value(value))
  }

  fn resolve(&self, instance: &ObjectInstance) -> Result<Arc<T>> {
    let mismatch = || FactoryError::TypeMismatch {
      required: self.key.type_name,
      actual: instance.type_name(),
    };
    let object = instance.get_instance(&self.factory)?;
    let viewed = instance
      .definition()
      .view(&object, self.key)
      .ok_or_else(mismatch)?;
    viewed
      .downcast::<Arc<T>>()
      .map(|value| *value)
      .map_err(|_| mismatch())
  }
}

impl<T: ?Sized> Clone for Instance<T> {
  fn clone(&self) -> Self {
    Self {
      factory: self.factory.clone(),
      key: self.key,
      qualifiers: self.qualifiers.clone(),
      candidates: self.candidates.clone(),
      _type: PhantomData,
    }
  }
}

impl<T: ?Sized> fmt::Debug for Instance<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Instance")
      .field("type", &self.key)
      .field("qualifiers", &format_args!("{}", self.qualifiers))
      .field("candidates", &self.candidates.len())
      .finish()
  }
}

/// Iterator returned by [`Instance::iter`].
pub struct Iter<'a, T: ?Sized> {
  instance: &'a Instance<T>,
  candidates: std::slice::Iter<'a, Arc<ObjectInstance>>,
}

impl<T: ?Sized + Any + Send + Sync> Iterator for Iter<'_, T> {
  type Item = Result<Arc<T>>;

  fn next(&mut self) -> Option<Self::Item> {
    let candidate = self.candidates.next()?;
    Some(self.instance.resolve(candidate))
  }

  fn size_hint(&self) -> (usize, Option<usize>) {
    self.candidates.size_hint()
  }
}

impl<'a, T: ?Sized + Any + Send + Sync> IntoIterator for &'a Instance<T> {
  type Item = Result<Arc<T>>;
  type IntoIter = Iter<'a, T>;

  fn into_iter(self) -> Self::IntoIter {
    self.iter()
  }
}
