//! Object definitions: what a registration satisfies and how it is created.

use crate::container::ObjectFactory;
use crate::core::{into_factory_error, probe, DynError, Object, Resolved, TypeKey};
use crate::error::{FactoryError, Result};
use crate::metadata::{describe, Component, ErasedClass};
use crate::qualifier::{Marker, Qualifiers};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Lifecycle policy of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
  /// Created once on first request, cached until destroyed.
  Singleton,
  /// Created fresh on every request, never cached.
  Prototype,
}

type CastFn = Arc<dyn Fn(&Object) -> Option<Resolved> + Send + Sync>;
pub(crate) type DestroyFn = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// One declared type of a registration and how to view the object as it.
#[derive(Clone)]
pub struct TypeBinding {
  key: TypeKey,
  cast: CastFn,
}

impl TypeBinding {
  pub fn key(&self) -> TypeKey {
    self.key
  }
}

impl fmt::Debug for TypeBinding {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key.type_name)
  }
}

/// The set of types a registration of concrete type `C` satisfies.
///
/// Interfaces are declared with an upcast, usually through the [`types!`]
/// macro:
///
/// ```
/// use compose_ioc::{types, TypeSet};
/// use std::sync::Arc;
///
/// trait Logger: Send + Sync {}
/// struct ConsoleLogger;
/// impl Logger for ConsoleLogger {}
///
/// let by_hand = TypeSet::<ConsoleLogger>::of().with::<dyn Logger>(|c| c);
/// let by_macro = types!(ConsoleLogger: dyn Logger);
/// assert_eq!(by_hand.len(), by_macro.len());
/// ```
///
/// [`types!`]: crate::types
pub struct TypeSet<C> {
  bindings: Vec<TypeBinding>,
  _concrete: PhantomData<fn() -> C>,
}

impl<C: Any + Send + Sync> TypeSet<C> {
  /// An empty set. Registering it fails validation.
  pub fn new() -> Self {
    Self {
      bindings: Vec::new(),
      _concrete: PhantomData,
    }
  }

  /// The set containing `C` itself.
  pub fn of() -> Self {
    Self::new().with::<C>(|c| c)
  }

  /// Adds `I`, reached from `C` through `upcast`. Duplicates are ignored.
  pub fn with<I: ?Sized + Any + Send + Sync>(mut self, upcast: fn(Arc<C>) -> Arc<I>) -> Self {
    let key = TypeKey::of::<I>();
    if self.bindings.iter().any(|b| b.key == key) {
      return self;
    }
    let cast: CastFn = Arc::new(move |object: &Object| {
      let concrete = object.clone().downcast::<C>().ok()?;
      Some(Box::new(upcast(concrete)) as Resolved)
    });
    self.bindings.push(TypeBinding { key, cast });
    self
  }

  pub fn len(&self) -> usize {
    self.bindings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bindings.is_empty()
  }
}

impl<C: Any + Send + Sync> Default for TypeSet<C> {
  fn default() -> Self {
    Self::new()
  }
}

/// A creation function for objects of type `P`, called with the owning
/// factory. Dependencies of a producer are resolved imperatively inside it.
pub struct Producer<P> {
  produce: Arc<dyn Fn(&ObjectFactory) -> std::result::Result<P, DynError> + Send + Sync>,
  dispose: Option<Arc<dyn Fn(&P) + Send + Sync>>,
  markers: Vec<Marker>,
}

impl<P: Any + Send + Sync> Producer<P> {
  pub fn new<F>(produce: F) -> Self
  where
    F: Fn(&ObjectFactory) -> std::result::Result<P, DynError> + Send + Sync + 'static,
  {
    Self {
      produce: Arc::new(produce),
      dispose: None,
      markers: Vec::new(),
    }
  }

  /// Callback run when a produced object is destroyed.
  pub fn on_destroy(mut self, dispose: impl Fn(&P) + Send + Sync + 'static) -> Self {
    self.dispose = Some(Arc::new(dispose));
    self
  }

  /// Attaches a marker used to infer scope and qualifiers at registration.
  pub fn marker(mut self, marker: impl Into<Marker>) -> Self {
    self.markers.push(marker.into());
    self
  }

  pub fn markers(&self) -> &[Marker] {
    &self.markers
  }

  pub(crate) fn erase(self) -> ErasedProducer {
    let type_key = TypeKey::of::<P>();
    let produce = self.produce;
    let destroy = self.dispose.map(|dispose| -> DestroyFn {
      Arc::new(move |candidate: &dyn Any| match probe::<P>(candidate) {
        Some(value) => {
          dispose(value);
          true
        }
        None => false,
      })
    });
    ErasedProducer {
      type_key,
      produce: Arc::new(move |factory: &ObjectFactory| {
        let value = produce(factory).map_err(|e| into_factory_error(type_key.type_name, e))?;
        Ok(Arc::new(value) as Object)
      }),
      destroy,
    }
  }
}

#[derive(Clone)]
pub(crate) struct ErasedProducer {
  pub(crate) type_key: TypeKey,
  pub(crate) produce: Arc<dyn Fn(&ObjectFactory) -> Result<Object> + Send + Sync>,
  pub(crate) destroy: Option<DestroyFn>,
}

/// How a definition creates its objects.
#[derive(Clone)]
pub(crate) enum Strategy {
  Class(Arc<dyn ErasedClass>),
  Producer(ErasedProducer),
}

impl Strategy {
  pub(crate) fn type_key(&self) -> TypeKey {
    match self {
      Strategy::Class(class) => class.type_key(),
      Strategy::Producer(producer) => producer.type_key,
    }
  }
}

/// Description of one registration.
///
/// Built in two phases: setters are accepted until the definition is first
/// read. The first getter validates the definition (non-empty types, a scope,
/// exactly one creation strategy) and seals it for good, after which every
/// setter fails with [`FactoryError::Sealed`].
pub struct ObjectDefinition {
  types: Vec<TypeBinding>,
  qualifiers: Qualifiers,
  scope: Option<Scope>,
  strategy: Option<Strategy>,
  sealed: OnceCell<Result<()>>,
}

impl Default for ObjectDefinition {
  fn default() -> Self {
    Self::new()
  }
}

impl ObjectDefinition {
  pub fn new() -> Self {
    Self {
      types: Vec::new(),
      qualifiers: Qualifiers::default_set(),
      scope: None,
      strategy: None,
      sealed: OnceCell::new(),
    }
  }

  // --- Setters ---

  fn ensure_open(&self) -> Result<()> {
    match self.sealed.get() {
      Some(_) => Err(FactoryError::Sealed),
      None => Ok(()),
    }
  }

  pub fn set_types<C: Any + Send + Sync>(&mut self, types: TypeSet<C>) -> Result<&mut Self> {
    self.ensure_open()?;
    self.types = types.bindings;
    Ok(self)
  }

  /// Replaces the qualifiers. An empty set means `{Default}`.
  pub fn set_qualifiers(&mut self, qualifiers: impl Into<Qualifiers>) -> Result<&mut Self> {
    self.ensure_open()?;
    let qualifiers = qualifiers.into();
    self.qualifiers = if qualifiers.is_empty() {
      Qualifiers::default_set()
    } else {
      qualifiers
    };
    Ok(self)
  }

  pub fn set_scope(&mut self, scope: Scope) -> Result<&mut Self> {
    self.ensure_open()?;
    self.scope = Some(scope);
    Ok(self)
  }

  /// Creates objects by constructing `C` from its metadata.
  pub fn set_impl_class<C: Component>(&mut self) -> Result<&mut Self> {
    let class: Arc<dyn ErasedClass> = describe::<C>();
    self.set_strategy(Strategy::Class(class))
  }

  /// Creates objects by calling `producer`.
  pub fn set_producer<P: Any + Send + Sync>(&mut self, producer: Producer<P>) -> Result<&mut Self> {
    self.set_strategy(Strategy::Producer(producer.erase()))
  }

  fn set_strategy(&mut self, strategy: Strategy) -> Result<&mut Self> {
    self.ensure_open()?;
    if let Some(existing) = &self.strategy {
      return Err(FactoryError::InvalidDefinition {
        reason: format!(
          "creation strategy already set to `{}`; an implementation class and a producer are exclusive",
          existing.type_key()
        ),
      });
    }
    self.strategy = Some(strategy);
    Ok(self)
  }

  // --- Sealing ---

  /// Validates and seals the definition. Runs once; later calls return the
  /// stored outcome.
  pub fn seal(&self) -> Result<()> {
    self.sealed.get_or_init(|| self.validate()).clone()
  }

  pub fn is_sealed(&self) -> bool {
    self.sealed.get().is_some()
  }

  fn validate(&self) -> Result<()> {
    let invalid = |reason: &str| FactoryError::InvalidDefinition {
      reason: reason.to_string(),
    };
    if self.types.is_empty() {
      return Err(invalid("a definition must satisfy at least one type"));
    }
    if self.scope.is_none() {
      return Err(invalid("a definition needs a scope"));
    }
    if self.strategy.is_none() {
      return Err(invalid(
        "a definition needs either an implementation class or a producer",
      ));
    }
    Ok(())
  }

  // --- Getters ---

  pub fn types(&self) -> Result<Vec<TypeKey>> {
    self.seal()?;
    Ok(self.types.iter().map(TypeBinding::key).collect())
  }

  pub fn qualifiers(&self) -> Result<&Qualifiers> {
    self.seal()?;
    Ok(&self.qualifiers)
  }

  pub fn scope(&self) -> Result<Scope> {
    self.seal()?;
    self.scope.ok_or_else(|| FactoryError::InvalidDefinition {
      reason: "a definition needs a scope".to_string(),
    })
  }

  /// The implementation class, `None` for producer definitions.
  pub fn impl_type(&self) -> Result<Option<TypeKey>> {
    Ok(match self.strategy()? {
      Strategy::Class(class) => Some(class.type_key()),
      Strategy::Producer(_) => None,
    })
  }

  pub fn is_producer(&self) -> Result<bool> {
    Ok(matches!(self.strategy()?, Strategy::Producer(_)))
  }

  /// Whether the definition satisfies `key`. The [`AnyObject`] key is
  /// satisfied by every valid definition.
  ///
  /// [`AnyObject`]: crate::AnyObject
  pub fn has_type(&self, key: TypeKey) -> bool {
    if self.seal().is_err() {
      return false;
    }
    key.is_any_object() || self.types.iter().any(|b| b.key == key)
  }

  pub(crate) fn strategy(&self) -> Result<&Strategy> {
    self.seal()?;
    self.strategy.as_ref().ok_or_else(|| FactoryError::InvalidDefinition {
      reason: "a definition needs either an implementation class or a producer".to_string(),
    })
  }

  /// Views `object` as the declared type `key`, boxed as `Arc<key>`.
  pub(crate) fn view(&self, object: &Object, key: TypeKey) -> Option<Resolved> {
    if key.is_any_object() {
      return Some(Box::new(object.clone()));
    }
    self
      .types
      .iter()
      .find(|b| b.key == key)
      .and_then(|b| (b.cast)(object))
  }
}

impl fmt::Debug for ObjectDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ObjectDefinition")
      .field("types", &self.types)
      .field("qualifiers", &format_args!("{}", self.qualifiers))
      .field("scope", &self.scope)
      .field(
        "strategy",
        &self.strategy.as_ref().map(|s| match s {
          Strategy::Class(class) => format!("class {}", class.type_key()),
          Strategy::Producer(producer) => format!("producer of {}", producer.type_key),
        }),
      )
      .field("sealed", &self.is_sealed())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::qualifier::Qualifier;

  trait Greeter: Send + Sync {}
  struct Plain;
  impl Greeter for Plain {}

  fn producer() -> Producer<Plain> {
    Producer::new(|_| Ok(Plain))
  }

  #[test]
  fn getters_seal_and_setters_fail_afterwards() {
    let mut definition = ObjectDefinition::new();
    definition
      .set_types(TypeSet::<Plain>::of())
      .unwrap()
      .set_scope(Scope::Prototype)
      .unwrap()
      .set_producer(producer())
      .unwrap();
    assert!(!definition.is_sealed());

    assert_eq!(definition.scope().unwrap(), Scope::Prototype);
    assert!(definition.is_sealed());
    assert!(matches!(
      definition.set_scope(Scope::Singleton),
      Err(FactoryError::Sealed)
    ));
  }

  #[test]
  fn qualifiers_default_to_default_tag() {
    let mut definition = ObjectDefinition::new();
    definition
      .set_types(TypeSet::<Plain>::of())
      .unwrap()
      .set_scope(Scope::Singleton)
      .unwrap()
      .set_producer(producer())
      .unwrap()
      .set_qualifiers(Qualifiers::new())
      .unwrap();
    assert_eq!(
      definition.qualifiers().unwrap(),
      &Qualifiers::from([Qualifier::DEFAULT])
    );
  }

  #[test]
  fn incomplete_definitions_fail_validation_once_and_for_all() {
    let mut definition = ObjectDefinition::new();
    definition.set_types(TypeSet::<Plain>::of()).unwrap();
    assert!(matches!(
      definition.types(),
      Err(FactoryError::InvalidDefinition { .. })
    ));
    assert!(matches!(
      definition.set_scope(Scope::Singleton),
      Err(FactoryError::Sealed)
    ));
    assert!(!definition.has_type(TypeKey::of::<Plain>()));
  }

  #[test]
  fn creation_strategies_are_exclusive() {
    let mut definition = ObjectDefinition::new();
    definition.set_producer(producer()).unwrap();
    assert!(matches!(
      definition.set_producer(producer()),
      Err(FactoryError::InvalidDefinition { .. })
    ));
  }

  #[test]
  fn has_type_and_view_follow_declared_types() {
    let mut definition = ObjectDefinition::new();
    definition
      .set_types(TypeSet::<Plain>::new().with::<dyn Greeter>(|c| c))
      .unwrap()
      .set_scope(Scope::Singleton)
      .unwrap()
      .set_producer(producer())
      .unwrap();

    assert!(definition.has_type(TypeKey::of::<dyn Greeter>()));
    assert!(!definition.has_type(TypeKey::of::<Plain>()));
    assert!(definition.has_type(TypeKey::any_object()));

    let object: Object = Arc::new(Plain);
    let viewed = definition
      .view(&object, TypeKey::of::<dyn Greeter>())
      .unwrap();
    assert!(viewed.downcast::<Arc<dyn Greeter>>().is_ok());
    assert!(definition.view(&object, TypeKey::of::<Plain>()).is_none());
  }
}
