//! The `ObjectFactory` and its registration, validation and query API.

use crate::core::{AnyObject, Object, TypeKey};
use crate::definition::{ObjectDefinition, Producer, Scope, Strategy, TypeSet};
use crate::error::{FactoryError, Result};
use crate::instance::Instance;
use crate::metadata::{describe, Component};
use crate::object_instance::ObjectInstance;
use crate::qualifier::{parse_qualifiers, parse_scope, Qualifiers};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

type Registry = Arc<[Arc<ObjectInstance>]>;

struct Building {
  instances: Vec<Arc<ObjectInstance>>,
  closed: bool,
}

struct FactoryInner {
  name: Cow<'static, str>,
  building: Mutex<Building>,
  sealed: OnceCell<Result<Registry>>,
}

/// The object composition container.
///
/// A factory is built in two phases. While *building*, registrations are
/// appended. The first resolution of any kind (`select`, `get_object`,
/// `inject`, or an explicit [`seal`]) validates every class registration's
/// constructor parameters and fields against the registry and seals it. From
/// then on the registry is an immutable snapshot read without locks, and a
/// validation failure is returned by every later call.
///
/// `ObjectFactory` is a cheap, cloneable handle; clones share one registry.
///
/// [`seal`]: ObjectFactory::seal
#[derive(Clone)]
pub struct ObjectFactory {
  inner: Arc<FactoryInner>,
}

impl Default for ObjectFactory {
  fn default() -> Self {
    Self::new()
  }
}

impl ObjectFactory {
  /// Creates a new, empty factory.
  pub fn new() -> Self {
    Self::named("default")
  }

  /// Creates a new, empty factory whose name appears in log events.
  pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
    Self {
      inner: Arc::new(FactoryInner {
        name: name.into(),
        building: Mutex::new(Building {
          instances: Vec::new(),
          closed: false,
        }),
        sealed: OnceCell::new(),
      }),
    }
  }

  pub fn name(&self) -> &str {
    &self.inner.name
  }

  // --- Registration ---

  /// Registers the component `C` as satisfying `types`.
  ///
  /// Scope and qualifiers are read from the class markers of `C`: a singleton
  /// marker selects [`Scope::Singleton`], no scope marker selects
  /// [`Scope::Prototype`], and no qualifier markers mean `{Default}`.
  pub fn register<C: Component>(&self, types: TypeSet<C>) -> Result<()> {
    let class = describe::<C>();
    let scope = parse_scope(class.markers(), class.type_key().type_name)?;
    let qualifiers = parse_qualifiers(class.markers());
    self.register_with(types, scope.unwrap_or(Scope::Prototype), qualifiers)
  }

  /// Registers the component `C` with an explicit scope and qualifiers.
  pub fn register_with<C: Component>(
    &self,
    types: TypeSet<C>,
    scope: Scope,
    qualifiers: impl Into<Qualifiers>,
  ) -> Result<()> {
    let mut definition = ObjectDefinition::new();
    definition
      .set_types(types)?
      .set_scope(scope)?
      .set_qualifiers(qualifiers)?
      .set_impl_class::<C>()?;
    self.register_definition(definition)
  }

  /// Registers `producer` as the creator of objects satisfying `types`.
  /// Scope and qualifiers are read from the producer's markers.
  pub fn register_producer<P: Any + Send + Sync>(
    &self,
    types: TypeSet<P>,
    producer: Producer<P>,
  ) -> Result<()> {
    let markers = producer.markers().to_vec();
    let scope = parse_scope(&markers, std::any::type_name::<P>())?;
    let qualifiers = parse_qualifiers(&markers);
    self.register_producer_with(types, producer, scope.unwrap_or(Scope::Prototype), qualifiers)
  }

  /// Registers `producer` with an explicit scope and qualifiers.
  pub fn register_producer_with<P: Any + Send + Sync>(
    &self,
    types: TypeSet<P>,
    producer: Producer<P>,
    scope: Scope,
    qualifiers: impl Into<Qualifiers>,
  ) -> Result<()> {
    let mut definition = ObjectDefinition::new();
    definition
      .set_types(types)?
      .set_scope(scope)?
      .set_qualifiers(qualifiers)?
      .set_producer(producer)?;
    self.register_definition(definition)
  }

  /// Registers a hand-built definition. The definition is sealed here and
  /// rejected if it is incomplete.
  pub fn register_definition(&self, definition: ObjectDefinition) -> Result<()> {
    let mut building = self.inner.building.lock();
    if building.closed {
      return Err(FactoryError::Sealed);
    }
    let instance = ObjectInstance::new(definition)?;
    tracing::debug!(
      factory = %self.inner.name,
      component = instance.type_name(),
      scope = ?instance.scope(),
      qualifiers = %instance.definition().qualifiers()?,
      "registered"
    );
    building.instances.push(Arc::new(instance));
    Ok(())
  }

  /// Removes every class registration of `C` whose qualifiers equal
  /// `qualifiers` (an empty set means `{Default}`). Returns how many were
  /// removed.
  pub fn unregister<C: Component>(&self, qualifiers: impl Into<Qualifiers>) -> Result<usize> {
    let mut qualifiers = qualifiers.into();
    if qualifiers.is_empty() {
      qualifiers = Qualifiers::default_set();
    }
    let target = TypeKey::of::<C>();

    let mut building = self.inner.building.lock();
    if building.closed {
      return Err(FactoryError::Sealed);
    }
    let before = building.instances.len();
    building.instances.retain(|instance| {
      let definition = instance.definition();
      let same_class = matches!(definition.impl_type(), Ok(Some(key)) if key == target);
      let same_qualifiers = matches!(definition.qualifiers(), Ok(q) if *q == qualifiers);
      !(same_class && same_qualifiers)
    });
    let removed = before - building.instances.len();
    tracing::debug!(
      factory = %self.inner.name,
      component = target.type_name,
      removed,
      "unregistered"
    );
    Ok(removed)
  }

  // --- Sealing ---

  /// Validates the registry and seals the factory. Called implicitly by the
  /// first resolution; calling it earlier surfaces configuration errors
  /// up front. Every call returns the outcome of the first.
  pub fn seal(&self) -> Result<()> {
    self.registry().map(|_| ())
  }

  pub fn is_sealed(&self) -> bool {
    self.inner.sealed.get().is_some()
  }

  fn registry(&self) -> Result<Registry> {
    self.inner.sealed.get_or_init(|| self.close()).clone()
  }

  fn close(&self) -> Result<Registry> {
    let registry: Registry = {
      let mut building = self.inner.building.lock();
      building.closed = true;
      building.instances.iter().cloned().collect()
    };

    match Self::validate(&registry) {
      Ok(()) => {
        tracing::debug!(factory = %self.inner.name, registrations = registry.len(), "sealed");
        Ok(registry)
      }
      Err(error) => {
        tracing::error!(factory = %self.inner.name, %error, "validation failed");
        Err(error)
      }
    }
  }

  /// Every constructor parameter and field of every class registration must
  /// match exactly one registration.
  fn validate(registry: &[Arc<ObjectInstance>]) -> Result<()> {
    let factory_key = TypeKey::of::<ObjectFactory>();
    for instance in registry {
      let Ok(Strategy::Class(class)) = instance.definition().strategy() else {
        continue;
      };
      for point in class.validation_points() {
        if point.is_many() || point.key() == factory_key {
          continue;
        }
        let candidates = registry
          .iter()
          .filter(|candidate| candidate.satisfies(point.key(), point.qualifiers()))
          .count();
        match candidates {
          1 => {}
          0 => {
            return Err(FactoryError::Unsatisfied {
              type_name: point.key().type_name,
              qualifiers: point.qualifiers().clone(),
              member: Some(point.member().clone()),
            })
          }
          _ => {
            return Err(FactoryError::Ambiguous {
              type_name: point.key().type_name,
              qualifiers: point.qualifiers().clone(),
              member: Some(point.member().clone()),
              candidates,
            })
          }
        }
      }
    }
    Ok(())
  }

  // --- Queries ---

  /// Every registration satisfying `T` whose qualifiers match. Never fails on
  /// the number of matches; see [`Instance::get`].
  ///
  /// Selecting [`AnyObject`] matches registrations of every type.
  pub fn select<T: ?Sized + Any + Send + Sync>(
    &self,
    qualifiers: impl Into<Qualifiers>,
  ) -> Result<Instance<T>> {
    let registry = self.registry()?;
    let key = TypeKey::of::<T>();
    let mut qualifiers = qualifiers.into();
    // Stored as `{Default}` so narrowing keeps the default requirement.
    if qualifiers.is_empty() {
      qualifiers = Qualifiers::default_set();
    }
    let candidates: Vec<_> = registry
      .iter()
      .filter(|instance| instance.satisfies(key, &qualifiers))
      .cloned()
      .collect();
    tracing::trace!(
      factory = %self.inner.name,
      component = key.type_name,
      %qualifiers,
      candidates = candidates.len(),
      "selected"
    );
    Ok(Instance::new(self.clone(), key, qualifiers, candidates))
  }

  /// The single object satisfying `T` and `qualifiers`.
  ///
  /// Requesting `ObjectFactory` itself returns this factory without looking
  /// at the registry.
  pub fn get_object<T: ?Sized + Any + Send + Sync>(
    &self,
    qualifiers: impl Into<Qualifiers>,
  ) -> Result<Arc<T>> {
    if TypeId::of::<T>() == TypeId::of::<ObjectFactory>() {
      let boxed: Box<dyn Any> = Box::new(Arc::new(self.clone()));
      return boxed
        .downcast::<Arc<T>>()
        .map(|factory| *factory)
        .map_err(|_| FactoryError::TypeMismatch {
          required: std::any::type_name::<T>(),
          actual: std::any::type_name::<ObjectFactory>(),
        });
    }
    self.select::<T>(qualifiers)?.get()
  }

  /// Shorthand for `get_object` with default qualifiers.
  pub fn get<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    self.get_object::<T>(Qualifiers::new())
  }

  /// Assigns the injectable fields and invokes the injectable methods of an
  /// existing `target`, base classes included, most-derived first.
  ///
  /// Injection is not transactional: fields assigned before a failure keep
  /// their values.
  pub fn inject<'t, T: Component>(&self, target: &'t mut T) -> Result<&'t mut T> {
    self.registry()?;
    describe::<T>().inject(self, target)?;
    Ok(target)
  }

  /// Creates a new object as `definition` describes: by calling its producer,
  /// or by constructing, injecting and initialising its implementation class.
  /// Scope is not considered; see [`ObjectInstance::get_instance`].
  pub fn produce_object(&self, definition: &ObjectDefinition) -> Result<Object> {
    match definition.strategy()? {
      Strategy::Producer(producer) => (producer.produce)(self),
      Strategy::Class(class) => class.produce(self),
    }
  }

  // --- Teardown and introspection ---

  /// Destroys every live singleton, running its destroy hook. Prototype
  /// objects held by callers are unaffected. Returns the number destroyed.
  ///
  /// Singletons holding an [`Instance`] keep their factory alive; destroying
  /// them releases that reference.
  pub fn destroy(&self) -> usize {
    let Some(Ok(registry)) = self.inner.sealed.get() else {
      return 0;
    };
    let destroyed = registry
      .iter()
      .filter(|instance| match instance.cached() {
        Some(object) => instance.destroy(&object),
        None => false,
      })
      .count();
    tracing::debug!(factory = %self.inner.name, destroyed, "destroyed singletons");
    destroyed
  }

  /// Every registration, in registration order.
  pub fn definitions(&self) -> impl Iterator<Item = Arc<ObjectInstance>> {
    let instances: Vec<_> = match self.inner.sealed.get() {
      Some(Ok(registry)) => registry.to_vec(),
      _ => self.inner.building.lock().instances.clone(),
    };
    instances.into_iter()
  }

  /// Shorthand for `select::<AnyObject>` matching every qualifier.
  pub fn all(&self) -> Result<Instance<AnyObject>> {
    self.select::<AnyObject>(crate::qualifier::Qualifier::ANY)
  }
}

impl fmt::Debug for ObjectFactory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let registrations = match self.inner.sealed.get() {
      Some(Ok(registry)) => registry.len(),
      _ => self.inner.building.lock().instances.len(),
    };
    f.debug_struct("ObjectFactory")
      .field("name", &self.inner.name)
      .field("sealed", &self.is_sealed())
      .field("registrations", &registrations)
      .finish()
  }
}
