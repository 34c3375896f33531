//! A registered definition together with its singleton cell.

use crate::container::ObjectFactory;
use crate::core::{data_ptr, Object, ResolutionGuard, TypeKey};
use crate::definition::{ObjectDefinition, Scope, Strategy};
use crate::error::Result;
use crate::qualifier::{self, Qualifiers};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

type CreateFn = Box<dyn Fn(&ObjectFactory, &ObjectDefinition) -> Result<Object> + Send + Sync>;

/// Owns one [`ObjectDefinition`] and produces and destroys its objects.
///
/// Prototype objects are created on every request and never cached.
/// Singleton objects are created at most once per instance, even under
/// concurrent first requests: the cell is re-checked under the instance's
/// own creation lock before creating.
pub struct ObjectInstance {
  id: usize,
  type_name: &'static str,
  scope: Scope,
  definition: ObjectDefinition,
  create: CreateFn,
  cell: RwLock<Option<Object>>,
  creating: Mutex<()>,
}

impl ObjectInstance {
  /// Seals `definition` and wraps it. Fails if the definition is invalid.
  pub(crate) fn new(definition: ObjectDefinition) -> Result<Self> {
    let scope = definition.scope()?;
    let type_name = definition.strategy()?.type_key().type_name;
    Ok(Self {
      id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
      type_name,
      scope,
      definition,
      create: Box::new(|factory, definition| factory.produce_object(definition)),
      cell: RwLock::new(None),
      creating: Mutex::new(()),
    })
  }

  pub fn definition(&self) -> &ObjectDefinition {
    &self.definition
  }

  pub fn scope(&self) -> Scope {
    self.scope
  }

  /// Name of the implementation or produced type.
  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  /// Whether a singleton value is currently cached.
  pub fn is_live(&self) -> bool {
    self.cell.read().is_some()
  }

  pub(crate) fn cached(&self) -> Option<Object> {
    self.cell.read().clone()
  }

  pub(crate) fn satisfies(&self, key: TypeKey, requested: &Qualifiers) -> bool {
    self.definition.has_type(key)
      && self
        .definition
        .qualifiers()
        .map_or(false, |candidate| qualifier::matches(candidate, requested))
  }

  /// Returns the object for this registration, creating it as the scope
  /// requires.
  pub fn get_instance(&self, factory: &ObjectFactory) -> Result<Object> {
    match self.scope {
      Scope::Prototype => {
        let _guard = ResolutionGuard::enter(self.id, self.type_name)?;
        (self.create)(factory, &self.definition)
      }
      Scope::Singleton => {
        if let Some(object) = self.cell.read().as_ref() {
          return Ok(object.clone());
        }

        // Entered before locking so a cycle errors instead of deadlocking.
        let _guard = ResolutionGuard::enter(self.id, self.type_name)?;
        let _creating = self.creating.lock();
        if let Some(object) = self.cell.read().as_ref() {
          return Ok(object.clone());
        }

        let object = (self.create)(factory, &self.definition)?;
        tracing::debug!(component = self.type_name, "created singleton");
        *self.cell.write() = Some(object.clone());
        Ok(object)
      }
    }
  }

  /// Destroys `candidate`.
  ///
  /// Singleton: only when `candidate` is the cached object. The destroy hook
  /// runs and the cell is cleared; returns `false` when nothing was cached,
  /// so destroying twice runs the hook once.
  ///
  /// Prototype: runs the destroy hook if `candidate` is an object of this
  /// registration's type. Returns whether a hook ran.
  pub fn destroy(&self, candidate: &Object) -> bool {
    match self.scope {
      Scope::Singleton => {
        let taken = {
          let _creating = self.creating.lock();
          let mut cell = self.cell.write();
          let is_cached = match cell.as_ref() {
            None => return false,
            Some(cached) => data_ptr(cached) == data_ptr(candidate),
          };
          if !is_cached {
            tracing::warn!(
              component = self.type_name,
              "destroy requested for an object that is not the cached singleton"
            );
            return false;
          }
          cell.take()
        };
        if let Some(object) = taken {
          self.run_destroy_hook(&object);
          tracing::debug!(component = self.type_name, "destroyed singleton");
        }
        true
      }
      Scope::Prototype => self.run_destroy_hook(candidate),
    }
  }

  /// Destroys a value obtained through a typed view of this registration.
  pub(crate) fn destroy_value<T: ?Sized + Any + Send + Sync>(&self, value: &Arc<T>) -> bool {
    match self.scope {
      Scope::Singleton => match self.cached() {
        Some(cached) if data_ptr(&cached) == data_ptr(value) => self.destroy(&cached),
        _ => false,
      },
      Scope::Prototype => {
        self.definition.has_type(TypeKey::of::<T>()) && self.run_destroy_hook(value)
      }
    }
  }

  /// Producer destroy callback, else the class's pre-destroy hooks.
  fn run_destroy_hook(&self, candidate: &dyn Any) -> bool {
    match self.definition.strategy() {
      Ok(Strategy::Producer(producer)) => match &producer.destroy {
        Some(destroy) => destroy(candidate),
        None => false,
      },
      Ok(Strategy::Class(class)) => class.pre_destroy(candidate),
      Err(_) => false,
    }
  }
}

impl fmt::Debug for ObjectInstance {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ObjectInstance")
      .field("id", &self.id)
      .field("type", &self.type_name)
      .field("scope", &self.scope)
      .field("live", &self.is_live())
      .finish()
  }
}
