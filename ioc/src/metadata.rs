//! The metadata provider: how implementation types describe their injection
//! points and lifecycle hooks.
//!
//! A type takes part in class based registration by implementing
//! [`Component`] and returning a [`ClassMetadata`] built with its fluent API.
//! Metadata is described once per type and cached for the life of the process.

use crate::container::ObjectFactory;
use crate::core::{into_factory_error, probe, DynError, Object, Resolved, TypeKey};
use crate::error::{FactoryError, Member, Result};
use crate::instance::Instance;
use crate::qualifier::{parse_qualifiers, Marker, Qualifier, Qualifiers};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// An implementation type the factory can construct, inject and tear down.
pub trait Component: Any + Send + Sync + Sized {
  /// Describes constructors, injectable members and lifecycle hooks.
  fn metadata() -> ClassMetadata<Self>;
}

// Described metadata, one `Arc<ClassMetadata<T>>` per component type.
static DESCRIBED: Lazy<DashMap<TypeId, Arc<dyn Any + Send + Sync>>> = Lazy::new(DashMap::new);

/// Returns the cached metadata of `T`, describing it on first use.
pub fn describe<T: Component>() -> Arc<ClassMetadata<T>> {
  let id = TypeId::of::<T>();
  if let Some(cached) = DESCRIBED.get(&id) {
    if let Ok(metadata) = cached.value().clone().downcast::<ClassMetadata<T>>() {
      return metadata;
    }
  }

  // Described outside the map: `metadata()` may describe base types.
  let described = Arc::new(T::metadata());
  let stored = DESCRIBED
    .entry(id)
    .or_insert_with(|| described.clone() as Arc<dyn Any + Send + Sync>)
    .value()
    .clone();
  stored.downcast::<ClassMetadata<T>>().unwrap_or(described)
}

type ResolveFn = fn(&ObjectFactory, &Qualifiers) -> Result<Resolved>;

fn resolve_one<D: ?Sized + Any + Send + Sync>(
  factory: &ObjectFactory,
  qualifiers: &Qualifiers,
) -> Result<Resolved> {
  Ok(Box::new(factory.get_object::<D>(qualifiers.clone())?) as Resolved)
}

fn resolve_all<D: ?Sized + Any + Send + Sync>(
  factory: &ObjectFactory,
  qualifiers: &Qualifiers,
) -> Result<Resolved> {
  Ok(Box::new(factory.select::<D>(qualifiers.clone())?) as Resolved)
}

/// A constructor parameter, field or method parameter to be supplied by the
/// factory.
#[derive(Clone)]
pub struct InjectionPoint {
  key: TypeKey,
  markers: Vec<Marker>,
  qualifiers: Qualifiers,
  member: Member,
  many: bool,
  resolve: ResolveFn,
}

impl InjectionPoint {
  fn new(key: TypeKey, name: String, many: bool, resolve: ResolveFn) -> Self {
    Self {
      key,
      markers: Vec::new(),
      qualifiers: Qualifiers::new(),
      member: Member {
        declaring_type: "?",
        name,
      },
      many,
      resolve,
    }
  }

  /// The declared type, or the element type of a provider-of-many point.
  pub fn key(&self) -> TypeKey {
    self.key
  }

  pub fn qualifiers(&self) -> &Qualifiers {
    &self.qualifiers
  }

  pub fn markers(&self) -> &[Marker] {
    &self.markers
  }

  pub fn member(&self) -> &Member {
    &self.member
  }

  /// Whether the point receives an [`Instance`] of every match.
  pub fn is_many(&self) -> bool {
    self.many
  }

  fn push_marker(&mut self, marker: Marker) {
    self.markers.push(marker);
    self.qualifiers = parse_qualifiers(&self.markers);
  }

  fn declared_in(mut self, declaring_type: &'static str, name: String) -> Self {
    self.member = Member {
      declaring_type,
      name,
    };
    self
  }

  pub(crate) fn resolve(&self, factory: &ObjectFactory) -> Result<Resolved> {
    (self.resolve)(factory, &self.qualifiers).map_err(|e| e.declared_by(&self.member))
  }
}

impl fmt::Debug for InjectionPoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InjectionPoint")
      .field("member", &format_args!("{}", self.member))
      .field("type", &self.key)
      .field("qualifiers", &format_args!("{}", self.qualifiers))
      .field("many", &self.many)
      .finish()
  }
}

/// A typed injection point receiving one `Arc<D>`.
pub struct Inject<D: ?Sized> {
  point: InjectionPoint,
  _type: PhantomData<fn() -> Arc<D>>,
}

impl<D: ?Sized + Any + Send + Sync> Inject<D> {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      point: InjectionPoint::new(TypeKey::of::<D>(), name.into(), false, resolve_one::<D>),
      _type: PhantomData,
    }
  }

  pub fn marker(mut self, marker: impl Into<Marker>) -> Self {
    self.point.push_marker(marker.into());
    self
  }

  pub fn qualified(self, qualifier: Qualifier) -> Self {
    self.marker(qualifier)
  }
}

impl<D: ?Sized> From<Inject<D>> for InjectionPoint {
  fn from(inject: Inject<D>) -> Self {
    inject.point
  }
}

/// A typed provider-of-many injection point receiving an [`Instance<D>`] of
/// every match.
pub struct InjectAll<D: ?Sized> {
  point: InjectionPoint,
  _type: PhantomData<fn() -> Arc<D>>,
}

impl<D: ?Sized + Any + Send + Sync> InjectAll<D> {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      point: InjectionPoint::new(TypeKey::of::<D>(), name.into(), true, resolve_all::<D>),
      _type: PhantomData,
    }
  }

  pub fn marker(mut self, marker: impl Into<Marker>) -> Self {
    self.point.push_marker(marker.into());
    self
  }

  pub fn qualified(self, qualifier: Qualifier) -> Self {
    self.marker(qualifier)
  }
}

impl<D: ?Sized> From<InjectAll<D>> for InjectionPoint {
  fn from(inject: InjectAll<D>) -> Self {
    inject.point
  }
}

/// Resolved arguments of a constructor or injectable method, consumed in
/// declaration order.
pub struct Args {
  type_name: &'static str,
  values: std::vec::IntoIter<(TypeKey, Resolved)>,
}

impl Args {
  pub(crate) fn resolve(
    type_name: &'static str,
    params: &[InjectionPoint],
    factory: &ObjectFactory,
  ) -> Result<Self> {
    let values = params
      .iter()
      .map(|param| Ok((param.key, param.resolve(factory)?)))
      .collect::<Result<Vec<_>>>()?;
    Ok(Self {
      type_name,
      values: values.into_iter(),
    })
  }

  fn take(&mut self) -> Result<(TypeKey, Resolved)> {
    let type_name = self.type_name;
    self.values.next().ok_or_else(|| {
      FactoryError::creation(type_name, "more arguments taken than parameters declared")
    })
  }

  /// The next argument, declared with [`Inject<D>`].
  pub fn arg<D: ?Sized + Any + Send + Sync>(&mut self) -> Result<Arc<D>> {
    let (key, value) = self.take()?;
    value
      .downcast::<Arc<D>>()
      .map(|value| *value)
      .map_err(|_| FactoryError::TypeMismatch {
        required: std::any::type_name::<D>(),
        actual: key.type_name,
      })
  }

  /// The next argument, declared with [`InjectAll<D>`].
  pub fn all<D: ?Sized + Any + Send + Sync>(&mut self) -> Result<Instance<D>> {
    let (key, value) = self.take()?;
    value
      .downcast::<Instance<D>>()
      .map(|value| *value)
      .map_err(|_| FactoryError::TypeMismatch {
        required: std::any::type_name::<Instance<D>>(),
        actual: key.type_name,
      })
  }

  pub fn remaining(&self) -> usize {
    self.values.len()
  }
}

type BuildFn<T> = Arc<dyn Fn(&mut Args) -> std::result::Result<T, DynError> + Send + Sync>;
type AssignFn<T> = Arc<dyn Fn(&mut T, Resolved) -> Result<()> + Send + Sync>;
type InvokeFn<T> =
  Arc<dyn Fn(&mut T, &mut Args) -> std::result::Result<(), DynError> + Send + Sync>;
type PostConstructFn<T> = Arc<dyn Fn(&mut T) -> std::result::Result<(), DynError> + Send + Sync>;
type PreDestroyFn<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Constructor<T> {
  params: Vec<InjectionPoint>,
  build: BuildFn<T>,
}

struct Field<T> {
  point: InjectionPoint,
  assign: AssignFn<T>,
}

struct Method<T> {
  name: String,
  params: Vec<InjectionPoint>,
  invoke: InvokeFn<T>,
}

struct Hook<F> {
  name: String,
  run: F,
}

/// Everything the factory knows about an implementation type `T`.
///
/// Members are visited most-derived first: the members declared on `T` in
/// declaration order, then those of the base set with [`extends`], then its
/// base, and so on. Constructors and class markers are never inherited.
///
/// [`extends`]: ClassMetadata::extends
pub struct ClassMetadata<T> {
  type_key: TypeKey,
  markers: Vec<Marker>,
  constructor: Option<Constructor<T>>,
  default_constructor: Option<Arc<dyn Fn() -> T + Send + Sync>>,
  fields: Vec<Field<T>>,
  methods: Vec<Method<T>>,
  post_construct: Vec<Hook<PostConstructFn<T>>>,
  pre_destroy: Vec<Hook<PreDestroyFn<T>>>,
  base: Option<Box<ClassMetadata<T>>>,
}

impl<T: Any + Send + Sync> Default for ClassMetadata<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Any + Send + Sync> ClassMetadata<T> {
  pub fn new() -> Self {
    Self {
      type_key: TypeKey::of::<T>(),
      markers: Vec::new(),
      constructor: None,
      default_constructor: None,
      fields: Vec::new(),
      methods: Vec::new(),
      post_construct: Vec::new(),
      pre_destroy: Vec::new(),
      base: None,
    }
  }

  fn type_name(&self) -> &'static str {
    self.type_key.type_name
  }

  /// Attaches a class level marker (qualifier or scope).
  pub fn marker(mut self, marker: impl Into<Marker>) -> Self {
    self.markers.push(marker.into());
    self
  }

  pub fn singleton(self) -> Self {
    self.marker(Marker::Singleton)
  }

  pub fn qualified(self, qualifier: Qualifier) -> Self {
    self.marker(qualifier)
  }

  /// The injectable constructor. A type has at most one; a second call
  /// replaces the first.
  pub fn constructor<F>(
    mut self,
    params: impl IntoIterator<Item = InjectionPoint>,
    build: F,
  ) -> Self
  where
    F: Fn(&mut Args) -> std::result::Result<T, DynError> + Send + Sync + 'static,
  {
    let type_name = self.type_name();
    let params = params
      .into_iter()
      .map(|p| {
        let name = format!("new({})", p.member.name);
        p.declared_in(type_name, name)
      })
      .collect();
    self.constructor = Some(Constructor {
      params,
      build: Arc::new(build),
    });
    self
  }

  /// The zero-argument constructor, used when no injectable one exists.
  pub fn default_constructor(mut self, build: impl Fn() -> T + Send + Sync + 'static) -> Self {
    self.default_constructor = Some(Arc::new(build));
    self
  }

  /// An injectable field receiving one `Arc<D>`.
  pub fn field<D, F>(mut self, inject: Inject<D>, set: F) -> Self
  where
    D: ?Sized + Any + Send + Sync,
    F: Fn(&mut T, Arc<D>) + Send + Sync + 'static,
  {
    let type_name = self.type_name();
    let point = InjectionPoint::from(inject);
    let name = point.member.name.clone();
    let actual = point.key.type_name;
    let assign: AssignFn<T> = Arc::new(move |target: &mut T, value: Resolved| {
      let value = value
        .downcast::<Arc<D>>()
        .map_err(|_| FactoryError::TypeMismatch {
          required: std::any::type_name::<Arc<D>>(),
          actual,
        })?;
      set(target, *value);
      Ok(())
    });
    self.fields.push(Field {
      point: point.declared_in(type_name, name),
      assign,
    });
    self
  }

  /// An injectable provider-of-many field receiving an [`Instance<D>`].
  pub fn field_all<D, F>(mut self, inject: InjectAll<D>, set: F) -> Self
  where
    D: ?Sized + Any + Send + Sync,
    F: Fn(&mut T, Instance<D>) + Send + Sync + 'static,
  {
    let type_name = self.type_name();
    let point = InjectionPoint::from(inject);
    let name = point.member.name.clone();
    let actual = point.key.type_name;
    let assign: AssignFn<T> = Arc::new(move |target: &mut T, value: Resolved| {
      let value = value
        .downcast::<Instance<D>>()
        .map_err(|_| FactoryError::TypeMismatch {
          required: std::any::type_name::<Instance<D>>(),
          actual,
        })?;
      set(target, *value);
      Ok(())
    });
    self.fields.push(Field {
      point: point.declared_in(type_name, name),
      assign,
    });
    self
  }

  /// An injectable method, invoked with its resolved parameters after the
  /// fields are injected.
  pub fn method<F>(
    mut self,
    name: impl Into<String>,
    params: impl IntoIterator<Item = InjectionPoint>,
    invoke: F,
  ) -> Self
  where
    F: Fn(&mut T, &mut Args) -> std::result::Result<(), DynError> + Send + Sync + 'static,
  {
    let type_name = self.type_name();
    let name = name.into();
    let params = params
      .into_iter()
      .map(|p| {
        let member = format!("{}({})", name, p.member.name);
        p.declared_in(type_name, member)
      })
      .collect();
    self.methods.push(Method {
      name,
      params,
      invoke: Arc::new(invoke),
    });
    self
  }

  /// A hook run after construction and injection.
  pub fn post_construct<F>(mut self, name: impl Into<String>, run: F) -> Self
  where
    F: Fn(&mut T) -> std::result::Result<(), DynError> + Send + Sync + 'static,
  {
    self.post_construct.push(Hook {
      name: name.into(),
      run: Arc::new(run),
    });
    self
  }

  /// A hook run when the object is destroyed.
  pub fn pre_destroy(
    mut self,
    name: impl Into<String>,
    run: impl Fn(&T) + Send + Sync + 'static,
  ) -> Self {
    self.pre_destroy.push(Hook {
      name: name.into(),
      run: Arc::new(run),
    });
    self
  }

  /// Inherits the fields, methods and hooks of `B`, reached through the
  /// given projections. `B`'s own base chain comes along.
  pub fn extends<B: Component>(
    mut self,
    project_mut: fn(&mut T) -> &mut B,
    project: fn(&T) -> &B,
  ) -> Self {
    self.base = Some(Box::new(Self::lift(B::metadata(), project_mut, project)));
    self
  }

  /// Carries the members of `B`'s metadata over to `T`.
  fn lift<B: Any + Send + Sync>(
    base: ClassMetadata<B>,
    project_mut: fn(&mut T) -> &mut B,
    project: fn(&T) -> &B,
  ) -> ClassMetadata<T> {
    let fields = base
      .fields
      .into_iter()
      .map(|field| {
        let inner = field.assign;
        let assign: AssignFn<T> =
          Arc::new(move |target: &mut T, value: Resolved| inner(project_mut(target), value));
        Field {
          point: field.point,
          assign,
        }
      })
      .collect();
    let methods = base
      .methods
      .into_iter()
      .map(|method| {
        let inner = method.invoke;
        let invoke: InvokeFn<T> =
          Arc::new(move |target: &mut T, args: &mut Args| inner(project_mut(target), args));
        Method {
          name: method.name,
          params: method.params,
          invoke,
        }
      })
      .collect();
    let post_construct = base
      .post_construct
      .into_iter()
      .map(|hook| {
        let inner = hook.run;
        let run: PostConstructFn<T> = Arc::new(move |target: &mut T| inner(project_mut(target)));
        Hook {
          name: hook.name,
          run,
        }
      })
      .collect();
    let pre_destroy = base
      .pre_destroy
      .into_iter()
      .map(|hook| {
        let inner = hook.run;
        let run: PreDestroyFn<T> = Arc::new(move |target: &T| inner(project(target)));
        Hook {
          name: hook.name,
          run,
        }
      })
      .collect();

    ClassMetadata {
      type_key: base.type_key,
      markers: Vec::new(),
      constructor: None,
      default_constructor: None,
      fields,
      methods,
      post_construct,
      pre_destroy,
      base: base
        .base
        .map(|grand| Box::new(Self::lift(*grand, project_mut, project))),
    }
  }
}

impl<T> ClassMetadata<T> {
  /// This class followed by its bases, most-derived first.
  fn lineage(&self) -> impl Iterator<Item = &ClassMetadata<T>> {
    std::iter::successors(Some(self), |class| class.base.as_deref())
  }

  pub fn type_key(&self) -> TypeKey {
    self.type_key
  }

  pub fn markers(&self) -> &[Marker] {
    &self.markers
  }

  pub fn has_injectable_constructor(&self) -> bool {
    self.constructor.is_some()
  }

  pub fn has_default_constructor(&self) -> bool {
    self.default_constructor.is_some()
  }

  /// Parameters of the injectable constructor, empty when there is none.
  pub fn constructor_params(&self) -> &[InjectionPoint] {
    self
      .constructor
      .as_ref()
      .map(|c| c.params.as_slice())
      .unwrap_or(&[])
  }

  /// Injectable fields across the whole base chain, most-derived first.
  pub fn fields(&self) -> impl Iterator<Item = &InjectionPoint> {
    self.lineage().flat_map(|c| c.fields.iter().map(|f| &f.point))
  }

  /// Injectable methods across the whole base chain with their parameters.
  pub fn methods(&self) -> impl Iterator<Item = (&str, &[InjectionPoint])> {
    self
      .lineage()
      .flat_map(|c| c.methods.iter().map(|m| (m.name.as_str(), m.params.as_slice())))
  }

  /// Names of the post-construct hooks in the order they run.
  pub fn post_construct_hooks(&self) -> impl Iterator<Item = &str> {
    self
      .lineage()
      .flat_map(|c| c.post_construct.iter().map(|h| h.name.as_str()))
  }

  /// Names of the pre-destroy hooks in the order they run.
  pub fn pre_destroy_hooks(&self) -> impl Iterator<Item = &str> {
    self
      .lineage()
      .flat_map(|c| c.pre_destroy.iter().map(|h| h.name.as_str()))
  }
}

impl<T: Any + Send + Sync> ClassMetadata<T> {
  /// Assigns every injectable field, then invokes every injectable method.
  /// Fields assigned before a failure stay assigned.
  pub(crate) fn inject(&self, factory: &ObjectFactory, target: &mut T) -> Result<()> {
    let type_name = self.type_name();
    for field in self.lineage().flat_map(|c| c.fields.iter()) {
      let value = field.point.resolve(factory)?;
      (field.assign)(target, value)?;
    }
    for method in self.lineage().flat_map(|c| c.methods.iter()) {
      let mut args = Args::resolve(type_name, &method.params, factory)?;
      (method.invoke)(target, &mut args).map_err(|e| into_factory_error(type_name, e))?;
    }
    Ok(())
  }

  fn construct(&self, factory: &ObjectFactory) -> Result<T> {
    let type_name = self.type_name();
    match (&self.constructor, &self.default_constructor) {
      (Some(constructor), _) => {
        let mut args = Args::resolve(type_name, &constructor.params, factory)?;
        (constructor.build)(&mut args).map_err(|e| into_factory_error(type_name, e))
      }
      (None, Some(default)) => Ok(default()),
      (None, None) => Err(FactoryError::creation(
        type_name,
        "no injectable constructor and no zero-argument constructor",
      )),
    }
  }
}

/// Object safe view of a `ClassMetadata<T>`, held by definitions.
pub(crate) trait ErasedClass: Send + Sync {
  fn type_key(&self) -> TypeKey;

  /// Constructor parameters and fields across the base chain.
  fn validation_points(&self) -> Vec<&InjectionPoint>;

  /// Constructs, injects and initialises a new object.
  fn produce(&self, factory: &ObjectFactory) -> Result<Object>;

  /// Runs the pre-destroy hooks if `candidate` is a `T`. Returns whether any
  /// hook ran.
  fn pre_destroy(&self, candidate: &dyn Any) -> bool;
}

impl<T: Component> ErasedClass for ClassMetadata<T> {
  fn type_key(&self) -> TypeKey {
    self.type_key
  }

  fn validation_points(&self) -> Vec<&InjectionPoint> {
    self.constructor_params().iter().chain(self.fields()).collect()
  }

  fn produce(&self, factory: &ObjectFactory) -> Result<Object> {
    let type_name = self.type_name();
    let mut value = self.construct(factory)?;
    self.inject(factory, &mut value)?;
    for hook in self.lineage().flat_map(|c| c.post_construct.iter()) {
      tracing::trace!(component = type_name, hook = %hook.name, "running post-construct hook");
      (hook.run)(&mut value).map_err(|e| into_factory_error(type_name, e))?;
    }
    let object: Object = Arc::new(value);
    Ok(object)
  }

  fn pre_destroy(&self, candidate: &dyn Any) -> bool {
    let Some(value) = probe::<T>(candidate) else {
      return false;
    };
    let mut ran = false;
    for hook in self.lineage().flat_map(|c| c.pre_destroy.iter()) {
      tracing::trace!(component = self.type_name(), hook = %hook.name, "running pre-destroy hook");
      (hook.run)(value);
      ran = true;
    }
    ran
  }
}
