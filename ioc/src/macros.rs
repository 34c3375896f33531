//! Public macros for declaring type sets and resolving components.

/// Builds a [`TypeSet`](crate::TypeSet) for a concrete type.
///
/// `types!(C)` satisfies `C` only. `types!(C: dyn A, dyn B)` satisfies `C`
/// and the listed interfaces, each reached by an unsizing upcast.
///
/// # Examples
///
/// ```
/// use compose_ioc::types;
///
/// trait Greeter: Send + Sync {}
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter {}
///
/// let types = types!(EnglishGreeter: dyn Greeter);
/// assert_eq!(types.len(), 2);
/// ```
#[macro_export]
macro_rules! types {
  ($concrete:ty) => {
    $crate::TypeSet::<$concrete>::of()
  };

  ($concrete:ty : $($interface:ty),+ $(,)?) => {
    $crate::TypeSet::<$concrete>::of()
      $(.with::<$interface>(|concrete| concrete))+
  };
}

/// Builds a [`Qualifiers`](crate::Qualifiers) set from qualifiers or tags.
///
/// ```
/// use compose_ioc::{qualifiers, Qualifier};
///
/// let set = qualifiers!["Fast", Qualifier::named("primary")];
/// assert_eq!(set.len(), 2);
/// assert!(qualifiers![].is_empty());
/// ```
#[macro_export]
macro_rules! qualifiers {
  () => {
    $crate::Qualifiers::new()
  };

  ($($qualifier:expr),+ $(,)?) => {
    <$crate::Qualifiers as ::std::iter::FromIterator<$crate::Qualifier>>::from_iter([
      $($crate::Qualifier::from($qualifier)),+
    ])
  };
}

/// Resolves a component from the global factory, returning the
/// [`Result`](crate::Result) instead of panicking.
///
/// ```
/// use compose_ioc::maybe_resolve;
///
/// #[derive(Debug)]
/// struct Unregistered;
/// assert!(maybe_resolve!(Unregistered).unwrap_err().is_unsatisfied());
/// ```
#[cfg(feature = "global")]
#[macro_export]
macro_rules! maybe_resolve {
  (trait $trait_ident:ident) => {
    $crate::maybe_resolve_from!($crate::global(), dyn $trait_ident)
  };

  (trait $trait_ident:ident, $($qualifier:expr),+ $(,)?) => {
    $crate::maybe_resolve_from!($crate::global(), dyn $trait_ident, $($qualifier),+)
  };

  ($type:ty) => {
    $crate::maybe_resolve_from!($crate::global(), $type)
  };

  ($type:ty, $($qualifier:expr),+ $(,)?) => {
    $crate::maybe_resolve_from!($crate::global(), $type, $($qualifier),+)
  };
}

/// Resolves a component from the global factory.
///
/// Panics with the factory error if the component cannot be resolved. For a
/// non-panicking version, use `global().get_object(...)` directly.
///
/// # Panics
///
/// When nothing or more than one registration matches, when creation fails,
/// or when the global factory failed validation.
///
/// # Examples
///
/// ```
/// use compose_ioc::{global, resolve, types, Producer};
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter { fn greet(&self) -> String { "Hello!".to_string() } }
///
/// global()
///   .register_producer(types!(EnglishGreeter: dyn Greeter), Producer::new(|_| Ok(EnglishGreeter)))
///   .unwrap();
///
/// let greeter = resolve!(trait Greeter);
/// assert_eq!(greeter.greet(), "Hello!");
/// ```
#[cfg(feature = "global")]
#[macro_export]
macro_rules! resolve {
  (trait $trait_ident:ident) => {
    $crate::resolve_from!($crate::global(), dyn $trait_ident)
  };

  (trait $trait_ident:ident, $($qualifier:expr),+ $(,)?) => {
    $crate::resolve_from!($crate::global(), dyn $trait_ident, $($qualifier),+)
  };

  ($type:ty) => {
    $crate::resolve_from!($crate::global(), $type)
  };

  ($type:ty, $($qualifier:expr),+ $(,)?) => {
    $crate::resolve_from!($crate::global(), $type, $($qualifier),+)
  };
}

/// Resolves a component from the given factory, returning the
/// [`Result`](crate::Result).
#[macro_export]
macro_rules! maybe_resolve_from {
  ($factory:expr, $type:ty) => {
    $factory.get_object::<$type>($crate::Qualifiers::new())
  };

  ($factory:expr, $type:ty, $($qualifier:expr),+ $(,)?) => {
    $factory.get_object::<$type>($crate::qualifiers![$($qualifier),+])
  };
}

/// Resolves a component from the given factory, panicking on failure.
///
/// ```
/// use compose_ioc::{resolve_from, ObjectFactory, Producer, TypeSet};
///
/// let factory = ObjectFactory::new();
/// factory.register_producer(TypeSet::<u32>::of(), Producer::new(|_| Ok(42u32))).unwrap();
/// assert_eq!(*resolve_from!(factory, u32), 42);
/// ```
#[macro_export]
macro_rules! resolve_from {
  ($factory:expr, $type:ty) => {
    $factory
      .get_object::<$type>($crate::Qualifiers::new())
      .unwrap_or_else(|error| {
        panic!(
          "Failed to resolve required component {}: {}",
          ::std::any::type_name::<$type>(),
          error
        )
      })
  };

  ($factory:expr, $type:ty, $($qualifier:expr),+ $(,)?) => {
    $factory
      .get_object::<$type>($crate::qualifiers![$($qualifier),+])
      .unwrap_or_else(|error| {
        panic!(
          "Failed to resolve required component {}: {}",
          ::std::any::type_name::<$type>(),
          error
        )
      })
  };
}
