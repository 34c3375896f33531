//! # Compose IoC
//!
//! A lightweight object composition container for Rust.
//!
//! Compose IoC resolves a requested type and qualifier set to exactly one live
//! object. It manages each object's lifecycle (singleton or prototype),
//! performs constructor, field and method injection, and checks the whole
//! dependency graph for unsatisfied or ambiguous dependencies before the
//! first object is handed out.
//!
//! ## Core Concepts
//!
//! - **ObjectFactory**: the registry. Registrations are accepted until the
//!   first resolution, which validates and seals it.
//! - **Component**: an implementation type describing its injectable
//!   constructor, fields, methods and lifecycle hooks through
//!   [`ClassMetadata`].
//! - **Producer**: a creation function registered in place of a class.
//! - **Qualifiers**: tags that discriminate between registrations of the same
//!   type. Unqualified registrations carry `@Default`; `@Any` is a wildcard.
//! - **Instance**: a lazily resolved, narrowable view over every matching
//!   registration.
//!
//! ## Quick Start
//!
//! ```
//! use compose_ioc::{types, ClassMetadata, Component, Inject, ObjectFactory, Qualifiers, Scope};
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!   fn log(&self, message: &str) -> String;
//! }
//!
//! struct ConsoleLogger;
//!
//! impl Logger for ConsoleLogger {
//!   fn log(&self, message: &str) -> String {
//!     format!("[console] {}", message)
//!   }
//! }
//!
//! impl Component for ConsoleLogger {
//!   fn metadata() -> ClassMetadata<Self> {
//!     ClassMetadata::new().singleton().default_constructor(|| ConsoleLogger)
//!   }
//! }
//!
//! trait Service: Send + Sync {
//!   fn run(&self) -> String;
//! }
//!
//! struct ServiceImpl {
//!   logger: Arc<dyn Logger>,
//! }
//!
//! impl Service for ServiceImpl {
//!   fn run(&self) -> String {
//!     self.logger.log("running")
//!   }
//! }
//!
//! impl Component for ServiceImpl {
//!   fn metadata() -> ClassMetadata<Self> {
//!     ClassMetadata::new().constructor([Inject::<dyn Logger>::new("logger").into()], |args| {
//!       Ok(ServiceImpl { logger: args.arg::<dyn Logger>()? })
//!     })
//!   }
//! }
//!
//! let factory = ObjectFactory::new();
//! factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
//! factory
//!   .register_with(types!(ServiceImpl: dyn Service), Scope::Singleton, Qualifiers::new())
//!   .unwrap();
//!
//! let service = factory.get::<dyn Service>().unwrap();
//! assert_eq!(service.run(), "[console] running");
//! ```

mod container;
mod core;
mod definition;
mod error;
#[cfg(feature = "global")]
mod global;
mod instance;
mod macros;
mod metadata;
mod object_instance;
mod qualifier;

pub use crate::container::ObjectFactory;
pub use crate::core::{AnyObject, DynError, Object, TypeKey};
pub use crate::definition::{ObjectDefinition, Producer, Scope, TypeBinding, TypeSet};
pub use crate::error::{FactoryError, Member, Result};
#[cfg(feature = "global")]
pub use crate::global::global;
pub use crate::instance::{Instance, Iter};
pub use crate::metadata::{
  describe, Args, ClassMetadata, Component, Inject, InjectAll, InjectionPoint,
};
pub use crate::object_instance::ObjectInstance;
pub use crate::qualifier::{matches, parse_qualifiers, parse_scope, Marker, Qualifier, Qualifiers};
