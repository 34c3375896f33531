//! The process-wide object factory.

use crate::container::ObjectFactory;
use once_cell::sync::Lazy;

// Created on first access in a thread-safe manner.
static GLOBAL_FACTORY: Lazy<ObjectFactory> = Lazy::new(|| ObjectFactory::named("global"));

/// Provides a reference to the global factory.
///
/// Like any factory it accepts registrations until its first resolution, so
/// register everything during start-up before resolving.
///
/// # Examples
///
/// ```
/// use compose_ioc::{global, Producer, TypeSet};
///
/// fn register_settings() {
///   global()
///     .register_producer(
///       TypeSet::<String>::of(),
///       Producer::new(|_| Ok("Hello from global!".to_string())),
///     )
///     .expect("the global factory is still building");
/// }
/// # register_settings();
/// ```
pub fn global() -> &'static ObjectFactory {
  &GLOBAL_FACTORY
}
