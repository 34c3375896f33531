use compose_ioc::{resolve_from, types, Args, ClassMetadata, Component, Inject, ObjectFactory};
use std::panic;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct UnregisteredService;

struct Mailer {
  _transport: Arc<UnregisteredService>,
}

impl Component for Mailer {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new().constructor(
      [Inject::<UnregisteredService>::new("transport").into()],
      |args: &mut Args| {
        Ok(Mailer {
          _transport: args.arg::<UnregisteredService>()?,
        })
      },
    )
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  // --- Using the panicking `resolve_from!` macro ---
  println!("Attempting to resolve a component that was never registered...");
  let empty = ObjectFactory::named("empty");
  let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
    // This line will panic!
    let _service = resolve_from!(empty, UnregisteredService);
  }));
  assert!(result.is_err(), "resolve_from! should have panicked.");
  println!("Successfully caught the expected panic from resolve_from!.");

  // --- Validation catches the missing dependency up front ---
  println!("\nNow, registering a component with an unsatisfied constructor parameter...");
  let factory = ObjectFactory::named("broken");
  factory.register(types!(Mailer)).unwrap();

  match factory.get::<Mailer>() {
    Ok(_) => panic!("Should not have created the mailer!"),
    Err(error) => println!("Correctly received: {}", error),
  }

  // The failure is sticky: every later call reports the same error.
  assert!(factory.seal().unwrap_err().is_unsatisfied());
}
