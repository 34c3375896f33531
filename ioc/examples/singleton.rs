use compose_ioc::{types, ObjectFactory, Producer, Qualifier, Qualifiers, Scope};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tracing_subscriber::EnvFilter;

// A simple component that gets a unique ID upon creation.
struct RequestTracker {
  id: usize,
}

// A global, thread-safe counter to generate unique IDs.
static ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn tracker() -> Producer<RequestTracker> {
  Producer::new(|_| {
    Ok(RequestTracker {
      id: ID_COUNTER.fetch_add(1, Ordering::SeqCst),
    })
  })
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let factory = ObjectFactory::named("singleton-example");

  // --- Singleton Registration ---
  // This producer will only be called ONCE.
  factory
    .register_producer_with(
      types!(RequestTracker),
      tracker().on_destroy(|t| println!("Destroying SINGLETON RequestTracker {}", t.id)),
      Scope::Singleton,
      Qualifier::named("singleton_tracker"),
    )
    .expect("factory is still building");

  // --- Prototype Registration ---
  // This producer will be called EVERY time the component is resolved.
  factory
    .register_producer_with(
      types!(RequestTracker),
      tracker(),
      Scope::Prototype,
      Qualifier::named("prototype_tracker"),
    )
    .expect("factory is still building");

  println!("--- Resolving Singletons ---");
  let singleton = Qualifier::named("singleton_tracker");
  let s1 = factory.get_object::<RequestTracker>(singleton.clone()).unwrap();
  let s2 = factory.get_object::<RequestTracker>(singleton).unwrap();
  println!("Singleton 1 ID: {}, Singleton 2 ID: {}", s1.id, s2.id);
  assert_eq!(s1.id, 0);
  assert!(Arc::ptr_eq(&s1, &s2), "Singleton instances should be identical");

  println!("--- Resolving Prototypes ---");
  let prototype = Qualifier::named("prototype_tracker");
  let p1 = factory.get_object::<RequestTracker>(prototype.clone()).unwrap();
  let p2 = factory.get_object::<RequestTracker>(prototype).unwrap();
  println!("Prototype 1 ID: {}, Prototype 2 ID: {}", p1.id, p2.id);
  assert_eq!((p1.id, p2.id), (1, 2));
  assert!(!Arc::ptr_eq(&p1, &p2), "Prototype instances should be different");

  println!("--- Teardown ---");
  let destroyed = factory.destroy();
  println!("Destroyed {} singleton(s).", destroyed);
  assert_eq!(destroyed, 1);

  // Nothing matches an unqualified request: both registrations are qualified.
  assert!(factory
    .select::<RequestTracker>(Qualifiers::new())
    .unwrap()
    .is_unsatisfied());
}
