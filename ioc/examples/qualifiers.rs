use compose_ioc::{qualifiers, types, ClassMetadata, Component, ObjectFactory, Qualifier, Scope};
use tracing_subscriber::EnvFilter;

trait Handler: Send + Sync {
  fn handle(&self) -> String;
}

struct JsonHandler;
impl Handler for JsonHandler {
  fn handle(&self) -> String {
    "json".to_string()
  }
}
impl Component for JsonHandler {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
      .qualified(Qualifier::new("Http"))
      .default_constructor(|| JsonHandler)
  }
}

struct CompressedJsonHandler;
impl Handler for CompressedJsonHandler {
  fn handle(&self) -> String {
    "json+gzip".to_string()
  }
}
impl Component for CompressedJsonHandler {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new().default_constructor(|| CompressedJsonHandler)
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let factory = ObjectFactory::named("qualifiers-example");

  // Qualifiers read from the class markers: {Http}.
  factory.register(types!(JsonHandler: dyn Handler)).unwrap();
  // Explicit qualifiers: {Http, Compressed}.
  factory
    .register_with(
      types!(CompressedJsonHandler: dyn Handler),
      Scope::Singleton,
      qualifiers!["Http", "Compressed"],
    )
    .unwrap();

  let http = factory.select::<dyn Handler>(qualifiers!["Http"]).unwrap();
  println!("{} handlers carry @Http; ambiguous: {}", http.len(), http.is_ambiguous());
  for handler in &http {
    println!("  -> {}", handler.unwrap().handle());
  }

  // Narrowing accumulates qualifiers.
  let compressed = http.select(qualifiers!["Compressed"]);
  println!("Narrowed to {}: {}", compressed.qualifiers(), compressed.get().unwrap().handle());
  assert_eq!(compressed.get().unwrap().handle(), "json+gzip");

  // @Any matches every registration of the type.
  let all = factory.select::<dyn Handler>(Qualifier::ANY).unwrap();
  assert_eq!(all.len(), 2);
}
