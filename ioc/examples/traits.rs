use compose_ioc::{types, Args, ClassMetadata, Component, Inject, ObjectFactory};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// 1. Define the abstraction (the trait)
trait Logger: Send + Sync {
  fn log(&self, message: &str);
}

// 2. Define a concrete implementation
struct ConsoleLogger;
impl Logger for ConsoleLogger {
  fn log(&self, message: &str) {
    println!("[CONSOLE LOG]: {}", message);
  }
}
impl Component for ConsoleLogger {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new().singleton().default_constructor(|| ConsoleLogger)
  }
}

// 3. Define a component that depends on the abstraction
struct ReportService {
  logger: Arc<dyn Logger>,
}

impl ReportService {
  fn generate_report(&self) {
    self.logger.log("Starting report generation.");
    self.logger.log("Finished report generation.");
  }
}

impl Component for ReportService {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
      .singleton()
      .constructor([Inject::<dyn Logger>::new("logger").into()], |args: &mut Args| {
        Ok(ReportService {
          logger: args.arg::<dyn Logger>()?,
        })
      })
      .post_construct("announce", |service: &mut ReportService| {
        service.logger.log("ReportService ready.");
        Ok(())
      })
      .pre_destroy("farewell", |service| service.logger.log("ReportService shutting down."))
  }
}

fn main() {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let factory = ObjectFactory::named("traits-example");

  // --- Registration ---
  // ConsoleLogger is served as `dyn Logger`; the upcast is recorded by `types!`.
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
  // ReportService receives the logger through its constructor.
  factory.register(types!(ReportService)).unwrap();

  // Validate the whole graph before anything is created.
  factory.seal().expect("every dependency is satisfied");

  // --- Resolution and Usage ---
  println!("Resolving the high-level component...");
  let report_service = factory.get::<ReportService>().unwrap();
  report_service.generate_report();

  let logger = factory.get::<dyn Logger>().unwrap();
  assert!(Arc::ptr_eq(&report_service.logger, &logger));

  factory.destroy();
}
