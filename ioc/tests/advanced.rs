use compose_ioc::{
  describe, qualifiers, types, Args, ClassMetadata, Component, DynError, FactoryError, Inject,
  InjectAll, Instance, Marker, ObjectFactory, Producer, Qualifier, Qualifiers, Scope,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

// --- Advanced Test Fixtures ---

trait Logger: Send + Sync {
  fn log(&self, message: &str) -> String;
}

struct ConsoleLogger;
impl Logger for ConsoleLogger {
  fn log(&self, message: &str) -> String {
    format!("console: {}", message)
  }
}
impl Component for ConsoleLogger {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new().singleton().default_constructor(|| ConsoleLogger)
  }
}

struct FileLogger;
impl Logger for FileLogger {
  fn log(&self, message: &str) -> String {
    format!("file: {}", message)
  }
}
impl Component for FileLogger {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new().default_constructor(|| FileLogger)
  }
}

trait Service: Send + Sync {
  fn run(&self) -> String;
}

// Constructor injection.
struct ServiceImpl {
  logger: Arc<dyn Logger>,
}
impl Service for ServiceImpl {
  fn run(&self) -> String {
    self.logger.log("run")
  }
}
impl Component for ServiceImpl {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new().constructor(
      [Inject::<dyn Logger>::new("logger").into()],
      |args: &mut Args| {
        Ok(ServiceImpl {
          logger: args.arg::<dyn Logger>()?,
        })
      },
    )
  }
}

#[derive(Default)]
struct Settings {
  retries: u32,
}

// Field and method injection on an existing object.
#[derive(Default)]
struct Reporter {
  logger: Option<Arc<dyn Logger>>,
  settings: Option<Arc<Settings>>,
  configured_with: Option<u32>,
}
impl Component for Reporter {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
      .default_constructor(Reporter::default)
      .field(Inject::<dyn Logger>::new("logger"), |reporter: &mut Reporter, logger| {
        reporter.logger = Some(logger)
      })
      .field(Inject::<Settings>::new("settings"), |reporter: &mut Reporter, settings| {
        reporter.settings = Some(settings)
      })
      .method(
        "configure",
        [Inject::<Settings>::new("settings").into()],
        |reporter: &mut Reporter, args: &mut Args| {
          reporter.configured_with = Some(args.arg::<Settings>()?.retries);
          Ok(())
        },
      )
  }
}

// Provider-of-many field.
#[derive(Default)]
struct Broadcaster {
  loggers: Option<Instance<dyn Logger>>,
}
impl Component for Broadcaster {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
      .default_constructor(Broadcaster::default)
      .field_all(
        InjectAll::<dyn Logger>::new("loggers").qualified(Qualifier::ANY),
        |broadcaster: &mut Broadcaster, loggers| broadcaster.loggers = Some(loggers),
      )
  }
}

// Needs a qualified logger nobody registers.
struct Auditor {
  _logger: Arc<dyn Logger>,
}
impl Component for Auditor {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new().constructor(
      [Inject::<dyn Logger>::new("logger").qualified(Qualifier::new("Audit")).into()],
      |args: &mut Args| {
        Ok(Auditor {
          _logger: args.arg::<dyn Logger>()?,
        })
      },
    )
  }
}

// Receives its own factory.
struct Locator {
  factory: Arc<ObjectFactory>,
}
impl Component for Locator {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new().constructor(
      [Inject::<ObjectFactory>::new("factory").into()],
      |args: &mut Args| {
        Ok(Locator {
          factory: args.arg::<ObjectFactory>()?,
        })
      },
    )
  }
}

// A dependency cycle: Chicken -> Egg -> Chicken.
struct Chicken {
  _egg: Arc<Egg>,
}
struct Egg {
  _chicken: Arc<Chicken>,
}
impl Component for Chicken {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
      .singleton()
      .constructor([Inject::<Egg>::new("egg").into()], |args: &mut Args| {
        Ok(Chicken { _egg: args.arg::<Egg>()? })
      })
  }
}
impl Component for Egg {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
      .singleton()
      .constructor([Inject::<Chicken>::new("chicken").into()], |args: &mut Args| {
        Ok(Egg {
          _chicken: args.arg::<Chicken>()?,
        })
      })
  }
}

// A base class and a class extending it.
#[derive(Default)]
struct BaseWorker {
  logger: Option<Arc<dyn Logger>>,
  trace: Vec<&'static str>,
}
impl Component for BaseWorker {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
      .default_constructor(BaseWorker::default)
      .field(Inject::<dyn Logger>::new("logger"), |worker: &mut BaseWorker, logger| {
        worker.logger = Some(logger)
      })
      .post_construct("base_init", |worker: &mut BaseWorker| {
        worker.trace.push("base_init");
        Ok(())
      })
      .pre_destroy("base_close", |_| {})
  }
}

#[derive(Default)]
struct Worker {
  base: BaseWorker,
  settings: Option<Arc<Settings>>,
}
impl Component for Worker {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
      .default_constructor(Worker::default)
      .extends::<BaseWorker>(|worker| &mut worker.base, |worker| &worker.base)
      .field(Inject::<Settings>::new("settings"), |worker: &mut Worker, settings| {
        worker.settings = Some(settings)
      })
      .post_construct("worker_init", |worker: &mut Worker| {
        worker.base.trace.push("worker_init");
        Ok(())
      })
      .pre_destroy("worker_close", |_| {})
  }
}

struct Fragile;
impl Component for Fragile {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new().constructor(Vec::new(), |_: &mut Args| -> Result<Fragile, DynError> {
      Err("disk full".into())
    })
  }
}

struct Abstract;
impl Component for Abstract {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
  }
}

// Two constructor parameters; records how many arguments were left.
struct Pipeline {
  logger: Arc<dyn Logger>,
  settings: Arc<Settings>,
  remaining: Vec<usize>,
}
impl Component for Pipeline {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new().constructor(
      [
        Inject::<dyn Logger>::new("logger").into(),
        Inject::<Settings>::new("settings")
          .marker(Marker::Other("Config".into()))
          .into(),
      ],
      |args: &mut Args| {
        let before = args.remaining();
        let logger = args.arg::<dyn Logger>()?;
        let settings = args.arg::<Settings>()?;
        Ok(Pipeline {
          logger,
          settings,
          remaining: vec![before, args.remaining()],
        })
      },
    )
  }
}

// Never registered.
struct Gauge;

// A base whose field cannot be satisfied, and a class extending it.
#[derive(Default)]
struct Meter {
  _gauge: Option<Arc<Gauge>>,
}
impl Component for Meter {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
      .default_constructor(Meter::default)
      .field(Inject::<Gauge>::new("gauge"), |meter: &mut Meter, gauge| meter._gauge = Some(gauge))
  }
}

#[derive(Default)]
struct Dashboard {
  meter: Meter,
}
impl Component for Dashboard {
  fn metadata() -> ClassMetadata<Self> {
    ClassMetadata::new()
      .default_constructor(Dashboard::default)
      .extends::<Meter>(|dashboard| &mut dashboard.meter, |dashboard| &dashboard.meter)
  }
}

// Counts error events, which the factory emits once per failed validation.
struct ErrorCounter(Arc<AtomicUsize>);
impl<S: tracing::Subscriber> Layer<S> for ErrorCounter {
  fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
    if *event.metadata().level() == tracing::Level::ERROR {
      self.0.fetch_add(1, Ordering::SeqCst);
    }
  }
}

fn settings_producer() -> Producer<Settings> {
  Producer::new(|_| Ok(Settings { retries: 3 }))
}

// --- Injection Tests ---

#[test]
fn test_constructor_injection_shares_the_singleton_logger() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
  factory
    .register_with(types!(ServiceImpl: dyn Service), Scope::Singleton, Qualifiers::new())
    .unwrap();

  // Act
  let service = factory.get::<ServiceImpl>().unwrap();
  let logger = factory.get::<dyn Logger>().unwrap();

  // Assert
  assert!(Arc::ptr_eq(&service.logger, &logger));
  assert_eq!(factory.get::<dyn Service>().unwrap().run(), "console: run");
}

#[test]
fn test_inject_populates_fields_and_invokes_methods() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
  factory.register_producer(types!(Settings), settings_producer()).unwrap();
  let mut reporter = Reporter::default();

  // Act
  let injected = factory.inject(&mut reporter).map(|r| r.configured_with);

  // Assert
  assert_eq!(injected.unwrap(), Some(3));
  assert!(reporter.logger.is_some());
  assert_eq!(reporter.settings.as_ref().map(|s| s.retries), Some(3));
}

#[test]
fn test_failed_inject_keeps_assigned_fields() {
  // Arrange: the logger resolves, the settings do not.
  let factory = ObjectFactory::new();
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
  let mut reporter = Reporter::default();

  // Act
  let error = factory.inject(&mut reporter).map(|_| ()).unwrap_err();

  // Assert
  assert!(reporter.logger.is_some());
  assert!(reporter.settings.is_none());
  match error {
    FactoryError::Unsatisfied {
      member: Some(member),
      ..
    } => {
      assert_eq!(member.name, "settings");
      assert_eq!(member.declaring_type, std::any::type_name::<Reporter>());
    }
    other => panic!("expected an unsatisfied dependency, got {:?}", other),
  }
}

#[test]
fn test_provider_of_many_field_receives_every_match() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
  factory
    .register_with(types!(FileLogger: dyn Logger), Scope::Prototype, qualifiers!["Durable"])
    .unwrap();
  factory.register(types!(Broadcaster)).unwrap();

  // Act
  let broadcaster = factory.get::<Broadcaster>().unwrap();

  // Assert
  let loggers = broadcaster.loggers.as_ref().unwrap();
  assert_eq!(loggers.len(), 2);
  let mut lines = loggers
    .iter()
    .map(|logger| logger.map(|l| l.log("hi")))
    .collect::<Result<Vec<_>, _>>()
    .unwrap();
  lines.sort();
  assert_eq!(lines, vec!["console: hi".to_string(), "file: hi".to_string()]);
}

#[test]
fn test_factory_parameter_needs_no_registration() {
  // Arrange
  let factory = ObjectFactory::named("locating");
  factory.register(types!(Locator)).unwrap();

  // Act
  let locator = factory.get::<Locator>().unwrap();

  // Assert
  assert_eq!(locator.factory.name(), "locating");
}

#[test]
fn test_hierarchy_runs_members_most_derived_first() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
  factory.register_producer(types!(Settings), settings_producer()).unwrap();
  factory.register(types!(Worker)).unwrap();

  // Act
  let worker = factory.get::<Worker>().unwrap();

  // Assert
  assert!(worker.base.logger.is_some());
  assert!(worker.settings.is_some());
  assert_eq!(worker.base.trace, vec!["worker_init", "base_init"]);

  let metadata = describe::<Worker>();
  let fields: Vec<String> = metadata.fields().map(|f| f.member().to_string()).collect();
  assert_eq!(
    fields,
    vec![
      format!("{}::settings", std::any::type_name::<Worker>()),
      format!("{}::logger", std::any::type_name::<BaseWorker>()),
    ]
  );
  assert_eq!(
    metadata.pre_destroy_hooks().collect::<Vec<_>>(),
    vec!["worker_close", "base_close"]
  );
  assert_eq!(
    metadata.post_construct_hooks().collect::<Vec<_>>(),
    vec!["worker_init", "base_init"]
  );
  assert!(metadata.has_default_constructor());
  assert!(!metadata.has_injectable_constructor());
  assert!(metadata.constructor_params().is_empty());
}

#[test]
fn test_constructor_consumes_arguments_in_declaration_order() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
  factory.register_producer(types!(Settings), settings_producer()).unwrap();
  factory.register(types!(Pipeline)).unwrap();

  // Act
  let pipeline = factory.get::<Pipeline>().unwrap();

  // Assert
  assert_eq!(pipeline.remaining, vec![2, 0]);
  assert_eq!(pipeline.logger.log("x"), "console: x");
  assert_eq!(pipeline.settings.retries, 3);

  let metadata = describe::<Pipeline>();
  assert!(metadata.has_injectable_constructor());
  assert!(!metadata.has_default_constructor());
  let params: Vec<&str> = metadata
    .constructor_params()
    .iter()
    .map(|p| p.member().name.as_str())
    .collect();
  assert_eq!(params, vec!["new(logger)", "new(settings)"]);
  // Markers other than qualifiers are carried but add no qualifiers.
  let settings = &metadata.constructor_params()[1];
  assert_eq!(settings.markers(), &[Marker::Other("Config".into())]);
  assert!(settings.qualifiers().is_empty());
}

#[test]
fn test_metadata_lists_injectable_methods() {
  // Arrange & Act
  let metadata = describe::<Reporter>();
  let methods: Vec<(&str, Vec<String>)> = metadata
    .methods()
    .map(|(name, params)| (name, params.iter().map(|p| p.member().name.clone()).collect()))
    .collect();

  // Assert
  assert_eq!(methods, vec![("configure", vec!["configure(settings)".to_string()])]);
}

#[test]
fn test_producer_resolves_its_own_dependencies() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register_producer(types!(Settings), settings_producer()).unwrap();
  factory
    .register_producer(
      types!(String),
      Producer::new(|factory: &ObjectFactory| {
        let settings = factory.get::<Settings>()?;
        Ok(format!("retries={}", settings.retries))
      }),
    )
    .unwrap();

  // Act
  let summary = factory.get::<String>().unwrap();

  // Assert
  assert_eq!(summary.as_str(), "retries=3");
}

#[test]
fn test_factory_error_survives_a_producer() {
  // Arrange: producers are not validated, so the missing dependency shows up
  // on creation.
  let factory = ObjectFactory::new();
  factory
    .register_producer(
      types!(String),
      Producer::new(|factory: &ObjectFactory| {
        let settings = factory.get::<Settings>()?;
        Ok(settings.retries.to_string())
      }),
    )
    .unwrap();

  // Act
  let result = factory.get::<String>();

  // Assert
  assert!(result.unwrap_err().is_unsatisfied());
}

#[test]
fn test_constructor_failure_is_a_creation_error() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(Fragile)).unwrap();
  factory.register(types!(Abstract)).unwrap();

  // Act
  let fragile = factory.get::<Fragile>().map(|_| ()).unwrap_err();
  let abstract_ = factory.get::<Abstract>().map(|_| ()).unwrap_err();

  // Assert
  assert!(fragile.to_string().contains("disk full"));
  assert!(matches!(abstract_, FactoryError::Creation { .. }));
}

// --- Validation Tests ---

#[test]
fn test_validation_failure_is_stored() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
  factory.register(types!(Auditor)).unwrap();

  // Act
  let first = factory.get::<dyn Logger>().map(|_| ()).unwrap_err();
  let second = factory.select::<dyn Logger>(Qualifiers::new()).map(|_| ()).unwrap_err();

  // Assert
  assert_eq!(first.to_string(), second.to_string());
  match first {
    FactoryError::Unsatisfied {
      qualifiers,
      member: Some(member),
      ..
    } => {
      assert_eq!(qualifiers, qualifiers!["Audit"]);
      assert_eq!(member.name, "new(logger)");
    }
    other => panic!("expected an unsatisfied dependency, got {:?}", other),
  }
  assert!(matches!(
    factory.register(types!(FileLogger: dyn Logger)),
    Err(FactoryError::Sealed)
  ));
}

#[test]
fn test_validation_reports_ambiguous_constructor_parameters() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
  factory.register(types!(FileLogger: dyn Logger)).unwrap();
  factory.register(types!(ServiceImpl: dyn Service)).unwrap();

  // Act
  let result = factory.seal();

  // Assert
  assert!(matches!(
    result,
    Err(FactoryError::Ambiguous {
      candidates: 2,
      member: Some(_),
      ..
    })
  ));
}

#[test]
fn test_validation_covers_inherited_fields() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(Dashboard)).unwrap();

  // Act
  let result = factory.seal();

  // Assert
  match result {
    Err(FactoryError::Unsatisfied {
      type_name,
      member: Some(member),
      ..
    }) => {
      assert_eq!(type_name, std::any::type_name::<Gauge>());
      assert_eq!(member.declaring_type, std::any::type_name::<Meter>());
      assert_eq!(member.name, "gauge");
    }
    other => panic!("expected an unsatisfied dependency, got {:?}", other),
  }
}

#[test]
fn test_circular_dependency_is_reported() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(Chicken)).unwrap();
  factory.register(types!(Egg)).unwrap();

  // Act
  let result = factory.get::<Chicken>().map(|_| ());

  // Assert
  assert!(matches!(result, Err(FactoryError::Circular { .. })));
  // The failed attempt leaves nothing half-built behind.
  assert!(factory.definitions().all(|instance| !instance.is_live()));
}

// --- Concurrency Tests ---

#[test]
fn test_concurrent_first_requests_create_one_singleton() {
  // Arrange
  let factory = ObjectFactory::new();
  let created = Arc::new(AtomicUsize::new(0));
  let counter = created.clone();
  factory
    .register_producer_with(
      types!(Settings),
      Producer::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Ok(Settings { retries: 5 })
      }),
      Scope::Singleton,
      Qualifiers::new(),
    )
    .unwrap();

  // Act
  let resolved: Vec<Arc<Settings>> = thread::scope(|scope| {
    let handles: Vec<_> = (0..8)
      .map(|_| scope.spawn(|| factory.get::<Settings>().unwrap()))
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  // Assert
  assert_eq!(created.load(Ordering::SeqCst), 1);
  assert!(resolved.iter().all(|s| Arc::ptr_eq(s, &resolved[0])));
}

#[test]
fn test_concurrent_first_requests_validate_once() {
  // Arrange
  let factory = ObjectFactory::new();
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();
  factory.register(types!(Auditor)).unwrap();
  let failures = Arc::new(AtomicUsize::new(0));
  let subscriber = tracing_subscriber::registry().with(ErrorCounter(failures.clone()));
  let dispatch = tracing::Dispatch::new(subscriber);
  let barrier = Barrier::new(8);

  // Act
  let errors: Vec<String> = thread::scope(|scope| {
    let handles: Vec<_> = (0..8)
      .map(|i| {
        let (factory, dispatch, barrier) = (&factory, &dispatch, &barrier);
        scope.spawn(move || {
          let _default = tracing::dispatcher::set_default(dispatch);
          barrier.wait();
          let result = if i % 2 == 0 {
            factory.seal()
          } else {
            factory.get::<dyn Logger>().map(|_| ())
          };
          result.unwrap_err().to_string()
        })
      })
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  // Assert
  assert_eq!(failures.load(Ordering::SeqCst), 1);
  assert!(errors.iter().all(|e| e == &errors[0]));
  assert!(errors[0].contains("new(logger)"));
}

#[test]
fn test_factory_clones_share_one_registry() {
  // Arrange
  let factory = ObjectFactory::new();
  let clone = factory.clone();
  factory.register(types!(ConsoleLogger: dyn Logger)).unwrap();

  // Act
  let from_clone = thread::spawn(move || clone.get::<dyn Logger>().unwrap())
    .join()
    .unwrap();
  let from_original = factory.get::<dyn Logger>().unwrap();

  // Assert
  assert!(Arc::ptr_eq(&from_clone, &from_original));
}
