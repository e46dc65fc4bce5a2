//! Integration tests for ordered initialization, unwinding and teardown.

use std::sync::Arc;

use ordo_core::{
    Dependency, InitError, LifecycleConfig, Module, ModuleError, ModuleRegistry, ModuleState,
};
use parking_lot::Mutex;

fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("ordo_core=trace")
        .with_test_writer()
        .try_init();
}

/// Shared log of hook calls.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn push(&self, event: String) {
        self.0.lock().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    fn count(&self, event: &str) -> usize {
        self.0.lock().iter().filter(|e| *e == event).count()
    }
}

/// Declares a module type whose hooks write to a [`Recorder`].
macro_rules! recorded_module {
    ($ty:ident $(, deps = [$($dep:expr),*])? $(, fails = $fails:expr)?) => {
        struct $ty(Recorder);

        impl Module for $ty {
            fn dependencies(&self) -> Vec<Dependency> {
                vec![$($($dep),*)?]
            }

            fn on_init(&mut self) -> Result<(), InitError> {
                self.0.push(format!("init {}", stringify!($ty)));
                let fails = false $(|| $fails)?;
                if fails {
                    return Err(InitError::new(concat!(stringify!($ty), " unavailable")));
                }
                Ok(())
            }

            fn on_exit(&mut self) {
                self.0.push(format!("exit {}", stringify!($ty)));
            }
        }
    };
}

recorded_module!(A);
recorded_module!(B, deps = [Dependency::on::<A>()]);
recorded_module!(C, deps = [Dependency::on::<B>(), Dependency::named("D")]);
recorded_module!(X, deps = [Dependency::on::<Y>()]);
recorded_module!(Y, deps = [Dependency::on::<X>()]);
recorded_module!(Base);
recorded_module!(Left, deps = [Dependency::on::<Base>()]);
recorded_module!(Right, deps = [Dependency::named("Base")]);
recorded_module!(Top, deps = [Dependency::on::<Left>(), Dependency::on::<Right>()]);
recorded_module!(Leaf, deps = [Dependency::on::<Top>()]);
recorded_module!(Broken, deps = [Dependency::on::<Left>()], fails = true);

fn position(order: &[String], name: &str) -> usize {
    order
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{name} not initialized"))
}

#[test]
fn test_acyclic_graph_initializes_after_dependencies() {
    setup();
    let log = Recorder::default();
    let mut registry = ModuleRegistry::new();
    registry.register(Leaf(log.clone())).unwrap();
    registry.register(Right(log.clone())).unwrap();
    registry.register(Top(log.clone())).unwrap();
    registry.register(Base(log.clone())).unwrap();
    registry.register(Left(log.clone())).unwrap();

    registry.initialize_all().unwrap();
    assert!(registry.are_initialized());

    let order: Vec<String> = registry
        .order()
        .iter()
        .map(|&id| registry.name(id).unwrap().to_string())
        .collect();
    let edges = [
        ("Left", "Base"),
        ("Right", "Base"),
        ("Top", "Left"),
        ("Top", "Right"),
        ("Leaf", "Top"),
    ];
    for (dependent, dependency) in edges {
        assert!(
            position(&order, dependency) < position(&order, dependent),
            "{dependency} must come before {dependent} in {order:?}"
        );
    }

    let inits: Vec<String> = order.iter().map(|name| format!("init {name}")).collect();
    assert_eq!(log.events(), inits);
}

#[test]
fn test_missing_named_dependency_unwinds_initialized_modules() {
    setup();
    let log = Recorder::default();
    let mut registry = ModuleRegistry::new();
    registry.register(A(log.clone())).unwrap();
    registry.register(B(log.clone())).unwrap();
    registry.register(C(log.clone())).unwrap();

    match registry.initialize_all() {
        Err(ModuleError::MissingDependency { dependency, required_by }) => {
            assert_eq!(dependency, "D");
            assert_eq!(required_by, "C");
        }
        other => panic!("expected missing dependency, got {other:?}"),
    }

    assert_eq!(log.events(), ["init A", "init B", "exit B", "exit A"]);
    assert_eq!(log.count("init C"), 0);
    assert!(registry.is_empty());
}

#[test]
fn test_cycle_detected_without_hook_calls() {
    setup();
    let log = Recorder::default();
    let mut registry = ModuleRegistry::new();
    registry.register(X(log.clone())).unwrap();
    registry.register(Y(log.clone())).unwrap();

    let err = registry.initialize_all().unwrap_err();
    match &err {
        ModuleError::CircularDependency { module, cycle } => {
            assert!(module == "X" || module == "Y");
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.iter().any(|name| name == "X"));
            assert!(cycle.iter().any(|name| name == "Y"));
        }
        other => panic!("expected a cycle, got {other:?}"),
    }
    assert!(err.to_string().contains("X -> Y -> X"));
    assert!(log.events().is_empty());
    assert!(registry.is_empty());
}

#[test]
fn test_cycle_after_initialized_modules_unwinds_them() {
    setup();
    let log = Recorder::default();
    let mut registry = ModuleRegistry::new();
    registry.register(A(log.clone())).unwrap();
    registry.register(X(log.clone())).unwrap();
    registry.register(Y(log.clone())).unwrap();

    let err = registry.initialize_all().unwrap_err();
    assert!(matches!(err, ModuleError::CircularDependency { .. }));
    assert_eq!(log.events(), ["init A", "exit A"]);
}

#[test]
fn test_init_failure_unwinds_in_exact_reverse() {
    setup();
    let log = Recorder::default();
    let mut registry = ModuleRegistry::new();
    registry.register(Right(log.clone())).unwrap();
    registry.register(Broken(log.clone())).unwrap();
    registry.register(Left(log.clone())).unwrap();
    registry.register(Base(log.clone())).unwrap();

    let err = registry.initialize_all().unwrap_err();
    match &err {
        ModuleError::InitFailed { module, source } => {
            assert_eq!(module, "Broken");
            assert_eq!(source.message(), "Broken unavailable");
        }
        other => panic!("expected init failure, got {other:?}"),
    }
    assert!(std::error::Error::source(&err).is_some());

    assert_eq!(
        log.events(),
        [
            "init Base",
            "init Right",
            "init Left",
            "init Broken",
            "exit Left",
            "exit Right",
            "exit Base",
        ]
    );
    assert_eq!(log.count("exit Broken"), 0);
    assert!(registry.is_empty());
}

#[test]
fn test_clean_up_all_is_idempotent() {
    setup();
    let log = Recorder::default();
    let mut registry = ModuleRegistry::new();
    registry.register(C(log.clone())).unwrap();
    registry.register_named("D", Base(log.clone())).unwrap();
    registry.register(B(log.clone())).unwrap();
    registry.register(A(log.clone())).unwrap();

    registry.initialize_all().unwrap();
    registry.clean_up_all();
    assert_eq!(
        log.events(),
        [
            "init A", "init B", "init Base", "init C", "exit C", "exit Base", "exit B", "exit A",
        ]
    );
    assert!(registry.is_empty());

    registry.initialize_all().unwrap();
    registry.clean_up_all();
    assert_eq!(log.events().len(), 8);
}

#[test]
fn test_never_initialized_modules_are_dropped_silently() {
    setup();
    let log = Recorder::default();
    let mut registry = ModuleRegistry::new();
    let a = registry.register(A(log.clone())).unwrap();
    assert_eq!(registry.state(a), Some(ModuleState::Registered));

    registry.clean_up_all();
    assert!(log.events().is_empty());
    assert!(registry.state(a).is_none());
}

#[test]
fn test_late_registration_and_unregister() {
    setup();
    let log = Recorder::default();
    let mut registry = ModuleRegistry::new();
    let a = registry.register(A(log.clone())).unwrap();
    registry.initialize_all().unwrap();

    let b = registry.register(B(log.clone())).unwrap();
    assert_eq!(registry.state(b), Some(ModuleState::Registered));
    registry.initialize_all().unwrap();
    assert_eq!(log.events(), ["init A", "init B"]);

    let err = registry.unregister(a).unwrap_err();
    assert!(matches!(err, ModuleError::DependencyInUse { .. }));
    assert_eq!(registry.state(a), Some(ModuleState::Initialized));

    registry.unregister(b).unwrap();
    assert_eq!(log.count("exit B"), 1);
    assert_eq!(registry.order(), &[a]);

    registry.clean_up_all();
    assert_eq!(log.events(), ["init A", "init B", "exit B", "exit A"]);
}

#[test]
fn test_registry_moves_to_startup_thread() {
    setup();
    let log = Recorder::default();
    let mut registry =
        ModuleRegistry::with_config(LifecycleConfig::default().with_thread_checks(true));
    registry.register(B(log.clone())).unwrap();
    registry.register(A(log.clone())).unwrap();

    let handle = std::thread::spawn(move || {
        registry.initialize_all().unwrap();
        registry.clean_up_all();
    });
    handle.join().unwrap();
    assert_eq!(log.events(), ["init A", "init B", "exit B", "exit A"]);
}
