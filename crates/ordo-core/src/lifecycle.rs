//! The lifecycle driver.
//!
//! [`ModuleRegistry::initialize_all`] runs every module's `on_init` hook in
//! dependency order; [`ModuleRegistry::clean_up_all`] runs `on_exit` in
//! reverse. A pass is all-or-nothing: if any module fails to resolve or to
//! initialize, the modules initialized so far are exited in reverse order
//! and the registry is emptied.
//!
//! # State Machine
//!
//! ```text
//! Registered ──▶ Initializing ──▶ Initialized ──(on_exit)──▶ Registered ──▶ dropped
//!                     │
//!                     └──(failure)──▶ dropped, on_exit never runs
//! ```

use slotmap::SlotMap;

use crate::error::{ModuleError, Result};
use crate::logging::{span_names, targets, PerfSpan};
use crate::module::ModuleState;
use crate::registry::{ModuleId, ModuleRegistry, ModuleSlot};
use crate::resolver::{DependencyGraph, ResolveVisitor, Resolver};

/// Runs `on_init` on each module as the resolver reports it ready.
struct InitVisitor<'a> {
    slots: &'a mut SlotMap<ModuleId, ModuleSlot>,
    initialized: &'a mut Vec<ModuleId>,
    next_seq: &'a mut u64,
    trace_timings: bool,
}

impl ResolveVisitor for InitVisitor<'_> {
    fn enter(&mut self, id: ModuleId) {
        if let Some(slot) = self.slots.get_mut(id) {
            slot.state = ModuleState::Initializing;
        }
    }

    fn ready(&mut self, id: ModuleId) -> Result<()> {
        let slot = self.slots.get_mut(id).ok_or(ModuleError::UnknownModule)?;
        let _span = self
            .trace_timings
            .then(|| PerfSpan::new(span_names::MODULE_INIT, &slot.name));

        tracing::trace!(target: targets::LIFECYCLE, name = %slot.name, "initializing module");
        if let Err(source) = slot.module.on_init() {
            tracing::error!(target: targets::LIFECYCLE, name = %slot.name, error = %source, "module initialization failed");
            return Err(ModuleError::InitFailed {
                module: slot.name.to_string(),
                source,
            });
        }

        *self.next_seq += 1;
        slot.init_seq = *self.next_seq;
        slot.state = ModuleState::Initialized;
        self.initialized.push(id);
        tracing::debug!(target: targets::LIFECYCLE, name = %slot.name, "module initialized");
        Ok(())
    }
}

impl ModuleRegistry {
    /// Initialize every registered module in dependency order.
    ///
    /// Modules initialized by an earlier pass are left alone, so calling
    /// this again after registering more modules initializes only the new
    /// ones. On an empty registry this is a no-op.
    ///
    /// # Errors
    ///
    /// [`ModuleError::CircularDependency`], [`ModuleError::MissingDependency`]
    /// or [`ModuleError::InitFailed`]. Before the error is returned, every
    /// initialized module (including those from earlier passes) is exited in
    /// reverse order and the registry is emptied.
    ///
    /// # Panics
    ///
    /// With thread checks enabled, panics if called from a thread other than
    /// the one that drove the first pass.
    pub fn initialize_all(&mut self) -> Result<()> {
        self.check_thread("initialize_all");
        self.bind_thread();
        let _span = tracing::debug_span!(target: targets::LIFECYCLE, "initialize_all", modules = self.len()).entered();
        let _perf = self
            .config
            .trace_timings
            .then(|| PerfSpan::new(span_names::INITIALIZE_ALL, "*"));

        let graph = DependencyGraph::from_registry(self);
        let mut initialized = self.initialized_in_order();
        let already = initialized.len();

        let mut resolver = Resolver::with_done(graph, initialized.iter().copied());
        let roots = self.order.clone();
        let mut visitor = InitVisitor {
            slots: &mut self.slots,
            initialized: &mut initialized,
            next_seq: &mut self.init_seq,
            trace_timings: self.config.trace_timings,
        };
        let outcome = roots
            .iter()
            .try_for_each(|&id| resolver.visit(id, &mut visitor));

        match outcome {
            Ok(()) => {
                crate::ordo_info!(
                    initialized = initialized.len() - already,
                    total = initialized.len(),
                    "module initialization pass complete"
                );
                self.order = initialized;
                Ok(())
            }
            Err(err) => {
                crate::ordo_error!(error = %err, "module initialization pass failed");
                self.unwind(&initialized);
                self.clear();
                Err(err)
            }
        }
    }

    /// Exit `initialized` in reverse order.
    fn unwind(&mut self, initialized: &[ModuleId]) {
        if !initialized.is_empty() {
            tracing::warn!(target: targets::LIFECYCLE, count = initialized.len(), "unwinding initialized modules");
        }
        for &id in initialized.iter().rev() {
            self.exit_module(id);
        }
    }

    /// Run `on_exit` on an initialized module and return it to Registered.
    fn exit_module(&mut self, id: ModuleId) {
        let trace_timings = self.config.trace_timings;
        let Some(slot) = self.slots.get_mut(id) else {
            return;
        };
        if slot.state != ModuleState::Initialized {
            return;
        }
        let _span = trace_timings.then(|| PerfSpan::new(span_names::MODULE_EXIT, &slot.name));
        slot.module.on_exit();
        slot.state = ModuleState::Registered;
        tracing::debug!(target: targets::LIFECYCLE, name = %slot.name, "module exited");
    }

    /// Exit every initialized module in reverse canonical order and empty
    /// the registry.
    ///
    /// Modules that were never initialized are dropped without a hook call.
    /// A later [`initialize_all`](Self::initialize_all) on the empty registry
    /// succeeds without doing anything.
    ///
    /// # Panics
    ///
    /// With thread checks enabled, panics if called from a thread other than
    /// the one that drove the first pass.
    pub fn clean_up_all(&mut self) {
        self.check_thread("clean_up_all");
        let _span = tracing::debug_span!(target: targets::LIFECYCLE, "clean_up_all", modules = self.len()).entered();
        let _perf = self
            .config
            .trace_timings
            .then(|| PerfSpan::new(span_names::CLEAN_UP_ALL, "*"));
        self.tear_down();
    }

    /// Reverse-order exit followed by emptying the registry.
    ///
    /// Exit order follows the initialization sequence, which still holds
    /// if a pass was cut short by a panicking hook.
    pub(crate) fn tear_down(&mut self) {
        for id in self.initialized_in_order().into_iter().rev() {
            self.exit_module(id);
        }
        let count = self.len();
        self.clear();
        crate::ordo_debug!(dropped = count, "registry cleaned up");
    }

    /// Returns `true` if the registry is non-empty and every module is
    /// initialized.
    pub fn are_initialized(&self) -> bool {
        !self.is_empty()
            && self
                .slots
                .values()
                .all(|slot| slot.state == ModuleState::Initialized)
    }

    /// Compute the initialization order without running any hook.
    ///
    /// Modules already initialized keep their place at the front; the rest
    /// follow in the order the next [`initialize_all`](Self::initialize_all)
    /// would initialize them.
    pub fn resolve_order(&self) -> Result<Vec<ModuleId>> {
        let mut order = self.initialized_in_order();
        let resolver = Resolver::with_done(DependencyGraph::from_registry(self), order.iter().copied());
        order.extend(resolver.resolve_all(&self.order)?);
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LifecycleConfig;
    use crate::module::{Dependency, InitError, Module};
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Probe {
        name: &'static str,
        deps: Vec<Dependency>,
        fail: bool,
        log: Log,
    }

    impl Module for Probe {
        fn name(&self) -> &'static str {
            self.name
        }
        fn dependencies(&self) -> Vec<Dependency> {
            self.deps.clone()
        }
        fn on_init(&mut self) -> std::result::Result<(), InitError> {
            self.log.lock().push(format!("init {}", self.name));
            if self.fail {
                Err(InitError::new(format!("{} refused", self.name)))
            } else {
                Ok(())
            }
        }
        fn on_exit(&mut self) {
            self.log.lock().push(format!("exit {}", self.name));
        }
    }

    // Registration is unique by type, so each probe gets a wrapper type.
    macro_rules! probe_type {
        ($ty:ident) => {
            struct $ty(Probe);
            impl Module for $ty {
                fn name(&self) -> &'static str {
                    self.0.name()
                }
                fn dependencies(&self) -> Vec<Dependency> {
                    self.0.dependencies()
                }
                fn on_init(&mut self) -> std::result::Result<(), InitError> {
                    self.0.on_init()
                }
                fn on_exit(&mut self) {
                    self.0.on_exit()
                }
            }
        };
    }

    probe_type!(A);
    probe_type!(B);
    probe_type!(C);

    fn probe(name: &'static str, deps: Vec<Dependency>, log: &Log) -> Probe {
        Probe {
            name,
            deps,
            fail: false,
            log: log.clone(),
        }
    }

    fn registry() -> ModuleRegistry {
        ModuleRegistry::with_config(LifecycleConfig::default().with_thread_checks(true))
    }

    #[test]
    fn test_initialize_in_dependency_order() {
        let log = Log::default();
        let mut registry = registry();
        registry
            .register(C(probe("C", vec![Dependency::on::<B>()], &log)))
            .unwrap();
        registry
            .register(B(probe("B", vec![Dependency::named("A")], &log)))
            .unwrap();
        registry.register(A(probe("A", vec![], &log))).unwrap();

        registry.initialize_all().unwrap();
        assert_eq!(*log.lock(), ["init A", "init B", "init C"]);
        assert!(registry.are_initialized());

        let names: Vec<_> = registry
            .order()
            .iter()
            .map(|&id| registry.name(id).unwrap())
            .collect();
        assert_eq!(names, ["A", "B", "C"]);

        registry.clean_up_all();
        assert_eq!(
            *log.lock(),
            ["init A", "init B", "init C", "exit C", "exit B", "exit A"]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_failure_unwinds_in_reverse() {
        let log = Log::default();
        let mut registry = registry();
        registry.register(A(probe("A", vec![], &log))).unwrap();
        registry.register(B(probe("B", vec![], &log))).unwrap();
        let mut failing = probe("C", vec![], &log);
        failing.fail = true;
        registry.register(C(failing)).unwrap();

        let err = registry.initialize_all().unwrap_err();
        assert!(matches!(err, ModuleError::InitFailed { ref module, .. } if module == "C"));
        assert_eq!(
            *log.lock(),
            ["init A", "init B", "init C", "exit B", "exit A"]
        );
        assert!(registry.is_empty());
        assert!(!registry.are_initialized());
    }

    #[test]
    fn test_resolve_order_is_dry_run() {
        let log = Log::default();
        let mut registry = registry();
        let b = registry
            .register(B(probe("B", vec![Dependency::on::<A>()], &log)))
            .unwrap();
        let a = registry.register(A(probe("A", vec![], &log))).unwrap();

        assert_eq!(registry.resolve_order().unwrap(), [a, b]);
        assert!(log.lock().is_empty());
        assert_eq!(registry.state(a), Some(ModuleState::Registered));
    }

    #[test]
    fn test_late_registration_initializes_only_new_module() {
        let log = Log::default();
        let mut registry = registry();
        let a = registry.register(A(probe("A", vec![], &log))).unwrap();
        registry.initialize_all().unwrap();

        let b = registry
            .register(B(probe("B", vec![Dependency::on::<A>()], &log)))
            .unwrap();
        assert!(!registry.are_initialized());
        assert_eq!(registry.resolve_order().unwrap(), [a, b]);

        registry.initialize_all().unwrap();
        assert_eq!(*log.lock(), ["init A", "init B"]);
        assert_eq!(registry.order(), &[a, b]);
    }

    #[test]
    fn test_failed_late_pass_unwinds_earlier_modules() {
        let log = Log::default();
        let mut registry = registry();
        registry.register(A(probe("A", vec![], &log))).unwrap();
        registry.initialize_all().unwrap();

        registry
            .register(B(probe("B", vec![Dependency::named("Nope")], &log)))
            .unwrap();
        assert!(registry.initialize_all().is_err());
        assert_eq!(*log.lock(), ["init A", "exit A"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_initialized_dependency_in_use() {
        let log = Log::default();
        let mut registry = registry();
        let a = registry.register(A(probe("A", vec![], &log))).unwrap();
        let b = registry
            .register(B(probe("B", vec![Dependency::on::<A>()], &log)))
            .unwrap();
        registry.initialize_all().unwrap();

        let err = registry.unregister(a).unwrap_err();
        assert!(matches!(err, ModuleError::DependencyInUse { ref dependent, .. } if dependent == "B"));

        registry.unregister(b).unwrap();
        registry.unregister(a).unwrap();
        assert_eq!(*log.lock(), ["init A", "init B", "exit B", "exit A"]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_drop_tears_down() {
        let log = Log::default();
        {
            let mut registry = registry();
            registry.register(A(probe("A", vec![], &log))).unwrap();
            registry
                .register(B(probe("B", vec![Dependency::on::<A>()], &log)))
                .unwrap();
            registry.initialize_all().unwrap();
        }
        assert_eq!(*log.lock(), ["init A", "init B", "exit B", "exit A"]);
    }

    #[test]
    fn test_trace_timings_pass() {
        let log = Log::default();
        let mut registry =
            ModuleRegistry::with_config(LifecycleConfig::default().with_trace_timings(true));
        registry.register(A(probe("A", vec![], &log))).unwrap();
        registry.initialize_all().unwrap();
        registry.clean_up_all();
        assert_eq!(*log.lock(), ["init A", "exit A"]);
    }

    struct Unstable;
    impl Module for Unstable {
        fn on_init(&mut self) -> std::result::Result<(), InitError> {
            panic!("device vanished during init");
        }
    }

    #[test]
    fn test_panicking_hook_keeps_reverse_teardown() {
        let log = Log::default();
        let mut registry = registry();
        registry
            .register(C(probe("C", vec![Dependency::on::<B>()], &log)))
            .unwrap();
        registry
            .register(B(probe("B", vec![Dependency::on::<A>()], &log)))
            .unwrap();
        registry.register(A(probe("A", vec![], &log))).unwrap();
        registry.register(Unstable).unwrap();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = registry.initialize_all();
        }));
        assert!(result.is_err());
        assert_eq!(*log.lock(), ["init A", "init B", "init C"]);

        registry.clean_up_all();
        assert_eq!(
            *log.lock(),
            ["init A", "init B", "init C", "exit C", "exit B", "exit A"]
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_panicking_hook_drop_exits_in_reverse() {
        let log = Log::default();
        let mut registry = registry();
        registry
            .register(C(probe("C", vec![Dependency::on::<B>()], &log)))
            .unwrap();
        registry.register(Unstable).unwrap();
        registry
            .register(B(probe("B", vec![Dependency::on::<A>()], &log)))
            .unwrap();
        registry.register(A(probe("A", vec![], &log))).unwrap();

        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = registry.initialize_all();
        }));
        assert_eq!(registry.state(registry.id_of::<Unstable>().unwrap()), Some(ModuleState::Initializing));

        drop(registry);
        assert_eq!(
            *log.lock(),
            ["init A", "init B", "init C", "exit C", "exit B", "exit A"]
        );
    }

    #[test]
    fn test_lifecycle_off_startup_thread_panics() {
        let log = Log::default();
        let mut registry = registry();
        registry.register(A(probe("A", vec![], &log))).unwrap();
        registry.initialize_all().unwrap();

        let result = std::thread::spawn(move || {
            registry.clean_up_all();
        })
        .join();
        assert!(result.is_err());
    }
}
