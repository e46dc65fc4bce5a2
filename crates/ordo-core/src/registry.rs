//! The module registry.
//!
//! [`ModuleRegistry`] owns every registered module together with its
//! lifecycle state. It is an explicit context object: nothing here is
//! process-global, so independent registries can coexist (one per plugin
//! host, one per test).
//!
//! Modules are stored in a `SlotMap` for stable [`ModuleId`]s, with a
//! separate `order` vector holding the canonical order. Before the first
//! successful pass that is registration order; afterwards it is the order
//! in which modules were actually initialized, which is what teardown walks
//! in reverse.
//!
//! # Related Modules
//!
//! - [`crate::resolver`] - Computes the initialization order
//! - [`crate::lifecycle`] - `initialize_all` / `clean_up_all`
//! - [`crate::catalog`] - Link-time registration

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;

use slotmap::{new_key_type, SlotMap};

use crate::config::LifecycleConfig;
use crate::error::{ModuleError, Result};
use crate::logging::targets;
use crate::module::{Module, ModuleState};
use crate::resolver::DependencyGraph;
use crate::thread_check::StartupThread;

new_key_type! {
    /// A stable handle to a registered module.
    ///
    /// IDs become invalid when the module is unregistered or the registry is
    /// emptied by a failed pass or by `clean_up_all`.
    pub struct ModuleId;
}

/// Registry-side data for one module.
pub(crate) struct ModuleSlot {
    pub(crate) module: Box<dyn Module>,
    pub(crate) name: Cow<'static, str>,
    pub(crate) type_id: TypeId,
    pub(crate) type_name: &'static str,
    pub(crate) state: ModuleState,
    /// Position in initialization order, set when `on_init` succeeds.
    pub(crate) init_seq: u64,
}

/// Insertion-ordered collection of modules, unique by type and by name.
///
/// # Example
///
/// ```
/// use ordo_core::{InitError, Module, ModuleRegistry, ModuleState};
///
/// struct Settings;
///
/// impl Module for Settings {
///     fn on_init(&mut self) -> Result<(), InitError> {
///         Ok(())
///     }
/// }
///
/// let mut registry = ModuleRegistry::new();
/// let id = registry.register(Settings).unwrap();
/// registry.initialize_all().unwrap();
/// assert_eq!(registry.state(id), Some(ModuleState::Initialized));
/// registry.clean_up_all();
/// assert!(registry.is_empty());
/// ```
pub struct ModuleRegistry {
    pub(crate) slots: SlotMap<ModuleId, ModuleSlot>,
    pub(crate) order: Vec<ModuleId>,
    by_type: HashMap<TypeId, ModuleId>,
    by_name: HashMap<Cow<'static, str>, ModuleId>,
    /// Name → type for every name the registry has seen, including catalog
    /// entries that were never instantiated.
    directory: HashMap<String, (TypeId, &'static str)>,
    pub(crate) config: LifecycleConfig,
    pub(crate) startup: Option<StartupThread>,
    /// Last sequence number handed to an initialized module.
    pub(crate) init_seq: u64,
}

impl ModuleRegistry {
    /// Create an empty registry with the default configuration.
    pub fn new() -> Self {
        Self::with_config(LifecycleConfig::default())
    }

    /// Create an empty registry with the given configuration.
    pub fn with_config(config: LifecycleConfig) -> Self {
        Self {
            slots: SlotMap::with_key(),
            order: Vec::new(),
            by_type: HashMap::new(),
            by_name: HashMap::new(),
            directory: HashMap::new(),
            config,
            startup: None,
            init_seq: 0,
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Register a module under its [`Module::name`].
    ///
    /// # Errors
    ///
    /// [`ModuleError::AlreadyRegistered`] if a module of the same type is
    /// present, [`ModuleError::DuplicateName`] if the name belongs to another
    /// type.
    pub fn register<M: Module>(&mut self, module: M) -> Result<ModuleId> {
        let name = Cow::Borrowed(module.name());
        self.insert(
            Box::new(module),
            name,
            TypeId::of::<M>(),
            std::any::type_name::<M>(),
        )
    }

    /// Register a module under an explicit lookup name.
    pub fn register_named<M: Module>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        module: M,
    ) -> Result<ModuleId> {
        self.insert(
            Box::new(module),
            name.into(),
            TypeId::of::<M>(),
            std::any::type_name::<M>(),
        )
    }

    pub(crate) fn insert(
        &mut self,
        module: Box<dyn Module>,
        name: Cow<'static, str>,
        type_id: TypeId,
        type_name: &'static str,
    ) -> Result<ModuleId> {
        if self.by_type.contains_key(&type_id) {
            return Err(ModuleError::AlreadyRegistered {
                module: type_name.to_string(),
            });
        }
        if let Some(existing) = self.name_conflict(&name, type_id) {
            return Err(ModuleError::DuplicateName {
                name: name.into_owned(),
                existing: existing.to_string(),
            });
        }

        self.directory.insert(name.to_string(), (type_id, type_name));
        let id = self.slots.insert(ModuleSlot {
            module,
            name: name.clone(),
            type_id,
            type_name,
            state: ModuleState::Registered,
            init_seq: 0,
        });
        self.order.push(id);
        self.by_type.insert(type_id, id);
        self.by_name.insert(name, id);

        tracing::debug!(target: targets::REGISTRY, ?id, name = %self.slots[id].name, type_name, "registered module");
        Ok(id)
    }

    /// Make `name` resolvable as a named dependency without registering a
    /// module instance.
    ///
    /// A named dependency on such a name still fails with
    /// [`ModuleError::MissingDependency`] unless a module of that type is
    /// registered by the time it is resolved.
    pub fn declare_name<T: Module>(&mut self, name: impl Into<String>) {
        self.declare(name.into(), TypeId::of::<T>(), std::any::type_name::<T>());
    }

    /// The type name already holding `name`, if it is not `type_id`.
    pub(crate) fn name_conflict(&self, name: &str, type_id: TypeId) -> Option<&'static str> {
        if let Some(&existing) = self.by_name.get(name) {
            let slot = &self.slots[existing];
            if slot.type_id != type_id {
                return Some(slot.type_name);
            }
        }
        match self.directory.get(name) {
            Some(&(known, known_name)) if known != type_id => Some(known_name),
            _ => None,
        }
    }

    pub(crate) fn declare(&mut self, name: String, type_id: TypeId, type_name: &'static str) {
        self.directory.entry(name).or_insert((type_id, type_name));
    }

    /// Remove a single module and drop it.
    ///
    /// An initialized module has its `on_exit` hook called first. The
    /// recorded order of the remaining modules is unchanged.
    ///
    /// # Errors
    ///
    /// [`ModuleError::UnknownModule`] for a stale ID, and
    /// [`ModuleError::DependencyInUse`] if another initialized module depends
    /// on this one.
    pub fn unregister(&mut self, id: ModuleId) -> Result<()> {
        self.check_thread("unregister");

        let state = self.slots.get(id).ok_or(ModuleError::UnknownModule)?.state;
        if state == ModuleState::Initialized {
            if let Some(dependent) = self.initialized_dependent_of(id) {
                return Err(ModuleError::DependencyInUse {
                    module: self.slots[id].name.to_string(),
                    dependent,
                });
            }
        }

        let Some(mut slot) = self.slots.remove(id) else {
            return Err(ModuleError::UnknownModule);
        };
        if slot.state == ModuleState::Initialized {
            slot.module.on_exit();
            tracing::debug!(target: targets::LIFECYCLE, name = %slot.name, "module exited");
        }
        self.order.retain(|&other| other != id);
        self.by_type.remove(&slot.type_id);
        self.by_name.remove(&slot.name);

        tracing::debug!(target: targets::REGISTRY, ?id, name = %slot.name, "unregistered module");
        Ok(())
    }

    /// Find an initialized module other than `id` that depends on `id`.
    fn initialized_dependent_of(&self, id: ModuleId) -> Option<String> {
        let graph = DependencyGraph::from_registry(self);
        self.order
            .iter()
            .copied()
            .filter(|&other| other != id && self.state(other) == Some(ModuleState::Initialized))
            .find(|&other| graph.direct_dependencies(other).contains(&id))
            .map(|other| self.slots[other].name.to_string())
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no module is registered.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Returns `true` if a module of type `T` is registered.
    pub fn contains<T: Module>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// The ID of the registered module of type `T`.
    pub fn id_of<T: Module>(&self) -> Option<ModuleId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// The ID of the module registered under `name`.
    pub fn id_by_name(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    /// Lifecycle state of a module.
    pub fn state(&self, id: ModuleId) -> Option<ModuleState> {
        self.slots.get(id).map(|slot| slot.state)
    }

    /// Lookup name of a module.
    pub fn name(&self, id: ModuleId) -> Option<&str> {
        self.slots.get(id).map(|slot| slot.name.as_ref())
    }

    /// Full type name of a module.
    pub fn type_name(&self, id: ModuleId) -> Option<&'static str> {
        self.slots.get(id).map(|slot| slot.type_name)
    }

    /// Module IDs in canonical order.
    pub fn order(&self) -> &[ModuleId] {
        &self.order
    }

    /// Borrow the registered module of type `T`.
    pub fn get<T: Module>(&self) -> Option<&T> {
        let id = self.id_of::<T>()?;
        let module: &dyn Any = &*self.slots[id].module;
        module.downcast_ref::<T>()
    }

    /// Mutably borrow the registered module of type `T`.
    pub fn get_mut<T: Module>(&mut self) -> Option<&mut T> {
        let id = self.id_of::<T>()?;
        let module: &mut dyn Any = &mut *self.slots[id].module;
        module.downcast_mut::<T>()
    }

    /// Resolve a name through the directory.
    pub(crate) fn resolve_name(&self, name: &str) -> Option<TypeId> {
        self.directory.get(name).map(|&(type_id, _)| type_id)
    }

    pub(crate) fn type_index(&self) -> &HashMap<TypeId, ModuleId> {
        &self.by_type
    }

    /// Drop every module and forget the canonical order.
    ///
    /// Names stay in the directory.
    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
        self.by_type.clear();
        self.by_name.clear();
        self.startup = None;
        self.init_seq = 0;
    }

    /// Initialized modules in the order their `on_init` succeeded.
    ///
    /// This stays accurate when a pass is interrupted, so teardown never
    /// depends on the canonical order having been updated.
    pub(crate) fn initialized_in_order(&self) -> Vec<ModuleId> {
        let mut initialized: Vec<(u64, ModuleId)> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.state == ModuleState::Initialized)
            .map(|(id, slot)| (slot.init_seq, id))
            .collect();
        initialized.sort_unstable_by_key(|&(seq, _)| seq);
        initialized.into_iter().map(|(_, id)| id).collect()
    }

    /// Verify a lifecycle call runs on the startup thread.
    pub(crate) fn check_thread(&self, operation: &str) {
        if !self.config.thread_checks {
            return;
        }
        if let Some(startup) = &self.startup {
            startup.verify(operation);
        }
    }

    /// Bind lifecycle calls to the current thread if not yet bound.
    pub(crate) fn bind_thread(&mut self) {
        if self.config.thread_checks && self.startup.is_none() {
            self.startup = Some(StartupThread::capture());
        }
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ModuleRegistry {
    fn drop(&mut self) {
        if self
            .slots
            .values()
            .any(|slot| slot.state == ModuleState::Initialized)
        {
            tracing::debug!(target: targets::LIFECYCLE, "registry dropped with initialized modules");
            self.tear_down();
        }
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.order.iter().map(|&id| {
                let slot = &self.slots[id];
                (slot.name.as_ref(), slot.state)
            }))
            .finish()
    }
}
