//! Dependency resolution.
//!
//! The resolver orders modules so that each one comes after everything it
//! depends on. It is a memoized depth-first walk:
//!
//! 1. A module already in the done set is skipped.
//! 2. A module found on the visiting stack closes a cycle and fails with
//!    [`ModuleError::CircularDependency`], reporting the full path.
//! 3. Otherwise the module is pushed on the stack, its named dependencies are
//!    translated to types (an unknown name fails with
//!    [`ModuleError::MissingDependency`]), each dependency is visited in
//!    declaration order (hard ones first, then named ones), and finally the
//!    module is handed to the [`ResolveVisitor`] and marked done.
//!
//! The visiting stack and the done set belong to the [`Resolver`], not to
//! the modules, so resolution never mutates registry state by itself. The
//! lifecycle driver supplies a visitor that runs `on_init` as each module
//! becomes ready; [`Resolver::resolve_all`] supplies one that only records
//! the order.
//!
//! Walking modules in registration order yields a topological order with
//! registration order as the tie-break.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};

use crate::error::{ModuleError, Result};
use crate::logging::targets;
use crate::module::{short_type_name, Dependency};
use crate::registry::{ModuleId, ModuleRegistry};

/// Declared edges of one module, captured when the graph is built.
struct GraphNode {
    name: String,
    /// Hard dependencies: type and display label.
    hard: Vec<(TypeId, String)>,
    /// Named dependencies and the type their name resolved to, if any.
    named: Vec<(String, Option<TypeId>)>,
}

/// A snapshot of the registry's dependency declarations.
///
/// Building the graph calls [`Module::dependencies`](crate::Module::dependencies)
/// once per module, so the driver can hold the graph while mutating the
/// modules themselves.
pub struct DependencyGraph {
    nodes: HashMap<ModuleId, GraphNode>,
    by_type: HashMap<TypeId, ModuleId>,
}

impl DependencyGraph {
    /// Capture the dependency declarations of every registered module.
    pub fn from_registry(registry: &ModuleRegistry) -> Self {
        let nodes = registry
            .order()
            .iter()
            .map(|&id| {
                let slot = &registry.slots[id];
                let mut hard = Vec::new();
                let mut named = Vec::new();
                for dependency in slot.module.dependencies() {
                    match dependency {
                        Dependency::Type { type_id, type_name } => {
                            hard.push((type_id, short_type_name(type_name).to_string()));
                        }
                        Dependency::Named(name) => {
                            let resolved = registry.resolve_name(&name);
                            named.push((name.into_owned(), resolved));
                        }
                    }
                }
                let node = GraphNode {
                    name: slot.name.to_string(),
                    hard,
                    named,
                };
                (id, node)
            })
            .collect();

        Self {
            nodes,
            by_type: registry.type_index().clone(),
        }
    }

    /// Name of a module in the graph.
    pub fn name(&self, id: ModuleId) -> &str {
        self.nodes.get(&id).map_or("<unknown>", |node| node.name.as_str())
    }

    /// Translate a module's declarations into dependency types, in walk order.
    ///
    /// Fails on the first named dependency that does not resolve.
    fn dependency_types(&self, id: ModuleId) -> Result<Vec<(TypeId, &str)>> {
        let node = self.nodes.get(&id).ok_or(ModuleError::UnknownModule)?;

        let mut types: Vec<(TypeId, &str)> = node
            .hard
            .iter()
            .map(|(type_id, label)| (*type_id, label.as_str()))
            .collect();

        for (name, resolved) in &node.named {
            let Some(type_id) = resolved else {
                return Err(ModuleError::MissingDependency {
                    dependency: name.clone(),
                    required_by: node.name.clone(),
                });
            };
            types.push((*type_id, name.as_str()));
        }

        Ok(types)
    }

    /// Every declared edge with its label and the module it points at, if
    /// registered.
    pub fn edges(&self, id: ModuleId) -> Vec<(&str, Option<ModuleId>)> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let hard = node
            .hard
            .iter()
            .map(|(type_id, label)| (label.as_str(), self.by_type.get(type_id).copied()));
        let named = node.named.iter().map(|(name, resolved)| {
            let target = resolved.and_then(|type_id| self.by_type.get(&type_id).copied());
            (name.as_str(), target)
        });
        hard.chain(named).collect()
    }

    /// Registered modules `id` depends on directly. Unresolvable edges are
    /// skipped.
    pub fn direct_dependencies(&self, id: ModuleId) -> Vec<ModuleId> {
        self.edges(id)
            .into_iter()
            .filter_map(|(_, target)| target)
            .collect()
    }
}

/// Receives modules from the [`Resolver`] as they are reached.
pub trait ResolveVisitor {
    /// Called when a module is pushed on the visiting stack, before any of
    /// its dependencies are walked.
    fn enter(&mut self, _id: ModuleId) {}

    /// Called once all of the module's dependencies are ready. An error
    /// aborts resolution.
    fn ready(&mut self, id: ModuleId) -> Result<()>;
}

/// Collects modules in resolved order without side effects.
struct OrderCollector(Vec<ModuleId>);

impl ResolveVisitor for OrderCollector {
    fn ready(&mut self, id: ModuleId) -> Result<()> {
        self.0.push(id);
        Ok(())
    }
}

/// Depth-first dependency resolver with explicit visiting and done state.
pub struct Resolver {
    graph: DependencyGraph,
    visiting: Vec<ModuleId>,
    done: HashSet<ModuleId>,
}

impl Resolver {
    /// Create a resolver with nothing done yet.
    pub fn new(graph: DependencyGraph) -> Self {
        Self::with_done(graph, std::iter::empty())
    }

    /// Create a resolver treating `done` as already satisfied.
    pub fn with_done(graph: DependencyGraph, done: impl IntoIterator<Item = ModuleId>) -> Self {
        Self {
            graph,
            visiting: Vec::new(),
            done: done.into_iter().collect(),
        }
    }

    /// Returns `true` if the module has been handed to the visitor (or was
    /// seeded as done).
    pub fn is_done(&self, id: ModuleId) -> bool {
        self.done.contains(&id)
    }

    /// Resolve `id` and, recursively, everything it depends on.
    ///
    /// Each module reaching the ready state is passed to `visitor` exactly
    /// once per resolver.
    pub fn visit<V: ResolveVisitor + ?Sized>(&mut self, id: ModuleId, visitor: &mut V) -> Result<()> {
        if self.done.contains(&id) {
            return Ok(());
        }
        if let Some(start) = self.visiting.iter().position(|&v| v == id) {
            let mut cycle: Vec<String> = self.visiting[start..]
                .iter()
                .map(|&v| self.graph.name(v).to_string())
                .collect();
            let module = self.graph.name(id).to_string();
            cycle.push(module.clone());
            tracing::error!(target: targets::RESOLVER, %module, cycle = ?cycle, "circular dependency detected");
            return Err(ModuleError::CircularDependency { module, cycle });
        }

        self.visiting.push(id);
        visitor.enter(id);

        let dependencies: Vec<(TypeId, String)> = self
            .graph
            .dependency_types(id)?
            .into_iter()
            .map(|(type_id, label)| (type_id, label.to_string()))
            .collect();

        for (type_id, label) in dependencies {
            let Some(&dependency) = self.graph.by_type.get(&type_id) else {
                tracing::error!(
                    target: targets::RESOLVER,
                    dependency = %label,
                    required_by = %self.graph.name(id),
                    "dependency not registered"
                );
                return Err(ModuleError::MissingDependency {
                    dependency: label,
                    required_by: self.graph.name(id).to_string(),
                });
            };
            if self.done.contains(&dependency) {
                continue;
            }
            tracing::trace!(
                target: targets::RESOLVER,
                module = %self.graph.name(id),
                dependency = %self.graph.name(dependency),
                "resolving dependency"
            );
            self.visit(dependency, visitor)?;
        }

        visitor.ready(id)?;
        self.visiting.pop();
        self.done.insert(id);
        Ok(())
    }

    /// Resolve every root in turn and return the combined order of newly
    /// resolved modules.
    pub fn resolve_all(mut self, roots: &[ModuleId]) -> Result<Vec<ModuleId>> {
        let mut collector = OrderCollector(Vec::new());
        for &root in roots {
            self.visit(root, &mut collector)?;
        }
        Ok(collector.0)
    }
}
