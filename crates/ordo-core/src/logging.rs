//! Logging and debugging facilities for Ordo.
//!
//! This module provides:
//! - Integration with the `tracing` crate for structured logging
//! - Debug visualization for the module dependency tree
//! - Performance tracing hooks for profiling module startup
//!
//! # Tracing Integration
//!
//! Ordo uses the `tracing` crate for instrumentation. To see logs, install a
//! tracing subscriber in your application:
//!
//! ```ignore
//! use tracing_subscriber::EnvFilter;
//!
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter(EnvFilter::new("ordo_core::lifecycle=debug"))
//!         .init();
//!
//!     // Register modules and call initialize_all()...
//! }
//! ```
//!
//! # Debug Visualization
//!
//! Use [`DependencyTreeDebug`] to see what depends on what:
//!
//! ```
//! use ordo_core::{Dependency, InitError, Module, ModuleRegistry};
//! use ordo_core::logging::DependencyTreeDebug;
//!
//! struct Sockets;
//! impl Module for Sockets {
//!     fn on_init(&mut self) -> Result<(), InitError> { Ok(()) }
//! }
//!
//! struct Http;
//! impl Module for Http {
//!     fn dependencies(&self) -> Vec<Dependency> { vec![Dependency::on::<Sockets>()] }
//!     fn on_init(&mut self) -> Result<(), InitError> { Ok(()) }
//! }
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register(Http).unwrap();
//! registry.register(Sockets).unwrap();
//!
//! let tree = DependencyTreeDebug::new(&registry).to_string();
//! assert!(tree.contains("Http"));
//! assert!(tree.contains("Sockets"));
//! ```

use std::fmt;

use crate::error::{ModuleError, Result};
use crate::module::short_type_name;
use crate::registry::{ModuleId, ModuleRegistry};
use crate::resolver::DependencyGraph;

/// Span names used throughout Ordo for tracing.
///
/// These constants can be used to filter traces for specific operations.
pub mod span_names {
    /// A full `initialize_all` pass.
    pub const INITIALIZE_ALL: &str = "ordo::initialize_all";
    /// A full `clean_up_all` teardown.
    pub const CLEAN_UP_ALL: &str = "ordo::clean_up_all";
    /// A single module's `on_init` call.
    pub const MODULE_INIT: &str = "ordo::module_init";
    /// A single module's `on_exit` call.
    pub const MODULE_EXIT: &str = "ordo::module_exit";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "ordo_core";
    /// Registration and unregistration.
    pub const REGISTRY: &str = "ordo_core::registry";
    /// Dependency resolution.
    pub const RESOLVER: &str = "ordo_core::resolver";
    /// Initialization, unwinding and teardown.
    pub const LIFECYCLE: &str = "ordo_core::lifecycle";
    /// Link-time module catalog.
    pub const CATALOG: &str = "ordo_core::catalog";
    /// Configuration loading.
    pub const CONFIG: &str = "ordo_core::config";
    /// Timing spans.
    pub const PERF: &str = "ordo_core::perf";
}

/// Style options for dependency tree visualization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TreeStyle {
    /// ASCII characters for tree branches.
    Ascii,
    /// Unicode box-drawing characters.
    #[default]
    Unicode,
    /// Indentation only.
    Compact,
}

/// Configuration for dependency tree debug output.
#[derive(Debug, Clone)]
pub struct TreeFormatOptions {
    /// The style of tree visualization.
    pub style: TreeStyle,
    /// Whether to show each module's lifecycle state.
    pub show_states: bool,
    /// Whether to show type names.
    pub show_types: bool,
    /// Maximum depth to traverse (None for unlimited).
    pub max_depth: Option<usize>,
    /// Indent size for each level.
    pub indent_size: usize,
}

impl Default for TreeFormatOptions {
    fn default() -> Self {
        Self {
            style: TreeStyle::default(),
            show_states: true,
            show_types: false,
            max_depth: None,
            indent_size: 2,
        }
    }
}

impl TreeFormatOptions {
    /// Create options for detailed debugging output.
    pub fn detailed() -> Self {
        Self {
            show_types: true,
            ..Default::default()
        }
    }

    /// Create options for minimal output.
    pub fn minimal() -> Self {
        Self {
            show_states: false,
            show_types: false,
            ..Default::default()
        }
    }
}

/// Debug utility for visualizing the dependency tree of a registry.
///
/// Each module is printed with the modules it depends on as children. The
/// top level lists modules nothing else depends on; when every module is
/// part of a cycle, all modules are listed. Edges back into the current
/// path are marked `(cycle)` and unresolvable edges `(missing)`.
pub struct DependencyTreeDebug<'a> {
    registry: &'a ModuleRegistry,
    options: TreeFormatOptions,
}

impl<'a> DependencyTreeDebug<'a> {
    /// Create a new debug visualizer with default options.
    pub fn new(registry: &'a ModuleRegistry) -> Self {
        Self::with_options(registry, TreeFormatOptions::default())
    }

    /// Create a debug visualizer with custom options.
    pub fn with_options(registry: &'a ModuleRegistry, options: TreeFormatOptions) -> Self {
        Self { registry, options }
    }

    /// Format the tree of every registered module.
    pub fn format_all(&self) -> String {
        let graph = DependencyGraph::from_registry(self.registry);
        let order = self.registry.order();

        let mut output = format!("Module Tree ({} modules):\n", order.len());
        if order.is_empty() {
            output.push_str("  (empty)\n");
            return output;
        }

        let depended_on: Vec<ModuleId> = order
            .iter()
            .flat_map(|&id| graph.direct_dependencies(id))
            .collect();
        let mut roots: Vec<ModuleId> = order
            .iter()
            .copied()
            .filter(|id| !depended_on.contains(id))
            .collect();
        if roots.is_empty() {
            roots = order.to_vec();
        }

        let mut path = Vec::new();
        for (i, &root) in roots.iter().enumerate() {
            let is_last = i + 1 == roots.len();
            self.format_node(&graph, root, &mut path, &mut Vec::new(), is_last, &mut output);
        }
        output
    }

    /// Format the tree below a single module.
    pub fn format_subtree(&self, root: ModuleId) -> Result<String> {
        if self.registry.state(root).is_none() {
            return Err(ModuleError::UnknownModule);
        }
        let graph = DependencyGraph::from_registry(self.registry);
        let mut output = String::new();
        self.format_node(&graph, root, &mut Vec::new(), &mut Vec::new(), true, &mut output);
        Ok(output)
    }

    fn format_node(
        &self,
        graph: &DependencyGraph,
        id: ModuleId,
        path: &mut Vec<ModuleId>,
        ancestors_last: &mut Vec<bool>,
        is_last: bool,
        output: &mut String,
    ) {
        output.push_str(&self.build_prefix(ancestors_last, is_last));
        output.push_str(graph.name(id));

        if self.options.show_states {
            if let Some(state) = self.registry.state(id) {
                output.push_str(&format!(" [{state}]"));
            }
        }
        if self.options.show_types {
            if let Some(type_name) = self.registry.type_name(id) {
                output.push_str(&format!(" ({})", short_type_name(type_name)));
            }
        }

        if path.contains(&id) {
            output.push_str(" (cycle)\n");
            return;
        }
        output.push('\n');

        if let Some(max) = self.options.max_depth {
            if path.len() >= max {
                return;
            }
        }

        let edges = graph.edges(id);
        let depth = path.len();
        path.push(id);
        ancestors_last.push(is_last);
        for (i, (label, target)) in edges.iter().enumerate() {
            let child_is_last = i + 1 == edges.len();
            match target {
                Some(child) => {
                    self.format_node(graph, *child, path, ancestors_last, child_is_last, output);
                }
                None => {
                    output.push_str(&self.build_prefix(ancestors_last, child_is_last));
                    output.push_str(label);
                    output.push_str(" (missing)\n");
                }
            }
        }
        ancestors_last.truncate(depth);
        path.truncate(depth);
    }

    /// Build the prefix string for a tree node.
    ///
    /// `ancestors_last` holds one flag per level above the node; the first
    /// entry belongs to the root, which has no connector of its own.
    fn build_prefix(&self, ancestors_last: &[bool], is_last: bool) -> String {
        if ancestors_last.is_empty() {
            return String::new();
        }

        let width = self.options.indent_size;
        let (branch, tee, corner, dash) = match self.options.style {
            TreeStyle::Ascii => ("|", "+", "`", "-"),
            TreeStyle::Unicode => ("\u{2502}", "\u{251c}", "\u{2514}", "\u{2500}"),
            TreeStyle::Compact => {
                let mut prefix = " ".repeat(ancestors_last.len() * width);
                prefix.push_str("- ");
                return prefix;
            }
        };

        let mut prefix = String::new();
        for &ancestor_last in &ancestors_last[1..] {
            prefix.push_str(if ancestor_last { " " } else { branch });
            prefix.push_str(&" ".repeat(width + 1));
        }
        prefix.push_str(if is_last { corner } else { tee });
        prefix.push_str(&dash.repeat(width));
        prefix.push(' ');
        prefix
    }
}

impl fmt::Display for DependencyTreeDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_all())
    }
}

/// A guard that emits a tracing span when dropped.
///
/// This is useful for tracking the duration of module hooks.
#[derive(Debug)]
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span for `operation` on `module`.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(operation: &'static str, module: &str) -> Self {
        let span = tracing::info_span!(target: targets::PERF, "perf", operation, module);
        Self {
            span: span.entered(),
        }
    }
}

/// Macros for common tracing patterns.
///
/// These are wrappers around the `tracing` crate macros with the
/// [`targets::CORE`](crate::logging::targets::CORE) target. `ordo_trace!` logs at trace level.
#[macro_export]
macro_rules! ordo_trace {
    ($($arg:tt)*) => {
        $crate::__private::tracing::trace!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

/// `tracing::debug!` on the [`targets::CORE`](crate::logging::targets::CORE) target.
#[macro_export]
macro_rules! ordo_debug {
    ($($arg:tt)*) => {
        $crate::__private::tracing::debug!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

/// `tracing::info!` on the [`targets::CORE`](crate::logging::targets::CORE) target.
#[macro_export]
macro_rules! ordo_info {
    ($($arg:tt)*) => {
        $crate::__private::tracing::info!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

/// `tracing::warn!` on the [`targets::CORE`](crate::logging::targets::CORE) target.
#[macro_export]
macro_rules! ordo_warn {
    ($($arg:tt)*) => {
        $crate::__private::tracing::warn!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}

/// `tracing::error!` on the [`targets::CORE`](crate::logging::targets::CORE) target.
#[macro_export]
macro_rules! ordo_error {
    ($($arg:tt)*) => {
        $crate::__private::tracing::error!(target: $crate::logging::targets::CORE, $($arg)*)
    };
}
