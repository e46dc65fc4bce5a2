//! Core systems for Ordo.
//!
//! Ordo brings a program's global subsystems up in dependency order at
//! startup and tears them down in reverse order at shutdown. It provides:
//!
//! - **Modules**: the [`Module`] trait with `on_init`/`on_exit` hooks and
//!   declared dependencies, by type or by name
//! - **Registry**: [`ModuleRegistry`], an explicit context object owning the
//!   modules and their lifecycle state
//! - **Resolver**: depth-first ordering with cycle and missing-dependency
//!   detection
//! - **Lifecycle**: all-or-nothing initialization with reverse-order unwind
//! - **Catalog**: link-time self-registration through
//!   [`#[module(register)]`](macro@module)
//!
//! # Example
//!
//! ```
//! use ordo_core::{Dependency, InitError, Module, ModuleRegistry};
//!
//! struct Settings;
//!
//! impl Module for Settings {
//!     fn on_init(&mut self) -> Result<(), InitError> {
//!         Ok(())
//!     }
//! }
//!
//! struct Fonts;
//!
//! impl Module for Fonts {
//!     fn dependencies(&self) -> Vec<Dependency> {
//!         vec![Dependency::on::<Settings>()]
//!     }
//!
//!     fn on_init(&mut self) -> Result<(), InitError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register(Fonts).unwrap();
//! registry.register(Settings).unwrap();
//!
//! // Settings is initialized first even though Fonts registered first.
//! registry.initialize_all().unwrap();
//! let order: Vec<_> = registry
//!     .order()
//!     .iter()
//!     .map(|&id| registry.name(id).unwrap())
//!     .collect();
//! assert_eq!(order, ["Settings", "Fonts"]);
//!
//! registry.clean_up_all();
//! ```
//!
//! # Declaring Modules with the Attribute
//!
//! ```
//! use ordo_core::{InitError, Module, ModuleRegistry};
//!
//! #[derive(Default)]
//! struct Sockets;
//!
//! #[ordo_core::module(name = "sockets")]
//! impl Module for Sockets {
//!     fn on_init(&mut self) -> Result<(), InitError> {
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Http;
//!
//! #[ordo_core::module(depends_on(Sockets), depends_on_named("settings"))]
//! impl Module for Http {
//!     fn on_init(&mut self) -> Result<(), InitError> {
//!         Ok(())
//!     }
//! }
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register(Http).unwrap();
//! registry.register(Sockets).unwrap();
//!
//! // "settings" is not registered, so the pass fails and unwinds.
//! assert!(registry.initialize_all().is_err());
//! assert!(registry.is_empty());
//! ```

mod catalog;
mod config;
mod error;
mod lifecycle;
pub mod logging;
mod module;
mod registry;
pub mod resolver;
pub mod thread_check;

pub use catalog::{catalog_entries, find_entry, list_modules, CatalogEntry, MODULE_CATALOG};
pub use config::{ConfigError, LifecycleConfig};
pub use error::{ModuleError, Result};
pub use logging::{DependencyTreeDebug, PerfSpan, TreeFormatOptions, TreeStyle};
pub use module::{Dependency, InitError, Module, ModuleState};
pub use registry::{ModuleId, ModuleRegistry};

/// Attribute for `impl Module for T` blocks.
///
/// Generates `name()` and `dependencies()` from its arguments:
///
/// - `name = "..."`: the lookup name (defaults to the type name)
/// - `depends_on(TypeA, TypeB)`: hard dependencies
/// - `depends_on_named("a", "b")`: named dependencies
/// - `register`: add the type to the link-time catalog (requires `Default`)
pub use ordo_macros::module;

#[doc(hidden)]
pub mod __private {
    pub use linkme;
    pub use tracing;
}

static_assertions::assert_impl_all!(ModuleRegistry: Send);
static_assertions::assert_impl_all!(ModuleId: Send, Sync, Copy);
static_assertions::assert_impl_all!(CatalogEntry: Sync);
static_assertions::assert_not_impl_any!(ModuleRegistry: Sync);
