//! The [`Module`] trait and dependency declarations.
//!
//! A module is a unit of global setup with a matching teardown: a font
//! cache, a clipboard bridge, an image-handler table. Modules declare what
//! they depend on and the [`ModuleRegistry`](crate::ModuleRegistry) brings
//! them up in dependency order and tears them down in reverse.
//!
//! # Declaring a Module
//!
//! ```
//! use ordo_core::{Dependency, InitError, Module};
//!
//! #[derive(Default)]
//! struct Sockets;
//!
//! impl Module for Sockets {
//!     fn on_init(&mut self) -> Result<(), InitError> {
//!         Ok(())
//!     }
//! }
//!
//! #[derive(Default)]
//! struct HttpClient;
//!
//! impl Module for HttpClient {
//!     fn dependencies(&self) -> Vec<Dependency> {
//!         vec![Dependency::on::<Sockets>(), Dependency::named("Settings")]
//!     }
//!
//!     fn on_init(&mut self) -> Result<(), InitError> {
//!         Ok(())
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;

/// A unit participating in ordered startup and shutdown.
///
/// Implementors only need [`on_init`](Self::on_init). The remaining methods
/// have defaults, and [`name`](Self::name) / [`dependencies`](Self::dependencies)
/// can be generated by the [`module`](macro@crate::module) attribute.
///
/// # Related Types
///
/// - [`Dependency`] - Returned by [`dependencies()`](Self::dependencies)
/// - [`InitError`] - Returned by [`on_init()`](Self::on_init) on failure
/// - [`ModuleRegistry`](crate::ModuleRegistry) - Drives the lifecycle
pub trait Module: Any + Send {
    /// The name other modules use to declare a named dependency on this one.
    ///
    /// Defaults to the unqualified type name without generic arguments, so
    /// `Cache<A>` and `Cache<B>` both default to `"Cache"`. Register generic
    /// modules with [`register_named`](crate::ModuleRegistry::register_named)
    /// or override this method to keep their names distinct.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Modules that must be initialized before this one.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Bring the module up. Returning an error aborts the whole
    /// initialization pass.
    fn on_init(&mut self) -> Result<(), InitError>;

    /// Tear the module down. Only called if [`on_init`](Self::on_init)
    /// succeeded.
    fn on_exit(&mut self) {}
}

/// A dependency declared by a module.
///
/// Hard dependencies name a concrete type and are checked against the
/// registry when the dependent is resolved. Named dependencies are strings
/// translated to a type through the registry's name directory before any of
/// the dependent's edges are walked.
#[derive(Clone)]
pub enum Dependency {
    /// Dependency on a concrete module type.
    Type {
        /// Identity of the required module type.
        type_id: TypeId,
        /// Full type name, for diagnostics.
        type_name: &'static str,
    },
    /// Dependency on whatever module is registered under this name.
    Named(Cow<'static, str>),
}

impl Dependency {
    /// Declare a hard dependency on module type `T`.
    pub fn on<T: Module>() -> Self {
        Self::Type {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Declare a dependency on the module registered under `name`.
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::Named(name.into())
    }

    /// Human-readable label used in error messages.
    pub fn label(&self) -> &str {
        match self {
            Self::Type { type_name, .. } => short_type_name(type_name),
            Self::Named(name) => name,
        }
    }

    /// Returns `true` for dependencies declared by name.
    pub fn is_named(&self) -> bool {
        matches!(self, Self::Named(_))
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { type_name, .. } => f.debug_tuple("Type").field(type_name).finish(),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
        }
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Type { type_id: a, .. }, Self::Type { type_id: b, .. }) => a == b,
            (Self::Named(a), Self::Named(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Dependency {}

/// Lifecycle state of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleState {
    /// Registered, not initialized (or torn down again).
    #[default]
    Registered,
    /// Being resolved: its dependency chain is being walked or its
    /// `on_init` hook is running.
    Initializing,
    /// `on_init` succeeded; `on_exit` will run at teardown.
    Initialized,
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => write!(f, "registered"),
            Self::Initializing => write!(f, "initializing"),
            Self::Initialized => write!(f, "initialized"),
        }
    }
}

/// Failure reported by [`Module::on_init`].
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct InitError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl InitError {
    /// Create an error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for InitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for InitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Strip the module path and generic arguments from a type name.
pub(crate) fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
