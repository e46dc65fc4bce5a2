//! Error types for Ordo.

use crate::module::InitError;

/// The main error type for registry and lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    /// A module was reached again while its own dependency chain was being
    /// resolved.
    #[error("circular dependency involving module \"{module}\" detected ({})", .cycle.join(" -> "))]
    CircularDependency {
        /// The module whose re-entry closed the cycle.
        module: String,
        /// The cycle path, starting and ending with `module`.
        cycle: Vec<String>,
    },
    /// A declared dependency does not resolve to a registered module.
    #[error("dependency \"{dependency}\" of module \"{required_by}\" doesn't exist")]
    MissingDependency {
        /// Name of the unresolved dependency.
        dependency: String,
        /// The module that declared it.
        required_by: String,
    },
    /// A module's `on_init` hook failed.
    #[error("module \"{module}\" initialization failed: {source}")]
    InitFailed {
        /// The failing module.
        module: String,
        /// The error returned by the hook.
        #[source]
        source: InitError,
    },
    /// A module of the same type is already registered.
    #[error("module \"{module}\" is already registered")]
    AlreadyRegistered {
        /// Type name of the duplicate.
        module: String,
    },
    /// The lookup name is already used by a different module type.
    #[error("module name \"{name}\" is already used by \"{existing}\"")]
    DuplicateName {
        /// The contested name.
        name: String,
        /// Type name of the module that owns it.
        existing: String,
    },
    /// The module ID is invalid or the module was unregistered.
    #[error("invalid or unregistered module ID")]
    UnknownModule,
    /// The module cannot be removed while an initialized module depends on it.
    #[error("module \"{module}\" is still required by initialized module \"{dependent}\"")]
    DependencyInUse {
        /// The module being unregistered.
        module: String,
        /// An initialized module depending on it.
        dependent: String,
    },
}

impl ModuleError {
    /// Returns `true` for errors that abort an initialization pass.
    pub fn is_pass_failure(&self) -> bool {
        matches!(
            self,
            Self::CircularDependency { .. } | Self::MissingDependency { .. } | Self::InitFailed { .. }
        )
    }
}

/// A specialized Result type for Ordo operations.
pub type Result<T> = std::result::Result<T, ModuleError>;
