//! Link-time module catalog.
//!
//! Module types register themselves with the catalog through `linkme`
//! distributed slices, usually by way of `#[ordo_core::module(register)]`.
//! Each entry carries the module's name and a factory; nothing is
//! instantiated until [`ModuleRegistry::register_modules`] is called.
//!
//! ```ignore
//! #[derive(Default)]
//! struct Clipboard;
//!
//! #[ordo_core::module(name = "clipboard", register)]
//! impl Module for Clipboard {
//!     fn on_init(&mut self) -> Result<(), InitError> { Ok(()) }
//! }
//!
//! let mut registry = ModuleRegistry::new();
//! registry.register_modules()?;
//! registry.initialize_all()?;
//! ```
//!
//! Link order is unspecified, so entries are always walked sorted by name.

use std::any::TypeId;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use crate::config::LifecycleConfig;
use crate::error::{ModuleError, Result};
use crate::logging::targets;
use crate::module::Module;
use crate::registry::ModuleRegistry;

/// Catalog entry for one module type.
///
/// Each module type submits one entry using
/// `#[linkme::distributed_slice(MODULE_CATALOG)]`. The entry contains the
/// lookup name and a factory creating a fresh instance.
pub struct CatalogEntry {
    /// Unique module name, also used for named dependencies.
    pub name: &'static str,
    /// Type identity of the module.
    pub type_id: fn() -> TypeId,
    /// Full type name of the module.
    pub type_name: fn() -> &'static str,
    /// Factory function to create a module instance.
    pub create: fn() -> Box<dyn Module>,
}

impl std::fmt::Debug for CatalogEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogEntry")
            .field("name", &self.name)
            .field("type_name", &(self.type_name)())
            .finish()
    }
}

// Auto-collection via linkme distributed slices: modules submit entries at link time
#[linkme::distributed_slice]
pub static MODULE_CATALOG: [CatalogEntry] = [..];

/// All catalog entries, sorted by name.
pub fn catalog_entries() -> Vec<&'static CatalogEntry> {
    sorted(&MODULE_CATALOG)
}

/// Find a catalog entry by module name.
pub fn find_entry(name: &str) -> Option<&'static CatalogEntry> {
    MODULE_CATALOG.iter().find(|entry| entry.name == name)
}

/// List the names of all catalog modules, sorted.
///
/// Useful for CLI help and for writing `disabled` lists.
pub fn list_modules() -> Vec<&'static str> {
    catalog_entries().into_iter().map(|entry| entry.name).collect()
}

fn sorted(entries: &[CatalogEntry]) -> Vec<&CatalogEntry> {
    let mut entries: Vec<&CatalogEntry> = entries.iter().collect();
    entries.sort_by_key(|entry| entry.name);
    entries
}

impl ModuleRegistry {
    /// Instantiate and register every module in the link-time catalog.
    ///
    /// Returns the number of modules registered. See
    /// [`register_catalog`](Self::register_catalog).
    pub fn register_modules(&mut self) -> Result<usize> {
        self.register_catalog(&MODULE_CATALOG)
    }

    /// Instantiate and register every module in `entries`.
    ///
    /// All entry names are added to the name directory first, including
    /// disabled ones, so a named dependency on a disabled module reports
    /// the module as missing rather than unknown. Entries named in the
    /// configuration's `disabled` list are skipped, as are types that are
    /// already registered.
    ///
    /// The batch is checked before anything is inserted; on error the
    /// registry is left as it was.
    ///
    /// # Errors
    ///
    /// [`ModuleError::DuplicateName`] if an entry's name is taken by a
    /// different registered or declared type, or by another entry.
    pub fn register_catalog(&mut self, entries: &[CatalogEntry]) -> Result<usize> {
        let entries = sorted(entries);
        let pending = self.pending_entries(&entries)?;

        for entry in &entries {
            self.declare(entry.name.to_string(), (entry.type_id)(), (entry.type_name)());
        }
        for entry in &pending {
            self.insert(
                (entry.create)(),
                Cow::Borrowed(entry.name),
                (entry.type_id)(),
                (entry.type_name)(),
            )?;
        }

        tracing::debug!(target: targets::CATALOG, count = pending.len(), "registered catalog modules");
        Ok(pending.len())
    }

    /// The entries `register_catalog` would insert, or the first name clash.
    fn pending_entries<'e>(&self, entries: &[&'e CatalogEntry]) -> Result<Vec<&'e CatalogEntry>> {
        let mut batch: HashMap<&str, (TypeId, &'static str)> = HashMap::new();
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for &entry in entries {
            let type_id = (entry.type_id)();
            let type_name = (entry.type_name)();
            if let Some(&(other, other_name)) = batch.get(entry.name) {
                if other != type_id {
                    return Err(ModuleError::DuplicateName {
                        name: entry.name.to_string(),
                        existing: other_name.to_string(),
                    });
                }
            }
            batch.insert(entry.name, (type_id, type_name));

            if self.config.is_disabled(entry.name) {
                tracing::debug!(target: targets::CATALOG, name = entry.name, "module disabled by configuration");
                continue;
            }
            if self.type_index().contains_key(&type_id) || !seen.insert(type_id) {
                tracing::trace!(target: targets::CATALOG, name = entry.name, "module already registered");
                continue;
            }
            if let Some(existing) = self.name_conflict(entry.name, type_id) {
                return Err(ModuleError::DuplicateName {
                    name: entry.name.to_string(),
                    existing: existing.to_string(),
                });
            }
            pending.push(entry);
        }
        Ok(pending)
    }

    /// Create a registry holding every catalog module not disabled by
    /// `config`.
    pub fn from_catalog(config: LifecycleConfig) -> Result<Self> {
        let mut registry = Self::with_config(config);
        registry.register_modules()?;
        Ok(registry)
    }
}
