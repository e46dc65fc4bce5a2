//! Startup-thread checks for the lifecycle driver.
//!
//! Module startup and shutdown are single-threaded: a registry must be
//! initialized and cleaned up on the same thread. The registry records the
//! thread of its first [`initialize_all`](crate::ModuleRegistry::initialize_all)
//! call in a [`StartupThread`] and, when thread checks are enabled in its
//! [`LifecycleConfig`](crate::LifecycleConfig), panics if a later lifecycle
//! call arrives from another thread.
//!
//! Registration itself is not pinned. A registry may be filled on one thread
//! and moved to the startup thread before the first pass.

use std::thread::ThreadId;

/// The thread a registry's lifecycle is bound to.
///
/// # Example
///
/// ```
/// use ordo_core::thread_check::StartupThread;
///
/// let startup = StartupThread::capture();
/// assert!(startup.is_current());
/// startup.verify("initialize_all");
/// ```
#[derive(Debug, Clone)]
pub struct StartupThread {
    id: ThreadId,
    name: Option<String>,
}

impl StartupThread {
    /// Record the calling thread.
    pub fn capture() -> Self {
        let thread = std::thread::current();
        Self {
            id: thread.id(),
            name: thread.name().map(str::to_owned),
        }
    }

    /// ID of the recorded thread.
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Name of the recorded thread, if it had one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns `true` when called on the recorded thread.
    #[inline]
    pub fn is_current(&self) -> bool {
        std::thread::current().id() == self.id
    }

    /// Panic unless called on the recorded thread.
    ///
    /// `operation` names the lifecycle call being checked.
    ///
    /// # Panics
    ///
    /// Panics with a descriptive message if called from a different thread.
    #[inline]
    pub fn verify(&self, operation: &str) {
        if !self.is_current() {
            self.violation(operation);
        }
    }

    #[cold]
    #[inline(never)]
    fn violation(&self, operation: &str) -> ! {
        let current = std::thread::current();
        panic!(
            "\n\
            ======================================================================\n\
            LIFECYCLE THREAD VIOLATION\n\
            ======================================================================\n\
            \n\
            ModuleRegistry::{operation} called off the startup thread.\n\
            \n\
            Startup thread: \"{}\" ({:?})\n\
            Calling thread: \"{}\" ({:?})\n\
            \n\
            Module initialization and cleanup must run on the thread that\n\
            performed startup. Move the registry back to that thread, or\n\
            disable `thread_checks` in the lifecycle configuration.\n\
            ======================================================================",
            self.name().unwrap_or("<unnamed>"),
            self.id,
            current.name().unwrap_or("<unnamed>"),
            current.id(),
        )
    }
}
