//! Panic Safety for Sweep Execution
//!
//! The velocity-limit restore is async, so it cannot run from `Drop`. What `Drop` can do is
//! notice that a scope was abandoned (the sweep future was dropped mid-flight or a panic
//! unwound through it) and report that the machine may still be in test configuration.
//!
//! `PanicGuard` is the RAII piece of that: it runs a synchronous callback on drop unless it
//! was dismissed first.
//!
//! # Example
//!
//! ```rust,ignore
//! let guard = PanicGuard::named("velocity limits", || {
//!     tracing::error!("Sweep abandoned: velocity limits were NOT restored");
//! });
//!
//! restore_limits().await?;
//! guard.dismiss();
//! ```

/// A synchronous RAII guard that executes a callback when dropped.
///
/// # Limitations
///
/// - Cannot run async code
/// - Must not panic in the callback (a panic there is caught and logged)
pub struct PanicGuard {
    cleanup: Option<Box<dyn FnOnce() + Send + 'static>>,
    name: String,
}

impl PanicGuard {
    /// Create a new panic guard with a cleanup function.
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::named("unnamed", cleanup)
    }

    /// Create a named panic guard (for logging).
    pub fn named<F>(name: impl Into<String>, cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cleanup: Some(Box::new(cleanup)),
            name: name.into(),
        }
    }

    /// Dismiss the guard without running cleanup.
    ///
    /// Call this when the protected operation completes.
    pub fn dismiss(mut self) {
        self.cleanup = None;
    }

    /// Check if the guard is still armed.
    pub fn is_armed(&self) -> bool {
        self.cleanup.is_some()
    }
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            if std::thread::panicking() {
                tracing::error!(
                    guard = %self.name,
                    "Guard triggered during panic - executing cleanup"
                );
            }

            // Run cleanup (catch any panics to avoid double-panic)
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup));

            if let Err(e) = result {
                tracing::error!(guard = %self.name, "Cleanup panicked: {:?}", e);
            }
        }
    }
}
