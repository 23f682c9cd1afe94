//! Cancellation signal with a single replaceable on-cancel listener.
//!
//! # Example
//!
//! ```rust
//! use dexopt_runtime::CancellationSignal;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let signal = CancellationSignal::new();
//! let forwarded = Arc::new(AtomicBool::new(false));
//!
//! {
//!     let forwarded = Arc::clone(&forwarded);
//!     let _guard = signal.subscribe(move || forwarded.store(true, Ordering::SeqCst));
//!     signal.cancel();
//! }
//!
//! assert!(signal.is_cancelled());
//! assert!(forwarded.load(Ordering::SeqCst));
//! assert!(!signal.has_listener());
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Callback invoked when a signal is cancelled.
pub type OnCancelListener = Arc<dyn Fn() + Send + Sync>;

struct SignalInner {
    cancelled: AtomicBool,
    listener: Mutex<Option<OnCancelListener>>,
}

/// A handle for requesting cooperative cancellation.
///
/// Cloning the signal yields another handle to the same state, so the
/// caller can keep one clone and hand another to the engine.
#[derive(Clone)]
pub struct CancellationSignal {
    inner: Arc<SignalInner>,
}

impl CancellationSignal {
    /// Create a new signal (not cancelled, no listener).
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                cancelled: AtomicBool::new(false),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Request cancellation.
    ///
    /// The current listener, if any, is invoked exactly once per signal.
    /// Subsequent calls are no-ops.
    pub fn cancel(&self) {
        // The flag flips under the listener lock, so a listener installed
        // concurrently is fired either here or by the installer, never both.
        let listener = {
            let slot = self.inner.listener.lock();
            if self.inner.cancelled.swap(true, Ordering::AcqRel) {
                return;
            }
            slot.clone()
        };
        // Invoke outside the lock so a listener may touch the signal.
        if let Some(listener) = listener {
            listener();
        }
    }

    /// Replace the on-cancel listener.
    ///
    /// Passing `None` clears it. If the signal is already cancelled, the new
    /// listener is invoked immediately.
    pub fn set_on_cancel_listener(&self, listener: Option<OnCancelListener>) {
        let to_invoke = {
            let mut slot = self.inner.listener.lock();
            *slot = listener.clone();
            if self.is_cancelled() {
                listener
            } else {
                None
            }
        };
        if let Some(listener) = to_invoke {
            listener();
        }
    }

    /// Install `listener` for the lifetime of the returned guard.
    pub fn subscribe<F>(&self, listener: F) -> ListenerGuard<'_>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.set_on_cancel_listener(Some(Arc::new(listener)));
        ListenerGuard { signal: self }
    }

    /// Whether a listener is currently installed.
    pub fn has_listener(&self) -> bool {
        self.inner.listener.lock().is_some()
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationSignal")
            .field("cancelled", &self.is_cancelled())
            .field("has_listener", &self.has_listener())
            .finish()
    }
}

/// A scoped listener subscription.
///
/// Dropping the guard clears the signal's listener, whether the scope ends
/// normally, by early return, or by unwinding.
#[must_use = "the listener is removed as soon as the guard is dropped"]
pub struct ListenerGuard<'a> {
    signal: &'a CancellationSignal,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.signal.set_on_cancel_listener(None);
    }
}
