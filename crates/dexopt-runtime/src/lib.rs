//! Dexopt Runtime - cooperative cancellation for long-running compilations
//!
//! This crate provides the cancellation primitives shared by the dexopt
//! engine and its callers:
//! - `CancellationSignal` - A caller-held handle that can be cancelled from any thread
//! - `ListenerGuard` - A scoped on-cancel subscription, cleared when dropped
//!
//! # Design
//!
//! Cancellation is cooperative. Nothing is interrupted directly: a
//! cancelled signal invokes its current listener, and the listener is
//! expected to forward the request to whatever is doing the work (for the
//! engine, the compiler service's per-invocation token).
//!
//! A signal holds at most one listener at a time. Long-lived callers may
//! keep a signal around across many requests, so subscriptions are scoped:
//! `CancellationSignal::subscribe` returns a guard and the listener is
//! removed when the guard goes out of scope.

pub mod signal;

pub use signal::{CancellationSignal, ListenerGuard, OnCancelListener};
