use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracker_logging::tracker_error;

use crate::JobEvent;

/// Shared callback compared by identity, not by value.
///
/// Cloning keeps the identity, so a clone can later be used to unregister.
pub struct Callback<T: ?Sized> {
    inner: Arc<dyn Fn(&T) + Send + Sync>,
}

pub type EventHandler = Callback<JobEvent>;
pub type ConnectionHandler = Callback<bool>;

impl<T: ?Sized> Callback<T> {
    pub fn new(f: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    pub fn same(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.inner) as *const (),
            Arc::as_ptr(&other.inner) as *const (),
        )
    }

    pub fn call(&self, value: &T) {
        (self.inner)(value)
    }

    /// Calls the handler, containing a panic. Returns `false` if it panicked.
    pub fn call_guarded(&self, value: &T) -> bool {
        match catch_unwind(AssertUnwindSafe(|| (self.inner)(value))) {
            Ok(()) => true,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracker_error!("handler panicked: {}", reason);
                false
            }
        }
    }
}

impl<T: ?Sized> Clone for Callback<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Callback({:p})", Arc::as_ptr(&self.inner) as *const ())
    }
}
