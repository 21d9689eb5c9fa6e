use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Callback run from the interrupt line's own context on every falling edge
pub type EdgeCallback = Box<dyn FnMut() + Send + 'static>;

/// The chip's IRQ output, wired to an input with pull-up.
/// Implement this trait for different GPIO backends.
pub trait InterruptLine {
    /// Error type for GPIO operations
    type Error: std::fmt::Debug;

    /// Register the callback for falling edges, replacing any previous one
    fn on_falling_edge(&mut self, callback: EdgeCallback) -> Result<(), Self::Error>;

    /// Drop all registered callbacks
    fn clear_callbacks(&mut self) -> Result<(), Self::Error>;
}

/// Latched edge flag the scan worker sleeps on.
///
/// The interrupt callback calls [`notify`](Self::notify); the worker consumes
/// at most one notification per [`wait_timeout`](Self::wait_timeout).
#[derive(Debug, Default)]
pub struct IrqSignal {
    fired: Mutex<bool>,
    condvar: Condvar,
}

impl IrqSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        let mut fired = self.fired.lock().unwrap_or_else(PoisonError::into_inner);
        *fired = true;
        self.condvar.notify_all();
    }

    /// Forget an edge that arrived before the current wait cycle
    pub fn reset(&self) {
        *self.fired.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    /// Block until an edge arrives or `timeout` elapses. Returns whether an
    /// edge was consumed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut fired = self.fired.lock().unwrap_or_else(PoisonError::into_inner);
        while !*fired {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            fired = self
                .condvar
                .wait_timeout(fired, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *fired = false;
        true
    }
}
