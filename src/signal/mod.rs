//! Signal / console event platform abstraction layer
//!
//! The binary registers flag-setting handlers for termination signals and
//! polls the flags while it waits for the child. POSIX signals are used on
//! Unix systems, console control events on Windows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Signal flags shared between the handlers and the wait loop.
#[derive(Clone)]
pub struct SignalFlags {
    pub sigterm_received: Arc<AtomicBool>,
    pub sigint_received: Arc<AtomicBool>,
    pub sighup_received: Arc<AtomicBool>,
}

impl SignalFlags {
    pub fn new() -> Self {
        Self {
            sigterm_received: Arc::new(AtomicBool::new(false)),
            sigint_received: Arc::new(AtomicBool::new(false)),
            sighup_received: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Take the pending termination signal, if any, clearing its flag.
    ///
    /// SIGTERM wins over SIGINT, which wins over SIGHUP.
    #[cfg(unix)]
    pub fn take_term_signal(&self) -> Option<nix::sys::signal::Signal> {
        use nix::sys::signal::{SIGHUP, SIGINT, SIGTERM};
        if self.sigterm_received.swap(false, Ordering::SeqCst) {
            Some(SIGTERM)
        } else if self.sigint_received.swap(false, Ordering::SeqCst) {
            Some(SIGINT)
        } else if self.sighup_received.swap(false, Ordering::SeqCst) {
            Some(SIGHUP)
        } else {
            None
        }
    }

    /// Whether a console event asked us to stop, clearing the flags.
    #[cfg(windows)]
    pub fn take_term_signal(&self) -> Option<()> {
        let term = self.sigterm_received.swap(false, Ordering::SeqCst);
        let int = self.sigint_received.swap(false, Ordering::SeqCst);
        let hup = self.sighup_received.swap(false, Ordering::SeqCst);
        (term || int || hup).then_some(())
    }
}

impl Default for SignalFlags {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::{forward_signal_to_child, setup_signal_handlers};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::{forward_signal_to_child, setup_signal_handlers};
