//! Unix signal handling

use super::SignalFlags;
use nix::sys::signal::Signal;
use proclaunch::{ChildHandle, LaunchError, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn register(signal: i32, name: &str, flag: &Arc<AtomicBool>) -> Result<()> {
    signal_hook::flag::register(signal, Arc::clone(flag)).map_err(|e| {
        LaunchError::SetupFailure(format!("Failed to register {} handler: {}", name, e))
    })?;
    Ok(())
}

/// Set up signal handlers for the application
///
/// The handlers only set atomic flags; the wait loop checks them and
/// forwards the signal to the child.
pub fn setup_signal_handlers() -> Result<SignalFlags> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};

    let flags = SignalFlags::new();
    register(SIGTERM, "SIGTERM", &flags.sigterm_received)?;
    register(SIGINT, "SIGINT", &flags.sigint_received)?;
    register(SIGHUP, "SIGHUP", &flags.sighup_received)?;
    Ok(flags)
}

/// Forward a signal to the child, or to its process group when it was
/// launched into its own group.
pub fn forward_signal_to_child(signal: Signal, child: &mut ChildHandle, group: bool) -> Result<()> {
    log::debug!("Forwarding {:?} to child {}", signal, child.get_pid());
    if group {
        child.signal_group(signal)
    } else {
        child.signal(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::{SIGHUP, SIGINT, SIGTERM};
    use std::sync::atomic::Ordering;

    #[test]
    fn flags_start_cleared() {
        let flags = SignalFlags::new();
        assert_eq!(flags.take_term_signal(), None);
    }

    #[test]
    fn term_signal_priority_and_clearing() {
        let flags = SignalFlags::new();
        flags.sighup_received.store(true, Ordering::SeqCst);
        flags.sigint_received.store(true, Ordering::SeqCst);

        assert_eq!(flags.take_term_signal(), Some(SIGINT));
        assert_eq!(flags.take_term_signal(), Some(SIGHUP));
        assert_eq!(flags.take_term_signal(), None);

        flags.sigterm_received.store(true, Ordering::SeqCst);
        assert_eq!(flags.take_term_signal(), Some(SIGTERM));
    }

    #[test]
    fn forwarding_reaches_the_child() {
        let mut child = proclaunch::launch("/bin/sh", ["-c", "sleep 30"]).unwrap();
        forward_signal_to_child(SIGTERM, &mut child, false).unwrap();
        assert_eq!(child.wait().unwrap(), 128 + SIGTERM as i32);
    }
}
