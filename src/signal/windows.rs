//! Windows console control events
//!
//! A console control handler stands in for POSIX signals: Ctrl-C, Ctrl-Break
//! and closing the console window set the same flags the Unix handlers do.

use super::SignalFlags;
use proclaunch::{ChildHandle, LaunchError, Result};
use std::sync::atomic::Ordering;
use std::sync::OnceLock;
use windows::Win32::Foundation::BOOL;
use windows::Win32::System::Console::{
    SetConsoleCtrlHandler, CTRL_BREAK_EVENT, CTRL_CLOSE_EVENT, CTRL_C_EVENT,
};

static SIGNAL_STATE: OnceLock<SignalFlags> = OnceLock::new();

/// Register the console handler and return its flags
pub fn setup_signal_handlers() -> Result<SignalFlags> {
    if let Some(flags) = SIGNAL_STATE.get() {
        return Ok(flags.clone());
    }

    let flags = SIGNAL_STATE.get_or_init(SignalFlags::new).clone();
    unsafe { SetConsoleCtrlHandler(Some(console_handler), BOOL(1)) }.map_err(|err| {
        LaunchError::SetupFailure(format!(
            "Failed to register console control handler: {}",
            err
        ))
    })?;
    Ok(flags)
}

/// End the child (its whole job when it has one); console processes have
/// no signal to pass along.
pub fn forward_signal_to_child(_signal: (), child: &mut ChildHandle, _group: bool) -> Result<()> {
    log::debug!("Terminating child {} on console event", child.get_pid());
    child.terminate()
}

unsafe extern "system" fn console_handler(ctrl_type: u32) -> BOOL {
    if let Some(flags) = SIGNAL_STATE.get() {
        let flag = match ctrl_type {
            CTRL_C_EVENT => &flags.sigint_received,
            CTRL_BREAK_EVENT => &flags.sigterm_received,
            CTRL_CLOSE_EVENT => &flags.sighup_received,
            _ => return BOOL(0),
        };
        flag.store(true, Ordering::SeqCst);
        return BOOL(1);
    }
    BOOL(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_event_requests_termination() {
        let flags = SignalFlags::new();
        assert_eq!(flags.take_term_signal(), None);
        flags.sigint_received.store(true, Ordering::SeqCst);
        assert_eq!(flags.take_term_signal(), Some(()));
        assert_eq!(flags.take_term_signal(), None);
    }
}
