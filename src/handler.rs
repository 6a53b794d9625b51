//! The handler protocol
//!
//! A launch is driven by an ordered list of handlers. Each handler
//! implements whichever hooks it cares about; the rest default to no-ops.
//! The executor runs every hook of one phase, in registration order,
//! before moving on to the next phase:
//!
//! 1. `on_setup` for every handler. The first failure skips the remaining
//!    setup hooks and the process is never created.
//! 2. (Unix) `on_exec_setup` for every handler, inside the forked child
//!    just before the program image is replaced.
//! 3. Either `on_success` for every handler, or `on_error` for every
//!    handler. Never both.

use crate::error::{LaunchError, Result};
use crate::executor::LaunchParams;

/// A behavior participating in a launch.
///
/// Handlers see the same [`LaunchParams`] record, so a later handler can
/// build on what an earlier one installed (for example merging stderr into
/// whatever stdout slot was set before it).
pub trait Handler {
    /// Called before the process is created. May mutate `params`.
    fn on_setup(&mut self, _params: &mut LaunchParams) -> Result<()> {
        Ok(())
    }

    /// Called when setup or process creation failed. Cleanup only: the
    /// original error is what the launch reports.
    fn on_error(&mut self, _params: &mut LaunchParams, _error: &LaunchError) {}

    /// Called after the process was created.
    fn on_success(&mut self, _params: &mut LaunchParams) {}

    /// Called in the forked child right before `execve`.
    ///
    /// Only async-signal-safe work belongs here: no allocation, no locks,
    /// no logging. Returning an error aborts the exec and the parent sees
    /// a `PlatformCreationFailure` with that errno.
    #[cfg(unix)]
    fn on_exec_setup(&mut self, _params: &LaunchParams) -> nix::Result<()> {
        Ok(())
    }

    /// Whether this handler takes responsibility for launch errors.
    ///
    /// When any registered handler returns true, a failed launch returns
    /// an invalid child handle instead of an error.
    fn is_error_handler(&self) -> bool {
        false
    }
}

impl<H: Handler + ?Sized> Handler for &mut H {
    fn on_setup(&mut self, params: &mut LaunchParams) -> Result<()> {
        (**self).on_setup(params)
    }

    fn on_error(&mut self, params: &mut LaunchParams, error: &LaunchError) {
        (**self).on_error(params, error)
    }

    fn on_success(&mut self, params: &mut LaunchParams) {
        (**self).on_success(params)
    }

    #[cfg(unix)]
    fn on_exec_setup(&mut self, params: &LaunchParams) -> nix::Result<()> {
        (**self).on_exec_setup(params)
    }

    fn is_error_handler(&self) -> bool {
        (**self).is_error_handler()
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn on_setup(&mut self, params: &mut LaunchParams) -> Result<()> {
        (**self).on_setup(params)
    }

    fn on_error(&mut self, params: &mut LaunchParams, error: &LaunchError) {
        (**self).on_error(params, error)
    }

    fn on_success(&mut self, params: &mut LaunchParams) {
        (**self).on_success(params)
    }

    #[cfg(unix)]
    fn on_exec_setup(&mut self, params: &LaunchParams) -> nix::Result<()> {
        (**self).on_exec_setup(params)
    }

    fn is_error_handler(&self) -> bool {
        (**self).is_error_handler()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Cmd;
    use crate::Executor;

    #[derive(Default)]
    struct Counter {
        setups: usize,
        successes: usize,
        errors: usize,
    }

    impl Handler for Counter {
        fn on_setup(&mut self, _params: &mut LaunchParams) -> Result<()> {
            self.setups += 1;
            Ok(())
        }

        fn on_error(&mut self, _params: &mut LaunchParams, _error: &LaunchError) {
            self.errors += 1;
        }

        fn on_success(&mut self, _params: &mut LaunchParams) {
            self.successes += 1;
        }
    }

    #[test]
    fn borrowed_handler_keeps_its_state() {
        let mut counter = Counter::default();
        let result = Executor::new()
            .with(Cmd::new("/nonexistent/proclaunch-test-binary"))
            .with(&mut counter)
            .launch();

        assert!(result.is_err());
        assert_eq!((counter.setups, counter.successes, counter.errors), (1, 0, 1));
    }

    #[test]
    fn defaults_are_no_ops() {
        struct Nothing;
        impl Handler for Nothing {}

        let mut params = LaunchParams::default();
        let mut boxed: Box<dyn Handler> = Box::new(Nothing);
        assert!(boxed.on_setup(&mut params).is_ok());
        assert!(!boxed.is_error_handler());
        assert!(params.exe.is_none());
    }
}
