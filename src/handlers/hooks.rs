//! Closure adapters for one-off hooks

use crate::error::{LaunchError, Result};
use crate::executor::LaunchParams;
use crate::handler::Handler;

/// Run a closure during setup.
pub struct OnSetup<F>(pub F);

impl<F> Handler for OnSetup<F>
where
    F: FnMut(&mut LaunchParams) -> Result<()>,
{
    fn on_setup(&mut self, params: &mut LaunchParams) -> Result<()> {
        (self.0)(params)
    }
}

/// Run a closure after the process was created.
pub struct OnSuccess<F>(pub F);

impl<F> Handler for OnSuccess<F>
where
    F: FnMut(&mut LaunchParams),
{
    fn on_success(&mut self, params: &mut LaunchParams) {
        (self.0)(params)
    }
}

/// Run a closure when the launch failed.
pub struct OnError<F>(pub F);

impl<F> Handler for OnError<F>
where
    F: FnMut(&mut LaunchParams, &LaunchError),
{
    fn on_error(&mut self, params: &mut LaunchParams, error: &LaunchError) {
        (self.0)(params, error)
    }
}

/// Run a closure in the forked child right before exec.
///
/// The closure runs after `fork` in a possibly multi-threaded parent: it
/// must stick to async-signal-safe calls and must not allocate.
#[cfg(unix)]
pub struct OnExec<F>(pub F);

#[cfg(unix)]
impl<F> Handler for OnExec<F>
where
    F: FnMut(&LaunchParams) -> nix::Result<()>,
{
    fn on_exec_setup(&mut self, params: &LaunchParams) -> nix::Result<()> {
        (self.0)(params)
    }
}
