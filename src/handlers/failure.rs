use crate::error::LaunchError;
use crate::executor::LaunchParams;
use crate::handler::Handler;

/// Record the launch error into a caller-owned slot.
///
/// This is an error handler: with it registered, a failed launch returns
/// an invalid child handle instead of an error, and the error ends up in
/// the slot.
#[derive(Debug)]
pub struct CaptureError<'a> {
    slot: &'a mut Option<LaunchError>,
}

impl<'a> CaptureError<'a> {
    pub fn new(slot: &'a mut Option<LaunchError>) -> Self {
        Self { slot }
    }
}

impl Handler for CaptureError<'_> {
    fn on_error(&mut self, _params: &mut LaunchParams, error: &LaunchError) {
        *self.slot = Some(error.clone());
    }

    fn is_error_handler(&self) -> bool {
        true
    }
}

/// Log failed launches, naming the program that was attempted.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogFailures;

impl Handler for LogFailures {
    fn on_error(&mut self, params: &mut LaunchParams, error: &LaunchError) {
        match &params.exe {
            Some(exe) => log::error!("Failed to launch {}: {}", exe.display(), error),
            None => log::error!("Failed to launch: {}", error),
        }
    }
}
