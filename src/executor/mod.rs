//! Launch orchestration
//!
//! An [`Executor`] owns an ordered list of handlers and drives them through
//! one launch:
//!
//! ```text
//! Initial -> SettingUp -> Launching -> Succeeded -> Done
//!                 |            |
//!                 +------------+--> Failed -> Done
//! ```
//!
//! The OS-specific process creation lives in the `unix` and `windows`
//! submodules; both take the populated [`LaunchParams`] and return the raw
//! identity of the new process.

use crate::child::ChildHandle;
use crate::error::{into_slot, LaunchError, Result};
use crate::handler::Handler;
use crate::handlers::Cmd;
use std::ffi::OsStr;
use std::fmt;
use std::path::Path;

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;
#[cfg(unix)]
pub use unix::LaunchParams;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use self::windows as sys;
#[cfg(windows)]
pub use self::windows::LaunchParams;

/// Where an executor is in its single launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
    Initial,
    SettingUp,
    Launching,
    Succeeded,
    Failed,
    Done,
}

impl fmt::Display for LaunchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LaunchState::Initial => "initial",
            LaunchState::SettingUp => "setting up",
            LaunchState::Launching => "launching",
            LaunchState::Succeeded => "succeeded",
            LaunchState::Failed => "failed",
            LaunchState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Runs one launch through a fixed, ordered set of handlers.
///
/// ```no_run
/// use proclaunch::handlers::{Cmd, StdOut};
/// use proclaunch::{Executor, Pipe};
///
/// # fn main() -> proclaunch::Result<()> {
/// let mut pipe = Pipe::create()?;
/// let mut child = Executor::new()
///     .with(Cmd::new("/bin/echo").arg("hello"))
///     .with(StdOut::pipe(&mut pipe))
///     .launch()?;
/// child.wait()?;
/// # Ok(())
/// # }
/// ```
pub struct Executor<'a> {
    handlers: Vec<Box<dyn Handler + 'a>>,
    state: LaunchState,
}

impl Default for Executor<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Executor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("handlers", &self.handlers.len())
            .field("state", &self.state)
            .finish()
    }
}

impl<'a> Executor<'a> {
    pub fn new() -> Self {
        Self::from_handlers(Vec::new())
    }

    pub fn from_handlers(handlers: Vec<Box<dyn Handler + 'a>>) -> Self {
        Self {
            handlers,
            state: LaunchState::Initial,
        }
    }

    /// Append a handler. Handlers run in the order they were added.
    pub fn with<H: Handler + 'a>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn state(&self) -> LaunchState {
        self.state
    }

    /// Whether a handler took responsibility for launch errors.
    pub fn has_error_handler(&self) -> bool {
        self.handlers.iter().any(|h| h.is_error_handler())
    }

    /// Run the launch.
    ///
    /// A failed launch returns the error, unless an error handler is
    /// registered: then the error only reaches the `on_error` hooks and an
    /// invalid [`ChildHandle`] is returned. An executor launches once; a
    /// second call fails with [`LaunchError::InvalidArgument`].
    pub fn launch(&mut self) -> Result<ChildHandle> {
        if self.state != LaunchState::Initial {
            return Err(LaunchError::InvalidArgument(format!(
                "executor already ran (state: {})",
                self.state
            )));
        }
        match self.run() {
            Ok(child) => Ok(child),
            Err(err) if self.has_error_handler() => {
                log::warn!("Launch failed, handled by error handler: {}", err);
                Ok(ChildHandle::default())
            }
            Err(err) => Err(err),
        }
    }

    /// Run the launch, reporting failure through `err`.
    ///
    /// Returns an invalid handle when the launch failed.
    pub fn launch_with(&mut self, err: &mut Option<LaunchError>) -> ChildHandle {
        into_slot(self.launch(), err).unwrap_or_default()
    }

    fn transition(&mut self, next: LaunchState) {
        log::trace!("Launch state: {} -> {}", self.state, next);
        self.state = next;
    }

    fn setup(&mut self, params: &mut LaunchParams) -> Result<()> {
        for (index, handler) in self.handlers.iter_mut().enumerate() {
            log::trace!("on_setup for handler #{}", index);
            handler.on_setup(params)?;
        }
        Ok(())
    }

    fn run(&mut self) -> Result<ChildHandle> {
        let mut params = LaunchParams::default();

        self.transition(LaunchState::SettingUp);
        let created = match self.setup(&mut params) {
            Ok(()) => {
                self.transition(LaunchState::Launching);
                sys::create_process(&mut params, &mut self.handlers)
            }
            Err(err) => Err(err),
        };

        match created {
            Ok(spawned) => {
                self.transition(LaunchState::Succeeded);
                for handler in self.handlers.iter_mut() {
                    handler.on_success(&mut params);
                }
                let child = ChildHandle::new(spawned);
                log::debug!(
                    "Launched {:?} as pid {}",
                    params.exe.as_deref().unwrap_or(Path::new("")),
                    child.get_pid()
                );
                self.transition(LaunchState::Done);
                Ok(child)
            }
            Err(err) => {
                self.transition(LaunchState::Failed);
                log::debug!("Launch of {:?} failed: {}", params.exe, err);
                for handler in self.handlers.iter_mut() {
                    handler.on_error(&mut params, &err);
                }
                self.transition(LaunchState::Done);
                Err(err)
            }
        }
    }
}

/// Launch `exe` with `args` and nothing else configured.
///
/// The path is used as is; see [`Cmd::search`] for a `PATH` lookup.
pub fn launch<P, I, S>(exe: P, args: I) -> Result<ChildHandle>
where
    P: AsRef<Path>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Executor::new().with(Cmd::new(exe).args(args)).launch()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Journal = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        journal: Journal,
        fail_setup: bool,
    }

    impl Recorder {
        fn new(name: &'static str, journal: &Journal) -> Self {
            Self {
                name,
                journal: Rc::clone(journal),
                fail_setup: false,
            }
        }

        fn failing(name: &'static str, journal: &Journal) -> Self {
            Self {
                fail_setup: true,
                ..Self::new(name, journal)
            }
        }

        fn note(&self, hook: &str) {
            self.journal
                .borrow_mut()
                .push(format!("{}:{}", hook, self.name));
        }
    }

    impl Handler for Recorder {
        fn on_setup(&mut self, _params: &mut LaunchParams) -> Result<()> {
            self.note("setup");
            if self.fail_setup {
                return Err(LaunchError::SetupFailure(format!("{} refused", self.name)));
            }
            Ok(())
        }

        fn on_error(&mut self, _params: &mut LaunchParams, _error: &LaunchError) {
            self.note("error");
        }

        fn on_success(&mut self, _params: &mut LaunchParams) {
            self.note("success");
        }
    }

    struct Swallow;

    impl Handler for Swallow {
        fn is_error_handler(&self) -> bool {
            true
        }
    }

    fn entries(journal: &Journal) -> Vec<String> {
        journal.borrow().clone()
    }

    #[cfg(unix)]
    fn true_cmd() -> Cmd {
        Cmd::new("/bin/sh").arg("-c").arg("exit 0")
    }

    #[cfg(windows)]
    fn true_cmd() -> Cmd {
        Cmd::new("cmd.exe").arg("/C").arg("exit 0")
    }

    #[cfg(unix)]
    const MISSING: &str = "/nonexistent/proclaunch-test-binary";
    #[cfg(windows)]
    const MISSING: &str = r"C:\nonexistent\proclaunch-test-binary.exe";

    #[test]
    fn hooks_run_in_registration_order() {
        let journal = Journal::default();
        let mut child = Executor::new()
            .with(Recorder::new("a", &journal))
            .with(true_cmd())
            .with(Recorder::new("b", &journal))
            .launch()
            .unwrap();
        assert!(child.valid());
        assert_eq!(child.wait().unwrap(), 0);
        assert_eq!(
            entries(&journal),
            vec!["setup:a", "setup:b", "success:a", "success:b"]
        );
    }

    #[test]
    fn setup_failure_skips_remaining_setup_and_process_creation() {
        let journal = Journal::default();
        let mut executor = Executor::new()
            .with(Recorder::new("a", &journal))
            .with(Recorder::failing("b", &journal))
            .with(Recorder::new("c", &journal))
            .with(true_cmd());
        let err = executor.launch().unwrap_err();

        assert_eq!(err, LaunchError::SetupFailure("b refused".to_string()));
        assert_eq!(
            entries(&journal),
            vec!["setup:a", "setup:b", "error:a", "error:b", "error:c"]
        );
        assert_eq!(executor.state(), LaunchState::Done);
    }

    #[test]
    fn missing_program_reports_platform_failure() {
        let journal = Journal::default();
        let result = Executor::new()
            .with(Cmd::new(MISSING))
            .with(Recorder::new("a", &journal))
            .launch();

        assert!(matches!(
            result,
            Err(LaunchError::PlatformCreationFailure { .. })
        ));
        assert_eq!(entries(&journal), vec!["setup:a", "error:a"]);
    }

    #[cfg(unix)]
    #[test]
    fn missing_program_carries_enoent() {
        let err = launch(MISSING, Vec::<String>::new()).unwrap_err();
        assert_eq!(err, LaunchError::PlatformCreationFailure { code: libc::ENOENT });
        assert_eq!(err.exit_code(), 127);
    }

    #[test]
    fn error_handler_swallows_failure() {
        let journal = Journal::default();
        let mut executor = Executor::new()
            .with(Cmd::new(MISSING))
            .with(Recorder::new("a", &journal))
            .with(Swallow);
        assert!(executor.has_error_handler());

        let child = executor.launch().unwrap();
        assert!(!child.valid());
        assert_eq!(entries(&journal), vec!["setup:a", "error:a"]);
    }

    #[test]
    fn error_slot_form() {
        let mut err = None;
        let child = Executor::new().with(Cmd::new(MISSING)).launch_with(&mut err);
        assert!(!child.valid());
        assert!(matches!(
            err,
            Some(LaunchError::PlatformCreationFailure { .. })
        ));

        let mut err = None;
        let mut child = Executor::new().with(true_cmd()).launch_with(&mut err);
        assert!(err.is_none());
        assert_eq!(child.wait().unwrap(), 0);
    }

    #[test]
    fn missing_executable_is_a_setup_failure() {
        let err = Executor::new().launch().unwrap_err();
        assert!(matches!(err, LaunchError::SetupFailure(_)));
    }

    #[test]
    fn executor_launches_once() {
        let mut executor = Executor::new().with(true_cmd());
        assert_eq!(executor.state(), LaunchState::Initial);
        let mut child = executor.launch().unwrap();
        child.wait().unwrap();

        assert!(matches!(
            executor.launch(),
            Err(LaunchError::InvalidArgument(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn shortcut_reports_exit_status() {
        let mut child = launch("/bin/sh", ["-c", "exit 4"]).unwrap();
        assert!(child.get_pid() > 0);
        assert_eq!(child.wait().unwrap(), 4);
    }
}
