use crate::error::{LaunchError, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{getpgid, getpgrp, Pid};

/// Identity of a freshly forked child before the success hooks ran.
pub(crate) struct Spawned {
    pub(crate) pid: Pid,
}

/// Owned handle to a child process
///
/// The handle is either valid (it holds the pid of a process this crate
/// launched) or invalid. Moving it out with [`std::mem::take`] leaves an
/// invalid handle behind. The exit code is cached after the first
/// successful wait, so the process is reaped exactly once.
#[derive(Debug, Default)]
pub struct ChildHandle {
    pid: Option<Pid>,
    exit_code: Option<i32>,
}

impl ChildHandle {
    pub(crate) fn new(spawned: Spawned) -> Self {
        Self {
            pid: Some(spawned.pid),
            exit_code: None,
        }
    }

    /// Raw pid, or -1 for an invalid handle.
    pub fn get_pid(&self) -> i32 {
        self.pid.map(Pid::as_raw).unwrap_or(-1)
    }

    pub fn process_handle(&self) -> Option<Pid> {
        self.pid
    }

    pub fn valid(&self) -> bool {
        self.pid.is_some()
    }

    /// Exit code collected by an earlier wait, if any.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn require_pid(&self) -> Result<Pid> {
        self.pid
            .ok_or_else(|| LaunchError::InvalidArgument("invalid child handle".to_string()))
    }

    /// Wait for the child process without blocking
    ///
    /// Returns Some(exit_code) if the process has exited, None if still running.
    /// A child killed by a signal reports `128 + signal`.
    pub fn try_wait(&mut self) -> Result<Option<i32>> {
        if let Some(code) = self.exit_code {
            return Ok(Some(code));
        }
        let pid = self.require_pid()?;
        let code = match waitpid(pid, Some(WaitPidFlag::WNOHANG))? {
            WaitStatus::Exited(_, code) => Some(code),
            WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
            _ => None,
        };
        self.exit_code = code;
        Ok(code)
    }

    /// Wait for the child process to exit (blocking)
    pub fn wait(&mut self) -> Result<i32> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let pid = self.require_pid()?;
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => {
                    self.exit_code = Some(code);
                    return Ok(code);
                }
                Ok(WaitStatus::Signaled(_, sig, _)) => {
                    let code = 128 + sig as i32;
                    self.exit_code = Some(code);
                    return Ok(code);
                }
                Ok(_) | Err(Errno::EINTR) => continue,
                Err(e) => return Err(LaunchError::SystemError(e)),
            }
        }
    }

    pub fn running(&mut self) -> Result<bool> {
        Ok(self.try_wait()?.is_none())
    }

    /// Send a signal to the child process
    ///
    /// Fails with `ESRCH` once the child has been reaped, since its pid
    /// may already belong to another process.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        let pid = self.require_pid()?;
        if self.exit_code.is_some() {
            return Err(LaunchError::SystemError(Errno::ESRCH));
        }
        kill(pid, signal)?;
        Ok(())
    }

    /// Send a signal to the child's whole process group.
    ///
    /// Refuses to signal the caller's own group, which is where a child
    /// launched without a group handler lives.
    pub fn signal_group(&self, signal: Signal) -> Result<()> {
        let pid = self.require_pid()?;
        if self.exit_code.is_some() {
            return Err(LaunchError::SystemError(Errno::ESRCH));
        }
        let pgid = getpgid(Some(pid))?;
        if pgid == getpgrp() {
            return Err(LaunchError::InvalidArgument(
                "child shares the caller's process group".to_string(),
            ));
        }
        killpg(pgid, signal)?;
        Ok(())
    }

    /// Kill the child with SIGKILL and reap it.
    pub fn terminate(&mut self) -> Result<()> {
        if self.exit_code.is_some() {
            return Ok(());
        }
        self.signal(Signal::SIGKILL)?;
        self.wait()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn_sh(script: &str) -> ChildHandle {
        crate::launch("/bin/sh", ["-c", script]).unwrap()
    }

    #[test]
    fn default_handle_is_invalid() {
        let mut handle = ChildHandle::default();
        assert!(!handle.valid());
        assert_eq!(handle.get_pid(), -1);
        assert!(handle.process_handle().is_none());
        assert!(matches!(handle.wait(), Err(LaunchError::InvalidArgument(_))));
    }

    #[test]
    fn wait_reports_exit_code_once_reaped() {
        let mut child = spawn_sh("exit 7");
        assert!(child.valid());
        assert!(child.get_pid() > 0);
        assert_eq!(child.wait().unwrap(), 7);
        // cached, no second waitpid
        assert_eq!(child.wait().unwrap(), 7);
        assert_eq!(child.try_wait().unwrap(), Some(7));
        assert_eq!(child.exit_code(), Some(7));
    }

    #[test]
    fn terminate_running_child() {
        let mut child = spawn_sh("sleep 30");
        assert!(child.running().unwrap());
        child.terminate().unwrap();
        assert_eq!(child.exit_code(), Some(128 + Signal::SIGKILL as i32));
        assert!(child.signal(Signal::SIGTERM).is_err());
    }

    #[test]
    fn group_signal_refuses_callers_group() {
        let mut child = spawn_sh("sleep 30");
        assert!(matches!(
            child.signal_group(Signal::SIGTERM),
            Err(LaunchError::InvalidArgument(_))
        ));
        child.terminate().unwrap();
    }

    #[test]
    fn take_invalidates_source_handle() {
        let mut child = spawn_sh("exit 0");
        let pid = child.get_pid();

        let mut moved = std::mem::take(&mut child);
        assert!(!child.valid());
        assert_eq!(moved.get_pid(), pid);
        assert_eq!(moved.wait().unwrap(), 0);
    }
}
