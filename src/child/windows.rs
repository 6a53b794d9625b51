use crate::error::{LaunchError, Result};
use std::os::windows::io::{AsRawHandle, OwnedHandle, RawHandle};
use windows::Win32::Foundation::{HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::System::JobObjects::TerminateJobObject;
use windows::Win32::System::Threading::{
    GetExitCodeProcess, TerminateProcess, WaitForSingleObject, INFINITE,
};

/// Exit code used when the child is terminated through its handle.
const TERMINATED_EXIT_CODE: u32 = 1;

/// Handles returned by `CreateProcessW` before the success hooks ran.
pub(crate) struct Spawned {
    pub(crate) process: OwnedHandle,
    pub(crate) thread: OwnedHandle,
    pub(crate) pid: u32,
    pub(crate) job: Option<OwnedHandle>,
}

/// Owned handle to a child process
///
/// Owns the process and primary thread handles and, when the launch
/// attached the child to a job object, the job handle. All of them are
/// closed when the handle is dropped.
#[derive(Debug, Default)]
pub struct ChildHandle {
    process: Option<OwnedHandle>,
    thread: Option<OwnedHandle>,
    job: Option<OwnedHandle>,
    pid: u32,
    exit_code: Option<i32>,
}

fn win(handle: &OwnedHandle) -> HANDLE {
    HANDLE(handle.as_raw_handle() as isize)
}

impl ChildHandle {
    pub(crate) fn new(spawned: Spawned) -> Self {
        Self {
            process: Some(spawned.process),
            thread: Some(spawned.thread),
            job: spawned.job,
            pid: spawned.pid,
            exit_code: None,
        }
    }

    /// Process id, or -1 for an invalid handle.
    pub fn get_pid(&self) -> i32 {
        if self.valid() {
            self.pid as i32
        } else {
            -1
        }
    }

    pub fn process_handle(&self) -> Option<RawHandle> {
        self.process.as_ref().map(AsRawHandle::as_raw_handle)
    }

    pub fn thread_handle(&self) -> Option<RawHandle> {
        self.thread.as_ref().map(AsRawHandle::as_raw_handle)
    }

    /// Job object the child was assigned to at launch.
    pub fn job_handle(&self) -> Option<RawHandle> {
        self.job.as_ref().map(AsRawHandle::as_raw_handle)
    }

    pub fn valid(&self) -> bool {
        self.process.is_some()
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    fn require_process(&self) -> Result<HANDLE> {
        self.process
            .as_ref()
            .map(win)
            .ok_or_else(|| LaunchError::InvalidArgument("invalid child handle".to_string()))
    }

    fn wait_for(&mut self, timeout_ms: u32) -> Result<Option<i32>> {
        if let Some(code) = self.exit_code {
            return Ok(Some(code));
        }
        let process = self.require_process()?;
        let event = unsafe { WaitForSingleObject(process, timeout_ms) };
        if event == WAIT_TIMEOUT {
            return Ok(None);
        }
        if event != WAIT_OBJECT_0 {
            return Err(windows::core::Error::from_win32().into());
        }
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(process, &mut code) }?;
        self.exit_code = Some(code as i32);
        Ok(self.exit_code)
    }

    /// Wait for the child process without blocking
    pub fn try_wait(&mut self) -> Result<Option<i32>> {
        self.wait_for(0)
    }

    /// Wait for the child process to exit (blocking)
    pub fn wait(&mut self) -> Result<i32> {
        match self.wait_for(INFINITE)? {
            Some(code) => Ok(code),
            None => Err(LaunchError::InvalidArgument(
                "infinite wait timed out".to_string(),
            )),
        }
    }

    pub fn running(&mut self) -> Result<bool> {
        Ok(self.try_wait()?.is_none())
    }

    /// Forcefully end the child, or its whole job when it has one.
    pub fn terminate(&mut self) -> Result<()> {
        if self.exit_code.is_some() {
            return Ok(());
        }
        let process = self.require_process()?;
        match &self.job {
            Some(job) => unsafe { TerminateJobObject(win(job), TERMINATED_EXIT_CODE) }?,
            None => unsafe { TerminateProcess(process, TERMINATED_EXIT_CODE) }?,
        }
        self.wait()?;
        Ok(())
    }
}
