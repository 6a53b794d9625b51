#[cfg(windows)]
use crate::error::Result;
use crate::executor::LaunchParams;
use crate::handler::Handler;

/// Track the child and its descendants as one unit.
///
/// On Unix systems the child becomes the leader of a new process group (or
/// joins an existing one), so the whole tree can be signalled through
/// [`ChildHandle::signal_group`](crate::ChildHandle::signal_group). On
/// Windows the child is created inside a fresh job object, which the child
/// handle owns and [`ChildHandle::terminate`](crate::ChildHandle::terminate)
/// ends as a whole.
#[derive(Debug, Default)]
pub struct Group {
    #[cfg(unix)]
    pgid: Option<nix::unistd::Pid>,
}

impl Group {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the existing process group `pgid` instead of starting one.
    #[cfg(unix)]
    pub fn join(pgid: nix::unistd::Pid) -> Self {
        Self { pgid: Some(pgid) }
    }
}

#[cfg(unix)]
impl Handler for Group {
    fn on_exec_setup(&mut self, _params: &LaunchParams) -> nix::Result<()> {
        use nix::unistd::{setpgid, Pid};
        setpgid(Pid::from_raw(0), self.pgid.unwrap_or(Pid::from_raw(0)))
    }
}

#[cfg(windows)]
impl Handler for Group {
    fn on_setup(&mut self, params: &mut LaunchParams) -> Result<()> {
        use crate::error::{win32_code, LaunchError};
        use std::os::windows::io::{FromRawHandle, OwnedHandle, RawHandle};
        use windows::core::PCWSTR;
        use windows::Win32::System::JobObjects::CreateJobObjectW;

        let job = unsafe { CreateJobObjectW(None, PCWSTR::null()) }
            .map_err(|e| LaunchError::resource("CreateJobObjectW", win32_code(&e), None))?;
        // SAFETY: CreateJobObjectW returned a fresh handle we own.
        params.job_object = Some(unsafe { OwnedHandle::from_raw_handle(job.0 as RawHandle) });
        log::trace!("Created job object for launch");
        Ok(())
    }
}
