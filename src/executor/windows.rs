//! CreateProcessW process creation
//!
//! The launch parameters are turned into the wide strings, environment
//! block and `STARTUPINFOW` that `CreateProcessW` wants right before the
//! call. When a job object was installed by a handler the child is created
//! suspended, assigned to the job, and only then resumed, so it cannot
//! spawn anything outside the job.

use crate::child::Spawned;
use crate::error::{win32_code, LaunchError, Result};
use crate::handler::Handler;
use crate::pipe::to_wide;
use std::ffi::{OsStr, OsString};
use std::os::windows::ffi::{OsStrExt, OsStringExt};
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::path::PathBuf;
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{BOOL, HANDLE};
use windows::Win32::System::Console::{
    GetStdHandle, STD_ERROR_HANDLE, STD_HANDLE, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE,
};
use windows::Win32::System::JobObjects::AssignProcessToJobObject;
use windows::Win32::System::Threading::{
    CreateProcessW, ResumeThread, TerminateProcess, CREATE_SUSPENDED,
    CREATE_UNICODE_ENVIRONMENT, PROCESS_CREATION_FLAGS, PROCESS_INFORMATION,
    STARTF_USESHOWWINDOW, STARTF_USESTDHANDLES, STARTUPINFOW,
};

/// Parameters of one launch, shared by every handler during setup.
///
/// Standard stream slots hold handles borrowed from the handler that
/// installed them; the handler is also responsible for making them
/// inheritable. `None` means the child gets the parent's stream.
#[derive(Debug, Default)]
pub struct LaunchParams {
    /// Program to execute. A relative path is looked up by
    /// `CreateProcessW` itself through the command line.
    pub exe: Option<PathBuf>,
    /// Arguments after the program name.
    pub args: Vec<OsString>,
    /// Complete command line; built from `exe` and `args` when unset.
    pub cmd_line: Option<OsString>,
    pub work_dir: Option<PathBuf>,
    /// Complete environment of the child; `None` inherits the parent's.
    pub env: Option<Vec<(OsString, OsString)>>,
    pub stdin: Option<RawHandle>,
    pub stdout: Option<RawHandle>,
    pub stderr: Option<RawHandle>,
    /// Let the child inherit every inheritable handle. Forced on when a
    /// stdio slot is set.
    pub inherit_handles: bool,
    /// Raw `dwCreationFlags` bits.
    pub creation_flags: u32,
    /// Job the child is assigned to; ownership moves to the child handle.
    pub job_object: Option<OwnedHandle>,
    /// `wShowWindow` for the startup info.
    pub show_window: Option<u16>,
}

fn win(handle: RawHandle) -> HANDLE {
    HANDLE(handle as isize)
}

fn owned(handle: HANDLE) -> OwnedHandle {
    // SAFETY: CreateProcessW handed us these handles; we are their only owner.
    unsafe { OwnedHandle::from_raw_handle(handle.0 as RawHandle) }
}

fn std_handle(slot: Option<RawHandle>, which: STD_HANDLE) -> HANDLE {
    match slot {
        Some(handle) => win(handle),
        None => unsafe { GetStdHandle(which) }.unwrap_or_default(),
    }
}

/// Append `arg` to `cmd` quoted the way `CommandLineToArgvW` splits it.
fn append_arg(cmd: &mut Vec<u16>, arg: &OsStr) {
    const QUOTE: u16 = b'"' as u16;
    const BACKSLASH: u16 = b'\\' as u16;

    if !cmd.is_empty() {
        cmd.push(b' ' as u16);
    }
    let wide: Vec<u16> = arg.encode_wide().collect();
    let needs_quotes = wide.is_empty()
        || wide
            .iter()
            .any(|&c| c == b' ' as u16 || c == b'\t' as u16 || c == b'\n' as u16 || c == QUOTE);
    if !needs_quotes {
        cmd.extend_from_slice(&wide);
        return;
    }

    cmd.push(QUOTE);
    let mut backslashes = 0;
    for &c in &wide {
        if c == BACKSLASH {
            backslashes += 1;
            continue;
        }
        if c == QUOTE {
            cmd.extend(std::iter::repeat(BACKSLASH).take(backslashes * 2 + 1));
        } else {
            cmd.extend(std::iter::repeat(BACKSLASH).take(backslashes));
        }
        backslashes = 0;
        cmd.push(c);
    }
    cmd.extend(std::iter::repeat(BACKSLASH).take(backslashes * 2));
    cmd.push(QUOTE);
}

pub(crate) fn build_command_line(exe: &OsStr, args: &[OsString]) -> OsString {
    let mut cmd = Vec::new();
    append_arg(&mut cmd, exe);
    for arg in args {
        append_arg(&mut cmd, arg);
    }
    OsString::from_wide(&cmd)
}

/// `KEY=VALUE\0...\0\0`, as `CREATE_UNICODE_ENVIRONMENT` expects.
fn environment_block(vars: &[(OsString, OsString)]) -> Vec<u16> {
    let mut block = Vec::new();
    for (key, value) in vars {
        block.extend(key.encode_wide());
        block.push(b'=' as u16);
        block.extend(value.encode_wide());
        block.push(0);
    }
    if block.is_empty() {
        block.push(0);
    }
    block.push(0);
    block
}

pub(crate) fn create_process(
    params: &mut LaunchParams,
    _handlers: &mut [Box<dyn Handler + '_>],
) -> Result<Spawned> {
    let exe = params
        .exe
        .clone()
        .ok_or_else(|| LaunchError::SetupFailure("no executable specified".to_string()))?;

    let cmd_line = match &params.cmd_line {
        Some(cmd) => cmd.clone(),
        None => build_command_line(exe.as_os_str(), &params.args),
    };
    let mut cmd_wide = to_wide(&cmd_line);
    let app_wide = exe.is_absolute().then(|| to_wide(exe.as_os_str()));
    let dir_wide = params.work_dir.as_ref().map(|d| to_wide(d.as_os_str()));
    let env_block = params.env.as_deref().map(environment_block);

    let mut startup = STARTUPINFOW {
        cb: std::mem::size_of::<STARTUPINFOW>() as u32,
        ..Default::default()
    };
    let redirected =
        params.stdin.is_some() || params.stdout.is_some() || params.stderr.is_some();
    if redirected {
        startup.dwFlags |= STARTF_USESTDHANDLES;
        startup.hStdInput = std_handle(params.stdin, STD_INPUT_HANDLE);
        startup.hStdOutput = std_handle(params.stdout, STD_OUTPUT_HANDLE);
        startup.hStdError = std_handle(params.stderr, STD_ERROR_HANDLE);
    }
    if let Some(show) = params.show_window {
        startup.dwFlags |= STARTF_USESHOWWINDOW;
        startup.wShowWindow = show;
    }

    let mut flags = PROCESS_CREATION_FLAGS(params.creation_flags);
    if env_block.is_some() {
        flags |= CREATE_UNICODE_ENVIRONMENT;
    }
    let caller_suspended = flags.contains(CREATE_SUSPENDED);
    if params.job_object.is_some() {
        flags |= CREATE_SUSPENDED;
    }

    let mut info = PROCESS_INFORMATION::default();
    unsafe {
        CreateProcessW(
            app_wide
                .as_ref()
                .map_or(PCWSTR::null(), |w| PCWSTR(w.as_ptr())),
            PWSTR(cmd_wide.as_mut_ptr()),
            None,
            None,
            BOOL::from(params.inherit_handles || redirected),
            flags,
            env_block.as_ref().map(|b| b.as_ptr() as *const std::ffi::c_void),
            dir_wide
                .as_ref()
                .map_or(PCWSTR::null(), |w| PCWSTR(w.as_ptr())),
            &startup,
            &mut info,
        )
    }
    .map_err(|e| LaunchError::PlatformCreationFailure {
        code: win32_code(&e),
    })?;

    let process = owned(info.hProcess);
    let thread = owned(info.hThread);
    let job = params.job_object.take();

    if let Some(job) = &job {
        let assigned = unsafe { AssignProcessToJobObject(win(job.as_raw_handle()), info.hProcess) };
        if let Err(e) = assigned {
            unsafe {
                let _ = TerminateProcess(info.hProcess, 1);
            }
            return Err(LaunchError::PlatformCreationFailure {
                code: win32_code(&e),
            });
        }
        if !caller_suspended {
            unsafe { ResumeThread(info.hThread) };
        }
    }

    Ok(Spawned {
        process,
        thread,
        pid: info.dwProcessId,
        job,
    })
}
