//! fork/exec process creation
//!
//! Everything the child needs is converted to C strings before `fork`, so
//! the child only performs async-signal-safe calls (`dup2`, `fcntl`,
//! `chdir`, the exec-time hooks, `execve`). Exec failures travel back to
//! the parent as a 4-byte errno over a close-on-exec pipe: EOF on that pipe
//! means the exec succeeded.

use crate::child::Spawned;
use crate::error::{LaunchError, Result};
use crate::handler::Handler;
use crate::pipe::Pipe;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag};
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{chdir, dup2, execv, execve, fork, read, write, ForkResult, Pid};
use std::convert::Infallible;
use std::ffi::{CString, OsStr, OsString};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

/// Parameters of one launch, shared by every handler during setup.
///
/// Standard stream slots hold descriptors borrowed from the handler that
/// installed them; `None` means the child inherits the parent's stream.
#[derive(Debug, Default)]
pub struct LaunchParams {
    /// Program to execute. Used as is: no `PATH` lookup happens here.
    pub exe: Option<PathBuf>,
    /// Arguments after `argv[0]`.
    pub args: Vec<OsString>,
    /// `argv[0]`; defaults to `exe`.
    pub arg0: Option<OsString>,
    pub work_dir: Option<PathBuf>,
    /// Complete environment of the child; `None` inherits the parent's.
    pub env: Option<Vec<(OsString, OsString)>>,
    pub stdin: Option<RawFd>,
    pub stdout: Option<RawFd>,
    pub stderr: Option<RawFd>,
}

/// Launch data converted for `execve` ahead of the fork.
struct ExecImage {
    exe: CString,
    argv: Vec<CString>,
    envp: Option<Vec<CString>>,
    work_dir: Option<CString>,
}

fn c_string(value: &OsStr) -> Result<CString> {
    CString::new(value.as_bytes()).map_err(|_| {
        LaunchError::InvalidArgument(format!(
            "'{}' contains an interior NUL byte",
            value.to_string_lossy()
        ))
    })
}

impl ExecImage {
    fn prepare(params: &LaunchParams) -> Result<Self> {
        let exe = params
            .exe
            .as_ref()
            .ok_or_else(|| LaunchError::SetupFailure("no executable specified".to_string()))?;

        let arg0 = params.arg0.as_deref().unwrap_or(exe.as_os_str());
        let mut argv = Vec::with_capacity(params.args.len() + 1);
        argv.push(c_string(arg0)?);
        for arg in &params.args {
            argv.push(c_string(arg)?);
        }

        let envp = match &params.env {
            Some(vars) => {
                let mut envp = Vec::with_capacity(vars.len());
                for (key, value) in vars {
                    let mut entry = key.clone();
                    entry.push("=");
                    entry.push(value);
                    envp.push(c_string(&entry)?);
                }
                Some(envp)
            }
            None => None,
        };

        Ok(Self {
            exe: c_string(exe.as_os_str())?,
            argv,
            envp,
            work_dir: params
                .work_dir
                .as_ref()
                .map(|d| c_string(d.as_os_str()))
                .transpose()?,
        })
    }
}

pub(crate) fn create_process(
    params: &mut LaunchParams,
    handlers: &mut [Box<dyn Handler + '_>],
) -> Result<Spawned> {
    let image = ExecImage::prepare(params)?;

    let mut status_pipe = Pipe::create()?;
    let (status_read, status_write) = match (status_pipe.take_source(), status_pipe.take_sink()) {
        (Some(r), Some(w)) => (r, w),
        _ => unreachable!("a freshly created pipe owns both endpoints"),
    };

    log::trace!("Forking for {:?}", image.exe);
    // SAFETY: the child branch below only makes async-signal-safe calls
    // before exec'ing or calling _exit.
    match unsafe { fork() } {
        Ok(ForkResult::Child) => {
            drop(status_read);
            let errno = match exec_child(&image, params, handlers) {
                Err(e) => e,
                Ok(never) => match never {},
            };
            let _ = write(status_write.as_raw_fd(), &(errno as i32).to_ne_bytes());
            // SAFETY: terminating the forked child without running atexit
            // handlers or destructors of the parent's state.
            unsafe { libc::_exit(127) }
        }
        Ok(ForkResult::Parent { child }) => {
            drop(status_write);
            match read_exec_status(&status_read) {
                Ok(None) => Ok(Spawned { pid: child }),
                Ok(Some(code)) => {
                    reap(child);
                    Err(LaunchError::PlatformCreationFailure { code })
                }
                Err(e) => {
                    // The exec outcome is unknown; the child may be running.
                    log::warn!("Lost exec status of child {}: {}, killing it", child, e);
                    let _ = kill(child, Signal::SIGKILL);
                    reap(child);
                    Err(LaunchError::SystemError(e))
                }
            }
        }
        Err(e) => Err(LaunchError::PlatformCreationFailure { code: e as i32 }),
    }
}

/// Runs in the forked child. Only returns on failure.
fn exec_child(
    image: &ExecImage,
    params: &LaunchParams,
    handlers: &mut [Box<dyn Handler + '_>],
) -> nix::Result<Infallible> {
    install_stdio([
        (params.stdin, libc::STDIN_FILENO),
        (params.stdout, libc::STDOUT_FILENO),
        (params.stderr, libc::STDERR_FILENO),
    ])?;

    if let Some(dir) = &image.work_dir {
        chdir(dir.as_c_str())?;
    }

    for handler in handlers.iter_mut() {
        handler.on_exec_setup(params)?;
    }

    match &image.envp {
        Some(envp) => execve(&image.exe, &image.argv, envp),
        None => execv(&image.exe, &image.argv),
    }
}

/// Install every `(source, target)` slot as the child's standard streams.
///
/// A source that is itself one of fds 0-2 would be overwritten by an
/// earlier `dup2`, so those are first moved above the standard range.
fn install_stdio(mut slots: [(Option<RawFd>, RawFd); 3]) -> nix::Result<()> {
    for (source, target) in slots.iter_mut() {
        if let Some(fd) = source {
            if *fd <= libc::STDERR_FILENO && *fd != *target {
                *fd = fcntl(*fd, FcntlArg::F_DUPFD_CLOEXEC(libc::STDERR_FILENO + 1))?;
            }
        }
    }
    for (source, target) in slots {
        install_slot(source, target)?;
    }
    Ok(())
}

/// Make `fd` the child's `target` stream, without close-on-exec.
fn install_slot(fd: Option<RawFd>, target: RawFd) -> nix::Result<()> {
    match fd {
        None => Ok(()),
        Some(fd) if fd == target => {
            fcntl(fd, FcntlArg::F_SETFD(FdFlag::empty()))?;
            Ok(())
        }
        Some(fd) => {
            dup2(fd, target)?;
            Ok(())
        }
    }
}

/// Errno written by a child whose exec failed, or `None` on EOF.
fn read_exec_status(fd: &OwnedFd) -> nix::Result<Option<i32>> {
    let mut buf = [0u8; 4];
    let mut got = 0;
    while got < buf.len() {
        match read(fd.as_raw_fd(), &mut buf[got..]) {
            Ok(0) => break,
            Ok(n) => got += n,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        }
    }
    match got {
        0 => Ok(None),
        4 => Ok(Some(i32::from_ne_bytes(buf))),
        _ => Ok(Some(Errno::EIO as i32)),
    }
}

/// Collect a child that failed to exec so it does not linger as a zombie.
fn reap(pid: Pid) {
    loop {
        match waitpid(pid, None) {
            Err(Errno::EINTR) => continue,
            Err(e) => {
                log::warn!("Failed to reap child {} after exec failure: {}", pid, e);
                return;
            }
            Ok(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepare_requires_an_executable() {
        let params = LaunchParams::default();
        assert!(matches!(
            ExecImage::prepare(&params),
            Err(LaunchError::SetupFailure(_))
        ));
    }

    #[test]
    fn prepare_builds_argv_and_environment() {
        let params = LaunchParams {
            exe: Some(PathBuf::from("/bin/echo")),
            args: vec!["hello".into(), "world".into()],
            env: Some(vec![("GREETING".into(), "hi there".into())]),
            work_dir: Some(PathBuf::from("/tmp")),
            ..Default::default()
        };
        let image = ExecImage::prepare(&params).unwrap();
        assert_eq!(image.exe.as_bytes(), b"/bin/echo");
        let argv: Vec<&[u8]> = image.argv.iter().map(|a| a.as_bytes()).collect();
        assert_eq!(argv, vec![&b"/bin/echo"[..], b"hello", b"world"]);
        assert_eq!(
            image.envp.unwrap()[0].as_bytes(),
            b"GREETING=hi there"
        );
        assert_eq!(image.work_dir.unwrap().as_bytes(), b"/tmp");
    }

    #[test]
    fn interior_nul_is_rejected() {
        let params = LaunchParams {
            exe: Some(PathBuf::from("/bin/echo")),
            args: vec![OsString::from("bad\0arg")],
            ..Default::default()
        };
        assert!(matches!(
            ExecImage::prepare(&params),
            Err(LaunchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn arg0_overrides_program_name() {
        let params = LaunchParams {
            exe: Some(PathBuf::from("/bin/sh")),
            arg0: Some("login-shell".into()),
            ..Default::default()
        };
        let image = ExecImage::prepare(&params).unwrap();
        assert_eq!(image.argv[0].as_bytes(), b"login-shell");
    }

    #[test]
    fn exec_status_distinguishes_eof_errno_and_read_errors() {
        let mut pipe = Pipe::create().unwrap();
        let source = pipe.take_source().unwrap();
        drop(pipe);
        assert_eq!(read_exec_status(&source).unwrap(), None);

        let mut pipe = Pipe::create().unwrap();
        let (source, sink) = (pipe.take_source().unwrap(), pipe.take_sink().unwrap());
        write(sink.as_raw_fd(), &libc::ENOENT.to_ne_bytes()).unwrap();
        drop(sink);
        assert_eq!(read_exec_status(&source).unwrap(), Some(libc::ENOENT));

        // Reading the write end fails outright.
        let mut pipe = Pipe::create().unwrap();
        let sink = pipe.take_sink().unwrap();
        assert!(read_exec_status(&sink).is_err());
    }
}
