//! Standard stream redirection
//!
//! A redirect installs one raw endpoint into a stdio slot of the launch
//! parameters during setup. The endpoint stays owned by the redirect (or by
//! the borrowed [`Pipe`]) until the launch finished; then the child-side
//! end is closed in the parent, on success and on failure alike, so the
//! other end sees EOF once the child is done with it.

use crate::error::{LaunchError, Result};
use crate::executor::LaunchParams;
use crate::handler::Handler;
use crate::pipe::{Pipe, RawEndpoint};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

#[cfg(unix)]
const NULL_DEVICE: &str = "/dev/null";
#[cfg(windows)]
const NULL_DEVICE: &str = "NUL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    In,
    Out,
    Err,
}

#[derive(Debug)]
enum Target<'a> {
    Pipe(&'a mut Pipe),
    File(PathBuf),
    Null,
    /// stderr only: whatever stdout is at this point.
    Stdout,
}

#[derive(Debug)]
struct Redirect<'a> {
    stream: Stream,
    target: Target<'a>,
    opened: Option<File>,
}

impl<'a> Redirect<'a> {
    fn new(stream: Stream, target: Target<'a>) -> Self {
        Self {
            stream,
            target,
            opened: None,
        }
    }

    fn open(&self, path: &Path) -> Result<File> {
        let file = match self.stream {
            Stream::In => File::open(path),
            Stream::Out | Stream::Err => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(path),
        };
        file.map_err(|e| {
            LaunchError::SetupFailure(format!("cannot open {}: {}", path.display(), e))
        })
    }

    fn child_end(&mut self, params: &LaunchParams) -> Result<RawEndpoint> {
        match &self.target {
            Target::Pipe(pipe) => {
                let end = match self.stream {
                    Stream::In => pipe.source(),
                    Stream::Out | Stream::Err => pipe.sink(),
                };
                end.ok_or_else(|| {
                    LaunchError::SetupFailure(format!(
                        "{:?} redirect: pipe end already closed",
                        self.stream
                    ))
                })
            }
            Target::File(path) => {
                let path = path.clone();
                let file = self.open(&path)?;
                Ok(self.opened.insert(file).raw())
            }
            Target::Null => {
                let file = self.open(Path::new(NULL_DEVICE))?;
                Ok(self.opened.insert(file).raw())
            }
            Target::Stdout => Ok(params.stdout.unwrap_or_else(sys::parent_stdout)),
        }
    }

    fn setup(&mut self, params: &mut LaunchParams) -> Result<()> {
        let end = self.child_end(params)?;
        sys::make_inheritable(end, params)?;
        log::trace!("Redirecting {:?} to {:?}", self.stream, self.target);
        match self.stream {
            Stream::In => params.stdin = Some(end),
            Stream::Out => params.stdout = Some(end),
            Stream::Err => params.stderr = Some(end),
        }
        Ok(())
    }

    /// Drop the parent's copy of the child-side end.
    fn release(&mut self) {
        self.opened = None;
        if let Target::Pipe(pipe) = &mut self.target {
            match self.stream {
                Stream::In => pipe.close_source(),
                Stream::Out | Stream::Err => pipe.close_sink(),
            }
        }
    }
}

trait RawFile {
    fn raw(&self) -> RawEndpoint;
}

#[cfg(unix)]
impl RawFile for File {
    fn raw(&self) -> RawEndpoint {
        std::os::fd::AsRawFd::as_raw_fd(self)
    }
}

#[cfg(windows)]
impl RawFile for File {
    fn raw(&self) -> RawEndpoint {
        std::os::windows::io::AsRawHandle::as_raw_handle(self)
    }
}

impl Handler for Redirect<'_> {
    fn on_setup(&mut self, params: &mut LaunchParams) -> Result<()> {
        self.setup(params)
    }

    fn on_error(&mut self, _params: &mut LaunchParams, _error: &LaunchError) {
        self.release();
    }

    fn on_success(&mut self, _params: &mut LaunchParams) {
        self.release();
    }
}

/// Standard input of the child.
#[derive(Debug)]
pub struct StdIn<'a>(Redirect<'a>);

impl<'a> StdIn<'a> {
    /// Read from the pipe's read end; the caller writes into its sink.
    pub fn pipe(pipe: &'a mut Pipe) -> Self {
        Self(Redirect::new(Stream::In, Target::Pipe(pipe)))
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self(Redirect::new(Stream::In, Target::File(path.as_ref().into())))
    }

    pub fn null() -> Self {
        Self(Redirect::new(Stream::In, Target::Null))
    }
}

/// Standard output of the child.
#[derive(Debug)]
pub struct StdOut<'a>(Redirect<'a>);

impl<'a> StdOut<'a> {
    /// Write into the pipe's sink; the caller reads from its source.
    pub fn pipe(pipe: &'a mut Pipe) -> Self {
        Self(Redirect::new(Stream::Out, Target::Pipe(pipe)))
    }

    /// Write to `path`, created or truncated.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self(Redirect::new(Stream::Out, Target::File(path.as_ref().into())))
    }

    pub fn null() -> Self {
        Self(Redirect::new(Stream::Out, Target::Null))
    }
}

/// Standard error of the child.
#[derive(Debug)]
pub struct StdErr<'a>(Redirect<'a>);

impl<'a> StdErr<'a> {
    pub fn pipe(pipe: &'a mut Pipe) -> Self {
        Self(Redirect::new(Stream::Err, Target::Pipe(pipe)))
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self(Redirect::new(Stream::Err, Target::File(path.as_ref().into())))
    }

    pub fn null() -> Self {
        Self(Redirect::new(Stream::Err, Target::Null))
    }

    /// Send stderr wherever stdout goes.
    ///
    /// Uses the stdout slot as installed by the handlers registered
    /// before this one, or the parent's stdout when none was.
    pub fn to_stdout() -> Self {
        Self(Redirect::new(Stream::Err, Target::Stdout))
    }
}

macro_rules! forward_handler {
    ($($ty:ident),*) => {$(
        impl Handler for $ty<'_> {
            fn on_setup(&mut self, params: &mut LaunchParams) -> Result<()> {
                self.0.on_setup(params)
            }

            fn on_error(&mut self, params: &mut LaunchParams, error: &LaunchError) {
                self.0.on_error(params, error)
            }

            fn on_success(&mut self, params: &mut LaunchParams) {
                self.0.on_success(params)
            }
        }
    )*};
}

forward_handler!(StdIn, StdOut, StdErr);

#[cfg(unix)]
mod sys {
    use super::RawEndpoint;
    use crate::error::Result;
    use crate::executor::LaunchParams;

    pub(super) fn parent_stdout() -> RawEndpoint {
        libc::STDOUT_FILENO
    }

    /// Close-on-exec is cleared by the `dup2` done in the child.
    pub(super) fn make_inheritable(_end: RawEndpoint, _params: &mut LaunchParams) -> Result<()> {
        Ok(())
    }
}

#[cfg(windows)]
mod sys {
    use super::RawEndpoint;
    use crate::error::{win32_code, LaunchError, Result};
    use crate::executor::LaunchParams;
    use windows::Win32::Foundation::{SetHandleInformation, HANDLE, HANDLE_FLAG_INHERIT};
    use windows::Win32::System::Console::{GetStdHandle, STD_OUTPUT_HANDLE};

    pub(super) fn parent_stdout() -> RawEndpoint {
        unsafe { GetStdHandle(STD_OUTPUT_HANDLE) }
            .unwrap_or_default()
            .0 as RawEndpoint
    }

    pub(super) fn make_inheritable(end: RawEndpoint, params: &mut LaunchParams) -> Result<()> {
        let handle = HANDLE(end as isize);
        unsafe { SetHandleInformation(handle, HANDLE_FLAG_INHERIT.0, HANDLE_FLAG_INHERIT) }
            .map_err(|e| LaunchError::resource("SetHandleInformation", win32_code(&e), None))?;
        params.inherit_handles = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_pipe_end_fails_setup() {
        let mut pipe = Pipe::create().unwrap();
        pipe.close_sink();
        let mut params = LaunchParams::default();
        let err = StdOut::pipe(&mut pipe).on_setup(&mut params).unwrap_err();
        assert!(matches!(err, LaunchError::SetupFailure(_)));
        assert!(params.stdout.is_none());
    }

    #[test]
    fn merge_follows_installed_stdout() {
        let mut pipe = Pipe::create().unwrap();
        let sink = pipe.sink();
        let mut params = LaunchParams::default();
        StdOut::pipe(&mut pipe).on_setup(&mut params).unwrap();
        StdErr::to_stdout().on_setup(&mut params).unwrap();
        assert_eq!(params.stdout, sink);
        assert_eq!(params.stderr, sink);
    }

    #[test]
    fn release_closes_only_child_side_end() {
        let mut pipe = Pipe::create().unwrap();
        let mut params = LaunchParams::default();
        {
            let mut redirect = StdOut::pipe(&mut pipe);
            redirect.on_setup(&mut params).unwrap();
            redirect.on_success(&mut params);
        }
        assert!(pipe.sink().is_none());
        assert!(pipe.source().is_some());
    }

    #[test]
    fn missing_input_file_fails_setup() {
        let dir = tempfile::tempdir().unwrap();
        let mut params = LaunchParams::default();
        let err = StdIn::file(dir.path().join("absent"))
            .on_setup(&mut params)
            .unwrap_err();
        assert!(matches!(err, LaunchError::SetupFailure(_)));
    }

    #[cfg(unix)]
    mod launch {
        use super::*;
        use crate::handlers::Cmd;
        use crate::Executor;
        use std::io::{Read, Write};

        fn sh(script: &str) -> Cmd {
            Cmd::new("/bin/sh").args(["-c", script])
        }

        fn read_all(pipe: &mut Pipe) -> String {
            let mut out = String::new();
            pipe.reader().unwrap().read_to_string(&mut out).unwrap();
            out
        }

        #[test]
        fn stdout_pipe_captures_output() {
            let mut out = Pipe::create().unwrap();
            let mut child = Executor::new()
                .with(sh("echo captured"))
                .with(StdOut::pipe(&mut out))
                .launch()
                .unwrap();
            assert!(out.sink().is_none());
            assert_eq!(read_all(&mut out), "captured\n");
            assert_eq!(child.wait().unwrap(), 0);
        }

        #[test]
        fn stdin_pipe_feeds_child() {
            let mut input = Pipe::create().unwrap();
            let mut out = Pipe::create().unwrap();
            let mut child = Executor::new()
                .with(Cmd::new("/bin/cat"))
                .with(StdIn::pipe(&mut input))
                .with(StdOut::pipe(&mut out))
                .launch()
                .unwrap();

            let mut writer = input.writer().unwrap();
            writer.write_all(b"line one\nline two\n").unwrap();
            drop(writer);

            assert_eq!(read_all(&mut out), "line one\nline two\n");
            assert_eq!(child.wait().unwrap(), 0);
        }

        #[test]
        fn stderr_merges_into_stdout() {
            let mut out = Pipe::create().unwrap();
            let mut child = Executor::new()
                .with(sh("echo out; echo err 1>&2"))
                .with(StdOut::pipe(&mut out))
                .with(StdErr::to_stdout())
                .launch()
                .unwrap();
            assert_eq!(read_all(&mut out), "out\nerr\n");
            assert_eq!(child.wait().unwrap(), 0);
        }

        #[test]
        fn merge_before_stdout_redirect_keeps_parent_stdout() {
            let mut out = Pipe::create().unwrap();
            let mut child = Executor::new()
                .with(sh("echo out; echo err 1>&2"))
                .with(StdErr::to_stdout())
                .with(StdOut::pipe(&mut out))
                .launch()
                .unwrap();
            assert_eq!(read_all(&mut out), "out\n");
            assert_eq!(child.wait().unwrap(), 0);
        }

        #[test]
        fn merge_into_file_survives_later_stdout_redirect() {
            let dir = tempfile::tempdir().unwrap();
            let log = dir.path().join("merged.log");
            let mut out = Pipe::create().unwrap();
            let mut child = Executor::new()
                .with(sh("echo out; echo err 1>&2"))
                .with(StdOut::file(&log))
                .with(StdErr::to_stdout())
                .with(StdOut::pipe(&mut out))
                .launch()
                .unwrap();
            assert_eq!(read_all(&mut out), "out\n");
            assert_eq!(child.wait().unwrap(), 0);
            assert_eq!(std::fs::read_to_string(&log).unwrap(), "err\n");
        }

        #[test]
        fn null_and_file_targets() {
            let dir = tempfile::tempdir().unwrap();
            let log = dir.path().join("child.log");
            let mut child = Executor::new()
                .with(sh("cat; echo written; echo hidden 1>&2"))
                .with(StdIn::null())
                .with(StdOut::file(&log))
                .with(StdErr::null())
                .launch()
                .unwrap();
            assert_eq!(child.wait().unwrap(), 0);
            assert_eq!(std::fs::read_to_string(&log).unwrap(), "written\n");
        }

        #[test]
        fn failed_launch_still_closes_child_end() {
            let mut out = Pipe::create().unwrap();
            let result = Executor::new()
                .with(Cmd::new("/nonexistent/proclaunch-test-binary"))
                .with(StdOut::pipe(&mut out))
                .launch();
            assert!(result.is_err());
            assert!(out.sink().is_none());
            assert_eq!(read_all(&mut out), "");
        }
    }
}
