//! Pipe platform abstraction layer
//!
//! A [`Pipe`] owns up to two endpoints and, for named pipes, the filesystem
//! object backing them. On Unix systems the endpoints are file descriptors
//! created with `pipe(2)`/`mkfifo(3)`; on Windows they are kernel handles
//! created with `CreatePipe`/`CreateNamedPipeW`.

use crate::error::{into_slot, LaunchError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as sys;
#[cfg(unix)]
pub use unix::{Endpoint, RawEndpoint};

#[cfg(windows)]
mod windows;
#[cfg(windows)]
use self::windows as sys;
#[cfg(windows)]
pub(crate) use self::windows::{named_overlapped, to_wide};
#[cfg(windows)]
pub use self::windows::{Endpoint, RawEndpoint};

/// Counter shared by every auto-generated pipe name in this process.
static PIPE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Exclusively owned pair of pipe endpoints.
///
/// Either endpoint may be absent: a default-constructed pipe, or one whose
/// endpoints were closed or taken, is neutral and its destruction performs
/// no OS action. Moving a pipe out with [`std::mem::take`] leaves such a
/// neutral pipe behind.
#[derive(Debug, Default)]
pub struct Pipe {
    source: Option<Endpoint>,
    sink: Option<Endpoint>,
    path: Option<PathBuf>,
}

impl Pipe {
    pub(crate) fn from_parts(source: Endpoint, sink: Endpoint, path: Option<PathBuf>) -> Self {
        Self {
            source: Some(source),
            sink: Some(sink),
            path,
        }
    }

    /// Create an anonymous pipe.
    pub fn create() -> Result<Self> {
        let (source, sink) = sys::anonymous()?;
        log::trace!("Created anonymous pipe");
        Ok(Self::from_parts(source, sink, None))
    }

    /// Create an anonymous pipe, reporting failure through `err`.
    ///
    /// Returns a neutral pipe when creation fails.
    pub fn create_with(err: &mut Option<LaunchError>) -> Self {
        into_slot(Self::create(), err).unwrap_or_default()
    }

    /// Create a named pipe at `name`, or at [`Pipe::make_pipe_name`] when
    /// no name is given.
    ///
    /// The pipe is opened once and the second endpoint is duplicated from
    /// that open, so both ends refer to the same object. Creation stops at
    /// the first failing step and removes anything it already created.
    pub fn create_named(name: Option<&Path>) -> Result<Self> {
        let path = match name {
            Some(p) => p.to_path_buf(),
            None => Self::make_pipe_name(),
        };
        let (source, sink) = sys::named(&path)?;
        log::debug!("Created named pipe at {}", path.display());
        Ok(Self::from_parts(source, sink, Some(path)))
    }

    /// Create a named pipe, reporting failure through `err`.
    pub fn create_named_with(name: Option<&Path>, err: &mut Option<LaunchError>) -> Self {
        into_slot(Self::create_named(name), err).unwrap_or_default()
    }

    /// Generate a pipe path that does not exist yet.
    ///
    /// Names are a fixed prefix plus a process-wide counter. This only
    /// guarantees that two calls in the same process never return the same
    /// path; another process may still create the path between this check
    /// and the actual pipe creation.
    pub fn make_pipe_name() -> PathBuf {
        let prefix = sys::pipe_name_prefix();
        loop {
            let n = PIPE_COUNTER.fetch_add(1, Ordering::Relaxed);
            let candidate = PathBuf::from(format!("{}{}", prefix, n));
            if !candidate.exists() {
                return candidate;
            }
        }
    }

    /// Read endpoint, if still owned.
    pub fn source(&self) -> Option<RawEndpoint> {
        self.source.as_ref().map(sys::raw)
    }

    /// Write endpoint, if still owned.
    pub fn sink(&self) -> Option<RawEndpoint> {
        self.sink.as_ref().map(sys::raw)
    }

    /// Filesystem path of a named pipe.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_named(&self) -> bool {
        self.path.is_some()
    }

    /// True when neither endpoint is owned.
    pub fn is_neutral(&self) -> bool {
        self.source.is_none() && self.sink.is_none()
    }

    pub fn close_source(&mut self) {
        self.source = None;
    }

    pub fn close_sink(&mut self) {
        self.sink = None;
    }

    /// Take ownership of the read endpoint.
    pub fn take_source(&mut self) -> Option<Endpoint> {
        self.source.take()
    }

    /// Take ownership of the write endpoint.
    pub fn take_sink(&mut self) -> Option<Endpoint> {
        self.sink.take()
    }

    /// Read endpoint as a blocking [`File`].
    pub fn reader(&mut self) -> Option<File> {
        self.source.take().map(File::from)
    }

    /// Write endpoint as a blocking [`File`].
    pub fn writer(&mut self) -> Option<File> {
        self.sink.take().map(File::from)
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        drop(self.sink.take());
        drop(self.source.take());
        if let Some(path) = self.path.take() {
            if let Err(e) = sys::remove_named(&path) {
                log::warn!("Failed to remove named pipe {}: {}", path.display(), e);
            }
        }
    }
}
