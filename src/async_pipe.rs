//! Pipes for event-driven I/O
//!
//! An [`AsyncPipe`] is created exactly like a blocking [`Pipe`]; what makes
//! it asynchronous is registering an endpoint with tokio's reactor, which
//! happens in [`AsyncPipe::into_source`], [`AsyncPipe::into_sink`] or
//! [`AsyncPipe::into_split`]. Until then the endpoints are plain owned
//! descriptors, so the child-side end can be handed to a stdio handler and
//! the child never inherits a non-blocking stream.
//!
//! On Windows, anonymous pipes cannot do overlapped I/O, so the async pipe
//! is always an overlapped named pipe.

use crate::error::{into_slot, LaunchError, Result};
use crate::pipe::{Pipe, RawEndpoint};
use std::path::Path;

#[cfg(unix)]
pub type AsyncSource = tokio::net::unix::pipe::Receiver;
#[cfg(unix)]
pub type AsyncSink = tokio::net::unix::pipe::Sender;

#[cfg(windows)]
pub type AsyncSource = tokio::net::windows::named_pipe::NamedPipeServer;
#[cfg(windows)]
pub type AsyncSink = tokio::net::windows::named_pipe::NamedPipeClient;

/// A pipe whose endpoints are meant to be driven by the tokio reactor.
#[derive(Debug, Default)]
pub struct AsyncPipe {
    pipe: Pipe,
}

impl AsyncPipe {
    /// Create a pipe suitable for async registration.
    pub fn create() -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                pipe: Pipe::create()?,
            })
        }
        #[cfg(windows)]
        {
            Self::create_named(None)
        }
    }

    pub fn create_with(err: &mut Option<LaunchError>) -> Self {
        into_slot(Self::create(), err).unwrap_or_default()
    }

    /// Create a named pipe suitable for async registration.
    pub fn create_named(name: Option<&Path>) -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                pipe: Pipe::create_named(name)?,
            })
        }
        #[cfg(windows)]
        {
            let path = match name {
                Some(p) => p.to_path_buf(),
                None => Pipe::make_pipe_name(),
            };
            let (source, sink) = crate::pipe::named_overlapped(&path)?;
            Ok(Self {
                pipe: Pipe::from_parts(source, sink, Some(path)),
            })
        }
    }

    pub fn create_named_with(name: Option<&Path>, err: &mut Option<LaunchError>) -> Self {
        into_slot(Self::create_named(name), err).unwrap_or_default()
    }

    /// Wrap an existing blocking pipe.
    #[cfg(unix)]
    pub fn from_pipe(pipe: Pipe) -> Self {
        Self { pipe }
    }

    pub fn source(&self) -> Option<RawEndpoint> {
        self.pipe.source()
    }

    pub fn sink(&self) -> Option<RawEndpoint> {
        self.pipe.sink()
    }

    pub fn as_pipe(&self) -> &Pipe {
        &self.pipe
    }

    /// Mutable access to the underlying pipe, e.g. to give one end to a
    /// stdio handler before registering the other.
    pub fn as_pipe_mut(&mut self) -> &mut Pipe {
        &mut self.pipe
    }

    /// Register the read endpoint with the reactor, closing the write
    /// endpoint if it is still owned.
    pub fn into_source(mut self) -> Result<AsyncSource> {
        self.pipe.close_sink();
        self.register_source()
    }

    /// Register the write endpoint with the reactor, closing the read
    /// endpoint if it is still owned.
    pub fn into_sink(mut self) -> Result<AsyncSink> {
        self.pipe.close_source();
        self.register_sink()
    }

    /// Register both endpoints.
    pub fn into_split(mut self) -> Result<(AsyncSource, AsyncSink)> {
        let source = self.register_source()?;
        let sink = self.register_sink()?;
        Ok((source, sink))
    }

    fn register_source(&mut self) -> Result<AsyncSource> {
        ensure_runtime()?;
        let fd = self
            .pipe
            .take_source()
            .ok_or_else(|| LaunchError::InvalidArgument("read endpoint already closed".into()))?;
        sys::register_source(fd)
    }

    fn register_sink(&mut self) -> Result<AsyncSink> {
        ensure_runtime()?;
        let fd = self
            .pipe
            .take_sink()
            .ok_or_else(|| LaunchError::InvalidArgument("write endpoint already closed".into()))?;
        sys::register_sink(fd)
    }
}

fn ensure_runtime() -> Result<()> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|e| LaunchError::InvalidArgument(format!("no async reactor available: {}", e)))
}

#[cfg(unix)]
mod sys {
    use super::{AsyncSink, AsyncSource};
    use crate::error::Result;
    use std::os::fd::OwnedFd;

    pub(super) fn register_source(fd: OwnedFd) -> Result<AsyncSource> {
        Ok(AsyncSource::from_owned_fd(fd)?)
    }

    pub(super) fn register_sink(fd: OwnedFd) -> Result<AsyncSink> {
        Ok(AsyncSink::from_owned_fd(fd)?)
    }
}

#[cfg(windows)]
mod sys {
    use super::{AsyncSink, AsyncSource};
    use crate::error::Result;
    use std::os::windows::io::{IntoRawHandle, OwnedHandle};

    pub(super) fn register_source(handle: OwnedHandle) -> Result<AsyncSource> {
        // SAFETY: the handle is an owned, overlapped named pipe server end.
        Ok(unsafe { AsyncSource::from_raw_handle(handle.into_raw_handle()) }?)
    }

    pub(super) fn register_sink(handle: OwnedHandle) -> Result<AsyncSink> {
        // SAFETY: the handle is an owned, overlapped named pipe client end.
        Ok(unsafe { AsyncSink::from_raw_handle(handle.into_raw_handle()) }?)
    }
}
