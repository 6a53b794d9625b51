//! Unix pipe implementation
//!
//! Anonymous pipes come from `pipe2(2)` (plain `pipe(2)` where it is
//! missing), named pipes from `mkfifo(3)`. Every descriptor created here is
//! close-on-exec; a handler that wants a child to see an endpoint installs
//! it into one of the child's stdio slots, and the `dup2` done at exec time
//! clears the flag on the copy.

use crate::error::{LaunchError, Result};
use nix::fcntl::{fcntl, open, FcntlArg, OFlag};
#[cfg(not(any(target_os = "linux", target_os = "android")))]
use nix::fcntl::FdFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
#[cfg(any(target_os = "linux", target_os = "android"))]
use nix::unistd::pipe2;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
use nix::unistd::pipe;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

/// Owned endpoint type on this platform.
pub type Endpoint = OwnedFd;
/// Raw endpoint identifier on this platform.
pub type RawEndpoint = RawFd;

pub(super) fn raw(fd: &OwnedFd) -> RawFd {
    fd.as_raw_fd()
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub(super) fn anonymous() -> Result<(OwnedFd, OwnedFd)> {
    let (source, sink) = pipe2(OFlag::O_CLOEXEC)
        .map_err(|e| LaunchError::resource("pipe2", e as i32, None))?;
    // SAFETY: pipe2(2) just returned two fresh descriptors we own.
    Ok(unsafe { (OwnedFd::from_raw_fd(source), OwnedFd::from_raw_fd(sink)) })
}

// No pipe2: a fork on another thread between pipe() and fcntl() can leak
// these descriptors into that child.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub(super) fn anonymous() -> Result<(OwnedFd, OwnedFd)> {
    let (source, sink) =
        pipe().map_err(|e| LaunchError::resource("pipe(2)", e as i32, None))?;
    // SAFETY: pipe(2) just returned two fresh descriptors we own.
    let (source, sink) = unsafe { (OwnedFd::from_raw_fd(source), OwnedFd::from_raw_fd(sink)) };

    set_cloexec(&source)?;
    set_cloexec(&sink)?;
    Ok((source, sink))
}

pub(super) fn named(path: &Path) -> Result<(OwnedFd, OwnedFd)> {
    mkfifo(path, Mode::from_bits_truncate(0o666))
        .map_err(|e| LaunchError::resource("mkfifo", e as i32, Some(path)))?;

    let opened = open_fifo(path);
    if opened.is_err() {
        // The fifo exists but is unusable: don't leave it behind.
        discard_fifo(path);
    }
    opened
}

fn discard_fifo(path: &Path) {
    if let Err(e) = remove_named(path) {
        log::warn!("Failed to remove fifo {}: {}", path.display(), e);
    }
}

/// Open the fifo once read/write and duplicate the descriptor for the
/// write side. Opening O_RDWR never blocks waiting for a peer.
fn open_fifo(path: &Path) -> Result<(OwnedFd, OwnedFd)> {
    let fd = open(path, OFlag::O_RDWR | OFlag::O_CLOEXEC, Mode::empty())
        .map_err(|e| LaunchError::resource("open", e as i32, Some(path)))?;
    // SAFETY: open(2) returned a fresh descriptor we own.
    let source = unsafe { OwnedFd::from_raw_fd(fd) };

    let dup_fd = fcntl(source.as_raw_fd(), FcntlArg::F_DUPFD_CLOEXEC(0))
        .map_err(|e| LaunchError::resource("dup", e as i32, Some(path)))?;
    // SAFETY: F_DUPFD_CLOEXEC returned a fresh descriptor we own.
    let sink = unsafe { OwnedFd::from_raw_fd(dup_fd) };

    Ok((source, sink))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_cloexec(fd: &OwnedFd) -> Result<()> {
    fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))
        .map_err(|e| LaunchError::resource("fcntl(FD_CLOEXEC)", e as i32, None))?;
    Ok(())
}

pub(super) fn pipe_name_prefix() -> String {
    std::env::temp_dir()
        .join("proclaunch_auto_pipe_")
        .to_string_lossy()
        .into_owned()
}

pub(super) fn remove_named(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use crate::error::LaunchError;
    use crate::pipe::Pipe;
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};
    use std::io::{Read, Write};
    use std::os::unix::fs::FileTypeExt;

    #[test]
    fn anonymous_endpoints_are_cloexec() {
        let pipe = Pipe::create().unwrap();
        for fd in [pipe.source().unwrap(), pipe.sink().unwrap()] {
            let flags = FdFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFD).unwrap());
            assert!(flags.contains(FdFlag::FD_CLOEXEC));
        }
    }

    #[test]
    fn named_pipe_lifecycle() {
        let mut pipe = Pipe::create_named(None).unwrap();
        let path = pipe.path().unwrap().to_path_buf();
        assert!(pipe.is_named());
        assert!(std::fs::metadata(&path).unwrap().file_type().is_fifo());

        let mut writer = pipe.writer().unwrap();
        writer.write_all(b"through the fifo").unwrap();
        let mut reader = pipe.reader().unwrap();
        let mut buf = [0u8; 16];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"through the fifo");

        drop(pipe);
        assert!(!path.exists());
    }

    #[test]
    fn named_pipe_on_existing_path_fails_and_keeps_file() {
        let existing = tempfile::NamedTempFile::new().unwrap();

        let mut err = None;
        let pipe = Pipe::create_named_with(Some(existing.path()), &mut err);
        assert!(pipe.is_neutral());
        match err {
            Some(LaunchError::ResourceCreationFailure { op, code, path }) => {
                assert_eq!(op, "mkfifo");
                assert_eq!(code, libc::EEXIST);
                assert_eq!(path.as_deref(), Some(existing.path()));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(existing.path().exists());
    }

    #[test]
    fn named_pipe_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("fifo");
        let err = Pipe::create_named(Some(&path)).unwrap_err();
        assert_eq!(err.os_code(), Some(libc::ENOENT));
        assert!(!path.exists());
    }

    #[test]
    fn two_auto_named_pipes_have_distinct_paths() {
        let a = Pipe::create_named(None).unwrap();
        let b = Pipe::create_named(None).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn dropping_pipe_closes_sink() {
        let mut pipe = Pipe::create().unwrap();
        let mut reader = pipe.reader().unwrap();
        drop(pipe);

        let mut buf = Vec::new();
        assert_eq!(reader.read_to_end(&mut buf).unwrap(), 0);
    }

    /// Identity of whatever `fd` currently refers to, `None` once closed.
    fn fd_identity(fd: i32) -> Option<(u64, u64)> {
        match fcntl(fd, FcntlArg::F_GETFD) {
            Err(nix::errno::Errno::EBADF) => return None,
            other => {
                other.unwrap();
            }
        }
        nix::sys::stat::fstat(fd)
            .ok()
            .map(|st| (st.st_dev as u64, st.st_ino as u64))
    }

    #[test]
    fn dropped_endpoints_are_no_longer_usable() {
        let pipe = Pipe::create().unwrap();
        let fds = [pipe.source().unwrap(), pipe.sink().unwrap()];
        let before: Vec<_> = fds.iter().map(|&fd| fd_identity(fd)).collect();
        assert!(before.iter().all(Option::is_some));
        drop(pipe);

        // Another test may have reused the number by now, but never for
        // the same pipe.
        for (fd, identity) in fds.iter().zip(before) {
            let after = fd_identity(*fd);
            assert!(after.is_none() || after != identity, "fd {} still open", fd);
        }
    }

    #[test]
    fn discarded_fifo_is_removed_and_missing_one_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fifo");
        nix::unistd::mkfifo(&path, nix::sys::stat::Mode::from_bits_truncate(0o600)).unwrap();

        super::discard_fifo(&path);
        assert!(!path.exists());
        super::discard_fifo(&path);
    }
}
