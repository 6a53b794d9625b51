//! Windows pipe implementation
//!
//! Anonymous pipes come from `CreatePipe`. Named pipes are a
//! `CreateNamedPipeW` server end (read) plus a `CreateFileW` client end
//! (write) on the same `\\.\pipe\` name. Handles are created
//! non-inheritable; handlers flag the child-side handle inheritable during
//! setup.

use crate::error::{win32_code, LaunchError, Result};
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};
use std::path::Path;
use windows::core::PCWSTR;
use windows::Win32::Foundation::HANDLE;
use windows::Win32::Storage::FileSystem::{
    CreateFileW, FILE_FLAGS_AND_ATTRIBUTES, FILE_FLAG_FIRST_PIPE_INSTANCE, FILE_FLAG_OVERLAPPED,
    FILE_GENERIC_WRITE, FILE_SHARE_NONE, OPEN_EXISTING, PIPE_ACCESS_INBOUND,
};
use windows::Win32::System::Pipes::{
    CreateNamedPipeW, CreatePipe, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE, PIPE_WAIT,
};

/// Owned endpoint type on this platform.
pub type Endpoint = OwnedHandle;
/// Raw endpoint identifier on this platform.
pub type RawEndpoint = RawHandle;

const PIPE_BUFFER_SIZE: u32 = 8192;

pub(super) fn raw(handle: &OwnedHandle) -> RawHandle {
    handle.as_raw_handle()
}

pub(crate) fn to_wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(std::iter::once(0)).collect()
}

fn owned(handle: HANDLE) -> OwnedHandle {
    // SAFETY: callers pass a freshly created, valid handle they own.
    unsafe { OwnedHandle::from_raw_handle(handle.0 as RawHandle) }
}

pub(super) fn anonymous() -> Result<(OwnedHandle, OwnedHandle)> {
    let mut read = HANDLE::default();
    let mut write = HANDLE::default();
    unsafe { CreatePipe(&mut read, &mut write, None, 0) }
        .map_err(|e| LaunchError::resource("CreatePipe", win32_code(&e), None))?;
    Ok((owned(read), owned(write)))
}

pub(super) fn named(path: &Path) -> Result<(OwnedHandle, OwnedHandle)> {
    named_with_flags(path, FILE_FLAGS_AND_ATTRIBUTES(0))
}

/// Named pipe whose endpoints are opened for overlapped I/O, as required
/// by the async pipe.
pub(crate) fn named_overlapped(path: &Path) -> Result<(OwnedHandle, OwnedHandle)> {
    named_with_flags(path, FILE_FLAG_OVERLAPPED)
}

fn named_with_flags(
    path: &Path,
    flags: FILE_FLAGS_AND_ATTRIBUTES,
) -> Result<(OwnedHandle, OwnedHandle)> {
    let wide = to_wide(path.as_os_str());

    let server = unsafe {
        CreateNamedPipeW(
            PCWSTR(wide.as_ptr()),
            PIPE_ACCESS_INBOUND | FILE_FLAG_FIRST_PIPE_INSTANCE | flags,
            PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
            1,
            PIPE_BUFFER_SIZE,
            PIPE_BUFFER_SIZE,
            0,
            None,
        )
    };
    if server.is_invalid() {
        return Err(LaunchError::resource(
            "CreateNamedPipeW",
            crate::error::last_os_code(),
            Some(path),
        ));
    }
    // Owned from here on: an early return below closes the server end,
    // which also removes the pipe name.
    let source = owned(server);

    let client = unsafe {
        CreateFileW(
            PCWSTR(wide.as_ptr()),
            FILE_GENERIC_WRITE.0,
            FILE_SHARE_NONE,
            None,
            OPEN_EXISTING,
            flags,
            HANDLE::default(),
        )
    }
    .map_err(|e| LaunchError::resource("CreateFileW", win32_code(&e), Some(path)))?;

    Ok((source, owned(client)))
}

pub(super) fn pipe_name_prefix() -> String {
    r"\\.\pipe\proclaunch_auto_pipe_".to_string()
}

/// Named pipes disappear with their last handle; nothing to unlink.
pub(super) fn remove_named(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::pipe::Pipe;
    use std::io::{Read, Write};

    #[test]
    fn named_pipe_round_trip() {
        let mut pipe = Pipe::create_named(None).unwrap();
        assert!(pipe.is_named());

        let mut writer = pipe.writer().unwrap();
        writer.write_all(b"hello").unwrap();
        drop(writer);

        let mut buf = Vec::new();
        pipe.reader().unwrap().read_to_end(&mut buf).unwrap_or(0);
        assert_eq!(buf, b"hello");
    }
}
