use std::path::{Path, PathBuf};
use thiserror::Error;

/// Exit codes used by the `proclaunch` binary, following the shell
/// conventions for "cannot execute" and "not found".
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnCode {
    NoError = 0,
    RuntimeError = 1,
    InvalidArguments = 2,
    SetupFailure = 125,
    CannotExecute = 126,
    NotFound = 127,
}

impl ReturnCode {
    pub fn as_exit_code(self) -> i32 {
        self as i32
    }
}

/// Errors produced while creating pipes or launching a child process.
///
/// The enum is `Clone` so that error handlers can keep their own copy of
/// the error delivered to `on_error`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// A handler's own precondition failed before any OS call was made.
    #[error("Launch setup failed: {0}")]
    SetupFailure(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The OS refused to create the process.
    #[error("Failed to create process: {}", os_message(.code))]
    PlatformCreationFailure { code: i32 },

    /// A pipe or named pipe could not be created.
    #[error("{op} failed{}: {}", describe_path(.path), os_message(.code))]
    ResourceCreationFailure {
        op: &'static str,
        code: i32,
        path: Option<PathBuf>,
    },

    #[error("I/O error ({kind:?}): {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },

    #[cfg(unix)]
    #[error("System error: {0}")]
    SystemError(#[from] nix::Error),

    #[cfg(windows)]
    #[error("Windows error: {0}")]
    WindowsError(#[from] windows::core::Error),
}

impl LaunchError {
    pub(crate) fn resource(op: &'static str, code: i32, path: Option<&Path>) -> Self {
        LaunchError::ResourceCreationFailure {
            op,
            code,
            path: path.map(Path::to_path_buf),
        }
    }

    /// Platform error code carried by the error, if any.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            LaunchError::PlatformCreationFailure { code } => Some(*code),
            LaunchError::ResourceCreationFailure { code, .. } => Some(*code),
            #[cfg(unix)]
            LaunchError::SystemError(errno) => Some(*errno as i32),
            #[cfg(windows)]
            LaunchError::WindowsError(err) => Some(err.code().0),
            _ => None,
        }
    }

    /// Convert error to the appropriate return code
    pub fn to_return_code(&self) -> ReturnCode {
        match self {
            LaunchError::SetupFailure(_) => ReturnCode::SetupFailure,
            LaunchError::InvalidArgument(_) => ReturnCode::InvalidArguments,
            LaunchError::PlatformCreationFailure { code } => {
                if std::io::Error::from_raw_os_error(*code).kind() == std::io::ErrorKind::NotFound
                {
                    ReturnCode::NotFound
                } else {
                    ReturnCode::CannotExecute
                }
            }
            LaunchError::ResourceCreationFailure { .. } => ReturnCode::RuntimeError,
            LaunchError::Io {
                kind: std::io::ErrorKind::NotFound,
                ..
            } => ReturnCode::NotFound,
            LaunchError::Io { .. } => ReturnCode::RuntimeError,
            #[cfg(unix)]
            LaunchError::SystemError(_) => ReturnCode::RuntimeError,
            #[cfg(windows)]
            LaunchError::WindowsError(_) => ReturnCode::RuntimeError,
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        self.to_return_code().as_exit_code()
    }
}

impl From<std::io::Error> for LaunchError {
    fn from(err: std::io::Error) -> Self {
        LaunchError::Io {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<LaunchError> for i32 {
    fn from(error: LaunchError) -> Self {
        error.exit_code()
    }
}

/// Result type alias for launch operations
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Stores `result`'s error into `slot` and turns the value into an option.
///
/// This is the glue for the error-slot form of every fallible operation:
/// the slot is only written on failure, so a caller can chain several
/// calls and inspect the first error afterwards.
pub(crate) fn into_slot<T>(result: Result<T>, slot: &mut Option<LaunchError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            *slot = Some(err);
            None
        }
    }
}

/// The last OS error code of the calling thread.
#[cfg(windows)]
pub(crate) fn last_os_code() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Win32 error code wrapped in a `windows` crate error.
#[cfg(windows)]
pub(crate) fn win32_code(err: &windows::core::Error) -> i32 {
    let hr = err.code().0;
    if (hr as u32) & 0xFFFF_0000 == 0x8007_0000 {
        hr & 0xFFFF
    } else {
        hr
    }
}

fn os_message(code: &i32) -> String {
    std::io::Error::from_raw_os_error(*code).to_string()
}

fn describe_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" for {}", p.display()),
        None => String::new(),
    }
}
