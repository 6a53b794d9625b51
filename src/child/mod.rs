//! Child handle platform abstraction layer
//!
//! A [`ChildHandle`] owns the OS representation of a launched process: a
//! pid on Unix systems, process/thread (and optional job object) handles on
//! Windows. Handles are only ever built by the executor; callers get an
//! invalid handle from `Default` and valid ones from a successful launch.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::ChildHandle;
#[cfg(unix)]
pub(crate) use unix::Spawned;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::ChildHandle;
#[cfg(windows)]
pub(crate) use self::windows::Spawned;
