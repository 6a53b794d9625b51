//! Stock handlers
//!
//! Each handler configures one aspect of a launch. They are meant to be
//! combined on an [`Executor`](crate::Executor):
//!
//! ```no_run
//! use proclaunch::handlers::{Cmd, Env, StartDir, StdErr, StdIn};
//! use proclaunch::Executor;
//!
//! # fn main() -> proclaunch::Result<()> {
//! let mut child = Executor::new()
//!     .with(Cmd::search("make")?.arg("-j4"))
//!     .with(StartDir::new("/src/project"))
//!     .with(Env::new().set("CC", "clang"))
//!     .with(StdIn::null())
//!     .with(StdErr::to_stdout())
//!     .launch()?;
//! child.wait()?;
//! # Ok(())
//! # }
//! ```

mod cmd;
mod env;
mod failure;
mod group;
mod hooks;
mod stdio;

pub use cmd::Cmd;
pub use env::{Env, StartDir};
pub use failure::{CaptureError, LogFailures};
pub use group::Group;
#[cfg(unix)]
pub use hooks::OnExec;
pub use hooks::{OnError, OnSetup, OnSuccess};
pub use stdio::{StdErr, StdIn, StdOut};
