//! Composable child-process launching
//!
//! A launch is described by a list of [`Handler`]s, each configuring one
//! aspect (program, working directory, environment, standard streams,
//! process grouping) and run by an [`Executor`] through the setup, error
//! and success phases. Successful launches yield an owned [`ChildHandle`].
//! [`Pipe`] and [`AsyncPipe`] provide the endpoints for stream redirection.

pub mod async_pipe;
pub mod child;
pub mod error;
pub mod executor;
pub mod handler;
pub mod handlers;
pub mod pipe;

pub use async_pipe::{AsyncPipe, AsyncSink, AsyncSource};
pub use child::ChildHandle;
pub use error::{LaunchError, Result, ReturnCode};
pub use executor::{launch, Executor, LaunchParams, LaunchState};
pub use handler::Handler;
pub use pipe::{Endpoint, Pipe, RawEndpoint};
