//! Child process management.
//!
//! Spawns the wrapped stdio server through the platform shell and exposes its three pipes
//! separately, so the router can own stdin while capture tasks read stdout and stderr.

pub mod process_handle;

pub use process_handle::{ChildExit, ChildProcess, ChildStdio};
