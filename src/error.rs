//! Error handling stuff
use displaydoc::Display;
use std::{io, time::Duration};
use thiserror::Error;

/// Underlying cause of a failed read or write.
///
/// Direct filesystem access fails with an [`io::Error`] carrying the errno;
/// shell-mediated access fails with the child's exit status and whatever it
/// printed to stderr.
#[derive(Debug, Display, Error)]
pub enum Failure {
    /// IO Failed
    Io(#[from] io::Error),

    /// Command exited with status {status}: {stderr}
    Exit { status: i32, stderr: String },
}

/// Error type for [`crate::client`]
#[derive(Debug, Display, Error)]
pub enum ClientError {
    /// Control file `{0}` is not available
    Unavailable(String),

    /// Couldn't read `{0}`: {1}
    Read(String, #[source] Failure),

    /// Couldn't write `{0}`: {1}
    Write(String, #[source] Failure),

    /// Invalid range: head {0} and tail {1} can't both be requested
    InvalidRange(usize, usize),

    /// Command timed out after {0:?}
    Timeout(Duration),
}

/// Error type for [`crate::shell`]
#[derive(Debug, Display, Error)]
pub enum ShellError {
    /// IO Failed
    Io(#[from] io::Error),

    /// Command timed out after {0:?}
    Timeout(Duration),
}
