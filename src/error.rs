// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Error types for accelerator sessions.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The device channel an I/O failure happened on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Register file (`/dev/xillybus_mem_8`).
    Control,
    /// Framed input pipe towards the core (`/dev/xillybus_write_32`).
    Input,
    /// Compressed output pipe from the core (`/dev/xillybus_read_32`).
    Output,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Control => "control",
            Self::Input => "input",
            Self::Output => "output",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while driving the gzip core.
///
/// The type is `Clone` so that a failure captured on the background reader can
/// be reported again by every later call on the session.
#[derive(Debug, Clone, Error)]
pub enum GzipFpgaError {
    /// A required device file could not be opened.
    #[error("device {} unavailable: {source}", path.display())]
    DeviceUnavailable {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Read or write failure on one of the device handles.
    #[error("I/O failure on {channel} channel: {source}")]
    IoFailure {
        channel: Channel,
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Frame would break the block size invariant.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Hardware did not respond within the configured bound.
    #[error("{operation} timed out after {waited:?}")]
    Timeout {
        operation: &'static str,
        waited: Duration,
    },

    /// Operation not allowed in the current session state.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),

    /// The session was ended and its handles closed.
    #[error("session already ended")]
    SessionEnded,
}

impl GzipFpgaError {
    /// Wrap an I/O error raised on `channel`.
    pub fn io(channel: Channel, err: std::io::Error) -> Self {
        Self::IoFailure {
            channel,
            source: Arc::new(err),
        }
    }

    /// Wrap an open failure for `path`.
    pub fn unavailable(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::DeviceUnavailable {
            path: path.into(),
            source: Arc::new(err),
        }
    }

    /// Returns true for failures that a session `reset` can clear.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::IoFailure { .. } | Self::Timeout { .. } | Self::InvalidState(_)
        )
    }
}

/// Result type alias for accelerator operations.
pub type Result<T> = std::result::Result<T, GzipFpgaError>;
