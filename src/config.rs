// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Session configuration.

use crate::device::DevicePaths;
use crate::error::{GzipFpgaError, Result};
use crate::gzip::TrailerPolicy;
use crate::mode::CompressionMode;
use std::time::Duration;

/// Default bound on the reset handshake.
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(1);

/// Default poll granularity for reset and the background reader.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default read size of the background reader.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 64 * 1024;

/// Configuration of a [`CompressionSession`](crate::CompressionSession).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device files to open.
    pub paths: DevicePaths,
    /// Compression mode selected at every reset.
    pub mode: CompressionMode,
    /// How long to wait for the core to come out of reset.
    pub reset_timeout: Duration,
    /// Sleep between register polls and the reader's wait bound.
    pub poll_interval: Duration,
    /// Buffer size of each read from the output pipe.
    pub read_chunk_size: usize,
    /// Source of the gzip trailer.
    pub trailer: TrailerPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            paths: DevicePaths::default(),
            mode: CompressionMode::default(),
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            trailer: TrailerPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Default configuration with the given mode.
    pub fn new(mode: CompressionMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_paths(mut self, paths: DevicePaths) -> Self {
        self.paths = paths;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = size;
        self
    }

    pub fn with_trailer(mut self, trailer: TrailerPolicy) -> Self {
        self.trailer = trailer;
        self
    }

    /// Check that the configuration can drive a session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for the `Error` mode, a zero read chunk size
    /// or a zero poll interval.
    pub fn validate(&self) -> Result<()> {
        if !self.mode.is_settable() {
            return Err(GzipFpgaError::InvalidArgument(format!(
                "compression mode {} can't be set",
                self.mode
            )));
        }
        if self.read_chunk_size == 0 {
            return Err(GzipFpgaError::InvalidArgument(
                "read chunk size must be nonzero".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(GzipFpgaError::InvalidArgument(
                "poll interval must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}
