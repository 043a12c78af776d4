// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! # FPGA GZip Accelerator Rust Bindings
//!
//! This crate drives a deflate compression core on an FPGA that is attached
//! through Xillybus device files, and presents it as a streaming gzip
//! compressor.
//!
//! ## Supported Operations
//!
//! - Streaming compression (`set_input` / `finish` / `compress`)
//! - Mode selection (stored, fixed Huffman, dynamic Huffman)
//! - Core discovery by device ID
//! - Register access (reset handshake, status, CRC, input size)
//!
//! ## Platform Support
//!
//! | Platform | Hardware core | Software core |
//! |----------|---------------|---------------|
//! | Linux    | Supported     | Supported     |
//! | Other    | Not available | Supported     |
//!
//! ### Software core
//!
//! Without the FPGA the [`emulator`] provides a software model of the core
//! that speaks the same register and pipe protocol, using `flate2` for the
//! deflate data. The test-suite and the benches run against it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use gzip_fpga::{core_available_default, drain, CompressionSession, GzipFpgaError, SessionConfig};
//! use std::time::Duration;
//!
//! fn main() -> Result<(), GzipFpgaError> {
//!     if !core_available_default() {
//!         return Ok(());
//!     }
//!     let mut session = CompressionSession::open(SessionConfig::default())?;
//!     let member = drain::compress_all(&mut session, b"Hello, FPGA!", Duration::from_secs(5))?;
//!
//!     println!("gzip member: {} bytes", member.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Requirements
//!
//! ### Hardware
//! - FPGA board running the gzip core (DEVICE-ID 0xBC or later)
//!
//! ### Software
//! - Xillybus driver exposing `/dev/xillybus_write_32`,
//!   `/dev/xillybus_read_32` and `/dev/xillybus_mem_8`

// Module declarations
pub mod config;
pub mod device;
pub mod drain;
pub mod emulator;
pub mod error;
pub mod framing;
pub mod gzip;
pub mod mode;
mod reader;
pub mod registers;
pub mod session;

// Re-exports for convenient access
pub use config::SessionConfig;
pub use device::{
    core_available, core_available_default, probe_device_id, DevicePaths, InputChannel,
    OutputChannel, GZIP_CORE_DEVICE_ID,
};
pub use emulator::{EmulatedSession, Emulator, EmulatorOptions};
pub use error::{Channel, GzipFpgaError, Result};
pub use framing::{Frame, FrameAccumulator, FrameHeader, MAX_BLOCK_SIZE};
pub use gzip::{TrailerPolicy, GZIP_HEADER};
pub use mode::CompressionMode;
pub use registers::{ControlChannel, RegisterFile, StatusFlags};
pub use session::CompressionSession;
