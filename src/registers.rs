// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Register file access for the gzip core.
//!
//! The core exposes a 32-byte register space through a seekable byte device
//! (`/dev/xillybus_mem_8`). The host keeps a mirror of the whole space and
//! re-reads it before every field access, since STATUS, INPUT-SIZE and CRC
//! are written by the hardware at any time.
//!
//! # Layout
//!
//! | Offset | Size | Field | Owner |
//! |--------|------|-------|-------|
//! | 0 | 1 | RESET | host |
//! | 1 | 1 | MODE | host |
//! | 2 | 1 | STATUS | core |
//! | 3 | 4 | INPUT-SIZE (big-endian) | core |
//! | 7 | 4 | CRC (big-endian) | core |
//! | 14 | 1 | DEVICE-ID | core |
//!
//! All other offsets are reserved.

use crate::error::{Channel, GzipFpgaError, Result};
use crate::mode::CompressionMode;
use bitflags::bitflags;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// Size of the register space in bytes.
pub const REGISTER_FILE_SIZE: usize = 32;

/// Register byte offsets.
pub mod offset {
    /// Reset control. Write 0 then 1; reads nonzero once the core is ready.
    pub const RESET: usize = 0x00;
    /// Compression mode code.
    pub const MODE: usize = 0x01;
    /// Status flags.
    pub const STATUS: usize = 0x02;
    /// First byte of the 4-byte input size counter.
    pub const INPUT_SIZE: usize = 0x03;
    /// First byte of the 4-byte CRC-32.
    pub const CRC: usize = 0x07;
    /// Hardware identifier.
    pub const DEVICE_ID: usize = 0x0E;
}

bitflags! {
    /// STATUS register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        /// The core consumed the end-of-stream frame and emitted all output.
        const COMPRESSION_COMPLETE = 1 << 2;
    }
}

/// Any channel usable as a register file.
///
/// Device files implement this, as does `std::io::Cursor<Vec<u8>>`.
pub trait ControlChannel: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> ControlChannel for T {}

/// Typed access to the core's register space.
pub struct RegisterFile<C> {
    channel: C,
    mirror: [u8; REGISTER_FILE_SIZE],
}

impl RegisterFile<File> {
    /// Open the register device at `path`.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if the file cannot be opened for reading
    /// and writing, or `IoFailure` if the initial read fails.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| GzipFpgaError::unavailable(path, e))?;
        Self::new(file)
    }
}

impl<C: ControlChannel> RegisterFile<C> {
    /// Wrap an open control channel and load the mirror.
    pub fn new(channel: C) -> Result<Self> {
        let mut registers = Self {
            channel,
            mirror: [0; REGISTER_FILE_SIZE],
        };
        registers.read_all()?;
        Ok(registers)
    }

    fn read_all(&mut self) -> Result<()> {
        self.channel
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.channel.read_exact(&mut self.mirror))
            .map_err(|e| GzipFpgaError::io(Channel::Control, e))
    }

    /// Write one host-owned register. Only the addressed byte goes to the
    /// device so a stale mirror never overwrites hardware-owned fields.
    fn write_register(&mut self, offset: usize, value: u8) -> Result<()> {
        self.channel
            .seek(SeekFrom::Start(offset as u64))
            .and_then(|_| self.channel.write_all(&[value]))
            .and_then(|_| self.channel.flush())
            .map_err(|e| GzipFpgaError::io(Channel::Control, e))?;
        self.mirror[offset] = value;
        Ok(())
    }

    fn read_u32_be(&mut self, start: usize) -> Result<u32> {
        self.read_all()?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&self.mirror[start..start + 4]);
        Ok(u32::from_be_bytes(bytes))
    }

    /// Reset the core and wait until it reports ready.
    ///
    /// Writes 0 then 1 to RESET and polls until RESET reads back nonzero,
    /// sleeping `poll_interval` between reads.
    ///
    /// # Errors
    ///
    /// Returns `Timeout` if the core is not ready within `timeout`.
    pub fn reset(&mut self, timeout: Duration, poll_interval: Duration) -> Result<()> {
        self.write_register(offset::RESET, 0)?;
        self.write_register(offset::RESET, 1)?;

        let start = Instant::now();
        loop {
            self.read_all()?;
            if self.mirror[offset::RESET] != 0 {
                log::debug!("core ready after {:?}", start.elapsed());
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(GzipFpgaError::Timeout {
                    operation: "core reset",
                    waited: start.elapsed(),
                });
            }
            std::thread::sleep(poll_interval);
        }
    }

    /// Select the compression mode.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for `CompressionMode::Error`.
    pub fn set_compression_mode(&mut self, mode: CompressionMode) -> Result<()> {
        if !mode.is_settable() {
            return Err(GzipFpgaError::InvalidArgument(format!(
                "compression mode {} can't be set",
                mode
            )));
        }
        self.write_register(offset::MODE, mode.as_u8())
    }

    /// Read back the selected compression mode.
    pub fn compression_mode(&mut self) -> Result<CompressionMode> {
        self.read_all()?;
        Ok(CompressionMode::from_register(self.mirror[offset::MODE]))
    }

    /// Number of input bytes the core has consumed (mod 2^32).
    pub fn input_size(&mut self) -> Result<u32> {
        self.read_u32_be(offset::INPUT_SIZE)
    }

    /// CRC-32 of the input consumed so far.
    pub fn crc(&mut self) -> Result<u32> {
        self.read_u32_be(offset::CRC)
    }

    /// Hardware identifier of the attached core.
    pub fn device_id(&mut self) -> Result<u8> {
        self.read_all()?;
        Ok(self.mirror[offset::DEVICE_ID])
    }

    /// Current STATUS flags. Unknown bits are retained.
    pub fn status(&mut self) -> Result<StatusFlags> {
        self.read_all()?;
        Ok(StatusFlags::from_bits_retain(self.mirror[offset::STATUS]))
    }

    /// Returns true once the core has finished the current stream.
    pub fn is_compression_complete(&mut self) -> Result<bool> {
        Ok(self.status()?.contains(StatusFlags::COMPRESSION_COMPLETE))
    }

    /// Fresh copy of the whole register space.
    pub fn snapshot(&mut self) -> Result<[u8; REGISTER_FILE_SIZE]> {
        self.read_all()?;
        Ok(self.mirror)
    }

    /// Log every named register at debug level.
    pub fn dump(&mut self) -> Result<()> {
        let regs = self.snapshot()?;
        let named = [
            ("RESET", offset::RESET),
            ("MODE", offset::MODE),
            ("STATUS", offset::STATUS),
            ("ISIZE_1", offset::INPUT_SIZE),
            ("ISIZE_2", offset::INPUT_SIZE + 1),
            ("ISIZE_3", offset::INPUT_SIZE + 2),
            ("ISIZE_4", offset::INPUT_SIZE + 3),
            ("CRC_1", offset::CRC),
            ("CRC_2", offset::CRC + 1),
            ("CRC_3", offset::CRC + 2),
            ("CRC_4", offset::CRC + 3),
            ("DEV_ID", offset::DEVICE_ID),
        ];
        for (name, addr) in named {
            log::debug!("REGFILE[{:02}] {:<7} = {:#04x}", addr, name, regs[addr]);
        }
        Ok(())
    }

    /// Consume the register file and return the channel.
    pub fn into_inner(self) -> C {
        self.channel
    }
}
