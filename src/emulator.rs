// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Software model of the gzip core.
//!
//! Machines without the FPGA can still drive a [`CompressionSession`] through
//! the emulator. It speaks the same three-channel protocol as the hardware:
//! a 32-byte register file with the reset handshake, a framed input pipe and
//! a compressed output pipe. Deflate output is produced by `flate2` and
//! trails the input frame by frame, so output regularly reaches the host
//! before `finish` is called. The completion bit is raised only after the
//! final block (and, unless disabled, the gzip trailer) has been queued.
//!
//! Mode mapping: `NoCompression` produces stored blocks, `FixedHuffman` the
//! fastest level and `DynamicHuffman` the best level.

use crate::config::SessionConfig;
use crate::device::{OutputChannel, GZIP_CORE_DEVICE_ID};
use crate::error::Result;
use crate::framing::{FrameHeader, FRAME_HEADER_LEN};
use crate::gzip;
use crate::mode::CompressionMode;
use crate::reader::lock;
use crate::registers::{offset, RegisterFile, StatusFlags, REGISTER_FILE_SIZE};
use crate::session::CompressionSession;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// Session type running on the emulator.
pub type EmulatedSession = CompressionSession<EmulatedRegisters, EmulatedInput, EmulatedOutput>;

/// Behaviour knobs of the software core.
#[derive(Debug, Clone)]
pub struct EmulatorOptions {
    /// Value of the DEVICE-ID register.
    pub device_id: u8,
    /// Append CRC-32/ISIZE after the deflate data, as the hardware does.
    pub emit_trailer: bool,
    /// Register reads that still see RESET = 0 after the release write.
    pub reset_polls: u32,
    /// Never leave reset.
    pub wedged: bool,
    /// Report the output pipe readable even when empty, so reads return 0.
    pub always_readable: bool,
}

impl Default for EmulatorOptions {
    fn default() -> Self {
        Self {
            device_id: GZIP_CORE_DEVICE_ID,
            emit_trailer: true,
            reset_polls: 2,
            wedged: false,
            always_readable: false,
        }
    }
}

struct CoreState {
    options: EmulatorOptions,
    regs: [u8; REGISTER_FILE_SIZE],
    release_after: Option<u32>,
    prefix: Vec<u8>,
    remaining: usize,
    end_of_stream: bool,
    stream_done: bool,
    encoder: Option<DeflateEncoder<Vec<u8>>>,
    hasher: crc32fast::Hasher,
    total_in: u64,
    output: VecDeque<u8>,
    frames: Vec<FrameHeader>,
    input_fault: bool,
    output_fault: bool,
    output_panic: bool,
}

impl CoreState {
    fn new(options: EmulatorOptions) -> Self {
        let mut regs = [0u8; REGISTER_FILE_SIZE];
        regs[offset::RESET] = 1;
        regs[offset::DEVICE_ID] = options.device_id;
        Self {
            options,
            regs,
            release_after: None,
            prefix: Vec::with_capacity(FRAME_HEADER_LEN),
            remaining: 0,
            end_of_stream: false,
            stream_done: false,
            encoder: None,
            hasher: crc32fast::Hasher::new(),
            total_in: 0,
            output: VecDeque::new(),
            frames: Vec::new(),
            input_fault: false,
            output_fault: false,
            output_panic: false,
        }
    }

    fn clear_stream(&mut self) {
        self.prefix.clear();
        self.remaining = 0;
        self.end_of_stream = false;
        self.stream_done = false;
        self.encoder = None;
        self.hasher = crc32fast::Hasher::new();
        self.total_in = 0;
        self.output.clear();
        self.frames.clear();
        self.regs[offset::STATUS] = 0;
        self.regs[offset::INPUT_SIZE..offset::INPUT_SIZE + 4].fill(0);
        self.regs[offset::CRC..offset::CRC + 4].fill(0);
    }

    fn write_register(&mut self, addr: usize, value: u8) {
        match addr {
            offset::RESET if value == 0 => {
                self.clear_stream();
                self.regs[offset::RESET] = 0;
                self.release_after = None;
            }
            offset::RESET => {
                if self.regs[offset::RESET] == 0 && !self.options.wedged {
                    self.release_after = Some(self.options.reset_polls);
                }
            }
            offset::MODE => self.regs[offset::MODE] = value,
            // Hardware-owned.
            offset::STATUS | offset::DEVICE_ID => {}
            a if (offset::INPUT_SIZE..offset::CRC + 4).contains(&a) => {}
            a if a < REGISTER_FILE_SIZE => self.regs[a] = value,
            _ => {}
        }
    }

    fn tick_reset(&mut self) {
        if let Some(n) = self.release_after {
            if n == 0 {
                self.regs[offset::RESET] = 1;
                self.release_after = None;
            } else {
                self.release_after = Some(n - 1);
            }
        }
    }

    fn level(&self) -> Compression {
        match CompressionMode::from_register(self.regs[offset::MODE]) {
            CompressionMode::NoCompression => Compression::none(),
            CompressionMode::FixedHuffman => Compression::fast(),
            _ => Compression::best(),
        }
    }

    fn consume(&mut self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            if self.stream_done {
                log::warn!(
                    "emulator: ignoring {} bytes after end of stream",
                    data.len()
                );
                return Ok(());
            }

            if self.remaining == 0 && !self.end_of_stream {
                let take = (FRAME_HEADER_LEN - self.prefix.len()).min(data.len());
                self.prefix.extend_from_slice(&data[..take]);
                data = &data[take..];
                if self.prefix.len() < FRAME_HEADER_LEN {
                    break;
                }
                self.start_frame()?;
                continue;
            }

            let take = self.remaining.min(data.len());
            self.absorb(&data[..take])?;
            data = &data[take..];
            self.remaining -= take;
            if self.remaining == 0 {
                self.end_frame()?;
            }
        }
        self.pump();
        Ok(())
    }

    fn start_frame(&mut self) -> io::Result<()> {
        let mut bytes = [0u8; FRAME_HEADER_LEN];
        bytes.copy_from_slice(&self.prefix);
        self.prefix.clear();
        let header = FrameHeader::parse(bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        log::debug!(
            "emulator: frame of {} bytes, end_of_stream={}",
            header.len,
            header.end_of_stream
        );
        self.frames.push(header);
        if self.encoder.is_none() {
            self.encoder = Some(DeflateEncoder::new(Vec::new(), self.level()));
        }
        self.remaining = header.len;
        self.end_of_stream = header.end_of_stream;
        if self.remaining == 0 {
            self.end_frame()?;
        }
        Ok(())
    }

    fn absorb(&mut self, payload: &[u8]) -> io::Result<()> {
        if let Some(encoder) = self.encoder.as_mut() {
            encoder.write_all(payload)?;
        }
        self.hasher.update(payload);
        self.total_in += payload.len() as u64;
        Ok(())
    }

    fn end_frame(&mut self) -> io::Result<()> {
        let input_size = self.total_in as u32;
        let crc = self.hasher.clone().finalize();
        self.regs[offset::INPUT_SIZE..offset::INPUT_SIZE + 4]
            .copy_from_slice(&input_size.to_be_bytes());
        self.regs[offset::CRC..offset::CRC + 4].copy_from_slice(&crc.to_be_bytes());

        if !self.end_of_stream {
            return Ok(());
        }
        if let Some(encoder) = self.encoder.take() {
            let tail = encoder.finish()?;
            self.output.extend(tail);
        }
        if self.options.emit_trailer {
            self.output.extend(gzip::trailer(crc, input_size));
        }
        self.end_of_stream = false;
        self.stream_done = true;
        self.regs[offset::STATUS] |= StatusFlags::COMPRESSION_COMPLETE.bits();
        log::debug!("emulator: stream complete, {} input bytes", self.total_in);
        Ok(())
    }

    /// Move whatever the encoder produced so far to the output pipe.
    fn pump(&mut self) {
        if let Some(encoder) = self.encoder.as_mut() {
            let produced = std::mem::take(encoder.get_mut());
            self.output.extend(produced);
        }
    }
}

struct Core {
    state: Mutex<CoreState>,
    readable: Condvar,
}

/// A software gzip core.
#[derive(Clone)]
pub struct Emulator {
    core: Arc<Core>,
}

impl Emulator {
    /// Emulator with default options.
    pub fn new() -> Self {
        Self::with_options(EmulatorOptions::default())
    }

    pub fn with_options(options: EmulatorOptions) -> Self {
        log::info!(
            "creating software gzip core (device id {:#04x})",
            options.device_id
        );
        Self {
            core: Arc::new(Core {
                state: Mutex::new(CoreState::new(options)),
                readable: Condvar::new(),
            }),
        }
    }

    /// The three channels; each call returns fresh handles on the same core.
    pub fn channels(&self) -> (EmulatedRegisters, EmulatedInput, EmulatedOutput) {
        (
            EmulatedRegisters {
                core: Arc::clone(&self.core),
                pos: 0,
            },
            EmulatedInput {
                core: Arc::clone(&self.core),
            },
            EmulatedOutput {
                core: Arc::clone(&self.core),
            },
        )
    }

    /// Register file on the emulated control channel.
    pub fn register_file(&self) -> Result<RegisterFile<EmulatedRegisters>> {
        RegisterFile::new(self.channels().0)
    }

    /// Start a session on this core.
    pub fn session(&self, config: SessionConfig) -> Result<EmulatedSession> {
        let (control, input, output) = self.channels();
        CompressionSession::with_devices(RegisterFile::new(control)?, input, output, config)
    }

    /// Frame headers received since the last reset, in arrival order.
    pub fn frames(&self) -> Vec<FrameHeader> {
        lock(&self.core.state).frames.clone()
    }

    /// Make the next write to the input pipe fail.
    pub fn inject_input_fault(&self) {
        lock(&self.core.state).input_fault = true;
    }

    /// Make the next read from the output pipe fail.
    pub fn inject_output_fault(&self) {
        lock(&self.core.state).output_fault = true;
        self.core.readable.notify_all();
    }

    /// Make the next read from the output pipe panic, killing its reader.
    pub fn inject_output_panic(&self) {
        lock(&self.core.state).output_panic = true;
        self.core.readable.notify_all();
    }

    /// Returns true while an injected fault has not fired yet.
    pub fn faults_pending(&self) -> bool {
        let state = lock(&self.core.state);
        state.input_fault || state.output_fault || state.output_panic
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Emulated register file channel.
pub struct EmulatedRegisters {
    core: Arc<Core>,
    pos: u64,
}

impl Read for EmulatedRegisters {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.core.state);
        state.tick_reset();
        let start = (self.pos as usize).min(REGISTER_FILE_SIZE);
        let n = (REGISTER_FILE_SIZE - start).min(buf.len());
        buf[..n].copy_from_slice(&state.regs[start..start + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for EmulatedRegisters {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.core.state);
        for (i, &value) in buf.iter().enumerate() {
            state.write_register(self.pos as usize + i, value);
        }
        self.pos += buf.len() as u64;
        self.core.readable.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for EmulatedRegisters {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(d) => (REGISTER_FILE_SIZE as u64).checked_add_signed(d),
            SeekFrom::Current(d) => self.pos.checked_add_signed(d),
        };
        self.pos = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of register file")
        })?;
        Ok(self.pos)
    }
}

/// Emulated input pipe.
pub struct EmulatedInput {
    core: Arc<Core>,
}

impl Write for EmulatedInput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = lock(&self.core.state);
        if std::mem::take(&mut state.input_fault) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "injected input fault"));
        }
        let result = state.consume(buf);
        self.core.readable.notify_all();
        result.map(|_| buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Emulated output pipe.
pub struct EmulatedOutput {
    core: Arc<Core>,
}

impl Read for EmulatedOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = lock(&self.core.state);
        if std::mem::take(&mut state.output_panic) {
            drop(state);
            panic!("injected output panic");
        }
        if std::mem::take(&mut state.output_fault) {
            return Err(io::Error::other("injected output fault"));
        }
        let n = buf.len().min(state.output.len());
        for (dst, src) in buf.iter_mut().zip(state.output.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl OutputChannel for EmulatedOutput {
    fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let state = lock(&self.core.state);
        let ready = |s: &CoreState| {
            !s.output.is_empty() || s.output_fault || s.output_panic || s.options.always_readable
        };
        if ready(&*state) {
            return Ok(true);
        }
        let (state, _) = self
            .core
            .readable
            .wait_timeout(state, timeout)
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(ready(&*state))
    }
}
