// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Streaming compressor session on top of the gzip core.

use crate::config::SessionConfig;
use crate::device::{InputChannel, OutputChannel};
use crate::error::{Channel, GzipFpgaError, Result};
use crate::framing::{Frame, FrameAccumulator};
use crate::gzip::GZIP_HEADER;
use crate::mode::CompressionMode;
use crate::reader::{self, lock, OutputState, ReaderHandle, ReaderSettings, SharedOutput};
use crate::registers::{ControlChannel, RegisterFile};
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// A streaming gzip compressor driving the FPGA core.
///
/// The caller feeds raw bytes with [`set_input`](Self::set_input), closes the
/// stream with [`finish`](Self::finish) and drains the gzip member with
/// [`compress`](Self::compress) until [`finished`](Self::finished) reports
/// true and no output is left. A background thread moves the core's output
/// into the session while the caller keeps writing.
///
/// # Example
///
/// ```rust,no_run
/// use gzip_fpga::{CompressionMode, CompressionSession, GzipFpgaError, SessionConfig};
///
/// fn main() -> Result<(), GzipFpgaError> {
///     let mut session = CompressionSession::open(SessionConfig::new(CompressionMode::FixedHuffman))?;
///
///     session.set_input(b"Hello, FPGA!")?;
///     session.finish()?;
///
///     let mut member = Vec::new();
///     let mut buf = [0u8; 4096];
///     loop {
///         let finished = session.finished();
///         let n = session.compress(&mut buf)?;
///         member.extend_from_slice(&buf[..n]);
///         if finished && n == 0 {
///             break;
///         }
///     }
///     session.end()?;
///     Ok(())
/// }
/// ```
pub struct CompressionSession<C = File, W = File, R = File>
where
    C: ControlChannel + 'static,
    W: InputChannel,
    R: OutputChannel + 'static,
{
    config: SessionConfig,
    registers: Option<Arc<Mutex<RegisterFile<C>>>>,
    input: Option<W>,
    /// Output pipe while no reader thread owns it.
    output: Option<R>,
    reader: Option<ReaderHandle<R>>,
    accumulator: FrameAccumulator,
    shared: SharedOutput,
    bytes_read: u64,
    bytes_written: AtomicU64,
    /// Set when the reader thread could not hand the output pipe back.
    output_lost: Option<GzipFpgaError>,
    input_closed: bool,
    ended: bool,
}

impl CompressionSession {
    /// Open the device files named in `config` and start a session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an invalid configuration,
    /// `DeviceUnavailable` if a device file cannot be opened, and `Timeout`
    /// or `IoFailure` if the initial reset fails.
    pub fn open(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let (registers, input, output) = config.paths.open()?;
        log::info!(
            "opened gzip core at {}",
            config.paths.register_file.display()
        );
        Self::with_devices(registers, input, output, config)
    }
}

impl<C, W, R> CompressionSession<C, W, R>
where
    C: ControlChannel + 'static,
    W: InputChannel,
    R: OutputChannel + 'static,
{
    /// Start a session on already opened channels.
    ///
    /// Resets the core, selects `config.mode`, seeds the gzip header and
    /// starts the background reader. `config.paths` is not used.
    pub fn with_devices(
        registers: RegisterFile<C>,
        input: W,
        output: R,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        let mut session = Self {
            config,
            registers: Some(Arc::new(Mutex::new(registers))),
            input: Some(input),
            output: Some(output),
            reader: None,
            accumulator: FrameAccumulator::new(),
            shared: Arc::new(Mutex::new(OutputState::default())),
            bytes_read: 0,
            bytes_written: AtomicU64::new(0),
            output_lost: None,
            input_closed: false,
            ended: false,
        };
        session.reset()?;
        Ok(session)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.ended {
            Err(GzipFpgaError::SessionEnded)
        } else {
            Ok(())
        }
    }

    fn check_health(&self) -> Result<()> {
        match &lock(&self.shared).error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn record(&self, err: &GzipFpgaError) {
        lock(&self.shared).error.get_or_insert_with(|| err.clone());
    }

    fn registers_handle(&self) -> Result<&Arc<Mutex<RegisterFile<C>>>> {
        self.registers.as_ref().ok_or(GzipFpgaError::SessionEnded)
    }

    fn write_frame(input: &mut W, frame: Frame<'_>) -> Result<()> {
        log::debug!(
            "writing frame: {} bytes{}",
            frame.header.len,
            if frame.header.end_of_stream { " (end of stream)" } else { "" }
        );
        frame
            .write_to(input)
            .map_err(|e| GzipFpgaError::io(Channel::Input, e))
    }

    /// Feed raw bytes to the core.
    ///
    /// Bytes are buffered into blocks of up to 64 KiB - 1; full blocks are
    /// written immediately. [`bytes_read`](Self::bytes_read) grows by
    /// `data.len()` regardless of how much was flushed.
    ///
    /// # Errors
    ///
    /// Returns a previously recorded failure, `InvalidState` after
    /// [`finish`](Self::finish), or `IoFailure` if a frame write fails.
    pub fn set_input(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.check_health()?;
        if self.input_closed {
            return Err(GzipFpgaError::InvalidState(
                "input after finish; reset the session first",
            ));
        }

        self.bytes_read += data.len() as u64;
        let input = self.input.as_mut().ok_or(GzipFpgaError::SessionEnded)?;
        let result = self
            .accumulator
            .push(data, |frame| Self::write_frame(input, frame));

        match result {
            Ok(frames) => {
                if frames > 0 {
                    log::debug!("flushed {} full blocks", frames);
                }
                Ok(())
            }
            Err(e) => {
                log::error!("unable to write data to gzip core: {}", e);
                self.record(&e);
                Err(e)
            }
        }
    }

    /// Returns true while the pass is not finished and no output is queued.
    pub fn needs_input(&self) -> bool {
        let state = lock(&self.shared);
        !state.finished && state.buffer.is_empty()
    }

    /// Close the input stream.
    ///
    /// Sends the pending bytes, possibly none, as the end-of-stream frame.
    /// Calling it again before a reset does nothing.
    pub fn finish(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.check_health()?;
        if self.input_closed {
            return Ok(());
        }

        let input = self.input.as_mut().ok_or(GzipFpgaError::SessionEnded)?;
        if let Err(e) = self
            .accumulator
            .finish(|frame| Self::write_frame(input, frame))
        {
            log::error!("unable to write final frame to gzip core: {}", e);
            self.record(&e);
            return Err(e);
        }
        self.input_closed = true;

        if log::log_enabled!(log::Level::Debug) {
            let mut registers = lock(self.registers_handle()?);
            let input_size = registers.input_size()?;
            let status = registers.status()?;
            log::debug!("after finish: ISIZE={:#010x}, STATUS={:?}", input_size, status);
        }
        Ok(())
    }

    /// Returns true once the core completed the pass and its output has been
    /// moved into the session. Queued bytes may still wait for `compress`.
    pub fn finished(&self) -> bool {
        lock(&self.shared).finished
    }

    /// Move compressed bytes into `buf`, oldest first.
    ///
    /// Returns the number of bytes copied; 0 means nothing is ready yet and
    /// the caller should poll again. Never blocks on the device.
    ///
    /// # Errors
    ///
    /// Returns the first failure recorded by the session or the background
    /// reader, or `SessionEnded`.
    pub fn compress(&self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        let mut state = lock(&self.shared);
        if let Some(e) = &state.error {
            return Err(e.clone());
        }

        let n = buf.len().min(state.buffer.len());
        for (dst, src) in buf.iter_mut().zip(state.buffer.drain(..n)) {
            *dst = src;
        }
        self.bytes_written.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }

    /// Number of bytes queued for `compress`.
    pub fn pending_output(&self) -> usize {
        lock(&self.shared).buffer.len()
    }

    /// Total raw bytes passed to `set_input` since the last reset.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Total bytes returned by `compress` since the last reset.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Restart the session for a new stream.
    ///
    /// Stops the background reader, resets the core, reselects the mode,
    /// drops pending input and output, reseeds the gzip header, zeroes the
    /// counters, clears any recorded failure and starts a fresh reader. No
    /// read is in flight while the core is reset, so every byte the new
    /// reader sees belongs to the new pass.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.park_reader()?;

        let hardware = {
            let mut registers = lock(self.registers_handle()?);
            registers
                .reset(self.config.reset_timeout, self.config.poll_interval)
                .and_then(|_| registers.set_compression_mode(self.config.mode))
                .and_then(|_| registers.compression_mode())
        };
        let mode = match hardware {
            Ok(mode) => mode,
            Err(e) => {
                log::error!("unable to reset gzip core: {}", e);
                self.record(&e);
                return Err(e);
            }
        };
        log::info!("core reset, mode register reads {}", mode);

        self.accumulator.clear();
        let generation = {
            let mut state = lock(&self.shared);
            state.generation += 1;
            state.buffer.clear();
            state.buffer.extend(GZIP_HEADER);
            state.finished = false;
            state.error = None;
            state.generation
        };
        self.bytes_read = 0;
        self.bytes_written.store(0, Ordering::Relaxed);
        self.input_closed = false;

        self.start_reader(generation)
    }

    /// Stop the reader, if any, and take the output pipe back.
    fn park_reader(&mut self) -> Result<()> {
        if let Some(running) = self.reader.take() {
            match running.stop() {
                Ok(output) => self.output = Some(output),
                Err(e) => {
                    log::error!("background reader lost: {}", e);
                    self.output_lost = Some(e.clone());
                    self.record(&e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn start_reader(&mut self, generation: u64) -> Result<()> {
        let output = match self.output.take() {
            Some(output) => output,
            None => {
                let e = self
                    .output_lost
                    .clone()
                    .unwrap_or(GzipFpgaError::SessionEnded);
                self.record(&e);
                return Err(e);
            }
        };
        let settings = ReaderSettings {
            poll_interval: self.config.poll_interval,
            chunk_size: self.config.read_chunk_size,
            trailer: self.config.trailer,
        };
        let registers = Arc::clone(self.registers_handle()?);
        self.reader = Some(reader::spawn(
            output,
            registers,
            Arc::clone(&self.shared),
            generation,
            settings,
        )?);
        Ok(())
    }

    /// Stop the background reader and close all device handles.
    ///
    /// Safe to call more than once; every other operation fails with
    /// `SessionEnded` afterwards.
    pub fn end(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;

        let mut first_error = None;
        if let Some(running) = self.reader.take() {
            match running.stop() {
                Ok(output) => drop(output),
                Err(e) => first_error = Some(e),
            }
        }
        drop(self.output.take());

        if let Some(mut input) = self.input.take() {
            if let Err(e) = input.flush() {
                first_error.get_or_insert(GzipFpgaError::io(Channel::Input, e));
            }
        }
        drop(self.registers.take());

        log::info!("session ended");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Compression mode selected at every reset.
    pub fn mode(&self) -> CompressionMode {
        self.config.mode
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run `f` with exclusive access to the register file.
    pub fn with_registers<T>(
        &self,
        f: impl FnOnce(&mut RegisterFile<C>) -> Result<T>,
    ) -> Result<T> {
        self.ensure_open()?;
        let mut registers = lock(self.registers_handle()?);
        f(&mut registers)
    }
}

impl<C, W, R> Drop for CompressionSession<C, W, R>
where
    C: ControlChannel + 'static,
    W: InputChannel,
    R: OutputChannel + 'static,
{
    fn drop(&mut self) {
        if let Err(e) = self.end() {
            log::warn!("error while closing session: {}", e);
        }
    }
}
