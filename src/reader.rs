// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Background drain of the core's output pipe.
//!
//! One reader thread runs per session. Each round it waits (bounded by the
//! poll interval) for the output pipe, appends whatever it read to the shared
//! output buffer and polls the STATUS register. A pass is finished once the
//! completion bit was seen *before* a round that produced no bytes: the core
//! emits its output before raising the bit, so at that point the pipe has
//! been drained.
//!
//! The output buffer lock is never held across a device access. A reader
//! serves exactly one pass: `reset` stops it before touching the core and
//! spawns a new one afterwards. Appends still check the pass generation, so
//! a reader that outlives its pass can never write into the next one.

use crate::device::OutputChannel;
use crate::error::{Channel, GzipFpgaError, Result};
use crate::gzip::{self, TrailerPolicy};
use crate::registers::{ControlChannel, RegisterFile};
use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// State shared between the caller and the reader thread.
#[derive(Debug, Default)]
pub(crate) struct OutputState {
    /// Compressed bytes not yet handed to the caller, oldest first.
    pub buffer: VecDeque<u8>,
    /// The current pass is complete and fully drained.
    pub finished: bool,
    /// First failure recorded on either side.
    pub error: Option<GzipFpgaError>,
    /// Incremented by every reset.
    pub generation: u64,
}

pub(crate) type SharedOutput = Arc<Mutex<OutputState>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct ReaderSettings {
    pub poll_interval: Duration,
    pub chunk_size: usize,
    pub trailer: TrailerPolicy,
}

/// Handle to a running reader thread.
pub(crate) struct ReaderHandle<R> {
    cancel: Arc<AtomicBool>,
    handle: JoinHandle<R>,
}

impl<R> ReaderHandle<R> {
    /// Request cancellation and wait for the thread, recovering the pipe.
    pub fn stop(self) -> Result<R> {
        self.cancel.store(true, Ordering::Release);
        self.handle.join().map_err(|_| {
            GzipFpgaError::io(
                Channel::Output,
                std::io::Error::other("background reader panicked"),
            )
        })
    }
}

/// Start draining `output` into `shared` for pass `generation`.
pub(crate) fn spawn<C, R>(
    output: R,
    registers: Arc<Mutex<RegisterFile<C>>>,
    shared: SharedOutput,
    generation: u64,
    settings: ReaderSettings,
) -> Result<ReaderHandle<R>>
where
    C: ControlChannel + 'static,
    R: OutputChannel + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let reader = Reader {
        output,
        registers,
        shared,
        generation,
        settings,
        cancel: Arc::clone(&cancel),
    };
    let handle = std::thread::Builder::new()
        .name("fpga-gzip-reader".to_string())
        .spawn(move || reader.run())
        .map_err(|e| GzipFpgaError::io(Channel::Output, e))?;
    Ok(ReaderHandle { cancel, handle })
}

struct Reader<C, R> {
    output: R,
    registers: Arc<Mutex<RegisterFile<C>>>,
    shared: SharedOutput,
    generation: u64,
    settings: ReaderSettings,
    cancel: Arc<AtomicBool>,
}

impl<C: ControlChannel, R: OutputChannel> Reader<C, R> {
    fn run(mut self) -> R {
        let mut stop_reason = scopeguard::guard("cancelled", |reason| {
            log::debug!("background reader stopped ({})", reason);
        });

        let mut buf = vec![0u8; self.settings.chunk_size];
        let mut complete_seen = false;

        while !self.cancel.load(Ordering::Acquire) {
            let (current, finished) = {
                let state = lock(&self.shared);
                (state.generation, state.finished)
            };
            if current != self.generation {
                *stop_reason = "pass superseded";
                break;
            }

            if let Err(e) = self.round(&mut buf, finished, &mut complete_seen) {
                log::error!("IO failure while reading compressed data: {}", e);
                let mut state = lock(&self.shared);
                state.error.get_or_insert(e);
                *stop_reason = "I/O failure";
                break;
            }
        }

        drop(stop_reason);
        self.output
    }

    fn round(
        &mut self,
        buf: &mut [u8],
        finished: bool,
        complete_seen: &mut bool,
    ) -> Result<()> {
        let poll = self.settings.poll_interval;
        let readable = self
            .output
            .wait_readable(poll)
            .map_err(|e| GzipFpgaError::io(Channel::Output, e))?;

        let n = if readable {
            self.output
                .read(buf)
                .map_err(|e| GzipFpgaError::io(Channel::Output, e))?
        } else {
            0
        };

        if n > 0 {
            self.append(&buf[..n]);
            return Ok(());
        }

        // Zero-length read on a readable pipe: the device reported EOF.
        if readable {
            std::thread::sleep(poll);
        }

        if finished {
            return Ok(());
        }
        if *complete_seen {
            return self.finish_pass();
        }

        *complete_seen = lock(&self.registers).is_compression_complete()?;
        if *complete_seen {
            log::debug!("completion bit set (pass {})", self.generation);
        }
        Ok(())
    }

    fn append(&self, bytes: &[u8]) {
        let mut state = lock(&self.shared);
        if state.generation != self.generation {
            log::warn!(
                "dropping {} bytes of superseded pass {}",
                bytes.len(),
                self.generation
            );
            return;
        }
        state.buffer.extend(bytes);
        log::trace!("reader appended {} bytes", bytes.len());
    }

    fn finish_pass(&self) -> Result<()> {
        let trailer = match self.settings.trailer {
            TrailerPolicy::Passthrough => None,
            TrailerPolicy::FromRegisters => {
                let mut registers = lock(&self.registers);
                let crc = registers.crc()?;
                let input_size = registers.input_size()?;
                Some(gzip::trailer(crc, input_size))
            }
        };

        let mut state = lock(&self.shared);
        if state.generation != self.generation {
            return Ok(());
        }
        if let Some(trailer) = trailer {
            state.buffer.extend(trailer);
        }
        state.finished = true;
        log::info!("compression pass {} complete", self.generation);
        Ok(())
    }
}
