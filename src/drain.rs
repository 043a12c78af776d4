// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Helpers that drive the compress loop to completion.

use crate::device::{InputChannel, OutputChannel};
use crate::error::{GzipFpgaError, Result};
use crate::registers::ControlChannel;
use crate::session::CompressionSession;
use std::time::{Duration, Instant};

/// Outcome of one drain step.
enum Step {
    Done,
    Progress,
    Idle,
}

fn step<C, W, R>(
    session: &CompressionSession<C, W, R>,
    buf: &mut [u8],
    out: &mut Vec<u8>,
) -> Result<Step>
where
    C: ControlChannel + 'static,
    W: InputChannel,
    R: OutputChannel + 'static,
{
    // Sample before draining: output queued ahead of the flag is then
    // guaranteed to be returned by this or an earlier call.
    let finished = session.finished();
    let n = session.compress(buf)?;
    out.extend_from_slice(&buf[..n]);
    Ok(match (finished, n) {
        (true, 0) => Step::Done,
        (_, 0) => Step::Idle,
        _ => Step::Progress,
    })
}

fn timed_out(started: Instant, timeout: Duration) -> Option<GzipFpgaError> {
    let waited = started.elapsed();
    (waited >= timeout).then_some(GzipFpgaError::Timeout {
        operation: "drain",
        waited,
    })
}

/// Append compressed output to `out` until the pass is finished and fully
/// drained. Returns the number of bytes appended.
///
/// # Errors
///
/// Returns `Timeout` if the session makes no progress towards completion
/// within `timeout`, or any error reported by `compress`.
pub fn drain_until_finished<C, W, R>(
    session: &CompressionSession<C, W, R>,
    out: &mut Vec<u8>,
    timeout: Duration,
) -> Result<usize>
where
    C: ControlChannel + 'static,
    W: InputChannel,
    R: OutputChannel + 'static,
{
    let start_len = out.len();
    let mut buf = vec![0u8; session.config().read_chunk_size];
    let poll = session.config().poll_interval;
    let mut last_progress = Instant::now();

    loop {
        match step(session, &mut buf, out)? {
            Step::Done => return Ok(out.len() - start_len),
            Step::Progress => last_progress = Instant::now(),
            Step::Idle => {
                if let Some(e) = timed_out(last_progress, timeout) {
                    return Err(e);
                }
                std::thread::sleep(poll);
            }
        }
    }
}

/// Compress `data` into one complete gzip member.
///
/// Resets the session first, so it can be called repeatedly on the same
/// session.
///
/// # Errors
///
/// Returns any error of `reset`, `set_input`, `finish` or
/// [`drain_until_finished`].
pub fn compress_all<C, W, R>(
    session: &mut CompressionSession<C, W, R>,
    data: &[u8],
    timeout: Duration,
) -> Result<Vec<u8>>
where
    C: ControlChannel + 'static,
    W: InputChannel,
    R: OutputChannel + 'static,
{
    session.reset()?;
    let mut member = Vec::new();
    let mut buf = vec![0u8; session.config().read_chunk_size];

    for chunk in data.chunks(session.config().read_chunk_size) {
        session.set_input(chunk)?;
        // Keep the output queue short while feeding.
        while !session.needs_input() {
            let n = session.compress(&mut buf)?;
            if n == 0 {
                break;
            }
            member.extend_from_slice(&buf[..n]);
        }
    }
    session.finish()?;
    drain_until_finished(session, &mut member, timeout)?;
    log::debug!(
        "compressed {} bytes into {}",
        session.bytes_read(),
        session.bytes_written()
    );
    Ok(member)
}

// ============================================================================
// Async Support
// ============================================================================

/// Async version of [`drain_until_finished`]; idles with `tokio::time::sleep`
/// instead of blocking the thread.
///
/// # Errors
///
/// Same as [`drain_until_finished`].
#[cfg(feature = "async")]
pub async fn drain_until_finished_async<C, W, R>(
    session: &CompressionSession<C, W, R>,
    out: &mut Vec<u8>,
    timeout: Duration,
) -> Result<usize>
where
    C: ControlChannel + 'static,
    W: InputChannel,
    R: OutputChannel + 'static,
{
    let start_len = out.len();
    let mut buf = vec![0u8; session.config().read_chunk_size];
    let poll = session.config().poll_interval;
    let mut last_progress = Instant::now();

    loop {
        match step(session, &mut buf, out)? {
            Step::Done => return Ok(out.len() - start_len),
            Step::Progress => last_progress = Instant::now(),
            Step::Idle => {
                if let Some(e) = timed_out(last_progress, timeout) {
                    return Err(e);
                }
                tokio::time::sleep(poll).await;
            }
        }
    }
}
