// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Block framing for the core's input pipe.
//!
//! Input reaches the core as a sequence of frames, each a 4-byte big-endian
//! prefix followed by the payload:
//!
//! | Bits | Meaning |
//! |------|---------|
//! | 31:24 | flags, `0x01` = end of stream |
//! | 23:0 | payload length in bytes, at most [`MAX_BLOCK_SIZE`] |
//!
//! The last frame of a stream carries the end-of-stream flag and may be empty.

use crate::error::{GzipFpgaError, Result};
use std::io::Write;

/// Largest payload a single frame may carry.
pub const MAX_BLOCK_SIZE: usize = 65535;

/// Size of the length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// End-of-stream flag in the prefix.
pub const END_OF_STREAM: u32 = 0x0100_0000;

const LENGTH_MASK: u32 = 0x00FF_FFFF;

/// Decoded frame prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length in bytes.
    pub len: usize,
    /// Set on the final frame of a stream.
    pub end_of_stream: bool,
}

impl FrameHeader {
    /// Build a header, enforcing the block size limit.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if `len` exceeds [`MAX_BLOCK_SIZE`].
    pub fn new(len: usize, end_of_stream: bool) -> Result<Self> {
        if len > MAX_BLOCK_SIZE {
            return Err(GzipFpgaError::ProtocolViolation(format!(
                "frame payload of {} bytes exceeds block size {}",
                len, MAX_BLOCK_SIZE
            )));
        }
        Ok(Self { len, end_of_stream })
    }

    /// Encode as the on-wire prefix.
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut word = self.len as u32;
        if self.end_of_stream {
            word |= END_OF_STREAM;
        }
        word.to_be_bytes()
    }

    /// Decode an on-wire prefix.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolViolation` if the length field exceeds the block size.
    pub fn parse(bytes: [u8; FRAME_HEADER_LEN]) -> Result<Self> {
        let word = u32::from_be_bytes(bytes);
        Self::new(
            (word & LENGTH_MASK) as usize,
            word & END_OF_STREAM != 0,
        )
    }
}

/// A prefix plus the payload it describes.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub header: FrameHeader,
    pub payload: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Build a frame over `payload`.
    pub fn new(payload: &'a [u8], end_of_stream: bool) -> Result<Self> {
        Ok(Self {
            header: FrameHeader::new(payload.len(), end_of_stream)?,
            payload,
        })
    }

    /// Write prefix and payload to `sink` and flush it.
    pub fn write_to<W: Write>(&self, sink: &mut W) -> std::io::Result<()> {
        sink.write_all(&self.header.encode())?;
        sink.write_all(self.payload)?;
        sink.flush()
    }
}

/// Accumulates caller input into device-sized blocks.
///
/// Bytes collect until the next chunk would overflow the block, at which
/// point the block is topped up to exactly [`MAX_BLOCK_SIZE`] and emitted.
/// [`finish`](Self::finish) emits whatever remains, possibly nothing, as the
/// end-of-stream frame.
#[derive(Debug)]
pub struct FrameAccumulator {
    block: Vec<u8>,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self {
            block: Vec::with_capacity(MAX_BLOCK_SIZE),
        }
    }

    /// Bytes waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.block.len()
    }

    /// Drop any pending bytes.
    pub fn clear(&mut self) {
        self.block.clear();
    }

    /// Append `data`, calling `emit` for every full block.
    ///
    /// Returns the number of frames emitted. On an `emit` failure the
    /// offending block is discarded.
    pub fn push<F>(&mut self, mut data: &[u8], mut emit: F) -> Result<usize>
    where
        F: FnMut(Frame<'_>) -> Result<()>,
    {
        let mut frames = 0;
        while !data.is_empty() {
            if self.block.len() + data.len() <= MAX_BLOCK_SIZE {
                self.block.extend_from_slice(data);
                break;
            }

            let (head, rest) = data.split_at(MAX_BLOCK_SIZE - self.block.len());
            self.block.extend_from_slice(head);
            data = rest;

            let result = Frame::new(&self.block, false).and_then(&mut emit);
            self.block.clear();
            result?;
            frames += 1;
        }
        Ok(frames)
    }

    /// Emit the pending bytes as the end-of-stream frame.
    pub fn finish<F>(&mut self, mut emit: F) -> Result<()>
    where
        F: FnMut(Frame<'_>) -> Result<()>,
    {
        let result = Frame::new(&self.block, true).and_then(&mut emit);
        self.block.clear();
        result
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collect(acc: &mut FrameAccumulator, data: &[u8], out: &mut Vec<FrameHeader>) -> usize {
        acc.push(data, |frame| {
            out.push(frame.header);
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn test_header_encoding() {
        let header = FrameHeader::new(0x1234, false).unwrap();
        assert_eq!(header.encode(), [0x00, 0x00, 0x12, 0x34]);

        let last = FrameHeader::new(0, true).unwrap();
        assert_eq!(last.encode(), [0x01, 0x00, 0x00, 0x00]);

        let full = FrameHeader::new(MAX_BLOCK_SIZE, true).unwrap();
        assert_eq!(full.encode(), [0x01, 0x00, 0xFF, 0xFF]);
        assert_eq!(FrameHeader::parse(full.encode()).unwrap(), full);
    }

    #[test]
    fn test_oversized_frame_is_protocol_violation() {
        let big = vec![0u8; MAX_BLOCK_SIZE + 1];
        assert!(matches!(
            Frame::new(&big, false),
            Err(GzipFpgaError::ProtocolViolation(_))
        ));
        assert!(FrameHeader::parse([0x00, 0x01, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_small_input_accumulates() {
        let mut acc = FrameAccumulator::new();
        let mut frames = Vec::new();
        assert_eq!(collect(&mut acc, &[7u8; 1000], &mut frames), 0);
        assert_eq!(collect(&mut acc, &[7u8; 1000], &mut frames), 0);
        assert!(frames.is_empty());
        assert_eq!(acc.pending(), 2000);
    }

    #[test]
    fn test_exact_block_waits_for_finish() {
        let mut acc = FrameAccumulator::new();
        let mut frames = Vec::new();
        collect(&mut acc, &vec![1u8; MAX_BLOCK_SIZE], &mut frames);
        assert!(frames.is_empty());
        assert_eq!(acc.pending(), MAX_BLOCK_SIZE);

        acc.finish(|frame| {
            frames.push(frame.header);
            Ok(())
        })
        .unwrap();
        assert_eq!(frames, vec![FrameHeader::new(MAX_BLOCK_SIZE, true).unwrap()]);
    }

    #[test]
    fn test_overflow_tops_up_block() {
        let mut acc = FrameAccumulator::new();
        let mut frames = Vec::new();
        collect(&mut acc, &[0u8; 60_000], &mut frames);
        let emitted = collect(&mut acc, &[0u8; 10_000], &mut frames);
        assert_eq!(emitted, 1);
        assert_eq!(frames[0].len, MAX_BLOCK_SIZE);
        assert!(!frames[0].end_of_stream);
        assert_eq!(acc.pending(), 70_000 - MAX_BLOCK_SIZE);
    }

    #[test]
    fn test_empty_final_frame_is_sent() {
        let mut acc = FrameAccumulator::new();
        let mut wire = Vec::new();
        acc.finish(|frame| {
            frame.write_to(&mut wire).unwrap();
            Ok(())
        })
        .unwrap();
        assert_eq!(wire, vec![0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_failed_emit_discards_block() {
        let mut acc = FrameAccumulator::new();
        let result = acc.push(&vec![0u8; MAX_BLOCK_SIZE + 5], |_| {
            Err(GzipFpgaError::InvalidState("sink closed"))
        });
        assert!(result.is_err());
        assert_eq!(acc.pending(), 0);
    }

    proptest! {
        #[test]
        fn prop_frames_respect_block_size(chunks in prop::collection::vec(0usize..150_000, 0..6)) {
            let mut acc = FrameAccumulator::new();
            let mut frames = Vec::new();
            let mut payload_total = 0usize;
            for len in &chunks {
                acc.push(&vec![0xA5u8; *len], |frame| {
                    payload_total += frame.payload.len();
                    frames.push(frame.header);
                    Ok(())
                }).unwrap();
            }
            acc.finish(|frame| {
                payload_total += frame.payload.len();
                frames.push(frame.header);
                Ok(())
            }).unwrap();

            prop_assert_eq!(payload_total, chunks.iter().sum::<usize>());
            prop_assert!(frames.iter().all(|h| h.len <= MAX_BLOCK_SIZE));
            prop_assert_eq!(frames.iter().filter(|h| h.end_of_stream).count(), 1);
            prop_assert!(frames.last().unwrap().end_of_stream);
        }
    }
}
