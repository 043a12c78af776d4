// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Gzip member envelope around the core's deflate output.
//!
//! The core emits raw deflate blocks. The host prepends the fixed member
//! header and, depending on [`TrailerPolicy`], either forwards the trailer the
//! core produced or builds one from the CRC and INPUT-SIZE registers.

/// Fixed gzip member header: magic, CM = deflate, no flags, zero mtime,
/// no extra flags, OS = FAT.
pub const GZIP_HEADER: [u8; 10] = [0x1F, 0x8B, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Length of the gzip member trailer.
pub const GZIP_TRAILER_LEN: usize = 8;

/// Where the gzip trailer comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrailerPolicy {
    /// The core's output already ends with CRC-32 and ISIZE.
    #[default]
    Passthrough,
    /// The core emits only deflate data; append the trailer from registers.
    FromRegisters,
}

/// Build the member trailer: CRC-32 then input size, both little-endian.
pub fn trailer(crc: u32, input_size: u32) -> [u8; GZIP_TRAILER_LEN] {
    let mut out = [0u8; GZIP_TRAILER_LEN];
    out[..4].copy_from_slice(&crc.to_le_bytes());
    out[4..].copy_from_slice(&input_size.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_header_is_valid_gzip_start() {
        assert_eq!(&GZIP_HEADER[..3], &[0x1F, 0x8B, 0x08]);
        assert!(GZIP_HEADER[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_trailer_layout() {
        assert_eq!(
            trailer(0xDEAD_BEEF, 0x0102_0304),
            [0xEF, 0xBE, 0xAD, 0xDE, 0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn test_envelope_decodes_with_standard_decoder() {
        // Final stored block with zero length.
        let deflate = [0x01, 0x00, 0x00, 0xFF, 0xFF];
        let mut member = GZIP_HEADER.to_vec();
        member.extend_from_slice(&deflate);
        member.extend_from_slice(&trailer(crc32fast::hash(b""), 0));

        let mut out = Vec::new();
        GzDecoder::new(&member[..]).read_to_end(&mut out).unwrap();
        assert!(out.is_empty());
    }
}
