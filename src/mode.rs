// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Compression modes understood by the core.
//!
//! The mode code lives in the MODE register and maps directly onto the
//! deflate `BTYPE` field the core writes into every block header.

/// Compression mode of the gzip core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionMode {
    /// Stored blocks, no compression.
    NoCompression = 0x00,

    /// Fixed Huffman codes.
    FixedHuffman = 0x01,

    /// Dynamic Huffman codes.
    #[default]
    DynamicHuffman = 0x02,

    /// Sentinel for an unrecognised register value. Never settable.
    Error = 0x03,
}

impl CompressionMode {
    /// Returns the register code for this mode.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode a MODE register value. Unknown values map to `Error`.
    pub const fn from_register(value: u8) -> Self {
        match value {
            0x00 => Self::NoCompression,
            0x01 => Self::FixedHuffman,
            0x02 => Self::DynamicHuffman,
            _ => Self::Error,
        }
    }

    /// Returns true if the mode may be written to the MODE register.
    pub const fn is_settable(self) -> bool {
        !matches!(self, Self::Error)
    }

    /// Returns a human-readable name for the mode.
    pub const fn name(self) -> &'static str {
        match self {
            Self::NoCompression => "NO_COMPRESSION",
            Self::FixedHuffman => "FIXED_HUFFMAN",
            Self::DynamicHuffman => "DYNAMIC_HUFFMAN",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for CompressionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:#04x})", self.name(), self.as_u8())
    }
}
