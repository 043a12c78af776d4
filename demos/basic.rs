// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Basic example: compress a buffer on the FPGA core, or on the software
//! core when no hardware is attached.
//!
//! Run with: `cargo run --example basic`

use gzip_fpga::drain::compress_all;
use gzip_fpga::{
    core_available_default, CompressionMode, CompressionSession, DevicePaths, Emulator,
    GzipFpgaError, SessionConfig,
};
use std::time::Duration;

fn run<C, W, R>(session: &mut CompressionSession<C, W, R>) -> Result<(), GzipFpgaError>
where
    C: gzip_fpga::ControlChannel + 'static,
    W: gzip_fpga::InputChannel,
    R: gzip_fpga::OutputChannel + 'static,
{
    session.with_registers(|regs| regs.dump())?;

    let test_data: Vec<u8> = b"Hello, FPGA gzip core! "
        .iter()
        .copied()
        .cycle()
        .take(64 * 1024)
        .collect();
    let member = compress_all(session, &test_data, Duration::from_secs(10))?;

    println!("  Mode: {}", session.mode());
    println!("  Bytes in:  {}", session.bytes_read());
    println!("  Bytes out: {}", session.bytes_written());
    println!(
        "  Ratio: {:.2}%",
        100.0 * member.len() as f64 / test_data.len() as f64
    );
    println!("  Header: {:02x?}", &member[..10]);

    let (crc, input_size) = session.with_registers(|regs| Ok((regs.crc()?, regs.input_size()?)))?;
    println!("  CRC register: {:#010x}", crc);
    println!("  ISIZE register: {}", input_size);

    session.end()
}

fn main() {
    println!("FPGA GZip Basic Example");
    println!("=======================\n");

    println!("Checking gzip core availability...");
    let missing = DevicePaths::default().missing().len();
    println!("  Device files missing: {}", missing);
    let hardware = core_available_default();
    println!("  Gzip core detected: {}", hardware);
    println!();

    let config = SessionConfig::new(CompressionMode::DynamicHuffman);
    let result = if hardware {
        println!("Opening hardware session...");
        CompressionSession::open(config).and_then(|mut session| run(&mut session))
    } else {
        println!("Opening software core session...");
        Emulator::new()
            .session(config)
            .and_then(|mut session| run(&mut session))
    };

    match result {
        Ok(()) => println!("\nDone!"),
        Err(e) => println!("  Compression failed: {}", e),
    }
}
