// FPGA GZip Accelerator Rust Bindings
// Copyright 2025 Henk-Jan Lebbink
// SPDX-License-Identifier: MIT

//! Device files and core discovery.
//!
//! The core is reached through three Xillybus device nodes:
//! - `/dev/xillybus_write_32` - framed input towards the core
//! - `/dev/xillybus_read_32` - compressed output from the core
//! - `/dev/xillybus_mem_8` - the 32-byte register file
//!
//! [`core_available`] checks that all three exist and that the register file
//! reports a gzip core. It never fails; every problem downgrades to `false`.

use crate::error::{GzipFpgaError, Result};
use crate::registers::RegisterFile;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default input pipe.
pub const DEFAULT_WRITE_PIPE: &str = "/dev/xillybus_write_32";

/// Default output pipe.
pub const DEFAULT_READ_PIPE: &str = "/dev/xillybus_read_32";

/// Default register file.
pub const DEFAULT_REGISTER_FILE: &str = "/dev/xillybus_mem_8";

/// Lowest DEVICE-ID of the gzip core family. Newer revisions report
/// larger values.
pub const GZIP_CORE_DEVICE_ID: u8 = 0xBC;

/// Locations of the three device files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DevicePaths {
    /// Input pipe (host to core).
    pub write_pipe: PathBuf,
    /// Output pipe (core to host).
    pub read_pipe: PathBuf,
    /// Register file.
    pub register_file: PathBuf,
}

impl Default for DevicePaths {
    fn default() -> Self {
        Self {
            write_pipe: PathBuf::from(DEFAULT_WRITE_PIPE),
            read_pipe: PathBuf::from(DEFAULT_READ_PIPE),
            register_file: PathBuf::from(DEFAULT_REGISTER_FILE),
        }
    }
}

impl DevicePaths {
    /// All three files under `dir`, using the default file names.
    pub fn in_dir(dir: &Path) -> Self {
        let name = |p: &str| dir.join(Path::new(p).file_name().unwrap_or_default());
        Self {
            write_pipe: name(DEFAULT_WRITE_PIPE),
            read_pipe: name(DEFAULT_READ_PIPE),
            register_file: name(DEFAULT_REGISTER_FILE),
        }
    }

    /// Paths that do not exist.
    pub fn missing(&self) -> Vec<&Path> {
        [&self.write_pipe, &self.read_pipe, &self.register_file]
            .into_iter()
            .map(PathBuf::as_path)
            .filter(|p| !p.exists())
            .collect()
    }

    /// Open all three devices.
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` naming the first file that fails to open.
    pub fn open(&self) -> Result<(RegisterFile<File>, File, File)> {
        let input = File::options()
            .write(true)
            .open(&self.write_pipe)
            .map_err(|e| GzipFpgaError::unavailable(&self.write_pipe, e))?;
        let output = File::open(&self.read_pipe)
            .map_err(|e| GzipFpgaError::unavailable(&self.read_pipe, e))?;
        let registers = RegisterFile::open(&self.register_file)?;
        Ok((registers, input, output))
    }
}

/// Framed input channel towards the core.
pub trait InputChannel: Write + Send {}

impl<T: Write + Send> InputChannel for T {}

/// Compressed output channel from the core.
///
/// `read` follows pipe semantics: it returns at least one byte, or 0 when
/// nothing is left. [`wait_readable`](Self::wait_readable) bounds how long the
/// background reader can sit in the device so cancellation is observed.
pub trait OutputChannel: Read + Send {
    /// Wait up to `timeout` for data. Returns `Ok(false)` on timeout.
    fn wait_readable(&mut self, timeout: Duration) -> std::io::Result<bool>;
}

// ============================================================================
// Linux Implementation
// ============================================================================

#[cfg(target_os = "linux")]
mod linux_impl {
    use super::*;
    use std::os::unix::io::AsRawFd;

    pub fn wait_readable(file: &File, timeout: Duration) -> std::io::Result<bool> {
        let mut fds = libc::pollfd {
            fd: file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

        // SAFETY: `fds` is a single valid pollfd for the duration of the call.
        let rc = unsafe { libc::poll(&mut fds, 1, millis) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        // POLLHUP/POLLERR also count: the following read reports EOF or the error.
        Ok(rc > 0 && fds.revents != 0)
    }
}

// ============================================================================
// Other Platforms
// ============================================================================

#[cfg(not(target_os = "linux"))]
mod stub_impl {
    use super::*;

    /// Without poll support the read itself blocks; report readable.
    pub fn wait_readable(_file: &File, _timeout: Duration) -> std::io::Result<bool> {
        Ok(true)
    }
}

impl OutputChannel for File {
    fn wait_readable(&mut self, timeout: Duration) -> std::io::Result<bool> {
        #[cfg(target_os = "linux")]
        {
            linux_impl::wait_readable(self, timeout)
        }
        #[cfg(not(target_os = "linux"))]
        {
            stub_impl::wait_readable(self, timeout)
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Read DEVICE-ID from the register file at `path`.
///
/// # Errors
///
/// Returns `DeviceUnavailable` if the file cannot be opened, or `IoFailure`
/// if the register space cannot be read.
pub fn probe_device_id(path: &Path) -> Result<u8> {
    let file = File::open(path).map_err(|e| GzipFpgaError::unavailable(path, e))?;
    let mut registers = RegisterFile::new(ReadOnly(file))?;
    registers.device_id()
}

/// Check whether a gzip core is attached at `paths`.
pub fn core_available(paths: &DevicePaths) -> bool {
    let missing = paths.missing();
    if !missing.is_empty() {
        log::info!("device files missing ({:?}) => no gzip core", missing);
        return false;
    }

    log::info!("device files exist, checking DEVICE_ID...");
    match probe_device_id(&paths.register_file) {
        Ok(id) => {
            log::info!("device ID read: {:#04x}", id);
            id >= GZIP_CORE_DEVICE_ID
        }
        Err(e) => {
            log::error!("unable to read from gzip core devices: {}", e);
            false
        }
    }
}

/// Check the default device paths for a gzip core.
pub fn core_available_default() -> bool {
    core_available(&DevicePaths::default())
}

/// Read-only view of a register file; writes are rejected.
struct ReadOnly(File);

impl Read for ReadOnly {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for ReadOnly {
    fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "register file opened read-only",
        ))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl std::io::Seek for ReadOnly {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        self.0.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Channel;
    use crate::registers::{offset, REGISTER_FILE_SIZE};
    use tempfile::TempDir;

    fn fake_devices(dir: &TempDir, device_id: u8, register_len: usize) -> DevicePaths {
        let paths = DevicePaths::in_dir(dir.path());
        std::fs::write(&paths.write_pipe, b"").unwrap();
        std::fs::write(&paths.read_pipe, b"").unwrap();
        let mut space = vec![0u8; register_len];
        if register_len > offset::DEVICE_ID {
            space[offset::DEVICE_ID] = device_id;
        }
        std::fs::write(&paths.register_file, space).unwrap();
        paths
    }

    #[test]
    fn test_default_paths() {
        let paths = DevicePaths::default();
        assert_eq!(paths.write_pipe, PathBuf::from("/dev/xillybus_write_32"));
        assert_eq!(paths.read_pipe, PathBuf::from("/dev/xillybus_read_32"));
        assert_eq!(paths.register_file, PathBuf::from("/dev/xillybus_mem_8"));
    }

    #[test]
    fn test_core_available_does_not_panic() {
        // Passes with or without hardware attached.
        let _ = core_available_default();
    }

    #[test]
    fn test_missing_files_mean_no_core() {
        let dir = TempDir::new().unwrap();
        let paths = DevicePaths::in_dir(dir.path());
        assert_eq!(paths.missing().len(), 3);
        assert!(!core_available(&paths));
    }

    #[test]
    fn test_gzip_core_id_threshold() {
        let dir = TempDir::new().unwrap();
        let paths = fake_devices(&dir, GZIP_CORE_DEVICE_ID, REGISTER_FILE_SIZE);
        assert!(paths.missing().is_empty());
        assert!(core_available(&paths));

        let dir = TempDir::new().unwrap();
        let paths = fake_devices(&dir, 0xC0, REGISTER_FILE_SIZE);
        assert!(core_available(&paths), "newer revisions are accepted");

        let dir = TempDir::new().unwrap();
        let paths = fake_devices(&dir, 0x04, REGISTER_FILE_SIZE);
        assert!(!core_available(&paths));
    }

    #[test]
    fn test_unreadable_register_file_means_no_core() {
        let dir = TempDir::new().unwrap();
        let paths = fake_devices(&dir, GZIP_CORE_DEVICE_ID, 4);
        assert!(probe_device_id(&paths.register_file).is_err());
        assert!(!core_available(&paths));
    }

    #[test]
    fn test_open_reports_missing_device() {
        let dir = TempDir::new().unwrap();
        let paths = DevicePaths::in_dir(dir.path());
        match paths.open() {
            Err(GzipFpgaError::DeviceUnavailable { path, .. }) => {
                assert_eq!(path, paths.write_pipe);
            }
            Err(e) => panic!("unexpected error: {}", e),
            Ok(_) => panic!("open should fail without device files"),
        }
    }

    #[test]
    fn test_regular_file_is_readable() {
        let dir = TempDir::new().unwrap();
        let paths = fake_devices(&dir, GZIP_CORE_DEVICE_ID, REGISTER_FILE_SIZE);
        let mut file = File::open(&paths.register_file).unwrap();
        assert!(file.wait_readable(Duration::from_millis(1)).unwrap());
    }

    #[test]
    fn test_probe_reports_channel_on_short_file() {
        let dir = TempDir::new().unwrap();
        let paths = fake_devices(&dir, 0, 2);
        assert!(matches!(
            probe_device_id(&paths.register_file),
            Err(GzipFpgaError::IoFailure {
                channel: Channel::Control,
                ..
            })
        ));
    }
}
