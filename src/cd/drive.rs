//! CD drive detection and TOC reading

use crate::cd::toc::{DeviceError, RawTocEntry, TocReader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Device nodes probed by [`CdDrive::detect_drives`]
#[cfg(unix)]
const COMMON_DEVICE_PATHS: &[&str] = &[
    "/dev/cdrom",
    "/dev/sr0",
    "/dev/sr1",
    "/dev/cdrom0",
    "/dev/cdrom1",
];

/// Represents a CD drive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdDrive {
    pub device_path: PathBuf,
    pub name: String,
}

impl CdDrive {
    pub fn new(device_path: impl Into<PathBuf>) -> Self {
        let device_path = device_path.into();
        let name = device_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| device_path.display().to_string());
        Self { device_path, name }
    }

    /// Detect available CD drives
    ///
    /// Only checks that the device node exists; a drive with an empty tray
    /// is still a drive.
    pub fn detect_drives() -> Vec<CdDrive> {
        #[cfg(unix)]
        {
            Self::detect_in(COMMON_DEVICE_PATHS.iter().map(Path::new))
        }

        #[cfg(not(unix))]
        {
            Vec::new()
        }
    }

    fn detect_in<'a>(candidates: impl IntoIterator<Item = &'a Path>) -> Vec<CdDrive> {
        let mut drives: Vec<CdDrive> = Vec::new();
        for path in candidates {
            if !path.exists() {
                continue;
            }
            // /dev/cdrom is usually a symlink to one of the srN nodes
            let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            if drives
                .iter()
                .any(|d| d.device_path.canonicalize().ok().as_ref() == Some(&resolved))
            {
                debug!("Skipping {} (alias of a detected drive)", path.display());
                continue;
            }
            drives.push(CdDrive::new(path));
        }
        drives
    }

    /// Read TOC from the disc in this drive
    pub fn read_toc(&self, reader: &TocReader) -> Result<Vec<RawTocEntry>, DeviceError> {
        reader.read(&self.device_path)
    }

    /// Check if a disc is present in the drive
    pub fn has_disc(&self, reader: &TocReader) -> Result<bool, DeviceError> {
        match self.read_toc(reader) {
            Ok(_) => Ok(true),
            Err(DeviceError::NoDisc { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
