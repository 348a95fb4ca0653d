//! Raw CD-ROM ioctl bindings
//!
//! Mirrors the `cdrom_tochdr` / `cdrom_tocentry` layouts from
//! `<linux/cdrom.h>` and issues `CDROMREADTOCHDR` / `CDROMREADTOCENTRY`
//! through `libc::ioctl`. Only Linux is wired up; other targets get
//! [`DeviceError::Unsupported`](crate::cd::DeviceError::Unsupported) from the
//! opener in `toc.rs`.

use crate::cd::toc::{Msf, TocDevice, TocEntryReply};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CDROMREADTOCHDR: u32 = 0x5305;
pub const CDROMREADTOCENTRY: u32 = 0x5306;
pub const CDROM_MSF: u8 = 0x02;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct CdromTocHdr {
    cdth_trk0: u8,
    cdth_trk1: u8,
}

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
struct CdromMsf0 {
    minute: u8,
    second: u8,
    frame: u8,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
union CdromAddr {
    msf: CdromMsf0,
    lba: libc::c_int,
}

/// `cdte_adr:4` / `cdte_ctrl:4` share one byte: ADR in the low nibble,
/// control in the high nibble.
#[repr(C)]
#[derive(Clone, Copy)]
#[allow(dead_code)]
struct CdromTocEntry {
    cdte_track: u8,
    cdte_adr_ctrl: u8,
    cdte_format: u8,
    cdte_addr: CdromAddr,
    cdte_datamode: u8,
}

/// An open CD-ROM block device
///
/// The descriptor is closed when this value is dropped.
pub struct CdromDevice {
    file: File,
    device_path: PathBuf,
}

impl CdromDevice {
    /// Open a CD-ROM device read-only
    ///
    /// `O_NONBLOCK` lets the open succeed on an empty tray so the TOC
    /// request can report the missing disc instead.
    pub fn open(device_path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(device_path)?;

        debug!("Opened CD device {}", device_path.display());

        Ok(Self {
            file,
            device_path: device_path.to_path_buf(),
        })
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }
}

impl TocDevice for CdromDevice {
    fn read_header(&mut self) -> io::Result<(u8, u8)> {
        let mut header = CdromTocHdr::default();
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                CDROMREADTOCHDR as _,
                &mut header as *mut CdromTocHdr,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((header.cdth_trk0, header.cdth_trk1))
    }

    fn read_entry(&mut self, track: u8) -> io::Result<TocEntryReply> {
        let mut entry = CdromTocEntry {
            cdte_track: track,
            cdte_adr_ctrl: 0,
            cdte_format: CDROM_MSF,
            cdte_addr: CdromAddr { lba: 0 },
            cdte_datamode: 0,
        };
        let rc = unsafe {
            libc::ioctl(
                self.file.as_raw_fd(),
                CDROMREADTOCENTRY as _,
                &mut entry as *mut CdromTocEntry,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        // We asked for CDROM_MSF, so the kernel filled the msf arm.
        let msf = unsafe { entry.cdte_addr.msf };

        Ok(TocEntryReply {
            track: entry.cdte_track,
            adr_ctrl: entry.cdte_adr_ctrl,
            msf: Msf {
                minutes: msf.minute,
                seconds: msf.second,
                frames: msf.frame,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_layouts_match_kernel_abi() {
        assert_eq!(std::mem::size_of::<CdromTocHdr>(), 2);
        assert_eq!(std::mem::size_of::<CdromAddr>(), 4);
        // track, adr/ctrl, format, pad, addr(4), datamode, pad(3)
        assert_eq!(std::mem::size_of::<CdromTocEntry>(), 12);
        assert_eq!(std::mem::align_of::<CdromTocEntry>(), 4);
    }

    #[test]
    fn test_open_missing_device_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("sr9");
        let err = CdromDevice::open(&missing).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_ioctl_on_regular_file_fails() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut device = CdromDevice::open(file.path()).unwrap();
        assert!(device.read_header().is_err());
    }
}
