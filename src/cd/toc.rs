//! Table of Contents acquisition
//!
//! [`TocReader`] opens a device through a [`DeviceOpener`], asks it for the
//! TOC header and one entry per track plus the lead-out, and decodes the
//! replies into [`RawTocEntry`] values. The device is only held for the
//! duration of a single [`TocReader::read`] call.

use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Audio CDs run at 75 frames (sectors) per second
pub const FRAMES_PER_SECOND: u32 = 75;

/// Track number the drive uses for the lead-out area
pub const CDROM_LEADOUT: u8 = 0xAA;

/// Control-nibble bit marking a data track
pub const CDROM_DATA_TRACK: u8 = 0x04;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("Cannot open {}: {source}", path.display())]
    Unopenable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("No disc in {}: {source}", path.display())]
    NoDisc {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("TOC entry request for track {track} failed on {}: {source}", path.display())]
    ControlRequest {
        path: PathBuf,
        track: u8,
        #[source]
        source: io::Error,
    },
    #[error("CD device access is not supported on this platform")]
    Unsupported,
}

impl DeviceError {
    /// OS error code behind the failure, when there is one
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            DeviceError::Unopenable { source, .. }
            | DeviceError::NoDisc { source, .. }
            | DeviceError::ControlRequest { source, .. } => source.raw_os_error(),
            DeviceError::Unsupported => None,
        }
    }
}

/// Absolute minute:second:frame address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Msf {
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
}

impl Msf {
    pub fn new(minutes: u8, seconds: u8, frames: u8) -> Self {
        Self {
            minutes,
            seconds,
            frames,
        }
    }

    pub fn to_frames(self) -> u32 {
        (self.minutes as u32 * 60 + self.seconds as u32) * FRAMES_PER_SECOND + self.frames as u32
    }

    /// Inverse of [`Msf::to_frames`]; minutes saturate at 255
    pub fn from_frames(frames: u32) -> Self {
        let total_seconds = frames / FRAMES_PER_SECOND;
        Self {
            minutes: (total_seconds / 60).min(u8::MAX as u32) as u8,
            seconds: (total_seconds % 60) as u8,
            frames: (frames % FRAMES_PER_SECOND) as u8,
        }
    }
}

/// Decoded reply to a "read TOC entry" request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocEntryReply {
    pub track: u8,
    /// ADR in the low nibble, control in the high nibble
    pub adr_ctrl: u8,
    pub msf: Msf,
}

impl TocEntryReply {
    pub fn adr(&self) -> u8 {
        self.adr_ctrl & 0x0f
    }

    pub fn control(&self) -> u8 {
        (self.adr_ctrl & 0xf0) >> 4
    }

    pub fn is_data(&self) -> bool {
        self.control() & CDROM_DATA_TRACK != 0
    }
}

/// The two control requests a CD drive has to answer
pub trait TocDevice: Send {
    /// Returns `(first_track, last_track)`
    fn read_header(&mut self) -> io::Result<(u8, u8)>;

    /// Reads one entry addressed in MSF form; `track` may be [`CDROM_LEADOUT`]
    fn read_entry(&mut self, track: u8) -> io::Result<TocEntryReply>;
}

/// Opens [`TocDevice`]s by path (allows swapping the platform for tests)
pub trait DeviceOpener: Send + Sync {
    fn open(&self, device_path: &Path) -> Result<Box<dyn TocDevice>, DeviceError>;
}

/// Opens real block devices through the host's CD-ROM ioctls
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDevices;

impl DeviceOpener for SystemDevices {
    #[cfg(target_os = "linux")]
    fn open(&self, device_path: &Path) -> Result<Box<dyn TocDevice>, DeviceError> {
        let device = crate::cd::ffi::CdromDevice::open(device_path).map_err(|source| {
            DeviceError::Unopenable {
                path: device_path.to_path_buf(),
                source,
            }
        })?;
        Ok(Box::new(device))
    }

    #[cfg(not(target_os = "linux"))]
    fn open(&self, _device_path: &Path) -> Result<Box<dyn TocDevice>, DeviceError> {
        Err(DeviceError::Unsupported)
    }
}

/// One row of the disc's table of contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RawTocEntry {
    pub track_number: u8,
    pub absolute_frames: u32,
    pub is_data: bool,
}

impl RawTocEntry {
    pub fn is_leadout(&self) -> bool {
        self.track_number == CDROM_LEADOUT
    }

    pub fn msf(&self) -> Msf {
        Msf::from_frames(self.absolute_frames)
    }
}

impl From<TocEntryReply> for RawTocEntry {
    fn from(reply: TocEntryReply) -> Self {
        Self {
            track_number: reply.track,
            absolute_frames: reply.msf.to_frames(),
            is_data: reply.is_data(),
        }
    }
}

/// Reads raw TOC entries from a drive
#[derive(Clone)]
pub struct TocReader {
    opener: Arc<dyn DeviceOpener>,
}

impl Default for TocReader {
    fn default() -> Self {
        Self::system()
    }
}

impl TocReader {
    pub fn new(opener: Arc<dyn DeviceOpener>) -> Self {
        Self { opener }
    }

    /// Reader backed by the host's CD-ROM driver
    pub fn system() -> Self {
        Self::new(Arc::new(SystemDevices))
    }

    /// Read the TOC of the disc in `device_path`
    ///
    /// Entries come back in request order: tracks `first..=last`, then the
    /// lead-out. Nothing is reordered or deduplicated here.
    pub fn read(&self, device_path: &Path) -> Result<Vec<RawTocEntry>, DeviceError> {
        info!("Reading TOC from {}", device_path.display());
        let mut device = self.opener.open(device_path)?;
        let entries = Self::read_from(device.as_mut(), device_path)?;
        drop(device);
        Ok(entries)
    }

    /// Run the header + entry requests against an already open device
    pub fn read_from(
        device: &mut dyn TocDevice,
        device_path: &Path,
    ) -> Result<Vec<RawTocEntry>, DeviceError> {
        let (first, last) = device.read_header().map_err(|source| DeviceError::NoDisc {
            path: device_path.to_path_buf(),
            source,
        })?;
        debug!("TOC header: first track {}, last track {}", first, last);

        let requests = (first..=last).chain(std::iter::once(CDROM_LEADOUT));
        let mut entries = Vec::with_capacity(last.saturating_sub(first) as usize + 2);

        for track in requests {
            let reply = device
                .read_entry(track)
                .map_err(|source| DeviceError::ControlRequest {
                    path: device_path.to_path_buf(),
                    track,
                    source,
                })?;
            let entry = RawTocEntry::from(reply);
            debug!(
                "TOC entry {:#04x}: adr {} ctrl {:#x} msf {:02}:{:02}:{:02} -> {} frames{}",
                entry.track_number,
                reply.adr(),
                reply.control(),
                reply.msf.minutes,
                reply.msf.seconds,
                reply.msf.frames,
                entry.absolute_frames,
                if entry.is_data { " (data)" } else { "" }
            );
            entries.push(entry);
        }

        info!(
            "Read {} TOC entries from {}",
            entries.len(),
            device_path.display()
        );
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDrives, FakeTocDevice, NO_MEDIUM};

    #[test]
    fn test_msf_to_frames() {
        assert_eq!(Msf::new(0, 2, 0).to_frames(), 150);
        assert_eq!(Msf::new(1, 0, 0).to_frames(), 4500);
        assert_eq!(Msf::new(3, 25, 74).to_frames(), (3 * 60 + 25) * 75 + 74);
    }

    #[test]
    fn test_msf_from_frames() {
        assert_eq!(Msf::from_frames(150), Msf::new(0, 2, 0));
        assert_eq!(Msf::from_frames(4574), Msf::new(1, 0, 74));
    }

    #[test]
    fn test_control_nibble_decoding() {
        let audio = TocEntryReply {
            track: 1,
            adr_ctrl: 0x01,
            msf: Msf::default(),
        };
        assert_eq!(audio.adr(), 1);
        assert_eq!(audio.control(), 0);
        assert!(!audio.is_data());

        let data = TocEntryReply {
            track: 2,
            adr_ctrl: 0x41,
            msf: Msf::default(),
        };
        assert_eq!(data.control(), 0x4);
        assert!(data.is_data());

        // Pre-emphasis / copy bits alone don't make a data track
        let emphasized = TocEntryReply {
            track: 3,
            adr_ctrl: 0x31,
            msf: Msf::default(),
        };
        assert!(!emphasized.is_data());
    }

    #[test]
    fn test_read_returns_tracks_then_leadout() {
        let mut device = FakeTocDevice::from_frames(&[(1, 150, false), (2, 1650, false)], 3525);
        let entries = TocReader::read_from(&mut device, Path::new("/dev/fake")).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].track_number, 1);
        assert_eq!(entries[0].absolute_frames, 150);
        assert_eq!(entries[1].absolute_frames, 1650);
        assert!(entries[2].is_leadout());
        assert_eq!(entries[2].absolute_frames, 3525);
    }

    #[test]
    fn test_read_flags_data_tracks() {
        let mut device = FakeTocDevice::from_frames(&[(1, 150, false), (2, 9000, true)], 20000);
        let entries = TocReader::read_from(&mut device, Path::new("/dev/fake")).unwrap();
        assert!(!entries[0].is_data);
        assert!(entries[1].is_data);
    }

    #[test]
    fn test_read_passes_out_of_order_replies_through() {
        let mut device = FakeTocDevice::from_frames(&[(1, 5000, false), (2, 150, false)], 9000);
        let entries = TocReader::read_from(&mut device, Path::new("/dev/fake")).unwrap();
        assert_eq!(
            entries.iter().map(|e| e.absolute_frames).collect::<Vec<_>>(),
            vec![5000, 150, 9000]
        );
    }

    #[test]
    fn test_header_failure_is_no_disc() {
        let mut device = FakeTocDevice::empty_tray();
        let err = TocReader::read_from(&mut device, Path::new("/dev/fake")).unwrap_err();
        assert!(matches!(err, DeviceError::NoDisc { .. }));
        assert_eq!(err.raw_os_error(), Some(NO_MEDIUM));
    }

    #[test]
    fn test_entry_failure_is_control_request_error() {
        let mut device = FakeTocDevice::from_frames(&[(1, 150, false), (2, 1650, false)], 3525)
            .failing_entry(2);
        let err = TocReader::read_from(&mut device, Path::new("/dev/fake")).unwrap_err();
        match err {
            DeviceError::ControlRequest { track, .. } => assert_eq!(track, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_path_is_unopenable() {
        let reader = TocReader::new(Arc::new(FakeDrives::new()));
        let err = reader.read(Path::new("/dev/nothing")).unwrap_err();
        assert!(matches!(err, DeviceError::Unopenable { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_system_reader_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = TocReader::system()
            .read(&dir.path().join("no-such-drive"))
            .unwrap_err();
        assert!(matches!(err, DeviceError::Unopenable { .. }));
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_system_reader_on_regular_file_is_no_disc() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = TocReader::system().read(file.path()).unwrap_err();
        assert!(matches!(err, DeviceError::NoDisc { .. }));
    }
}
