// Test support utilities for both unit and integration tests

use crate::cd::{DeviceError, DeviceOpener, DiscIdentity, Msf, TocDevice, TocEntryReply, CDROM_LEADOUT};
use crate::cddb::{CddbRecord, DiscLookup, LookupError, QueryMatch};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Error code a drive reports when its tray is empty
#[cfg(target_os = "linux")]
pub const NO_MEDIUM: i32 = libc::ENOMEDIUM;
#[cfg(not(target_os = "linux"))]
pub const NO_MEDIUM: i32 = libc::ENXIO;

/// In-memory drive answering TOC requests from a fixed table
#[derive(Debug, Clone)]
pub struct FakeTocDevice {
    header: Result<(u8, u8), i32>,
    entries: HashMap<u8, TocEntryReply>,
    failing_entry: Option<u8>,
}

impl FakeTocDevice {
    /// `tracks` are `(track_number, absolute_frames, is_data)` in TOC order
    pub fn from_frames(tracks: &[(u8, u32, bool)], leadout_frames: u32) -> Self {
        let mut entries: HashMap<u8, TocEntryReply> = tracks
            .iter()
            .map(|&(track, frames, is_data)| {
                let reply = TocEntryReply {
                    track,
                    adr_ctrl: if is_data { 0x41 } else { 0x01 },
                    msf: Msf::from_frames(frames),
                };
                (track, reply)
            })
            .collect();
        entries.insert(
            CDROM_LEADOUT,
            TocEntryReply {
                track: CDROM_LEADOUT,
                adr_ctrl: 0x01,
                msf: Msf::from_frames(leadout_frames),
            },
        );

        let first = tracks.first().map(|t| t.0).unwrap_or(1);
        let last = tracks.last().map(|t| t.0).unwrap_or(0);
        Self {
            header: Ok((first, last)),
            entries,
            failing_entry: None,
        }
    }

    /// A drive with nothing in it
    pub fn empty_tray() -> Self {
        Self {
            header: Err(NO_MEDIUM),
            entries: HashMap::new(),
            failing_entry: None,
        }
    }

    /// Make the entry request for `track` fail
    pub fn failing_entry(mut self, track: u8) -> Self {
        self.failing_entry = Some(track);
        self
    }
}

impl TocDevice for FakeTocDevice {
    fn read_header(&mut self) -> io::Result<(u8, u8)> {
        self.header.map_err(io::Error::from_raw_os_error)
    }

    fn read_entry(&mut self, track: u8) -> io::Result<TocEntryReply> {
        if self.failing_entry == Some(track) {
            return Err(io::Error::from_raw_os_error(libc::EIO));
        }
        self.entries
            .get(&track)
            .copied()
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))
    }
}

/// Set of fake drives keyed by device path
#[derive(Default)]
pub struct FakeDrives {
    drives: Mutex<HashMap<PathBuf, FakeTocDevice>>,
}

impl FakeDrives {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_disc(self, device_path: impl AsRef<Path>, device: FakeTocDevice) -> Self {
        self.insert(device_path, device);
        self
    }

    pub fn insert(&self, device_path: impl AsRef<Path>, device: FakeTocDevice) {
        self.drives
            .lock()
            .unwrap()
            .insert(device_path.as_ref().to_path_buf(), device);
    }

    /// Empty the tray; the drive itself stays present
    pub fn eject(&self, device_path: impl AsRef<Path>) {
        self.insert(device_path, FakeTocDevice::empty_tray());
    }
}

impl DeviceOpener for FakeDrives {
    fn open(&self, device_path: &Path) -> Result<Box<dyn TocDevice>, DeviceError> {
        let drives = self.drives.lock().unwrap();
        match drives.get(device_path) {
            Some(device) => Ok(Box::new(device.clone())),
            None => Err(DeviceError::Unopenable {
                path: device_path.to_path_buf(),
                source: io::Error::from_raw_os_error(libc::ENOENT),
            }),
        }
    }
}

#[derive(Debug, Clone)]
enum MockOutcome {
    Record(String),
    Status(u16, String),
    NoMatch,
}

/// Lookup service answering every disc with the same canned outcome
///
/// No network access; counts `query` calls so tests can tell whether a
/// lookup was attempted at all.
#[derive(Debug, Clone)]
pub struct MockLookup {
    outcome: MockOutcome,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl MockLookup {
    fn with_outcome(outcome: MockOutcome) -> Self {
        Self {
            outcome,
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Answer with an xmcd record body
    pub fn with_record(record: &str) -> Self {
        Self::with_outcome(MockOutcome::Record(record.to_string()))
    }

    pub fn failing_with_status(code: u16, message: &str) -> Self {
        Self::with_outcome(MockOutcome::Status(code, message.to_string()))
    }

    pub fn no_match() -> Self {
        Self::with_outcome(MockOutcome::NoMatch)
    }

    /// Hold every query for `delay` before answering
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait::async_trait]
impl DiscLookup for MockLookup {
    async fn query(&self, disc: &DiscIdentity) -> Result<QueryMatch, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            MockOutcome::Record(_) => Ok(QueryMatch {
                category: "misc".to_string(),
                disc_id: disc.hex(),
                title: String::new(),
            }),
            MockOutcome::Status(code, message) => Err(LookupError::Status {
                code: *code,
                message: message.clone(),
            }),
            MockOutcome::NoMatch => Err(LookupError::NoMatch(disc.hex())),
        }
    }

    async fn read(&self, _category: &str, disc_id: &str) -> Result<CddbRecord, LookupError> {
        match &self.outcome {
            MockOutcome::Record(body) => Ok(CddbRecord::parse(body)),
            _ => Err(LookupError::NoMatch(disc_id.to_string())),
        }
    }
}
