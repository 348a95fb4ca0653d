#![allow(dead_code)]

use cdda::cd::{DeviceError, DeviceOpener, DiscIdentity, Msf, TocDevice, TocEntryReply, CDROM_LEADOUT};
use cdda::cddb::{CddbRecord, DiscLookup, LookupError, QueryMatch};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Initialize tracing for tests with proper test output handling
pub fn tracing_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Pressed disc described by track start frames and a lead-out
#[derive(Clone)]
pub struct PressedDisc {
    tracks: Vec<(u8, u32, bool)>,
    leadout: u32,
}

impl PressedDisc {
    pub fn new(tracks: &[(u8, u32, bool)], leadout: u32) -> Self {
        Self {
            tracks: tracks.to_vec(),
            leadout,
        }
    }
}

impl TocDevice for PressedDisc {
    fn read_header(&mut self) -> io::Result<(u8, u8)> {
        match (self.tracks.first(), self.tracks.last()) {
            (Some(first), Some(last)) => Ok((first.0, last.0)),
            _ => Err(io::Error::from_raw_os_error(libc::EIO)),
        }
    }

    fn read_entry(&mut self, track: u8) -> io::Result<TocEntryReply> {
        if track == CDROM_LEADOUT {
            return Ok(TocEntryReply {
                track,
                adr_ctrl: 0x01,
                msf: Msf::from_frames(self.leadout),
            });
        }
        self.tracks
            .iter()
            .find(|t| t.0 == track)
            .map(|&(track, frames, is_data)| TocEntryReply {
                track,
                adr_ctrl: if is_data { 0x41 } else { 0x01 },
                msf: Msf::from_frames(frames),
            })
            .ok_or_else(|| io::Error::from_raw_os_error(libc::EINVAL))
    }
}

/// Drive bay: paths with a disc, paths with an empty tray, nothing else
#[derive(Default)]
pub struct DriveBay {
    discs: Mutex<HashMap<PathBuf, Option<PressedDisc>>>,
}

impl DriveBay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, path: &str, disc: PressedDisc) {
        self.discs
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), Some(disc));
    }

    pub fn eject(&self, path: &str) {
        self.discs.lock().unwrap().insert(PathBuf::from(path), None);
    }
}

struct EmptyTray;

impl TocDevice for EmptyTray {
    fn read_header(&mut self) -> io::Result<(u8, u8)> {
        Err(io::Error::from_raw_os_error(libc::ENXIO))
    }

    fn read_entry(&mut self, _track: u8) -> io::Result<TocEntryReply> {
        Err(io::Error::from_raw_os_error(libc::ENXIO))
    }
}

impl DeviceOpener for DriveBay {
    fn open(&self, device_path: &Path) -> Result<Box<dyn TocDevice>, DeviceError> {
        match self.discs.lock().unwrap().get(device_path) {
            Some(Some(disc)) => Ok(Box::new(disc.clone())),
            Some(None) => Ok(Box::new(EmptyTray)),
            None => Err(DeviceError::Unopenable {
                path: device_path.to_path_buf(),
                source: io::Error::from_raw_os_error(libc::ENOENT),
            }),
        }
    }
}

/// Lookup serving xmcd records keyed by disc id
#[derive(Default)]
pub struct RecordShelf {
    records: HashMap<String, String>,
}

impl RecordShelf {
    pub fn with(mut self, disc_id: &str, record: &str) -> Self {
        self.records.insert(disc_id.to_string(), record.to_string());
        self
    }
}

#[async_trait::async_trait]
impl DiscLookup for RecordShelf {
    async fn query(&self, disc: &DiscIdentity) -> Result<QueryMatch, LookupError> {
        if self.records.contains_key(&disc.hex()) {
            Ok(QueryMatch {
                category: "rock".to_string(),
                disc_id: disc.hex(),
                title: String::new(),
            })
        } else {
            Err(LookupError::NoMatch(disc.hex()))
        }
    }

    async fn read(&self, _category: &str, disc_id: &str) -> Result<CddbRecord, LookupError> {
        self.records
            .get(disc_id)
            .map(|r| CddbRecord::parse(r))
            .ok_or_else(|| LookupError::NoMatch(disc_id.to_string()))
    }
}
