//! Audio CD access
//!
//! Reads the table of contents straight from the drive, turns it into
//! per-track lengths and a FreeDB disc id, and builds the playable
//! [`DiscTrackSet`] for a disc.

pub mod disc_id;
pub mod drive;
#[cfg(target_os = "linux")]
pub mod ffi;
pub mod lengths;
pub mod toc;

pub use disc_id::DiscIdentity;
pub use drive::CdDrive;
pub use lengths::{derive_lengths, TocError, TrackLength};
pub use toc::{
    DeviceError, DeviceOpener, Msf, RawTocEntry, SystemDevices, TocDevice, TocEntryReply,
    TocReader, CDROM_DATA_TRACK, CDROM_LEADOUT, FRAMES_PER_SECOND,
};

use crate::track_set::{DiscTrackSet, DiscTrackSetBuilder};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DiscError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Invalid TOC: {0}")]
    Toc(#[from] TocError),
}

/// Read the disc in `device_path` and build its placeholder track set
///
/// Every location is tagged with the disc id so a set built for one disc
/// can be told apart from a later disc in the same drive.
pub fn open_disc(reader: &TocReader, device_path: &Path) -> Result<DiscTrackSet, DiscError> {
    let entries = reader.read(device_path)?;
    let lengths = derive_lengths(&entries)?;

    let mut builder = DiscTrackSetBuilder::new();
    if let Some(identity) = DiscIdentity::from_toc(&entries) {
        info!("Disc in {} has id {}", device_path.display(), identity);
        builder = builder.with_session(identity.hex());
    }

    Ok(builder.build(&lengths, device_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeDrives, FakeTocDevice};
    use crate::track_set::DEFAULT_SET_NAME;
    use std::sync::Arc;

    fn reader_with(device: FakeTocDevice) -> TocReader {
        TocReader::new(Arc::new(FakeDrives::new().with_disc("/dev/sr0", device)))
    }

    #[test]
    fn test_open_two_track_disc() {
        let reader = reader_with(FakeTocDevice::from_frames(
            &[(1, 150, false), (2, 1650, false)],
            3525,
        ));
        let set = open_disc(&reader, Path::new("/dev/sr0")).unwrap();

        assert_eq!(set.name, DEFAULT_SET_NAME);
        assert_eq!(set.len(), 2);
        assert_eq!(set.tracks[0].title, "Track 1");
        assert_eq!(set.tracks[0].length_seconds, 20);
        assert_eq!(set.tracks[1].title, "Track 2");
        assert_eq!(set.tracks[1].length_seconds, 25);
        assert_eq!(set.tracks[1].location.to_uri(), "cdda://2#/dev/sr0");
        assert!(set.tracks[0].location.session.is_some());
    }

    #[test]
    fn test_open_skips_data_tracks() {
        let reader = reader_with(FakeTocDevice::from_frames(
            &[(1, 150, false), (2, 1650, true), (3, 9000, false)],
            12000,
        ));
        let set = open_disc(&reader, Path::new("/dev/sr0")).unwrap();

        assert_eq!(set.len(), 2);
        assert_eq!(set.tracks[0].ordinal, 1);
        assert_eq!(set.tracks[1].ordinal, 2);
        assert_eq!(set.tracks[1].toc_index, 2);
        assert_eq!(set.tracks[1].length_seconds, (12000 - 9000) / 75);
    }

    #[test]
    fn test_open_empty_tray() {
        let reader = reader_with(FakeTocDevice::empty_tray());
        let err = open_disc(&reader, Path::new("/dev/sr0")).unwrap_err();
        assert!(matches!(err, DiscError::Device(DeviceError::NoDisc { .. })));
    }

    #[test]
    fn test_open_rejects_non_monotonic_toc() {
        let reader = reader_with(FakeTocDevice::from_frames(
            &[(1, 5000, false), (2, 150, false)],
            9000,
        ));
        let err = open_disc(&reader, Path::new("/dev/sr0")).unwrap_err();
        assert!(matches!(err, DiscError::Toc(TocError::NonMonotonic { .. })));
    }
}
