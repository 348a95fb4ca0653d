//! Track length derivation from raw TOC offsets

use crate::cd::toc::{RawTocEntry, FRAMES_PER_SECOND};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TocError {
    #[error("TOC has no tracks")]
    Empty,
    #[error("TOC offsets not increasing after track {track}: {lower} -> {upper} frames")]
    NonMonotonic { track: u8, lower: u32, upper: u32 },
}

/// Length of one physical track, data tracks included
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrackLength {
    pub track_number: u8,
    /// Position of the track in the TOC (0-based, lead-out excluded)
    pub toc_index: usize,
    pub start_frames: u32,
    pub length_seconds: u32,
    pub is_data: bool,
}

/// Turn ascending TOC entries (lead-out last) into per-track lengths
///
/// The whole TOC is rejected if any offset fails to increase; a single
/// impossible entry means none of them can be trusted.
pub fn derive_lengths(entries: &[RawTocEntry]) -> Result<Vec<TrackLength>, TocError> {
    if entries.len() < 2 {
        return Err(TocError::Empty);
    }

    let mut lengths = Vec::with_capacity(entries.len() - 1);
    for (toc_index, pair) in entries.windows(2).enumerate() {
        let (lower, upper) = (&pair[0], &pair[1]);
        if upper.absolute_frames <= lower.absolute_frames {
            warn!(
                "Rejecting TOC: track {} starts at {} but next entry is at {}",
                lower.track_number, lower.absolute_frames, upper.absolute_frames
            );
            return Err(TocError::NonMonotonic {
                track: lower.track_number,
                lower: lower.absolute_frames,
                upper: upper.absolute_frames,
            });
        }

        lengths.push(TrackLength {
            track_number: lower.track_number,
            toc_index,
            start_frames: lower.absolute_frames,
            length_seconds: (upper.absolute_frames - lower.absolute_frames) / FRAMES_PER_SECOND,
            is_data: lower.is_data,
        });
    }

    debug!(
        "Derived lengths: {:?}",
        lengths.iter().map(|l| l.length_seconds).collect::<Vec<_>>()
    );
    Ok(lengths)
}
