//! FreeDB/CDDB disc identifier
//!
//! The id packs a checksum of the track start times, the playing time and
//! the track count into 32 bits:
//!
//! ```text
//! XX YYYY NN
//! |  |    +- number of tracks
//! |  +------ disc length in seconds (lead-out minus first track)
//! +--------- sum of the decimal digits of every track's start second, mod 255
//! ```

use crate::cd::toc::{RawTocEntry, FRAMES_PER_SECOND};
use std::fmt;

/// Everything a CDDB query needs to know about a disc
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscIdentity {
    pub id: u32,
    /// Start of every physical track in frames, data tracks included
    pub track_offsets: Vec<u32>,
    pub leadout_frames: u32,
}

impl DiscIdentity {
    /// Compute the identity of a TOC as returned by
    /// [`TocReader::read`](crate::cd::TocReader::read)
    ///
    /// Returns `None` when there is no lead-out or no track before it.
    pub fn from_toc(entries: &[RawTocEntry]) -> Option<Self> {
        let (leadout, tracks) = entries.split_last()?;
        let first = tracks.first()?;

        let checksum: u32 = tracks
            .iter()
            .map(|t| digit_sum(t.absolute_frames / FRAMES_PER_SECOND))
            .sum();
        let playing_seconds = (leadout.absolute_frames / FRAMES_PER_SECOND)
            .saturating_sub(first.absolute_frames / FRAMES_PER_SECOND);
        let id = ((checksum % 0xff) << 24) | (playing_seconds << 8) | tracks.len() as u32;

        Some(Self {
            id,
            track_offsets: tracks.iter().map(|t| t.absolute_frames).collect(),
            leadout_frames: leadout.absolute_frames,
        })
    }

    pub fn track_count(&self) -> usize {
        self.track_offsets.len()
    }

    /// Total disc length in whole seconds, as the query expects it
    pub fn total_seconds(&self) -> u32 {
        self.leadout_frames / FRAMES_PER_SECOND
    }

    /// The id as CDDB prints it: eight lowercase hex digits
    pub fn hex(&self) -> String {
        format!("{:08x}", self.id)
    }
}

impl fmt::Display for DiscIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.id)
    }
}

fn digit_sum(mut n: u32) -> u32 {
    let mut sum = 0;
    while n > 0 {
        sum += n % 10;
        n /= 10;
    }
    sum
}
