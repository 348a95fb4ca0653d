//! Playable track descriptors for an audio disc

use crate::cd::TrackLength;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const CDDA_SCHEME: &str = "cdda";

/// Name a disc gets until metadata says otherwise
pub const DEFAULT_SET_NAME: &str = "Audio Disc";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("Not a cdda:// location: {0}")]
    Scheme(String),
    #[error("Missing device in location: {0}")]
    MissingDevice(String),
    #[error("Invalid track number in location: {0}")]
    Ordinal(String),
}

/// Where a track lives: `cdda://{ordinal}#{device_path}`
///
/// `session` identifies the disc the location was built from. It is not part
/// of the URI (players only need ordinal + device) but is part of
/// [`TrackLocation::cache_key`], so a different disc in the same drive never
/// hits stale cache entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TrackLocation {
    pub ordinal: u32,
    pub device_path: PathBuf,
    pub session: Option<String>,
}

impl TrackLocation {
    pub fn new(ordinal: u32, device_path: &Path, session: Option<String>) -> Self {
        Self {
            ordinal,
            device_path: device_path.to_path_buf(),
            session,
        }
    }

    pub fn to_uri(&self) -> String {
        format!(
            "{}://{}#{}",
            CDDA_SCHEME,
            self.ordinal,
            self.device_path.display()
        )
    }

    pub fn cache_key(&self) -> String {
        match &self.session {
            Some(session) => format!("{}@{}", self.to_uri(), session),
            None => self.to_uri(),
        }
    }

    /// Parse a `cdda://N#/dev/...` URI; the result has no session
    pub fn parse(uri: &str) -> Result<Self, LocationError> {
        let rest = uri
            .strip_prefix(CDDA_SCHEME)
            .and_then(|r| r.strip_prefix("://"))
            .ok_or_else(|| LocationError::Scheme(uri.to_string()))?;
        let (ordinal, device) = rest
            .split_once('#')
            .ok_or_else(|| LocationError::MissingDevice(uri.to_string()))?;
        if device.is_empty() {
            return Err(LocationError::MissingDevice(uri.to_string()));
        }
        let ordinal = ordinal
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| LocationError::Ordinal(uri.to_string()))?;

        Ok(Self {
            ordinal,
            device_path: PathBuf::from(device),
            session: None,
        })
    }
}

impl fmt::Display for TrackLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// One playable audio track
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackDescriptor {
    pub ordinal: u32,
    pub location: TrackLocation,
    pub title: String,
    pub length_seconds: u32,
    pub album: Option<String>,
    pub artist: Option<String>,
    pub year: Option<String>,
    pub genre: Option<String>,
    /// Position in the physical TOC, which is how lookup records number tracks
    pub toc_index: usize,
    pub start_frames: u32,
}

impl TrackDescriptor {
    pub fn placeholder_title(ordinal: u32) -> String {
        format!("Track {}", ordinal)
    }

    pub fn has_metadata(&self) -> bool {
        self.artist.is_some() || self.album.is_some()
    }
}

/// Ordered audio tracks of one disc plus a display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscTrackSet {
    pub name: String,
    pub device_path: PathBuf,
    pub tracks: Vec<TrackDescriptor>,
}

impl DiscTrackSet {
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn total_seconds(&self) -> u64 {
        self.tracks.iter().map(|t| t.length_seconds as u64).sum()
    }

    pub fn track_by_location(&self, location: &TrackLocation) -> Option<&TrackDescriptor> {
        self.tracks
            .iter()
            .find(|t| t.ordinal == location.ordinal && t.location.device_path == location.device_path)
    }
}

/// Maps derived track lengths to playable descriptors
#[derive(Debug, Clone, Default)]
pub struct DiscTrackSetBuilder {
    session: Option<String>,
}

impl DiscTrackSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag every location with a disc session token (usually the disc id)
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Build the playable set; data tracks are skipped and ordinals are
    /// assigned 1..N over the remaining audio tracks in TOC order.
    pub fn build(&self, lengths: &[TrackLength], device_path: &Path) -> DiscTrackSet {
        let mut tracks: Vec<TrackDescriptor> = lengths
            .iter()
            .filter(|l| {
                if l.is_data {
                    debug!("Skipping data track {} in playable set", l.track_number);
                }
                !l.is_data
            })
            .zip(1u32..)
            .map(|(length, ordinal)| TrackDescriptor {
                ordinal,
                location: TrackLocation::new(ordinal, device_path, self.session.clone()),
                title: TrackDescriptor::placeholder_title(ordinal),
                length_seconds: length.length_seconds,
                album: None,
                artist: None,
                year: None,
                genre: None,
                toc_index: length.toc_index,
                start_frames: length.start_frames,
            })
            .collect();
        tracks.sort_by_key(|t| t.ordinal);

        info!(
            "Built track set for {}: {} audio track(s) of {} on disc",
            device_path.display(),
            tracks.len(),
            lengths.len()
        );

        DiscTrackSet {
            name: DEFAULT_SET_NAME.to_string(),
            device_path: device_path.to_path_buf(),
            tracks,
        }
    }
}

/// Track set shared between its owner and the enrichment task
#[derive(Debug, Clone)]
pub struct SharedDiscTrackSet {
    inner: Arc<RwLock<DiscTrackSet>>,
}

impl PartialEq for SharedDiscTrackSet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl From<DiscTrackSet> for SharedDiscTrackSet {
    fn from(set: DiscTrackSet) -> Self {
        Self::new(set)
    }
}

impl SharedDiscTrackSet {
    pub fn new(set: DiscTrackSet) -> Self {
        Self {
            inner: Arc::new(RwLock::new(set)),
        }
    }

    /// Get a read lock on the track set
    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, DiscTrackSet> {
        self.inner.read().await
    }

    /// Get a write lock on the track set
    pub async fn write(&self) -> tokio::sync::RwLockWriteGuard<'_, DiscTrackSet> {
        self.inner.write().await
    }

    /// Copy of the current state, for callers outside the runtime
    pub fn blocking_snapshot(&self) -> DiscTrackSet {
        self.inner.blocking_read().clone()
    }

    pub async fn snapshot(&self) -> DiscTrackSet {
        self.inner.read().await.clone()
    }
}
