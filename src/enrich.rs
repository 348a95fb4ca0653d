//! Background metadata enrichment for a disc's track set
//!
//! The task walks `Idle -> Identifying -> Querying -> Applying -> Done`.
//! Any failure before Applying ends it in `Failed` (or `Cancelled` on eject)
//! without touching the set. Applying rewrites the whole set under one write
//! lock, so readers see either every placeholder or every looked-up field,
//! and the "metadata retrieved" event only goes out afterwards.

use crate::cd::{DeviceError, DiscIdentity, TocReader};
use crate::cddb::{CddbRecord, DiscLookup, LookupError};
use crate::events::{DiscEvent, DiscEventHandle};
use crate::track_set::{SharedDiscTrackSet, TrackDescriptor};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrichState {
    Idle,
    Identifying,
    Querying,
    Applying,
    Done,
    Failed,
    Cancelled,
}

impl fmt::Display for EnrichState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EnrichState::Idle => "idle",
            EnrichState::Identifying => "identifying",
            EnrichState::Querying => "querying",
            EnrichState::Applying => "applying",
            EnrichState::Done => "done",
            EnrichState::Failed => "failed",
            EnrichState::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Why an enrichment ended in `Failed`; logged, never returned to the caller
#[derive(Debug, Error)]
enum EnrichError {
    #[error("device unavailable: {0}")]
    Device(#[from] DeviceError),
    #[error("TOC too short to identify the disc")]
    Unidentifiable,
    #[error("disc changed since the track set was built ({expected} -> {found})")]
    DiscChanged { expected: String, found: String },
    #[error("TOC read task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("lookup failed: {0}")]
    Lookup(#[from] LookupError),
    #[error("record has {found} track titles, disc has {expected} tracks")]
    TrackCount { expected: usize, found: usize },
    #[error("record has no disc title")]
    MissingTitle,
}

/// Looks up and applies disc metadata without blocking the disc's owner
pub struct MetadataEnricher {
    reader: TocReader,
    lookup: Arc<dyn DiscLookup>,
    events: DiscEventHandle,
}

impl MetadataEnricher {
    pub fn new(reader: TocReader, lookup: Arc<dyn DiscLookup>, events: DiscEventHandle) -> Self {
        Self {
            reader,
            lookup,
            events,
        }
    }

    pub fn events(&self) -> &DiscEventHandle {
        &self.events
    }

    /// Start enrichment on the given runtime and return immediately
    pub fn spawn_on(
        self: &Arc<Self>,
        runtime: &tokio::runtime::Handle,
        set: SharedDiscTrackSet,
        device_path: PathBuf,
        cancel: CancellationToken,
    ) -> JoinHandle<EnrichState> {
        let enricher = Arc::clone(self);
        runtime.spawn(async move { enricher.run(set, &device_path, cancel).await })
    }

    /// Start enrichment on the current runtime
    pub fn spawn(
        self: &Arc<Self>,
        set: SharedDiscTrackSet,
        device_path: PathBuf,
        cancel: CancellationToken,
    ) -> JoinHandle<EnrichState> {
        self.spawn_on(&tokio::runtime::Handle::current(), set, device_path, cancel)
    }

    /// Run the whole state machine and report where it stopped
    pub async fn run(
        &self,
        set: SharedDiscTrackSet,
        device_path: &Path,
        cancel: CancellationToken,
    ) -> EnrichState {
        let mut state = EnrichState::Idle;
        let end = self.drive(&mut state, &set, device_path, &cancel).await;

        match end {
            Ok(final_state) => final_state,
            Err(e) => {
                warn!(
                    "Metadata enrichment for {} failed while {}: {}",
                    device_path.display(),
                    state,
                    e
                );
                EnrichState::Failed
            }
        }
    }

    async fn drive(
        &self,
        state: &mut EnrichState,
        set: &SharedDiscTrackSet,
        device_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<EnrichState, EnrichError> {
        transition(state, EnrichState::Identifying, device_path);
        let identity = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cancelled(device_path)),
            identity = self.identify(device_path) => identity?,
        };
        self.check_same_disc(set, &identity).await?;

        transition(state, EnrichState::Querying, device_path);
        let record = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cancelled(device_path)),
            record = self.lookup.lookup(&identity) => record?,
        };

        if cancel.is_cancelled() {
            return Ok(cancelled(device_path));
        }

        transition(state, EnrichState::Applying, device_path);
        apply_record(set, &identity, &record).await?;

        transition(state, EnrichState::Done, device_path);
        self.events.emit(DiscEvent::MetadataRetrieved {
            set: set.clone(),
            success: true,
        });
        Ok(EnrichState::Done)
    }

    async fn identify(&self, device_path: &Path) -> Result<DiscIdentity, EnrichError> {
        let reader = self.reader.clone();
        let path = device_path.to_path_buf();
        let entries = tokio::task::spawn_blocking(move || reader.read(&path)).await??;
        let identity = DiscIdentity::from_toc(&entries).ok_or(EnrichError::Unidentifiable)?;
        debug!("Disc in {} identified as {}", device_path.display(), identity);
        Ok(identity)
    }

    async fn check_same_disc(
        &self,
        set: &SharedDiscTrackSet,
        identity: &DiscIdentity,
    ) -> Result<(), EnrichError> {
        let guard = set.read().await;
        let session = guard
            .tracks
            .first()
            .and_then(|t| t.location.session.clone());
        match session {
            Some(expected) if expected != identity.hex() => Err(EnrichError::DiscChanged {
                expected,
                found: identity.hex(),
            }),
            _ => Ok(()),
        }
    }
}

fn transition(state: &mut EnrichState, next: EnrichState, device_path: &Path) {
    debug!(
        "Enrichment {}: {} -> {}",
        device_path.display(),
        state,
        next
    );
    *state = next;
}

fn cancelled(device_path: &Path) -> EnrichState {
    info!(
        "Enrichment for {} cancelled (disc removed)",
        device_path.display()
    );
    EnrichState::Cancelled
}

/// Write a lookup record into every descriptor of the set
///
/// Everything is computed and checked before the first field changes, and
/// the write lock is held across the swap.
async fn apply_record(
    set: &SharedDiscTrackSet,
    identity: &DiscIdentity,
    record: &CddbRecord,
) -> Result<(), EnrichError> {
    let (artist, album) = record.artist_album().ok_or(EnrichError::MissingTitle)?;
    let titles = record.track_titles();
    if titles.len() != identity.track_count() {
        return Err(EnrichError::TrackCount {
            expected: identity.track_count(),
            found: titles.len(),
        });
    }
    let year = record.year();
    let genre = record.genre();

    let mut guard = set.write().await;
    let tracks = guard
        .tracks
        .iter()
        .map(|track| -> Result<TrackDescriptor, EnrichError> {
            let title = titles
                .get(track.toc_index)
                .ok_or_else(|| EnrichError::TrackCount {
                    expected: identity.track_count(),
                    found: titles.len(),
                })?;
            Ok(TrackDescriptor {
                title: if title.is_empty() {
                    track.title.clone()
                } else {
                    title.clone()
                },
                artist: Some(artist.clone()),
                album: Some(album.clone()),
                year: year.clone(),
                genre: genre.clone(),
                ..track.clone()
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    guard.tracks = tracks;
    guard.name = album.clone();
    drop(guard);

    info!(
        "Applied metadata: {} / {} ({} tracks)",
        artist,
        album,
        titles.len()
    );
    Ok(())
}
