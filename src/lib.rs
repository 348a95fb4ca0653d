// Audio CD support: TOC reading, playable track sets and CDDB metadata

pub mod cd;
pub mod cddb;
pub mod config;
pub mod device;
pub mod enrich;
pub mod events;
pub mod track_set;

pub use cd::{open_disc, CdDrive, DiscError, DiscIdentity, TocReader};
pub use config::Config;
pub use device::{CdDevice, DeviceContext, HandlerRegistry};
pub use enrich::{EnrichState, MetadataEnricher};
pub use events::{DiscEvent, DiscEventHandle};
pub use track_set::{DiscTrackSet, SharedDiscTrackSet, TrackDescriptor, TrackLocation};

// Test support (unit tests, or integration tests with the test-utils feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
