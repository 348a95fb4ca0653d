//! Removable-media integration
//!
//! A [`HandlerRegistry`] is owned by the host and passed to whatever needs to
//! turn a newly seen volume into a device. The CD handler claims volumes
//! tagged `volume.disc` and builds a [`CdDevice`] when the disc carries
//! audio. Connecting a device reads its TOC and kicks off background
//! metadata enrichment; disconnecting cancels that work.

use crate::cd::{open_disc, DiscError, TocReader};
use crate::cddb::{CddbClient, DiscLookup, LookupError};
use crate::config::Config;
use crate::enrich::{EnrichState, MetadataEnricher};
use crate::events::DiscEventHandle;
use crate::track_set::{SharedDiscTrackSet, DEFAULT_SET_NAME};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const CAP_VOLUME_DISC: &str = "volume.disc";
pub const CAP_DISC_HAS_AUDIO: &str = "volume.disc.has_audio";

/// Panel kind for audio discs
pub const CD_PANEL_TYPE: &str = "cd";
/// Panel kind used when a device's own kind has no constructor
pub const FALLBACK_PANEL_TYPE: &str = "flatplaylist";

/// Capability tags reported for a volume
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(HashSet<String>);

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tag: impl Into<String>) -> Self {
        self.0.insert(tag.into());
        self
    }

    pub fn has(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }
}

impl<S: Into<String>> FromIterator<S> for Capabilities {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Services a device needs while connected
///
/// Built once by the host and shared by reference; nothing here is global.
#[derive(Clone)]
pub struct DeviceContext {
    reader: TocReader,
    enricher: Option<Arc<MetadataEnricher>>,
    events: DiscEventHandle,
    runtime: tokio::runtime::Handle,
}

impl DeviceContext {
    /// Context without metadata lookups
    pub fn new(reader: TocReader, events: DiscEventHandle, runtime: tokio::runtime::Handle) -> Self {
        Self {
            reader,
            enricher: None,
            events,
            runtime,
        }
    }

    /// Context reading real drives, with CDDB lookups when the config enables them
    pub fn from_config(
        config: &Config,
        runtime: tokio::runtime::Handle,
    ) -> Result<Self, LookupError> {
        let context = Self::new(TocReader::system(), DiscEventHandle::new(), runtime);
        if !config.cddb_enabled {
            info!("CDDB lookups disabled");
            return Ok(context);
        }
        let client = CddbClient::new(config)?;
        info!("CDDB lookups via {}", client.base_url());
        Ok(context.with_lookup(Arc::new(client)))
    }

    pub fn with_lookup(mut self, lookup: Arc<dyn DiscLookup>) -> Self {
        self.enricher = Some(Arc::new(MetadataEnricher::new(
            self.reader.clone(),
            lookup,
            self.events.clone(),
        )));
        self
    }

    pub fn reader(&self) -> &TocReader {
        &self.reader
    }

    pub fn events(&self) -> &DiscEventHandle {
        &self.events
    }
}

/// An audio disc in a drive
pub struct CdDevice {
    device_path: PathBuf,
    name: String,
    connected: bool,
    sets: Vec<SharedDiscTrackSet>,
    cancel: Option<CancellationToken>,
    enrichment: Option<JoinHandle<EnrichState>>,
}

impl CdDevice {
    pub fn new(device_path: impl Into<PathBuf>) -> Self {
        Self {
            device_path: device_path.into(),
            name: DEFAULT_SET_NAME.to_string(),
            connected: false,
            sets: Vec::new(),
            cancel: None,
            enrichment: None,
        }
    }

    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn sets(&self) -> &[SharedDiscTrackSet] {
        &self.sets
    }

    pub fn panel_type(&self) -> &'static str {
        CD_PANEL_TYPE
    }

    /// Read the disc and publish its placeholder track set
    ///
    /// Returns as soon as the TOC is read; metadata arrives later through
    /// the context's event handle.
    pub fn connect(&mut self, context: &DeviceContext) -> Result<SharedDiscTrackSet, DiscError> {
        if self.connected {
            debug!("{} already connected, reconnecting", self.device_path.display());
            self.disconnect();
        }

        let set = SharedDiscTrackSet::new(open_disc(&context.reader, &self.device_path)?);
        self.sets.push(set.clone());
        self.connected = true;
        info!("Connected audio disc in {}", self.device_path.display());

        if let Some(enricher) = &context.enricher {
            let cancel = CancellationToken::new();
            let handle = enricher.spawn_on(
                &context.runtime,
                set.clone(),
                self.device_path.clone(),
                cancel.clone(),
            );
            self.cancel = Some(cancel);
            self.enrichment = Some(handle);
        }

        Ok(set)
    }

    /// Hand the running enrichment task to the caller, if there is one
    ///
    /// Disconnecting still cancels it after this.
    pub fn take_enrichment(&mut self) -> Option<JoinHandle<EnrichState>> {
        self.enrichment.take()
    }

    pub fn disconnect(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.enrichment = None;
        self.sets.clear();
        if self.connected {
            info!("Disconnected audio disc in {}", self.device_path.display());
        }
        self.connected = false;
    }
}

impl Drop for CdDevice {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

/// Turns volumes with matching capabilities into devices
pub trait DeviceHandler: Send + Sync {
    fn name(&self) -> &str;

    fn is_type(&self, capabilities: &Capabilities) -> bool;

    fn device_from(&self, device_path: &Path, capabilities: &Capabilities) -> Option<CdDevice>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CdHandler;

impl DeviceHandler for CdHandler {
    fn name(&self) -> &str {
        "cd"
    }

    fn is_type(&self, capabilities: &Capabilities) -> bool {
        capabilities.has(CAP_VOLUME_DISC)
    }

    fn device_from(&self, device_path: &Path, capabilities: &Capabilities) -> Option<CdDevice> {
        if !capabilities.has(CAP_DISC_HAS_AUDIO) {
            debug!("{} has no audio tracks, ignoring", device_path.display());
            return None;
        }
        Some(CdDevice::new(device_path))
    }
}

/// Registered device handlers, in registration order
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn DeviceHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the CD handler installed
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CdHandler));
        registry
    }

    /// Add a handler; one already registered under the same name is replaced
    pub fn register(&mut self, handler: Arc<dyn DeviceHandler>) {
        self.handlers.retain(|h| h.name() != handler.name());
        debug!("Registered device handler {}", handler.name());
        self.handlers.push(handler);
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.name() != name);
        before != self.handlers.len()
    }

    /// First handler claiming a volume with these capabilities
    pub fn handler_for(&self, capabilities: &Capabilities) -> Option<Arc<dyn DeviceHandler>> {
        self.handlers
            .iter()
            .find(|h| h.is_type(capabilities))
            .cloned()
    }

    pub fn device_for(&self, device_path: &Path, capabilities: &Capabilities) -> Option<CdDevice> {
        self.handler_for(capabilities)?
            .device_from(device_path, capabilities)
    }

    pub fn names(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.name().to_string()).collect()
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}

/// Constructor for a presentation adapter
pub type PanelConstructor<P> = Arc<dyn Fn() -> P + Send + Sync>;

/// Maps a device's panel type to the host's presentation adapter
pub struct PanelRegistry<P> {
    constructors: HashMap<String, PanelConstructor<P>>,
}

impl<P> Default for PanelRegistry<P> {
    fn default() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }
}

impl<P> PanelRegistry<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, panel_type: impl Into<String>, constructor: PanelConstructor<P>) {
        self.constructors.insert(panel_type.into(), constructor);
    }

    pub fn contains(&self, panel_type: &str) -> bool {
        self.constructors.contains_key(panel_type)
    }

    /// Build the adapter for `panel_type`, falling back to the flat playlist
    pub fn create(&self, panel_type: &str) -> Option<P> {
        if let Some(constructor) = self.constructors.get(panel_type) {
            return Some(constructor());
        }
        warn!(
            "No panel for {}, using {}",
            panel_type, FALLBACK_PANEL_TYPE
        );
        self.constructors
            .get(FALLBACK_PANEL_TYPE)
            .map(|constructor| constructor())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DiscEvent;
    use crate::test_support::{FakeDrives, FakeTocDevice, MockLookup};
    use std::time::Duration;

    const RECORD: &str = "DTITLE=Artist X / Album Y\nTTITLE0=Song 1\nTTITLE1=Song 2\n";

    fn audio_caps() -> Capabilities {
        [CAP_VOLUME_DISC, CAP_DISC_HAS_AUDIO].into_iter().collect()
    }

    fn context(lookup: Option<MockLookup>) -> DeviceContext {
        let drives = FakeDrives::new().with_disc(
            "/dev/sr0",
            FakeTocDevice::from_frames(&[(1, 150, false), (2, 1650, false)], 3525),
        );
        let context = DeviceContext::new(
            TocReader::new(Arc::new(drives)),
            DiscEventHandle::new(),
            tokio::runtime::Handle::current(),
        );
        match lookup {
            Some(lookup) => context.with_lookup(Arc::new(lookup)),
            None => context,
        }
    }

    #[test]
    fn test_cd_handler_claims_audio_discs() {
        let handler = CdHandler;
        assert!(handler.is_type(&audio_caps()));
        assert!(!handler.is_type(&Capabilities::new().with("volume")));

        let device = handler
            .device_from(Path::new("/dev/sr0"), &audio_caps())
            .unwrap();
        assert_eq!(device.device_path(), Path::new("/dev/sr0"));
        assert_eq!(device.name(), "Audio Disc");
        assert!(!device.is_connected());

        let data_only = Capabilities::new().with(CAP_VOLUME_DISC);
        assert!(handler.is_type(&data_only));
        assert!(handler
            .device_from(Path::new("/dev/sr0"), &data_only)
            .is_none());
    }

    #[test]
    fn test_handler_registry() {
        let mut registry = HandlerRegistry::with_builtin_handlers();
        assert_eq!(registry.names(), vec!["cd"]);
        assert!(registry
            .device_for(Path::new("/dev/sr0"), &audio_caps())
            .is_some());
        assert!(registry.handler_for(&Capabilities::new()).is_none());

        registry.register(Arc::new(CdHandler));
        assert_eq!(registry.names().len(), 1);

        assert!(registry.unregister("cd"));
        assert!(!registry.unregister("cd"));
        assert!(registry.handler_for(&audio_caps()).is_none());
    }

    #[test]
    fn test_panel_registry_fallback() {
        let mut panels: PanelRegistry<String> = PanelRegistry::new();
        assert!(panels.create(CD_PANEL_TYPE).is_none());

        panels.register(FALLBACK_PANEL_TYPE, Arc::new(|| "flat".to_string()));
        assert_eq!(panels.create(CD_PANEL_TYPE).as_deref(), Some("flat"));

        panels.register(CD_PANEL_TYPE, Arc::new(|| "disc".to_string()));
        assert!(panels.contains(CD_PANEL_TYPE));
        assert_eq!(
            panels.create(CdDevice::new("/dev/sr0").panel_type()).as_deref(),
            Some("disc")
        );
    }

    #[tokio::test]
    async fn test_connect_without_lookup() {
        let context = context(None);
        let mut device = CdDevice::new("/dev/sr0");

        let set = device.connect(&context).unwrap();
        assert!(device.is_connected());
        assert_eq!(device.sets().len(), 1);
        assert!(device.take_enrichment().is_none());
        assert_eq!(set.snapshot().await.tracks[1].title, "Track 2");

        device.disconnect();
        assert!(!device.is_connected());
        assert!(device.sets().is_empty());
    }

    #[tokio::test]
    async fn test_connect_enriches_in_background() {
        let context = context(Some(MockLookup::with_record(RECORD)));
        let mut events = context.events().subscribe_all();
        let mut device = CdDevice::new("/dev/sr0");

        let set = device.connect(&context).unwrap();
        let state = device.take_enrichment().unwrap().await.unwrap();
        assert_eq!(state, EnrichState::Done);

        match events.recv().await.unwrap() {
            DiscEvent::MetadataRetrieved { set: got, success } => {
                assert!(success);
                assert_eq!(got, set);
            }
        }
        let snapshot = set.snapshot().await;
        assert_eq!(snapshot.name, "Album Y");
        assert_eq!(snapshot.tracks[0].title, "Song 1");
    }

    #[tokio::test]
    async fn test_disconnect_cancels_enrichment() {
        let context = context(Some(
            MockLookup::with_record(RECORD).delayed(Duration::from_secs(30)),
        ));
        let mut events = context.events().subscribe_all();
        let mut device = CdDevice::new("/dev/sr0");

        let set = device.connect(&context).unwrap();
        let task = device.take_enrichment().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        device.disconnect();

        assert_eq!(task.await.unwrap(), EnrichState::Cancelled);
        assert_eq!(set.snapshot().await.tracks[0].title, "Track 1");
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_connect_empty_drive_fails() {
        let drives = FakeDrives::new().with_disc("/dev/sr0", FakeTocDevice::empty_tray());
        let context = DeviceContext::new(
            TocReader::new(Arc::new(drives)),
            DiscEventHandle::new(),
            tokio::runtime::Handle::current(),
        );
        let mut device = CdDevice::new("/dev/sr0");

        assert!(device.connect(&context).is_err());
        assert!(!device.is_connected());
        assert!(device.sets().is_empty());
    }

    #[tokio::test]
    async fn test_context_from_config_respects_switch() {
        let config = Config {
            cddb_enabled: false,
            ..Config::default()
        };
        let context = DeviceContext::from_config(&config, tokio::runtime::Handle::current()).unwrap();
        assert!(context.enricher.is_none());

        let context =
            DeviceContext::from_config(&Config::default(), tokio::runtime::Handle::current())
                .unwrap();
        assert!(context.enricher.is_some());
    }
}
