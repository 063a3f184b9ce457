//! Application state: the composition root wiring every pipeline,
//! transport, and persistence component into one `Clone`-able handle
//! shared across axum handlers.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use voice_relay_config::Settings;
use voice_relay_core::SpeechVendor;
use voice_relay_persistence::InMemoryCallRepository;
use voice_relay_pipeline::{BatchSegmentWorker, BoundedVendor, StubVendor, SynthCache, TranslationProcessor, VoiceActivityDetector};
use voice_relay_transport::{ConnectionFabric, IngestionStream, SessionBus};

use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<Settings>>,
    pub bus: Arc<SessionBus>,
    pub fabric: Arc<ConnectionFabric>,
    pub ingestion: Arc<IngestionStream>,
    pub repository: Arc<InMemoryCallRepository>,
    pub orchestrator: Arc<Orchestrator>,
    pub metrics_handle: PrometheusHandle,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every component from settings, using the deterministic stub
    /// vendor.
    pub fn new(config: Settings, metrics_handle: PrometheusHandle) -> Self {
        Self::with_vendor(config, Arc::new(StubVendor::new()), metrics_handle)
    }

    pub fn with_vendor(
        config: Settings,
        vendor: Arc<dyn SpeechVendor>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        let bus = Arc::new(SessionBus::default());
        let fabric = Arc::new(ConnectionFabric::new(bus.clone()));
        let ingestion = Arc::new(IngestionStream::new(1024));
        let repository = Arc::new(InMemoryCallRepository::new());
        let vad = Arc::new(VoiceActivityDetector::new(config.vad.clone()));
        let synth_cache = Arc::new(SynthCache::new(config.cache.tts_cache_max_size));
        let bounded_vendor: Arc<dyn SpeechVendor> =
        Arc::new(BoundedVendor::new(vendor, config.vendor.worker_pool_size));

        let translation_processor = Arc::new(TranslationProcessor::new(
                bounded_vendor.clone(),
                repository.clone() as Arc<dyn voice_relay_core::CallRepository>,
                bus.clone() as Arc<dyn voice_relay_core::BusPublisher>,
                synth_cache,
                config.translation.clone(),
                config.vendor.clone(),
        ));
        let bsw = Arc::new(BatchSegmentWorker::new(
                bounded_vendor.clone(),
                translation_processor.clone(),
                config.translation.clone(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
                repository.clone(),
                bus.clone() as Arc<dyn voice_relay_core::BusPublisher>,
                fabric.clone(),
                bounded_vendor,
                vad,
                translation_processor,
                bsw,
                config.chunker.clone(),
                config.interim.clone(),
                config.orchestrator.clone(),
        ));

        Self {
            config: Arc::new(RwLock::new(config)),
            bus,
            fabric,
            ingestion,
            repository,
            orchestrator,
            metrics_handle,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn get_config(&self) -> parking_lot::RwLockReadGuard<'_, Settings> {
        self.config.read()
    }
}
