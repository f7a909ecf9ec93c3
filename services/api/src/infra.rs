use freelancer_onboarding::workflows::onboarding::backend::{
    InMemoryApplicationRepository, InMemoryBlobStore, OnboardingBackend,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type MemoryBackend = OnboardingBackend<InMemoryApplicationRepository, InMemoryBlobStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Backend with process-local storage; records are lost on restart.
pub(crate) fn in_memory_backend() -> Arc<MemoryBackend> {
    Arc::new(OnboardingBackend::new(
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(InMemoryBlobStore::default()),
    ))
}
