//! Application state.

use std::sync::Arc;

use vframe_ledger::JobLedger;
use vframe_queue::JobPublisher;
use vframe_storage::ArtifactStore;

use crate::auth::JwtKeys;
use crate::config::ApiConfig;
use crate::services::{RetrievalService, SubmissionService};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub ledger: Arc<dyn JobLedger>,
    pub publisher: Arc<dyn JobPublisher>,
    pub store: ArtifactStore,
    pub jwt: Arc<JwtKeys>,
    pub submissions: SubmissionService,
    pub retrieval: RetrievalService,
}

impl AppState {
    /// Wire services over already connected backends.
    pub fn new(
        config: ApiConfig,
        ledger: Arc<dyn JobLedger>,
        publisher: Arc<dyn JobPublisher>,
        store: ArtifactStore,
    ) -> Self {
        let jwt = Arc::new(JwtKeys::new(&config.jwt_secret));
        let submissions = SubmissionService::new(Arc::clone(&ledger), Arc::clone(&publisher), store.clone());
        let retrieval = RetrievalService::new(Arc::clone(&ledger), store.clone());

        Self {
            config,
            ledger,
            publisher,
            store,
            jwt,
            submissions,
            retrieval,
        }
    }
}
