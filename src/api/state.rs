use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    data::Dataset,
    db::Cache,
    models::FeedbackLog,
    services::{metadata::MetadataProvider, recommendations::RecommendationEngine},
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
    pub metadata: Arc<dyn MetadataProvider>,
    /// Redis cache; `None` when no Redis URL is configured
    pub cache: Option<Cache>,
    pub feedback: Arc<RwLock<FeedbackLog>>,
}

impl AppState {
    pub fn new(
        engine: Arc<RecommendationEngine>,
        metadata: Arc<dyn MetadataProvider>,
        cache: Option<Cache>,
    ) -> Self {
        Self {
            engine,
            metadata,
            cache,
            feedback: Arc::new(RwLock::new(FeedbackLog::new())),
        }
    }

    pub fn dataset(&self) -> &Dataset {
        self.engine.dataset()
    }
}
