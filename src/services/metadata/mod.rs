//! Anime metadata lookup
//!
//! Posters, synopses and trailers come from an external catalog keyed by
//! title. Lookups never fail a recommendation: callers that only need an
//! image go through `fetch_image`, which falls back to a placeholder.
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::{
    error::AppResult,
    models::{AnimeDetails, PLACEHOLDER_IMAGE_URL},
};

pub mod jikan;

const DEFAULT_CONCURRENT_REQUESTS: usize = 16;

pub use jikan::JikanProvider;

/// Trait for anime metadata providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Fetch details for the best match of `title`
    async fn fetch_details(&self, title: &str) -> AppResult<AnimeDetails>;

    /// Poster URL for `title`, or the placeholder when the lookup fails
    async fn fetch_image(&self, title: &str) -> String {
        match self.fetch_details(title).await {
            Ok(details) => details.image_url,
            Err(e) => {
                tracing::warn!(title = %title, provider = self.name(), error = %e, "Image lookup failed");
                PLACEHOLDER_IMAGE_URL.to_string()
            }
        }
    }

    /// Upper bound on lookups `fetch_images` runs at once
    fn max_concurrent_requests(&self) -> usize {
        DEFAULT_CONCURRENT_REQUESTS
    }

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Offline provider that answers every lookup with placeholder details
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticProvider;

#[async_trait::async_trait]
impl MetadataProvider for StaticProvider {
    async fn fetch_details(&self, _title: &str) -> AppResult<AnimeDetails> {
        Ok(AnimeDetails::placeholder())
    }

    fn name(&self) -> &'static str {
        "placeholder"
    }
}

/// Fetches posters for several titles concurrently, preserving input order.
/// At most `provider.max_concurrent_requests()` lookups run at once.
pub async fn fetch_images(provider: Arc<dyn MetadataProvider>, titles: Vec<String>) -> Vec<String> {
    let permits = Arc::new(Semaphore::new(provider.max_concurrent_requests().max(1)));
    let tasks: Vec<_> = titles
        .into_iter()
        .map(|title| {
            let provider = Arc::clone(&provider);
            let permits = Arc::clone(&permits);
            tokio::spawn(async move {
                let _permit = permits.acquire_owned().await;
                provider.fetch_image(&title).await
            })
        })
        .collect();

    let mut images = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(url) => images.push(url),
            Err(e) => {
                tracing::error!(error = %e, "Task join error");
                images.push(PLACEHOLDER_IMAGE_URL.to_string());
            }
        }
    }
    images
}
