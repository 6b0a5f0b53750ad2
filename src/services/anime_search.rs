use std::sync::Arc;

use crate::{
    data::Dataset,
    error::{AppError, AppResult},
    models::{Anime, AnimeDetails, AnimeId, AnimeProfile},
    services::metadata::MetadataProvider,
};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Catalog search backing the title selector
///
/// An empty query lists the most popular titles.
pub fn search_catalog(dataset: &Dataset, query: &str, limit: Option<usize>) -> AppResult<Vec<Anime>> {
    let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    if !(1..=MAX_SEARCH_LIMIT).contains(&limit) {
        return Err(AppError::InvalidInput(format!(
            "limit must be between 1 and {}, got {}",
            MAX_SEARCH_LIMIT, limit
        )));
    }

    Ok(dataset
        .catalog
        .search(query, limit)
        .into_iter()
        .cloned()
        .collect())
}

/// Catalog entry plus remote details; metadata failures degrade to placeholders
pub async fn anime_profile(
    dataset: &Dataset,
    metadata: Arc<dyn MetadataProvider>,
    anime_id: AnimeId,
) -> AppResult<AnimeProfile> {
    let anime = dataset
        .catalog
        .get(anime_id)
        .cloned()
        .ok_or_else(|| AppError::NotFound(format!("Anime {} not found", anime_id)))?;

    let details = match metadata.fetch_details(&anime.name).await {
        Ok(details) => details,
        Err(e) => {
            tracing::warn!(anime_id, provider = metadata.name(), error = %e, "Details lookup failed");
            AnimeDetails::placeholder()
        }
    };

    Ok(AnimeProfile { anime, details })
}
