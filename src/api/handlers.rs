use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    data::DatasetStatus,
    error::{AppError, AppResult},
    models::{
        Anime, AnimeId, AnimeProfile, FeedbackEntry, FeedbackKind, ModelStatus,
        RecommendationRequest, RecommendationResponse, UserId,
    },
    services::{anime_search, recommendations},
};

use super::AppState;

// Request/Response types

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub dataset: DatasetStatus,
    pub models: ModelStatus,
    pub metadata_provider: &'static str,
    pub cache_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub user_id: UserId,
    pub anime_id: AnimeId,
    pub kind: FeedbackKind,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub user_id: UserId,
    pub entries: Vec<FeedbackEntry>,
    pub liked: Vec<AnimeId>,
    pub disliked: Vec<AnimeId>,
}

// Handlers

/// Health check endpoint; "degraded" when a recommender has nothing to work with
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let models = state.engine.model_status();
    Json(HealthResponse {
        status: if models.all_ready() { "healthy" } else { "degraded" },
        dataset: state.dataset().status(),
        models,
        metadata_provider: state.metadata.name(),
        cache_enabled: state.cache.is_some(),
    })
}

/// Search the catalog by name
pub async fn search_anime(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<Vec<Anime>>> {
    let anime = anime_search::search_catalog(state.dataset(), &params.q, params.limit)?;
    Ok(Json(anime))
}

/// Catalog entry with poster, synopsis and trailer
pub async fn get_anime(
    State(state): State<AppState>,
    Path(anime_id): Path<AnimeId>,
) -> AppResult<Json<AnimeProfile>> {
    let profile =
        anime_search::anime_profile(state.dataset(), state.metadata.clone(), anime_id).await?;
    Ok(Json(profile))
}

/// Hybrid recommendations for a user and their favourite titles
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    let response = recommendations::get_recommendations(
        state.engine.clone(),
        state.metadata.clone(),
        state.cache.as_ref(),
        request,
    )
    .await?;
    Ok(Json(response))
}

/// Record a like or dislike
pub async fn record_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> AppResult<(StatusCode, Json<FeedbackEntry>)> {
    if state.dataset().catalog.get(request.anime_id).is_none() {
        return Err(AppError::NotFound(format!(
            "Anime {} not found",
            request.anime_id
        )));
    }

    let mut feedback = state.feedback.write().await;
    let entry = feedback.record(request.user_id, request.anime_id, request.kind);

    tracing::info!(
        user_id = request.user_id,
        anime_id = request.anime_id,
        kind = ?request.kind,
        "Feedback recorded"
    );

    Ok((StatusCode::CREATED, Json(entry)))
}

/// A user's feedback so far
pub async fn get_feedback(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Json<FeedbackResponse> {
    let feedback = state.feedback.read().await;
    Json(FeedbackResponse {
        user_id,
        entries: feedback.for_user(user_id).to_vec(),
        liked: feedback.liked(user_id),
        disliked: feedback.disliked(user_id),
    })
}
