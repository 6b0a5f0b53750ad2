use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::instrument;

use crate::{
    cached,
    data::Dataset,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{
        Anime, AnimeId, ModelStatus, Recommendation, RecommendationRequest,
        RecommendationResponse, UserId, Weights,
    },
    services::{
        hybrid::{self, ComponentCandidates},
        metadata::{self, MetadataProvider},
        recommenders::{
            CandidateQuery, ContentRecommender, NeuralParams, NeuralRecommender, Recommender,
            SvdParams, SvdRecommender,
        },
    },
};

pub const DEFAULT_TOP_N: usize = 5;
pub const MAX_TOP_N: usize = 50;

const RECOMMENDATION_CACHE_TTL: u64 = 600; // 10 minutes

/// The three trained recommenders over one dataset
pub struct RecommendationEngine {
    dataset: Arc<Dataset>,
    svd: Box<dyn Recommender>,
    neural: Box<dyn Recommender>,
    content: Box<dyn Recommender>,
}

impl RecommendationEngine {
    /// Trains every recommender. CPU-bound; call from a blocking context.
    #[instrument(skip_all, fields(ratings = dataset.ratings.len(), anime = dataset.catalog.len()))]
    pub fn train(
        dataset: Arc<Dataset>,
        svd_params: &SvdParams,
        neural_params: &NeuralParams,
    ) -> AppResult<Self> {
        let started = std::time::Instant::now();
        let svd = SvdRecommender::train(Arc::clone(&dataset), svd_params)?;
        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "SVD model trained");

        let started = std::time::Instant::now();
        let neural = NeuralRecommender::train(Arc::clone(&dataset), neural_params)?;
        tracing::info!(elapsed_ms = started.elapsed().as_millis() as u64, "Neural model trained");

        let content = ContentRecommender::new(Arc::clone(&dataset));

        Ok(Self::from_parts(
            dataset,
            Box::new(svd),
            Box::new(neural),
            Box::new(content),
        ))
    }

    pub fn from_parts(
        dataset: Arc<Dataset>,
        svd: Box<dyn Recommender>,
        neural: Box<dyn Recommender>,
        content: Box<dyn Recommender>,
    ) -> Self {
        Self {
            dataset,
            svd,
            neural,
            content,
        }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn model_status(&self) -> ModelStatus {
        ModelStatus {
            svd: self.svd.is_ready(),
            neural: self.neural.is_ready(),
            content: self.content.is_ready(),
        }
    }

    /// Collects up to `limit` candidates from each recommender
    #[instrument(skip(self, selected), fields(selected_count = selected.len()))]
    pub fn candidates(&self, user_id: UserId, selected: &[AnimeId], limit: usize) -> ComponentCandidates {
        let query = CandidateQuery {
            user_id,
            selected,
            limit,
        };

        let run = |recommender: &dyn Recommender| {
            let scored = recommender.recommend(&query);
            tracing::debug!(recommender = recommender.name(), count = scored.len(), "Candidates generated");
            scored
        };

        ComponentCandidates {
            svd: run(self.svd.as_ref()),
            neural: run(self.neural.as_ref()),
            content: run(self.content.as_ref()),
        }
    }
}

/// Weights from a request. Without an explicit content weight the content
/// share is derived from the other two, the way the dashboard sliders work.
pub fn resolve_weights(request: &RecommendationRequest) -> AppResult<Weights> {
    let defaults = Weights::default();
    let svd = request.svd_weight.unwrap_or(defaults.svd);
    let neural = request.neural_weight.unwrap_or(defaults.neural);

    let weights = match request.content_weight {
        Some(content) => Weights {
            svd,
            neural,
            content,
        },
        None => Weights::from_sliders(svd, neural),
    };

    for (name, value) in [
        ("svd_weight", weights.svd),
        ("neural_weight", weights.neural),
        ("content_weight", weights.content),
    ] {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(AppError::InvalidInput(format!(
                "{} must be between 0 and 1, got {}",
                name, value
            )));
        }
    }

    Ok(weights)
}

pub fn resolve_top_n(top_n: Option<usize>) -> AppResult<usize> {
    let top_n = top_n.unwrap_or(DEFAULT_TOP_N);
    if !(1..=MAX_TOP_N).contains(&top_n) {
        return Err(AppError::InvalidInput(format!(
            "top_n must be between 1 and {}, got {}",
            MAX_TOP_N, top_n
        )));
    }
    Ok(top_n)
}

fn fingerprint(user_id: UserId, selected: &[AnimeId], weights: &Weights, top_n: usize) -> String {
    let mut ids = selected.to_vec();
    ids.sort_unstable();
    let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!(
        "{}|{}|{:.3},{:.3},{:.3}|{}",
        user_id,
        ids.join(","),
        weights.svd,
        weights.neural,
        weights.content,
        top_n
    )
}

/// Genre → number of returned titles carrying it
pub fn genre_distribution<'a>(anime: impl IntoIterator<Item = &'a Anime>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for genre in anime.into_iter().flat_map(Anime::genres) {
        *counts.entry(genre.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Generates hybrid recommendations for a user
///
/// Selected titles are matched against catalog names; unknown names are
/// skipped. Each recommender contributes `2 * top_n` candidates, which are
/// fused, joined with catalog details and decorated with poster URLs.
#[instrument(skip_all, fields(user_id = request.user_id))]
pub async fn get_recommendations(
    engine: Arc<RecommendationEngine>,
    metadata: Arc<dyn MetadataProvider>,
    cache: Option<&Cache>,
    request: RecommendationRequest,
) -> AppResult<RecommendationResponse> {
    let weights = resolve_weights(&request)?;
    let top_n = resolve_top_n(request.top_n)?;
    let user_id = request.user_id;

    let selected = engine.dataset().catalog.resolve_names(&request.selected_anime);
    if selected.len() < request.selected_anime.len() {
        tracing::warn!(
            requested = request.selected_anime.len(),
            matched = selected.len(),
            "Some selected titles are not in the catalog"
        );
    }

    cached!(
        cache,
        CacheKey::Recommendations(fingerprint(user_id, &selected, &weights, top_n)),
        RECOMMENDATION_CACHE_TTL,
        async move { build_response(engine, metadata, user_id, selected, weights, top_n).await }
    )
}

async fn build_response(
    engine: Arc<RecommendationEngine>,
    metadata: Arc<dyn MetadataProvider>,
    user_id: UserId,
    selected: Vec<AnimeId>,
    weights: Weights,
    top_n: usize,
) -> AppResult<RecommendationResponse> {
    let candidate_engine = Arc::clone(&engine);
    let candidates = tokio::task::spawn_blocking(move || {
        candidate_engine.candidates(user_id, &selected, top_n * 2)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Candidate generation failed: {}", e)))?;

    let fusion = hybrid::fuse(&candidates, weights, top_n);
    let catalog = &engine.dataset().catalog;

    let rows: Vec<_> = fusion
        .ranked
        .iter()
        .filter_map(|fused| catalog.get(fused.anime_id).map(|anime| (fused, anime)))
        .collect();

    let distribution = genre_distribution(rows.iter().map(|(_, anime)| *anime));
    let titles = rows.iter().map(|(_, anime)| anime.name.clone()).collect();
    let images = metadata::fetch_images(metadata, titles).await;

    let explanation = weights.explanation();
    let recommendations: Vec<Recommendation> = rows
        .into_iter()
        .zip(images)
        .map(|((fused, anime), image_url)| Recommendation {
            anime_id: anime.anime_id,
            name: anime.name.clone(),
            genre: anime.genre.clone(),
            kind: anime.kind.clone(),
            rating: anime.rating,
            svd_score: fused.svd,
            neural_score: fused.neural,
            content_score: fused.content,
            final_score: fused.final_score,
            image_url,
            explanation: explanation.clone(),
        })
        .collect();

    tracing::info!(
        count = recommendations.len(),
        svd = candidates.svd.len(),
        neural = candidates.neural.len(),
        content = candidates.content.len(),
        "Recommendations generated"
    );

    Ok(RecommendationResponse {
        genre_distribution: distribution,
        recommendations,
        requested_weights: weights,
        effective_weights: fusion.weights,
    })
}
