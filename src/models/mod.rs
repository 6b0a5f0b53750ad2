use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod feedback;

pub use feedback::{FeedbackEntry, FeedbackKind, FeedbackLog};

/// Identifier of an anime in the catalog (MyAnimeList id)
pub type AnimeId = u32;

/// Identifier of a user in the ratings table
pub type UserId = u32;

/// An anime as listed in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Anime {
    pub anime_id: AnimeId,
    pub name: String,
    /// Comma-separated genre list, empty when unknown
    pub genre: String,
    /// Release format ("TV", "Movie", "OVA", ...)
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub episodes: Option<u32>,
    /// Community average score
    pub rating: Option<f64>,
    pub members: Option<u64>,
}

impl Anime {
    /// Genres as trimmed, non-empty tokens in catalog order
    pub fn genres(&self) -> impl Iterator<Item = &str> {
        self.genre.split(',').map(str::trim).filter(|g| !g.is_empty())
    }
}

/// A single explicit user rating on the 1..=10 scale
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rating {
    pub user_id: UserId,
    pub anime_id: AnimeId,
    pub rating: f64,
}

/// A candidate produced by one recommender
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredAnime {
    pub anime_id: AnimeId,
    pub score: f64,
}

impl ScoredAnime {
    pub fn new(anime_id: AnimeId, score: f64) -> Self {
        Self { anime_id, score }
    }
}

/// Blend weights for the three recommenders
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Weights {
    pub svd: f64,
    pub neural: f64,
    pub content: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            svd: 0.4,
            neural: 0.3,
            content: 0.3,
        }
    }
}

impl Weights {
    /// Builds weights from the SVD and neural sliders; the content weight takes
    /// whatever is left, rounded to one decimal and floored at zero.
    pub fn from_sliders(svd: f64, neural: f64) -> Self {
        let content = ((1.0 - svd - neural) * 10.0).round() / 10.0;
        Self {
            svd,
            neural,
            content: content.max(0.0),
        }
    }

    pub fn total(&self) -> f64 {
        self.svd + self.neural + self.content
    }

    /// Short human-readable summary shown next to each recommendation
    pub fn explanation(&self) -> String {
        format!(
            "SVD: {:.1}, NN: {:.1}, Content: {:.1}",
            self.svd, self.neural, self.content
        )
    }
}

/// Readiness of each trained recommender
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ModelStatus {
    pub svd: bool,
    pub neural: bool,
    pub content: bool,
}

impl ModelStatus {
    pub fn all_ready(&self) -> bool {
        self.svd && self.neural && self.content
    }
}

/// Request body for `POST /api/v1/recommendations`
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: UserId,
    /// Titles the user has enjoyed, matched against catalog names
    #[serde(default)]
    pub selected_anime: Vec<String>,
    /// SVD weight (alpha)
    #[serde(default)]
    pub svd_weight: Option<f64>,
    /// Neural weight (beta)
    #[serde(default)]
    pub neural_weight: Option<f64>,
    /// Content weight (gamma); derived from the other two when omitted
    #[serde(default)]
    pub content_weight: Option<f64>,
    #[serde(default)]
    pub top_n: Option<usize>,
}

/// One ranked item returned to the client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recommendation {
    pub anime_id: AnimeId,
    pub name: String,
    pub genre: String,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub rating: Option<f64>,
    pub svd_score: f64,
    pub neural_score: f64,
    pub content_score: f64,
    pub final_score: f64,
    pub image_url: String,
    pub explanation: String,
}

/// Response body for `POST /api/v1/recommendations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<Recommendation>,
    /// Weights requested by the client
    pub requested_weights: Weights,
    /// Weights actually applied after redistributing empty components
    pub effective_weights: Weights,
    /// Genre → number of returned items carrying it
    pub genre_distribution: BTreeMap<String, usize>,
}

/// Extra information about an anime fetched from the metadata service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimeDetails {
    pub image_url: String,
    pub synopsis: Option<String>,
    pub trailer_url: Option<String>,
    pub episodes: Option<u32>,
    pub genres: Option<Vec<String>>,
}

/// Image shown when no poster could be found
pub const PLACEHOLDER_IMAGE_URL: &str =
    "https://via.placeholder.com/120/ff4baf/ffffff?text=No+Image";

impl AnimeDetails {
    pub fn placeholder() -> Self {
        Self {
            image_url: PLACEHOLDER_IMAGE_URL.to_string(),
            synopsis: None,
            trailer_url: None,
            episodes: None,
            genres: None,
        }
    }
}

/// Catalog entry combined with remote details, for `GET /api/v1/anime/:id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimeProfile {
    #[serde(flatten)]
    pub anime: Anime,
    pub details: AnimeDetails,
}

// ============================================================================
// Jikan API Types
// ============================================================================

/// Response of `GET /anime?q=...`
#[derive(Debug, Clone, Deserialize)]
pub struct JikanSearchResponse {
    #[serde(default)]
    pub data: Vec<JikanAnime>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanAnime {
    pub images: JikanImages,
    #[serde(default)]
    pub synopsis: Option<String>,
    #[serde(default)]
    pub trailer: Option<JikanTrailer>,
    #[serde(default)]
    pub episodes: Option<u32>,
    #[serde(default)]
    pub genres: Vec<JikanGenre>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanImages {
    pub jpg: JikanImage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanImage {
    #[serde(default)]
    pub large_image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanTrailer {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JikanGenre {
    pub name: String,
}

impl From<JikanAnime> for AnimeDetails {
    fn from(anime: JikanAnime) -> Self {
        AnimeDetails {
            image_url: anime
                .images
                .jpg
                .large_image_url
                .unwrap_or_else(|| PLACEHOLDER_IMAGE_URL.to_string()),
            synopsis: anime.synopsis,
            trailer_url: anime.trailer.and_then(|t| t.url),
            episodes: anime.episodes,
            genres: Some(anime.genres.into_iter().map(|g| g.name).collect()),
        }
    }
}
