//! Candidate generators feeding the hybrid ranking.
//!
//! Each recommender is trained independently on the same dataset and only
//! meets the others at the fusion step. They are CPU-bound and synchronous;
//! callers move them off the async runtime.

use std::cmp::Ordering;

use crate::models::{AnimeId, ScoredAnime, UserId};

pub mod content;
pub mod neural;
pub mod svd;

pub use content::ContentRecommender;
pub use neural::{NeuralParams, NeuralRecommender};
pub use svd::{SvdParams, SvdRecommender};

/// What a recommender is asked for
#[derive(Debug, Clone, Copy)]
pub struct CandidateQuery<'a> {
    pub user_id: UserId,
    /// Titles the user picked as favourites; never returned as candidates
    pub selected: &'a [AnimeId],
    pub limit: usize,
}

/// A trained candidate generator
pub trait Recommender: Send + Sync {
    /// Top candidates, best first. An empty result means the recommender has
    /// nothing to say for this query and is left out of the blend.
    fn recommend(&self, query: &CandidateQuery<'_>) -> Vec<ScoredAnime>;

    /// Whether the recommender has anything to score with
    fn is_ready(&self) -> bool;

    /// Recommender name for logging
    fn name(&self) -> &'static str;
}

/// Orders candidates by descending score, ties by ascending id
pub fn rank_order(a: &ScoredAnime, b: &ScoredAnime) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.anime_id.cmp(&b.anime_id))
}

/// Keeps the `k` best candidates in rank order
pub fn top_k(mut scored: Vec<ScoredAnime>, k: usize) -> Vec<ScoredAnime> {
    scored.retain(|s| s.score.is_finite());
    scored.sort_by(rank_order);
    scored.truncate(k);
    scored
}
