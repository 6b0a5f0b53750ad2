//! Weighted score fusion across the three recommenders.
//!
//! The recommenders score on different scales (predicted ratings on 1..=10,
//! unbounded regression outputs, cosine similarities on 0..=1), so each
//! column is min-max normalised over the merged candidate set before the
//! weighted sum. Candidates missing from a component score 0 there.

use std::collections::BTreeMap;

use crate::models::{AnimeId, ScoredAnime, Weights};

/// Raw candidate lists from each recommender
#[derive(Debug, Clone, Default)]
pub struct ComponentCandidates {
    pub svd: Vec<ScoredAnime>,
    pub neural: Vec<ScoredAnime>,
    pub content: Vec<ScoredAnime>,
}

/// Normalised component scores and the blended score for one anime
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedScore {
    pub anime_id: AnimeId,
    pub svd: f64,
    pub neural: f64,
    pub content: f64,
    pub final_score: f64,
}

/// Fusion output
#[derive(Debug, Clone, PartialEq)]
pub struct Fusion {
    /// Best first, at most `top_n` entries
    pub ranked: Vec<FusedScore>,
    /// Weights after redistribution; sum to 1 unless every component was empty
    pub weights: Weights,
}

/// Share given to SVD when exactly one of neural / content is empty
pub const FALLBACK_SVD_WEIGHT: f64 = 0.6;
/// Share given to whichever of neural / content still has candidates
pub const FALLBACK_OTHER_WEIGHT: f64 = 0.4;

/// Weights actually applied given which components produced candidates.
///
/// * all three: the requested weights, rescaled to sum to 1;
/// * SVD plus one of neural / content: a fixed 0.6 / 0.4 split, whatever
///   was requested;
/// * SVD alone: SVD gets everything;
/// * no SVD: the requested weights of the remaining components, rescaled,
///   or an equal split when those are all zero;
/// * nothing: all zero.
pub fn effective_weights(requested: Weights, svd: bool, neural: bool, content: bool) -> Weights {
    let only = |svd: f64, neural: f64, content: f64| Weights {
        svd,
        neural,
        content,
    };

    match (svd, neural, content) {
        (true, true, false) => only(FALLBACK_SVD_WEIGHT, FALLBACK_OTHER_WEIGHT, 0.0),
        (true, false, true) => only(FALLBACK_SVD_WEIGHT, 0.0, FALLBACK_OTHER_WEIGHT),
        (true, false, false) => only(1.0, 0.0, 0.0),
        (false, false, false) => only(0.0, 0.0, 0.0),
        _ => rescale(requested, svd, neural, content),
    }
}

/// Rescales the requested weights of the available components to sum to 1
fn rescale(requested: Weights, svd: bool, neural: bool, content: bool) -> Weights {
    let pick = |available: bool, weight: f64| if available { weight.max(0.0) } else { 0.0 };
    let mut weights = Weights {
        svd: pick(svd, requested.svd),
        neural: pick(neural, requested.neural),
        content: pick(content, requested.content),
    };

    let total = weights.total();
    if total > 0.0 {
        weights.svd /= total;
        weights.neural /= total;
        weights.content /= total;
    } else {
        let available = [svd, neural, content].iter().filter(|a| **a).count();
        let share = 1.0 / available as f64;
        weights.svd = pick(svd, share);
        weights.neural = pick(neural, share);
        weights.content = pick(content, share);
    }
    weights
}

/// Min-max normalises a column in place; constant columns are left as-is
fn min_max_normalize(values: &mut [f64]) {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if max > min {
        let range = max - min;
        values.iter_mut().for_each(|v| *v = (*v - min) / range);
    }
}

/// Merges, normalises and blends the candidate lists, returning the `top_n` best
pub fn fuse(candidates: &ComponentCandidates, requested: Weights, top_n: usize) -> Fusion {
    let weights = effective_weights(
        requested,
        !candidates.svd.is_empty(),
        !candidates.neural.is_empty(),
        !candidates.content.is_empty(),
    );

    // Outer join on anime id; absent scores stay 0.
    let mut merged: BTreeMap<AnimeId, [f64; 3]> = BTreeMap::new();
    let columns = [&candidates.svd, &candidates.neural, &candidates.content];
    for (col, list) in columns.iter().enumerate() {
        for scored in list.iter() {
            merged.entry(scored.anime_id).or_insert([0.0; 3])[col] = scored.score;
        }
    }

    if merged.is_empty() {
        return Fusion {
            ranked: Vec::new(),
            weights,
        };
    }

    let ids: Vec<AnimeId> = merged.keys().copied().collect();
    let mut table: [Vec<f64>; 3] = [
        merged.values().map(|s| s[0]).collect(),
        merged.values().map(|s| s[1]).collect(),
        merged.values().map(|s| s[2]).collect(),
    ];
    table.iter_mut().for_each(|column| min_max_normalize(column));

    let mut ranked: Vec<FusedScore> = ids
        .iter()
        .enumerate()
        .map(|(row, &anime_id)| {
            let (svd, neural, content) = (table[0][row], table[1][row], table[2][row]);
            FusedScore {
                anime_id,
                svd,
                neural,
                content,
                final_score: weights.svd * svd + weights.neural * neural + weights.content * content,
            }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.final_score
            .total_cmp(&a.final_score)
            .then_with(|| a.anime_id.cmp(&b.anime_id))
    });
    ranked.truncate(top_n);

    Fusion { ranked, weights }
}
