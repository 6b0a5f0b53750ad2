//! Genre similarity.
//!
//! Each anime's genre list is turned into a TF-IDF vector, one term per
//! comma-separated genre, so multi-word genres like "Martial Arts" stay a
//! single feature. Rows are L2-normalised, which makes cosine similarity a
//! plain dot product.

use std::collections::HashMap;
use std::sync::Arc;

use super::{top_k, CandidateQuery, Recommender};
use crate::{
    data::{Catalog, Dataset},
    models::ScoredAnime,
};

/// Sparse TF-IDF vector: `(term index, weight)` sorted by term index
type SparseVector = Vec<(usize, f64)>;

/// Genre TF-IDF matrix over the whole catalog, in catalog order
#[derive(Debug, Clone, Default)]
pub struct GenreIndex {
    vocabulary: HashMap<String, usize>,
    rows: Vec<SparseVector>,
}

fn genre_terms(genre: &str) -> impl Iterator<Item = String> + '_ {
    genre
        .split(',')
        .map(|g| g.trim().to_lowercase())
        .filter(|g| !g.is_empty())
}

impl GenreIndex {
    pub fn build(catalog: &Catalog) -> Self {
        let mut vocabulary: HashMap<String, usize> = HashMap::new();
        let mut counts: Vec<HashMap<usize, f64>> = Vec::with_capacity(catalog.len());
        let mut document_frequency: Vec<usize> = Vec::new();

        for anime in catalog.iter() {
            let mut tf: HashMap<usize, f64> = HashMap::new();
            for term in genre_terms(&anime.genre) {
                let next = vocabulary.len();
                let idx = *vocabulary.entry(term).or_insert(next);
                if idx == document_frequency.len() {
                    document_frequency.push(0);
                }
                *tf.entry(idx).or_insert(0.0) += 1.0;
            }
            for &idx in tf.keys() {
                document_frequency[idx] += 1;
            }
            counts.push(tf);
        }

        // Smoothed idf: ln((1 + n) / (1 + df)) + 1
        let n = catalog.len() as f64;
        let idf: Vec<f64> = document_frequency
            .iter()
            .map(|&df| ((1.0 + n) / (1.0 + df as f64)).ln() + 1.0)
            .collect();

        let rows = counts
            .into_iter()
            .map(|tf| {
                let mut row: SparseVector = tf
                    .into_iter()
                    .map(|(idx, count)| (idx, count * idf[idx]))
                    .collect();
                let norm = row.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
                if norm > 0.0 {
                    row.iter_mut().for_each(|(_, w)| *w /= norm);
                }
                row.sort_by_key(|(idx, _)| *idx);
                row
            })
            .collect();

        Self { vocabulary, rows }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Cosine similarity between two catalog rows
    pub fn similarity(&self, a: usize, b: usize) -> f64 {
        let (mut i, mut j) = (0, 0);
        let (ra, rb) = (&self.rows[a], &self.rows[b]);
        let mut dot = 0.0;
        while i < ra.len() && j < rb.len() {
            match ra[i].0.cmp(&rb[j].0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    dot += ra[i].1 * rb[j].1;
                    i += 1;
                    j += 1;
                }
            }
        }
        dot
    }

    /// Mean similarity of every row to the given rows
    pub fn mean_similarity(&self, selected: &[usize]) -> Vec<f64> {
        if selected.is_empty() {
            return vec![0.0; self.rows.len()];
        }

        let mut profile: HashMap<usize, f64> = HashMap::new();
        for &s in selected {
            for &(idx, w) in &self.rows[s] {
                *profile.entry(idx).or_insert(0.0) += w;
            }
        }

        let count = selected.len() as f64;
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|(idx, w)| profile.get(idx).map(|p| p * w))
                    .sum::<f64>()
                    / count
            })
            .collect()
    }
}

/// Content-based candidates similar in genre to the selected titles
pub struct ContentRecommender {
    index: GenreIndex,
    dataset: Arc<Dataset>,
}

impl ContentRecommender {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        let index = GenreIndex::build(&dataset.catalog);
        tracing::info!(
            genres = index.vocabulary_size(),
            anime = dataset.catalog.len(),
            "Genre index built"
        );
        Self { index, dataset }
    }
}

impl Recommender for ContentRecommender {
    fn recommend(&self, query: &CandidateQuery<'_>) -> Vec<ScoredAnime> {
        let catalog = &self.dataset.catalog;
        let selected_rows: Vec<usize> = query
            .selected
            .iter()
            .filter_map(|&id| catalog.index_of(id))
            .collect();

        if selected_rows.is_empty() {
            return Vec::new();
        }

        let scores = self.index.mean_similarity(&selected_rows);
        let scored = scores
            .into_iter()
            .enumerate()
            .map(|(row, score)| (catalog.at(row).anime_id, score))
            .filter(|(id, _)| !query.selected.contains(id))
            .map(|(id, score)| ScoredAnime::new(id, score))
            .collect();

        top_k(scored, query.limit)
    }

    fn is_ready(&self) -> bool {
        self.index.vocabulary_size() > 0
    }

    fn name(&self) -> &'static str {
        "content"
    }
}
