//! Biased matrix factorization ("SVD" in the Funk / Surprise sense).
//!
//! ```text
//! r̂(u, i) = μ + b_u + b_i + q_i · p_u
//! ```
//!
//! Trained with plain SGD over the ratings in dataset order. Terms for a
//! user or item absent from training are dropped from the estimate, which
//! is then clipped to the rating scale.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

use super::{top_k, CandidateQuery, Recommender};
use crate::{
    data::Dataset,
    error::{AppError, AppResult},
    models::{AnimeId, Rating, ScoredAnime, UserId},
};

/// Training hyper-parameters
#[derive(Debug, Clone)]
pub struct SvdParams {
    pub n_factors: usize,
    pub n_epochs: usize,
    pub learning_rate: f64,
    pub regularization: f64,
    /// Standard deviation of the initial factor values
    pub init_std: f64,
    pub rating_scale: (f64, f64),
    pub seed: u64,
}

impl Default for SvdParams {
    fn default() -> Self {
        Self {
            n_factors: 100,
            n_epochs: 20,
            learning_rate: 0.005,
            regularization: 0.02,
            init_std: 0.1,
            rating_scale: (1.0, 10.0),
            seed: 42,
        }
    }
}

/// Learned biases and latent factors
#[derive(Debug, Clone)]
pub struct SvdModel {
    global_mean: f64,
    users: HashMap<UserId, usize>,
    items: HashMap<AnimeId, usize>,
    user_bias: Vec<f64>,
    item_bias: Vec<f64>,
    /// Row-major `n_users × n_factors`
    user_factors: Vec<f64>,
    /// Row-major `n_items × n_factors`
    item_factors: Vec<f64>,
    n_factors: usize,
    rating_scale: (f64, f64),
}

/// Box-Muller draw from N(mean, std)
pub(crate) fn sample_normal(rng: &mut StdRng, mean: f64, std: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    mean + std * z
}

impl SvdModel {
    /// Fits the model on explicit ratings
    #[instrument(skip_all, fields(ratings = ratings.len(), factors = params.n_factors, epochs = params.n_epochs))]
    pub fn fit(ratings: &[Rating], params: &SvdParams) -> AppResult<Self> {
        if ratings.is_empty() {
            return Err(AppError::Model(
                "Cannot train SVD model without ratings".to_string(),
            ));
        }
        if params.n_factors == 0 {
            return Err(AppError::Model("n_factors must be positive".to_string()));
        }

        let mut users = HashMap::new();
        let mut items = HashMap::new();
        let mut encoded = Vec::with_capacity(ratings.len());
        for r in ratings {
            let next_user = users.len();
            let u = *users.entry(r.user_id).or_insert(next_user);
            let next_item = items.len();
            let i = *items.entry(r.anime_id).or_insert(next_item);
            encoded.push((u, i, r.rating));
        }

        let k = params.n_factors;
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut draw = |n: usize| -> Vec<f64> {
            (0..n)
                .map(|_| sample_normal(&mut rng, 0.0, params.init_std))
                .collect()
        };
        let user_factors = draw(users.len() * k);
        let item_factors = draw(items.len() * k);

        let global_mean = ratings.iter().map(|r| r.rating).sum::<f64>() / ratings.len() as f64;

        let mut model = Self {
            global_mean,
            user_bias: vec![0.0; users.len()],
            item_bias: vec![0.0; items.len()],
            users,
            items,
            user_factors,
            item_factors,
            n_factors: k,
            rating_scale: params.rating_scale,
        };

        let lr = params.learning_rate;
        let reg = params.regularization;
        for epoch in 0..params.n_epochs {
            let mut squared_error = 0.0;
            for &(u, i, rating) in &encoded {
                let err = rating - model.raw_estimate(u, i);
                squared_error += err * err;

                model.user_bias[u] += lr * (err - reg * model.user_bias[u]);
                model.item_bias[i] += lr * (err - reg * model.item_bias[i]);

                let (pu, qi) = (u * k, i * k);
                for f in 0..k {
                    let puf = model.user_factors[pu + f];
                    let qif = model.item_factors[qi + f];
                    model.user_factors[pu + f] += lr * (err * qif - reg * puf);
                    model.item_factors[qi + f] += lr * (err * puf - reg * qif);
                }
            }

            tracing::debug!(
                epoch,
                rmse = (squared_error / encoded.len() as f64).sqrt(),
                "SVD epoch finished"
            );
        }

        tracing::info!(
            users = model.users.len(),
            items = model.items.len(),
            global_mean = model.global_mean,
            "SVD model trained"
        );

        Ok(model)
    }

    fn raw_estimate(&self, u: usize, i: usize) -> f64 {
        let k = self.n_factors;
        let dot: f64 = self.user_factors[u * k..(u + 1) * k]
            .iter()
            .zip(&self.item_factors[i * k..(i + 1) * k])
            .map(|(p, q)| p * q)
            .sum();
        self.global_mean + self.user_bias[u] + self.item_bias[i] + dot
    }

    /// Estimated rating, clipped to the rating scale
    pub fn predict(&self, user_id: UserId, anime_id: AnimeId) -> f64 {
        let user = self.users.get(&user_id).copied();
        let item = self.items.get(&anime_id).copied();

        let estimate = match (user, item) {
            (Some(u), Some(i)) => self.raw_estimate(u, i),
            (Some(u), None) => self.global_mean + self.user_bias[u],
            (None, Some(i)) => self.global_mean + self.item_bias[i],
            (None, None) => self.global_mean,
        };

        let (low, high) = self.rating_scale;
        estimate.clamp(low, high)
    }

    pub fn knows_user(&self, user_id: UserId) -> bool {
        self.users.contains_key(&user_id)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

/// Collaborative-filtering candidates from the factor model
pub struct SvdRecommender {
    model: SvdModel,
    dataset: Arc<Dataset>,
}

impl SvdRecommender {
    pub fn train(dataset: Arc<Dataset>, params: &SvdParams) -> AppResult<Self> {
        let model = SvdModel::fit(&dataset.ratings, params)?;
        Ok(Self { model, dataset })
    }
}

impl Recommender for SvdRecommender {
    fn recommend(&self, query: &CandidateQuery<'_>) -> Vec<ScoredAnime> {
        let rated = self.dataset.rated_by(query.user_id);

        let scored = self
            .dataset
            .catalog
            .iter()
            .map(|anime| anime.anime_id)
            .filter(|id| !rated.contains(id) && !query.selected.contains(id))
            .map(|id| ScoredAnime::new(id, self.model.predict(query.user_id, id)))
            .collect();

        top_k(scored, query.limit)
    }

    fn is_ready(&self) -> bool {
        self.model.user_count() > 0
    }

    fn name(&self) -> &'static str {
        "svd"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::small_dataset;

    fn quick_params() -> SvdParams {
        SvdParams {
            n_factors: 8,
            n_epochs: 200,
            learning_rate: 0.01,
            ..SvdParams::default()
        }
    }

    #[test]
    fn test_fit_rejects_empty_ratings() {
        assert!(SvdModel::fit(&[], &SvdParams::default()).is_err());
    }

    #[test]
    fn test_predictions_stay_in_scale() {
        let dataset = small_dataset();
        let model = SvdModel::fit(&dataset.ratings, &quick_params()).unwrap();
        for anime in dataset.catalog.iter() {
            for user in 0..10 {
                let p = model.predict(user, anime.anime_id);
                assert!((1.0..=10.0).contains(&p), "prediction {p} out of scale");
            }
        }
    }

    #[test]
    fn test_fits_training_ratings() {
        let dataset = small_dataset();
        let model = SvdModel::fit(&dataset.ratings, &quick_params()).unwrap();
        assert!(model.predict(1, 1) > model.predict(1, 4));
        assert!(model.predict(4, 4) > model.predict(4, 2));
    }

    #[test]
    fn test_unknown_user_gets_item_bias_ranking() {
        let dataset = small_dataset();
        let model = SvdModel::fit(&dataset.ratings, &quick_params()).unwrap();
        assert!(!model.knows_user(999));
        assert_eq!(model.user_count(), 6);
        // Anime 1 is rated 10 by everyone who saw it, anime 2 is divisive.
        assert!(model.predict(999, 1) > model.predict(999, 2));
    }

    #[test]
    fn test_training_is_deterministic() {
        let dataset = small_dataset();
        let a = SvdModel::fit(&dataset.ratings, &quick_params()).unwrap();
        let b = SvdModel::fit(&dataset.ratings, &quick_params()).unwrap();
        assert_eq!(a.predict(3, 5), b.predict(3, 5));
    }

    #[test]
    fn test_recommend_excludes_rated_and_selected() {
        let dataset = Arc::new(small_dataset());
        let recommender = SvdRecommender::train(dataset, &quick_params()).unwrap();

        let selected = [6];
        let query = CandidateQuery {
            user_id: 1,
            selected: &selected,
            limit: 10,
        };
        let ids: Vec<AnimeId> = recommender
            .recommend(&query)
            .iter()
            .map(|s| s.anime_id)
            .collect();

        // User 1 rated 1, 2, 3 and 4; 6 is selected.
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&5) && ids.contains(&7));
    }

    #[test]
    fn test_recommend_respects_limit() {
        let dataset = Arc::new(small_dataset());
        let recommender = SvdRecommender::train(dataset, &quick_params()).unwrap();
        let query = CandidateQuery {
            user_id: 999,
            selected: &[],
            limit: 3,
        };
        let recs = recommender.recommend(&query);
        assert_eq!(recs.len(), 3);
        assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
