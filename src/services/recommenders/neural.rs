//! Neural collaborative filtering.
//!
//! Users and anime are label-encoded and mapped to learned embeddings. The
//! two embeddings are concatenated and passed through a small ReLU MLP that
//! regresses the rating:
//!
//! ```text
//! [user_emb ‖ anime_emb] → Dense(128, relu) → Dense(64, relu) → Dense(32, relu) → Dense(1)
//! ```
//!
//! Trained with Adam on mean squared error over mini-batches, holding out the
//! tail of the shuffled sample for early stopping.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashMap};
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
pub struct NeuralParams {
    pub embedding_dim: usize,
    pub hidden_layers: Vec<usize>,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// Maximum number of ratings drawn for training
    pub sample_size: usize,
    /// Fraction of the sample held out for validation
    pub validation_split: f64,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    pub seed: u64,
}

impl Default for NeuralParams {
    fn default() -> Self {
        Self {
            embedding_dim: 50,
            hidden_layers: vec![128, 64, 32],
            epochs: 5,
            batch_size: 64,
            learning_rate: 0.001,
            sample_size: 100_000,
            validation_split: 0.1,
            patience: 3,
            seed: 42,
        }
    }
}

/// Maps raw ids to dense indices in sorted id order
#[derive(Debug, Clone, Default)]
pub struct LabelEncoder<T> {
    index: HashMap<T, usize>,
}

impl<T: Ord + Copy + std::hash::Hash> LabelEncoder<T> {
    pub fn fit(values: impl IntoIterator<Item = T>) -> Self {
        let classes: BTreeSet<T> = values.into_iter().collect();
        let index = classes.into_iter().enumerate().map(|(i, v)| (v, i)).collect();
        Self { index }
    }

    pub fn transform(&self, value: T) -> Option<usize> {
        self.index.get(&value).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[derive(Debug, Clone)]
struct Dense {
    inputs: usize,
    outputs: usize,
    /// Row-major `outputs × inputs`
    weights: Vec<f32>,
    bias: Vec<f32>,
}

impl Dense {
    /// Kaiming-uniform weights, `U(-√(6/fan_in), √(6/fan_in))`, zero bias
    fn new(inputs: usize, outputs: usize, rng: &mut StdRng) -> Self {
        let limit = (6.0 / inputs as f32).sqrt();
        Self {
            inputs,
            outputs,
            weights: (0..inputs * outputs)
                .map(|_| rng.gen_range(-limit..limit))
                .collect(),
            bias: vec![0.0; outputs],
        }
    }

    fn forward(&self, input: &[f32], relu: bool) -> Vec<f32> {
        (0..self.outputs)
            .map(|o| {
                let row = &self.weights[o * self.inputs..(o + 1) * self.inputs];
                let z = row.iter().zip(input).map(|(w, x)| w * x).sum::<f32>() + self.bias[o];
                if relu {
                    z.max(0.0)
                } else {
                    z
                }
            })
            .collect()
    }
}

/// Adam moment estimates for one parameter buffer
#[derive(Debug, Clone)]
struct Moments {
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Moments {
    fn zeros(len: usize) -> Self {
        Self {
            m: vec![0.0; len],
            v: vec![0.0; len],
        }
    }
}

/// Adam optimizer (Kingma & Ba, 2015) with Keras defaults
#[derive(Debug, Clone)]
struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: i32,
}

impl Adam {
    fn new(lr: f32) -> Self {
        Self {
            lr,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            t: 0,
        }
    }

    fn tick(&mut self) {
        self.t += 1;
    }

    /// Updates `params[offset..offset + grads.len()]` in place
    fn apply(&self, params: &mut [f32], grads: &[f32], moments: &mut Moments, offset: usize) {
        let bias_correction1 = 1.0 - self.beta1.powi(self.t);
        let bias_correction2 = 1.0 - self.beta2.powi(self.t);

        for (j, &g) in grads.iter().enumerate() {
            let idx = offset + j;
            moments.m[idx] = self.beta1 * moments.m[idx] + (1.0 - self.beta1) * g;
            moments.v[idx] = self.beta2 * moments.v[idx] + (1.0 - self.beta2) * g * g;
            let m_hat = moments.m[idx] / bias_correction1;
            let v_hat = moments.v[idx] / bias_correction2;
            params[idx] -= self.lr * m_hat / (v_hat.sqrt() + self.eps);
        }
    }
}

/// Gradients accumulated over one mini-batch
struct Gradients {
    weights: Vec<Vec<f32>>,
    bias: Vec<Vec<f32>>,
    users: HashMap<usize, Vec<f32>>,
    items: HashMap<usize, Vec<f32>>,
}

impl Gradients {
    fn for_layers(layers: &[Dense]) -> Self {
        Self {
            weights: layers.iter().map(|l| vec![0.0; l.weights.len()]).collect(),
            bias: layers.iter().map(|l| vec![0.0; l.bias.len()]).collect(),
            users: HashMap::new(),
            items: HashMap::new(),
        }
    }

    fn reset(&mut self) {
        self.weights.iter_mut().for_each(|g| g.fill(0.0));
        self.bias.iter_mut().for_each(|g| g.fill(0.0));
        self.users.clear();
        self.items.clear();
    }
}

/// Embedding tables plus the MLP head
#[derive(Debug, Clone)]
pub struct EmbeddingNet {
    dim: usize,
    user_embeddings: Vec<f32>,
    item_embeddings: Vec<f32>,
    layers: Vec<Dense>,
}

impl EmbeddingNet {
    fn new(n_users: usize, n_items: usize, params: &NeuralParams, rng: &mut StdRng) -> Self {
        let dim = params.embedding_dim;
        let mut embedding = |rows: usize| -> Vec<f32> {
            (0..rows * dim).map(|_| rng.gen_range(-0.05..0.05)).collect()
        };
        let user_embeddings = embedding(n_users);
        let item_embeddings = embedding(n_items);

        let mut widths = vec![2 * dim];
        widths.extend(params.hidden_layers.iter().copied());
        widths.push(1);
        let layers = widths
            .windows(2)
            .map(|w| Dense::new(w[0], w[1], rng))
            .collect();

        Self {
            dim,
            user_embeddings,
            item_embeddings,
            layers,
        }
    }

    /// Sets the bias of the single output unit
    fn set_output_bias(&mut self, value: f32) {
        if let Some(bias) = self.layers.last_mut().and_then(|l| l.bias.first_mut()) {
            *bias = value;
        }
    }

    fn input(&self, user: usize, item: usize) -> Vec<f32> {
        let d = self.dim;
        let mut x = Vec::with_capacity(2 * d);
        x.extend_from_slice(&self.user_embeddings[user * d..(user + 1) * d]);
        x.extend_from_slice(&self.item_embeddings[item * d..(item + 1) * d]);
        x
    }

    /// Activations of every layer, input first
    fn activations(&self, user: usize, item: usize) -> Vec<Vec<f32>> {
        let mut acts = Vec::with_capacity(self.layers.len() + 1);
        acts.push(self.input(user, item));
        let last = self.layers.len() - 1;
        for (l, layer) in self.layers.iter().enumerate() {
            let out = layer.forward(&acts[l], l != last);
            acts.push(out);
        }
        acts
    }

    pub fn predict(&self, user: usize, item: usize) -> f32 {
        self.activations(user, item)
            .last()
            .and_then(|out| out.first().copied())
            .unwrap_or(0.0)
    }

    /// Forward and backward pass for one sample; returns its squared error
    fn accumulate(&self, sample: &Sample, scale: f32, grads: &mut Gradients) -> f32 {
        let acts = self.activations(sample.user, sample.item);
        let prediction = acts[self.layers.len()][0];
        let err = prediction - sample.rating;

        // d(mean squared error)/d(prediction)
        let mut delta = vec![2.0 * err * scale];

        for l in (0..self.layers.len()).rev() {
            let layer = &self.layers[l];
            let input = &acts[l];

            let gw = &mut grads.weights[l];
            for (o, &d) in delta.iter().enumerate() {
                if d == 0.0 {
                    continue;
                }
                let row = &mut gw[o * layer.inputs..(o + 1) * layer.inputs];
                for (g, &x) in row.iter_mut().zip(input) {
                    *g += d * x;
                }
                grads.bias[l][o] += d;
            }

            let mut upstream = vec![0.0f32; layer.inputs];
            for (o, &d) in delta.iter().enumerate() {
                if d == 0.0 {
                    continue;
                }
                let row = &layer.weights[o * layer.inputs..(o + 1) * layer.inputs];
                for (u, &w) in upstream.iter_mut().zip(row) {
                    *u += d * w;
                }
            }

            if l > 0 {
                // acts[l] is the ReLU output of the previous layer
                for (u, &a) in upstream.iter_mut().zip(&acts[l]) {
                    if a <= 0.0 {
                        *u = 0.0;
                    }
                }
            }
            delta = upstream;
        }

        let d = self.dim;
        let (user_grad, item_grad) = delta.split_at(d);
        add_into(grads.users.entry(sample.user).or_insert_with(|| vec![0.0; d]), user_grad);
        add_into(grads.items.entry(sample.item).or_insert_with(|| vec![0.0; d]), item_grad);

        err * err
    }

    fn mse(&self, samples: &[Sample]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let total: f32 = samples
            .iter()
            .map(|s| {
                let err = self.predict(s.user, s.item) - s.rating;
                err * err
            })
            .sum();
        total / samples.len() as f32
    }
}

fn add_into(target: &mut [f32], source: &[f32]) {
    for (t, s) in target.iter_mut().zip(source) {
        *t += s;
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    user: usize,
    item: usize,
    rating: f32,
}

/// Optimizer state mirroring the network's parameter buffers
struct OptimizerState {
    adam: Adam,
    weights: Vec<Moments>,
    bias: Vec<Moments>,
    users: Moments,
    items: Moments,
}

impl OptimizerState {
    fn new(net: &EmbeddingNet, lr: f32) -> Self {
        Self {
            adam: Adam::new(lr),
            weights: net.layers.iter().map(|l| Moments::zeros(l.weights.len())).collect(),
            bias: net.layers.iter().map(|l| Moments::zeros(l.bias.len())).collect(),
            users: Moments::zeros(net.user_embeddings.len()),
            items: Moments::zeros(net.item_embeddings.len()),
        }
    }

    /// Dense update for the MLP, row-wise update for the embedding rows touched
    fn step(&mut self, net: &mut EmbeddingNet, grads: &Gradients) {
        self.adam.tick();
        for (l, layer) in net.layers.iter_mut().enumerate() {
            self.adam
                .apply(&mut layer.weights, &grads.weights[l], &mut self.weights[l], 0);
            self.adam
                .apply(&mut layer.bias, &grads.bias[l], &mut self.bias[l], 0);
        }
        let d = net.dim;
        for (&row, grad) in &grads.users {
            self.adam
                .apply(&mut net.user_embeddings, grad, &mut self.users, row * d);
        }
        for (&row, grad) in &grads.items {
            self.adam
                .apply(&mut net.item_embeddings, grad, &mut self.items, row * d);
        }
    }
}

struct TrainOutcome {
    net: EmbeddingNet,
    best_validation_loss: Option<f32>,
    epochs_run: usize,
}

/// Mini-batch Adam over `train`. With a validation set, stops once
/// `patience` epochs pass without a strictly lower validation loss and
/// returns the best weights seen.
fn train_network(
    mut net: EmbeddingNet,
    train: &mut [Sample],
    validation: &[Sample],
    params: &NeuralParams,
    rng: &mut StdRng,
) -> TrainOutcome {
    // Regression head starts at the mean rating
    if !train.is_empty() {
        let mean = train.iter().map(|s| s.rating).sum::<f32>() / train.len() as f32;
        net.set_output_bias(mean);
    }

    let mut optimizer = OptimizerState::new(&net, params.learning_rate);
    let mut grads = Gradients::for_layers(&net.layers);
    let mut best: Option<(f32, EmbeddingNet)> = None;
    let mut stale_epochs = 0;
    let mut epochs_run = 0;

    for epoch in 0..params.epochs {
        epochs_run = epoch + 1;
        train.shuffle(rng);
        let mut train_loss = 0.0f32;

        for batch in train.chunks(params.batch_size) {
            grads.reset();
            let scale = 1.0 / batch.len() as f32;
            for sample in batch {
                train_loss += net.accumulate(sample, scale, &mut grads);
            }
            optimizer.step(&mut net, &grads);
        }
        train_loss /= train.len().max(1) as f32;

        if validation.is_empty() {
            tracing::debug!(epoch, train_loss, "Neural epoch finished");
            continue;
        }

        let val_loss = net.mse(validation);
        tracing::debug!(epoch, train_loss, val_loss, "Neural epoch finished");

        let improved = best
            .as_ref()
            .map_or(true, |(best_loss, _)| val_loss < *best_loss);
        if improved {
            best = Some((val_loss, net.clone()));
            stale_epochs = 0;
        } else {
            stale_epochs += 1;
            if stale_epochs >= params.patience {
                tracing::info!(epoch, "Early stopping neural training");
                break;
            }
        }
    }

    match best {
        Some((loss, weights)) => TrainOutcome {
            net: weights,
            best_validation_loss: Some(loss),
            epochs_run,
        },
        None => TrainOutcome {
            net,
            best_validation_loss: None,
            epochs_run,
        },
    }
}

/// Trained network together with its id encoders
#[derive(Debug, Clone)]
pub struct NeuralModel {
    net: EmbeddingNet,
    users: LabelEncoder<UserId>,
    items: LabelEncoder<AnimeId>,
    /// Validation loss of the restored weights, if a validation set existed
    pub best_validation_loss: Option<f32>,
    pub epochs_run: usize,
}

impl NeuralModel {
    #[instrument(skip_all, fields(ratings = ratings.len(), epochs = params.epochs))]
    pub fn fit(ratings: &[Rating], params: &NeuralParams) -> AppResult<Self> {
        if ratings.is_empty() {
            return Err(AppError::Model(
                "Cannot train neural model without ratings".to_string(),
            ));
        }
        if params.embedding_dim == 0 || params.batch_size == 0 {
            return Err(AppError::Model(
                "embedding_dim and batch_size must be positive".to_string(),
            ));
        }

        let users = LabelEncoder::fit(ratings.iter().map(|r| r.user_id));
        let items = LabelEncoder::fit(ratings.iter().map(|r| r.anime_id));

        let mut rng = StdRng::seed_from_u64(params.seed);
        let net = EmbeddingNet::new(users.len(), items.len(), params, &mut rng);

        let mut samples: Vec<Sample> = ratings
            .iter()
            .filter_map(|r| {
                Some(Sample {
                    user: users.transform(r.user_id)?,
                    item: items.transform(r.anime_id)?,
                    rating: r.rating as f32,
                })
            })
            .collect();
        samples.shuffle(&mut rng);
        samples.truncate(params.sample_size.max(1));

        let split = ((samples.len() as f64) * params.validation_split).floor() as usize;
        let (mut train, validation) = if split > 0 && split < samples.len() {
            let validation = samples.split_off(samples.len() - split);
            (samples, validation)
        } else {
            (samples, Vec::new())
        };

        let outcome = train_network(net, &mut train, &validation, params, &mut rng);

        tracing::info!(
            users = users.len(),
            items = items.len(),
            samples = train.len(),
            validation = validation.len(),
            epochs_run = outcome.epochs_run,
            best_validation_loss = ?outcome.best_validation_loss,
            "Neural model trained"
        );

        Ok(Self {
            net: outcome.net,
            users,
            items,
            best_validation_loss: outcome.best_validation_loss,
            epochs_run: outcome.epochs_run,
        })
    }

    /// Predicted rating, `None` when either id was never seen in training
    pub fn predict(&self, user_id: UserId, anime_id: AnimeId) -> Option<f32> {
        let user = self.users.transform(user_id)?;
        let item = self.items.transform(anime_id)?;
        Some(self.net.predict(user, item))
    }

    pub fn knows_user(&self, user_id: UserId) -> bool {
        self.users.transform(user_id).is_some()
    }

    pub fn is_trained(&self) -> bool {
        !self.users.is_empty() && !self.items.is_empty()
    }
}

/// Embedding-model candidates
pub struct NeuralRecommender {
    model: NeuralModel,
    dataset: Arc<Dataset>,
}

impl NeuralRecommender {
    pub fn train(dataset: Arc<Dataset>, params: &NeuralParams) -> AppResult<Self> {
        let model = NeuralModel::fit(&dataset.ratings, params)?;
        Ok(Self { model, dataset })
    }
}

impl Recommender for NeuralRecommender {
    fn recommend(&self, query: &CandidateQuery<'_>) -> Vec<ScoredAnime> {
        if !self.model.knows_user(query.user_id) {
            tracing::debug!(user_id = query.user_id, "User unknown to neural model");
            return Vec::new();
        }

        let rated = self.dataset.rated_by(query.user_id);
        let scored = self
            .dataset
            .catalog
            .iter()
            .map(|anime| anime.anime_id)
            .filter(|id| !rated.contains(id) && !query.selected.contains(id))
            .filter_map(|id| {
                self.model
                    .predict(query.user_id, id)
                    .map(|score| ScoredAnime::new(id, f64::from(score)))
            })
            .collect();

        top_k(scored, query.limit)
    }

    fn is_ready(&self) -> bool {
        self.model.is_trained()
    }

    fn name(&self) -> &'static str {
        "neural"
    }
}
