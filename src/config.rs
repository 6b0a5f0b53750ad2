use serde::Deserialize;
use std::path::PathBuf;

use crate::services::recommenders::{NeuralParams, SvdParams};

/// Which backend supplies poster images and synopses
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetadataBackend {
    /// Jikan (unofficial MyAnimeList API)
    Jikan,
    /// Placeholder images only, no network access
    Placeholder,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding anime.csv and ratings.csv
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Redis connection URL; metadata lookups are not cached when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default = "default_metadata_backend")]
    pub metadata_backend: MetadataBackend,

    /// Jikan API base URL
    #[serde(default = "default_jikan_api_url")]
    pub jikan_api_url: String,

    /// Per-request timeout for Jikan calls, in seconds
    #[serde(default = "default_jikan_timeout_secs")]
    pub jikan_timeout_secs: u64,

    /// Seed shared by both trainable models
    #[serde(default = "default_seed")]
    pub model_seed: u64,

    #[serde(default = "default_svd_factors")]
    pub svd_factors: usize,

    #[serde(default = "default_svd_epochs")]
    pub svd_epochs: usize,

    #[serde(default = "default_svd_learning_rate")]
    pub svd_learning_rate: f64,

    #[serde(default = "default_svd_regularization")]
    pub svd_regularization: f64,

    #[serde(default = "default_neural_embedding_dim")]
    pub neural_embedding_dim: usize,

    #[serde(default = "default_neural_epochs")]
    pub neural_epochs: usize,

    #[serde(default = "default_neural_batch_size")]
    pub neural_batch_size: usize,

    /// Upper bound on ratings sampled for neural training
    #[serde(default = "default_neural_sample_size")]
    pub neural_sample_size: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8501
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_metadata_backend() -> MetadataBackend {
    MetadataBackend::Jikan
}

fn default_jikan_api_url() -> String {
    "https://api.jikan.moe/v4".to_string()
}

fn default_jikan_timeout_secs() -> u64 {
    10
}

fn default_seed() -> u64 {
    42
}

fn default_svd_factors() -> usize {
    100
}

fn default_svd_epochs() -> usize {
    20
}

fn default_svd_learning_rate() -> f64 {
    0.005
}

fn default_svd_regularization() -> f64 {
    0.02
}

fn default_neural_embedding_dim() -> usize {
    50
}

fn default_neural_epochs() -> usize {
    5
}

fn default_neural_batch_size() -> usize {
    64
}

fn default_neural_sample_size() -> usize {
    100_000
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn svd_params(&self) -> SvdParams {
        SvdParams {
            n_factors: self.svd_factors,
            n_epochs: self.svd_epochs,
            learning_rate: self.svd_learning_rate,
            regularization: self.svd_regularization,
            seed: self.model_seed,
            ..SvdParams::default()
        }
    }

    pub fn neural_params(&self) -> NeuralParams {
        NeuralParams {
            embedding_dim: self.neural_embedding_dim,
            epochs: self.neural_epochs,
            batch_size: self.neural_batch_size,
            sample_size: self.neural_sample_size,
            seed: self.model_seed,
            ..NeuralParams::default()
        }
    }
}
