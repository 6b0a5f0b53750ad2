//! Anime catalog and ratings loaded from the Kaggle-style CSV exports.

pub mod loader;

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::models::{Anime, AnimeId, Rating, UserId};

pub use loader::{load_dataset, DatasetFiles};

/// The anime table, indexed by id and by lower-cased name
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    anime: Vec<Anime>,
    by_id: HashMap<AnimeId, usize>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// Builds a catalog; later duplicates of an id are ignored
    pub fn new(rows: Vec<Anime>) -> Self {
        let mut anime = Vec::with_capacity(rows.len());
        let mut by_id = HashMap::with_capacity(rows.len());
        let mut by_name = HashMap::with_capacity(rows.len());

        for row in rows {
            if by_id.contains_key(&row.anime_id) {
                continue;
            }
            let idx = anime.len();
            by_id.insert(row.anime_id, idx);
            by_name.entry(row.name.trim().to_lowercase()).or_insert(idx);
            anime.push(row);
        }

        Self {
            anime,
            by_id,
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.anime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anime.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anime> {
        self.anime.iter()
    }

    /// Position of an anime in catalog order
    pub fn index_of(&self, anime_id: AnimeId) -> Option<usize> {
        self.by_id.get(&anime_id).copied()
    }

    pub fn get(&self, anime_id: AnimeId) -> Option<&Anime> {
        self.index_of(anime_id).map(|idx| &self.anime[idx])
    }

    pub fn at(&self, idx: usize) -> &Anime {
        &self.anime[idx]
    }

    /// Case-insensitive exact name lookup
    pub fn find_by_name(&self, name: &str) -> Option<&Anime> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .map(|&idx| &self.anime[idx])
    }

    /// Resolves selected titles to ids, silently skipping unknown names
    pub fn resolve_names<S: AsRef<str>>(&self, names: &[S]) -> Vec<AnimeId> {
        let mut seen = HashSet::new();
        names
            .iter()
            .filter_map(|name| self.find_by_name(name.as_ref()))
            .map(|anime| anime.anime_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Case-insensitive substring search, best-known titles first
    pub fn search(&self, query: &str, limit: usize) -> Vec<&Anime> {
        let needle = query.trim().to_lowercase();
        let mut hits: Vec<&Anime> = self
            .anime
            .iter()
            .filter(|anime| needle.is_empty() || anime.name.to_lowercase().contains(&needle))
            .collect();

        hits.sort_by(|a, b| {
            b.members
                .unwrap_or(0)
                .cmp(&a.members.unwrap_or(0))
                .then_with(|| a.anime_id.cmp(&b.anime_id))
        });
        hits.truncate(limit);
        hits
    }
}

/// Everything the recommenders are trained on
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub catalog: Catalog,
    /// Explicit ratings only; "watched but unrated" rows are already dropped
    pub ratings: Vec<Rating>,
    /// Files the dataset was read from; `None` when built in memory
    pub source: Option<DatasetFiles>,
}

impl Dataset {
    pub fn new(catalog: Catalog, ratings: Vec<Rating>) -> Self {
        Self {
            catalog,
            ratings,
            source: None,
        }
    }

    pub fn with_source(mut self, files: DatasetFiles) -> Self {
        self.source = Some(files);
        self
    }

    /// Anime the user has rated
    pub fn rated_by(&self, user_id: UserId) -> HashSet<AnimeId> {
        self.ratings
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.anime_id)
            .collect()
    }

    pub fn user_count(&self) -> usize {
        self.ratings
            .iter()
            .map(|r| r.user_id)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Row counts, plus whether the source files are still on disk
    pub fn status(&self) -> DatasetStatus {
        let present = |path: &std::path::Path| path.is_file();
        DatasetStatus {
            anime_count: self.catalog.len(),
            rating_count: self.ratings.len(),
            user_count: self.user_count(),
            anime_file: self.source.as_ref().map(|f| present(&f.anime)),
            ratings_file: self.source.as_ref().map(|f| present(&f.ratings)),
        }
    }
}

/// Summary reported by the health endpoint
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DatasetStatus {
    pub anime_count: usize,
    pub rating_count: usize,
    pub user_count: usize,
    /// `None` for in-memory datasets
    pub anime_file: Option<bool>,
    pub ratings_file: Option<bool>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn anime(anime_id: AnimeId, name: &str, genre: &str, members: u64) -> Anime {
        Anime {
            anime_id,
            name: name.to_string(),
            genre: genre.to_string(),
            kind: Some("TV".to_string()),
            episodes: Some(12),
            rating: Some(8.0),
            members: Some(members),
        }
    }

    pub fn rating(user_id: UserId, anime_id: AnimeId, rating: f64) -> Rating {
        Rating {
            user_id,
            anime_id,
            rating,
        }
    }

    /// Two taste clusters: action fans (users 1-3) and romance fans (users 4-6)
    pub fn small_dataset() -> Dataset {
        let catalog = Catalog::new(vec![
            anime(1, "Fullmetal Alchemist: Brotherhood", "Action, Adventure, Drama, Fantasy", 900),
            anime(2, "Attack on Titan", "Action, Drama, Fantasy", 850),
            anime(3, "One Punch Man", "Action, Comedy, Sci-Fi", 700),
            anime(4, "Toradora!", "Comedy, Romance, School", 600),
            anime(5, "Clannad", "Drama, Romance, School", 500),
            anime(6, "Kimi ni Todoke", "Romance, School, Shoujo", 300),
            anime(7, "Mushishi", "Adventure, Mystery, Supernatural", 200),
        ]);

        let mut ratings = Vec::new();
        for user in 1..=3 {
            ratings.push(rating(user, 1, 10.0));
            ratings.push(rating(user, 2, 9.0));
            ratings.push(rating(user, 4, 3.0));
        }
        ratings.push(rating(1, 3, 9.0));
        ratings.push(rating(2, 3, 8.0));
        for user in 4..=6 {
            ratings.push(rating(user, 4, 10.0));
            ratings.push(rating(user, 5, 9.0));
            ratings.push(rating(user, 2, 2.0));
        }
        ratings.push(rating(4, 6, 9.0));
        ratings.push(rating(5, 6, 10.0));
        ratings.push(rating(5, 7, 6.0));

        Dataset::new(catalog, ratings)
    }
}
