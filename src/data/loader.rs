use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::instrument;

use super::{Catalog, Dataset};
use crate::{
    error::{AppError, AppResult},
    models::{Anime, AnimeId, Rating, UserId},
};

/// Rating value meaning "watched but never rated"
const UNRATED: f64 = -1.0;

/// Required columns; each entry lists accepted spellings
const ANIME_COLUMNS: &[&[&str]] = &[&["anime_id"], &["name", "title"], &["genre"]];
const RATING_COLUMNS: &[&[&str]] = &[&["user_id"], &["anime_id"], &["rating"]];

/// Locations of the two CSV exports
#[derive(Debug, Clone)]
pub struct DatasetFiles {
    pub anime: PathBuf,
    pub ratings: PathBuf,
}

impl DatasetFiles {
    /// Resolves the files inside a data directory, accepting both `ratings.csv`
    /// and the Kaggle name `rating.csv`
    pub fn in_dir(dir: &Path) -> Self {
        let ratings = ["ratings.csv", "rating.csv"]
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
            .unwrap_or_else(|| dir.join("ratings.csv"));

        Self {
            anime: dir.join("anime.csv"),
            ratings,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AnimeRecord {
    anime_id: AnimeId,
    #[serde(alias = "title")]
    name: String,
    #[serde(default)]
    genre: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    episodes: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    rating: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    members: Option<u64>,
}

impl From<AnimeRecord> for Anime {
    fn from(record: AnimeRecord) -> Self {
        Anime {
            anime_id: record.anime_id,
            name: record.name.trim().to_string(),
            genre: record.genre.unwrap_or_default(),
            kind: record.kind.filter(|k| !k.trim().is_empty()),
            episodes: record.episodes,
            rating: record.rating,
            members: record.members,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RatingRecord {
    user_id: UserId,
    anime_id: AnimeId,
    #[serde(deserialize_with = "csv::invalid_option")]
    rating: Option<f64>,
}

/// Loads and validates both CSV files
#[instrument(skip_all, fields(anime = %files.anime.display(), ratings = %files.ratings.display()))]
pub fn load_dataset(files: &DatasetFiles) -> AppResult<Dataset> {
    let anime = read_anime(&files.anime)?;
    let ratings = read_ratings(&files.ratings)?;

    if anime.is_empty() {
        return Err(AppError::Dataset(format!(
            "{} contains no anime",
            files.anime.display()
        )));
    }

    let catalog = Catalog::new(anime);
    tracing::info!(
        anime = catalog.len(),
        ratings = ratings.len(),
        "Dataset loaded"
    );

    Ok(Dataset::new(catalog, ratings).with_source(files.clone()))
}

fn open(path: &Path, required: &[&[&str]]) -> AppResult<csv::Reader<std::fs::File>> {
    if !path.exists() {
        return Err(AppError::Dataset(format!(
            "Missing required file: {}",
            path.display()
        )));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let missing: Vec<String> = required
        .iter()
        .filter(|names| !headers.iter().any(|h| names.contains(&h.trim())))
        .map(|names| names.join("/"))
        .collect();

    if !missing.is_empty() {
        return Err(AppError::Dataset(format!(
            "Missing columns in {}: {}",
            path.display(),
            missing.join(", ")
        )));
    }

    Ok(reader)
}

fn read_anime(path: &Path) -> AppResult<Vec<Anime>> {
    let mut reader = open(path, ANIME_COLUMNS)?;
    let mut anime = Vec::new();
    for record in reader.deserialize::<AnimeRecord>() {
        anime.push(record?.into());
    }
    Ok(anime)
}

fn read_ratings(path: &Path) -> AppResult<Vec<Rating>> {
    let mut reader = open(path, RATING_COLUMNS)?;
    let mut ratings = Vec::new();
    let mut skipped = 0usize;

    for record in reader.deserialize::<RatingRecord>() {
        let record = record?;
        match record.rating {
            Some(value) if value != UNRATED => ratings.push(Rating {
                user_id: record.user_id,
                anime_id: record.anime_id,
                rating: value,
            }),
            _ => skipped += 1,
        }
    }

    tracing::debug!(kept = ratings.len(), skipped, "Ratings filtered");
    Ok(ratings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const ANIME_CSV: &str = "\
anime_id,name,genre,type,episodes,rating,members
32281,Kimi no Na wa.,\"Drama, Romance, School, Supernatural\",Movie,1,9.37,200630
5114,Fullmetal Alchemist: Brotherhood,\"Action, Adventure, Drama, Fantasy, Magic, Military, Shounen\",TV,64,9.26,793665
34240,Shelter,,Music,Unknown,,71136
";

    const RATINGS_CSV: &str = "\
user_id,anime_id,rating
1,5114,-1
1,32281,10
2,5114,9
2,32281,
";

    fn write_files(dir: &Path, anime: &str, ratings: &str) -> DatasetFiles {
        fs::write(dir.join("anime.csv"), anime).unwrap();
        fs::write(dir.join("ratings.csv"), ratings).unwrap();
        DatasetFiles::in_dir(dir)
    }

    #[test]
    fn test_load_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(dir.path(), ANIME_CSV, RATINGS_CSV);

        let dataset = load_dataset(&files).unwrap();
        assert_eq!(dataset.catalog.len(), 3);

        let shelter = dataset.catalog.get(34240).unwrap();
        assert_eq!(shelter.genre, "");
        assert_eq!(shelter.episodes, None);
        assert_eq!(shelter.rating, None);
        assert_eq!(shelter.kind.as_deref(), Some("Music"));

        let fma = dataset.catalog.get(5114).unwrap();
        assert_eq!(fma.episodes, Some(64));
        assert_eq!(fma.genres().count(), 7);
    }

    #[test]
    fn test_unrated_and_blank_ratings_are_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(dir.path(), ANIME_CSV, RATINGS_CSV);

        let dataset = load_dataset(&files).unwrap();
        assert_eq!(dataset.ratings.len(), 2);
        assert!(dataset.ratings.iter().all(|r| r.rating > 0.0));
    }

    #[test]
    fn test_title_column_alias() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(
            dir.path(),
            "anime_id,title,genre\n1,Cowboy Bebop,\"Action, Sci-Fi\"\n",
            RATINGS_CSV,
        );

        let dataset = load_dataset(&files).unwrap();
        assert_eq!(dataset.catalog.get(1).unwrap().name, "Cowboy Bebop");
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let files = DatasetFiles::in_dir(dir.path());
        let err = load_dataset(&files).unwrap_err();
        assert!(err.to_string().contains("Missing required file"));
    }

    #[test]
    fn test_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(dir.path(), ANIME_CSV, "user_id,anime_id\n1,5114\n");
        let err = load_dataset(&files).unwrap_err();
        assert!(err.to_string().contains("rating"));
    }

    #[test]
    fn test_missing_name_column() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(dir.path(), "anime_id,genre
1,Action
", RATINGS_CSV);
        let err = load_dataset(&files).unwrap_err();
        assert!(matches!(err, AppError::Dataset(_)));
        assert!(err.to_string().contains("Missing columns"));
        assert!(err.to_string().contains("name/title"));
    }

    #[test]
    fn test_status_reports_source_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_files(dir.path(), ANIME_CSV, RATINGS_CSV);
        let dataset = load_dataset(&files).unwrap();

        let status = dataset.status();
        assert_eq!(status.anime_file, Some(true));
        assert_eq!(status.ratings_file, Some(true));

        fs::remove_file(&files.ratings).unwrap();
        let status = dataset.status();
        assert_eq!(status.anime_file, Some(true));
        assert_eq!(status.ratings_file, Some(false));
    }

    #[test]
    fn test_kaggle_rating_file_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("rating.csv"), RATINGS_CSV).unwrap();
        let files = DatasetFiles::in_dir(dir.path());
        assert!(files.ratings.ends_with("rating.csv"));
    }
}
