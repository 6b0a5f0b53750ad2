use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{AnimeId, UserId};

/// Thumbs up / thumbs down on a recommended title
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Like,
    Dislike,
}

/// A user's latest vote on one title
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackEntry {
    pub anime_id: AnimeId,
    pub kind: FeedbackKind,
    pub recorded_at: DateTime<Utc>,
}

/// Feedback collected from the recommendation cards, keyed by user
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackLog {
    entries: HashMap<UserId, Vec<FeedbackEntry>>,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a vote, replacing any earlier vote by the same user on the same title
    pub fn record(&mut self, user_id: UserId, anime_id: AnimeId, kind: FeedbackKind) -> FeedbackEntry {
        let entry = FeedbackEntry {
            anime_id,
            kind,
            recorded_at: Utc::now(),
        };

        let votes = self.entries.entry(user_id).or_default();
        if let Some(existing) = votes.iter_mut().find(|e| e.anime_id == anime_id) {
            *existing = entry.clone();
        } else {
            votes.push(entry.clone());
        }
        entry
    }

    /// All votes by a user in the order titles were first voted on
    pub fn for_user(&self, user_id: UserId) -> &[FeedbackEntry] {
        self.entries.get(&user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn liked(&self, user_id: UserId) -> Vec<AnimeId> {
        self.filter_kind(user_id, FeedbackKind::Like)
    }

    pub fn disliked(&self, user_id: UserId) -> Vec<AnimeId> {
        self.filter_kind(user_id, FeedbackKind::Dislike)
    }

    fn filter_kind(&self, user_id: UserId, kind: FeedbackKind) -> Vec<AnimeId> {
        self.for_user(user_id)
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.anime_id)
            .collect()
    }
}
