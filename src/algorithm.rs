//! Score rescaling from a user's taste.
//!
//! Graph propagation gives every candidate song a raw score. This module
//! turns it into the final score by applying a fixed sequence of
//! multipliers, each one a pure function of the song and the user's
//! [`TasteStats`]:
//!
//! ```text
//! score = base
//!       * genre_affinity(song)    // 1 + d(genre) / max genre duration
//!       * artist_affinity(song)   // 1 + 0.5 * d(artist) / max artist duration
//!       * popularity(song)        // 1 + 0.1 * log10(play_count + 1)
//!       * like_boost(song)        // 1 + 0.15 * log10(like_count + 1)
//! ```
//!
//! A rule whose precondition does not hold contributes 1.0.

use crate::db::Song;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Per-user listening aggregates used for rescaling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TasteStats {
    /// Genre -> summed play duration, top genres only.
    pub top_genres: HashMap<String, f64>,
    /// Artist -> summed play duration, top artists only.
    pub top_artists: HashMap<String, f64>,
    pub liked_song_ids: HashSet<String>,
}

impl TasteStats {
    #[must_use]
    pub fn max_genre_duration(&self) -> f64 {
        max_value(&self.top_genres)
    }

    #[must_use]
    pub fn max_artist_duration(&self) -> f64 {
        max_value(&self.top_artists)
    }
}

fn max_value(map: &HashMap<String, f64>) -> f64 {
    map.values().copied().fold(0.0, f64::max)
}

/// Tuning constants for the rescaling rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringContext {
    pub genre_weight: f64,
    pub artist_weight: f64,
    pub popularity_weight: f64,
    pub like_weight: f64,
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self {
            genre_weight: 1.0,
            artist_weight: 0.5,
            popularity_weight: 0.1,
            like_weight: 0.15,
        }
    }
}

/// One rescaling rule: a multiplier for `song` given the user's taste.
pub type Rescaler = fn(&Song, &TasteStats, &ScoringContext) -> f64;

/// Rules in application order.
pub const RESCALERS: [(&str, Rescaler); 4] = [
    ("genre_affinity", genre_affinity),
    ("artist_affinity", artist_affinity),
    ("popularity", popularity),
    ("like_boost", like_boost),
];

/// `1 + weight * d / max`, or 1.0 when the key is not among the user's top
/// entries. A non-positive maximum (only zero-length plays) counts as no
/// affinity.
fn affinity(durations: &HashMap<String, f64>, key: &str, max: f64, weight: f64) -> f64 {
    match durations.get(key) {
        Some(&duration) if max > 0.0 => 1.0 + weight * duration / max,
        _ => 1.0,
    }
}

/// Logarithmic boost for positive counters.
fn log_boost(count: u32, weight: f64) -> f64 {
    match count {
        0 => 1.0,
        n => 1.0 + weight * (f64::from(n) + 1.0).log10(),
    }
}

#[must_use]
pub fn genre_affinity(song: &Song, stats: &TasteStats, context: &ScoringContext) -> f64 {
    affinity(&stats.top_genres, &song.genre, stats.max_genre_duration(), context.genre_weight)
}

#[must_use]
pub fn artist_affinity(song: &Song, stats: &TasteStats, context: &ScoringContext) -> f64 {
    affinity(&stats.top_artists, &song.artist, stats.max_artist_duration(), context.artist_weight)
}

#[must_use]
pub fn popularity(song: &Song, _stats: &TasteStats, context: &ScoringContext) -> f64 {
    log_boost(song.play_count, context.popularity_weight)
}

#[must_use]
pub fn like_boost(song: &Song, _stats: &TasteStats, context: &ScoringContext) -> f64 {
    log_boost(song.like_count, context.like_weight)
}

/// Apply every rule of [`RESCALERS`] to `base`, in order.
///
/// # Examples
///
/// ```
/// use encore::algorithm::{rescale, ScoringContext, TasteStats};
/// use encore::db::Song;
///
/// let song = Song {
///     id: "s1".to_string(),
///     title: "Midnight City".to_string(),
///     artist: "M83".to_string(),
///     genre: "Electronic".to_string(),
///     play_count: 0,
///     like_count: 0,
/// };
///
/// let score = rescale(&song, 0.25, &TasteStats::default(), &ScoringContext::default());
/// assert_eq!(score, 0.25);
/// ```
#[must_use]
pub fn rescale(song: &Song, base: f64, stats: &TasteStats, context: &ScoringContext) -> f64 {
    RESCALERS
        .iter()
        .fold(base, |score, (_, rule)| score * rule(song, stats, context))
}
