//! Demo data generation.
//!
//! Fills a store with a small, plausible world: songs spread over a few
//! genres and artists, users with skewed listening habits, likes and
//! accepted friendships. A fixed `seed` gives the same world every time.

use crate::db::{Like, Song, SqliteStore};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const GENRES: [&str; 8] = ["Pop", "Rock", "Indie", "Electronic", "Hip-Hop", "R&B", "Jazz", "Classical"];
const ARTISTS_PER_GENRE: usize = 4;

/// How much data to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedOptions {
    pub users: usize,
    pub songs: usize,
    /// Plays per user.
    pub plays: usize,
    pub seed: u64,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            users: 10,
            songs: 120,
            plays: 25,
            seed: 42,
        }
    }
}

/// What was written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSummary {
    pub songs: usize,
    pub plays: usize,
    pub likes: usize,
    pub friendships: usize,
}

#[must_use]
pub fn user_id(index: usize) -> String {
    format!("user-{index:03}")
}

#[must_use]
pub fn song_id(index: usize) -> String {
    format!("song-{index:04}")
}

fn generate_songs(count: usize, rng: &mut StdRng) -> Vec<Song> {
    (0..count)
        .map(|i| {
            let genre = GENRES[rng.gen_range(0..GENRES.len())];
            let artist = format!("{genre} Artist {}", rng.gen_range(1..=ARTISTS_PER_GENRE));
            Song {
                id: song_id(i),
                title: format!("Track {i}"),
                artist,
                genre: genre.to_string(),
                play_count: 0,
                like_count: 0,
            }
        })
        .collect()
}

/// Populate `store` with generated data. The schema must already exist.
///
/// # Errors
///
/// Returns an error if any write fails.
pub fn seed(store: &mut SqliteStore, options: &SeedOptions) -> Result<SeedSummary> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    let now = Utc::now();

    let songs = generate_songs(options.songs, &mut rng);
    store.insert_songs(&songs).context("Failed to seed songs")?;

    let mut summary = SeedSummary {
        songs: songs.len(),
        ..SeedSummary::default()
    };
    if songs.is_empty() {
        return Ok(summary);
    }

    for user in 0..options.users {
        let uid = user_id(user);
        // Each user leans towards one genre.
        let favourite = GENRES[rng.gen_range(0..GENRES.len())];
        let preferred: Vec<&Song> = songs.iter().filter(|s| s.genre == favourite).collect();

        let mut likes: Vec<Like> = Vec::new();
        for _ in 0..options.plays {
            let song = match preferred.choose(&mut rng) {
                Some(song) if rng.gen_bool(0.7) => *song,
                _ => &songs[rng.gen_range(0..songs.len())],
            };

            let played_at = now - Duration::minutes(rng.gen_range(0..60 * 24 * 60));
            let duration = rng.gen_range(30..=300);
            store.record_play(&uid, &song.id, duration, played_at)?;
            summary.plays += 1;

            if rng.gen_bool(0.15) && !likes.iter().any(|l| l.song_id == song.id) {
                likes.push(Like {
                    user_id: uid.clone(),
                    song_id: song.id.clone(),
                });
            }
        }

        for like in &likes {
            store.toggle_like(&like.user_id, &like.song_id)?;
        }
        summary.likes += likes.len();
    }

    // Sparse friendship graph: every pair befriends with probability 0.25.
    for user in 0..options.users {
        for other in (user + 1)..options.users {
            if rng.gen_bool(0.25) {
                let (a, b) = (user_id(user), user_id(other));
                store.request_friendship(&a, &b)?;
                if store.accept_friendship(&b, &a)? {
                    summary.friendships += 1;
                }
            }
        }
    }

    info!(
        "Seeded {} songs, {} plays, {} likes, {} friendships",
        summary.songs, summary.plays, summary.likes, summary.friendships
    );
    Ok(summary)
}
