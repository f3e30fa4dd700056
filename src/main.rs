//! # Encore
//!
//! Command-line front end for the recommendation engine. Every command
//! opens the SQLite database (the platform data directory by default,
//! `--db` or `ENCORE_DB` to override), does its work and exits.
//!
//! ## Usage
//!
//! ```bash
//! encore init-db
//! encore seed
//! encore recommend user-001
//! encore stats user-001 --json
//! ```

use anyhow::{bail, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use encore::algorithm::TasteStats;
use encore::cli::{self, Command, FriendAction};
use encore::config::RuntimeConfig;
use encore::db::{MusicStore, SqliteStore};
use encore::engine::{Recommendation, RecommendationEngine};
use encore::{completion, seed};
use log::{debug, info};
use serde::Serialize;

/// A recommendation joined with the song's catalog fields for display.
#[derive(Debug, Serialize)]
struct RecommendationRow {
    rank: usize,
    song_id: String,
    score: f64,
    title: Option<String>,
    artist: Option<String>,
    genre: Option<String>,
}

fn recommendation_rows(store: &SqliteStore, recommendations: Vec<Recommendation>) -> Result<Vec<RecommendationRow>> {
    recommendations
        .into_iter()
        .enumerate()
        .map(|(i, rec)| {
            let song = store.song_by_id(&rec.song_id)?;
            Ok(RecommendationRow {
                rank: i + 1,
                score: rec.score,
                title: song.as_ref().map(|s| s.title.clone()),
                artist: song.as_ref().map(|s| s.artist.clone()),
                genre: song.map(|s| s.genre),
                song_id: rec.song_id,
            })
        })
        .collect()
}

fn print_stats(user: &str, stats: &TasteStats) {
    fn ranked(map: &std::collections::HashMap<String, f64>) -> Vec<(&String, f64)> {
        let mut entries: Vec<(&String, f64)> = map.iter().map(|(k, &v)| (k, v)).collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    println!("Taste of {user}");
    println!("  Top genres:");
    for (genre, seconds) in ranked(&stats.top_genres) {
        println!("    {genre:<24} {seconds:>8.0}s");
    }
    println!("  Top artists:");
    for (artist, seconds) in ranked(&stats.top_artists) {
        println!("    {artist:<24} {seconds:>8.0}s");
    }

    let mut liked: Vec<&String> = stats.liked_song_ids.iter().collect();
    liked.sort();
    println!("  Liked songs ({}):", liked.len());
    for id in liked {
        println!("    {id}");
    }
}

/// Main entry point for Encore.
///
/// # Logging
///
/// Initializes environment logger which can be controlled via `RUST_LOG`:
/// - `RUST_LOG=debug encore recommend u1` - Enable debug logging
/// - `RUST_LOG=encore::graph=trace encore recommend u1` - Trace propagation
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();

    if let Command::Completion { shell } = args.command {
        let mut cmd = cli::Args::command();
        completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        return Ok(());
    }

    let mut config = RuntimeConfig::load()?;
    if let Some(db) = args.db {
        config = config.with_db_path(db);
    }
    let db_path = config.resolve_db_path()?;
    debug!("Using database {}", db_path.display());

    let mut store = SqliteStore::open(&db_path)?;

    match args.command {
        Command::InitDb { force } => {
            store.init_schema(force)?;
            info!("Database initialized at {}", db_path.display());
            println!("Database ready at {}", db_path.display());
        }
        Command::Seed { users, songs, plays, seed: rng_seed } => {
            store.init_schema(false)?;
            let options = seed::SeedOptions { users, songs, plays, seed: rng_seed };
            let summary = seed::seed(&mut store, &options)?;
            println!(
                "Seeded {} songs, {} plays, {} likes, {} friendships",
                summary.songs, summary.plays, summary.likes, summary.friendships
            );
        }
        Command::AddSong { id, title, artist, genre } => {
            store.add_song(&id, &title, &artist, &genre)?;
            println!("Added {artist} - {title} [{genre}] as {id}");
        }
        Command::Play { user, song, duration } => {
            store.record_play(&user, &song, duration, Utc::now())?;
            println!("Recorded play of {song} by {user}");
        }
        Command::Like { user, song } => {
            if store.toggle_like(&user, &song)? {
                println!("{user} now likes {song}");
            } else {
                println!("{user} no longer likes {song}");
            }
        }
        Command::Friend { action } => match action {
            FriendAction::Request { user, friend } => {
                store.request_friendship(&user, &friend)?;
                println!("Friend request sent from {user} to {friend}");
            }
            FriendAction::Accept { user, requester } => {
                if !store.accept_friendship(&user, &requester)? {
                    bail!("No pending friend request from {requester} to {user}");
                }
                println!("{user} and {requester} are now friends");
            }
        },
        Command::Recommend { user, limit, depth, json } => {
            let mut engine_config = config.engine;
            if let Some(limit) = limit {
                engine_config.limit = limit;
            }
            if let Some(depth) = depth {
                engine_config.max_depth = depth;
            }

            let engine = RecommendationEngine::new(store, engine_config);
            let recommendations = engine.recommend(&user)?;
            let rows = recommendation_rows(engine.store(), recommendations)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No recommendations for {user} yet. Play some songs or add friends.");
            } else {
                for row in &rows {
                    println!(
                        "{:>3}. {:>8.3}  {} - {} [{}]  ({})",
                        row.rank,
                        row.score,
                        row.artist.as_deref().unwrap_or("Unknown"),
                        row.title.as_deref().unwrap_or("Unknown"),
                        row.genre.as_deref().unwrap_or("?"),
                        row.song_id
                    );
                }
            }
        }
        Command::Stats { user, json } => {
            let engine = RecommendationEngine::new(store, config.engine);
            let stats = engine.user_stats(&user)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&user, &stats);
            }
        }
        Command::Completion { .. } => unreachable!("handled before opening the database"),
    }

    Ok(())
}
