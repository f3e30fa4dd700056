//! Graph-based song recommendations from listening history, friendships and
//! taste.
//!
//! Core modules:
//! - [`graph`] - Weighted multigraph and decayed propagation
//! - [`engine`] - Graph construction, candidate scoring and ranking
//! - [`algorithm`] - Taste statistics and score rescaling rules
//! - [`db`] - SQLite snapshot of songs, history, friendships and likes
//!
//! ### Supporting Modules
//!
//! - [`config`] - Data directory and runtime configuration
//! - [`seed`] - Reproducible demo data
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use encore::db::SqliteStore;
//! use encore::engine::RecommendationEngine;
//! use chrono::Utc;
//!
//! let mut store = SqliteStore::open_in_memory()?;
//! store.add_song("s1", "Starboy", "The Weeknd", "Pop")?;
//! store.add_song("s2", "Levitating", "Dua Lipa", "Pop")?;
//! store.record_play("alice", "s1", 230, Utc::now())?;
//!
//! let engine = RecommendationEngine::with_defaults(store);
//! for rec in engine.recommend("alice")? {
//!     println!("{} {:.3}", rec.song_id, rec.score);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Algorithm Details
//!
//! Every call rebuilds the graph from the database:
//!
//! - songs link to their genre and artist (both directions, weight 1)
//! - plays link users to songs (weight 2) and songs back to users (weight 1)
//! - accepted friendships link users both ways (weight 1.5)
//!
//! Scores spread from the user node breadth-first, halved on every hop and
//! multiplied by the edge weight. Reached songs the user has not played are
//! rescaled by genre and artist affinity, play count and like count. Songs
//! friends played in the last 30 days are added on top, and the best 20 are
//! returned.
//!
//! ## Error Handling
//!
//! All fallible functions return `anyhow::Result`. A failed database read
//! aborts the whole recommendation; a song that disappears mid-call simply
//! keeps its unscaled score.

pub mod algorithm;
pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod engine;
pub mod graph;
pub mod seed;
