//! # Integration Tests for Encore
//!
//! End-to-end tests through the public library API against real SQLite
//! database files, plus a few CLI smoke tests.

use anyhow::Result;
use chrono::{Duration, Utc};
use encore::db::{MusicStore, SqliteStore};
use encore::engine::{EngineConfig, RecommendationEngine};
use std::path::PathBuf;
use tempfile::TempDir;

/// Test helper to create a temporary database with the schema in place
fn create_test_database() -> Result<(TempDir, PathBuf, SqliteStore)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_encore.db");

    let store = SqliteStore::open(&db_path)?;
    store.init_schema(false)?;

    Ok((temp_dir, db_path, store))
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[test]
    fn test_genre_affinity_drives_ordering() -> Result<()> {
        let (_temp_dir, _db_path, mut store) = create_test_database()?;
        store.add_song("A", "Song A", "Artist X", "pop")?;
        store.add_song("B", "Song B", "Artist Y", "pop")?;
        store.add_song("C", "Song C", "Artist X", "rock")?;
        store.add_song("D", "Song D", "Artist Z", "pop")?;
        store.record_play("U", "A", 180, Utc::now())?;

        let engine = RecommendationEngine::with_defaults(store);
        let recs = engine.recommend("U")?;

        assert!(recs.iter().all(|r| r.song_id != "A"), "already heard song recommended");

        let position = |id: &str| recs.iter().position(|r| r.song_id == id);
        let b = position("B").expect("B should be recommended");
        let d = position("D").expect("D should be recommended");
        let c = position("C").expect("C shares A's artist and should be reached");
        assert!(b < c && d < c, "rock song ranked above a pop song");
        assert!(recs[c].score < recs[b].score);

        Ok(())
    }

    #[test]
    fn test_friend_only_signal() -> Result<()> {
        let (_temp_dir, _db_path, mut store) = create_test_database()?;
        store.add_song("B", "Song B", "Artist B", "jazz")?;
        store.request_friendship("F", "U")?;
        assert!(store.accept_friendship("U", "F")?);
        store.record_play("F", "B", 200, Utc::now() - Duration::days(3))?;
        store.record_play("F", "B", 200, Utc::now() - Duration::days(1))?;

        // Friend signal alone: the graph reaches B through F, so switch the
        // traversal off to isolate the friend contribution.
        let config = EngineConfig {
            max_depth: 0,
            ..EngineConfig::default()
        };
        let engine = RecommendationEngine::new(store, config);
        let recs = engine.recommend("U")?;

        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].song_id, "B");
        assert!(approx(recs[0].score, 0.7 * 2.0 * 2.0));

        // With the traversal on, the friend score is added to the graph score.
        let engine = RecommendationEngine::with_defaults(engine.into_store());
        let recs = engine.recommend("U")?;
        assert_eq!(recs[0].song_id, "B");
        assert!(recs[0].score > 0.7 * 2.0 * 2.0);

        Ok(())
    }

    #[test]
    fn test_old_friend_plays_are_ignored() -> Result<()> {
        let (_temp_dir, _db_path, mut store) = create_test_database()?;
        store.add_song("B", "Song B", "Artist B", "jazz")?;
        store.request_friendship("F", "U")?;
        store.accept_friendship("U", "F")?;
        store.record_play("F", "B", 200, Utc::now() - Duration::days(31))?;

        let engine = RecommendationEngine::with_defaults(store);
        let signals = engine.friend_recommendations("U")?;
        assert!(signals.is_empty());

        Ok(())
    }
}

#[cfg(test)]
mod invariant_tests {
    use super::*;
    use encore::graph::NodeId;
    use encore::seed::{self, SeedOptions};

    fn seeded_engine() -> Result<(TempDir, RecommendationEngine<SqliteStore>)> {
        let (temp_dir, _db_path, mut store) = create_test_database()?;
        let options = SeedOptions {
            users: 12,
            songs: 150,
            plays: 20,
            seed: 1234,
        };
        seed::seed(&mut store, &options)?;
        Ok((temp_dir, RecommendationEngine::with_defaults(store)))
    }

    #[test]
    fn test_results_are_bounded_sorted_and_unheard() -> Result<()> {
        let (_temp_dir, engine) = seeded_engine()?;
        let graph = engine.build_graph()?;

        for user in 0..12 {
            let uid = seed::user_id(user);
            let recs = engine.recommend(&uid)?;

            assert!(recs.len() <= 20);
            assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
            assert!(recs.iter().all(|r| r.score > 0.0));

            let user_node = NodeId::user(&uid);
            for rec in &recs {
                assert!(
                    !graph.has_edge_to(&user_node, &NodeId::song(&rec.song_id)),
                    "{uid} already listened to {}",
                    rec.song_id
                );
            }
        }

        Ok(())
    }

    #[test]
    fn test_recommend_is_deterministic() -> Result<()> {
        let (_temp_dir, engine) = seeded_engine()?;
        let uid = seed::user_id(3);

        let first = engine.recommend(&uid)?;
        let second = engine.recommend(&uid)?;
        assert_eq!(first, second);

        Ok(())
    }

    #[test]
    fn test_graph_reflects_latest_writes() -> Result<()> {
        let (_temp_dir, engine) = seeded_engine()?;
        let before = engine.build_graph()?.edge_count();

        let mut store = engine.into_store();
        store.add_song("fresh", "Fresh", "New Artist", "Pop")?;
        let engine = RecommendationEngine::with_defaults(store);

        assert_eq!(engine.build_graph()?.edge_count(), before + 4);
        Ok(())
    }

    #[test]
    fn test_store_reopens_from_disk() -> Result<()> {
        let (_temp_dir, db_path, mut store) = create_test_database()?;
        store.add_song("s1", "One", "Artist", "Pop")?;
        store.record_play("u1", "s1", 60, Utc::now())?;
        drop(store);

        let reopened = SqliteStore::open(&db_path)?;
        assert_eq!(reopened.all_history()?.len(), 1);
        assert_eq!(reopened.song_by_id("s1")?.map(|s| s.play_count), Some(1));
        Ok(())
    }
}

#[cfg(test)]
mod cli_tests {
    use std::process::Command;

    #[test]
    fn test_cli_help_displays_correctly() {
        let output = Command::new(env!("CARGO_BIN_EXE_encore"))
            .arg("--help")
            .output()
            .expect("Failed to run help command");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("encore"));
        assert!(stdout.contains("recommend"));
        assert!(stdout.contains("stats"));
        assert!(stdout.contains("friend"));
    }

    #[test]
    fn test_cli_recommend_json_on_seeded_database() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db = temp_dir.path().join("cli.db");
        let bin = env!("CARGO_BIN_EXE_encore");

        let seeded = Command::new(bin)
            .args(["--db", db.to_str().unwrap(), "seed", "--users", "4", "--songs", "30"])
            .output()
            .expect("Failed to run seed command");
        assert!(seeded.status.success());

        let output = Command::new(bin)
            .args(["--db", db.to_str().unwrap(), "recommend", "user-000", "--json", "--limit", "5"])
            .output()
            .expect("Failed to run recommend command");
        assert!(output.status.success());

        let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        let rows = rows.as_array().unwrap();
        assert!(rows.len() <= 5);
        assert!(rows.iter().all(|row| row["song_id"].is_string()));
    }
}
