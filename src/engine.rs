//! # Recommendation Engine
//!
//! Turns the relational snapshot into a ranked list of songs a user has not
//! heard yet.
//!
//! ## Pipeline
//!
//! 1. Build a fresh [`WeightedGraph`] from songs, history and accepted
//!    friendships. The graph lives for one call only.
//! 2. Propagate from `user:{id}`.
//! 3. Fetch the user's [`TasteStats`].
//! 4. Rescale every reached song the user has not listened to.
//! 5. Add the friend signal: recent plays of the user's friends.
//! 6. Sort by score (ties by ascending song id) and truncate.
//!
//! The friend signal is merged by plain addition after the traversal. It
//! has a time window, the graph does not.
//!
//! ## Edge weights
//!
//! | Edge                     | Kind          | Weight |
//! |--------------------------|---------------|--------|
//! | song -> genre            | `has_genre`   | 1.0    |
//! | genre -> song            | `is_genre_of` | 1.0    |
//! | song -> artist           | `by_artist`   | 1.0    |
//! | artist -> song           | `wrote_song`  | 1.0    |
//! | user -> song             | `listened_to` | 2.0    |
//! | song -> user             | `listened_by` | 1.0    |
//! | user <-> user (accepted) | `is_friend`   | 1.5    |

use crate::algorithm::{self, ScoringContext, TasteStats};
use crate::db::{FriendPlay, MusicStore, Song};
use crate::graph::{NodeId, RelationKind, WeightedGraph};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use log::{debug, info, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const GENRE_EDGE_WEIGHT: f64 = 1.0;
const ARTIST_EDGE_WEIGHT: f64 = 1.0;
const LISTENED_TO_WEIGHT: f64 = 2.0;
const LISTENED_BY_WEIGHT: f64 = 1.0;
const FRIEND_EDGE_WEIGHT: f64 = 1.5;

/// Engine tuning. Defaults reproduce the reference behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Propagation depth from the user node.
    pub max_depth: usize,
    /// Maximum number of recommendations returned.
    pub limit: usize,
    /// How many top genres/artists feed the taste statistics.
    pub stats_limit: usize,
    /// Look-back window for friends' plays.
    pub friend_window_days: i64,
    /// Maximum number of friend-played songs considered.
    pub friend_limit: usize,
    /// Score per friend listen.
    pub friend_listen_weight: f64,
    /// Share of the friend score added to the candidate score.
    pub friend_blend: f64,
    pub scoring: ScoringContext,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            limit: 20,
            stats_limit: 10,
            friend_window_days: 30,
            friend_limit: 20,
            friend_listen_weight: 2.0,
            friend_blend: 0.7,
            scoring: ScoringContext::default(),
        }
    }
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub song_id: String,
    pub score: f64,
}

/// A friend-activity score for one song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendSignal {
    pub song_id: String,
    pub score: f64,
}

/// Stateless recommender over a [`MusicStore`].
///
/// Nothing is cached between calls: each [`recommend`](Self::recommend)
/// reads the store again and builds its own graph.
pub struct RecommendationEngine<S> {
    store: S,
    config: EngineConfig,
}

impl<S: MusicStore> RecommendationEngine<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn with_defaults(store: S) -> Self {
        Self::new(store, EngineConfig::default())
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Build the relation graph from the current snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three snapshot reads fails.
    pub fn build_graph(&self) -> Result<WeightedGraph> {
        let songs = self.store.all_songs().context("Failed to read songs")?;
        let history = self.store.all_history().context("Failed to read history")?;
        let friendships = self
            .store
            .accepted_friendships()
            .context("Failed to read friendships")?;

        let mut graph = WeightedGraph::new();

        for song in &songs {
            let song_node = NodeId::song(&song.id);
            let genre_node = NodeId::genre(&song.genre);
            let artist_node = NodeId::artist(&song.artist);

            graph.add_edge(song_node.clone(), genre_node.clone(), GENRE_EDGE_WEIGHT, RelationKind::HasGenre);
            graph.add_edge(genre_node, song_node.clone(), GENRE_EDGE_WEIGHT, RelationKind::IsGenreOf);
            graph.add_edge(song_node.clone(), artist_node.clone(), ARTIST_EDGE_WEIGHT, RelationKind::ByArtist);
            graph.add_edge(artist_node, song_node, ARTIST_EDGE_WEIGHT, RelationKind::WroteSong);
        }

        for entry in &history {
            let user_node = NodeId::user(&entry.user_id);
            let song_node = NodeId::song(&entry.song_id);

            graph.add_edge(user_node.clone(), song_node.clone(), LISTENED_TO_WEIGHT, RelationKind::ListenedTo);
            graph.add_edge(song_node, user_node, LISTENED_BY_WEIGHT, RelationKind::ListenedBy);
        }

        for friendship in &friendships {
            let a = NodeId::user(&friendship.user_id);
            let b = NodeId::user(&friendship.friend_id);

            graph.add_edge(a.clone(), b.clone(), FRIEND_EDGE_WEIGHT, RelationKind::IsFriend);
            graph.add_edge(b, a, FRIEND_EDGE_WEIGHT, RelationKind::IsFriend);
        }

        debug!(
            "Built graph from {} songs, {} plays, {} friendships: {} vertices, {} edges",
            songs.len(),
            history.len(),
            friendships.len(),
            graph.vertex_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    /// Top genres and artists by listening time, plus liked songs.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three aggregate reads fails.
    pub fn user_stats(&self, user_id: &str) -> Result<TasteStats> {
        let limit = self.config.stats_limit;
        let top_genres = self
            .store
            .top_genres(user_id, limit)
            .with_context(|| format!("Failed to read top genres of `{user_id}`"))?;
        let top_artists = self
            .store
            .top_artists(user_id, limit)
            .with_context(|| format!("Failed to read top artists of `{user_id}`"))?;
        let liked_song_ids = self
            .store
            .liked_song_ids(user_id)
            .with_context(|| format!("Failed to read likes of `{user_id}`"))?;

        Ok(TasteStats {
            top_genres: top_genres.into_iter().collect(),
            top_artists: top_artists.into_iter().collect(),
            liked_song_ids,
        })
    }

    /// Rescale `base_score` for `song_id`. A song that no longer exists
    /// keeps its base score.
    ///
    /// # Errors
    ///
    /// Returns an error only if the song lookup itself fails.
    pub fn calculate_enhanced_score(&self, song_id: &str, base_score: f64, stats: &TasteStats) -> Result<f64> {
        let song = self
            .store
            .song_by_id(song_id)
            .with_context(|| format!("Failed to look up song `{song_id}`"))?;

        Ok(enhanced_score(song_id, song.as_ref(), base_score, stats, &self.config.scoring))
    }

    /// Songs the user's friends played recently and the user never did,
    /// scored by listen count.
    ///
    /// # Errors
    ///
    /// Returns an error if the friend window does not fit in a timestamp or
    /// the friend-plays aggregate fails.
    pub fn friend_recommendations(&self, user_id: &str) -> Result<Vec<FriendSignal>> {
        let window_days = self.config.friend_window_days;
        let since = Duration::try_days(window_days)
            .and_then(|window| Utc::now().checked_sub_signed(window))
            .with_context(|| format!("Friend window of {window_days} days is out of range"))?;
        let plays = self
            .store
            .friend_recent_plays(user_id, since, self.config.friend_limit)
            .with_context(|| format!("Failed to read friend activity for `{user_id}`"))?;

        Ok(plays
            .into_iter()
            .map(|FriendPlay { song_id, listen_count, .. }| FriendSignal {
                song_id,
                score: f64::from(listen_count) * self.config.friend_listen_weight,
            })
            .collect())
    }

    /// Ranked recommendations for `user_id`, at most `limit` entries, best
    /// first.
    ///
    /// # Errors
    ///
    /// Any store read failure aborts the whole call; no partial list is
    /// returned.
    pub fn recommend(&self, user_id: &str) -> Result<Vec<Recommendation>> {
        let graph = self.build_graph()?;
        let user_node = NodeId::user(user_id);

        let scores = graph.propagate(&user_node, self.config.max_depth);
        let stats = self.user_stats(user_id)?;

        let unheard: Vec<(&str, f64)> = scores
            .iter()
            .filter_map(|(node, &score)| node.as_song().map(|id| (node, id, score)))
            .filter(|(node, _, _)| !graph.has_edge_to(&user_node, node))
            .map(|(_, id, score)| (id, score))
            .collect();
        trace!("{} of {} reached nodes are unheard songs", unheard.len(), scores.len());

        let mut candidates = self.rescale_candidates(&unheard, &stats)?;

        let friend_signals = self.friend_recommendations(user_id)?;
        for signal in &friend_signals {
            *candidates.entry(signal.song_id.clone()).or_insert(0.0) +=
                signal.score * self.config.friend_blend;
        }

        let ranked = rank(candidates, self.config.limit);
        info!(
            "Recommended {} songs for `{user_id}` ({} graph candidates, {} friend signals)",
            ranked.len(),
            unheard.len(),
            friend_signals.len()
        );
        Ok(ranked)
    }

    /// Song lookups run one by one against the store; the pure rescaling
    /// then runs in parallel and lands in a map keyed by song id.
    fn rescale_candidates(&self, unheard: &[(&str, f64)], stats: &TasteStats) -> Result<HashMap<String, f64>> {
        let looked_up = unheard
            .iter()
            .map(|&(song_id, base)| {
                let song = self
                    .store
                    .song_by_id(song_id)
                    .with_context(|| format!("Failed to look up song `{song_id}`"))?;
                Ok((song_id, song, base))
            })
            .collect::<Result<Vec<(&str, Option<Song>, f64)>>>()?;

        let scoring = &self.config.scoring;
        Ok(looked_up
            .into_par_iter()
            .map(|(song_id, song, base)| {
                let score = enhanced_score(song_id, song.as_ref(), base, stats, scoring);
                (song_id.to_string(), score)
            })
            .collect())
    }
}

fn enhanced_score(
    song_id: &str,
    song: Option<&Song>,
    base_score: f64,
    stats: &TasteStats,
    scoring: &ScoringContext,
) -> f64 {
    match song {
        Some(song) => algorithm::rescale(song, base_score, stats, scoring),
        None => {
            debug!("Song `{song_id}` vanished before rescaling, keeping base score");
            base_score
        }
    }
}

/// Sort by score descending, ascending song id on ties, keep `limit`.
#[must_use]
pub fn rank(candidates: HashMap<String, f64>, limit: usize) -> Vec<Recommendation> {
    let mut ranked: Vec<Recommendation> = candidates
        .into_iter()
        .map(|(song_id, score)| Recommendation { song_id, score })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.song_id.cmp(&b.song_id)));
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use chrono::Duration;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn engine_with(setup: impl FnOnce(&mut SqliteStore)) -> RecommendationEngine<SqliteStore> {
        let mut store = SqliteStore::open_in_memory().unwrap();
        setup(&mut store);
        RecommendationEngine::with_defaults(store)
    }

    #[test]
    fn test_build_graph_creates_inverse_pairs() {
        let engine = engine_with(|store| {
            store.add_song("a", "A", "Artist", "pop").unwrap();
            store.add_song("b", "B", "Artist", "rock").unwrap();
            store.record_play("u", "a", 60, Utc::now()).unwrap();
            store.request_friendship("u", "f").unwrap();
            store.accept_friendship("f", "u").unwrap();
        });

        let graph = engine.build_graph().unwrap();

        // 2 songs * 4 + 1 play * 2 + 2 accepted rows * 2
        assert_eq!(graph.edge_count(), 14);

        let song_a = graph.neighbors(&NodeId::song("a"));
        assert!(song_a.iter().any(|e| e.target == NodeId::genre("pop") && e.kind == RelationKind::HasGenre));
        assert!(song_a.iter().any(|e| e.target == NodeId::artist("Artist") && e.kind == RelationKind::ByArtist));
        assert!(song_a.iter().any(|e| e.target == NodeId::user("u") && e.weight == LISTENED_BY_WEIGHT));

        let listened = graph.neighbors(&NodeId::user("u"));
        assert!(listened.iter().any(|e| e.target == NodeId::song("a") && e.weight == LISTENED_TO_WEIGHT));

        let friend_edges = graph
            .neighbors(&NodeId::user("f"))
            .iter()
            .filter(|e| e.kind == RelationKind::IsFriend)
            .count();
        assert_eq!(friend_edges, 2);
    }

    #[test]
    fn test_enhanced_score_for_missing_song_is_base() {
        let engine = engine_with(|_| {});
        let score = engine
            .calculate_enhanced_score("ghost", 0.42, &TasteStats::default())
            .unwrap();
        assert_eq!(score, 0.42);
    }

    #[test]
    fn test_friend_signal_is_listen_count_times_two() {
        let engine = engine_with(|store| {
            store.add_song("b", "B", "X", "pop").unwrap();
            store.request_friendship("u", "f").unwrap();
            store.accept_friendship("f", "u").unwrap();
            for days in 0..3 {
                store.record_play("f", "b", 100, Utc::now() - Duration::days(days)).unwrap();
            }
        });

        let signals = engine.friend_recommendations("u").unwrap();
        assert_eq!(signals, vec![FriendSignal { song_id: "b".to_string(), score: 6.0 }]);
    }

    #[test]
    fn test_recommend_skips_heard_songs_and_ranks_by_genre() {
        // c shares a's artist, so it is reached at the same depth as b and d.
        let engine = engine_with(|store| {
            store.add_song("a", "A", "Artist X", "pop").unwrap();
            store.add_song("b", "B", "Artist Y", "pop").unwrap();
            store.add_song("c", "C", "Artist X", "rock").unwrap();
            store.add_song("d", "D", "Artist Z", "pop").unwrap();
            store.record_play("u", "a", 200, Utc::now()).unwrap();
        });

        let recs = engine.recommend("u").unwrap();
        let ids: Vec<&str> = recs.iter().map(|r| r.song_id.as_str()).collect();

        assert_eq!(ids, vec!["b", "d", "c"]);
        // b and d tie; the tiebreak is the song id.
        assert!(approx(recs[0].score, 0.5));
        assert!(approx(recs[1].score, 0.5));
        // Base 0.25, genre affinity 1.0, artist affinity 1.5.
        assert!(approx(recs[2].score, 0.375));
    }

    #[test]
    fn test_out_of_range_friend_window_is_an_error() {
        let mut engine = engine_with(|store| {
            store.add_song("a", "A", "Artist A", "pop").unwrap();
            store.record_play("u", "a", 100, Utc::now()).unwrap();
        });
        engine.config.friend_window_days = i64::MAX / 1000;

        assert!(engine.friend_recommendations("u").is_err());
        assert!(engine.recommend("u").is_err());
    }

    #[test]
    fn test_recommend_for_unknown_user_is_empty() {
        let engine = engine_with(|store| {
            store.add_song("a", "A", "Artist A", "pop").unwrap();
        });
        assert!(engine.recommend("nobody").unwrap().is_empty());
    }

    #[test]
    fn test_friend_signal_adds_to_graph_score() {
        let engine = engine_with(|store| {
            store.add_song("a", "A", "Same", "pop").unwrap();
            store.add_song("b", "B", "Other", "jazz").unwrap();
            store.record_play("u", "a", 100, Utc::now()).unwrap();
            store.request_friendship("u", "f").unwrap();
            store.accept_friendship("f", "u").unwrap();
            store.record_play("f", "b", 100, Utc::now()).unwrap();
        });

        let graph = engine.build_graph().unwrap();
        let base = graph.propagate(&NodeId::user("u"), 4)[&NodeId::song("b")];
        let stats = engine.user_stats("u").unwrap();
        let graph_score = engine.calculate_enhanced_score("b", base, &stats).unwrap();

        let recs = engine.recommend("u").unwrap();
        let b = recs.iter().find(|r| r.song_id == "b").unwrap();
        assert!(approx(b.score, graph_score + 0.7 * 1.0 * 2.0));
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let candidates: HashMap<String, f64> = (0..30)
            .map(|i| (format!("s{i:02}"), f64::from(i % 7)))
            .collect();

        let ranked = rank(candidates, 20);
        assert_eq!(ranked.len(), 20);
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(ranked
            .windows(2)
            .filter(|w| w[0].score == w[1].score)
            .all(|w| w[0].song_id < w[1].song_id));
    }
}
