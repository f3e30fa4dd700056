//! # Weighted Relation Graph
//!
//! A small directed, labeled, weighted multigraph plus the decayed
//! breadth-first propagation used to score nodes around a starting point.
//!
//! The graph knows the four node kinds Encore deals with (users, songs,
//! genres, artists) but nothing about how they are built; that lives in
//! [`crate::engine`].
//!
//! ## Propagation
//!
//! ```text
//! contribution(neighbor) = weight(node) * DECAY_FACTOR * edge.weight
//! ```
//!
//! Nodes are expanded in level order, each one at most once: at the depth
//! where it was first discovered. Later arrivals only add to its score.

use log::trace;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Per-hop multiplier applied during propagation, whatever the edge kind.
pub const DECAY_FACTOR: f64 = 0.5;

/// Typed graph key. Renders as `kind:value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeId {
    User(String),
    Song(String),
    Genre(String),
    Artist(String),
}

impl NodeId {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn song(id: impl Into<String>) -> Self {
        Self::Song(id.into())
    }

    pub fn genre(name: impl Into<String>) -> Self {
        Self::Genre(name.into())
    }

    pub fn artist(name: impl Into<String>) -> Self {
        Self::Artist(name.into())
    }

    /// Song id if this is a song node.
    #[must_use]
    pub fn as_song(&self) -> Option<&str> {
        match self {
            Self::Song(id) => Some(id),
            Self::User(_) | Self::Genre(_) | Self::Artist(_) => None,
        }
    }

    /// Prefix used in the rendered form.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Song(_) => "song",
            Self::Genre(_) => "genre",
            Self::Artist(_) => "artist",
        }
    }

    fn value(&self) -> &str {
        match self {
            Self::User(v) | Self::Song(v) | Self::Genre(v) | Self::Artist(v) => v,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

/// What an edge means. Only used for labeling; propagation ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    HasGenre,
    IsGenreOf,
    ByArtist,
    WroteSong,
    ListenedTo,
    ListenedBy,
    IsFriend,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HasGenre => "has_genre",
            Self::IsGenreOf => "is_genre_of",
            Self::ByArtist => "by_artist",
            Self::WroteSong => "wrote_song",
            Self::ListenedTo => "listened_to",
            Self::ListenedBy => "listened_by",
            Self::IsFriend => "is_friend",
        };
        f.write_str(name)
    }
}

/// Outgoing edge, stored in the source vertex's list.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub target: NodeId,
    pub weight: f64,
    pub kind: RelationKind,
}

/// Adjacency-list multigraph. Parallel edges are kept, each one is an
/// independent signal path.
#[derive(Debug, Default, Clone)]
pub struct WeightedGraph {
    adjacency: HashMap<NodeId, Vec<Edge>>,
}

impl WeightedGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent.
    pub fn add_vertex(&mut self, vertex: NodeId) {
        self.adjacency.entry(vertex).or_default();
    }

    /// Appends an edge, creating both endpoints when missing.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, weight: f64, kind: RelationKind) {
        debug_assert!(weight > 0.0, "edge weights must be positive");
        self.add_vertex(target.clone());
        self.adjacency
            .entry(source)
            .or_default()
            .push(Edge { target, weight, kind });
    }

    /// Outgoing edges of `vertex`; empty for unknown vertices.
    #[must_use]
    pub fn neighbors(&self, vertex: &NodeId) -> &[Edge] {
        self.adjacency.get(vertex).map_or(&[], Vec::as_slice)
    }

    /// Whether `source` has at least one outgoing edge to `target`.
    #[must_use]
    pub fn has_edge_to(&self, source: &NodeId, target: &NodeId) -> bool {
        self.neighbors(source).iter().any(|edge| &edge.target == target)
    }

    #[must_use]
    pub fn contains(&self, vertex: &NodeId) -> bool {
        self.adjacency.contains_key(vertex)
    }

    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.adjacency.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(Vec::len).sum()
    }

    /// Decayed level-order propagation from `start`, up to `max_depth` hops.
    ///
    /// Returns every discovered node with its accumulated score, `start`
    /// included at 1.0 (plus whatever cycles feed back into it). A node is
    /// expanded once, at the depth of its first discovery; later paths only
    /// add to its own score and never reach its children.
    ///
    /// # Examples
    ///
    /// ```
    /// use encore::graph::{NodeId, RelationKind, WeightedGraph};
    ///
    /// let mut graph = WeightedGraph::new();
    /// graph.add_edge(NodeId::user("u1"), NodeId::song("s1"), 2.0, RelationKind::ListenedTo);
    ///
    /// let scores = graph.propagate(&NodeId::user("u1"), 2);
    /// assert_eq!(scores[&NodeId::song("s1")], 1.0);
    /// ```
    #[must_use]
    pub fn propagate(&self, start: &NodeId, max_depth: usize) -> HashMap<NodeId, f64> {
        let mut scores = HashMap::new();
        scores.insert(start.clone(), 1.0);

        let mut queue = VecDeque::new();
        queue.push_back((start, 0_usize, 1.0_f64));

        while let Some((node, depth, weight)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }

            for edge in self.neighbors(node) {
                let contribution = weight * DECAY_FACTOR * edge.weight;

                match scores.get_mut(&edge.target) {
                    Some(score) => *score += contribution,
                    None => {
                        trace!("Discovered {} at depth {} via {}", edge.target, depth + 1, edge.kind);
                        scores.insert(edge.target.clone(), contribution);
                        queue.push_back((&edge.target, depth + 1, contribution));
                    }
                }
            }
        }

        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn sample_graph() -> WeightedGraph {
        let mut graph = WeightedGraph::new();
        graph.add_edge(NodeId::user("u1"), NodeId::song("s1"), 2.0, RelationKind::ListenedTo);
        graph.add_edge(NodeId::song("s1"), NodeId::user("u1"), 1.0, RelationKind::ListenedBy);
        graph.add_edge(NodeId::song("s1"), NodeId::genre("pop"), 1.0, RelationKind::HasGenre);
        graph.add_edge(NodeId::genre("pop"), NodeId::song("s1"), 1.0, RelationKind::IsGenreOf);
        graph.add_edge(NodeId::genre("pop"), NodeId::song("s2"), 1.0, RelationKind::IsGenreOf);
        graph.add_edge(NodeId::song("s2"), NodeId::genre("pop"), 1.0, RelationKind::HasGenre);
        graph
    }

    #[test]
    fn test_node_display_is_namespaced() {
        assert_eq!(NodeId::user("42").to_string(), "user:42");
        assert_eq!(NodeId::song("7").to_string(), "song:7");
        assert_eq!(NodeId::genre("Hip-Hop").to_string(), "genre:Hip-Hop");
        assert_eq!(NodeId::artist("M83").to_string(), "artist:M83");
        assert_ne!(NodeId::user("x"), NodeId::song("x"));
    }

    #[test]
    fn test_add_vertex_is_idempotent() {
        let mut graph = WeightedGraph::new();
        graph.add_edge(NodeId::user("u1"), NodeId::song("s1"), 2.0, RelationKind::ListenedTo);
        graph.add_vertex(NodeId::user("u1"));

        assert_eq!(graph.vertex_count(), 2);
        assert_eq!(graph.neighbors(&NodeId::user("u1")).len(), 1);
    }

    #[test]
    fn test_add_edge_keeps_duplicates() {
        let mut graph = WeightedGraph::new();
        graph.add_edge(NodeId::user("a"), NodeId::user("b"), 1.5, RelationKind::IsFriend);
        graph.add_edge(NodeId::user("a"), NodeId::user("b"), 1.5, RelationKind::IsFriend);

        assert_eq!(graph.neighbors(&NodeId::user("a")).len(), 2);
        assert!(graph.contains(&NodeId::user("b")));
        assert!(graph.neighbors(&NodeId::user("b")).is_empty());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_neighbors_of_unknown_vertex_is_empty() {
        let graph = sample_graph();
        assert!(graph.neighbors(&NodeId::artist("nobody")).is_empty());
    }

    #[test]
    fn test_propagate_depth_zero_is_singleton() {
        let graph = sample_graph();
        let scores = graph.propagate(&NodeId::user("u1"), 0);

        assert_eq!(scores.len(), 1);
        assert_eq!(scores[&NodeId::user("u1")], 1.0);
    }

    #[test]
    fn test_propagate_from_absent_start_is_singleton() {
        let graph = sample_graph();
        let scores = graph.propagate(&NodeId::user("ghost"), 4);

        assert_eq!(scores.len(), 1);
        assert_eq!(scores[&NodeId::user("ghost")], 1.0);
    }

    #[test]
    fn test_two_hop_decay_is_multiplicative() {
        let mut graph = WeightedGraph::new();
        graph.add_edge(NodeId::user("u"), NodeId::song("a"), 2.0, RelationKind::ListenedTo);
        graph.add_edge(NodeId::song("a"), NodeId::artist("x"), 3.0, RelationKind::ByArtist);

        let scores = graph.propagate(&NodeId::user("u"), 2);
        assert!(approx(scores[&NodeId::song("a")], 0.5 * 2.0));
        assert!(approx(scores[&NodeId::artist("x")], 0.5 * 2.0 * 0.5 * 3.0));
    }

    #[test]
    fn test_unreachable_within_depth_is_absent() {
        let graph = sample_graph();
        // u1 -> s1 -> pop -> s2 needs three hops.
        let scores = graph.propagate(&NodeId::user("u1"), 2);

        assert!(scores.contains_key(&NodeId::genre("pop")));
        assert!(!scores.contains_key(&NodeId::song("s2")));

        let deeper = graph.propagate(&NodeId::user("u1"), 3);
        assert!(approx(deeper[&NodeId::song("s2")], 1.0 * 0.5 * 0.5));
    }

    #[test]
    fn test_multiple_paths_accumulate() {
        let graph = sample_graph();
        let scores = graph.propagate(&NodeId::user("u1"), 3);

        // start 1.0, plus s1 -> u1 back edge: 1.0 * 0.5 * 1.0
        assert!(approx(scores[&NodeId::user("u1")], 1.5));
        // first discovery 1.0, plus pop -> s1 at depth 3: 0.5 * 0.5
        assert!(approx(scores[&NodeId::song("s1")], 1.25));
    }

    #[test]
    fn test_node_is_expanded_only_at_first_discovery() {
        // start -> a (weak) -> c, start -> b (strong) -> c; c -> d.
        // c is discovered through a first and expanded from there only.
        let mut graph = WeightedGraph::new();
        let start = NodeId::user("start");
        graph.add_edge(start.clone(), NodeId::song("a"), 1.0, RelationKind::ListenedTo);
        graph.add_edge(start.clone(), NodeId::song("b"), 4.0, RelationKind::ListenedTo);
        graph.add_edge(NodeId::song("a"), NodeId::genre("c"), 1.0, RelationKind::HasGenre);
        graph.add_edge(NodeId::song("b"), NodeId::genre("c"), 1.0, RelationKind::HasGenre);
        graph.add_edge(NodeId::genre("c"), NodeId::song("d"), 1.0, RelationKind::IsGenreOf);

        let scores = graph.propagate(&start, 4);

        let via_a = 1.0 * 0.5 * 1.0 * 0.5;
        let via_b = 1.0 * 0.5 * 4.0 * 0.5;
        assert!(approx(scores[&NodeId::genre("c")], via_a + via_b));
        // d only inherits from the first (weak) expansion of c.
        assert!(approx(scores[&NodeId::song("d")], via_a * 0.5));
    }
}
