//! # Database Module
//!
//! SQLite-backed relational snapshot the recommendation engine reads from:
//! songs, listening history, friendships and likes.
//!
//! The engine only talks to the [`MusicStore`] trait, which lists the read
//! aggregates it needs. [`SqliteStore`] implements it and also carries the
//! write paths used by the CLI (recording plays, toggling likes, the friend
//! request/accept flow and seeding).
//!
//! ## Schema
//!
//! - `songs`: id, title, artist, genre, `play_count`, `like_count`
//! - `history`: one row per play, `play_duration` in seconds, `played_at`
//!   as unix seconds
//! - `friendships`: directed rows with a `pending`/`accepted` status
//! - `likes`: one row per (user, song)

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, trace};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

/// A catalogued song with its popularity counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub genre: String,
    /// Total plays across all users.
    pub play_count: u32,
    /// Number of users currently liking the song.
    pub like_count: u32,
}

/// One play of one song by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_id: String,
    pub song_id: String,
    /// Seconds actually listened.
    pub play_duration: u32,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
}

impl FriendshipStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
        }
    }
}

impl fmt::Display for FriendshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for FriendshipStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for FriendshipStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            other => Err(FromSqlError::Other(
                format!("unknown friendship status `{other}`").into(),
            )),
        }
    }
}

/// A directed friendship row. Accepted rows are read as bidirectional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friendship {
    pub user_id: String,
    pub friend_id: String,
    pub status: FriendshipStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Like {
    pub user_id: String,
    pub song_id: String,
}

/// Aggregated recent plays of one song by a user's friends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendPlay {
    pub song_id: String,
    pub listen_count: u32,
    pub last_played: DateTime<Utc>,
}

/// Read operations the recommendation engine needs from the data layer.
///
/// Every method returns a complete result set. No consistency is promised
/// between calls; each one is a point-in-time read.
pub trait MusicStore {
    /// Every song, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn all_songs(&self) -> Result<Vec<Song>>;

    /// Every history row, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn all_history(&self) -> Result<Vec<HistoryEntry>>;

    /// Friendship rows with `accepted` status.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn accepted_friendships(&self) -> Result<Vec<Friendship>>;

    /// The user's genres by summed play duration, descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn top_genres(&self, user_id: &str, limit: usize) -> Result<Vec<(String, f64)>>;

    /// The user's artists by summed play duration, descending.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn top_artists(&self, user_id: &str, limit: usize) -> Result<Vec<(String, f64)>>;

    /// Ids of every song the user likes.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn liked_song_ids(&self, user_id: &str) -> Result<HashSet<String>>;

    /// A single song, `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn song_by_id(&self, song_id: &str) -> Result<Option<Song>>;

    /// Songs played by accepted friends since `since` that the user has
    /// never played, most listened first, then most recent.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying read fails.
    fn friend_recent_plays(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FriendPlay>>;
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS songs (
        id         TEXT    PRIMARY KEY,
        title      TEXT    NOT NULL,
        artist     TEXT    NOT NULL,
        genre      TEXT    NOT NULL,
        play_count INTEGER NOT NULL DEFAULT 0,
        like_count INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS history (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id       TEXT    NOT NULL,
        song_id       TEXT    NOT NULL REFERENCES songs(id),
        play_duration INTEGER NOT NULL DEFAULT 0,
        played_at     INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS friendships (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id   TEXT    NOT NULL,
        friend_id TEXT    NOT NULL,
        status    TEXT    NOT NULL CHECK (status IN ('pending', 'accepted')),
        UNIQUE (user_id, friend_id)
    );
    CREATE TABLE IF NOT EXISTS likes (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT    NOT NULL,
        song_id TEXT    NOT NULL REFERENCES songs(id),
        UNIQUE (user_id, song_id)
    );
    CREATE INDEX IF NOT EXISTS idx_history_user ON history(user_id);
    CREATE INDEX IF NOT EXISTS idx_history_song ON history(song_id);
    CREATE INDEX IF NOT EXISTS idx_friendships_friend ON friendships(friend_id);
    CREATE INDEX IF NOT EXISTS idx_likes_user ON likes(user_id);
";

/// [`MusicStore`] over a single SQLite connection.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite refuses the connection.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| {
            format!("SQLite connection refused. DB location: {}", path.display())
        })?;
        debug!("Opened database at {}", path.display());
        Ok(Self { conn })
    }

    /// Fresh private in-memory database with the schema already created.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self { conn };
        store.init_schema(false)?;
        Ok(store)
    }

    /// Create every table and index. With `force`, existing tables are
    /// dropped first.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub fn init_schema(&self, force: bool) -> Result<()> {
        if force {
            info!("Dropping existing tables");
            self.conn
                .execute_batch(
                    "DROP TABLE IF EXISTS likes;
                     DROP TABLE IF EXISTS friendships;
                     DROP TABLE IF EXISTS history;
                     DROP TABLE IF EXISTS songs;",
                )
                .context("Failed to drop existing tables")?;
        }

        self.conn
            .execute_batch(SCHEMA)
            .context("Invalid SQL when creating schema")?;
        Ok(())
    }

    /// Insert one song with zeroed counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the id already exists or the insert fails.
    pub fn add_song(&self, id: &str, title: &str, artist: &str, genre: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO songs (id, title, artist, genre) VALUES (?1, ?2, ?3, ?4)",
                params![id, title, artist, genre],
            )
            .with_context(|| format!("Failed to INSERT song `{id}`"))?;
        Ok(())
    }

    /// Bulk insert inside one transaction, counters included.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is committed then.
    pub fn insert_songs(&mut self, songs: &[Song]) -> Result<()> {
        let tx = self.conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO songs (id, title, artist, genre, play_count, like_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for song in songs {
                stmt.execute(params![
                    song.id,
                    song.title,
                    song.artist,
                    song.genre,
                    song.play_count,
                    song.like_count
                ])
                .with_context(|| format!("Invalid SQL statement when INSERTing song: {song:?}"))?;
            }
        }

        tx.commit().context("Committing SQL transaction failed")?;
        Ok(())
    }

    /// Record a play: append a history row and bump the song's
    /// `play_count`.
    ///
    /// # Errors
    ///
    /// Returns an error if the song does not exist or a write fails.
    pub fn record_play(
        &mut self,
        user_id: &str,
        song_id: &str,
        play_duration: u32,
        played_at: DateTime<Utc>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;

        let updated = tx
            .execute(
                "UPDATE songs SET play_count = play_count + 1 WHERE id = ?1",
                [song_id],
            )
            .context("Failed to increment play count")?;
        if updated == 0 {
            bail!("Song `{song_id}` does not exist");
        }

        tx.execute(
            "INSERT INTO history (user_id, song_id, play_duration, played_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, song_id, play_duration, played_at.timestamp()],
        )
        .context("Failed to INSERT history row")?;

        tx.commit().context("Committing SQL transaction failed")?;
        trace!("Recorded play of `{song_id}` by `{user_id}` ({play_duration}s)");
        Ok(())
    }

    /// Like the song if the user does not like it yet, unlike it otherwise.
    /// Returns whether the song is liked afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the song does not exist or a write fails.
    pub fn toggle_like(&mut self, user_id: &str, song_id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;

        let exists: bool = tx
            .query_row("SELECT EXISTS(SELECT 1 FROM songs WHERE id = ?1)", [song_id], |row| {
                row.get(0)
            })
            .context("Failed to look up song")?;
        if !exists {
            bail!("Song `{song_id}` does not exist");
        }

        let removed = tx
            .execute(
                "DELETE FROM likes WHERE user_id = ?1 AND song_id = ?2",
                [user_id, song_id],
            )
            .context("Failed to DELETE like")?;

        let liked = if removed > 0 {
            tx.execute(
                "UPDATE songs SET like_count = MAX(like_count - 1, 0) WHERE id = ?1",
                [song_id],
            )?;
            false
        } else {
            tx.execute(
                "INSERT INTO likes (user_id, song_id) VALUES (?1, ?2)",
                [user_id, song_id],
            )
            .context("Failed to INSERT like")?;
            tx.execute(
                "UPDATE songs SET like_count = like_count + 1 WHERE id = ?1",
                [song_id],
            )?;
            true
        };

        tx.commit().context("Committing SQL transaction failed")?;
        Ok(liked)
    }

    /// Create a pending friendship from `user_id` to `friend_id`.
    ///
    /// # Errors
    ///
    /// Returns an error for self-friendship, when any row between the two
    /// users already exists, or if the insert fails.
    pub fn request_friendship(&self, user_id: &str, friend_id: &str) -> Result<()> {
        if user_id == friend_id {
            bail!("A user cannot befriend themselves");
        }

        let existing: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2) OR (user_id = ?2 AND friend_id = ?1))",
                [user_id, friend_id],
                |row| row.get(0),
            )
            .context("Failed to look up existing friendship")?;
        if existing {
            bail!("A friendship between `{user_id}` and `{friend_id}` already exists");
        }

        self.conn
            .execute(
                "INSERT INTO friendships (user_id, friend_id, status) VALUES (?1, ?2, ?3)",
                params![user_id, friend_id, FriendshipStatus::Pending],
            )
            .context("Failed to INSERT friendship")?;
        Ok(())
    }

    /// Accept the pending request `requester_id -> user_id` and store the
    /// reverse row as accepted too. Returns `false` when there was no
    /// pending request.
    ///
    /// # Errors
    ///
    /// Returns an error if a write fails.
    pub fn accept_friendship(&mut self, user_id: &str, requester_id: &str) -> Result<bool> {
        let tx = self.conn.transaction()?;

        let updated = tx
            .execute(
                "UPDATE friendships SET status = ?3
                 WHERE user_id = ?1 AND friend_id = ?2 AND status = ?4",
                params![
                    requester_id,
                    user_id,
                    FriendshipStatus::Accepted,
                    FriendshipStatus::Pending
                ],
            )
            .context("Failed to accept friendship")?;
        if updated == 0 {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO friendships (user_id, friend_id, status) VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id, friend_id) DO UPDATE SET status = excluded.status",
            params![user_id, requester_id, FriendshipStatus::Accepted],
        )
        .context("Failed to store reverse friendship")?;

        tx.commit().context("Committing SQL transaction failed")?;
        Ok(true)
    }

    /// Number of catalogued songs.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn song_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM songs", [], |row| row.get(0))
            .context("Could not count songs")?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn duration_ranking(&self, user_id: &str, column: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        // `column` is one of our own constants, never user input.
        let sql = format!(
            "SELECT s.{column}, CAST(SUM(h.play_duration) AS REAL) AS total
             FROM history h
             JOIN songs s ON s.id = h.song_id
             WHERE h.user_id = ?1
             GROUP BY s.{column}
             ORDER BY total DESC, s.{column} ASC
             LIMIT ?2"
        );

        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("Invalid SQL statement when ranking {column}s"))?;
        let rows = stmt
            .query_map(params![user_id, sql_limit(limit)], |row| Ok((row.get(0)?, row.get(1)?)))
            .with_context(|| format!("Cannot query top {column}s"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .with_context(|| format!("Queried {column} ranking row failed"))
    }
}

impl MusicStore for SqliteStore {
    fn all_songs(&self) -> Result<Vec<Song>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, title, artist, genre, play_count, like_count FROM songs ORDER BY id",
            )
            .context("Invalid SQL statement when SELECTing all songs")?;

        let songs = stmt
            .query_map([], song_from_row)
            .context("Cannot query songs")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Queried song row failed")?;
        Ok(songs)
    }

    fn all_history(&self) -> Result<Vec<HistoryEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id, song_id, play_duration, played_at FROM history ORDER BY id")
            .context("Invalid SQL statement when SELECTing history")?;

        let history = stmt
            .query_map([], |row| {
                Ok(HistoryEntry {
                    user_id: row.get(0)?,
                    song_id: row.get(1)?,
                    play_duration: row.get(2)?,
                    played_at: timestamp_from_row(row, 3)?,
                })
            })
            .context("Cannot query history")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Queried history row failed")?;
        Ok(history)
    }

    fn accepted_friendships(&self) -> Result<Vec<Friendship>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT user_id, friend_id, status FROM friendships WHERE status = ?1 ORDER BY id",
            )
            .context("Invalid SQL statement when SELECTing friendships")?;

        let friendships = stmt
            .query_map([FriendshipStatus::Accepted], |row| {
                Ok(Friendship {
                    user_id: row.get(0)?,
                    friend_id: row.get(1)?,
                    status: row.get(2)?,
                })
            })
            .context("Cannot query friendships")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Queried friendship row failed")?;
        Ok(friendships)
    }

    fn top_genres(&self, user_id: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        self.duration_ranking(user_id, "genre", limit)
    }

    fn top_artists(&self, user_id: &str, limit: usize) -> Result<Vec<(String, f64)>> {
        self.duration_ranking(user_id, "artist", limit)
    }

    fn liked_song_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT song_id FROM likes WHERE user_id = ?1")
            .context("Invalid SQL statement when SELECTing likes")?;

        let liked = stmt
            .query_map([user_id], |row| row.get(0))
            .context("Cannot query likes")?
            .collect::<rusqlite::Result<HashSet<String>>>()
            .context("Queried like row failed")?;
        Ok(liked)
    }

    fn song_by_id(&self, song_id: &str) -> Result<Option<Song>> {
        self.conn
            .query_row(
                "SELECT id, title, artist, genre, play_count, like_count FROM songs WHERE id = ?1",
                [song_id],
                song_from_row,
            )
            .optional()
            .with_context(|| format!("Failed to query song `{song_id}`"))
    }

    fn friend_recent_plays(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<FriendPlay>> {
        let mut stmt = self
            .conn
            .prepare(
                "WITH friends AS (
                     SELECT friend_id AS id FROM friendships WHERE user_id = ?1 AND status = 'accepted'
                     UNION
                     SELECT user_id AS id FROM friendships WHERE friend_id = ?1 AND status = 'accepted'
                 )
                 SELECT h.song_id, COUNT(*) AS listen_count, MAX(h.played_at) AS last_played
                 FROM history h
                 WHERE h.user_id IN (SELECT id FROM friends)
                   AND h.played_at >= ?2
                   AND h.song_id NOT IN (SELECT song_id FROM history WHERE user_id = ?1)
                 GROUP BY h.song_id
                 ORDER BY listen_count DESC, last_played DESC, h.song_id ASC
                 LIMIT ?3",
            )
            .context("Invalid SQL statement when SELECTing friend plays")?;

        let plays = stmt
            .query_map(params![user_id, since.timestamp(), sql_limit(limit)], |row| {
                Ok(FriendPlay {
                    song_id: row.get(0)?,
                    listen_count: row.get(1)?,
                    last_played: timestamp_from_row(row, 2)?,
                })
            })
            .context("Cannot query friend plays")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Queried friend play row failed")?;
        Ok(plays)
    }
}

fn song_from_row(row: &Row<'_>) -> rusqlite::Result<Song> {
    Ok(Song {
        id: row.get(0)?,
        title: row.get(1)?,
        artist: row.get(2)?,
        genre: row.get(3)?,
        play_count: row.get(4)?,
        like_count: row.get(5)?,
    })
}

fn timestamp_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}
