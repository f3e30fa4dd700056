//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `encore` binary.
//!
//! ## Commands
//!
//! - `init-db`: create the database schema
//! - `seed`: fill the database with generated demo data
//! - `add-song`, `play`, `like`, `friend`: feed the relational snapshot
//! - `recommend`: ranked songs a user has not heard yet
//! - `stats`: a user's taste statistics
//! - `completion`: shell completion scripts
//!
//! ## Examples
//!
//! ```bash
//! encore init-db
//! encore seed --users 20 --songs 300
//! encore play user-001 song-0042 --duration 210
//! encore recommend user-001 --limit 10
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "encore")]
#[command(about = "Encore: graph-based song recommendations from listening history, friends and taste")]
#[command(version)]
pub struct Args {
    /// Database file to use instead of the one in the data directory
    #[arg(long, global = true, env = "ENCORE_DB")]
    pub db: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Enumeration of all available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema
    ///
    /// Safe to run on an existing database; tables that already exist are
    /// left alone unless --force is given.
    InitDb {
        /// Drop and recreate every table
        #[arg(long)]
        force: bool,
    },

    /// Fill the database with generated demo data
    ///
    /// Creates songs across several genres and artists, users with a
    /// favourite genre, plays over the last two months, likes and accepted
    /// friendships.
    Seed {
        /// Number of users to generate
        #[arg(long, default_value = "10")]
        users: usize,

        /// Number of songs to generate
        #[arg(long, default_value = "120")]
        songs: usize,

        /// Plays per user
        #[arg(long, default_value = "25")]
        plays: usize,

        /// Random seed, for reproducible data
        #[arg(long, default_value = "42")]
        seed: u64,
    },

    /// Add a song to the catalog
    AddSong {
        id: String,
        title: String,
        artist: String,
        genre: String,
    },

    /// Record that a user played a song
    ///
    /// Appends a history row and increments the song's play counter.
    Play {
        user: String,
        song: String,

        /// Seconds listened
        #[arg(long, default_value = "0")]
        duration: u32,
    },

    /// Like a song, or remove the like if it is already liked
    Like {
        user: String,
        song: String,
    },

    /// Manage friendships
    Friend {
        #[command(subcommand)]
        action: FriendAction,
    },

    /// Recommend songs a user has not heard yet
    ///
    /// Builds the relation graph from the database, propagates scores from
    /// the user, rescales them by the user's taste and blends in what the
    /// user's friends played recently.
    Recommend {
        user: String,

        /// Maximum number of songs to show
        #[arg(short, long)]
        limit: Option<usize>,

        /// Propagation depth
        #[arg(short, long)]
        depth: Option<usize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show a user's top genres, top artists and likes
    Stats {
        user: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    ///
    /// Usage: encore completion bash > ~/.local/share/bash-completion/completions/encore
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Friendship actions
#[derive(Subcommand, Debug)]
pub enum FriendAction {
    /// Send a friend request from USER to FRIEND
    Request { user: String, friend: String },

    /// USER accepts the pending request sent by REQUESTER
    Accept { user: String, requester: String },
}
