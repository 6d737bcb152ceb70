//! gator: a multi-user RSS aggregator.
//!
//! Users follow feeds; `gator agg` polls one feed per tick (least recently
//! fetched first) and stores new posts in a shared SQLite database, keyed by
//! post URL so the same article is stored once no matter how many feeds or
//! followers carry it.
//!
//! - [`storage`] - SQLite store and the [`storage::FeedStore`] seam
//! - [`feed`] - fetching, RSS parsing and publish-date normalization
//! - [`scheduler`] - the polling loop and post ingestion
//! - [`commands`] - handlers behind the CLI subcommands
//! - [`config`] - optional TOML configuration

pub mod commands;
pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;
