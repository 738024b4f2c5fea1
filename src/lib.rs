//! Googol, a small distributed web search engine.
//!
//! This library crate defines the core subsystems that make up the system.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! The system is composed of three long-lived component kinds plus shared
//! plumbing:
//!
//! - **`dispatcher`**: The central coordinator. Owns the URL queue and the
//!   visited set, routes searches across storage barrels with round-robin
//!   failover, aggregates statistics, and pushes digest updates to
//!   subscribed callbacks.
//! - **`barrel`**: The replicated storage node. Holds the inverted index,
//!   the backlink map and per-page metadata, answers Bloom-accelerated
//!   conjunctive searches, syncs state from peers on startup, and keeps a
//!   durable replica of the dispatcher's URL queue.
//! - **`crawler`**: The pull-based downloader. Consumes URLs from the
//!   dispatcher, parses pages, multicasts index updates to every barrel
//!   with per-target retry queues, and reports discovered links back.
//! - **`bloom`**: Probabilistic membership filter used by barrels to cut
//!   short searches for never-indexed terms.
//! - **`config`** / **`error`**: startup configuration and the error kinds
//!   that cross the RPC boundary.

pub mod barrel;
pub mod bloom;
pub mod config;
pub mod crawler;
pub mod dispatcher;
pub mod error;
