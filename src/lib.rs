//! # Wayfarer - Hotel search and city game chat bot core
//!
//! Wayfarer is the transport-independent core of a chat bot with two features: a
//! step-by-step hotel search wizard and a city chain word game with a persistent
//! leaderboard. A chat transport feeds user events in and renders the returned directives.
//!
//! ## Features
//!
//! - **Search Wizard**: Collects city, dates, price floor, result and photo counts with validation at every step.
//! - **City Game**: Letter-chain game against the bot with scoring, a win bonus and best-score tracking.
//! - **Leaderboard**: Total ordering by best score and registration order, with the viewer's rank.
//! - **Per-user State Machine**: One workflow per user at a time, serialized per user and concurrent across users.
//! - **Persistence**: Embedded sled database for players, played cities and search history.
//! - **Admin Reset**: Argon2-protected `/clear` for history and game statistics.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wayfarer::bot::{Collaborators, ConversationMachine};
//! use wayfarer::catalog::SeedCatalog;
//! use wayfarer::config::Config;
//! use wayfarer::hotels::UnconfiguredClient;
//! use wayfarer::storage::SledPlayerStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let store = Arc::new(SledPlayerStore::open(&config.storage.data_dir)?);
//!     let machine = Arc::new(ConversationMachine::new(
//!         Collaborators {
//!             players: store.clone(),
//!             history: store,
//!             catalog: Arc::new(SeedCatalog::load_json(&config.storage.cities_seed)?),
//!             lookup: Arc::new(UnconfiguredClient),
//!             hotels: Arc::new(UnconfiguredClient),
//!         },
//!         &config,
//!     ));
//!     wayfarer::console::run(machine, chrono::Duration::minutes(30)).await
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`bot`] - Conversation machine, search wizard, city game, leaderboard
//! - [`catalog`] - City reference data for the game
//! - [`hotels`] - Hotel search and city lookup collaborators
//! - [`storage`] - Player, played-city and history persistence
//! - [`config`] - Configuration management
//! - [`console`] - Line-oriented console transport
//! - [`errors`] - Error taxonomy and recovery policy

pub mod bot;
pub mod catalog;
pub mod config;
pub mod console;
pub mod errors;
pub mod hotels;
pub mod logutil;
pub mod metrics;
pub mod storage;
