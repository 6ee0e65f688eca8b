//! # Conversation Layer
//!
//! Everything between the chat transport and the storage/search collaborators:
//!
//! - [`event`] - Inbound events and outbound directives
//! - [`session`] - Per-user conversation state and the session store
//! - [`wizard`] - Hotel search parameter collection
//! - [`game`] - City chain game rules and scoring
//! - [`leaderboard`] - Ranking over best scores
//! - [`admin`] - Administrative reset gate
//! - [`machine`] - Routing and state transitions
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wayfarer::bot::{Collaborators, ConversationMachine, Event};
//! use wayfarer::catalog::SeedCatalog;
//! use wayfarer::config::Config;
//! use wayfarer::hotels::UnconfiguredClient;
//! use wayfarer::storage::SledPlayerStore;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::default();
//! let store = Arc::new(SledPlayerStore::open(&config.storage.data_dir)?);
//! let machine = ConversationMachine::new(
//!     Collaborators {
//!         players: store.clone(),
//!         history: store,
//!         catalog: Arc::new(SeedCatalog::load_json(&config.storage.cities_seed)?),
//!         lookup: Arc::new(UnconfiguredClient),
//!         hotels: Arc::new(UnconfiguredClient),
//!     },
//!     &config,
//! );
//! for directive in machine.handle(1, Event::from_text("/game")).await {
//!     println!("{}", directive.render_plain());
//! }
//! # Ok(())
//! # }
//! ```

pub mod admin;
pub mod event;
pub mod game;
pub mod leaderboard;
pub mod machine;
pub mod session;
pub mod wizard;

pub use event::{ChoiceOption, Command, Directive, Event};
pub use game::{GameEngine, GameSummary, TurnOutcome};
pub use leaderboard::{Leaderboard, RankedPlayer};
pub use machine::{Collaborators, ConversationMachine, StartRequest};
pub use session::{ConversationState, SessionStore, Step, Workflow};
pub use wizard::{SearchDraft, SearchWizard, WizardOutcome};
