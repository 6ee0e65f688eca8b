//! Error taxonomy shared by the conversation machine, the search wizard and the city game.
//!
//! Every failure is scoped to the user that caused it. [`BotError::recovery`] tells the
//! machine what to do with the user's conversation state after reporting the error.

use thiserror::Error;

/// Errors raised by the persistent player store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when mutating a player that was never registered.
    #[error("player not found: {0}")]
    PlayerNotFound(u64),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },
}

/// Errors raised by a city catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("city catalog unavailable: {0}")]
    Unavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse city seed {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// A player's city was refused. The turn is not consumed and nothing is stored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameRuleViolation {
    #[error("the city must start with {required}")]
    WrongLetter { required: char },

    #[error("no such city")]
    UnknownCity,

    #[error("that city was already played")]
    AlreadyPlayed,
}

/// The event does not fit the user's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateConflict {
    #[error("another workflow is already active: {active}")]
    Busy { active: &'static str },

    #[error("unexpected input at step {step}")]
    UnexpectedEvent { step: &'static str },

    #[error("no active workflow")]
    NoActiveWorkflow,
}

/// What the conversation machine does with the user's state after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Keep the current step and ask again.
    Reprompt,
    /// The workflow ran to an end without a result; clear the state.
    EndWorkflow,
    /// The workflow cannot continue; clear the state.
    ResetWorkflow,
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    GameRule(#[from] GameRuleViolation),

    #[error("nothing found: {0}")]
    NotFound(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Conflict(#[from] StateConflict),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<CatalogError> for BotError {
    fn from(e: CatalogError) -> Self {
        BotError::ServiceUnavailable(e.to_string())
    }
}

impl BotError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BotError::Validation(msg.into())
    }

    pub fn recovery(&self) -> Recovery {
        match self {
            BotError::Validation(_) | BotError::GameRule(_) | BotError::Conflict(_) => {
                Recovery::Reprompt
            }
            BotError::NotFound(_) => Recovery::EndWorkflow,
            BotError::ServiceUnavailable(_) | BotError::Storage(_) => Recovery::ResetWorkflow,
        }
    }
}
