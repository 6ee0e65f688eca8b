//! Administrative data reset (`/clear`).
//!
//! Only the configured administrator may enter the flow, and only after the password
//! matches the stored Argon2 hash.

use argon2::Argon2;
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};

use crate::config::BotConfig;
use crate::storage::UserId;

/// Which data `/clear` wipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetScope {
    History,
    GameStats,
    All,
}

impl ResetScope {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(ResetScope::History),
            "2" => Some(ResetScope::GameStats),
            "3" => Some(ResetScope::All),
            _ => None,
        }
    }

    pub fn clears_history(self) -> bool {
        matches!(self, ResetScope::History | ResetScope::All)
    }

    pub fn clears_game_stats(self) -> bool {
        matches!(self, ResetScope::GameStats | ResetScope::All)
    }

    pub fn describe(self) -> &'static str {
        match self {
            ResetScope::History => "search history",
            ResetScope::GameStats => "game statistics",
            ResetScope::All => "search history and game statistics",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AdminGate {
    admin_id: Option<UserId>,
    password_hash: Option<String>,
}

impl AdminGate {
    pub fn new(admin_id: Option<UserId>, password_hash: Option<String>) -> Self {
        Self {
            admin_id,
            password_hash,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.admin_id, config.admin_password_hash.clone())
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        self.admin_id == Some(user_id)
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// False on mismatch, on a missing hash and on a corrupt hash.
    pub fn verify(&self, password: &str) -> bool {
        let Some(stored) = &self.password_hash else {
            return false;
        };
        match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                log::error!("admin password hash is corrupt: {}", e);
                false
            }
        }
    }
}

/// Argon2 PHC string for `password`.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_checks_id_and_password() {
        let hash = hash_password("correct horse").unwrap();
        let gate = AdminGate::new(Some(42), Some(hash));
        assert!(gate.is_admin(42));
        assert!(!gate.is_admin(7));
        assert!(gate.verify("correct horse"));
        assert!(!gate.verify("wrong"));
    }

    #[test]
    fn corrupt_or_missing_hash_never_verifies() {
        assert!(!AdminGate::new(Some(1), None).verify("x"));
        assert!(!AdminGate::new(Some(1), Some("not-a-hash".into())).verify("x"));
    }

    #[test]
    fn scope_parses_menu_numbers() {
        assert_eq!(ResetScope::parse(" 2 "), Some(ResetScope::GameStats));
        assert_eq!(ResetScope::parse("4"), None);
        assert!(ResetScope::All.clears_history() && ResetScope::All.clears_game_stats());
    }
}
