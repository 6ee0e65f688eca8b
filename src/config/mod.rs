//! # Configuration Management Module
//!
//! Loads and writes the TOML configuration for the bot. Every section has defaults so a
//! partial file (or no file at all, via [`Config::default`]) is usable.
//!
//! ## Configuration Structure
//!
//! - [`BotConfig`] - Bot identity, idle timeout and the administrator account
//! - [`StorageConfig`] - Database directory and the city seed file
//! - [`GameConfig`] - City game scoring and name rules
//! - [`SearchConfig`] - Hotels API access and wizard choices
//! - [`LoggingConfig`] - Logging level and log files
//!
//! ## Configuration File Format
//!
//! ```toml
//! [bot]
//! name = "Wayfarer"
//! session_timeout = 30
//!
//! [game]
//! win_bonus = 500
//! non_terminal_letters = ["Ъ", "Ь"]
//!
//! [search]
//! api_key = ""
//! timeout_seconds = 10
//! ```
//!
//! The `RAPID_API_KEY` environment variable overrides `search.api_key` when set.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub name: String,
    /// Minutes of inactivity after which an unfinished conversation is dropped.
    pub session_timeout: u32,
    /// User allowed to run the `/clear` administrative reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_password_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// JSON file with the city reference data used by the game.
    pub cities_seed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_win_bonus")]
    pub win_bonus: u32,
    #[serde(default = "default_nickname_max_len")]
    pub nickname_max_len: usize,
    /// Letters a city name cannot hand over; the letter before them is used instead.
    #[serde(default = "default_non_terminal_letters")]
    pub non_terminal_letters: Vec<String>,
    #[serde(default = "default_leaderboard_size")]
    pub leaderboard_size: usize,
}

fn default_win_bonus() -> u32 {
    500
}

fn default_nickname_max_len() -> usize {
    19
}

fn default_non_terminal_letters() -> Vec<String> {
    vec!["Ъ".to_string(), "Ь".to_string()]
}

fn default_leaderboard_size() -> usize {
    10
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            win_bonus: default_win_bonus(),
            nickname_max_len: default_nickname_max_len(),
            non_terminal_letters: default_non_terminal_letters(),
            leaderboard_size: default_leaderboard_size(),
        }
    }
}

impl GameConfig {
    /// Upper-cased first character of every configured non-terminal letter.
    pub fn non_terminal_chars(&self) -> Vec<char> {
        self.non_terminal_letters
            .iter()
            .filter_map(|s| s.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// RapidAPI key for the Hotels API
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_api_host")]
    pub api_host: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u32,
    /// Photo counts offered by the wizard
    #[serde(default = "default_photo_choices")]
    pub photo_choices: Vec<u8>,
    #[serde(default = "default_max_results")]
    pub max_results: u8,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_api_host() -> String {
    "hotels4.p.rapidapi.com".to_string()
}

fn default_timeout_seconds() -> u32 {
    10
}

fn default_photo_choices() -> Vec<u8> {
    vec![0, 2, 3, 4, 5]
}

fn default_max_results() -> u8 {
    10
}

fn default_locale() -> String {
    "en_US".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_host: default_api_host(),
            timeout_seconds: default_timeout_seconds(),
            photo_choices: default_photo_choices(),
            max_results: default_max_results(),
            locale: default_locale(),
            currency: default_currency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    #[serde(default)]
    pub security_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub search: SearchConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;
        config.apply_env();

        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("RAPID_API_KEY") {
            if !key.trim().is_empty() {
                self.search.api_key = key.trim().to_string();
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bot: BotConfig {
                name: "Wayfarer".to_string(),
                session_timeout: 30,
                admin_id: None,
                admin_password_hash: None,
            },
            storage: StorageConfig {
                data_dir: "./data".to_string(),
                cities_seed: "./data/seeds/cities.json".to_string(),
            },
            game: GameConfig::default(),
            search: SearchConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("wayfarer.log".to_string()),
                security_file: Some("wayfarer-security.log".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_config_defaults() {
        let config = GameConfig::default();
        assert_eq!(config.win_bonus, 500);
        assert_eq!(config.nickname_max_len, 19);
        assert_eq!(config.leaderboard_size, 10);
        assert_eq!(config.non_terminal_chars(), vec!['Ъ', 'Ь']);
    }

    #[test]
    fn test_non_terminal_letters_are_uppercased() {
        let config = GameConfig {
            non_terminal_letters: vec!["y".to_string(), "".to_string(), "ь".to_string()],
            ..GameConfig::default()
        };
        assert_eq!(config.non_terminal_chars(), vec!['Y', 'Ь']);
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let text = r#"
            [bot]
            name = "Test"
            session_timeout = 5

            [storage]
            data_dir = "/tmp/wf"
            cities_seed = "/tmp/wf/cities.json"

            [game]
            win_bonus = 100

            [logging]
            level = "debug"
        "#;
        let config: Config = toml::from_str(text).expect("parse");
        assert_eq!(config.game.win_bonus, 100);
        assert_eq!(config.game.nickname_max_len, 19);
        assert_eq!(config.search.photo_choices, vec![0, 2, 3, 4, 5]);
        assert_eq!(config.search.timeout_seconds, 10);
        assert!(config.bot.admin_id.is_none());
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).expect("serialize");
        let back: Config = toml::from_str(&text).expect("parse");
        assert_eq!(back.bot.name, config.bot.name);
        assert_eq!(back.storage.cities_seed, config.storage.cities_seed);
        assert_eq!(back.game.non_terminal_letters, config.game.non_terminal_letters);
    }
}
