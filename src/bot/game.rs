//! City chain game.
//!
//! The player and the bot take turns naming cities; each city must start with the
//! letter the previous one handed over. The bot answers with a random unplayed city from
//! the catalog, and when it has none left the player wins. The played-city set lives in
//! the [`PlayerStore`], so a game survives restarts until it is won or surrendered.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};

use crate::catalog::{first_letter, City, CityCatalog};
use crate::config::GameConfig;
use crate::errors::{BotError, GameRuleViolation};
use crate::logutil::escape_log;
use crate::storage::{Player, PlayerStore, UserId};

/// Characters reserved by the markdown dialect used for formatted output.
pub const MARKDOWN_RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Backslash-escape every reserved markdown character.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Cut a nickname to `max_len` characters, marking the cut with "...".
pub fn truncate_nickname(raw: &str, max_len: usize) -> String {
    let name = raw.trim();
    if name.chars().count() <= max_len {
        return name.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let mut out: String = name.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The bot answered; the player must now name a city starting with `next_letter`.
    Countered {
        played: City,
        reply: City,
        next_letter: Option<char>,
    },
    /// The bot had no city for `letter`; the game is over.
    Won {
        played: City,
        letter: char,
        summary: GameSummary,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameSummary {
    pub score: u32,
    pub best: u32,
}

pub struct GameEngine {
    store: Arc<dyn PlayerStore>,
    catalog: Arc<dyn CityCatalog>,
    win_bonus: u32,
    nickname_max_len: usize,
    non_terminal: Vec<char>,
}

impl GameEngine {
    pub fn new(
        store: Arc<dyn PlayerStore>,
        catalog: Arc<dyn CityCatalog>,
        config: &GameConfig,
    ) -> Self {
        Self {
            store,
            catalog,
            win_bonus: config.win_bonus,
            nickname_max_len: config.nickname_max_len.max(4),
            non_terminal: config.non_terminal_chars(),
        }
    }

    pub fn player(&self, user_id: UserId) -> Result<Option<Player>, BotError> {
        Ok(self.store.get(user_id)?)
    }

    fn clean_nickname(&self, raw: &str) -> Result<String, BotError> {
        let name = truncate_nickname(raw, self.nickname_max_len);
        if name.is_empty() {
            return Err(BotError::validation("the name cannot be empty"));
        }
        Ok(name)
    }

    /// Register a player; an already registered player keeps the existing record.
    pub fn register(&self, user_id: UserId, raw_name: &str) -> Result<Player, BotError> {
        let name = self.clean_nickname(raw_name)?;
        let player = self.store.create(user_id, &name)?;
        info!(
            target: "wayfarer::games",
            "game.register user={} name={}",
            user_id,
            escape_log(&player.nickname)
        );
        Ok(player)
    }

    pub fn rename(&self, user_id: UserId, raw_name: &str) -> Result<String, BotError> {
        let name = self.clean_nickname(raw_name)?;
        self.store.set_nickname(user_id, &name)?;
        info!(
            target: "wayfarer::games",
            "game.rename user={} name={}",
            user_id,
            escape_log(&name)
        );
        Ok(name)
    }

    /// The letter a name hands over: its last letter, or the one before it when the last
    /// is non-terminal. Non-letters are ignored.
    pub fn handover_letter(&self, name: &str) -> Option<char> {
        let letters: Vec<char> = name
            .chars()
            .filter(|c| c.is_alphabetic())
            .filter_map(|c| c.to_uppercase().next())
            .collect();
        let last = *letters.last()?;
        if self.non_terminal.contains(&last) && letters.len() >= 2 {
            return Some(letters[letters.len() - 2]);
        }
        Some(last)
    }

    /// The letter the player's next city must start with; `None` on an empty game.
    pub fn required_letter(&self, user_id: UserId) -> Result<Option<char>, BotError> {
        let played = self.store.played_cities(user_id)?;
        Ok(played.last().and_then(|key| self.handover_letter(key)))
    }

    /// Validate and record the player's city, then answer with a counter-move.
    ///
    /// A refused city leaves the played set untouched.
    pub fn play_turn(&self, user_id: UserId, input: &str) -> Result<TurnOutcome, BotError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(BotError::validation("type the name of a city"));
        }

        let played = self.store.played_cities(user_id)?;
        if let Some(required) = played.last().and_then(|key| self.handover_letter(key)) {
            if first_letter(input) != Some(required) {
                return Err(GameRuleViolation::WrongLetter { required }.into());
            }
        }

        let city = self
            .catalog
            .find(input)?
            .ok_or(GameRuleViolation::UnknownCity)?;
        let key = city.key();
        if played.iter().any(|p| p == &key) {
            return Err(GameRuleViolation::AlreadyPlayed.into());
        }
        let letter = self
            .handover_letter(&city.name)
            .ok_or_else(|| BotError::validation("that name has no letters"))?;

        // nothing is written until the counter-move is known
        let mut exclude: HashSet<String> = played.into_iter().collect();
        exclude.insert(key.clone());
        let reply = self.catalog.random_unplayed(letter, &exclude)?;
        debug!(
            target: "wayfarer::games",
            "game.turn user={} city={}",
            user_id,
            escape_log(&city.name)
        );

        match reply {
            Some(reply) => {
                self.store
                    .add_played_cities(user_id, &[key, reply.key()])?;
                let next_letter = self.handover_letter(&reply.name);
                Ok(TurnOutcome::Countered {
                    played: city,
                    reply,
                    next_letter,
                })
            }
            None => {
                self.store.add_played_city(user_id, &key)?;
                let summary = self.finish(user_id, self.win_bonus)?;
                info!(
                    target: "wayfarer::games",
                    "game.won user={} letter={} score={} best={}",
                    user_id, letter, summary.score, summary.best
                );
                Ok(TurnOutcome::Won {
                    played: city,
                    letter,
                    summary,
                })
            }
        }
    }

    /// End the game without the bonus.
    pub fn surrender(&self, user_id: UserId) -> Result<GameSummary, BotError> {
        let summary = self.finish(user_id, 0)?;
        info!(
            target: "wayfarer::games",
            "game.surrender user={} score={} best={}",
            user_id, summary.score, summary.best
        );
        Ok(summary)
    }

    fn finish(&self, user_id: UserId, bonus: u32) -> Result<GameSummary, BotError> {
        let turns = self.store.played_cities(user_id)?.len() as u32;
        let score = turns.saturating_add(bonus);
        let best = self.store.set_best_score(user_id, score)?;
        self.store.clear_played_cities(user_id)?;
        Ok(GameSummary { score, best })
    }
}
