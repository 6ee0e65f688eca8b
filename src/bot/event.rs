//! Inbound events and outbound directives.
//!
//! The transport turns chat updates into [`Event`]s and renders the returned
//! [`Directive`]s as messages and keyboards. Nothing here knows about a particular chat
//! network; [`Directive::render_plain`] is the console rendering.

use chrono::NaiveDate;

use crate::hotels::{Listing, SearchSort};

/// Button payloads shared by the workflows.
pub mod choice {
    pub const GAME_START: &str = "start";
    pub const GAME_TOP: &str = "top";
    pub const GAME_RENAME: &str = "change_name";
    pub const SURRENDER: &str = "surrender";
    pub const CITY_AGAIN: &str = "again";
    pub const DATE_CONFIRM: &str = "confirm";
    pub const DATE_CHANGE: &str = "change";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Search(SearchSort),
    Game,
    History,
    Cancel,
    Clear,
    Unknown(String),
}

impl Command {
    /// Parse a slash command; `None` when `text` is not a command at all.
    pub fn parse(text: &str) -> Option<Command> {
        let trimmed = text.trim();
        if !trimmed.starts_with('/') {
            return None;
        }
        // "/game@SomeBot extra" style suffixes are ignored
        let word = trimmed
            .split_whitespace()
            .next()
            .unwrap_or(trimmed)
            .split('@')
            .next()
            .unwrap_or(trimmed)
            .to_ascii_lowercase();
        if let Some(sort) = SearchSort::from_command(&word) {
            return Some(Command::Search(sort));
        }
        Some(match word.as_str() {
            "/start" => Command::Start,
            "/help" => Command::Help,
            "/game" => Command::Game,
            "/history" => Command::History,
            "/cancel" => Command::Cancel,
            "/clear" => Command::Clear,
            _ => Command::Unknown(word),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command(Command),
    /// Free text typed by the user.
    Text(String),
    /// Button press; carries the button payload.
    Choice(String),
    /// Date picked on the calendar widget.
    Date(NaiveDate),
}

impl Event {
    /// Classify a typed message: slash commands become [`Event::Command`].
    pub fn from_text(text: &str) -> Event {
        match Command::parse(text) {
            Some(cmd) => Event::Command(cmd),
            None => Event::Text(text.to_string()),
        }
    }

    pub fn choice(data: impl Into<String>) -> Event {
        Event::Choice(data.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Event::Command(_) => "command",
            Event::Text(_) => "text",
            Event::Choice(_) => "choice",
            Event::Date(_) => "date",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    pub label: String,
    pub data: String,
}

impl ChoiceOption {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// A question, optionally with buttons.
    Prompt {
        text: String,
        options: Vec<ChoiceOption>,
    },
    /// Ask for a date on a calendar widget starting at `min`.
    DatePicker { text: String, min: NaiveDate },
    /// Plain acknowledgement or information.
    Confirmation(String),
    /// Markdown text (leaderboard, counter-move with map link).
    Formatted(String),
    ResultList {
        title: String,
        listings: Vec<Listing>,
        nights: i64,
    },
    ErrorMessage(String),
}

impl Directive {
    pub fn prompt(text: impl Into<String>) -> Self {
        Directive::Prompt {
            text: text.into(),
            options: Vec::new(),
        }
    }

    pub fn prompt_with(text: impl Into<String>, options: Vec<ChoiceOption>) -> Self {
        Directive::Prompt {
            text: text.into(),
            options,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Directive::ErrorMessage(_))
    }

    /// Text rendering used by the console transport.
    pub fn render_plain(&self) -> String {
        match self {
            Directive::Prompt { text, options } => {
                if options.is_empty() {
                    text.clone()
                } else {
                    let buttons = options
                        .iter()
                        .map(|o| format!("[{} -> @{}]", o.label, o.data))
                        .collect::<Vec<_>>()
                        .join(" ");
                    format!("{}\n{}", text, buttons)
                }
            }
            Directive::DatePicker { text, min } => {
                format!("{} (#YYYY-MM-DD, from {})", text, min.format("%Y-%m-%d"))
            }
            Directive::Confirmation(text) | Directive::Formatted(text) => text.clone(),
            Directive::ResultList {
                title,
                listings,
                nights,
            } => {
                let mut out = String::from(title.as_str());
                for l in listings {
                    out.push_str(&format!("\n* {}", l.name));
                    if !l.address.is_empty() {
                        out.push_str(&format!(", {}", l.address));
                    }
                    if let Some(d) = l.distance_km {
                        out.push_str(&format!(" | {:.1} km from center", d));
                    }
                    if let (Some(p), Some(t)) = (l.price_per_night, l.total_price(*nights)) {
                        out.push_str(&format!(" | {:.0}/night, {:.0} total", p, t));
                    }
                    out.push_str(&format!("\n  {}", l.url));
                    for photo in &l.photos {
                        out.push_str(&format!("\n  photo: {}", photo));
                    }
                }
                out
            }
            Directive::ErrorMessage(text) => format!("! {}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_case_insensitively_with_bot_suffix() {
        assert_eq!(Command::parse("/GAME"), Some(Command::Game));
        assert_eq!(Command::parse("/game@WayfarerBot"), Some(Command::Game));
        assert_eq!(
            Command::parse("/bestdeal now"),
            Some(Command::Search(SearchSort::BestDeal))
        );
        assert_eq!(
            Command::parse("/nope"),
            Some(Command::Unknown("/nope".to_string()))
        );
        assert_eq!(Command::parse("Moscow"), None);
    }

    #[test]
    fn from_text_keeps_plain_text() {
        assert_eq!(Event::from_text("Omsk"), Event::Text("Omsk".to_string()));
        assert_eq!(Event::from_text(" /cancel"), Event::Command(Command::Cancel));
    }

    #[test]
    fn prompt_renders_buttons() {
        let d = Directive::prompt_with(
            "Ready?",
            vec![ChoiceOption::new("Start", choice::GAME_START)],
        );
        assert_eq!(d.render_plain(), "Ready?\n[Start -> @start]");
    }
}
