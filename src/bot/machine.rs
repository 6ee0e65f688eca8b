//! # Conversation machine
//!
//! Routes every user event to the workflow the user is in and owns the per-user state
//! transitions. Work for one user is serialized by the session lock; different users run
//! concurrently.
//!
//! ## Routing
//!
//! - `/start`, `/help`, `/history` and `/cancel` are answered in any state
//! - `/lowprice`, `/highprice`, `/bestdeal`, `/game` and `/clear` start a workflow and are
//!   refused with [`StateConflict::Busy`] while another one is active
//! - text, button and date events go to the active workflow
//!
//! ## Errors
//!
//! [`ConversationMachine::advance`] applies [`BotError::recovery`] before returning:
//! re-prompt errors restore the state exactly as it was, end/reset errors clear it.
//! [`ConversationMachine::handle`] turns the error into a user-facing directive.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use log::{debug, info, warn};

use super::admin::{AdminGate, ResetScope};
use super::event::{choice, ChoiceOption, Command, Directive, Event};
use super::game::{escape_markdown, GameEngine, TurnOutcome};
use super::leaderboard::Leaderboard;
use super::session::{ConversationState, SessionStore, Step, Workflow};
use super::wizard::{SearchWizard, WizardOutcome};
use crate::catalog::CityCatalog;
use crate::config::Config;
use crate::errors::{BotError, GameRuleViolation, Recovery, StateConflict};
use crate::hotels::{bounded, CityLookup, HotelSearchClient, SearchCriteria};
use crate::metrics;
use crate::storage::{HistoryStore, PlayerStore, SearchRecord, UserId};

const HISTORY_LIMIT: usize = 5;

const HELP_TEXT: &str = "\
/lowprice - cheapest hotels in a city
/highprice - most expensive hotels in a city
/bestdeal - hotels by price and distance from the center
/history - your recent searches
/game - play the city chain game
/cancel - stop what you are doing";

/// Services the machine depends on.
pub struct Collaborators {
    pub players: Arc<dyn PlayerStore>,
    pub history: Arc<dyn HistoryStore>,
    pub catalog: Arc<dyn CityCatalog>,
    pub lookup: Arc<dyn CityLookup>,
    pub hotels: Arc<dyn HotelSearchClient>,
}

/// Workflow a start command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRequest {
    Search(crate::hotels::SearchSort),
    Game,
    Admin,
}

impl StartRequest {
    pub fn workflow(self) -> Workflow {
        match self {
            StartRequest::Search(_) => Workflow::Search,
            StartRequest::Game => Workflow::Game,
            StartRequest::Admin => Workflow::Admin,
        }
    }
}

type Today = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

pub struct ConversationMachine {
    bot_name: String,
    sessions: SessionStore,
    wizard: SearchWizard,
    game: GameEngine,
    leaderboard: Leaderboard,
    players: Arc<dyn PlayerStore>,
    history: Arc<dyn HistoryStore>,
    hotels: Arc<dyn HotelSearchClient>,
    admin: AdminGate,
    search_timeout: Duration,
    today: Today,
}

fn log_target(workflow: Workflow) -> &'static str {
    match workflow {
        Workflow::Search => "wayfarer::search",
        Workflow::Admin => "security",
        _ => "wayfarer::games",
    }
}

fn game_menu() -> Directive {
    Directive::prompt_with(
        "City game",
        vec![
            ChoiceOption::new("Start", choice::GAME_START),
            ChoiceOption::new("Leaderboard", choice::GAME_TOP),
            ChoiceOption::new("Change name", choice::GAME_RENAME),
        ],
    )
}

fn turn_prompt(letter: Option<char>) -> Directive {
    let text = match letter {
        Some(l) => format!("Your city, starting with {}:", l),
        None => "Name any city to begin:".to_string(),
    };
    Directive::prompt_with(text, vec![ChoiceOption::new("Give up", choice::SURRENDER)])
}

fn admin_menu() -> Directive {
    Directive::prompt_with(
        "What should be cleared?\n1 - search history\n2 - game statistics\n3 - both",
        vec![
            ChoiceOption::new("History", "1"),
            ChoiceOption::new("Game", "2"),
            ChoiceOption::new("Both", "3"),
        ],
    )
}

/// Text shown to the user for an error.
pub fn user_message(error: &BotError) -> String {
    match error {
        BotError::Validation(msg) => {
            let mut chars = msg.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>() + ".",
                None => "Invalid input.".to_string(),
            }
        }
        BotError::GameRule(GameRuleViolation::WrongLetter { required }) => {
            format!("The city must start with {}.", required)
        }
        BotError::GameRule(GameRuleViolation::UnknownCity) => "I don't know that city.".to_string(),
        BotError::GameRule(GameRuleViolation::AlreadyPlayed) => {
            "That city was already played in this game.".to_string()
        }
        BotError::NotFound(_) => {
            "Nothing was found for these parameters. Try another search.".to_string()
        }
        BotError::ServiceUnavailable(_) => {
            "The service is not answering right now. Please try again later.".to_string()
        }
        BotError::Conflict(StateConflict::Busy { active }) => {
            format!("Finish the current {} first, or send /cancel.", active)
        }
        BotError::Conflict(StateConflict::UnexpectedEvent { .. }) => {
            "Please answer the question above.".to_string()
        }
        BotError::Conflict(StateConflict::NoActiveWorkflow) => {
            "Nothing is in progress. Send /help to see what I can do.".to_string()
        }
        BotError::Storage(_) => "Something went wrong. Please start again.".to_string(),
    }
}

impl ConversationMachine {
    pub fn new(deps: Collaborators, config: &Config) -> Self {
        Self {
            bot_name: config.bot.name.clone(),
            sessions: SessionStore::new(),
            wizard: SearchWizard::new(deps.lookup, &config.search),
            game: GameEngine::new(deps.players.clone(), deps.catalog, &config.game),
            leaderboard: Leaderboard::new(deps.players.clone(), config.game.leaderboard_size),
            players: deps.players,
            history: deps.history,
            hotels: deps.hotels,
            admin: AdminGate::from_config(&config.bot),
            search_timeout: Duration::from_secs(config.search.timeout_seconds.max(1) as u64),
            today: Arc::new(|| chrono::Local::now().date_naive()),
        }
    }

    /// Replace the clock used for date validation.
    pub fn with_today<F>(mut self, today: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        self.today = Arc::new(today);
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    pub async fn step_of(&self, user_id: UserId) -> Step {
        self.sessions.lock(user_id).await.step
    }

    /// Enter a workflow. Refused while another workflow is active.
    pub async fn start(
        &self,
        user_id: UserId,
        request: StartRequest,
    ) -> Result<Vec<Directive>, BotError> {
        let mut state = self.sessions.lock(user_id).await;
        state.touch();
        if state.is_active() {
            return Err(StateConflict::Busy {
                active: state.workflow().slug(),
            }
            .into());
        }
        state.clear();

        let directives = match request {
            StartRequest::Search(sort) => self.wizard.begin(&mut state, sort),
            StartRequest::Game => self.enter_game(&mut state)?,
            StartRequest::Admin => self.enter_admin(&mut state)?,
        };
        let workflow = request.workflow();
        let counter = metrics::record_workflow_entry(workflow.slug());
        info!(
            target: log_target(workflow),
            "workflow.enter user={} workflow={} step={} active={}",
            user_id,
            workflow.slug(),
            state.step.name(),
            counter.currently_active
        );
        Ok(directives)
    }

    /// Feed a non-command event to the active workflow.
    pub async fn advance(&self, user_id: UserId, event: Event) -> Result<Vec<Directive>, BotError> {
        let mut state = self.sessions.lock(user_id).await;
        state.touch();
        let workflow = state.workflow();
        if workflow == Workflow::None {
            return Err(StateConflict::NoActiveWorkflow.into());
        }

        let snapshot = state.clone();
        let result = match workflow {
            Workflow::Search => self.advance_search(&mut state, &event).await,
            Workflow::Game => self.advance_game(&mut state, &event),
            Workflow::Admin => self.advance_admin(&mut state, &event),
            Workflow::None => Err(StateConflict::NoActiveWorkflow.into()),
        };

        match &result {
            Ok(_) => {
                if !state.is_active() {
                    self.exit_workflow(&mut state, workflow, "completed");
                }
            }
            Err(e) => match e.recovery() {
                Recovery::Reprompt => {
                    debug!(
                        target: log_target(workflow),
                        "workflow.reprompt user={} step={} reason={}",
                        user_id,
                        snapshot.step.name(),
                        e
                    );
                    *state = snapshot;
                }
                Recovery::EndWorkflow => {
                    info!(
                        target: log_target(workflow),
                        "workflow.end user={} reason={}", user_id, e
                    );
                    self.exit_workflow(&mut state, workflow, "ended");
                }
                Recovery::ResetWorkflow => {
                    warn!(
                        target: log_target(workflow),
                        "workflow.reset user={} reason={}", user_id, e
                    );
                    self.exit_workflow(&mut state, workflow, "reset");
                }
            },
        }
        result
    }

    /// Abandon the active workflow, if any. Returns whether one was active.
    pub async fn reset(&self, user_id: UserId) -> bool {
        let mut state = self.sessions.lock(user_id).await;
        let workflow = state.workflow();
        if workflow == Workflow::None {
            state.clear();
            return false;
        }
        self.exit_workflow(&mut state, workflow, "cancelled");
        true
    }

    /// Transport entry point: never fails, errors become directives.
    pub async fn handle(&self, user_id: UserId, event: Event) -> Vec<Directive> {
        debug!("event user={} kind={}", user_id, event.kind());
        let result = match event {
            Event::Command(cmd) => self.handle_command(user_id, cmd).await,
            other => self.advance(user_id, other).await,
        };
        match result {
            Ok(directives) => directives,
            Err(e) => self.report(user_id, &e).await,
        }
    }

    /// Drop conversations idle for longer than `max_idle`.
    pub fn prune_idle(&self, max_idle: chrono::Duration) -> usize {
        let pruned = self.sessions.prune_idle(max_idle);
        for state in &pruned {
            let workflow = state.workflow();
            if workflow != Workflow::None {
                metrics::record_workflow_exit(workflow.slug());
                info!(
                    target: log_target(workflow),
                    "workflow.exit user={} workflow={} reason=idle",
                    state.user_id,
                    workflow.slug()
                );
            }
        }
        pruned.len()
    }

    async fn handle_command(
        &self,
        user_id: UserId,
        command: Command,
    ) -> Result<Vec<Directive>, BotError> {
        match command {
            Command::Start => Ok(vec![Directive::Confirmation(format!(
                "Hi, I am {}. I can find hotels and play the city game.\n{}",
                self.bot_name, HELP_TEXT
            ))]),
            Command::Help => Ok(vec![Directive::Confirmation(HELP_TEXT.to_string())]),
            Command::Cancel => {
                let text = if self.reset(user_id).await {
                    "Cancelled."
                } else {
                    "Nothing to cancel."
                };
                Ok(vec![Directive::Confirmation(text.to_string())])
            }
            Command::History => self.history_directives(user_id),
            Command::Search(sort) => self.start(user_id, StartRequest::Search(sort)).await,
            Command::Game => self.start(user_id, StartRequest::Game).await,
            Command::Clear => self.start(user_id, StartRequest::Admin).await,
            Command::Unknown(cmd) => Err(BotError::validation(format!(
                "unknown command {}, see /help",
                cmd
            ))),
        }
    }

    async fn report(&self, user_id: UserId, error: &BotError) -> Vec<Directive> {
        match error {
            BotError::Storage(_) | BotError::ServiceUnavailable(_) => {
                warn!("user={} error: {}", user_id, error)
            }
            _ => debug!("user={} error: {}", user_id, error),
        }
        let mut out = vec![Directive::ErrorMessage(user_message(error))];
        if error.recovery() == Recovery::Reprompt {
            let state = self.sessions.lock(user_id).await;
            if let Some(prompt) = self.prompt_for(&state) {
                out.push(prompt);
            }
        }
        out
    }

    /// The question the user is expected to answer at their current step.
    fn prompt_for(&self, state: &ConversationState) -> Option<Directive> {
        match state.step {
            Step::Idle | Step::Terminal => None,
            Step::AwaitingName => Some(Directive::prompt(
                "What name should appear on the leaderboard?",
            )),
            Step::GameMenu => Some(game_menu()),
            Step::GameRename => Some(Directive::prompt("Type your new name:")),
            Step::GameTurn => Some(turn_prompt(
                self.game.required_letter(state.user_id).ok().flatten(),
            )),
            Step::AdminPassword => Some(Directive::prompt("Password:")),
            Step::AdminChoice => Some(admin_menu()),
            _ => self.wizard.prompt_for(state, (self.today)()),
        }
    }

    fn exit_workflow(&self, state: &mut ConversationState, workflow: Workflow, reason: &str) {
        state.clear();
        let counter = metrics::record_workflow_exit(workflow.slug());
        info!(
            target: log_target(workflow),
            "workflow.exit user={} workflow={} reason={} active={}",
            state.user_id,
            workflow.slug(),
            reason,
            counter.currently_active
        );
    }

    fn enter_game(&self, state: &mut ConversationState) -> Result<Vec<Directive>, BotError> {
        match self.game.player(state.user_id)? {
            Some(player) => {
                state.step = Step::GameMenu;
                Ok(vec![
                    Directive::Confirmation(format!("Welcome back, {}!", player.nickname)),
                    game_menu(),
                ])
            }
            None => {
                state.step = Step::AwaitingName;
                Ok(vec![Directive::prompt(
                    "What name should appear on the leaderboard?",
                )])
            }
        }
    }

    fn enter_admin(&self, state: &mut ConversationState) -> Result<Vec<Directive>, BotError> {
        if !self.admin.is_admin(state.user_id) {
            return Err(BotError::validation("unknown command /clear, see /help"));
        }
        if !self.admin.has_password() {
            return Err(BotError::ServiceUnavailable(
                "admin password is not configured".to_string(),
            ));
        }
        state.step = Step::AdminPassword;
        Ok(vec![Directive::prompt("Password:")])
    }

    async fn advance_search(
        &self,
        state: &mut ConversationState,
        event: &Event,
    ) -> Result<Vec<Directive>, BotError> {
        let today = (self.today)();
        match self.wizard.advance(state, event, today).await? {
            WizardOutcome::Continue(directives) => Ok(directives),
            WizardOutcome::Complete(criteria) => self.run_search(state.user_id, criteria).await,
        }
    }

    async fn run_search(
        &self,
        user_id: UserId,
        criteria: SearchCriteria,
    ) -> Result<Vec<Directive>, BotError> {
        info!(
            target: "wayfarer::search",
            "search.run user={} sort={} region={} in={} out={} results={} photos={} min_price={:?}",
            user_id,
            criteria.sort.command(),
            criteria.city.region_id,
            criteria.check_in,
            criteria.check_out,
            criteria.result_count,
            criteria.photo_count,
            criteria.min_price
        );
        let outcome = bounded(self.search_timeout, self.hotels.search(&criteria)).await;

        let hotel_names = match &outcome {
            Ok(listings) => listings.iter().map(|l| l.name.clone()).collect(),
            Err(_) => Vec::new(),
        };
        let record = SearchRecord::new(
            criteria.sort,
            criteria.city.name.clone(),
            criteria.check_in,
            criteria.check_out,
            hotel_names,
        );
        if let Err(e) = self.history.record_search(user_id, &record) {
            warn!("failed to record search history for user {}: {}", user_id, e);
        }

        let listings = outcome?;
        let nights = criteria.nights();
        Ok(vec![Directive::ResultList {
            title: format!(
                "{} in {}, {} night(s):",
                criteria.sort.describe(),
                criteria.city.name,
                nights
            ),
            listings,
            nights,
        }])
    }

    fn advance_game(
        &self,
        state: &mut ConversationState,
        event: &Event,
    ) -> Result<Vec<Directive>, BotError> {
        let user_id = state.user_id;
        match (state.step, event) {
            (Step::AwaitingName, Event::Text(name)) => {
                let player = self.game.register(user_id, name)?;
                state.step = Step::GameMenu;
                Ok(vec![
                    Directive::Confirmation(format!("Welcome, {}!", player.nickname)),
                    game_menu(),
                ])
            }
            (Step::GameMenu, Event::Choice(c)) if c == choice::GAME_START => {
                let letter = self.game.required_letter(user_id)?;
                state.step = Step::GameTurn;
                Ok(vec![turn_prompt(letter)])
            }
            (Step::GameMenu, Event::Choice(c)) if c == choice::GAME_TOP => Ok(vec![
                Directive::Formatted(self.leaderboard.render(user_id)?),
                game_menu(),
            ]),
            (Step::GameMenu, Event::Choice(c)) if c == choice::GAME_RENAME => {
                state.step = Step::GameRename;
                Ok(vec![Directive::prompt("Type your new name:")])
            }
            (Step::GameRename, Event::Text(name)) => {
                let name = self.game.rename(user_id, name)?;
                state.step = Step::GameMenu;
                Ok(vec![
                    Directive::Confirmation(format!("You are now {}.", name)),
                    game_menu(),
                ])
            }
            (Step::GameTurn, Event::Choice(c)) if c == choice::SURRENDER => {
                let summary = self.game.surrender(user_id)?;
                state.step = Step::Terminal;
                Ok(vec![Directive::Confirmation(format!(
                    "Game over. Score: {}. Best: {}.",
                    summary.score, summary.best
                ))])
            }
            (Step::GameTurn, Event::Text(city)) => match self.game.play_turn(user_id, city)? {
                TurnOutcome::Countered {
                    reply, next_letter, ..
                } => Ok(vec![
                    Directive::Formatted(format!(
                        "[{}]({})",
                        escape_markdown(&reply.name),
                        reply.map_link()
                    )),
                    turn_prompt(next_letter),
                ]),
                TurnOutcome::Won { letter, summary, .. } => {
                    state.step = Step::Terminal;
                    Ok(vec![Directive::Confirmation(format!(
                        "I don't know any more cities starting with {}. You win! Score: {}. Best: {}.",
                        letter, summary.score, summary.best
                    ))])
                }
            },
            (step, _) => Err(StateConflict::UnexpectedEvent { step: step.name() }.into()),
        }
    }

    fn advance_admin(
        &self,
        state: &mut ConversationState,
        event: &Event,
    ) -> Result<Vec<Directive>, BotError> {
        let user_id = state.user_id;
        match (state.step, event) {
            (Step::AdminPassword, Event::Text(password)) => {
                if self.admin.verify(password) {
                    state.step = Step::AdminChoice;
                    Ok(vec![admin_menu()])
                } else {
                    warn!(target: "security", "admin.password_rejected user={}", user_id);
                    state.step = Step::Terminal;
                    Ok(vec![Directive::ErrorMessage("Wrong password.".to_string())])
                }
            }
            (Step::AdminChoice, Event::Text(input) | Event::Choice(input)) => {
                state.step = Step::Terminal;
                let Some(scope) = ResetScope::parse(input) else {
                    return Ok(vec![Directive::ErrorMessage(
                        "Unknown choice, nothing was cleared.".to_string(),
                    )]);
                };
                let mut cleared = 0;
                if scope.clears_history() {
                    cleared += self.history.reset_history()?;
                }
                if scope.clears_game_stats() {
                    cleared += self.players.reset_players()?;
                }
                warn!(
                    target: "security",
                    "admin.reset user={} scope={} records={}",
                    user_id,
                    scope.describe(),
                    cleared
                );
                Ok(vec![Directive::Confirmation(format!(
                    "Cleared {} ({} records).",
                    scope.describe(),
                    cleared
                ))])
            }
            (step, _) => Err(StateConflict::UnexpectedEvent { step: step.name() }.into()),
        }
    }

    fn history_directives(&self, user_id: UserId) -> Result<Vec<Directive>, BotError> {
        let records = self.history.recent_searches(user_id, HISTORY_LIMIT)?;
        if records.is_empty() {
            return Ok(vec![Directive::Confirmation("No searches yet.".to_string())]);
        }
        let lines: Vec<String> = records
            .iter()
            .map(|r| {
                let hotels = if r.hotels.is_empty() {
                    "nothing found".to_string()
                } else {
                    r.hotels.join(", ")
                };
                format!(
                    "{} {} {} ({} - {}): {}",
                    r.at.format("%d.%m.%Y %H:%M"),
                    r.sort.command(),
                    r.city,
                    r.check_in.format("%d.%m.%Y"),
                    r.check_out.format("%d.%m.%Y"),
                    hotels
                )
            })
            .collect();
        Ok(vec![Directive::Confirmation(lines.join("\n"))])
    }
}
