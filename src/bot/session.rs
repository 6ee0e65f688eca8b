use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::wizard::SearchDraft;
use crate::storage::UserId;

/// The workflow a conversation is in. A user has at most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Workflow {
    None,
    Search,
    Game,
    Admin,
}

impl Workflow {
    pub fn slug(self) -> &'static str {
        match self {
            Workflow::None => "none",
            Workflow::Search => "search",
            Workflow::Game => "game",
            Workflow::Admin => "admin",
        }
    }
}

/// # Conversation steps
///
/// Each step belongs to exactly one workflow ([`Step::workflow`]):
///
/// - **Idle** / **Terminal** - no workflow; `Terminal` only lives between the end of a
///   workflow and the state being cleared
/// - **Game**: `AwaitingName` → `GameMenu` → `GameTurn`, with `GameRename` reachable from
///   the menu
/// - **Search**: `WizardCity` → `WizardCityConfirm` → `WizardCheckIn` →
///   `WizardDateConfirm` → `WizardCheckOut` → `WizardDateConfirm` → (`WizardMinPrice`) →
///   `WizardResultCount` → `WizardPhotoCount`
/// - **Admin**: `AdminPassword` → `AdminChoice`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    Idle,
    AwaitingName,
    GameMenu,
    GameTurn,
    GameRename,
    WizardCity,
    WizardCityConfirm,
    WizardCheckIn,
    WizardCheckOut,
    WizardDateConfirm,
    WizardMinPrice,
    WizardResultCount,
    WizardPhotoCount,
    AdminPassword,
    AdminChoice,
    Terminal,
}

impl Step {
    pub fn workflow(self) -> Workflow {
        match self {
            Step::Idle | Step::Terminal => Workflow::None,
            Step::AwaitingName | Step::GameMenu | Step::GameTurn | Step::GameRename => {
                Workflow::Game
            }
            Step::WizardCity
            | Step::WizardCityConfirm
            | Step::WizardCheckIn
            | Step::WizardCheckOut
            | Step::WizardDateConfirm
            | Step::WizardMinPrice
            | Step::WizardResultCount
            | Step::WizardPhotoCount => Workflow::Search,
            Step::AdminPassword | Step::AdminChoice => Workflow::Admin,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::Idle => "idle",
            Step::AwaitingName => "awaiting-name",
            Step::GameMenu => "game-menu",
            Step::GameTurn => "game-turn",
            Step::GameRename => "game-rename",
            Step::WizardCity => "wizard-city",
            Step::WizardCityConfirm => "wizard-city-confirm",
            Step::WizardCheckIn => "wizard-checkin",
            Step::WizardCheckOut => "wizard-checkout",
            Step::WizardDateConfirm => "wizard-date-confirm",
            Step::WizardMinPrice => "wizard-min-price",
            Step::WizardResultCount => "wizard-result-count",
            Step::WizardPhotoCount => "wizard-photo-count",
            Step::AdminPassword => "admin-password",
            Step::AdminChoice => "admin-choice",
            Step::Terminal => "terminal",
        }
    }
}

/// Per-user conversation state: current step plus the wizard's accumulated fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationState {
    pub user_id: UserId,
    pub step: Step,
    pub draft: Option<SearchDraft>,
    pub last_activity: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            step: Step::Idle,
            draft: None,
            last_activity: Utc::now(),
        }
    }

    pub fn workflow(&self) -> Workflow {
        self.step.workflow()
    }

    pub fn is_active(&self) -> bool {
        self.workflow() != Workflow::None
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    pub fn clear(&mut self) {
        self.step = Step::Idle;
        self.draft = None;
    }

    pub fn is_inactive(&self, max_idle: chrono::Duration) -> bool {
        Utc::now() - self.last_activity > max_idle
    }
}

/// Conversation states keyed by user. Holding the guard returned by [`SessionStore::lock`]
/// serializes all work for that user; different users never wait on each other.
#[derive(Debug, Default)]
pub struct SessionStore {
    states: DashMap<UserId, Arc<Mutex<ConversationState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<ConversationState> {
        let cell = self
            .states
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(ConversationState::new(user_id))))
            .clone();
        cell.lock_owned().await
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.states.contains_key(&user_id)
    }

    /// Number of users currently inside a workflow (busy states are counted as active).
    pub fn active_count(&self) -> usize {
        self.states
            .iter()
            .filter(|entry| match entry.value().try_lock() {
                Ok(state) => state.is_active(),
                Err(_) => true,
            })
            .count()
    }

    /// Drop states idle for longer than `max_idle` and return them. States in use are kept.
    pub fn prune_idle(&self, max_idle: chrono::Duration) -> Vec<ConversationState> {
        let mut pruned = Vec::new();
        self.states.retain(|_, cell| {
            if Arc::strong_count(cell) > 1 {
                return true;
            }
            match cell.try_lock() {
                Ok(state) if state.is_inactive(max_idle) => {
                    pruned.push(state.clone());
                    false
                }
                _ => true,
            }
        });
        pruned
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_and_idle_have_no_workflow() {
        assert_eq!(Step::Idle.workflow(), Workflow::None);
        assert_eq!(Step::Terminal.workflow(), Workflow::None);
        assert_eq!(Step::WizardMinPrice.workflow(), Workflow::Search);
        assert_eq!(Step::GameRename.workflow(), Workflow::Game);
        assert_eq!(Step::WizardDateConfirm.name(), "wizard-date-confirm");
    }

    #[tokio::test]
    async fn lock_creates_idle_state_once() {
        let store = SessionStore::new();
        {
            let mut state = store.lock(9).await;
            assert_eq!(state.step, Step::Idle);
            state.step = Step::GameMenu;
        }
        assert_eq!(store.lock(9).await.step, Step::GameMenu);
        assert_eq!(store.len(), 1);
        assert_eq!(store.active_count(), 1);
        assert!(!store.contains(2));
    }

    #[tokio::test]
    async fn prune_idle_keeps_recent_and_locked_states() {
        let store = SessionStore::new();
        {
            let mut old = store.lock(1).await;
            old.last_activity = Utc::now() - chrono::Duration::hours(2);
        }
        drop(store.lock(2).await);
        let held = store.lock(3).await;
        let removed = store.prune_idle(chrono::Duration::minutes(30));
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].user_id, 1);
        assert!(!store.contains(1));
        assert!(store.contains(3));
        assert_eq!(store.len(), 2);
        drop(held);
    }

    #[tokio::test]
    async fn same_user_work_is_serialized() {
        let store = Arc::new(SessionStore::new());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let s = store.clone();
            tasks.push(tokio::spawn(async move {
                let mut state = s.lock(5).await;
                // read-modify-write across an await point
                let seen = state.user_id;
                tokio::task::yield_now().await;
                state.user_id = seen + 1;
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(store.lock(5).await.user_id, 5 + 16);
    }
}
