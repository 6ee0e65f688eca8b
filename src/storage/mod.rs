//! # Player and history persistence
//!
//! [`PlayerStore`] is the contract the city game and the leaderboard depend on;
//! [`HistoryStore`] keeps the search history shown by `/history`. [`SledPlayerStore`]
//! implements both on top of an embedded sled database with bincode-encoded records.
//!
//! ## Layout
//!
//! | tree             | key                                  | value                   |
//! |------------------|--------------------------------------|-------------------------|
//! | `players`        | `players:<user:020>`                 | [`Player`]              |
//! | `played_cities`  | `played:<user:020>:<seq:020>`        | city key (UTF-8)        |
//! | `search_history` | `history:<user:020>:<nanos:020>`     | [`SearchRecord`]        |
//!
//! Zero-padded numbers keep prefix scans in insertion order, so the last played city of
//! a user is the last entry of its prefix.
//!
//! ## Atomicity
//!
//! Player updates are read-modify-write loops over `compare_and_swap`, so a concurrent
//! writer can never make a best score go down or lose a rename. Clearing a user's played
//! cities is applied as one batch.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sled::IVec;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::hotels::SearchSort;

pub const PLAYER_SCHEMA_VERSION: u8 = 1;
pub const HISTORY_SCHEMA_VERSION: u8 = 1;

const TREE_PLAYERS: &str = "players";
const TREE_PLAYED: &str = "played_cities";
const TREE_HISTORY: &str = "search_history";

/// Stable user identifier assigned by the chat network.
pub type UserId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub user_id: UserId,
    /// Registration order; the earlier player wins leaderboard ties.
    pub registered: u64,
    pub nickname: String,
    pub best_score: u32,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}

/// One executed hotel search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub sort: SearchSort,
    pub city: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub hotels: Vec<String>,
    pub schema_version: u8,
}

impl SearchRecord {
    pub fn new(
        sort: SearchSort,
        city: impl Into<String>,
        check_in: NaiveDate,
        check_out: NaiveDate,
        hotels: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            sort,
            city: city.into(),
            check_in,
            check_out,
            hotels,
            schema_version: HISTORY_SCHEMA_VERSION,
        }
    }
}

/// Persistent player records, played-city sets and ranking queries.
pub trait PlayerStore: Send + Sync {
    fn get(&self, user_id: UserId) -> Result<Option<Player>, StoreError>;

    /// Register a player with a best score of 0. Returns the existing record if the user
    /// registered already.
    fn create(&self, user_id: UserId, nickname: &str) -> Result<Player, StoreError>;

    fn set_nickname(&self, user_id: UserId, nickname: &str) -> Result<(), StoreError>;

    /// Offer `score` as a new best. The stored value becomes `max(previous, score)`,
    /// which is returned.
    fn set_best_score(&self, user_id: UserId, score: u32) -> Result<u32, StoreError>;

    fn add_played_city(&self, user_id: UserId, city_key: &str) -> Result<(), StoreError>;

    /// Record several cities in order, all or none.
    fn add_played_cities(&self, user_id: UserId, city_keys: &[String]) -> Result<(), StoreError>;

    /// Remove every played city of the user; returns how many were removed.
    fn clear_played_cities(&self, user_id: UserId) -> Result<usize, StoreError>;

    /// Played city keys in the order they were played.
    fn played_cities(&self, user_id: UserId) -> Result<Vec<String>, StoreError>;

    /// Players ordered by best score descending, then registration ascending.
    fn top(&self, n: usize) -> Result<Vec<Player>, StoreError>;

    /// Players with a higher score, or the same score and an earlier registration.
    fn count_above(&self, score: u32, registered: u64) -> Result<usize, StoreError>;

    /// Administrative reset: drop all players and played cities.
    fn reset_players(&self) -> Result<usize, StoreError>;
}

pub trait HistoryStore: Send + Sync {
    fn record_search(&self, user_id: UserId, record: &SearchRecord) -> Result<(), StoreError>;

    /// Most recent first.
    fn recent_searches(&self, user_id: UserId, limit: usize) -> Result<Vec<SearchRecord>, StoreError>;

    fn reset_history(&self) -> Result<usize, StoreError>;
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct SledPlayerStoreBuilder {
    path: PathBuf,
}

impl SledPlayerStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn open(self) -> Result<SledPlayerStore, StoreError> {
        SledPlayerStore::open(self.path)
    }
}

/// Sled-backed persistence for players, played cities and search history.
pub struct SledPlayerStore {
    db: sled::Db,
    players: sled::Tree,
    played: sled::Tree,
    history: sled::Tree,
}

impl SledPlayerStore {
    /// Open (or create) the store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        let players = db.open_tree(TREE_PLAYERS)?;
        let played = db.open_tree(TREE_PLAYED)?;
        let history = db.open_tree(TREE_HISTORY)?;
        Ok(Self {
            db,
            players,
            played,
            history,
        })
    }

    fn player_key(user_id: UserId) -> Vec<u8> {
        format!("players:{:020}", user_id).into_bytes()
    }

    fn played_prefix(user_id: UserId) -> String {
        format!("played:{:020}:", user_id)
    }

    fn history_prefix(user_id: UserId) -> String {
        format!("history:{:020}:", user_id)
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(bincode::deserialize::<T>(bytes)?)
    }

    fn decode_player(bytes: &[u8]) -> Result<Player, StoreError> {
        let record: Player = Self::deserialize(bytes)?;
        if record.schema_version != PLAYER_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                entity: "player",
                expected: PLAYER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn all_players(&self) -> Result<Vec<Player>, StoreError> {
        let mut out = Vec::new();
        for entry in self.players.iter() {
            let (_key, value) = entry?;
            out.push(Self::decode_player(&value)?);
        }
        Ok(out)
    }

    /// Apply `f` to the stored player, retrying if another writer got there first.
    fn update_player<F>(&self, user_id: UserId, f: F) -> Result<Player, StoreError>
    where
        F: Fn(&mut Player),
    {
        let key = Self::player_key(user_id);
        loop {
            let Some(current) = self.players.get(&key)? else {
                return Err(StoreError::PlayerNotFound(user_id));
            };
            let mut player = Self::decode_player(&current)?;
            f(&mut player);
            let bytes = Self::serialize(&player)?;
            if self
                .players
                .compare_and_swap(&key, Some(current), Some(bytes))?
                .is_ok()
            {
                self.players.flush()?;
                return Ok(player);
            }
        }
    }

    fn clear_prefix(tree: &sled::Tree, prefix: &[u8]) -> Result<usize, StoreError> {
        let keys: Vec<IVec> = tree
            .scan_prefix(prefix)
            .keys()
            .collect::<Result<_, _>>()?;
        let mut batch = sled::Batch::default();
        for key in &keys {
            batch.remove(key.clone());
        }
        tree.apply_batch(batch)?;
        tree.flush()?;
        Ok(keys.len())
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

impl PlayerStore for SledPlayerStore {
    fn get(&self, user_id: UserId) -> Result<Option<Player>, StoreError> {
        match self.players.get(Self::player_key(user_id))? {
            Some(bytes) => Ok(Some(Self::decode_player(&bytes)?)),
            None => Ok(None),
        }
    }

    fn create(&self, user_id: UserId, nickname: &str) -> Result<Player, StoreError> {
        let player = Player {
            user_id,
            registered: self.db.generate_id()?,
            nickname: nickname.to_string(),
            best_score: 0,
            created_at: Utc::now(),
            schema_version: PLAYER_SCHEMA_VERSION,
        };
        let bytes = Self::serialize(&player)?;
        let key = Self::player_key(user_id);
        match self
            .players
            .compare_and_swap(&key, None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => {
                self.players.flush()?;
                Ok(player)
            }
            Err(existing) => match existing.current {
                Some(bytes) => Self::decode_player(&bytes),
                None => Err(StoreError::PlayerNotFound(user_id)),
            },
        }
    }

    fn set_nickname(&self, user_id: UserId, nickname: &str) -> Result<(), StoreError> {
        self.update_player(user_id, |p| p.nickname = nickname.to_string())?;
        Ok(())
    }

    fn set_best_score(&self, user_id: UserId, score: u32) -> Result<u32, StoreError> {
        let player = self.update_player(user_id, |p| p.best_score = p.best_score.max(score))?;
        Ok(player.best_score)
    }

    fn add_played_city(&self, user_id: UserId, city_key: &str) -> Result<(), StoreError> {
        let seq = self.db.generate_id()?;
        let key = format!("{}{:020}", Self::played_prefix(user_id), seq).into_bytes();
        self.played.insert(key, city_key.as_bytes())?;
        self.played.flush()?;
        Ok(())
    }

    fn add_played_cities(&self, user_id: UserId, city_keys: &[String]) -> Result<(), StoreError> {
        let prefix = Self::played_prefix(user_id);
        let mut batch = sled::Batch::default();
        for city_key in city_keys {
            let seq = self.db.generate_id()?;
            let key = format!("{}{:020}", prefix, seq).into_bytes();
            batch.insert(key, city_key.as_bytes());
        }
        self.played.apply_batch(batch)?;
        self.played.flush()?;
        Ok(())
    }

    fn clear_played_cities(&self, user_id: UserId) -> Result<usize, StoreError> {
        Self::clear_prefix(&self.played, Self::played_prefix(user_id).as_bytes())
    }

    fn played_cities(&self, user_id: UserId) -> Result<Vec<String>, StoreError> {
        self.played
            .scan_prefix(Self::played_prefix(user_id).as_bytes())
            .values()
            .map(|v| {
                v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                    .map_err(StoreError::from)
            })
            .collect()
    }

    fn top(&self, n: usize) -> Result<Vec<Player>, StoreError> {
        let mut players = self.all_players()?;
        players.sort_by(|a, b| {
            b.best_score
                .cmp(&a.best_score)
                .then(a.registered.cmp(&b.registered))
        });
        players.truncate(n);
        Ok(players)
    }

    fn count_above(&self, score: u32, registered: u64) -> Result<usize, StoreError> {
        let players = self.all_players()?;
        Ok(players
            .iter()
            .filter(|p| {
                p.best_score > score || (p.best_score == score && p.registered < registered)
            })
            .count())
    }

    fn reset_players(&self) -> Result<usize, StoreError> {
        let removed = Self::clear_prefix(&self.players, b"players:")?;
        Self::clear_prefix(&self.played, b"played:")?;
        Ok(removed)
    }
}

impl HistoryStore for SledPlayerStore {
    fn record_search(&self, user_id: UserId, record: &SearchRecord) -> Result<(), StoreError> {
        let nanos = record
            .at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| record.at.timestamp_micros() * 1000);
        let key = format!("{}{:020}", Self::history_prefix(user_id), nanos).into_bytes();
        let bytes = Self::serialize(record)?;
        self.history.insert(key, bytes)?;
        self.history.flush()?;
        Ok(())
    }

    fn recent_searches(&self, user_id: UserId, limit: usize) -> Result<Vec<SearchRecord>, StoreError> {
        self.history
            .scan_prefix(Self::history_prefix(user_id).as_bytes())
            .values()
            .rev()
            .take(limit)
            .map(|v| v.map_err(StoreError::from).and_then(|b| Self::deserialize(&b)))
            .collect()
    }

    fn reset_history(&self) -> Result<usize, StoreError> {
        Self::clear_prefix(&self.history, b"history:")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, SledPlayerStore) {
        let dir = TempDir::new().expect("tempdir");
        let store = SledPlayerStoreBuilder::new(dir.path()).open().expect("store");
        (dir, store)
    }

    #[test]
    fn create_is_idempotent() {
        let (_dir, store) = store();
        let first = store.create(42, "Alice").expect("create");
        let again = store.create(42, "Mallory").expect("create again");
        assert_eq!(again.nickname, "Alice");
        assert_eq!(again.registered, first.registered);
        assert_eq!(store.get(42).unwrap().map(|p| p.best_score), Some(0));
        assert!(store.get(7).unwrap().is_none());
    }

    #[test]
    fn best_score_never_decreases() {
        let (_dir, store) = store();
        store.create(1, "A").unwrap();
        assert_eq!(store.set_best_score(1, 12).unwrap(), 12);
        assert_eq!(store.set_best_score(1, 3).unwrap(), 12);
        assert_eq!(store.get(1).unwrap().unwrap().best_score, 12);
        assert!(matches!(
            store.set_best_score(99, 1),
            Err(StoreError::PlayerNotFound(99))
        ));
    }

    #[test]
    fn played_cities_keep_order_and_clear_per_user() {
        let (_dir, store) = store();
        store.add_played_city(1, "omsk").unwrap();
        store.add_played_city(1, "kazan").unwrap();
        store.add_played_city(2, "oslo").unwrap();
        assert_eq!(store.played_cities(1).unwrap(), vec!["omsk", "kazan"]);
        assert_eq!(store.clear_played_cities(1).unwrap(), 2);
        assert!(store.played_cities(1).unwrap().is_empty());
        assert_eq!(store.played_cities(2).unwrap(), vec!["oslo"]);
    }

    #[test]
    fn batched_cities_follow_single_adds_in_order() {
        let (_dir, store) = store();
        store.add_played_city(4, "omsk").unwrap();
        store
            .add_played_cities(4, &["kazan".to_string(), "nalchik".to_string()])
            .unwrap();
        assert_eq!(store.played_cities(4).unwrap(), vec!["omsk", "kazan", "nalchik"]);
    }

    #[test]
    fn concurrent_score_offers_keep_the_maximum() {
        let (_dir, store) = store();
        store.create(5, "E").unwrap();
        let store = std::sync::Arc::new(store);
        let handles: Vec<_> = (1..=8u32)
            .map(|i| {
                let s = store.clone();
                std::thread::spawn(move || s.set_best_score(5, i * 10).unwrap())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get(5).unwrap().unwrap().best_score, 80);
    }

    #[test]
    fn history_is_newest_first() {
        let (_dir, store) = store();
        let d = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let mut older = SearchRecord::new(SearchSort::LowPrice, "Rome", d, d, vec![]);
        older.at = Utc::now() - chrono::Duration::minutes(5);
        let newer = SearchRecord::new(SearchSort::BestDeal, "Oslo", d, d, vec!["Inn".into()]);
        store.record_search(3, &older).unwrap();
        store.record_search(3, &newer).unwrap();
        let recent = store.recent_searches(3, 5).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].city, "Oslo");
        assert_eq!(store.recent_searches(3, 1).unwrap().len(), 1);
        assert_eq!(store.reset_history().unwrap(), 2);
        assert!(store.recent_searches(3, 5).unwrap().is_empty());
    }

    #[test]
    fn reset_players_drops_players_and_played_cities() {
        let (_dir, store) = store();
        store.create(1, "A").unwrap();
        store.add_played_city(1, "omsk").unwrap();
        assert_eq!(store.reset_players().unwrap(), 1);
        assert!(store.get(1).unwrap().is_none());
        assert!(store.played_cities(1).unwrap().is_empty());
    }
}
