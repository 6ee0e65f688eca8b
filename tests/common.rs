//! Test utilities & fixtures.
//! Provides the city fixture under `tests/test-data-int`, throwaway stores and fake
//! search collaborators.

#![allow(dead_code)] // each test binary uses a different subset

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use wayfarer::bot::{Collaborators, ConversationMachine, Directive};
use wayfarer::catalog::SeedCatalog;
use wayfarer::config::Config;
use wayfarer::hotels::{
    CityCandidate, CityLookup, HotelSearchClient, Listing, SearchCriteria, SearchError,
};
use wayfarer::storage::SledPlayerStore;

pub const ADMIN_ID: u64 = 900;
pub const ADMIN_PASSWORD: &str = "let-me-clear";

/// Return the path to the static integration test fixture directory.
pub fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("test-data-int")
}

pub fn fixture_catalog() -> SeedCatalog {
    SeedCatalog::load_json(fixture_root().join("cities.json")).expect("fixture catalog")
}

pub fn temp_store() -> (tempfile::TempDir, Arc<SledPlayerStore>) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let store = SledPlayerStore::open(tmp.path().join("db")).expect("open store");
    (tmp, Arc::new(store))
}

/// Fixed "today" used by machine tests.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 10).unwrap()
}

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, d).unwrap()
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.search.timeout_seconds = 1;
    config.bot.admin_id = Some(ADMIN_ID);
    config.bot.admin_password_hash =
        Some(wayfarer::bot::admin::hash_password(ADMIN_PASSWORD).expect("hash"));
    config
}

/// City lookup backed by a fixed table; `"offline"` simulates an unreachable service.
pub struct FakeLookup {
    cities: HashMap<String, Vec<CityCandidate>>,
}

impl FakeLookup {
    pub fn new() -> Self {
        let mut cities = HashMap::new();
        cities.insert(
            "paris".to_string(),
            vec![
                CityCandidate {
                    region_id: "2734".into(),
                    name: "Paris, France".into(),
                },
                CityCandidate {
                    region_id: "9001".into(),
                    name: "Paris, Texas, United States".into(),
                },
            ],
        );
        cities.insert(
            "rome".to_string(),
            vec![CityCandidate {
                region_id: "3023".into(),
                name: "Rome, Lazio, Italy".into(),
            }],
        );
        Self { cities }
    }
}

#[async_trait]
impl CityLookup for FakeLookup {
    async fn lookup_city(&self, query: &str) -> Result<Vec<CityCandidate>, SearchError> {
        let key = query.trim().to_lowercase();
        if key == "offline" {
            return Err(SearchError::Unreachable("connection refused".into()));
        }
        Ok(self.cities.get(&key).cloned().unwrap_or_default())
    }
}

/// Hotel search returning a scripted outcome and recording every request.
pub struct FakeHotels {
    outcome: Mutex<Result<Vec<Listing>, SearchError>>,
    delay: Option<Duration>,
    pub calls: Mutex<Vec<SearchCriteria>>,
}

impl FakeHotels {
    pub fn returning(listings: Vec<Listing>) -> Self {
        Self {
            outcome: Mutex::new(Ok(listings)),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: SearchError) -> Self {
        Self {
            outcome: Mutex::new(Err(error)),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            outcome: Mutex::new(Ok(vec![listing("1", "Late Inn", 10.0)])),
            delay: Some(delay),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<SearchCriteria> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl HotelSearchClient for FakeHotels {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Listing>, SearchError> {
        self.calls.lock().unwrap().push(criteria.clone());
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        let outcome = self.outcome.lock().unwrap().clone();
        outcome.map(|mut listings| {
            listings.truncate(criteria.result_count as usize);
            listings
        })
    }
}

pub fn listing(id: &str, name: &str, price: f64) -> Listing {
    Listing {
        id: id.to_string(),
        name: name.to_string(),
        address: format!("{} street", name),
        price_per_night: Some(price),
        distance_km: Some(1.5),
        url: format!("https://www.hotels.com/h{}.Hotel-Information", id),
        photos: Vec::new(),
    }
}

pub struct Harness {
    pub _tmp: tempfile::TempDir,
    pub store: Arc<SledPlayerStore>,
    pub hotels: Arc<FakeHotels>,
    pub machine: Arc<ConversationMachine>,
}

pub fn harness(hotels: FakeHotels) -> Harness {
    harness_with(hotels, test_config())
}

pub fn harness_with(hotels: FakeHotels, config: Config) -> Harness {
    let (tmp, store) = temp_store();
    let hotels = Arc::new(hotels);
    let machine = ConversationMachine::new(
        Collaborators {
            players: store.clone(),
            history: store.clone(),
            catalog: Arc::new(fixture_catalog()),
            lookup: Arc::new(FakeLookup::new()),
            hotels: hotels.clone(),
        },
        &config,
    )
    .with_today(today);
    Harness {
        _tmp: tmp,
        store,
        hotels,
        machine: Arc::new(machine),
    }
}

pub fn has_error(directives: &[Directive]) -> bool {
    directives.iter().any(Directive::is_error)
}

pub fn all_text(directives: &[Directive]) -> String {
    directives
        .iter()
        .map(Directive::render_plain)
        .collect::<Vec<_>>()
        .join("\n")
}
