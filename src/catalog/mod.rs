//! City reference data for the city game.
//!
//! The catalog is read-only: it answers whether a name is a known city and hands out a
//! random city for a first letter that the player has not used yet. [`SeedCatalog`] keeps
//! the whole list in memory, indexed by upper-cased first letter, and is loaded from a JSON
//! seed file (`storage.cities_seed`) such as:
//!
//! ```json
//! [
//!   {"id": 1, "name": "Москва", "country": "Россия", "region": "Москва", "lat": 55.75, "lng": 37.61}
//! ]
//! ```
//!
//! Cities are identified by their normalized name ([`city_key`]), so two records that share
//! a name count as one city for the anti-repeat rule.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::errors::CatalogError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub region: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub population: u64,
}

impl City {
    /// Identifier used for the played-city set.
    pub fn key(&self) -> String {
        city_key(&self.name)
    }

    pub fn map_link(&self) -> String {
        format!(
            "https://www.google.com/maps/@{},{},12z",
            self.lat, self.lng
        )
    }
}

/// Normalized lookup key for a city name: trimmed and lower-cased.
pub fn city_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Upper-cased first character of a name, if any.
pub fn first_letter(name: &str) -> Option<char> {
    name.trim().chars().next().and_then(|c| c.to_uppercase().next())
}

/// Read-only access to the city reference data.
pub trait CityCatalog: Send + Sync {
    /// Look up a city by name (case-insensitive).
    fn find(&self, name: &str) -> Result<Option<City>, CatalogError>;

    fn city_exists(&self, name: &str) -> Result<bool, CatalogError> {
        Ok(self.find(name)?.is_some())
    }

    /// A uniformly random city starting with `first_letter` whose key is not in `exclude`.
    fn random_unplayed(
        &self,
        first_letter: char,
        exclude: &HashSet<String>,
    ) -> Result<Option<City>, CatalogError>;
}

/// In-memory catalog built from seed records.
#[derive(Debug, Default, Clone)]
pub struct SeedCatalog {
    by_key: HashMap<String, City>,
    by_letter: BTreeMap<char, Vec<String>>,
}

impl SeedCatalog {
    pub fn from_cities(cities: Vec<City>) -> Self {
        let mut catalog = SeedCatalog::default();
        for city in cities {
            let key = city.key();
            let Some(letter) = first_letter(&city.name) else {
                continue;
            };
            if catalog.by_key.contains_key(&key) {
                continue;
            }
            catalog.by_letter.entry(letter).or_default().push(key.clone());
            catalog.by_key.insert(key, city);
        }
        catalog
    }

    /// Load seed records from a JSON array file.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let cities: Vec<City> =
            serde_json::from_str(&contents).map_err(|e| CatalogError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let catalog = Self::from_cities(cities);
        log::info!(
            "city catalog loaded from {}: {} cities, {} letters",
            path.display(),
            catalog.len(),
            catalog.by_letter.len()
        );
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Number of distinct cities per first letter.
    pub fn letter_counts(&self) -> BTreeMap<char, usize> {
        self.by_letter
            .iter()
            .map(|(letter, keys)| (*letter, keys.len()))
            .collect()
    }
}

impl CityCatalog for SeedCatalog {
    fn find(&self, name: &str) -> Result<Option<City>, CatalogError> {
        Ok(self.by_key.get(&city_key(name)).cloned())
    }

    fn random_unplayed(
        &self,
        first_letter: char,
        exclude: &HashSet<String>,
    ) -> Result<Option<City>, CatalogError> {
        let Some(keys) = self.by_letter.get(&first_letter) else {
            return Ok(None);
        };
        let candidates: Vec<&String> = keys.iter().filter(|k| !exclude.contains(*k)).collect();
        let picked = candidates
            .choose(&mut rand::thread_rng())
            .and_then(|k| self.by_key.get(k.as_str()))
            .cloned();
        Ok(picked)
    }
}
