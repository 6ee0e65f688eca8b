//! Hotel search collaborators.
//!
//! The wizard only collects parameters; running the search belongs to a
//! [`HotelSearchClient`], and resolving a typed city name to bookable regions belongs to a
//! [`CityLookup`]. Both report failures as [`SearchError`] values so callers can tell "no
//! results" from "service unreachable" without catching anything.
//!
//! - [`rapidapi`] - Hotels API client over RapidAPI (feature `rapidapi`)
//! - [`UnconfiguredClient`] - stand-in used when no API key is available

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::BotError;

#[cfg(feature = "rapidapi")]
pub mod rapidapi;

/// Ordering requested by the search command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchSort {
    LowPrice,
    HighPrice,
    BestDeal,
}

impl SearchSort {
    pub fn command(self) -> &'static str {
        match self {
            SearchSort::LowPrice => "/lowprice",
            SearchSort::HighPrice => "/highprice",
            SearchSort::BestDeal => "/bestdeal",
        }
    }

    pub fn from_command(cmd: &str) -> Option<Self> {
        match cmd.trim().to_ascii_lowercase().as_str() {
            "/lowprice" | "lowprice" => Some(SearchSort::LowPrice),
            "/highprice" | "highprice" => Some(SearchSort::HighPrice),
            "/bestdeal" | "bestdeal" => Some(SearchSort::BestDeal),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            SearchSort::LowPrice => "cheapest hotels",
            SearchSort::HighPrice => "most expensive hotels",
            SearchSort::BestDeal => "best deals by price and distance",
        }
    }
}

/// A region returned by the city lookup, offered to the user for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityCandidate {
    pub region_id: String,
    pub name: String,
}

/// The finalized request emitted by the wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub sort: SearchSort,
    pub city: CityCandidate,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub result_count: u8,
    pub photo_count: u8,
    pub min_price: Option<u32>,
}

impl SearchCriteria {
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub price_per_night: Option<f64>,
    pub distance_km: Option<f64>,
    pub url: String,
    #[serde(default)]
    pub photos: Vec<String>,
}

impl Listing {
    pub fn total_price(&self, nights: i64) -> Option<f64> {
        self.price_per_night.map(|p| p * nights.max(1) as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("no matching results")]
    NotFound,

    #[error("search service unreachable: {0}")]
    Unreachable(String),
}

impl From<SearchError> for BotError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::NotFound => BotError::NotFound("no hotels match the search".to_string()),
            SearchError::Unreachable(reason) => BotError::ServiceUnavailable(reason),
        }
    }
}

#[async_trait]
pub trait CityLookup: Send + Sync {
    /// Regions matching a typed city name. An empty list means the name is unknown.
    async fn lookup_city(&self, query: &str) -> Result<Vec<CityCandidate>, SearchError>;
}

#[async_trait]
pub trait HotelSearchClient: Send + Sync {
    /// Listings for `criteria`; never returns an empty list (that is [`SearchError::NotFound`]).
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Listing>, SearchError>;
}

/// Run a collaborator call with an upper time bound; running out of time counts as unreachable.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, SearchError>
where
    F: Future<Output = Result<T, SearchError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SearchError::Unreachable(format!(
            "no answer within {}s",
            limit.as_secs()
        ))),
    }
}

/// Used when hotel search is not available in this build or has no API key.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredClient;

#[async_trait]
impl CityLookup for UnconfiguredClient {
    async fn lookup_city(&self, _query: &str) -> Result<Vec<CityCandidate>, SearchError> {
        Err(SearchError::Unreachable(
            "hotel search is not configured".to_string(),
        ))
    }
}

#[async_trait]
impl HotelSearchClient for UnconfiguredClient {
    async fn search(&self, _criteria: &SearchCriteria) -> Result<Vec<Listing>, SearchError> {
        Err(SearchError::Unreachable(
            "hotel search is not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_parses_commands() {
        assert_eq!(SearchSort::from_command("/LowPrice"), Some(SearchSort::LowPrice));
        assert_eq!(SearchSort::from_command("bestdeal"), Some(SearchSort::BestDeal));
        assert_eq!(SearchSort::from_command("/game"), None);
        assert_eq!(SearchSort::HighPrice.command(), "/highprice");
    }

    #[test]
    fn total_price_covers_all_nights() {
        let l = Listing {
            id: "1".into(),
            name: "Inn".into(),
            address: String::new(),
            price_per_night: Some(40.0),
            distance_km: None,
            url: String::new(),
            photos: vec![],
        };
        assert_eq!(l.total_price(3), Some(120.0));
        assert_eq!(l.total_price(0), Some(40.0));
    }

    #[tokio::test]
    async fn bounded_turns_timeout_into_unreachable() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<u8, SearchError>(1)
        };
        let out = bounded(Duration::from_millis(10), slow).await;
        assert!(matches!(out, Err(SearchError::Unreachable(_))));
    }

    #[tokio::test]
    async fn errors_map_to_distinct_bot_errors() {
        let nf: BotError = SearchError::NotFound.into();
        let un: BotError = UnconfiguredClient
            .lookup_city("Paris")
            .await
            .unwrap_err()
            .into();
        assert!(matches!(nf, BotError::NotFound(_)));
        assert!(matches!(un, BotError::ServiceUnavailable(_)));
    }
}
