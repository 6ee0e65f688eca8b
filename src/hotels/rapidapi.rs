//! Hotels API client (hotels4 on RapidAPI).
//!
//! Three endpoints are used: `locations/v3/search` for city lookup, `properties/v2/list`
//! for the search itself and `properties/v2/detail` for addresses and photos. Responses are
//! read with JSON pointers so small schema drifts degrade to missing fields instead of
//! failing the whole search.

use async_trait::async_trait;
use log::{debug, warn};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout;

use super::{CityCandidate, CityLookup, HotelSearchClient, Listing, SearchCriteria, SearchError, SearchSort};
use crate::config::SearchConfig;

pub struct RapidApiClient {
    config: SearchConfig,
    client: reqwest::Client,
}

impl RapidApiClient {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!("https://{}/{}", self.config.api_host, path)
    }

    fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds as u64)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, SearchError> {
        if !self.is_configured() {
            return Err(SearchError::Unreachable("API key not configured".to_string()));
        }
        let request = request
            .header("X-RapidAPI-Key", &self.config.api_key)
            .header("X-RapidAPI-Host", &self.config.api_host);

        let response = timeout(self.timeout_duration(), request.send())
            .await
            .map_err(|_| {
                SearchError::Unreachable(format!(
                    "request timeout after {}s",
                    self.config.timeout_seconds
                ))
            })?
            .map_err(|e| SearchError::Unreachable(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(SearchError::Unreachable(format!(
                "API returned status: {}",
                response.status()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SearchError::Unreachable(format!("Failed to parse JSON response: {}", e)))
    }

    /// Build the `locations/v3/search` URL for a typed city name.
    pub fn build_lookup_url(&self, query: &str) -> String {
        format!(
            "{}?q={}&locale={}&langid=1033&siteid=300000001",
            self.url("locations/v3/search"),
            urlencoding::encode(query.trim()),
            self.config.locale
        )
    }

    /// Request body for `properties/v2/list`.
    pub fn build_list_body(&self, criteria: &SearchCriteria) -> Value {
        let sort = match criteria.sort {
            SearchSort::BestDeal => "DISTANCE",
            SearchSort::LowPrice | SearchSort::HighPrice => "PRICE_LOW_TO_HIGH",
        };
        // The API cannot sort by descending price, so fetch a wider page and reorder locally.
        let page = match criteria.sort {
            SearchSort::HighPrice => 200,
            _ => criteria.result_count as u32,
        };
        let mut body = json!({
            "currency": self.config.currency,
            "eapid": 1,
            "locale": self.config.locale,
            "siteId": 300000001,
            "destination": { "regionId": criteria.city.region_id },
            "checkInDate": date_json(criteria.check_in),
            "checkOutDate": date_json(criteria.check_out),
            "rooms": [{ "adults": 1 }],
            "resultsStartingIndex": 0,
            "resultsSize": page,
            "sort": sort,
        });
        if let Some(min) = criteria.min_price {
            body["filters"] = json!({ "price": { "min": min } });
        }
        body
    }

    async fn fetch_details(&self, listing: &mut Listing, photo_count: u8) {
        let body = json!({
            "currency": self.config.currency,
            "eapid": 1,
            "locale": self.config.locale,
            "siteId": 300000001,
            "propertyId": listing.id,
        });
        let request = self.client.post(self.url("properties/v2/detail")).json(&body);
        match self.send(request).await {
            Ok(value) => {
                if let Some(addr) = value
                    .pointer("/data/propertyInfo/summary/location/address/addressLine")
                    .and_then(Value::as_str)
                {
                    listing.address = addr.to_string();
                }
                listing.photos = value
                    .pointer("/data/propertyInfo/propertyGallery/images")
                    .and_then(Value::as_array)
                    .map(|images| {
                        images
                            .iter()
                            .filter_map(|img| img.pointer("/image/url").and_then(Value::as_str))
                            .take(photo_count as usize)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
            }
            Err(e) => warn!("hotel detail for {} unavailable: {}", listing.id, e),
        }
    }
}

fn date_json(d: chrono::NaiveDate) -> Value {
    use chrono::Datelike;
    json!({ "day": d.day(), "month": d.month(), "year": d.year() })
}

/// Extract city candidates from a `locations/v3/search` response.
pub fn parse_lookup(value: &Value) -> Vec<CityCandidate> {
    value
        .get("sr")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter(|e| e.get("type").and_then(Value::as_str) == Some("CITY"))
                .filter_map(|e| {
                    let region_id = e.get("gaiaId").and_then(Value::as_str)?;
                    let name = e
                        .pointer("/regionNames/fullName")
                        .and_then(Value::as_str)?;
                    Some(CityCandidate {
                        region_id: region_id.to_string(),
                        name: name.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Extract listings from a `properties/v2/list` response.
pub fn parse_listings(value: &Value) -> Vec<Listing> {
    value
        .pointer("/data/propertySearch/properties")
        .and_then(Value::as_array)
        .map(|props| {
            props
                .iter()
                .filter_map(|p| {
                    let id = p.get("id").and_then(Value::as_str)?.to_string();
                    let name = p.get("name").and_then(Value::as_str)?.to_string();
                    Some(Listing {
                        url: format!("https://www.hotels.com/h{}.Hotel-Information", id),
                        id,
                        name,
                        address: String::new(),
                        price_per_night: p.pointer("/price/lead/amount").and_then(Value::as_f64),
                        distance_km: p
                            .pointer("/destinationInfo/distanceFromDestination/value")
                            .and_then(Value::as_f64),
                        photos: Vec::new(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl CityLookup for RapidApiClient {
    async fn lookup_city(&self, query: &str) -> Result<Vec<CityCandidate>, SearchError> {
        let url = self.build_lookup_url(query);
        debug!("Looking up city: {}", url);
        let value = self.send(self.client.get(&url)).await?;
        Ok(parse_lookup(&value))
    }
}

#[async_trait]
impl HotelSearchClient for RapidApiClient {
    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Listing>, SearchError> {
        let body = self.build_list_body(criteria);
        let request = self.client.post(self.url("properties/v2/list")).json(&body);
        let value = self.send(request).await?;
        let mut listings = parse_listings(&value);
        if criteria.sort == SearchSort::HighPrice {
            listings.sort_by(|a, b| {
                b.price_per_night
                    .unwrap_or(0.0)
                    .total_cmp(&a.price_per_night.unwrap_or(0.0))
            });
        }
        listings.truncate(criteria.result_count as usize);
        if listings.is_empty() {
            return Err(SearchError::NotFound);
        }
        for listing in listings.iter_mut() {
            self.fetch_details(listing, criteria.photo_count).await;
        }
        debug!(
            "search {} in {} returned {} listings",
            criteria.sort.command(),
            criteria.city.name,
            listings.len()
        );
        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn criteria(sort: SearchSort) -> SearchCriteria {
        SearchCriteria {
            sort,
            city: CityCandidate {
                region_id: "2734".into(),
                name: "Rome, Lazio, Italy".into(),
            },
            check_in: NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
            check_out: NaiveDate::from_ymd_opt(2030, 5, 4).unwrap(),
            result_count: 3,
            photo_count: 2,
            min_price: Some(50),
        }
    }

    #[test]
    fn lookup_url_encodes_query() {
        let client = RapidApiClient::new(SearchConfig::default());
        let url = client.build_lookup_url(" New York ");
        assert!(url.starts_with("https://hotels4.p.rapidapi.com/locations/v3/search?q=New%20York&"));
    }

    #[test]
    fn list_body_carries_filters_and_dates() {
        let client = RapidApiClient::new(SearchConfig::default());
        let body = client.build_list_body(&criteria(SearchSort::BestDeal));
        assert_eq!(body["sort"], "DISTANCE");
        assert_eq!(body["filters"]["price"]["min"], 50);
        assert_eq!(body["checkOutDate"]["day"], 4);
        assert_eq!(body["resultsSize"], 3);

        let high = client.build_list_body(&criteria(SearchSort::HighPrice));
        assert_eq!(high["resultsSize"], 200);
    }

    #[test]
    fn parse_lookup_keeps_only_cities() {
        let value = json!({"sr": [
            {"type": "CITY", "gaiaId": "1", "regionNames": {"fullName": "Rome, Italy"}},
            {"type": "HOTEL", "hotelId": "9", "regionNames": {"fullName": "Hotel Roma"}},
            {"type": "CITY", "regionNames": {"fullName": "Missing id"}}
        ]});
        let out = parse_lookup(&value);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].region_id, "1");
    }

    #[test]
    fn parse_listings_reads_price_and_distance() {
        let value = json!({"data": {"propertySearch": {"properties": [
            {"id": "10", "name": "Inn", "price": {"lead": {"amount": 81.5}},
             "destinationInfo": {"distanceFromDestination": {"value": 1.2}}},
            {"id": "11", "name": "Hostel"}
        ]}}});
        let out = parse_listings(&value);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].price_per_night, Some(81.5));
        assert_eq!(out[0].distance_km, Some(1.2));
        assert_eq!(out[1].price_per_night, None);
    }

    #[tokio::test]
    async fn missing_key_is_unreachable() {
        let client = RapidApiClient::new(SearchConfig::default());
        let err = client.lookup_city("Rome").await.unwrap_err();
        assert!(matches!(err, SearchError::Unreachable(_)));
    }
}
