//! Location geocoding with a write-once cache.
//!
//! Physical places do not move, so a normalized location key is resolved
//! against the external provider at most once for the lifetime of the
//! store. Provider failures and empty results are returned as misses
//! without caching anything, so a transient outage never blocks a later
//! retry.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use crate::error::Result;
use crate::models::{GeocodeCacheEntry, GeocoderConfig};
use crate::storage::{KeyValueStore, read_json, write_json};

/// Cache keys are capped so pathological messages cannot create unbounded
/// file names.
const MAX_KEY_LEN: usize = 100;

/// Canonicalize a location string into a stable cache key: uppercase,
/// punctuation stripped, whitespace collapsed, length-capped.
pub fn normalize_key(location: &str) -> String {
    let upper: String = location
        .to_uppercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();
    upper
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_KEY_LEN)
        .collect()
}

/// A provider result: coordinates as (longitude, latitude) plus an
/// optional display name.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlace {
    pub coordinates: (f64, f64),
    pub place_name: Option<String>,
}

/// External geocoding provider seam.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    /// Look up a query, returning at most one candidate.
    async fn lookup(&self, query: &str) -> Result<Option<ResolvedPlace>>;
}

/// How a resolve call was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Served from the cache; no network call happened
    CacheHit(GeocodeCacheEntry),
    /// Resolved by the provider and written to the cache
    Fetched(GeocodeCacheEntry),
    /// Provider miss or failure; nothing cached
    NotFound,
}

impl Resolution {
    pub fn entry(self) -> Option<GeocodeCacheEntry> {
        match self {
            Resolution::CacheHit(entry) | Resolution::Fetched(entry) => Some(entry),
            Resolution::NotFound => None,
        }
    }
}

/// Geocoding cache plus provider client.
pub struct Geocoder<S, P> {
    store: Arc<S>,
    provider: P,
    region_qualifier: String,
}

impl<S: KeyValueStore, P: GeocodeProvider> Geocoder<S, P> {
    pub fn new(store: Arc<S>, provider: P, region_qualifier: impl Into<String>) -> Self {
        Self {
            store,
            provider,
            region_qualifier: region_qualifier.into(),
        }
    }

    /// Resolve a location to coordinates, consulting the cache first.
    ///
    /// Issues zero or one outbound network call; writes at most one cache
    /// entry per unique key, ever.
    pub async fn resolve(&self, location: &str, feed_namespace: &str) -> Result<Resolution> {
        let key = normalize_key(location);
        if key.is_empty() {
            return Ok(Resolution::NotFound);
        }
        let namespace = format!("{feed_namespace}-geocode");

        if let Some(entry) = read_json::<GeocodeCacheEntry, _>(&*self.store, &namespace, &key).await?
        {
            return Ok(Resolution::CacheHit(entry));
        }

        let query = format!("{}, {}", location, self.region_qualifier);
        let place = match self.provider.lookup(&query).await {
            Ok(Some(place)) => place,
            Ok(None) => {
                log::debug!("Geocoder returned no result for '{query}'");
                return Ok(Resolution::NotFound);
            }
            Err(e) => {
                // Transient failures stay uncached so a later call retries
                log::warn!("Geocoder lookup failed for '{query}': {e}");
                return Ok(Resolution::NotFound);
            }
        };

        let entry = GeocodeCacheEntry {
            key: key.clone(),
            coordinates: place.coordinates,
            place_name: place.place_name,
            resolved_at: Utc::now(),
        };
        write_json(&*self.store, &namespace, &key, &entry).await?;
        log::info!(
            "Geocoded '{location}' to ({:.4}, {:.4})",
            entry.coordinates.0,
            entry.coordinates.1
        );
        Ok(Resolution::Fetched(entry))
    }
}

// --- HTTP provider ---

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    geometry: Geometry,
    #[serde(default)]
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    coordinates: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Properties {
    label: Option<String>,
}

/// Provider client for a Pelias-style search endpoint.
pub struct HttpGeocodeProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpGeocodeProvider {
    pub fn new(client: reqwest::Client, config: &GeocoderConfig) -> Self {
        let api_key = config.resolved_api_key();
        if api_key.is_none() {
            log::warn!("No geocoder API key configured; all lookups will miss");
        }
        Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
        }
    }
}

#[async_trait]
impl GeocodeProvider for HttpGeocodeProvider {
    async fn lookup(&self, query: &str) -> Result<Option<ResolvedPlace>> {
        // Degrade predictably without a credential: every lookup misses
        let Some(api_key) = &self.api_key else {
            return Ok(None);
        };

        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("text", query), ("api_key", api_key), ("size", "1")])
            .send()
            .await?
            .error_for_status()?;
        let body: SearchResponse = serde_json::from_slice(&response.bytes().await?)?;

        let Some(feature) = body.features.into_iter().next() else {
            return Ok(None);
        };
        match feature.geometry.coordinates.as_slice() {
            [lon, lat, ..] => Ok(Some(ResolvedPlace {
                coordinates: (*lon, *lat),
                place_name: feature.properties.label,
            })),
            _ => Ok(None),
        }
    }
}
