//! Feed cache and fetch coordination.
//!
//! Per feed key, a two-state freshness machine: inside the TTL window the
//! cached snapshot is served untouched; once stale, the next caller fetches,
//! parses, enriches and rewrites the snapshot plus the fetch tracker. A
//! failed refresh falls back to the previous snapshot (however old) without
//! advancing the tracker, so the next call retries immediately.
//!
//! Coordination is best-effort through the store's timestamp alone: two
//! callers racing the Fresh-to-Stale boundary may both fetch. Upstream
//! tolerates the occasional double fetch far better than it would a
//! distributed lock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};

use crate::error::{AppError, Result};
use crate::models::{
    AlertRecord, CacheStatus, Config, FeedCacheEntry, FeedConfig, FeedSnapshot, FetchTrackerEntry,
};
use crate::parse::parse_payload;
use crate::services::geocoder::{GeocodeProvider, Geocoder, Resolution};
use crate::storage::{KeyValueStore, read_json, write_json};

/// Row key for a feed's latest enriched snapshot.
const LATEST_KEY: &str = "latest";

/// Row key for a feed's fetch tracker.
const TRACKER_KEY: &str = "tracker";

/// Upstream feed fetch seam.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch a feed payload as text.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// HTTP fetcher used outside tests.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Read API over all configured feeds. The display layer goes through this
/// service and never touches the upstream feeds or the geocoder directly.
pub struct FeedService<S, P, F> {
    inner: Arc<Inner<S, P, F>>,
}

struct Inner<S, P, F> {
    store: Arc<S>,
    geocoder: Geocoder<S, P>,
    fetcher: F,
    feeds: Vec<FeedConfig>,
    geocode_delay: Duration,
    max_concurrent: usize,
}

impl<S, P, F> Clone for FeedService<S, P, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, P, F> FeedService<S, P, F>
where
    S: KeyValueStore + 'static,
    P: GeocodeProvider + 'static,
    F: FeedFetcher + 'static,
{
    pub fn new(store: Arc<S>, provider: P, fetcher: F, config: &Config) -> Self {
        let geocoder = Geocoder::new(
            Arc::clone(&store),
            provider,
            config.geocoder.region_qualifier.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                store,
                geocoder,
                fetcher,
                feeds: config.feeds.clone(),
                geocode_delay: Duration::from_millis(config.fetch.geocode_delay_ms),
                max_concurrent: config.fetch.max_concurrent.max(1),
            }),
        }
    }

    /// Keys of all configured feeds.
    pub fn feed_keys(&self) -> Vec<String> {
        self.inner.feeds.iter().map(|f| f.key.clone()).collect()
    }

    /// Serve the enriched snapshot for one feed, refreshing it when stale.
    pub async fn enriched_feed(&self, feed_key: &str) -> Result<FeedSnapshot> {
        let feed = self
            .inner
            .feeds
            .iter()
            .find(|f| f.key == feed_key)
            .cloned()
            .ok_or_else(|| AppError::UnknownFeed(feed_key.to_string()))?;

        let tracker: Option<FetchTrackerEntry> =
            read_json(&*self.inner.store, &feed.key, TRACKER_KEY).await?;
        let is_fresh = tracker
            .map(|t| {
                let elapsed = Utc::now().signed_duration_since(t.last_fetch_at);
                elapsed < chrono::Duration::seconds(feed.ttl_secs as i64)
            })
            .unwrap_or(false);

        if is_fresh {
            if let Some(entry) =
                read_json::<FeedCacheEntry, _>(&*self.inner.store, &feed.key, LATEST_KEY).await?
            {
                log::debug!("Feed '{}' fresh, serving cached snapshot", feed.key);
                return Ok(snapshot(entry, CacheStatus::CacheHit));
            }
            // Tracker without a snapshot; refresh anyway
        }

        // Run the refresh on its own task: geocoding results are worth
        // keeping even when the requesting caller gives up waiting, so a
        // dropped request must not abort the cycle mid-enrichment.
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.refresh(&feed).await });
        handle
            .await
            .map_err(|e| AppError::fetch("refresh task", e))?
    }

    /// Refresh every configured feed with bounded concurrency. Feeds are
    /// independent; each one's enrichment stays sequential internally.
    pub async fn refresh_all(&self) -> Vec<(String, Result<FeedSnapshot>)> {
        let keys = self.feed_keys();
        stream::iter(keys)
            .map(|key| {
                let service = self.clone();
                async move {
                    let result = service.enriched_feed(&key).await;
                    (key, result)
                }
            })
            .buffer_unordered(self.inner.max_concurrent)
            .collect()
            .await
    }

    /// The stored snapshot for a feed, if any, without any network call.
    pub async fn cached(&self, feed_key: &str) -> Result<Option<FeedCacheEntry>> {
        read_json(&*self.inner.store, feed_key, LATEST_KEY).await
    }
}

impl<S, P, F> Inner<S, P, F>
where
    S: KeyValueStore,
    P: GeocodeProvider,
    F: FeedFetcher,
{
    async fn refresh(&self, feed: &FeedConfig) -> Result<FeedSnapshot> {
        log::info!("Refreshing feed '{}' from {}", feed.key, feed.url);

        let payload = match self.fetcher.fetch(&feed.url).await {
            Ok(payload) => payload,
            Err(e) => return self.fallback(feed, e).await,
        };

        let mut records = parse_payload(feed.source, &payload);
        log::info!("Feed '{}' parsed {} records", feed.key, records.len());

        self.enrich(&feed.key, &mut records).await;

        let entry = FeedCacheEntry::new(&feed.key, records);
        write_json(&*self.store, &feed.key, LATEST_KEY, &entry).await?;
        let tracker = FetchTrackerEntry {
            feed_key: feed.key.clone(),
            last_fetch_at: Utc::now(),
        };
        write_json(&*self.store, &feed.key, TRACKER_KEY, &tracker).await?;

        Ok(snapshot(entry, CacheStatus::FreshFetch))
    }

    /// Serve the previous snapshot after a failed fetch. The tracker is
    /// left alone so the next call retries immediately instead of waiting
    /// out a TTL on failed data.
    async fn fallback(&self, feed: &FeedConfig, error: AppError) -> Result<FeedSnapshot> {
        log::warn!("Fetch failed for feed '{}': {}", feed.key, error);
        match read_json::<FeedCacheEntry, _>(&*self.store, &feed.key, LATEST_KEY).await? {
            Some(entry) => {
                log::warn!(
                    "Serving stale snapshot of '{}' from {}",
                    feed.key,
                    entry.cached_at
                );
                Ok(snapshot(entry, CacheStatus::StaleFallback))
            }
            None => Err(AppError::NoData(feed.key.clone())),
        }
    }

    /// Resolve coordinates for records that carry a location but no point.
    ///
    /// Provider calls are sequential with a fixed spacing delay to stay
    /// under the provider's burst limits; cache hits cost nothing and skip
    /// the delay. Failures count as misses and never abort the batch.
    async fn enrich(&self, feed_key: &str, records: &mut [AlertRecord]) {
        for record in records.iter_mut().filter(|r| r.needs_geocoding()) {
            let Some(location) = record.location.clone() else {
                continue;
            };
            match self.geocoder.resolve(&location, feed_key).await {
                Ok(Resolution::CacheHit(entry)) => {
                    record.fill_coordinates(entry.coordinates.0, entry.coordinates.1);
                }
                Ok(Resolution::Fetched(entry)) => {
                    record.fill_coordinates(entry.coordinates.0, entry.coordinates.1);
                    tokio::time::sleep(self.geocode_delay).await;
                }
                Ok(Resolution::NotFound) => {
                    tokio::time::sleep(self.geocode_delay).await;
                }
                Err(e) => {
                    log::warn!("Geocode enrichment failed for '{location}': {e}");
                }
            }
        }
    }
}

fn snapshot(entry: FeedCacheEntry, status: CacheStatus) -> FeedSnapshot {
    FeedSnapshot {
        feed_key: entry.feed_key,
        records: entry.records,
        status,
        cached_at: entry.cached_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeedSource, FetchConfig, GeocoderConfig};
    use crate::services::geocoder::ResolvedPlace;
    use crate::storage::LocalStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct MockFetcher {
        calls: Arc<AtomicUsize>,
        payload: Option<String>,
    }

    #[async_trait]
    impl FeedFetcher for MockFetcher {
        async fn fetch(&self, url: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.payload
                .clone()
                .ok_or_else(|| AppError::fetch(url, "connection refused"))
        }
    }

    struct MockProvider {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl GeocodeProvider for MockProvider {
        async fn lookup(&self, _query: &str) -> Result<Option<ResolvedPlace>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(ResolvedPlace {
                coordinates: (146.0054, -36.0126),
                place_name: Some("Yarrawonga VIC".to_string()),
            }))
        }
    }

    const PAGER_HTML: &str = "<table><tr>\
        <td class='capcode'>X1</td>\
        <td class='timestamp'>14:30:00 2024-01-15</td>\
        <td>@@ALERT GRASS FIRE 230 CHURCHILL RD YARRAWONGA / F123456789</td>\
        </tr></table>";

    struct Fixture {
        service: FeedService<LocalStore, MockProvider, MockFetcher>,
        store: Arc<LocalStore>,
        fetch_calls: Arc<AtomicUsize>,
        geocode_calls: Arc<AtomicUsize>,
        _tmp: TempDir,
    }

    fn fixture(payload: Option<&str>, ttl_secs: u64) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(LocalStore::new(tmp.path()));
        let fetch_calls = Arc::new(AtomicUsize::new(0));
        let geocode_calls = Arc::new(AtomicUsize::new(0));

        let config = Config {
            fetch: FetchConfig {
                geocode_delay_ms: 0,
                ..FetchConfig::default()
            },
            geocoder: GeocoderConfig::default(),
            feeds: vec![FeedConfig {
                key: "cfa-pager".to_string(),
                url: "https://pager.example.net/messages".to_string(),
                source: FeedSource::Pager,
                ttl_secs,
            }],
        };

        let service = FeedService::new(
            Arc::clone(&store),
            MockProvider {
                calls: Arc::clone(&geocode_calls),
            },
            MockFetcher {
                calls: Arc::clone(&fetch_calls),
                payload: payload.map(String::from),
            },
            &config,
        );

        Fixture {
            service,
            store,
            fetch_calls,
            geocode_calls,
            _tmp: tmp,
        }
    }

    async fn seed_cache(store: &LocalStore, feed_key: &str, age_ms: i64) {
        let mut entry = FeedCacheEntry::new(
            feed_key,
            vec![AlertRecord::new("@@ALERT CACHED", FeedSource::Pager)],
        );
        entry.cached_at = Utc::now() - chrono::Duration::milliseconds(age_ms);
        write_json(store, feed_key, LATEST_KEY, &entry).await.unwrap();

        let tracker = FetchTrackerEntry {
            feed_key: feed_key.to_string(),
            last_fetch_at: Utc::now() - chrono::Duration::milliseconds(age_ms),
        };
        write_json(store, feed_key, TRACKER_KEY, &tracker)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_call_fetches_parses_and_enriches() {
        let fx = fixture(Some(PAGER_HTML), 60);

        let result = fx.service.enriched_feed("cfa-pager").await.unwrap();

        assert_eq!(result.status, CacheStatus::FreshFetch);
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].coordinates, Some((146.0054, -36.0126)));
        assert_eq!(fx.fetch_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.geocode_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_call_inside_ttl_serves_cache_without_fetching() {
        let fx = fixture(Some(PAGER_HTML), 60);
        // Just short of the TTL
        seed_cache(&fx.store, "cfa-pager", 59_000).await;

        let result = fx.service.enriched_feed("cfa-pager").await.unwrap();

        assert_eq!(result.status, CacheStatus::CacheHit);
        assert_eq!(result.records[0].message, "@@ALERT CACHED");
        assert_eq!(fx.fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_call_past_ttl_triggers_exactly_one_fetch() {
        let fx = fixture(Some(PAGER_HTML), 60);
        // One millisecond past the TTL
        seed_cache(&fx.store, "cfa-pager", 60_000 + 1).await;

        let result = fx.service.enriched_feed("cfa-pager").await.unwrap();

        assert_eq!(result.status, CacheStatus::FreshFetch);
        assert_eq!(fx.fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_serves_stale_snapshot_without_touching_tracker() {
        let fx = fixture(None, 60);
        seed_cache(&fx.store, "cfa-pager", 120_000).await;

        let before: FetchTrackerEntry = read_json(&*fx.store, "cfa-pager", TRACKER_KEY)
            .await
            .unwrap()
            .unwrap();

        let result = fx.service.enriched_feed("cfa-pager").await.unwrap();
        assert_eq!(result.status, CacheStatus::StaleFallback);
        assert_eq!(result.records[0].message, "@@ALERT CACHED");

        let after: FetchTrackerEntry = read_json(&*fx.store, "cfa-pager", TRACKER_KEY)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before.last_fetch_at, after.last_fetch_at);
    }

    #[tokio::test]
    async fn test_fetch_failure_without_cache_is_an_error() {
        let fx = fixture(None, 60);

        let result = fx.service.enriched_feed("cfa-pager").await;
        assert!(matches!(result, Err(AppError::NoData(_))));
    }

    #[tokio::test]
    async fn test_failed_refresh_retries_on_next_call() {
        let fx = fixture(None, 60);
        seed_cache(&fx.store, "cfa-pager", 120_000).await;

        fx.service.enriched_feed("cfa-pager").await.unwrap();
        fx.service.enriched_feed("cfa-pager").await.unwrap();

        // Tracker never advanced, so both calls attempted a fetch
        assert_eq!(fx.fetch_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_successful_refresh_is_cached_for_the_next_call() {
        let fx = fixture(Some(PAGER_HTML), 60);

        let first = fx.service.enriched_feed("cfa-pager").await.unwrap();
        let second = fx.service.enriched_feed("cfa-pager").await.unwrap();

        assert_eq!(first.status, CacheStatus::FreshFetch);
        assert_eq!(second.status, CacheStatus::CacheHit);
        assert_eq!(fx.fetch_calls.load(Ordering::SeqCst), 1);
        // The geocode result was cached too
        assert_eq!(fx.geocode_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_feed_is_rejected() {
        let fx = fixture(Some(PAGER_HTML), 60);
        let result = fx.service.enriched_feed("missing").await;
        assert!(matches!(result, Err(AppError::UnknownFeed(_))));
    }

    #[tokio::test]
    async fn test_refresh_all_covers_every_feed() {
        let fx = fixture(Some(PAGER_HTML), 60);
        let results = fx.service.refresh_all().await;

        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
    }
}
