//! Alert record data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin of an alert record. Determines the parsing dialect and how the
/// display layer renders the record (pager alerts carry no severity).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FeedSource {
    /// Pager dispatch scrape (HTML table)
    Pager,
    /// Victoria incident RSS
    VicRss,
    /// NSW incident RSS
    NswRss,
}

impl FeedSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedSource::Pager => "pager",
            FeedSource::VicRss => "vic-rss",
            FeedSource::NswRss => "nsw-rss",
        }
    }
}

/// Severity classification carried by RSS-sourced incidents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum WarningLevel {
    Advice,
    WatchAndAct,
    Emergency,
}

/// One emergency dispatch or incident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertRecord {
    /// Human-readable description, markup-stripped
    pub message: String,

    /// Event time; falls back to ingestion time when the feed value is
    /// unparseable
    pub timestamp: DateTime<Utc>,

    /// Free-text location description (extractor output or feed-provided)
    pub location: Option<String>,

    /// Resolved geographic point as (longitude, latitude)
    pub coordinates: Option<(f64, f64)>,

    /// Upstream-assigned identifier, used for in-batch de-duplication
    pub incident_id: Option<String>,

    /// Feed the record came from
    pub source: FeedSource,

    /// Severity, present only for RSS-sourced records
    pub warning_level: Option<WarningLevel>,
}

impl AlertRecord {
    /// Create a bare record for the given source with ingestion-time
    /// timestamp and all optional fields empty.
    pub fn new(message: impl Into<String>, source: FeedSource) -> Self {
        Self {
            message: message.into(),
            timestamp: Utc::now(),
            location: None,
            coordinates: None,
            incident_id: None,
            source,
            warning_level: None,
        }
    }

    /// Whether enrichment still needs to resolve this record.
    pub fn needs_geocoding(&self) -> bool {
        self.coordinates.is_none() && self.location.is_some()
    }

    /// Set coordinates unless a higher-confidence source already did.
    pub fn fill_coordinates(&mut self, lon: f64, lat: f64) {
        if self.coordinates.is_none() {
            self.coordinates = Some((lon, lat));
        }
    }
}
