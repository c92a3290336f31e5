//! Pager dispatch feed parser.
//!
//! The upstream page is an HTML table with one dispatch per row: a capcode
//! cell, a timestamp cell and a message cell. Multiple pager units get
//! dispatched to the same incident, so rows repeat the same incident id;
//! the first occurrence in row order wins.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};

use crate::models::{AlertRecord, FeedSource};
use crate::parse::{location, text};

/// Rows without this marker are chatter, not alerts.
const ALERT_MARKER: &str = "@@ALERT";

/// Upstream operational notice, not an alert.
const STOP_MARKER: &str = "STOP SCRAPING";

// Feed timestamps are fixed UTC+11 year-round, including the half of the
// year Victoria runs on AEST (UTC+10). Kept to match upstream behavior;
// flagged for product review rather than corrected here.
const PAGER_UTC_OFFSET_SECS: i32 = 11 * 3600;

fn incident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bF\d{9}\b").expect("incident regex"))
}

/// Parse a pager dispatch page into alert records.
///
/// Coordinates are left empty for later enrichment; pager alerts carry no
/// warning level.
pub fn parse(html: &str) -> Vec<AlertRecord> {
    let document = Html::parse_document(html);
    let row_sel = Selector::parse("tr").expect("row selector");
    let cell_sel = Selector::parse("td").expect("cell selector");

    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut records = Vec::new();

    for row in document.select(&row_sel) {
        let cells: Vec<_> = row.select(&cell_sel).collect();
        if cells.len() < 3 {
            continue;
        }

        let raw_timestamp: String = cells[1].text().collect();
        let raw_message = cells[cells.len() - 1].inner_html();

        let message = text::collapse_ws(&text::strip(&raw_message));
        if !message.contains(ALERT_MARKER) {
            continue;
        }
        if message.contains(STOP_MARKER) {
            log::debug!("Skipping upstream operational notice row");
            continue;
        }

        let incident_id = incident_re()
            .find(&message)
            .map(|m| m.as_str().to_string());

        // First dispatch for an incident wins; repeats from other units
        // are dropped within the batch.
        if let Some(id) = &incident_id {
            if !seen_ids.insert(id.clone()) {
                continue;
            }
        }

        let timestamp = parse_timestamp(raw_timestamp.trim()).unwrap_or_else(Utc::now);
        let location = location::extract(&message);

        records.push(AlertRecord {
            message,
            timestamp,
            location,
            coordinates: None,
            incident_id,
            source: FeedSource::Pager,
            warning_level: None,
        });
    }

    records
}

/// Parse the feed's `HH:MM:SS YYYY-MM-DD` timestamp at the fixed offset.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%H:%M:%S %Y-%m-%d").ok()?;
    let offset = FixedOffset::east_opt(PAGER_UTC_OFFSET_SECS)?;
    naive
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
