//! Victoria incident RSS parser.
//!
//! Each `<item>` carries a `<description>` of `<strong>Field:</strong>
//! value<br>` pairs. The feed embeds its own coordinates; items without
//! them are useless to the map and are dropped rather than geocoded. The
//! feed states no severity, so a warning level is derived from status,
//! incident type, size and vehicle count.

use std::collections::HashMap;
use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use regex::Regex;

use crate::models::{AlertRecord, FeedSource, WarningLevel};
use crate::parse::text;

// Vehicle-count and size thresholds are reproducible constants carried
// over from the established feed behavior, not tuned values.
const BUSY_VEHICLES: u32 = 10;
const MAJOR_VEHICLES: u32 = 20;

// Feed timestamps share the pager feed's fixed UTC+11 convention.
const FEED_UTC_OFFSET_SECS: i32 = 11 * 3600;

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<item>(.*?)</item>").expect("item regex"))
}

fn description_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<description>(.*?)</description>").expect("description regex"))
}

fn field_pair_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<strong>\s*([^<:]+?)\s*:?\s*</strong>\s*:?\s*([^<]*)").expect("field regex")
    })
}

/// Parse the Victoria incident feed into alert records.
///
/// Malformed items are skipped individually; one bad item never aborts the
/// batch.
pub fn parse(xml: &str) -> Vec<AlertRecord> {
    item_re()
        .captures_iter(xml)
        .filter_map(|caps| {
            let item = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            parse_item(item).or_else(|| {
                log::debug!("Skipping Victoria RSS item without usable coordinates");
                None
            })
        })
        .collect()
}

fn parse_item(item: &str) -> Option<AlertRecord> {
    let description = description_re().captures(item)?;
    let description = unwrap_cdata(description.get(1)?.as_str());
    let fields = parse_fields(description);

    // This feed is only useful when it supplies its own coordinates.
    let latitude: f64 = fields.get("Latitude")?.parse().ok()?;
    let longitude: f64 = fields.get("Longitude")?.parse().ok()?;

    let vehicles: u32 = fields
        .get("Vehicles")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let warning = warning_level(
        fields.get("Status").map(String::as_str).unwrap_or(""),
        fields.get("Type").map(String::as_str).unwrap_or(""),
        fields.get("Size").map(String::as_str).unwrap_or(""),
        vehicles,
    );

    let timestamp = fields
        .get("Date/Time")
        .and_then(|raw| parse_timestamp(raw))
        .unwrap_or_else(Utc::now);

    Some(AlertRecord {
        message: text::collapse_ws(&text::strip(description)),
        timestamp,
        location: fields.get("Location").filter(|l| !l.is_empty()).cloned(),
        coordinates: Some((longitude, latitude)),
        incident_id: fields.get("Incident No").filter(|v| !v.is_empty()).cloned(),
        source: FeedSource::VicRss,
        warning_level: Some(warning),
    })
}

/// Collect `<strong>Field:</strong> value` pairs into a lookup table.
fn parse_fields(description: &str) -> HashMap<String, String> {
    field_pair_re()
        .captures_iter(description)
        .map(|caps| {
            let key = text::collapse_ws(caps[1].trim());
            let value = text::collapse_ws(&text::strip(caps[2].trim()));
            (key, value)
        })
        .collect()
}

/// Derive a warning level in fixed priority order.
pub(crate) fn warning_level(status: &str, kind: &str, size: &str, vehicles: u32) -> WarningLevel {
    let status = status.to_uppercase();
    let kind = kind.to_uppercase();
    let size = size.to_uppercase();

    if status.contains("EMERGENCY") {
        return WarningLevel::Emergency;
    }
    if status.contains("WATCH") || status.contains("ACT") {
        return WarningLevel::WatchAndAct;
    }
    if kind == "BUSHFIRE" && (size == "UNKNOWN" || vehicles > BUSY_VEHICLES) {
        return WarningLevel::WatchAndAct;
    }
    if size == "LARGE" || vehicles > MAJOR_VEHICLES {
        return WarningLevel::WatchAndAct;
    }
    WarningLevel::Advice
}

fn unwrap_cdata(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(trimmed)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, "%d/%m/%Y %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%d/%m/%Y %H:%M"))
        .ok()?;
    let offset = FixedOffset::east_opt(FEED_UTC_OFFSET_SECS)?;
    naive
        .and_local_timezone(offset)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
