//! NSW incident RSS parser.
//!
//! Items carry a `<georss:point>` with "lat lon" and state their own
//! severity in `<category>`, so no scoring heuristic is needed. The
//! description uses `LABEL: value` pairs separated by `<br/>` variants.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::{AlertRecord, FeedSource, WarningLevel};
use crate::parse::text;

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<item>(.*?)</item>").expect("item regex"))
}

fn point_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<georss:point>\s*(-?[0-9.]+)\s+(-?[0-9.]+)\s*</georss:point>")
            .expect("point regex")
    })
}

fn category_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<category>([^<]*)</category>").expect("category regex"))
}

fn guid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<guid[^>]*>([^<]*)</guid>").expect("guid regex"))
}

fn pub_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<pubDate>([^<]*)</pubDate>").expect("pubDate regex"))
}

fn description_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<description>(.*?)</description>").expect("description regex"))
}

fn location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"LOCATION:\s*([^<]*)").expect("location regex"))
}

/// Parse the NSW incident feed into alert records.
///
/// Items without a parseable `<georss:point>` are dropped; everything else
/// is skipped per item on failure, never aborting the batch.
pub fn parse(xml: &str) -> Vec<AlertRecord> {
    item_re()
        .captures_iter(xml)
        .filter_map(|caps| {
            let item = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            parse_item(item).or_else(|| {
                log::debug!("Skipping NSW RSS item without usable georss point");
                None
            })
        })
        .collect()
}

fn parse_item(item: &str) -> Option<AlertRecord> {
    let point = point_re().captures(item)?;
    let latitude: f64 = point[1].parse().ok()?;
    let longitude: f64 = point[2].parse().ok()?;

    let category = category_re()
        .captures(item)
        .map(|caps| caps[1].trim().to_string())
        .unwrap_or_default();

    let description = description_re()
        .captures(item)
        .map(|caps| unwrap_cdata(caps.get(1).map(|m| m.as_str()).unwrap_or_default()).to_string())
        .unwrap_or_default();

    let location = location_re()
        .captures(&description)
        .map(|caps| text::collapse_ws(&text::strip(caps[1].trim())))
        .filter(|l| !l.is_empty());

    let timestamp = pub_date_re()
        .captures(item)
        .and_then(|caps| DateTime::parse_from_rfc2822(caps[1].trim()).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let incident_id = guid_re()
        .captures(item)
        .map(|caps| caps[1].trim().to_string())
        .filter(|id| !id.is_empty());

    Some(AlertRecord {
        message: text::collapse_ws(&text::strip(&description)),
        timestamp,
        location,
        coordinates: Some((longitude, latitude)),
        incident_id,
        source: FeedSource::NswRss,
        warning_level: Some(warning_level(&category)),
    })
}

/// The feed states its own level; map the category text directly.
pub(crate) fn warning_level(category: &str) -> WarningLevel {
    let category = category.to_lowercase();
    if category.contains("emergency") {
        return WarningLevel::Emergency;
    }
    if category.contains("watch") || category.contains("act") {
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

#[cfg(test)]
mod tests {
    use super::*;

    fn item(category: &str, point: Option<&str>) -> String {
        let point_tag = point
            .map(|p| format!("<georss:point>{p}</georss:point>"))
            .unwrap_or_default();
        format!(
            "<item>\
             <title>Talbingo fire</title>\
             <category>{category}</category>\
             <guid isPermaLink=\"false\">tag:rfs.nsw.gov.au,2024:12345</guid>\
             <pubDate>Mon, 15 Jan 2024 09:30:00 +1100</pubDate>\
             <description><![CDATA[ALERT LEVEL: {category}<br />\
             LOCATION: Talbingo Mountain Rd, Talbingo<br />\
             COUNCIL AREA: Snowy Valleys<br />\
             STATUS: Under control<br />\
             TYPE: Bush Fire<br />\
             SIZE: 120 ha<br />\
             RESPONSIBLE AGENCY: Rural Fire Service<br />\
             UPDATED: 15 Jan 2024 09:15]]></description>\
             {point_tag}\
             </item>"
        )
    }

    fn feed(items: &[String]) -> String {
        format!(
            "<?xml version=\"1.0\"?><rss xmlns:georss=\"http://www.georss.org/georss\">\
             <channel>{}</channel></rss>",
            items.join("")
        )
    }

    #[test]
    fn test_parses_item_with_point() {
        let records = parse(&feed(&[item("Advice", Some("-35.5843 148.2947"))]));

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.source, FeedSource::NswRss);
        // georss order is "lat lon"; records store (lon, lat)
        assert_eq!(record.coordinates, Some((148.2947, -35.5843)));
        assert_eq!(
            record.location.as_deref(),
            Some("Talbingo Mountain Rd, Talbingo")
        );
        assert_eq!(
            record.incident_id.as_deref(),
            Some("tag:rfs.nsw.gov.au,2024:12345")
        );
        assert_eq!(record.warning_level, Some(WarningLevel::Advice));
    }

    #[test]
    fn test_item_without_point_dropped() {
        let records = parse(&feed(&[
            item("Advice", None),
            item("Advice", Some("-35.5843 148.2947")),
        ]));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_unparseable_point_dropped() {
        let records = parse(&feed(&[item("Advice", Some("somewhere east"))]));
        assert!(records.is_empty());
    }

    #[test]
    fn test_category_maps_watch_and_act() {
        let records = parse(&feed(&[item("Watch and Act", Some("-35.0 149.0"))]));
        assert_eq!(records[0].warning_level, Some(WarningLevel::WatchAndAct));
    }

    #[test]
    fn test_category_maps_emergency() {
        let records = parse(&feed(&[item("Emergency Warning", Some("-35.0 149.0"))]));
        assert_eq!(records[0].warning_level, Some(WarningLevel::Emergency));
    }

    #[test]
    fn test_pub_date_parsed_to_utc() {
        let records = parse(&feed(&[item("Advice", Some("-35.0 149.0"))]));
        // 09:30 at +1100 is 22:30 UTC the previous day
        assert_eq!(
            records[0].timestamp.format("%Y-%m-%d %H:%M").to_string(),
            "2024-01-14 22:30"
        );
    }

    #[test]
    fn test_empty_feed_yields_no_records() {
        assert!(parse(&feed(&[])).is_empty());
    }
}
