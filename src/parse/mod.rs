// src/parse/mod.rs

//! Feed payload parsing.
//!
//! Pure functions from raw feed bytes to alert records, one module per
//! dialect plus the shared text cleanup and location extraction helpers.

pub mod location;
pub mod nsw;
pub mod pager;
pub mod text;
pub mod vic;

use crate::models::{AlertRecord, FeedSource};

/// Parse a raw payload with the dialect belonging to `source`.
pub fn parse_payload(source: FeedSource, payload: &str) -> Vec<AlertRecord> {
    match source {
        FeedSource::Pager => pager::parse(payload),
        FeedSource::VicRss => vic::parse(payload),
        FeedSource::NswRss => nsw::parse(payload),
    }
}
