// src/services/mod.rs

//! Feed coordination and geocoding services.

pub mod feeds;
pub mod geocoder;

pub use feeds::{FeedFetcher, FeedService, HttpFetcher};
pub use geocoder::{GeocodeProvider, Geocoder, HttpGeocodeProvider, Resolution};
