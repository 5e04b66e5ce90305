//! Upstream ingestion.
//!
//! Fetches every hourly source concurrently and normalizes the payloads
//! into a [`FlightMap`](crate::models::FlightMap).

pub mod fetcher;
pub mod normalize;

pub use fetcher::{FeedClient, FeedConfig};

use crate::models::FlightMap;
use futures::future::BoxFuture;

/// Something that can produce a fresh flight map on demand.
///
/// Implementations must never fail: unreadable sources are simply absent
/// from the returned map.
pub trait FlightSource: Send + Sync + 'static {
    fn poll(&self) -> BoxFuture<'static, FlightMap>;
}
