//! Data models for the track replayer.
//!
//! This module contains the core data structures shared by ingestion,
//! the playback scheduler and the HTTP layer.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A single normalized position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Latitude in degrees. Always finite.
    pub lat: f64,
    /// Longitude in degrees. Always finite.
    pub lon: f64,
    /// Upstream timestamp, or the processing time when upstream had none.
    pub time: String,
}

/// Identifier of one upstream source, derived from its numeric suffix.
///
/// Displays and serializes as `hour_<NN>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HourKey(u32);

impl HourKey {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Numeric suffix index (0 for `hour_00`).
    pub fn index(&self) -> u32 {
        self.0
    }

    /// Zero-padded suffix used in upstream URLs.
    pub fn suffix(&self) -> String {
        format!("{:02}", self.0)
    }
}

impl fmt::Display for HourKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hour_{:02}", self.0)
    }
}

/// Error returned when a string is not of the form `hour_<digits>`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid hour key: {0:?}")]
pub struct ParseHourKeyError(String);

impl FromStr for HourKey {
    type Err = ParseHourKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("hour_")
            .filter(|d| !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()))
            .ok_or_else(|| ParseHourKeyError(s.to_string()))?;

        digits
            .parse::<u32>()
            .map(HourKey)
            .map_err(|_| ParseHourKeyError(s.to_string()))
    }
}

impl Serialize for HourKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HourKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Mapping from hour key to its ordered point sequence.
///
/// Keys iterate in suffix order (`hour_00` first). A key with an empty
/// sequence means the source answered with an array that held no usable
/// points; a missing key means the source could not be read at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlightMap(BTreeMap<HourKey, Vec<Point>>);

impl FlightMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: HourKey, points: Vec<Point>) {
        self.0.insert(key, points);
    }

    pub fn get(&self, key: &HourKey) -> Option<&[Point]> {
        self.0.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&HourKey, &Vec<Point>)> {
        self.0.iter()
    }

    /// Keys whose sequence is non-empty, in suffix order.
    pub fn active_hours(&self) -> Vec<HourKey> {
        self.iter()
            .filter(|(_, points)| !points.is_empty())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Total number of points across all hours.
    pub fn total_points(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl FromIterator<(HourKey, Vec<Point>)> for FlightMap {
    fn from_iter<I: IntoIterator<Item = (HourKey, Vec<Point>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Position of the playback loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AnimationCursor {
    /// Index into the active hour list, resolved modulo its length.
    pub pointer_index: usize,
    /// Number of leading points of the current track that are visible.
    pub revealed_count: usize,
}
