//! Read-only snapshot handed to the display surface.

use crate::models::{AnimationCursor, FlightMap, HourKey, Point};
use crate::scheduler::Phase;
use serde::Serialize;

/// What a renderer needs for one frame.
///
/// `hour_key` and `current_points` are resolved against the latest map,
/// while `visible_points` come from the track the reveal loop captured.
/// After a refresh reorders the active hours the two may name different
/// hours until the next cycle begins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    /// True until the first poll has been applied.
    pub loading: bool,
    pub hour_key: Option<HourKey>,
    /// Numeric label of `hour_key`.
    pub hour: Option<u32>,
    pub visible_points: Vec<Point>,
    pub current_points: Vec<Point>,
    pub latest_point: Option<Point>,
    pub cursor: AnimationCursor,
    pub phase: Phase,
}

impl ViewSnapshot {
    pub fn loading() -> Self {
        Self {
            loading: true,
            hour_key: None,
            hour: None,
            visible_points: Vec::new(),
            current_points: Vec::new(),
            latest_point: None,
            cursor: AnimationCursor::default(),
            phase: Phase::Idle,
        }
    }

    pub fn derive(
        map: &FlightMap,
        cursor: AnimationCursor,
        visible: &[Point],
        phase: &Phase,
        loading: bool,
    ) -> Self {
        let hour_key = current_hour(map, cursor.pointer_index);
        let current_points = hour_key
            .and_then(|key| map.get(&key))
            .map(<[Point]>::to_vec)
            .unwrap_or_default();

        Self {
            loading,
            hour_key,
            hour: hour_key.map(|key| key.index()),
            visible_points: visible.to_vec(),
            current_points,
            latest_point: visible.last().cloned(),
            cursor,
            phase: phase.clone(),
        }
    }
}

/// Hour shown for `pointer` against `map`, if any hour has points.
pub fn current_hour(map: &FlightMap, pointer: usize) -> Option<HourKey> {
    let hours = map.active_hours();
    if hours.is_empty() {
        return None;
    }
    Some(hours[pointer % hours.len()])
}
