//! Hour-by-hour reveal state machine.
//!
//! The machine is driven from outside: every transition returns the delay
//! until it wants to be woken again, and the owner keeps exactly one timer
//! armed for that delay. Restarting simply replaces the state, so a stale
//! wake-up can never belong to an abandoned cycle.

use crate::models::{AnimationCursor, FlightMap, HourKey, Point};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Timer periods for the reveal loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Period between two reveal steps within an hour.
    pub tick: Duration,
    /// Pause after an hour is fully revealed.
    pub hour_pause: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(200),
            hour_pause: Duration::from_millis(5000),
        }
    }
}

/// Where the reveal loop currently is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Phase {
    /// No hour has points; nothing is scheduled.
    Idle,
    /// Revealing `hour`; `revealed` ticks have elapsed since it began.
    Revealing { hour: HourKey, revealed: usize },
    /// Waiting before `next_pointer` begins.
    Pausing { next_pointer: usize },
}

#[derive(Debug)]
pub struct Playback {
    timing: Timing,
    /// Active hours captured at the last restart.
    hours: Vec<HourKey>,
    /// Map captured at the last restart.
    snapshot: Arc<FlightMap>,
    /// Track of the hour being revealed, captured when it began.
    track: Arc<[Point]>,
    visible_len: usize,
    /// Loop-local pointer.
    pointer: usize,
    /// Pointer persisted after each completed hour; survives restarts.
    cursor: usize,
    phase: Phase,
}

impl Playback {
    pub fn new(timing: Timing) -> Self {
        Self {
            timing,
            hours: Vec::new(),
            snapshot: Arc::new(FlightMap::new()),
            track: Arc::from(Vec::new()),
            visible_len: 0,
            pointer: 0,
            cursor: 0,
            phase: Phase::Idle,
        }
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Points currently exposed to the display.
    pub fn visible(&self) -> &[Point] {
        &self.track[..self.visible_len]
    }

    pub fn cursor(&self) -> AnimationCursor {
        AnimationCursor {
            pointer_index: self.cursor,
            revealed_count: self.visible_len,
        }
    }

    /// Abandon the current cycle and start over against `map`.
    ///
    /// The persisted cursor is carried over and reduced modulo the new
    /// number of active hours, so a shrinking hour list reindexes it.
    /// Returns the delay until the next wake, or `None` when idle.
    pub fn restart(&mut self, map: Arc<FlightMap>) -> Option<Duration> {
        self.hours = map.active_hours();
        self.snapshot = map;

        if self.hours.is_empty() {
            debug!("No hour has points; playback idle");
            self.stop();
            return None;
        }

        self.pointer = self.cursor % self.hours.len();
        Some(self.begin_hour())
    }

    /// Advance one step after the previously returned delay has elapsed.
    pub fn wake(&mut self) -> Option<Duration> {
        match self.phase {
            Phase::Idle => None,
            Phase::Pausing { .. } => Some(self.begin_hour()),
            Phase::Revealing { hour, revealed } => {
                let revealed = revealed + 1;

                if revealed > self.track.len() {
                    self.visible_len = self.track.len();
                    self.pointer = (self.pointer + 1) % self.hours.len();
                    self.cursor = self.pointer;
                    self.phase = Phase::Pausing {
                        next_pointer: self.pointer,
                    };
                    debug!("{} fully revealed; next pointer {}", hour, self.pointer);
                    Some(self.timing.hour_pause)
                } else {
                    self.visible_len = revealed;
                    self.phase = Phase::Revealing { hour, revealed };
                    Some(self.timing.tick)
                }
            }
        }
    }

    /// Cancel everything and clear the visible points.
    ///
    /// Going idle intentionally drops the last frame instead of leaving the
    /// previous track on screen; the persisted cursor is kept.
    pub fn stop(&mut self) {
        self.hours.clear();
        self.track = Arc::from(Vec::new());
        self.visible_len = 0;
        self.phase = Phase::Idle;
    }

    fn begin_hour(&mut self) -> Duration {
        let hour = self.hours[self.pointer % self.hours.len()];
        let track = self.snapshot.get(&hour).unwrap_or_default();

        if track.is_empty() {
            // Only reachable if the captured hour list and snapshot disagree.
            self.pointer = (self.pointer + 1) % self.hours.len();
            self.phase = Phase::Pausing {
                next_pointer: self.pointer,
            };
            debug!("{} has no points; skipping", hour);
            return self.timing.hour_pause;
        }

        debug!("Revealing {} ({} points)", hour, track.len());
        self.track = Arc::from(track);
        self.visible_len = 0;
        self.phase = Phase::Revealing { hour, revealed: 0 };
        self.timing.tick
    }
}
