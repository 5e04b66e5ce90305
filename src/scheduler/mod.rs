//! Polling and playback scheduler.
//!
//! A single task owns the current [`FlightMap`], the animation cursor and
//! the reveal state machine. It polls the source on a fixed interval,
//! restarts playback whenever a new map is applied, and publishes a
//! [`ViewSnapshot`] after every change. Nothing else mutates that state.

pub mod playback;
pub mod view;

pub use playback::{Phase, Playback, Timing};
pub use view::ViewSnapshot;

use crate::ingest::FlightSource;
use crate::models::FlightMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior, Sleep};
use tracing::{debug, info, warn};

/// Timer settings for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Period between two polls. The first poll runs immediately.
    pub poll_interval: Duration,
    pub timing: Timing,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(30_000),
            timing: Timing::default(),
        }
    }
}

impl From<&crate::config::ScheduleConfig> for SchedulerConfig {
    fn from(config: &crate::config::ScheduleConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timing: Timing {
                tick: Duration::from_millis(config.tick_interval_ms),
                hour_pause: Duration::from_millis(config.hour_pause_ms),
            },
        }
    }
}

/// Handle to a running scheduler.
///
/// Dropping the handle also stops the scheduler task.
pub struct SchedulerHandle {
    view: watch::Receiver<Arc<ViewSnapshot>>,
    map: watch::Receiver<Arc<FlightMap>>,
    active: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Latest published view.
    pub fn view(&self) -> Arc<ViewSnapshot> {
        self.view.borrow().clone()
    }

    /// Latest applied flight map.
    pub fn flight_map(&self) -> Arc<FlightMap> {
        self.map.borrow().clone()
    }

    /// Receiver that is notified on every published view.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewSnapshot>> {
        self.view.clone()
    }

    /// Stop polling and playback, and wait for the task to exit.
    pub async fn shutdown(self) {
        self.active.store(false, Ordering::SeqCst);
        let _ = self.shutdown.send(true);

        if let Err(e) = self.task.await {
            warn!("Scheduler task ended abnormally: {}", e);
        }
    }
}

/// Start the scheduler on the current tokio runtime.
pub fn spawn(source: Arc<dyn FlightSource>, config: SchedulerConfig) -> SchedulerHandle {
    let (view_tx, view_rx) = watch::channel(Arc::new(ViewSnapshot::loading()));
    let (map_tx, map_rx) = watch::channel(Arc::new(FlightMap::new()));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let active = Arc::new(AtomicBool::new(true));

    let scheduler = Scheduler {
        source,
        config,
        map: Arc::new(FlightMap::new()),
        playback: Playback::new(config.timing),
        loading: true,
        active: active.clone(),
        next_poll: 0,
        applied_poll: None,
        view_tx,
        map_tx,
    };

    let task = tokio::spawn(scheduler.run(shutdown_rx));

    SchedulerHandle {
        view: view_rx,
        map: map_rx,
        active,
        shutdown: shutdown_tx,
        task,
    }
}

/// The single playback deadline.
struct PlaybackTimer {
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl PlaybackTimer {
    fn new() -> Self {
        Self {
            sleep: Box::pin(time::sleep(Duration::ZERO)),
            armed: false,
        }
    }

    /// Replace the pending deadline; `None` disarms it.
    fn set(&mut self, delay: Option<Duration>) {
        match delay {
            Some(delay) => match Instant::now().checked_add(delay) {
                Some(deadline) => {
                    self.sleep.as_mut().reset(deadline);
                    self.armed = true;
                }
                None => {
                    warn!("Playback delay {:?} is out of range; timer left unarmed", delay);
                    self.armed = false;
                }
            },
            None => self.armed = false,
        }
    }
}

struct Scheduler {
    source: Arc<dyn FlightSource>,
    config: SchedulerConfig,
    map: Arc<FlightMap>,
    playback: Playback,
    loading: bool,
    active: Arc<AtomicBool>,
    next_poll: u64,
    applied_poll: Option<u64>,
    view_tx: watch::Sender<Arc<ViewSnapshot>>,
    map_tx: watch::Sender<Arc<FlightMap>>,
}

impl Scheduler {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Scheduler started (poll every {:?}, tick {:?}, pause {:?})",
            self.config.poll_interval,
            self.playback.timing().tick,
            self.playback.timing().hour_pause
        );

        let mut poll_timer = time::interval(self.config.poll_interval);
        poll_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut polls: JoinSet<(u64, FlightMap)> = JoinSet::new();
        let mut timer = PlaybackTimer::new();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => break,

                () = &mut timer.sleep, if timer.armed => {
                    timer.armed = false;
                    self.on_wake(&mut timer);
                }

                Some(joined) = polls.join_next() => match joined {
                    Ok((seq, map)) => self.apply_poll(seq, map, &mut timer),
                    Err(e) => warn!("Poll task failed: {}", e),
                },

                _ = poll_timer.tick() => self.start_poll(&mut polls),
            }
        }

        self.active.store(false, Ordering::SeqCst);
        polls.abort_all();
        info!("Scheduler stopped");
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn start_poll(&mut self, polls: &mut JoinSet<(u64, FlightMap)>) {
        let seq = self.next_poll;
        self.next_poll += 1;

        debug!("Starting poll #{}", seq);
        let poll = self.source.poll();
        polls.spawn(async move { (seq, poll.await) });
    }

    fn apply_poll(&mut self, seq: u64, map: FlightMap, timer: &mut PlaybackTimer) {
        if !self.is_active() {
            return;
        }
        if self.applied_poll.is_some_and(|last| seq < last) {
            debug!("Discarding poll #{} (already applied a newer one)", seq);
            return;
        }

        info!(
            "Poll #{}: {} of {} hours with points, {} points",
            seq,
            map.active_hours().len(),
            map.len(),
            map.total_points()
        );

        self.applied_poll = Some(seq);
        self.loading = false;
        self.map = Arc::new(map);
        self.map_tx.send_replace(self.map.clone());

        timer.set(self.playback.restart(self.map.clone()));
        self.publish();
    }

    fn on_wake(&mut self, timer: &mut PlaybackTimer) {
        if !self.is_active() {
            return;
        }

        timer.set(self.playback.wake());
        self.publish();
    }

    fn publish(&self) {
        let view = ViewSnapshot::derive(
            &self.map,
            self.playback.cursor(),
            self.playback.visible(),
            self.playback.phase(),
            self.loading,
        );
        self.view_tx.send_replace(Arc::new(view));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HourKey, Point};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Source that replays a fixed list of maps, repeating the last one.
    struct ScriptedSource {
        script: Mutex<Vec<(Duration, FlightMap)>>,
        polls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(maps: Vec<FlightMap>) -> Arc<Self> {
            Self::delayed(maps.into_iter().map(|m| (Duration::ZERO, m)).collect())
        }

        fn delayed(script: Vec<(Duration, FlightMap)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                polls: AtomicUsize::new(0),
            })
        }

        fn poll_count(&self) -> usize {
            self.polls.load(Ordering::SeqCst)
        }
    }

    impl FlightSource for ScriptedSource {
        fn poll(&self) -> BoxFuture<'static, FlightMap> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            let (delay, map) = {
                let script = self.script.lock().unwrap();
                script
                    .get(n)
                    .or_else(|| script.last())
                    .cloned()
                    .unwrap_or_default()
            };
            async move {
                time::sleep(delay).await;
                map
            }
            .boxed()
        }
    }

    fn track(hour: u32, n: usize) -> (HourKey, Vec<Point>) {
        let points = (0..n)
            .map(|i| Point {
                lat: hour as f64,
                lon: i as f64,
                time: "2024-01-01T00:00:00Z".to_string(),
            })
            .collect();
        (HourKey::new(hour), points)
    }

    fn map_of(tracks: Vec<(HourKey, Vec<Point>)>) -> FlightMap {
        tracks.into_iter().collect()
    }

    fn fast_config() -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_millis(1000),
            timing: Timing {
                tick: Duration::from_millis(100),
                hour_pause: Duration::from_millis(450),
            },
        }
    }

    async fn advance_to(start: Instant, at_ms: u64) {
        time::sleep_until(start + Duration::from_millis(at_ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_is_loading_before_first_poll() {
        let source = ScriptedSource::new(vec![map_of(vec![track(5, 2)])]);
        let handle = spawn(source, SchedulerConfig::default());

        let view = handle.view();
        assert!(view.loading);
        assert_eq!(view.hour_key, None);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_hour_reveals_and_repeats() {
        let source = ScriptedSource::new(vec![map_of(vec![track(5, 2)])]);
        let start = Instant::now();
        let handle = spawn(source.clone(), SchedulerConfig::default());

        advance_to(start, 100).await;
        let view = handle.view();
        assert!(!view.loading);
        assert_eq!(view.hour_key, Some(HourKey::new(5)));
        assert_eq!(view.hour, Some(5));
        assert_eq!(view.current_points.len(), 2);
        assert!(view.visible_points.is_empty());

        advance_to(start, 300).await;
        assert_eq!(handle.view().visible_points.len(), 1);

        advance_to(start, 500).await;
        assert_eq!(handle.view().visible_points.len(), 2);

        advance_to(start, 3000).await;
        let view = handle.view();
        assert_eq!(view.visible_points.len(), 2);
        assert_eq!(view.phase, Phase::Pausing { next_pointer: 0 });

        // Hour completes at 0.6s, pause ends at 5.6s and the same hour
        // starts over; its first point appears one tick later at 5.8s.
        advance_to(start, 5650).await;
        assert!(handle.view().visible_points.is_empty());
        advance_to(start, 5850).await;
        assert_eq!(handle.view().visible_points.len(), 1);

        assert_eq!(source.poll_count(), 1);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_map_idles() {
        let source = ScriptedSource::new(vec![map_of(vec![track(0, 0), track(1, 0)])]);
        let start = Instant::now();
        let handle = spawn(source, fast_config());

        advance_to(start, 500).await;
        let view = handle.view();
        assert!(!view.loading);
        assert_eq!(view.hour_key, None);
        assert_eq!(view.phase, Phase::Idle);
        assert!(view.visible_points.is_empty());
        assert_eq!(handle.flight_map().len(), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_restarts_playback_with_single_timer() {
        let first = map_of(vec![track(0, 3)]);
        let second = map_of(vec![track(1, 1), track(2, 1)]);
        let source = ScriptedSource::new(vec![first, second.clone()]);
        let start = Instant::now();
        let handle = spawn(source.clone(), fast_config());

        advance_to(start, 250).await;
        assert_eq!(handle.view().visible_points.len(), 2);

        // Hour 0 completes at 400ms, restarts at 850ms; poll at 1000ms
        // replaces the map mid-reveal.
        advance_to(start, 1020).await;
        let view = handle.view();
        assert_eq!(source.poll_count(), 2);
        assert_eq!(*handle.flight_map(), second);
        assert_eq!(
            view.phase,
            Phase::Revealing {
                hour: HourKey::new(1),
                revealed: 0
            }
        );
        assert!(view.visible_points.is_empty());

        // A leftover timer from the abandoned cycle would have moved further.
        advance_to(start, 1150).await;
        assert_eq!(handle.view().visible_points.len(), 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_label_follows_cursor_not_revealed_track() {
        let map = map_of(vec![track(1, 1), track(2, 1)]);
        let source = ScriptedSource::new(vec![map.clone()]);
        let start = Instant::now();
        let handle = spawn(source, fast_config());

        // Hour 1 completes at 200ms and the cursor moves on, while the
        // completed track stays visible during the pause.
        advance_to(start, 300).await;
        let view = handle.view();
        assert_eq!(view.cursor.pointer_index, 1);
        assert_eq!(view.hour_key, Some(HourKey::new(2)));
        assert_eq!(view.visible_points, map.get(&HourKey::new(1)).unwrap());
        assert_eq!(view.current_points, map.get(&HourKey::new(2)).unwrap());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_hours_advance_in_order_and_wrap() {
        let source = ScriptedSource::new(vec![map_of(vec![track(3, 1), track(8, 1)])]);
        let start = Instant::now();
        let config = SchedulerConfig {
            poll_interval: Duration::from_secs(3600),
            ..fast_config()
        };
        let handle = spawn(source, config);

        let mut seen = Vec::new();
        // Each hour: begin, 100ms tick, 200ms completion, 450ms pause.
        for at in [50, 700, 1350] {
            advance_to(start, at).await;
            if let Phase::Revealing { hour, .. } = handle.view().phase {
                seen.push(hour);
            }
        }
        assert_eq!(seen, vec![HourKey::new(3), HourKey::new(8), HourKey::new(3)]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_poll_is_discarded() {
        let old = map_of(vec![track(0, 1)]);
        let new = map_of(vec![track(9, 1)]);
        let source = ScriptedSource::delayed(vec![
            (Duration::from_secs(45), old),
            (Duration::ZERO, new.clone()),
            (Duration::from_secs(3600), FlightMap::new()),
        ]);
        let start = Instant::now();
        let handle = spawn(source, SchedulerConfig::default());

        advance_to(start, 31_000).await;
        assert_eq!(*handle.flight_map(), new);

        advance_to(start, 50_000).await;
        assert_eq!(*handle.flight_map(), new);
        assert_eq!(handle.view().hour_key, Some(HourKey::new(9)));

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_delay_leaves_timer_unarmed() {
        let mut timer = PlaybackTimer::new();
        timer.set(Some(Duration::from_millis(5)));
        assert!(timer.armed);

        timer.set(Some(Duration::MAX));
        assert!(!timer.armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_pause_keeps_scheduler_running() {
        let source = ScriptedSource::new(vec![map_of(vec![track(0, 1)])]);
        let start = Instant::now();
        let config = SchedulerConfig {
            timing: Timing {
                tick: Duration::from_millis(100),
                hour_pause: Duration::MAX,
            },
            ..fast_config()
        };
        let handle = spawn(source.clone(), config);

        advance_to(start, 500).await;
        assert_eq!(handle.view().phase, Phase::Pausing { next_pointer: 0 });

        // The next poll still lands and restarts the hour.
        advance_to(start, 1050).await;
        assert_eq!(source.poll_count(), 2);
        assert_eq!(
            handle.view().phase,
            Phase::Revealing {
                hour: HourKey::new(0),
                revealed: 0
            }
        );

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_polling_and_publishing() {
        let source = ScriptedSource::new(vec![map_of(vec![track(0, 5)])]);
        let start = Instant::now();
        let handle = spawn(source.clone(), fast_config());
        let views = handle.subscribe();

        advance_to(start, 150).await;
        let before = views.borrow().clone();

        handle.shutdown().await;
        advance_to(start, 10_000).await;

        assert_eq!(source.poll_count(), 1);
        assert_eq!(*views.borrow(), before);
    }
}
