//! Playhead updates for the UI at a bounded rate.
//!
//! One [`UiSyncBridge`] serves every listener. The host calls
//! [`UiSyncBridge::on_frame`] from its frame callback; the bridge samples
//! the transport at most `max_fps` times per second and notifies listeners
//! only when the `(current_step, is_playing)` pair changes. With no
//! listeners, or once playback has stopped, the bridge disarms and makes no
//! transport calls until [`UiSyncBridge::wake`] is called.

use crate::pattern::STEPS_PER_PATTERN;
use crate::transport::Transport;
use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Upper bound on the playhead refresh rate.
pub const MAX_UI_FPS: f32 = 60.0;

/// Playhead refresh settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Refresh rate in normal mode.
    pub max_fps: f32,
    /// Refresh rate when reduced motion is on.
    pub reduced_motion_fps: f32,
    pub reduced_motion: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            max_fps: 60.0,
            reduced_motion_fps: 30.0,
            reduced_motion: false,
        }
    }
}

impl UiConfig {
    pub fn sanitize(&mut self) {
        self.max_fps = clamp_fps(self.max_fps, MAX_UI_FPS);
        self.reduced_motion_fps = clamp_fps(self.reduced_motion_fps, self.max_fps);
    }

    /// Minimum time between transport samples.
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.reduced_motion {
            self.reduced_motion_fps
        } else {
            self.max_fps
        };
        Duration::from_secs_f64(1.0 / clamp_fps(fps, MAX_UI_FPS) as f64)
    }
}

fn clamp_fps(fps: f32, max: f32) -> f32 {
    if fps.is_finite() {
        fps.clamp(1.0, max)
    } else {
        max
    }
}

/// What listeners see.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayheadSnapshot {
    /// Step under the playhead, `None` when stopped.
    pub current_step: Option<usize>,
    pub is_playing: bool,
}

/// Handle returned by [`UiSyncBridge::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

enum Listener {
    Callback(Box<dyn FnMut(PlayheadSnapshot)>),
    Channel(Sender<PlayheadSnapshot>),
}

impl Listener {
    /// Deliver a snapshot. Returns `false` if the listener is gone.
    fn deliver(&mut self, snapshot: PlayheadSnapshot) -> bool {
        match self {
            Listener::Callback(callback) => {
                callback(snapshot);
                true
            }
            Listener::Channel(tx) => tx.send(snapshot).is_ok(),
        }
    }
}

/// Shared, rate-limited playhead ticker.
pub struct UiSyncBridge {
    config: UiConfig,
    listeners: Vec<(ListenerId, Listener)>,
    next_id: u64,
    armed: bool,
    last_poll: Option<Instant>,
    last_snapshot: Option<PlayheadSnapshot>,
}

impl Default for UiSyncBridge {
    fn default() -> Self {
        Self::new(UiConfig::default())
    }
}

impl UiSyncBridge {
    pub fn new(mut config: UiConfig) -> Self {
        config.sanitize();
        Self {
            config,
            listeners: Vec::new(),
            next_id: 0,
            armed: false,
            last_poll: None,
            last_snapshot: None,
        }
    }

    pub fn config(&self) -> &UiConfig {
        &self.config
    }

    pub fn set_reduced_motion(&mut self, reduced: bool) {
        self.config.reduced_motion = reduced;
    }

    pub fn frame_interval(&self) -> Duration {
        self.config.frame_interval()
    }

    /// Whether the next frame will sample the transport.
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Last snapshot delivered to listeners.
    pub fn last_snapshot(&self) -> Option<PlayheadSnapshot> {
        self.last_snapshot
    }

    /// Register a callback listener.
    pub fn subscribe<F>(&mut self, callback: F) -> ListenerId
    where
        F: FnMut(PlayheadSnapshot) + 'static,
    {
        self.add(Listener::Callback(Box::new(callback)))
    }

    /// Register a channel listener. Dropping the receiver unsubscribes it.
    pub fn subscribe_channel(&mut self) -> (ListenerId, Receiver<PlayheadSnapshot>) {
        let (tx, rx) = unbounded();
        (self.add(Listener::Channel(tx)), rx)
    }

    fn add(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, listener));
        // New listeners want the current state, even if it did not change.
        self.last_snapshot = None;
        self.wake();
        id
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        if self.listeners.is_empty() {
            self.disarm();
        }
        self.listeners.len() != before
    }

    /// Re-arm the ticker (call on transport start).
    pub fn wake(&mut self) {
        if !self.listeners.is_empty() && !self.armed {
            log::trace!("ui sync: armed");
            self.armed = true;
            self.last_poll = None;
        }
    }

    fn disarm(&mut self) {
        if self.armed {
            log::trace!("ui sync: idle");
        }
        self.armed = false;
    }

    /// Drive the bridge from the host's frame callback.
    ///
    /// Returns `true` if listeners were notified.
    pub fn on_frame<T: Transport + ?Sized>(&mut self, now: Instant, transport: &T) -> bool {
        if !self.armed {
            return false;
        }
        if self.listeners.is_empty() {
            self.disarm();
            return false;
        }
        if let Some(last) = self.last_poll {
            if now.saturating_duration_since(last) < self.frame_interval() {
                return false;
            }
        }
        self.last_poll = Some(now);

        let is_playing = transport.is_playing();
        let current_step = if is_playing {
            let ticks_per_step = transport.ticks_per_step().max(1);
            Some(((transport.current_tick() / ticks_per_step) % STEPS_PER_PATTERN as u64) as usize)
        } else {
            None
        };
        let snapshot = PlayheadSnapshot {
            current_step,
            is_playing,
        };

        let changed = self.last_snapshot != Some(snapshot);
        if changed {
            self.last_snapshot = Some(snapshot);
            self.listeners
                .retain_mut(|(_, listener)| listener.deliver(snapshot));
        }

        if !is_playing || self.listeners.is_empty() {
            self.disarm();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct CountingTransport {
        tick: Cell<u64>,
        playing: Cell<bool>,
        calls: Cell<u32>,
    }

    impl CountingTransport {
        fn playing_at_step(step: u64) -> Self {
            let t = Self::default();
            t.tick.set(step * 24);
            t.playing.set(true);
            t
        }

        fn bump(&self) {
            self.calls.set(self.calls.get() + 1);
        }
    }

    impl Transport for CountingTransport {
        fn current_tick(&self) -> u64 {
            self.bump();
            self.tick.get()
        }
        fn ticks_per_step(&self) -> u64 {
            self.bump();
            24
        }
        fn bpm(&self) -> f64 {
            self.bump();
            120.0
        }
        fn is_playing(&self) -> bool {
            self.bump();
            self.playing.get()
        }
        fn start(&mut self) {
            self.playing.set(true);
        }
        fn stop(&mut self) {
            self.playing.set(false);
        }
    }

    fn frame(i: u32) -> Duration {
        Duration::from_millis(17 * i as u64)
    }

    #[test]
    fn test_idle_bridge_makes_no_transport_calls() {
        let transport = CountingTransport::playing_at_step(0);
        let mut bridge = UiSyncBridge::default();
        let t0 = Instant::now();
        for i in 0..10 {
            bridge.on_frame(t0 + frame(i), &transport);
        }
        assert_eq!(transport.calls.get(), 0);

        let id = bridge.subscribe(|_| {});
        bridge.on_frame(t0 + frame(10), &transport);
        assert!(transport.calls.get() > 0);

        assert!(bridge.unsubscribe(id));
        let calls = transport.calls.get();
        for i in 11..100 {
            bridge.on_frame(t0 + frame(i), &transport);
        }
        assert_eq!(transport.calls.get(), calls);
        assert!(!bridge.is_armed());
    }

    #[test]
    fn test_notifies_only_on_change() {
        let transport = CountingTransport::playing_at_step(3);
        let mut bridge = UiSyncBridge::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bridge.subscribe(move |snap| sink.borrow_mut().push(snap.current_step));

        let t0 = Instant::now();
        assert!(bridge.on_frame(t0, &transport));
        assert!(!bridge.on_frame(t0 + frame(1), &transport));
        transport.tick.set(4 * 24);
        assert!(bridge.on_frame(t0 + frame(2), &transport));
        // Step 20 shows as step 4 of the next bar: no change.
        transport.tick.set(20 * 24);
        assert!(!bridge.on_frame(t0 + frame(3), &transport));

        assert_eq!(*seen.borrow(), vec![Some(3), Some(4)]);
    }

    #[test]
    fn test_rate_limit() {
        let transport = CountingTransport::playing_at_step(0);
        let mut bridge = UiSyncBridge::default();
        let (_id, rx) = bridge.subscribe_channel();
        let t0 = Instant::now();
        bridge.on_frame(t0, &transport);
        transport.tick.set(24);
        // 5 ms later is inside the 60 Hz interval.
        assert!(!bridge.on_frame(t0 + Duration::from_millis(5), &transport));
        assert!(bridge.on_frame(t0 + Duration::from_millis(17), &transport));
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_reduced_motion_halves_rate() {
        let transport = CountingTransport::playing_at_step(0);
        let mut bridge = UiSyncBridge::default();
        bridge.set_reduced_motion(true);
        assert!(bridge.frame_interval() > Duration::from_millis(33));
        let (_id, rx) = bridge.subscribe_channel();
        let t0 = Instant::now();
        bridge.on_frame(t0, &transport);
        transport.tick.set(24);
        assert!(!bridge.on_frame(t0 + Duration::from_millis(20), &transport));
        assert!(bridge.on_frame(t0 + Duration::from_millis(34), &transport));
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn test_stop_disarms_until_wake() {
        let transport = CountingTransport::playing_at_step(0);
        let mut bridge = UiSyncBridge::default();
        let (_id, rx) = bridge.subscribe_channel();
        let t0 = Instant::now();
        bridge.on_frame(t0, &transport);

        transport.playing.set(false);
        bridge.on_frame(t0 + frame(1), &transport);
        assert!(!bridge.is_armed());
        let calls = transport.calls.get();
        bridge.on_frame(t0 + frame(2), &transport);
        assert_eq!(transport.calls.get(), calls);

        transport.playing.set(true);
        bridge.wake();
        assert!(bridge.on_frame(t0 + frame(3), &transport));
        let snaps: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            snaps,
            vec![
                PlayheadSnapshot { current_step: Some(0), is_playing: true },
                PlayheadSnapshot { current_step: None, is_playing: false },
                PlayheadSnapshot { current_step: Some(0), is_playing: true },
            ]
        );
    }

    #[test]
    fn test_dropped_receiver_unsubscribes() {
        let transport = CountingTransport::playing_at_step(0);
        let mut bridge = UiSyncBridge::default();
        let (_id, rx) = bridge.subscribe_channel();
        drop(rx);
        bridge.on_frame(Instant::now(), &transport);
        assert_eq!(bridge.listener_count(), 0);
        assert!(!bridge.is_armed());
    }

    #[test]
    fn test_fps_is_capped() {
        let bridge = UiSyncBridge::new(UiConfig {
            max_fps: 240.0,
            reduced_motion_fps: 120.0,
            reduced_motion: false,
        });
        assert_eq!(bridge.config().max_fps, 60.0);
        assert_eq!(bridge.config().reduced_motion_fps, 60.0);
    }
}
