//! Adaptive send-rate control.
//!
//! Drives one channel's send cadence between a fast and a slow
//! interval from smoothed RTT samples, with hysteresis so a noisy link
//! does not flap between rates. Deterministic: a pure function of the
//! (RTT, timestamp) sequence fed to it, with no internal clock reads
//! and no packet history.

use std::time::{Duration, Instant};

use crate::core::{
    CONGESTION_RTT_THRESHOLD, FAST_SEND_INTERVAL, MIN_STABLE_TIME, SLOW_SEND_INTERVAL,
    SWITCH_THRESHOLD_INITIAL, SWITCH_THRESHOLD_MAX, SWITCH_THRESHOLD_MIN,
};

/// Hysteresis controller for one channel's send cadence.
///
/// State: the current rate mode, an adaptive switch threshold in
/// `[1s, 60s]`, a stopwatch measuring time in the current mode, and a
/// stopwatch measuring how long RTT has stayed calm while congested.
#[derive(Debug, Clone)]
pub struct SendRateController {
    congested: bool,
    switch_threshold: Duration,
    /// Time-in-mode stopwatch; also restarted when a stability window
    /// completes, so each halving requires a full new window.
    mode_since: Instant,
    /// Cleared once the threshold reaches its floor.
    tracking_stability: bool,
    /// Runs while RTT stays below the threshold during congestion.
    calm_since: Option<Instant>,
}

impl SendRateController {
    /// Create a controller starting in the fast (non-congested) mode.
    pub fn new(now: Instant) -> Self {
        Self {
            congested: false,
            switch_threshold: SWITCH_THRESHOLD_INITIAL,
            mode_since: now,
            tracking_stability: true,
            calm_since: None,
        }
    }

    /// Feed one inbound-packet event: the current smoothed RTT and the
    /// packet's arrival time.
    pub fn on_packet(&mut self, rtt: Duration, now: Instant) {
        if self.congested {
            if rtt > CONGESTION_RTT_THRESHOLD {
                // Still congested; the calm stopwatch starts over.
                self.calm_since = None;
                return;
            }
            let calm_since = *self.calm_since.get_or_insert(now);
            if now.duration_since(calm_since) >= self.switch_threshold {
                self.congested = false;
                self.mode_since = now;
                self.tracking_stability = true;
                self.calm_since = None;
            }
        } else if rtt > CONGESTION_RTT_THRESHOLD {
            let stint = now.duration_since(self.mode_since);
            if stint < MIN_STABLE_TIME {
                // Flapping: take longer to trust the link next time.
                self.switch_threshold =
                    (self.switch_threshold * 2).min(SWITCH_THRESHOLD_MAX);
            }
            self.congested = true;
            self.mode_since = now;
            self.calm_since = None;
        } else if self.tracking_stability
            && now.duration_since(self.mode_since) > self.switch_threshold
        {
            // A full threshold of stability earns a faster recovery.
            self.switch_threshold = (self.switch_threshold / 2).max(SWITCH_THRESHOLD_MIN);
            self.mode_since = now;
            if self.switch_threshold == SWITCH_THRESHOLD_MIN {
                self.tracking_stability = false;
            }
        }
    }

    /// The interval the channel should currently wait between sends.
    pub fn send_interval(&self) -> Duration {
        if self.congested {
            SLOW_SEND_INTERVAL
        } else {
            FAST_SEND_INTERVAL
        }
    }

    /// Whether the controller is in the congested (slow) mode.
    pub fn is_congested(&self) -> bool {
        self.congested
    }

    /// The active switch threshold.
    pub fn switch_threshold(&self) -> Duration {
        self.switch_threshold
    }
}
