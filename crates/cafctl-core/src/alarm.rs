//! Threshold detection for the alarm schedule.
//!
//! A session fires audible warnings at three points: when 10% of the budget
//! remains, when 5% remains, and once per second through the final ten
//! seconds. Detection lives here as pure state; rendering the sounds is the
//! daemon's job.

use serde::{Deserialize, Serialize};

/// Length of the per-second final countdown window.
pub const FINAL_COUNTDOWN_WINDOW_SECS: u64 = 10;

/// One alarm threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdEvent {
    /// 10% of the budget remains.
    TenPercent,

    /// 5% of the budget remains.
    FivePercent,

    /// `n` seconds remain, `n` in 1..=10.
    FinalSecond(u8),
}

/// Tracks which thresholds have already fired for the current session.
///
/// Each threshold fires at most once per session regardless of tick jitter.
/// For very short sessions several thresholds can cross on the same tick;
/// they are reported in schedule order (ten, five, then final seconds).
#[derive(Debug, Clone, Default)]
pub struct AlarmState {
    ten_percent_fired: bool,
    five_percent_fired: bool,
    final_countdown_running: bool,
    final_fired: [bool; FINAL_COUNTDOWN_WINDOW_SECS as usize],
}

impl AlarmState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the session entered the final ten-second window.
    pub fn in_final_countdown(&self) -> bool {
        self.final_countdown_running
    }

    /// Evaluates one tick and returns the thresholds newly crossed.
    ///
    /// `remaining_secs` may be fractional; a non-positive remaining or total
    /// yields nothing (expiry is handled elsewhere).
    pub fn advance(&mut self, remaining_secs: f64, total_secs: f64) -> Vec<ThresholdEvent> {
        let mut fired = Vec::new();
        if remaining_secs <= 0.0 || total_secs <= 0.0 {
            return fired;
        }

        let percent = remaining_secs / total_secs * 100.0;
        if !self.ten_percent_fired && percent <= 10.0 {
            self.ten_percent_fired = true;
            fired.push(ThresholdEvent::TenPercent);
        }
        if !self.five_percent_fired && percent <= 5.0 {
            self.five_percent_fired = true;
            fired.push(ThresholdEvent::FivePercent);
        }

        if remaining_secs <= FINAL_COUNTDOWN_WINDOW_SECS as f64 {
            self.final_countdown_running = true;
            let n = remaining_secs.ceil() as u64;
            if (1..=FINAL_COUNTDOWN_WINDOW_SECS).contains(&n) {
                let slot = (n - 1) as usize;
                if !self.final_fired[slot] {
                    self.final_fired[slot] = true;
                    fired.push(ThresholdEvent::FinalSecond(n as u8));
                }
            }
        }

        fired
    }

    /// Clears all fired markers for a fresh session.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
