//! Learning rate schedules.

use serde::{Deserialize, Serialize};

use crate::real;

/// The rate never decays below this fraction of the starting rate.
pub const MIN_RATE_FRACTION: real = 1e-4;

/// word2vec's schedule: decay linearly with the number of words processed
/// over all epochs.
pub fn linear_decay(rate0: real, words_seen: u64, total_words: u64, epochs: usize) -> real {
    let progress = words_seen as real / (epochs as u64 * total_words + 1) as real;
    (rate0 * (1.0 - progress)).max(rate0 * MIN_RATE_FRACTION)
}

/// Linear decay in whole steps: the rate for step `step` of `total_steps`.
pub fn interval_decay(rate0: real, step: usize, total_steps: usize) -> real {
    if total_steps == 0 {
        return rate0;
    }
    let remaining = total_steps.saturating_sub(step) as real / total_steps as real;
    (rate0 * remaining).max(rate0 * MIN_RATE_FRACTION)
}

pub fn multiplicative_decay(rate: real, factor: real) -> real {
    rate - rate * factor
}

/// "Bold driver": halve the rate when the error went up, grow it by 5%
/// when it went down.
pub fn bold_update(rate: real, prev_err: f64, err: f64) -> real {
    if err > prev_err {
        rate * 0.5
    } else if err < prev_err {
        rate * 1.05
    } else {
        rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Schedule {
    /// `linear_decay`, updated every 10,000 words.
    #[default]
    Linear,
    /// `interval_decay`, one step per epoch.
    Interval,
    /// `multiplicative_decay` at the end of each epoch.
    Decay { factor: real },
    /// `bold_update` at the end of each epoch, from that epoch's error.
    Bold,
}

/// One worker's current learning rate.
#[derive(Debug, Clone)]
pub struct RateTracker {
    schedule: Schedule,
    rate0: real,
    rate: real,
    prev_err: Option<f64>,
}

impl RateTracker {
    pub fn new(schedule: Schedule, rate0: real) -> Self {
        RateTracker {
            schedule,
            rate0,
            rate: rate0,
            prev_err: None,
        }
    }

    pub fn rate(&self) -> real {
        self.rate
    }

    pub fn start_epoch(&mut self, epoch: usize, epochs: usize) {
        if self.schedule == Schedule::Interval {
            self.rate = interval_decay(self.rate0, epoch, epochs);
        }
    }

    /// Called with the shared word counter as training progresses.
    pub fn progress(&mut self, words_seen: u64, total_words: u64, epochs: usize) {
        if self.schedule == Schedule::Linear {
            self.rate = linear_decay(self.rate0, words_seen, total_words, epochs);
        }
    }

    pub fn end_epoch(&mut self, err: f64) {
        match self.schedule {
            Schedule::Decay { factor } => self.rate = multiplicative_decay(self.rate, factor),
            Schedule::Bold => {
                if let Some(prev) = self.prev_err {
                    self.rate = bold_update(self.rate, prev, err);
                }
                self.prev_err = Some(err);
            }
            Schedule::Linear | Schedule::Interval => {}
        }
    }
}
