//! Speed sweep planning.
//!
//! Speeds run from [`MIN_SPEED`] up to the requested maximum in constant steps. Each speed
//! gets a segment-length factor and a repetition count:
//!
//! - below 100 mm/s the segments are shortened (down to 1/5 of the pattern size) since the
//!   head needs less travel to produce a usable signal and long slow moves waste time;
//! - 1 back-and-forth pass below 150 mm/s, 2 up to 250 mm/s, 3 above.

use serde::{Deserialize, Serialize};

use crate::error::{SweepError, SweepResult};

/// Lowest speed of every sweep (mm/s)
pub const MIN_SPEED: f64 = 2.0;

/// Minimum time one pattern segment must take at `max_speed` (same time base as the
/// `size / (max_speed / 60)` check)
pub const MIN_TRAVEL_TIME: f64 = 0.25;

/// Speed above which segments use the full pattern size
pub const FULL_LENGTH_SPEED: f64 = 100.0;

/// Speed from which two back-and-forth passes are done
pub const TWO_PASSES_SPEED: f64 = 150.0;

/// Speed from which three back-and-forth passes are done
pub const THREE_PASSES_SPEED: f64 = 250.0;

/// One speed of the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedSample {
    /// Position in the sweep (0-based)
    pub index: usize,
    /// Test speed (mm/s)
    pub speed: f64,
    /// Fraction of the pattern size used for the segment, in (0, 1]
    pub segment_factor: f64,
    /// Number of back-and-forth passes
    pub repetitions: u32,
}

impl SpeedSample {
    /// Build the sample for a given speed
    pub fn at(index: usize, speed: f64) -> Self {
        Self {
            index,
            speed,
            segment_factor: segment_length_factor(speed),
            repetitions: repetition_count(speed),
        }
    }
}

/// Segment-length scale factor for a speed: linear from 0.2 at rest to 1.0 at 100 mm/s,
/// constant above.
pub fn segment_length_factor(speed: f64) -> f64 {
    if speed < FULL_LENGTH_SPEED {
        1.0 / 5.0 + 4.0 / 5.0 * speed / FULL_LENGTH_SPEED
    } else {
        1.0
    }
}

/// Number of back-and-forth passes for a speed.
pub fn repetition_count(speed: f64) -> u32 {
    if speed < TWO_PASSES_SPEED {
        1
    } else if speed < THREE_PASSES_SPEED {
        2
    } else {
        3
    }
}

/// Check that a pattern of `size` is long enough to be travelled at `max_speed`.
///
/// Fails closed: a ratio below [`MIN_TRAVEL_TIME`] is rejected, exactly the threshold passes.
pub fn validate_travel(size: f64, max_speed: f64) -> SweepResult<()> {
    let travel_time = size / (max_speed / 60.0);
    if travel_time.is_nan() || travel_time < MIN_TRAVEL_TIME {
        return Err(SweepError::InsufficientTravelDistance {
            travel_time,
            minimum: MIN_TRAVEL_TIME,
        });
    }
    Ok(())
}

/// Number of speed samples: `floor((max_speed - MIN_SPEED) / increment) + 1`.
pub fn sample_count(max_speed: f64, increment: f64) -> SweepResult<usize> {
    if increment.is_nan() || increment <= 0.0 {
        return Err(SweepError::InvalidIncrement(increment));
    }
    let steps = ((max_speed - MIN_SPEED) / increment).floor();
    if steps < 0.0 {
        // max_speed below MIN_SPEED: nothing to sweep
        return Ok(0);
    }
    Ok(steps as usize + 1)
}

/// The full list of speeds of one angle.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedPlan {
    increment: f64,
    count: usize,
}

impl SpeedPlan {
    /// Plan the speeds up to `max_speed` in steps of `increment`.
    pub fn new(max_speed: f64, increment: f64) -> SweepResult<Self> {
        let count = sample_count(max_speed, increment)?;
        Ok(Self { increment, count })
    }

    /// Number of samples per angle
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the plan is empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Speed of sample `index`
    pub fn speed_at(&self, index: usize) -> f64 {
        MIN_SPEED + index as f64 * self.increment
    }

    /// Iterate over the samples in increasing speed order
    pub fn samples(&self) -> impl Iterator<Item = SpeedSample> + '_ {
        (0..self.count).map(move |i| SpeedSample::at(i, self.speed_at(i)))
    }

    /// Total number of back-and-forth passes per angle
    pub fn total_passes(&self) -> u32 {
        self.samples().map(|s| s.repetitions).sum()
    }
}
