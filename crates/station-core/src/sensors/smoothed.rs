//! Per-metric smoothing and trend estimation
//!
//! Every physical metric the station shows (temperatures, humidity, pressure,
//! light, wind, cloud cover, precipitation) is tracked by a [`SmoothedValue`].
//! It keeps the latest accepted sample, the one before it, and a running
//! average used as the baseline for the rising/falling arrow.

/// Direction indicator drawn next to a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Up,
    Down,
    Steady,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SmoothedValue {
    /// Latest accepted sample, `None` until the first one
    value: Option<f32>,
    /// Sample accepted immediately before `value`
    previous: Option<f32>,
    /// Whether the most recent reading was numerically valid
    valid: bool,
    /// Running average, `None` until two samples were accepted
    trend: Option<f32>,
    sample_count: u32,
}

impl SmoothedValue {
    pub const fn new() -> Self {
        Self {
            value: None,
            previous: None,
            valid: false,
            trend: None,
            sample_count: 0,
        }
    }

    /// Feed a raw reading.
    ///
    /// Non-finite readings only clear the validity flag; the accepted value,
    /// previous value, trend and count are left untouched so a glitch cannot
    /// corrupt the smoothing state. Returns whether the reading was accepted.
    pub fn update(&mut self, sample: f32) -> bool {
        if !sample.is_finite() {
            self.valid = false;
            return false;
        }

        if self.value.is_some() {
            self.previous = self.value;
        }
        self.value = Some(sample);
        self.valid = true;

        let count = self.sample_count;
        self.trend = match (count, self.trend, self.previous) {
            (0, _, _) => None,
            (1, _, Some(previous)) => Some((sample + previous) / 2.0),
            (_, Some(trend), _) => Some(Self::weighted(trend, sample, count)),
            (_, None, _) => Some(sample),
        };
        self.sample_count = count.saturating_add(1);
        true
    }

    /// Count-weighted running average step.
    fn weighted(trend: f32, sample: f32, count: u32) -> f32 {
        let k = count as f32;
        if trend == 0.0 {
            // Limit of the ratio form below when the baseline is zero.
            return (k * trend + sample) / (k + 1.0);
        }
        trend * ((k * trend + sample) / ((k + 1.0) * trend))
    }

    /// Latest value if the most recent reading was valid.
    pub fn current(&self) -> Option<f32> {
        if self.valid { self.value } else { None }
    }

    pub fn previous(&self) -> Option<f32> {
        self.previous
    }

    pub fn trend(&self) -> Option<f32> {
        self.trend
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    /// Compare the current value with its running average.
    ///
    /// `None` while there is no valid value or no trend yet, in which case no
    /// arrow is drawn.
    pub fn arrow(&self) -> Option<Arrow> {
        let value = self.current()?;
        let trend = self.trend?;
        Some(if value > trend {
            Arrow::Up
        } else if value < trend {
            Arrow::Down
        } else {
            Arrow::Steady
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-5;

    fn close(a: f32, b: f32) -> bool {
        let d = a - b;
        d < EPSILON && d > -EPSILON
    }

    #[test]
    fn new_value_is_empty() {
        let v = SmoothedValue::new();
        assert_eq!(v.current(), None);
        assert_eq!(v.trend(), None);
        assert_eq!(v.sample_count(), 0);
        assert!(!v.is_valid());
        assert_eq!(v.arrow(), None);
    }

    #[test]
    fn first_sample_has_no_trend() {
        let mut v = SmoothedValue::new();
        assert!(v.update(10.0));
        assert_eq!(v.current(), Some(10.0));
        assert_eq!(v.previous(), None);
        assert_eq!(v.trend(), None);
        assert_eq!(v.sample_count(), 1);
    }

    #[test]
    fn second_sample_averages_the_pair() {
        let mut v = SmoothedValue::new();
        v.update(10.0);
        v.update(12.0);
        assert_eq!(v.trend(), Some(11.0));
        assert_eq!(v.previous(), Some(10.0));
    }

    #[test]
    fn third_sample_follows_weighted_update() {
        let mut v = SmoothedValue::new();
        v.update(10.0);
        v.update(12.0);
        v.update(14.0);

        // trend = 11 * ((2 * 11 + 14) / (3 * 11)) = 12
        let expected = 11.0_f32 * ((2.0 * 11.0 + 14.0) / (3.0 * 11.0));
        let trend = v.trend().unwrap();
        assert!(close(trend, expected), "trend {} != {}", trend, expected);
        assert!(close(trend, 12.0));
        assert_eq!(v.sample_count(), 3);
        assert_eq!(v.previous(), Some(12.0));
    }

    #[test]
    fn zero_baseline_does_not_divide_by_zero() {
        let mut v = SmoothedValue::new();
        v.update(-1.0);
        v.update(1.0);
        assert_eq!(v.trend(), Some(0.0));

        v.update(3.0);
        let trend = v.trend().unwrap();
        assert!(trend.is_finite());
        assert!(close(trend, 1.0));
    }

    #[test]
    fn count_and_previous_track_accepted_samples() {
        let mut v = SmoothedValue::new();
        let samples = [3.0, 7.5, -2.0, 4.25, 9.0, 9.0];
        for (i, &s) in samples.iter().enumerate() {
            v.update(s);
            assert_eq!(v.sample_count(), i as u32 + 1);
            if i > 0 {
                assert_eq!(v.previous(), Some(samples[i - 1]));
            }
        }
    }

    #[test]
    fn non_finite_reading_preserves_state() {
        let mut v = SmoothedValue::new();
        v.update(10.0);
        v.update(12.0);
        let before = v;

        assert!(!v.update(f32::NAN));
        assert!(!v.update(f32::INFINITY));

        assert!(!v.is_valid());
        assert_eq!(v.current(), None);
        assert_eq!(v.value, before.value);
        assert_eq!(v.previous(), before.previous());
        assert_eq!(v.trend(), before.trend());
        assert_eq!(v.sample_count(), before.sample_count());
    }

    #[test]
    fn recovery_after_glitch_keeps_previous_chain() {
        let mut v = SmoothedValue::new();
        v.update(10.0);
        v.update(f32::NAN);
        v.update(14.0);
        assert_eq!(v.previous(), Some(10.0));
        assert_eq!(v.trend(), Some(12.0));
        assert_eq!(v.sample_count(), 2);
    }

    #[test]
    fn arrow_compares_value_with_trend() {
        let mut v = SmoothedValue::new();
        v.update(21.0);
        assert_eq!(v.arrow(), None);
        v.update(21.0);
        assert_eq!(v.arrow(), Some(Arrow::Steady));
        v.update(22.0);
        assert_eq!(v.arrow(), Some(Arrow::Up));
        v.update(15.0);
        assert_eq!(v.arrow(), Some(Arrow::Down));
    }
}
