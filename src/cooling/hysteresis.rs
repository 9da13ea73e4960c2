//! Hysteresis applied around the curve interpolator.
//!
//! A falling temperature only lowers the fan speed once it has dropped more
//! than the band below the last tracked peak.

use super::curve::FanCurve;

/// Per-loop hysteresis state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hysteresis {
    band: u32,
    upper_temp: u32,
    last_output_speed: Option<u32>,
}

impl Hysteresis {
    /// A zero `band` disables hysteresis.
    pub fn new(band: u32) -> Self {
        Self {
            band,
            upper_temp: 0,
            last_output_speed: None,
        }
    }

    /// Temperature to feed the interpolator for this reading.
    ///
    /// Holds the tracked peak while `temperature` stays within the band below
    /// it and above the first breakpoint; otherwise tracks the reading.
    pub fn effective_temperature(&mut self, temperature: u32, curve: &FanCurve) -> u32 {
        let held = temperature < self.upper_temp
            && temperature.saturating_add(self.band) >= self.upper_temp
            && temperature > curve.first().temperature;

        if held {
            self.upper_temp
        } else {
            self.upper_temp = temperature;
            temperature
        }
    }

    /// Remember `speed` as written. Returns false when it repeats the last write.
    pub fn record_output(&mut self, speed: u32) -> bool {
        if self.last_output_speed == Some(speed) {
            return false;
        }
        self.last_output_speed = Some(speed);
        true
    }

    pub fn band(&self) -> u32 {
        self.band
    }

    pub fn upper_temp(&self) -> u32 {
        self.upper_temp
    }

    pub fn last_output_speed(&self) -> Option<u32> {
        self.last_output_speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> FanCurve {
        "40:30,60:50,80:100".parse().unwrap()
    }

    #[test]
    fn test_holds_peak_within_band() {
        let curve = curve();
        let mut hysteresis = Hysteresis::new(5);

        assert_eq!(hysteresis.effective_temperature(60, &curve), 60);
        assert_eq!(hysteresis.effective_temperature(58, &curve), 60);
        assert_eq!(hysteresis.effective_temperature(56, &curve), 60);
        assert_eq!(hysteresis.effective_temperature(55, &curve), 60);
        // More than 5°C below the peak
        assert_eq!(hysteresis.effective_temperature(54, &curve), 54);
        assert_eq!(hysteresis.upper_temp(), 54);
    }

    #[test]
    fn test_rising_temperature_is_tracked() {
        let curve = curve();
        let mut hysteresis = Hysteresis::new(5);

        for temp in [45, 50, 62, 70] {
            assert_eq!(hysteresis.effective_temperature(temp, &curve), temp);
        }
        assert_eq!(hysteresis.effective_temperature(67, &curve), 70);
        assert_eq!(hysteresis.effective_temperature(72, &curve), 72);
    }

    #[test]
    fn test_not_held_at_or_below_first_breakpoint() {
        let curve = curve();
        let mut hysteresis = Hysteresis::new(5);

        assert_eq!(hysteresis.effective_temperature(43, &curve), 43);
        assert_eq!(hysteresis.effective_temperature(40, &curve), 40);
        assert_eq!(hysteresis.effective_temperature(38, &curve), 38);
    }

    #[test]
    fn test_zero_band_disables_hysteresis() {
        let curve = curve();
        let mut hysteresis = Hysteresis::new(0);

        for temp in [70, 69, 68, 75, 60] {
            assert_eq!(hysteresis.effective_temperature(temp, &curve), temp);
        }
    }

    #[test]
    fn test_record_output_skips_repeats() {
        let mut hysteresis = Hysteresis::new(5);
        assert_eq!(hysteresis.last_output_speed(), None);

        assert!(hysteresis.record_output(40));
        assert!(!hysteresis.record_output(40));
        assert!(hysteresis.record_output(45));
        assert_eq!(hysteresis.last_output_speed(), Some(45));
    }
}
