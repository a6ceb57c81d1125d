//! Sensor port specifics (§4.7). The individual sensor algorithms (color
//! science for `RGB`, chip-level scripts) are out of scope; this owns the
//! driver-kind tagging, the one concrete conversion spec.md gives in full
//! (HC-SR04 echo time → distance), and the generic debounce/diagnostic
//! bookkeeping every driver shares.

use crate::config::{HCSR04_US_TO_CM_DEN, HCSR04_US_TO_CM_NUM};

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum SensorDriverKind {
    Dummy,
    BumperSwitch,
    HcSr04,
    Rgb,
    DebugRtc,
}

/// `distance_cm = echo_us * 17 / 1000` (§4.7), computed over a median-of-3
/// window of raw echo times to reject single-sample ultrasonic spurs.
pub fn hcsr04_distance_cm(echo_us: u32) -> u32 {
    echo_us * HCSR04_US_TO_CM_NUM / HCSR04_US_TO_CM_DEN
}

/// Median of exactly three echo-time samples, in microseconds.
pub fn median_of_three(a: u32, b: u32, c: u32) -> u32 {
    let mut v = [a, b, c];
    v.sort_unstable();
    v[1]
}

/// Digital-input debounce shared by `BumperSwitch` and the DRV8833
/// fault-pin read (SPEC_FULL.md §C.4): a level must hold for
/// `stable_ticks_required` consecutive samples before it's reported.
pub struct Debounce {
    stable_ticks_required: u32,
    candidate: bool,
    candidate_ticks: u32,
    pub stable: bool,
}

impl Debounce {
    pub fn new(stable_ticks_required: u32, initial: bool) -> Self {
        Self {
            stable_ticks_required,
            candidate: initial,
            candidate_ticks: stable_ticks_required,
            stable: initial,
        }
    }

    pub fn sample(&mut self, level: bool) -> bool {
        if level == self.candidate {
            self.candidate_ticks += 1;
        } else {
            self.candidate = level;
            self.candidate_ticks = 1;
        }
        if self.candidate_ticks >= self.stable_ticks_required {
            self.stable = self.candidate;
        }
        self.stable
    }
}

/// Per-port sensor state: bound driver kind plus the most recent reading,
/// already formatted as the bytes `ReadSensorInfo`/status-slot publishing
/// want (driver-defined layout; length is the driver's concern).
pub struct SensorPort {
    pub kind: SensorDriverKind,
    pub last_reading: [u8; 32],
    pub last_reading_len: usize,
    bumper_debounce: Debounce,
}

impl Default for SensorPort {
    fn default() -> Self {
        Self {
            kind: SensorDriverKind::Dummy,
            last_reading: [0u8; 32],
            last_reading_len: 0,
            bumper_debounce: Debounce::new(3, false),
        }
    }
}

impl SensorPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reading(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.last_reading.len());
        self.last_reading[..n].copy_from_slice(&bytes[..n]);
        self.last_reading_len = n;
    }

    /// Drives the `BumperSwitch` driver's digital-input debounce.
    pub fn update_bumper(&mut self, raw_level: bool) -> bool {
        let pressed = self.bumper_debounce.sample(raw_level);
        self.set_reading(&[pressed as u8]);
        pressed
    }

    /// Drives the `HC_SR04` driver from three raw echo-time samples.
    pub fn update_hcsr04(&mut self, echo_us: (u32, u32, u32)) -> u32 {
        let median = median_of_three(echo_us.0, echo_us.1, echo_us.2);
        let cm = hcsr04_distance_cm(median);
        self.set_reading(&cm.to_le_bytes());
        cm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hcsr04_conversion_matches_spec_constant() {
        assert_eq!(hcsr04_distance_cm(1000), 17);
    }

    #[test]
    fn median_of_three_rejects_a_single_spur() {
        assert_eq!(median_of_three(100, 105, 9000), 105);
    }

    #[test]
    fn debounce_requires_consecutive_stable_samples() {
        let mut d = Debounce::new(3, false);
        assert!(!d.sample(true));
        assert!(!d.sample(true));
        assert!(d.sample(true));
    }

    #[test]
    fn debounce_resets_candidate_on_bounce() {
        let mut d = Debounce::new(3, false);
        d.sample(true);
        d.sample(true);
        assert!(!d.sample(false)); // bounced back before settling
        assert!(!d.sample(false));
        assert!(d.sample(false));
    }
}
