//! Battery and charger observer (C11): bias-corrected EMA filter, level
//! mapping, low-battery hysteresis, and the charger state machine.

use crate::config::{BatteryParams, BATTERY_EMA_ALPHA, BATTERY_LOW_ENTER_PCT, BATTERY_LOW_EXIT_PCT};
use num_traits::Float;

fn map_constrained(x: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    if in_max <= in_min {
        return out_min;
    }
    let t = ((x - in_min) / (in_max - in_min)).clamp(0.0, 1.0);
    out_min + t * (out_max - out_min)
}

/// Bias-corrected exponential moving average (§4.9): `y_n = α y_{n-1} + (1 −
/// α) x_n`, divided by `(1 − α^n)` so early samples aren't biased toward the
/// zero initial condition.
pub struct Ema {
    alpha: f32,
    accum: f32,
    samples_seen: u32,
}

impl Ema {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            accum: 0.0,
            samples_seen: 0,
        }
    }

    pub fn update(&mut self, x: f32) -> f32 {
        self.accum = self.alpha * self.accum + (1.0 - self.alpha) * x;
        self.samples_seen += 1;
        let bias_correction = 1.0 - self.alpha.powi(self.samples_seen as i32);
        if bias_correction > f32::EPSILON {
            self.accum / bias_correction
        } else {
            x
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ChargerState {
    NotPluggedIn,
    Charging,
    Charged,
    Fault,
}

/// Charger chip exposes two open-drain status pins; §4.9 doesn't specify
/// their encoding precisely, so this follows the common dual-status-pin
/// convention (both high = not plugged in, one low = charging/charged,
/// both low = fault) used by the single-cell charger ICs this class of
/// board typically uses.
pub fn charger_state_from_pins(stat1_low: bool, stat2_low: bool) -> ChargerState {
    match (stat1_low, stat2_low) {
        (false, false) => ChargerState::NotPluggedIn,
        (true, false) => ChargerState::Charging,
        (false, true) => ChargerState::Charged,
        (true, true) => ChargerState::Fault,
    }
}

/// One battery's observer: filtered voltage, presence, level, and latched
/// low-battery hysteresis (§4.9).
pub struct BatteryObserver {
    params: BatteryParams,
    filter: Ema,
    pub present: bool,
    pub level_pct: f32,
    pub low: bool,
}

impl BatteryObserver {
    pub fn new(params: BatteryParams) -> Self {
        Self {
            params,
            filter: Ema::new(BATTERY_EMA_ALPHA),
            present: false,
            level_pct: 0.0,
            low: false,
        }
    }

    /// Called on the 100 ms slot with a raw voltage reading.
    pub fn update(&mut self, raw_v: f32) {
        let filtered = self.filter.update(raw_v);

        if filtered > self.params.detection_v {
            self.present = true;
            self.level_pct = map_constrained(filtered, self.params.min_v, self.params.max_v, 0.0, 100.0);
        } else {
            self.present = false;
            self.level_pct = 0.0;
        }

        if !self.low && self.level_pct < BATTERY_LOW_ENTER_PCT {
            self.low = true;
        } else if self.low && self.level_pct > BATTERY_LOW_EXIT_PCT {
            self.low = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAIN_BATTERY;

    #[test]
    fn ema_converges_to_constant_input() {
        let mut ema = Ema::new(0.9);
        let mut y = 0.0;
        for _ in 0..200 {
            y = ema.update(7.4);
        }
        assert!((y - 7.4).abs() < 1e-3);
    }

    #[test]
    fn observer_marks_absent_below_detection_threshold() {
        let mut obs = BatteryObserver::new(MAIN_BATTERY);
        for _ in 0..50 {
            obs.update(0.0);
        }
        assert!(!obs.present);
        assert_eq!(obs.level_pct, 0.0);
    }

    #[test]
    fn low_battery_hysteresis_has_separate_enter_exit_thresholds() {
        let mut obs = BatteryObserver::new(MAIN_BATTERY);
        for _ in 0..200 {
            obs.update(MAIN_BATTERY.min_v);
        }
        assert!(obs.low);

        // Climb to a level between the enter (10%) and exit (15%) thresholds:
        // hysteresis must keep it latched low.
        let mid_v = MAIN_BATTERY.min_v
            + (MAIN_BATTERY.max_v - MAIN_BATTERY.min_v) * 0.12;
        for _ in 0..500 {
            obs.update(mid_v);
        }
        assert!(obs.low);

        let high_v = MAIN_BATTERY.min_v
            + (MAIN_BATTERY.max_v - MAIN_BATTERY.min_v) * 0.20;
        for _ in 0..500 {
            obs.update(high_v);
        }
        assert!(!obs.low);
    }

    #[test]
    fn charger_pin_decode() {
        assert_eq!(charger_state_from_pins(false, false), ChargerState::NotPluggedIn);
        assert_eq!(charger_state_from_pins(true, false), ChargerState::Charging);
        assert_eq!(charger_state_from_pins(false, true), ChargerState::Charged);
        assert_eq!(charger_state_from_pins(true, true), ChargerState::Fault);
    }
}
