//! Motor port specifics (§4.6): drive-request storage, thermal model and
//! overcurrent/thermal derating, presence test. The DRV8833 register-level
//! drive is out of scope; this owns the pure arithmetic and request state
//! that feeds it.

use crate::config::{
    MotorThermalParams, MOTOR_CURRENT_LIMIT_A, MOTOR_FAULT_DEBOUNCE_MS,
    MOTOR_PRESENCE_CURRENT_DELTA_A, MOTOR_PRESENCE_TIMEOUT_MS, MOTOR_THERMAL,
};
use crate::ports::sensor::Debounce;
use crate::ports::PresenceResult;
use crate::state::{DriveRequest, DriveRequestKind};

fn clamp01(x: f32) -> f32 {
    if x < 0.0 {
        0.0
    } else if x > 1.0 {
        1.0
    } else {
        x
    }
}

/// `linear_map(t, t_safe, t_max, 1, 0)` clamped to [0, 1] (§4.6).
fn thermal_factor(t_motor: f32, params: &MotorThermalParams) -> f32 {
    if params.t_max_c <= params.t_safe_c {
        return 0.0;
    }
    let span = params.t_max_c - params.t_safe_c;
    clamp01(1.0 - (t_motor - params.t_safe_c) / span)
}

fn current_factor(i_measured: f32, i_limit: f32) -> f32 {
    if i_measured <= 0.0 {
        1.0
    } else {
        (i_limit / i_measured).min(1.0)
    }
}

/// `final = request × min(current_factor, thermal_factor)` (§4.6).
pub fn derate(requested_pwm: i16, i_measured_a: f32, t_motor_c: f32) -> i16 {
    let factor = current_factor(i_measured_a, MOTOR_CURRENT_LIMIT_A).min(thermal_factor(t_motor_c, &MOTOR_THERMAL));
    (requested_pwm as f32 * factor) as i16
}

/// Integrates `ΔT = heating_coeff × I² × R − cooling_coeff × (T − T_ambient)`
/// for one 1 ms tick.
pub fn step_thermal_model(t_motor_c: f32, i_measured_a: f32, params: &MotorThermalParams) -> f32 {
    let heating = params.heating_coeff * i_measured_a * i_measured_a * params.resistance_ohm;
    let cooling = params.cooling_coeff * (t_motor_c - params.t_ambient_c);
    t_motor_c + heating - cooling
}

/// Convert a `DriveRequest` plus the derating inputs into a signed PWM duty
/// in [-200, 200]. Closed-loop speed/position control is left to the
/// concrete drive implementation (out of scope); `Power` is taken directly.
pub fn request_to_pwm(req: &DriveRequest, i_measured_a: f32, t_motor_c: f32) -> i16 {
    let requested = match req.request {
        DriveRequestKind::Power(p) => p,
        DriveRequestKind::Speed(s) => (s.clamp(-1.0, 1.0) * 200.0) as i16,
        // Closed-loop position control needs an encoder model outside this
        // spec's scope; publish a held duty proportional to power limit.
        DriveRequestKind::Position(_) => 0,
    };
    let limited = requested.clamp(
        -2 * req.power_limit as i16,
        2 * req.power_limit as i16,
    );
    derate(limited, i_measured_a, t_motor_c)
}

/// Non-blocking motor-presence probe (§4.6): applies a small test PWM (owned
/// by the caller) and watches for a persistent current rise. Ticks are
/// counted by the caller via `update(..)`; this only tracks the detection
/// window and baseline.
pub struct PresenceTest {
    baseline_a: f32,
    elapsed_ms: u32,
    result: Option<PresenceResult>,
}

impl PresenceTest {
    pub fn start(baseline_a: f32) -> Self {
        Self {
            baseline_a,
            elapsed_ms: 0,
            result: None,
        }
    }

    pub fn update(&mut self, current_a: f32) -> Option<PresenceResult> {
        if self.result.is_some() {
            return self.result;
        }
        if current_a - self.baseline_a > MOTOR_PRESENCE_CURRENT_DELTA_A {
            self.result = Some(PresenceResult::Present);
            return self.result;
        }
        self.elapsed_ms += 1;
        if self.elapsed_ms >= MOTOR_PRESENCE_TIMEOUT_MS {
            self.result = Some(PresenceResult::NotPresent);
        }
        self.result
    }
}

/// Per-channel motor port state: the most recent drive request plus the
/// thermal model's running temperature estimate.
pub struct MotorPort {
    pub request: DriveRequest,
    pub t_motor_c: f32,
    pub fault_latched: bool,
    fault_debounce: Debounce,
}

impl Default for MotorPort {
    fn default() -> Self {
        Self {
            request: DriveRequest::default(),
            t_motor_c: MOTOR_THERMAL.t_ambient_c,
            fault_latched: false,
            fault_debounce: Debounce::new(MOTOR_FAULT_DEBOUNCE_MS, false),
        }
    }
}

impl MotorPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called on the port's periodic slot with the latest ADC current
    /// reading; returns the derated PWM to apply this tick.
    pub fn update(&mut self, i_measured_a: f32) -> i16 {
        self.t_motor_c = step_thermal_model(self.t_motor_c, i_measured_a, &MOTOR_THERMAL);
        if self.fault_latched {
            return 0;
        }
        request_to_pwm(&self.request, i_measured_a, self.t_motor_c)
    }

    /// Feeds a raw DRV8833 `nFAULT` pin reading through the debounce window
    /// before latching (§7.3, filled in from `MotorDriver_8833.c`'s
    /// handling — see DESIGN.md §C.4).
    pub fn sample_fault_pin(&mut self, asserted: bool) {
        if self.fault_debounce.sample(asserted) {
            self.fault_latched = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thermal_factor_is_one_below_safe_temp() {
        assert_eq!(thermal_factor(MOTOR_THERMAL.t_safe_c - 10.0, &MOTOR_THERMAL), 1.0);
    }

    #[test]
    fn thermal_factor_is_zero_at_max_temp() {
        assert_eq!(thermal_factor(MOTOR_THERMAL.t_max_c, &MOTOR_THERMAL), 0.0);
    }

    #[test]
    fn current_factor_clamps_at_one_when_under_limit() {
        assert_eq!(current_factor(0.1, MOTOR_CURRENT_LIMIT_A), 1.0);
    }

    #[test]
    fn derate_scales_down_over_current_limit() {
        let pwm = derate(200, MOTOR_CURRENT_LIMIT_A * 2.0, MOTOR_THERMAL.t_ambient_c);
        assert!(pwm < 200 && pwm > 0);
    }

    #[test]
    fn presence_test_detects_current_rise() {
        let mut t = PresenceTest::start(0.0);
        assert_eq!(t.update(0.0), None);
        assert_eq!(t.update(1.0), Some(PresenceResult::Present));
    }

    #[test]
    fn presence_test_times_out_without_rise() {
        let mut t = PresenceTest::start(0.0);
        let mut last = None;
        for _ in 0..MOTOR_PRESENCE_TIMEOUT_MS {
            last = t.update(0.0);
        }
        assert_eq!(last, Some(PresenceResult::NotPresent));
    }
}
