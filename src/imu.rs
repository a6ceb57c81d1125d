//! IMU pipeline (C10): raw-sample queues, movement detector, gyro offset
//! compensator, and the orientation estimator adapter around the local
//! Madgwick filter (`crate::ahrs_fusion`).

use crate::ahrs_fusion::Ahrs;
use crate::config::{
    GYRO_IDLE_SAMPLES_TO_DECLARE_IDLE, GYRO_IDLE_THRESHOLD_DPS, GYRO_IGNORE_WINDOW_SAMPLES,
    GYRO_OFFSET_AVERAGING_WINDOW,
};
use crate::queue::Queue;
use crate::state::{Orientation3D, Vector3D};

pub const GYRO_QUEUE_CAP: usize = 8;
pub const ACCEL_QUEUE_CAP: usize = 32;
pub const COMPENSATED_QUEUE_CAP: usize = 32;

pub type GyroQueue = Queue<Vector3D, GYRO_QUEUE_CAP>;
pub type AccelQueue = Queue<Vector3D, ACCEL_QUEUE_CAP>;
pub type CompensatedQueue = Queue<Vector3D, COMPENSATED_QUEUE_CAP>;

/// Declares `is_moving` from a stream of gyro samples (§4.8 step 1): idle if
/// every axis stays within `GYRO_IDLE_THRESHOLD_DPS` of a reference vector
/// for `GYRO_IDLE_SAMPLES_TO_DECLARE_IDLE` consecutive samples; any
/// out-of-band sample immediately recenters the reference and flags moving.
/// A startup ignore window suppresses the very first samples, which are
/// typically still settling.
pub struct MovementDetector {
    v_ref: Vector3D,
    idle_run: u32,
    samples_seen: u32,
    is_moving: bool,
}

impl Default for MovementDetector {
    fn default() -> Self {
        Self {
            v_ref: Vector3D::default(),
            idle_run: 0,
            samples_seen: 0,
            is_moving: true,
        }
    }
}

impl MovementDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    pub fn update(&mut self, sample: &Vector3D) {
        self.samples_seen += 1;
        if self.samples_seen <= GYRO_IGNORE_WINDOW_SAMPLES {
            self.v_ref = *sample;
            return;
        }

        let d = sample.sub(&self.v_ref);
        let idle_now = d.x.abs() <= GYRO_IDLE_THRESHOLD_DPS
            && d.y.abs() <= GYRO_IDLE_THRESHOLD_DPS
            && d.z.abs() <= GYRO_IDLE_THRESHOLD_DPS;

        if idle_now {
            self.idle_run += 1;
            if self.idle_run >= GYRO_IDLE_SAMPLES_TO_DECLARE_IDLE {
                self.is_moving = false;
            }
        } else {
            self.v_ref = *sample;
            self.idle_run = 0;
            self.is_moving = true;
        }
    }
}

/// Accumulates gyro samples while idle and republishes `raw - avg` every
/// `GYRO_OFFSET_AVERAGING_WINDOW` samples (§4.8 step 2).
pub struct OffsetCompensator {
    sum: Vector3D,
    count: u32,
    offset: Vector3D,
}

impl Default for OffsetCompensator {
    fn default() -> Self {
        Self {
            sum: Vector3D::default(),
            count: 0,
            offset: Vector3D::default(),
        }
    }
}

impl OffsetCompensator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(&self) -> Vector3D {
        self.offset
    }

    /// Returns the compensated sample to publish downstream.
    pub fn update(&mut self, raw: &Vector3D, is_moving: bool) -> Vector3D {
        if !is_moving {
            self.sum = self.sum.add(raw);
            self.count += 1;
            if self.count >= GYRO_OFFSET_AVERAGING_WINDOW {
                self.offset = self.sum.scale(1.0 / self.count as f32);
                self.sum = Vector3D::default();
                self.count = 0;
            }
        }
        raw.sub(&self.offset)
    }
}

/// Wraps the Madgwick filter plus the yaw-unwrap tracking (§4.8 step 3):
/// Euler yaw is periodic at ±180°; this exposes a signed heading that keeps
/// accumulating past ±360° across wraps.
pub struct OrientationEstimator {
    filter: Ahrs,
    sample_period_s: f32,
    beta: f32,
    last_yaw_deg: f32,
    turns: i32,
}

impl OrientationEstimator {
    pub fn new(sample_period_s: f32, beta: f32) -> Self {
        Self {
            filter: Ahrs::new(sample_period_s, beta),
            sample_period_s,
            beta,
            last_yaw_deg: 0.0,
            turns: 0,
        }
    }

    pub fn reset(&mut self) {
        self.filter = Ahrs::new(self.sample_period_s, self.beta);
        self.last_yaw_deg = 0.0;
        self.turns = 0;
    }

    /// One filter step per paired gyro/accel sample (gyro in rad/s, accel in
    /// g).
    pub fn update(&mut self, gyro_rad_s: &Vector3D, accel_g: &Vector3D) -> Option<UnwrappedOrientation> {
        let euler = self.filter.update_imu(gyro_rad_s, accel_g).to_euler();
        Some(self.unwrap(euler))
    }

    fn unwrap(&mut self, euler: Orientation3D) -> UnwrappedOrientation {
        let yaw_deg = euler.yaw.to_degrees();
        let delta = yaw_deg - self.last_yaw_deg;
        if delta > 180.0 {
            self.turns -= 1;
        } else if delta < -180.0 {
            self.turns += 1;
        }
        self.last_yaw_deg = yaw_deg;
        UnwrappedOrientation {
            pitch: euler.pitch,
            roll: euler.roll,
            heading_deg: yaw_deg + self.turns as f32 * 360.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, defmt::Format)]
pub struct UnwrappedOrientation {
    pub pitch: f32,
    pub roll: f32,
    pub heading_deg: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_detector_starts_moving_until_idle_run_completes() {
        let mut m = MovementDetector::new();
        for _ in 0..GYRO_IGNORE_WINDOW_SAMPLES {
            m.update(&Vector3D::default());
        }
        assert!(m.is_moving());
        for _ in 0..GYRO_IDLE_SAMPLES_TO_DECLARE_IDLE {
            m.update(&Vector3D::default());
        }
        assert!(!m.is_moving());
    }

    #[test]
    fn movement_detector_recenters_on_spike() {
        let mut m = MovementDetector::new();
        for _ in 0..GYRO_IGNORE_WINDOW_SAMPLES {
            m.update(&Vector3D::default());
        }
        for _ in 0..GYRO_IDLE_SAMPLES_TO_DECLARE_IDLE {
            m.update(&Vector3D::default());
        }
        assert!(!m.is_moving());
        m.update(&Vector3D { x: 50.0, y: 0.0, z: 0.0 });
        assert!(m.is_moving());
    }

    #[test]
    fn offset_compensator_subtracts_idle_mean_exactly() {
        let mut c = OffsetCompensator::new();
        let bias = Vector3D { x: 1.0, y: -2.0, z: 0.5 };
        for _ in 0..GYRO_OFFSET_AVERAGING_WINDOW {
            c.update(&bias, false);
        }
        let compensated = c.update(&bias, false);
        assert!((compensated.x).abs() < 1e-3);
        assert!((compensated.y).abs() < 1e-3);
        assert!((compensated.z).abs() < 1e-3);
    }

    #[test]
    fn offset_compensator_ignores_samples_while_moving() {
        let mut c = OffsetCompensator::new();
        let sample = Vector3D { x: 10.0, y: 0.0, z: 0.0 };
        let out = c.update(&sample, true);
        assert_eq!(out.x, sample.x);
    }
}
