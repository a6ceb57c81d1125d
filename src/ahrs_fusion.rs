//! Local Madgwick orientation filter (C10's `ahrs_fusion` equivalent). The
//! vendored `ahrs` git dependency is a positioning/navigation crate
//! (`ahrs::ppks::PositVelEarthUnits`) and doesn't expose a Madgwick filter
//! itself, so this reimplements the gyro+accel (IMU-only, no magnetometer)
//! update step as a small local module, the same way it lives outside any
//! crate boundary upstream.

use crate::state::{Quaternion, Vector3D};
use num_traits::Float;

/// Running orientation estimate plus the two filter tuning constants.
pub struct Ahrs {
    sample_period_s: f32,
    beta: f32,
    q: Quaternion,
}

impl Ahrs {
    pub fn new(sample_period_s: f32, beta: f32) -> Self {
        Self {
            sample_period_s,
            beta,
            q: Quaternion::IDENTITY,
        }
    }

    /// One Madgwick IMU update. `gyro` in rad/s, `accel` in any consistent
    /// unit (only its direction is used, it's normalized below).
    pub fn update_imu(&mut self, gyro: &Vector3D, accel: &Vector3D) -> Quaternion {
        let (q0, q1, q2, q3) = (self.q.q0, self.q.q1, self.q.q2, self.q.q3);

        let mut qdot0 = 0.5 * (-q1 * gyro.x - q2 * gyro.y - q3 * gyro.z);
        let mut qdot1 = 0.5 * (q0 * gyro.x + q2 * gyro.z - q3 * gyro.y);
        let mut qdot2 = 0.5 * (q0 * gyro.y - q1 * gyro.z + q3 * gyro.x);
        let mut qdot3 = 0.5 * (q0 * gyro.z + q1 * gyro.y - q2 * gyro.x);

        let accel_norm_sq = accel.x * accel.x + accel.y * accel.y + accel.z * accel.z;
        if accel_norm_sq > 0.0 {
            let recip_norm = 1.0 / accel_norm_sq.sqrt();
            let (ax, ay, az) = (accel.x * recip_norm, accel.y * recip_norm, accel.z * recip_norm);

            let f1 = 2.0 * (q1 * q3 - q0 * q2) - ax;
            let f2 = 2.0 * (q0 * q1 + q2 * q3) - ay;
            let f3 = 2.0 * (0.5 - q1 * q1 - q2 * q2) - az;

            let j_11or24 = 2.0 * q2;
            let j_12or23 = 2.0 * q3;
            let j_13or22 = 2.0 * q0;
            let j_14or21 = 2.0 * q1;
            let j_32 = 2.0 * j_14or21;
            let j_33 = 2.0 * j_11or24;

            let mut s0 = j_14or21 * f2 - j_11or24 * f1;
            let mut s1 = j_12or23 * f1 + j_13or22 * f2 - j_32 * f3;
            let mut s2 = j_13or22 * f1 - j_12or23 * f2 - j_33 * f3;
            let mut s3 = j_14or21 * f1 + j_11or24 * f2;

            let norm_s_sq = s0 * s0 + s1 * s1 + s2 * s2 + s3 * s3;
            if norm_s_sq > 0.0 {
                let recip_norm_s = 1.0 / norm_s_sq.sqrt();
                s0 *= recip_norm_s;
                s1 *= recip_norm_s;
                s2 *= recip_norm_s;
                s3 *= recip_norm_s;

                qdot0 -= self.beta * s0;
                qdot1 -= self.beta * s1;
                qdot2 -= self.beta * s2;
                qdot3 -= self.beta * s3;
            }
        }

        let q0 = q0 + qdot0 * self.sample_period_s;
        let q1 = q1 + qdot1 * self.sample_period_s;
        let q2 = q2 + qdot2 * self.sample_period_s;
        let q3 = q3 + qdot3 * self.sample_period_s;

        let recip_norm = 1.0 / (q0 * q0 + q1 * q1 + q2 * q2 + q3 * q3).sqrt();
        self.q = Quaternion {
            q0: q0 * recip_norm,
            q1: q1 * recip_norm,
            q2: q2 * recip_norm,
            q3: q3 * recip_norm,
        };
        self.q
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stationary_level_accel_holds_identity_orientation() {
        let mut ahrs = Ahrs::new(0.01, 0.1);
        let gyro = Vector3D::default();
        let accel = Vector3D { x: 0.0, y: 0.0, z: 1.0 };
        let mut q = Quaternion::IDENTITY;
        for _ in 0..200 {
            q = ahrs.update_imu(&gyro, &accel);
        }
        let e = q.to_euler();
        assert!(e.pitch.abs() < 0.01);
        assert!(e.roll.abs() < 0.01);
    }

    #[test]
    fn output_quaternion_stays_normalized() {
        let mut ahrs = Ahrs::new(0.01, 0.1);
        let gyro = Vector3D { x: 0.2, y: -0.1, z: 0.05 };
        let accel = Vector3D { x: 0.1, y: 0.2, z: 0.97 };
        let mut q = Quaternion::IDENTITY;
        for _ in 0..50 {
            q = ahrs.update_imu(&gyro, &accel);
        }
        let norm_sq = q.q0 * q.q0 + q.q1 * q.q1 + q.q2 * q.q2 + q.q3 * q.q3;
        assert!((norm_sq - 1.0).abs() < 1e-3);
    }
}
