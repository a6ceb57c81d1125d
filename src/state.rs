//! Shared data model (§3) that doesn't belong to one specific component:
//! startup/reset bookkeeping, system-wide status enums, and the plain
//! numeric/record types several components pass between each other.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Why the MCU is currently running. Distinguishes the four causes named in
/// §3 "Lifecycles" and §6 "Bootloader handoff".
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum StartupReason {
    ColdStart,
    BootloaderRequested,
    WatchdogReset,
    BrownOutReset,
}

/// Host-settable master status (cmd `0x04`). Numeric values are the wire
/// encoding; order matches the `0..5` enum the command's doc note refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, defmt::Format)]
#[repr(u8)]
pub enum MasterStatus {
    Unknown = 0,
    NotConfigured = 1,
    Configuring = 2,
    Updating = 3,
    Operational = 4,
    Controlled = 5,
}

impl Default for MasterStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Host-settable Bluetooth status (cmd `0x05`). See SPEC_FULL.md §C.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive, defmt::Format)]
#[repr(u8)]
pub enum BluetoothStatus {
    NotConnected = 0,
    Advertising = 1,
    Connected = 2,
}

impl Default for BluetoothStatus {
    fn default() -> Self {
        Self::NotConnected
    }
}

/// Pass/fail/unknown result for a subsystem self-test, used by the startup
/// hardware-compatibility gate (SPEC_FULL.md §C.1) and per-port presence
/// tests (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum SensorStatus {
    Unknown,
    Pass,
    Fail,
}

/// A raw inertial sample straight off the IMU driver's FIFO, pre-scaling.
#[derive(Debug, Clone, Copy, Default, defmt::Format)]
pub struct RawSample {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

/// A scaled 3-vector, in the sensor's native engineering units (dps for
/// gyro, g for accelerometer).
#[derive(Debug, Clone, Copy, Default, defmt::Format)]
pub struct Vector3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3D {
    pub fn sub(&self, rhs: &Vector3D) -> Vector3D {
        Vector3D {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }

    pub fn add(&self, rhs: &Vector3D) -> Vector3D {
        Vector3D {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }

    pub fn scale(&self, k: f32) -> Vector3D {
        Vector3D {
            x: self.x * k,
            y: self.y * k,
            z: self.z * k,
        }
    }
}

#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct Quaternion {
    pub q0: f32,
    pub q1: f32,
    pub q2: f32,
    pub q3: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        q0: 1.0,
        q1: 0.0,
        q2: 0.0,
        q3: 0.0,
    };

    /// Convert to Euler angles, in radians. Matches the aerospace
    /// (ZYX, yaw-pitch-roll) convention the orientation estimator (C10)
    /// reports through.
    pub fn to_euler(&self) -> Orientation3D {
        let (q0, q1, q2, q3) = (self.q0, self.q1, self.q2, self.q3);

        let sinr_cosp = 2.0 * (q0 * q1 + q2 * q3);
        let cosr_cosp = 1.0 - 2.0 * (q1 * q1 + q2 * q2);
        let roll = libm_atan2(sinr_cosp, cosr_cosp);

        let sinp = 2.0 * (q0 * q2 - q3 * q1);
        let pitch = if sinp.abs() >= 1.0 {
            core::f32::consts::FRAC_PI_2.copysign(sinp)
        } else {
            libm_asin(sinp)
        };

        let siny_cosp = 2.0 * (q0 * q3 + q1 * q2);
        let cosy_cosp = 1.0 - 2.0 * (q2 * q2 + q3 * q3);
        let yaw = libm_atan2(siny_cosp, cosy_cosp);

        Orientation3D { pitch, roll, yaw }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// `core` has no transcendental functions; `num-traits`' `Float` impl for
// `f32` (backed by `libm` on `no_std` targets) supplies them. Kept as free
// functions so `Quaternion::to_euler` reads the same whether or not `std`
// is in scope for a host-side unit test.
fn libm_atan2(y: f32, x: f32) -> f32 {
    use num_traits::Float;
    y.atan2(x)
}

fn libm_asin(x: f32) -> f32 {
    use num_traits::Float;
    x.asin()
}

/// Orientation as Euler angles, radians, aerospace convention.
#[derive(Debug, Clone, Copy, Default, defmt::Format)]
pub struct Orientation3D {
    pub pitch: f32,
    pub roll: f32,
    pub yaw: f32,
}

/// Tagged drive request a host writes to a motor port (§3 "Drive request").
#[derive(Debug, Clone, Copy, defmt::Format)]
pub enum DriveRequestKind {
    Speed(f32),
    Position(i32),
    Power(i16),
}

#[derive(Debug, Clone, Copy, defmt::Format)]
pub struct DriveRequest {
    pub version: u8,
    pub power_limit: u8,
    pub speed_limit: u8,
    pub request: DriveRequestKind,
    pub position_breakpoint: Option<i32>,
}

impl Default for DriveRequest {
    fn default() -> Self {
        Self {
            version: 0,
            power_limit: 100,
            speed_limit: 100,
            request: DriveRequestKind::Power(0),
            position_breakpoint: None,
        }
    }
}

/// Fixed 64-byte error record (§3 "Error record"). `payload` is
/// driver/component-defined free-form diagnostic data.
#[derive(Debug, Clone, Copy)]
pub struct ErrorRecord {
    pub error_id: u8,
    pub hw_version: u32,
    pub fw_version: u32,
    pub payload: [u8; 54],
}

impl ErrorRecord {
    pub const WIRE_SIZE: usize = 1 + 4 + 4 + 54;

    pub fn to_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut out = [0u8; Self::WIRE_SIZE];
        out[0] = self.error_id;
        out[1..5].copy_from_slice(&self.hw_version.to_le_bytes());
        out[5..9].copy_from_slice(&self.fw_version.to_le_bytes());
        out[9..].copy_from_slice(&self.payload);
        out
    }

    pub fn from_bytes(bytes: &[u8; Self::WIRE_SIZE]) -> Self {
        let mut payload = [0u8; 54];
        payload.copy_from_slice(&bytes[9..]);
        Self {
            error_id: bytes[0],
            hw_version: u32::from_le_bytes(bytes[1..5].try_into().unwrap()),
            fw_version: u32::from_le_bytes(bytes[5..9].try_into().unwrap()),
            payload,
        }
    }
}

/// Aggregate system status, polled and logged from the scheduler's 100 ms
/// slot. Distinct from `MasterStatus`, which is the *host's* declared
/// status; this is the MCU's own view of its subsystems.
#[derive(Default)]
pub struct SystemStatus {
    pub imu: SensorStatus,
    pub main_battery: SensorStatus,
    pub motor_battery: SensorStatus,
    pub hw_compatible: bool,
}

impl Default for SensorStatus {
    fn default() -> Self {
        SensorStatus::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_record_roundtrips() {
        let rec = ErrorRecord {
            error_id: 7,
            hw_version: 0x0102_0304,
            fw_version: 0x0506_0708,
            payload: [9u8; 54],
        };
        let bytes = rec.to_bytes();
        let back = ErrorRecord::from_bytes(&bytes);
        assert_eq!(back.error_id, rec.error_id);
        assert_eq!(back.hw_version, rec.hw_version);
        assert_eq!(back.fw_version, rec.fw_version);
        assert_eq!(back.payload, rec.payload);
    }

    #[test]
    fn identity_quaternion_is_zero_euler() {
        let e = Quaternion::IDENTITY.to_euler();
        assert!(e.pitch.abs() < 1e-6);
        assert!(e.roll.abs() < 1e-6);
        assert!(e.yaw.abs() < 1e-6);
    }
}
