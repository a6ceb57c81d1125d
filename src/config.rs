//! Compile-time configuration (§6). Centralizes the constants the rest of
//! the core reads, the way `original_source`'s `ProjectConfiguration`
//! component does in the original firmware.

/// Master-link I2C slave address while running the application.
pub const I2C_ADDR_APPLICATION: u8 = 0x2D;
/// Master-link I2C slave address while running the bootloader. Not used by
/// this crate (bootloader is out of scope) but kept here since the
/// bootloader-request path (§6 "Bootloader handoff") needs to know it.
pub const I2C_ADDR_BOOTLOADER: u8 = 0x2B;

/// Master-link rx-timeout, in ticks of the 1 ms scheduler.
pub const RX_TIMEOUT_MS: u32 = 100;
/// Consecutive rx-timeouts before the comms observer raises `ErrorLimitReached`.
pub const RX_TIMEOUT_CONSECUTIVE_LIMIT: u8 = 4;

/// How long after cold start we allow for the host to complete its startup
/// handshake before treating it as absent.
pub const EXPECTED_STARTUP_TIME_MS: u32 = 5_000;
/// How long an update-mode session may run before it's considered stalled.
pub const EXPECTED_UPDATE_TIME_MS: u32 = 120_000;

pub const NUM_MOTOR_PORTS: usize = 6;
pub const NUM_SENSOR_PORTS: usize = 4;
pub const NUM_STATUS_SLOTS: usize = 16;
pub const STATUS_SLOT_RESET_MARKER: usize = 13;

pub const RING_LED_COUNT: usize = 12;
pub const INDICATOR_LED_COUNT: usize = 4;

/// One set of `{detection_V, min_V, max_V}` battery parameters.
pub struct BatteryParams {
    pub detection_v: f32,
    pub min_v: f32,
    pub max_v: f32,
}

// v1 boards divide the battery-sense line down further before the ADC,
// so "plugged in" reads as a lower voltage than on v2 (see DESIGN.md
// OQ-1). `board_v2` is the crate default.
cfg_if::cfg_if! {
    if #[cfg(feature = "board_v1")] {
        const BATTERY_DETECTION_V: f32 = 0.5;
    } else {
        const BATTERY_DETECTION_V: f32 = 1.0;
    }
}

pub const MAIN_BATTERY: BatteryParams = BatteryParams {
    detection_v: BATTERY_DETECTION_V,
    min_v: 6.0,
    max_v: 8.4,
};

pub const MOTOR_BATTERY: BatteryParams = BatteryParams {
    detection_v: BATTERY_DETECTION_V,
    min_v: 6.0,
    max_v: 8.4,
};

pub const BATTERY_EMA_ALPHA: f32 = 0.9;
pub const BATTERY_LOW_ENTER_PCT: f32 = 10.0;
pub const BATTERY_LOW_EXIT_PCT: f32 = 15.0;

/// Motor thermal model coefficients (§4.6).
pub struct MotorThermalParams {
    pub heating_coeff: f32,
    pub cooling_coeff: f32,
    pub resistance_ohm: f32,
    pub t_ambient_c: f32,
    pub t_safe_c: f32,
    pub t_max_c: f32,
}

pub const MOTOR_THERMAL: MotorThermalParams = MotorThermalParams {
    heating_coeff: 0.02,
    cooling_coeff: 0.01,
    resistance_ohm: 1.5,
    t_ambient_c: 25.0,
    t_safe_c: 70.0,
    t_max_c: 100.0,
};

/// Overcurrent derating limit, in amps, beyond which a motor channel's
/// commanded power is scaled down (§4.6).
pub const MOTOR_CURRENT_LIMIT_A: f32 = 1.5;

/// Margin above a resting current reading that counts as "motor present"
/// during the motor presence test (§4.6).
pub const MOTOR_PRESENCE_CURRENT_DELTA_A: f32 = 0.05;
/// How many 1 ms ticks the presence test waits for that current rise.
pub const MOTOR_PRESENCE_TIMEOUT_MS: u32 = 250;
/// Ticks a DRV8833 fault-pin reading must be stable before latching.
pub const MOTOR_FAULT_DEBOUNCE_MS: u32 = 5;

/// HC-SR04 speed-of-sound conversion: `distance_cm = echo_us * 17 / 1000`.
pub const HCSR04_US_TO_CM_NUM: u32 = 17;
pub const HCSR04_US_TO_CM_DEN: u32 = 1_000;

/// Gyro movement detector / offset compensator (§4.8).
pub const GYRO_IDLE_THRESHOLD_DPS: f32 = 2.0;
pub const GYRO_IDLE_SAMPLES_TO_DECLARE_IDLE: u32 = 200;
pub const GYRO_IGNORE_WINDOW_SAMPLES: u32 = 200;
pub const GYRO_OFFSET_AVERAGING_WINDOW: u32 = 1_000;

/// Watchdog kick interval, in ticks of the 1 ms scheduler. Platform
/// datasheet-specific; conservative default.
pub const WATCHDOG_KICK_INTERVAL_MS: u32 = 50;

/// Per-port GPIO pin assignment. Concrete pin/port values are board-layout
/// detail owned by `setup` (out of scope per spec.md); this only records
/// which logical pin role a port index maps to.
#[derive(Clone, Copy)]
pub struct PortPinSet {
    pub gpio0: u8,
    pub gpio1: u8,
}

pub const SENSOR_PORT_PINS: [PortPinSet; NUM_SENSOR_PORTS] = [
    PortPinSet { gpio0: 0, gpio1: 1 },
    PortPinSet { gpio0: 2, gpio1: 3 },
    PortPinSet { gpio0: 4, gpio1: 5 },
    PortPinSet { gpio0: 6, gpio1: 7 },
];

/// Flash journal layout (C13, §6 "Flash layout for error storage").
pub const ERROR_STORAGE_LAYOUT_VERSION: u8 = 1;
pub const ERROR_STORAGE_BLOCK_SIZE: usize = 4_096;
pub const ERROR_STORAGE_OBJECT_SIZE: usize = 64;
pub const ERROR_STORAGE_OBJECTS_PER_BLOCK: usize =
    (ERROR_STORAGE_BLOCK_SIZE - ERROR_STORAGE_OBJECT_SIZE) / ERROR_STORAGE_OBJECT_SIZE;

/// Hardware revisions this firmware build supports (see SPEC_FULL.md §C.1).
pub const HW_VERSION_MIN_SUPPORTED: u32 = 1;
pub const HW_VERSION_MAX_SUPPORTED: u32 = 3;
