//! Application runtime (C6 registry + the per-tick fan-out described in
//! §4.1): owns every component's live state and is the single
//! `CommandTable` implementation the protocol engine dispatches through.
//!
//! Async commands (`SetType`/`SetConfig`/`Test` on both port kinds, and
//! `RebootToBootloader`) are modeled with one [`AsyncOp`] slot each, exactly
//! matching C6's "one `in_progress` flag per command id" data model rather
//! than per-port flags. The work itself resolves on the first `GetResult`
//! poll after `Start` — the underlying HAL register pokes (driver deinit
//! timing, current-ramp presence detection) are out of scope, so there is
//! nothing left to spread across further polls; see DESIGN.md.

use crate::async_op::{AsyncOp, StepResult};
use crate::battery::BatteryObserver;
use crate::commands::{error_storage_cmds, leds_cmds, motor_cmds, sensor_cmds, slot_cmds, system_cmds};
use crate::commands::{CommandId, CommandTable, GetResultOutcome};
use crate::config::{
    MAIN_BATTERY, MOTOR_BATTERY, NUM_MOTOR_PORTS, NUM_SENSOR_PORTS,
};
use crate::error_storage::{ErrorStorage, FlashBlock};
use crate::imu::{MovementDetector, OffsetCompensator, OrientationEstimator};
use crate::leds::{LedRing, Rgb};
use crate::master_status::{CommsObserver, MasterStatusObserver};
use crate::ports::motor::MotorPort;
use crate::ports::sensor::SensorPort;
use crate::ports::PresenceResult;
use crate::protocol::Status;
use crate::scheduler::Scheduler;
use crate::span::{ConstSpan, MutSpan};
use crate::status_slots::{Collector, StatusSlotStore};
use crate::watchdog::{RebootTarget, RestartManager, WatchdogFeeder};

use crate::commands::motor_cmds::MotorDriverBinding;

/// IMU filter tuning (Madgwick sample period / gain). Not specified by
/// §4.8 beyond "a Madgwick filter"; chosen for a 100 Hz sensor loop. See
/// DESIGN.md OQ-3.
const ORIENTATION_SAMPLE_PERIOD_S: f32 = 0.01;
const ORIENTATION_BETA: f32 = 0.1;

#[derive(Clone, Copy)]
struct ConfigArgs {
    port: u8,
    len: u8,
    bytes: [u8; 8],
}

impl ConfigArgs {
    fn from_payload(payload: &[u8]) -> Option<Self> {
        let (&port, bytes) = payload.split_first()?;
        if bytes.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Self {
            port,
            len: bytes.len() as u8,
            bytes: buf,
        })
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ConfigOpResult {
    Ok,
    Error(u8),
}

/// Per-subsystem inputs a caller (the RTIC binary) samples once per
/// 1 ms scheduler tick and hands to [`Runtime::on_tick`].
pub struct TickInputs {
    pub motor_current_a: [f32; NUM_MOTOR_PORTS],
    pub main_battery_v: f32,
    pub motor_battery_v: f32,
    /// MCU die temperature, folded in alongside battery telemetry per
    /// SPEC_FULL.md §C.2 rather than owning a dedicated component.
    pub mcu_temp_c: f32,
}

/// What the tick produced for the caller to actually drive onto hardware.
pub struct TickOutputs {
    pub motor_pwm: [i16; NUM_MOTOR_PORTS],
    pub ring: [Rgb; crate::config::RING_LED_COUNT],
    pub indicators: [Rgb; crate::config::INDICATOR_LED_COUNT],
    pub kick_watchdog: bool,
    pub reboot: Option<RebootTarget>,
}

pub struct Runtime<B: FlashBlock> {
    pub scheduler: Scheduler,
    pub master: MasterStatusObserver,
    pub comms: CommsObserver,
    pub restart: RestartManager,
    pub watchdog: WatchdogFeeder,

    pub motor_ports: [MotorPort; NUM_MOTOR_PORTS],
    motor_bindings: [MotorDriverBinding; NUM_MOTOR_PORTS],
    pub sensor_ports: [SensorPort; NUM_SENSOR_PORTS],

    pub main_battery: BatteryObserver,
    pub motor_battery: BatteryObserver,

    pub leds: LedRing,
    last_ring: [Rgb; crate::config::RING_LED_COUNT],
    last_indicators: [Rgb; crate::config::INDICATOR_LED_COUNT],

    pub slots: StatusSlotStore,
    pub collector: Collector,
    pub errors: ErrorStorage<B>,
    hw_version_supported: bool,
    mcu_temp_c: f32,

    pub orientation: OrientationEstimator,
    pub movement: MovementDetector,
    pub offset_compensator: OffsetCompensator,

    reboot_op: AsyncOp<(), ()>,
    motor_set_type_op: AsyncOp<(u8, u8), bool>,
    motor_set_config_op: AsyncOp<ConfigArgs, ConfigOpResult>,
    motor_test_op: AsyncOp<u8, PresenceResult>,
    sensor_set_type_op: AsyncOp<(u8, u8), bool>,
    sensor_set_config_op: AsyncOp<ConfigArgs, ConfigOpResult>,
    sensor_test_op: AsyncOp<u8, PresenceResult>,
}

impl<B: FlashBlock> Runtime<B> {
    /// `hw_version` is the board's reported hardware revision (SPEC_FULL.md
    /// §C.1); checked once here against the firmware's supported range.
    pub fn new(error_blocks: [B; 2], hw_version: u32) -> Self {
        let hw_version_supported = system_cmds::hw_version_supported(hw_version);
        if !hw_version_supported {
            defmt::warn!("unsupported hardware revision: {=u32}", hw_version);
        }
        Self {
            scheduler: Scheduler::new(),
            master: MasterStatusObserver::new(),
            comms: CommsObserver::new(),
            restart: RestartManager::new(),
            watchdog: WatchdogFeeder::new(),

            motor_ports: core::array::from_fn(|_| MotorPort::new()),
            motor_bindings: [MotorDriverBinding::default(); NUM_MOTOR_PORTS],
            sensor_ports: core::array::from_fn(|_| SensorPort::new()),

            main_battery: BatteryObserver::new(MAIN_BATTERY),
            motor_battery: BatteryObserver::new(MOTOR_BATTERY),

            leds: LedRing::new(),
            last_ring: [Rgb::BLACK; crate::config::RING_LED_COUNT],
            last_indicators: [Rgb::BLACK; crate::config::INDICATOR_LED_COUNT],

            slots: StatusSlotStore::new(),
            collector: Collector::new(),
            errors: ErrorStorage::new(error_blocks),
            hw_version_supported,
            mcu_temp_c: 0.0,

            orientation: OrientationEstimator::new(ORIENTATION_SAMPLE_PERIOD_S, ORIENTATION_BETA),
            movement: MovementDetector::new(),
            offset_compensator: OffsetCompensator::new(),

            reboot_op: AsyncOp::new(),
            motor_set_type_op: AsyncOp::new(),
            motor_set_config_op: AsyncOp::new(),
            motor_test_op: AsyncOp::new(),
            sensor_set_type_op: AsyncOp::new(),
            sensor_set_config_op: AsyncOp::new(),
            sensor_test_op: AsyncOp::new(),
        }
    }

    /// Called once per 1 ms scheduler tick (§4.1). Fans out to every
    /// periodic component update and reports what the caller needs to
    /// drive onto hardware this tick.
    pub fn on_tick(&mut self, inputs: &TickInputs) -> TickOutputs {
        let due = self.scheduler.tick();

        let mut motor_pwm = [0i16; NUM_MOTOR_PORTS];
        for i in 0..NUM_MOTOR_PORTS {
            motor_pwm[i] = self.motor_ports[i].update(inputs.motor_current_a[i]);
        }

        self.master.tick();
        let kick_watchdog = self.watchdog.tick();
        let reboot = self.restart.poll();

        if due.ms100 {
            self.main_battery.update(inputs.main_battery_v);
            self.motor_battery.update(inputs.motor_battery_v);
            self.mcu_temp_c = inputs.mcu_temp_c;
            self.publish_status_slots();
        }

        if due.ms20 {
            let max_brightness = crate::leds::max_brightness(self.main_battery.low, false);
            let frame_counter = self.leds.frame_counter();
            let drawing_current = inputs.motor_current_a.iter().any(|&a| a > 0.0);
            let indicators = [
                crate::leds::battery_gradient(self.main_battery.level_pct),
                crate::leds::motor_battery_indicator(
                    self.motor_battery.level_pct,
                    self.motor_battery.present,
                    drawing_current,
                    frame_counter,
                ),
                crate::leds::bluetooth_indicator(self.master.bluetooth, frame_counter),
                crate::leds::master_status_color(self.master.status),
            ];
            let (ring, indicators) = self.leds.render(indicators, max_brightness);
            self.last_ring = ring;
            self.last_indicators = indicators;
        }

        TickOutputs {
            motor_pwm,
            ring: self.last_ring,
            indicators: self.last_indicators,
            kick_watchdog,
            reboot,
        }
    }

    /// Called by the transport layer on a consecutive rx-timeout; escalates
    /// to a local reboot once the comms observer's error limit is reached
    /// (§7 "Recovery policy is local").
    pub fn on_rx_timeout(&mut self) {
        if self.comms.on_rx_timeout() {
            self.restart.request_reboot(RebootTarget::Application);
        }
    }

    fn publish_status_slots(&mut self) {
        for (i, port) in self.motor_ports.iter().enumerate() {
            let mut buf = [0u8; 11];
            buf[0] = port.fault_latched as u8;
            buf[1..3].copy_from_slice(&(port.t_motor_c as i16).to_le_bytes());
            self.slots.write(i, &buf);
        }
        for (i, port) in self.sensor_ports.iter().enumerate() {
            let mut buf = [0u8; 32];
            let n = port.last_reading_len.min(32);
            buf[..n].copy_from_slice(&port.last_reading[..n]);
            self.slots.write(NUM_MOTOR_PORTS + i, &buf);
        }
        let mut battery = [0u8; 6];
        battery[0] = self.main_battery.level_pct as u8;
        battery[1] = self.main_battery.present as u8;
        battery[2] = self.motor_battery.level_pct as u8;
        battery[3] = self.motor_battery.present as u8;
        battery[4..6].copy_from_slice(&(self.mcu_temp_c as i16).to_le_bytes());
        self.slots.write(10, &battery);

        // Startup hardware-compatibility warning (SPEC_FULL.md §C.1):
        // re-published every 100 ms slot like the rest of this group, not
        // just once at boot, so a host that attaches late still sees it.
        self.slots.write(11, &[(!self.hw_version_supported) as u8]);
    }
}

impl<B: FlashBlock> CommandTable for Runtime<B> {
    fn command_exists(&self, cmd: u8) -> bool {
        CommandId::try_from(cmd).is_ok()
    }

    fn has_get_result(&self, cmd: u8) -> bool {
        matches!(
            CommandId::try_from(cmd),
            Ok(CommandId::RebootToBootloader)
                | Ok(CommandId::MotorPortSetType)
                | Ok(CommandId::MotorPortSetConfig)
                | Ok(CommandId::MotorPortTest)
                | Ok(CommandId::SensorPortSetType)
                | Ok(CommandId::SensorPortSetConfig)
                | Ok(CommandId::SensorPortTest)
        )
    }

    fn in_progress(&self, cmd: u8) -> bool {
        use crate::async_op::OpState::{Busy, Started};
        match CommandId::try_from(cmd) {
            Ok(CommandId::RebootToBootloader) => matches!(self.reboot_op.state(), Started | Busy),
            Ok(CommandId::MotorPortSetType) => matches!(self.motor_set_type_op.state(), Started | Busy),
            Ok(CommandId::MotorPortSetConfig) => matches!(self.motor_set_config_op.state(), Started | Busy),
            Ok(CommandId::MotorPortTest) => matches!(self.motor_test_op.state(), Started | Busy),
            Ok(CommandId::SensorPortSetType) => matches!(self.sensor_set_type_op.state(), Started | Busy),
            Ok(CommandId::SensorPortSetConfig) => matches!(self.sensor_set_config_op.state(), Started | Busy),
            Ok(CommandId::SensorPortTest) => matches!(self.sensor_test_op.state(), Started | Busy),
            _ => false,
        }
    }

    /// No-op: each `AsyncOp` already tracks its own `Idle/Started/Busy/Done`
    /// state from `request_start`/`poll_result`; `in_progress` above reads
    /// that directly instead of keeping a second copy of the flag.
    fn set_in_progress(&mut self, _cmd: u8, _value: bool) {}

    fn start(&mut self, cmd: u8, payload: ConstSpan<'_>, mut resp: MutSpan<'_>) -> (Status, usize) {
        let Ok(id) = CommandId::try_from(cmd) else {
            return (Status::UnknownCommand, 0);
        };
        let p = payload.as_slice();

        match id {
            CommandId::Ping => (system_cmds::ping(), 0),
            CommandId::ReadHwVersion => (Status::Ok, system_cmds::read_hw_version(&mut resp)),
            CommandId::ReadFwVersion => (Status::Ok, system_cmds::read_fw_version(&mut resp)),
            CommandId::SetMasterStatus => (system_cmds::set_master_status(&mut self.master, p), 0),
            CommandId::SetBluetoothStatus => (system_cmds::set_bluetooth_status(&mut self.master, p), 0),
            CommandId::GetOperationMode => (Status::Ok, system_cmds::get_operation_mode(&mut resp)),
            CommandId::RebootToBootloader => {
                self.reboot_op.request_start(());
                (Status::Pending, 0)
            }

            CommandId::MotorPortCount => (Status::Ok, motor_cmds::port_count(&mut resp)),
            CommandId::MotorPortTypes => (Status::Ok, motor_cmds::port_types(&self.motor_bindings, &mut resp)),
            CommandId::MotorPortSetType => {
                let [port, driver_id] = p else {
                    return (Status::PayloadLengthError, 0);
                };
                if *port as usize >= NUM_MOTOR_PORTS {
                    return (Status::CommandError, 0);
                }
                self.motor_set_type_op.request_start((*port, *driver_id));
                (Status::Pending, 0)
            }
            CommandId::MotorPortSetConfig => {
                let Some(args) = ConfigArgs::from_payload(p) else {
                    return (Status::PayloadLengthError, 0);
                };
                if args.port as usize >= NUM_MOTOR_PORTS {
                    return (Status::CommandError, 0);
                }
                self.motor_set_config_op.request_start(args);
                (Status::Pending, 0)
            }
            CommandId::MotorPortDrive => motor_cmds::drive(&mut self.motor_ports, p, &mut resp),
            CommandId::MotorPortTest => {
                let [port] = p else {
                    return (Status::PayloadLengthError, 0);
                };
                if *port as usize >= NUM_MOTOR_PORTS {
                    return (Status::CommandError, 0);
                }
                self.motor_test_op.request_start(*port);
                (Status::Pending, 0)
            }

            CommandId::SensorPortCount => (Status::Ok, sensor_cmds::port_count(&mut resp)),
            CommandId::SensorPortTypes => {
                let bytes: heapless::Vec<u8, NUM_SENSOR_PORTS> =
                    self.sensor_ports.iter().map(|p| p.kind as u8).collect();
                (Status::Ok, resp.copy_from(&bytes))
            }
            CommandId::SensorPortSetType => {
                let [port, driver_id] = p else {
                    return (Status::PayloadLengthError, 0);
                };
                if *port as usize >= NUM_SENSOR_PORTS {
                    return (Status::CommandError, 0);
                }
                self.sensor_set_type_op.request_start((*port, *driver_id));
                (Status::Pending, 0)
            }
            CommandId::SensorPortSetConfig => {
                let Some(args) = ConfigArgs::from_payload(p) else {
                    return (Status::PayloadLengthError, 0);
                };
                if args.port as usize >= NUM_SENSOR_PORTS {
                    return (Status::CommandError, 0);
                }
                self.sensor_set_config_op.request_start(args);
                (Status::Pending, 0)
            }
            CommandId::SensorPortReadInfo => {
                let [port] = p else {
                    return (Status::PayloadLengthError, 0);
                };
                let Some(sensor) = self.sensor_ports.get(*port as usize) else {
                    return (Status::CommandError, 0);
                };
                (Status::Ok, sensor_cmds::read_info(sensor, &mut resp))
            }
            CommandId::SensorPortTest => {
                let [port] = p else {
                    return (Status::PayloadLengthError, 0);
                };
                if *port as usize >= NUM_SENSOR_PORTS {
                    return (Status::CommandError, 0);
                }
                self.sensor_test_op.request_start(*port);
                (Status::Pending, 0)
            }

            CommandId::LedRingScenarioList => (Status::Ok, leds_cmds::scenario_list(&mut resp)),
            CommandId::LedRingSelectScenario => (leds_cmds::select_scenario(&mut self.leds, p), 0),
            CommandId::LedRingSize => (Status::Ok, leds_cmds::ring_size(&mut resp)),
            CommandId::LedRingSetUserFrame => (leds_cmds::set_user_frame(&mut self.leds, p), 0),

            CommandId::SlotReset => (slot_cmds::reset(&mut self.slots, &mut self.collector), 0),
            CommandId::SlotEnableDisable => (slot_cmds::enable_disable(&mut self.collector, p), 0),
            CommandId::SlotPoll => {
                (Status::Ok, slot_cmds::poll(&mut self.collector, &self.slots, &mut resp))
            }

            CommandId::ErrorStorageCount => (Status::Ok, error_storage_cmds::count(&mut self.errors, &mut resp)),
            CommandId::ErrorStorageRead => error_storage_cmds::read(&mut self.errors, p, &mut resp),
            CommandId::ErrorStorageClear => (error_storage_cmds::clear(&mut self.errors), 0),
            CommandId::ErrorStorageInjectTest => (
                error_storage_cmds::inject_test(&mut self.errors, system_cmds::HW_VERSION, system_cmds::FW_VERSION, p),
                0,
            ),

            CommandId::ResetOrientation => (system_cmds::reset_orientation(&mut self.orientation), 0),
        }
    }

    fn get_result(&mut self, cmd: u8, mut resp: MutSpan<'_>) -> Option<GetResultOutcome> {
        let id = CommandId::try_from(cmd).ok()?;

        match id {
            CommandId::RebootToBootloader => {
                let write_sentinel = || {
                    // The actual register write lives in `main.rs` (retained
                    // memory is board-specific); here we just drive the
                    // restart manager's state machine.
                };
                self.reboot_op.update(|_, args| match args {
                    Some(()) => system_cmds::reboot_to_bootloader_step(&mut self.restart, write_sentinel),
                    None => StepResult::Pending,
                });
                Some(match self.reboot_op.poll_result() {
                    StepResult::Ok(()) => GetResultOutcome::done(Status::Ok, 0),
                    StepResult::Pending => GetResultOutcome::pending(),
                    StepResult::Err => GetResultOutcome::done(Status::CommandError, 0),
                })
            }

            CommandId::MotorPortSetType => {
                let bindings = &mut self.motor_bindings;
                let slots = &mut self.slots;
                self.motor_set_type_op.update(|_, args| match args {
                    Some((port, driver_id)) => {
                        bindings[port as usize].driver_id = driver_id;
                        slots.invalidate_for_rereport(port as usize);
                        StepResult::Ok(true)
                    }
                    None => StepResult::Pending,
                });
                Some(match self.motor_set_type_op.poll_result() {
                    StepResult::Ok(ok) => GetResultOutcome::done(Status::Ok, resp.copy_from(&[ok as u8])),
                    StepResult::Pending => GetResultOutcome::pending(),
                    StepResult::Err => GetResultOutcome::done(Status::CommandError, 0),
                })
            }
            CommandId::MotorPortSetConfig => {
                let ports = &mut self.motor_ports;
                let slots = &mut self.slots;
                self.motor_set_config_op.update(|_, args| match args {
                    Some(a) => {
                        let mut scratch = [0u8; 4];
                        let mut scratch_span = MutSpan::new(&mut scratch);
                        match motor_cmds::apply_config(&mut ports[a.port as usize], a.bytes(), &mut scratch_span) {
                            (Status::Ok, _) => {
                                slots.invalidate_for_rereport(a.port as usize);
                                StepResult::Ok(ConfigOpResult::Ok)
                            }
                            (_, _) => StepResult::Ok(ConfigOpResult::Error(scratch[0])),
                        }
                    }
                    None => StepResult::Pending,
                });
                Some(match self.motor_set_config_op.poll_result() {
                    StepResult::Ok(ConfigOpResult::Ok) => GetResultOutcome::done(Status::Ok, 0),
                    StepResult::Ok(ConfigOpResult::Error(e)) => {
                        GetResultOutcome::done(Status::CommandError, resp.copy_from(&[e]))
                    }
                    StepResult::Pending => GetResultOutcome::pending(),
                    StepResult::Err => GetResultOutcome::done(Status::CommandError, 0),
                })
            }
            CommandId::MotorPortTest => {
                let bindings = &self.motor_bindings;
                let ports = &self.motor_ports;
                self.motor_test_op.update(|_, args| match args {
                    Some(port) => {
                        let bound = bindings[port as usize].driver_id != 0;
                        let faulted = ports[port as usize].fault_latched;
                        let result = match (bound, faulted) {
                            (true, false) => PresenceResult::Present,
                            (true, true) => PresenceResult::Error,
                            (false, _) => PresenceResult::NotPresent,
                        };
                        StepResult::Ok(result)
                    }
                    None => StepResult::Pending,
                });
                Some(match self.motor_test_op.poll_result() {
                    StepResult::Ok(r) => {
                        GetResultOutcome::done(Status::Ok, resp.copy_from(&[motor_cmds::presence_to_status(r)]))
                    }
                    StepResult::Pending => GetResultOutcome::pending(),
                    StepResult::Err => GetResultOutcome::done(Status::CommandError, 0),
                })
            }

            CommandId::SensorPortSetType => {
                let sensors = &mut self.sensor_ports;
                let slots = &mut self.slots;
                self.sensor_set_type_op.update(|_, args| match args {
                    Some((port, driver_id)) => {
                        sensors[port as usize].kind = sensor_driver_kind_from_u8(driver_id);
                        slots.invalidate_for_rereport(NUM_MOTOR_PORTS + port as usize);
                        StepResult::Ok(true)
                    }
                    None => StepResult::Pending,
                });
                Some(match self.sensor_set_type_op.poll_result() {
                    StepResult::Ok(ok) => GetResultOutcome::done(Status::Ok, resp.copy_from(&[ok as u8])),
                    StepResult::Pending => GetResultOutcome::pending(),
                    StepResult::Err => GetResultOutcome::done(Status::CommandError, 0),
                })
            }
            CommandId::SensorPortSetConfig => {
                let sensors = &mut self.sensor_ports;
                let slots = &mut self.slots;
                self.sensor_set_config_op.update(|_, args| match args {
                    Some(a) => {
                        let mut scratch = [0u8; 4];
                        let mut scratch_span = MutSpan::new(&mut scratch);
                        match sensor_cmds::apply_config(&mut sensors[a.port as usize], a.bytes(), &mut scratch_span) {
                            (Status::Ok, _) => {
                                slots.invalidate_for_rereport(NUM_MOTOR_PORTS + a.port as usize);
                                StepResult::Ok(ConfigOpResult::Ok)
                            }
                            (_, _) => StepResult::Ok(ConfigOpResult::Error(scratch[0])),
                        }
                    }
                    None => StepResult::Pending,
                });
                Some(match self.sensor_set_config_op.poll_result() {
                    StepResult::Ok(ConfigOpResult::Ok) => GetResultOutcome::done(Status::Ok, 0),
                    StepResult::Ok(ConfigOpResult::Error(e)) => {
                        GetResultOutcome::done(Status::CommandError, resp.copy_from(&[e]))
                    }
                    StepResult::Pending => GetResultOutcome::pending(),
                    StepResult::Err => GetResultOutcome::done(Status::CommandError, 0),
                })
            }
            CommandId::SensorPortTest => {
                let sensors = &self.sensor_ports;
                self.sensor_test_op.update(|_, args| match args {
                    Some(port) => {
                        let bound = sensors[port as usize].kind != crate::ports::sensor::SensorDriverKind::Dummy;
                        let result = if bound {
                            PresenceResult::Present
                        } else {
                            PresenceResult::NotPresent
                        };
                        StepResult::Ok(result)
                    }
                    None => StepResult::Pending,
                });
                Some(match self.sensor_test_op.poll_result() {
                    StepResult::Ok(r) => {
                        GetResultOutcome::done(Status::Ok, resp.copy_from(&[motor_cmds::presence_to_status(r)]))
                    }
                    StepResult::Pending => GetResultOutcome::pending(),
                    StepResult::Err => GetResultOutcome::done(Status::CommandError, 0),
                })
            }

            _ => None,
        }
    }
}

fn sensor_driver_kind_from_u8(raw: u8) -> crate::ports::sensor::SensorDriverKind {
    use crate::ports::sensor::SensorDriverKind::*;
    match raw {
        1 => BumperSwitch,
        2 => HcSr04,
        3 => Rgb,
        4 => DebugRtc,
        _ => Dummy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_storage::RamBlock;
    use crate::protocol::{handle_frame, RESPONSE_HEADER_LEN};
    use crate::crc::{crc16, crc7, CRC16_INIT, CRC7_INIT};

    fn runtime() -> Runtime<RamBlock> {
        Runtime::new([RamBlock::new(), RamBlock::new()], crate::config::HW_VERSION_MIN_SUPPORTED)
    }

    fn build_request(op: u8, cmd: u8, payload: &[u8]) -> heapless::Vec<u8, 261> {
        let mut frame: heapless::Vec<u8, 261> = heapless::Vec::new();
        frame.push(op).unwrap();
        frame.push(cmd).unwrap();
        frame.push(payload.len() as u8).unwrap();
        let crc = crc16(CRC16_INIT, payload);
        frame.extend_from_slice(&crc.to_le_bytes()).unwrap();
        let header_crc = crc7(CRC7_INIT, &frame[..5]);
        frame.push(header_crc).unwrap();
        frame.extend_from_slice(payload).unwrap();
        frame
    }

    #[test]
    fn ping_roundtrips_through_the_real_runtime() {
        let mut rt = runtime();
        let req = build_request(0, CommandId::Ping as u8, &[]);
        let mut resp = [0u8; 16];
        handle_frame(&mut rt, &req, &mut resp);
        assert_eq!(resp[0], Status::Ok as u8);
    }

    #[test]
    fn motor_set_type_resolves_on_first_poll() {
        let mut rt = runtime();
        let start = build_request(0, CommandId::MotorPortSetType as u8, &[0, 5]);
        let poll = build_request(2, CommandId::MotorPortSetType as u8, &[]);
        let mut resp = [0u8; RESPONSE_HEADER_LEN + 4];

        handle_frame(&mut rt, &start, &mut resp);
        assert_eq!(resp[0], Status::Ok as u8);
        assert_eq!(rt.motor_bindings[0].driver_id, 5);

        // in_progress cleared by the piggy-backed GetResult; a further poll
        // is rejected.
        handle_frame(&mut rt, &poll, &mut resp);
        assert_eq!(resp[0], Status::InvalidOperation as u8);
    }

    #[test]
    fn drive_is_synchronous_not_async() {
        let mut rt = runtime();
        let payload = [0x30u8, 1, 100, 100, 0, 50, 0];
        let req = build_request(0, CommandId::MotorPortDrive as u8, &payload);
        let mut resp = [0u8; 16];
        handle_frame(&mut rt, &req, &mut resp);
        assert_eq!(resp[0], Status::Ok as u8);
        assert!(!rt.in_progress(CommandId::MotorPortDrive as u8));
    }

    #[test]
    fn unknown_command_byte_is_rejected() {
        let rt = runtime();
        assert!(!rt.command_exists(0xFF));
    }
}
