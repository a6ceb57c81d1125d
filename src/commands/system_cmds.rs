//! Ping, version, master/Bluetooth status, operation mode, and
//! reboot-to-bootloader handlers (cmd `0x00`-`0x0B`).

use crate::async_op::StepResult;
use crate::master_status::MasterStatusObserver;
use crate::protocol::Status;
use crate::span::MutSpan;
use crate::state::{BluetoothStatus, MasterStatus};
use crate::watchdog::{RebootTarget, RestartManager};

pub const HW_VERSION: u32 = 2;
pub const FW_VERSION: u32 = 0x0001_0000;

pub fn ping() -> Status {
    Status::Ok
}

pub fn read_hw_version(resp: &mut MutSpan<'_>) -> usize {
    resp.copy_from(&HW_VERSION.to_le_bytes())
}

pub fn read_fw_version(resp: &mut MutSpan<'_>) -> usize {
    resp.copy_from(&FW_VERSION.to_le_bytes())
}

pub fn set_master_status(observer: &mut MasterStatusObserver, payload: &[u8]) -> Status {
    let Some(&raw) = payload.first() else {
        return Status::PayloadLengthError;
    };
    match MasterStatus::try_from(raw) {
        Ok(status) => {
            observer.set_status(status);
            Status::Ok
        }
        Err(_) => Status::CommandError,
    }
}

pub fn set_bluetooth_status(observer: &mut MasterStatusObserver, payload: &[u8]) -> Status {
    let Some(&raw) = payload.first() else {
        return Status::PayloadLengthError;
    };
    match BluetoothStatus::try_from(raw) {
        Ok(status) => {
            observer.set_bluetooth(status);
            Status::Ok
        }
        Err(_) => Status::CommandError,
    }
}

/// "returns 'app'" (§6): a single tag byte distinguishing this firmware
/// from the bootloader's own disjoint command set, for a host that can't
/// otherwise tell which one answered.
pub const OPERATION_MODE_APPLICATION: u8 = 0;

pub fn get_operation_mode(resp: &mut MutSpan<'_>) -> usize {
    resp.copy_from(&[OPERATION_MODE_APPLICATION])
}

/// `RebootToBootloader`'s async worker: on the first step, write the
/// sentinel registers and ask the restart manager to reboot once the
/// response finishes transmitting; it then reports done immediately (the
/// actual reset happens out-of-band, driven by TX-complete).
pub fn reboot_to_bootloader_step(
    restart: &mut RestartManager,
    write_sentinel: impl FnOnce(),
) -> StepResult<()> {
    write_sentinel();
    restart.request_reboot(RebootTarget::Bootloader);
    StepResult::Ok(())
}

/// Reset orientation (cmd `0x41`): zeroes the orientation estimator's turn
/// count and last-yaw tracking (§4.8 "on Reset, turn count and last-yaw are
/// zeroed").
pub fn reset_orientation(estimator: &mut crate::imu::OrientationEstimator) -> Status {
    estimator.reset();
    Status::Ok
}

/// Hardware-revision compatibility gate (SPEC_FULL.md §C.1), checked once
/// at cold start against the board's reported hardware version. A mismatch
/// doesn't halt the system, it's recorded as a startup warning.
pub fn hw_version_supported(hw_version: u32) -> bool {
    (crate::config::HW_VERSION_MIN_SUPPORTED..=crate::config::HW_VERSION_MAX_SUPPORTED).contains(&hw_version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_is_always_ok() {
        assert_eq!(ping(), Status::Ok);
    }

    #[test]
    fn hw_version_gate_accepts_supported_range_and_rejects_outside_it() {
        assert!(hw_version_supported(crate::config::HW_VERSION_MIN_SUPPORTED));
        assert!(hw_version_supported(crate::config::HW_VERSION_MAX_SUPPORTED));
        assert!(!hw_version_supported(crate::config::HW_VERSION_MAX_SUPPORTED + 1));
        assert!(!hw_version_supported(0));
    }

    #[test]
    fn set_master_status_rejects_out_of_range_enum() {
        let mut o = MasterStatusObserver::new();
        assert_eq!(set_master_status(&mut o, &[200]), Status::CommandError);
    }

    #[test]
    fn set_master_status_accepts_and_applies_valid_enum() {
        let mut o = MasterStatusObserver::new();
        assert_eq!(set_master_status(&mut o, &[MasterStatus::Controlled as u8]), Status::Ok);
        assert_eq!(o.status, MasterStatus::Controlled);
    }

    #[test]
    fn set_master_status_rejects_empty_payload() {
        let mut o = MasterStatusObserver::new();
        assert_eq!(set_master_status(&mut o, &[]), Status::PayloadLengthError);
    }

    #[test]
    fn operation_mode_reports_application_tag() {
        let mut buf = [0u8; 4];
        let mut span = MutSpan::new(&mut buf);
        let n = get_operation_mode(&mut span);
        assert_eq!(n, 1);
        assert_eq!(buf[0], OPERATION_MODE_APPLICATION);
    }

    #[test]
    fn reboot_step_schedules_restart_manager() {
        let mut restart = RestartManager::new();
        let mut sentinel_written = false;
        let result = reboot_to_bootloader_step(&mut restart, || sentinel_written = true);
        assert!(sentinel_written);
        assert_eq!(result, StepResult::Ok(()));
        assert_eq!(restart.poll(), None); // waits for tx complete
        restart.on_tx_complete();
        assert_eq!(restart.poll(), Some(RebootTarget::Bootloader));
    }
}
