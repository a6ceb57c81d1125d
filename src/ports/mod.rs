//! Port framework (C9): lifecycle common to motor and sensor ports, plus the
//! `SetPortType` async state machine every port runs when the host rebinds
//! its driver.

pub mod motor;
pub mod sensor;

use crate::state::SensorStatus;

/// Result of a non-blocking presence probe (§4.5 `TestPresence`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum PresenceResult {
    NotPresent,
    Present,
    Unknown,
    Error,
}

impl From<PresenceResult> for SensorStatus {
    fn from(p: PresenceResult) -> Self {
        match p {
            PresenceResult::Present => SensorStatus::Pass,
            PresenceResult::NotPresent | PresenceResult::Error => SensorStatus::Fail,
            PresenceResult::Unknown => SensorStatus::Unknown,
        }
    }
}

/// The lifecycle every driver (motor or sensor) implements (§4.5). `Args` is
/// whatever a concrete driver needs from `UpdateConfiguration` beyond a raw
/// byte span; kept generic so motor and sensor ports can share this trait
/// with different config shapes.
pub trait PortDriver {
    fn init(&mut self);
    /// Begins an asynchronous release; returns `true` once complete. Called
    /// repeatedly by the owning port's `SetPortType` machine until it does.
    fn deinit_step(&mut self) -> bool;
    fn update(&mut self);
    fn update_configuration(&mut self, bytes: &[u8]) -> Result<(), ConfigError>;
    /// Non-blocking presence probe; returns `Some(result)` once settled.
    fn test_presence(&mut self) -> Option<PresenceResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ConfigError {
    LengthError,
    ValueError,
}

/// `SetPortType`'s own state machine (§4.5): `None -> Busy -> DeinitDone ->
/// Done -> None`, with `Error` as a dead end the driving command surfaces as
/// a failed async op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum SetPortTypeState {
    None,
    Busy,
    DeinitDone,
    Done,
    Error,
}

/// Drives one port's `SetPortType` transition. `deinit_step`/`do_bind` are
/// supplied by the caller so this stays generic over motor vs sensor ports.
pub struct SetPortTypeMachine {
    state: SetPortTypeState,
}

impl Default for SetPortTypeMachine {
    fn default() -> Self {
        Self {
            state: SetPortTypeState::None,
        }
    }
}

impl SetPortTypeMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SetPortTypeState {
        self.state
    }

    pub fn start(&mut self) -> bool {
        if self.state == SetPortTypeState::None {
            self.state = SetPortTypeState::Busy;
            true
        } else {
            false
        }
    }

    /// Called each tick while `Busy`, running the outgoing driver's deinit.
    /// `deinit_done` is `true` once the driver reports done.
    pub fn step_deinit(&mut self, deinit_done: bool) {
        if self.state == SetPortTypeState::Busy && deinit_done {
            self.state = SetPortTypeState::DeinitDone;
        }
    }

    /// Called once after `DeinitDone`: bind and init the new driver, then
    /// report success or failure.
    pub fn step_bind(&mut self, bind_ok: bool) {
        if self.state == SetPortTypeState::DeinitDone {
            self.state = if bind_ok {
                SetPortTypeState::Done
            } else {
                SetPortTypeState::Error
            };
        }
    }

    /// Consumed by the command's `GetResult`; resets to `None` once read.
    pub fn take_result(&mut self) -> Option<bool> {
        match self.state {
            SetPortTypeState::Done => {
                self.state = SetPortTypeState::None;
                Some(true)
            }
            SetPortTypeState::Error => {
                self.state = SetPortTypeState::None;
                Some(false)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_rebind() {
        let mut m = SetPortTypeMachine::new();
        assert!(m.start());
        assert_eq!(m.take_result(), None);
        m.step_deinit(true);
        assert_eq!(m.state(), SetPortTypeState::DeinitDone);
        m.step_bind(true);
        assert_eq!(m.take_result(), Some(true));
        assert_eq!(m.state(), SetPortTypeState::None);
    }

    #[test]
    fn bind_failure_reports_false() {
        let mut m = SetPortTypeMachine::new();
        m.start();
        m.step_deinit(true);
        m.step_bind(false);
        assert_eq!(m.take_result(), Some(false));
    }

    #[test]
    fn cannot_start_while_busy() {
        let mut m = SetPortTypeMachine::new();
        assert!(m.start());
        assert!(!m.start());
    }
}
