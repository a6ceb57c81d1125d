//! Watchdog feeder and restart manager (C15): a periodic hardware-watchdog
//! kick plus a deliberate, delayed reboot driven off the master link's
//! TX-complete event so the current response always finishes transmitting
//! first (§7 "Recovery policy is local").

use crate::config::WATCHDOG_KICK_INTERVAL_MS;
use crate::state::StartupReason;

/// Ticks since boot modulo the kick interval; `true` on ticks where the
/// hardware watchdog counter (owned by the caller, out of scope) should be
/// refreshed.
pub struct WatchdogFeeder {
    ticks_since_kick: u32,
}

impl Default for WatchdogFeeder {
    fn default() -> Self {
        Self { ticks_since_kick: 0 }
    }
}

impl WatchdogFeeder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&mut self) -> bool {
        self.ticks_since_kick += 1;
        if self.ticks_since_kick >= WATCHDOG_KICK_INTERVAL_MS {
            self.ticks_since_kick = 0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum RebootTarget {
    Application,
    Bootloader,
}

/// Reset-cause decode for the `StartupReason` published at boot (§3
/// "Lifecycles"). The four retained-memory sentinel registers are checked
/// first since they're only meaningful right after a bootloader-handoff
/// reboot; otherwise the MCU reset-controller cause wins.
pub fn decode_startup_reason(sentinel_regs: [u32; 4], watchdog_reset: bool, brown_out_reset: bool) -> StartupReason {
    if sentinel_regs.iter().all(|&r| r == 0xFFFF_FFFF) {
        StartupReason::BootloaderRequested
    } else if watchdog_reset {
        StartupReason::WatchdogReset
    } else if brown_out_reset {
        StartupReason::BrownOutReset
    } else {
        StartupReason::ColdStart
    }
}

/// Pending values for the sentinel registers a `RebootToBootloader` command
/// writes before resetting (§6 "Bootloader handoff").
pub const BOOTLOADER_SENTINEL: [u32; 4] = [0xFFFF_FFFF; 4];

/// Restart manager's delayed-reboot state machine: waits for the in-flight
/// response to finish transmitting (signaled by the caller via
/// `on_tx_complete`) before the reset actually fires.
pub struct RestartManager {
    pending: Option<RebootTarget>,
    tx_complete: bool,
}

impl Default for RestartManager {
    fn default() -> Self {
        Self {
            pending: None,
            tx_complete: false,
        }
    }
}

impl RestartManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_reboot(&mut self, target: RebootTarget) {
        self.pending = Some(target);
        self.tx_complete = false;
    }

    pub fn on_tx_complete(&mut self) {
        self.tx_complete = true;
    }

    /// Polled each tick; returns the target once it's safe to reset.
    pub fn poll(&mut self) -> Option<RebootTarget> {
        if self.tx_complete {
            self.pending.take()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watchdog_kicks_at_fixed_interval() {
        let mut fb = WatchdogFeeder::new();
        let mut kicks = 0;
        for _ in 0..WATCHDOG_KICK_INTERVAL_MS * 3 {
            if fb.tick() {
                kicks += 1;
            }
        }
        assert_eq!(kicks, 3);
    }

    #[test]
    fn sentinel_registers_take_priority_over_reset_cause() {
        let reason = decode_startup_reason(BOOTLOADER_SENTINEL, true, true);
        assert_eq!(reason, StartupReason::BootloaderRequested);
    }

    #[test]
    fn watchdog_reset_decoded_without_sentinel() {
        let reason = decode_startup_reason([0, 0, 0, 0], true, false);
        assert_eq!(reason, StartupReason::WatchdogReset);
    }

    #[test]
    fn reboot_waits_for_tx_complete() {
        let mut rm = RestartManager::new();
        rm.request_reboot(RebootTarget::Bootloader);
        assert_eq!(rm.poll(), None);
        rm.on_tx_complete();
        assert_eq!(rm.poll(), Some(RebootTarget::Bootloader));
        assert_eq!(rm.poll(), None);
    }
}
