//! Status-slot commands (cmd `0x3A`-`0x3C`).

use crate::config::{NUM_STATUS_SLOTS, STATUS_SLOT_RESET_MARKER};
use crate::protocol::Status;
use crate::span::MutSpan;
use crate::status_slots::{Collector, StatusSlotStore};

pub const RESET_MARKER_BYTE: u8 = 0x5A;

pub fn reset(store: &mut StatusSlotStore, collector: &mut Collector) -> Status {
    store.reset_all();
    collector.reset();
    store.write(STATUS_SLOT_RESET_MARKER, &[RESET_MARKER_BYTE]);
    Status::Ok
}

/// Payload is `{slot_idx: u8, enable: u8}`.
pub fn enable_disable(collector: &mut Collector, payload: &[u8]) -> Status {
    let [idx, enable] = payload else {
        return Status::PayloadLengthError;
    };
    if *idx as usize >= NUM_STATUS_SLOTS {
        return Status::CommandError;
    }
    if *enable != 0 {
        collector.enable_slot(*idx as usize);
    } else {
        collector.disable_slot(*idx as usize);
    }
    Status::Ok
}

pub fn poll(collector: &mut Collector, store: &StatusSlotStore, resp: &mut MutSpan<'_>) -> usize {
    collector.read(store, resp.as_mut_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_emits_the_marker_slot() {
        let mut store = StatusSlotStore::new();
        let mut collector = Collector::new();
        collector.enable_slot(STATUS_SLOT_RESET_MARKER);
        assert_eq!(reset(&mut store, &mut collector), Status::Ok);

        let mut buf = [0u8; 16];
        let mut resp = MutSpan::new(&mut buf);
        let n = poll(&mut collector, &store, &mut resp);
        assert_eq!(n, 3);
        assert_eq!(buf[0], STATUS_SLOT_RESET_MARKER as u8);
        assert_eq!(buf[1], 1);
        assert_eq!(buf[2], RESET_MARKER_BYTE);
    }

    #[test]
    fn enable_disable_rejects_bad_payload_length() {
        let mut collector = Collector::new();
        assert_eq!(enable_disable(&mut collector, &[1]), Status::PayloadLengthError);
    }

    #[test]
    fn enable_disable_rejects_out_of_range_slot() {
        let mut collector = Collector::new();
        assert_eq!(enable_disable(&mut collector, &[200, 1]), Status::CommandError);
    }
}
