//! Status-slot store and collector (C8): 16 versioned mailboxes the host
//! polls, plus a per-reader cursor that resumes across `Read` calls that
//! run out of output buffer.

use crate::config::NUM_STATUS_SLOTS;

/// Top bit of a slot's version marks "no content"; the low 7 bits are a
/// mod-128 change counter.
const INVALID_BIT: u8 = 0x80;

fn version_is_valid(v: u8) -> bool {
    v & INVALID_BIT == 0
}

/// Fixed maximum payload sizes, one per slot index, per §4.4. Slot 13 is
/// the one-byte reset marker (§6, status-slot poll).
pub const SLOT_SIZES: [usize; NUM_STATUS_SLOTS] = [
    11, 11, 11, 11, 11, 11, // 0-5: six motor ports
    32, 32, 32, 32, // 6-9: four sensor ports
    4, // 10: battery
    6, // 11: accel/gyro
    12, // 12: orientation
    1, // 13: reset marker
    6, // 14: spare (accel/gyro aux), sized like 11 for symmetry
    4, // 15: spare (battery aux)
];

pub const MAX_SLOT_SIZE: usize = 32;

struct Slot {
    data: [u8; MAX_SLOT_SIZE],
    len: usize,
    version: u8,
}

impl Slot {
    const fn new(len: usize) -> Self {
        Self {
            data: [0u8; MAX_SLOT_SIZE],
            len,
            version: INVALID_BIT,
        }
    }
}

/// The 16-slot store. Writers are components (ports, battery, IMU, ...);
/// readers are the collector below, driven by the host's poll command.
pub struct StatusSlotStore {
    slots: [Slot; NUM_STATUS_SLOTS],
}

impl Default for StatusSlotStore {
    fn default() -> Self {
        Self {
            slots: core::array::from_fn(|idx| Slot::new(SLOT_SIZES[idx])),
        }
    }
}

impl StatusSlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare-and-copy write into `slot_idx`. Bumps `version` mod 128 iff
    /// the payload actually changed; leaves it alone (including the
    /// invalid bit) otherwise. `bytes.len()` must equal the slot's
    /// declared size.
    pub fn write(&mut self, slot_idx: usize, bytes: &[u8]) {
        let slot = &mut self.slots[slot_idx];
        debug_assert_eq!(bytes.len(), slot.len);

        // A slot with no prior content always counts as "changed" on its
        // first write, regardless of the bytes written.
        let unchanged = version_is_valid(slot.version) && slot.data[..slot.len] == *bytes;

        slot.data[..slot.len].copy_from_slice(bytes);

        if !unchanged {
            slot.version = slot.version.wrapping_add(1) & 0x7F;
        }
    }

    /// Force a slot to be considered changed on the next read without
    /// altering its bytes (SPEC_FULL.md §C.5, config-changed event).
    pub fn invalidate_for_rereport(&mut self, slot_idx: usize) {
        let slot = &mut self.slots[slot_idx];
        slot.version = slot.version.wrapping_add(1) & 0x7F;
    }

    /// Mark a slot as having no content (used when a port is unbound).
    pub fn clear(&mut self, slot_idx: usize) {
        self.slots[slot_idx].version = INVALID_BIT;
    }

    pub fn reset_all(&mut self) {
        for slot in &mut self.slots {
            slot.version = INVALID_BIT;
            slot.data = [0u8; MAX_SLOT_SIZE];
        }
    }

    fn version(&self, slot_idx: usize) -> u8 {
        self.slots[slot_idx].version
    }

    fn bytes(&self, slot_idx: usize) -> &[u8] {
        let slot = &self.slots[slot_idx];
        &slot.data[..slot.len]
    }
}

/// Per-reader state for polling the store (the "collector" of §4.4). The
/// protocol layer owns exactly one of these per `op = GetResult`-pollable
/// reader; today that's the single host poll cursor (cmd `0x3C`).
pub struct Collector {
    enable_mask: u32,
    last_seen_version: [u8; NUM_STATUS_SLOTS],
    /// Slot index to resume scanning from on the next `read()` call, so a
    /// caller with a small buffer can make forward progress across calls.
    start_at_slot: usize,
}

impl Default for Collector {
    fn default() -> Self {
        Self {
            enable_mask: 0,
            last_seen_version: [INVALID_BIT; NUM_STATUS_SLOTS],
            start_at_slot: 0,
        }
    }
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn enable_slot(&mut self, idx: usize) {
        self.enable_mask |= 1 << idx;
        // Forces the next read to include this slot even if its version
        // hasn't moved since it was last (if ever) enabled.
        self.last_seen_version[idx] = INVALID_BIT;
    }

    pub fn disable_slot(&mut self, idx: usize) {
        self.enable_mask &= !(1 << idx);
    }

    pub fn is_enabled(&self, idx: usize) -> bool {
        self.enable_mask & (1 << idx) != 0
    }

    /// Append `{slot_idx, len, bytes}` triplets for every enabled slot
    /// whose version has changed since this reader last observed it, in
    /// ascending slot-index order, until `out` runs out of room. Returns
    /// the number of bytes written. Progress across multiple calls is
    /// tracked via `start_at_slot` so a caller with a small buffer
    /// eventually sees every pending slot.
    pub fn read(&mut self, store: &StatusSlotStore, out: &mut [u8]) -> usize {
        let mut written = 0;
        let mut idx = self.start_at_slot;

        while idx < NUM_STATUS_SLOTS {
            if self.is_enabled(idx) {
                let version = store.version(idx);
                let changed = version != self.last_seen_version[idx] && version_is_valid(version);

                if changed {
                    let bytes = store.bytes(idx);
                    let needed = 2 + bytes.len();
                    if written + needed > out.len() {
                        // Not enough room; resume here next call.
                        self.start_at_slot = idx;
                        return written;
                    }
                    out[written] = idx as u8;
                    out[written + 1] = bytes.len() as u8;
                    out[written + 2..written + 2 + bytes.len()].copy_from_slice(bytes);
                    written += needed;
                    self.last_seen_version[idx] = version;
                }
            }
            idx += 1;
        }

        self.start_at_slot = 0;
        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_rewrite_is_a_noop_on_version() {
        let mut store = StatusSlotStore::new();
        store.write(10, &[1, 2, 3, 4]);
        let v1 = store.version(10);
        store.write(10, &[1, 2, 3, 4]);
        assert_eq!(store.version(10), v1);
    }

    #[test]
    fn changed_write_bumps_version_mod_128() {
        let mut store = StatusSlotStore::new();
        store.write(10, &[0, 0, 0, 0]);
        let v1 = store.version(10) & 0x7F;
        store.write(10, &[1, 0, 0, 0]);
        let v2 = store.version(10) & 0x7F;
        assert_eq!(v2, (v1 + 1) & 0x7F);
    }

    #[test]
    fn collector_only_reports_enabled_changed_slots() {
        let mut store = StatusSlotStore::new();
        let mut collector = Collector::new();
        collector.enable_slot(10);

        store.write(10, &[1, 2, 3, 4]);
        store.write(11, &[9, 9, 9, 9, 9, 9]); // slot 11 not enabled

        let mut buf = [0u8; 64];
        let n = collector.read(&store, &mut buf);
        assert_eq!(n, 2 + 4);
        assert_eq!(buf[0], 10);
        assert_eq!(buf[1], 4);
        assert_eq!(&buf[2..6], &[1, 2, 3, 4]);

        // No further change -> nothing more to report.
        let n2 = collector.read(&store, &mut buf);
        assert_eq!(n2, 0);
    }

    #[test]
    fn read_resumes_across_calls_when_buffer_is_short() {
        let mut store = StatusSlotStore::new();
        let mut collector = Collector::new();
        collector.enable_slot(10);
        collector.enable_slot(11);

        store.write(10, &[1, 2, 3, 4]);
        store.write(11, &[5, 6, 7, 8, 9, 10]);

        let mut buf = [0u8; 6]; // room for exactly one slot-10 triplet
        let n1 = collector.read(&store, &mut buf);
        assert_eq!(n1, 6);
        assert_eq!(buf[0], 10);

        let mut buf2 = [0u8; 16];
        let n2 = collector.read(&store, &mut buf2);
        assert_eq!(n2, 8);
        assert_eq!(buf2[0], 11);
    }

    #[test]
    fn enable_slot_forces_one_resend_even_without_change() {
        let mut store = StatusSlotStore::new();
        store.write(10, &[1, 2, 3, 4]);

        let mut collector = Collector::new();
        collector.enable_slot(10);
        let mut buf = [0u8; 16];
        assert!(collector.read(&store, &mut buf) > 0);
        assert_eq!(collector.read(&store, &mut buf), 0);
    }
}
