//! Error storage commands (cmd `0x3D`-`0x40`).

use crate::error_storage::{ErrorStorage, FlashBlock};
use crate::protocol::Status;
use crate::span::MutSpan;
use crate::state::ErrorRecord;

pub fn count<B: FlashBlock>(storage: &mut ErrorStorage<B>, resp: &mut MutSpan<'_>) -> usize {
    resp.copy_from(&(storage.stored_count() as u32).to_le_bytes())
}

/// Payload is `{index: u32 LE}`.
pub fn read<B: FlashBlock>(storage: &mut ErrorStorage<B>, payload: &[u8], resp: &mut MutSpan<'_>) -> (Status, usize) {
    let Ok(idx_bytes) = <[u8; 4]>::try_from(payload) else {
        return (Status::PayloadLengthError, 0);
    };
    let idx = u32::from_le_bytes(idx_bytes) as usize;
    match storage.read(idx) {
        Some(record) => (Status::Ok, resp.copy_from(&record.to_bytes())),
        None => (Status::CommandError, 0),
    }
}

pub fn clear<B: FlashBlock>(storage: &mut ErrorStorage<B>) -> Status {
    storage.clear();
    Status::Ok
}

/// Stores a host-supplied diagnostic record for test/CI use (§C.5,
/// ambient test tooling: the core ships a way to exercise the storage
/// path without tripping a real fault).
pub fn inject_test<B: FlashBlock>(storage: &mut ErrorStorage<B>, hw_version: u32, fw_version: u32, payload: &[u8]) -> Status {
    let mut p = [0u8; 54];
    let n = payload.len().min(p.len());
    p[..n].copy_from_slice(&payload[..n]);
    let record = ErrorRecord {
        error_id: 0xFF,
        hw_version,
        fw_version,
        payload: p,
    };
    if storage.store(&record) {
        Status::Ok
    } else {
        Status::InternalError
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_storage::RamBlock;

    fn storage() -> ErrorStorage<RamBlock> {
        ErrorStorage::new([RamBlock::new(), RamBlock::new()])
    }

    #[test]
    fn inject_then_read_roundtrips() {
        let mut s = storage();
        assert_eq!(inject_test(&mut s, 1, 2, &[9, 9, 9]), Status::Ok);

        let mut buf = [0u8; 64];
        let mut resp = MutSpan::new(&mut buf);
        let (status, n) = read(&mut s, &0u32.to_le_bytes(), &mut resp);
        assert_eq!(status, Status::Ok);
        assert_eq!(n, ErrorRecord::WIRE_SIZE);
    }

    #[test]
    fn read_out_of_range_is_command_error() {
        let mut s = storage();
        let mut buf = [0u8; 64];
        let mut resp = MutSpan::new(&mut buf);
        let (status, _) = read(&mut s, &0u32.to_le_bytes(), &mut resp);
        assert_eq!(status, Status::CommandError);
    }

    #[test]
    fn count_reflects_stored_records() {
        let mut s = storage();
        inject_test(&mut s, 1, 1, &[]);
        inject_test(&mut s, 1, 1, &[]);
        let mut buf = [0u8; 4];
        let mut resp = MutSpan::new(&mut buf);
        count(&mut s, &mut resp);
        assert_eq!(u32::from_le_bytes(buf), 2);
    }
}
