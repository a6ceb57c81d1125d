//! Protocol engine (C5): validates frames, dispatches to command handlers,
//! and enforces the Start/GetResult state machine (§4.2).

use crate::commands::{CommandTable, GetResultOutcome};
// `CommandTable` is a trait (see `commands` module); `handle_frame` below is
// generic over it so the protocol engine's dispatch logic can be exercised
// against a lightweight test double without pulling in any hardware state.
use crate::crc::{crc16, crc7, CRC16_INIT, CRC7_INIT};
use crate::span::{ConstSpan, MutSpan};

/// Request header fields, little-endian on the wire (§4.2).
pub const REQUEST_HEADER_LEN: usize = 6;
pub const RESPONSE_HEADER_LEN: usize = 5;
pub const MAX_PAYLOAD_LEN: usize = 255;

/// `op` field of a request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Operation {
    Start,
    GetResult,
}

impl Operation {
    fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Operation::Start),
            2 => Some(Operation::GetResult),
            _ => None,
        }
    }
}

/// Response status byte (§4.2 "Status codes").
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
#[repr(u8)]
pub enum Status {
    Ok = 0,
    Busy = 1,
    Pending = 2,
    UnknownOperation = 3,
    InvalidOperation = 4,
    CommandIntegrityError = 5,
    PayloadIntegrityError = 6,
    PayloadLengthError = 7,
    UnknownCommand = 8,
    CommandError = 9,
    InternalError = 10,
}

impl Status {
    /// A payload may only ride along with `Ok` or `CommandError` (§4.2
    /// "Response payload policy").
    fn allows_payload(self) -> bool {
        matches!(self, Status::Ok | Status::CommandError)
    }
}

/// A parsed, CRC-checked request frame. Produced by [`parse_request`].
pub struct Request<'a> {
    pub op: Operation,
    pub cmd: u8,
    pub payload: ConstSpan<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum FrameError {
    TooShort,
    HeaderCrc,
    PayloadCrc,
    UnknownOp,
}

/// Parse and CRC-validate a raw request buffer per §4.2's wire layout:
/// `{op, cmd, payload_len, payload_crc16 (LE), header_crc7, payload[..]}`.
pub fn parse_request(raw: &[u8]) -> Result<Request<'_>, FrameError> {
    if raw.len() < REQUEST_HEADER_LEN {
        return Err(FrameError::TooShort);
    }

    let op_byte = raw[0];
    let cmd = raw[1];
    let payload_len = raw[2] as usize;
    let payload_crc16 = u16::from_le_bytes([raw[3], raw[4]]);
    let header_crc7 = raw[5];

    if raw.len() < REQUEST_HEADER_LEN + payload_len {
        return Err(FrameError::TooShort);
    }
    let payload = &raw[REQUEST_HEADER_LEN..REQUEST_HEADER_LEN + payload_len];

    let expected_header_crc = crc7(CRC7_INIT, &raw[..REQUEST_HEADER_LEN - 1]);
    if expected_header_crc != header_crc7 {
        return Err(FrameError::HeaderCrc);
    }

    let expected_payload_crc = crc16(CRC16_INIT, payload);
    if expected_payload_crc != payload_crc16 {
        return Err(FrameError::PayloadCrc);
    }

    let op = Operation::from_wire(op_byte).ok_or(FrameError::UnknownOp)?;

    Ok(Request {
        op,
        cmd,
        payload: ConstSpan::new(payload),
    })
}

/// Serialize a response into `out`, returning the total frame length.
/// `out` must be at least `RESPONSE_HEADER_LEN + payload.len()`.
pub fn write_response(out: &mut [u8], status: Status, payload: &[u8]) -> usize {
    out[0] = status as u8;
    out[1] = payload.len() as u8;
    let crc = crc16(CRC16_INIT, payload);
    out[2..4].copy_from_slice(&crc.to_le_bytes());
    let header_crc = crc7(CRC7_INIT, &out[..RESPONSE_HEADER_LEN - 1]);
    out[4] = header_crc;
    out[RESPONSE_HEADER_LEN..RESPONSE_HEADER_LEN + payload.len()].copy_from_slice(payload);
    RESPONSE_HEADER_LEN + payload.len()
}

/// Run the dispatch algorithm of §4.2 against a raw request buffer,
/// writing the wire-format response into `response_buf` and returning its
/// length. `table` owns per-command `in_progress` flags and routes to
/// handler bodies.
pub fn handle_frame<T: CommandTable>(table: &mut T, raw_request: &[u8], response_buf: &mut [u8]) -> usize {
    let request = match parse_request(raw_request) {
        Ok(r) => r,
        Err(FrameError::HeaderCrc) => {
            return write_response(response_buf, Status::CommandIntegrityError, &[])
        }
        Err(FrameError::PayloadCrc) => {
            return write_response(response_buf, Status::PayloadIntegrityError, &[])
        }
        Err(FrameError::UnknownOp) => {
            return write_response(response_buf, Status::UnknownOperation, &[])
        }
        Err(FrameError::TooShort) => {
            return write_response(response_buf, Status::CommandIntegrityError, &[])
        }
    };

    if !table.command_exists(request.cmd) {
        return write_response(response_buf, Status::UnknownCommand, &[]);
    }

    let mut scratch = [0u8; MAX_PAYLOAD_LEN];

    let (status, payload_len) = match request.op {
        Operation::Start => {
            if table.in_progress(request.cmd) {
                (Status::InvalidOperation, 0)
            } else {
                let (mut status, mut len) = table.start(request.cmd, request.payload, MutSpan::new(&mut scratch));
                if status == Status::Pending {
                    table.set_in_progress(request.cmd, true);
                    // Piggy-back an immediate GetResult in case the work
                    // already finished synchronously.
                    match table.get_result(request.cmd, MutSpan::new(&mut scratch)) {
                        Some(GetResultOutcome { status: s2, len: l2, still_in_progress }) => {
                            table.set_in_progress(request.cmd, still_in_progress);
                            status = s2;
                            len = l2;
                        }
                        None => {
                            // No GetResult handler: stays in_progress until
                            // cancelled or never resolves. Shouldn't happen
                            // for a command whose Start returns Pending.
                        }
                    }
                }
                (status, len)
            }
        }
        Operation::GetResult => {
            if !table.has_get_result(request.cmd) {
                (Status::InvalidOperation, 0)
            } else if !table.in_progress(request.cmd) {
                (Status::InvalidOperation, 0)
            } else {
                match table.get_result(request.cmd, MutSpan::new(&mut scratch)) {
                    Some(GetResultOutcome { status, len, still_in_progress }) => {
                        table.set_in_progress(request.cmd, still_in_progress);
                        (status, len)
                    }
                    None => (Status::InvalidOperation, 0),
                }
            }
        }
    };

    let (status, payload_len) = if payload_len > scratch.len() {
        (Status::InternalError, 0)
    } else if !status.allows_payload() {
        (status, 0)
    } else {
        (status, payload_len)
    };

    write_response(response_buf, status, &scratch[..payload_len])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{build_test_table, TestCommandId};

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
    fn ping_roundtrip() {
        let mut table = build_test_table();
        let req = build_request(0, TestCommandId::Ping as u8, &[]);
        let mut resp = [0u8; 16];
        let n = handle_frame(&mut table, &req, &mut resp);
        assert_eq!(resp[0], Status::Ok as u8);
        assert_eq!(resp[1], 0); // payload len
        assert_eq!(n, RESPONSE_HEADER_LEN);
    }

    #[test]
    fn corrupted_header_crc_is_rejected() {
        let mut table = build_test_table();
        let mut req = build_request(0, TestCommandId::Ping as u8, &[]);
        req[5] ^= 0xFF; // corrupt header_crc7
        let mut resp = [0u8; 16];
        handle_frame(&mut table, &mut req, &mut resp);
        assert_eq!(resp[0], Status::CommandIntegrityError as u8);
        assert_eq!(resp[1], 0);
    }

    #[test]
    fn corrupted_payload_crc_is_rejected() {
        let mut table = build_test_table();
        let req = build_request(0, TestCommandId::Echo as u8, &[1, 2, 3]);
        let mut bad = req.clone();
        bad[3] ^= 0xFF;
        let mut resp = [0u8; 16];
        handle_frame(&mut table, &bad, &mut resp);
        assert_eq!(resp[0], Status::PayloadIntegrityError as u8);
    }

    #[test]
    fn unknown_command_reported() {
        let mut table = build_test_table();
        let req = build_request(0, 0xFE, &[]);
        let mut resp = [0u8; 16];
        handle_frame(&mut table, &req, &mut resp);
        assert_eq!(resp[0], Status::UnknownCommand as u8);
    }

    #[test]
    fn get_result_without_null_handler_is_invalid_operation() {
        // Ping has no GetResult handler.
        let mut table = build_test_table();
        let req = build_request(2, TestCommandId::Ping as u8, &[]);
        let mut resp = [0u8; 16];
        handle_frame(&mut table, &req, &mut resp);
        assert_eq!(resp[0], Status::InvalidOperation as u8);
    }

    #[test]
    fn get_result_without_prior_start_is_invalid_operation() {
        let mut table = build_test_table();
        let req = build_request(2, TestCommandId::LongOp as u8, &[]);
        let mut resp = [0u8; 16];
        handle_frame(&mut table, &req, &mut resp);
        assert_eq!(resp[0], Status::InvalidOperation as u8);
    }

    #[test]
    fn start_while_in_progress_is_invalid_operation() {
        let mut table = build_test_table();
        let start = build_request(0, TestCommandId::LongOp as u8, &[]);
        let mut resp = [0u8; 16];
        handle_frame(&mut table, &start, &mut resp);
        assert_eq!(resp[0], Status::Pending as u8);

        handle_frame(&mut table, &start, &mut resp);
        assert_eq!(resp[0], Status::InvalidOperation as u8);
    }

    #[test]
    fn long_op_resolves_after_polling() {
        let mut table = build_test_table();
        let start = build_request(0, TestCommandId::LongOp as u8, &[]);
        let poll = build_request(2, TestCommandId::LongOp as u8, &[]);
        let mut resp = [0u8; 16];

        handle_frame(&mut table, &start, &mut resp);
        assert_eq!(resp[0], Status::Pending as u8);

        handle_frame(&mut table, &poll, &mut resp);
        assert_eq!(resp[0], Status::Pending as u8);

        handle_frame(&mut table, &poll, &mut resp);
        assert_eq!(resp[0], Status::Ok as u8);

        // in_progress cleared; a further GetResult is now invalid.
        handle_frame(&mut table, &poll, &mut resp);
        assert_eq!(resp[0], Status::InvalidOperation as u8);
    }
}
