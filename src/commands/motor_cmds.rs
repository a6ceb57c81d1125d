//! Motor port commands (cmd `0x10`-`0x15`): count/types are plain reads;
//! set-type, set-config, and test are async; drive is a synchronous
//! multi-segment write.

use crate::config::NUM_MOTOR_PORTS;
use crate::ports::motor::MotorPort;
use crate::ports::{ConfigError, PresenceResult};
use crate::protocol::Status;
use crate::span::MutSpan;
use crate::state::{DriveRequest, DriveRequestKind};

pub fn port_count(resp: &mut MutSpan<'_>) -> usize {
    resp.copy_from(&[NUM_MOTOR_PORTS as u8])
}

/// One driver-kind byte per port (`0` = none bound, driver ids are
/// otherwise library-defined).
pub fn port_types(ports: &[MotorDriverBinding; NUM_MOTOR_PORTS], resp: &mut MutSpan<'_>) -> usize {
    let bytes: heapless::Vec<u8, NUM_MOTOR_PORTS> = ports.iter().map(|p| p.driver_id).collect();
    resp.copy_from(&bytes)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MotorDriverBinding {
    pub driver_id: u8,
}

fn config_error_byte(e: ConfigError) -> u8 {
    match e {
        ConfigError::LengthError => 0,
        ConfigError::ValueError => 1,
    }
}

pub fn apply_config(port: &mut MotorPort, bytes: &[u8], resp: &mut MutSpan<'_>) -> (Status, usize) {
    match validate_config(bytes) {
        Ok(()) => {
            port.request.power_limit = bytes.first().copied().unwrap_or(100).min(100);
            (Status::Ok, 0)
        }
        Err(e) => {
            let n = resp.copy_from(&[config_error_byte(e)]);
            (Status::CommandError, n)
        }
    }
}

fn validate_config(bytes: &[u8]) -> Result<(), ConfigError> {
    if bytes.is_empty() {
        return Err(ConfigError::LengthError);
    }
    if bytes[0] > 100 {
        return Err(ConfigError::ValueError);
    }
    Ok(())
}

/// One `{hdr, bytes[hdr>>3]}` segment out of the drive command's payload
/// (§6 "Drive command (0x14) payload").
struct Segment<'a> {
    port: usize,
    bytes: &'a [u8],
}

fn parse_segments(payload: &[u8]) -> Result<heapless::Vec<Segment<'_>, NUM_MOTOR_PORTS>, ()> {
    let mut out = heapless::Vec::new();
    let mut i = 0;
    while i < payload.len() {
        let hdr = payload[i];
        let port = (hdr & 0x07) as usize;
        let len = (hdr >> 3) as usize;
        i += 1;
        if i + len > payload.len() || port >= NUM_MOTOR_PORTS {
            return Err(());
        }
        out.push(Segment {
            port,
            bytes: &payload[i..i + len],
        })
        .map_err(|_| ())?;
        i += len;
    }
    Ok(out)
}

fn decode_drive_request(bytes: &[u8]) -> Option<DriveRequest> {
    // `{version, power_limit, speed_limit, kind_tag, kind_payload...}`.
    if bytes.len() < 4 {
        return None;
    }
    let request = match bytes[3] {
        0 => DriveRequestKind::Power(i16::from_le_bytes(bytes.get(4..6)?.try_into().ok()?)),
        1 => {
            let raw = u32::from_le_bytes(bytes.get(4..8)?.try_into().ok()?);
            DriveRequestKind::Speed(f32::from_bits(raw))
        }
        2 => DriveRequestKind::Position(i32::from_le_bytes(bytes.get(4..8)?.try_into().ok()?)),
        _ => return None,
    };
    Some(DriveRequest {
        version: bytes[0],
        power_limit: bytes[1],
        speed_limit: bytes[2],
        request,
        position_breakpoint: None,
    })
}

/// Applies every segment's drive request to its port and writes one
/// acknowledged-version byte per segment into `resp`, in payload order.
pub fn drive(ports: &mut [MotorPort; NUM_MOTOR_PORTS], payload: &[u8], resp: &mut MutSpan<'_>) -> (Status, usize) {
    let Ok(segments) = parse_segments(payload) else {
        return (Status::PayloadLengthError, 0);
    };

    let mut ack = heapless::Vec::<u8, NUM_MOTOR_PORTS>::new();
    for seg in &segments {
        match decode_drive_request(seg.bytes) {
            Some(req) => {
                ports[seg.port].request = req;
                let _ = ack.push(req.version);
            }
            None => return (Status::PayloadLengthError, 0),
        }
    }
    (Status::Ok, resp.copy_from(&ack))
}

pub fn presence_to_status(p: PresenceResult) -> u8 {
    match p {
        PresenceResult::NotPresent => 0,
        PresenceResult::Present => 1,
        PresenceResult::Unknown => 2,
        PresenceResult::Error => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_config_rejects_empty_and_out_of_range() {
        assert_eq!(validate_config(&[]), Err(ConfigError::LengthError));
        assert_eq!(validate_config(&[150]), Err(ConfigError::ValueError));
        assert_eq!(validate_config(&[50]), Ok(()));
    }

    #[test]
    fn drive_decodes_power_segment_and_echoes_version() {
        let mut ports: [MotorPort; NUM_MOTOR_PORTS] = core::array::from_fn(|_| MotorPort::new());
        // hdr: port 0, len 6 -> 0x30; payload: version=5, pl=100, sl=100, kind=0(Power), power=200i16 LE
        let payload = [0x30u8, 5, 100, 100, 0, 200, 0];
        let mut buf = [0u8; 16];
        let mut resp = MutSpan::new(&mut buf);
        let (status, n) = drive(&mut ports, &payload, &mut resp);
        assert_eq!(status, Status::Ok);
        assert_eq!(n, 1);
        assert_eq!(buf[0], 5);
        assert!(matches!(ports[0].request.request, DriveRequestKind::Power(200)));
    }

    #[test]
    fn drive_rejects_out_of_range_port_index() {
        let mut ports: [MotorPort; NUM_MOTOR_PORTS] = core::array::from_fn(|_| MotorPort::new());
        let payload = [0x08u8]; // port index 7 is invalid with only 6 ports? actually 7 is also invalid here since hdr&0x7=0, len=1 -> oob read check
        let mut buf = [0u8; 16];
        let mut resp = MutSpan::new(&mut buf);
        let (status, _) = drive(&mut ports, &payload, &mut resp);
        assert_eq!(status, Status::PayloadLengthError);
    }
}
