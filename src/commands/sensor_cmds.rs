//! Sensor port commands (cmd `0x20`-`0x25`).

use crate::config::NUM_SENSOR_PORTS;
use crate::ports::sensor::SensorPort;
use crate::ports::ConfigError;
use crate::protocol::Status;
use crate::span::MutSpan;

pub fn port_count(resp: &mut MutSpan<'_>) -> usize {
    resp.copy_from(&[NUM_SENSOR_PORTS as u8])
}

pub fn read_info(port: &SensorPort, resp: &mut MutSpan<'_>) -> usize {
    resp.copy_from(&port.last_reading[..port.last_reading_len])
}

fn validate_config(bytes: &[u8]) -> Result<(), ConfigError> {
    if bytes.is_empty() {
        Err(ConfigError::LengthError)
    } else {
        Ok(())
    }
}

pub fn apply_config(port: &mut SensorPort, bytes: &[u8], resp: &mut MutSpan<'_>) -> (Status, usize) {
    match validate_config(bytes) {
        Ok(()) => {
            port.set_reading(&[]);
            (Status::Ok, 0)
        }
        Err(_) => {
            let n = resp.copy_from(&[0]);
            (Status::CommandError, n)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::sensor::SensorPort;

    #[test]
    fn read_info_reports_the_current_reading() {
        let mut port = SensorPort::new();
        port.set_reading(&[1, 2, 3]);
        let mut buf = [0u8; 8];
        let mut resp = MutSpan::new(&mut buf);
        let n = read_info(&port, &mut resp);
        assert_eq!(n, 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);
    }

    #[test]
    fn apply_config_rejects_empty_payload() {
        let mut port = SensorPort::new();
        let mut buf = [0u8; 4];
        let mut resp = MutSpan::new(&mut buf);
        let (status, _) = apply_config(&mut port, &[], &mut resp);
        assert_eq!(status, Status::CommandError);
    }
}
