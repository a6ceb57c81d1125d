//! LED ring commands (cmd `0x30`-`0x33`).

use crate::config::RING_LED_COUNT;
use crate::leds::{LedRing, Rgb, Scenario};
use crate::protocol::Status;
use crate::span::MutSpan;

const SCENARIOS: [Scenario; 8] = [
    Scenario::Off,
    Scenario::UserFrame,
    Scenario::ColorWheel,
    Scenario::RainbowFade,
    Scenario::BusyIndicator,
    Scenario::BreathingGreen,
    Scenario::Siren,
    Scenario::TrafficLight,
];

pub fn scenario_list(resp: &mut MutSpan<'_>) -> usize {
    resp.copy_from(&[SCENARIOS.len() as u8])
}

pub fn select_scenario(ring: &mut LedRing, payload: &[u8]) -> Status {
    let Some(&idx) = payload.first() else {
        return Status::PayloadLengthError;
    };
    match SCENARIOS.get(idx as usize) {
        Some(&scenario) => {
            ring.scenario = scenario;
            Status::Ok
        }
        None => Status::CommandError,
    }
}

pub fn ring_size(resp: &mut MutSpan<'_>) -> usize {
    resp.copy_from(&[RING_LED_COUNT as u8])
}

/// Payload is `RING_LED_COUNT` `{r,g,b}` triplets (§8 round-trip property:
/// "Set user frame F ... ring LED bytes map componentwise").
pub fn set_user_frame(ring: &mut LedRing, payload: &[u8]) -> Status {
    if payload.len() != RING_LED_COUNT * 3 {
        return Status::PayloadLengthError;
    }
    for (i, px) in ring.user_frame.iter_mut().enumerate() {
        let base = i * 3;
        *px = Rgb::new(payload[base], payload[base + 1], payload[base + 2]);
    }
    Status::Ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_scenario_rejects_out_of_range_index() {
        let mut ring = LedRing::new();
        assert_eq!(select_scenario(&mut ring, &[200]), Status::CommandError);
    }

    #[test]
    fn select_scenario_applies_valid_index() {
        let mut ring = LedRing::new();
        assert_eq!(select_scenario(&mut ring, &[2]), Status::Ok);
        assert_eq!(ring.scenario, Scenario::ColorWheel);
    }

    #[test]
    fn set_user_frame_requires_exact_payload_length() {
        let mut ring = LedRing::new();
        assert_eq!(set_user_frame(&mut ring, &[0; 3]), Status::PayloadLengthError);
    }

    #[test]
    fn set_user_frame_maps_triplets_in_order() {
        let mut ring = LedRing::new();
        let mut payload = [0u8; RING_LED_COUNT * 3];
        payload[0] = 10;
        payload[1] = 20;
        payload[2] = 30;
        assert_eq!(set_user_frame(&mut ring, &payload), Status::Ok);
        assert_eq!(ring.user_frame[0], Rgb::new(10, 20, 30));
    }
}
