//! LED / ring display (C12): scenario selection and indicator-LED color
//! computation. The WS2812 bit-banged DMA encoding itself is out of scope
//! (§1); this owns the pure `Scenario -> Color` and `state -> Color` logic
//! that feeds it, plus the frame buffer the DMA transfers.

use crate::config::{INDICATOR_LED_COUNT, RING_LED_COUNT};
use crate::state::{BluetoothStatus, MasterStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Scenario {
    Off,
    UserFrame,
    ColorWheel,
    RainbowFade,
    BusyIndicator,
    BreathingGreen,
    Siren,
    TrafficLight,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, defmt::Format)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    fn scale(self, max_brightness: u8) -> Rgb {
        let scale = |c: u8| ((c as u16 * max_brightness as u16) / 255) as u8;
        Rgb::new(scale(self.r), scale(self.g), scale(self.b))
    }
}

/// Host-supplied raw frame for the `UserFrame` scenario (cmd `0x33`).
pub type UserFrame = [Rgb; RING_LED_COUNT];

fn wheel(pos: u8) -> Rgb {
    if pos < 85 {
        Rgb::new(255 - pos * 3, pos * 3, 0)
    } else if pos < 170 {
        let pos = pos - 85;
        Rgb::new(0, 255 - pos * 3, pos * 3)
    } else {
        let pos = pos - 170;
        Rgb::new(pos * 3, 0, 255 - pos * 3)
    }
}

/// Renders the 12 ring LEDs for one frame, `frame_counter` advancing by one
/// every 20 ms call (§4.10).
pub fn render_ring(scenario: Scenario, user_frame: &UserFrame, frame_counter: u32) -> [Rgb; RING_LED_COUNT] {
    let mut out = [Rgb::BLACK; RING_LED_COUNT];
    match scenario {
        Scenario::Off => {}
        Scenario::UserFrame => out.copy_from_slice(user_frame),
        Scenario::ColorWheel => {
            for (i, px) in out.iter_mut().enumerate() {
                let pos = ((i * 256 / RING_LED_COUNT) as u32 + frame_counter) as u8;
                *px = wheel(pos);
            }
        }
        Scenario::RainbowFade => {
            let pos = (frame_counter % 256) as u8;
            let color = wheel(pos);
            out.fill(color);
        }
        Scenario::BusyIndicator => {
            let lit = (frame_counter / 4) as usize % RING_LED_COUNT;
            out[lit] = Rgb::new(0, 0, 255);
        }
        Scenario::BreathingGreen => {
            let phase = (frame_counter % 100) as f32 / 100.0;
            let brightness = (libm_sin(phase * core::f32::consts::TAU) * 0.5 + 0.5) * 255.0;
            out.fill(Rgb::new(0, brightness as u8, 0));
        }
        Scenario::Siren => {
            let half = RING_LED_COUNT / 2;
            let red_side = (frame_counter / 10) % 2 == 0;
            for (i, px) in out.iter_mut().enumerate() {
                *px = if (i < half) == red_side {
                    Rgb::new(255, 0, 0)
                } else {
                    Rgb::new(0, 0, 255)
                };
            }
        }
        Scenario::TrafficLight => {
            let third = RING_LED_COUNT / 3;
            for (i, px) in out.iter_mut().enumerate() {
                *px = if i < third {
                    Rgb::new(255, 0, 0)
                } else if i < 2 * third {
                    Rgb::new(255, 255, 0)
                } else {
                    Rgb::new(0, 255, 0)
                };
            }
        }
    }
    out
}

fn libm_sin(x: f32) -> f32 {
    use num_traits::Float;
    x.sin()
}

/// Green→red gradient for a battery level percentage (§4.10).
pub fn battery_gradient(level_pct: f32) -> Rgb {
    let t = (level_pct / 100.0).clamp(0.0, 1.0);
    Rgb::new(((1.0 - t) * 255.0) as u8, (t * 255.0) as u8, 0)
}

pub fn master_status_color(status: MasterStatus) -> Rgb {
    match status {
        MasterStatus::Unknown => Rgb::BLACK,
        MasterStatus::NotConfigured => Rgb::new(255, 0, 0),
        MasterStatus::Configuring => Rgb::new(0, 255, 255),
        MasterStatus::Updating => Rgb::new(255, 0, 0),
        MasterStatus::Operational => Rgb::new(255, 128, 0),
        MasterStatus::Controlled => Rgb::new(0, 255, 0),
    }
}

/// Motor-battery indicator (§4.10): blinks red when a motor is drawing
/// current but the motor battery isn't present, otherwise shows the same
/// green→red level gradient as the main battery.
pub fn motor_battery_indicator(level_pct: f32, present: bool, drawing_current: bool, frame_counter: u32) -> Rgb {
    if !present && drawing_current {
        if (frame_counter / 25) % 2 == 0 {
            Rgb::new(255, 0, 0)
        } else {
            Rgb::BLACK
        }
    } else {
        battery_gradient(level_pct)
    }
}

pub fn bluetooth_indicator(status: BluetoothStatus, frame_counter: u32) -> Rgb {
    match status {
        BluetoothStatus::NotConnected => Rgb::BLACK,
        BluetoothStatus::Connected => Rgb::new(0, 255, 255),
        BluetoothStatus::Advertising => {
            if (frame_counter / 25) % 2 == 0 {
                Rgb::new(0, 255, 255)
            } else {
                Rgb::BLACK
            }
        }
    }
}

/// Reduced ceiling applied in low-battery or "switched off" display modes
/// (§4.10 "Max brightness").
pub fn max_brightness(low_battery: bool, display_off: bool) -> u8 {
    if display_off {
        0
    } else if low_battery {
        64
    } else {
        255
    }
}

pub struct LedRing {
    pub scenario: Scenario,
    pub user_frame: UserFrame,
    frame_counter: u32,
}

impl Default for LedRing {
    fn default() -> Self {
        Self {
            scenario: Scenario::Off,
            user_frame: [Rgb::BLACK; RING_LED_COUNT],
            frame_counter: 0,
        }
    }
}

impl LedRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current frame counter, for callers computing blink-state indicator
    /// colors to pass into `render`.
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    /// Produces this frame's ring + indicator colors, scaled to
    /// `max_brightness`, ready to hand to the WS2812 DMA encoder.
    pub fn render(
        &mut self,
        indicators: [Rgb; INDICATOR_LED_COUNT],
        max_brightness: u8,
    ) -> ([Rgb; RING_LED_COUNT], [Rgb; INDICATOR_LED_COUNT]) {
        self.frame_counter = self.frame_counter.wrapping_add(1);
        let ring = render_ring(self.scenario, &self.user_frame, self.frame_counter)
            .map(|c| c.scale(max_brightness));
        let indicators = indicators.map(|c| c.scale(max_brightness));
        (ring, indicators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_scenario_is_all_black() {
        let frame = render_ring(Scenario::Off, &[Rgb::BLACK; RING_LED_COUNT], 5);
        assert!(frame.iter().all(|c| *c == Rgb::BLACK));
    }

    #[test]
    fn user_frame_scenario_passes_bytes_through_before_scaling() {
        let mut user = [Rgb::BLACK; RING_LED_COUNT];
        user[0] = Rgb::new(10, 20, 30);
        let frame = render_ring(Scenario::UserFrame, &user, 0);
        assert_eq!(frame[0], Rgb::new(10, 20, 30));
    }

    #[test]
    fn battery_gradient_is_green_at_full_and_red_at_empty() {
        let full = battery_gradient(100.0);
        assert_eq!(full.r, 0);
        assert!(full.g > 200);
        let empty = battery_gradient(0.0);
        assert!(empty.r > 200);
        assert_eq!(empty.g, 0);
    }

    #[test]
    fn motor_battery_indicator_blinks_red_when_drawing_with_no_battery() {
        let on = motor_battery_indicator(50.0, false, true, 0);
        let off = motor_battery_indicator(50.0, false, true, 25);
        assert_eq!(on, Rgb::new(255, 0, 0));
        assert_eq!(off, Rgb::BLACK);
    }

    #[test]
    fn motor_battery_indicator_shows_gradient_when_present() {
        assert_eq!(motor_battery_indicator(100.0, true, true, 0), battery_gradient(100.0));
    }

    #[test]
    fn max_brightness_is_zero_when_display_off() {
        assert_eq!(max_brightness(false, true), 0);
    }

    #[test]
    fn max_brightness_is_reduced_on_low_battery() {
        assert!(max_brightness(true, false) < max_brightness(false, false));
    }

    #[test]
    fn rgb_scale_preserves_black() {
        assert_eq!(Rgb::BLACK.scale(255), Rgb::BLACK);
    }
}
