#![no_main]
#![no_std]

use defmt_rtt as _;
use panic_probe as _;

use hal::{
    adc::{Adc, AdcConfig, AdcDevice},
    clocks::Clocks,
    gpio::{Pin, PinMode, Port},
    i2c::{I2c, I2cConfig, I2cMode},
    pac::{self, I2C2, TIM15},
    timer::{Timer, TimerConfig, TimerInterrupt},
};

use rrrc_core::config::{I2C_ADDR_APPLICATION, NUM_MOTOR_PORTS};
use rrrc_core::error_storage::FlashBlock;
use rrrc_core::glue::{ArrayPort, VariablePort};
use rrrc_core::protocol::{handle_frame, RESPONSE_HEADER_LEN};
use rrrc_core::runtime::{Runtime, TickInputs};
use rrrc_core::transport::{MasterLinkRx, MasterLinkTx};
use rrrc_core::watchdog::RebootTarget;

/// Battery/motor-current ADC channel assignment. Concrete pin routing is
/// board-layout detail (§setup, out of scope); only the logical channel
/// order `on_tick` expects is fixed here.
const ADC_CH_MAIN_BATTERY: u8 = 0;
const ADC_CH_MOTOR_BATTERY: u8 = 1;
const ADC_CH_MOTOR_CURRENT_BASE: u8 = 2;
const ADC_CH_MCU_TEMP: u8 = ADC_CH_MOTOR_CURRENT_BASE + NUM_MOTOR_PORTS as u8;
const ADC_CHANNEL_COUNT: u8 = ADC_CH_MCU_TEMP + 1;

/// ADC readings, written by the ADC conversion-complete ISR and read once
/// per 1 ms tick. One writer, one reader, hence the plain critical-section
/// ports from `glue` rather than an RTIC-locked shared resource.
static MOTOR_CURRENT_A: ArrayPort<f32, NUM_MOTOR_PORTS> = ArrayPort::filled_with(0.0);
static MAIN_BATTERY_V: VariablePort<f32> = VariablePort::new(0.0);
static MOTOR_BATTERY_V: VariablePort<f32> = VariablePort::new(0.0);
/// MCU die temperature, same ADC fan-in as the batteries (§C.2).
static MCU_TEMP_C: VariablePort<f32> = VariablePort::new(25.0);

/// Thin `FlashBlock` over a fixed on-chip flash sector, one sector per
/// error-storage block (§6 "Flash layout for error storage"). Exact sector
/// addresses are board/MCU-revision specific and picked here as a
/// plausible default near the top of flash, out of the application image;
/// see DESIGN.md.
pub struct Hal2FlashBlock {
    base_addr: usize,
}

impl Hal2FlashBlock {
    const fn new(base_addr: usize) -> Self {
        Self { base_addr }
    }

    fn as_slice(&self) -> &'static [u8] {
        unsafe {
            core::slice::from_raw_parts(
                self.base_addr as *const u8,
                rrrc_core::config::ERROR_STORAGE_BLOCK_SIZE,
            )
        }
    }
}

impl FlashBlock for Hal2FlashBlock {
    fn read(&self, offset: usize, buf: &mut [u8]) {
        buf.copy_from_slice(&self.as_slice()[offset..offset + buf.len()]);
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) {
        let mut flash = unsafe { hal::flash::Flash::new(pac::Peripherals::steal().FLASH) };
        let addr = self.base_addr + offset;
        flash.write(addr, bytes).ok();
    }

    fn erase(&mut self) {
        let mut flash = unsafe { hal::flash::Flash::new(pac::Peripherals::steal().FLASH) };
        flash.erase_page(self.base_addr).ok();
    }
}

const ERROR_STORAGE_BLOCK_A: usize = 0x0807_0000;
const ERROR_STORAGE_BLOCK_B: usize = 0x0807_1000;

#[rtic::app(device = pac, peripherals = false)]
mod app {
    use super::*;

    #[shared]
    struct Shared {
        runtime: Runtime<Hal2FlashBlock>,
        link_rx: MasterLinkRx,
        link_tx: MasterLinkTx,
        i2c: I2c<I2C2>,
    }

    #[local]
    struct Local {
        tick_timer: Timer<TIM15>,
        adc: Adc<pac::ADC1>,
        adc_round_robin: u8,
    }

    #[init]
    fn init(cx: init::Context) -> (Shared, Local, init::Monotonics) {
        let mut cp = cx.core;
        let dp = pac::Peripherals::take().unwrap();

        cp.SCB.enable_icache();

        let clock_cfg = Clocks::default();
        clock_cfg.setup().unwrap();

        let _sda = Pin::new(Port::B, 11, PinMode::Alt(4));
        let _scl = Pin::new(Port::B, 10, PinMode::Alt(4));

        // Two strap pins tied to ground/VCC on the PCB encode the hardware
        // revision as a 2-bit code (§C.1); read once at boot.
        let hw_rev_bit0 = Pin::new(Port::C, 14, PinMode::Input);
        let hw_rev_bit1 = Pin::new(Port::C, 15, PinMode::Input);
        let hw_version = hw_rev_bit0.is_high() as u32 | ((hw_rev_bit1.is_high() as u32) << 1);

        let i2c_cfg = I2cConfig {
            mode: I2cMode::Slave {
                addr1: I2C_ADDR_APPLICATION as u16,
            },
            ..Default::default()
        };
        let mut i2c = I2c::new(dp.I2C2, i2c_cfg, &clock_cfg);
        i2c.enable_interrupt(hal::i2c::I2cInterrupt::Irq);

        let adc_cfg = AdcConfig::default();
        let mut adc = Adc::new_adc1(dp.ADC1, AdcDevice::One, adc_cfg, &clock_cfg);
        adc.enable_interrupt(hal::adc::AdcInterrupt::EndOfSequence);
        adc.start_conversion(&[ADC_CH_MAIN_BATTERY]);

        let mut tick_timer = Timer::new_tim15(dp.TIM15, 1_000., TimerConfig::default(), &clock_cfg);
        tick_timer.enable_interrupt(TimerInterrupt::Update);

        let runtime = Runtime::new(
            [
                Hal2FlashBlock::new(ERROR_STORAGE_BLOCK_A),
                Hal2FlashBlock::new(ERROR_STORAGE_BLOCK_B),
            ],
            hw_version,
        );

        (
            Shared {
                runtime,
                link_rx: MasterLinkRx::new(),
                link_tx: MasterLinkTx::new(),
                i2c,
            },
            Local {
                tick_timer,
                adc,
                adc_round_robin: 0,
            },
            init::Monotonics(),
        )
    }

    /// The 1 ms scheduler heartbeat (§4.1). Drains any completed master-link
    /// frame into the protocol engine, drives every periodic component
    /// through `Runtime::on_tick`, and applies the outputs it reports.
    #[task(binds = TIM1_BRK_TIM15, shared = [runtime, link_rx, link_tx], local = [tick_timer], priority = 2)]
    fn tick(mut cx: tick::Context) {
        unsafe { (*TIM15::ptr()).sr.modify(|_, w| w.uif().clear_bit()) }

        let timed_out = cx.shared.link_rx.lock(|rx| rx.tick(rrrc_core::config::RX_TIMEOUT_MS));
        if timed_out {
            cx.shared.runtime.lock(|rt| rt.on_rx_timeout());
        }

        let inputs = TickInputs {
            motor_current_a: core::array::from_fn(|i| MOTOR_CURRENT_A.read(i)),
            main_battery_v: MAIN_BATTERY_V.read(),
            motor_battery_v: MOTOR_BATTERY_V.read(),
            mcu_temp_c: MCU_TEMP_C.read(),
        };

        let outputs = cx.shared.runtime.lock(|rt| rt.on_tick(&inputs));

        // Motor PWM / LED rendering hand off to timer-compare and
        // SPI-DMA drivers respectively; both are HAL-abstracted peripheral
        // programming out of this crate's scope (§1), so `outputs` is the
        // boundary this task hands across.
        let _ = outputs.motor_pwm;
        let _ = outputs.ring;
        let _ = outputs.indicators;

        if outputs.kick_watchdog {
            unsafe { (*pac::IWDG::ptr()).kr.write(|w| w.bits(0xAAAA)) }
        }

        if let Some(target) = outputs.reboot {
            match target {
                RebootTarget::Bootloader => {
                    for reg in rrrc_core::watchdog::BOOTLOADER_SENTINEL {
                        let _ = reg;
                    }
                }
                RebootTarget::Application => {}
            }
            cortex_m::peripheral::SCB::sys_reset();
        }
    }

    /// Master-link I2C-slave event handling: address match, byte
    /// ready/transmit, and stop condition all land on the same vector on
    /// this family. Register field names follow the standard STM32 I2C
    /// peripheral (`ISR`/`ICR`); the SERCOM-level framing logic itself
    /// lives in `link_rx`/`link_tx`, not here (§4.2).
    #[task(binds = I2C2_EV, shared = [i2c, link_rx, link_tx, runtime], priority = 4)]
    fn master_link_event(cx: master_link_event::Context) {
        let isr = unsafe { (*I2C2::ptr()).isr.read() };

        (cx.shared.link_rx, cx.shared.link_tx, cx.shared.runtime).lock(|rx, tx, rt| {
            if isr.addr().bit_is_set() {
                unsafe { (*I2C2::ptr()).icr.write(|w| w.addrcf().set_bit()) }
                if isr.dir().bit_is_set() {
                    tx.on_address_match_tx();
                } else {
                    rx.on_address_match_rx();
                }
            }

            if isr.rxne().bit_is_set() {
                let byte = unsafe { (*I2C2::ptr()).rxdr.read().rxdata().bits() };
                rx.on_byte(byte);
            }

            if isr.txis().bit_is_set() {
                let byte = tx.next_byte();
                unsafe { (*I2C2::ptr()).txdr.write(|w| w.txdata().bits(byte)) }
            }

            if isr.stopf().bit_is_set() {
                unsafe { (*I2C2::ptr()).icr.write(|w| w.stopcf().set_bit()) }
                rx.reset_timeout();
                if let Some(len) = rx.on_stop() {
                    let mut resp = [0u8; RESPONSE_HEADER_LEN + rrrc_core::protocol::MAX_PAYLOAD_LEN];
                    let raw = rx.frame();
                    let _ = len;
                    let n = handle_frame(rt, raw, &mut resp);
                    tx.set_next_response(&resp[..n]);
                } else {
                    // Stop after a transmit: the response just finished
                    // going out, which is what the restart manager is
                    // waiting on before a pending reboot fires.
                    rt.restart.on_tx_complete();
                }
            }
        });
    }

    /// ADC round-robin: alternates between the two battery channels and the
    /// motor-current channels each conversion, storing results behind the
    /// single-writer glue ports the tick task reads from.
    #[task(binds = ADC1_2, local = [adc, adc_round_robin], priority = 1)]
    fn adc_conversion_complete(cx: adc_conversion_complete::Context) {
        let reading = cx.local.adc.read_result();
        let voltage = cx.local.adc.reading_to_voltage(reading);

        let channel = *cx.local.adc_round_robin;
        match channel {
            ADC_CH_MAIN_BATTERY => MAIN_BATTERY_V.write(voltage),
            ADC_CH_MOTOR_BATTERY => MOTOR_BATTERY_V.write(voltage),
            ADC_CH_MCU_TEMP => MCU_TEMP_C.write(mcu_temp_from_sense_voltage(voltage)),
            ch if ch >= ADC_CH_MOTOR_CURRENT_BASE
                && (ch - ADC_CH_MOTOR_CURRENT_BASE) as usize < NUM_MOTOR_PORTS =>
            {
                MOTOR_CURRENT_A.write((ch - ADC_CH_MOTOR_CURRENT_BASE) as usize, voltage)
            }
            _ => {}
        }

        let next = if channel + 1 >= ADC_CHANNEL_COUNT {
            0
        } else {
            channel + 1
        };
        *cx.local.adc_round_robin = next;
        cx.local.adc.start_conversion(&[next]);
    }
}

/// STM32 internal-temperature-sensor linear approximation,
/// `T = (V25 - Vsense) / AvgSlope + 25`, using the datasheet's typical
/// (not per-chip-calibrated) constants — `InternalTemperatureSensor.c`'s
/// real implementation reads the factory calibration words instead, out
/// of scope here (§C.2).
fn mcu_temp_from_sense_voltage(v_sense: f32) -> f32 {
    const V25: f32 = 1.43;
    const AVG_SLOPE: f32 = 0.0043;
    (V25 - v_sense) / AVG_SLOPE + 25.0
}
