//! Monsoon-style high-voltage power supply driver.
//!
//! The supply plays two roles: a programmable rail source (voltage set over a
//! USB control channel) and a high-rate power meter (current/voltage samples
//! pulled over a bulk endpoint). Its mains relay sits on its own GPIO line,
//! active-high, unlike the rail multiplexer.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rusb::{DeviceHandle, Direction, GlobalContext, Recipient, RequestType};

use crate::core::device::{PowerState, SupplyConfig};
use crate::error::{Result, RigError};
use crate::hw::{gpio, AVAILABILITY_POLL_INTERVAL};

/// Largest number of raw samples the driver hands back per poll.
pub const MAX_SAMPLES_PER_POLL: usize = 100;

/// Hardware sampling rate of the meter.
const SAMPLE_RATE_HZ: f64 = 5_000.0;

// Control-channel protocol constants.
const REQ_SET_VALUE: u8 = 0x01;
const REQ_START_SAMPLING: u8 = 0x02;
const REQ_STOP_SAMPLING: u8 = 0x03;
const OP_MAIN_VOLTAGE: u16 = 0x41;
const OP_USB_PASSTHROUGH: u16 = 0x10;
const OP_CHANNEL_MASK: u16 = 0x2c;
const USB_PASSTHROUGH_OFF: u32 = 0;
/// Main current and main voltage only; aux and USB channels disabled.
const CHANNEL_MASK_MAIN_ONLY: u32 = 0b0001_1000;
/// Fixed-point factor for voltage values on the control channel.
const FLOAT_TO_INT: f64 = 1_048_576.0;

// Bulk sample stream layout.
const SAMPLE_ENDPOINT: u8 = 0x81;
const PACKET_LEN: usize = 64;
const PACKET_HEADER_LEN: usize = 4;
const SAMPLE_LEN: usize = 8;
const BULK_TIMEOUT: Duration = Duration::from_millis(500);
const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);

// Factory-default calibration scales; per-unit calibration lives in the
// supply's status packet and is not consulted here.
const FINE_CURRENT_MA_PER_LSB: f64 = 0.000_286;
const COARSE_CURRENT_MA_PER_LSB: f64 = 0.028_6;
const VOLTAGE_V_PER_LSB: f64 = 0.000_794;
/// Fine-range readings above this raw value are out of range; fall back to
/// the coarse channel.
const FINE_RANGE_LIMIT: u16 = 0xF000;

/// One batch of raw samples, column-major as the hardware delivers them.
#[derive(Debug, Default, Clone)]
pub struct SampleBlock {
    /// Seconds since the sampling-start anchor.
    pub timestamp: Vec<f64>,
    /// Instantaneous main current, mA.
    pub current_ma: Vec<f64>,
    /// Instantaneous main voltage, V.
    pub voltage_v: Vec<f64>,
}

impl SampleBlock {
    pub fn len(&self) -> usize {
        self.timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamp.is_empty()
    }

    fn push(&mut self, timestamp: f64, current_ma: f64, voltage_v: f64) {
        self.timestamp.push(timestamp);
        self.current_ma.push(current_ma);
        self.voltage_v.push(voltage_v);
    }
}

/// The supply as a whole: mains relay, availability, control-channel access.
pub trait Supply {
    /// Switch the supply's mains relay.
    fn rail_switch(&mut self, state: PowerState) -> Result<()>;

    /// Read the mains relay state back from its GPIO line.
    fn rail_state(&mut self) -> Result<PowerState>;

    /// Whether the supply's control channel enumerates on the bus.
    fn is_available(&mut self) -> Result<bool>;

    /// Sleep-poll until the supply enumerates or `timeout` elapses.
    fn wait_for_availability(&mut self, timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        loop {
            if self.is_available()? {
                return Ok(true);
            }
            if start.elapsed() > timeout {
                return Ok(false);
            }
            thread::sleep(AVAILABILITY_POLL_INTERVAL);
        }
    }

    /// Open a control session. Fails with `SupplyConnectFailed` when the
    /// supply is unreachable.
    fn connect(&mut self) -> Result<Box<dyn SupplySession>>;
}

/// An open control session on the supply.
pub trait SupplySession {
    /// Program the rail output voltage (0.0 de-energizes the output).
    fn set_voltage(&mut self, volts: f64) -> Result<()>;

    /// Report only main current and main voltage; disable every other
    /// channel and USB passthrough.
    fn select_main_channels(&mut self) -> Result<()>;

    /// Put the meter in sampling mode. Returns the sampling-start anchor as
    /// seconds since the epoch; sample timestamps are relative to it.
    fn start_sampling(&mut self) -> Result<f64>;

    /// Pull up to `max_samples` raw samples.
    fn read_block(&mut self, max_samples: usize) -> Result<SampleBlock>;

    /// Leave sampling mode. Safe to call when not sampling.
    fn stop_sampling(&mut self) -> Result<()>;
}

/// Driver for the Monsoon HVPM power monitor.
pub struct MonsoonHvpm {
    config: SupplyConfig,
}

impl MonsoonHvpm {
    pub fn new(config: SupplyConfig) -> Self {
        Self { config }
    }

    /// Initialize the mains relay line to output/off. Required once per host
    /// boot.
    pub fn init_state(&self) -> Result<()> {
        gpio::init(self.config.gpio_pin, RELAY_LEVEL_OFF)
    }
}

// The supply relay is active-high: 1 energizes the mains input.
const RELAY_LEVEL_ON: u8 = 1;
const RELAY_LEVEL_OFF: u8 = 0;

impl Supply for MonsoonHvpm {
    fn rail_switch(&mut self, state: PowerState) -> Result<()> {
        let level = match state {
            PowerState::On => RELAY_LEVEL_ON,
            PowerState::Off => RELAY_LEVEL_OFF,
        };
        gpio::write(self.config.gpio_pin, level)
    }

    fn rail_state(&mut self) -> Result<PowerState> {
        match gpio::read(self.config.gpio_pin)? {
            RELAY_LEVEL_ON => Ok(PowerState::On),
            RELAY_LEVEL_OFF => Ok(PowerState::Off),
            other => Err(RigError::config(format!("unknown GPIO level: {other}"))),
        }
    }

    fn is_available(&mut self) -> Result<bool> {
        let target = self.config.usb.vid_pid()?;
        for device in rusb::devices()?.iter() {
            if let Ok(descriptor) = device.device_descriptor() {
                if (descriptor.vendor_id(), descriptor.product_id()) == target {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn connect(&mut self) -> Result<Box<dyn SupplySession>> {
        let (vid, pid) = self.config.usb.vid_pid()?;
        let handle = rusb::open_device_with_vid_pid(vid, pid).ok_or_else(|| {
            RigError::SupplyConnectFailed(format!("no USB device matching {vid:04x}:{pid:04x}"))
        })?;
        handle
            .claim_interface(0)
            .map_err(|e| RigError::SupplyConnectFailed(format!("claim_interface: {e}")))?;
        log::info!("Connected to power supply at {}", self.config.usb.id);
        Ok(Box::new(MonsoonSession {
            handle,
            sampling: false,
            samples_read: 0,
            pending: VecDeque::new(),
        }))
    }
}

struct MonsoonSession {
    handle: DeviceHandle<GlobalContext>,
    sampling: bool,
    /// Running sample index; timestamps derive from it and the sample rate.
    samples_read: u64,
    /// Decoded samples not yet handed to a caller. A bulk packet can decode
    /// past the caller's cap; the surplus is served by the next poll.
    pending: VecDeque<[f64; 3]>,
}

/// Decode one bulk packet into the pending queue as
/// `[timestamp, current_ma, voltage_v]` rows. Returns the number of samples
/// appended.
fn decode_packet(packet: &[u8], samples_read: &mut u64, pending: &mut VecDeque<[f64; 3]>) -> usize {
    if packet.len() < PACKET_HEADER_LEN {
        return 0;
    }
    let dropped = u16::from_le_bytes([packet[0], packet[1]]);
    if dropped > 0 {
        log::warn!("Supply reports {dropped} dropped samples.");
    }
    let count = packet[3] as usize;
    let payload = &packet[PACKET_HEADER_LEN..];
    let mut appended = 0;
    for raw in payload.chunks_exact(SAMPLE_LEN).take(count) {
        let coarse = u16::from_le_bytes([raw[0], raw[1]]);
        let fine = u16::from_le_bytes([raw[2], raw[3]]);
        let voltage = u16::from_le_bytes([raw[4], raw[5]]);

        let current_ma = if fine < FINE_RANGE_LIMIT {
            f64::from(fine) * FINE_CURRENT_MA_PER_LSB
        } else {
            f64::from(coarse) * COARSE_CURRENT_MA_PER_LSB
        };
        let voltage_v = f64::from(voltage) * VOLTAGE_V_PER_LSB;
        let timestamp = *samples_read as f64 / SAMPLE_RATE_HZ;

        pending.push_back([timestamp, current_ma, voltage_v]);
        *samples_read += 1;
        appended += 1;
    }
    appended
}

/// Move pending samples into the block, never past `max_samples`.
fn take_pending(pending: &mut VecDeque<[f64; 3]>, block: &mut SampleBlock, max_samples: usize) {
    while block.len() < max_samples {
        let Some([timestamp, current_ma, voltage_v]) = pending.pop_front() else {
            break;
        };
        block.push(timestamp, current_ma, voltage_v);
    }
}

impl MonsoonSession {
    fn set_value(&mut self, opcode: u16, value: u32) -> Result<()> {
        let request_type =
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        self.handle.write_control(
            request_type,
            REQ_SET_VALUE,
            opcode,
            0,
            &value.to_le_bytes(),
            CONTROL_TIMEOUT,
        )?;
        Ok(())
    }

    fn send_command(&mut self, request: u8) -> Result<()> {
        let request_type =
            rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        self.handle
            .write_control(request_type, request, 0, 0, &[], CONTROL_TIMEOUT)?;
        Ok(())
    }
}

impl SupplySession for MonsoonSession {
    fn set_voltage(&mut self, volts: f64) -> Result<()> {
        let fixed = (volts * FLOAT_TO_INT) as u32;
        self.set_value(OP_MAIN_VOLTAGE, fixed)
    }

    fn select_main_channels(&mut self) -> Result<()> {
        self.set_value(OP_CHANNEL_MASK, CHANNEL_MASK_MAIN_ONLY)?;
        self.set_value(OP_USB_PASSTHROUGH, USB_PASSTHROUGH_OFF)
    }

    fn start_sampling(&mut self) -> Result<f64> {
        self.send_command(REQ_START_SAMPLING)?;
        self.sampling = true;
        self.samples_read = 0;
        self.pending.clear();
        let anchor = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| RigError::config(format!("system clock before epoch: {e}")))?
            .as_secs_f64();
        Ok(anchor)
    }

    fn read_block(&mut self, max_samples: usize) -> Result<SampleBlock> {
        if !self.sampling {
            return Err(RigError::NotConnected);
        }
        let mut block = SampleBlock::default();
        let mut packet = [0u8; PACKET_LEN];
        loop {
            take_pending(&mut self.pending, &mut block, max_samples);
            if block.len() >= max_samples {
                break;
            }
            match self
                .handle
                .read_bulk(SAMPLE_ENDPOINT, &mut packet, BULK_TIMEOUT)
            {
                Ok(n) => {
                    decode_packet(&packet[..n], &mut self.samples_read, &mut self.pending);
                }
                // A timed-out poll just means the next packet is not ready.
                Err(rusb::Error::Timeout) => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(block)
    }

    fn stop_sampling(&mut self) -> Result<()> {
        if self.sampling {
            self.send_command(REQ_STOP_SAMPLING)?;
            self.sampling = false;
        }
        Ok(())
    }
}
