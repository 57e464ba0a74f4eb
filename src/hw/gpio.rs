//! Raw GPIO line access through the Linux character device.

use gpio_cdev::{Chip, LineRequestFlags};

use crate::error::Result;

/// GPIO chip the rail multiplexer and supply relay hang off
/// (typically /dev/gpiochip4 on a Raspberry Pi 5).
pub const GPIO_CHIP: &str = "/dev/gpiochip4";

const CONSUMER: &str = "railbench";

/// Initialize a pin to output with a default level.
pub fn init(pin: u32, default: u8) -> Result<()> {
    let mut chip = Chip::new(GPIO_CHIP)?;
    let line = chip.get_line(pin)?;
    let handle = line.request(LineRequestFlags::OUTPUT, default, CONSUMER)?;
    handle.set_value(default)?;
    Ok(())
}

/// Write a level (0 or 1) to a pin.
pub fn write(pin: u32, level: u8) -> Result<()> {
    let mut chip = Chip::new(GPIO_CHIP)?;
    let line = chip.get_line(pin)?;
    let handle = line.request(LineRequestFlags::OUTPUT, level, CONSUMER)?;
    handle.set_value(level)?;
    Ok(())
}

/// Read the current level of a pin without reconfiguring its direction.
pub fn read(pin: u32) -> Result<u8> {
    let mut chip = Chip::new(GPIO_CHIP)?;
    let line = chip.get_line(pin)?;
    let handle = line.request(LineRequestFlags::empty(), 1, CONSUMER)?;
    Ok(handle.get_value()?)
}
