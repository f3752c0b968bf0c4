//! Bus openers for Linux `i2c-dev` and `spidev` character devices.

use std::io;
use std::path::PathBuf;

use linux_embedded_hal::i2cdev::linux::LinuxI2CError;
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::{I2cdev, SPIError, SpidevDevice};

use crate::bus::Open;

pub const DEFAULT_I2C_PATH: &str = "/dev/i2c-1";
pub const DEFAULT_SPI_PATH: &str = "/dev/spidev0.0";
pub const DEFAULT_SPI_HZ: u32 = 1_000_000;

#[derive(Debug)]
pub enum LinuxOpenError {
    I2c(LinuxI2CError),
    Spi(SPIError),
    /// The device opened but rejected mode/speed settings.
    Config(io::Error),
}

impl core::fmt::Display for LinuxOpenError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LinuxOpenError::I2c(e) => write!(f, "i2c: {}", e),
            LinuxOpenError::Spi(e) => write!(f, "spi: {:?}", e),
            LinuxOpenError::Config(e) => write!(f, "spi configure: {}", e),
        }
    }
}

impl std::error::Error for LinuxOpenError {}

/// Opener for an `i2c-dev` bus, e.g. `/dev/i2c-1`.
#[derive(Clone, Debug)]
pub struct I2cOpener {
    path: PathBuf,
}

impl I2cOpener {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Default for I2cOpener {
    fn default() -> Self {
        Self::new(DEFAULT_I2C_PATH)
    }
}

impl Open for I2cOpener {
    type Bus = I2cdev;
    type Error = LinuxOpenError;

    fn open(&mut self) -> Result<I2cdev, LinuxOpenError> {
        I2cdev::new(&self.path).map_err(LinuxOpenError::I2c)
    }
}

/// Opener for a `spidev` device in mode 0 with 8-bit words.
#[derive(Clone, Debug)]
pub struct SpiOpener {
    path: PathBuf,
    max_speed_hz: u32,
}

impl SpiOpener {
    pub fn new(path: impl Into<PathBuf>, max_speed_hz: u32) -> Self {
        Self {
            path: path.into(),
            max_speed_hz,
        }
    }
}

impl Default for SpiOpener {
    fn default() -> Self {
        Self::new(DEFAULT_SPI_PATH, DEFAULT_SPI_HZ)
    }
}

impl Open for SpiOpener {
    type Bus = SpidevDevice;
    type Error = LinuxOpenError;

    fn open(&mut self) -> Result<SpidevDevice, LinuxOpenError> {
        let mut spi = SpidevDevice::open(&self.path).map_err(LinuxOpenError::Spi)?;
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(self.max_speed_hz)
            .mode(SpiModeFlags::SPI_MODE_0)
            .build();
        spi.configure(&options).map_err(LinuxOpenError::Config)?;
        Ok(spi)
    }
}
