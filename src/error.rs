//! Error definitions for the expander and NVM drivers.

/// Malformed SPI reply from the NVM device.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProtocolError {
    /// Fewer bytes came back than the framing needs.
    ShortResponse { expected: usize, actual: usize },
    /// More words requested than one transaction frame can carry.
    TooManyWords { requested: usize, max: usize },
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug)]
pub enum Error<BusError> {
    /// Underlying I2C/SPI transaction failed.
    Bus(BusError),
    /// The bus could not be opened or claimed.
    BusUnavailable,
    /// The bus handle has been released.
    BusClosed,
    /// Output writes refused until `init_device` succeeds.
    NotInitialized,
    /// A readback after a write disagreed with the written value.
    VerifyMismatch { register: u8, wrote: u8, read: u8 },
    /// SPI reply could not be decoded.
    Protocol(ProtocolError),
    /// Provided parameter was outside device limits.
    OutOfRange,
}

impl<BusError> From<ProtocolError> for Error<BusError> {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl core::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ProtocolError::ShortResponse { expected, actual } => {
                write!(f, "SPI response too short: {} bytes, need {}", actual, expected)
            }
            ProtocolError::TooManyWords { requested, max } => {
                write!(f, "{} words requested, at most {} per transaction", requested, max)
            }
        }
    }
}

impl<BusError: core::fmt::Debug> core::fmt::Display for Error<BusError> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Bus(e) => write!(f, "bus error: {:?}", e),
            Error::BusUnavailable => write!(f, "bus unavailable"),
            Error::BusClosed => write!(f, "bus handle closed"),
            Error::NotInitialized => write!(f, "device not initialized"),
            Error::VerifyMismatch { register, wrote, read } => write!(
                f,
                "verify mismatch at 0x{:02X}: wrote 0x{:02X}, read 0x{:02X}",
                register, wrote, read
            ),
            Error::Protocol(e) => write!(f, "protocol error: {}", e),
            Error::OutOfRange => write!(f, "parameter out of range"),
        }
    }
}
