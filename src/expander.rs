//! PCA9539 16-bit I2C port expander driver.
//!
//! Every write that changes device state is followed by a readback. The
//! in-memory [`ExpanderState`] only ever holds values the hardware confirmed,
//! so a failed verify leaves the previous mask in place.
//!
//! The bus is opened lazily through an [`Open`] implementation and released by
//! [`Pca9539::shutdown_safe`]; a later `init_device` reopens it.

use embedded_hal::i2c::I2c;

use crate::bus::{BusHandle, Open};
use crate::data_types::ExpanderState;
use crate::error::Error;
use crate::registers::{DEFAULT_EXPANDER_ADDRESS, EXPANDER_INIT_VALUE, INIT_SEQUENCE, OutputLines, addr};

type BusError<O> = <<O as Open>::Bus as embedded_hal::i2c::ErrorType>::Error;

pub struct Pca9539<O: Open> {
    opener: O,
    bus: BusHandle<O::Bus>,
    address: u8,
    state: ExpanderState,
}

impl<O: Open> Pca9539<O> {
    /// Create a driver at the default address (0x74). Nothing is opened yet.
    pub fn new(opener: O) -> Self {
        Self::with_address(opener, DEFAULT_EXPANDER_ADDRESS)
    }

    pub fn with_address(opener: O, address: u8) -> Self {
        Self {
            opener,
            bus: BusHandle::closed("I2C"),
            address,
            state: ExpanderState::default(),
        }
    }

    /// Return the 7-bit I2C address configured for this instance.
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn state(&self) -> ExpanderState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state.initialized
    }

    pub fn output_mask(&self) -> u16 {
        self.state.output_mask
    }

    pub fn is_open(&self) -> bool {
        self.bus.is_open()
    }

    /// Claim the bus if it is not open yet.
    pub fn open(&mut self) -> Result<(), Error<BusError<O>>>
    where
        O::Bus: embedded_hal::i2c::ErrorType,
    {
        if self.bus.open_with(&mut self.opener) {
            Ok(())
        } else {
            Err(Error::BusUnavailable)
        }
    }
}

/// Compare a pair readback against what was written.
fn check_pair<E>(pair: (u8, u8), wrote: (u8, u8), read: (u8, u8)) -> Result<(), Error<E>> {
    if read.0 != wrote.0 {
        return Err(Error::VerifyMismatch { register: pair.0, wrote: wrote.0, read: read.0 });
    }
    if read.1 != wrote.1 {
        return Err(Error::VerifyMismatch { register: pair.1, wrote: wrote.1, read: read.1 });
    }
    Ok(())
}

fn log_init_readback(readback: &[(u8, u8); INIT_SEQUENCE.len()]) {
    let [pol, cfg, out] = readback;
    log::info!(
        "[I2C] PCA9539 readback pol={:02X}/{:02X}, cfg={:02X}/{:02X}, out={:02X}/{:02X}",
        pol.0,
        pol.1,
        cfg.0,
        cfg.1,
        out.0,
        out.1
    );
}

impl<O> Pca9539<O>
where
    O: Open,
    O::Bus: I2c,
{
    /// Write a single register.
    pub fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), Error<BusError<O>>> {
        let address = self.address;
        let bus = self.bus.get().ok_or(Error::BusClosed)?;
        bus.write(address, &[reg, value]).map_err(Error::Bus)
    }

    /// Read a single register.
    pub fn read_reg(&mut self, reg: u8) -> Result<u8, Error<BusError<O>>> {
        let address = self.address;
        let bus = self.bus.get().ok_or(Error::BusClosed)?;
        let mut buf = [0u8; 1];
        bus.write_read(address, &[reg], &mut buf).map_err(Error::Bus)?;
        Ok(buf[0])
    }

    /// Write both registers of a pair, then read both back.
    fn write_pair(&mut self, pair: (u8, u8), values: (u8, u8)) -> Result<(u8, u8), Error<BusError<O>>> {
        self.write_reg(pair.0, values.0)?;
        self.write_reg(pair.1, values.1)?;
        Ok((self.read_reg(pair.0)?, self.read_reg(pair.1)?))
    }

    /// Open the bus, program polarity/configuration/output to 0x00 and verify all six registers.
    ///
    /// Every pair is written and read back before any comparison, so the log shows all six values.
    pub fn try_init_device(&mut self) -> Result<(), Error<BusError<O>>> {
        self.state.initialized = false;
        self.open()?;
        let init = (EXPANDER_INIT_VALUE, EXPANDER_INIT_VALUE);
        let mut readback = [(0u8, 0u8); INIT_SEQUENCE.len()];
        for (pair, read) in INIT_SEQUENCE.iter().zip(readback.iter_mut()) {
            *read = self.write_pair(*pair, init)?;
        }
        log_init_readback(&readback);
        for (pair, read) in INIT_SEQUENCE.iter().zip(readback) {
            check_pair(*pair, init, read)?;
        }
        self.state = ExpanderState { initialized: true, output_mask: 0x0000 };
        Ok(())
    }

    /// Initialize the device. Returns true only if every readback matched; errors are logged, not raised.
    pub fn init_device(&mut self) -> bool {
        match self.try_init_device() {
            Ok(()) => {
                log::info!("[I2C] PCA9539 init OK");
                true
            }
            Err(e) => {
                log::warn!("[I2C] PCA9539 init NG: {}", e);
                false
            }
        }
    }

    /// Drive all 16 outputs. No. 1 -> bit 0 (P00) ... No. 16 -> bit 15 (P17).
    pub fn try_set_outputs(&mut self, mask: u16) -> Result<(), Error<BusError<O>>> {
        if !self.state.initialized || !self.bus.is_open() {
            return Err(Error::NotInitialized);
        }
        let lines = OutputLines::from_bits_retain(mask);
        let pair = (addr::OUTPUT0, addr::OUTPUT1);
        let wrote = (lines.port0(), lines.port1());
        let read = self.write_pair(pair, wrote)?;
        check_pair(pair, wrote, read)?;
        self.state.output_mask = mask;
        Ok(())
    }

    /// Drive all 16 outputs and verify. On any failure the stored mask keeps its last verified value.
    pub fn set_outputs(&mut self, mask: u16) -> bool {
        match self.try_set_outputs(mask) {
            Ok(()) => true,
            Err(Error::NotInitialized) => {
                log::warn!("[I2C] outputs not set: bus not open or device not initialized");
                false
            }
            Err(e) => {
                log::warn!(
                    "[I2C] output write 0x{:04X} failed ({}); outputs may be stale, keeping 0x{:04X}",
                    mask,
                    e,
                    self.state.output_mask
                );
                false
            }
        }
    }

    /// Best-effort: force both output ports low, then release the bus and forget init. Idempotent.
    pub fn shutdown_safe(&mut self) {
        if self.bus.is_open() {
            let zeroed = self
                .write_reg(addr::OUTPUT0, 0x00)
                .and_then(|()| self.write_reg(addr::OUTPUT1, 0x00));
            match zeroed {
                Ok(()) => log::info!("[I2C] outputs forced LOW on shutdown"),
                Err(e) => log::warn!("[I2C] failed to force outputs LOW: {}", e),
            }
        }
        self.bus.close();
        self.state = ExpanderState::default();
    }
}

#[cfg(feature = "async")]
impl<O> Pca9539<O>
where
    O: Open,
    O::Bus: embedded_hal_async::i2c::I2c,
{
    pub async fn write_reg_async(&mut self, reg: u8, value: u8) -> Result<(), Error<BusError<O>>> {
        let address = self.address;
        let bus = self.bus.get().ok_or(Error::BusClosed)?;
        embedded_hal_async::i2c::I2c::write(bus, address, &[reg, value])
            .await
            .map_err(Error::Bus)
    }

    pub async fn read_reg_async(&mut self, reg: u8) -> Result<u8, Error<BusError<O>>> {
        let address = self.address;
        let bus = self.bus.get().ok_or(Error::BusClosed)?;
        let mut buf = [0u8; 1];
        embedded_hal_async::i2c::I2c::write_read(bus, address, &[reg], &mut buf)
            .await
            .map_err(Error::Bus)?;
        Ok(buf[0])
    }

    async fn write_pair_async(&mut self, pair: (u8, u8), values: (u8, u8)) -> Result<(u8, u8), Error<BusError<O>>> {
        self.write_reg_async(pair.0, values.0).await?;
        self.write_reg_async(pair.1, values.1).await?;
        Ok((self.read_reg_async(pair.0).await?, self.read_reg_async(pair.1).await?))
    }

    /// Async version of [`Self::try_init_device`].
    pub async fn try_init_device_async(&mut self) -> Result<(), Error<BusError<O>>> {
        self.state.initialized = false;
        self.open()?;
        let init = (EXPANDER_INIT_VALUE, EXPANDER_INIT_VALUE);
        let mut readback = [(0u8, 0u8); INIT_SEQUENCE.len()];
        for (pair, read) in INIT_SEQUENCE.iter().zip(readback.iter_mut()) {
            *read = self.write_pair_async(*pair, init).await?;
        }
        log_init_readback(&readback);
        for (pair, read) in INIT_SEQUENCE.iter().zip(readback) {
            check_pair(*pair, init, read)?;
        }
        self.state = ExpanderState { initialized: true, output_mask: 0x0000 };
        Ok(())
    }

    pub async fn init_device_async(&mut self) -> bool {
        match self.try_init_device_async().await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[I2C] PCA9539 init NG: {}", e);
                false
            }
        }
    }

    pub async fn try_set_outputs_async(&mut self, mask: u16) -> Result<(), Error<BusError<O>>> {
        if !self.state.initialized || !self.bus.is_open() {
            return Err(Error::NotInitialized);
        }
        let lines = OutputLines::from_bits_retain(mask);
        let pair = (addr::OUTPUT0, addr::OUTPUT1);
        let wrote = (lines.port0(), lines.port1());
        let read = self.write_pair_async(pair, wrote).await?;
        check_pair(pair, wrote, read)?;
        self.state.output_mask = mask;
        Ok(())
    }

    pub async fn set_outputs_async(&mut self, mask: u16) -> bool {
        match self.try_set_outputs_async(mask).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("[I2C] output write 0x{:04X} failed: {}", mask, e);
                false
            }
        }
    }

    pub async fn shutdown_safe_async(&mut self) {
        if self.bus.is_open() {
            let mut zeroed = self.write_reg_async(addr::OUTPUT0, 0x00).await;
            if zeroed.is_ok() {
                zeroed = self.write_reg_async(addr::OUTPUT1, 0x00).await;
            }
            if let Err(e) = zeroed {
                log::warn!("[I2C] failed to force outputs LOW: {}", e);
            }
        }
        self.bus.close();
        self.state = ExpanderState::default();
    }
}
