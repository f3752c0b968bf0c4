//! Scoped ownership of an opened I2C bus or SPI device.
//!
//! A [`BusHandle`] is held by exactly the component that talks to the bus.
//! Dropping the handle (or calling [`BusHandle::close`]) releases the
//! underlying channel; on Linux that closes the `/dev/i2c-*` or
//! `/dev/spidev*` file descriptor.

/// Something that can open a bus on demand.
///
/// Implemented for any `FnMut() -> Result<B, E>`, so a closure such as
/// `|| I2cdev::new("/dev/i2c-1")` is an opener.
pub trait Open {
    type Bus;
    type Error: core::fmt::Debug;

    fn open(&mut self) -> Result<Self::Bus, Self::Error>;
}

impl<F, B, E> Open for F
where
    F: FnMut() -> Result<B, E>,
    E: core::fmt::Debug,
{
    type Bus = B;
    type Error = E;

    fn open(&mut self) -> Result<B, E> {
        self()
    }
}

/// An optionally-open bus.
#[derive(Debug)]
pub struct BusHandle<B> {
    name: &'static str,
    bus: Option<B>,
}

impl<B> BusHandle<B> {
    /// A handle that has not been opened yet.
    pub const fn closed(name: &'static str) -> Self {
        Self { name, bus: None }
    }

    /// Open through `opener` unless already open. Returns `false` if the channel could not be claimed.
    pub fn open_with<O>(&mut self, opener: &mut O) -> bool
    where
        O: Open<Bus = B>,
    {
        if self.bus.is_some() {
            return true;
        }
        match opener.open() {
            Ok(bus) => {
                log::info!("[{}] opened", self.name);
                self.bus = Some(bus);
                true
            }
            Err(e) => {
                log::error!("[{}] failed to open: {:?}", self.name, e);
                false
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.bus.is_some()
    }

    /// Borrow the open bus, if any.
    pub fn get(&mut self) -> Option<&mut B> {
        self.bus.as_mut()
    }

    /// Release the bus. Idempotent; returns whether a bus was actually released.
    pub fn close(&mut self) -> bool {
        match self.bus.take() {
            Some(bus) => {
                drop(bus);
                log::info!("[{}] closed", self.name);
                true
            }
            None => false,
        }
    }
}
