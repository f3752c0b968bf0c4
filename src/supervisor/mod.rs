//! Polling orchestrator.
//!
//! Two long-lived activities run on worker threads:
//!
//! - the device actor, started with the supervisor and running until
//!   shutdown. It exclusively owns the detect and reset pins, the
//!   [`DetectResetSequencer`](crate::sequencer::DetectResetSequencer) and the
//!   [`Pca9539`] driver. Everything else reaches the expander through its
//!   command channel.
//! - the telemetry poller, running only between [`Supervisor::start`] and
//!   [`Supervisor::stop`]. It owns the SPI client, decodes one cycle per poll
//!   period, publishes the readings and then asks the device actor to mirror
//!   the on/off bitmap onto the expander.
//!
//! Cancellation is cooperative: a stop signal wakes a worker at its next
//! wait, and the caller gives up waiting after the configured stop timeout.
//! Cleanup runs either way.

mod device;
mod poller;

use std::sync::Arc;
use std::sync::mpsc::{self, Sender};

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;
use embedded_hal::spi::SpiDevice;
use parking_lot::Mutex;

use crate::bus::{BusHandle, Open};
use crate::config::SupervisorConfig;
use crate::data_types::{CHANNEL_COUNT, ChannelReading, FanSeatReading, HotReset, POSITION_COUNT, Profile};
use crate::expander::Pca9539;
use crate::nvm::Mr793200;
use crate::sequencer::SequencerState;

use device::{DeviceActor, DeviceCommand};
use poller::PollTask;

/// Latest decoded readings, shaped by the profile.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Readings {
    /// Not polling.
    #[default]
    None,
    Channels([ChannelReading; CHANNEL_COUNT]),
    FanSeat {
        /// Tag identifier as uppercase hex, if it could be read.
        tid: Option<String>,
        positions: [FanSeatReading; POSITION_COUNT],
    },
}

/// What the presentation layer sees.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub detect: Option<bool>,
    pub reset: Option<bool>,
    pub i2c_ready: bool,
    pub sequencer: SequencerState,
    /// Last verified expander output mask.
    pub output_mask: u16,
    pub polling: bool,
    pub readings: Readings,
}

impl StatusSnapshot {
    /// Expander status line derived from detect/reset.
    pub fn i2c_label(&self) -> &'static str {
        match (self.detect, self.reset) {
            (Some(false), Some(false)) => "Not initialized.",
            (Some(true), Some(false)) => "Waiting reset released...",
            (Some(true), Some(true)) => "Succeeded.",
            _ => "-",
        }
    }
}

/// User-visible notices raised by commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Hot reset was requested while detect was low.
    HotResetUnavailable,
    /// An expander output write did not read back; outputs may be stale.
    OutputsStale,
}

impl core::fmt::Display for Notice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Notice::HotResetUnavailable => write!(f, "Available when VDET is \"High\"."),
            Notice::OutputsStale => write!(f, "Output update could not be verified."),
        }
    }
}

/// Callback into the presentation layer. Called from worker threads after every state change.
pub trait Repaint: Send + Sync {
    fn repaint(&self, snapshot: &StatusSnapshot);

    fn notice(&self, notice: Notice) {
        log::info!("[NOTICE] {}", notice);
    }
}

impl<F> Repaint for F
where
    F: Fn(&StatusSnapshot) + Send + Sync,
{
    fn repaint(&self, snapshot: &StatusSnapshot) {
        self(snapshot)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisorError {
    /// A bus could not be opened; the subsystem did not start.
    BusUnavailable,
    /// A worker thread could not be spawned.
    Spawn,
    /// The device actor is not running.
    DeviceGone,
}

impl core::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SupervisorError::BusUnavailable => write!(f, "bus unavailable"),
            SupervisorError::Spawn => write!(f, "failed to spawn worker thread"),
            SupervisorError::DeviceGone => write!(f, "device actor not running"),
        }
    }
}

impl std::error::Error for SupervisorError {}

/// Snapshot plus listener, shared by the workers.
pub(crate) struct Shared {
    snapshot: Mutex<StatusSnapshot>,
    listener: Box<dyn Repaint>,
}

impl Shared {
    fn new(listener: Box<dyn Repaint>) -> Self {
        Self {
            snapshot: Mutex::new(StatusSnapshot::default()),
            listener,
        }
    }

    /// Mutate the snapshot and repaint with a copy, outside the lock.
    pub(crate) fn update(&self, f: impl FnOnce(&mut StatusSnapshot)) {
        let copy = {
            let mut snapshot = self.snapshot.lock();
            f(&mut snapshot);
            snapshot.clone()
        };
        self.listener.repaint(&copy);
    }

    pub(crate) fn notice(&self, notice: Notice) {
        self.listener.notice(notice);
    }

    fn snapshot(&self) -> StatusSnapshot {
        self.snapshot.lock().clone()
    }
}

pub struct Supervisor<S, E>
where
    S: Open,
    S::Bus: SpiDevice + Send + 'static,
    E: OutputPin,
{
    config: SupervisorConfig,
    shared: Arc<Shared>,
    device: Option<DeviceActor>,
    spi_opener: S,
    spi_enable: E,
    poller: Option<PollTask<S::Bus>>,
}

impl<S, E> Supervisor<S, E>
where
    S: Open,
    S::Bus: SpiDevice + Send + 'static,
    E: OutputPin,
{
    /// Claim the I2C bus and the detect/reset pins and start the device actor.
    ///
    /// Fails with [`SupervisorError::BusUnavailable`] if the I2C bus cannot be opened.
    pub fn new<I, D, R>(
        config: SupervisorConfig,
        i2c_opener: I,
        detect: D,
        reset: R,
        spi_opener: S,
        spi_enable: E,
        listener: impl Repaint + 'static,
    ) -> Result<Self, SupervisorError>
    where
        I: Open + Send + 'static,
        I::Bus: I2c + Send + 'static,
        D: InputPin + Send + 'static,
        R: OutputPin + Send + 'static,
    {
        let mut expander = Pca9539::with_address(i2c_opener, config.expander_address);
        expander.open().map_err(|_| SupervisorError::BusUnavailable)?;

        let shared = Arc::new(Shared::new(Box::new(listener)));
        let device = device::spawn(&config, expander, detect, reset, shared.clone())?;
        Ok(Self {
            config,
            shared,
            device: Some(device),
            spi_opener,
            spi_enable,
            poller: None,
        })
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.shared.snapshot()
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_some()
    }

    /// Start telemetry polling. No-op if already running.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        if self.poller.is_some() {
            return Ok(());
        }
        let device_tx = self.device.as_ref().ok_or(SupervisorError::DeviceGone)?.sender();

        if let Err(e) = self.spi_enable.set_high() {
            log::warn!("[GPIO] SPI enable HIGH error: {:?}", e);
        }
        let opener = &mut self.spi_opener;
        let mut open_client = || opener.open().map(Mr793200::new);
        let mut handle = BusHandle::closed("SPI");
        if !handle.open_with(&mut open_client) {
            self.release_spi_enable();
            return Err(SupervisorError::BusUnavailable);
        }

        if self.config.profile == Profile::Channels {
            // outputs were released by the last stop; bring the expander back if the board is up
            let _ = device_tx.send(DeviceCommand::EnsureInitialized);
        }

        match poller::spawn(&self.config, handle, device_tx, self.shared.clone()) {
            Ok(task) => {
                self.poller = Some(task);
                self.shared.update(|s| s.polling = true);
                log::info!("[SPI] polling started ({:?})", self.config.profile);
                Ok(())
            }
            Err(e) => {
                log::error!("[SPI] failed to spawn poller: {}", e);
                self.release_spi_enable();
                Err(SupervisorError::Spawn)
            }
        }
    }

    /// Stop telemetry polling: cancel, wait up to the stop timeout, then release the SPI device
    /// and, in the channel profile, shut the expander down safely. Cleanup runs even if the wait
    /// timed out.
    pub fn stop(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.cancel_and_wait(self.config.stop_timeout);
            poller.close();
        }
        if self.config.profile == Profile::Channels {
            self.ask(DeviceCommand::ShutdownExpander).ok();
        }
        self.release_spi_enable();
        self.shared.update(|s| {
            s.polling = false;
            s.readings = Readings::None;
        });
    }

    /// Drive all expander outputs low through the verified write path.
    pub fn force_outputs_off(&self) -> Result<bool, SupervisorError> {
        self.ask(DeviceCommand::ForceOutputsOff)
    }

    /// Pulse reset and re-run the init step. Refused (with a notice) while detect is low.
    pub fn request_hot_reset(&self) -> Result<HotReset, SupervisorError> {
        self.ask(DeviceCommand::HotReset)
    }

    /// Full teardown, in order: cancel polling, bounded wait, force outputs off, close device
    /// handles, release digital I/O. Each step runs even if an earlier one failed. Idempotent.
    pub fn shutdown(&mut self) {
        let mut poller = self.poller.take();
        if let Some(poller) = poller.as_mut() {
            poller.cancel_and_wait(self.config.stop_timeout);
        }
        if let Err(e) = self.force_outputs_off() {
            log::debug!("[EXIT] force outputs off skipped: {}", e);
        }
        if let Err(e) = self.ask(DeviceCommand::ShutdownExpander) {
            log::debug!("[EXIT] expander shutdown skipped: {}", e);
        }
        if let Some(mut poller) = poller {
            poller.close();
        }
        self.release_spi_enable();
        if let Some(device) = self.device.take() {
            device.shutdown();
        }
        self.shared.update(|s| {
            s.polling = false;
            s.readings = Readings::None;
        });
    }

    fn release_spi_enable(&mut self) {
        if let Err(e) = self.spi_enable.set_low() {
            log::warn!("[GPIO] SPI enable LOW error: {:?}", e);
        }
    }

    /// Send a command carrying a reply channel and wait for the answer.
    fn ask<T>(&self, command: impl FnOnce(Sender<T>) -> DeviceCommand) -> Result<T, SupervisorError> {
        let device = self.device.as_ref().ok_or(SupervisorError::DeviceGone)?;
        let (reply_tx, reply_rx) = mpsc::channel();
        device
            .sender()
            .send(command(reply_tx))
            .map_err(|_| SupervisorError::DeviceGone)?;
        reply_rx
            .recv_timeout(self.config.stop_timeout)
            .map_err(|_| SupervisorError::DeviceGone)
    }
}

impl<S, E> Drop for Supervisor<S, E>
where
    S: Open,
    S::Bus: SpiDevice + Send + 'static,
    E: OutputPin,
{
    fn drop(&mut self) {
        if self.device.is_some() || self.poller.is_some() {
            self.shutdown();
        }
    }
}
