//! Device actor: sole owner of the detect/reset pins, the sequencer and the expander.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;

use super::{Notice, Shared, SupervisorError};
use crate::bus::Open;
use crate::config::SupervisorConfig;
use crate::data_types::HotReset;
use crate::expander::Pca9539;
use crate::sequencer::{DetectResetSequencer, SequencerIo};

pub(crate) enum DeviceCommand {
    /// Decoded on/off bitmap from the poller; applied only while the board is healthy.
    SetOutputs(u16),
    ForceOutputsOff(Sender<bool>),
    /// Re-run expander init if the board is up but the expander was shut down.
    EnsureInitialized,
    ShutdownExpander(Sender<()>),
    HotReset(Sender<HotReset>),
    /// Release the pins and exit.
    Shutdown,
}

pub(crate) struct DeviceActor {
    tx: Sender<DeviceCommand>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceActor {
    pub(crate) fn sender(&self) -> Sender<DeviceCommand> {
        self.tx.clone()
    }

    /// Ask the actor to release its pins and wait for it to exit.
    pub(crate) fn shutdown(mut self) {
        let _ = self.tx.send(DeviceCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("[GPIO] device actor panicked");
            }
        }
    }
}

pub(crate) fn spawn<O, D, R>(
    config: &SupervisorConfig,
    expander: Pca9539<O>,
    detect: D,
    reset: R,
    shared: Arc<Shared>,
) -> Result<DeviceActor, SupervisorError>
where
    O: Open + Send + 'static,
    O::Bus: I2c + Send + 'static,
    D: InputPin + Send + 'static,
    R: OutputPin + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let worker = Worker {
        hw: Hardware { expander, detect, reset },
        sequencer: DetectResetSequencer::new(config.sequencer),
        tick: config.tick,
        shared,
    };
    let thread = thread::Builder::new()
        .name("device".into())
        .spawn(move || worker.run(rx))
        .map_err(|e| {
            log::error!("[GPIO] failed to spawn device actor: {}", e);
            SupervisorError::Spawn
        })?;
    Ok(DeviceActor { tx, thread: Some(thread) })
}

struct Hardware<O: Open, D, R> {
    expander: Pca9539<O>,
    detect: D,
    reset: R,
}

impl<O, D, R> SequencerIo for Hardware<O, D, R>
where
    O: Open,
    O::Bus: I2c,
    D: InputPin,
    R: OutputPin,
{
    fn read_detect(&mut self) -> bool {
        self.detect.is_high().unwrap_or_else(|e| {
            log::warn!("[GPIO] read detect error: {:?}", e);
            false
        })
    }

    fn drive_reset(&mut self, high: bool) {
        let driven = if high { self.reset.set_high() } else { self.reset.set_low() };
        if let Err(e) = driven {
            log::warn!("[GPIO] set reset {} error: {:?}", if high { "HIGH" } else { "LOW" }, e);
        }
    }

    fn expander_initialized(&self) -> bool {
        self.expander.is_initialized()
    }

    fn init_expander(&mut self) -> bool {
        self.expander.init_device()
    }
}

struct Worker<O: Open, D, R> {
    hw: Hardware<O, D, R>,
    sequencer: DetectResetSequencer,
    tick: Duration,
    shared: Arc<Shared>,
}

impl<O, D, R> Worker<O, D, R>
where
    O: Open,
    O::Bus: I2c,
    D: InputPin,
    R: OutputPin,
{
    fn run(mut self, rx: Receiver<DeviceCommand>) {
        self.sequencer.begin(&mut self.hw);
        self.publish();

        let mut last = Instant::now();
        let mut next = last;
        loop {
            match rx.recv_timeout(next.saturating_duration_since(Instant::now())) {
                Ok(DeviceCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
                Ok(command) => self.handle(command),
                Err(RecvTimeoutError::Timeout) => {
                    let elapsed_ms = u32::try_from(last.elapsed().as_millis()).unwrap_or(u32::MAX);
                    last += Duration::from_millis(u64::from(elapsed_ms));
                    next = Instant::now() + self.tick;
                    if self.sequencer.tick(&mut self.hw, elapsed_ms) {
                        self.publish();
                    }
                }
            }
        }

        self.release();
    }

    fn handle(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::SetOutputs(mask) => {
                if !self.sequencer.is_healthy() || !self.hw.expander.is_initialized() {
                    log::debug!("[I2C] output update 0x{:04X} skipped: board not ready", mask);
                    return;
                }
                let before = self.hw.expander.output_mask();
                if !self.hw.expander.set_outputs(mask) {
                    self.shared.notice(Notice::OutputsStale);
                } else if before != mask {
                    self.publish();
                }
            }
            DeviceCommand::ForceOutputsOff(reply) => {
                let ok = self.hw.expander.is_initialized() && self.hw.expander.set_outputs(0x0000);
                if !ok {
                    log::warn!("[I2C] outputs OFF not verified");
                }
                self.publish();
                let _ = reply.send(ok);
            }
            DeviceCommand::EnsureInitialized => {
                if self.sequencer.is_healthy() && !self.hw.expander.is_initialized() {
                    self.hw.expander.init_device();
                    self.publish();
                }
            }
            DeviceCommand::ShutdownExpander(reply) => {
                self.hw.expander.shutdown_safe();
                self.publish();
                let _ = reply.send(());
            }
            DeviceCommand::HotReset(reply) => {
                let outcome = self.sequencer.request_hot_reset(&mut self.hw);
                if outcome == HotReset::Refused {
                    self.shared.notice(Notice::HotResetUnavailable);
                }
                self.publish();
                let _ = reply.send(outcome);
            }
            DeviceCommand::Shutdown => {}
        }
    }

    fn publish(&self) {
        let sequencer = &self.sequencer;
        let expander = &self.hw.expander;
        self.shared.update(|s| {
            s.detect = sequencer.detect();
            s.reset = sequencer.reset();
            s.sequencer = sequencer.state();
            s.i2c_ready = expander.is_initialized();
            s.output_mask = expander.output_mask();
        });
    }

    /// Close the expander (idempotent), drive reset low and drop the pins.
    fn release(mut self) {
        self.hw.expander.shutdown_safe();
        self.hw.drive_reset(false);
        log::info!("[GPIO] detect/reset released");
        self.shared.update(|s| {
            s.detect = None;
            s.reset = None;
            s.sequencer = Default::default();
            s.i2c_ready = false;
            s.output_mask = 0;
        });
    }
}
