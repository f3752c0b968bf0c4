//! Telemetry poller thread.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::spi::SpiDevice;
use parking_lot::Mutex;

use super::device::DeviceCommand;
use super::{Readings, Shared};
use crate::bus::BusHandle;
use crate::config::SupervisorConfig;
use crate::data_types::Profile;
use crate::nvm::Mr793200;
use crate::telemetry::{FanSeatDecoder, poll_channels};

type ClientSlot<SPI> = Arc<Mutex<BusHandle<Mr793200<SPI>>>>;

pub(crate) struct PollTask<SPI> {
    cancel: Sender<()>,
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
    client: ClientSlot<SPI>,
}

impl<SPI> PollTask<SPI> {
    /// Signal cancellation and wait up to `timeout` for the worker to exit.
    pub(crate) fn cancel_and_wait(&mut self, timeout: Duration) -> bool {
        let _ = self.cancel.send(());
        let exited = match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        };
        if !exited {
            log::warn!("[SPI] poller did not stop within {:?}; closing anyway", timeout);
            return false;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("[SPI] poller panicked");
            }
        }
        true
    }

    /// Release the SPI device. Never blocks: if a worker that outlived the wait still holds
    /// the device, it closes the handle itself on its way out.
    pub(crate) fn close(&mut self) {
        match self.client.try_lock() {
            Some(mut slot) => {
                slot.close();
            }
            None => log::warn!("[SPI] device busy; poller closes it on exit"),
        }
    }
}

pub(crate) fn spawn<SPI>(
    config: &SupervisorConfig,
    client: BusHandle<Mr793200<SPI>>,
    device: Sender<DeviceCommand>,
    shared: Arc<Shared>,
) -> std::io::Result<PollTask<SPI>>
where
    SPI: SpiDevice + Send + 'static,
{
    let (cancel_tx, cancel_rx) = mpsc::channel();
    let (done_tx, done_rx) = mpsc::channel();
    let slot = Arc::new(Mutex::new(client));
    let worker = Worker {
        profile: config.profile,
        period: config.poll_period,
        addr_msb: config.nvm_addr_msb,
        client: slot.clone(),
        cancel: cancel_rx,
        device,
        shared,
        fan_seat: FanSeatDecoder::new(),
        tid: None,
    };
    let thread = thread::Builder::new().name("nvm-poll".into()).spawn(move || {
        worker.run();
        drop(done_tx);
    })?;
    Ok(PollTask {
        cancel: cancel_tx,
        done: done_rx,
        thread: Some(thread),
        client: slot,
    })
}

/// Render the tag identifier as uppercase hex, 4 digits per word.
pub(crate) fn format_tid(words: &[u16]) -> String {
    words.iter().map(|w| format!("{:04X}", w)).collect()
}

struct Worker<SPI> {
    profile: Profile,
    period: Duration,
    addr_msb: u8,
    client: ClientSlot<SPI>,
    cancel: Receiver<()>,
    device: Sender<DeviceCommand>,
    shared: Arc<Shared>,
    fan_seat: FanSeatDecoder,
    tid: Option<String>,
}

enum Cycle {
    Channels { on_off: u16, readings: Readings },
    FanSeat(Readings),
    Skipped,
    Closed,
}

impl<SPI: SpiDevice> Worker<SPI> {
    fn run(mut self) {
        if self.profile == Profile::FanSeat {
            self.read_tid();
        }
        loop {
            let cycle = self.cycle();
            if self.cancelled() {
                break;
            }
            match cycle {
                Cycle::Closed => break,
                Cycle::Skipped => {}
                Cycle::Channels { on_off, readings } => {
                    self.shared.update(|s| s.readings = readings);
                    let _ = self.device.send(DeviceCommand::SetOutputs(on_off));
                }
                Cycle::FanSeat(readings) => self.shared.update(|s| s.readings = readings),
            }
            match self.cancel.recv_timeout(self.period) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.client.lock().close();
        log::info!("[SPI] poller exited");
    }

    fn cancelled(&self) -> bool {
        !matches!(self.cancel.try_recv(), Err(TryRecvError::Empty))
    }

    fn read_tid(&mut self) {
        let tid = match self.client.lock().get() {
            Some(client) => client.read_tid(),
            None => return,
        };
        self.tid = match tid {
            Ok(words) => Some(format_tid(&words)),
            Err(e) => {
                log::warn!("[SPI] TID read failed: {}", e);
                None
            }
        };
        log::info!("[SPI] TID = {:?}", self.tid);
        let readings = Readings::FanSeat {
            tid: self.tid.clone(),
            positions: *self.fan_seat.positions(),
        };
        self.shared.update(|s| s.readings = readings);
    }

    /// One read + decode. Read failures are transient: previous readings stay published.
    fn cycle(&mut self) -> Cycle {
        let mut guard = self.client.lock();
        let Some(client) = guard.get() else {
            return Cycle::Closed;
        };
        match self.profile {
            Profile::Channels => match poll_channels(client, self.addr_msb) {
                Ok(frame) => Cycle::Channels {
                    on_off: frame.on_off,
                    readings: Readings::Channels(frame.channels),
                },
                Err(e) => {
                    log::warn!("[SPI] loop error: {}", e);
                    Cycle::Skipped
                }
            },
            Profile::FanSeat => match self.fan_seat.poll(client, self.addr_msb) {
                Ok(positions) => Cycle::FanSeat(Readings::FanSeat {
                    tid: self.tid.clone(),
                    positions: *positions,
                }),
                Err(e) => {
                    log::warn!("[SPI] loop error: {}", e);
                    Cycle::Skipped
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::format_tid;

    #[test]
    fn tid_is_uppercase_hex_per_word() {
        assert_eq!(format_tid(&[0x00AB, 0xCDEF, 0x0001]), "00ABCDEF0001");
    }
}
