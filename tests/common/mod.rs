#![allow(dead_code)]

//! In-memory stand-ins for the board: a PCA9539 register file, an MR793200
//! that answers reads from a word map, and shared-level GPIO pins.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use embedded_hal::digital::{self, InputPin, OutputPin};
use embedded_hal::{i2c, spi};
use expander_supervisor::bus::Open;
use expander_supervisor::supervisor::{Notice, Repaint, StatusSnapshot};

/// PCA9539 register file. Writes latch, reads return the latched value.
#[derive(Clone, Default)]
pub struct RegisterFile {
    regs: Arc<Mutex<[u8; 8]>>,
    /// While set, output register writes are dropped so readback mismatches.
    pub stuck_outputs: Arc<AtomicBool>,
    pointer: u8,
}

impl RegisterFile {
    pub fn new() -> Self {
        let file = Self::default();
        // power-on defaults: all inputs, outputs high
        *file.regs.lock().unwrap() = [0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0xFF, 0xFF];
        file
    }

    pub fn reg(&self, reg: u8) -> u8 {
        self.regs.lock().unwrap()[reg as usize]
    }

    pub fn outputs(&self) -> u16 {
        u16::from_le_bytes([self.reg(0x02), self.reg(0x03)])
    }
}

impl i2c::ErrorType for RegisterFile {
    type Error = i2c::ErrorKind;
}

impl i2c::I2c for RegisterFile {
    fn transaction(&mut self, _address: u8, operations: &mut [i2c::Operation<'_>]) -> Result<(), Self::Error> {
        let mut regs = self.regs.lock().unwrap();
        for op in operations {
            match op {
                i2c::Operation::Write(bytes) => {
                    let Some((&reg, data)) = bytes.split_first() else {
                        continue;
                    };
                    self.pointer = reg & 0x07;
                    if let Some(&value) = data.first() {
                        let output = matches!(self.pointer, 0x02 | 0x03);
                        if !(output && self.stuck_outputs.load(Ordering::SeqCst)) {
                            regs[self.pointer as usize] = value;
                        }
                    }
                }
                i2c::Operation::Read(buf) => buf.fill(regs[self.pointer as usize]),
            }
        }
        Ok(())
    }
}

/// MR793200 stand-in. A 6-byte transfer is a Mode A single-word read,
/// anything longer a Mode B block read.
#[derive(Clone, Default)]
pub struct WordMap {
    words: Arc<Mutex<HashMap<u8, u16>>>,
    pub reads: Arc<AtomicUsize>,
    /// Time every transfer takes.
    pub delay_ms: Arc<AtomicU64>,
    /// Shared by every clone; a clone handed to the driver holds one extra count.
    handles: Arc<()>,
}

impl WordMap {
    /// Clones alive besides this one (i.e. devices the driver still holds).
    pub fn open_handles(&self) -> usize {
        Arc::strong_count(&self.handles) - 1
    }

    pub fn set(&self, addr: u8, word: u16) {
        self.words.lock().unwrap().insert(addr, word);
    }

    fn word(&self, addr: u8) -> u16 {
        self.words.lock().unwrap().get(&addr).copied().unwrap_or(0)
    }
}

impl spi::ErrorType for WordMap {
    type Error = spi::ErrorKind;
}

impl spi::SpiDevice for WordMap {
    fn transaction(&mut self, operations: &mut [spi::Operation<'_, u8>]) -> Result<(), Self::Error> {
        for op in operations {
            if let spi::Operation::TransferInPlace(buf) = op {
                self.reads.fetch_add(1, Ordering::SeqCst);
                let delay = self.delay_ms.load(Ordering::SeqCst);
                if delay > 0 {
                    std::thread::sleep(Duration::from_millis(delay));
                }
                let lsb = buf[1];
                if buf.len() == 6 {
                    buf[4..6].copy_from_slice(&self.word(lsb).to_be_bytes());
                } else {
                    let count = (buf.len() - 4) / 4;
                    for i in 0..count {
                        let at = 4 + 4 * i;
                        let word = self.word(lsb + 2 * i as u8);
                        buf[at..at + 2].copy_from_slice(&word.to_be_bytes());
                    }
                }
            }
        }
        Ok(())
    }
}

/// GPIO line whose level is shared between clones.
#[derive(Clone, Default)]
pub struct Line(Arc<AtomicBool>);

impl Line {
    pub fn new(high: bool) -> Self {
        Self(Arc::new(AtomicBool::new(high)))
    }

    pub fn set(&self, high: bool) {
        self.0.store(high, Ordering::SeqCst);
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl digital::ErrorType for Line {
    type Error = Infallible;
}

impl InputPin for Line {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.get())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.get())
    }
}

impl OutputPin for Line {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(true);
        Ok(())
    }
}

/// Collects every repaint and notice.
#[derive(Clone, Default)]
pub struct Recorder {
    pub repaints: Arc<AtomicUsize>,
    pub notices: Arc<Mutex<Vec<Notice>>>,
}

impl Recorder {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }
}

impl Repaint for Recorder {
    fn repaint(&self, _snapshot: &StatusSnapshot) {
        self.repaints.fetch_add(1, Ordering::SeqCst);
    }

    fn notice(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Opener that hands out clones of one shared fake and counts the opens.
pub struct Share<T> {
    bus: T,
    opens: Arc<AtomicUsize>,
}

impl<T: Clone> Share<T> {
    pub fn counted(bus: &T, opens: &Arc<AtomicUsize>) -> Self {
        Self {
            bus: bus.clone(),
            opens: opens.clone(),
        }
    }
}

impl<T: Clone> Open for Share<T> {
    type Bus = T;
    type Error = Infallible;

    fn open(&mut self) -> Result<T, Infallible> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(self.bus.clone())
    }
}

pub fn opener<T: Clone>(bus: &T) -> Share<T> {
    Share::counted(bus, &Arc::default())
}

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}
