//! Detect/reset sequencing state machine.
//!
//! ```text
//! IDLE --detect rising--> DELAY_BEFORE_ASSERT (100 ms)
//!      --> RESET_ASSERTED (reset high) --> DELAY_BEFORE_INIT (100 ms)
//!      --> INIT_EXPANDER --> STABLE
//! any state --detect falling--> reset low, IDLE
//! ```
//!
//! The machine is driven by [`DetectResetSequencer::tick`] with the time
//! elapsed since the previous tick. In `IDLE` and `STABLE` the detect line is
//! sampled once per sample period; while a timed state is counting down it is
//! sampled on every tick, so a falling edge aborts the sequence at once
//! instead of after the delay.

use crate::data_types::{Edge, HotReset, PinState};

/// Hardware the sequencer acts on. Implemented by whoever owns the pins and the expander.
pub trait SequencerIo {
    /// Current detect level. Read failures should report `false`.
    fn read_detect(&mut self) -> bool;
    /// Drive the reset output.
    fn drive_reset(&mut self, high: bool);
    fn expander_initialized(&self) -> bool;
    /// Run expander initialization; returns whether it verified.
    fn init_expander(&mut self) -> bool;
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SequencerTiming {
    pub sample_period_ms: u32,
    pub assert_delay_ms: u32,
    pub init_delay_ms: u32,
    pub hot_reset_low_ms: u32,
}

impl Default for SequencerTiming {
    fn default() -> Self {
        Self {
            sample_period_ms: 500,
            assert_delay_ms: 100,
            init_delay_ms: 100,
            hot_reset_low_ms: 500,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SequencerState {
    /// Reset de-asserted, detect unknown or low.
    #[default]
    Idle,
    DelayBeforeAssert { remaining_ms: u32 },
    /// Reset has just been driven high.
    ResetAsserted,
    DelayBeforeInit { remaining_ms: u32 },
    InitExpander,
    Stable,
    /// Hot reset: reset held low before being re-asserted.
    HotResetLow { remaining_ms: u32 },
}

impl SequencerState {
    /// States that are counting down or about to act.
    pub fn is_sequencing(&self) -> bool {
        !matches!(self, SequencerState::Idle | SequencerState::Stable)
    }
}

#[derive(Debug)]
pub struct DetectResetSequencer {
    timing: SequencerTiming,
    state: SequencerState,
    detect: PinState,
    reset: Option<bool>,
    since_sample_ms: u32,
}

impl DetectResetSequencer {
    pub fn new(timing: SequencerTiming) -> Self {
        Self {
            timing,
            state: SequencerState::Idle,
            detect: PinState::default(),
            reset: None,
            // first tick samples immediately
            since_sample_ms: timing.sample_period_ms,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn detect(&self) -> Option<bool> {
        self.detect.level
    }

    pub fn reset(&self) -> Option<bool> {
        self.reset
    }

    pub fn is_stable(&self) -> bool {
        self.state == SequencerState::Stable
    }

    /// Detect high, reset high and sequence finished.
    pub fn is_healthy(&self) -> bool {
        self.is_stable() && self.detect.is_high() && self.reset == Some(true)
    }

    /// Put the reset output in its known initial (low) level.
    pub fn begin<IO: SequencerIo>(&mut self, io: &mut IO) {
        self.drive_reset(io, false);
        self.state = SequencerState::Idle;
    }

    /// Advance by `elapsed_ms`. Returns true if detect, reset or the state changed.
    pub fn tick<IO: SequencerIo>(&mut self, io: &mut IO, elapsed_ms: u32) -> bool {
        let before = (self.state, self.detect.level, self.reset);
        self.since_sample_ms = self.since_sample_ms.saturating_add(elapsed_ms);

        let due = self.state.is_sequencing() || self.since_sample_ms >= self.timing.sample_period_ms;
        let mut elapsed = elapsed_ms;
        if due {
            self.since_sample_ms = 0;
            match self.detect.sample(io.read_detect()) {
                Edge::Falling => {
                    log::info!("[GPIO] detect falling edge: reset LOW");
                    self.drive_reset(io, false);
                    self.state = SequencerState::Idle;
                }
                Edge::Rising => {
                    log::info!("[GPIO] detect rising edge: starting reset sequence");
                    self.state = SequencerState::DelayBeforeAssert { remaining_ms: self.timing.assert_delay_ms };
                    // delay counts from this sample
                    elapsed = 0;
                }
                Edge::None => {}
            }
        }
        self.advance(io, elapsed);

        before != (self.state, self.detect.level, self.reset)
    }

    /// Manual hot reset. With detect high: reset low for the hot-reset time, then the normal
    /// assert + init-delay + init steps. With detect low: reset stays low and the request is refused.
    pub fn request_hot_reset<IO: SequencerIo>(&mut self, io: &mut IO) -> HotReset {
        let level = io.read_detect();
        self.detect.previous = self.detect.level;
        self.detect.level = Some(level);
        self.drive_reset(io, false);
        if level {
            log::info!("[GPIO] hot reset: reset LOW for {} ms", self.timing.hot_reset_low_ms);
            self.state = SequencerState::HotResetLow { remaining_ms: self.timing.hot_reset_low_ms };
            self.advance(io, 0);
            HotReset::Started
        } else {
            log::warn!("[GPIO] hot reset refused: detect is LOW");
            self.state = SequencerState::Idle;
            HotReset::Refused
        }
    }

    fn drive_reset<IO: SequencerIo>(&mut self, io: &mut IO, high: bool) {
        io.drive_reset(high);
        self.reset = Some(high);
    }

    /// Run timed transitions, carrying leftover time into the next state.
    fn advance<IO: SequencerIo>(&mut self, io: &mut IO, mut elapsed: u32) {
        loop {
            let current = self.state;
            self.state = match current {
                SequencerState::Idle | SequencerState::Stable => return,
                SequencerState::DelayBeforeAssert { remaining_ms } if remaining_ms > elapsed => {
                    self.state = SequencerState::DelayBeforeAssert { remaining_ms: remaining_ms - elapsed };
                    return;
                }
                SequencerState::HotResetLow { remaining_ms } if remaining_ms > elapsed => {
                    self.state = SequencerState::HotResetLow { remaining_ms: remaining_ms - elapsed };
                    return;
                }
                SequencerState::DelayBeforeAssert { remaining_ms } | SequencerState::HotResetLow { remaining_ms } => {
                    elapsed -= remaining_ms;
                    log::info!("[GPIO] reset HIGH");
                    self.drive_reset(io, true);
                    SequencerState::ResetAsserted
                }
                SequencerState::ResetAsserted => SequencerState::DelayBeforeInit {
                    remaining_ms: self.timing.init_delay_ms,
                },
                SequencerState::DelayBeforeInit { remaining_ms } if remaining_ms > elapsed => {
                    self.state = SequencerState::DelayBeforeInit { remaining_ms: remaining_ms - elapsed };
                    return;
                }
                SequencerState::DelayBeforeInit { remaining_ms } => {
                    elapsed -= remaining_ms;
                    SequencerState::InitExpander
                }
                SequencerState::InitExpander => {
                    if io.expander_initialized() {
                        log::debug!("[I2C] expander already initialized");
                    } else if !io.init_expander() {
                        log::warn!("[I2C] expander init failed; outputs stay disabled");
                    }
                    SequencerState::Stable
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Bench {
        detect: bool,
        reset: bool,
        initialized: bool,
        init_calls: u32,
    }

    impl SequencerIo for Bench {
        fn read_detect(&mut self) -> bool {
            self.detect
        }
        fn drive_reset(&mut self, high: bool) {
            self.reset = high;
        }
        fn expander_initialized(&self) -> bool {
            self.initialized
        }
        fn init_expander(&mut self) -> bool {
            self.init_calls += 1;
            self.initialized = true;
            true
        }
    }

    /// Baseline low on the first tick, then detect goes high and the next sample sees the edge.
    fn plug(seq: &mut DetectResetSequencer, bench: &mut Bench) {
        seq.begin(bench);
        seq.tick(bench, 0);
        bench.detect = true;
        seq.tick(bench, seq.timing.sample_period_ms);
    }

    #[test]
    fn zero_delays_complete_on_the_edge_tick() {
        let timing = SequencerTiming {
            assert_delay_ms: 0,
            init_delay_ms: 0,
            ..SequencerTiming::default()
        };
        let mut seq = DetectResetSequencer::new(timing);
        let mut bench = Bench::default();
        plug(&mut seq, &mut bench);
        assert!(seq.is_healthy());
        assert_eq!(bench.init_calls, 1);
    }

    #[test]
    fn already_initialized_expander_is_not_reinitialized() {
        let mut seq = DetectResetSequencer::new(SequencerTiming::default());
        let mut bench = Bench { initialized: true, ..Bench::default() };
        plug(&mut seq, &mut bench);
        for _ in 0..5 {
            seq.tick(&mut bench, 50);
        }
        assert!(seq.is_stable());
        assert_eq!(bench.init_calls, 0);
    }
}
