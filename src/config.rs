//! Runtime settings for the supervisor. Nothing here is persisted.

use core::time::Duration;

use crate::data_types::Profile;
use crate::registers::{DEFAULT_EXPANDER_ADDRESS, nvm};
use crate::sequencer::SequencerTiming;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SupervisorConfig {
    pub profile: Profile,
    /// Device actor wake-up interval; bounds how late a timed sequencer step can fire.
    pub tick: Duration,
    pub sequencer: SequencerTiming,
    /// Telemetry poll period.
    pub poll_period: Duration,
    /// Bounded wait for a worker to observe cancellation.
    pub stop_timeout: Duration,
    pub expander_address: u8,
    pub nvm_addr_msb: u8,
}

impl SupervisorConfig {
    /// Defaults for `profile`: 500 ms polling for channels, 1 s for fan/seat.
    pub fn new(profile: Profile) -> Self {
        let poll_period = match profile {
            Profile::Channels => Duration::from_millis(500),
            Profile::FanSeat => Duration::from_secs(1),
        };
        Self {
            profile,
            tick: Duration::from_millis(50),
            sequencer: SequencerTiming::default(),
            poll_period,
            stop_timeout: Duration::from_millis(1500),
            expander_address: DEFAULT_EXPANDER_ADDRESS,
            nvm_addr_msb: nvm::PAGE_MSB,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_sequencer(mut self, timing: SequencerTiming) -> Self {
        self.sequencer = timing;
        self
    }

    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_expander_address(mut self, address: u8) -> Self {
        self.expander_address = address;
        self
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::new(Profile::Channels)
    }
}
