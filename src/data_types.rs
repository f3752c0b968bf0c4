//! Data types shared by the drivers, the sequencer and the telemetry decoders.

/// Number of expander output channels ("No. 1".."No. 16").
pub const CHANNEL_COUNT: usize = 16;
/// Number of paired temperature words (0x24..0x32).
pub const TEMPERATURE_WORDS: usize = CHANNEL_COUNT / 2;
/// Number of fan/seat positions.
pub const POSITION_COUNT: usize = 4;

/// Highest valid fan level; nibbles 0xB..0xF are sentinels.
pub const FAN_LEVEL_MAX: u8 = 10;
/// Highest valid heater level; nibbles 0x4..0xF are sentinels.
pub const HEATER_LEVEL_MAX: u8 = 3;

/// Which of the two NVM read framings a call site uses.
///
/// The device answers with a one-transfer pipeline delay whose shape depends
/// on the transaction, so the mode is chosen per call site and never
/// negotiated. Using the wrong one yields misaligned data.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadMode {
    /// Mode A: 2-byte filler per word, 2-byte echo, data in every odd 2-byte slot.
    /// Only a single isolated word fits inside the frame.
    Legacy,
    /// Mode B: 4-byte filler per word, 4-byte header, each word is `[DATA(2), STATUS(2)]`.
    Block,
}

/// Telemetry decoding profile, selected per deployment.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Profile {
    /// 16 on/off channels with paired temperatures; drives the expander outputs.
    Channels,
    /// 4 fan-speed / seat-heater positions; read only.
    FanSeat,
}

/// Software view of the PCA9539.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExpanderState {
    /// True only after all six init readbacks matched.
    pub initialized: bool,
    /// Last output mask whose readback matched.
    pub output_mask: u16,
}

/// Detect input level with the previous sample kept for edge detection. `None` means not sampled yet.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PinState {
    pub level: Option<bool>,
    pub previous: Option<bool>,
}

/// Transition seen between two detect samples.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Edge {
    Rising,
    Falling,
    None,
}

impl PinState {
    /// Record a new sample and classify it. The first sample only sets the baseline.
    pub fn sample(&mut self, level: bool) -> Edge {
        self.previous = self.level;
        self.level = Some(level);
        match (self.previous, level) {
            (None, _) | (Some(true), true) | (Some(false), false) => Edge::None,
            (Some(false), true) => Edge::Rising,
            (Some(true), false) => Edge::Falling,
        }
    }

    pub fn is_high(&self) -> bool {
        self.level == Some(true)
    }
}

/// One of the 16 channels.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ChannelReading {
    /// 0-based channel index; displayed as "No. {index + 1}".
    pub index: u8,
    pub on: bool,
    /// Degrees C, one byte of the channel pair's temperature word.
    pub temperature: u8,
}

impl ChannelReading {
    /// 1-based channel number as printed on the board.
    pub fn number(&self) -> u8 {
        self.index + 1
    }
}

/// Fan/seat position, in nibble order.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Position {
    #[default]
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
}

impl Position {
    pub const ALL: [Position; POSITION_COUNT] = [
        Position::FrontLeft,
        Position::FrontRight,
        Position::RearLeft,
        Position::RearRight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Position::FrontLeft => "FL",
            Position::FrontRight => "FR",
            Position::RearLeft => "RL",
            Position::RearRight => "RR",
        }
    }

    /// Nibble index inside the fan and heater words.
    pub fn nibble(self) -> u32 {
        self as u32
    }
}

/// Where a reported level came from.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Lineage {
    /// Nothing accepted yet; value is the initial zero.
    #[default]
    Initial,
    /// Decoded from this cycle's raw nibble.
    Decoded,
    /// Raw nibble was a sentinel; value is the last accepted one.
    CarriedForward,
}

/// A level sampled from one nibble, with carry-forward lineage.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LevelSample {
    /// Reported level; always the last accepted value.
    pub value: u8,
    /// Raw nibble from the latest cycle.
    pub raw: u8,
    pub lineage: Lineage,
}

impl LevelSample {
    /// Accept `raw` if it is at most `max`, otherwise keep the last accepted value.
    pub fn update(&mut self, raw: u8, max: u8) -> Lineage {
        self.raw = raw;
        if raw <= max {
            self.value = raw;
            self.lineage = Lineage::Decoded;
        } else {
            self.lineage = Lineage::CarriedForward;
        }
        self.lineage
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FanSeatReading {
    pub position: Position,
    /// 0..=10
    pub fan: LevelSample,
    /// 0..=3
    pub heater: LevelSample,
}

impl FanSeatReading {
    pub fn fan_level(&self) -> u8 {
        self.fan.value
    }

    pub fn heater_level(&self) -> u8 {
        self.heater.value
    }
}

/// Outcome of a hot-reset request.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HotReset {
    /// Reset pulse started.
    Started,
    /// Detect was low; reset kept low.
    Refused,
}
