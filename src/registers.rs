//! Register maps and protocol constants for the PCA9539 port expander (I2C)
//! and the MR793200 NVM device (SPI).
//! Values are fixed by the hardware; changing any of them breaks compatibility.

/// Default 7-bit I2C address of the PCA9539 on the reference board (A1=A0=0 -> 0x74).
pub const DEFAULT_EXPANDER_ADDRESS: u8 = 0x74;

/// PCA9539 register addresses. Each 16-bit quantity is split across a port 0 / port 1 pair.
pub mod addr {
    /// Input port 0 (P00..P07), read only.
    pub const INPUT0: u8 = 0x00;
    /// Input port 1 (P10..P17), read only.
    pub const INPUT1: u8 = 0x01;
    /// Output port 0 (P00..P07).
    pub const OUTPUT0: u8 = 0x02;
    /// Output port 1 (P10..P17).
    pub const OUTPUT1: u8 = 0x03;
    /// Polarity inversion 0.
    pub const POLARITY0: u8 = 0x04;
    /// Polarity inversion 1.
    pub const POLARITY1: u8 = 0x05;
    /// Configuration 0 (1 = input, 0 = output).
    pub const CONFIG0: u8 = 0x06;
    /// Configuration 1.
    pub const CONFIG1: u8 = 0x07;
}

/// Value written to polarity, configuration and output registers during init:
/// non-inverted, all lines outputs, all outputs low.
pub const EXPANDER_INIT_VALUE: u8 = 0x00;

/// Register pairs written and read back by `init_device`, in order.
pub const INIT_SEQUENCE: [(u8, u8); 3] = [
    (addr::POLARITY0, addr::POLARITY1),
    (addr::CONFIG0, addr::CONFIG1),
    (addr::OUTPUT0, addr::OUTPUT1),
];

/// MR793200 SPI command opcodes. The low nibble of the first command byte carries the address MSB.
pub mod opcode {
    pub const READ: u8 = 0x09 << 4;
    pub const WRITE: u8 = 0x0D << 4;
    pub const READ_NVM0: u8 = 0x00 << 4;
    pub const READ_NVM1: u8 = 0x01 << 4;
    pub const READ_NVM2: u8 = 0x02 << 4;
    pub const READ_NVM3: u8 = 0x03 << 4;
    pub const READ_NVM4: u8 = 0x04 << 4;
    pub const WRITE_NVM: u8 = 0x0E << 4;
    pub const READ_SPIST: u8 = 0x08 << 4;
    pub const WRITE_SPIST: u8 = 0x0C << 4;
}

/// MR793200 NVM word map (address MSB 0x04).
pub mod nvm {
    /// Address MSB of the user-visible NVM page.
    pub const PAGE_MSB: u8 = 0x04;
    /// Register addresses advance by this much per 16-bit word.
    pub const WORD_STRIDE: u8 = 2;

    /// Tag identifier, 6 words.
    pub const TID: u8 = 0x16;
    pub const TID_WORDS: usize = 6;
    /// Model number, 1 word.
    pub const MODEL_NUMBER: u8 = 0x18;

    /// First user-memory word.
    pub const USER_MEMORY: u8 = 0x22;
    /// Channel profile: on/off bitmap, one bit per channel.
    pub const CHANNEL_ON_OFF: u8 = 0x22;
    /// Channel profile: first paired temperature word (channels 1/2); last is 0x32 (channels 15/16).
    pub const CHANNEL_TEMPERATURE: u8 = 0x24;
    /// Fan/seat profile: fan-speed nibbles, followed by the heater-level word.
    pub const FAN_SPEED: u8 = 0x22;
    pub const HEATER_LEVEL: u8 = 0x24;
}

/// Time the device needs to commit one word to NVM.
pub const NVM_WRITE_SETTLE_MS: u32 = 8;

/// Command header length: opcode|addr_msb, addr_lsb, two dummy bytes.
pub const NVM_HEADER_LEN: usize = 4;

/// Largest word count a single read transaction is allowed to request.
pub const NVM_MAX_WORDS: usize = 16;

bitflags::bitflags! {
    /// SPI_STAT register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpiStatusBits: u8 {
        /// Bit 0: exclusive NVM write access (must be set before NVM writes).
        const SPI_EXCL = 1 << 0;
    }

    /// One bit per expander output line; bit n drives channel "No. n+1".
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OutputLines: u16 {
        const P00 = 1 << 0;
        const P01 = 1 << 1;
        const P02 = 1 << 2;
        const P03 = 1 << 3;
        const P04 = 1 << 4;
        const P05 = 1 << 5;
        const P06 = 1 << 6;
        const P07 = 1 << 7;
        const P10 = 1 << 8;
        const P11 = 1 << 9;
        const P12 = 1 << 10;
        const P13 = 1 << 11;
        const P14 = 1 << 12;
        const P15 = 1 << 13;
        const P16 = 1 << 14;
        const P17 = 1 << 15;
    }
}

impl OutputLines {
    /// Port 0 byte (P00..P07).
    pub fn port0(self) -> u8 {
        (self.bits() & 0x00FF) as u8
    }

    /// Port 1 byte (P10..P17).
    pub fn port1(self) -> u8 {
        (self.bits() >> 8) as u8
    }
}

/// Register address of the temperature word holding channel `index` (0-based).
/// Channels are paired: (0,1) -> 0x24, (2,3) -> 0x26, ... (14,15) -> 0x32.
pub fn temperature_register(index: usize) -> u8 {
    nvm::CHANNEL_TEMPERATURE + nvm::WORD_STRIDE * (index / 2) as u8
}
