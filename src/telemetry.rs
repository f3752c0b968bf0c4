//! Decoders that turn raw NVM words into channel or fan/seat readings.
//!
//! Channel profile: word 0x22 is the on/off bitmap (bit n = channel n), words
//! 0x24..0x32 hold paired temperatures (low byte = odd channel "No. 2k+1",
//! high byte = even channel "No. 2k+2").
//!
//! Fan/seat profile: word 0x22 holds four fan nibbles, word 0x24 four heater
//! nibbles, nibble 0 = FL ... nibble 3 = RR. Sentinel nibbles are replaced by
//! the last accepted value for that position.

use embedded_hal::spi::SpiDevice;

use crate::data_types::{
    CHANNEL_COUNT, ChannelReading, FAN_LEVEL_MAX, FanSeatReading, HEATER_LEVEL_MAX, Lineage, POSITION_COUNT,
    Position, ReadMode, TEMPERATURE_WORDS,
};
use crate::error::Error;
use crate::nvm::Mr793200;
use crate::registers::{nvm, temperature_register};

/// Extract nibble `index` (0 = bits 3:0) from `word`.
pub fn nibble(word: u16, index: u32) -> u8 {
    ((word >> (4 * index)) & 0xF) as u8
}

/// Decode the on/off bitmap and the eight paired temperature words.
pub fn decode_channels(on_off: u16, temperatures: &[u16; TEMPERATURE_WORDS]) -> [ChannelReading; CHANNEL_COUNT] {
    core::array::from_fn(|index| {
        let word = temperatures[index / 2];
        let [high, low] = word.to_be_bytes();
        ChannelReading {
            index: index as u8,
            on: on_off & (1 << index) != 0,
            temperature: if index % 2 == 0 { low } else { high },
        }
    })
}

/// One decoded channel-profile cycle.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChannelFrame {
    /// Raw bitmap, forwarded to the expander outputs.
    pub on_off: u16,
    pub channels: [ChannelReading; CHANNEL_COUNT],
}

/// Read and decode one channel-profile cycle. Every word is an isolated Mode A read.
pub fn poll_channels<SPI: SpiDevice>(
    nvm_client: &mut Mr793200<SPI>,
    addr_msb: u8,
) -> Result<ChannelFrame, Error<SPI::Error>> {
    let on_off = nvm_client.read_word(ReadMode::Legacy, addr_msb, nvm::CHANNEL_ON_OFF)?;
    let mut temperatures = [0u16; TEMPERATURE_WORDS];
    for (pair, word) in temperatures.iter_mut().enumerate() {
        *word = nvm_client.read_word(ReadMode::Legacy, addr_msb, temperature_register(pair * 2))?;
    }
    Ok(ChannelFrame {
        on_off,
        channels: decode_channels(on_off, &temperatures),
    })
}

/// Fan/seat decoder. Holds the last accepted level per position across cycles.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FanSeatDecoder {
    positions: [FanSeatReading; POSITION_COUNT],
}

impl Default for FanSeatDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FanSeatDecoder {
    pub fn new() -> Self {
        Self {
            positions: Position::ALL.map(|position| FanSeatReading {
                position,
                ..FanSeatReading::default()
            }),
        }
    }

    pub fn positions(&self) -> &[FanSeatReading; POSITION_COUNT] {
        &self.positions
    }

    /// Forget every accepted value.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Apply one cycle's fan and heater words.
    pub fn apply(&mut self, fan_word: u16, heater_word: u16) -> &[FanSeatReading; POSITION_COUNT] {
        for reading in self.positions.iter_mut() {
            let n = reading.position.nibble();
            let fan = nibble(fan_word, n);
            let heater = nibble(heater_word, n);
            if reading.fan.update(fan, FAN_LEVEL_MAX) == Lineage::CarriedForward {
                log::debug!(
                    "[SPI] {} fan nibble 0x{:X} invalid, keeping {}",
                    reading.position.label(),
                    fan,
                    reading.fan.value
                );
            }
            if reading.heater.update(heater, HEATER_LEVEL_MAX) == Lineage::CarriedForward {
                log::debug!(
                    "[SPI] {} heater nibble 0x{:X} invalid, keeping {}",
                    reading.position.label(),
                    heater,
                    reading.heater.value
                );
            }
        }
        &self.positions
    }

    /// Read the fan and heater words as one Mode B block and decode them.
    pub fn poll<SPI: SpiDevice>(
        &mut self,
        nvm_client: &mut Mr793200<SPI>,
        addr_msb: u8,
    ) -> Result<&[FanSeatReading; POSITION_COUNT], Error<SPI::Error>> {
        let mut words = [0u16; 2];
        nvm_client.read_words(ReadMode::Block, addr_msb, nvm::FAN_SPEED, &mut words)?;
        Ok(self.apply(words[0], words[1]))
    }
}
