//! MR793200 NVM register access over SPI.
//!
//! Reads are a single full-duplex transaction: a 4-byte command header
//! (`opcode | addr_msb`, `addr_lsb`, two dummy bytes) followed by zero filler
//! while the device clocks data out. The device pipelines its answer by one
//! transfer, and where the data lands depends on the framing, see
//! [`ReadMode`].

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{Operation, SpiDevice};

use crate::data_types::ReadMode;
use crate::error::{Error, ProtocolError};
use crate::registers::{NVM_HEADER_LEN, NVM_MAX_WORDS, NVM_WRITE_SETTLE_MS, SpiStatusBits, nvm, opcode};

/// Bytes per data slot.
const SLOT_LEN: usize = 2;
/// Mode A: command echo discarded from the head of the response.
const LEGACY_ECHO_LEN: usize = 2;
/// Mode B: bytes per word block (`DATA(2)`, `STATUS(2)`).
const BLOCK_LEN: usize = 4;

/// Largest frame any read can produce.
const FRAME_CAPACITY: usize = NVM_HEADER_LEN + BLOCK_LEN * NVM_MAX_WORDS;

/// Mode A pipeline rule: after the echo, word `i` sits in 2-byte slot `2i + 1`;
/// every even slot is the extra echoed step of the pipeline.
pub const fn legacy_slot(word: usize) -> usize {
    2 * word + 1
}

/// Transaction length for `count` words in `mode`.
pub const fn frame_len(mode: ReadMode, count: usize) -> usize {
    match mode {
        ReadMode::Legacy => NVM_HEADER_LEN + SLOT_LEN * count,
        ReadMode::Block => NVM_HEADER_LEN + BLOCK_LEN * count,
    }
}

/// Build the read command frame into `frame` and return its used length.
pub fn encode_read(
    mode: ReadMode,
    addr_msb: u8,
    addr_lsb: u8,
    count: usize,
    frame: &mut [u8],
) -> Result<usize, ProtocolError> {
    if count > NVM_MAX_WORDS {
        return Err(ProtocolError::TooManyWords { requested: count, max: NVM_MAX_WORDS });
    }
    let len = frame_len(mode, count);
    if frame.len() < len {
        return Err(ProtocolError::ShortResponse { expected: len, actual: frame.len() });
    }
    frame[..len].fill(0x00);
    frame[0] = opcode::READ_NVM1 | (addr_msb & 0x0F);
    frame[1] = addr_lsb;
    Ok(len)
}

/// Decode a Mode A response into `words` (big-endian per word).
pub fn decode_legacy(response: &[u8], words: &mut [u16]) -> Result<(), ProtocolError> {
    let payload = response.get(LEGACY_ECHO_LEN..).unwrap_or(&[]);
    if let Some(last) = words.len().checked_sub(1) {
        let needed = LEGACY_ECHO_LEN + (legacy_slot(last) + 1) * SLOT_LEN;
        if response.len() < needed {
            return Err(ProtocolError::ShortResponse { expected: needed, actual: response.len() });
        }
    }
    for (i, word) in words.iter_mut().enumerate() {
        let at = legacy_slot(i) * SLOT_LEN;
        *word = u16::from_be_bytes([payload[at], payload[at + 1]]);
    }
    Ok(())
}

/// Decode a Mode B response into `words`: skip the header, keep the first 2 bytes of each 4-byte block.
pub fn decode_block(response: &[u8], words: &mut [u16]) -> Result<(), ProtocolError> {
    let needed = NVM_HEADER_LEN + BLOCK_LEN * words.len();
    if response.len() < needed {
        return Err(ProtocolError::ShortResponse { expected: needed, actual: response.len() });
    }
    let payload = &response[NVM_HEADER_LEN..];
    for (word, block) in words.iter_mut().zip(payload.chunks_exact(BLOCK_LEN)) {
        *word = u16::from_be_bytes([block[0], block[1]]);
    }
    Ok(())
}

/// Decode `response` according to `mode`.
pub fn decode_read(mode: ReadMode, response: &[u8], words: &mut [u16]) -> Result<(), ProtocolError> {
    match mode {
        ReadMode::Legacy => decode_legacy(response, words),
        ReadMode::Block => decode_block(response, words),
    }
}

/// MR793200 client. Owns the SPI device for as long as it lives.
pub struct Mr793200<SPI> {
    spi: SPI,
}

impl<SPI> Mr793200<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Give the SPI device back.
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI: SpiDevice> Mr793200<SPI> {
    /// Read `words.len()` consecutive words starting at `addr_msb:addr_lsb`.
    pub fn read_words(
        &mut self,
        mode: ReadMode,
        addr_msb: u8,
        addr_lsb: u8,
        words: &mut [u16],
    ) -> Result<(), Error<SPI::Error>> {
        let mut frame = [0u8; FRAME_CAPACITY];
        let len = encode_read(mode, addr_msb, addr_lsb, words.len(), &mut frame)?;
        self.spi
            .transaction(&mut [Operation::TransferInPlace(&mut frame[..len])])
            .map_err(Error::Bus)?;
        decode_read(mode, &frame[..len], words)?;
        Ok(())
    }

    /// Read one isolated word.
    pub fn read_word(&mut self, mode: ReadMode, addr_msb: u8, addr_lsb: u8) -> Result<u16, Error<SPI::Error>> {
        let mut word = [0u16; 1];
        self.read_words(mode, addr_msb, addr_lsb, &mut word)?;
        Ok(word[0])
    }

    /// Model number word (single word, Mode A).
    pub fn read_model_number(&mut self) -> Result<u16, Error<SPI::Error>> {
        self.read_word(ReadMode::Legacy, nvm::PAGE_MSB, nvm::MODEL_NUMBER)
    }

    /// Tag identifier (6-word block, Mode B).
    pub fn read_tid(&mut self) -> Result<[u16; nvm::TID_WORDS], Error<SPI::Error>> {
        let mut tid = [0u16; nvm::TID_WORDS];
        self.read_words(ReadMode::Block, nvm::PAGE_MSB, nvm::TID, &mut tid)?;
        Ok(tid)
    }

    /// Set SPI_EXCL in SPI_STAT so the NVM accepts writes.
    pub fn enable_write(&mut self) -> Result<(), Error<SPI::Error>> {
        let frame = [opcode::WRITE_SPIST, 0x00, 0x00, SpiStatusBits::SPI_EXCL.bits()];
        self.spi.write(&frame).map_err(Error::Bus)
    }

    /// Write consecutive words starting at `addr_msb:addr_lsb`, waiting for each to commit.
    pub fn write_words<D: DelayNs>(
        &mut self,
        addr_msb: u8,
        addr_lsb: u8,
        words: &[u16],
        delay: &mut D,
    ) -> Result<(), Error<SPI::Error>> {
        if words.len() > NVM_MAX_WORDS {
            return Err(Error::OutOfRange);
        }
        self.enable_write()?;
        for (i, word) in words.iter().enumerate() {
            let [hi, lo] = word.to_be_bytes();
            let lsb = addr_lsb.wrapping_add(i as u8 * nvm::WORD_STRIDE);
            self.spi
                .write(&[opcode::WRITE_NVM | (addr_msb & 0x0F), lsb, hi, lo])
                .map_err(Error::Bus)?;
            delay.delay_ms(NVM_WRITE_SETTLE_MS);
        }
        Ok(())
    }

    /// Read `words.len()` words of user memory (Mode B block).
    pub fn read_user_memory(&mut self, words: &mut [u16]) -> Result<(), Error<SPI::Error>> {
        self.read_words(ReadMode::Block, nvm::PAGE_MSB, nvm::USER_MEMORY, words)
    }

    /// Write user memory starting `offset` bytes past 0x22.
    pub fn write_user_memory<D: DelayNs>(
        &mut self,
        offset: u8,
        words: &[u16],
        delay: &mut D,
    ) -> Result<(), Error<SPI::Error>> {
        self.write_words(nvm::PAGE_MSB, nvm::USER_MEMORY.wrapping_add(offset), words, delay)
    }
}

#[cfg(feature = "async")]
impl<SPI: embedded_hal_async::spi::SpiDevice> Mr793200<SPI> {
    pub async fn read_words_async(
        &mut self,
        mode: ReadMode,
        addr_msb: u8,
        addr_lsb: u8,
        words: &mut [u16],
    ) -> Result<(), Error<SPI::Error>> {
        let mut frame = [0u8; FRAME_CAPACITY];
        let len = encode_read(mode, addr_msb, addr_lsb, words.len(), &mut frame)?;
        embedded_hal_async::spi::SpiDevice::transaction(&mut self.spi, &mut [Operation::TransferInPlace(&mut frame[..len])])
            .await
            .map_err(Error::Bus)?;
        decode_read(mode, &frame[..len], words)?;
        Ok(())
    }

    pub async fn enable_write_async(&mut self) -> Result<(), Error<SPI::Error>> {
        let frame = [opcode::WRITE_SPIST, 0x00, 0x00, SpiStatusBits::SPI_EXCL.bits()];
        embedded_hal_async::spi::SpiDevice::write(&mut self.spi, &frame)
            .await
            .map_err(Error::Bus)
    }

    pub async fn write_words_async<D: embedded_hal_async::delay::DelayNs>(
        &mut self,
        addr_msb: u8,
        addr_lsb: u8,
        words: &[u16],
        delay: &mut D,
    ) -> Result<(), Error<SPI::Error>> {
        if words.len() > NVM_MAX_WORDS {
            return Err(Error::OutOfRange);
        }
        self.enable_write_async().await?;
        for (i, word) in words.iter().enumerate() {
            let [hi, lo] = word.to_be_bytes();
            let lsb = addr_lsb.wrapping_add(i as u8 * nvm::WORD_STRIDE);
            embedded_hal_async::spi::SpiDevice::write(&mut self.spi, &[opcode::WRITE_NVM | (addr_msb & 0x0F), lsb, hi, lo])
                .await
                .map_err(Error::Bus)?;
            delay.delay_ms(NVM_WRITE_SETTLE_MS).await;
        }
        Ok(())
    }
}
