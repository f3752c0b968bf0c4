//! Detect/reset supervisor for a PCA9539 output expander and an MR793200 NVM tag.
//!
//! The crate is layered:
//!
//! - [`expander::Pca9539`]: verified register access to the 16-bit I2C expander.
//! - [`nvm::Mr793200`]: SPI framing for NVM reads (both pipeline modes) and writes.
//! - [`sequencer::DetectResetSequencer`]: the tick-driven detect/reset state machine.
//! - [`telemetry`]: decoders for the channel and fan/seat profiles.
//! - [`supervisor::Supervisor`] (`std`): threads that tie the above together.
//!
//! Everything below the supervisor is `no_std` and works with any
//! `embedded-hal` 1.0 implementation; enable `async` for the
//! `embedded-hal-async` mirrors and `linux` for ready-made openers.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod bus;
pub mod config;
pub mod data_types;
pub mod error;
pub mod expander;
pub mod nvm;
pub mod registers;
pub mod sequencer;
pub mod telemetry;

#[cfg(feature = "std")]
pub mod supervisor;

#[cfg(feature = "linux")]
pub mod linux;

pub use bus::{BusHandle, Open};
pub use config::SupervisorConfig;
pub use data_types::{Profile, ReadMode};
pub use error::{Error, ProtocolError};
pub use expander::Pca9539;
pub use nvm::Mr793200;
pub use registers::DEFAULT_EXPANDER_ADDRESS;
pub use sequencer::{DetectResetSequencer, SequencerState, SequencerTiming};

#[cfg(feature = "std")]
pub use supervisor::{Notice, Readings, Repaint, StatusSnapshot, Supervisor, SupervisorError};
