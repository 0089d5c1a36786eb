//! Modular Audio I/O Library
//!
//! Audio device abstraction and streaming core for the modular synthesizer:
//! driver and device enumeration, validated stream configuration, a
//! real-time-safe open/close/reconfigure state machine, and block exchange
//! between the audio callback and the synthesis engine.

pub mod driver;
pub mod error;
pub mod persistence;
pub mod stream;
