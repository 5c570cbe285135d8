//! Testing utilities for avatar-rtc
//!
//! In-memory stand-ins for host media surfaces and the realtime channel,
//! so negotiation can be exercised offline without a UI.

pub mod memory;

pub use memory::{MemoryAudioFactory, MemoryAudioOutput, MemoryChannel, MemoryVideoSurface};
