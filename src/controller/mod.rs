//! Controller subsystem for rhythm-game controller sampling
//!
//! Implements a fixed-period sampling pipeline:
//!
//! 1. [`input_source`] - Raw device readings (gilrs or in-memory)
//! 2. [`key_state`] / [`scratch_state`] - Pure per-tick trackers
//! 3. [`statistics`] - Bounded history and derived metrics
//! 4. [`sampler`] / [`coordinator`] - Per-player ticks and SP/DP output
//! 5. [`controller_handle`] - Sampling thread lifecycle
//! 6. [`detection`] - Device auto-assignment
//!
//! # Architecture
//!
//! ```text
//! InputSource ──► Sampler(1P) ─┐
//!             └─► Sampler(2P) ─┴─► Coordinator ──► MonitorSnapshot
//!                 (keys, scratch, statistics)
//! ```
//!
//! The sampler runs on a dedicated thread with a 5ms tick.

pub mod controller_handle;
pub mod coordinator;
pub mod detection;
pub mod input_source;
pub mod key_state;
pub mod sampler;
pub mod scratch_state;
pub mod statistics;

pub use controller_handle::{SamplerCommand, SamplerError, SamplerHandle};
pub use coordinator::{
    Coordinator, DualSnapshot, MonitorSnapshot, PlayMode, PlaySettings, ResetScope,
    SettingsHandle,
};
pub use input_source::{Device, InputSource, MemorySource};
pub use sampler::{ControllerSnapshot, PlayerSlot, SamplerSettings};
pub use statistics::{StatisticsRecord, StatsSummary};
