//! Rhythm-game controller monitor
//!
//! Samples a 7-key + turntable controller on a fixed tick, tracks press/release timing
//! and scratch rotation, and mirrors the result to a remote peer over WebSocket.

pub mod config;
pub mod controller;
pub mod report;
pub mod sync;
