//! Change-detecting sync channel
//!
//! Mirrors controller snapshots to a remote peer over WebSocket, sending a frame only
//! when something a remote display can observe changed.
//!
//! ```text
//! sync/
//! ├── config.rs           - Peer address and reconnect settings
//! ├── message.rs          - JSON wire format (SP / DP / untagged)
//! ├── change_detector.rs  - Meaningful-change comparison
//! └── sync_handler.rs     - Connection state machine, transmit and receive loops
//! ```

pub mod change_detector;
pub mod config;
pub mod message;
pub mod sync_handler;

pub use change_detector::ChangeDetector;
pub use config::SyncConfig;
pub use sync_handler::{ConnectionState, SyncError, SyncHandle, SyncStatus};
