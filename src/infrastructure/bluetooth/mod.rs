//! Bluetooth Module
//!
//! Drives an HC-05 serial module over a single outbound byte stream.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothService                      │
//! │  (Main coordinator - public API for the application)     │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌────────────┐  ┌────────────┐  ┌──────────┐
//! │Coordinator │  │ Connection │  │ Protocol │
//! │            │  │            │  │          │
//! │ - Heartbeat│─►│ - Open     │  │ - Command│
//! │ - Dispatch │  │ - Write    │  │   bytes  │
//! │ - State    │  │ - Close    │  │ - Timing │
//! └────────────┘  └────────────┘  └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Command alphabet and wire constants
//! - [`connection`] - Peer addressing and the byte-stream transport
//! - [`coordinator`] - Command/idle arbitration and the heartbeat task
//! - [`service`] - Main service coordinator

pub mod connection;
pub mod coordinator;
pub mod protocol;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main service for convenience
pub use service::BluetoothService;
