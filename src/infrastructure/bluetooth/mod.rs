//! Bluetooth Module
//!
//! Discovery and connection-state coordination on top of the host
//! platform's Bluetooth stack.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    BluetoothManager                      │
//! │  (session coordinator - public API for the application)  │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌────────────┐  ┌───────────┐  ┌────────────┐
//! │   Bridge   │  │ Protocol  │  │ Advertiser │
//! │            │  │           │  │            │
//! │ - receivers│  │ - actions │  │ - config   │
//! │ - observer │  │ - filters │  │ - status   │
//! │   slots    │  │ - parsing │  │            │
//! └────────────┘  └───────────┘  └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Broadcast actions, intent filters and translation
//! - [`bridge`] - Receiver registrations and dispatch to observers
//! - [`observer`] - Observer traits, slots and the channel adapter
//! - [`advertiser`] - Advertise request building and status tracking
//! - [`service`] - Session coordinator

pub mod advertiser;
pub mod bridge;
pub mod observer;
pub mod protocol;
pub mod service;

pub use observer::{ChannelObserver, ConnectionObserver, DiscoveryObserver};
pub use service::BluetoothManager;
