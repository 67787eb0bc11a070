//! Discovery and connection-state coordination for a Bluetooth screen.
//!
//! The [`BluetoothManager`] sits between the host platform's broadcast events
//! and a UI that registers one discovery observer and one connection
//! observer. See [`infrastructure::bluetooth`] for the layout.

pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use infrastructure::bluetooth::BluetoothManager;
