use serde::{Deserialize, Serialize};
use std::fmt;

/// Remote device as reported by the platform.
///
/// Handles are only valid for the event they arrived with; the coordinator
/// forwards them and never keeps a copy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle {
    pub address: String,
    pub name: Option<String>,
}

impl DeviceHandle {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// Same device with the human-readable name withheld.
    pub fn without_name(self) -> Self {
        Self {
            address: self.address,
            name: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.display_name(), self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    DeviceFound(DeviceHandle),
    DiscoveryFinished,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected(DeviceHandle),
    Disconnected(DeviceHandle),
}

/// A translated broadcast, tagged by the channel it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Discovery(DiscoveryEvent),
    Connection(ConnectionEvent),
}

impl Notification {
    pub fn channel(&self) -> Channel {
        match self {
            Self::Discovery(_) => Channel::Discovery,
            Self::Connection(_) => Channel::Connection,
        }
    }
}

/// Event channels the bridge can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Discovery,
    Connection,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Discovery => f.write_str("discovery"),
            Self::Connection => f.write_str("connection"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Scanning,
}

/// Capabilities gated by the platform's permission system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Scan,
    Connect,
    Advertise,
}

/// Outcome of `BluetoothManager::start_discovery`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStart {
    Started,
    PermissionDenied,
    /// Permission granted but the device has no Bluetooth adapter
    Unavailable,
}

/// Outcome of `BluetoothManager::enable_bluetooth`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    AlreadyEnabled,
    Requested,
    PermissionDenied,
    Unsupported,
}

/// Result delivered by the platform's advertise completion callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvertiseOutcome {
    Success,
    Failure(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvertisingStatus {
    #[default]
    Idle,
    /// Request issued, completion callback not seen yet
    Pending,
    Active,
    PermissionDenied,
    /// No advertiser on this device
    Unsupported,
    Failed(i32),
}

/// Result of `BluetoothManager::make_discoverable`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discoverability {
    pub advertising: AdvertisingStatus,
    pub window_secs: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvertiseMode {
    LowPower,
    Balanced,
    LowLatency,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxPower {
    UltraLow,
    Low,
    Medium,
    High,
}

/// Parameters handed to the platform when advertising starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseConfig {
    pub mode: AdvertiseMode,
    pub tx_power: TxPower,
    pub connectable: bool,
    pub include_device_name: bool,
    pub service_uuid: u128,
}

/// Events the UI side consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    DeviceFound(DeviceHandle),
    DiscoveryFinished,
    DeviceConnected(DeviceHandle),
    DeviceDisconnected(DeviceHandle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
