//! Broadcast Protocol
//!
//! Action strings, extra keys and intent filters for the platform's Bluetooth
//! broadcasts, plus the translation from loosely-typed raw broadcasts into
//! typed notifications.

use crate::domain::error::BridgeError;
use crate::domain::models::{Channel, ConnectionEvent, DeviceHandle, DiscoveryEvent, Notification};
use anyhow::Result;
use serde_json::{Map, Value};
use tracing::trace;

/// A remote device was found during discovery
pub const ACTION_FOUND: &str = "android.bluetooth.device.action.FOUND";

/// The adapter finished its discovery window
pub const ACTION_DISCOVERY_FINISHED: &str = "android.bluetooth.adapter.action.DISCOVERY_FINISHED";

/// Low-level (ACL) link established with a remote device
pub const ACTION_ACL_CONNECTED: &str = "android.bluetooth.device.action.ACL_CONNECTED";

/// Low-level (ACL) link lost
pub const ACTION_ACL_DISCONNECTED: &str = "android.bluetooth.device.action.ACL_DISCONNECTED";

/// Headset profile connection state changed
pub const ACTION_HEADSET_STATE_CHANGED: &str =
    "android.bluetooth.headset.profile.action.CONNECTION_STATE_CHANGED";

/// A2DP profile connection state changed
pub const ACTION_A2DP_STATE_CHANGED: &str =
    "android.bluetooth.a2dp.profile.action.CONNECTION_STATE_CHANGED";

/// Extra holding the device object (`{"address": .., "name": ..}`)
pub const EXTRA_DEVICE: &str = "device";

/// Extra holding the profile connection state
pub const EXTRA_STATE: &str = "state";

/// Profile connection states
pub mod profile_state {
    pub const DISCONNECTED: i64 = 0;
    pub const CONNECTING: i64 = 1;
    pub const CONNECTED: i64 = 2;
    pub const DISCONNECTING: i64 = 3;
}

/// Raw broadcast as delivered by the platform
#[derive(Debug, Clone, PartialEq)]
pub struct RawBroadcast {
    pub action: String,
    pub extras: Map<String, Value>,
}

impl RawBroadcast {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            extras: Map::new(),
        }
    }

    pub fn with_extra(mut self, key: &str, value: Value) -> Self {
        self.extras.insert(key.to_string(), value);
        self
    }

    pub fn with_device(self, device: &DeviceHandle) -> Self {
        let mut object = Map::new();
        object.insert("address".into(), Value::String(device.address.clone()));
        if let Some(name) = &device.name {
            object.insert("name".into(), Value::String(name.clone()));
        }
        self.with_extra(EXTRA_DEVICE, Value::Object(object))
    }

    pub fn device_found(device: &DeviceHandle) -> Self {
        Self::new(ACTION_FOUND).with_device(device)
    }

    pub fn discovery_finished() -> Self {
        Self::new(ACTION_DISCOVERY_FINISHED)
    }

    pub fn acl_connected(device: &DeviceHandle) -> Self {
        Self::new(ACTION_ACL_CONNECTED).with_device(device)
    }

    pub fn acl_disconnected(device: &DeviceHandle) -> Self {
        Self::new(ACTION_ACL_DISCONNECTED).with_device(device)
    }
}

/// Set of actions a receiver is registered for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentFilter {
    actions: Vec<&'static str>,
}

impl IntentFilter {
    pub fn new(actions: &[&'static str]) -> Self {
        Self {
            actions: actions.to_vec(),
        }
    }

    /// Filter used for a bridge channel subscription
    pub fn for_channel(channel: Channel) -> Self {
        match channel {
            Channel::Discovery => Self::new(&[ACTION_FOUND, ACTION_DISCOVERY_FINISHED]),
            Channel::Connection => Self::new(&[
                ACTION_HEADSET_STATE_CHANGED,
                ACTION_A2DP_STATE_CHANGED,
                ACTION_ACL_CONNECTED,
                ACTION_ACL_DISCONNECTED,
            ]),
        }
    }

    pub fn matches(&self, action: &str) -> bool {
        self.actions.iter().any(|a| *a == action)
    }

    pub fn actions(&self) -> &[&'static str] {
        &self.actions
    }
}

/// Translate a raw broadcast.
///
/// `Ok(None)` means the broadcast carries nothing the coordinator reports
/// (unknown action, transitional profile state).
pub fn translate(broadcast: &RawBroadcast) -> Result<Option<Notification>, BridgeError> {
    let action = broadcast.action.as_str();
    let notification = match action {
        ACTION_FOUND => Notification::Discovery(DiscoveryEvent::DeviceFound(device_extra(broadcast)?)),
        ACTION_DISCOVERY_FINISHED => Notification::Discovery(DiscoveryEvent::DiscoveryFinished),
        ACTION_ACL_CONNECTED => {
            Notification::Connection(ConnectionEvent::Connected(device_extra(broadcast)?))
        }
        ACTION_ACL_DISCONNECTED => {
            Notification::Connection(ConnectionEvent::Disconnected(device_extra(broadcast)?))
        }
        ACTION_HEADSET_STATE_CHANGED | ACTION_A2DP_STATE_CHANGED => {
            // Missing state reads as disconnected, same default the platform uses
            let state = match broadcast.extras.get(EXTRA_STATE) {
                None => profile_state::DISCONNECTED,
                Some(value) => value.as_i64().ok_or_else(|| malformed(action, "state is not an integer"))?,
            };
            match state {
                profile_state::CONNECTED => {
                    Notification::Connection(ConnectionEvent::Connected(device_extra(broadcast)?))
                }
                profile_state::DISCONNECTED => {
                    Notification::Connection(ConnectionEvent::Disconnected(device_extra(broadcast)?))
                }
                other => {
                    trace!("Ignoring transitional profile state {} for {}", other, action);
                    return Ok(None);
                }
            }
        }
        _ => {
            trace!("Ignoring unknown broadcast action: {}", action);
            return Ok(None);
        }
    };

    Ok(Some(notification))
}

fn device_extra(broadcast: &RawBroadcast) -> Result<DeviceHandle, BridgeError> {
    let action = broadcast.action.as_str();
    let device = broadcast
        .extras
        .get(EXTRA_DEVICE)
        .ok_or_else(|| malformed(action, "missing device extra"))?
        .as_object()
        .ok_or_else(|| malformed(action, "device extra is not an object"))?;

    let address = device
        .get("address")
        .and_then(Value::as_str)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| malformed(action, "device has no address"))?;

    let name = device
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    Ok(DeviceHandle::new(address, name))
}

fn malformed(action: &str, reason: &str) -> BridgeError {
    BridgeError::MalformedEvent {
        action: action.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a UUID string in 8-4-4-4-12 hex layout into its 128-bit value
pub fn parse_service_uuid(uuid_str: &str) -> Result<u128> {
    let groups: Vec<&str> = uuid_str.split('-').collect();
    let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
    if lengths != [8, 4, 4, 4, 12] {
        anyhow::bail!("Invalid UUID format: {}", uuid_str);
    }

    let hex = groups.concat();
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        anyhow::bail!("Invalid UUID format: {}", uuid_str);
    }

    Ok(u128::from_str_radix(&hex, 16)?)
}
