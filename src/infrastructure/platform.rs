//! Host Platform Boundary
//!
//! Traits for the collaborators the coordinator drives but does not own:
//! permission checks, radio control, and the system broadcast registry.
//! Every call is fire-and-forget; completions come back later as broadcasts
//! or through an advertise callback.

use crate::domain::error::PlatformError;
use crate::domain::models::{AdvertiseConfig, AdvertiseOutcome, Capability};
use crate::infrastructure::bluetooth::protocol::{IntentFilter, RawBroadcast};
use std::sync::Arc;

/// Completion callback for `RadioControl::start_advertising`
pub type AdvertiseCallback = Box<dyn FnOnce(AdvertiseOutcome) + Send + 'static>;

/// Handle for a receiver installed with `BroadcastHub::register_receiver`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverToken(pub u64);

pub trait RadioAuthorization: Send + Sync {
    /// Synchronous permission query; never waits for a grant.
    fn has_permission(&self, capability: Capability) -> bool;
}

/// Scan requests are issued while the coordinator lock is held, so
/// `start_scan`/`stop_scan` must not deliver broadcasts synchronously.
pub trait RadioControl: Send + Sync {
    fn is_supported(&self) -> bool;
    fn is_enabled(&self) -> bool;
    fn request_enable(&self);
    fn start_scan(&self);
    fn stop_scan(&self);
    /// Immediate errors (no advertiser on this device) come back as `Err`;
    /// the start result itself arrives through `on_complete`.
    fn start_advertising(
        &self,
        config: &AdvertiseConfig,
        on_complete: AdvertiseCallback,
    ) -> Result<(), PlatformError>;
    fn request_discoverable_window(&self, duration_secs: u32);
}

/// Receives raw broadcasts on whatever thread the platform uses.
pub trait BroadcastReceiver: Send + Sync {
    fn on_receive(&self, broadcast: &RawBroadcast);
}

pub trait BroadcastHub: Send + Sync {
    fn register_receiver(
        &self,
        filter: &IntentFilter,
        receiver: Arc<dyn BroadcastReceiver>,
    ) -> Result<ReceiverToken, PlatformError>;

    /// Fails with `PlatformError::NotRegistered` for an unknown or already
    /// removed token.
    fn unregister_receiver(&self, token: ReceiverToken) -> Result<(), PlatformError>;
}
