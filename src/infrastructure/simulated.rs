//! Simulated Platform
//!
//! In-memory stand-in for the host Bluetooth stack. It implements all three
//! platform traits, records every call it receives and routes broadcasts to
//! registered receivers the way the system broadcast registry would. The demo
//! binary and the tests run against it.

use crate::domain::error::PlatformError;
use crate::domain::models::{AdvertiseConfig, AdvertiseOutcome, Capability};
use crate::infrastructure::bluetooth::protocol::{IntentFilter, RawBroadcast};
use crate::infrastructure::platform::{
    AdvertiseCallback, BroadcastHub, BroadcastReceiver, RadioAuthorization, RadioControl,
    ReceiverToken,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// One call made against the simulated platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    IsSupported,
    IsEnabled,
    RequestEnable,
    StartScan,
    StopScan,
    StartAdvertising(AdvertiseConfig),
    RequestDiscoverableWindow(u32),
    RegisterReceiver(Vec<&'static str>),
    UnregisterReceiver(ReceiverToken),
}

struct Registration {
    filter: IntentFilter,
    receiver: Arc<dyn BroadcastReceiver>,
}

struct SimState {
    permissions: HashSet<Capability>,
    supported: bool,
    enabled: bool,
    advertiser_available: bool,
    refuse_registration: bool,
    /// `None` holds the completion until `complete_advertising` is called
    advertise_outcome: Option<AdvertiseOutcome>,
    pending_advertise: Vec<AdvertiseCallback>,
    receivers: BTreeMap<u64, Registration>,
    next_token: u64,
    journal: Vec<RadioCall>,
}

pub struct SimulatedPlatform {
    state: Mutex<SimState>,
}

impl SimulatedPlatform {
    /// Supported, enabled adapter with every permission granted and
    /// advertising that succeeds immediately.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                permissions: [Capability::Scan, Capability::Connect, Capability::Advertise]
                    .into_iter()
                    .collect(),
                supported: true,
                enabled: true,
                advertiser_available: true,
                refuse_registration: false,
                advertise_outcome: Some(AdvertiseOutcome::Success),
                pending_advertise: Vec::new(),
                receivers: BTreeMap::new(),
                next_token: 1,
                journal: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn grant(&self, capability: Capability) {
        self.lock().permissions.insert(capability);
    }

    pub fn revoke(&self, capability: Capability) {
        self.lock().permissions.remove(&capability);
    }

    pub fn set_supported(&self, supported: bool) {
        self.lock().supported = supported;
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.lock().enabled = enabled;
    }

    pub fn set_advertiser_available(&self, available: bool) {
        self.lock().advertiser_available = available;
    }

    pub fn set_registration_refused(&self, refused: bool) {
        self.lock().refuse_registration = refused;
    }

    pub fn set_advertise_outcome(&self, outcome: Option<AdvertiseOutcome>) {
        self.lock().advertise_outcome = outcome;
    }

    /// Fire every advertise completion held back so far
    pub fn complete_advertising(&self, outcome: AdvertiseOutcome) {
        let pending = std::mem::take(&mut self.lock().pending_advertise);
        for callback in pending {
            callback(outcome);
        }
    }

    /// Route a broadcast to every receiver whose filter matches its action.
    /// Returns how many receivers got it.
    pub fn deliver(&self, broadcast: RawBroadcast) -> usize {
        let targets: Vec<Arc<dyn BroadcastReceiver>> = self
            .lock()
            .receivers
            .values()
            .filter(|r| r.filter.matches(&broadcast.action))
            .map(|r| r.receiver.clone())
            .collect();

        debug!(
            "Delivering `{}` to {} receiver(s)",
            broadcast.action,
            targets.len()
        );

        // Receivers run without the platform lock, as on a real broadcast thread
        for receiver in &targets {
            receiver.on_receive(&broadcast);
        }
        targets.len()
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.lock().journal.clone()
    }

    pub fn count(&self, predicate: impl Fn(&RadioCall) -> bool) -> usize {
        self.lock().journal.iter().filter(|c| predicate(*c)).count()
    }

    pub fn receiver_count(&self) -> usize {
        self.lock().receivers.len()
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl RadioAuthorization for SimulatedPlatform {
    fn has_permission(&self, capability: Capability) -> bool {
        self.lock().permissions.contains(&capability)
    }
}

impl RadioControl for SimulatedPlatform {
    fn is_supported(&self) -> bool {
        let mut state = self.lock();
        state.journal.push(RadioCall::IsSupported);
        state.supported
    }

    fn is_enabled(&self) -> bool {
        let mut state = self.lock();
        state.journal.push(RadioCall::IsEnabled);
        state.supported && state.enabled
    }

    fn request_enable(&self) {
        let mut state = self.lock();
        state.journal.push(RadioCall::RequestEnable);
        // The user always accepts the system prompt here
        if state.supported {
            state.enabled = true;
        }
    }

    fn start_scan(&self) {
        self.lock().journal.push(RadioCall::StartScan);
    }

    fn stop_scan(&self) {
        self.lock().journal.push(RadioCall::StopScan);
    }

    fn start_advertising(
        &self,
        config: &AdvertiseConfig,
        on_complete: AdvertiseCallback,
    ) -> Result<(), PlatformError> {
        let outcome = {
            let mut state = self.lock();
            state.journal.push(RadioCall::StartAdvertising(config.clone()));
            if !state.advertiser_available {
                return Err(PlatformError::Rejected("no LE advertiser".to_string()));
            }
            match state.advertise_outcome {
                Some(outcome) => outcome,
                None => {
                    state.pending_advertise.push(on_complete);
                    return Ok(());
                }
            }
        };

        on_complete(outcome);
        Ok(())
    }

    fn request_discoverable_window(&self, duration_secs: u32) {
        self.lock()
            .journal
            .push(RadioCall::RequestDiscoverableWindow(duration_secs));
    }
}

impl BroadcastHub for SimulatedPlatform {
    fn register_receiver(
        &self,
        filter: &IntentFilter,
        receiver: Arc<dyn BroadcastReceiver>,
    ) -> Result<ReceiverToken, PlatformError> {
        let mut state = self.lock();
        state
            .journal
            .push(RadioCall::RegisterReceiver(filter.actions().to_vec()));
        if state.refuse_registration {
            return Err(PlatformError::Rejected("receiver limit reached".to_string()));
        }

        let token = ReceiverToken(state.next_token);
        state.next_token += 1;
        state.receivers.insert(
            token.0,
            Registration {
                filter: filter.clone(),
                receiver,
            },
        );
        Ok(token)
    }

    fn unregister_receiver(&self, token: ReceiverToken) -> Result<(), PlatformError> {
        let mut state = self.lock();
        state.journal.push(RadioCall::UnregisterReceiver(token));
        state
            .receivers
            .remove(&token.0)
            .map(|_| ())
            .ok_or(PlatformError::NotRegistered)
    }
}
