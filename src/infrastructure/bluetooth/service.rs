//! Bluetooth Service Module
//!
//! `BluetoothManager` is the session coordinator: it sequences discovery
//! sessions, owns the event bridge and is the single registration point for
//! observers. One instance is built by the composition root and shared by
//! `Arc`.
//!
//! Bridge, session state and advertising status live behind one mutex.
//! Registration, dispatch and state transitions all take it, so an observer
//! is never swapped out mid-dispatch and events of one channel are delivered
//! one at a time, in platform order.
//!
//! Observers are called with that mutex held. A call back into the
//! coordinator from inside a callback is detected by thread and rejected with
//! a warning; read accessors answer from a snapshot taken before dispatch.

use crate::domain::error::BridgeError;
use crate::domain::models::{
    AdvertiseOutcome, AdvertisingStatus, Capability, Channel, ConnectionEvent, Discoverability,
    DiscoveryEvent, DiscoveryStart, EnableOutcome, Notification, SessionState,
};
use crate::domain::settings::SettingsService;
use crate::infrastructure::bluetooth::advertiser::{self, AdvertisingTracker};
use crate::infrastructure::bluetooth::bridge::{EventBridge, Subscription};
use crate::infrastructure::bluetooth::observer::{ConnectionObserver, DiscoveryObserver};
use crate::infrastructure::bluetooth::protocol::RawBroadcast;
use crate::infrastructure::platform::{BroadcastHub, BroadcastReceiver, RadioAuthorization, RadioControl};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use tracing::{debug, error, info, warn};

struct CoordinatorState {
    bridge: EventBridge,
    session: SessionState,
    advertising: AdvertisingTracker,
}

impl CoordinatorState {
    /// Scanning -> Idle. The discovery subscription goes with the session.
    fn end_session(&mut self) {
        if let Err(e) = self.bridge.unsubscribe_discovery_events() {
            warn!("Discovery teardown: {}", e);
        }
        self.session = SessionState::Idle;
    }
}

/// Coordinator state as seen by the thread currently running observers
#[derive(Debug, Clone, Copy)]
struct DispatchFrame {
    thread: ThreadId,
    session: SessionState,
    connection_subscribed: bool,
    advertising: AdvertisingStatus,
}

/// Clears the dispatch frame when observers return, or unwind
struct FrameGuard<'a>(&'a Mutex<Option<DispatchFrame>>);

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Platform receiver for one bridge subscription. Holds the coordinator
/// weakly: once it is dropped, deliveries are discarded.
struct ChannelReceiver {
    subscription: Subscription,
    owner: Weak<BluetoothManager>,
}

impl BroadcastReceiver for ChannelReceiver {
    fn on_receive(&self, broadcast: &RawBroadcast) {
        match self.owner.upgrade() {
            Some(manager) => manager.on_broadcast(self.subscription, broadcast),
            None => debug!("Coordinator gone, dropping `{}`", broadcast.action),
        }
    }
}

pub struct BluetoothManager {
    core: Mutex<CoordinatorState>,
    dispatching: Mutex<Option<DispatchFrame>>,
    radio: Arc<dyn RadioControl>,
    auth: Arc<dyn RadioAuthorization>,
    settings: Arc<Mutex<SettingsService>>,
    this: Weak<BluetoothManager>,
}

impl BluetoothManager {
    pub fn new(
        hub: Arc<dyn BroadcastHub>,
        radio: Arc<dyn RadioControl>,
        auth: Arc<dyn RadioAuthorization>,
        settings: Arc<Mutex<SettingsService>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            core: Mutex::new(CoordinatorState {
                bridge: EventBridge::new(hub),
                session: SessionState::Idle,
                advertising: AdvertisingTracker::default(),
            }),
            dispatching: Mutex::new(None),
            radio,
            auth,
            settings,
            this: this.clone(),
        })
    }

    /// Build from one object that provides every platform collaborator
    pub fn from_platform<P>(platform: Arc<P>, settings: Arc<Mutex<SettingsService>>) -> Arc<Self>
    where
        P: BroadcastHub + RadioControl + RadioAuthorization + 'static,
    {
        Self::new(platform.clone(), platform.clone(), platform, settings)
    }

    fn lock_core(&self) -> MutexGuard<'_, CoordinatorState> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The dispatch frame, if this thread is inside an observer callback
    fn reentered(&self) -> Option<DispatchFrame> {
        let frame = *self.dispatching.lock().unwrap_or_else(PoisonError::into_inner);
        frame.filter(|frame| frame.thread == thread::current().id())
    }

    /// Lock the coordinator for `operation`, or `None` when called from an
    /// observer callback on the dispatching thread.
    fn enter(&self, operation: &str) -> Option<MutexGuard<'_, CoordinatorState>> {
        if self.reentered().is_some() {
            warn!("`{}` called from an observer callback, rejected", operation);
            return None;
        }
        Some(self.lock_core())
    }

    fn receiver(&self, subscription: Subscription) -> Arc<dyn BroadcastReceiver> {
        Arc::new(ChannelReceiver {
            subscription,
            owner: self.this.clone(),
        })
    }

    // Observer registration

    /// Replace the discovery observer. The previous one is not notified.
    pub fn register_discovery_observer(&self, observer: Arc<dyn DiscoveryObserver>) {
        let Some(mut core) = self.enter("register_discovery_observer") else {
            return;
        };
        if core.bridge.set_discovery_observer(observer) {
            debug!("Replaced discovery observer");
        }
    }

    pub fn deregister_discovery_observer(&self) {
        if let Some(mut core) = self.enter("deregister_discovery_observer") {
            core.bridge.clear_discovery_observer();
        }
    }

    /// Replace the connection observer. The previous one is not notified.
    pub fn register_connection_observer(&self, observer: Arc<dyn ConnectionObserver>) {
        let Some(mut core) = self.enter("register_connection_observer") else {
            return;
        };
        if core.bridge.set_connection_observer(observer) {
            debug!("Replaced connection observer");
        }
    }

    pub fn deregister_connection_observer(&self) {
        if let Some(mut core) = self.enter("deregister_connection_observer") {
            core.bridge.clear_connection_observer();
        }
    }

    // Connection channel lifecycle

    /// Start listening for connection-state broadcasts. Idempotent.
    pub fn register_connection_receiver(&self) {
        let Some(mut core) = self.enter("register_connection_receiver") else {
            return;
        };
        match core
            .bridge
            .subscribe_connection_events(|s| self.receiver(s))
        {
            Ok(()) => {}
            Err(e @ BridgeError::AlreadySubscribed(_)) => warn!("{}, ignoring", e),
            Err(e) => error!("Could not listen for connection events: {}", e),
        }
    }

    /// Stop listening for connection-state broadcasts. A no-op (with a
    /// warning) when not listening.
    pub fn unregister_connection_receiver(&self) {
        let Some(mut core) = self.enter("unregister_connection_receiver") else {
            return;
        };
        if let Err(e) = core.bridge.unsubscribe_connection_events() {
            warn!("{}, ignoring", e);
        }
    }

    // Discovery sessions

    pub fn start_discovery(&self) -> DiscoveryStart {
        if !self.auth.has_permission(Capability::Scan) {
            info!("Scan permission not granted, discovery not started");
            return DiscoveryStart::PermissionDenied;
        }

        let Some(mut core) = self.enter("start_discovery") else {
            return DiscoveryStart::Unavailable;
        };
        if core.session == SessionState::Scanning {
            debug!("Discovery already running");
            return DiscoveryStart::Started;
        }

        if !self.radio.is_supported() {
            warn!("No Bluetooth adapter, discovery not started");
            return DiscoveryStart::Unavailable;
        }

        if let Err(e) = core.bridge.subscribe_discovery_events(|s| self.receiver(s)) {
            error!("Could not listen for discovery events: {}", e);
            return DiscoveryStart::Unavailable;
        }

        core.session = SessionState::Scanning;
        self.radio.start_scan();
        info!("Discovery started");
        DiscoveryStart::Started
    }

    /// Caller-initiated stop. The discovery observer is not told
    /// `DiscoveryFinished`. Returns whether a session was running.
    pub fn stop_discovery(&self) -> bool {
        let Some(mut core) = self.enter("stop_discovery") else {
            return false;
        };
        if core.session == SessionState::Idle {
            debug!("Discovery not running, nothing to stop");
            return false;
        }

        core.end_session();
        self.radio.stop_scan();
        info!("Discovery stopped");
        true
    }

    pub fn session_state(&self) -> SessionState {
        match self.reentered() {
            Some(frame) => frame.session,
            None => self.lock_core().session,
        }
    }

    pub fn is_subscribed(&self, channel: Channel) -> bool {
        match (self.reentered(), channel) {
            // The discovery subscription lives exactly as long as the session
            (Some(frame), Channel::Discovery) => frame.session == SessionState::Scanning,
            (Some(frame), Channel::Connection) => frame.connection_subscribed,
            (None, _) => self.lock_core().bridge.is_subscribed(channel),
        }
    }

    fn on_broadcast(&self, subscription: Subscription, broadcast: &RawBroadcast) {
        let mut core = self.lock_core();
        let Some(notification) = core.bridge.accept(subscription, broadcast) else {
            return;
        };
        let notification = self.apply_name_policy(notification);

        if notification == Notification::Discovery(DiscoveryEvent::DiscoveryFinished) {
            info!("Discovery finished, closing session");
            core.end_session();
        }

        *self.dispatching.lock().unwrap_or_else(PoisonError::into_inner) = Some(DispatchFrame {
            thread: thread::current().id(),
            session: core.session,
            connection_subscribed: core.bridge.is_subscribed(Channel::Connection),
            advertising: core.advertising.status(),
        });
        let _frame = FrameGuard(&self.dispatching);
        core.bridge.dispatch(notification);
    }

    /// Device names are only passed on with the Connect permission
    fn apply_name_policy(&self, notification: Notification) -> Notification {
        if self.auth.has_permission(Capability::Connect) {
            return notification;
        }

        match notification {
            Notification::Discovery(DiscoveryEvent::DeviceFound(device)) => {
                Notification::Discovery(DiscoveryEvent::DeviceFound(device.without_name()))
            }
            Notification::Connection(ConnectionEvent::Connected(device)) => {
                Notification::Connection(ConnectionEvent::Connected(device.without_name()))
            }
            Notification::Connection(ConnectionEvent::Disconnected(device)) => {
                Notification::Connection(ConnectionEvent::Disconnected(device.without_name()))
            }
            other => other,
        }
    }

    // Adapter

    pub fn is_bluetooth_supported(&self) -> bool {
        self.radio.is_supported()
    }

    pub fn is_bluetooth_enabled(&self) -> bool {
        self.radio.is_supported() && self.radio.is_enabled()
    }

    /// Ask the platform to turn the radio on if it is off
    pub fn enable_bluetooth(&self) -> EnableOutcome {
        if !self.radio.is_supported() {
            return EnableOutcome::Unsupported;
        }
        if self.radio.is_enabled() {
            return EnableOutcome::AlreadyEnabled;
        }
        if !self.auth.has_permission(Capability::Connect) {
            info!("Connect permission not granted, cannot request enable");
            return EnableOutcome::PermissionDenied;
        }

        self.radio.request_enable();
        info!("Requested Bluetooth enable");
        EnableOutcome::Requested
    }

    // Advertising and discoverability

    /// Start connectable BLE advertising with the configured parameters.
    ///
    /// Usually returns `Pending`; the platform's completion callback moves the
    /// status to `Active` or `Failed` later (see `advertising_status`).
    pub fn start_ble_advertising(&self) -> AdvertisingStatus {
        if let Some(frame) = self.reentered() {
            warn!("`start_ble_advertising` called from an observer callback, rejected");
            return frame.advertising;
        }
        if !self.auth.has_permission(Capability::Advertise) {
            warn!("Advertise permission not granted, not advertising");
            let mut core = self.lock_core();
            core.advertising.deny();
            return core.advertising.status();
        }

        let config = {
            let settings = self.settings.lock().unwrap_or_else(PoisonError::into_inner);
            advertiser::advertise_config(&settings.get().advertising)
        };
        let attempt = self.lock_core().advertising.begin();

        let config = match config {
            Ok(config) => config,
            Err(e) => {
                error!("Invalid advertising settings: {}", e);
                let mut core = self.lock_core();
                core.advertising.complete(
                    attempt,
                    AdvertiseOutcome::Failure(advertiser::failure_code::INTERNAL_ERROR),
                );
                return core.advertising.status();
            }
        };

        // The completion may fire on this thread, so the lock is not held here
        let owner = self.this.clone();
        let result = self.radio.start_advertising(
            &config,
            Box::new(move |outcome| {
                if let Some(manager) = owner.upgrade() {
                    manager.lock_core().advertising.complete(attempt, outcome);
                }
            }),
        );

        let mut core = self.lock_core();
        if let Err(e) = result {
            core.advertising.reject(attempt, &e);
        }
        core.advertising.status()
    }

    pub fn advertising_status(&self) -> AdvertisingStatus {
        match self.reentered() {
            Some(frame) => frame.advertising,
            None => self.lock_core().advertising.status(),
        }
    }

    /// Advertise (best effort) and then request a discoverability window.
    /// An advertising failure never blocks the window request.
    pub fn make_discoverable(&self) -> Discoverability {
        let advertising = self.start_ble_advertising();
        if !matches!(
            advertising,
            AdvertisingStatus::Pending | AdvertisingStatus::Active
        ) {
            warn!(
                "Advertising unavailable ({:?}), requesting discoverability anyway",
                advertising
            );
        }

        let window_secs = self
            .settings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get()
            .discoverable_duration_secs;
        self.radio.request_discoverable_window(window_secs);
        info!("Requested {}s discoverable window", window_secs);

        Discoverability {
            advertising,
            window_secs,
        }
    }
}

impl Drop for BluetoothManager {
    fn drop(&mut self) {
        let core = self.core.get_mut().unwrap_or_else(PoisonError::into_inner);
        if core.session == SessionState::Scanning {
            core.end_session();
            self.radio.stop_scan();
        }
        if core.bridge.is_subscribed(Channel::Connection) {
            if let Err(e) = core.bridge.unsubscribe_connection_events() {
                warn!("Connection teardown: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::DeviceHandle;
    use crate::infrastructure::bluetooth::protocol::{self, EXTRA_STATE};
    use crate::infrastructure::simulated::{RadioCall, SimulatedPlatform};
    use serde_json::json;
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }

        fn push(&self, entry: String) {
            self.seen.lock().unwrap().push(entry);
        }
    }

    impl DiscoveryObserver for Recorder {
        fn on_device_found(&self, device: DeviceHandle) {
            self.push(format!("found {}", device));
        }

        fn on_discovery_finished(&self) {
            self.push("finished".to_string());
        }
    }

    impl ConnectionObserver for Recorder {
        fn on_connected(&self, device: DeviceHandle) {
            self.push(format!("connected {}", device));
        }

        fn on_disconnected(&self, device: DeviceHandle) {
            self.push(format!("disconnected {}", device));
        }
    }

    /// Calls back into the coordinator from its own callbacks
    struct Restarter {
        manager: Weak<BluetoothManager>,
        results: Mutex<Vec<(DiscoveryStart, SessionState)>>,
    }

    impl DiscoveryObserver for Restarter {
        fn on_device_found(&self, _device: DeviceHandle) {
            if let Some(manager) = self.manager.upgrade() {
                manager.register_discovery_observer(Arc::new(Recorder::default()));
            }
        }

        fn on_discovery_finished(&self) {
            if let Some(manager) = self.manager.upgrade() {
                let result = manager.start_discovery();
                self.results
                    .lock()
                    .unwrap()
                    .push((result, manager.session_state()));
            }
        }
    }

    fn device(address: &str) -> DeviceHandle {
        DeviceHandle::new(address, Some(format!("dev-{}", address)))
    }

    fn setup() -> (Arc<SimulatedPlatform>, Arc<BluetoothManager>) {
        let dir = tempfile::tempdir().unwrap();
        let settings = SettingsService::with_path(dir.path().join("settings.json"));
        let platform = Arc::new(SimulatedPlatform::new());
        let manager =
            BluetoothManager::from_platform(platform.clone(), Arc::new(Mutex::new(settings)));
        (platform, manager)
    }

    fn discovery_registrations(platform: &SimulatedPlatform) -> usize {
        platform.count(|c| {
            matches!(c, RadioCall::RegisterReceiver(actions) if actions.contains(&protocol::ACTION_FOUND))
        })
    }

    fn unregistrations(platform: &SimulatedPlatform) -> usize {
        platform.count(|c| matches!(c, RadioCall::UnregisterReceiver(_)))
    }

    #[test]
    fn test_only_latest_discovery_observer_is_called() {
        let (platform, manager) = setup();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let third = Arc::new(Recorder::default());

        manager.register_discovery_observer(first.clone());
        manager.register_discovery_observer(second.clone());
        manager.register_discovery_observer(third.clone());
        assert_eq!(manager.start_discovery(), DiscoveryStart::Started);

        platform.deliver(RawBroadcast::device_found(&device("A")));
        platform.deliver(RawBroadcast::discovery_finished());

        assert!(first.seen().is_empty());
        assert!(second.seen().is_empty());
        assert_eq!(third.seen(), vec!["found dev-A | A", "finished"]);
    }

    #[test]
    fn test_only_latest_connection_observer_is_called() {
        let (platform, manager) = setup();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());

        manager.register_connection_observer(first.clone());
        manager.register_connection_observer(second.clone());
        manager.register_connection_receiver();

        platform.deliver(RawBroadcast::acl_connected(&device("A")));

        assert!(first.seen().is_empty());
        assert_eq!(second.seen(), vec!["connected dev-A | A"]);
    }

    #[test]
    fn test_observer_calls_back_into_manager_are_rejected() {
        let (platform, manager) = setup();
        let restarter = Arc::new(Restarter {
            manager: Arc::downgrade(&manager),
            results: Mutex::default(),
        });
        manager.register_discovery_observer(restarter.clone());
        assert_eq!(manager.start_discovery(), DiscoveryStart::Started);

        let (done_tx, done_rx) = mpsc::channel();
        let delivery = {
            let platform = platform.clone();
            thread::spawn(move || {
                platform.deliver(RawBroadcast::device_found(&device("A")));
                platform.deliver(RawBroadcast::discovery_finished());
                done_tx.send(()).unwrap();
            })
        };
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("delivery thread blocked in observer");
        delivery.join().unwrap();

        // The nested registration was dropped, so the restarter saw the finish
        assert_eq!(
            *restarter.results.lock().unwrap(),
            vec![(DiscoveryStart::Unavailable, SessionState::Idle)]
        );
        assert_eq!(discovery_registrations(&platform), 1);

        // Outside a callback the coordinator accepts calls again
        assert_eq!(manager.start_discovery(), DiscoveryStart::Started);
        assert_eq!(discovery_registrations(&platform), 2);
    }

    #[test]
    fn test_start_discovery_twice_subscribes_once() {
        let (platform, manager) = setup();

        assert_eq!(manager.start_discovery(), DiscoveryStart::Started);
        assert_eq!(manager.start_discovery(), DiscoveryStart::Started);

        assert_eq!(discovery_registrations(&platform), 1);
        assert_eq!(platform.count(|c| *c == RadioCall::StartScan), 1);
        assert_eq!(manager.session_state(), SessionState::Scanning);
    }

    #[test]
    fn test_discovery_finished_without_observer_tears_down() {
        let (platform, manager) = setup();
        manager.start_discovery();

        platform.deliver(RawBroadcast::discovery_finished());

        assert_eq!(unregistrations(&platform), 1);
        assert_eq!(manager.session_state(), SessionState::Idle);
        assert!(!manager.is_subscribed(Channel::Discovery));
        assert_eq!(platform.receiver_count(), 0);
    }

    #[test]
    fn test_events_without_observer_are_not_buffered() {
        let (platform, manager) = setup();
        manager.start_discovery();

        platform.deliver(RawBroadcast::device_found(&device("X")));

        let late = Arc::new(Recorder::default());
        manager.register_discovery_observer(late.clone());
        assert!(late.seen().is_empty());

        platform.deliver(RawBroadcast::device_found(&device("Y")));
        assert_eq!(late.seen(), vec!["found dev-Y | Y"]);
    }

    #[test]
    fn test_permission_denied_makes_no_platform_calls() {
        let (platform, manager) = setup();
        platform.revoke(Capability::Scan);

        assert_eq!(manager.start_discovery(), DiscoveryStart::PermissionDenied);
        assert!(platform.calls().is_empty());
        assert_eq!(manager.session_state(), SessionState::Idle);
    }

    #[test]
    fn test_full_discovery_session() {
        let (platform, manager) = setup();
        let observer = Arc::new(Recorder::default());
        manager.register_discovery_observer(observer.clone());

        assert_eq!(manager.start_discovery(), DiscoveryStart::Started);
        assert_eq!(manager.session_state(), SessionState::Scanning);

        platform.deliver(RawBroadcast::device_found(&device("A")));
        platform.deliver(RawBroadcast::device_found(&device("B")));
        platform.deliver(RawBroadcast::discovery_finished());
        assert_eq!(manager.session_state(), SessionState::Idle);

        // Stray event after the window closed
        assert_eq!(platform.deliver(RawBroadcast::device_found(&device("C"))), 0);

        assert_eq!(
            observer.seen(),
            vec!["found dev-A | A", "found dev-B | B", "finished"]
        );
    }

    #[test]
    fn test_new_session_after_finish() {
        let (platform, manager) = setup();
        manager.start_discovery();
        platform.deliver(RawBroadcast::discovery_finished());

        assert_eq!(manager.start_discovery(), DiscoveryStart::Started);
        assert_eq!(discovery_registrations(&platform), 2);
        assert_eq!(platform.count(|c| *c == RadioCall::StartScan), 2);
        assert_eq!(platform.receiver_count(), 1);
    }

    #[test]
    fn test_stop_discovery() {
        let (platform, manager) = setup();
        let observer = Arc::new(Recorder::default());
        manager.register_discovery_observer(observer.clone());

        assert!(!manager.stop_discovery());
        manager.start_discovery();
        assert!(manager.stop_discovery());

        assert_eq!(manager.session_state(), SessionState::Idle);
        assert_eq!(platform.count(|c| *c == RadioCall::StopScan), 1);
        assert_eq!(platform.receiver_count(), 0);

        // The platform's own finished broadcast after a stop reaches nobody
        platform.deliver(RawBroadcast::discovery_finished());
        assert!(observer.seen().is_empty());
        assert_eq!(unregistrations(&platform), 1);
    }

    #[test]
    fn test_discovery_unavailable_without_adapter() {
        let (platform, manager) = setup();
        platform.set_supported(false);

        assert_eq!(manager.start_discovery(), DiscoveryStart::Unavailable);
        assert_eq!(discovery_registrations(&platform), 0);
        assert_eq!(platform.count(|c| *c == RadioCall::StartScan), 0);
        assert_eq!(manager.session_state(), SessionState::Idle);
    }

    #[test]
    fn test_discovery_unavailable_when_registration_refused() {
        let (platform, manager) = setup();
        platform.set_registration_refused(true);

        assert_eq!(manager.start_discovery(), DiscoveryStart::Unavailable);
        assert_eq!(platform.count(|c| *c == RadioCall::StartScan), 0);
        assert_eq!(manager.session_state(), SessionState::Idle);
    }

    #[test]
    fn test_malformed_found_event_is_dropped() {
        let (platform, manager) = setup();
        let observer = Arc::new(Recorder::default());
        manager.register_discovery_observer(observer.clone());
        manager.start_discovery();

        platform.deliver(RawBroadcast::new(protocol::ACTION_FOUND));
        platform.deliver(RawBroadcast::device_found(&device("A")));

        assert_eq!(observer.seen(), vec!["found dev-A | A"]);
        assert_eq!(manager.session_state(), SessionState::Scanning);
    }

    #[test]
    fn test_connection_receiver_lifecycle() {
        let (platform, manager) = setup();
        let observer = Arc::new(Recorder::default());
        manager.register_connection_observer(observer.clone());

        manager.register_connection_receiver();
        manager.register_connection_receiver();
        assert_eq!(platform.receiver_count(), 1);

        platform.deliver(RawBroadcast::acl_connected(&device("A")));
        platform.deliver(
            RawBroadcast::new(protocol::ACTION_HEADSET_STATE_CHANGED)
                .with_device(&device("B"))
                .with_extra(EXTRA_STATE, json!(protocol::profile_state::CONNECTED)),
        );
        platform.deliver(RawBroadcast::acl_disconnected(&device("A")));

        assert_eq!(
            observer.seen(),
            vec![
                "connected dev-A | A",
                "connected dev-B | B",
                "disconnected dev-A | A"
            ]
        );

        manager.unregister_connection_receiver();
        // Second unregister is a logged no-op and never reaches the platform
        manager.unregister_connection_receiver();
        assert_eq!(unregistrations(&platform), 1);
        assert!(!manager.is_subscribed(Channel::Connection));
    }

    #[test]
    fn test_deregistered_connection_observer_gets_nothing() {
        let (platform, manager) = setup();
        let observer = Arc::new(Recorder::default());
        manager.register_connection_observer(observer.clone());
        manager.register_connection_receiver();

        manager.deregister_connection_observer();
        platform.deliver(RawBroadcast::acl_connected(&device("A")));

        assert!(observer.seen().is_empty());
    }

    #[test]
    fn test_discovery_finish_leaves_connection_channel_alone() {
        let (platform, manager) = setup();
        manager.register_connection_receiver();
        manager.start_discovery();

        platform.deliver(RawBroadcast::discovery_finished());

        assert!(manager.is_subscribed(Channel::Connection));
        assert!(!manager.is_subscribed(Channel::Discovery));
    }

    #[test]
    fn test_names_withheld_without_connect_permission() {
        let (platform, manager) = setup();
        platform.revoke(Capability::Connect);
        let observer = Arc::new(Recorder::default());
        manager.register_discovery_observer(observer.clone());
        manager.start_discovery();

        platform.deliver(RawBroadcast::device_found(&device("A")));
        assert_eq!(observer.seen(), vec!["found Unknown | A"]);
    }

    #[test]
    fn test_enable_bluetooth() {
        let (platform, manager) = setup();
        assert_eq!(manager.enable_bluetooth(), EnableOutcome::AlreadyEnabled);

        platform.set_enabled(false);
        platform.revoke(Capability::Connect);
        assert_eq!(manager.enable_bluetooth(), EnableOutcome::PermissionDenied);
        assert_eq!(platform.count(|c| *c == RadioCall::RequestEnable), 0);

        platform.grant(Capability::Connect);
        assert_eq!(manager.enable_bluetooth(), EnableOutcome::Requested);
        assert!(manager.is_bluetooth_enabled());

        platform.set_supported(false);
        assert_eq!(manager.enable_bluetooth(), EnableOutcome::Unsupported);
        assert!(!manager.is_bluetooth_supported());
    }

    #[test]
    fn test_advertising_outcomes() {
        let (platform, manager) = setup();
        assert_eq!(manager.advertising_status(), AdvertisingStatus::Idle);

        assert_eq!(manager.start_ble_advertising(), AdvertisingStatus::Active);

        platform.set_advertise_outcome(None);
        assert_eq!(manager.start_ble_advertising(), AdvertisingStatus::Pending);
        platform.complete_advertising(AdvertiseOutcome::Failure(2));
        assert_eq!(manager.advertising_status(), AdvertisingStatus::Failed(2));

        platform.set_advertiser_available(false);
        assert_eq!(manager.start_ble_advertising(), AdvertisingStatus::Unsupported);

        platform.revoke(Capability::Advertise);
        let before = platform.calls().len();
        assert_eq!(
            manager.start_ble_advertising(),
            AdvertisingStatus::PermissionDenied
        );
        assert_eq!(platform.calls().len(), before);
    }

    #[test]
    fn test_make_discoverable_survives_advertising_failure() {
        let (platform, manager) = setup();
        platform.set_advertise_outcome(Some(AdvertiseOutcome::Failure(1)));

        let result = manager.make_discoverable();
        assert_eq!(result.advertising, AdvertisingStatus::Failed(1));
        assert_eq!(result.window_secs, 300);
        assert_eq!(
            platform.count(|c| *c == RadioCall::RequestDiscoverableWindow(300)),
            1
        );
    }

    #[test]
    fn test_make_discoverable_without_advertise_permission() {
        let (platform, manager) = setup();
        platform.revoke(Capability::Advertise);

        let result = manager.make_discoverable();
        assert_eq!(result.advertising, AdvertisingStatus::PermissionDenied);
        assert_eq!(
            platform.calls(),
            vec![RadioCall::RequestDiscoverableWindow(300)]
        );
    }

    #[test]
    fn test_drop_tears_down_subscriptions() {
        let (platform, manager) = setup();
        manager.register_connection_receiver();
        manager.start_discovery();
        assert_eq!(platform.receiver_count(), 2);

        drop(manager);

        assert_eq!(platform.receiver_count(), 0);
        assert_eq!(platform.count(|c| *c == RadioCall::StopScan), 1);
    }

    #[test]
    fn test_per_channel_order_under_concurrency() {
        let (platform, manager) = setup();
        let observer = Arc::new(Recorder::default());
        manager.register_discovery_observer(observer.clone());
        manager.start_discovery();

        let churn = {
            let manager = manager.clone();
            let observer = observer.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    manager.register_discovery_observer(observer.clone());
                    manager.register_connection_observer(Arc::new(Recorder::default()));
                }
            })
        };

        let delivery = {
            let platform = platform.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    platform.deliver(RawBroadcast::device_found(&device(&format!("{:03}", i))));
                }
            })
        };

        churn.join().unwrap();
        delivery.join().unwrap();

        let expected: Vec<String> = (0..200)
            .map(|i| format!("found dev-{:03} | {:03}", i, i))
            .collect();
        assert_eq!(observer.seen(), expected);
    }
}
