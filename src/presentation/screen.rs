use crate::domain::models::{
    AdvertisingStatus, AppEvent, DeviceHandle, DiscoveryStart, EnableOutcome, MessageSeverity,
    StatusMessage,
};
use crate::infrastructure::bluetooth::advertiser::failure_code;
use crate::infrastructure::bluetooth::{BluetoothManager, ChannelObserver};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Headless model of the Bluetooth screen.
///
/// Owns the receiving end of the observer channel and renders to text lines.
pub struct BluetoothScreen {
    manager: Arc<BluetoothManager>,
    events: mpsc::UnboundedReceiver<AppEvent>,

    // State
    pub(crate) discovered_devices: Vec<DeviceHandle>,
    pub(crate) connected_device: Option<DeviceHandle>,
    pub(crate) is_scanning: bool,
    pub(crate) discoverable_message: String,
    pub(crate) status_message: Option<StatusMessage>,
}

impl BluetoothScreen {
    /// Build the screen and register it as both observers
    pub fn new(manager: Arc<BluetoothManager>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = Arc::new(ChannelObserver::new(tx));
        manager.register_discovery_observer(observer.clone());
        manager.register_connection_observer(observer);

        Self {
            manager,
            events: rx,
            discovered_devices: Vec::new(),
            connected_device: None,
            is_scanning: false,
            discoverable_message: String::new(),
            status_message: None,
        }
    }

    /// Screen became visible
    pub fn on_start(&self) {
        self.manager.register_connection_receiver();
    }

    /// Screen went to the background
    pub fn on_stop(&self) {
        self.manager.unregister_connection_receiver();
    }

    pub fn on_enable_clicked(&mut self) {
        let message = match self.manager.enable_bluetooth() {
            EnableOutcome::AlreadyEnabled => ("Bluetooth is already on", MessageSeverity::Info),
            EnableOutcome::Requested => ("Asked to turn Bluetooth on", MessageSeverity::Info),
            EnableOutcome::PermissionDenied => (
                "Bluetooth connect permission required",
                MessageSeverity::Warning,
            ),
            EnableOutcome::Unsupported => ("Bluetooth not supported", MessageSeverity::Error),
        };
        self.set_status(message.0, message.1);
    }

    pub fn on_start_discovery_clicked(&mut self) {
        let was_scanning = self.is_scanning;
        match self.manager.start_discovery() {
            DiscoveryStart::Started => {
                if !was_scanning {
                    self.discovered_devices.clear();
                }
                self.is_scanning = true;
                self.set_status("Scanning for devices...", MessageSeverity::Info);
            }
            DiscoveryStart::PermissionDenied => {
                self.set_status("Scan permission required", MessageSeverity::Warning);
            }
            DiscoveryStart::Unavailable => {
                self.set_status("Bluetooth unavailable", MessageSeverity::Error);
            }
        }
    }

    pub fn on_make_discoverable_clicked(&mut self) {
        let result = self.manager.make_discoverable();
        info!("Discoverable request: {:?}", result);
        self.discoverable_message = "Device is now discoverable".to_string();
        if let AdvertisingStatus::Failed(code) = result.advertising {
            self.set_status(
                &format!("Advertising failed: {}", failure_code::describe(code)),
                MessageSeverity::Warning,
            );
        }
    }

    pub fn apply(&mut self, event: AppEvent) {
        match event {
            AppEvent::DeviceFound(device) => self.discovered_devices.push(device),
            AppEvent::DiscoveryFinished => {
                self.is_scanning = false;
                self.set_status(
                    &format!("Scan finished, {} device(s)", self.discovered_devices.len()),
                    MessageSeverity::Success,
                );
            }
            AppEvent::DeviceConnected(device) => self.connected_device = Some(device),
            AppEvent::DeviceDisconnected(device) => {
                if self
                    .connected_device
                    .as_ref()
                    .is_some_and(|d| d.address == device.address)
                {
                    self.connected_device = None;
                }
            }
        }
    }

    /// Drain whatever the observers have queued. Returns how many events were
    /// applied.
    pub fn process_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next event and apply it
    pub async fn next_event(&mut self) -> Option<AppEvent> {
        let event = self.events.recv().await?;
        self.apply(event.clone());
        Some(event)
    }

    pub fn render(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.discoverable_message.is_empty() {
            lines.push(self.discoverable_message.clone());
        }
        if let Some(status) = &self.status_message {
            lines.push(format!("[{:?}] {}", status.severity, status.message));
        }
        match &self.connected_device {
            Some(device) => lines.push(format!("Connected to: {}", device.display_name())),
            None => lines.push("Not connected to any device".to_string()),
        }
        for device in &self.discovered_devices {
            lines.push(format!("Device found: {}", device));
        }
        lines
    }

    fn set_status(&mut self, message: &str, severity: MessageSeverity) {
        self.status_message = Some(StatusMessage {
            message: message.to_string(),
            severity,
        });
    }
}
