//! Observer Boundary
//!
//! The UI registers one discovery observer and one connection observer.
//! Callbacks run synchronously on the platform's delivery thread while the
//! coordinator lock is held. Calls back into the coordinator from a callback
//! are rejected with a warning; [`ChannelObserver`] hands events off to a
//! tokio channel so the UI can act on them afterwards.

use crate::domain::models::{AppEvent, DeviceHandle};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

pub trait DiscoveryObserver: Send + Sync {
    fn on_device_found(&self, device: DeviceHandle);
    fn on_discovery_finished(&self);
}

pub trait ConnectionObserver: Send + Sync {
    fn on_connected(&self, device: DeviceHandle);
    fn on_disconnected(&self, device: DeviceHandle);
}

/// Holds at most one observer. Replacing it does not notify the old one.
pub struct ObserverSlot<T: ?Sized> {
    observer: Option<Arc<T>>,
}

impl<T: ?Sized> ObserverSlot<T> {
    pub fn empty() -> Self {
        Self { observer: None }
    }

    /// Install `observer`, returning whether a previous one was dropped
    pub fn replace(&mut self, observer: Arc<T>) -> bool {
        self.observer.replace(observer).is_some()
    }

    /// Empty the slot, returning whether it held an observer
    pub fn clear(&mut self) -> bool {
        self.observer.take().is_some()
    }

    pub fn get(&self) -> Option<&Arc<T>> {
        self.observer.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.observer.is_none()
    }
}

impl<T: ?Sized> Default for ObserverSlot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> fmt::Debug for ObserverSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("occupied", &self.observer.is_some())
            .finish()
    }
}

/// Forwards observer callbacks to the UI as [`AppEvent`]s
#[derive(Clone)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<AppEvent>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: AppEvent) {
        if self.sender.send(event).is_err() {
            trace!("UI receiver closed, dropping event");
        }
    }
}

impl DiscoveryObserver for ChannelObserver {
    fn on_device_found(&self, device: DeviceHandle) {
        self.send(AppEvent::DeviceFound(device));
    }

    fn on_discovery_finished(&self) {
        self.send(AppEvent::DiscoveryFinished);
    }
}

impl ConnectionObserver for ChannelObserver {
    fn on_connected(&self, device: DeviceHandle) {
        self.send(AppEvent::DeviceConnected(device));
    }

    fn on_disconnected(&self, device: DeviceHandle) {
        self.send(AppEvent::DeviceDisconnected(device));
    }
}
