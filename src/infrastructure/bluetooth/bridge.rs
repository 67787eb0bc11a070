//! Event Bridge
//!
//! Owns the platform receiver registrations for the discovery and connection
//! channels, translates raw broadcasts into typed notifications and hands
//! them to the observer currently sitting in the matching slot.
//!
//! The bridge is not synchronised on its own; the coordinator keeps it behind
//! its lock so that registration and dispatch never interleave.

use crate::domain::error::BridgeError;
use crate::domain::models::{Channel, ConnectionEvent, DiscoveryEvent, Notification};
use crate::infrastructure::bluetooth::observer::{ConnectionObserver, DiscoveryObserver, ObserverSlot};
use crate::infrastructure::bluetooth::protocol::{self, IntentFilter, RawBroadcast};
use crate::infrastructure::platform::{BroadcastHub, BroadcastReceiver, ReceiverToken};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identifies one subscription of one channel.
///
/// Receivers carry the subscription they were installed for, so a delivery
/// racing with teardown (or arriving after a later resubscribe) is told apart
/// from a live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    pub channel: Channel,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy)]
struct ActiveSubscription {
    token: ReceiverToken,
    epoch: u64,
}

pub struct EventBridge {
    hub: Arc<dyn BroadcastHub>,
    discovery: Option<ActiveSubscription>,
    connection: Option<ActiveSubscription>,
    next_epoch: u64,
    discovery_slot: ObserverSlot<dyn DiscoveryObserver>,
    connection_slot: ObserverSlot<dyn ConnectionObserver>,
}

impl EventBridge {
    pub fn new(hub: Arc<dyn BroadcastHub>) -> Self {
        Self {
            hub,
            discovery: None,
            connection: None,
            next_epoch: 1,
            discovery_slot: ObserverSlot::empty(),
            connection_slot: ObserverSlot::empty(),
        }
    }

    pub fn subscribe_connection_events<F>(&mut self, make_receiver: F) -> Result<(), BridgeError>
    where
        F: FnOnce(Subscription) -> Arc<dyn BroadcastReceiver>,
    {
        self.subscribe(Channel::Connection, make_receiver)
    }

    pub fn unsubscribe_connection_events(&mut self) -> Result<(), BridgeError> {
        self.unsubscribe(Channel::Connection)
    }

    pub fn subscribe_discovery_events<F>(&mut self, make_receiver: F) -> Result<(), BridgeError>
    where
        F: FnOnce(Subscription) -> Arc<dyn BroadcastReceiver>,
    {
        self.subscribe(Channel::Discovery, make_receiver)
    }

    pub fn unsubscribe_discovery_events(&mut self) -> Result<(), BridgeError> {
        self.unsubscribe(Channel::Discovery)
    }

    pub fn is_subscribed(&self, channel: Channel) -> bool {
        self.active(channel).is_some()
    }

    /// Install a platform receiver for `channel`.
    ///
    /// Fails with `AlreadySubscribed` without touching the platform when the
    /// channel is live, so a receiver is never registered twice.
    fn subscribe<F>(&mut self, channel: Channel, make_receiver: F) -> Result<(), BridgeError>
    where
        F: FnOnce(Subscription) -> Arc<dyn BroadcastReceiver>,
    {
        if self.is_subscribed(channel) {
            return Err(BridgeError::AlreadySubscribed(channel));
        }

        let epoch = self.next_epoch;
        self.next_epoch += 1;

        let receiver = make_receiver(Subscription { channel, epoch });
        let token = self
            .hub
            .register_receiver(&IntentFilter::for_channel(channel), receiver)?;

        *self.active_mut(channel) = Some(ActiveSubscription { token, epoch });
        info!("Subscribed to {} events ({:?})", channel, token);
        Ok(())
    }

    /// Remove the platform receiver for `channel`.
    ///
    /// Local bookkeeping is cleared even if the platform refuses the
    /// unregistration; the platform error is still reported.
    fn unsubscribe(&mut self, channel: Channel) -> Result<(), BridgeError> {
        let active = self
            .active_mut(channel)
            .take()
            .ok_or(BridgeError::NotSubscribed(channel))?;

        self.hub.unregister_receiver(active.token)?;
        info!("Unsubscribed from {} events ({:?})", channel, active.token);
        Ok(())
    }

    /// Accept a raw broadcast delivered to `subscription`'s receiver.
    ///
    /// Returns the typed notification, or `None` when the broadcast is stale,
    /// malformed, belongs to another channel or carries nothing to report.
    pub fn accept(&self, subscription: Subscription, broadcast: &RawBroadcast) -> Option<Notification> {
        match self.active(subscription.channel) {
            Some(active) if active.epoch == subscription.epoch => {}
            _ => {
                debug!(
                    "Dropping `{}` delivered to a stale {} receiver",
                    broadcast.action, subscription.channel
                );
                return None;
            }
        }

        let notification = match protocol::translate(broadcast) {
            Ok(Some(notification)) => notification,
            Ok(None) => return None,
            Err(e) => {
                warn!("Dropping broadcast: {}", e);
                return None;
            }
        };

        if notification.channel() != subscription.channel {
            warn!(
                "Dropping `{}`: not a {} event",
                broadcast.action, subscription.channel
            );
            return None;
        }

        Some(notification)
    }

    /// Deliver to the registered observer, if any. No buffering: with an
    /// empty slot the notification is gone.
    pub fn dispatch(&self, notification: Notification) {
        match notification {
            Notification::Discovery(event) => match self.discovery_slot.get() {
                Some(observer) => match event {
                    DiscoveryEvent::DeviceFound(device) => observer.on_device_found(device),
                    DiscoveryEvent::DiscoveryFinished => observer.on_discovery_finished(),
                },
                None => debug!("No discovery observer, dropping {:?}", event),
            },
            Notification::Connection(event) => match self.connection_slot.get() {
                Some(observer) => match event {
                    ConnectionEvent::Connected(device) => observer.on_connected(device),
                    ConnectionEvent::Disconnected(device) => observer.on_disconnected(device),
                },
                None => debug!("No connection observer, dropping {:?}", event),
            },
        }
    }

    pub fn set_discovery_observer(&mut self, observer: Arc<dyn DiscoveryObserver>) -> bool {
        self.discovery_slot.replace(observer)
    }

    pub fn clear_discovery_observer(&mut self) -> bool {
        self.discovery_slot.clear()
    }

    pub fn set_connection_observer(&mut self, observer: Arc<dyn ConnectionObserver>) -> bool {
        self.connection_slot.replace(observer)
    }

    pub fn clear_connection_observer(&mut self) -> bool {
        self.connection_slot.clear()
    }

    fn active(&self, channel: Channel) -> Option<ActiveSubscription> {
        match channel {
            Channel::Discovery => self.discovery,
            Channel::Connection => self.connection,
        }
    }

    fn active_mut(&mut self, channel: Channel) -> &mut Option<ActiveSubscription> {
        match channel {
            Channel::Discovery => &mut self.discovery,
            Channel::Connection => &mut self.connection,
        }
    }
}
