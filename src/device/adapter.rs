use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use crate::device::types::{
    PeripheralId, PeripheralInfo, PermissionKind, PermissionStatus, RadioState, ScanOptions, ServiceInfo,
};
use crate::error::TransportError;

/// Permission negotiation and radio power state.
#[async_trait]
pub trait RadioAdapter: Send + Sync {
    async fn request_permissions(&self, required: &[PermissionKind]) -> Result<Vec<(PermissionKind, PermissionStatus)>, TransportError>;

    async fn radio_state(&self) -> Result<RadioState, TransportError>;

    /// Observe radio power changes. Only changes are reported, not the current state.
    async fn watch_radio_state(&self) -> Result<EventSubscription<RadioState>, TransportError>;
}

/// Scanning for, and connecting to, BLE peripherals.
#[async_trait]
pub trait PeripheralTransport: Send + Sync {
    async fn start(&self) -> Result<(), TransportError>;

    async fn start_scan(&self, options: &ScanOptions) -> Result<(), TransportError>;

    async fn stop_scan(&self) -> Result<(), TransportError>;

    async fn discoveries(&self) -> Result<EventSubscription<PeripheralInfo>, TransportError>;

    async fn connect(&self, id: &PeripheralId) -> Result<(), TransportError>;

    async fn retrieve_services(&self, id: &PeripheralId) -> Result<Vec<ServiceInfo>, TransportError>;

    async fn disconnect(&self, id: &PeripheralId) -> Result<(), TransportError>;
}

/// A registered listener on an adapter event stream.
///
/// The producer side keeps the matching `Sender` and, optionally, watches `cancel` to stop its
/// forwarding task. Unsubscribing closes the channel and cancels the token; doing it more than once
/// is a no-op. Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct EventSubscription<T> {
    receiver: Option<Receiver<T>>,
    cancel: CancellationToken,
}

impl<T> EventSubscription<T> {
    pub fn new(receiver: Receiver<T>, cancel: CancellationToken) -> Self {
        EventSubscription { receiver: Some(receiver), cancel }
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Returns None once unsubscribed or when the producer is gone.
    pub async fn next(&mut self) -> Option<T> {
        match self.receiver.as_mut() {
            Some(receiver) => receiver.next().await,
            None => None,
        }
    }

    /// Returns true if this call removed the listener.
    pub fn unsubscribe(&mut self) -> bool {
        match self.receiver.take() {
            Some(mut receiver) => {
                receiver.close();
                self.cancel.cancel();
                true
            },
            None => false,
        }
    }
}

impl<T> Drop for EventSubscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use futures::channel::mpsc::channel;
    use super::*;

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let (mut sender, receiver) = channel::<u8>(4);
        let cancel = CancellationToken::new();
        let mut subscription = EventSubscription::new(receiver, cancel.clone());

        sender.try_send(1).unwrap();
        assert_eq!(subscription.next().await, Some(1));

        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert!(!subscription.is_active());
        assert!(cancel.is_cancelled());
        assert!(sender.is_closed());
        assert!(sender.try_send(2).is_err());
        assert_eq!(subscription.next().await, None);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let (sender, receiver) = channel::<u8>(4);
        let cancel = CancellationToken::new();
        drop(EventSubscription::new(receiver, cancel.clone()));

        assert!(cancel.is_cancelled());
        assert!(sender.is_closed());
    }
}
