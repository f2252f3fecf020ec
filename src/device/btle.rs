use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::channel;
use log::{debug, info, warn};
use tokio::spawn;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::device::adapter::{EventSubscription, PeripheralTransport, RadioAdapter};
use crate::device::constants::EVENT_BUFFER;
use crate::device::types::{
    PeripheralId, PeripheralInfo, PermissionKind, PermissionStatus, RadioState, ScanOptions, ServiceInfo,
};
use crate::error::TransportError;

/// Platform peripherals of the current scan session, so that they can be connected to by id.
struct PeripheralCache<P> {
    peripherals: Mutex<HashMap<PeripheralId, P>>,
}

impl<P: Clone> PeripheralCache<P> {
    fn new() -> Self {
        PeripheralCache { peripherals: Mutex::new(HashMap::new()) }
    }

    fn insert(&self, id: PeripheralId, peripheral: P) {
        self.peripherals.lock().expect("Failed to lock peripherals").insert(id, peripheral);
    }

    fn get(&self, id: &PeripheralId) -> Result<P, TransportError> {
        let peripherals = self.peripherals.lock().expect("Failed to lock peripherals");
        peripherals.get(id).cloned().ok_or_else(|| TransportError::UnknownPeripheral(id.clone()))
    }

    fn clear(&self) {
        self.peripherals.lock().expect("Failed to lock peripherals").clear();
    }
}

struct BtleInner {
    manager: OnceCell<Manager>,
    adapter: tokio::sync::Mutex<Option<Adapter>>,
    peripherals: PeripheralCache<Peripheral>,
    allow_duplicates: AtomicBool,
}

/// Both adapters on top of btleplug, using the first bluetooth adapter the OS reports.
///
/// The radio power state comes from the adapter state; a machine without any adapter counts as
/// powered off.
#[derive(Clone)]
pub struct BtleBackend {
    inner: Arc<BtleInner>,
}

impl BtleBackend {
    pub fn new() -> Self {
        BtleBackend {
            inner: Arc::new(BtleInner {
                manager: OnceCell::new(),
                adapter: tokio::sync::Mutex::new(None),
                peripherals: PeripheralCache::new(),
                allow_duplicates: AtomicBool::new(true),
            }),
        }
    }

    async fn manager(&self) -> Result<&Manager, TransportError> {
        let manager = self.inner.manager.get_or_try_init(Manager::new).await?;
        Ok(manager)
    }

    async fn adapter(&self) -> Result<Adapter, TransportError> {
        let mut adapter = self.inner.adapter.lock().await;

        if adapter.is_none() {
            let found = self.manager().await?
                .adapters()
                .await?
                .into_iter()
                .next()
                .ok_or(TransportError::NoAdapter)?;

            info!("Using adapter {}", found.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
            *adapter = Some(found);
        }

        adapter.clone().ok_or(TransportError::NoAdapter)
    }

    fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral, TransportError> {
        self.inner.peripherals.get(id)
    }

    async fn query_radio_state(&self) -> Result<RadioState, TransportError> {
        let adapter = match self.adapter().await {
            Ok(adapter) => adapter,
            Err(TransportError::NoAdapter) => return Ok(RadioState::Off),
            Err(err) => return Err(err),
        };
        Ok(radio_state(adapter.adapter_state().await?))
    }
}

impl Default for BtleBackend {
    fn default() -> Self {
        BtleBackend::new()
    }
}

fn radio_state(state: CentralState) -> RadioState {
    match state {
        CentralState::PoweredOn => RadioState::On,
        CentralState::PoweredOff => RadioState::Off,
        CentralState::Unknown => RadioState::Unknown,
    }
}

// the platform id is the only identity that is stable on every OS (macOS hides the address)
fn peripheral_id(peripheral: &Peripheral) -> PeripheralId {
    PeripheralId::from(format!("{:?}", peripheral.id()))
}

async fn describe_peripheral(peripheral: &Peripheral) -> Option<PeripheralInfo> {
    let id = peripheral_id(peripheral);

    match peripheral.properties().await {
        Err(err) => {
            warn!("Could not query peripheral for properties: {:?}", err);
            None
        },
        Ok(None) => {
            debug!("Peripheral {} has no properties", id);
            Some(PeripheralInfo { id, name: None, rssi: None, services: Vec::new() })
        },
        Ok(Some(properties)) => Some(PeripheralInfo {
            id,
            name: properties.local_name,
            rssi: properties.rssi,
            services: properties.services,
        }),
    }
}

#[async_trait]
impl RadioAdapter for BtleBackend {
    // There is no permission prompt in btleplug; the OS asks on first use. Touching the manager
    // is what triggers that, and a refusal shows up as PermissionDenied.
    async fn request_permissions(&self, required: &[PermissionKind]) -> Result<Vec<(PermissionKind, PermissionStatus)>, TransportError> {
        let status = match self.query_radio_state().await {
            Ok(_) => PermissionStatus::Granted,
            Err(err) if err.is_permission_denied() => PermissionStatus::Denied,
            Err(err) => return Err(err),
        };

        Ok(required.iter().map(|kind| (*kind, status)).collect())
    }

    async fn radio_state(&self) -> Result<RadioState, TransportError> {
        self.query_radio_state().await
    }

    async fn watch_radio_state(&self) -> Result<EventSubscription<RadioState>, TransportError> {
        let adapter = self.adapter().await?;
        let mut events = adapter.events().await?;
        let (mut sender, receiver) = channel::<RadioState>(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        spawn(async move {
            'mainloop: loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        break 'mainloop;
                    },
                    event = events.next() => {
                        let state = match event {
                            None => break 'mainloop,
                            Some(CentralEvent::StateUpdate(state)) => radio_state(state),
                            Some(_) => continue 'mainloop,
                        };

                        debug!("Adapter state update: {:?}", state);
                        if sender.send(state).await.is_err() {
                            break 'mainloop;
                        }
                    },
                }
            }
            debug!("Radio state watcher stopped");
        });

        Ok(EventSubscription::new(receiver, cancel))
    }
}

#[async_trait]
impl PeripheralTransport for BtleBackend {
    async fn start(&self) -> Result<(), TransportError> {
        self.adapter().await?;
        Ok(())
    }

    async fn start_scan(&self, options: &ScanOptions) -> Result<(), TransportError> {
        let adapter = self.adapter().await?;
        self.inner.allow_duplicates.store(options.allow_duplicates, Ordering::Relaxed);

        let filter = ScanFilter {
            services: options.filters.clone(),
        };

        info!("Scanning for {:?}...", options.duration);
        adapter.start_scan(filter).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        let adapter = self.adapter().await?;
        adapter.stop_scan().await?;
        Ok(())
    }

    // Called once per scan session, before the scan starts; peripherals of earlier sessions are
    // forgotten here.
    async fn discoveries(&self) -> Result<EventSubscription<PeripheralInfo>, TransportError> {
        let adapter = self.adapter().await?;
        self.inner.peripherals.clear();
        let mut events = adapter.events().await?;
        let (mut sender, receiver) = channel::<PeripheralInfo>(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let backend = self.clone();

        spawn(async move {
            'mainloop: loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        break 'mainloop;
                    },
                    event = events.next() => {
                        let id = match event {
                            None => break 'mainloop,
                            Some(CentralEvent::DeviceDiscovered(id)) => id,
                            Some(CentralEvent::DeviceUpdated(id)) if backend.inner.allow_duplicates.load(Ordering::Relaxed) => id,
                            Some(_) => continue 'mainloop,
                        };

                        let peripheral = match adapter.peripheral(&id).await {
                            Ok(peripheral) => peripheral,
                            Err(err) => {
                                warn!("Failed to query BLE adapter for peripheral: {}", err);
                                continue 'mainloop;
                            },
                        };

                        let Some(info) = describe_peripheral(&peripheral).await else {
                            continue 'mainloop;
                        };

                        backend.inner.peripherals.insert(info.id.clone(), peripheral);

                        if sender.send(info).await.is_err() {
                            break 'mainloop;
                        }
                    },
                }
            }
            debug!("Discovery listener stopped");
        });

        Ok(EventSubscription::new(receiver, cancel))
    }

    async fn connect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        let peripheral = self.peripheral(id)?;
        info!("Connecting to peripheral {}...", id);
        peripheral.connect().await?;
        Ok(())
    }

    async fn retrieve_services(&self, id: &PeripheralId) -> Result<Vec<ServiceInfo>, TransportError> {
        let peripheral = self.peripheral(id)?;
        info!("Connected; Discovering services...");
        peripheral.discover_services().await?;

        let services = peripheral.services()
            .into_iter()
            .map(|service| ServiceInfo {
                uuid: service.uuid,
                primary: service.primary,
                characteristics: service.characteristics.iter().map(|characteristic| characteristic.uuid).collect(),
            })
            .collect();
        Ok(services)
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        let peripheral = self.peripheral(id)?;
        peripheral.disconnect().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_state_maps_to_radio_state() {
        assert_eq!(radio_state(CentralState::PoweredOn), RadioState::On);
        assert_eq!(radio_state(CentralState::PoweredOff), RadioState::Off);
        assert_eq!(radio_state(CentralState::Unknown), RadioState::Unknown);
    }

    #[test]
    fn test_peripheral_cache_forgets_earlier_sessions() {
        let cache = PeripheralCache::new();
        cache.insert("a".into(), 1u8);
        cache.insert("b".into(), 2u8);
        assert_eq!(cache.get(&"a".into()).unwrap(), 1);

        cache.clear();
        cache.insert("b".into(), 3u8);

        assert!(matches!(cache.get(&"a".into()), Err(TransportError::UnknownPeripheral(_))));
        assert_eq!(cache.get(&"b".into()).unwrap(), 3);
    }
}
