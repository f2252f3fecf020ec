//! In-memory adapters for the workflow tests. They record every call and keep the sending side of
//! each subscription so tests can push events and count live listeners.

use std::collections::HashSet;
use std::future::pending;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use async_trait::async_trait;
use futures::channel::mpsc::{channel, Sender};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::adapter::{EventSubscription, PeripheralTransport, RadioAdapter};
use crate::device::types::{
    PeripheralId, PeripheralInfo, PermissionKind, PermissionStatus, RadioState, ScanOptions, ServiceInfo,
};
use crate::error::TransportError;

const FAKE_BUFFER: usize = 16;

fn subscribe<E>(senders: &mut Vec<Sender<E>>) -> EventSubscription<E> {
    let (sender, receiver) = channel(FAKE_BUFFER);
    senders.push(sender);
    EventSubscription::new(receiver, CancellationToken::new())
}

fn publish<E: Clone>(senders: &mut Vec<Sender<E>>, event: E) {
    senders.retain(|sender| !sender.is_closed());
    for sender in senders.iter_mut() {
        sender.try_send(event.clone()).expect("fake subscription buffer is full");
    }
}

fn live<E>(senders: &[Sender<E>]) -> usize {
    senders.iter().filter(|sender| !sender.is_closed()).count()
}

struct RadioInner {
    state: RadioState,
    deny_permissions: bool,
    permission_requests: usize,
    watchers: Vec<Sender<RadioState>>,
}

#[derive(Clone)]
pub struct FakeRadio {
    inner: Arc<Mutex<RadioInner>>,
}

impl FakeRadio {
    pub fn new(state: RadioState) -> Self {
        FakeRadio {
            inner: Arc::new(Mutex::new(RadioInner {
                state,
                deny_permissions: false,
                permission_requests: 0,
                watchers: Vec::new(),
            })),
        }
    }

    pub fn deny_permissions(&self) {
        self.inner.lock().unwrap().deny_permissions = true;
    }

    /// Change the radio state and notify the watchers.
    pub fn set_radio_state(&self, state: RadioState) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = state;
        publish(&mut inner.watchers, state);
    }

    /// Change the radio state without the watchers noticing (yet).
    pub fn set_radio_state_silently(&self, state: RadioState) {
        self.inner.lock().unwrap().state = state;
    }

    pub fn active_watchers(&self) -> usize {
        live(&self.inner.lock().unwrap().watchers)
    }

    pub fn permission_requests(&self) -> usize {
        self.inner.lock().unwrap().permission_requests
    }
}

#[async_trait]
impl RadioAdapter for FakeRadio {
    async fn request_permissions(&self, required: &[PermissionKind]) -> Result<Vec<(PermissionKind, PermissionStatus)>, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.permission_requests += 1;
        let status = if inner.deny_permissions { PermissionStatus::Denied } else { PermissionStatus::Granted };
        Ok(required.iter().map(|kind| (*kind, status)).collect())
    }

    async fn radio_state(&self) -> Result<RadioState, TransportError> {
        Ok(self.inner.lock().unwrap().state)
    }

    async fn watch_radio_state(&self) -> Result<EventSubscription<RadioState>, TransportError> {
        Ok(subscribe(&mut self.inner.lock().unwrap().watchers))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Start,
    StartScan,
    StopScan,
    Connect(PeripheralId),
    RetrieveServices(PeripheralId),
    Disconnect(PeripheralId),
}

#[derive(Default)]
struct TransportInner {
    calls: Vec<TransportCall>,
    listeners: Vec<Sender<PeripheralInfo>>,
    deny_start: bool,
    fail_scan: bool,
    scan_delay: Option<Duration>,
    fail_connect: HashSet<PeripheralId>,
    hang_connect: HashSet<PeripheralId>,
    fail_services: HashSet<PeripheralId>,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    inner: Arc<Mutex<TransportInner>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport::default()
    }

    pub fn deny_start(&self) {
        self.inner.lock().unwrap().deny_start = true;
    }

    pub fn fail_scan(&self) {
        self.inner.lock().unwrap().fail_scan = true;
    }

    /// Starting a scan takes this long.
    pub fn delay_scan(&self, delay: Duration) {
        self.inner.lock().unwrap().scan_delay = Some(delay);
    }

    pub fn fail_connect(&self, id: &str) {
        self.inner.lock().unwrap().fail_connect.insert(id.into());
    }

    /// Connecting to this peripheral never completes.
    pub fn hang_connect(&self, id: &str) {
        self.inner.lock().unwrap().hang_connect.insert(id.into());
    }

    pub fn fail_services(&self, id: &str) {
        self.inner.lock().unwrap().fail_services.insert(id.into());
    }

    /// Deliver a discovery event to every live listener.
    pub fn discover(&self, peripheral: PeripheralInfo) {
        publish(&mut self.inner.lock().unwrap().listeners, peripheral);
    }

    pub fn active_discovery_subscriptions(&self) -> usize {
        live(&self.inner.lock().unwrap().listeners)
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.inner.lock().unwrap().calls.iter().filter(|&call| predicate(call)).count()
    }

    fn record(&self, call: TransportCall) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

fn rejected() -> TransportError {
    TransportError::Btle { source: btleplug::Error::TimedOut(Duration::from_secs(5)) }
}

#[async_trait]
impl PeripheralTransport for FakeTransport {
    async fn start(&self) -> Result<(), TransportError> {
        if self.inner.lock().unwrap().deny_start {
            return Err(TransportError::Btle { source: btleplug::Error::PermissionDenied });
        }
        self.record(TransportCall::Start);
        Ok(())
    }

    async fn start_scan(&self, _options: &ScanOptions) -> Result<(), TransportError> {
        let delay = self.inner.lock().unwrap().scan_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.inner.lock().unwrap().fail_scan {
            return Err(rejected());
        }
        self.record(TransportCall::StartScan);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), TransportError> {
        self.record(TransportCall::StopScan);
        Ok(())
    }

    async fn discoveries(&self) -> Result<EventSubscription<PeripheralInfo>, TransportError> {
        Ok(subscribe(&mut self.inner.lock().unwrap().listeners))
    }

    async fn connect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        self.record(TransportCall::Connect(id.clone()));
        let (fail, hang) = {
            let inner = self.inner.lock().unwrap();
            (inner.fail_connect.contains(id), inner.hang_connect.contains(id))
        };
        if hang {
            pending::<()>().await;
        }
        if fail {
            return Err(rejected());
        }
        Ok(())
    }

    async fn retrieve_services(&self, id: &PeripheralId) -> Result<Vec<ServiceInfo>, TransportError> {
        self.record(TransportCall::RetrieveServices(id.clone()));
        if self.inner.lock().unwrap().fail_services.contains(id) {
            return Err(rejected());
        }
        Ok(vec![ServiceInfo {
            uuid: Uuid::from_u128(0x0000180a_0000_1000_8000_00805f9b34fb),
            primary: true,
            characteristics: Vec::new(),
        }])
    }

    async fn disconnect(&self, id: &PeripheralId) -> Result<(), TransportError> {
        self.record(TransportCall::Disconnect(id.clone()));
        Ok(())
    }
}
