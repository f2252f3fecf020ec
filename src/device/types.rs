use std::fmt;
use std::time::Duration;
use futures::channel::mpsc::Sender;
use uuid::Uuid;

use crate::device::constants::UNKNOWN_DEVICE_NAME;

/// Opaque transport address of a peripheral, as reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PeripheralId {
    fn from(value: String) -> Self {
        PeripheralId(value)
    }
}

impl From<&str> for PeripheralId {
    fn from(value: &str) -> Self {
        PeripheralId(value.to_string())
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralInfo {
    pub id: PeripheralId,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub services: Vec<Uuid>,
}

impl PeripheralInfo {
    pub fn new(id: impl Into<PeripheralId>, name: Option<&str>) -> Self {
        PeripheralInfo {
            id: id.into(),
            name: name.map(str::to_string),
            rssi: None,
            services: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_DEVICE_NAME)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub primary: bool,
    pub characteristics: Vec<Uuid>,
}

/// A connected peripheral together with the services it exposes. Only produced by a successful
/// connect + service retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedDevice {
    pub peripheral: PeripheralInfo,
    pub services: Vec<ServiceInfo>,
}

impl PairedDevice {
    pub fn id(&self) -> &PeripheralId {
        &self.peripheral.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    On,
    Off,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionKind {
    FineLocation,
    BluetoothScan,
    BluetoothConnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Only report peripherals advertising one of these services. Empty means no filter.
    pub filters: Vec<Uuid>,
    pub duration: Duration,
    /// Report a peripheral again every time it advertises, instead of only once.
    pub allow_duplicates: bool,
}

/// A message the user has to acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Notice { title: title.into(), message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingCommand {
    Rescan,
    Select(PeripheralId),
    ConfirmUse,
    Release,
    Teardown,
}

#[derive(Debug, Clone)]
pub enum PairingEvent {
    /// The workflow is running and accepts commands on this sender.
    Ready(Sender<PairingCommand>),
    StateChanged(crate::device::machine::ConnectionState),
    StatusChanged(String),
    DevicesChanged(Vec<PeripheralInfo>),
    Alert(Notice),
    Paired(PairedDevice),
}

impl PartialEq for PairingEvent {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PairingEvent::Ready(a), PairingEvent::Ready(b)) => a.same_receiver(b),
            (PairingEvent::StateChanged(a), PairingEvent::StateChanged(b)) => a == b,
            (PairingEvent::StatusChanged(a), PairingEvent::StatusChanged(b)) => a == b,
            (PairingEvent::DevicesChanged(a), PairingEvent::DevicesChanged(b)) => a == b,
            (PairingEvent::Alert(a), PairingEvent::Alert(b)) => a == b,
            (PairingEvent::Paired(a), PairingEvent::Paired(b)) => a == b,
            _ => false,
        }
    }
}
