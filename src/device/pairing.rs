use std::future::pending;
use std::pin::Pin;
use futures::SinkExt;
use futures::channel::mpsc::Sender;
use indexmap::IndexMap;
use log::{debug, info, warn};
use tokio::time::{sleep, Sleep};

use crate::device::adapter::{EventSubscription, PeripheralTransport, RadioAdapter};
use crate::device::constants::*;
use crate::device::machine::{transition, ConnectionState, Effect, Input};
use crate::device::platform::{PermissionGate, Platform};
use crate::device::types::{
    Notice, PairedDevice, PairingCommand, PairingEvent, PeripheralId, PeripheralInfo, PermissionStatus, RadioState,
    ScanOptions,
};
use crate::error::{PairingError, TransportError};

#[derive(Debug, Clone)]
pub struct PairingOptions {
    pub platform: Platform,
    pub scan: ScanOptions,
}

/// Something that woke up the workflow while it was waiting.
#[derive(Debug)]
pub enum Wake {
    ScanExpired,
    Discovered(PeripheralInfo),
    Radio(RadioState),
}

/// Drives permission negotiation, radio gating, timed discovery, device selection and connecting.
///
/// All state lives here and is only changed by the workflow's own operations. Background activity
/// (scan timer, discovery events, radio changes) is picked up by `next_wake` and handled by
/// `handle_wake`.
pub struct PairingWorkflow<R: RadioAdapter, T: PeripheralTransport> {
    radio: R,
    transport: T,
    options: PairingOptions,

    state: ConnectionState,
    status: String,
    discovered: IndexMap<PeripheralId, PeripheralInfo>,
    paired: bool,
    transport_started: bool,

    scan_timer: Option<Pin<Box<Sleep>>>,
    discovery: Option<EventSubscription<PeripheralInfo>>,
    radio_watch: Option<EventSubscription<RadioState>>,

    listeners: Vec<Sender<PairingEvent>>,
}

async fn sleep_or_pending(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

async fn next_or_pending<E>(subscription: &mut Option<EventSubscription<E>>) -> E {
    if let Some(subscription) = subscription {
        if let Some(event) = subscription.next().await {
            return event;
        }
    }
    pending().await
}

impl<R: RadioAdapter, T: PeripheralTransport> PairingWorkflow<R, T> {
    pub fn new(radio: R, transport: T, options: PairingOptions) -> Self {
        PairingWorkflow {
            radio,
            transport,
            options,
            state: ConnectionState::Idle,
            status: String::new(),
            discovered: IndexMap::new(),
            paired: false,
            transport_started: false,
            scan_timer: None,
            discovery: None,
            radio_watch: None,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Sender<PairingEvent>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// The Discovery Set in first-seen order.
    pub fn devices(&self) -> Vec<PeripheralInfo> {
        self.discovered.values().cloned().collect()
    }

    pub fn paired_device(&self) -> Option<&PairedDevice> {
        match &self.state {
            ConnectionState::Connected { device } => Some(device),
            _ => None,
        }
    }

    pub fn is_paired(&self) -> bool {
        self.paired
    }

    pub fn pending_timers(&self) -> usize {
        usize::from(self.scan_timer.is_some())
    }

    pub fn active_subscriptions(&self) -> usize {
        [
            self.discovery.as_ref().map(EventSubscription::is_active),
            self.radio_watch.as_ref().map(EventSubscription::is_active),
        ]
            .into_iter()
            .filter(|active| *active == Some(true))
            .count()
    }

    /// True while something in the background can still wake the workflow up.
    pub fn is_waiting(&self) -> bool {
        self.scan_timer.is_some() || self.active_subscriptions() > 0
    }

    async fn emit(&mut self, event: PairingEvent) {
        for listener in &mut self.listeners {
            if let Err(err) = listener.send(event.clone()).await {
                debug!("Pairing listener is gone: {}", err);
            }
        }
    }

    async fn set_status(&mut self, status: impl Into<String>) {
        let status = status.into();
        info!("{}", status);
        self.status = status.clone();
        self.emit(PairingEvent::StatusChanged(status)).await;
    }

    async fn alert(&mut self, title: &str, message: &str) {
        warn!("{}: {}", title, message);
        self.emit(PairingEvent::Alert(Notice::new(title, message))).await;
    }

    async fn emit_devices(&mut self) {
        let devices = self.devices();
        self.emit(PairingEvent::DevicesChanged(devices)).await;
    }

    /// Apply an input to the state machine and run the resulting effects. Returns whether a
    /// discovery should be started; the callers do that themselves.
    async fn advance(&mut self, operation: &'static str, input: Input) -> Result<bool, PairingError> {
        let Some(transition) = transition(&self.state, input) else {
            return Err(PairingError::InvalidState { operation, state: self.state.to_string() });
        };

        if transition.next != self.state {
            debug!("Pairing state {} -> {}", self.state, transition.next);
            self.state = transition.next;
            self.emit(PairingEvent::StateChanged(self.state.clone())).await;
        }

        let mut start_discovery = false;
        for effect in transition.effects {
            match effect {
                Effect::StartDiscovery => start_discovery = true,
                Effect::CancelDiscovery => self.cancel_discovery().await,
                Effect::Disconnect(id) => self.disconnect(&id).await,
            }
        }
        Ok(start_discovery)
    }

    async fn disconnect(&mut self, id: &PeripheralId) {
        info!("Disconnecting from peripheral {}", id);
        if let Err(err) = self.transport.disconnect(id).await {
            warn!("Failed to disconnect from peripheral {}: {}", id, err);
        }
        self.paired = false;
    }

    /// Clears the scan timer, removes the discovery listener and stops a running scan.
    async fn cancel_discovery(&mut self) {
        let had_timer = self.scan_timer.take().is_some();
        let had_listener = self.discovery.as_mut().map(EventSubscription::unsubscribe).unwrap_or(false);
        self.discovery = None;

        if had_timer || had_listener {
            debug!("Stopping scan");
            if let Err(err) = self.transport.stop_scan().await {
                warn!("Failed to stop scanning: {}", err);
            }
        }
    }

    /// Acquire permissions, start the transport and start discovering if the radio is on. If it is
    /// off, discovery starts as soon as it is turned on.
    pub async fn initialize(&mut self) -> Result<(), PairingError> {
        self.advance("initialize", Input::Initialize).await?;

        match self.options.platform.permission_gate() {
            PermissionGate::Request(required) => {
                self.set_status(STATUS_REQUESTING_PERMISSIONS).await;

                let statuses = match self.radio.request_permissions(&required).await {
                    Ok(statuses) => statuses,
                    Err(err) => {
                        warn!("Failed to request permissions: {}", err);
                        Vec::new()
                    },
                };
                debug!("Permission statuses: {:?}", statuses);

                let all_granted = required.iter().all(|kind| {
                    statuses.iter().any(|(granted_kind, status)| {
                        granted_kind == kind && *status == PermissionStatus::Granted
                    })
                });

                if !all_granted {
                    return self.deny_permissions().await;
                }
                self.set_status(STATUS_PERMISSIONS_GRANTED).await;
            },
            PermissionGate::NotRequired => {
                self.set_status(STATUS_PERMISSIONS_NOT_REQUIRED).await;
            },
            PermissionGate::NotApplicable => {},
        }
        self.advance("initialize", Input::PermissionsGranted).await?;

        if !self.transport_started {
            if let Err(err) = self.transport.start().await {
                warn!("Failed to start bluetooth transport: {}", err);

                if err.is_permission_denied() {
                    return self.deny_permissions().await;
                }

                self.set_status(STATUS_TRANSPORT_START_FAILED).await;
                self.advance("initialize", Input::Fail(STATUS_TRANSPORT_START_FAILED.to_string())).await?;
                return Err(PairingError::RadioUnavailable { source: Some(err) });
            }
            self.transport_started = true;
        }

        if self.radio_watch.is_none() {
            match self.radio.watch_radio_state().await {
                Ok(subscription) => self.radio_watch = Some(subscription),
                Err(err) => warn!("Failed to observe bluetooth state: {}", err),
            }
        }

        match self.radio.radio_state().await {
            Ok(RadioState::On) => {
                self.set_status(STATUS_RADIO_ON).await;
                if self.advance("initialize", Input::RadioOn).await? {
                    self.start_discovery().await?;
                }
                Ok(())
            },
            Ok(_) => {
                self.set_status(STATUS_RADIO_OFF).await;
                self.advance("initialize", Input::RadioOff).await?;
                Ok(())
            },
            Err(err) => {
                warn!("Error checking bluetooth state: {}", err);
                self.set_status(STATUS_RADIO_CHECK_FAILED).await;
                self.advance("initialize", Input::Fail(STATUS_RADIO_CHECK_FAILED.to_string())).await?;
                Err(PairingError::RadioUnavailable { source: Some(err) })
            },
        }
    }

    async fn deny_permissions(&mut self) -> Result<(), PairingError> {
        self.alert(ALERT_PERMISSION_DENIED_TITLE, ALERT_PERMISSION_DENIED_MESSAGE).await;
        self.set_status(STATUS_PERMISSIONS_DENIED).await;
        self.advance("initialize", Input::PermissionsDenied).await?;
        Err(PairingError::PermissionDenied)
    }

    /// Start a bounded scan session. Any previous session is cancelled first.
    pub async fn start_discovery(&mut self) -> Result<(), PairingError> {
        match self.radio.radio_state().await {
            Ok(RadioState::On) => {},
            other => {
                if let Err(err) = &other {
                    warn!("Error checking bluetooth state: {}", err);
                }
                self.set_status(STATUS_RADIO_OFF).await;
                if transition(&self.state, Input::RadioOff).is_some() {
                    self.advance("start discovery", Input::RadioOff).await?;
                }
                return Err(PairingError::RadioUnavailable { source: other.err() });
            },
        }

        self.advance("start discovery", Input::ScanStarted).await?;
        self.cancel_discovery().await;

        self.discovered.clear();
        self.emit_devices().await;
        self.set_status(STATUS_SCAN_STARTING).await;

        let subscription = match self.transport.discoveries().await {
            Ok(subscription) => subscription,
            Err(source) => return self.fail_scan(source).await,
        };
        self.discovery = Some(subscription);

        if let Err(source) = self.transport.start_scan(&self.options.scan).await {
            return self.fail_scan(source).await;
        }
        self.scan_timer = Some(Box::pin(sleep(self.options.scan.duration)));
        self.set_status(STATUS_SCANNING).await;
        Ok(())
    }

    async fn fail_scan(&mut self, source: TransportError) -> Result<(), PairingError> {
        warn!("Error during scan: {}", source);
        self.set_status(STATUS_SCAN_FAILED).await;
        self.advance("start discovery", Input::ScanFailed).await?;
        Err(PairingError::ScanFailure { source })
    }

    /// Cancel the running scan session (if any) and start a new one.
    pub async fn rescan(&mut self) -> Result<(), PairingError> {
        if !self.transport_started {
            return self.initialize().await;
        }

        match self.state {
            ConnectionState::Idle | ConnectionState::DeviceListed | ConnectionState::Scanning | ConnectionState::Error(_) => {},
            _ => return Err(PairingError::InvalidState { operation: "rescan", state: self.state.to_string() }),
        }

        self.cancel_discovery().await;
        self.start_discovery().await
    }

    /// Connect to a discovered peripheral and retrieve its services, in that order.
    pub async fn select_device(&mut self, id: &PeripheralId) -> Result<(), PairingError> {
        let Some(peripheral) = self.discovered.get(id).cloned() else {
            return Err(PairingError::UnknownPeripheral(id.clone()));
        };

        self.advance("select a device", Input::Select(id.clone())).await?;
        self.set_status(format!("Connecting to {}...", peripheral.display_name())).await;

        if let Err(source) = self.transport.connect(id).await {
            warn!("Error connecting to device {}: {}", id, source);
            self.set_status(STATUS_CONNECT_FAILED).await;
            self.advance("select a device", Input::ConnectFailed).await?;
            return Err(PairingError::ConnectFailure { source });
        }
        self.set_status(format!("Connected to {}", peripheral.display_name())).await;

        let services = match self.transport.retrieve_services(id).await {
            Ok(services) => services,
            Err(source) => {
                warn!("Error retrieving services of device {}: {}", id, source);
                self.disconnect(id).await;
                self.set_status(STATUS_CONNECT_FAILED).await;
                self.advance("select a device", Input::ConnectFailed).await?;
                return Err(PairingError::ServiceRetrievalFailure { source });
            },
        };

        info!("Peripheral {} ready with {} services", id, services.len());
        let device = PairedDevice { peripheral, services };
        self.advance("select a device", Input::Connected(device)).await?;
        Ok(())
    }

    /// Hand the connected device over to the camera screen.
    pub async fn confirm_use(&mut self) -> Result<PairedDevice, PairingError> {
        let Some(device) = self.paired_device().cloned() else {
            self.alert(ALERT_NO_DEVICE_TITLE, ALERT_NO_DEVICE_MESSAGE).await;
            return Err(PairingError::NoDeviceSelected);
        };

        let message = format!("Using device: {}", device.peripheral.display_name());
        self.alert(ALERT_DEVICE_IN_USE_TITLE, &message).await;
        self.paired = true;
        self.emit(PairingEvent::Paired(device.clone())).await;
        Ok(device)
    }

    /// Give up the paired device, back to the device list.
    pub async fn release(&mut self) -> Result<(), PairingError> {
        self.advance("release the device", Input::Release).await?;
        self.emit_devices().await;
        Ok(())
    }

    /// Disconnect, clear the timer and drop every subscription. Safe to call from any state and
    /// more than once.
    pub async fn teardown(&mut self) {
        if let Err(err) = self.advance("tear down", Input::TearDown).await {
            warn!("Teardown: {}", err);
        }
        self.cancel_discovery().await;
        if let Some(mut radio_watch) = self.radio_watch.take() {
            radio_watch.unsubscribe();
        }
        self.paired = false;
    }

    pub async fn handle(&mut self, command: PairingCommand) -> Result<(), PairingError> {
        match command {
            PairingCommand::Rescan => self.rescan().await,
            PairingCommand::Select(id) => self.select_device(&id).await,
            PairingCommand::ConfirmUse => self.confirm_use().await.map(|_| ()),
            PairingCommand::Release => self.release().await,
            PairingCommand::Teardown => {
                self.teardown().await;
                Ok(())
            },
        }
    }

    /// Wait for the next background event (scan timeout, discovered peripheral or radio change)
    /// and handle it. Returns false immediately if nothing is pending.
    pub async fn process_next(&mut self) -> Result<bool, PairingError> {
        if !self.is_waiting() {
            return Ok(false);
        }

        let wake = self.next_wake().await;
        self.handle_wake(wake).await?;
        Ok(true)
    }

    /// Wait for the next background event without handling it. Cancel safe: dropping the future
    /// loses nothing, the timer and both subscriptions stay where they are. Never resolves while
    /// `is_waiting` is false.
    pub async fn next_wake(&mut self) -> Wake {
        let PairingWorkflow { scan_timer, discovery, radio_watch, .. } = self;
        tokio::select! {
            _ = sleep_or_pending(scan_timer) => Wake::ScanExpired,
            peripheral = next_or_pending(discovery) => Wake::Discovered(peripheral),
            radio_state = next_or_pending(radio_watch) => Wake::Radio(radio_state),
        }
    }

    /// Handle a background event. Not cancel safe; must run to completion.
    pub async fn handle_wake(&mut self, wake: Wake) -> Result<(), PairingError> {
        match wake {
            Wake::ScanExpired => self.on_scan_expired().await,
            Wake::Discovered(peripheral) => {
                self.on_discovered(peripheral).await;
                Ok(())
            },
            Wake::Radio(radio_state) => self.on_radio_state(radio_state).await,
        }
    }

    async fn on_scan_expired(&mut self) -> Result<(), PairingError> {
        self.scan_timer = None;
        let found = self.discovered.len();
        info!("Scan session ended with {} devices", found);
        self.advance("finish the scan", Input::ScanExpired { found }).await?;
        self.set_status(STATUS_SCAN_COMPLETED).await;
        Ok(())
    }

    async fn on_discovered(&mut self, peripheral: PeripheralInfo) {
        if self.state != ConnectionState::Scanning || self.discovered.contains_key(&peripheral.id) {
            return;
        }

        debug!("Discovered peripheral {} ({})", peripheral.id, peripheral.display_name());
        self.discovered.insert(peripheral.id.clone(), peripheral);
        self.emit_devices().await;
    }

    async fn on_radio_state(&mut self, radio_state: RadioState) -> Result<(), PairingError> {
        info!("Bluetooth state changed to {:?}", radio_state);

        match radio_state {
            RadioState::On => {
                self.set_status(STATUS_RADIO_ON).await;
                // only valid from a resting state, so a repeated callback can not start a second scan
                if transition(&self.state, Input::RadioOn).is_some() && self.advance("power on", Input::RadioOn).await? {
                    self.start_discovery().await?;
                }
            },
            RadioState::Off | RadioState::Unknown => {
                self.set_status(STATUS_RADIO_OFF).await;
                if transition(&self.state, Input::RadioOff).is_some() {
                    self.advance("power off", Input::RadioOff).await?;
                }
            },
        }
        Ok(())
    }
}
