use iced::Event;

use crate::config::types::Config;
use crate::device::machine::ConnectionState;
use crate::device::types::{PairedDevice, PairingEvent, PeripheralId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Welcome,
    Pairing,
    CardAssistant,
}

/// Desktop platforms have no camera permission prompt, so access is never refused; it is only
/// granted once the card assistant screen has opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraAccess {
    Pending,
    Granted,
}

impl CameraAccess {
    pub fn caption(&self, device: Option<&PairedDevice>) -> String {
        match (self, device) {
            (CameraAccess::Granted, Some(device)) => format!("Camera: {}", device.peripheral.display_name()),
            _ => "Loading...".to_string(),
        }
    }
}

/// Devices in the list can only be picked while the workflow is not busy.
pub fn can_select_device(state: &ConnectionState) -> bool {
    matches!(state, ConnectionState::Idle | ConnectionState::DeviceListed | ConnectionState::Error(_))
}

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    ConfigLoadComplete((Config, Option<String>)),
    WelcomeElapsed(()),
    Pairing(PairingEvent),
    CommandSent(()),
    Rescan,
    SelectDevice(PeripheralId),
    UseDevice,
    NoticeConfirmed,
    ExitConfirmed(bool), // true if the user wants to exit
    CameraReady(()),
}

/// What the hardware back key (Escape) does on each screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackAction {
    Ignore,
    ConfirmExit,
    ReleaseDevice,
}

impl BackAction {
    pub fn for_screen(screen: Screen) -> BackAction {
        match screen {
            Screen::Welcome => BackAction::Ignore,
            Screen::Pairing => BackAction::ConfirmExit,
            Screen::CardAssistant => BackAction::ReleaseDevice,
        }
    }
}
