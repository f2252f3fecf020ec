//! Pairing state transitions.
//!
//! `transition` is a pure function of the current state and an input. It returns `None` when the
//! input is not valid in that state, in which case the caller must leave everything as it is.

use std::fmt;

use crate::device::types::{PairedDevice, PeripheralId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    RequestingPermissions,
    RadioOff,
    Scanning,
    DeviceListed,
    Connecting { peripheral: PeripheralId },
    Connected { device: PairedDevice },
    Error(String),
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "idle"),
            ConnectionState::RequestingPermissions => write!(f, "requesting permissions"),
            ConnectionState::RadioOff => write!(f, "radio off"),
            ConnectionState::Scanning => write!(f, "scanning"),
            ConnectionState::DeviceListed => write!(f, "listing devices"),
            ConnectionState::Connecting { peripheral } => write!(f, "connecting to {}", peripheral),
            ConnectionState::Connected { device } => write!(f, "connected to {}", device.id()),
            ConnectionState::Error(message) => write!(f, "error ({})", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Initialize,
    PermissionsGranted,
    PermissionsDenied,
    RadioOn,
    RadioOff,
    ScanStarted,
    ScanExpired { found: usize },
    ScanFailed,
    Select(PeripheralId),
    ConnectFailed,
    Connected(PairedDevice),
    Release,
    TearDown,
    Fail(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    StartDiscovery,
    /// Stop the running scan, its timer and its discovery subscription.
    CancelDiscovery,
    Disconnect(PeripheralId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConnectionState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: ConnectionState) -> Self {
        Transition { next, effects: Vec::new() }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

// The peripheral that has to be disconnected when leaving this state.
fn held_peripheral(state: &ConnectionState) -> Option<PeripheralId> {
    match state {
        ConnectionState::Connecting { peripheral } => Some(peripheral.clone()),
        ConnectionState::Connected { device } => Some(device.id().clone()),
        _ => None,
    }
}

pub fn transition(state: &ConnectionState, input: Input) -> Option<Transition> {
    use ConnectionState as S;

    match (state, input) {
        (S::Idle | S::RadioOff | S::Error(_), Input::Initialize) => {
            Some(Transition::to(S::RequestingPermissions))
        },
        (S::RequestingPermissions, Input::PermissionsGranted) => Some(Transition::to(S::Idle)),
        (S::RequestingPermissions | S::Idle, Input::PermissionsDenied) => {
            Some(Transition::to(S::Error(crate::device::constants::PERMISSIONS_DENIED_ERROR.to_string())))
        },

        // power-on only starts a scan from a resting state, repeated callbacks are ignored
        (S::Idle | S::RadioOff, Input::RadioOn) => {
            Some(Transition::to(S::Idle).with(Effect::StartDiscovery))
        },
        (S::Idle | S::DeviceListed | S::RequestingPermissions, Input::RadioOff) => {
            Some(Transition::to(S::RadioOff))
        },
        (S::Scanning, Input::RadioOff) => {
            Some(Transition::to(S::RadioOff).with(Effect::CancelDiscovery))
        },
        (S::Connecting { .. } | S::Connected { .. }, Input::RadioOff) => {
            let mut transition = Transition::to(S::RadioOff);
            if let Some(peripheral) = held_peripheral(state) {
                transition = transition.with(Effect::Disconnect(peripheral));
            }
            Some(transition)
        },

        (S::Idle | S::DeviceListed | S::Scanning | S::Error(_), Input::ScanStarted) => {
            Some(Transition::to(S::Scanning))
        },
        (S::Scanning, Input::ScanExpired { found }) => {
            let next = if found == 0 { S::Idle } else { S::DeviceListed };
            Some(Transition::to(next).with(Effect::CancelDiscovery))
        },
        (S::Idle | S::DeviceListed | S::Scanning, Input::ScanFailed) => {
            Some(Transition::to(S::Idle).with(Effect::CancelDiscovery))
        },

        (S::DeviceListed, Input::Select(peripheral)) => {
            Some(Transition::to(S::Connecting { peripheral }))
        },
        (S::Scanning, Input::Select(peripheral)) => {
            Some(Transition::to(S::Connecting { peripheral }).with(Effect::CancelDiscovery))
        },
        (S::Connecting { .. }, Input::ConnectFailed) => Some(Transition::to(S::DeviceListed)),
        (S::Connecting { peripheral }, Input::Connected(device)) if device.id() == peripheral => {
            Some(Transition::to(S::Connected { device }))
        },
        (S::Connected { device }, Input::Release) => {
            Some(Transition::to(S::DeviceListed).with(Effect::Disconnect(device.id().clone())))
        },

        (_, Input::TearDown) => {
            let mut transition = Transition::to(S::Idle).with(Effect::CancelDiscovery);
            if let Some(peripheral) = held_peripheral(state) {
                transition = transition.with(Effect::Disconnect(peripheral));
            }
            Some(transition)
        },
        (_, Input::Fail(message)) => {
            let mut transition = Transition::to(S::Error(message)).with(Effect::CancelDiscovery);
            if let Some(peripheral) = held_peripheral(state) {
                transition = transition.with(Effect::Disconnect(peripheral));
            }
            Some(transition)
        },

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::device::types::PeripheralInfo;
    use super::*;

    fn paired(id: &str) -> PairedDevice {
        PairedDevice {
            peripheral: PeripheralInfo::new(id, Some("Frame")),
            services: Vec::new(),
        }
    }

    #[test]
    fn test_radio_on_only_starts_discovery_when_resting() {
        for state in [ConnectionState::Idle, ConnectionState::RadioOff] {
            let transition = transition(&state, Input::RadioOn).unwrap();
            assert_eq!(transition.effects, vec![Effect::StartDiscovery]);
        }

        let busy = [
            ConnectionState::Scanning,
            ConnectionState::DeviceListed,
            ConnectionState::Connecting { peripheral: "a".into() },
            ConnectionState::Connected { device: paired("a") },
            ConnectionState::RequestingPermissions,
        ];
        for state in busy {
            assert_eq!(transition(&state, Input::RadioOn), None, "{}", state);
        }
    }

    #[test]
    fn test_scan_expiry() {
        let empty = transition(&ConnectionState::Scanning, Input::ScanExpired { found: 0 }).unwrap();
        assert_eq!(empty.next, ConnectionState::Idle);
        assert_eq!(empty.effects, vec![Effect::CancelDiscovery]);

        let found = transition(&ConnectionState::Scanning, Input::ScanExpired { found: 2 }).unwrap();
        assert_eq!(found.next, ConnectionState::DeviceListed);

        assert_eq!(transition(&ConnectionState::DeviceListed, Input::ScanExpired { found: 2 }), None);
    }

    #[test]
    fn test_single_connecting_attempt() {
        let connecting = ConnectionState::Connecting { peripheral: "a".into() };
        assert_eq!(transition(&connecting, Input::Select("b".into())), None);

        let from_scan = transition(&ConnectionState::Scanning, Input::Select("a".into())).unwrap();
        assert_eq!(from_scan.next, connecting);
        assert_eq!(from_scan.effects, vec![Effect::CancelDiscovery]);
    }

    #[test]
    fn test_connected_must_match_target() {
        let connecting = ConnectionState::Connecting { peripheral: "a".into() };
        assert_eq!(transition(&connecting, Input::Connected(paired("b"))), None);

        let transition = transition(&connecting, Input::Connected(paired("a"))).unwrap();
        assert_eq!(transition.next, ConnectionState::Connected { device: paired("a") });
    }

    #[test]
    fn test_teardown_releases_held_peripheral() {
        let states = [
            (ConnectionState::Scanning, vec![Effect::CancelDiscovery]),
            (
                ConnectionState::Connecting { peripheral: "a".into() },
                vec![Effect::CancelDiscovery, Effect::Disconnect("a".into())],
            ),
            (
                ConnectionState::Connected { device: paired("b") },
                vec![Effect::CancelDiscovery, Effect::Disconnect("b".into())],
            ),
        ];

        for (state, effects) in states {
            let transition = transition(&state, Input::TearDown).unwrap();
            assert_eq!(transition.next, ConnectionState::Idle);
            assert_eq!(transition.effects, effects);
        }
    }

    #[test]
    fn test_permission_denial_is_an_error_state() {
        let transition = transition(&ConnectionState::RequestingPermissions, Input::PermissionsDenied).unwrap();
        assert_eq!(transition.next, ConnectionState::Error("permissions denied".to_string()));
        assert!(transition.effects.is_empty());
    }

    #[test]
    fn test_release_disconnects() {
        let transition = transition(&ConnectionState::Connected { device: paired("a") }, Input::Release).unwrap();
        assert_eq!(transition.next, ConnectionState::DeviceListed);
        assert_eq!(transition.effects, vec![Effect::Disconnect("a".into())]);
    }
}
