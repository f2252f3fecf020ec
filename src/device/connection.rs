use std::convert::Infallible;
use std::future::pending;
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::{channel, Receiver, Sender};
use iced::subscription::{self, Subscription};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::device::adapter::{PeripheralTransport, RadioAdapter};
use crate::device::btle::BtleBackend;
use crate::device::constants::EVENT_BUFFER;
use crate::device::pairing::{PairingOptions, PairingWorkflow, Wake};
use crate::device::types::{PairingCommand, PairingEvent};

enum Step {
    Wake(Wake),
    Command(Option<PairingCommand>),
}

/// Run the workflow until `cancel` fires, the command channel closes or a Teardown command
/// arrives. Every exit path tears the workflow down.
pub async fn drive<R: RadioAdapter, T: PeripheralTransport>(
    mut workflow: PairingWorkflow<R, T>,
    mut commands: Receiver<PairingCommand>,
    cancel: CancellationToken,
) -> PairingWorkflow<R, T> {
    if let Err(err) = workflow.initialize().await {
        warn!("Pairing could not start: {}", err);
    }

    'mainloop: loop {
        // only the wait is raced; a wake-up is handled to completion so that a scan session that
        // has started always gets its timer
        let step = tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            command = commands.next() => Step::Command(command),
            wake = workflow.next_wake(), if workflow.is_waiting() => Step::Wake(wake),
        };

        let command = match step {
            Step::Wake(wake) => {
                if let Err(err) = workflow.handle_wake(wake).await {
                    warn!("{}", err);
                }
                continue 'mainloop;
            },
            Step::Command(command) => command,
        };

        let command = match command {
            None | Some(PairingCommand::Teardown) => break 'mainloop,
            Some(command) => command,
        };
        info!("Pairing command {:?}", command);

        tokio::select! {
            _ = cancel.cancelled() => {
                break 'mainloop;
            },
            result = workflow.handle(command) => {
                if let Err(err) = result {
                    warn!("{}", err);
                }
            },
        }
    }

    info!("Tearing down pairing");
    workflow.teardown().await;
    workflow
}

async fn run_pairing(cancel: CancellationToken, options: PairingOptions, mut sender: Sender<PairingEvent>) -> Infallible {
    let (command_sender, command_receiver) = channel::<PairingCommand>(EVENT_BUFFER);
    if let Err(err) = sender.send(PairingEvent::Ready(command_sender)).await {
        warn!("Failed to send PairingEvent: {}", err);
    }

    let backend = BtleBackend::new();
    let workflow = PairingWorkflow::new(backend.clone(), backend, options).with_listener(sender);
    drive(workflow, command_receiver, cancel).await;

    // note: subscription::channel expects the future to never resolve (Infallible)
    pending().await
}

pub fn pairing_subscription(cancel: CancellationToken, options: PairingOptions) -> Subscription<PairingEvent> {
    struct Pairing;

    subscription::channel(
        std::any::TypeId::of::<Pairing>(),
        EVENT_BUFFER,
        move |sender| async move {
            run_pairing(cancel, options, sender).await
        },
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::spawn;
    use tokio::time::sleep;

    use crate::device::constants::STATUS_SCAN_COMPLETED;
    use crate::device::machine::ConnectionState;
    use crate::device::platform::Platform;
    use crate::device::testing::{FakeRadio, FakeTransport, TransportCall};
    use crate::device::types::{PeripheralInfo, RadioState, ScanOptions};
    use super::*;

    fn workflow(radio: &FakeRadio, transport: &FakeTransport) -> PairingWorkflow<FakeRadio, FakeTransport> {
        let options = PairingOptions {
            platform: Platform::Desktop,
            scan: ScanOptions { filters: Vec::new(), duration: Duration::from_secs(30), allow_duplicates: true },
        };
        PairingWorkflow::new(radio.clone(), transport.clone(), options)
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_connects_and_tears_down_on_cancel() {
        let radio = FakeRadio::new(RadioState::On);
        let transport = FakeTransport::new();
        let (mut commands, receiver) = channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let handle = spawn(drive(workflow(&radio, &transport), receiver, cancel.clone()));

        sleep(Duration::from_secs(1)).await;
        transport.discover(PeripheralInfo::new("a", Some("Frame")));
        sleep(Duration::from_secs(1)).await;
        commands.send(PairingCommand::Select("a".into())).await.unwrap();
        sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let workflow = handle.await.unwrap();
        assert_eq!(workflow.state(), &ConnectionState::Idle);
        assert_eq!(workflow.pending_timers(), 0);
        assert_eq!(radio.active_watchers(), 0);
        assert_eq!(transport.active_discovery_subscriptions(), 0);
        assert_eq!(
            transport.calls(),
            vec![
                TransportCall::Start,
                TransportCall::StartScan,
                TransportCall::StopScan,
                TransportCall::Connect("a".into()),
                TransportCall::RetrieveServices("a".into()),
                TransportCall::Disconnect("a".into()),
            ],
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_stops_when_commands_close() {
        let radio = FakeRadio::new(RadioState::Off);
        let transport = FakeTransport::new();
        let (commands, receiver) = channel::<PairingCommand>(EVENT_BUFFER);
        let handle = spawn(drive(workflow(&radio, &transport), receiver, CancellationToken::new()));

        sleep(Duration::from_secs(1)).await;
        drop(commands);

        let workflow = handle.await.unwrap();
        assert_eq!(workflow.state(), &ConnectionState::Idle);
        assert_eq!(radio.active_watchers(), 0);
        assert!(transport.calls().iter().all(|call| call == &TransportCall::Start));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_arms_scan_timer_when_command_arrives_during_slow_scan_start() {
        let radio = FakeRadio::new(RadioState::Off);
        let transport = FakeTransport::new();
        transport.delay_scan(Duration::from_secs(2));
        let (listener, events) = channel(256);
        let (mut commands, receiver) = channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let handle = spawn(drive(
            workflow(&radio, &transport).with_listener(listener),
            receiver,
            cancel.clone(),
        ));

        sleep(Duration::from_secs(1)).await;
        radio.set_radio_state(RadioState::On);
        sleep(Duration::from_millis(500)).await;
        // arrives while the radio-on handler is still waiting for start_scan
        commands.send(PairingCommand::Select("zz".into())).await.unwrap();
        sleep(Duration::from_secs(300)).await;

        cancel.cancel();
        // the workflow holds the listener; dropping it ends the event stream
        drop(handle.await.unwrap());
        let events: Vec<PairingEvent> = events.collect().await;

        assert!(events.contains(&PairingEvent::StatusChanged(STATUS_SCAN_COMPLETED.to_string())));
        let states: Vec<&ConnectionState> = events
            .iter()
            .filter_map(|event| match event {
                PairingEvent::StateChanged(state) => Some(state),
                _ => None,
            })
            .collect();
        let scanning = states.iter().position(|state| **state == ConnectionState::Scanning).unwrap();
        assert_eq!(states[scanning + 1], &ConnectionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drive_cancels_a_hanging_connect() {
        let radio = FakeRadio::new(RadioState::On);
        let transport = FakeTransport::new();
        transport.hang_connect("a");
        let (mut commands, receiver) = channel(EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let handle = spawn(drive(workflow(&radio, &transport), receiver, cancel.clone()));

        sleep(Duration::from_secs(1)).await;
        transport.discover(PeripheralInfo::new("a", None));
        sleep(Duration::from_secs(1)).await;
        commands.send(PairingCommand::Select("a".into())).await.unwrap();
        sleep(Duration::from_secs(60)).await;
        cancel.cancel();

        let workflow = handle.await.unwrap();
        assert_eq!(workflow.state(), &ConnectionState::Idle);
        assert_eq!(transport.count(|call| call == &TransportCall::Disconnect("a".into())), 1);
    }
}
