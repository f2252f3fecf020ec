use std::path::PathBuf;
use futures::channel::mpsc::Sender;
use futures::SinkExt;
use iced::{Alignment, Application, Command, Element, Length, Settings, Size, Subscription, window};
use iced::event::{self, Event};
use iced::keyboard::{self, key::Named as NamedKey, Key};
use iced::theme::{self, Theme};
use iced::widget::{Column, button, column, container, horizontal_rule, row, scrollable, text};
use log::{error, info, warn};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::io::ConfigIO;
use crate::config::types::Config;
use crate::device::connection::pairing_subscription;
use crate::device::constants::STATUS_RADIO_OFF;
use crate::device::machine::ConnectionState;
use crate::device::types::{Notice, PairedDevice, PairingCommand, PairingEvent, PeripheralInfo};
use crate::error::AppRunError;
use crate::gui::style::{CameraPanelStyleSheet, DeviceItemStyleSheet};
use crate::gui::types::{BackAction, CameraAccess, Message, Screen, can_select_device};

const TITLE: &str = "Blackjack for FRAMES";
const ACTION_BUTTONS: [&str; 4] = ["Hit", "Stand", "Double Down", "Split"];

pub struct ApplicationFlags {
    config_io: ConfigIO,
}

pub struct FramesApplication {
    // this token is cancelled upon exit, which tears down the pairing workflow
    app_cancel: CancellationToken,
    screen: Screen,

    // messages that the user must click away
    notices: Vec<Notice>,
    confirm_exit: bool,

    config_io: ConfigIO,
    // None until the config file has been read; pairing does not start before that
    config: Option<Config>,

    // commands for the pairing workflow, available after PairingEvent::Ready
    pairing_sender: Option<Sender<PairingCommand>>,

    // latest state reported by the pairing workflow
    connection_state: ConnectionState,
    status: String,
    devices: Vec<PeripheralInfo>,
    paired_device: Option<PairedDevice>,

    camera_access: CameraAccess,
}

impl FramesApplication {
    fn before_close(&mut self) {
        self.app_cancel.cancel();
    }

    fn load_config(&self) -> Command<Message> {
        let config_io = self.config_io.clone();

        let fut = async move {
            match config_io.read().await {
                Ok(config) => (config, None),
                Err(err) => {
                    let mut error_message: Option<String> = None;

                    if err.is_file_not_found_error() {
                        info!("Config file not found, using defaults");
                    } else {
                        error!("Failed to load config: {:?}", &err);
                        error_message = Some(format!("Failed to load config: {}", &err));
                    }
                    (Config::default(), error_message)
                }
            }
        };

        Command::perform(fut, Message::ConfigLoadComplete)
    }

    fn send_command(&self, command: PairingCommand) -> Command<Message> {
        let Some(mut sender) = self.pairing_sender.clone() else {
            warn!("Pairing is not running yet, ignoring {:?}", command);
            return Command::none();
        };

        let fut = async move {
            if let Err(err) = sender.send(command).await {
                error!("Failed to send PairingCommand: {}", err);
            }
        };

        Command::perform(fut, Message::CommandSent)
    }

    fn request_camera_access(&self) -> Command<Message> {
        Command::perform(async {}, Message::CameraReady)
    }

    fn handle_pairing_event(&mut self, event: PairingEvent) -> Command<Message> {
        match event {
            PairingEvent::Ready(sender) => {
                info!("Pairing workflow ready");
                self.pairing_sender = Some(sender);
            },
            PairingEvent::StateChanged(state) => {
                self.connection_state = state;
            },
            PairingEvent::StatusChanged(status) => {
                self.status = status;
            },
            PairingEvent::DevicesChanged(devices) => {
                self.devices = devices;
            },
            PairingEvent::Alert(notice) => {
                self.notices.push(notice);
            },
            PairingEvent::Paired(device) => {
                info!("Opening card assistant for {}", device.peripheral.display_name());
                self.paired_device = Some(device);
                self.screen = Screen::CardAssistant;
                self.camera_access = CameraAccess::Pending;
                return self.request_camera_access();
            },
        }

        Command::none()
    }

    fn handle_back(&mut self) -> Command<Message> {
        match BackAction::for_screen(self.screen) {
            BackAction::Ignore => Command::none(),
            BackAction::ConfirmExit => {
                self.confirm_exit = true;
                Command::none()
            },
            BackAction::ReleaseDevice => {
                self.screen = Screen::Pairing;
                self.paired_device = None;
                self.camera_access = CameraAccess::Pending;
                self.send_command(PairingCommand::Release)
            },
        }
    }

    fn view_welcome(&self) -> Element<Message> {
        container(
            column![
                text(TITLE).size(32),
                text("Loading..."),
            ].align_items(Alignment::Center).spacing(20),
        )
        .width(Length::Fill)
        .height(Length::Fill)
        .center_x()
        .center_y()
        .into()
    }

    // rows without on_press render disabled
    fn view_device_list(&self) -> Element<Message> {
        let selectable = can_select_device(&self.connection_state);

        scrollable(
            Column::with_children(
                self.devices
                    .iter()
                    .map(|device| {
                        let item = button(text(device.display_name()))
                            .width(Length::Fill)
                            .padding(10)
                            .style(theme::Button::Custom(Box::new(DeviceItemStyleSheet)));
                        if selectable {
                            item.on_press(Message::SelectDevice(device.id.clone()))
                        } else {
                            item
                        }
                    })
                    .map(Element::from)
            )
            .spacing(5)
            .width(Length::Fill)
        )
        .height(Length::Fill)
        .into()
    }

    fn view_pairing(&self) -> Element<Message> {
        let body: Element<Message> = match &self.connection_state {
            ConnectionState::RequestingPermissions
            | ConnectionState::Scanning
            | ConnectionState::Connecting { .. } => column![
                text("Please wait..."),
                text(&self.status),
                self.view_device_list(),
            ].align_items(Alignment::Center).spacing(20).into(),

            ConnectionState::Connected { device } => column![
                text("DEVICE FOUND").size(24),
                text(device.peripheral.display_name()),
                button(text("Pair"))
                    .style(theme::Button::Positive)
                    .on_press(Message::UseDevice),
            ].align_items(Alignment::Center).spacing(20).into(),

            ConnectionState::RadioOff => text(STATUS_RADIO_OFF).into(),

            ConnectionState::Idle
            | ConnectionState::DeviceListed
            | ConnectionState::Error(_) => column![
                text("No device connected"),
                text(&self.status),
                self.view_device_list(),
                button(text("Rescan")).on_press(Message::Rescan),
            ].align_items(Alignment::Center).spacing(20).into(),
        };

        column![
            text(TITLE).size(28),
            text("SETUP YOUR DEVICE"),
            horizontal_rule(10),
            body,
        ]
        .align_items(Alignment::Center)
        .spacing(20)
        .height(Length::Fill)
        .into()
    }

    fn view_card_assistant(&self) -> Element<Message> {
        let camera = text(self.camera_access.caption(self.paired_device.as_ref()));

        // the actions are not wired to anything yet, so none of them has an on_press
        let actions = row(
            ACTION_BUTTONS
                .iter()
                .map(|label| button(text(*label)).into())
                .collect::<Vec<Element<Message>>>()
        ).spacing(10);

        column![
            container(camera)
                .width(Length::Fill)
                .height(Length::FillPortion(3))
                .center_x()
                .center_y()
                .style(theme::Container::Custom(Box::new(CameraPanelStyleSheet))),
            actions,
            text("Status: Waiting for action..."),
        ]
        .align_items(Alignment::Center)
        .spacing(20)
        .into()
    }
}

impl Application for FramesApplication {
    type Executor = iced::executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (FramesApplication, Command<Self::Message>) {
        let app = FramesApplication {
            app_cancel: CancellationToken::new(),
            screen: Screen::Welcome,
            notices: Vec::new(),
            confirm_exit: false,
            config_io: flags.config_io,
            config: None,
            pairing_sender: None,
            connection_state: ConnectionState::Idle,
            status: String::new(),
            devices: Vec::new(),
            paired_device: None,
            camera_access: CameraAccess::Pending,
        };

        let command = app.load_config();
        (app, command)
    }

    fn title(&self) -> String {
        format!("{} {}", TITLE, env!("CARGO_PKG_VERSION"))
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::ConfigLoadComplete((config, error_message)) => {
                info!("Config load complete");
                let delay = config.welcome_delay();
                self.config = Some(config);
                if let Some(error_message) = error_message {
                    self.notices.push(Notice::new("Configuration", error_message));
                }
                return Command::perform(sleep(delay), Message::WelcomeElapsed);
            },
            Message::WelcomeElapsed(()) => {
                if self.screen == Screen::Welcome {
                    self.screen = Screen::Pairing;
                }
            },
            Message::Pairing(event) => {
                return self.handle_pairing_event(event);
            },
            Message::Rescan => {
                return self.send_command(PairingCommand::Rescan);
            },
            Message::SelectDevice(id) => {
                return self.send_command(PairingCommand::Select(id));
            },
            Message::UseDevice => {
                return self.send_command(PairingCommand::ConfirmUse);
            },
            Message::NoticeConfirmed => {
                if !self.notices.is_empty() {
                    self.notices.remove(0);
                }
            },
            Message::ExitConfirmed(true) => {
                info!("Exit confirmed");
                self.before_close();
                return window::close(window::Id::MAIN);
            },
            Message::ExitConfirmed(false) => {
                self.confirm_exit = false;
            },
            Message::CameraReady(()) => {
                self.camera_access = CameraAccess::Granted;
            },
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                self.before_close();
                return window::close(id);
            },
            Message::EventOccurred(Event::Keyboard(keyboard::Event::KeyPressed { key: Key::Named(NamedKey::Escape), .. })) => {
                return self.handle_back();
            },
            _ => {}
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![
            event::listen().map(Message::EventOccurred),
        ];

        if self.screen != Screen::Welcome {
            if let Some(config) = &self.config {
                subscriptions.push(
                    pairing_subscription(
                        self.app_cancel.clone(),
                        config.pairing_options(),
                    ).map(Message::Pairing)
                );
            }
        }

        Subscription::batch(subscriptions)
    }

    fn view(&self) -> Element<Message> {
        if let Some(notice) = self.notices.first() {
            return container(
                column![
                    text(&notice.title).size(24),
                    text(&notice.message),

                    button(text("Okay"))
                        .on_press(Message::NoticeConfirmed),

                ].align_items(Alignment::Center).spacing(20),
            )
            .width(Length::Fill)
            .padding(20)
            .into()
        }

        if self.confirm_exit {
            return container(
                column![
                    text("Exit App").size(24),
                    text("Are you sure you want to exit?"),
                    row![
                        button(text("No")).on_press(Message::ExitConfirmed(false)),
                        button(text("Yes"))
                            .style(theme::Button::Destructive)
                            .on_press(Message::ExitConfirmed(true)),
                    ].spacing(20),
                ].align_items(Alignment::Center).spacing(20),
            )
            .width(Length::Fill)
            .padding(20)
            .into()
        }

        let content = match self.screen {
            Screen::Welcome => self.view_welcome(),
            Screen::Pairing => self.view_pairing(),
            Screen::CardAssistant => self.view_card_assistant(),
        };

        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .padding(20)
            .into()
    }
}

pub fn run_application(config_path: Option<PathBuf>) -> Result<(), AppRunError> {
    let mut config_io = ConfigIO::new_sync(config_path)?;
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;

    let flags = ApplicationFlags { config_io };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested)
    settings.id = Some("frames-blackjack".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(420.0, 760.0);
    settings.window.resizable = false;

    // this function will call process::exit() unless there was a startup error
    FramesApplication::run(settings)?;
    Ok(())
}
