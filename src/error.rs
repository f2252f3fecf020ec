use std::io;
use thiserror::Error;
use msgbox::IconType;
use std::fmt::Display;
use std::str::Utf8Error;
use btleplug;
use iced;
use serde_json;

use crate::device::types::PeripheralId;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (iced): {source}")]
    Iced { #[from] source: iced::Error },

    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Error communicating with bluetooth (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Peripheral {0} has not been discovered")]
    UnknownPeripheral(PeripheralId),
}

impl TransportError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, TransportError::Btle { source: btleplug::Error::PermissionDenied })
    }
}

#[derive(Error, Debug)]
pub enum PairingError {
    #[error("Bluetooth permissions were denied")]
    PermissionDenied,

    #[error("Bluetooth is not available")]
    RadioUnavailable { source: Option<TransportError> },

    #[error("Scanning for devices failed: {source}")]
    ScanFailure { source: TransportError },

    #[error("Connecting to the device failed: {source}")]
    ConnectFailure { source: TransportError },

    #[error("Retrieving the services of the device failed: {source}")]
    ServiceRetrievalFailure { source: TransportError },

    #[error("No device is connected")]
    NoDeviceSelected,

    #[error("Peripheral {0} is not in the list of discovered devices")]
    UnknownPeripheral(PeripheralId),

    #[error("Can not {operation} while {state}")]
    InvalidState { operation: &'static str, state: String },
}

pub fn error_msgbox<T: Display>(message: &'static str, error: &T) {
    let message = format!("{}: {}", message, error);
    eprintln!("{}", &message);
    if let Err(err) = msgbox::create(concat!("Blackjack for FRAMES ", env!("CARGO_PKG_VERSION")), &message, IconType::Error) {
        eprintln!("Failed to create msgbox: {:?}", err);
    }
}
