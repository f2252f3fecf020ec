use crate::device::types::PermissionKind;

/**
 * How long (seconds) a scan session runs before it is stopped.
 */
pub const SCAN_SECONDS: u64 = 30;

/**
 * How long (milliseconds) the welcome screen is shown.
 */
pub const WELCOME_DELAY: u64 = 2000;

/**
 * Android API level from which the bluetooth runtime permissions have to be requested.
 */
pub const PERMISSION_MIN_API_LEVEL: u32 = 30;

pub const ANDROID_PERMISSIONS: [PermissionKind; 3] = [
    PermissionKind::FineLocation,
    PermissionKind::BluetoothScan,
    PermissionKind::BluetoothConnect,
];

/**
 * Buffer size of the channels between the workflow, the adapters and the ui.
 */
pub const EVENT_BUFFER: usize = 64;

pub const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

pub const STATUS_REQUESTING_PERMISSIONS: &str = "Requesting permissions...";
pub const STATUS_PERMISSIONS_GRANTED: &str = "Permissions granted.";
pub const STATUS_PERMISSIONS_DENIED: &str = "Permissions denied.";
pub const STATUS_PERMISSIONS_NOT_REQUIRED: &str = "Permissions not required for Android versions below 30.";
pub const STATUS_RADIO_ON: &str = "Bluetooth is enabled.";
pub const STATUS_RADIO_OFF: &str = "Bluetooth is off. Please enable it.";
pub const STATUS_RADIO_CHECK_FAILED: &str = "Error checking Bluetooth state.";
pub const STATUS_TRANSPORT_START_FAILED: &str = "Error enabling Bluetooth.";
pub const STATUS_SCAN_STARTING: &str = "Scanning for devices...";
pub const STATUS_SCANNING: &str = "Scanning...";
pub const STATUS_SCAN_COMPLETED: &str = "Scan completed.";
pub const STATUS_SCAN_FAILED: &str = "Error during scan and connect.";
pub const STATUS_CONNECT_FAILED: &str = "Error connecting to device.";

pub const PERMISSIONS_DENIED_ERROR: &str = "permissions denied";

pub const ALERT_PERMISSION_DENIED_TITLE: &str = "Permission Denied";
pub const ALERT_PERMISSION_DENIED_MESSAGE: &str = "Location and Bluetooth permissions are required to scan for Bluetooth devices.";
pub const ALERT_DEVICE_IN_USE_TITLE: &str = "Device in Use";
pub const ALERT_NO_DEVICE_TITLE: &str = "No Device Found";
pub const ALERT_NO_DEVICE_MESSAGE: &str = "Please scan for a Device first.";
