use std::time::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{SCAN_SECONDS, WELCOME_DELAY};
use crate::device::pairing::PairingOptions;
use crate::device::platform::Platform;
use crate::device::types::ScanOptions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub scan_seconds: u64,
    pub allow_duplicates: bool,
    /// Only list peripherals advertising one of these services
    pub service_filter: Vec<Uuid>,
    pub welcome_delay_ms: u64,
}

impl Config {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            filters: self.service_filter.clone(),
            // a zero length scan would never list anything
            duration: Duration::from_secs(self.scan_seconds.max(1)),
            allow_duplicates: self.allow_duplicates,
        }
    }

    pub fn pairing_options(&self) -> PairingOptions {
        PairingOptions {
            platform: Platform::current(),
            scan: self.scan_options(),
        }
    }

    pub fn welcome_delay(&self) -> Duration {
        Duration::from_millis(self.welcome_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan_seconds: SCAN_SECONDS,
            allow_duplicates: true,
            service_filter: Vec::new(),
            welcome_delay_ms: WELCOME_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: Config = serde_json::from_str(r#"{ "scanSeconds": 10 }"#).unwrap();

        assert_eq!(config.scan_seconds, 10);
        assert_eq!(config.welcome_delay_ms, WELCOME_DELAY);
        assert!(config.allow_duplicates);
        assert!(config.service_filter.is_empty());
    }

    #[test]
    fn test_service_filter() {
        let config: Config = serde_json::from_str(
            r#"{ "serviceFilter": ["7a230001-5475-a6a4-654c-8431f6ad49c4"], "allowDuplicates": false }"#,
        ).unwrap();

        let options = config.scan_options();
        assert_eq!(options.filters, vec![Uuid::parse_str("7a230001-5475-a6a4-654c-8431f6ad49c4").unwrap()]);
        assert!(!options.allow_duplicates);
        assert_eq!(options.duration, Duration::from_secs(SCAN_SECONDS));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let config: Config = serde_json::from_str(r#"{ "scanSeconds": 20, "radioPollMs": 1000 }"#).unwrap();
        assert_eq!(config, Config { scan_seconds: 20, ..Config::default() });
    }

    #[test]
    fn test_zero_scan_duration_is_clamped() {
        let config = Config { scan_seconds: 0, ..Config::default() };
        assert_eq!(config.scan_options().duration, Duration::from_secs(1));
    }

    #[test]
    fn test_written_as_camel_case() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["scanSeconds"], 30);
        assert_eq!(json["welcomeDelayMs"], 2000);
    }
}
