use crate::device::constants::{ANDROID_PERMISSIONS, PERMISSION_MIN_API_LEVEL};
use crate::device::types::PermissionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Android { api_level: u32 },
    Ios,
    Desktop,
}

/// What the workflow has to do about runtime permissions on a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionGate {
    Request(Vec<PermissionKind>),
    /// Android below the threshold: the manifest grants everything.
    NotRequired,
    NotApplicable,
}

impl Platform {
    #[cfg(target_os = "android")]
    pub fn current() -> Platform {
        Platform::Android { api_level: android_api_level() }
    }

    #[cfg(target_os = "ios")]
    pub fn current() -> Platform {
        Platform::Ios
    }

    #[cfg(not(any(target_os = "android", target_os = "ios")))]
    pub fn current() -> Platform {
        Platform::Desktop
    }

    pub fn permission_gate(&self) -> PermissionGate {
        match self {
            Platform::Android { api_level } if *api_level >= PERMISSION_MIN_API_LEVEL => {
                PermissionGate::Request(ANDROID_PERMISSIONS.to_vec())
            },
            Platform::Android { .. } => PermissionGate::NotRequired,
            Platform::Ios | Platform::Desktop => PermissionGate::NotApplicable,
        }
    }
}

// An unreadable sdk level is treated as recent enough to need the permissions.
#[cfg(target_os = "android")]
fn android_api_level() -> u32 {
    std::process::Command::new("getprop")
        .arg("ro.build.version.sdk")
        .output()
        .ok()
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(PERMISSION_MIN_API_LEVEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_android_threshold() {
        assert_eq!(
            Platform::Android { api_level: 30 }.permission_gate(),
            PermissionGate::Request(ANDROID_PERMISSIONS.to_vec()),
        );
        assert_eq!(Platform::Android { api_level: 29 }.permission_gate(), PermissionGate::NotRequired);
    }

    #[test]
    fn test_other_platforms_skip_permissions() {
        assert_eq!(Platform::Desktop.permission_gate(), PermissionGate::NotApplicable);
        assert_eq!(Platform::Ios.permission_gate(), PermissionGate::NotApplicable);
    }
}
