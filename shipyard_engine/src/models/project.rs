//! Project metadata consumed by the build engine.

use serde::{Deserialize, Serialize};

use crate::models::build::Platform;

/// Per-platform release settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub bundle_id: String,
    /// Marketing version, e.g. `1.4.2`.
    pub version: String,
    /// iOS build number / Android version code.
    pub build_number: u32,
    /// Shell command overriding the platform default build invocation.
    pub build_command: Option<String>,
}

/// Xcode build parameters for projects that need more than the defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IosConfig {
    pub scheme: String,
    pub configuration: String,
}

/// Webhooks to notify when a build reaches a terminal status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub slack_webhook_url: Option<String>,
    pub discord_webhook_url: Option<String>,
}

/// A registered app project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Root directory containing the `ios/` and `android/` subprojects.
    pub path: String,
    pub ios: PlatformSettings,
    pub android: PlatformSettings,
    pub ios_config: Option<IosConfig>,
    pub notifications: Option<NotificationSettings>,
}

impl Project {
    pub fn platform(&self, platform: Platform) -> &PlatformSettings {
        match platform {
            Platform::Ios => &self.ios,
            Platform::Android => &self.android,
        }
    }
}
