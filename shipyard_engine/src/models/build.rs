//! Build records — one per build attempt, in flight or archived.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::project::Project;

/// Mobile platform a build targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ios" => Ok(Platform::Ios),
            "android" => Ok(Platform::Android),
            other => Err(anyhow::anyhow!("unknown platform: {other}")),
        }
    }
}

/// Lifecycle state of a build. `Building` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Building,
    Success,
    Failed,
}

impl BuildStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildStatus::Building => "building",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, BuildStatus::Building)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "building" => Ok(BuildStatus::Building),
            "success" => Ok(BuildStatus::Success),
            "failed" => Ok(BuildStatus::Failed),
            other => Err(anyhow::anyhow!("unknown build status: {other}")),
        }
    }
}

/// Terminal result reported by an executor. Distinct from [`BuildStatus`] so
/// a status event can never carry `building`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
    Success,
    Failed,
}

impl BuildOutcome {
    pub fn status(self) -> BuildStatus {
        match self {
            BuildOutcome::Success => BuildStatus::Success,
            BuildOutcome::Failed => BuildStatus::Failed,
        }
    }
}

/// Packaging format of a produced artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Apk,
    Aab,
    Ipa,
}

impl ArtifactFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactFormat::Apk => "apk",
            ArtifactFormat::Aab => "aab",
            ArtifactFormat::Ipa => "ipa",
        }
    }
}

impl std::str::FromStr for ArtifactFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apk" => Ok(ArtifactFormat::Apk),
            "aab" => Ok(ArtifactFormat::Aab),
            "ipa" => Ok(ArtifactFormat::Ipa),
            other => Err(anyhow::anyhow!("unknown artifact format: {other}")),
        }
    }
}

/// Caller-supplied options for one build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildOptions {
    pub release_note: Option<String>,
    /// Android packaging format; defaults to `aab` when unset.
    pub android_format: Option<ArtifactFormat>,
}

/// One build attempt.
///
/// A record lives in the in-flight map while `status` is `Building` and in
/// history afterwards, never both. `version` and `build_number` are
/// snapshots of the project's platform settings at build start; the project
/// may change versions later without affecting this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: Uuid,
    pub project_id: String,
    pub platform: Platform,
    pub version: String,
    pub build_number: u32,
    pub status: BuildStatus,
    /// Last status transition time; not touched by log appends.
    pub timestamp: DateTime<Utc>,
    /// Append-only while building; never filtered or truncated here.
    pub logs: String,
    /// Sidecar log file on disk, set at most once.
    pub log_file_path: Option<String>,
    pub release_note: String,
    pub artifact_path: Option<String>,
    pub format: Option<ArtifactFormat>,
}

impl BuildRecord {
    /// Creates an in-flight record for a project/platform pair.
    pub fn new(project: &Project, platform: Platform, options: &BuildOptions) -> Self {
        let settings = project.platform(platform);
        Self {
            id: Uuid::new_v4(),
            project_id: project.id.clone(),
            platform,
            version: settings.version.clone(),
            build_number: settings.build_number,
            status: BuildStatus::Building,
            timestamp: Utc::now(),
            logs: format!("Starting {platform} build for {}...\n", project.name),
            log_file_path: None,
            release_note: options.release_note.clone().unwrap_or_default(),
            artifact_path: None,
            format: None,
        }
    }
}
