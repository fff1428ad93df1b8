//! Build executors — collaborators that run the platform toolchain and
//! report back exclusively through the event bus.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::bus::BuildEventBus;
use crate::models::build::{ArtifactFormat, BuildOptions, BuildOutcome, Platform};
use crate::models::project::Project;

/// Launches a build for a project. Communicates back only through the
/// build's event stream; after a successful launch a terminal status event
/// is guaranteed. May fail synchronously at call time, before any event.
#[async_trait]
pub trait BuildExecutor: Send + Sync {
    async fn launch(
        &self,
        build_id: Uuid,
        project: &Project,
        platform: Platform,
        options: &BuildOptions,
    ) -> anyhow::Result<()>;
}

/// Cancellation collaborator: force-stops a running build. The stopped
/// build still reports its terminal status through the normal event stream.
#[async_trait]
pub trait BuildAborter: Send + Sync {
    async fn abort(&self, build_id: Uuid) -> anyhow::Result<()>;
}

/// Runs the project's build command as a child process and streams its
/// merged stdout/stderr line by line, teeing every line to a timestamped
/// sidecar log under `<platform dir>/build/logs/`.
pub struct ProcessExecutor {
    bus: Arc<BuildEventBus>,
    running: Arc<Mutex<HashMap<Uuid, RunningBuild>>>,
}

struct RunningBuild {
    pid: Option<u32>,
    kill_tx: mpsc::Sender<()>,
}

struct RunContext {
    build_id: Uuid,
    platform: Platform,
    platform_dir: PathBuf,
    android_format: ArtifactFormat,
    log_file_path: PathBuf,
}

impl ProcessExecutor {
    pub fn new(bus: Arc<BuildEventBus>) -> Self {
        Self {
            bus,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl BuildExecutor for ProcessExecutor {
    async fn launch(
        &self,
        build_id: Uuid,
        project: &Project,
        platform: Platform,
        options: &BuildOptions,
    ) -> anyhow::Result<()> {
        let platform_dir = Path::new(&project.path).join(platform.as_str());
        if !platform_dir.is_dir() {
            anyhow::bail!(
                "{} directory not found at {}",
                platform,
                platform_dir.display()
            );
        }

        let logs_dir = platform_dir.join("build/logs");
        tokio::fs::create_dir_all(&logs_dir)
            .await
            .context("create build log directory")?;
        let log_file_path = logs_dir.join(format!("{}.log", chrono::Utc::now().timestamp_millis()));
        let log_file = std::fs::File::create(&log_file_path).context("create build log file")?;

        let command = build_command(project, platform, options);

        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", &format!("{command} 2>&1")])
            .current_dir(&platform_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null());
        // Own process group, so cancellation can kill the toolchain's whole
        // child tree (gradle daemons, clang, swiftc).
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().context("spawn build command")?;
        let stdout = child.stdout.take().context("capture build output")?;

        let (kill_tx, kill_rx) = mpsc::channel(1);
        self.running
            .lock()
            .expect("running builds lock poisoned")
            .insert(
                build_id,
                RunningBuild {
                    pid: child.id(),
                    kill_tx,
                },
            );

        tracing::info!(
            build_id = %build_id,
            project_id = %project.id,
            platform = %platform,
            command = %command,
            "Build launched"
        );
        self.bus.emit_log(build_id, format!("🔧 Running: {command}"));

        let ctx = RunContext {
            build_id,
            platform,
            platform_dir,
            android_format: options.android_format.unwrap_or(ArtifactFormat::Aab),
            log_file_path,
        };
        let bus = Arc::clone(&self.bus);
        let running = Arc::clone(&self.running);
        tokio::spawn(run_to_completion(
            child, stdout, log_file, kill_rx, bus, running, ctx,
        ));

        Ok(())
    }
}

#[async_trait]
impl BuildAborter for ProcessExecutor {
    async fn abort(&self, build_id: Uuid) -> anyhow::Result<()> {
        let (pid, kill_tx) = {
            let running = self.running.lock().expect("running builds lock poisoned");
            match running.get(&build_id) {
                Some(build) => (build.pid, build.kill_tx.clone()),
                None => anyhow::bail!("no running process for build {build_id}"),
            }
        };

        #[cfg(unix)]
        if let Some(pid) = pid {
            kill_process_group(pid);
            tracing::info!(build_id = %build_id, pid, "Killed build process group");
        }
        #[cfg(not(unix))]
        let _ = pid;

        // Wakes the reader task so it reaps the child even if the group
        // kill missed it.
        let _ = kill_tx.try_send(());
        Ok(())
    }
}

async fn run_to_completion(
    mut child: Child,
    stdout: ChildStdout,
    mut log_file: std::fs::File,
    mut kill_rx: mpsc::Receiver<()>,
    bus: Arc<BuildEventBus>,
    running: Arc<Mutex<HashMap<Uuid, RunningBuild>>>,
    ctx: RunContext,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        tokio::select! {
            Some(()) = kill_rx.recv() => {
                #[cfg(unix)]
                if let Some(pid) = child.id() {
                    kill_process_group(pid);
                }
                let _ = child.start_kill();
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let _ = writeln!(log_file, "{line}");
                        bus.emit_log(ctx.build_id, line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        bus.emit_log(ctx.build_id, format!("⚠️ Failed to read build output: {e}"));
                        break;
                    }
                }
            }
        }
    }

    let outcome = match child.wait().await {
        Ok(status) if status.success() => BuildOutcome::Success,
        Ok(status) => {
            let code = status
                .code()
                .map(|code| code.to_string())
                .unwrap_or_else(|| "signal".to_string());
            bus.emit_log(ctx.build_id, format!("❌ Build failed with exit code: {code}"));
            BuildOutcome::Failed
        }
        Err(e) => {
            bus.emit_log(ctx.build_id, format!("❌ Failed to wait for build process: {e}"));
            BuildOutcome::Failed
        }
    };

    running
        .lock()
        .expect("running builds lock poisoned")
        .remove(&ctx.build_id);

    bus.emit_log_file(ctx.build_id, ctx.log_file_path.to_string_lossy());

    if outcome == BuildOutcome::Success {
        if let Some((path, format)) =
            discover_artifact(&ctx.platform_dir, ctx.platform, ctx.android_format)
        {
            bus.emit_artifact(ctx.build_id, path.to_string_lossy(), format);
        }
        bus.emit_log(
            ctx.build_id,
            format!("✅ {} build completed successfully", ctx.platform),
        );
    }

    bus.emit_status(ctx.build_id, outcome);
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let pid = pid as libc::pid_t;
    unsafe {
        let pgid = libc::getpgid(pid);
        if pgid > 0 {
            libc::killpg(pgid, libc::SIGKILL);
        } else {
            libc::kill(pid, libc::SIGKILL);
        }
    }
}

/// Resolves the shell command for a build: the project's configured
/// override, or the platform default. For Android the gradle verb is
/// switched to match the requested artifact format.
fn build_command(project: &Project, platform: Platform, options: &BuildOptions) -> String {
    match platform {
        Platform::Android => {
            let format = options.android_format.unwrap_or(ArtifactFormat::Aab);
            let base = project.android.build_command.clone().unwrap_or_else(|| {
                match format {
                    ArtifactFormat::Apk => "./gradlew assembleRelease".to_string(),
                    _ => "./gradlew bundleRelease".to_string(),
                }
            });
            match format {
                ArtifactFormat::Apk => base.replace("bundle", "assemble"),
                _ => base.replace("assemble", "bundle"),
            }
        }
        Platform::Ios => project.ios.build_command.clone().unwrap_or_else(|| {
            let scheme = project
                .ios_config
                .as_ref()
                .map(|config| config.scheme.as_str())
                .unwrap_or(project.name.as_str());
            let configuration = project
                .ios_config
                .as_ref()
                .map(|config| config.configuration.as_str())
                .unwrap_or("Release");
            format!(
                "xcodebuild -scheme '{}' -sdk iphoneos -configuration '{}' archive",
                shell_single_quote(scheme),
                shell_single_quote(configuration)
            )
        }),
    }
}

fn shell_single_quote(s: &str) -> String {
    s.replace('\'', "'\\''")
}

/// Standard toolchain output locations for the produced artifact.
fn discover_artifact(
    platform_dir: &Path,
    platform: Platform,
    android_format: ArtifactFormat,
) -> Option<(PathBuf, ArtifactFormat)> {
    match platform {
        Platform::Android => {
            let (path, format) = match android_format {
                ArtifactFormat::Apk => (
                    platform_dir.join("app/build/outputs/apk/release/app-release.apk"),
                    ArtifactFormat::Apk,
                ),
                _ => (
                    platform_dir.join("app/build/outputs/bundle/release/app-release.aab"),
                    ArtifactFormat::Aab,
                ),
            };
            path.exists().then_some((path, format))
        }
        Platform::Ios => {
            let build_dir = platform_dir.join("build");
            for entry in std::fs::read_dir(&build_dir).ok()?.flatten() {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) == Some("ipa") {
                    return Some((path, ArtifactFormat::Ipa));
                }
            }
            None
        }
    }
}
