//! Lifecycle of the local server under test
//!
//! Health is a `HEAD` on the base URL answered with any status below 500.
//! The manager only ever stops a process it spawned itself.

use async_trait::async_trait;
use parking_lot::Mutex;
use spectest_core::{Error, LogEntry, LogStream, Result, TargetProcess};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::config::{CliConfig, RunningServer};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Starts, probes and stops the target server
pub struct ServerManager {
    base_url: String,
    start_cmd: Option<String>,
    build_cmd: Option<String>,
    policy: RunningServer,
    startup_timeout: Duration,
    client: reqwest::Client,
    child: tokio::sync::Mutex<Option<Child>>,
    logs: Arc<Mutex<Vec<LogEntry>>>,
}

impl ServerManager {
    pub fn new(config: &CliConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(HEALTH_TIMEOUT)
            .build()
            .map_err(|e| Error::Target(format!("Failed to build health client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            start_cmd: config.start_cmd.clone(),
            build_cmd: config.build_cmd.clone(),
            policy: config.running_server,
            startup_timeout: Duration::from_millis(config.startup_timeout_ms),
            client,
            child: tokio::sync::Mutex::new(None),
            logs: Arc::new(Mutex::new(Vec::new())),
        })
    }

    fn port(&self) -> Option<u16> {
        reqwest::Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.port_or_known_default())
    }

    async fn build(&self, cmd: &str) -> Result<()> {
        info!("Building server: {}", cmd);
        let status = shell(cmd)
            .status()
            .await
            .map_err(|e| Error::Target(format!("Failed to run build command: {e}")))?;
        if !status.success() {
            return Err(Error::Target(format!("Build command failed with {status}")));
        }
        Ok(())
    }

    /// Kill whatever process listens on the base URL's port.
    async fn kill_port_owner(&self) -> Result<()> {
        let port = self
            .port()
            .ok_or_else(|| Error::Target(format!("Cannot determine port of {}", self.base_url)))?;
        let output = Command::new("lsof")
            .arg("-ti")
            .arg(format!(":{port}"))
            .output()
            .await
            .map_err(|e| Error::Target(format!("Failed to run lsof: {e}")))?;

        for pid in String::from_utf8_lossy(&output.stdout)
            .split_whitespace()
            .filter_map(|p| p.parse::<i32>().ok())
        {
            warn!("Killing process {} listening on port {}", pid, port);
            kill_pid(pid);
        }
        Ok(())
    }

    async fn wait_for_healthy(&self) -> Result<()> {
        let started = Instant::now();
        let mut attempts = 0u32;
        while started.elapsed() < self.startup_timeout {
            attempts += 1;
            if self.is_running().await {
                info!("Server is healthy after {} attempts", attempts);
                return Ok(());
            }
            if let Some(child) = self.child.lock().await.as_mut() {
                if let Ok(Some(status)) = child.try_wait() {
                    return Err(Error::Target(format!("Server exited early with {status}")));
                }
            }
            sleep(POLL_INTERVAL).await;
        }
        Err(Error::Target(format!(
            "Server at {} not healthy after {}ms",
            self.base_url,
            self.startup_timeout.as_millis()
        )))
    }

    fn capture<R>(&self, reader: R, stream: LogStream)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let logs = self.logs.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[server] {}", line);
                logs.lock().push(LogEntry::new(stream, line));
            }
        });
    }
}

#[async_trait]
impl TargetProcess for ServerManager {
    async fn start(&self) -> Result<()> {
        if self.is_running().await {
            match self.policy {
                RunningServer::Reuse => {
                    info!("Reusing server already running at {}", self.base_url);
                    return Ok(());
                }
                RunningServer::Fail => {
                    return Err(Error::Target(format!(
                        "Server already running at {}",
                        self.base_url
                    )));
                }
                RunningServer::Kill => self.kill_port_owner().await?,
            }
        }

        let Some(start_cmd) = &self.start_cmd else {
            warn!(
                "No start command configured; assuming {} is managed externally",
                self.base_url
            );
            return Ok(());
        };

        if let Some(build_cmd) = &self.build_cmd {
            self.build(build_cmd).await?;
        }

        info!("Starting server: {}", start_cmd);
        let mut child = shell(start_cmd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Target(format!("Failed to spawn server: {e}")))?;

        if let Some(stdout) = child.stdout.take() {
            self.capture(stdout, LogStream::Stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.capture(stderr, LogStream::Stderr);
        }
        *self.child.lock().await = Some(child);

        if let Err(e) = self.wait_for_healthy().await {
            let _ = self.stop().await;
            return Err(e);
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        if let Ok(Some(status)) = child.try_wait() {
            debug!("Server already exited with {}", status);
            return Ok(());
        }
        info!("Stopping server (pid: {:?})", child.id());

        // Try graceful shutdown first
        if let Some(pid) = child.id() {
            terminate_pid(pid as i32);
            if timeout(STOP_GRACE, child.wait()).await.is_ok() {
                return Ok(());
            }
            warn!("Server did not exit within {:?}, killing", STOP_GRACE);
        }

        child
            .kill()
            .await
            .map_err(|e| Error::Target(format!("Failed to kill server: {e}")))
    }

    async fn is_running(&self) -> bool {
        match self.client.head(&self.base_url).send().await {
            Ok(resp) => (200..500).contains(&resp.status().as_u16()),
            Err(e) => {
                if !e.is_connect() {
                    debug!("Health check error: {}", e);
                }
                false
            }
        }
    }

    fn logs(&self) -> Vec<LogEntry> {
        self.logs.lock().clone()
    }
}

fn shell(cmd: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);
    command
}

#[cfg(unix)]
fn terminate_pid(pid: i32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
        debug!("SIGTERM to {} failed: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn terminate_pid(_pid: i32) {}

#[cfg(unix)]
fn kill_pid(pid: i32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGKILL) {
        warn!("Failed to kill {}: {}", pid, e);
    }
}

#[cfg(not(unix))]
fn kill_pid(pid: i32) {
    warn!("Cannot kill process {} on this platform", pid);
}
