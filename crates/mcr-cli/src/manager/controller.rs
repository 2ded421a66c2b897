//! Lifecycle controller for one configured server.
//!
//! Every console interaction goes through the [`SessionChannel`]; the
//! controller itself keeps no state beyond its config and a lock that
//! serialises lifecycle operations (start, stop, restart, kill, backup).

use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mcr_core::config::ServerConfig;
use mcr_core::error::{McrError, Result};
use mcr_core::status::ServerStatus;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::manager::backup::BackupCoordinator;
use crate::manager::channel::{SessionChannel, SessionSpawn};

/// Parameters for a graceful stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOptions {
    /// Seconds to wait for the session to disappear after `stop`.
    pub wait: u64,
    /// Broadcast to players before stopping; empty skips the broadcast.
    pub message: String,
    /// Seconds between the broadcast and the save.
    pub delay: u64,
}

impl Default for StopOptions {
    fn default() -> Self {
        Self {
            wait: 30,
            message: "Server stopping in 30 seconds...".to_string(),
            delay: 30,
        }
    }
}

/// Parameters for a restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartOptions {
    pub wait: u64,
    /// Defaults to "Restarting server in <delay> seconds".
    pub message: Option<String>,
    pub delay: u64,
}

impl Default for RestartOptions {
    fn default() -> Self {
        Self {
            wait: 60,
            message: None,
            delay: 60,
        }
    }
}

/// Fixed pauses of the console protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// After `save-all`, before `stop`.
    pub save_flush: Duration,
    /// Between status polls while waiting for a stop.
    pub poll_interval: Duration,
    /// After `save-off`, before `save-all` during a backup.
    pub save_pause: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            save_flush: Duration::from_secs(3),
            poll_interval: Duration::from_secs(1),
            save_pause: Duration::from_millis(100),
        }
    }
}

/// Controller for a single server's session.
///
/// Clones share the lifecycle lock, so overlapping lifecycle calls through any
/// clone run one after another.
#[derive(Clone)]
pub struct ServerController {
    config: Arc<ServerConfig>,
    channel: Arc<dyn SessionChannel>,
    /// Home directory handed to the launched server.
    home: PathBuf,
    lifecycle: Arc<Mutex<()>>,
    timings: Timings,
    span: Span,
}

impl fmt::Debug for ServerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerController")
            .field("config", &self.config)
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

impl ServerController {
    pub fn new(config: ServerConfig, channel: Arc<dyn SessionChannel>, home: PathBuf) -> Self {
        Self {
            config: Arc::new(config),
            channel,
            home,
            lifecycle: Arc::new(Mutex::new(())),
            timings: Timings::default(),
            span: Span::none(),
        }
    }

    /// Attach log output of this controller to `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub(crate) fn timings(&self) -> Timings {
        self.timings
    }

    /// Running if the session exists.
    ///
    /// A failed query is logged and reported as stopped.
    pub async fn status(&self) -> ServerStatus {
        self.query_status().instrument(self.span.clone()).await
    }

    async fn query_status(&self) -> ServerStatus {
        match self.channel.has_session(&self.config.session_name).await {
            Ok(running) => running.into(),
            Err(e) => {
                warn!(
                    "Status query for session '{}' failed, treating as stopped: {}",
                    self.config.session_name, e
                );
                ServerStatus::Stopped
            }
        }
    }

    /// Launch the server in a new session.
    ///
    /// Returns the status right after the session is created; the server may
    /// still be starting up.
    pub async fn start(&self) -> Result<ServerStatus> {
        let _lock = self.lifecycle.lock().await;
        self.start_unlocked().instrument(self.span.clone()).await
    }

    async fn start_unlocked(&self) -> Result<ServerStatus> {
        if self.query_status().await.is_running() {
            error!("Server already running");
            return Err(McrError::already_running(&self.config.name));
        }

        let spawn = SessionSpawn {
            command: self.config.launch_command(),
            home: self.home.clone(),
        };
        info!("Starting: {}", spawn.command);
        self.channel
            .create_session(&self.config.session_name, &spawn)
            .await?;

        Ok(self.query_status().await)
    }

    /// Warn players, save, send `stop`, then wait up to `wait` seconds.
    ///
    /// Each console line is best-effort; the sequence always runs to the end.
    /// A timeout leaves the server in an unknown state.
    pub async fn stop(&self, options: &StopOptions) -> Result<()> {
        let _lock = self.lifecycle.lock().await;
        self.stop_unlocked(options)
            .instrument(self.span.clone())
            .await
    }

    async fn stop_unlocked(&self, options: &StopOptions) -> Result<()> {
        if !self.query_status().await.is_running() {
            error!("Server not running, can't stop");
            return Err(McrError::not_running(&self.config.name));
        }

        info!(
            "Stopping server (delay {}s, wait {}s)",
            options.delay, options.wait
        );
        self.send_best_effort("").await;
        if !options.message.is_empty() {
            self.send_best_effort(&format!("broadcast {}", options.message))
                .await;
        }
        sleep(Duration::from_secs(options.delay)).await;
        self.send_best_effort("").await;
        self.send_best_effort("save-all").await;
        sleep(self.timings.save_flush).await;
        self.send_best_effort("stop").await;

        for _ in 0..options.wait {
            if !self.query_status().await.is_running() {
                info!("Server stopped");
                return Ok(());
            }
            sleep(self.timings.poll_interval).await;
        }

        error!("Server did not stop within {} seconds", options.wait);
        Err(McrError::stop_timeout(&self.config.name, options.wait))
    }

    /// Stop the server if it runs, then start it.
    ///
    /// A failed stop aborts the restart so a second instance is never
    /// launched next to a live one.
    pub async fn restart(&self, options: &RestartOptions) -> Result<ServerStatus> {
        let _lock = self.lifecycle.lock().await;
        self.restart_unlocked(options)
            .instrument(self.span.clone())
            .await
    }

    async fn restart_unlocked(&self, options: &RestartOptions) -> Result<ServerStatus> {
        if self.query_status().await.is_running() {
            let stop = StopOptions {
                wait: options.wait,
                message: options
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("Restarting server in {} seconds", options.delay)),
                delay: options.delay,
            };
            if let Err(e) = self.stop_unlocked(&stop).await {
                error!("Couldn't stop server, restart failed: {}", e);
                return Err(McrError::general(format!(
                    "Restart of '{}' aborted: {}",
                    self.config.name, e.message
                )));
            }
        } else {
            warn!("Server wasn't running, starting anyway");
        }

        self.start_unlocked().await?;
        Ok(self.query_status().await)
    }

    /// Send one console line.
    pub async fn send(&self, data: &str) -> Result<()> {
        async {
            if !self.query_status().await.is_running() {
                error!("Server not running, can't send");
                return Err(McrError::not_running(&self.config.name));
            }
            debug!("Sending to '{}': {}", self.config.session_name, data);
            self.channel
                .send_line(&self.config.session_name, data)
                .await
        }
        .instrument(self.span.clone())
        .await
    }

    /// Send words joined by single spaces as one console line.
    pub async fn send_words<S: AsRef<str>>(&self, words: &[S]) -> Result<()> {
        let line = words
            .iter()
            .map(|w| w.as_ref())
            .collect::<Vec<_>>()
            .join(" ");
        self.send(&line).await
    }

    /// Hand this terminal to the server console.
    ///
    /// On success the process image is replaced and this never returns.
    pub async fn attach(&self) -> Result<Infallible> {
        async {
            if !self.query_status().await.is_running() {
                error!("Server not running, can't attach");
                return Err(McrError::not_running(&self.config.name));
            }
            self.channel.attach_session(&self.config.session_name)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Destroy the session regardless of its state.
    ///
    /// Only the tmux session is torn down. A server process that outlives its
    /// session keeps running.
    pub async fn kill(&self) -> Result<()> {
        let _lock = self.lifecycle.lock().await;
        async {
            warn!("kill only tears down the tmux session; the server process may survive it");
            self.channel.kill_session(&self.config.session_name).await
        }
        .instrument(self.span.clone())
        .await
    }

    /// Snapshot the server directory into the backup directory.
    ///
    /// Returns the path of the new backup.
    pub async fn backup(&self, remote: bool) -> Result<PathBuf> {
        let _lock = self.lifecycle.lock().await;
        BackupCoordinator::new(self)
            .run(remote)
            .instrument(self.span.clone())
            .await
    }

    /// Send a console line, logging instead of failing.
    pub(crate) async fn send_best_effort(&self, text: &str) {
        if let Err(e) = self
            .channel
            .send_line(&self.config.session_name, text)
            .await
        {
            warn!("Failed to send '{}': {}", text, e);
        }
    }

    /// Status without entering this controller's span.
    pub(crate) async fn current_status(&self) -> ServerStatus {
        self.query_status().await
    }
}
