//! Named terminal sessions that host server consoles.

use std::convert::Infallible;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use mcr_core::config::LaunchCommand;
use mcr_core::error::{McrError, Result};
use tokio::process::Command;
use tracing::debug;

/// Launch request for a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpawn {
    pub command: LaunchCommand,
    /// Value of `HOME` for the launched process; also its working directory.
    pub home: PathBuf,
}

/// A multiplexer that hosts named sessions.
///
/// Existence is the only state a session exposes. Sessions are looked up by
/// name on every call; nothing is cached between calls.
#[async_trait]
pub trait SessionChannel: Send + Sync {
    /// Whether a session with exactly this name exists.
    async fn has_session(&self, name: &str) -> Result<bool>;

    /// Create a detached session running `spawn.command`.
    async fn create_session(&self, name: &str, spawn: &SessionSpawn) -> Result<()>;

    /// Type `text` literally into the session, then press Enter.
    ///
    /// An empty `text` sends a bare Enter.
    async fn send_line(&self, name: &str, text: &str) -> Result<()>;

    /// Destroy the session and whatever the multiplexer tears down with it.
    async fn kill_session(&self, name: &str) -> Result<()>;

    /// Replace the current process with an interactive attach to `name`.
    ///
    /// Only returns if the replacement could not happen.
    fn attach_session(&self, name: &str) -> Result<Infallible>;
}

/// [`SessionChannel`] backed by the `tmux` binary.
#[derive(Debug, Clone)]
pub struct TmuxChannel {
    program: String,
    /// Server socket name passed as `-L`; `None` uses the default server.
    socket: Option<String>,
}

impl Default for TmuxChannel {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl TmuxChannel {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            socket: None,
        }
    }

    /// Talk to a separate tmux server on the named socket.
    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    fn base_args(&self) -> Vec<String> {
        match &self.socket {
            Some(socket) => vec!["-L".to_string(), socket.clone()],
            None => Vec::new(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.base_args())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Run a tmux command, failing on a non-zero exit.
    async fn run(&self, mut cmd: Command, what: &str) -> Result<()> {
        let output = cmd.output().await.map_err(|e| {
            McrError::command_failed_with_stderr(
                format!("Failed to run {} for {}: {}", self.program, what, e),
                None,
            )
        })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(McrError::command_failed_with_stderr(
                format!("tmux {} exited with {}", what, output.status),
                Some(&stderr),
            ))
        }
    }
}

/// Exact-match target for a session (tmux otherwise matches prefixes).
fn exact(name: &str) -> String {
    format!("={}", name)
}

/// Active pane of a session, independent of `base-index` settings.
fn console_pane(name: &str) -> String {
    format!("={}:", name)
}

#[async_trait]
impl SessionChannel for TmuxChannel {
    async fn has_session(&self, name: &str) -> Result<bool> {
        let target = exact(name);
        let output = self
            .command(&["has-session", "-t", target.as_str()])
            .output()
            .await
            .map_err(|e| {
                McrError::command_failed_with_stderr(
                    format!("Failed to run {} has-session: {}", self.program, e),
                    None,
                )
            })?;
        // has-session reports absence through its exit status
        Ok(output.status.success())
    }

    async fn create_session(&self, name: &str, spawn: &SessionSpawn) -> Result<()> {
        let shell = format!("exec {}", spawn.command.command_line());
        debug!("Creating tmux session '{}' running: {}", name, shell);

        // A running tmux server builds the session environment from its own;
        // the client's env only matters when this call starts the server.
        let home = spawn.home.to_string_lossy();
        let home_env = format!("HOME={}", home);
        let mut args = vec!["new-session", "-d", "-s", name, "-e", home_env.as_str()];
        if spawn.home.is_dir() {
            args.extend(["-c", &*home]);
        }
        args.push(shell.as_str());

        let mut cmd = self.command(&args);
        cmd.env("HOME", &spawn.home);
        if spawn.home.is_dir() {
            cmd.current_dir(&spawn.home);
        }
        self.run(cmd, "new-session").await
    }

    async fn send_line(&self, name: &str, text: &str) -> Result<()> {
        let target = console_pane(name);
        if !text.is_empty() {
            let cmd = self.command(&["send-keys", "-t", target.as_str(), "-l", "--", text]);
            self.run(cmd, "send-keys").await?;
        }
        let cmd = self.command(&["send-keys", "-t", target.as_str(), "C-m"]);
        self.run(cmd, "send-keys").await
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        let target = exact(name);
        let cmd = self.command(&["kill-session", "-t", target.as_str()]);
        self.run(cmd, "kill-session").await
    }

    #[cfg(unix)]
    fn attach_session(&self, name: &str) -> Result<Infallible> {
        use std::os::unix::process::CommandExt;

        let target = exact(name);
        // exec only returns on failure; on success tmux owns this process
        let err = std::process::Command::new(&self.program)
            .args(self.base_args())
            .args(["attach-session", "-t", target.as_str()])
            .exec();
        Err(McrError::general(format!(
            "Failed to exec {} attach-session: {}",
            self.program, err
        )))
    }

    #[cfg(not(unix))]
    fn attach_session(&self, _name: &str) -> Result<Infallible> {
        Err(McrError::not_implemented("Attaching on this platform"))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording channel for controller and backup tests.

    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    /// A call observed by [`RecordingChannel`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        Has(String),
        Create { name: String, command: String },
        Send { name: String, text: String },
        Kill(String),
        Attach(String),
    }

    #[derive(Default)]
    struct State {
        running: HashSet<String>,
        calls: Vec<Call>,
        fail_sends: HashSet<String>,
        fail_has: bool,
        /// Session disappears once this line is sent.
        exit_on: Option<String>,
    }

    /// In-memory [`SessionChannel`] that records every call.
    #[derive(Default)]
    pub struct RecordingChannel {
        state: Mutex<State>,
    }

    impl RecordingChannel {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_running(self, name: &str) -> Self {
            self.state.lock().unwrap().running.insert(name.to_string());
            self
        }

        /// End the session when `line` is sent, like a server that exits on `stop`.
        pub fn exit_on(self, line: &str) -> Self {
            self.state.lock().unwrap().exit_on = Some(line.to_string());
            self
        }

        /// Make every attempt to send `line` fail.
        pub fn fail_send(self, line: &str) -> Self {
            self.state.lock().unwrap().fail_sends.insert(line.to_string());
            self
        }

        pub fn fail_has_session(self) -> Self {
            self.state.lock().unwrap().fail_has = true;
            self
        }

        pub fn calls(&self) -> Vec<Call> {
            self.state.lock().unwrap().calls.clone()
        }

        /// Lines sent to any session, in order, including failed attempts.
        pub fn sent(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Send { text, .. } => Some(text),
                    _ => None,
                })
                .collect()
        }

        pub fn creates(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|call| matches!(call, Call::Create { .. }))
                .collect()
        }

        pub fn is_running(&self, name: &str) -> bool {
            self.state.lock().unwrap().running.contains(name)
        }
    }

    #[async_trait]
    impl SessionChannel for RecordingChannel {
        async fn has_session(&self, name: &str) -> Result<bool> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Has(name.to_string()));
            if state.fail_has {
                return Err(McrError::general("has-session failed"));
            }
            Ok(state.running.contains(name))
        }

        async fn create_session(&self, name: &str, spawn: &SessionSpawn) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Create {
                name: name.to_string(),
                command: spawn.command.command_line(),
            });
            state.running.insert(name.to_string());
            Ok(())
        }

        async fn send_line(&self, name: &str, text: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Send {
                name: name.to_string(),
                text: text.to_string(),
            });
            if state.fail_sends.contains(text) {
                return Err(McrError::general(format!("send of '{}' failed", text)));
            }
            if state.exit_on.as_deref() == Some(text) {
                state.running.remove(name);
            }
            Ok(())
        }

        async fn kill_session(&self, name: &str) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Kill(name.to_string()));
            state.running.remove(name);
            Ok(())
        }

        fn attach_session(&self, name: &str) -> Result<Infallible> {
            let mut state = self.state.lock().unwrap();
            state.calls.push(Call::Attach(name.to_string()));
            Err(McrError::general("attach refused in tests"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tmux_available() -> bool {
        std::process::Command::new("tmux")
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_targets_are_exact() {
        assert_eq!(exact("mc"), "=mc");
        assert_eq!(console_pane("mc1"), "=mc1:");
    }

    #[test]
    fn test_socket_args() {
        assert!(TmuxChannel::default().base_args().is_empty());
        assert_eq!(
            TmuxChannel::new("tmux").with_socket("mcr-test").base_args(),
            vec!["-L", "mcr-test"]
        );
    }

    #[tokio::test]
    async fn test_missing_binary_reports_general_error() {
        let channel = TmuxChannel::new("/nonexistent/mcr-tmux");
        let err = channel.has_session("mc").await.unwrap_err();
        assert_eq!(err.exit_code(), 1);
        assert!(err.message.contains("/nonexistent/mcr-tmux"));
    }

    #[tokio::test]
    async fn test_tmux_session_lifecycle() {
        if !tmux_available() {
            eprintln!("tmux not installed, skipping");
            return;
        }

        let socket = format!("mcr-test-{}", std::process::id());
        let channel = TmuxChannel::default().with_socket(socket.clone());
        let name = "mcr-lifecycle";

        assert!(!channel.has_session(name).await.unwrap());

        let spawn = SessionSpawn {
            command: LaunchCommand {
                program: "cat".to_string(),
                args: Vec::new(),
            },
            home: std::env::temp_dir(),
        };
        channel.create_session(name, &spawn).await.unwrap();
        assert!(channel.has_session(name).await.unwrap());
        // a prefix of the name is a different session
        assert!(!channel.has_session("mcr-life").await.unwrap());

        channel.send_line(name, "save-all").await.unwrap();
        channel.send_line(name, "").await.unwrap();

        channel.kill_session(name).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!channel.has_session(name).await.unwrap());

        kill_server(&socket);
    }

    fn kill_server(socket: &str) {
        let _ = std::process::Command::new("tmux")
            .args(["-L", socket, "kill-server"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }

    #[tokio::test]
    async fn test_second_session_gets_its_own_home() {
        if !tmux_available() {
            eprintln!("tmux not installed, skipping");
            return;
        }

        let socket = format!("mcr-env-{}", std::process::id());
        let channel = TmuxChannel::default().with_socket(socket.clone());
        let first_home = tempfile::tempdir().unwrap();
        let second_home = tempfile::tempdir().unwrap();
        let second_path = second_home.path().canonicalize().unwrap();

        // The first session starts the tmux server with this process's env
        let first = SessionSpawn {
            command: LaunchCommand {
                program: "cat".to_string(),
                args: Vec::new(),
            },
            home: first_home.path().to_path_buf(),
        };
        channel.create_session("mcr-env-first", &first).await.unwrap();

        let second = SessionSpawn {
            command: LaunchCommand {
                program: "sh".to_string(),
                args: vec![
                    "-c".to_string(),
                    "echo \"$HOME\" > env.out; pwd >> env.out; exec cat".to_string(),
                ],
            },
            home: second_path.clone(),
        };
        channel.create_session("mcr-env-second", &second).await.unwrap();

        let out = second_path.join("env.out");
        let mut contents = String::new();
        for _ in 0..50 {
            contents = std::fs::read_to_string(&out).unwrap_or_default();
            if contents.lines().count() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        kill_server(&socket);

        let lines: Vec<&str> = contents.lines().collect();
        let expected = second_path.to_string_lossy();
        assert_eq!(lines, vec![expected.as_ref(), expected.as_ref()]);
    }
}
