//! Server definitions and the on-disk config store.
//!
//! A config store is either a single TOML file or a directory of `*.toml`
//! files. Every top-level table is one server:
//!
//! ```toml
//! [survival]
//! dir = "/srv/minecraft/survival"
//! jar = "server.jar"
//! tmuxname = "mc-survival"
//! backupdir = "/srv/backups"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::error::McrError;

/// Session name used when `tmuxname` is unset or empty.
pub const DEFAULT_SESSION_NAME: &str = "mc";

/// Launch binary used when `java` is unset or empty.
pub const DEFAULT_JAVA_COMMAND: &str = "java";

/// Patterns skipped by backups when `backupexclude` is unset.
pub const DEFAULT_BACKUP_EXCLUDES: &[&str] = &["*.log"];

/// Errors raised while loading or validating server definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no or empty config at {0:?}")]
    Empty(PathBuf),

    #[error("required option \"{key}\" not set for server '{server}'")]
    MissingKey { server: String, key: &'static str },

    #[error("directory {path:?} for server '{server}' does not exist")]
    MissingDirectory { server: String, path: PathBuf },

    #[error("invalid tmux session name '{name}' for server '{server}' (no ':', '.', whitespace or leading '-')")]
    InvalidSessionName { server: String, name: String },

    #[error("server '{server}' in {path:?} is already defined in another file")]
    Duplicate { server: String, path: PathBuf },
}

impl From<ConfigError> for McrError {
    fn from(err: ConfigError) -> Self {
        McrError::config(err.to_string())
    }
}

/// One server table exactly as written in the config file.
///
/// Key names follow the historical mcr config format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    pub dir: Option<PathBuf>,
    pub jar: Option<String>,
    pub tmuxname: Option<String>,
    pub java: Option<String>,
    pub javaargs: Option<Vec<String>>,
    pub backupdir: Option<String>,
    pub backupremotetype: Option<String>,
    pub backupremoteaddress: Option<String>,
    pub backupexclude: Option<Vec<String>>,
}

/// Remote backup target. Parsed and kept, but no transport exists yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBackup {
    pub kind: String,
    pub address: Option<String>,
}

/// A validated server definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub name: String,
    /// Server data directory; checked for existence at load time.
    pub directory: PathBuf,
    /// Jar path relative to `directory`.
    pub jar: String,
    pub session_name: String,
    /// Launch binary, run as a single program path.
    pub java: String,
    /// Extra arguments placed before `-jar`, e.g. heap flags.
    pub java_args: Vec<String>,
    /// `None` disables backups.
    pub backup_directory: Option<PathBuf>,
    pub backup_remote: Option<RemoteBackup>,
    pub backup_exclude: Vec<String>,
}

impl ServerConfig {
    /// Validate a raw section into a server definition.
    pub fn from_section(name: &str, section: ServerSection) -> Result<Self, ConfigError> {
        let directory = section.dir.ok_or_else(|| ConfigError::MissingKey {
            server: name.to_string(),
            key: "dir",
        })?;
        if !directory.is_dir() {
            return Err(ConfigError::MissingDirectory {
                server: name.to_string(),
                path: directory,
            });
        }

        let jar = section.jar.ok_or_else(|| ConfigError::MissingKey {
            server: name.to_string(),
            key: "jar",
        })?;

        let session_name = non_empty(section.tmuxname)
            .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string());
        if !is_valid_session_name(&session_name) {
            return Err(ConfigError::InvalidSessionName {
                server: name.to_string(),
                name: session_name,
            });
        }

        let backup_remote = non_empty(section.backupremotetype).map(|kind| RemoteBackup {
            kind,
            address: non_empty(section.backupremoteaddress),
        });

        Ok(Self {
            name: name.to_string(),
            directory,
            jar,
            session_name,
            java: non_empty(section.java).unwrap_or_else(|| DEFAULT_JAVA_COMMAND.to_string()),
            java_args: section.javaargs.unwrap_or_default(),
            backup_directory: non_empty(section.backupdir).map(PathBuf::from),
            backup_remote,
            backup_exclude: section.backupexclude.unwrap_or_else(|| {
                DEFAULT_BACKUP_EXCLUDES
                    .iter()
                    .map(|p| p.to_string())
                    .collect()
            }),
        })
    }

    /// Absolute path of the server jar.
    pub fn jar_path(&self) -> PathBuf {
        self.directory.join(&self.jar)
    }

    /// Command that launches this server: `<java> [javaargs..] -jar <directory>/<jar>`.
    pub fn launch_command(&self) -> LaunchCommand {
        let mut args = self.java_args.clone();
        args.push("-jar".to_string());
        args.push(self.jar_path().to_string_lossy().into_owned());
        LaunchCommand {
            program: self.java.clone(),
            args,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Check a tmux session name.
///
/// tmux treats `:` and `.` as target separators, and a leading hyphen would be
/// parsed as an option.
pub fn is_valid_session_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('-')
        && !name
            .chars()
            .any(|c| c == ':' || c == '.' || c.is_whitespace() || c.is_control())
}

/// A program plus arguments to run inside a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchCommand {
    /// Shell command line, quoting words that need it.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|word| shell_quote(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_line())
    }
}

fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// One server found in the store, valid or not.
#[derive(Debug)]
pub struct ConfigEntry {
    pub name: String,
    /// File the entry came from.
    pub source: PathBuf,
    pub config: Result<ServerConfig, ConfigError>,
}

/// Parse the text of one config file into raw sections.
pub fn parse_sections(
    path: &Path,
    text: &str,
) -> Result<BTreeMap<String, ServerSection>, ConfigError> {
    toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Per-user store of server definitions.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Config files in this store, sorted by path.
    pub fn files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }

        let read_dir = std::fs::read_dir(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;

        let mut files: Vec<PathBuf> = read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Load every server in the store.
    ///
    /// A file that cannot be read or parsed becomes a single failed entry named
    /// after the file, so one broken file never hides the others. Fails only
    /// when the store itself is missing or holds no servers at all.
    pub fn load(&self) -> Result<Vec<ConfigEntry>, ConfigError> {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for file in self.files()? {
            debug!("Loading server config from {:?}", file);
            let sections = std::fs::read_to_string(&file)
                .map_err(|source| ConfigError::Io {
                    path: file.clone(),
                    source,
                })
                .and_then(|text| parse_sections(&file, &text));

            let sections = match sections {
                Ok(sections) => sections,
                Err(err) => {
                    let name = file
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_else(|| file.to_string_lossy().into_owned());
                    entries.push(ConfigEntry {
                        name,
                        source: file.clone(),
                        config: Err(err),
                    });
                    continue;
                }
            };

            for (name, section) in sections {
                let config = if seen.insert(name.clone()) {
                    ServerConfig::from_section(&name, section)
                } else {
                    Err(ConfigError::Duplicate {
                        server: name.clone(),
                        path: file.clone(),
                    })
                };
                entries.push(ConfigEntry {
                    name,
                    source: file.clone(),
                    config,
                });
            }
        }

        if entries.is_empty() {
            return Err(ConfigError::Empty(self.path.clone()));
        }
        Ok(entries)
    }
}

/// Template written by `mcr mkconfig`.
pub const EXAMPLE_CONFIG: &str = r#"# mcr server definitions. One table per server.

[default]
# Server data directory (required, must exist).
dir = "/srv/minecraft/default"
# Server jar, relative to dir (required).
jar = "server.jar"
# tmux session name (default "mc").
tmuxname = "mc"
# Launch binary path (default "java"). Arguments go in javaargs.
java = "java"
# Arguments passed to java before -jar.
javaargs = ["-Xmx2G"]
# Root directory for backups; leave empty to disable backups.
backupdir = ""
# Entries skipped when backing up (default ["*.log"]).
backupexclude = ["*.log"]
# Remote backups are not implemented yet.
backupremotetype = ""
backupremoteaddress = ""
"#;
