//! Builds controllers for every server in a config store.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use mcr_core::config::{ConfigStore, ServerConfig};
use mcr_core::error::{McrError, Result};
use tracing::{info_span, warn};

use crate::manager::channel::SessionChannel;
use crate::manager::controller::ServerController;

/// Controllers for the servers that loaded, and errors for those that did not.
pub struct ServerListing {
    pub servers: BTreeMap<String, ServerController>,
    pub failures: BTreeMap<String, McrError>,
}

/// Enumerates configured servers for one user.
pub struct ServerRegistry {
    store: ConfigStore,
    channel: Arc<dyn SessionChannel>,
    home: PathBuf,
}

impl ServerRegistry {
    pub fn new(store: ConfigStore, channel: Arc<dyn SessionChannel>, home: PathBuf) -> Self {
        Self {
            store,
            channel,
            home,
        }
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Load every server in the store.
    ///
    /// A server whose definition is invalid lands in `failures` without
    /// affecting the others.
    pub fn list_servers(&self) -> Result<ServerListing> {
        let entries = self.store.load()?;

        let mut servers = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for entry in entries {
            match entry.config {
                Ok(config) => {
                    servers.insert(entry.name, self.controller(config));
                }
                Err(e) => {
                    warn!(
                        "Skipping server '{}' from {:?}: {}",
                        entry.name, entry.source, e
                    );
                    failures.insert(entry.name, e.into());
                }
            }
        }

        Ok(ServerListing { servers, failures })
    }

    /// Controller for one server by name.
    pub fn get(&self, name: &str) -> Result<ServerController> {
        let mut listing = self.list_servers()?;
        if let Some(server) = listing.servers.remove(name) {
            return Ok(server);
        }
        match listing.failures.remove(name) {
            Some(err) => Err(err),
            None => Err(McrError::unknown_server(name)),
        }
    }

    fn controller(&self, config: ServerConfig) -> ServerController {
        let span = info_span!("server", name = %config.name, session = %config.session_name);
        ServerController::new(config, self.channel.clone(), self.home.clone()).with_span(span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::channel::testing::RecordingChannel;
    use mcr_core::error::ErrorCode;
    use mcr_core::status::ServerStatus;

    fn registry(root: &std::path::Path, channel: Arc<RecordingChannel>) -> ServerRegistry {
        ServerRegistry::new(
            ConfigStore::new(root),
            channel,
            PathBuf::from("/home/minecraft"),
        )
    }

    fn write_config(root: &std::path::Path, data: &std::path::Path) {
        std::fs::write(
            root.join("servers.toml"),
            format!(
                "[survival]\ndir = {:?}\njar = \"server.jar\"\ntmuxname = \"mc-survival\"\n\n\
                 [creative]\ndir = {:?}\njar = \"server.jar\"\ntmuxname = \"mc-creative\"\n\n\
                 [broken]\ndir = \"/definitely/not/here\"\njar = \"server.jar\"\n",
                data, data
            ),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_list_isolates_bad_config() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        write_config(root.path(), data.path());
        let channel = Arc::new(RecordingChannel::new().with_running("mc-creative"));

        let listing = registry(root.path(), channel).list_servers().unwrap();

        assert_eq!(
            listing.servers.keys().collect::<Vec<_>>(),
            vec!["creative", "survival"]
        );
        assert_eq!(
            listing.failures.get("broken").map(|e| e.code),
            Some(ErrorCode::ConfigError)
        );
        assert_eq!(
            listing.servers["creative"].status().await,
            ServerStatus::Running
        );
        assert_eq!(
            listing.servers["survival"].status().await,
            ServerStatus::Stopped
        );
    }

    #[test]
    fn test_get_known_and_unknown() {
        let root = tempfile::tempdir().unwrap();
        let data = tempfile::tempdir().unwrap();
        write_config(root.path(), data.path());
        let registry = registry(root.path(), Arc::new(RecordingChannel::new()));

        assert_eq!(registry.store().path(), root.path());

        let server = registry.get("survival").unwrap();
        assert_eq!(server.config().session_name, "mc-survival");
        assert_eq!(server.home(), std::path::Path::new("/home/minecraft"));

        let err = registry.get("broken").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
        assert!(err.message.contains("does not exist"));

        let err = registry.get("lobby").unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
        assert!(err.message.contains("lobby"));
    }

    #[test]
    fn test_empty_store_is_config_error() {
        let root = tempfile::tempdir().unwrap();
        let result = registry(root.path(), Arc::new(RecordingChannel::new())).list_servers();
        assert_eq!(result.err().map(|e| e.code), Some(ErrorCode::ConfigError));
    }
}
