//! Backup coordination around a live server.
//!
//! While the copy runs the server's own saving is switched off, so the
//! snapshot is not written to halfway through. Saving is switched back on
//! whatever happens to the copy.

use std::path::{Path, PathBuf};

use chrono::Local;
use mcr_core::backup::{backup_destination, copy_tree, ExcludeSet};
use mcr_core::error::{McrError, Result};
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::manager::controller::ServerController;

/// Runs one backup for a controller. Callers hold the lifecycle lock.
pub struct BackupCoordinator<'a> {
    server: &'a ServerController,
}

impl<'a> BackupCoordinator<'a> {
    pub fn new(server: &'a ServerController) -> Self {
        Self { server }
    }

    pub async fn run(&self, remote: bool) -> Result<PathBuf> {
        let config = self.server.config();

        if remote {
            error!("Remote backup not implemented");
            return Err(McrError::not_implemented("Remote backup"));
        }
        let Some(root) = config.backup_directory.as_deref() else {
            error!("Backup directory not set");
            return Err(McrError::config(format!(
                "Backup directory not set for server '{}'",
                config.name
            )));
        };
        let exclude = ExcludeSet::new(&config.backup_exclude).map_err(|e| {
            McrError::config(format!(
                "Invalid backup exclude pattern for server '{}': {}",
                config.name, e
            ))
        })?;

        let destination = backup_destination(root, Local::now().naive_local());
        let running = self.server.current_status().await.is_running();

        if running {
            self.server.send_best_effort("").await;
            self.server.send_best_effort("broadcast [Backing up]").await;
            self.server.send_best_effort("save-off").await;
            sleep(self.server.timings().save_pause).await;
            self.server.send_best_effort("save-all").await;
        }

        let result = self.copy(root, destination, exclude).await;

        // Must run even when the copy failed, or saving stays off.
        if running {
            self.server.send_best_effort("").await;
            self.server.send_best_effort("save-on").await;
            let notice = if result.is_ok() {
                "broadcast [Backup complete]"
            } else {
                "broadcast [Backup failed, notify staff]"
            };
            self.server.send_best_effort(notice).await;
        }

        result
    }

    async fn copy(&self, root: &Path, destination: PathBuf, exclude: ExcludeSet) -> Result<PathBuf> {
        if !root.is_dir() {
            error!("Backup directory {:?} does not exist", root);
            return Err(McrError::general(format!(
                "Backup directory {:?} does not exist",
                root
            )));
        }

        let source = self.server.config().directory.clone();
        debug!("Backing up {:?} to {:?}", source, destination);

        let target = destination.clone();
        let stats = tokio::task::spawn_blocking(move || copy_tree(&source, &target, &exclude))
            .await
            .map_err(|e| McrError::general(format!("Backup task failed: {}", e)))?
            .map_err(|e| {
                error!("Backup copy failed: {}", e);
                McrError::general(format!("Backup copy to {:?} failed: {}", destination, e))
            })?;

        info!(
            "Backup written to {:?} ({} files, {} bytes)",
            destination, stats.files, stats.bytes
        );
        Ok(destination)
    }
}
