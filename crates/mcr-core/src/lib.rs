//! Core types and logic for mcr.
//!
//! This crate holds the pieces of the game-server controller that do not talk
//! to tmux: validated server definitions, the error taxonomy shared with the
//! CLI, and the filesystem side of backups.
//!
//! # Modules
//!
//! - [`config`]: server definitions and the per-user config store
//! - [`error`]: error categories, hints, and process exit codes
//! - [`status`]: running/stopped state
//! - [`backup`]: snapshot naming and exclusion-aware tree copy
//!
//! # Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | general error (subprocess, filesystem, stop timeout, already running) |
//! | 2 | configuration error |
//! | 3 | server not running |
//! | 99 | not implemented |

pub mod backup;
pub mod config;
pub mod error;
pub mod status;
