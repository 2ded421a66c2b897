//! Server lifecycle management on top of tmux sessions.

pub mod backup;
pub mod channel;
pub mod controller;
pub mod paths;
pub mod registry;

// Public API - used by main.rs
pub use channel::TmuxChannel;
pub use controller::{RestartOptions, StopOptions};
pub use registry::ServerRegistry;
