//! Config and home directory resolution.
//!
//! Priority for the config store:
//! 1. `--config` on the command line (handled by the caller)
//! 2. `MCR_CONFIG_DIR` (explicit override, ignores empty string)
//! 3. `~<user>/.config/mcr`
//!
//! `MCR_TMUX` overrides the tmux binary.

use std::env;
use std::path::PathBuf;

/// Get the tmux binary from env or default.
pub fn tmux_program() -> String {
    match env::var("MCR_TMUX") {
        Ok(program) if !program.is_empty() => program,
        _ => "tmux".to_string(),
    }
}

/// Home directory of `user`, or of the current user when `None` or empty.
pub fn user_home(user: Option<&str>) -> Option<PathBuf> {
    match user {
        Some(name) if !name.is_empty() => home_of(name),
        _ => dirs::home_dir(),
    }
}

/// Get the config store path with priority fallback.
pub fn config_dir(user: Option<&str>) -> Option<PathBuf> {
    if let Ok(dir) = env::var("MCR_CONFIG_DIR") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }

    user_home(user).map(|home| home.join(".config").join("mcr"))
}

/// Look up a named user's home directory in the password database.
#[cfg(unix)]
fn home_of(user: &str) -> Option<PathBuf> {
    use std::ffi::{CStr, CString, OsStr};
    use std::os::unix::ffi::OsStrExt;

    let name = CString::new(user).ok()?;
    let mut buf = vec![0 as libc::c_char; 16 * 1024];
    // SAFETY: passwd is a plain C struct; all-zero is a valid (empty) value
    // that getpwnam_r overwrites on success.
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: every pointer refers to a live local; buf.len() is the true
    // capacity of buf, so getpwnam_r never writes past it.
    let rc = unsafe {
        libc::getpwnam_r(
            name.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };
    if rc != 0 || result.is_null() || pwd.pw_dir.is_null() {
        return None;
    }

    // SAFETY: on success pw_dir points at a NUL-terminated string inside buf,
    // which outlives this borrow.
    let dir = unsafe { CStr::from_ptr(pwd.pw_dir) };
    Some(PathBuf::from(OsStr::from_bytes(dir.to_bytes())))
}

#[cfg(not(unix))]
fn home_of(_user: &str) -> Option<PathBuf> {
    None
}
