//! Centralized path definitions for config files and directories.
//!
//! No other module should hard-code these strings. Functions take the config
//! dir explicitly so the server, the CLI and tests can each point elsewhere.

use std::path::{Path, PathBuf};

// ── Application identity ─────────────────────────────────────────

pub const APP_DIR_NAME: &str = "editor-relay";

// ── Leaf filenames ───────────────────────────────────────────────

pub const SETTINGS_FILE: &str = "settings.json";
pub const PORT_FILE: &str = ".relay-port";

// ── Directory names ──────────────────────────────────────────────

pub const AUDIT_DIR: &str = "audit";

// ── Config-dir functions ─────────────────────────────────────────

pub fn settings_path(config_dir: &Path) -> PathBuf {
    config_dir.join(SETTINGS_FILE)
}

pub fn port_file_path(config_dir: &Path) -> PathBuf {
    config_dir.join(PORT_FILE)
}

pub fn audit_dir(config_dir: &Path) -> PathBuf {
    config_dir.join(AUDIT_DIR)
}

/// `$XDG_CONFIG_HOME/editor-relay`, falling back to `~/.config/editor-relay`.
pub fn default_config_dir() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME").map_or_else(
        |_| home_dir().join(".config"),
        PathBuf::from,
    );
    base.join(APP_DIR_NAME)
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_or_else(|_| PathBuf::from("."), PathBuf::from)
}
