use crate::sources::desktop::DesktopEntry;
use anyhow::Result;
use directories::BaseDirs;
use std::env;
use std::path::{Path, PathBuf};

pub mod desktop;
pub mod exec;
pub mod mimeapps;
pub mod mimeinfo;
pub mod sniff;

/// Broader MIME types of a type, highest priority first.
pub trait MimeHierarchy {
    fn broader(&self, mime: &str) -> Vec<String>;
}

pub trait EntryParser {
    fn parse(&self, path: &Path) -> Result<DesktopEntry>;
}

/// Reads desktop files from disk.
pub struct DesktopFileParser;

impl EntryParser for DesktopFileParser {
    fn parse(&self, path: &Path) -> Result<DesktopEntry> {
        Ok(desktop::parse_file(path)?)
    }
}

pub fn data_home() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.data_dir().to_path_buf())
}

pub fn data_dirs() -> Vec<PathBuf> {
    env_paths("XDG_DATA_DIRS", &["/usr/local/share", "/usr/share"])
}

pub fn config_home() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
}

pub fn config_dirs() -> Vec<PathBuf> {
    env_paths("XDG_CONFIG_DIRS", &["/etc/xdg"])
}

fn env_paths(var: &str, defaults: &[&str]) -> Vec<PathBuf> {
    let from_env: Vec<PathBuf> = env::var(var)
        .unwrap_or_default()
        .split(':')
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .collect();

    if from_env.is_empty() {
        defaults.iter().map(PathBuf::from).collect()
    } else {
        from_env
    }
}
