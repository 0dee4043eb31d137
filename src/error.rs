use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = OpnError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum OpnError {
    #[error("cache not found at {0}")]
    CacheNotFound(PathBuf),

    #[error("parsing error loading index from '{path}': {source}")]
    CacheParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("index at '{path}' has version {found}, expected {expected}")]
    CacheVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    /// Persisting a freshly generated index failed. Callers log this and
    /// keep using the in-memory index.
    #[error("failed to save cache: {0}")]
    SaveCache(String),

    #[error("failed to generate index: {0:#}")]
    Generate(anyhow::Error),

    #[error("No applications found that can open {}", format_mimes(.mimes))]
    NoApplication { mimes: Vec<String> },

    #[error("Error running command '{}': {source}", .argv.join(" "))]
    Launch {
        argv: Vec<String>,
        #[source]
        source: std::io::Error,
    },

    #[error("Command '{}' exited with {status}", .argv.join(" "))]
    ExitStatus {
        argv: Vec<String>,
        status: std::process::ExitStatus,
    },

    #[error("{message}. {hint}")]
    Config { message: String, hint: String },

    #[error("URL must be absolute: {0}")]
    InvalidUrl(String),

    #[error("error downloading {url}: {message}")]
    Download { url: String, message: String },

    #[error("failed to get MIME type of {path}: {message}")]
    MimeDetection { path: PathBuf, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OpnError {
    pub fn config(message: impl Into<String>, hint: impl Into<String>) -> Self {
        OpnError::Config {
            message: message.into(),
            hint: hint.into(),
        }
    }
}

fn format_mimes(mimes: &[String]) -> String {
    format!("[{}]", mimes.join(" "))
}
