use crate::sources::desktop::{Action, DesktopEntry};
use crate::sources::exec::ExecValue;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Attached,
    Detached,
}

impl StartMode {
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "a" => Some(StartMode::Attached),
            "d" => Some(StartMode::Detached),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            StartMode::Attached => "attached",
            StartMode::Detached => "detached",
        }
    }
}

/// One level of the MIME broadening walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MimeDesktopIds {
    #[serde(rename = "Mime")]
    pub mime: String,
    #[serde(rename = "DesktopIds")]
    pub desktop_ids: Vec<String>,
}

/// What we were asked to open, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    File(PathBuf),
    Url { url: String, scheme: String },
}

/// Which field codes an application must support to be offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    LocalFile,
    Url { downloadable: bool },
}

impl Target {
    /// True when only URL-capable execs can handle the resource.
    pub fn requires_url_support(self) -> bool {
        matches!(self, Target::Url { downloadable: false })
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub desktop_id: String,
    /// First path of the desktop ID that parsed.
    pub entry_path: PathBuf,
    pub entry: DesktopEntry,
    /// Sub-actions that fit the resource.
    pub actions: Vec<Action>,
}

impl Candidate {
    pub fn name(&self) -> &str {
        &self.entry.name
    }

    /// Exec of the main entry, or of the sub-action at `action` (0-based).
    pub fn exec(&self, action: Option<usize>) -> Option<&ExecValue> {
        match action {
            None => Some(&self.entry.exec),
            Some(index) => self.actions.get(index).map(|a| &a.exec),
        }
    }
}
