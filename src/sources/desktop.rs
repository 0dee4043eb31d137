use crate::sources::exec::{ExecParseError, ExecValue};
use crate::sources::{data_dirs, data_home};
use log::{debug, info};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Desktop ID to desktop files, highest priority directory first.
pub type IdPathMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Error)]
pub enum DesktopParseError {
    #[error("error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no [Desktop Entry] group")]
    MissingGroup,
    #[error("missing required key {0}")]
    MissingKey(&'static str),
    #[error(transparent)]
    Exec(#[from] ExecParseError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub exec: ExecValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub name: String,
    pub exec: ExecValue,
    pub terminal: bool,
    pub icon: Option<String>,
    pub mime_types: Vec<String>,
    pub actions: Vec<Action>,
    pub hidden: bool,
}

/// `applications` directories in XDG priority order.
pub fn desktop_file_locations() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = data_home() {
        dirs.push(home.join("applications"));
    }
    for dir in data_dirs() {
        dirs.push(dir.join("applications"));
    }
    dirs
}

/// Scans the given locations and maps every desktop ID to the files that
/// provide it. Sub-directories contribute to the ID: `kde/okular.desktop`
/// becomes `kde-okular.desktop`.
pub fn desktop_files(locations: &[PathBuf]) -> IdPathMap {
    let mut map = IdPathMap::new();

    for dir in locations {
        if !dir.is_dir() {
            continue;
        }
        debug!("Scanning desktop files in {:?}", dir);

        let walker = WalkDir::new(dir).follow_links(true).sort_by_file_name();
        for entry in walker.into_iter().flatten() {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|s| s.to_str()) != Some("desktop")
            {
                continue;
            }

            let Some(id) = desktop_id(dir, path) else {
                continue;
            };
            map.entry(id)
                .or_default()
                .push(path.to_string_lossy().to_string());
        }
    }

    info!("DesktopSource: found {} desktop IDs", map.len());
    map
}

fn desktop_id(base: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(base).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    Some(parts.join("-"))
}

pub fn parse_file(path: &Path) -> Result<DesktopEntry, DesktopParseError> {
    let content = fs::read_to_string(path).map_err(|source| DesktopParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_desktop_file(&content)
}

enum Group {
    Entry,
    Action(String),
    Other,
}

#[derive(Default)]
struct RawAction {
    name: Option<String>,
    exec: Option<String>,
}

pub fn parse_desktop_file(content: &str) -> Result<DesktopEntry, DesktopParseError> {
    let mut group = Group::Other;
    let mut seen_entry = false;

    let mut name = None;
    let mut exec = None;
    let mut terminal = false;
    let mut icon = None;
    let mut mime_types = Vec::new();
    let mut action_ids = Vec::new();
    let mut hidden = false;
    let mut raw_actions: HashMap<String, RawAction> = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') {
            group = match line.trim_start_matches('[').trim_end_matches(']') {
                "Desktop Entry" => {
                    seen_entry = true;
                    Group::Entry
                }
                other => match other.strip_prefix("Desktop Action ") {
                    Some(id) => Group::Action(id.to_string()),
                    None => Group::Other,
                },
            };
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = unescape(value.trim());

        match &group {
            Group::Entry => match key {
                "Name" => name = Some(value),
                "Exec" => exec = Some(value),
                "Terminal" => terminal = value == "true",
                "Icon" => icon = Some(value),
                "MimeType" => mime_types = split_list(&value),
                "Actions" => action_ids = split_list(&value),
                "Hidden" => hidden = value == "true",
                _ => {}
            },
            Group::Action(id) => {
                let action = raw_actions.entry(id.clone()).or_default();
                match key {
                    "Name" => action.name = Some(value),
                    "Exec" => action.exec = Some(value),
                    _ => {}
                }
            }
            Group::Other => {}
        }
    }

    if !seen_entry {
        return Err(DesktopParseError::MissingGroup);
    }
    let name = name.ok_or(DesktopParseError::MissingKey("Name"))?;
    let exec = ExecValue::parse(&exec.ok_or(DesktopParseError::MissingKey("Exec"))?)?;

    let mut actions = Vec::new();
    for id in action_ids {
        let Some(raw) = raw_actions.remove(&id) else {
            continue;
        };
        // Actions without Exec are D-Bus activated, we cannot launch those.
        let (Some(action_name), Some(action_exec)) = (raw.name, raw.exec) else {
            debug!("Skipping incomplete action {}", id);
            continue;
        };
        actions.push(Action {
            id,
            name: action_name,
            exec: ExecValue::parse(&action_exec)?,
        });
    }

    Ok(DesktopEntry {
        name,
        exec,
        terminal,
        icon,
        mime_types,
        actions,
        hidden,
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => out.push(' '),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIM: &str = "\
# comment
[Desktop Entry]
Type=Application
Name=Vim
Name[de]=Vim Editor
Exec=vim %F
Terminal=true
Icon=gvim
MimeType=text/plain;text/x-c;
Actions=new;diff;

[Desktop Action diff]
Name=Diff
Exec=vim -d %F

[Desktop Action new]
Name=New Window
Exec=vim
";

    #[test]
    fn parses_entry_and_actions_in_declared_order() {
        let entry = parse_desktop_file(VIM).unwrap();
        assert_eq!(entry.name, "Vim");
        assert!(entry.terminal);
        assert_eq!(entry.icon.as_deref(), Some("gvim"));
        assert_eq!(entry.mime_types, vec!["text/plain", "text/x-c"]);
        let ids: Vec<_> = entry.actions.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "diff"]);
        assert!(entry.exec.can_open_files());
        assert!(!entry.actions[0].exec.can_open_files());
    }

    #[test]
    fn hidden_flag() {
        let entry = parse_desktop_file(
            "[Desktop Entry]\nName=Helper\nExec=helper %f\nHidden=true\nNoDisplay=true\n",
        )
        .unwrap();
        assert!(entry.hidden);
        assert!(entry.exec.can_open_files());
    }

    #[test]
    fn missing_exec_is_an_error() {
        let err = parse_desktop_file("[Desktop Entry]\nName=Broken\n").unwrap_err();
        assert!(matches!(err, DesktopParseError::MissingKey("Exec")));
    }

    #[test]
    fn keys_outside_entry_group_are_ignored() {
        let err = parse_desktop_file("[Other]\nName=X\nExec=x\n").unwrap_err();
        assert!(matches!(err, DesktopParseError::MissingGroup));
    }

    #[test]
    fn unescapes_string_values() {
        let entry =
            parse_desktop_file("[Desktop Entry]\nName=My\\sApp\nExec=\"/opt/my app/run\" %u\n")
                .unwrap();
        assert_eq!(entry.name, "My App");
        let args = entry.exec.to_arguments(&Default::default());
        assert_eq!(args, vec!["/opt/my app/run"]);
    }

    #[test]
    fn maps_nested_files_to_prefixed_ids() {
        let high = tempfile::tempdir().unwrap();
        let low = tempfile::tempdir().unwrap();
        fs::create_dir_all(high.path().join("kde")).unwrap();
        fs::write(high.path().join("kde/okular.desktop"), VIM).unwrap();
        fs::write(high.path().join("vim.desktop"), VIM).unwrap();
        fs::write(low.path().join("vim.desktop"), VIM).unwrap();
        fs::write(low.path().join("README"), "not a desktop file").unwrap();

        let map = desktop_files(&[high.path().to_path_buf(), low.path().to_path_buf()]);

        assert_eq!(map.len(), 2);
        assert_eq!(map["kde-okular.desktop"].len(), 1);
        let vim = &map["vim.desktop"];
        assert_eq!(vim.len(), 2);
        assert!(vim[0].starts_with(&*high.path().to_string_lossy()));
        assert!(vim[1].starts_with(&*low.path().to_string_lossy()));
    }
}
