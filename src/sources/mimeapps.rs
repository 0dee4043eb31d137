use crate::sources::desktop::IdPathMap;
use crate::sources::{config_dirs, config_home, data_dirs, data_home};
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

/// MIME type to desktop IDs, highest priority first.
pub type Associations = BTreeMap<String, Vec<String>>;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MimeAppsList {
    pub defaults: HashMap<String, Vec<String>>,
    pub added: HashMap<String, Vec<String>>,
    pub removed: HashMap<String, Vec<String>>,
}

/// Candidate `mimeapps.list` files, highest priority first. Desktop specific
/// lists precede the generic one in every directory.
pub fn list_locations(current_desktop: &str) -> Vec<PathBuf> {
    let desktops: Vec<String> = current_desktop
        .split(':')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut bases = Vec::new();
    bases.extend(config_home());
    bases.extend(config_dirs());
    bases.extend(data_home().map(|d| d.join("applications")));
    bases.extend(data_dirs().into_iter().map(|d| d.join("applications")));

    let mut locations = Vec::new();
    for base in bases {
        for desktop in &desktops {
            locations.push(base.join(format!("{desktop}-mimeapps.list")));
        }
        locations.push(base.join("mimeapps.list"));
    }
    locations
}

/// Loads every existing list for the given `XDG_CURRENT_DESKTOP` value.
pub fn get_lists(current_desktop: &str) -> Vec<MimeAppsList> {
    let mut lists = Vec::new();
    for path in list_locations(current_desktop) {
        match fs::read_to_string(&path) {
            Ok(content) => {
                debug!("Loaded associations from {:?}", path);
                lists.push(parse_list(&content));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to read {:?}: {}", path, e),
        }
    }
    lists
}

pub fn parse_list(content: &str) -> MimeAppsList {
    let mut list = MimeAppsList::default();
    let mut section: Option<&mut HashMap<String, Vec<String>>> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') {
            section = match line {
                "[Default Applications]" => Some(&mut list.defaults),
                "[Added Associations]" => Some(&mut list.added),
                "[Removed Associations]" => Some(&mut list.removed),
                _ => None,
            };
            continue;
        }

        let (Some(target), Some((mime, value))) = (section.as_deref_mut(), line.split_once('='))
        else {
            continue;
        };

        let ids = target.entry(mime.trim().to_string()).or_default();
        for id in ids_of(value) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    list
}

fn ids_of(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Combines the lists with the MIME types installed entries declare.
///
/// Order per MIME type: defaults in list order, then added associations not
/// removed by the same or a higher priority list, then the implicit
/// associations from `declared` that no list removes. Desktop IDs that are
/// not installed are skipped.
pub fn preferred_applications(
    lists: &[MimeAppsList],
    installed: &IdPathMap,
    declared: &[(String, Vec<String>)],
) -> Associations {
    let mut result = Associations::new();
    let mut push = |mime: &str, id: &str| {
        if !installed.contains_key(id) {
            return;
        }
        let ids = result.entry(mime.to_string()).or_default();
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    };

    for list in lists {
        for (mime, ids) in &list.defaults {
            for id in ids {
                push(mime, id);
            }
        }
    }

    let mut removed: HashMap<&str, HashSet<&str>> = HashMap::new();
    for list in lists {
        for (mime, ids) in &list.removed {
            removed
                .entry(mime.as_str())
                .or_default()
                .extend(ids.iter().map(String::as_str));
        }
        for (mime, ids) in &list.added {
            for id in ids {
                if !is_removed(&removed, mime, id) {
                    push(mime, id);
                }
            }
        }
    }

    for (id, mimes) in declared {
        for mime in mimes {
            if !is_removed(&removed, mime, id) {
                push(mime, id);
            }
        }
    }

    result
}

fn is_removed(removed: &HashMap<&str, HashSet<&str>>, mime: &str, id: &str) -> bool {
    removed.get(mime).is_some_and(|ids| ids.contains(id))
}
