use crate::sources::{MimeHierarchy, data_dirs, data_home};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;

const TEXT_PLAIN: &str = "text/plain";
const OCTET_STREAM: &str = "application/octet-stream";

/// Subclass relations from the shared MIME-info database.
#[derive(Debug, Default, Clone)]
pub struct SubclassTable {
    parents: HashMap<String, Vec<String>>,
}

impl SubclassTable {
    /// Reads `mime/subclasses` from the data home and every data dir.
    pub fn load_from_os() -> Self {
        let mut paths: Vec<PathBuf> = data_home().into_iter().collect();
        paths.extend(data_dirs());
        let paths: Vec<_> = paths.iter().map(|d| d.join("mime/subclasses")).collect();
        Self::load(&paths)
    }

    pub fn load(paths: &[PathBuf]) -> Self {
        let mut table = Self::default();
        for path in paths {
            match fs::read_to_string(path) {
                Ok(content) => {
                    debug!("Loaded subclasses from {:?}", path);
                    table.add(&content);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to read {:?}: {}", path, e),
            }
        }
        table
    }

    /// Adds `child parent` lines. Earlier sources take precedence, a pair
    /// seen twice is kept once.
    pub fn add(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(child), Some(parent)) = (parts.next(), parts.next()) else {
                continue;
            };
            let parents = self.parents.entry(child.to_string()).or_default();
            if !parents.iter().any(|p| p == parent) {
                parents.push(parent.to_string());
            }
        }
    }

    fn visit(&self, mime: &str, visited: &mut HashSet<String>, out: &mut Vec<String>) {
        let Some(parents) = self.parents.get(mime) else {
            return;
        };
        for parent in parents {
            if visited.insert(parent.clone()) {
                out.push(parent.clone());
                self.visit(parent, visited, out);
            }
        }
    }
}

impl MimeHierarchy for SubclassTable {
    /// Depth first over the declared parents, then the implicit supertypes:
    /// `text/plain` for text types and `application/octet-stream` for
    /// anything that is a stream of bytes.
    fn broader(&self, mime: &str) -> Vec<String> {
        let mut visited = HashSet::from([mime.to_string()]);
        let mut out = Vec::new();
        self.visit(mime, &mut visited, &mut out);

        let is_text = std::iter::once(mime)
            .chain(out.iter().map(String::as_str))
            .any(|m| m.starts_with("text/"));
        if is_text && visited.insert(TEXT_PLAIN.to_string()) {
            out.push(TEXT_PLAIN.to_string());
            self.visit(TEXT_PLAIN, &mut visited, &mut out);
        }

        let is_stream = !mime.starts_with("inode/") && !mime.starts_with("x-scheme-handler/");
        if is_stream && visited.insert(OCTET_STREAM.to_string()) {
            out.push(OCTET_STREAM.to_string());
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SubclassTable {
        let mut table = SubclassTable::default();
        table.add(
            "application/x-shellscript application/x-executable\n\
             application/x-shellscript text/plain\n\
             application/x-executable application/octet-stream\n\
             application/xhtml+xml application/xml\n\
             application/xml text/plain\n",
        );
        table
    }

    #[test]
    fn walks_parents_depth_first() {
        assert_eq!(
            table().broader("application/xhtml+xml"),
            vec!["application/xml", "text/plain", "application/octet-stream"]
        );
        assert_eq!(
            table().broader("application/x-shellscript"),
            vec!["application/x-executable", "application/octet-stream", "text/plain"]
        );
    }

    #[test]
    fn text_types_broaden_to_text_plain() {
        assert_eq!(
            table().broader("text/html"),
            vec!["text/plain", "application/octet-stream"]
        );
        assert_eq!(table().broader("text/plain"), vec!["application/octet-stream"]);
    }

    #[test]
    fn scheme_handlers_and_inodes_have_no_supertypes() {
        assert!(table().broader("x-scheme-handler/https").is_empty());
        assert!(table().broader("inode/directory").is_empty());
        assert!(table().broader("application/octet-stream").is_empty());
    }

    #[test]
    fn loads_files_and_ignores_missing_ones() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subclasses");
        fs::write(&path, "image/svg+xml application/xml\n").unwrap();

        let table = SubclassTable::load(&[dir.path().join("missing"), path]);

        assert_eq!(table.broader("image/svg+xml")[0], "application/xml");
    }
}
