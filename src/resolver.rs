use crate::error::{OpnError, Result};
use crate::index::Index;
use crate::model::{Candidate, MimeDesktopIds, Target};
use crate::sources::desktop::{Action, DesktopEntry};
use crate::sources::{EntryParser, MimeHierarchy};
use log::{debug, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Turns MIME types into the applications able to open them.
pub struct Resolver<'a> {
    index: &'a Index,
    hierarchy: &'a dyn MimeHierarchy,
    parser: &'a dyn EntryParser,
}

impl<'a> Resolver<'a> {
    pub fn new(
        index: &'a Index,
        hierarchy: &'a dyn MimeHierarchy,
        parser: &'a dyn EntryParser,
    ) -> Self {
        Self {
            index,
            hierarchy,
            parser,
        }
    }

    /// The exact type first, then every broader type in hierarchy order.
    /// E.g. text/html also yields the associations of text/plain.
    pub fn candidates_for_mime(&self, mime: &str) -> Vec<MimeDesktopIds> {
        std::iter::once(mime.to_string())
            .chain(self.hierarchy.broader(mime))
            .map(|mime| MimeDesktopIds {
                desktop_ids: self.index.desktop_ids_for_mime(&mime).to_vec(),
                mime,
            })
            .collect()
    }

    /// Flattens the levels into candidates. The first occurrence of a
    /// desktop ID decides its position, later ones are ignored.
    pub fn build_candidates(&self, levels: &[MimeDesktopIds], target: Target) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for level in levels {
            for desktop_id in &level.desktop_ids {
                if !seen.insert(desktop_id.as_str()) {
                    continue;
                }

                let Some((entry_path, entry)) = self.parse_first(desktop_id) else {
                    continue;
                };

                if target.requires_url_support() && !entry.exec.can_open_urls() {
                    // Downloading the resource turns it into a local file and
                    // lifts this restriction.
                    debug!("{} cannot open URLs, skipping", desktop_id);
                    continue;
                }

                let actions = filter_actions(&entry, target);
                candidates.push(Candidate {
                    desktop_id: desktop_id.clone(),
                    entry_path,
                    entry,
                    actions,
                });
            }
        }

        candidates
    }

    pub fn resolve(&self, mimes: &[String], target: Target) -> Result<Vec<Candidate>> {
        let levels: Vec<_> = mimes
            .iter()
            .flat_map(|mime| self.candidates_for_mime(mime))
            .collect();
        let candidates = self.build_candidates(&levels, target);

        if candidates.is_empty() {
            return Err(OpnError::NoApplication {
                mimes: mimes.to_vec(),
            });
        }
        Ok(candidates)
    }

    fn parse_first(&self, desktop_id: &str) -> Option<(PathBuf, DesktopEntry)> {
        for path in self.index.desktop_file_locations(desktop_id) {
            match self.parser.parse(Path::new(path)) {
                Ok(entry) => return Some((PathBuf::from(path), entry)),
                Err(e) => warn!("Error parsing desktop file {}: {:#}", path, e),
            }
        }
        debug!("No usable desktop file for {}", desktop_id);
        None
    }
}

/// Sub-actions worth offering for the target.
///
/// When the main exec accepts files, a sub-action without a file field code
/// is taken to be deliberately file-less (e.g. "New Window") and dropped.
/// For URLs that cannot be downloaded, sub-actions must accept URLs.
fn filter_actions(entry: &DesktopEntry, target: Target) -> Vec<Action> {
    entry
        .actions
        .iter()
        .filter(|action| !(entry.exec.can_open_files() && !action.exec.can_open_files()))
        .filter(|action| !(target.requires_url_support() && !action.exec.can_open_urls()))
        .cloned()
        .collect()
}
