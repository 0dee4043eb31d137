use crate::error::{OpnError, Result};
use crate::index::Index;
use crate::sources::desktop::{self, IdPathMap};
use crate::sources::mimeapps;
use crate::sources::{DesktopFileParser, EntryParser};
use chrono::{Duration, Local};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Builds a brand-new index from the system's desktop files and
/// association lists.
pub trait IndexGenerator {
    fn generate(&self) -> anyhow::Result<Index>;
}

pub struct SystemIndexGenerator {
    current_desktop: String,
}

impl SystemIndexGenerator {
    pub fn new(current_desktop: impl Into<String>) -> Self {
        Self {
            current_desktop: current_desktop.into(),
        }
    }
}

impl IndexGenerator for SystemIndexGenerator {
    fn generate(&self) -> anyhow::Result<Index> {
        let locations = desktop::desktop_file_locations();
        let id_paths = desktop::desktop_files(&locations);
        let lists = mimeapps::get_lists(&self.current_desktop);
        let declared = declared_mime_types(&id_paths, &DesktopFileParser);
        let associations = mimeapps::preferred_applications(&lists, &id_paths, &declared);

        info!(
            "Generated index: {} MIME types, {} desktop IDs",
            associations.len(),
            id_paths.len()
        );
        Ok(Index::new(associations, id_paths, Local::now()))
    }
}

/// MIME types each installed entry declares, taken from the highest
/// priority file that parses. Hidden entries declare nothing.
fn declared_mime_types(ids: &IdPathMap, parser: &dyn EntryParser) -> Vec<(String, Vec<String>)> {
    let mut declared = Vec::new();
    for (id, paths) in ids {
        let Some(entry) = paths.iter().find_map(|p| parser.parse(Path::new(p)).ok()) else {
            debug!("No parsable desktop file for {}", id);
            continue;
        };
        if entry.hidden || entry.mime_types.is_empty() {
            continue;
        }
        declared.push((id.clone(), entry.mime_types));
    }
    declared
}

pub struct LoadedIndex {
    pub index: Index,
    pub newly_generated: bool,
}

/// Loads the cached index, regenerating it when it is missing, unreadable
/// or stale.
pub struct IndexManager<G> {
    generator: G,
    cache_path: PathBuf,
    skip_cache: bool,
    ttl: Duration,
}

impl<G: IndexGenerator> IndexManager<G> {
    pub fn new(generator: G, cache_path: PathBuf, skip_cache: bool, ttl: Duration) -> Self {
        Self {
            generator,
            cache_path,
            skip_cache,
            ttl,
        }
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    pub fn load(&self) -> Result<LoadedIndex> {
        if self.skip_cache {
            return self.regenerate();
        }

        match Index::load(&self.cache_path) {
            Ok(index) if index.is_fresh(Local::now(), self.ttl) => {
                debug!("Using cached index from {:?}", self.cache_path);
                return Ok(LoadedIndex {
                    index,
                    newly_generated: false,
                });
            }
            Ok(index) => debug!("Cached index from {} is stale", index.generated_on()),
            Err(OpnError::CacheNotFound(path)) => debug!("No cached index at {:?}", path),
            Err(e) => warn!("Ignoring cached index: {}", e),
        }

        self.regenerate()
    }

    fn regenerate(&self) -> Result<LoadedIndex> {
        let index = self.generator.generate().map_err(OpnError::Generate)?;
        Ok(LoadedIndex {
            index,
            newly_generated: true,
        })
    }

    pub fn save(&self, index: &Index) -> Result<()> {
        index
            .save(&self.cache_path)
            .map_err(|e| OpnError::SaveCache(format!("{:?}: {}", self.cache_path, e)))
    }

    /// Loads the index and persists it when it was generated by this call.
    /// A failed save is logged, the in-memory index is still returned.
    pub fn load_and_save(&self) -> Result<Index> {
        let loaded = self.load()?;
        if loaded.newly_generated {
            if let Err(e) = self.save(&loaded.index) {
                warn!("{}", e);
            }
        }
        Ok(loaded.index)
    }
}
