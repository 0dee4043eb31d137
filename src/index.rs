use crate::error::{OpnError, Result};
use crate::sources::desktop::IdPathMap;
use crate::sources::mimeapps::Associations;
use chrono::{DateTime, Duration, Local};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs::{self, DirBuilder};
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

pub const INDEX_VERSION: u32 = 1;
pub const CACHE_FILE_NAME: &str = "db.json";

pub fn default_ttl() -> Duration {
    Duration::hours(24)
}

/// Lookup tables for MIME associations and desktop file locations.
///
/// An index never changes after construction, regenerating produces a new
/// value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Index {
    version: u32,
    generated_on: DateTime<Local>,
    associations: Associations,
    desktop_id_to_paths: IdPathMap,
}

impl Index {
    pub fn new(
        associations: Associations,
        desktop_id_to_paths: IdPathMap,
        generated_on: DateTime<Local>,
    ) -> Self {
        Self {
            version: INDEX_VERSION,
            generated_on,
            associations,
            desktop_id_to_paths,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn generated_on(&self) -> DateTime<Local> {
        self.generated_on
    }

    pub fn associations(&self) -> &Associations {
        &self.associations
    }

    /// Desktop IDs associated with exactly this MIME type.
    pub fn desktop_ids_for_mime(&self, mime: &str) -> &[String] {
        self.associations.get(mime).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn desktop_file_locations(&self, desktop_id: &str) -> &[String] {
        self.desktop_id_to_paths
            .get(desktop_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// An expiry past the representable range never comes.
    pub fn is_fresh(&self, now: DateTime<Local>, ttl: Duration) -> bool {
        self.generated_on
            .checked_add_signed(ttl)
            .is_none_or(|expires| now < expires)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(OpnError::CacheNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        let index: Index =
            serde_json::from_str(&content).map_err(|source| OpnError::CacheParse {
                path: path.to_path_buf(),
                source,
            })?;

        if index.version != INDEX_VERSION {
            return Err(OpnError::CacheVersion {
                path: path.to_path_buf(),
                found: index.version,
                expected: INDEX_VERSION,
            });
        }

        Ok(index)
    }

    /// Writes the index next to `path` and renames it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        DirBuilder::new().recursive(true).mode(0o750).create(parent)?;

        let tmp = NamedTempFile::new_in(parent)?;
        let mut writer = BufWriter::new(tmp);
        serde_json::to_writer(&mut writer, self).map_err(io::Error::from)?;
        writer.flush()?;
        let tmp = writer.into_inner().map_err(|e| e.into_error())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Resolves the cache file location. Relative paths are taken relative to
/// the cache directory.
pub fn cache_path(configured: Option<&Path>) -> Result<PathBuf> {
    let cache_dir = ProjectDirs::from("org", "opn", "opn").map(|dirs| dirs.cache_dir().to_path_buf());

    match (configured, cache_dir) {
        (Some(path), _) if path.is_absolute() => Ok(path.to_path_buf()),
        (Some(path), Some(dir)) => Ok(dir.join(path)),
        (None, Some(dir)) => Ok(dir.join(CACHE_FILE_NAME)),
        (_, None) => Err(OpnError::config(
            "could not determine the cache directory",
            "Set HOME or configure an absolute cache.path",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(generated_on: DateTime<Local>) -> Index {
        let mut associations = Associations::new();
        associations.insert(
            "text/html".into(),
            vec!["firefox.desktop".into(), "chromium.desktop".into()],
        );
        let mut paths = IdPathMap::new();
        paths.insert(
            "firefox.desktop".into(),
            vec![
                "/home/u/.local/share/applications/firefox.desktop".into(),
                "/usr/share/applications/firefox.desktop".into(),
            ],
        );
        Index::new(associations, paths, generated_on)
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/opn/db.json");
        let index = sample(Local::now());

        index.save(&path).unwrap();
        let loaded = Index::load(&path).unwrap();

        assert_eq!(loaded, index);
    }

    #[test]
    fn serializes_with_stable_field_names() {
        let json = serde_json::to_value(sample(Local::now())).unwrap();
        for key in ["Version", "GeneratedOn", "Associations", "DesktopIdToPaths"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["Version"], 1);
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = Index::load(&dir.path().join("db.json")).unwrap_err();
        assert!(matches!(err, OpnError::CacheNotFound(_)));
    }

    #[test]
    fn rejects_other_versions_and_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.json");

        let mut json = serde_json::to_value(sample(Local::now())).unwrap();
        json["Version"] = 2.into();
        fs::write(&path, json.to_string()).unwrap();
        assert!(matches!(
            Index::load(&path).unwrap_err(),
            OpnError::CacheVersion { found: 2, .. }
        ));

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Index::load(&path).unwrap_err(),
            OpnError::CacheParse { .. }
        ));
    }

    #[test]
    fn freshness_uses_ttl() {
        let now = Local::now();
        assert!(sample(now - Duration::hours(23)).is_fresh(now, default_ttl()));
        assert!(!sample(now - Duration::hours(25)).is_fresh(now, default_ttl()));
    }

    #[test]
    fn ttl_past_the_end_of_time_never_expires() {
        let now = Local::now();
        let ttl = Duration::hours(3_000_000_000);
        assert!(sample(now - Duration::hours(1000)).is_fresh(now, ttl));
        assert!(sample(now - Duration::hours(1)).is_fresh(now, Duration::hours(2)));
    }

    #[test]
    fn lookups_default_to_empty() {
        let index = sample(Local::now());
        assert_eq!(index.desktop_ids_for_mime("text/html").len(), 2);
        assert!(index.desktop_ids_for_mime("image/png").is_empty());
        assert!(index.desktop_file_locations("vim.desktop").is_empty());
    }

    #[test]
    fn absolute_cache_paths_are_kept() {
        assert_eq!(
            cache_path(Some(Path::new("/tmp/opn.json"))).unwrap(),
            PathBuf::from("/tmp/opn.json")
        );
    }
}
