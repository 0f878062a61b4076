use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Text scene files are preferred; binary crate files are the fallback.
const SCENE_EXTENSIONS: [&str; 2] = ["usda", "usdc"];

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("malformed container: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error while unpacking: {0}")]
    Io(#[from] io::Error),

    #[error("extraction cancelled after {extracted} entries")]
    Cancelled { extracted: usize },
}

/// Uniquely named directory under the working directory, removed on drop
/// unless [`ScratchDir::retain`] was called.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    retained: bool,
}

impl ScratchDir {
    pub fn create(parent: &Path) -> io::Result<Self> {
        let path = parent.join(format!("extract-{}", Uuid::new_v4().simple()));
        fs::create_dir_all(&path)?;
        Ok(Self {
            path,
            retained: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keeps the directory on disk for post-mortem inspection.
    pub fn retain(&mut self) {
        self.retained = true;
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.retained {
            info!(path = %self.path.display(), "keeping scratch directory for debugging");
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove scratch directory");
            }
        }
    }
}

/// Unpacks a zip-packaged container into `dest`. Entries whose names would
/// escape `dest` are skipped. `cancel` is checked before every entry; once
/// set, nothing more is written under `dest`.
pub fn extract_container(
    container: &Path,
    dest: &Path,
    cancel: &AtomicBool,
) -> Result<usize, ArchiveError> {
    let file = File::open(container).map_err(|source| ArchiveError::Open {
        path: container.display().to_string(),
        source,
    })?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut extracted = 0;

    for i in 0..archive.len() {
        if cancel.load(Ordering::Relaxed) {
            return Err(ArchiveError::Cancelled { extracted });
        }
        let mut entry = archive.by_index(i)?;
        let Some(rel_path) = entry.enclosed_name() else {
            warn!(name = %entry.name(), "skipping unsafe archive entry");
            continue;
        };
        let dest_path = dest.join(rel_path);

        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&dest_path)?;
            io::copy(&mut entry, &mut out)?;
            extracted += 1;
        }
    }

    Ok(extracted)
}

/// Finds the scene description to import, preferring `.usda` over `.usdc`.
/// Within one extension the lexicographically first path wins so the choice
/// does not depend on directory iteration order.
pub fn find_scene_file(root: &Path) -> io::Result<Option<PathBuf>> {
    let files = list_files(root)?;

    for ext in SCENE_EXTENSIONS {
        let mut matches: Vec<&PathBuf> = files
            .iter()
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(ext))
            })
            .collect();
        matches.sort();
        if let Some(found) = matches.first() {
            return Ok(Some((*found).clone()));
        }
    }

    Ok(None)
}

/// Every regular file under `root`, recursively.
pub fn list_files(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    /// Builds a stored (uncompressed) zip like real USDZ packages.
    pub(crate) fn write_container(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_nested_entries() {
        let dir = tempdir().unwrap();
        let container = dir.path().join("demo.usdz");
        write_container(
            &container,
            &[("scene.usdc", b"crate"), ("textures/wood.png", b"png")],
        );
        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();

        let count = extract_container(&container, &dest, &AtomicBool::new(false)).unwrap();

        assert_eq!(count, 2);
        assert!(dest.join("scene.usdc").is_file());
        assert!(dest.join("textures").join("wood.png").is_file());
    }

    #[test]
    fn malformed_container_is_an_error() {
        let dir = tempdir().unwrap();
        let container = dir.path().join("broken.usdz");
        fs::write(&container, b"definitely not a zip").unwrap();

        let err = extract_container(&container, dir.path(), &AtomicBool::new(false)).unwrap_err();
        assert!(matches!(err, ArchiveError::Zip(_)));
    }

    #[test]
    fn cancelled_extraction_writes_nothing() {
        let dir = tempdir().unwrap();
        let container = dir.path().join("demo.usdz");
        write_container(&container, &[("scene.usda", b"#usda 1.0"), ("tex/a.png", b"png")]);
        let dest = dir.path().join("out");
        fs::create_dir_all(&dest).unwrap();

        let err = extract_container(&container, &dest, &AtomicBool::new(true)).unwrap_err();

        assert!(matches!(err, ArchiveError::Cancelled { extracted: 0 }));
        assert_eq!(fs::read_dir(&dest).unwrap().count(), 0);
    }

    #[test]
    fn list_files_skips_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a").join("empty")).unwrap();
        fs::write(dir.path().join("a").join("scene.usdc"), b"").unwrap();
        fs::write(dir.path().join("top.png"), b"").unwrap();

        let mut files = list_files(dir.path()).unwrap();
        files.sort();

        assert_eq!(
            files,
            vec![dir.path().join("a").join("scene.usdc"), dir.path().join("top.png")]
        );
    }

    #[test]
    fn text_scene_preferred_over_binary() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.usdc"), b"").unwrap();
        fs::write(dir.path().join("sub").join("b.USDA"), b"").unwrap();

        let found = find_scene_file(dir.path()).unwrap().unwrap();
        assert_eq!(found, dir.path().join("sub").join("b.USDA"));
    }

    #[test]
    fn falls_back_to_binary_scene() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("scene.usdc"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let found = find_scene_file(dir.path()).unwrap();
        assert_eq!(found, Some(dir.path().join("scene.usdc")));
    }

    #[test]
    fn no_scene_file_yields_none() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("texture.png"), b"").unwrap();
        assert_eq!(find_scene_file(dir.path()).unwrap(), None);
    }

    #[test]
    fn scratch_dir_removed_unless_retained() {
        let parent = tempdir().unwrap();

        let scratch = ScratchDir::create(parent.path()).unwrap();
        let dropped = scratch.path().to_path_buf();
        assert!(dropped.is_dir());
        drop(scratch);
        assert!(!dropped.exists());

        let mut kept = ScratchDir::create(parent.path()).unwrap();
        kept.retain();
        let kept_path = kept.path().to_path_buf();
        drop(kept);
        assert!(kept_path.is_dir());
    }
}
