use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Append-only record of source keys that must not be dispatched again.
///
/// The backing file holds one key per line. It only ever grows; duplicate
/// lines are tolerated on load.
#[derive(Debug)]
pub struct ProcessedLedger {
    path: PathBuf,
    keys: HashSet<String>,
}

impl ProcessedLedger {
    /// Reads the whole log into memory. A missing file yields an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();

        let keys = match fs::read_to_string(&path) {
            Ok(contents) => contents
                .lines()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e),
        };

        info!(path = %path.display(), entries = keys.len(), "loaded processed ledger");
        Ok(Self { path, keys })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Whether `key` can be stored as a single line.
    pub fn accepts(key: &str) -> bool {
        !key.contains('\n') && !key.contains('\r')
    }

    /// Appends `key` to disk, then to the in-memory set. Recording a key that
    /// is already present is a no-op.
    pub fn record(&mut self, key: &str) -> io::Result<()> {
        if !Self::accepts(key) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("ledger keys cannot contain line breaks: {key:?}"),
            ));
        }
        if self.keys.contains(key) {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        // A crash mid-append can leave the last line unterminated.
        let line = if missing_final_newline(&mut file)? {
            format!("\n{key}\n")
        } else {
            format!("{key}\n")
        };
        file.write_all(line.as_bytes())?;
        file.sync_data()?;

        self.keys.insert(key.to_string());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn missing_final_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
