//! Append-only JSON Lines files shared by the durable logs.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use aeroforge_inventory::LogError;

#[derive(Debug)]
pub(crate) struct JsonlFile {
    path: PathBuf,
    file: File,
    /// Byte length of the durable prefix of the file.
    len: u64,
}

impl JsonlFile {
    /// Open (or create) `path`, feeding every stored entry to `visit` in order.
    ///
    /// Lines are streamed; the file is never held in memory whole. A line that
    /// does not parse, or that `visit` rejects, is `Corrupt` with its 1-based number.
    pub(crate) fn open<T, F>(path: &Path, mut visit: F) -> Result<Self, LogError>
    where
        T: DeserializeOwned,
        F: FnMut(T) -> Result<(), String>,
    {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LogError::Storage(format!("create {}: {e}", parent.display())))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| LogError::Storage(format!("open {}: {e}", path.display())))?;

        let mut len = 0u64;
        let reader = BufReader::new(&file);
        for (idx, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| LogError::Storage(format!("read {}: {e}", path.display())))?;
            len += line.len() as u64 + 1;
            if line.trim().is_empty() {
                continue;
            }
            let corrupt = |reason: String| LogError::Corrupt { line: idx + 1, reason };
            let entry: T = serde_json::from_str(&line).map_err(|e| corrupt(e.to_string()))?;
            visit(entry).map_err(corrupt)?;
        }

        let on_disk = file
            .metadata()
            .map_err(|e| LogError::Storage(format!("stat {}: {e}", path.display())))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len: len.min(on_disk),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize `entries` one per line, write them in a single call and sync.
    ///
    /// On failure the file is truncated back to its durable prefix, so a batch
    /// is stored entirely or not at all.
    pub(crate) fn append<T: Serialize>(&mut self, entries: &[T]) -> Result<(), LogError> {
        let mut buf = String::new();
        for entry in entries {
            buf.push_str(&serde_json::to_string(entry).map_err(|e| LogError::Storage(e.to_string()))?);
            buf.push('\n');
        }

        let written = self
            .file
            .write_all(buf.as_bytes())
            .and_then(|_| self.file.sync_data());
        if let Err(e) = written {
            if let Err(trunc) = self.file.set_len(self.len) {
                tracing::error!(path = %self.path.display(), error = %trunc, "failed to roll back partial log write");
            }
            return Err(LogError::Storage(format!("write {}: {e}", self.path.display())));
        }

        self.len += buf.len() as u64;
        Ok(())
    }
}
