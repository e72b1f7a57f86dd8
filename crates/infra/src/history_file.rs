//! File-backed assembly history (JSON Lines).
//!
//! One JSON object per line, appended in sequence order. The whole file is
//! replayed into memory on open; reads never touch the disk afterwards.

use std::path::Path;
use std::sync::Mutex;

use aeroforge_inventory::{AssemblyDraft, AssemblyRecord, HistoryFilter, HistoryLog, LogError};

use crate::jsonl::JsonlFile;

#[derive(Debug)]
struct LogState {
    file: JsonlFile,
    records: Vec<AssemblyRecord>,
}

#[derive(Debug)]
pub struct JsonlHistoryLog {
    state: Mutex<LogState>,
}

impl JsonlHistoryLog {
    /// Open (or create) the log at `path` and replay its records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref();
        let mut records: Vec<AssemblyRecord> = Vec::new();
        let file = JsonlFile::open(path, |record: AssemblyRecord| {
            let expected = records.last().map(|r| r.sequence).unwrap_or(0) + 1;
            if record.sequence != expected {
                return Err(format!("expected sequence {expected}, found {}", record.sequence));
            }
            records.push(record);
            Ok(())
        })?;

        tracing::info!(path = %path.display(), records = records.len(), "assembly history opened");
        Ok(Self {
            state: Mutex::new(LogState { file, records }),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LogState>, LogError> {
        self.state
            .lock()
            .map_err(|_| LogError::Storage("history lock poisoned".to_string()))
    }
}

impl HistoryLog for JsonlHistoryLog {
    fn append_with(
        &self,
        draft: AssemblyDraft,
        commit: &mut dyn FnMut(&AssemblyRecord),
    ) -> Result<AssemblyRecord, LogError> {
        let mut state = self.lock()?;

        let next = state.records.last().map(|r| r.sequence).unwrap_or(0) + 1;
        let record = AssemblyRecord::from_draft(next, draft);
        if let Err(e) = state.file.append(std::slice::from_ref(&record)) {
            tracing::error!(path = %state.file.path().display(), error = %e, "assembly history write failed");
            return Err(e);
        }

        state.records.push(record.clone());
        commit(&record);
        Ok(record)
    }

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<AssemblyRecord>, LogError> {
        let state = self.lock()?;
        Ok(state.records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    fn len(&self) -> Result<usize, LogError> {
        Ok(self.lock()?.records.len())
    }
}
