//! File-backed stock movement log (JSON Lines).
//!
//! Every movement is appended as one line. On open the file is streamed
//! through a [`MovementWindow`], so memory holds per-row totals and a bounded
//! tail rather than the whole log.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use aeroforge_inventory::{
    Actor, DEFAULT_RECENT_MOVEMENTS, LogError, MovementDraft, MovementLog, MovementTotals, MovementWindow,
    StockMovement,
};

use crate::jsonl::JsonlFile;

#[derive(Debug)]
struct LogState {
    file: JsonlFile,
    window: MovementWindow,
}

#[derive(Debug)]
pub struct JsonlMovementLog {
    state: Mutex<LogState>,
}

impl JsonlMovementLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        Self::open_with_capacity(path, DEFAULT_RECENT_MOVEMENTS)
    }

    /// Open (or create) the log at `path`, keeping at most `recent` movements in memory.
    pub fn open_with_capacity(path: impl AsRef<Path>, recent: usize) -> Result<Self, LogError> {
        let path = path.as_ref();
        let mut window = MovementWindow::new(recent);
        let file = JsonlFile::open(path, |movement: StockMovement| window.absorb(movement))?;

        tracing::info!(
            path = %path.display(),
            movements = window.totals().last_sequence,
            "stock movement log opened"
        );
        Ok(Self {
            state: Mutex::new(LogState { file, window }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, LogState>, LogError> {
        self.state
            .lock()
            .map_err(|_| LogError::Storage("movement log lock poisoned".to_string()))
    }
}

impl MovementLog for JsonlMovementLog {
    fn append_with(
        &self,
        drafts: &[MovementDraft],
        actor: &Actor,
        commit: &mut dyn FnMut(),
    ) -> Result<u64, LogError> {
        let mut state = self.lock()?;
        let batch = state.window.sequence(drafts, actor, Utc::now());

        if let Err(e) = state.file.append(&batch) {
            tracing::error!(path = %state.file.path().display(), error = %e, "stock movement write failed");
            return Err(e);
        }
        for movement in batch {
            state.window.absorb(movement).map_err(LogError::Storage)?;
        }

        commit();
        Ok(state.window.totals().last_sequence)
    }

    fn totals(&self) -> Result<MovementTotals, LogError> {
        Ok(self.lock()?.window.totals().clone())
    }

    fn recent(&self) -> Result<Vec<StockMovement>, LogError> {
        Ok(self.lock()?.window.recent())
    }
}
