//! Assembly history: append-only record of every completed assembly.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use aeroforge_core::{DomainError, PartTypeId, PlaneTypeId, UserId};

/// Who performed an inventory operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
}

impl Actor {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }

    /// Actor used for bootstrap movements (opening balances).
    pub fn system() -> Self {
        Self::new(UserId::from_uuid(Uuid::nil()), "system")
    }
}

/// One recipe line as consumed by an assembly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedPart {
    pub part: PartTypeId,
    pub part_name: String,
    pub quantity: u32,
}

/// An assembly that has not yet been assigned a sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyDraft {
    pub plane: PlaneTypeId,
    pub plane_name: String,
    pub consumed: Vec<ConsumedPart>,
    pub actor: Actor,
    pub assembled_at: DateTime<Utc>,
}

/// A committed assembly. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyRecord {
    /// Strictly increasing, starting at 1, never reused.
    pub sequence: u64,
    pub plane: PlaneTypeId,
    pub plane_name: String,
    pub consumed: Vec<ConsumedPart>,
    pub actor: Actor,
    pub assembled_at: DateTime<Utc>,
}

impl AssemblyRecord {
    pub fn from_draft(sequence: u64, draft: AssemblyDraft) -> Self {
        Self {
            sequence,
            plane: draft.plane,
            plane_name: draft.plane_name,
            consumed: draft.consumed,
            actor: draft.actor,
            assembled_at: draft.assembled_at,
        }
    }

    pub fn units_consumed(&self) -> u64 {
        self.consumed.iter().map(|c| u64::from(c.quantity)).sum()
    }

    pub fn part_names(&self) -> Vec<&str> {
        self.consumed.iter().map(|c| c.part_name.as_str()).collect()
    }
}

/// Query filter for [`HistoryLog::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HistoryFilter {
    pub plane: Option<PlaneTypeId>,
    /// Only records with `sequence > since_sequence`.
    pub since_sequence: Option<u64>,
}

impl HistoryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_plane(plane: PlaneTypeId) -> Self {
        Self {
            plane: Some(plane),
            since_sequence: None,
        }
    }

    pub fn matches(&self, record: &AssemblyRecord) -> bool {
        if let Some(plane) = self.plane {
            if record.plane != plane {
                return false;
            }
        }
        if let Some(since) = self.since_sequence {
            if record.sequence <= since {
                return false;
            }
        }
        true
    }
}

/// Failure of an append-only log (assembly history or stock movements).
#[derive(Debug, Error)]
pub enum LogError {
    #[error("log storage failure: {0}")]
    Storage(String),

    #[error("log corrupted at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

impl From<LogError> for DomainError {
    fn from(value: LogError) -> Self {
        DomainError::storage(value.to_string())
    }
}

/// Append-only assembly history.
///
/// Implementations assign sequence numbers and must never reorder, mutate or
/// drop stored records.
pub trait HistoryLog: Send + Sync {
    /// Store `draft` under the next sequence number, then run `commit` with
    /// the stored record while the log is still locked.
    ///
    /// `commit` runs only if the record was stored. Readers of the log cannot
    /// observe the record before `commit` has returned.
    fn append_with(
        &self,
        draft: AssemblyDraft,
        commit: &mut dyn FnMut(&AssemblyRecord),
    ) -> Result<AssemblyRecord, LogError>;

    fn append(&self, draft: AssemblyDraft) -> Result<AssemblyRecord, LogError> {
        self.append_with(draft, &mut |_| {})
    }

    /// Matching records, ascending by sequence number.
    fn list(&self, filter: &HistoryFilter) -> Result<Vec<AssemblyRecord>, LogError>;

    fn len(&self) -> Result<usize, LogError>;

    fn is_empty(&self) -> Result<bool, LogError> {
        Ok(self.len()? == 0)
    }
}

impl<H> HistoryLog for Arc<H>
where
    H: HistoryLog + ?Sized,
{
    fn append_with(
        &self,
        draft: AssemblyDraft,
        commit: &mut dyn FnMut(&AssemblyRecord),
    ) -> Result<AssemblyRecord, LogError> {
        (**self).append_with(draft, commit)
    }

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<AssemblyRecord>, LogError> {
        (**self).list(filter)
    }

    fn len(&self) -> Result<usize, LogError> {
        (**self).len()
    }
}

/// In-memory history log.
///
/// Intended for tests/dev; contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryHistoryLog {
    records: Mutex<Vec<AssemblyRecord>>,
}

impl InMemoryHistoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryLog for InMemoryHistoryLog {
    fn append_with(
        &self,
        draft: AssemblyDraft,
        commit: &mut dyn FnMut(&AssemblyRecord),
    ) -> Result<AssemblyRecord, LogError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| LogError::Storage("lock poisoned".to_string()))?;

        let next = records.last().map(|r| r.sequence).unwrap_or(0) + 1;
        let record = AssemblyRecord::from_draft(next, draft);
        records.push(record.clone());
        commit(&record);
        Ok(record)
    }

    fn list(&self, filter: &HistoryFilter) -> Result<Vec<AssemblyRecord>, LogError> {
        let records = self
            .records
            .lock()
            .map_err(|_| LogError::Storage("lock poisoned".to_string()))?;
        Ok(records.iter().filter(|r| filter.matches(r)).cloned().collect())
    }

    fn len(&self) -> Result<usize, LogError> {
        let records = self
            .records
            .lock()
            .map_err(|_| LogError::Storage("lock poisoned".to_string()))?;
        Ok(records.len())
    }
}
