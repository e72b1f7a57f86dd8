//! Log of stock movements that are not assemblies.
//!
//! Together with the assembly history this makes every ledger count
//! reconstructible from zero (see [`crate::audit`]). Implementations keep
//! only per-row running totals and a bounded tail of recent entries in
//! memory; the full log lives in storage.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::{Actor, LogError};
use crate::ledger::StockKey;

/// Recent movements kept in memory by default.
pub const DEFAULT_RECENT_MOVEMENTS: usize = 256;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementReason {
    /// Initial supply loaded at bootstrap.
    OpeningBalance,
    PartProduced,
    PartRecycled,
    PlaneRecycled,
    /// Parts returned to stock when a plane is recycled under the restore policy.
    RecipeRestored,
}

/// One count change to be journaled.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MovementDraft {
    pub key: StockKey,
    pub delta: i64,
    pub reason: MovementReason,
}

impl MovementDraft {
    pub fn new(key: StockKey, delta: i64, reason: MovementReason) -> Self {
        Self { key, delta, reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub sequence: u64,
    pub key: StockKey,
    pub delta: i64,
    pub reason: MovementReason,
    pub actor: Actor,
    pub recorded_at: DateTime<Utc>,
}

/// Net effect of every stored movement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovementTotals {
    /// Sequence number of the last stored movement (0 when empty).
    pub last_sequence: u64,
    /// Sum of deltas per row.
    pub balances: BTreeMap<StockKey, i64>,
}

impl MovementTotals {
    pub fn is_empty(&self) -> bool {
        self.last_sequence == 0
    }

    pub fn balance(&self, key: &StockKey) -> i64 {
        self.balances.get(key).copied().unwrap_or(0)
    }
}

/// In-memory checkpoint of a movement log: running totals plus a bounded tail.
///
/// Storage-backed logs feed every stored movement through [`MovementWindow::absorb`]
/// on open and after each append.
#[derive(Debug, Clone)]
pub struct MovementWindow {
    totals: MovementTotals,
    recent: VecDeque<StockMovement>,
    capacity: usize,
}

impl MovementWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            totals: MovementTotals::default(),
            recent: VecDeque::with_capacity(capacity.min(DEFAULT_RECENT_MOVEMENTS)),
            capacity,
        }
    }

    /// Assign the next sequence numbers to `drafts` without storing them.
    pub fn sequence(&self, drafts: &[MovementDraft], actor: &Actor, now: DateTime<Utc>) -> Vec<StockMovement> {
        drafts
            .iter()
            .zip(self.totals.last_sequence + 1..)
            .map(|(draft, sequence)| StockMovement {
                sequence,
                key: draft.key,
                delta: draft.delta,
                reason: draft.reason,
                actor: actor.clone(),
                recorded_at: now,
            })
            .collect()
    }

    /// Fold a stored movement into the totals.
    ///
    /// Fails if `movement` does not continue the sequence.
    pub fn absorb(&mut self, movement: StockMovement) -> Result<(), String> {
        let expected = self.totals.last_sequence + 1;
        if movement.sequence != expected {
            return Err(format!("expected sequence {expected}, found {}", movement.sequence));
        }
        self.totals.last_sequence = movement.sequence;
        *self.totals.balances.entry(movement.key).or_default() += movement.delta;

        if self.capacity > 0 {
            if self.recent.len() == self.capacity {
                self.recent.pop_front();
            }
            self.recent.push_back(movement);
        }
        Ok(())
    }

    pub fn totals(&self) -> &MovementTotals {
        &self.totals
    }

    pub fn recent(&self) -> Vec<StockMovement> {
        self.recent.iter().cloned().collect()
    }
}

impl Default for MovementWindow {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT_MOVEMENTS)
    }
}

/// Append-only stock movement log.
pub trait MovementLog: Send + Sync {
    /// Store `drafts` as one batch under consecutive sequence numbers, then
    /// run `commit` while the log is still locked. Returns the last sequence.
    ///
    /// `commit` runs only if the whole batch was stored.
    fn append_with(
        &self,
        drafts: &[MovementDraft],
        actor: &Actor,
        commit: &mut dyn FnMut(),
    ) -> Result<u64, LogError>;

    fn append(&self, drafts: &[MovementDraft], actor: &Actor) -> Result<u64, LogError> {
        self.append_with(drafts, actor, &mut || {})
    }

    fn totals(&self) -> Result<MovementTotals, LogError>;

    /// Most recent movements, oldest first.
    fn recent(&self) -> Result<Vec<StockMovement>, LogError>;
}

impl<M> MovementLog for Arc<M>
where
    M: MovementLog + ?Sized,
{
    fn append_with(
        &self,
        drafts: &[MovementDraft],
        actor: &Actor,
        commit: &mut dyn FnMut(),
    ) -> Result<u64, LogError> {
        (**self).append_with(drafts, actor, commit)
    }

    fn totals(&self) -> Result<MovementTotals, LogError> {
        (**self).totals()
    }

    fn recent(&self) -> Result<Vec<StockMovement>, LogError> {
        (**self).recent()
    }
}

/// In-memory movement log. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryMovementLog {
    window: Mutex<MovementWindow>,
}

impl InMemoryMovementLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(recent: usize) -> Self {
        Self {
            window: Mutex::new(MovementWindow::new(recent)),
        }
    }
}

impl MovementLog for InMemoryMovementLog {
    fn append_with(
        &self,
        drafts: &[MovementDraft],
        actor: &Actor,
        commit: &mut dyn FnMut(),
    ) -> Result<u64, LogError> {
        let mut window = self
            .window
            .lock()
            .map_err(|_| LogError::Storage("movement log lock poisoned".to_string()))?;
        for movement in window.sequence(drafts, actor, Utc::now()) {
            window.absorb(movement).map_err(LogError::Storage)?;
        }
        commit();
        Ok(window.totals().last_sequence)
    }

    fn totals(&self) -> Result<MovementTotals, LogError> {
        let window = self
            .window
            .lock()
            .map_err(|_| LogError::Storage("movement log lock poisoned".to_string()))?;
        Ok(window.totals().clone())
    }

    fn recent(&self) -> Result<Vec<StockMovement>, LogError> {
        let window = self
            .window
            .lock()
            .map_err(|_| LogError::Storage("movement log lock poisoned".to_string()))?;
        Ok(window.recent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroforge_core::PlaneTypeId;

    fn tb2() -> StockKey {
        StockKey::Plane(PlaneTypeId::new(1))
    }

    #[test]
    fn batch_is_sequenced_contiguously() {
        let log = InMemoryMovementLog::new();
        let last = log
            .append(
                &[
                    MovementDraft::new(tb2(), 2, MovementReason::OpeningBalance),
                    MovementDraft::new(tb2(), -1, MovementReason::PlaneRecycled),
                ],
                &Actor::system(),
            )
            .unwrap();
        assert_eq!(last, 2);

        let recent = log.recent().unwrap();
        assert_eq!(recent.iter().map(|m| m.sequence).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(log.totals().unwrap().balance(&tb2()), 1);
    }

    #[test]
    fn tail_is_bounded_while_totals_keep_every_delta() {
        let log = InMemoryMovementLog::with_capacity(3);
        for _ in 0..10 {
            log.append(&[MovementDraft::new(tb2(), 1, MovementReason::OpeningBalance)], &Actor::system())
                .unwrap();
        }

        let recent = log.recent().unwrap();
        assert_eq!(recent.iter().map(|m| m.sequence).collect::<Vec<_>>(), vec![8, 9, 10]);
        let totals = log.totals().unwrap();
        assert_eq!(totals.last_sequence, 10);
        assert_eq!(totals.balance(&tb2()), 10);
    }

    #[test]
    fn window_rejects_sequence_gaps() {
        let mut window = MovementWindow::default();
        let mut moves = window.sequence(
            &[MovementDraft::new(tb2(), 1, MovementReason::OpeningBalance)],
            &Actor::system(),
            Utc::now(),
        );
        let mut movement = moves.remove(0);
        movement.sequence = 4;
        assert!(window.absorb(movement).is_err());
        assert!(window.totals().is_empty());
    }
}
