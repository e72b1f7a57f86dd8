//! Inventory ledger: the materialised part and plane counters.
//!
//! Each stock row is an independent `Mutex<u64>`. Single-row adjustments lock
//! one row; multi-row transactions go through [`InventoryLedger::lock_rows`],
//! which always acquires rows in ascending [`StockKey`] order. Because every
//! caller uses the same global order, concurrent transactions cannot deadlock,
//! and a row is never observed between the check and the write of a
//! transaction that holds it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use aeroforge_core::{DomainError, DomainResult, PartTypeId, PlaneTypeId};

/// Stock row of a part type. `plane` is `None` for pooled parts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartStock {
    pub part: PartTypeId,
    pub plane: Option<PlaneTypeId>,
}

impl PartStock {
    pub fn per_plane(part: PartTypeId, plane: PlaneTypeId) -> Self {
        Self {
            part,
            plane: Some(plane),
        }
    }

    pub fn pooled(part: PartTypeId) -> Self {
        Self { part, plane: None }
    }
}

/// Ledger row identifier. The derived ordering is the global lock order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockKey {
    Part(PartStock),
    Plane(PlaneTypeId),
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StockKey::Part(PartStock { part, plane: Some(plane) }) => {
                write!(f, "part {part} for plane {plane}")
            }
            StockKey::Part(PartStock { part, plane: None }) => write!(f, "pooled part {part}"),
            StockKey::Plane(plane) => write!(f, "plane {plane}"),
        }
    }
}

/// Apply a signed delta to a count, enforcing non-negativity.
pub fn apply_delta(key: &StockKey, current: u64, delta: i64) -> DomainResult<u64> {
    if delta == 0 {
        return Err(DomainError::validation("delta cannot be zero"));
    }
    match current.checked_add_signed(delta) {
        Some(next) => Ok(next),
        None if delta < 0 => Err(DomainError::insufficient(format!(
            "{key} has {current} units, cannot remove {}",
            delta.unsigned_abs()
        ))),
        None => Err(DomainError::validation(format!("{key} count would overflow"))),
    }
}

/// Materialised counters, one lock per row.
#[derive(Debug, Default)]
pub struct InventoryLedger {
    rows: BTreeMap<StockKey, Mutex<u64>>,
}

impl InventoryLedger {
    /// Create a ledger with the given rows, all starting at zero.
    pub fn new(keys: impl IntoIterator<Item = StockKey>) -> Self {
        Self {
            rows: keys.into_iter().map(|k| (k, Mutex::new(0))).collect(),
        }
    }

    pub fn contains(&self, key: &StockKey) -> bool {
        self.rows.contains_key(key)
    }

    /// Row keys in lock order.
    pub fn keys(&self) -> impl Iterator<Item = &StockKey> {
        self.rows.keys()
    }

    fn row(&self, key: &StockKey) -> DomainResult<&Mutex<u64>> {
        self.rows
            .get(key)
            .ok_or_else(|| DomainError::not_found(format!("no stock row for {key}")))
    }

    fn lock_row<'a>(&'a self, key: &StockKey) -> DomainResult<MutexGuard<'a, u64>> {
        self.row(key)?
            .lock()
            .map_err(|_| DomainError::storage(format!("ledger row lock poisoned ({key})")))
    }

    pub fn count(&self, key: &StockKey) -> DomainResult<u64> {
        Ok(*self.lock_row(key)?)
    }

    pub fn part_count(&self, stock: PartStock) -> DomainResult<u64> {
        self.count(&StockKey::Part(stock))
    }

    pub fn plane_count(&self, plane: PlaneTypeId) -> DomainResult<u64> {
        self.count(&StockKey::Plane(plane))
    }

    /// Atomically apply `delta` to one row and return the new count.
    ///
    /// Fails with `InsufficientInventory` (leaving the row unchanged) if the
    /// result would be negative.
    pub fn adjust(&self, key: &StockKey, delta: i64) -> DomainResult<u64> {
        let mut guard = self.lock_row(key)?;
        let next = apply_delta(key, *guard, delta)?;
        *guard = next;
        Ok(next)
    }

    pub fn adjust_part_count(&self, stock: PartStock, delta: i64) -> DomainResult<u64> {
        self.adjust(&StockKey::Part(stock), delta)
    }

    pub fn adjust_plane_count(&self, plane: PlaneTypeId, delta: i64) -> DomainResult<u64> {
        self.adjust(&StockKey::Plane(plane), delta)
    }

    /// Lock a set of rows in global key order.
    ///
    /// Duplicate keys are collapsed. Fails with `NotFound` before taking any
    /// lock if a key has no row.
    pub fn lock_rows(&self, keys: impl IntoIterator<Item = StockKey>) -> DomainResult<LockedRows<'_>> {
        let ordered: BTreeSet<StockKey> = keys.into_iter().collect();
        for key in &ordered {
            self.row(key)?;
        }

        let mut rows = Vec::with_capacity(ordered.len());
        for key in ordered {
            let guard = self.lock_row(&key)?;
            rows.push((key, guard));
        }
        Ok(LockedRows { rows })
    }

    /// Lock every row (consistent snapshot of the whole ledger).
    pub fn lock_all(&self) -> DomainResult<LockedRows<'_>> {
        self.lock_rows(self.rows.keys().copied())
    }
}

/// A set of ledger rows held under lock, sorted by key.
#[derive(Debug)]
pub struct LockedRows<'a> {
    rows: Vec<(StockKey, MutexGuard<'a, u64>)>,
}

impl LockedRows<'_> {
    /// Position of `key` in this set, for infallible writes via [`LockedRows::set_at`].
    pub fn slot(&self, key: &StockKey) -> DomainResult<usize> {
        self.rows
            .binary_search_by(|(k, _)| k.cmp(key))
            .map_err(|_| DomainError::storage(format!("{key} is not held by this transaction")))
    }

    pub fn get(&self, key: &StockKey) -> DomainResult<u64> {
        let idx = self.slot(key)?;
        Ok(*self.rows[idx].1)
    }

    pub fn set_at(&mut self, slot: usize, value: u64) {
        if let Some((_, guard)) = self.rows.get_mut(slot) {
            **guard = value;
        }
    }

    /// Current values of the held rows, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (StockKey, u64)> + '_ {
        self.rows.iter().map(|(k, g)| (*k, **g))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn wing() -> StockKey {
        StockKey::Part(PartStock::per_plane(PartTypeId::new(1), PlaneTypeId::new(1)))
    }

    fn tb2() -> StockKey {
        StockKey::Plane(PlaneTypeId::new(1))
    }

    #[test]
    fn parts_sort_before_planes() {
        assert!(wing() < tb2());
        let pooled = StockKey::Part(PartStock::pooled(PartTypeId::new(1)));
        assert!(pooled < wing());
    }

    #[test]
    fn adjust_rejects_negative_result_and_keeps_count() {
        let ledger = InventoryLedger::new([wing()]);
        assert_eq!(ledger.adjust(&wing(), 3).unwrap(), 3);

        let err = ledger.adjust(&wing(), -4).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory(_)));
        assert_eq!(ledger.count(&wing()).unwrap(), 3);
    }

    #[test]
    fn adjust_part_count_targets_the_part_row() {
        let stock = PartStock::per_plane(PartTypeId::new(1), PlaneTypeId::new(1));
        let ledger = InventoryLedger::new([wing(), tb2()]);
        assert_eq!(ledger.adjust_part_count(stock, 2).unwrap(), 2);
        assert_eq!(ledger.adjust_part_count(stock, -1).unwrap(), 1);
        assert_eq!(ledger.part_count(stock).unwrap(), 1);
        assert_eq!(ledger.count(&tb2()).unwrap(), 0);

        let err = ledger.adjust_part_count(stock, -2).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory(_)));
        assert_eq!(ledger.part_count(stock).unwrap(), 1);

        let pooled = PartStock::pooled(PartTypeId::new(1));
        assert!(matches!(ledger.adjust_part_count(pooled, 1), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn adjust_plane_count_keeps_planes_non_negative() {
        let tb2_id = PlaneTypeId::new(1);
        let ledger = InventoryLedger::new([wing(), tb2()]);
        assert!(matches!(
            ledger.adjust_plane_count(tb2_id, -1),
            Err(DomainError::InsufficientInventory(_))
        ));
        assert_eq!(ledger.adjust_plane_count(tb2_id, 1).unwrap(), 1);
        assert_eq!(ledger.adjust_plane_count(tb2_id, -1).unwrap(), 0);
        assert_eq!(ledger.plane_count(tb2_id).unwrap(), 0);
        assert_eq!(ledger.count(&wing()).unwrap(), 0);
    }

    #[test]
    fn zero_delta_is_invalid() {
        let ledger = InventoryLedger::new([wing()]);
        assert!(matches!(ledger.adjust(&wing(), 0), Err(DomainError::Validation(_))));
    }

    #[test]
    fn unknown_row_is_not_found() {
        let ledger = InventoryLedger::new([wing()]);
        assert!(matches!(ledger.plane_count(PlaneTypeId::new(9)), Err(DomainError::NotFound(_))));
        assert!(matches!(ledger.lock_rows([wing(), tb2()]), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn locked_rows_are_sorted_and_writable() {
        let ledger = InventoryLedger::new([wing(), tb2()]);
        {
            let mut rows = ledger.lock_rows([tb2(), wing(), tb2()]).unwrap();
            assert_eq!(rows.len(), 2);
            let keys: Vec<_> = rows.iter().map(|(k, _)| k).collect();
            assert_eq!(keys, vec![wing(), tb2()]);

            let slot = rows.slot(&tb2()).unwrap();
            rows.set_at(slot, 5);
        }
        assert_eq!(ledger.plane_count(PlaneTypeId::new(1)).unwrap(), 5);
    }

    #[test]
    fn concurrent_adjustments_sum_exactly() {
        let ledger = Arc::new(InventoryLedger::new([wing()]));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        ledger.adjust(&wing(), 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(ledger.count(&wing()).unwrap(), 4000);
    }

    proptest! {
        /// Property: for any sequence of deltas, the count never goes negative
        /// and always equals the sum of the accepted deltas.
        #[test]
        fn count_is_sum_of_accepted_deltas(deltas in prop::collection::vec(-5i64..=5i64, 0..64)) {
            let ledger = InventoryLedger::new([wing()]);
            let mut expected: i64 = 0;
            for delta in deltas {
                match ledger.adjust(&wing(), delta) {
                    Ok(next) => {
                        expected += delta;
                        prop_assert_eq!(next as i64, expected);
                    }
                    Err(DomainError::InsufficientInventory(_)) => prop_assert!(expected + delta < 0),
                    Err(DomainError::Validation(_)) => prop_assert_eq!(delta, 0),
                    Err(other) => prop_assert!(false, "unexpected error {:?}", other),
                }
                prop_assert!(expected >= 0);
            }
            prop_assert_eq!(ledger.count(&wing()).unwrap() as i64, expected);
        }
    }
}
