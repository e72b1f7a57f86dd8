//! Ledger audit: rebuild every count from the logs and compare.

use std::collections::BTreeMap;

use serde::Serialize;

use aeroforge_core::DomainResult;

use crate::catalog::Catalog;
use crate::history::AssemblyRecord;
use crate::ledger::StockKey;
use crate::movement::MovementTotals;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditMismatch {
    pub key: StockKey,
    pub materialized: u64,
    pub replayed: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub rows_checked: usize,
    pub assemblies_replayed: usize,
    pub movements_replayed: u64,
    pub mismatches: Vec<AuditMismatch>,
    /// Sequence numbers of assembly records whose consumption differs from the recipe.
    pub recipe_violations: Vec<u64>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty() && self.recipe_violations.is_empty()
    }
}

/// Replay movement totals (opening balances included) and then assemblies from zero.
pub fn replay(
    catalog: &Catalog,
    movements: &MovementTotals,
    assemblies: &[AssemblyRecord],
) -> DomainResult<BTreeMap<StockKey, i64>> {
    let mut counts = movements.balances.clone();

    for record in assemblies {
        *counts.entry(StockKey::Plane(record.plane)).or_default() += 1;
        for line in &record.consumed {
            let stock = catalog.part_stock(line.part, record.plane)?;
            *counts.entry(StockKey::Part(stock)).or_default() -= i64::from(line.quantity);
        }
    }

    Ok(counts)
}

/// Whether `record` consumed exactly its plane's recipe.
pub fn matches_recipe(catalog: &Catalog, record: &AssemblyRecord) -> DomainResult<bool> {
    let plane = catalog.plane(record.plane)?;
    if plane.recipe.len() != record.consumed.len() {
        return Ok(false);
    }
    Ok(record
        .consumed
        .iter()
        .all(|line| plane.recipe.quantity(line.part) == Some(line.quantity)))
}

/// Compare materialised rows against a replay of the logs.
pub fn reconcile(
    catalog: &Catalog,
    materialized: impl IntoIterator<Item = (StockKey, u64)>,
    movements: &MovementTotals,
    assemblies: &[AssemblyRecord],
) -> DomainResult<AuditReport> {
    let replayed = replay(catalog, movements, assemblies)?;

    let mut report = AuditReport {
        assemblies_replayed: assemblies.len(),
        movements_replayed: movements.last_sequence,
        ..AuditReport::default()
    };

    for (key, count) in materialized {
        report.rows_checked += 1;
        let expected = replayed.get(&key).copied().unwrap_or(0);
        if i64::try_from(count).ok() != Some(expected) {
            report.mismatches.push(AuditMismatch {
                key,
                materialized: count,
                replayed: expected,
            });
        }
    }

    for record in assemblies {
        if !matches_recipe(catalog, record)? {
            report.recipe_violations.push(record.sequence);
        }
    }

    Ok(report)
}
