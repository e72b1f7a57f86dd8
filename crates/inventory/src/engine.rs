//! Assembly engine: the only writer of the inventory ledger.
//!
//! Every operation follows the same shape:
//!
//! ```text
//! resolve rows from catalog
//!   ↓
//! lock rows (global key order)
//!   ↓
//! check every precondition, compute every new value
//!   ↓
//! append to the log (history or movement log)
//!   ↓
//! write new values
//!   ↓
//! release rows
//! ```
//!
//! Nothing is written before all checks pass and the log append succeeded, so a
//! failed operation never leaves a partial mutation behind. Operations contain
//! no await points; once started they run to completion.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use aeroforge_core::{DomainError, DomainResult, PartTypeId, PlaneTypeId};

use crate::audit::{self, AuditReport};
use crate::catalog::{Catalog, PlaneType};
use crate::history::{Actor, AssemblyDraft, AssemblyRecord, ConsumedPart, HistoryFilter, HistoryLog};
use crate::ledger::{InventoryLedger, LockedRows, PartStock, StockKey, apply_delta};
use crate::movement::{InMemoryMovementLog, MovementDraft, MovementLog, MovementReason, MovementTotals, StockMovement};

/// What happens to a plane's parts when the plane is recycled.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecyclePolicy {
    /// The plane leaves inventory; its parts are not recovered.
    #[default]
    Discard,
    /// The plane's recipe quantities are returned to part stock.
    RestoreRecipe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReceipt {
    pub record: AssemblyRecord,
    /// Plane count after the assembly.
    pub new_inventory: u64,
}

/// A part that an assembly could not cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortage {
    pub part: PartTypeId,
    pub part_name: String,
    pub required: u64,
    pub available: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartStockView {
    pub part: PartTypeId,
    pub part_name: String,
    /// `None` for pooled stock.
    pub plane: Option<PlaneTypeId>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaneStockView {
    pub plane: PlaneTypeId,
    pub plane_name: String,
    pub count: u64,
}

/// Consistent point-in-time view of every counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventorySnapshot {
    pub parts: Vec<PartStockView>,
    /// Sorted by plane id.
    pub planes: Vec<PlaneStockView>,
}

impl InventorySnapshot {
    pub fn plane_count(&self, plane: PlaneTypeId) -> Option<u64> {
        self.planes.iter().find(|p| p.plane == plane).map(|p| p.count)
    }

    pub fn part_count(&self, stock: PartStock) -> Option<u64> {
        self.parts
            .iter()
            .find(|p| p.part == stock.part && p.plane == stock.plane)
            .map(|p| p.count)
    }
}

fn describe_shortages(plane: &PlaneType, shortages: &[Shortage]) -> String {
    let parts: Vec<String> = shortages
        .iter()
        .map(|s| format!("{} (needs {}, has {})", s.part_name, s.required, s.available))
        .collect();
    format!("Not enough {} to assemble {}.", parts.join(", "), plane.name)
}

pub struct AssemblyEngine {
    catalog: Arc<Catalog>,
    ledger: InventoryLedger,
    history: Arc<dyn HistoryLog>,
    movements: Arc<dyn MovementLog>,
    recycle_policy: RecyclePolicy,
}

/// What [`AssemblyEngine::recover`] replayed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Recovery {
    pub movements: u64,
    pub assemblies: usize,
}

impl core::fmt::Debug for AssemblyEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AssemblyEngine")
            .field("rows", &self.ledger.keys().count())
            .field("recycle_policy", &self.recycle_policy)
            .finish_non_exhaustive()
    }
}

impl AssemblyEngine {
    /// Create an engine with every catalogue row at zero and an in-memory movement log.
    pub fn new(catalog: Arc<Catalog>, history: Arc<dyn HistoryLog>, recycle_policy: RecyclePolicy) -> Self {
        Self::with_logs(catalog, history, Arc::new(InMemoryMovementLog::new()), recycle_policy)
    }

    /// Create an engine over existing logs. Call [`AssemblyEngine::recover`]
    /// before serving if the logs may already hold entries.
    pub fn with_logs(
        catalog: Arc<Catalog>,
        history: Arc<dyn HistoryLog>,
        movements: Arc<dyn MovementLog>,
        recycle_policy: RecyclePolicy,
    ) -> Self {
        let ledger = InventoryLedger::new(catalog.stock_keys());
        Self {
            catalog,
            ledger,
            history,
            movements,
            recycle_policy,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn recycle_policy(&self) -> RecyclePolicy {
        self.recycle_policy
    }

    /// Load an opening balance into a row (journaled as `OpeningBalance`).
    pub fn seed(&self, key: StockKey, quantity: u64) -> DomainResult<u64> {
        let delta = i64::try_from(quantity)
            .map_err(|_| DomainError::validation(format!("opening balance for {key} is too large")))?;
        let actor = Actor::system();
        let next = self.mutate_one(key, delta, MovementReason::OpeningBalance, &actor)?;
        tracing::debug!(key = %key, quantity, "opening balance loaded");
        Ok(next)
    }

    /// Rebuild every ledger row from the logs.
    ///
    /// Rows become the movement totals (opening balances included) plus the
    /// replayed assemblies. A row that would be negative, or a logged row the
    /// catalogue does not know, means the stored logs disagree with each other
    /// or with the configuration, and is reported as `StorageFailure`.
    pub fn recover(&self) -> DomainResult<Recovery> {
        let mut rows = self.ledger.lock_all()?;
        let totals = self.movements.totals()?;
        let assemblies = self.history.list(&HistoryFilter::all())?;
        let replayed = audit::replay(&self.catalog, &totals, &assemblies)?;

        let mut plan = Vec::with_capacity(rows.len());
        for (key, value) in &replayed {
            let slot = rows
                .slot(key)
                .map_err(|_| DomainError::storage(format!("logged {key} is not in the catalogue")))?;
            let value = u64::try_from(*value)
                .map_err(|_| DomainError::storage(format!("logs replay {key} to {value}")))?;
            plan.push((slot, value));
        }
        let untouched: Vec<usize> = rows
            .iter()
            .filter(|(key, _)| !replayed.contains_key(key))
            .map(|(key, _)| rows.slot(&key))
            .collect::<DomainResult<_>>()?;

        for (slot, value) in plan {
            rows.set_at(slot, value);
        }
        for slot in untouched {
            rows.set_at(slot, 0);
        }
        drop(rows);

        let recovery = Recovery {
            movements: totals.last_sequence,
            assemblies: assemblies.len(),
        };
        tracing::info!(
            movements = recovery.movements,
            assemblies = recovery.assemblies,
            "ledger rebuilt from logs"
        );
        Ok(recovery)
    }

    pub fn part_count(&self, part: PartTypeId, plane: PlaneTypeId) -> DomainResult<u64> {
        let stock = self.catalog.part_stock(part, plane)?;
        self.ledger.part_count(stock)
    }

    pub fn plane_count(&self, plane: PlaneTypeId) -> DomainResult<u64> {
        self.catalog.plane(plane)?;
        self.ledger.plane_count(plane)
    }

    /// Assemble one plane, consuming its full recipe or nothing at all.
    pub fn assemble_plane(&self, plane_id: PlaneTypeId, actor: &Actor) -> DomainResult<AssemblyReceipt> {
        let plane = self.catalog.plane(plane_id)?;
        let plane_key = StockKey::Plane(plane_id);

        let mut needs: BTreeMap<StockKey, (PartTypeId, u64)> = BTreeMap::new();
        let mut consumed = Vec::with_capacity(plane.recipe.len());
        for (part_id, quantity) in plane.recipe.iter() {
            let part = self.catalog.part(part_id)?;
            let stock = self.catalog.part_stock(part_id, plane_id)?;
            needs.insert(StockKey::Part(stock), (part_id, u64::from(quantity)));
            consumed.push(ConsumedPart {
                part: part_id,
                part_name: part.name.clone(),
                quantity,
            });
        }

        let mut rows = self
            .ledger
            .lock_rows(needs.keys().copied().chain(core::iter::once(plane_key)))?;

        let mut shortages = Vec::new();
        let mut plan: Vec<(usize, u64)> = Vec::with_capacity(needs.len() + 1);
        for (key, (part_id, required)) in &needs {
            let available = rows.get(key)?;
            if available < *required {
                shortages.push(Shortage {
                    part: *part_id,
                    part_name: self.catalog.part(*part_id)?.name.clone(),
                    required: *required,
                    available,
                });
            } else {
                plan.push((rows.slot(key)?, available - required));
            }
        }

        if !shortages.is_empty() {
            let message = describe_shortages(plane, &shortages);
            tracing::warn!(plane_id = %plane_id, actor = %actor.username, "assembly rejected: {message}");
            return Err(DomainError::insufficient(message));
        }

        let new_inventory = rows
            .get(&plane_key)?
            .checked_add(1)
            .ok_or_else(|| DomainError::validation(format!("{} count would overflow", plane.name)))?;
        plan.push((rows.slot(&plane_key)?, new_inventory));

        let draft = AssemblyDraft {
            plane: plane_id,
            plane_name: plane.name.clone(),
            consumed,
            actor: actor.clone(),
            assembled_at: Utc::now(),
        };

        let record = self
            .history
            .append_with(draft, &mut |_| {
                for &(slot, value) in &plan {
                    rows.set_at(slot, value);
                }
            })
            .inspect_err(|e| {
                tracing::error!(plane_id = %plane_id, error = %e, "assembly aborted: history append failed");
            })?;
        drop(rows);

        tracing::info!(
            plane_id = %plane_id,
            sequence = record.sequence,
            new_inventory,
            actor = %actor.username,
            "plane assembled"
        );

        Ok(AssemblyReceipt { record, new_inventory })
    }

    /// Remove one plane from inventory, applying the configured recycle policy.
    pub fn recycle_plane(&self, plane_id: PlaneTypeId, actor: &Actor) -> DomainResult<u64> {
        let plane = self.catalog.plane(plane_id)?;
        let plane_key = StockKey::Plane(plane_id);

        let mut restores: Vec<(StockKey, u64)> = Vec::new();
        if self.recycle_policy == RecyclePolicy::RestoreRecipe {
            for (part_id, quantity) in plane.recipe.iter() {
                let stock = self.catalog.part_stock(part_id, plane_id)?;
                restores.push((StockKey::Part(stock), u64::from(quantity)));
            }
        }

        let mut rows = self
            .ledger
            .lock_rows(restores.iter().map(|(k, _)| *k).chain(core::iter::once(plane_key)))?;

        let current = rows.get(&plane_key)?;
        if current == 0 {
            tracing::warn!(plane_id = %plane_id, actor = %actor.username, "plane recycle rejected: none in stock");
            return Err(DomainError::insufficient(format!("No {} to recycle.", plane.name)));
        }

        let new_inventory = current - 1;
        let mut plan = vec![(rows.slot(&plane_key)?, new_inventory)];
        let mut moves = vec![MovementDraft::new(plane_key, -1, MovementReason::PlaneRecycled)];
        for (key, quantity) in &restores {
            let delta = i64::try_from(*quantity)
                .map_err(|_| DomainError::validation(format!("restore quantity for {key} is too large")))?;
            let next = apply_delta(key, rows.get(key)?, delta)?;
            plan.push((rows.slot(key)?, next));
            moves.push(MovementDraft::new(*key, delta, MovementReason::RecipeRestored));
        }

        self.commit(&mut rows, &plan, &moves, actor)?;

        tracing::info!(
            plane_id = %plane_id,
            new_inventory,
            policy = ?self.recycle_policy,
            actor = %actor.username,
            "plane recycled"
        );
        Ok(new_inventory)
    }

    /// Manufacture one unit of `part` for `plane`.
    pub fn add_part(&self, part: PartTypeId, plane: PlaneTypeId, actor: &Actor) -> DomainResult<u64> {
        let stock = self.catalog.part_stock(part, plane)?;
        let next = self.mutate_one(StockKey::Part(stock), 1, MovementReason::PartProduced, actor)?;
        tracing::info!(part_id = %part, plane_id = %plane, new_inventory = next, actor = %actor.username, "part produced");
        Ok(next)
    }

    /// Recycle one unit of `part` held for `plane`.
    pub fn recycle_part(&self, part: PartTypeId, plane: PlaneTypeId, actor: &Actor) -> DomainResult<u64> {
        let stock = self.catalog.part_stock(part, plane)?;
        let next = self
            .mutate_one(StockKey::Part(stock), -1, MovementReason::PartRecycled, actor)
            .map_err(|e| match e {
                DomainError::InsufficientInventory(_) => {
                    let part_name = self.catalog.part(part).map(|p| p.name.as_str()).unwrap_or("part");
                    let plane_name = self.catalog.plane(plane).map(|p| p.name.as_str()).unwrap_or("plane");
                    DomainError::insufficient(format!("There is no {part_name} for {plane_name} to recycle."))
                }
                other => other,
            })
            .inspect_err(|e| {
                tracing::warn!(part_id = %part, plane_id = %plane, error = %e, "part recycle rejected");
            })?;
        tracing::info!(part_id = %part, plane_id = %plane, new_inventory = next, actor = %actor.username, "part recycled");
        Ok(next)
    }

    fn mutate_one(&self, key: StockKey, delta: i64, reason: MovementReason, actor: &Actor) -> DomainResult<u64> {
        let mut rows = self.ledger.lock_rows([key])?;
        let next = apply_delta(&key, rows.get(&key)?, delta)?;
        let plan = [(rows.slot(&key)?, next)];
        self.commit(&mut rows, &plan, &[MovementDraft::new(key, delta, reason)], actor)?;
        Ok(next)
    }

    /// Journal `moves` and write `plan` from the log's commit hook. Caller
    /// holds every row in `plan`.
    fn commit(
        &self,
        rows: &mut LockedRows<'_>,
        plan: &[(usize, u64)],
        moves: &[MovementDraft],
        actor: &Actor,
    ) -> DomainResult<()> {
        self.movements
            .append_with(moves, actor, &mut || {
                for &(slot, value) in plan {
                    rows.set_at(slot, value);
                }
            })
            .inspect_err(|e| tracing::error!(error = %e, "stock movement aborted: log append failed"))?;
        Ok(())
    }

    /// Consistent view of every counter.
    pub fn snapshot(&self) -> DomainResult<InventorySnapshot> {
        let rows = self.ledger.lock_all()?;
        let mut snapshot = InventorySnapshot::default();
        for (key, count) in rows.iter() {
            match key {
                StockKey::Part(stock) => snapshot.parts.push(PartStockView {
                    part: stock.part,
                    part_name: self.catalog.part(stock.part)?.name.clone(),
                    plane: stock.plane,
                    count,
                }),
                StockKey::Plane(plane) => snapshot.planes.push(PlaneStockView {
                    plane,
                    plane_name: self.catalog.plane(plane)?.name.clone(),
                    count,
                }),
            }
        }
        Ok(snapshot)
    }

    pub fn history(&self, filter: &HistoryFilter) -> DomainResult<Vec<AssemblyRecord>> {
        Ok(self.history.list(filter)?)
    }

    /// Most recent stock movements, oldest first (bounded).
    pub fn recent_movements(&self) -> DomainResult<Vec<StockMovement>> {
        Ok(self.movements.recent()?)
    }

    pub fn movement_totals(&self) -> DomainResult<MovementTotals> {
        Ok(self.movements.totals()?)
    }

    /// Rebuild every row from the logs and compare with the materialised ledger.
    ///
    /// Holds every row lock for the duration, so no operation is mid-flight.
    pub fn audit(&self) -> DomainResult<AuditReport> {
        let rows = self.ledger.lock_all()?;
        let assemblies = self.history.list(&HistoryFilter::all())?;
        let movements = self.movements.totals()?;
        let report = audit::reconcile(&self.catalog, rows.iter(), &movements, &assemblies)?;
        drop(rows);

        if report.is_consistent() {
            tracing::debug!(rows = report.rows_checked, "ledger audit passed");
        } else {
            tracing::error!(
                mismatches = report.mismatches.len(),
                recipe_violations = report.recipe_violations.len(),
                "ledger audit failed"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{PartType, PlaneType, Recipe, StockScope};
    use crate::history::{LogError, InMemoryHistoryLog};
    use aeroforge_core::{DepartmentId, UserId};
    use proptest::prelude::*;
    use std::sync::Barrier;

    const RIVET: PartTypeId = PartTypeId::new(1);
    const WING: PartTypeId = PartTypeId::new(2);
    const TAIL: PartTypeId = PartTypeId::new(3);
    const X1: PlaneTypeId = PlaneTypeId::new(1);
    const X2: PlaneTypeId = PlaneTypeId::new(2);

    fn part(id: PartTypeId, name: &str, scope: StockScope) -> PartType {
        PartType {
            id,
            name: name.to_string(),
            department: DepartmentId::new(1),
            stock_scope: scope,
        }
    }

    /// rivet (pooled) shared by X1 {rivet: 6} and X2 {rivet: 3, wing: 2, tail: 1}.
    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new(
                vec![
                    part(RIVET, "rivet", StockScope::Pooled),
                    part(WING, "Wing", StockScope::PerPlane),
                    part(TAIL, "Tail", StockScope::PerPlane),
                ],
                vec![
                    PlaneType {
                        id: X1,
                        name: "X1".to_string(),
                        recipe: Recipe::new([(RIVET, 6)]).unwrap(),
                    },
                    PlaneType {
                        id: X2,
                        name: "X2".to_string(),
                        recipe: Recipe::new([(RIVET, 3), (WING, 2), (TAIL, 1)]).unwrap(),
                    },
                ],
            )
            .unwrap(),
        )
    }

    fn engine(policy: RecyclePolicy) -> AssemblyEngine {
        AssemblyEngine::new(catalog(), Arc::new(InMemoryHistoryLog::new()), policy)
    }

    fn rivets() -> StockKey {
        StockKey::Part(PartStock::pooled(RIVET))
    }

    fn actor() -> Actor {
        Actor::new(UserId::new(), "mehmet")
    }

    fn engine_over(history: &Arc<InMemoryHistoryLog>, movements: &Arc<InMemoryMovementLog>) -> AssemblyEngine {
        AssemblyEngine::with_logs(catalog(), history.clone(), movements.clone(), RecyclePolicy::Discard)
    }

    #[test]
    fn recover_rebuilds_rows_from_both_logs() {
        let history = Arc::new(InMemoryHistoryLog::new());
        let movements = Arc::new(InMemoryMovementLog::new());
        let first = engine_over(&history, &movements);
        first.seed(rivets(), 10).unwrap();
        first.add_part(WING, X2, &actor()).unwrap();
        first.assemble_plane(X1, &actor()).unwrap();
        first.recycle_plane(X1, &actor()).unwrap();
        let before = first.snapshot().unwrap();

        let restarted = engine_over(&history, &movements);
        let recovery = restarted.recover().unwrap();
        assert_eq!(recovery, Recovery { movements: 3, assemblies: 1 });
        assert_eq!(restarted.snapshot().unwrap(), before);
        assert_eq!(restarted.plane_count(X1).unwrap(), 0);
        assert_eq!(restarted.part_count(RIVET, X1).unwrap(), 4);
        assert_eq!(restarted.part_count(WING, X2).unwrap(), 1);
        assert!(restarted.audit().unwrap().is_consistent());
    }

    #[test]
    fn recover_rejects_assemblies_without_supply() {
        let history = Arc::new(InMemoryHistoryLog::new());
        let first = engine_over(&history, &Arc::new(InMemoryMovementLog::new()));
        first.seed(rivets(), 6).unwrap();
        first.assemble_plane(X1, &actor()).unwrap();

        let restarted = engine_over(&history, &Arc::new(InMemoryMovementLog::new()));
        let err = restarted.recover().unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)), "{err:?}");
        assert_eq!(restarted.plane_count(X1).unwrap(), 0);
    }

    #[test]
    fn assemble_consumes_recipe_and_records_history() {
        let engine = engine(RecyclePolicy::Discard);
        engine.seed(rivets(), 10).unwrap();

        let receipt = engine.assemble_plane(X1, &actor()).unwrap();
        assert_eq!(receipt.new_inventory, 1);
        assert_eq!(receipt.record.sequence, 1);
        assert_eq!(engine.part_count(RIVET, X1).unwrap(), 4);
        assert_eq!(engine.plane_count(X1).unwrap(), 1);
        assert_eq!(engine.history(&HistoryFilter::all()).unwrap().len(), 1);

        let err = engine.assemble_plane(X1, &actor()).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory(_)));
        assert_eq!(engine.part_count(RIVET, X1).unwrap(), 4);
        assert_eq!(engine.plane_count(X1).unwrap(), 1);
        assert_eq!(engine.history(&HistoryFilter::all()).unwrap().len(), 1);
    }

    #[test]
    fn partial_shortage_retains_no_decrements() {
        let engine = engine(RecyclePolicy::Discard);
        engine.seed(rivets(), 10).unwrap();
        engine.add_part(WING, X2, &actor()).unwrap();
        engine.add_part(TAIL, X2, &actor()).unwrap();

        let err = engine.assemble_plane(X2, &actor()).unwrap_err();
        match err {
            DomainError::InsufficientInventory(msg) => {
                assert!(msg.contains("Wing (needs 2, has 1)"), "{msg}");
                assert!(!msg.contains("rivet"), "{msg}");
            }
            other => panic!("expected insufficient inventory, got {other:?}"),
        }
        assert_eq!(engine.part_count(RIVET, X2).unwrap(), 10);
        assert_eq!(engine.part_count(WING, X2).unwrap(), 1);
        assert_eq!(engine.part_count(TAIL, X2).unwrap(), 1);
        assert_eq!(engine.plane_count(X2).unwrap(), 0);
        assert!(engine.history(&HistoryFilter::all()).unwrap().is_empty());
    }

    #[test]
    fn n_assemblies_yield_n_records() {
        let engine = engine(RecyclePolicy::Discard);
        engine.seed(rivets(), 60).unwrap();
        for _ in 0..10 {
            engine.assemble_plane(X1, &actor()).unwrap();
        }
        let records = engine.history(&HistoryFilter::for_plane(X1)).unwrap();
        assert_eq!(records.len(), 10);
        assert_eq!(engine.plane_count(X1).unwrap(), 10);
        assert!(records.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert!(engine.audit().unwrap().is_consistent());
    }

    #[test]
    fn recycle_plane_at_zero_fails_without_history() {
        let engine = engine(RecyclePolicy::Discard);
        let err = engine.recycle_plane(X1, &actor()).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory(msg) if msg == "No X1 to recycle."));
        assert!(engine.history(&HistoryFilter::all()).unwrap().is_empty());
        assert!(engine.recent_movements().unwrap().is_empty());
    }

    #[test]
    fn recycle_plane_discard_keeps_parts_consumed() {
        let engine = engine(RecyclePolicy::Discard);
        engine.seed(rivets(), 6).unwrap();
        engine.assemble_plane(X1, &actor()).unwrap();

        assert_eq!(engine.recycle_plane(X1, &actor()).unwrap(), 0);
        assert_eq!(engine.part_count(RIVET, X1).unwrap(), 0);
        assert!(engine.audit().unwrap().is_consistent());
    }

    #[test]
    fn recycle_plane_restore_returns_recipe() {
        let engine = engine(RecyclePolicy::RestoreRecipe);
        engine.seed(rivets(), 6).unwrap();
        engine.assemble_plane(X1, &actor()).unwrap();

        assert_eq!(engine.recycle_plane(X1, &actor()).unwrap(), 0);
        assert_eq!(engine.part_count(RIVET, X1).unwrap(), 6);
        assert!(engine.audit().unwrap().is_consistent());
    }

    #[test]
    fn recycle_part_at_zero_fails() {
        let engine = engine(RecyclePolicy::Discard);
        let err = engine.recycle_part(RIVET, X1, &actor()).unwrap_err();
        assert!(matches!(err, DomainError::InsufficientInventory(msg) if msg.contains("no rivet for X1")));
    }

    #[test]
    fn pooled_part_is_shared_between_planes() {
        let engine = engine(RecyclePolicy::Discard);
        engine.add_part(RIVET, X2, &actor()).unwrap();
        assert_eq!(engine.part_count(RIVET, X1).unwrap(), 1);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let engine = engine(RecyclePolicy::Discard);
        assert!(matches!(
            engine.assemble_plane(PlaneTypeId::new(99), &actor()),
            Err(DomainError::NotFound(_))
        ));
        assert!(matches!(
            engine.add_part(WING, X1, &actor()),
            Err(DomainError::NotFound(msg)) if msg == "Wing is not used by X1"
        ));
    }

    #[test]
    fn snapshot_lists_every_row() {
        let engine = engine(RecyclePolicy::Discard);
        engine.seed(rivets(), 3).unwrap();
        let snapshot = engine.snapshot().unwrap();
        assert_eq!(snapshot.planes.len(), 2);
        assert_eq!(snapshot.planes[0].plane, X1);
        assert_eq!(snapshot.part_count(PartStock::pooled(RIVET)), Some(3));
        assert_eq!(snapshot.part_count(PartStock::per_plane(WING, X2)), Some(0));
    }

    #[test]
    fn concurrent_assemblies_never_overdraw_shared_part() {
        // 8 rivets cover X1 (6) or X2 (3), never both.
        for _ in 0..50 {
            let engine = Arc::new(engine(RecyclePolicy::Discard));
            engine.seed(rivets(), 8).unwrap();
            engine.seed(StockKey::Part(PartStock::per_plane(WING, X2)), 2).unwrap();
            engine.seed(StockKey::Part(PartStock::per_plane(TAIL, X2)), 1).unwrap();

            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = [X1, X2]
                .into_iter()
                .map(|plane| {
                    let engine = engine.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        engine.assemble_plane(plane, &actor())
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let ok = results.iter().filter(|r| r.is_ok()).count();
            let short = results
                .iter()
                .filter(|r| matches!(r, Err(DomainError::InsufficientInventory(_))))
                .count();
            assert_eq!((ok, short), (1, 1));

            let planes = engine.plane_count(X1).unwrap() + engine.plane_count(X2).unwrap();
            assert_eq!(planes, 1);
            let rivets_left = engine.part_count(RIVET, X1).unwrap();
            assert!(rivets_left == 2 || rivets_left == 5, "rivets left: {rivets_left}");
            assert_eq!(engine.history(&HistoryFilter::all()).unwrap().len(), 1);
            assert!(engine.audit().unwrap().is_consistent());
        }
    }

    #[test]
    fn concurrent_assemblies_of_same_plane_respect_stock() {
        let engine = Arc::new(engine(RecyclePolicy::Discard));
        engine.seed(rivets(), 60).unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    (0..4)
                        .filter(|_| engine.assemble_plane(X1, &actor()).is_ok())
                        .count()
                })
            })
            .collect();

        let successes: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(successes, 10);
        assert_eq!(engine.plane_count(X1).unwrap(), 10);
        assert_eq!(engine.part_count(RIVET, X1).unwrap(), 0);
        assert_eq!(engine.history(&HistoryFilter::for_plane(X1)).unwrap().len(), 10);
    }

    #[test]
    fn contended_mixed_workload_stays_consistent() {
        let engine = Arc::new(engine(RecyclePolicy::RestoreRecipe));
        engine.seed(rivets(), 200).unwrap();

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let engine = engine.clone();
                std::thread::spawn(move || {
                    let actor = actor();
                    for n in 0..200 {
                        let _ = match (i + n) % 5 {
                            0 => engine.assemble_plane(X1, &actor).map(|r| r.new_inventory),
                            1 => engine.assemble_plane(X2, &actor).map(|r| r.new_inventory),
                            2 => engine.add_part(WING, X2, &actor),
                            3 => engine.add_part(TAIL, X2, &actor),
                            _ => engine.recycle_plane(if n % 2 == 0 { X1 } else { X2 }, &actor),
                        };
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let report = engine.audit().unwrap();
        assert!(report.is_consistent(), "{report:?}");
    }

    struct FailingHistory;

    impl HistoryLog for FailingHistory {
        fn append_with(
            &self,
            _draft: AssemblyDraft,
            _commit: &mut dyn FnMut(&AssemblyRecord),
        ) -> Result<AssemblyRecord, LogError> {
            Err(LogError::Storage("disk full".to_string()))
        }

        fn list(&self, _filter: &HistoryFilter) -> Result<Vec<AssemblyRecord>, LogError> {
            Ok(Vec::new())
        }

        fn len(&self) -> Result<usize, LogError> {
            Ok(0)
        }
    }

    #[test]
    fn storage_failure_leaves_ledger_untouched() {
        let engine = AssemblyEngine::new(catalog(), Arc::new(FailingHistory), RecyclePolicy::Discard);
        engine.seed(rivets(), 10).unwrap();

        let err = engine.assemble_plane(X1, &actor()).unwrap_err();
        assert!(matches!(err, DomainError::Storage(_)));
        assert_eq!(engine.part_count(RIVET, X1).unwrap(), 10);
        assert_eq!(engine.plane_count(X1).unwrap(), 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        AddRivet,
        RecycleRivet,
        AddWing,
        AddTail,
        Assemble(bool),
        Recycle(bool),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::AddRivet),
            Just(Op::RecycleRivet),
            Just(Op::AddWing),
            Just(Op::AddTail),
            any::<bool>().prop_map(Op::Assemble),
            any::<bool>().prop_map(Op::Recycle),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: any operation sequence keeps every count non-negative and
        /// the ledger equal to a replay of its logs.
        #[test]
        fn any_sequence_keeps_ledger_replayable(ops in prop::collection::vec(op(), 0..80), restore in any::<bool>()) {
            let policy = if restore { RecyclePolicy::RestoreRecipe } else { RecyclePolicy::Discard };
            let engine = engine(policy);
            let actor = actor();
            let mut assembled = 0usize;

            for op in ops {
                let before = engine.snapshot().unwrap();
                let result = match op {
                    Op::AddRivet => engine.add_part(RIVET, X1, &actor),
                    Op::RecycleRivet => engine.recycle_part(RIVET, X1, &actor),
                    Op::AddWing => engine.add_part(WING, X2, &actor),
                    Op::AddTail => engine.add_part(TAIL, X2, &actor),
                    Op::Assemble(first) => engine
                        .assemble_plane(if first { X1 } else { X2 }, &actor)
                        .map(|r| { assembled += 1; r.new_inventory }),
                    Op::Recycle(first) => engine.recycle_plane(if first { X1 } else { X2 }, &actor),
                };
                if let Err(e) = result {
                    prop_assert!(matches!(e, DomainError::InsufficientInventory(_)), "{:?}", e);
                    prop_assert_eq!(engine.snapshot().unwrap(), before);
                }
            }

            prop_assert_eq!(engine.history(&HistoryFilter::all()).unwrap().len(), assembled);
            prop_assert!(engine.audit().unwrap().is_consistent());
        }
    }
}
