//! Static catalogue of part types and plane types.
//!
//! The catalogue is built once at bootstrap and never mutated afterwards;
//! everything else in this crate borrows it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use aeroforge_core::{DepartmentId, DomainError, DomainResult, PartTypeId, PlaneTypeId};

use crate::ledger::{PartStock, StockKey};

/// How stock of a part type is counted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockScope {
    /// One counter per (part, plane) pair: the unit is built for a specific airframe.
    #[default]
    PerPlane,
    /// One counter shared by every plane whose recipe uses the part.
    Pooled,
}

/// A manufactured part type, owned by exactly one department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartType {
    pub id: PartTypeId,
    pub name: String,
    pub department: DepartmentId,
    #[serde(default)]
    pub stock_scope: StockScope,
}

/// Fixed mapping from part type to the units required for one plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe(BTreeMap<PartTypeId, u32>);

impl Recipe {
    /// Build a recipe, rejecting empty recipes, zero quantities and repeated parts.
    pub fn new(lines: impl IntoIterator<Item = (PartTypeId, u32)>) -> DomainResult<Self> {
        let mut map = BTreeMap::new();
        for (part, quantity) in lines {
            if quantity == 0 {
                return Err(DomainError::validation(format!(
                    "recipe quantity for part {part} must be positive"
                )));
            }
            if map.insert(part, quantity).is_some() {
                return Err(DomainError::validation(format!(
                    "part {part} appears more than once in recipe"
                )));
            }
        }
        if map.is_empty() {
            return Err(DomainError::validation("recipe cannot be empty"));
        }
        Ok(Self(map))
    }

    pub fn quantity(&self, part: PartTypeId) -> Option<u32> {
        self.0.get(&part).copied()
    }

    /// Recipe lines in part id order.
    pub fn iter(&self) -> impl Iterator<Item = (PartTypeId, u32)> + '_ {
        self.0.iter().map(|(p, q)| (*p, *q))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// An assembled plane type with its immutable recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneType {
    pub id: PlaneTypeId,
    pub name: String,
    pub recipe: Recipe,
}

/// Validated, immutable catalogue.
#[derive(Debug, Clone)]
pub struct Catalog {
    parts: BTreeMap<PartTypeId, PartType>,
    planes: BTreeMap<PlaneTypeId, PlaneType>,
}

impl Catalog {
    /// Build a catalogue.
    ///
    /// Rejects duplicate ids, blank names and recipes that reference unknown parts.
    pub fn new(parts: Vec<PartType>, planes: Vec<PlaneType>) -> DomainResult<Self> {
        let mut part_map = BTreeMap::new();
        for part in parts {
            if part.name.trim().is_empty() {
                return Err(DomainError::validation(format!("part {} has an empty name", part.id)));
            }
            let id = part.id;
            if part_map.insert(id, part).is_some() {
                return Err(DomainError::validation(format!("duplicate part id {id}")));
            }
        }

        let mut plane_map = BTreeMap::new();
        for plane in planes {
            if plane.name.trim().is_empty() {
                return Err(DomainError::validation(format!("plane {} has an empty name", plane.id)));
            }
            for (part, _) in plane.recipe.iter() {
                if !part_map.contains_key(&part) {
                    return Err(DomainError::validation(format!(
                        "recipe of {} references unknown part {part}",
                        plane.name
                    )));
                }
            }
            let id = plane.id;
            if plane_map.insert(id, plane).is_some() {
                return Err(DomainError::validation(format!("duplicate plane id {id}")));
            }
        }

        Ok(Self {
            parts: part_map,
            planes: plane_map,
        })
    }

    pub fn part(&self, id: PartTypeId) -> DomainResult<&PartType> {
        self.parts
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("part {id} does not exist")))
    }

    pub fn plane(&self, id: PlaneTypeId) -> DomainResult<&PlaneType> {
        self.planes
            .get(&id)
            .ok_or_else(|| DomainError::not_found(format!("plane {id} does not exist")))
    }

    pub fn parts(&self) -> impl Iterator<Item = &PartType> {
        self.parts.values()
    }

    /// Planes in id order.
    pub fn planes(&self) -> impl Iterator<Item = &PlaneType> {
        self.planes.values()
    }

    pub fn parts_of_department(&self, department: DepartmentId) -> impl Iterator<Item = &PartType> {
        self.parts.values().filter(move |p| p.department == department)
    }

    /// Resolve the stock row that holds `part` units usable by `plane`.
    pub fn part_stock(&self, part_id: PartTypeId, plane_id: PlaneTypeId) -> DomainResult<PartStock> {
        let part = self.part(part_id)?;
        let plane = self.plane(plane_id)?;
        match part.stock_scope {
            StockScope::Pooled => Ok(PartStock::pooled(part_id)),
            StockScope::PerPlane => {
                if plane.recipe.quantity(part_id).is_none() {
                    return Err(DomainError::not_found(format!(
                        "{} is not used by {}",
                        part.name, plane.name
                    )));
                }
                Ok(PartStock::per_plane(part_id, plane_id))
            }
        }
    }

    /// Every ledger row implied by the catalogue.
    pub fn stock_keys(&self) -> Vec<StockKey> {
        let mut keys = Vec::new();
        for part in self.parts.values() {
            if part.stock_scope == StockScope::Pooled {
                keys.push(StockKey::Part(PartStock::pooled(part.id)));
            }
        }
        for plane in self.planes.values() {
            keys.push(StockKey::Plane(plane.id));
            for (part_id, _) in plane.recipe.iter() {
                if let Some(part) = self.parts.get(&part_id) {
                    if part.stock_scope == StockScope::PerPlane {
                        keys.push(StockKey::Part(PartStock::per_plane(part_id, plane.id)));
                    }
                }
            }
        }
        keys.sort();
        keys
    }
}
