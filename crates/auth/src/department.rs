//! Departments and the part types each one produces.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use aeroforge_core::{DepartmentId, DomainError, DomainResult, PartTypeId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepartmentKind {
    /// Builds and recycles planes; may read history.
    Assembly,
    /// Produces and recycles its own part types.
    PartProduction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub kind: DepartmentKind,
    /// Part types this department owns. Always empty for the assembly team.
    #[serde(default)]
    pub part_types: BTreeSet<PartTypeId>,
}

impl Department {
    pub fn is_assembly(&self) -> bool {
        self.kind == DepartmentKind::Assembly
    }

    pub fn owns(&self, part: PartTypeId) -> bool {
        self.part_types.contains(&part)
    }
}

/// Immutable set of departments with exactly one assembly team.
#[derive(Debug, Clone)]
pub struct DepartmentDirectory {
    departments: BTreeMap<DepartmentId, Department>,
    assembly: DepartmentId,
}

impl DepartmentDirectory {
    pub fn new(departments: Vec<Department>) -> DomainResult<Self> {
        let mut map = BTreeMap::new();
        let mut owners: BTreeMap<PartTypeId, DepartmentId> = BTreeMap::new();
        let mut assembly = None;

        for department in departments {
            if department.name.trim().is_empty() {
                return Err(DomainError::validation(format!(
                    "department {} has an empty name",
                    department.id
                )));
            }
            match department.kind {
                DepartmentKind::Assembly => {
                    if !department.part_types.is_empty() {
                        return Err(DomainError::validation("the assembly team cannot own part types"));
                    }
                    if assembly.replace(department.id).is_some() {
                        return Err(DomainError::validation("more than one assembly department"));
                    }
                }
                DepartmentKind::PartProduction => {
                    for part in &department.part_types {
                        if let Some(previous) = owners.insert(*part, department.id) {
                            return Err(DomainError::validation(format!(
                                "part {part} is owned by departments {previous} and {}",
                                department.id
                            )));
                        }
                    }
                }
            }
            let id = department.id;
            if map.insert(id, department).is_some() {
                return Err(DomainError::validation(format!("duplicate department id {id}")));
            }
        }

        let assembly = assembly.ok_or_else(|| DomainError::validation("no assembly department configured"))?;
        Ok(Self {
            departments: map,
            assembly,
        })
    }

    pub fn get(&self, id: DepartmentId) -> Option<&Department> {
        self.departments.get(&id)
    }

    pub fn assembly(&self) -> DepartmentId {
        self.assembly
    }

    /// Departments in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Department> {
        self.departments.values()
    }

    /// Part-production departments only.
    pub fn production(&self) -> impl Iterator<Item = &Department> {
        self.departments.values().filter(|d| !d.is_assembly())
    }

    pub fn owner_of(&self, part: PartTypeId) -> Option<&Department> {
        self.production().find(|d| d.owns(part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production(id: u32, name: &str, parts: &[u32]) -> Department {
        Department {
            id: DepartmentId::new(id),
            name: name.to_string(),
            kind: DepartmentKind::PartProduction,
            part_types: parts.iter().copied().map(PartTypeId::new).collect(),
        }
    }

    fn assembly(id: u32) -> Department {
        Department {
            id: DepartmentId::new(id),
            name: "Assembly Team".to_string(),
            kind: DepartmentKind::Assembly,
            part_types: BTreeSet::new(),
        }
    }

    #[test]
    fn requires_exactly_one_assembly_team() {
        let none = DepartmentDirectory::new(vec![production(1, "Wing", &[1])]);
        assert!(matches!(none, Err(DomainError::Validation(_))));

        let two = DepartmentDirectory::new(vec![assembly(5), assembly(6)]);
        assert!(matches!(two, Err(DomainError::Validation(_))));
    }

    #[test]
    fn part_has_a_single_owner() {
        let err = DepartmentDirectory::new(vec![
            production(1, "Wing", &[1]),
            production(2, "Tail", &[1]),
            assembly(5),
        ])
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("part 1")));
    }

    #[test]
    fn resolves_owner_and_assembly() {
        let dir = DepartmentDirectory::new(vec![
            production(1, "Wing", &[1]),
            production(2, "Tail", &[3]),
            assembly(5),
        ])
        .unwrap();

        assert_eq!(dir.assembly(), DepartmentId::new(5));
        assert_eq!(dir.owner_of(PartTypeId::new(3)).map(|d| d.name.as_str()), Some("Tail"));
        assert!(dir.owner_of(PartTypeId::new(9)).is_none());
        assert_eq!(dir.production().count(), 2);
    }
}
