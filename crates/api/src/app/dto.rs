use serde::Deserialize;
use serde_json::{Value, json};

use aeroforge_core::{DomainError, DomainResult, PartTypeId, PlaneTypeId};
use aeroforge_inventory::{AssemblyReceipt, AssemblyRecord};

use crate::app::services::{DepartmentOverview, PartListing, PartMutation, PlaneListing, PlaneMutation};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PartRequest {
    pub part_id: Option<u32>,
    pub plane_id: Option<u32>,
}

impl PartRequest {
    pub fn ids(&self) -> DomainResult<(PartTypeId, PlaneTypeId)> {
        Ok((required_id(self.part_id, "part_id")?, required_id(self.plane_id, "plane_id")?))
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaneRequest {
    pub plane_id: Option<u32>,
}

impl PlaneRequest {
    pub fn id(&self) -> DomainResult<PlaneTypeId> {
        required_id(self.plane_id, "plane_id")
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Missing and zero ids are both rejected.
fn required_id<T: From<u32>>(value: Option<u32>, field: &str) -> DomainResult<T> {
    match value {
        Some(id) if id > 0 => Ok(T::from(id)),
        _ => Err(DomainError::validation(format!("{field} is required."))),
    }
}

// -------------------------
// Response mapping
// -------------------------

pub fn part_listing_to_json(listing: &PartListing) -> Value {
    json!({
        "status": true,
        "department_name": listing.department_name,
        "part_id": listing.part_id,
        "data": listing.rows,
    })
}

pub fn part_added_to_json(m: &PartMutation) -> Value {
    part_mutation_to_json(m, format!("Successfully manufactured a '{}' for '{}'", m.part_name, m.plane_name))
}

pub fn part_recycled_to_json(m: &PartMutation) -> Value {
    part_mutation_to_json(m, format!("Successfully recycled one {} for {}.", m.part_name, m.plane_name))
}

fn part_mutation_to_json(m: &PartMutation, message: String) -> Value {
    json!({
        "status": true,
        "message": message,
        "part_id": m.part_id,
        "plane_id": m.plane_id,
        "new_inventory": m.new_inventory,
    })
}

pub fn plane_listing_to_json(listing: &PlaneListing) -> Value {
    let data: Vec<Value> = listing
        .rows
        .iter()
        .map(|p| {
            json!({
                "plane_id": p.plane,
                "plane_name": p.plane_name,
                "plane_inventory": p.count,
            })
        })
        .collect();
    json!({
        "status": true,
        "department_name": listing.department_name,
        "data": data,
    })
}

pub fn assembly_to_json(receipt: &AssemblyReceipt) -> Value {
    json!({
        "status": true,
        "message": format!("Successfully manufactured a '{}'", receipt.record.plane_name),
        "plane_id": receipt.record.plane,
        "new_inventory": receipt.new_inventory,
        "used_parts": receipt.record.part_names(),
        "sequence": receipt.record.sequence,
    })
}

pub fn plane_recycled_to_json(m: &PlaneMutation) -> Value {
    json!({
        "status": true,
        "message": format!("Successfully recycled one {}.", m.plane_name),
        "plane_id": m.plane_id,
        "new_inventory": m.new_inventory,
    })
}

pub fn history_to_json(records: &[AssemblyRecord]) -> Value {
    let data: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "plane_name": r.plane_name,
                "used_parts": r.part_names().join(", "),
                "date": r.assembled_at.format("%Y-%m-%d").to_string(),
            })
        })
        .collect();
    json!({ "status": true, "data": data })
}

pub fn department_overview_to_json(overview: &DepartmentOverview) -> Value {
    let departments: Vec<Value> = overview
        .departments
        .iter()
        .map(|d| {
            json!({
                "department_name": d.department.name,
                "department_id": d.department.id,
                "isAccess": d.is_access,
            })
        })
        .collect();
    json!({
        "isAssemblyTeam": overview.is_assembly_team,
        "username": overview.username,
        "departments": departments,
    })
}
