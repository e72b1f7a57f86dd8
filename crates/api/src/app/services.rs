use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use aeroforge_auth::{AccessGuard, Credential, Department, DepartmentScope, Grant, NewUser, ResourceScope, UserAccount};
use aeroforge_core::{DomainResult, PartTypeId, PlaneTypeId};
use aeroforge_infra::{AppConfig, ConfigError, ServiceContext};
use aeroforge_inventory::{AssemblyReceipt, AssemblyRecord, HistoryFilter, PartStock, PlaneStockView, StockScope};

use crate::authz::{actor_of, authorize};

/// One row of a department's part inventory.
///
/// Pooled parts are shared by every plane, so their stock is listed once in a
/// row with no plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartRow {
    pub plane_id: Option<PlaneTypeId>,
    pub plane_name: Option<String>,
    pub part_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartListing {
    pub department_name: String,
    /// First part type owned by the department.
    pub part_id: Option<PartTypeId>,
    pub rows: Vec<PartRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartMutation {
    pub part_id: PartTypeId,
    pub part_name: String,
    pub plane_id: PlaneTypeId,
    pub plane_name: String,
    pub new_inventory: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneListing {
    pub department_name: String,
    pub rows: Vec<PlaneStockView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneMutation {
    pub plane_id: PlaneTypeId,
    pub plane_name: String,
    pub new_inventory: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentAccess {
    pub department: Department,
    pub is_access: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentOverview {
    pub is_assembly_team: bool,
    pub username: String,
    /// Part-production departments only.
    pub departments: Vec<DepartmentAccess>,
}

/// Request-facing facade over the inventory engine and the access guard.
///
/// Every inventory method takes the caller's credential and authorizes its
/// own scope first.
pub struct AppServices {
    ctx: ServiceContext,
}

impl AppServices {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(aeroforge_infra::bootstrap(config)?))
    }

    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    fn guard(&self) -> &dyn AccessGuard {
        self.ctx.guard.as_ref()
    }

    fn department_name(&self, scope: &DepartmentScope) -> String {
        let id = match scope {
            DepartmentScope::Assembly => Some(self.ctx.departments.assembly()),
            DepartmentScope::Parts { department, .. } => Some(*department),
            DepartmentScope::Unassigned => None,
        };
        id.and_then(|id| self.ctx.departments.get(id))
            .map(|d| d.name.clone())
            .unwrap_or_default()
    }

    pub fn list_parts(&self, credential: &Credential) -> DomainResult<PartListing> {
        let grant = authorize(self.guard(), credential, ResourceScope::PartInventory)?;
        let owned: Vec<PartTypeId> = match &grant.scope {
            DepartmentScope::Parts { part_types, .. } => part_types.iter().copied().collect(),
            _ => Vec::new(),
        };

        let catalog = self.ctx.engine.catalog();
        let snapshot = self.ctx.engine.snapshot()?;
        let mut per_plane = Vec::new();
        let mut pooled = 0u64;
        for part in &owned {
            match catalog.part(*part)?.stock_scope {
                StockScope::PerPlane => per_plane.push(*part),
                StockScope::Pooled => pooled += snapshot.part_count(PartStock::pooled(*part)).unwrap_or(0),
            }
        }

        let mut rows = Vec::new();
        for plane in catalog.planes() {
            let mut total = 0u64;
            for part in per_plane.iter().filter(|p| plane.recipe.quantity(**p).is_some()) {
                total += snapshot.part_count(PartStock::per_plane(*part, plane.id)).unwrap_or(0);
            }
            if total > 0 {
                rows.push(PartRow {
                    plane_id: Some(plane.id),
                    plane_name: Some(plane.name.clone()),
                    part_count: total,
                });
            }
        }
        if pooled > 0 {
            rows.push(PartRow {
                plane_id: None,
                plane_name: None,
                part_count: pooled,
            });
        }

        Ok(PartListing {
            department_name: self.department_name(&grant.scope),
            part_id: owned.first().copied(),
            rows,
        })
    }

    pub fn add_part(&self, credential: &Credential, part: PartTypeId, plane: PlaneTypeId) -> DomainResult<PartMutation> {
        let grant = self.authorize_part(credential, part)?;
        let new_inventory = self.ctx.engine.add_part(part, plane, &actor_of(&grant))?;
        self.part_mutation(part, plane, new_inventory)
    }

    pub fn recycle_part(&self, credential: &Credential, part: PartTypeId, plane: PlaneTypeId) -> DomainResult<PartMutation> {
        let grant = self.authorize_part(credential, part)?;
        let new_inventory = self.ctx.engine.recycle_part(part, plane, &actor_of(&grant))?;
        self.part_mutation(part, plane, new_inventory)
    }

    /// Unknown parts are reported as `NotFound` only to callers who may manage parts at all.
    fn authorize_part(&self, credential: &Credential, part: PartTypeId) -> DomainResult<Grant> {
        match self.ctx.engine.catalog().part(part) {
            Ok(_) => authorize(self.guard(), credential, ResourceScope::Part(part)),
            Err(not_found) => {
                authorize(self.guard(), credential, ResourceScope::PartInventory)?;
                Err(not_found)
            }
        }
    }

    fn part_mutation(&self, part: PartTypeId, plane: PlaneTypeId, new_inventory: u64) -> DomainResult<PartMutation> {
        let catalog = self.ctx.engine.catalog();
        Ok(PartMutation {
            part_id: part,
            part_name: catalog.part(part)?.name.clone(),
            plane_id: plane,
            plane_name: catalog.plane(plane)?.name.clone(),
            new_inventory,
        })
    }

    pub fn list_planes(&self, credential: &Credential) -> DomainResult<PlaneListing> {
        let grant = authorize(self.guard(), credential, ResourceScope::PlaneInventory)?;
        let snapshot = self.ctx.engine.snapshot()?;
        Ok(PlaneListing {
            department_name: self.department_name(&grant.scope),
            rows: snapshot.planes,
        })
    }

    pub fn assemble_plane(&self, credential: &Credential, plane: PlaneTypeId) -> DomainResult<AssemblyReceipt> {
        let grant = authorize(self.guard(), credential, ResourceScope::Plane(plane))?;
        self.ctx.engine.assemble_plane(plane, &actor_of(&grant))
    }

    pub fn recycle_plane(&self, credential: &Credential, plane: PlaneTypeId) -> DomainResult<PlaneMutation> {
        let grant = authorize(self.guard(), credential, ResourceScope::Plane(plane))?;
        let new_inventory = self.ctx.engine.recycle_plane(plane, &actor_of(&grant))?;
        Ok(PlaneMutation {
            plane_id: plane,
            plane_name: self.ctx.engine.catalog().plane(plane)?.name.clone(),
            new_inventory,
        })
    }

    pub fn assembly_history(&self, credential: &Credential) -> DomainResult<Vec<AssemblyRecord>> {
        authorize(self.guard(), credential, ResourceScope::AssemblyHistory)?;
        self.ctx.engine.history(&HistoryFilter::all())
    }

    pub fn department_overview(&self, credential: &Credential) -> DomainResult<DepartmentOverview> {
        let grant = authorize(self.guard(), credential, ResourceScope::Departments)?;
        let own = grant.scope.department();
        let departments = self
            .ctx
            .departments
            .production()
            .map(|d| DepartmentAccess {
                department: d.clone(),
                is_access: Some(d.id) == own,
            })
            .collect();

        Ok(DepartmentOverview {
            is_assembly_team: grant.scope == DepartmentScope::Assembly,
            username: grant.caller.username,
            departments,
        })
    }

    pub fn login(&self, username: &str, password: &str) -> DomainResult<String> {
        self.ctx.users.login(username, password, &self.ctx.issuer, Utc::now())
    }

    pub fn register(&self, new_user: NewUser) -> DomainResult<UserAccount> {
        self.ctx.users.register(new_user, &self.ctx.departments)
    }
}

pub type SharedServices = Arc<AppServices>;
