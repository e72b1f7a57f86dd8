//! Wire the domain from configuration: catalogue, departments, engine, users.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Duration;

use aeroforge_auth::{
    Department, DepartmentAccessGuard, DepartmentDirectory, DepartmentKind, Hs256JwtValidator, JwtIssuer, NewUser,
    UserDirectory,
};
use aeroforge_core::{DepartmentId, PartTypeId};
use aeroforge_inventory::{
    AssemblyEngine, Catalog, HistoryLog, InMemoryHistoryLog, InMemoryMovementLog, MovementLog, PartStock, PlaneType,
    Recipe, StockKey,
};

use crate::config::{AppConfig, ConfigError, OpeningStockConfig};
use crate::history_file::JsonlHistoryLog;
use crate::movement_file::JsonlMovementLog;

/// Everything the service needs at runtime, built once at startup.
#[derive(Clone)]
pub struct ServiceContext {
    pub engine: Arc<AssemblyEngine>,
    pub departments: Arc<DepartmentDirectory>,
    pub guard: Arc<DepartmentAccessGuard>,
    pub users: Arc<UserDirectory>,
    pub issuer: Arc<JwtIssuer>,
}

pub fn bootstrap(config: &AppConfig) -> Result<ServiceContext, ConfigError> {
    let catalog = Arc::new(build_catalog(config)?);
    let departments = Arc::new(build_departments(config, &catalog)?);

    let opening = config
        .opening_stock
        .iter()
        .map(|entry| Ok((opening_key(&catalog, entry)?, entry.quantity)))
        .collect::<Result<Vec<_>, ConfigError>>()?;

    let (history, movements): (Arc<dyn HistoryLog>, Arc<dyn MovementLog>) = match config.inventory.log_paths()? {
        Some((history_path, movements_path)) => (
            Arc::new(JsonlHistoryLog::open(&history_path)?),
            Arc::new(JsonlMovementLog::open(&movements_path)?),
        ),
        None => (Arc::new(InMemoryHistoryLog::new()), Arc::new(InMemoryMovementLog::new())),
    };

    let engine = AssemblyEngine::with_logs(catalog.clone(), history, movements, config.inventory.recycle_policy);
    // Opening stock is journaled once, on the first start against a given movement log.
    if engine.movement_totals()?.is_empty() {
        for (key, quantity) in opening.into_iter().filter(|(_, q)| *q > 0) {
            engine.seed(key, quantity)?;
        }
    } else if !opening.is_empty() {
        tracing::info!("opening stock already journaled, not seeding again");
    }
    engine.recover()?;

    if config.auth.token_ttl_minutes <= 0 {
        return Err(ConfigError::Invalid("auth.token_ttl_minutes must be positive".to_string()));
    }
    if config.uses_default_secret() {
        tracing::warn!("JWT_SECRET not set, using the development secret");
    }
    let secret = config.auth.jwt_secret.as_bytes();
    let issuer = Arc::new(JwtIssuer::new(secret, Duration::minutes(config.auth.token_ttl_minutes)));
    let guard = Arc::new(DepartmentAccessGuard::new(
        Arc::new(Hs256JwtValidator::new(secret)),
        departments.clone(),
    ));

    let users = Arc::new(UserDirectory::new());
    for user in &config.users {
        users.register(
            NewUser {
                username: user.username.clone(),
                email: user.email.clone(),
                password: user.password.clone(),
                department: user.department,
            },
            &departments,
        )?;
    }

    tracing::info!(
        parts = catalog.parts().count(),
        planes = catalog.planes().count(),
        departments = departments.iter().count(),
        users = config.users.len(),
        recycle_policy = ?config.inventory.recycle_policy,
        "inventory service bootstrapped"
    );

    Ok(ServiceContext {
        engine: Arc::new(engine),
        departments,
        guard,
        users,
        issuer,
    })
}

fn build_catalog(config: &AppConfig) -> Result<Catalog, ConfigError> {
    let planes = config
        .planes
        .iter()
        .map(|plane| {
            Ok(PlaneType {
                id: plane.id,
                name: plane.name.clone(),
                recipe: Recipe::new(plane.recipe.iter().map(|line| (line.part_id, line.quantity)))?,
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;
    Ok(Catalog::new(config.parts.clone(), planes)?)
}

fn build_departments(config: &AppConfig, catalog: &Catalog) -> Result<DepartmentDirectory, ConfigError> {
    let kinds: BTreeMap<DepartmentId, DepartmentKind> = config.departments.iter().map(|d| (d.id, d.kind)).collect();

    for part in catalog.parts() {
        match kinds.get(&part.department) {
            Some(DepartmentKind::PartProduction) => {}
            Some(DepartmentKind::Assembly) => {
                return Err(ConfigError::Invalid(format!(
                    "part {} is assigned to the assembly department",
                    part.name
                )));
            }
            None => {
                return Err(ConfigError::Invalid(format!(
                    "part {} references unknown department {}",
                    part.name, part.department
                )));
            }
        }
    }

    let departments = config
        .departments
        .iter()
        .map(|d| Department {
            id: d.id,
            name: d.name.clone(),
            kind: d.kind,
            part_types: catalog
                .parts_of_department(d.id)
                .map(|p| p.id)
                .collect::<BTreeSet<PartTypeId>>(),
        })
        .collect();
    Ok(DepartmentDirectory::new(departments)?)
}

fn opening_key(catalog: &Catalog, entry: &OpeningStockConfig) -> Result<StockKey, ConfigError> {
    match (entry.part_id, entry.plane_id) {
        (Some(part), Some(plane)) => Ok(StockKey::Part(catalog.part_stock(part, plane)?)),
        (Some(part), None) => {
            let key = StockKey::Part(PartStock::pooled(part));
            catalog.part(part)?;
            if !catalog.stock_keys().contains(&key) {
                return Err(ConfigError::Invalid(format!(
                    "opening stock for part {part} needs a plane_id (stock is kept per plane)"
                )));
            }
            Ok(key)
        }
        (None, Some(plane)) => {
            catalog.plane(plane)?;
            Ok(StockKey::Plane(plane))
        }
        (None, None) => Err(ConfigError::Invalid(
            "opening stock entry needs a part_id, a plane_id or both".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeroforge_auth::{AccessGuard, Credential, ResourceScope};
    use aeroforge_core::PlaneTypeId;
    use aeroforge_inventory::{Actor, HistoryFilter};
    use chrono::Utc;

    const CONFIG: &str = r#"
[auth]
jwt_secret = "bootstrap-test"

[[departments]]
id = 1
name = "Hardware"
kind = "part_production"

[[departments]]
id = 2
name = "Wing"
kind = "part_production"

[[departments]]
id = 5
name = "Assembly Team"
kind = "assembly"

[[parts]]
id = 1
name = "rivet"
department = 1
stock_scope = "pooled"

[[parts]]
id = 2
name = "Wing"
department = 2

[[planes]]
id = 1
name = "X1"
recipe = [{ part_id = 1, quantity = 6 }]

[[planes]]
id = 2
name = "X2"
recipe = [{ part_id = 1, quantity = 3 }, { part_id = 2, quantity = 2 }]

[[opening_stock]]
part_id = 1
quantity = 10

[[opening_stock]]
part_id = 2
plane_id = 2
quantity = 2

[[users]]
username = "assembler"
password = "pw"
department = 5
"#;

    fn config() -> AppConfig {
        AppConfig::from_toml_str(CONFIG, "test").unwrap()
    }

    #[test]
    fn builds_a_working_service() {
        let ctx = bootstrap(&config()).unwrap();
        assert_eq!(ctx.engine.part_count(PartTypeId::new(1), PlaneTypeId::new(1)).unwrap(), 10);
        assert_eq!(ctx.engine.part_count(PartTypeId::new(2), PlaneTypeId::new(2)).unwrap(), 2);

        let wing_dept = ctx.departments.get(DepartmentId::new(2)).unwrap();
        assert!(wing_dept.owns(PartTypeId::new(2)));

        let token = ctx.users.login("assembler", "pw", &ctx.issuer, Utc::now()).unwrap();
        let grant = ctx
            .guard
            .authorize(&Credential::bearer(token), &ResourceScope::Plane(PlaneTypeId::new(1)))
            .unwrap();
        let actor = Actor::new(grant.caller.user_id, grant.caller.username);
        ctx.engine.assemble_plane(PlaneTypeId::new(1), &actor).unwrap();
        assert_eq!(ctx.engine.part_count(PartTypeId::new(1), PlaneTypeId::new(2)).unwrap(), 4);
        assert!(ctx.engine.audit().unwrap().is_consistent());
    }

    #[test]
    fn builtin_configuration_bootstraps() {
        let ctx = bootstrap(&AppConfig::builtin().unwrap()).unwrap();
        assert_eq!(ctx.engine.snapshot().unwrap().planes.len(), 4);
        assert_eq!(ctx.departments.production().count(), 4);
    }

    #[test]
    fn sample_configuration_bootstraps() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/aeroforge.toml");
        let ctx = bootstrap(&AppConfig::load_from(&path).unwrap()).unwrap();
        assert_eq!(ctx.engine.plane_count(PlaneTypeId::new(1)).unwrap(), 1);
        assert_eq!(ctx.engine.part_count(PartTypeId::new(1), PlaneTypeId::new(2)).unwrap(), 1);
        assert_eq!(ctx.users.len().unwrap(), 5);
    }

    #[test]
    fn rejects_parts_owned_by_unknown_or_assembly_departments() {
        let mut bad = config();
        bad.parts[0].department = DepartmentId::new(42);
        assert!(matches!(bootstrap(&bad), Err(ConfigError::Invalid(_))));

        let mut bad = config();
        bad.parts[0].department = DepartmentId::new(5);
        assert!(matches!(bootstrap(&bad), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_unknown_recipe_parts_and_bad_opening_stock() {
        let mut bad = config();
        bad.planes[0].recipe[0].part_id = PartTypeId::new(99);
        assert!(matches!(bootstrap(&bad), Err(ConfigError::Invalid(msg)) if msg.contains("unknown part")));

        let mut bad = config();
        bad.opening_stock[1].plane_id = None;
        assert!(matches!(bootstrap(&bad), Err(ConfigError::Invalid(msg)) if msg.contains("per plane")));

        let mut bad = config();
        bad.opening_stock[1].plane_id = Some(PlaneTypeId::new(1));
        assert!(matches!(bootstrap(&bad), Err(ConfigError::Invalid(msg)) if msg.contains("not used by")));
    }

    #[test]
    fn rejects_missing_assembly_team() {
        let mut bad = config();
        bad.departments.retain(|d| d.kind != DepartmentKind::Assembly);
        bad.users.clear();
        assert!(matches!(bootstrap(&bad), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn durable_logs_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.inventory.history_path = Some(dir.path().join("history.jsonl"));
        let (x1, x2) = (PlaneTypeId::new(1), PlaneTypeId::new(2));
        let (rivet, wing) = (PartTypeId::new(1), PartTypeId::new(2));

        {
            let ctx = bootstrap(&config).unwrap();
            ctx.engine.assemble_plane(x1, &Actor::system()).unwrap();
            ctx.engine.recycle_plane(x1, &Actor::system()).unwrap();
            ctx.engine.add_part(wing, x2, &Actor::system()).unwrap();
            assert_eq!(ctx.engine.plane_count(x1).unwrap(), 0);
            assert_eq!(ctx.engine.part_count(rivet, x1).unwrap(), 4);
        }
        assert!(dir.path().join("stock-movements.jsonl").exists());

        let ctx = bootstrap(&config).unwrap();
        assert_eq!(ctx.engine.history(&HistoryFilter::all()).unwrap().len(), 1);
        assert_eq!(ctx.engine.plane_count(x1).unwrap(), 0);
        assert_eq!(ctx.engine.part_count(rivet, x1).unwrap(), 4);
        assert_eq!(ctx.engine.part_count(wing, x2).unwrap(), 3);
        assert!(ctx.engine.audit().unwrap().is_consistent());

        // A second restart does not seed the opening stock again.
        let ctx = bootstrap(&config).unwrap();
        assert_eq!(ctx.engine.part_count(rivet, x1).unwrap(), 4);
        assert_eq!(ctx.engine.movement_totals().unwrap().last_sequence, 4);
    }

    #[test]
    fn history_without_its_movement_log_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.inventory.history_path = Some(dir.path().join("history.jsonl"));
        {
            let ctx = bootstrap(&config).unwrap();
            ctx.engine.assemble_plane(PlaneTypeId::new(1), &Actor::system()).unwrap();
            ctx.engine.assemble_plane(PlaneTypeId::new(2), &Actor::system()).unwrap();
        }
        std::fs::remove_file(dir.path().join("stock-movements.jsonl")).unwrap();

        // Re-seeded opening stock covers the rivets but only one of the two wings X2 consumed.
        config.opening_stock[1].quantity = 1;
        assert!(bootstrap(&config).is_err());
    }
}
