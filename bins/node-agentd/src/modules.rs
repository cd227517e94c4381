//! The `entity` module: this node's one compiled-in gameplay module.
//!
//! Modules are resolved by name from a process-wide catalog rather than
//! loaded as native code; in the absence of a dynamic
//! loading mechanism, a node ships whatever [`ModuleFactory`]s it was built
//! with. `entity` is the reference module: a flat `POSITION_X/Y/Z` position
//! plus `spawn`/`move_to` commands.

use std::collections::BTreeMap;
use std::sync::Arc;

use sim_ecs::component::{ComponentIdAllocator, PermissionLevel};
use sim_ecs::entity::EntityId;
use sim_ecs::module::{CommandDescriptor, FieldType, FnSystem, ModuleDescriptor, ModuleFactory, PayloadValue};

/// Component name for the X axis.
pub const POSITION_X: &str = "POSITION_X";
/// Component name for the Y axis.
pub const POSITION_Y: &str = "POSITION_Y";
/// Component name for the Z axis.
pub const POSITION_Z: &str = "POSITION_Z";

/// Builds the `entity` module.
pub struct EntityModuleFactory;

impl ModuleFactory for EntityModuleFactory {
    fn name(&self) -> &str {
        "entity"
    }

    fn build(&self, ids: &mut ComponentIdAllocator) -> ModuleDescriptor {
        let x = ids.declare(POSITION_X, "entity", PermissionLevel::Read);
        let y = ids.declare(POSITION_Y, "entity", PermissionLevel::Read);
        let z = ids.declare(POSITION_Z, "entity", PermissionLevel::Read);
        let flag = ids.declare("ENTITY_FLAG", "entity", PermissionLevel::Private);
        let (x_id, y_id, z_id) = (x.id, y.id, z.id);

        let spawn = CommandDescriptor::new("spawn", BTreeMap::new(), move |_payload, view| {
            let entity = view.spawn()?;
            view.set(entity, x_id, 0.0)?;
            view.set(entity, y_id, 0.0)?;
            view.set(entity, z_id, 0.0)
        });

        let mut move_schema = BTreeMap::new();
        move_schema.insert("entityId".to_string(), FieldType::Int);
        move_schema.insert("x".to_string(), FieldType::Float);
        move_schema.insert("y".to_string(), FieldType::Float);
        move_schema.insert("z".to_string(), FieldType::Float);
        let move_to = CommandDescriptor::new("move_to", move_schema, move |payload, view| {
            let Some(PayloadValue::Int(raw_id)) = payload.get("entityId") else {
                return Ok(());
            };
            #[allow(clippy::cast_sign_loss)]
            let entity = EntityId(*raw_id as u64);
            for (field, component) in [("x", x_id), ("y", y_id), ("z", z_id)] {
                if let Some(PayloadValue::Float(value)) = payload.get(field) {
                    #[allow(clippy::cast_possible_truncation)]
                    view.set(entity, component, *value as f32)?;
                }
            }
            Ok(())
        });

        ModuleDescriptor {
            name: "entity".to_string(),
            flag_component: Arc::new(flag.clone()),
            components: vec![Arc::new(x), Arc::new(y), Arc::new(z), Arc::new(flag)],
            systems: vec![Arc::new(FnSystem::new("noop", |_view| {}))],
            commands: vec![Arc::new(spawn), Arc::new(move_to)],
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sim_ecs::module::{CommandPayload, InMemoryModuleCatalog, ModuleCatalog};

    #[test]
    fn catalog_resolves_entity_by_name() {
        let mut catalog = InMemoryModuleCatalog::new();
        catalog.register(Arc::new(EntityModuleFactory));
        assert!(catalog.factory("entity").is_some());
    }

    #[test]
    fn move_to_schema_requires_all_four_fields() {
        let mut ids = ComponentIdAllocator::new();
        let descriptor = EntityModuleFactory.build(&mut ids);
        let move_to = descriptor.commands.iter().find(|c| c.name == "move_to").unwrap();
        let issues = move_to.validate(&CommandPayload::new());
        assert_eq!(issues.len(), 4);
    }
}
