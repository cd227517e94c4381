//! Modules: the only way to extend simulation behavior.
//!
//! A module contributes components, an ordered list of systems, and named
//! commands. Modules are resolved by name from a process-wide catalog
//! (`ModuleCatalog`) rather than loaded as native code; the catalog is an
//! explicit object passed into container construction, not ambient global
//! state, so tests can build fully isolated fixtures.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::component::{
    check_access, AccessIntent, ComponentDescriptor, ComponentId, ComponentIdAllocator,
    ComponentRef,
};
use crate::entity::{EntityId, RangeCursor};
use crate::error::{ErrorKind, PlatformError};
use crate::store::ComponentStore;

/// Primitive field types a command schema can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// A signed integer.
    Int,
    /// A floating-point number.
    Float,
    /// A boolean.
    Bool,
    /// A UTF-8 string.
    String,
}

/// A single field value in a command payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A boolean.
    Bool(bool),
    /// A UTF-8 string.
    String(String),
}

impl PayloadValue {
    const fn matches_type(&self, ty: FieldType) -> bool {
        matches!(
            (self, ty),
            (Self::Int(_), FieldType::Int)
                | (Self::Float(_), FieldType::Float)
                | (Self::Bool(_), FieldType::Bool)
                | (Self::String(_), FieldType::String)
        )
    }
}

/// A command payload: unknown fields are ignored.
pub type CommandPayload = BTreeMap<String, PayloadValue>;

/// One schema mismatch found while validating a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// The offending field name.
    pub field: String,
    /// Why the field failed validation.
    pub reason: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// A scoped, permission-checked view over a match's component store, handed
/// to systems and command executors for the duration of one invocation.
///
/// Mutations are always attributed to `executing_module`, which is checked
/// against each component's declared [`crate::component::PermissionLevel`]
/// before the read/write is allowed to proceed.
pub struct SystemView<'a> {
    executing_module: &'a str,
    store: &'a mut ComponentStore,
    descriptors: &'a DescriptorRegistry,
    destroy_queue: &'a mut Vec<EntityId>,
    live_entities: &'a [EntityId],
    entity_cursor: Option<&'a mut RangeCursor>,
}

impl<'a> SystemView<'a> {
    /// Construct a view. Used by the container's tick loop (`sim-runtime`),
    /// never by modules themselves.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        executing_module: &'a str,
        store: &'a mut ComponentStore,
        descriptors: &'a DescriptorRegistry,
        destroy_queue: &'a mut Vec<EntityId>,
        live_entities: &'a [EntityId],
        entity_cursor: Option<&'a mut RangeCursor>,
    ) -> Self {
        Self {
            executing_module,
            store,
            descriptors,
            destroy_queue,
            live_entities,
            entity_cursor,
        }
    }

    fn descriptor(&self, component: ComponentId) -> Result<&ComponentRef, PlatformError> {
        self.descriptors.get(component).ok_or_else(|| {
            PlatformError::new(
                ErrorKind::NotFound,
                format!("component {component:?} is not registered"),
            )
        })
    }

    /// Read a component's value, subject to the permission guard.
    pub fn get(&self, entity: EntityId, component: ComponentId) -> Result<f32, PlatformError> {
        let descriptor = self.descriptor(component)?;
        check_access(descriptor, self.executing_module, AccessIntent::Read)?;
        Ok(self.store.get(entity, component))
    }

    /// True if the component is attached, subject to the permission guard.
    pub fn exists(&self, entity: EntityId, component: ComponentId) -> Result<bool, PlatformError> {
        let descriptor = self.descriptor(component)?;
        check_access(descriptor, self.executing_module, AccessIntent::Read)?;
        Ok(self.store.exists(entity, component))
    }

    /// Write a component's value, subject to the permission guard.
    pub fn set(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        value: f32,
    ) -> Result<(), PlatformError> {
        let descriptor = self.descriptor(component)?.clone();
        check_access(&descriptor, self.executing_module, AccessIntent::Write)?;
        self.store.attach(entity, component, value);
        Ok(())
    }

    /// Remove a component's value, subject to the permission guard.
    pub fn clear(&mut self, entity: EntityId, component: ComponentId) -> Result<(), PlatformError> {
        let descriptor = self.descriptor(component)?.clone();
        check_access(&descriptor, self.executing_module, AccessIntent::Write)?;
        self.store.remove(entity, component);
        Ok(())
    }

    /// Allocate a new entity id from the match's reserved range, if the
    /// view was constructed with a cursor (command executors that spawn
    /// entities; read-only systems may be given `None`).
    pub fn spawn(&mut self) -> Result<EntityId, PlatformError> {
        self.entity_cursor
            .as_deref_mut()
            .and_then(RangeCursor::alloc)
            .ok_or_else(|| {
                PlatformError::new(
                    ErrorKind::Internal,
                    "entity range exhausted or spawning not permitted in this context",
                )
            })
    }

    /// Queue `entity` for removal in the next cleanup sweep.
    pub fn queue_destroy(&mut self, entity: EntityId) {
        self.destroy_queue.push(entity);
    }

    /// Entities currently live in this match, in ascending id order.
    #[must_use]
    pub const fn live_entities(&self) -> &[EntityId] {
        self.live_entities
    }
}

/// A system contributed by a module, run once per tick in registration order.
pub trait System: Send + Sync {
    /// A short, stable name used in logs and error messages.
    fn name(&self) -> &str;
    /// Execute one tick's worth of work against `view`.
    fn run(&self, view: &mut SystemView<'_>);
}

/// A function-backed [`System`], for modules whose systems are stateless.
pub struct FnSystem {
    name: String,
    func: Box<dyn Fn(&mut SystemView<'_>) + Send + Sync>,
}

impl FnSystem {
    /// Wrap a plain function as a [`System`].
    pub fn new(name: impl Into<String>, func: impl Fn(&mut SystemView<'_>) + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl System for FnSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, view: &mut SystemView<'_>) {
        (self.func)(view);
    }
}

/// A command contributed by a module: a name, a schema, and an executor.
pub struct CommandDescriptor {
    /// Unique-per-container command name.
    pub name: String,
    /// Required field types. Payload fields outside the schema are ignored.
    pub schema: BTreeMap<String, FieldType>,
    executor: Box<dyn Fn(&CommandPayload, &mut SystemView<'_>) -> Result<(), PlatformError> + Send + Sync>,
}

impl CommandDescriptor {
    /// Declare a new command.
    pub fn new(
        name: impl Into<String>,
        schema: BTreeMap<String, FieldType>,
        executor: impl Fn(&CommandPayload, &mut SystemView<'_>) -> Result<(), PlatformError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            executor: Box::new(executor),
        }
    }

    /// Validate a payload against the schema without executing anything.
    #[must_use]
    pub fn validate(&self, payload: &CommandPayload) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (field, ty) in &self.schema {
            match payload.get(field) {
                None => issues.push(ValidationIssue {
                    field: field.clone(),
                    reason: "missing required field".into(),
                }),
                Some(value) if !value.matches_type(*ty) => issues.push(ValidationIssue {
                    field: field.clone(),
                    reason: format!("expected {ty:?}"),
                }),
                Some(_) => {}
            }
        }
        issues
    }

    /// Validate then run the executor. Fails with [`ErrorKind::Validation`]
    /// before the executor is ever invoked if the payload doesn't match the
    /// schema.
    pub fn execute(
        &self,
        payload: &CommandPayload,
        view: &mut SystemView<'_>,
    ) -> Result<(), PlatformError> {
        let issues = self.validate(payload);
        if !issues.is_empty() {
            let detail = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PlatformError::new(
                ErrorKind::Validation,
                format!("command '{}' failed validation: {detail}", self.name),
            ));
        }
        (self.executor)(payload, view)
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// The complete set of things a module contributes once enabled.
pub struct ModuleDescriptor {
    /// The module's unique name.
    pub name: String,
    /// The component whose attachment marks an entity as managed by this module.
    pub flag_component: ComponentRef,
    /// Every component this module declares (including the flag component).
    pub components: Vec<ComponentRef>,
    /// Systems, in registration order.
    pub systems: Vec<Arc<dyn System>>,
    /// Commands this module contributes, keyed implicitly by `name`.
    pub commands: Vec<Arc<CommandDescriptor>>,
}

/// Builds a [`ModuleDescriptor`] when a container first enables a module,
/// allocating that module's component ids from the shared, process-wide
/// [`ComponentIdAllocator`].
pub trait ModuleFactory: Send + Sync {
    /// The module name this factory builds.
    fn name(&self) -> &str;
    /// Construct the module, allocating component ids via `ids`.
    fn build(&self, ids: &mut ComponentIdAllocator) -> ModuleDescriptor;
}

/// Process-wide catalog of module factories, resolved by name.
///
/// Modeled as an explicit object rather than a global registry so
/// tests can construct isolated fixtures with only the modules they need.
pub trait ModuleCatalog: Send + Sync {
    /// Resolve a factory by module name.
    fn factory(&self, name: &str) -> Option<Arc<dyn ModuleFactory>>;
    /// List every module name known to this catalog.
    fn module_names(&self) -> Vec<String>;
}

/// A simple in-memory [`ModuleCatalog`], populated at startup.
#[derive(Default)]
pub struct InMemoryModuleCatalog {
    factories: FxHashMap<String, Arc<dyn ModuleFactory>>,
}

impl InMemoryModuleCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under its own name.
    pub fn register(&mut self, factory: Arc<dyn ModuleFactory>) {
        self.factories.insert(factory.name().to_string(), factory);
    }
}

impl ModuleCatalog for InMemoryModuleCatalog {
    fn factory(&self, name: &str) -> Option<Arc<dyn ModuleFactory>> {
        self.factories.get(name).cloned()
    }

    fn module_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Process-wide registry mapping a [`ComponentId`] back to its descriptor,
/// populated as modules are enabled. Used by [`SystemView`] to resolve the
/// permission level for a component id during a read/write.
#[derive(Default)]
pub struct DescriptorRegistry {
    by_id: FxHashMap<ComponentId, ComponentRef>,
    by_name: FxHashMap<String, ComponentId>,
}

impl DescriptorRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component descriptor, making it resolvable by id and name.
    pub fn register(&mut self, descriptor: ComponentDescriptor) -> ComponentRef {
        let name = descriptor.name.clone();
        let id = descriptor.id;
        let shared: ComponentRef = Arc::new(descriptor);
        self.by_id.insert(id, shared.clone());
        self.by_name.insert(name, id);
        shared
    }

    /// Look up a descriptor by id.
    #[must_use]
    pub fn get(&self, id: ComponentId) -> Option<&ComponentRef> {
        self.by_id.get(&id)
    }

    /// Look up a component id by its declared name.
    #[must_use]
    pub fn get_id_by_name(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_reports_missing_and_mismatched_fields() {
        let mut schema = BTreeMap::new();
        schema.insert("x".to_string(), FieldType::Float);
        schema.insert("label".to_string(), FieldType::String);
        let cmd = CommandDescriptor::new("move", schema, |_p, _v| Ok(()));

        let mut payload = CommandPayload::new();
        payload.insert("x".to_string(), PayloadValue::Int(1));
        let issues = cmd.validate(&payload);
        assert_eq!(issues.len(), 2); // x wrong type, label missing
    }

    #[test]
    fn execute_short_circuits_on_validation_failure() {
        let mut schema = BTreeMap::new();
        schema.insert("x".to_string(), FieldType::Float);
        let cmd = CommandDescriptor::new("noop", schema, |_p, _v| Ok(()));
        let payload = CommandPayload::new();
        let descriptors = DescriptorRegistry::new();
        let mut store = ComponentStore::new();
        let mut destroy_queue = Vec::new();
        let live = Vec::new();
        let mut view = SystemView::new(
            "mod",
            &mut store,
            &descriptors,
            &mut destroy_queue,
            &live,
            None,
        );
        let result = cmd.execute(&payload, &mut view);
        assert!(result.is_err());
    }
}
