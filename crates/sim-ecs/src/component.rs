//! Component descriptors and the cross-module permission model.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ErrorKind, PlatformError};

/// A process-wide-unique component identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

/// Cross-module access level declared for a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionLevel {
    /// Not exposed cross-module at all.
    Private,
    /// Foreign modules may read but not write.
    Read,
    /// Foreign modules may read and write.
    Write,
    /// Read+write, but restricted to the declaring module.
    Owner,
}

/// The intent of an access attempt, used by the permission guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    /// A read of the component's value.
    Read,
    /// A write (attach/remove) of the component's value.
    Write,
}

/// An immutable component descriptor.
///
/// `owner_module` records which module declared the component, which is
/// the boundary the permission guard (`check_access`) enforces against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Process-wide-unique id, assigned by [`ComponentIdAllocator`].
    pub id: ComponentId,
    /// Human-readable name (e.g. `"POSITION_X"`).
    pub name: String,
    /// The module that declared this component.
    pub owner_module: String,
    /// Cross-module access level.
    pub permission_level: PermissionLevel,
}

/// Process-wide monotonic generator for [`ComponentId`]s.
///
/// This is inherently process-wide state; rather than hide it behind
/// `static`/`OnceCell` ambient state, it is modeled as an explicit object
/// threaded into whatever constructs containers, so tests can create fully
/// isolated fixtures.
#[derive(Debug, Default)]
pub struct ComponentIdAllocator {
    next: u64,
}

impl ComponentIdAllocator {
    /// Create a fresh, empty allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Allocate the next process-wide-unique component id.
    pub fn alloc(&mut self) -> ComponentId {
        let id = ComponentId(self.next);
        self.next += 1;
        id
    }

    /// Declare a new component, allocating its id.
    pub fn declare(
        &mut self,
        name: impl Into<String>,
        owner_module: impl Into<String>,
        permission_level: PermissionLevel,
    ) -> ComponentDescriptor {
        ComponentDescriptor {
            id: self.alloc(),
            name: name.into(),
            owner_module: owner_module.into(),
            permission_level,
        }
    }
}

/// Checks whether `accessing_module` may perform `intent` on `component`,
/// per the strict cross-module permission policy:
///
/// - `Owner`: the declaring module may read/write; any other module is denied.
/// - `Write`: any module may read/write.
/// - `Read`: the declaring module may read/write; any other module may only read.
/// - `Private`: only the declaring module may access it at all.
pub fn check_access(
    component: &ComponentDescriptor,
    accessing_module: &str,
    intent: AccessIntent,
) -> Result<(), PlatformError> {
    let is_owner = component.owner_module == accessing_module;
    let allowed = match (component.permission_level, is_owner, intent) {
        (PermissionLevel::Owner, true, _) => true,
        (PermissionLevel::Owner, false, _) => false,
        (PermissionLevel::Write, _, _) => true,
        (PermissionLevel::Read, true, _) => true,
        (PermissionLevel::Read, false, AccessIntent::Read) => true,
        (PermissionLevel::Read, false, AccessIntent::Write) => false,
        (PermissionLevel::Private, true, _) => true,
        (PermissionLevel::Private, false, _) => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(PlatformError::new(
            ErrorKind::PermissionDenied,
            format!(
                "module '{accessing_module}' has no {intent:?} access to component '{}' (owner: '{}', level: {:?})",
                component.name, component.owner_module, component.permission_level
            ),
        ))
    }
}

/// Reference-counted handle to a component descriptor, cheap to clone into
/// every system/command closure that needs to address the component.
pub type ComponentRef = Arc<ComponentDescriptor>;

#[cfg(test)]
mod tests {
    use super::*;

    fn make(level: PermissionLevel) -> ComponentDescriptor {
        ComponentDescriptor {
            id: ComponentId(0),
            name: "X".into(),
            owner_module: "owner_mod".into(),
            permission_level: level,
        }
    }

    #[test]
    fn owner_module_always_allowed() {
        for level in [
            PermissionLevel::Private,
            PermissionLevel::Read,
            PermissionLevel::Write,
            PermissionLevel::Owner,
        ] {
            let c = make(level);
            assert!(check_access(&c, "owner_mod", AccessIntent::Read).is_ok());
            assert!(check_access(&c, "owner_mod", AccessIntent::Write).is_ok());
        }
    }

    #[test]
    fn private_denies_foreign_access() {
        let c = make(PermissionLevel::Private);
        assert!(check_access(&c, "other_mod", AccessIntent::Read).is_err());
        assert!(check_access(&c, "other_mod", AccessIntent::Write).is_err());
    }

    #[test]
    fn read_allows_foreign_reads_but_not_writes() {
        let c = make(PermissionLevel::Read);
        assert!(check_access(&c, "other_mod", AccessIntent::Read).is_ok());
        assert!(check_access(&c, "other_mod", AccessIntent::Write).is_err());
    }

    #[test]
    fn write_allows_foreign_reads_and_writes() {
        let c = make(PermissionLevel::Write);
        assert!(check_access(&c, "other_mod", AccessIntent::Read).is_ok());
        assert!(check_access(&c, "other_mod", AccessIntent::Write).is_ok());
    }

    #[test]
    fn owner_denies_all_foreign_access() {
        let c = make(PermissionLevel::Owner);
        assert!(check_access(&c, "other_mod", AccessIntent::Read).is_err());
        assert!(check_access(&c, "other_mod", AccessIntent::Write).is_err());
    }

    #[test]
    fn allocator_hands_out_increasing_ids() {
        let mut ids = ComponentIdAllocator::new();
        let a = ids.alloc();
        let b = ids.alloc();
        assert_eq!(a.0, 0);
        assert_eq!(b.0, 1);
    }
}
