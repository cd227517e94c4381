//! The `Match` value itself.

use rustc_hash::FxHashSet;
use sim_ecs::entity::EntityRange;
use sim_ecs::error::{ErrorKind, PlatformError};

use crate::types::{ContainerId, MatchId, PlayerId};

/// A running (or finished, or deleted) match within a container.
///
/// `finished` and `deleted` are deliberately separate flags:
/// finishing stops systems from running against the match but snapshots and
/// command history stay readable until the match is explicitly deleted.
#[derive(Debug, Clone)]
pub struct Match {
    id: MatchId,
    container_id: ContainerId,
    enabled_modules: Vec<String>,
    entity_range: EntityRange,
    players: FxHashSet<PlayerId>,
    max_players: u32,
    current_tick: u64,
    finished: bool,
    deleted: bool,
}

impl Match {
    /// Create a new, running match with no players yet.
    #[must_use]
    pub fn new(
        id: MatchId,
        container_id: ContainerId,
        enabled_modules: Vec<String>,
        entity_range: EntityRange,
        max_players: u32,
    ) -> Self {
        Self {
            id,
            container_id,
            enabled_modules,
            entity_range,
            players: FxHashSet::default(),
            max_players,
            current_tick: 0,
            finished: false,
            deleted: false,
        }
    }

    /// The match's id.
    #[must_use]
    pub const fn id(&self) -> MatchId {
        self.id
    }

    /// The container this match runs inside.
    #[must_use]
    pub const fn container_id(&self) -> ContainerId {
        self.container_id
    }

    /// Module names enabled for this match, in the order they were enabled.
    #[must_use]
    pub fn enabled_modules(&self) -> &[String] {
        &self.enabled_modules
    }

    /// True if `module_name` is enabled for this match.
    #[must_use]
    pub fn has_module(&self, module_name: &str) -> bool {
        self.enabled_modules.iter().any(|m| m == module_name)
    }

    /// The entity-id subrange reserved for this match.
    #[must_use]
    pub const fn entity_range(&self) -> EntityRange {
        self.entity_range
    }

    /// Currently joined players.
    #[must_use]
    pub fn players(&self) -> &FxHashSet<PlayerId> {
        &self.players
    }

    /// The configured player quota.
    #[must_use]
    pub const fn max_players(&self) -> u32 {
        self.max_players
    }

    /// The last tick this match was advanced to by its container.
    #[must_use]
    pub const fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Record that the container has advanced this match to `tick`.
    pub fn advance_to(&mut self, tick: u64) {
        self.current_tick = tick;
    }

    /// True once [`Self::finish`] has been called.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// True once [`Self::delete`] has been called.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Mark the match finished: systems stop running against it, but
    /// snapshots and history remain queryable.
    pub fn finish(&mut self) {
        self.finished = true;
    }

    /// Mark the match deleted, terminal and refusing further commands.
    pub fn delete(&mut self) {
        self.deleted = true;
    }

    /// Add a player, enforcing the match's player quota.
    pub fn add_player(&mut self, player_id: PlayerId) -> Result<(), PlatformError> {
        if self.deleted {
            return Err(PlatformError::not_found(format!("match {:?} is deleted", self.id)));
        }
        if self.players.contains(&player_id) {
            return Ok(());
        }
        #[allow(clippy::cast_possible_truncation)]
        if self.players.len() as u32 >= self.max_players {
            return Err(PlatformError::new(
                ErrorKind::Conflict,
                format!("match {:?} is at its player limit ({})", self.id, self.max_players),
            ));
        }
        self.players.insert(player_id);
        Ok(())
    }

    /// Remove a player. Idempotent.
    pub fn remove_player(&mut self, player_id: PlayerId) {
        self.players.remove(&player_id);
    }

    /// True if `entity` falls within this match's reserved range.
    #[must_use]
    pub fn owns_entity(&self, entity: sim_ecs::entity::EntityId) -> bool {
        self.entity_range.contains(entity)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sim_ecs::entity::EntityAllocator;

    fn make_match(max_players: u32) -> Match {
        let mut alloc = EntityAllocator::new();
        let range = alloc.reserve_range(16);
        Match::new(MatchId(1), ContainerId(1), vec!["combat".to_string()], range, max_players)
    }

    #[test]
    fn finish_is_distinct_from_delete() {
        let mut m = make_match(4);
        m.finish();
        assert!(m.is_finished());
        assert!(!m.is_deleted());
        // a finished-but-not-deleted match still accepts player bookkeeping
        assert!(m.add_player(PlayerId(1)).is_ok());
    }

    #[test]
    fn delete_refuses_further_joins() {
        let mut m = make_match(4);
        m.delete();
        let err = m.add_player(PlayerId(1)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[test]
    fn add_player_enforces_quota_and_is_idempotent_for_existing_members() {
        let mut m = make_match(1);
        m.add_player(PlayerId(1)).unwrap();
        m.add_player(PlayerId(1)).unwrap(); // already a member, no-op
        let err = m.add_player(PlayerId(2)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[test]
    fn owns_entity_matches_reserved_range() {
        let m = make_match(4);
        let range = m.entity_range();
        assert!(m.owns_entity(sim_ecs::entity::EntityId(range.as_u64_range().start)));
        assert!(!m.owns_entity(sim_ecs::entity::EntityId(range.as_u64_range().end)));
    }
}
