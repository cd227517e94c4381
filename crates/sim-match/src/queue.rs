//! The per-container command queue.
//!
//! The queue is a single container-wide FIFO rather than one queue per
//! match: that trivially satisfies both ordering guarantees required of it —
//! same caller/same match commands execute in submission order, and
//! cross-caller commands execute in receipt order — without needing a
//! merge step across per-match queues at drain time.

use std::collections::VecDeque;

use sim_ecs::error::{ErrorKind, PlatformError};
use sim_ecs::module::CommandPayload;

use crate::types::{MatchId, PlayerId};

/// One command received from a caller, not yet executed.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    /// The match this command targets.
    pub match_id: MatchId,
    /// The player who submitted it.
    pub player_id: PlayerId,
    /// The command's name, resolved against the match's enabled modules.
    pub command_name: String,
    /// The raw payload, validated against the command's schema at execution time.
    pub payload: CommandPayload,
}

/// A capacity-bounded FIFO of [`QueuedCommand`]s for one container.
///
/// `enqueue` rejects once `capacity` commands are queued, returning
/// [`ErrorKind::QueueFull`]. Rejecting commands for a match that
/// has already been deleted is the caller's responsibility (`sim-runtime`'s
/// container, which is the only thing that knows match lifecycle state).
#[derive(Debug)]
pub struct CommandQueue {
    capacity: usize,
    queue: VecDeque<QueuedCommand>,
}

impl CommandQueue {
    /// Create an empty queue with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            queue: VecDeque::new(),
        }
    }

    /// Append a command, or reject with [`ErrorKind::QueueFull`] if the
    /// queue is already at capacity.
    pub fn enqueue(&mut self, command: QueuedCommand) -> Result<(), PlatformError> {
        if self.queue.len() >= self.capacity {
            return Err(PlatformError::new(
                ErrorKind::QueueFull,
                format!("command queue is at capacity ({})", self.capacity),
            ));
        }
        self.queue.push_back(command);
        Ok(())
    }

    /// Remove and return up to `budget` commands, in FIFO order.
    pub fn drain_up_to(&mut self, budget: usize) -> Vec<QueuedCommand> {
        let n = budget.min(self.queue.len());
        self.queue.drain(..n).collect()
    }

    /// Number of commands currently queued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True if no commands are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// The configured capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn cmd(match_id: u64, player_id: u64, name: &str) -> QueuedCommand {
        QueuedCommand {
            match_id: MatchId(match_id),
            player_id: PlayerId(player_id),
            command_name: name.to_string(),
            payload: CommandPayload::new(),
        }
    }

    #[test]
    fn enqueue_then_drain_preserves_fifo_order() {
        let mut q = CommandQueue::new(8);
        q.enqueue(cmd(1, 1, "a")).unwrap();
        q.enqueue(cmd(1, 2, "b")).unwrap();
        q.enqueue(cmd(2, 1, "c")).unwrap();
        let drained = q.drain_up_to(10);
        let names: Vec<&str> = drained.iter().map(|c| c.command_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn enqueue_past_capacity_returns_queue_full() {
        let mut q = CommandQueue::new(2);
        q.enqueue(cmd(1, 1, "a")).unwrap();
        q.enqueue(cmd(1, 1, "b")).unwrap();
        let err = q.enqueue(cmd(1, 1, "c")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueueFull);
    }

    #[test]
    fn drain_up_to_respects_budget_and_leaves_remainder() {
        let mut q = CommandQueue::new(8);
        for i in 0..5u64 {
            q.enqueue(cmd(1, i, "x")).unwrap();
        }
        let first = q.drain_up_to(3);
        assert_eq!(first.len(), 3);
        assert_eq!(q.len(), 2);
        let second = q.drain_up_to(10);
        assert_eq!(second.len(), 2);
        assert!(q.is_empty());
    }

    #[test]
    fn same_caller_same_match_ordering_is_preserved_across_interleaved_callers() {
        let mut q = CommandQueue::new(16);
        q.enqueue(cmd(1, 1, "a1")).unwrap();
        q.enqueue(cmd(1, 2, "b1")).unwrap();
        q.enqueue(cmd(1, 1, "a2")).unwrap();
        q.enqueue(cmd(1, 2, "b2")).unwrap();
        let drained = q.drain_up_to(10);
        let caller1: Vec<&str> = drained
            .iter()
            .filter(|c| c.player_id == PlayerId(1))
            .map(|c| c.command_name.as_str())
            .collect();
        let caller2: Vec<&str> = drained
            .iter()
            .filter(|c| c.player_id == PlayerId(2))
            .map(|c| c.command_name.as_str())
            .collect();
        assert_eq!(caller1, vec!["a1", "a2"]);
        assert_eq!(caller2, vec!["b1", "b2"]);
    }
}
