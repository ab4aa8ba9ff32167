/// Deferred continuations for dialogue pacing.
///
/// Holds at most one pending task. Every task carries the generation it was
/// scheduled under; `cancel_all` bumps the generation so a continuation left
/// over from a previous run can never fire into a reset state.

/// Work to resume after a presentation delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Resolve the single option of `node` in `npc_id`'s dialogue.
    AutoResolve { npc_id: String, node: String },
}

#[derive(Debug, Clone)]
struct Deferred {
    generation: u64,
    due_ms: u64,
    task: Continuation,
}

#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    generation: u64,
    pending: Option<Deferred>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `task` to run `delay_ms` after `now_ms`, superseding any
    /// task already pending. Returns the generation it was scheduled under.
    pub fn schedule(&mut self, task: Continuation, now_ms: u64, delay_ms: u64) -> u64 {
        if let Some(previous) = &self.pending {
            tracing::debug!("superseding pending continuation {:?}", previous.task);
        }
        self.pending = Some(Deferred {
            generation: self.generation,
            due_ms: now_ms.saturating_add(delay_ms),
            task,
        });
        self.generation
    }

    /// Drop the pending task and invalidate everything scheduled so far.
    pub fn cancel_all(&mut self) {
        self.generation += 1;
        self.pending = None;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn due_at(&self) -> Option<u64> {
        self.pending.as_ref().map(|deferred| deferred.due_ms)
    }

    /// Take the pending task if it is due at `now_ms`.
    pub fn take_due(&mut self, now_ms: u64) -> Option<Continuation> {
        match &self.pending {
            Some(deferred) if deferred.due_ms <= now_ms => self.take_now(),
            _ => None,
        }
    }

    /// Take the pending task regardless of its due time.
    pub fn take_now(&mut self) -> Option<Continuation> {
        let deferred = self.pending.take()?;
        (deferred.generation == self.generation).then_some(deferred.task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(node: &str) -> Continuation {
        Continuation::AutoResolve {
            npc_id: "gabriel".to_string(),
            node: node.to_string(),
        }
    }

    #[test]
    fn task_fires_only_when_due() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(task("a"), 1_000, 750);
        assert_eq!(scheduler.due_at(), Some(1_750));
        assert!(scheduler.take_due(1_749).is_none());
        assert!(scheduler.is_pending());
        assert_eq!(scheduler.take_due(1_750), Some(task("a")));
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn new_task_supersedes_pending_one() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(task("a"), 0, 10);
        scheduler.schedule(task("b"), 0, 10);
        assert_eq!(scheduler.take_now(), Some(task("b")));
        assert!(scheduler.take_now().is_none());
    }

    #[test]
    fn cancel_all_invalidates_pending_task() {
        let mut scheduler = Scheduler::new();
        let generation = scheduler.schedule(task("a"), 0, 10);
        scheduler.cancel_all();
        assert_eq!(scheduler.generation(), generation + 1);
        assert!(scheduler.take_due(u64::MAX).is_none());
    }
}
