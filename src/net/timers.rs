//! Cancellable one-shot timers
//!
//! Timers only say "this is due"; whoever handles them re-checks whether the
//! action still makes sense (phase, role, liveness) before acting.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use tokio::time::Instant;

use crate::game::state::PeerId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Start the match if still in the lobby
    AutoStart,
    BotRespawn(PeerId),
    /// Respawn the local player
    SelfRespawn,
    /// Re-register with the directory
    Heartbeat,
    /// Tear the session down after the end message has gone out
    Shutdown,
    SignalingReconnect,
}

pub type TimerId = u64;

#[derive(Debug, Default)]
pub struct Scheduler {
    queue: BinaryHeap<Reverse<(Instant, TimerId)>>,
    pending: HashMap<TimerId, TimerKind>,
    next_id: TimerId,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: Instant, kind: TimerKind) -> TimerId {
        self.next_id += 1;
        let id = self.next_id;
        self.queue.push(Reverse((at, id)));
        self.pending.insert(id, kind);
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Cancel every pending timer of this kind
    pub fn cancel_kind(&mut self, kind: &TimerKind) -> usize {
        let before = self.pending.len();
        self.pending.retain(|_, k| k != kind);
        before - self.pending.len()
    }

    /// Earliest deadline that has not been cancelled
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((at, id))) = self.queue.peek().copied() {
            if self.pending.contains_key(&id) {
                return Some(at);
            }
            self.queue.pop();
        }
        None
    }

    /// Remove and return everything due at `now`, earliest first
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due = Vec::new();
        while let Some(Reverse((at, id))) = self.queue.peek().copied() {
            if at > now {
                break;
            }
            self.queue.pop();
            if let Some(kind) = self.pending.remove(&id) {
                due.push(kind);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_pop_due_in_order() {
        let mut scheduler = Scheduler::new();
        let t0 = Instant::now();
        scheduler.schedule(t0 + Duration::from_secs(3), TimerKind::Shutdown);
        scheduler.schedule(t0 + Duration::from_secs(1), TimerKind::AutoStart);
        scheduler.schedule(t0 + Duration::from_secs(20), TimerKind::Heartbeat);

        assert_eq!(scheduler.next_deadline(), Some(t0 + Duration::from_secs(1)));
        assert!(scheduler.pop_due(t0).is_empty());
        assert_eq!(
            scheduler.pop_due(t0 + Duration::from_secs(5)),
            vec![TimerKind::AutoStart, TimerKind::Shutdown]
        );
        assert_eq!(scheduler.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let mut scheduler = Scheduler::new();
        let t0 = Instant::now();
        let id = scheduler.schedule(t0, TimerKind::AutoStart);
        scheduler.schedule(t0 + Duration::from_secs(2), TimerKind::SelfRespawn);

        assert!(scheduler.cancel(id));
        assert!(!scheduler.cancel(id));
        assert_eq!(scheduler.next_deadline(), Some(t0 + Duration::from_secs(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_kind() {
        let mut scheduler = Scheduler::new();
        let t0 = Instant::now();
        scheduler.schedule(t0, TimerKind::BotRespawn("b1".into()));
        scheduler.schedule(t0, TimerKind::BotRespawn("b2".into()));

        assert_eq!(scheduler.cancel_kind(&TimerKind::BotRespawn("b1".into())), 1);
        assert_eq!(scheduler.pop_due(t0), vec![TimerKind::BotRespawn("b2".into())]);
        assert!(scheduler.next_deadline().is_none());
    }
}
