use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

use crate::models::{Arity, SelectedFile, UploadTarget};

/// Identifies one outbound upload call. Completions are matched against the
/// ticket the target is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UploadTicket(u64);

impl fmt::Display for UploadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A drained buffer ready to be sent as exactly one call.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub ticket: UploadTicket,
    pub target: UploadTarget,
    pub files: Vec<SelectedFile>,
    /// Files discarded by the single-file arity rule.
    pub dropped: usize,
}

#[derive(Debug, Default)]
struct Slot {
    pending: Vec<SelectedFile>,
    /// Bumped on every selection; a timer only counts if it carries the
    /// latest generation.
    generation: u64,
    window_elapsed: bool,
    in_flight: Option<UploadTicket>,
}

/// Per-target pending buffers and in-flight gates.
///
/// Holds no timers. The owner starts a quiescence timer for the generation
/// returned by [`UploadCoordinator::select`] and reports it back through
/// [`UploadCoordinator::quiescence_elapsed`].
#[derive(Debug, Default)]
pub struct UploadCoordinator {
    slots: HashMap<UploadTarget, Slot>,
    next_generation: u64,
    next_ticket: u64,
}

impl UploadCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a selection and restarts the target's window. Returns the
    /// generation the new timer must carry.
    pub fn select(&mut self, target: UploadTarget, files: Vec<SelectedFile>) -> u64 {
        self.next_generation += 1;
        let slot = self.slots.entry(target).or_default();
        slot.pending.extend(files);
        slot.generation = self.next_generation;
        slot.window_elapsed = false;
        slot.generation
    }

    /// The window for `generation` ran out. Drains the buffer unless a newer
    /// selection restarted the window or a call is still outstanding.
    pub fn quiescence_elapsed(&mut self, target: UploadTarget, generation: u64) -> Option<UploadBatch> {
        let slot = self.slots.get_mut(&target)?;
        if slot.generation != generation {
            debug!(%target, generation, current = slot.generation, "ignoring superseded timer");
            return None;
        }
        slot.window_elapsed = true;

        if let Some(ticket) = slot.in_flight {
            debug!(%target, %ticket, pending = slot.pending.len(), "upload outstanding; holding batch");
            return None;
        }
        self.drain(target)
    }

    /// Releases the in-flight gate for `ticket`. If a buffer's window already
    /// ran out while the call was outstanding it is drained right away.
    pub fn resolve(&mut self, target: UploadTarget, ticket: UploadTicket) -> Option<UploadBatch> {
        let slot = self.slots.get_mut(&target)?;
        if slot.in_flight != Some(ticket) {
            debug!(%target, %ticket, "ignoring completion for unknown ticket");
            return None;
        }
        slot.in_flight = None;

        if slot.window_elapsed && !slot.pending.is_empty() {
            return self.drain(target);
        }
        None
    }

    pub fn is_busy(&self, target: UploadTarget) -> bool {
        self.slots
            .get(&target)
            .map(|s| s.in_flight.is_some())
            .unwrap_or(false)
    }

    pub fn pending_len(&self, target: UploadTarget) -> usize {
        self.slots.get(&target).map(|s| s.pending.len()).unwrap_or(0)
    }

    /// Targets with an outstanding call.
    pub fn busy_targets(&self) -> Vec<UploadTarget> {
        self.slots
            .iter()
            .filter(|(_, slot)| slot.in_flight.is_some())
            .map(|(target, _)| *target)
            .collect()
    }

    /// True when no target has buffered selections or an outstanding call.
    pub fn is_idle(&self) -> bool {
        self.slots
            .values()
            .all(|slot| slot.pending.is_empty() && slot.in_flight.is_none())
    }

    /// Forgets every buffer and gate. Ticket and generation numbering keep
    /// increasing so a late completion or timer never matches fresh state.
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    fn drain(&mut self, target: UploadTarget) -> Option<UploadBatch> {
        let slot = self.slots.get_mut(&target)?;
        if slot.pending.is_empty() {
            return None;
        }

        let mut files = std::mem::take(&mut slot.pending);
        slot.window_elapsed = false;

        let mut dropped = 0;
        if target.arity() == Arity::Single && files.len() > 1 {
            dropped = files.len() - 1;
            files = files.split_off(dropped);
            warn!(%target, dropped, "single-file target received several files; keeping the latest");
        }

        self.next_ticket += 1;
        let ticket = UploadTicket(self.next_ticket);
        slot.in_flight = Some(ticket);

        Some(UploadBatch {
            ticket,
            target,
            files,
            dropped,
        })
    }
}
