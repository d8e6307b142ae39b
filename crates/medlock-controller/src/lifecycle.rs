//! Per-slot lifecycle state machine.
//!
//! Each slot moves through an explicit [`SlotState`]. Transitions are driven only
//! by dispatcher-delivered replies, status observations and administrative calls:
//!
//! ```text
//! Idle ──unlock──> Opening ──ack──> WaitingForClose ──closed──> Occupied
//!   ^                │ refused/timeout                              │
//!   └────────────────┘                                          dispense
//!   ^                                                               v
//!   └──closed── WaitingForDispenseClose <──ack── Dispensing ────────┘
//!                                                   │ refused/timeout -> Occupied
//!
//! any ──deactivate──> Deactivated ──reactivate──> Idle
//! ```
//!
//! At most one slot runs an unlock or dispense lifecycle at a time. The
//! [`ActiveLifecycle`] guard names it; a generation number tells replies that belong
//! to an aborted lifecycle apart from the current one.
//!
//! ```
//! use medlock_controller::lifecycle::{Lifecycle, SlotState};
//! use medlock_core::SlotId;
//!
//! let slot = SlotId::new(2).unwrap();
//! let mut lifecycle = Lifecycle::new((1..=4).map(|n| SlotId::new(n).unwrap()), Vec::new());
//!
//! let (active, _) = lifecycle.begin_unlock(slot, "HN-100").unwrap();
//! lifecycle.confirm_unlocked(active.generation);
//! assert_eq!(lifecycle.state(slot), Some(SlotState::WaitingForClose));
//!
//! lifecycle.observe(slot, true);
//! assert_eq!(lifecycle.state(slot), Some(SlotState::Occupied));
//! assert!(lifecycle.active().is_none());
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use medlock_core::SlotId;

use crate::collaborators::SlotRecord;
use crate::error::{ControllerError, Result};
use crate::events::SlotSnapshot;

/// Transitions kept per slot for diagnostics.
const MAX_HISTORY_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    /// Empty and locked.
    Idle,

    /// Unlock sent, waiting for the acknowledgement.
    Opening,

    /// Door open for loading; waiting for it to be shut.
    WaitingForClose,

    /// Holds content and is locked.
    Occupied,

    /// Dispense unlock sent, waiting for the acknowledgement.
    Dispensing,

    /// Door open for removal; waiting for it to be shut.
    WaitingForDispenseClose,

    /// Taken out of service by an administrator.
    Deactivated,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::WaitingForClose => "waiting for close",
            Self::Occupied => "occupied",
            Self::Dispensing => "dispensing",
            Self::WaitingForDispenseClose => "waiting for dispense close",
            Self::Deactivated => "deactivated",
        };
        f.write_str(name)
    }
}

impl SlotState {
    pub fn can_transition_to(&self, target: &SlotState) -> bool {
        use SlotState::*;
        matches!(
            (self, target),
            (Idle, Opening)
                | (Opening, WaitingForClose | Idle)
                | (WaitingForClose, Occupied)
                | (Occupied, Dispensing)
                | (Dispensing, WaitingForDispenseClose | Occupied)
                | (WaitingForDispenseClose, Idle)
                // Reset from anywhere in service
                | (WaitingForClose | Occupied | Dispensing, Idle)
                | (Idle | Opening | WaitingForClose | Occupied, Deactivated)
                | (Dispensing | WaitingForDispenseClose, Deactivated)
                | (Deactivated, Idle)
        )
    }

    /// Slot holds content in this state.
    pub fn is_occupied(&self) -> bool {
        matches!(
            self,
            Self::Occupied | Self::Dispensing | Self::WaitingForDispenseClose
        )
    }

    /// A lifecycle is under way in this state.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::Opening | Self::WaitingForClose | Self::Dispensing | Self::WaitingForDispenseClose
        )
    }

    /// Waiting for the door to be shut.
    pub fn is_waiting_for_close(&self) -> bool {
        matches!(self, Self::WaitingForClose | Self::WaitingForDispenseClose)
    }
}

/// One recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotTransition {
    pub slot: SlotId,
    pub from: SlotState,
    pub to: SlotState,

    /// Not serialized; set to the time of deserialization.
    #[serde(skip, default = "Instant::now")]
    pub timestamp: Instant,
}

impl SlotTransition {
    fn new(slot: SlotId, from: SlotState, to: SlotState) -> Self {
        Self {
            slot,
            from,
            to,
            timestamp: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }
}

/// State and record data of one slot.
#[derive(Debug, Clone)]
pub struct SlotMachine {
    slot: SlotId,
    state: SlotState,
    content_id: Option<String>,
    last_closed: Option<bool>,
    history: VecDeque<SlotTransition>,
}

impl SlotMachine {
    fn new(slot: SlotId, state: SlotState, content_id: Option<String>) -> Self {
        Self {
            slot,
            state,
            content_id,
            last_closed: None,
            history: VecDeque::new(),
        }
    }

    /// Rebuild a slot from its persisted record.
    fn from_record(record: &SlotRecord) -> Self {
        let state = if !record.is_active {
            SlotState::Deactivated
        } else if record.occupied {
            SlotState::Occupied
        } else {
            SlotState::Idle
        };
        if record.opening {
            warn!(slot = %record.slot_id, recovered = %state, "Slot was mid-lifecycle at shutdown");
        }
        let content_id = state
            .is_occupied()
            .then(|| record.content_id.clone())
            .flatten();
        Self::new(record.slot_id, state, content_id)
    }

    pub fn slot(&self) -> SlotId {
        self.slot
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    /// Lock state from the most recent status reply, if any.
    pub fn last_closed(&self) -> Option<bool> {
        self.last_closed
    }

    pub fn history(&self) -> &VecDeque<SlotTransition> {
        &self.history
    }

    fn transition_to(
        &mut self,
        target: SlotState,
        operation: &'static str,
    ) -> Result<SlotTransition> {
        if !self.state.can_transition_to(&target) {
            return Err(ControllerError::IllegalStateTransition {
                slot: self.slot,
                state: self.state,
                operation,
            });
        }
        let transition = SlotTransition::new(self.slot, self.state, target);
        debug!(slot = %self.slot, from = %self.state, to = %target, operation, "Slot transition");
        self.state = target;
        let keeps_content = target.is_occupied()
            || matches!(target, SlotState::Opening | SlotState::WaitingForClose);
        if !keeps_content {
            self.content_id = None;
        }
        self.history.push_back(transition.clone());
        if self.history.len() > MAX_HISTORY_SIZE {
            self.history.pop_front();
        }
        Ok(transition)
    }

    /// Record shape persisted for this slot.
    pub fn record(&self) -> SlotRecord {
        SlotRecord {
            slot_id: self.slot,
            content_id: self.content_id.clone(),
            occupied: self.state.is_occupied(),
            opening: self.state.is_in_progress(),
            is_active: self.state != SlotState::Deactivated,
            updated_at: Utc::now(),
        }
    }

    pub fn snapshot(&self) -> SlotSnapshot {
        SlotSnapshot {
            slot: self.slot,
            state: self.state,
            closed: self.last_closed,
            occupied: self.state.is_occupied(),
            content_id: self.content_id.clone(),
            active: self.state != SlotState::Deactivated,
        }
    }
}

/// Which kind of lifecycle holds the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Unlock,
    Dispense,
}

/// The one slot currently running an unlock or dispense lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveLifecycle {
    pub slot: SlotId,
    pub kind: LifecycleKind,
    pub generation: u64,
}

/// All slots of a deployment plus the operation-in-progress guard.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    slots: BTreeMap<SlotId, SlotMachine>,
    active: Option<ActiveLifecycle>,
    next_generation: u64,
}

impl Lifecycle {
    /// Build the deployment's slots; slots without a record start `Idle`.
    pub fn new(slots: impl IntoIterator<Item = SlotId>, records: Vec<SlotRecord>) -> Self {
        let mut machines: BTreeMap<SlotId, SlotMachine> = slots
            .into_iter()
            .map(|slot| (slot, SlotMachine::new(slot, SlotState::Idle, None)))
            .collect();

        for record in &records {
            match machines.get_mut(&record.slot_id) {
                Some(machine) => *machine = SlotMachine::from_record(record),
                None => {
                    warn!(slot = %record.slot_id, "Ignoring record for slot outside deployment");
                }
            }
        }

        Self {
            slots: machines,
            active: None,
            next_generation: 1,
        }
    }

    pub fn active(&self) -> Option<ActiveLifecycle> {
        self.active
    }

    pub fn state(&self, slot: SlotId) -> Option<SlotState> {
        self.slots.get(&slot).map(SlotMachine::state)
    }

    pub fn machine(&self, slot: SlotId) -> Option<&SlotMachine> {
        self.slots.get(&slot)
    }

    pub fn slots(&self) -> impl Iterator<Item = &SlotMachine> {
        self.slots.values()
    }

    pub fn snapshot(&self) -> Vec<SlotSnapshot> {
        self.slots.values().map(SlotMachine::snapshot).collect()
    }

    fn machine_mut(&mut self, slot: SlotId) -> Result<&mut SlotMachine> {
        self.slots
            .get_mut(&slot)
            .ok_or_else(|| {
                ControllerError::InvalidSlot(format!("slot {slot} is not in this deployment"))
            })
    }

    fn check_guard(&self) -> Result<()> {
        match self.active {
            Some(active) => Err(ControllerError::OperationInProgress { slot: active.slot }),
            None => Ok(()),
        }
    }

    fn start(&mut self, slot: SlotId, kind: LifecycleKind) -> ActiveLifecycle {
        let active = ActiveLifecycle {
            slot,
            kind,
            generation: self.next_generation,
        };
        self.next_generation += 1;
        self.active = Some(active);
        active
    }

    fn release_if(&mut self, slot: SlotId) {
        if self.active.is_some_and(|a| a.slot == slot) {
            self.active = None;
        }
    }

    fn current(&self, generation: u64) -> Option<ActiveLifecycle> {
        self.active.filter(|a| a.generation == generation)
    }

    /// `Idle -> Opening` for loading `content_id` into `slot`.
    pub fn begin_unlock(
        &mut self,
        slot: SlotId,
        content_id: &str,
    ) -> Result<(ActiveLifecycle, SlotTransition)> {
        self.machine_mut(slot)?;
        if content_id.trim().is_empty() {
            return Err(ControllerError::MissingContentId { slot });
        }
        self.check_guard()?;
        let machine = self.machine_mut(slot)?;
        if machine.state != SlotState::Idle {
            return Err(ControllerError::IllegalStateTransition {
                slot,
                state: machine.state,
                operation: "unlock",
            });
        }
        let transition = machine.transition_to(SlotState::Opening, "unlock")?;
        machine.content_id = Some(content_id.to_string());
        Ok((self.start(slot, LifecycleKind::Unlock), transition))
    }

    /// `Occupied -> Dispensing`; the slot must hold content.
    pub fn begin_dispense(&mut self, slot: SlotId) -> Result<(ActiveLifecycle, SlotTransition)> {
        self.machine_mut(slot)?;
        self.check_guard()?;
        let machine = self.machine_mut(slot)?;
        let has_content = machine.content_id.as_deref().is_some_and(|c| !c.is_empty());
        if machine.state != SlotState::Occupied || !has_content {
            return Err(ControllerError::IllegalStateTransition {
                slot,
                state: machine.state,
                operation: "dispense",
            });
        }
        let transition = machine.transition_to(SlotState::Dispensing, "dispense")?;
        Ok((self.start(slot, LifecycleKind::Dispense), transition))
    }

    /// The unlock of lifecycle `generation` was acknowledged.
    pub fn confirm_unlocked(&mut self, generation: u64) -> Option<SlotTransition> {
        let active = self.current(generation)?;
        let machine = self.slots.get_mut(&active.slot)?;
        let target = match machine.state {
            SlotState::Opening => SlotState::WaitingForClose,
            SlotState::Dispensing => SlotState::WaitingForDispenseClose,
            _ => return None,
        };
        machine.transition_to(target, "confirm unlock").ok()
    }

    /// The unlock of lifecycle `generation` was refused or got no reply.
    pub fn abort(&mut self, generation: u64) -> Option<SlotTransition> {
        let active = self.current(generation)?;
        self.active = None;
        let machine = self.slots.get_mut(&active.slot)?;
        let target = match machine.state {
            SlotState::Opening => SlotState::Idle,
            SlotState::Dispensing => SlotState::Occupied,
            _ => return None,
        };
        machine.transition_to(target, "abort").ok()
    }

    /// Whether lifecycle `generation` is still waiting for its door to close.
    pub fn is_waiting(&self, generation: u64) -> bool {
        self.current(generation)
            .and_then(|a| self.state(a.slot))
            .is_some_and(|s| s.is_waiting_for_close())
    }

    /// Apply one slot's lock state from a status reply.
    ///
    /// Only the slot's own bit counts: a closed bit for any other slot never
    /// finishes this slot's lifecycle.
    pub fn observe(&mut self, slot: SlotId, closed: bool) -> Option<SlotTransition> {
        let machine = self.slots.get_mut(&slot)?;
        machine.last_closed = Some(closed);
        if !closed {
            return None;
        }
        let target = match machine.state {
            SlotState::WaitingForClose => SlotState::Occupied,
            SlotState::WaitingForDispenseClose => SlotState::Idle,
            _ => return None,
        };
        let transition = machine.transition_to(target, "lock back").ok()?;
        self.release_if(slot);
        Some(transition)
    }

    /// Force a slot back to `Idle`, aborting its lifecycle. `None` if already idle.
    pub fn reset_slot(&mut self, slot: SlotId) -> Result<Option<SlotTransition>> {
        let machine = self.machine_mut(slot)?;
        match machine.state {
            SlotState::Idle => return Ok(None),
            SlotState::Deactivated => {
                return Err(ControllerError::IllegalStateTransition {
                    slot,
                    state: machine.state,
                    operation: "reset",
                });
            }
            _ => {}
        }
        let transition = machine.transition_to(SlotState::Idle, "reset")?;
        self.release_if(slot);
        Ok(Some(transition))
    }

    /// Take a slot out of service. `None` if already deactivated.
    pub fn deactivate(&mut self, slot: SlotId) -> Result<Option<SlotTransition>> {
        let machine = self.machine_mut(slot)?;
        if machine.state == SlotState::Deactivated {
            return Ok(None);
        }
        let transition = machine.transition_to(SlotState::Deactivated, "deactivate")?;
        self.release_if(slot);
        Ok(Some(transition))
    }

    /// Return a slot to service. `None` if it was not deactivated.
    pub fn reactivate(&mut self, slot: SlotId) -> Result<Option<SlotTransition>> {
        let machine = self.machine_mut(slot)?;
        if machine.state != SlotState::Deactivated {
            return Ok(None);
        }
        machine.transition_to(SlotState::Idle, "reactivate").map(Some)
    }

    pub fn deactivate_all(&mut self) -> Vec<SlotTransition> {
        let slots: Vec<SlotId> = self.slots.keys().copied().collect();
        slots
            .into_iter()
            .filter_map(|slot| self.deactivate(slot).ok().flatten())
            .collect()
    }

    pub fn reactivate_all(&mut self) -> Vec<SlotTransition> {
        let slots: Vec<SlotId> = self.slots.keys().copied().collect();
        slots
            .into_iter()
            .filter_map(|slot| self.reactivate(slot).ok().flatten())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn slot(n: u8) -> SlotId {
        SlotId::new(n).unwrap()
    }

    fn lifecycle(count: u8) -> Lifecycle {
        Lifecycle::new((1..=count).map(slot), Vec::new())
    }

    fn record(n: u8, occupied: bool, opening: bool, is_active: bool) -> SlotRecord {
        SlotRecord {
            slot_id: slot(n),
            content_id: occupied.then(|| format!("HN-{n}")),
            occupied,
            opening,
            is_active,
            updated_at: Utc::now(),
        }
    }

    #[rstest]
    #[case(SlotState::Idle, SlotState::Opening, true)]
    #[case(SlotState::Idle, SlotState::Occupied, false)]
    #[case(SlotState::Opening, SlotState::WaitingForClose, true)]
    #[case(SlotState::Opening, SlotState::Idle, true)]
    #[case(SlotState::Opening, SlotState::Occupied, false)]
    #[case(SlotState::WaitingForClose, SlotState::Occupied, true)]
    #[case(SlotState::WaitingForClose, SlotState::Dispensing, false)]
    #[case(SlotState::Occupied, SlotState::Dispensing, true)]
    #[case(SlotState::Dispensing, SlotState::Occupied, true)]
    #[case(SlotState::WaitingForDispenseClose, SlotState::Idle, true)]
    #[case(SlotState::WaitingForDispenseClose, SlotState::Occupied, false)]
    #[case(SlotState::Deactivated, SlotState::Idle, true)]
    #[case(SlotState::Deactivated, SlotState::Opening, false)]
    fn test_can_transition_to(
        #[case] from: SlotState,
        #[case] to: SlotState,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(&to), allowed);
    }

    #[test]
    fn test_full_load_and_dispense_cycle() {
        let mut lc = lifecycle(15);
        let s = slot(4);

        let (active, _) = lc.begin_unlock(s, "HN-42").unwrap();
        assert_eq!(lc.state(s), Some(SlotState::Opening));
        lc.confirm_unlocked(active.generation).unwrap();
        assert_eq!(lc.state(s), Some(SlotState::WaitingForClose));

        assert!(lc.observe(s, false).is_none());
        assert_eq!(lc.state(s), Some(SlotState::WaitingForClose));
        lc.observe(s, true).unwrap();
        assert_eq!(lc.state(s), Some(SlotState::Occupied));
        assert_eq!(lc.machine(s).unwrap().content_id(), Some("HN-42"));

        let (active, _) = lc.begin_dispense(s).unwrap();
        lc.confirm_unlocked(active.generation).unwrap();
        assert_eq!(lc.state(s), Some(SlotState::WaitingForDispenseClose));
        lc.observe(s, true).unwrap();
        assert_eq!(lc.state(s), Some(SlotState::Idle));
        assert_eq!(lc.machine(s).unwrap().content_id(), None);
        assert!(lc.active().is_none());
        assert_eq!(lc.machine(s).unwrap().history().len(), 6);
    }

    #[test]
    fn test_global_guard() {
        let mut lc = lifecycle(15);
        lc.begin_unlock(slot(1), "HN-1").unwrap();
        let err = lc.begin_unlock(slot(2), "HN-2").unwrap_err();
        assert!(matches!(err, ControllerError::OperationInProgress { slot } if slot.get() == 1));
        assert_eq!(lc.state(slot(2)), Some(SlotState::Idle));
    }

    #[test]
    fn test_dispense_requires_occupied() {
        let mut lc = lifecycle(15);
        let err = lc.begin_dispense(slot(1)).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::IllegalStateTransition {
                state: SlotState::Idle,
                operation: "dispense",
                ..
            }
        ));
        assert!(lc.active().is_none());
    }

    #[test]
    fn test_dispense_requires_content() {
        let mut record = record(3, true, false, true);
        record.content_id = Some(String::new());
        let mut lc = Lifecycle::new((1..=15).map(slot), vec![record]);
        assert!(lc.begin_dispense(slot(3)).is_err());
    }

    #[test]
    fn test_unlock_rejected_when_occupied() {
        let mut lc = Lifecycle::new((1..=15).map(slot), vec![record(5, true, false, true)]);
        let err = lc.begin_unlock(slot(5), "HN-9").unwrap_err();
        assert!(matches!(
            err,
            ControllerError::IllegalStateTransition {
                state: SlotState::Occupied,
                ..
            }
        ));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("\t\n")]
    fn test_unlock_requires_content_id(#[case] content_id: &str) {
        let mut lc = lifecycle(15);
        let err = lc.begin_unlock(slot(2), content_id).unwrap_err();
        assert!(matches!(err, ControllerError::MissingContentId { .. }));
        assert_eq!(lc.state(slot(2)), Some(SlotState::Idle));
        assert!(lc.active().is_none());
        assert!(lc.machine(slot(2)).unwrap().history().is_empty());
    }

    #[test]
    fn test_abort_reverts() {
        let mut lc = Lifecycle::new((1..=15).map(slot), vec![record(2, true, false, true)]);
        let (active, _) = lc.begin_unlock(slot(1), "HN-1").unwrap();
        lc.abort(active.generation).unwrap();
        assert_eq!(lc.state(slot(1)), Some(SlotState::Idle));
        assert_eq!(lc.machine(slot(1)).unwrap().content_id(), None);

        let (active, _) = lc.begin_dispense(slot(2)).unwrap();
        lc.abort(active.generation).unwrap();
        assert_eq!(lc.state(slot(2)), Some(SlotState::Occupied));
        assert_eq!(lc.machine(slot(2)).unwrap().content_id(), Some("HN-2"));
    }

    #[test]
    fn test_other_slot_bits_do_not_advance() {
        let mut lc = lifecycle(15);
        let (active, _) = lc.begin_unlock(slot(8), "HN-8").unwrap();
        lc.confirm_unlocked(active.generation);

        for n in (1..=15).filter(|n| *n != 8) {
            assert!(lc.observe(slot(n), true).is_none());
        }
        assert_eq!(lc.state(slot(8)), Some(SlotState::WaitingForClose));
        assert!(lc.observe(slot(8), false).is_none());
        assert!(lc.is_waiting(active.generation));
    }

    #[test]
    fn test_stale_generation_ignored() {
        let mut lc = lifecycle(15);
        let (first, _) = lc.begin_unlock(slot(1), "HN-1").unwrap();
        lc.reset_slot(slot(1)).unwrap();
        assert!(lc.active().is_none());
        assert!(lc.confirm_unlocked(first.generation).is_none());

        let (second, _) = lc.begin_unlock(slot(1), "HN-1").unwrap();
        assert_ne!(first.generation, second.generation);
        assert!(lc.abort(first.generation).is_none());
        assert_eq!(lc.state(slot(1)), Some(SlotState::Opening));
    }

    #[test]
    fn test_reset_refused_when_deactivated() {
        let mut lc = lifecycle(3);
        lc.deactivate(slot(2)).unwrap();
        assert!(lc.reset_slot(slot(2)).is_err());
        assert!(lc.reset_slot(slot(1)).unwrap().is_none());
    }

    #[test]
    fn test_deactivate_active_slot_releases_guard() {
        let mut lc = lifecycle(3);
        lc.begin_unlock(slot(1), "HN-1").unwrap();
        lc.deactivate(slot(1)).unwrap().unwrap();
        assert!(lc.active().is_none());
        assert_eq!(lc.machine(slot(1)).unwrap().content_id(), None);
        lc.reactivate(slot(1)).unwrap().unwrap();
        assert_eq!(lc.state(slot(1)), Some(SlotState::Idle));
    }

    #[test]
    fn test_deactivate_and_reactivate_all() {
        let mut lc = Lifecycle::new((1..=4).map(slot), vec![record(4, false, false, false)]);
        assert_eq!(lc.deactivate_all().len(), 3);
        assert!(lc.slots().all(|m| m.state() == SlotState::Deactivated));
        assert_eq!(lc.reactivate_all().len(), 4);
        assert!(lc.slots().all(|m| m.state() == SlotState::Idle));
    }

    #[test]
    fn test_recovery_from_records() {
        let records = vec![
            record(1, true, true, true),
            record(2, false, true, true),
            record(3, false, false, false),
            record(20, true, false, true),
        ];
        let lc = Lifecycle::new((1..=15).map(slot), records);
        assert_eq!(lc.state(slot(1)), Some(SlotState::Occupied));
        assert_eq!(lc.state(slot(2)), Some(SlotState::Idle));
        assert_eq!(lc.state(slot(3)), Some(SlotState::Deactivated));
        assert!(lc.state(slot(20)).is_none());
        assert!(!lc.machine(slot(1)).unwrap().record().opening);
    }

    #[test]
    fn test_record_flags() {
        let mut lc = lifecycle(3);
        lc.begin_unlock(slot(1), "HN-1").unwrap();
        let record = lc.machine(slot(1)).unwrap().record();
        assert!(record.opening);
        assert!(!record.occupied);
        assert_eq!(record.content_id.as_deref(), Some("HN-1"));
    }

    #[test]
    fn test_unknown_slot() {
        let mut lc = lifecycle(12);
        assert!(matches!(
            lc.begin_unlock(slot(13), "HN"),
            Err(ControllerError::InvalidSlot(_))
        ));
    }
}
