//! Entry and exit decisions.
//!
//! An entry scan is one transaction: check the registry, apply the walk-in
//! quota, take a slot. All of it runs under the state lock so two vehicles
//! racing for the last slot cannot both win. The barrier moves only after the
//! lock is released.

use std::sync::Arc;

use crate::devices::StatusDisplay;
use crate::error::{GateError, Result};
use crate::gate::Gate;
use crate::slots::SlotIndex;
use crate::state::{ParkingState, SharedState};
use crate::token::TokenId;

/// Result of one entry scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    Granted { slot: SlotIndex },
    Unregistered,
    /// A walk-in would eat into capacity held for reserved cards.
    WalkInDenied,
    Full,
    /// The card is already recorded in a slot.
    AlreadyParked { slot: SlotIndex },
}

impl EntryOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Granted { .. } => "Entry Granted",
            Self::Unregistered => "Access Denied",
            Self::WalkInDenied => "Walk-in Denied",
            Self::Full => "Parking Full",
            Self::AlreadyParked { .. } => "Already Parked",
        }
    }
}

/// Result of one exit trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    Released { slot: SlotIndex, token: TokenId },
    /// Nothing was parked; nothing happened.
    Empty,
}

/// Admission decision and slot assignment. Caller holds the state lock.
///
/// Walk-ins are admitted while fewer reserved cards are parked than there are
/// reservations. No reservations at all means no gating.
pub fn admit(state: &mut ParkingState, token: &TokenId) -> EntryOutcome {
    let tokens = &state.tokens;
    if !tokens.is_registered(token) {
        return EntryOutcome::Unregistered;
    }

    let reserved_total = tokens.reserved_count();
    let reserved_in_use = state.slots.reserved_occupancy_count(tokens);
    let eligible =
        tokens.is_reserved(token) || reserved_total == 0 || reserved_in_use < reserved_total;
    if !eligible {
        return EntryOutcome::WalkInDenied;
    }

    match state.slots.occupy(token.clone()) {
        Ok(slot) => EntryOutcome::Granted { slot },
        Err(GateError::AlreadyParked { slot, .. }) => EntryOutcome::AlreadyParked { slot },
        Err(_) => EntryOutcome::Full,
    }
}

pub struct AuthorizationEngine {
    state: SharedState,
    gate: Arc<Gate>,
    display: Arc<dyn StatusDisplay>,
}

impl AuthorizationEngine {
    pub fn new(state: SharedState, gate: Arc<Gate>, display: Arc<dyn StatusDisplay>) -> Self {
        Self {
            state,
            gate,
            display,
        }
    }

    /// Decide and, on grant, assign the slot. No side effects beyond state.
    pub fn decide_entry(&self, token: &TokenId) -> EntryOutcome {
        self.state.with(|state| admit(state, token))
    }

    /// Full entry transaction: decide, cycle the barrier on grant, report.
    ///
    /// If the barrier cannot be driven the vehicle never got in, so the slot
    /// assignment is undone before the fault is returned.
    pub async fn handle_entry(&self, token: TokenId) -> Result<EntryOutcome> {
        let outcome = self.decide_entry(&token);

        match &outcome {
            EntryOutcome::Granted { slot } => {
                tracing::info!(%token, slot, "Entry granted");
                if let Err(e) = self.gate.cycle().await {
                    let slot = *slot;
                    self.state.with(|state| state.slots.release(slot, &token));
                    tracing::error!(%token, slot, error = %e, "Gate fault on entry - slot released");
                    self.display.show("Gate Fault");
                    return Err(e);
                }
            }
            EntryOutcome::AlreadyParked { slot } => {
                tracing::warn!(%token, slot, "Entry denied: card already parked");
            }
            other => {
                tracing::warn!(%token, outcome = ?other, "Entry denied");
            }
        }

        self.display.show(outcome.message());
        Ok(outcome)
    }

    /// Release the first occupied slot. No side effects beyond state.
    pub fn release_exit(&self) -> ExitOutcome {
        match self.state.with(|state| state.slots.vacate_first_occupied()) {
            Some((slot, token)) => ExitOutcome::Released { slot, token },
            None => ExitOutcome::Empty,
        }
    }

    /// Full exit transaction. With nothing parked this is a no-op.
    pub async fn handle_exit(&self) -> Result<ExitOutcome> {
        let (slot, token) = match self.release_exit() {
            ExitOutcome::Released { slot, token } => (slot, token),
            ExitOutcome::Empty => {
                tracing::debug!("Exit triggered with no occupied slots");
                return Ok(ExitOutcome::Empty);
            }
        };

        tracing::info!(%token, slot, "Vehicle exited");
        if let Err(e) = self.gate.cycle().await {
            let restored = self
                .state
                .with(|state| state.slots.reinstate(slot, token.clone()));
            tracing::error!(%token, slot, restored, error = %e, "Gate fault on exit");
            self.display.show("Gate Fault");
            return Err(e);
        }

        self.display.show("Exit Granted");
        Ok(ExitOutcome::Released { slot, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::sim::{RecordingActuator, RecordingDisplay};
    use crate::gate::GateTiming;
    use crate::store::TokenStore;

    fn id(s: &str) -> TokenId {
        TokenId::new(s)
    }

    fn state_with(capacity: usize, registered: &[&str], reserved: &[&str]) -> ParkingState {
        let mut tokens = TokenStore::in_memory();
        for r in registered {
            tokens.register(id(r)).unwrap();
        }
        for r in reserved {
            tokens.reserve(&id(r)).unwrap();
        }
        ParkingState::new(tokens, capacity)
    }

    struct Rig {
        engine: AuthorizationEngine,
        state: SharedState,
        servo: Arc<RecordingActuator>,
        display: Arc<RecordingDisplay>,
    }

    fn rig(state: ParkingState) -> Rig {
        rig_with_servo(state, Arc::new(RecordingActuator::new()))
    }

    fn rig_with_servo(state: ParkingState, servo: Arc<RecordingActuator>) -> Rig {
        let state = SharedState::new(state);
        let display = Arc::new(RecordingDisplay::new());
        let gate = Gate::new(servo.clone(), GateTiming::instant());
        Rig {
            engine: AuthorizationEngine::new(state.clone(), gate, display.clone()),
            state,
            servo,
            display,
        }
    }

    #[test]
    fn unregistered_is_denied_even_with_free_slots() {
        let mut state = state_with(4, &["A"], &[]);
        assert_eq!(admit(&mut state, &id("X")), EntryOutcome::Unregistered);
        assert_eq!(state.slots.occupied_count(), 0);
    }

    #[test]
    fn no_reservations_means_no_walk_in_gating() {
        let mut state = state_with(2, &["A", "B", "C"], &[]);
        assert_eq!(admit(&mut state, &id("A")), EntryOutcome::Granted { slot: 0 });
        assert_eq!(admit(&mut state, &id("B")), EntryOutcome::Granted { slot: 1 });
        assert_eq!(admit(&mut state, &id("C")), EntryOutcome::Full);
    }

    #[test]
    fn walk_in_denied_when_reserved_quota_is_used() {
        let mut state = state_with(4, &["A", "B"], &["A"]);
        assert_eq!(admit(&mut state, &id("A")), EntryOutcome::Granted { slot: 0 });
        assert_eq!(admit(&mut state, &id("B")), EntryOutcome::WalkInDenied);
        assert_eq!(state.slots.occupied_count(), 1);
    }

    #[test]
    fn walk_in_admitted_while_reserved_cards_are_out() {
        let mut state = state_with(4, &["A", "B", "W"], &["A", "B"]);
        assert_eq!(admit(&mut state, &id("W")), EntryOutcome::Granted { slot: 0 });
    }

    #[test]
    fn reserved_card_always_eligible() {
        let mut state = state_with(2, &["A", "W"], &["A"]);
        assert_eq!(admit(&mut state, &id("W")), EntryOutcome::Granted { slot: 0 });
        assert_eq!(admit(&mut state, &id("A")), EntryOutcome::Granted { slot: 1 });
    }

    #[test]
    fn parked_card_cannot_enter_twice() {
        let mut state = state_with(4, &["A"], &[]);
        admit(&mut state, &id("A"));
        assert_eq!(
            admit(&mut state, &id("A")),
            EntryOutcome::AlreadyParked { slot: 0 }
        );
        assert_eq!(state.slots.occupied_count(), 1);
    }

    #[tokio::test]
    async fn granted_entry_cycles_gate_and_reports() {
        let rig = rig(state_with(4, &["A"], &[]));

        let outcome = rig.engine.handle_entry(id("A")).await.unwrap();

        assert_eq!(outcome, EntryOutcome::Granted { slot: 0 });
        assert_eq!(rig.servo.angles(), vec![90, 0]);
        assert_eq!(rig.display.last().as_deref(), Some("Entry Granted"));
    }

    #[tokio::test]
    async fn denied_entry_leaves_gate_closed() {
        let rig = rig(state_with(4, &["A"], &[]));

        let outcome = rig.engine.handle_entry(id("X")).await.unwrap();

        assert_eq!(outcome, EntryOutcome::Unregistered);
        assert!(rig.servo.angles().is_empty());
        assert_eq!(rig.display.last().as_deref(), Some("Access Denied"));
    }

    #[tokio::test]
    async fn exit_with_empty_lot_is_a_no_op() {
        let rig = rig(state_with(4, &[], &[]));

        let outcome = rig.engine.handle_exit().await.unwrap();

        assert_eq!(outcome, ExitOutcome::Empty);
        assert!(rig.servo.angles().is_empty());
        assert!(rig.display.messages().is_empty());
    }

    #[tokio::test]
    async fn exit_frees_first_slot_and_cycles_gate() {
        let rig = rig(state_with(4, &["A", "B"], &[]));
        rig.engine.handle_entry(id("A")).await.unwrap();
        rig.engine.handle_entry(id("B")).await.unwrap();

        let outcome = rig.engine.handle_exit().await.unwrap();

        assert_eq!(
            outcome,
            ExitOutcome::Released {
                slot: 0,
                token: id("A")
            }
        );
        assert_eq!(rig.state.lock().slots.available_count(), 3);
        assert_eq!(rig.display.last().as_deref(), Some("Exit Granted"));
    }

    #[tokio::test]
    async fn gate_fault_on_entry_releases_slot() {
        let rig = rig_with_servo(
            state_with(4, &["A"], &[]),
            Arc::new(RecordingActuator::broken()),
        );

        let err = rig.engine.handle_entry(id("A")).await.unwrap_err();

        assert!(err.is_fault());
        assert_eq!(rig.state.lock().slots.occupied_count(), 0);
        assert_eq!(rig.display.last().as_deref(), Some("Gate Fault"));
    }

    #[tokio::test]
    async fn gate_fault_on_exit_restores_slot() {
        let mut state = state_with(4, &["A"], &[]);
        admit(&mut state, &id("A"));
        let rig = rig_with_servo(state, Arc::new(RecordingActuator::broken()));

        assert!(rig.engine.handle_exit().await.is_err());
        assert_eq!(rig.state.lock().slots.slot_of(&id("A")), Some(0));
    }

    #[test]
    fn concurrent_entries_for_last_slot_allocate_once() {
        use std::sync::Barrier;

        for _ in 0..50 {
            let mut initial = state_with(2, &["A", "B", "C"], &[]);
            admit(&mut initial, &id("A"));
            let shared = SharedState::new(initial);
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = ["B", "C"]
                .into_iter()
                .map(|name| {
                    let shared = shared.clone();
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        shared.with(|state| admit(state, &id(name)))
                    })
                })
                .collect();
            let outcomes: Vec<EntryOutcome> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();

            let granted = outcomes.iter().filter(|o| o.is_granted()).count();
            let full = outcomes
                .iter()
                .filter(|o| **o == EntryOutcome::Full)
                .count();
            assert_eq!((granted, full), (1, 1), "outcomes: {outcomes:?}");
            assert_eq!(shared.lock().slots.occupied_count(), 2);
        }
    }
}
