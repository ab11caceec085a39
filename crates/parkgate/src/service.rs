//! GateService: the process-wide owner of parking state and gate components.
//!
//! This service owns:
//! - Shared parking state (token store + slot pool behind one lock)
//! - The authorization engine and registration manager
//! - The shared card scanner
//! - Shutdown coordination
//!
//! Event loops and HTTP handlers hold an `Arc<GateService>`; none of them keep
//! a private copy of state.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::GateConfig;
use crate::devices::{Actuator, StatusDisplay, TokenReader};
use crate::engine::{AuthorizationEngine, EntryOutcome, ExitOutcome};
use crate::error::{GateError, Result};
use crate::gate::{Gate, GateTiming};
use crate::registration::{RegistrationManager, RegistrationOutcome};
use crate::scanner::{Scanner, report_scan_failure};
use crate::state::SharedState;
use crate::token::TokenId;

/// Driver handles the service needs. Inputs are wired to the event loops
/// separately.
pub struct Devices {
    pub reader: Arc<dyn TokenReader>,
    pub actuator: Arc<dyn Actuator>,
    pub display: Arc<dyn StatusDisplay>,
}

/// Point-in-time view of the lot for status queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancySnapshot {
    pub capacity: usize,
    pub available: usize,
    pub reserved_in_use: usize,
    pub registered: usize,
    pub reserved: usize,
}

pub struct GateService {
    state: SharedState,
    engine: AuthorizationEngine,
    registration: RegistrationManager,
    scanner: Arc<Scanner>,
    display: Arc<dyn StatusDisplay>,
    shutdown: CancellationToken,
}

impl GateService {
    pub fn new(
        state: SharedState,
        devices: Devices,
        timing: GateTiming,
        scan_timeout: std::time::Duration,
        shutdown: CancellationToken,
    ) -> Self {
        let gate = Gate::new(devices.actuator, timing);
        let scanner = Arc::new(Scanner::new(devices.reader, scan_timeout, shutdown.clone()));
        Self {
            engine: AuthorizationEngine::new(state.clone(), gate, Arc::clone(&devices.display)),
            registration: RegistrationManager::new(
                state.clone(),
                Arc::clone(&scanner),
                Arc::clone(&devices.display),
            ),
            state,
            scanner,
            display: devices.display,
            shutdown,
        }
    }

    pub fn from_config(
        config: &GateConfig,
        state: SharedState,
        devices: Devices,
        shutdown: CancellationToken,
    ) -> Self {
        Self::new(
            state,
            devices,
            config.gate.timing(),
            config.scan.timeout(),
            shutdown,
        )
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn engine(&self) -> &AuthorizationEngine {
        &self.engine
    }

    pub fn registration(&self) -> &RegistrationManager {
        &self.registration
    }

    /// Entry sensor: prompt, scan, decide.
    ///
    /// The card is read with no state lock held; admission re-reads state
    /// under the lock afterwards.
    pub async fn on_entry_trigger(&self) -> Result<EntryOutcome> {
        tracing::info!("Vehicle detected at entry");
        self.display.show("Scanning RFID");
        let token = self.scanner.scan().await.inspect_err(|e| {
            report_scan_failure(self.display.as_ref(), "entry", e);
        })?;
        self.engine.handle_entry(token).await
    }

    /// Exit sensor: release a slot and open the barrier.
    pub async fn on_exit_trigger(&self) -> Result<ExitOutcome> {
        tracing::info!("Vehicle detected at exit");
        self.engine.handle_exit().await
    }

    pub async fn on_add_button(&self) -> Result<RegistrationOutcome> {
        self.registration.handle_add_request().await
    }

    pub async fn on_remove_button(&self) -> Result<RegistrationOutcome> {
        self.registration.handle_remove_request().await
    }

    pub fn available_slots(&self) -> usize {
        self.state.lock().slots.available_count()
    }

    pub fn occupancy(&self) -> OccupancySnapshot {
        self.state.with(|state| OccupancySnapshot {
            capacity: state.slots.capacity(),
            available: state.slots.available_count(),
            reserved_in_use: state.slots.reserved_occupancy_count(&state.tokens),
            registered: state.tokens.registered_count(),
            reserved: state.tokens.reserved_count(),
        })
    }

    /// Reserve a registered card. Check and persist happen in one critical
    /// section on the blocking pool; the call returns only once the
    /// reservation is durable.
    pub async fn reserve(&self, token: &TokenId) -> Result<()> {
        let id = token.clone();
        let result = self
            .state
            .with_blocking(move |state| state.tokens.reserve(&id))
            .await
            .and_then(|reserved| reserved);
        match result {
            Ok(()) => {
                tracing::info!(%token, "Reservation accepted");
                Ok(())
            }
            Err(e @ GateError::Unregistered(_)) => {
                tracing::warn!(%token, "Reservation refused: card not registered");
                Err(e)
            }
            Err(e) => {
                tracing::error!(%token, error = %e, "Reservation not persisted - rolled back");
                Err(e)
            }
        }
    }

    pub fn trigger_shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}
