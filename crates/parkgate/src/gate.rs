//! Barrier control: open, hold, close.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::devices::Actuator;
use crate::error::{GateError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateTiming {
    pub open_angle: u16,
    pub closed_angle: u16,
    /// Servo travel time; the pulse is released after it.
    pub settle: Duration,
    /// How long the barrier stays open.
    pub dwell: Duration,
}

impl Default for GateTiming {
    fn default() -> Self {
        Self {
            open_angle: 90,
            closed_angle: 0,
            settle: Duration::from_secs(1),
            dwell: Duration::from_secs(3),
        }
    }
}

impl GateTiming {
    /// No waiting at all; for tests.
    pub fn instant() -> Self {
        Self {
            settle: Duration::ZERO,
            dwell: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// The single barrier. Cycles are serialized: entry and exit never drive the
/// servo at the same time.
pub struct Gate {
    actuator: Arc<dyn Actuator>,
    timing: GateTiming,
    busy: Mutex<()>,
}

impl Gate {
    pub fn new(actuator: Arc<dyn Actuator>, timing: GateTiming) -> Arc<Self> {
        Arc::new(Self {
            actuator,
            timing,
            busy: Mutex::new(()),
        })
    }

    /// Open, hold for the dwell time, close.
    ///
    /// The sequence runs in its own task, so dropping the caller's future
    /// cannot leave the barrier open.
    pub async fn cycle(self: &Arc<Self>) -> Result<()> {
        let gate = Arc::clone(self);
        tokio::spawn(async move { gate.run_cycle().await })
            .await
            .map_err(|e| GateError::HardwareUnavailable(format!("gate task failed: {e}")))?
    }

    async fn run_cycle(&self) -> Result<()> {
        let _busy = self.busy.lock().await;

        let opened = self.move_to(self.timing.open_angle).await;
        if opened.is_ok() {
            tokio::time::sleep(self.timing.dwell).await;
        } else {
            tracing::error!("Barrier failed to open - commanding close");
        }

        // Always attempt to close, even if the open command failed.
        let closed = self.move_to(self.timing.closed_angle).await;
        if let Err(ref e) = closed {
            tracing::error!(error = %e, "Barrier failed to close");
        }
        opened.and(closed)
    }

    async fn move_to(&self, degrees: u16) -> Result<()> {
        self.actuator.set_angle(degrees)?;
        tokio::time::sleep(self.timing.settle).await;
        self.actuator.release()
    }
}
