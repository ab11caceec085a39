//! The four input loops: entry sensor, exit sensor, add button, remove button.
//!
//! Each loop waits for its trigger, runs one handler to completion, then sleeps
//! out its re-arm delay. Loops share nothing but the [`GateService`]; a
//! slow scan in one never stalls another. Shutdown interrupts trigger waits,
//! pending scans and re-arm sleeps, but never a barrier cycle in progress.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::InputConfig;
use crate::devices::Trigger;
use crate::service::GateService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    Entry,
    Exit,
    Add,
    Remove,
}

impl LoopKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }

    fn rearm(self, inputs: &InputConfig) -> Duration {
        let ms = match self {
            Self::Entry => inputs.entry_rearm_ms,
            Self::Exit => inputs.exit_rearm_ms,
            Self::Add | Self::Remove => inputs.button_rearm_ms,
        };
        Duration::from_millis(ms)
    }
}

/// One trigger per loop.
pub struct Triggers {
    pub entry: Box<dyn Trigger>,
    pub exit: Box<dyn Trigger>,
    pub add: Box<dyn Trigger>,
    pub remove: Box<dyn Trigger>,
}

impl Triggers {
    fn into_loops(self) -> [(LoopKind, Box<dyn Trigger>); 4] {
        [
            (LoopKind::Entry, self.entry),
            (LoopKind::Exit, self.exit),
            (LoopKind::Add, self.add),
            (LoopKind::Remove, self.remove),
        ]
    }
}

/// Handles to the running loops.
pub struct EventLoops {
    handles: Vec<(LoopKind, JoinHandle<()>)>,
}

impl EventLoops {
    /// Spawn all four loops. They stop when the service's shutdown token is
    /// cancelled.
    pub fn spawn(service: Arc<GateService>, triggers: Triggers, inputs: &InputConfig) -> Self {
        let handles = triggers
            .into_loops()
            .into_iter()
            .map(|(kind, trigger)| {
                let timing = LoopTiming {
                    rearm: kind.rearm(inputs),
                    fault_backoff: inputs.fault_backoff(),
                };
                let handle = tokio::spawn(run_loop(kind, Arc::clone(&service), trigger, timing));
                (kind, handle)
            })
            .collect();
        Self { handles }
    }

    /// Wait for every loop to exit.
    pub async fn join(self) {
        for (kind, handle) in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(event_loop = kind.name(), error = %e, "Event loop task failed");
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LoopTiming {
    rearm: Duration,
    fault_backoff: Duration,
}

async fn run_loop(
    kind: LoopKind,
    service: Arc<GateService>,
    mut trigger: Box<dyn Trigger>,
    timing: LoopTiming,
) {
    let shutdown = service.shutdown_token();
    tracing::info!(event_loop = kind.name(), "Event loop started");

    loop {
        let edge = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            edge = trigger.next_trigger() => edge,
        };

        if let Err(e) = edge {
            tracing::warn!(event_loop = kind.name(), error = %e, "Input read failed");
            if sleep_or_shutdown(timing.fault_backoff, &shutdown).await {
                break;
            }
            continue;
        }

        dispatch(kind, &service).await;

        if sleep_or_shutdown(timing.rearm, &shutdown).await {
            break;
        }
    }

    tracing::info!(event_loop = kind.name(), "Event loop stopped");
}

/// Run one handler in its own task so that neither shutdown nor a panic in the
/// handler can leave the barrier or the loop in a half-done state.
async fn dispatch(kind: LoopKind, service: &Arc<GateService>) {
    let service = Arc::clone(service);
    let handler = tokio::spawn(async move {
        let result = match kind {
            LoopKind::Entry => service.on_entry_trigger().await.map(|o| format!("{o:?}")),
            LoopKind::Exit => service.on_exit_trigger().await.map(|o| format!("{o:?}")),
            LoopKind::Add => service.on_add_button().await.map(|o| format!("{o:?}")),
            LoopKind::Remove => service.on_remove_button().await.map(|o| format!("{o:?}")),
        };
        match result {
            Ok(outcome) => tracing::debug!(event_loop = kind.name(), %outcome, "Handled"),
            Err(e) => tracing::debug!(event_loop = kind.name(), error = %e, "Handler ended early"),
        }
    });

    if let Err(e) = handler.await {
        tracing::error!(event_loop = kind.name(), error = %e, "Handler panicked");
    }
}

/// Returns `true` if shutdown arrived first.
async fn sleep_or_shutdown(duration: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
