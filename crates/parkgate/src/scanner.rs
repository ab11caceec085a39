//! Bounded card scans over the shared reader.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::devices::{StatusDisplay, TokenReader};
use crate::error::{GateError, Result};
use crate::token::TokenId;

/// Wraps the one physical reader shared by the entry, add and remove loops.
///
/// Scans are serialized, bounded by `timeout` (which includes waiting for
/// another loop's scan to finish), and abandoned on shutdown. No parking state
/// lock is ever held while a scan is pending.
pub struct Scanner {
    reader: Arc<dyn TokenReader>,
    timeout: Duration,
    busy: Mutex<()>,
    shutdown: CancellationToken,
}

impl Scanner {
    pub fn new(reader: Arc<dyn TokenReader>, timeout: Duration, shutdown: CancellationToken) -> Self {
        Self {
            reader,
            timeout,
            busy: Mutex::new(()),
            shutdown,
        }
    }

    pub async fn scan(&self) -> Result<TokenId> {
        let bounded = async {
            let _reader = self.busy.lock().await;
            self.reader.read().await
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(GateError::ScanCancelled),
            result = tokio::time::timeout(self.timeout, bounded) => match result {
                Ok(read) => read,
                Err(_) => Err(GateError::ScanTimeout(self.timeout)),
            },
        }
    }
}

/// Tell the driver why a scan produced no card. Shutdown is silent.
pub(crate) fn report_scan_failure(display: &dyn StatusDisplay, purpose: &str, err: &GateError) {
    match err {
        GateError::ScanTimeout(after) => {
            tracing::warn!(purpose, timeout = ?after, "No card presented - attempt abandoned");
            display.show("Scan Timed Out");
        }
        GateError::ScanCancelled => {
            tracing::debug!(purpose, "Scan cancelled by shutdown");
        }
        other => {
            tracing::error!(purpose, error = %other, "Card reader fault");
            display.show("Reader Fault");
        }
    }
}
