//! Card enrolment and removal from the add/remove buttons.

use std::sync::Arc;

use crate::devices::StatusDisplay;
use crate::error::{GateError, Result};
use crate::scanner::{Scanner, report_scan_failure};
use crate::state::SharedState;
use crate::token::TokenId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Added(TokenId),
    AlreadyExists(TokenId),
    Removed(TokenId),
    NotFound(TokenId),
}

impl RegistrationOutcome {
    pub fn message(&self) -> String {
        match self {
            Self::Added(id) => format!("Added: {id}"),
            Self::AlreadyExists(_) => "Card Already Exists".to_string(),
            Self::Removed(id) => format!("Removed: {id}"),
            Self::NotFound(_) => "Card Not Found".to_string(),
        }
    }
}

pub struct RegistrationManager {
    state: SharedState,
    scanner: Arc<Scanner>,
    display: Arc<dyn StatusDisplay>,
}

impl RegistrationManager {
    pub fn new(state: SharedState, scanner: Arc<Scanner>, display: Arc<dyn StatusDisplay>) -> Self {
        Self {
            state,
            scanner,
            display,
        }
    }

    /// Add button: prompt, scan, register.
    pub async fn handle_add_request(&self) -> Result<RegistrationOutcome> {
        tracing::info!("Place card to register");
        self.display.show("Scan New Card");
        let token = self.scan("register").await?;
        self.add(token).await
    }

    /// Remove button: prompt, scan, unregister.
    pub async fn handle_remove_request(&self) -> Result<RegistrationOutcome> {
        tracing::info!("Place card to remove");
        self.display.show("Scan Card to Remove");
        let token = self.scan("remove").await?;
        self.remove(token).await
    }

    /// Register an already scanned card and report the result.
    pub async fn add(&self, token: TokenId) -> Result<RegistrationOutcome> {
        let id = token.clone();
        let result = self
            .state
            .with_blocking(move |state| state.tokens.register(id))
            .await
            .and_then(|registered| registered);
        let outcome = match result {
            Ok(()) => {
                tracing::info!(%token, "Card registered");
                RegistrationOutcome::Added(token)
            }
            Err(GateError::AlreadyRegistered(_)) => {
                tracing::info!(%token, "Card already registered");
                RegistrationOutcome::AlreadyExists(token)
            }
            Err(e) => return Err(self.storage_fault(&token, e)),
        };
        self.display.show(&outcome.message());
        Ok(outcome)
    }

    /// Unregister an already scanned card (and drop its reservation).
    pub async fn remove(&self, token: TokenId) -> Result<RegistrationOutcome> {
        let id = token.clone();
        let result = self
            .state
            .with_blocking(move |state| state.tokens.unregister(&id))
            .await
            .and_then(|removed| removed);
        let outcome = match result {
            Ok(()) => {
                tracing::info!(%token, "Card removed");
                RegistrationOutcome::Removed(token)
            }
            Err(GateError::NotRegistered(_)) => {
                tracing::info!(%token, "Card not found for removal");
                RegistrationOutcome::NotFound(token)
            }
            Err(e) => return Err(self.storage_fault(&token, e)),
        };
        self.display.show(&outcome.message());
        Ok(outcome)
    }

    async fn scan(&self, purpose: &str) -> Result<TokenId> {
        self.scanner.scan().await.inspect_err(|e| {
            report_scan_failure(self.display.as_ref(), purpose, e);
        })
    }

    fn storage_fault(&self, token: &TokenId, err: GateError) -> GateError {
        tracing::error!(%token, error = %err, "Registry change not persisted - rolled back");
        self.display.show("Storage Error");
        err
    }
}
