//! Driver boundary.
//!
//! The core talks to hardware only through these traits. Pin I/O, the RFID
//! wire protocol, servo PWM and LCD driving live behind them.

mod poll;
pub mod sim;

use async_trait::async_trait;

use crate::error::Result;
use crate::token::TokenId;

pub use poll::PolledTrigger;

/// Card reader. `read` may block indefinitely; callers bound it.
#[async_trait]
pub trait TokenReader: Send + Sync {
    async fn read(&self) -> Result<TokenId>;
}

/// Active-low digital input (IR sensor or push button).
pub trait DigitalInput: Send + Sync {
    /// `true` when the line is electrically LOW, i.e. triggered.
    fn is_low(&self) -> Result<bool>;
}

/// Edge source for an event loop: resolves once per debounced activation.
#[async_trait]
pub trait Trigger: Send {
    async fn next_trigger(&mut self) -> Result<()>;
}

/// Barrier servo. 0° is closed, 90° is open.
pub trait Actuator: Send + Sync {
    fn set_angle(&self, degrees: u16) -> Result<()>;

    /// Stop driving the servo after a move so it does not jitter.
    fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Status message sink (the gate's character LCD).
pub trait StatusDisplay: Send + Sync {
    fn show(&self, message: &str);
}
