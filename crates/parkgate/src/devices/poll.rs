//! Level-to-edge adapter for polled inputs.

use std::time::Duration;

use async_trait::async_trait;

use super::{DigitalInput, Trigger};
use crate::error::Result;

/// Turns an active-low [`DigitalInput`] into a falling-edge [`Trigger`].
///
/// A trigger fires once when the line goes LOW and stays LOW for the debounce
/// window. It re-arms only after the line is seen HIGH again, so a vehicle
/// parked in front of a sensor is reported once, not on every poll.
pub struct PolledTrigger<I> {
    input: I,
    poll_interval: Duration,
    debounce: Duration,
    armed: bool,
}

impl<I: DigitalInput> PolledTrigger<I> {
    pub fn new(input: I, poll_interval: Duration, debounce: Duration) -> Self {
        Self {
            input,
            poll_interval,
            debounce,
            armed: true,
        }
    }
}

#[async_trait]
impl<I: DigitalInput> Trigger for PolledTrigger<I> {
    async fn next_trigger(&mut self) -> Result<()> {
        loop {
            if !self.input.is_low()? {
                self.armed = true;
            } else if self.armed {
                tokio::time::sleep(self.debounce).await;
                if self.input.is_low()? {
                    self.armed = false;
                    tracing::debug!("Input edge detected");
                    return Ok(());
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
