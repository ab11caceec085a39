//! In-process drivers for the simulation bench and tests.
//!
//! A channel stands in for the card reader. Inputs are either channels or
//! software-driven lines behind a [`super::PolledTrigger`]. The actuator and
//! display either log through `tracing` or record what they were asked to do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Actuator, DigitalInput, StatusDisplay, TokenReader, Trigger};
use crate::error::{GateError, Result};
use crate::token::TokenId;

/// Card reader fed by a channel. Each sent id is one card presentation.
pub struct ChannelTokenReader {
    rx: tokio::sync::Mutex<mpsc::Receiver<TokenId>>,
}

impl ChannelTokenReader {
    pub fn new(buffer: usize) -> (mpsc::Sender<TokenId>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            tx,
            Self {
                rx: tokio::sync::Mutex::new(rx),
            },
        )
    }
}

#[async_trait]
impl TokenReader for ChannelTokenReader {
    async fn read(&self) -> Result<TokenId> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| GateError::HardwareUnavailable("card reader disconnected".to_string()))
    }
}

/// Input fed by a channel. Each `()` is one debounced activation.
pub struct ChannelTrigger {
    rx: mpsc::Receiver<()>,
}

impl ChannelTrigger {
    pub fn new(buffer: usize) -> (mpsc::Sender<()>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }
}

#[async_trait]
impl Trigger for ChannelTrigger {
    async fn next_trigger(&mut self) -> Result<()> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| GateError::HardwareUnavailable("input line disconnected".to_string()))
    }
}

/// Active-low line whose level is set in software. Clones share the line.
#[derive(Debug, Clone)]
pub struct SimulatedLine {
    low: Arc<AtomicBool>,
}

impl Default for SimulatedLine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLine {
    /// A released (HIGH) line.
    pub fn new() -> Self {
        Self {
            low: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_low(&self, low: bool) {
        self.low.store(low, Ordering::SeqCst);
    }

    /// Hold the line LOW for `hold`, then release it.
    pub async fn pulse(&self, hold: Duration) {
        self.set_low(true);
        tokio::time::sleep(hold).await;
        self.set_low(false);
    }
}

impl DigitalInput for SimulatedLine {
    fn is_low(&self) -> Result<bool> {
        Ok(self.low.load(Ordering::SeqCst))
    }
}

/// Servo that only logs.
#[derive(Debug, Default)]
pub struct LogActuator;

impl Actuator for LogActuator {
    fn set_angle(&self, degrees: u16) -> Result<()> {
        tracing::info!(degrees, "Servo move");
        Ok(())
    }
}

/// One command received by a [`RecordingActuator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoCommand {
    Angle(u16),
    Release,
}

/// Servo that records every command, optionally failing moves.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    commands: Mutex<Vec<ServoCommand>>,
    fail: bool,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An actuator whose moves all fail, as if the servo daemon were down.
    pub fn broken() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn commands(&self) -> Vec<ServoCommand> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Angles only, in command order.
    pub fn angles(&self) -> Vec<u16> {
        self.commands()
            .into_iter()
            .filter_map(|c| match c {
                ServoCommand::Angle(a) => Some(a),
                ServoCommand::Release => None,
            })
            .collect()
    }

    fn record(&self, command: ServoCommand) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command);
        }
    }
}

impl Actuator for RecordingActuator {
    fn set_angle(&self, degrees: u16) -> Result<()> {
        if self.fail {
            return Err(GateError::HardwareUnavailable("servo not responding".to_string()));
        }
        self.record(ServoCommand::Angle(degrees));
        Ok(())
    }

    fn release(&self) -> Result<()> {
        self.record(ServoCommand::Release);
        Ok(())
    }
}

/// Display that writes each message to the log.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl StatusDisplay for LogDisplay {
    fn show(&self, message: &str) {
        tracing::info!(target: "parkgate::lcd", "LCD: {}", message);
    }
}

/// Display that keeps every message shown.
#[derive(Debug, Default)]
pub struct RecordingDisplay {
    messages: Mutex<Vec<String>>,
}

impl RecordingDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<String> {
        self.messages().pop()
    }
}

impl StatusDisplay for RecordingDisplay {
    fn show(&self, message: &str) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_yields_sent_cards_then_reports_disconnect() {
        let (tx, reader) = ChannelTokenReader::new(4);
        tx.send(TokenId::new("A")).await.unwrap();
        drop(tx);

        assert_eq!(reader.read().await.unwrap(), TokenId::new("A"));
        assert!(matches!(
            reader.read().await,
            Err(GateError::HardwareUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_line_pulse_returns_high() {
        let line = SimulatedLine::new();
        let reader = line.clone();

        let pulse = tokio::spawn(async move { line.pulse(Duration::from_millis(200)).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(reader.is_low().unwrap());

        pulse.await.unwrap();
        assert!(!reader.is_low().unwrap());
    }

    #[test]
    fn recording_actuator_keeps_order() {
        let servo = RecordingActuator::new();
        servo.set_angle(90).unwrap();
        servo.release().unwrap();
        servo.set_angle(0).unwrap();
        assert_eq!(
            servo.commands(),
            vec![
                ServoCommand::Angle(90),
                ServoCommand::Release,
                ServoCommand::Angle(0)
            ]
        );
        assert_eq!(servo.angles(), vec![90, 0]);
    }
}
