//! Line-oriented bench console for running the controller without hardware.
//!
//! Each command pulses a simulated input line or presents a card:
//!
//! ```text
//! scan 12345   present card 12345 to the reader
//! entry        vehicle at the entry sensor
//! exit         vehicle at the exit sensor
//! add          press the register button
//! remove       press the remove button
//! status       print lot occupancy
//! quit         shut the controller down
//! ```

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

use crate::config::InputConfig;
use crate::devices::{PolledTrigger, Trigger};
use crate::devices::sim::SimulatedLine;
use crate::event_loop::Triggers;
use crate::service::GateService;
use crate::token::TokenId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Scan(TokenId),
    Entry,
    Exit,
    Add,
    Remove,
    Status,
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),
    #[error("scan needs a card id")]
    MissingCard,
}

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_ascii_lowercase();
        match verb.as_str() {
            "scan" | "card" => words
                .next()
                .and_then(TokenId::parse)
                .map(Command::Scan)
                .ok_or(ParseCommandError::MissingCard),
            "entry" | "in" => Ok(Command::Entry),
            "exit" | "out" => Ok(Command::Exit),
            "add" => Ok(Command::Add),
            "remove" | "rm" => Ok(Command::Remove),
            "status" => Ok(Command::Status),
            "help" | "?" => Ok(Command::Help),
            "quit" | "q" => Ok(Command::Quit),
            _ => Err(ParseCommandError::Unknown(verb)),
        }
    }
}

/// Simulated inputs and reader feed for the bench.
pub struct SimBench {
    entry: SimulatedLine,
    exit: SimulatedLine,
    add: SimulatedLine,
    remove: SimulatedLine,
    cards: mpsc::Sender<TokenId>,
    pulse: Duration,
}

impl SimBench {
    pub fn new(cards: mpsc::Sender<TokenId>, inputs: &InputConfig) -> Self {
        Self {
            entry: SimulatedLine::new(),
            exit: SimulatedLine::new(),
            add: SimulatedLine::new(),
            remove: SimulatedLine::new(),
            cards,
            // Long enough for the poller to see the line LOW through debounce.
            pulse: inputs.poll_interval() * 2 + inputs.debounce() * 2,
        }
    }

    /// Edge triggers polling the bench's lines.
    pub fn triggers(&self, inputs: &InputConfig) -> Triggers {
        let poll = |line: &SimulatedLine| -> Box<dyn Trigger> {
            Box::new(PolledTrigger::new(
                line.clone(),
                inputs.poll_interval(),
                inputs.debounce(),
            ))
        };
        Triggers {
            entry: poll(&self.entry),
            exit: poll(&self.exit),
            add: poll(&self.add),
            remove: poll(&self.remove),
        }
    }

    /// Apply one command. Returns `false` once the console should stop.
    pub async fn apply(&self, command: Command, service: &GateService) -> bool {
        match command {
            Command::Scan(id) => {
                if self.cards.send(id).await.is_err() {
                    tracing::warn!("Card reader is gone");
                }
            }
            Command::Entry => self.entry.pulse(self.pulse).await,
            Command::Exit => self.exit.pulse(self.pulse).await,
            Command::Add => self.add.pulse(self.pulse).await,
            Command::Remove => self.remove.pulse(self.pulse).await,
            Command::Status => {
                let o = service.occupancy();
                println!(
                    "available {}/{}  reserved parked {}/{}  registered {}",
                    o.available, o.capacity, o.reserved_in_use, o.reserved, o.registered
                );
            }
            Command::Help => println!("commands: scan <id>, entry, exit, add, remove, status, quit"),
            Command::Quit => {
                service.trigger_shutdown();
                return false;
            }
        }
        true
    }
}

/// Read commands until `quit`, end of input, or shutdown.
///
/// The bench (and with it the reader channel) stays alive until shutdown so
/// that closing stdin does not look like a reader fault.
pub async fn run_console<R>(input: R, bench: SimBench, service: Arc<GateService>)
where
    R: AsyncBufRead + Unpin,
{
    let shutdown = service.shutdown_token();
    let mut lines = input.lines();

    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return,
            line = lines.next_line() => line,
        };

        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match line.parse::<Command>() {
                Ok(command) => {
                    if !bench.apply(command, &service).await {
                        return;
                    }
                }
                Err(e) => println!("{e}"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Console input failed");
                break;
            }
        }
    }

    tracing::info!("Console input closed; running until shutdown");
    shutdown.cancelled().await;
}
