//! parkgate: RFID parking gate controller.
//!
//! Registered cards are admitted while slots remain, subject to a quota that
//! holds capacity for reserved cards. Four input loops (entry sensor, exit
//! sensor, add button, remove button) and a small HTTP API share one
//! [`GateService`].

pub mod config;
pub mod console;
pub mod devices;
pub mod engine;
pub mod error;
pub mod event_loop;
pub mod gate;
pub mod registration;
pub mod scanner;
pub mod service;
pub mod slots;
pub mod state;
pub mod store;
pub mod token;
pub mod transport;

pub use config::GateConfig;
pub use engine::{AuthorizationEngine, EntryOutcome, ExitOutcome};
pub use error::{GateError, Result};
pub use event_loop::{EventLoops, LoopKind, Triggers};
pub use gate::{Gate, GateTiming};
pub use registration::{RegistrationManager, RegistrationOutcome};
pub use service::{Devices, GateService, OccupancySnapshot};
pub use slots::{SlotIndex, SlotPool};
pub use state::{ParkingState, SharedState};
pub use store::{JsonFileStorage, MemoryStorage, TokenSnapshot, TokenStorage, TokenStore};
pub use token::TokenId;
