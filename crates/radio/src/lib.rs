//! shared-medium model and CSMA MAC layer for meshmac

use serde::{Deserialize, Serialize};
use thiserror::Error;

use meshmac_core::{ActorId, PacketError, TransmissionId};

pub mod mac;
pub mod medium;
pub mod scheduler;

pub use mac::{MacLayer, MacState, MacStats};
pub use medium::{Medium, MediumStats, Sense, Transmission, Visibility, TRANSMISSION_LIFETIME};
pub use scheduler::TickScheduler;

#[derive(Debug, Error)]
pub enum RadioError {
    #[error("Unknown actor: {0}")]
    UnknownActor(ActorId),

    #[error("Actor registered more than once: {0}")]
    DuplicateActor(ActorId),

    #[error("Unknown transmission: {0}")]
    UnknownTransmission(TransmissionId),

    #[error("Invalid packet: {0}")]
    InvalidPacket(#[from] PacketError),

    #[error("Invalid MAC configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacConfig {
    /// Upper bound (inclusive) of the uniform backoff drawn when the channel is busy.
    pub contention_window: u32,
    /// Ticks to wait for outstanding ACKs before retransmitting.
    pub ack_wait: u32,
    /// The `p` of p-persistent CSMA.
    pub persistence: f64,
}

impl MacConfig {
    pub fn validate(&self) -> Result<(), RadioError> {
        if !(0.0..=1.0).contains(&self.persistence) {
            return Err(RadioError::InvalidConfig(format!(
                "persistence {} outside [0, 1]",
                self.persistence
            )));
        }
        Ok(())
    }
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            contention_window: 3,
            ack_wait: 200,
            persistence: 0.05,
        }
    }
}
