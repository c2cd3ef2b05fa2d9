//! simulation tools for meshmac

pub mod application;
pub mod scenarios;
pub mod simulation;
pub mod topology;

use serde::{Deserialize, Serialize};

use meshmac_core::Tick;
use meshmac_radio::MacConfig;

pub use application::{Application, Beacon, Courier, Flood, Sink};
pub use scenarios::ScenarioReport;
pub use simulation::{Simulation, SimulationReport};
pub use topology::Topology;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub mac: MacConfig,
    pub seed: u64,
    pub max_ticks: Tick,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            mac: MacConfig::default(),
            seed: 0,
            max_ticks: 20_000,
        }
    }
}

pub struct SimulationPresets;

impl SimulationPresets {
    pub fn standard() -> MacConfig {
        MacConfig::default()
    }

    pub fn eager() -> MacConfig {
        MacConfig {
            contention_window: 3,
            ack_wait: 200,
            persistence: 0.2,
        }
    }

    pub fn impatient() -> MacConfig {
        MacConfig {
            contention_window: 3,
            ack_wait: 40,
            persistence: 0.05,
        }
    }

    pub fn congested() -> MacConfig {
        MacConfig {
            contention_window: 7,
            ack_wait: 400,
            persistence: 0.02,
        }
    }

    pub fn all() -> Vec<(&'static str, MacConfig)> {
        vec![
            ("Standard", Self::standard()),
            ("Eager", Self::eager()),
            ("Impatient", Self::impatient()),
            ("Congested", Self::congested()),
        ]
    }
}
