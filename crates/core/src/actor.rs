use serde::{Deserialize, Serialize};

use crate::types::ActorId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// A stationary participant on the shared medium.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub position: Position,
    /// Detection radius; transmissions from this actor reach anything within it.
    pub radius: f64,
}

impl Actor {
    pub fn new(id: impl Into<ActorId>, x: f64, y: f64, radius: f64) -> Self {
        Self {
            id: id.into(),
            position: Position::new(x, y),
            radius,
        }
    }
}
