//! Shared half-duplex channel with range-based visibility and sticky collisions
//!
//! The medium keeps three tables: registered actors, in-flight transmissions,
//! and per-actor visibility records. [`Medium::tick`] runs once per simulation
//! step, after every actor has sensed and possibly transmitted, and makes three
//! passes over those tables:
//!
//! 1. record which transmissions have come into range of which actors,
//! 2. mark every record of an actor that sees more than one transmission as collided,
//! 3. age transmissions and retire the ones whose countdown reaches zero.
//!
//! A listener only learns about a transmission on its final tick, and only if it
//! never overlapped with another transmission at that listener.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use log::{debug, trace};

use meshmac_core::{Actor, ActorId, Packet, Position, TransmissionId};

use crate::RadioError;

/// Countdown assigned to a new transmission. One tick is consumed by the medium
/// update that first records it, leaving three ticks of propagation.
pub const TRANSMISSION_LIFETIME: u32 = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub id: TransmissionId,
    pub sender_id: ActorId,
    /// Sender position captured at creation.
    pub origin: Position,
    /// Sender radius captured at creation.
    pub radius: f64,
    pub packet: Packet,
    pub countdown: u32,
}

impl Transmission {
    pub fn reaches(&self, position: &Position) -> bool {
        self.origin.distance_squared(position) <= self.radius * self.radius
    }
}

/// Record that an actor is within range of a transmission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Visibility {
    /// Once set, stays set until the transmission is retired.
    pub collision: bool,
}

/// Outcome of listening to the channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Sense {
    Clear,
    Busy,
    Packet(Packet),
}

impl Sense {
    pub fn is_clear(&self) -> bool {
        matches!(self, Sense::Clear)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MediumStats {
    pub transmissions: u64,
    pub retired: u64,
    pub collisions: u64,
}

#[derive(Debug, Default)]
pub struct Medium {
    actors: BTreeMap<ActorId, Actor>,
    transmissions: BTreeMap<TransmissionId, Transmission>,
    visibility: BTreeMap<ActorId, BTreeMap<TransmissionId, Visibility>>,
    next_transmission_id: TransmissionId,
    stats: MediumStats,
}

impl Medium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the actors sharing this medium. Ids must be unique, across
    /// this call and any earlier one; nothing is registered on failure.
    pub fn register<I>(&mut self, actors: I) -> Result<(), RadioError>
    where
        I: IntoIterator<Item = Actor>,
    {
        let mut batch: BTreeMap<ActorId, Actor> = BTreeMap::new();
        for actor in actors {
            if self.actors.contains_key(&actor.id) || batch.contains_key(&actor.id) {
                return Err(RadioError::DuplicateActor(actor.id));
            }
            batch.insert(actor.id.clone(), actor);
        }

        debug!("Registering {} actors with the medium", batch.len());
        for (id, actor) in batch {
            self.visibility.insert(id.clone(), BTreeMap::new());
            self.actors.insert(id, actor);
        }
        Ok(())
    }

    pub fn actor(&self, id: &ActorId) -> Result<&Actor, RadioError> {
        self.actors
            .get(id)
            .ok_or_else(|| RadioError::UnknownActor(id.clone()))
    }

    pub fn actors(&self) -> impl Iterator<Item = &Actor> {
        self.actors.values()
    }

    pub fn transmission(&self, id: TransmissionId) -> Result<&Transmission, RadioError> {
        self.transmissions
            .get(&id)
            .ok_or(RadioError::UnknownTransmission(id))
    }

    pub fn transmissions(&self) -> impl Iterator<Item = &Transmission> {
        self.transmissions.values()
    }

    pub fn visibility(
        &self,
        transmission_id: TransmissionId,
        actor_id: &ActorId,
    ) -> Option<Visibility> {
        self.visibility
            .get(actor_id)
            .and_then(|pairs| pairs.get(&transmission_id))
            .copied()
    }

    pub fn visible_to(&self, actor_id: &ActorId) -> Vec<(TransmissionId, Visibility)> {
        self.visibility
            .get(actor_id)
            .map(|pairs| pairs.iter().map(|(id, v)| (*id, *v)).collect())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> MediumStats {
        self.stats
    }

    /// Start propagating `packet` from `sender_id`'s current position.
    pub fn transmit(
        &mut self,
        sender_id: &ActorId,
        packet: Packet,
    ) -> Result<TransmissionId, RadioError> {
        let sender = self.actor(sender_id)?;
        let id = self.next_transmission_id;
        let transmission = Transmission {
            id,
            sender_id: sender.id.clone(),
            origin: sender.position,
            radius: sender.radius,
            packet,
            countdown: TRANSMISSION_LIFETIME,
        };

        trace!(
            "Transmission {} from {} ({} to {:?})",
            id,
            sender_id,
            transmission.packet.mode,
            transmission.packet.receiver_ids
        );
        self.transmissions.insert(id, transmission);
        self.next_transmission_id += 1;
        self.stats.transmissions += 1;
        Ok(id)
    }

    /// Advance the medium by one step. Call exactly once per step, after all actors.
    pub fn tick(&mut self) {
        self.record_visibility();
        self.record_collisions();
        self.age_transmissions();
    }

    fn record_visibility(&mut self) {
        for transmission in self.transmissions.values() {
            for actor in self.actors.values() {
                if !transmission.reaches(&actor.position) {
                    continue;
                }
                let Some(pairs) = self.visibility.get_mut(&actor.id) else {
                    continue;
                };
                if let Entry::Vacant(slot) = pairs.entry(transmission.id) {
                    trace!("Transmission {} now visible to {}", transmission.id, actor.id);
                    slot.insert(Visibility::default());
                }
            }
        }
    }

    fn record_collisions(&mut self) {
        for (actor_id, pairs) in self.visibility.iter_mut() {
            if pairs.len() < 2 {
                continue;
            }
            for (transmission_id, visibility) in pairs.iter_mut() {
                if !visibility.collision {
                    debug!("Collision at {} involving transmission {}", actor_id, transmission_id);
                    visibility.collision = true;
                    self.stats.collisions += 1;
                }
            }
        }
    }

    fn age_transmissions(&mut self) {
        let visibility = &mut self.visibility;
        let stats = &mut self.stats;
        self.transmissions.retain(|id, transmission| {
            transmission.countdown -= 1;
            if transmission.countdown > 0 {
                return true;
            }
            for pairs in visibility.values_mut() {
                pairs.remove(id);
            }
            stats.retired += 1;
            trace!("Transmission {} retired", id);
            false
        });
    }

    /// Listen to the channel at `actor_id`.
    ///
    /// Returns the packet only when exactly one uncollided transmission is in
    /// range and it is on its final tick; anything else in range reads as busy.
    pub fn sense(&self, actor_id: &ActorId) -> Result<Sense, RadioError> {
        let pairs = self
            .visibility
            .get(actor_id)
            .ok_or_else(|| RadioError::UnknownActor(actor_id.clone()))?;

        let mut in_range = pairs.iter();
        let (transmission_id, visibility) = match (in_range.next(), in_range.next()) {
            (None, _) => return Ok(Sense::Clear),
            (Some(_), Some(_)) => return Ok(Sense::Busy),
            (Some(pair), None) => pair,
        };
        if visibility.collision {
            return Ok(Sense::Busy);
        }

        let transmission = self.transmission(*transmission_id)?;
        if transmission.countdown == 1 {
            Ok(Sense::Packet(transmission.packet.clone()))
        } else {
            Ok(Sense::Busy)
        }
    }
}
