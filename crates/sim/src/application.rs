//! Applications that drive MAC layers from above
//!
//! An application gets one call per tick, before the scheduler updates the MAC
//! layers, and may queue packets or drain deliveries.

use std::collections::VecDeque;

use log::{debug, info, warn};

use meshmac_core::{ActorId, Mode, Packet, Payload, Tick};
use meshmac_radio::{MacLayer, RadioError};

/// Payload a [`Flood`] root broadcasts to recruit children.
pub const JOIN: &str = "JOIN";
/// Prefix of the report every [`Flood`] member sends toward the root.
pub const REPORT_PREFIX: &str = "DATA,";

pub trait Application {
    fn actor_id(&self) -> &ActorId;

    fn on_tick(&mut self, tick: Tick, mac: &mut MacLayer) -> Result<(), RadioError>;

    /// Everything delivered to this application so far, oldest first.
    fn received(&self) -> &[Packet];
}

fn drain(mac: &mut MacLayer, into: &mut Vec<Packet>) {
    while let Some(packet) = mac.receive() {
        into.push(packet);
    }
}

/// Broadcasts a payload every `period` ticks.
pub struct Beacon {
    id: ActorId,
    period: Tick,
    payload: String,
    received: Vec<Packet>,
}

impl Beacon {
    pub fn new(id: impl Into<ActorId>, period: Tick, payload: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            period: period.max(1),
            payload: payload.into(),
            received: Vec::new(),
        }
    }
}

impl Application for Beacon {
    fn actor_id(&self) -> &ActorId {
        &self.id
    }

    fn on_tick(&mut self, tick: Tick, mac: &mut MacLayer) -> Result<(), RadioError> {
        drain(mac, &mut self.received);
        if tick % self.period == 0 {
            mac.send(Packet::broadcast(self.id.clone(), self.payload.as_str()))?;
        }
        Ok(())
    }

    fn received(&self) -> &[Packet] {
        &self.received
    }
}

/// Hands a fixed list of packets to its MAC layer on the first tick. Packets
/// the MAC layer rejects are logged and dropped.
pub struct Courier {
    id: ActorId,
    outgoing: VecDeque<Packet>,
    received: Vec<Packet>,
}

impl Courier {
    pub fn new(id: impl Into<ActorId>, outgoing: Vec<Packet>) -> Self {
        Self {
            id: id.into(),
            outgoing: outgoing.into(),
            received: Vec::new(),
        }
    }
}

impl Application for Courier {
    fn actor_id(&self) -> &ActorId {
        &self.id
    }

    fn on_tick(&mut self, _tick: Tick, mac: &mut MacLayer) -> Result<(), RadioError> {
        drain(mac, &mut self.received);
        while let Some(packet) = self.outgoing.pop_front() {
            if let Err(err) = mac.send(packet) {
                warn!("{} dropped an outgoing packet: {}", self.id, err);
            }
        }
        Ok(())
    }

    fn received(&self) -> &[Packet] {
        &self.received
    }
}

/// Only listens.
pub struct Sink {
    id: ActorId,
    received: Vec<Packet>,
}

impl Sink {
    pub fn new(id: impl Into<ActorId>) -> Self {
        Self {
            id: id.into(),
            received: Vec::new(),
        }
    }
}

impl Application for Sink {
    fn actor_id(&self) -> &ActorId {
        &self.id
    }

    fn on_tick(&mut self, _tick: Tick, mac: &mut MacLayer) -> Result<(), RadioError> {
        drain(mac, &mut self.received);
        Ok(())
    }

    fn received(&self) -> &[Packet] {
        &self.received
    }
}

/// Convergecast over a spanning tree grown by flooding.
///
/// The root broadcasts [`JOIN`]. Any member without a parent adopts the first
/// JOIN sender as its parent, re-broadcasts JOIN once and unicasts its own
/// report to the parent. Reports arriving from children are forwarded upward.
pub struct Flood {
    id: ActorId,
    is_root: bool,
    parent: Option<ActorId>,
    started: bool,
    forwarded: usize,
    received: Vec<Packet>,
}

impl Flood {
    pub fn root(id: impl Into<ActorId>) -> Self {
        Self::new(id.into(), true)
    }

    pub fn member(id: impl Into<ActorId>) -> Self {
        Self::new(id.into(), false)
    }

    fn new(id: ActorId, is_root: bool) -> Self {
        Self {
            id,
            is_root,
            parent: None,
            started: false,
            forwarded: 0,
            received: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<&ActorId> {
        self.parent.as_ref()
    }

    pub fn forwarded(&self) -> usize {
        self.forwarded
    }

    fn handle(&mut self, packet: &Packet, mac: &mut MacLayer) -> Result<(), RadioError> {
        let Payload::Data(body) = &packet.payload else {
            return Ok(());
        };

        match packet.mode {
            Mode::Broadcast if body == JOIN => {
                if self.is_root || self.parent.is_some() {
                    return Ok(());
                }
                debug!("{} joined under {}", self.id, packet.sender_id);
                self.parent = Some(packet.sender_id.clone());
                mac.send(Packet::broadcast(self.id.clone(), JOIN))?;
                let report = format!("{}{}", REPORT_PREFIX, self.id);
                mac.send(Packet::unicast(self.id.clone(), packet.sender_id.clone(), report))?;
            }
            Mode::Unicast if body.starts_with(REPORT_PREFIX) => {
                if self.is_root {
                    info!("root {} collected {}", self.id, body);
                } else if let Some(parent) = &self.parent {
                    mac.send(Packet::unicast(self.id.clone(), parent.clone(), body.as_str()))?;
                    self.forwarded += 1;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Application for Flood {
    fn actor_id(&self) -> &ActorId {
        &self.id
    }

    fn on_tick(&mut self, _tick: Tick, mac: &mut MacLayer) -> Result<(), RadioError> {
        if self.is_root && !self.started {
            self.started = true;
            mac.send(Packet::broadcast(self.id.clone(), JOIN))?;
        }
        while let Some(packet) = mac.receive() {
            self.handle(&packet, mac)?;
            self.received.push(packet);
        }
        Ok(())
    }

    fn received(&self) -> &[Packet] {
        &self.received
    }
}
