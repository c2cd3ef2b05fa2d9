//! p-persistent CSMA with random backoff and ACK-driven retransmission
//!
//! Each actor owns one [`MacLayer`]. The application enqueues packets with
//! [`MacLayer::send`] and collects deliveries with [`MacLayer::receive`]; the
//! driver calls [`MacLayer::update`] once per tick, before the medium ticks.
//!
//! Queues are double ended: ordinary traffic is pushed at the front and consumed
//! from the back, so it leaves in FIFO order. ACK replies are pushed directly at
//! the back and go out next.

use std::collections::VecDeque;

use log::{debug, trace};
use rand::Rng;
use serde_json::Value;

use meshmac_core::{ActorId, Packet};

use crate::medium::{Medium, Sense};
use crate::{MacConfig, RadioError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacState {
    /// Nothing queued.
    Idle,
    /// The packet at the back of the outbound queue is waiting for the channel.
    Pending,
    /// Transmitted; counting down while ACKs come in.
    WaitingForAck,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MacStats {
    pub transmissions: u64,
    pub retransmissions: u64,
    pub acks_sent: u64,
    pub acks_received: u64,
    pub delivered: u64,
    pub backoffs: u64,
}

#[derive(Debug, Clone)]
struct Outbound {
    seq: u64,
    packet: Packet,
}

#[derive(Debug)]
pub struct MacLayer {
    actor_id: ActorId,
    config: MacConfig,
    state: MacState,
    outbound: VecDeque<Outbound>,
    inbound: VecDeque<Packet>,
    incoming_ack: Option<Packet>,
    backoff: u32,
    ack_wait_counter: u32,
    expected_acks: Vec<ActorId>,
    in_flight: Option<u64>,
    next_seq: u64,
    stats: MacStats,
}

impl MacLayer {
    pub fn new(actor_id: impl Into<ActorId>, config: MacConfig) -> Result<Self, RadioError> {
        config.validate()?;
        Ok(Self {
            actor_id: actor_id.into(),
            config,
            state: MacState::Idle,
            outbound: VecDeque::new(),
            inbound: VecDeque::new(),
            incoming_ack: None,
            backoff: 0,
            ack_wait_counter: 0,
            expected_acks: Vec::new(),
            in_flight: None,
            next_seq: 0,
            stats: MacStats::default(),
        })
    }

    pub fn actor_id(&self) -> &ActorId {
        &self.actor_id
    }

    pub fn config(&self) -> &MacConfig {
        &self.config
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    pub fn stats(&self) -> MacStats {
        self.stats
    }

    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// The packet that will be transmitted next, with its queue sequence number.
    pub fn next_outbound(&self) -> Option<(u64, &Packet)> {
        self.outbound.back().map(|entry| (entry.seq, &entry.packet))
    }

    pub fn backoff(&self) -> u32 {
        self.backoff
    }

    pub fn ack_wait_counter(&self) -> u32 {
        self.ack_wait_counter
    }

    pub fn expected_acks(&self) -> &[ActorId] {
        &self.expected_acks
    }

    /// Validate and queue a packet for transmission.
    pub fn send(&mut self, packet: Packet) -> Result<(), RadioError> {
        packet.validate()?;
        let seq = self.take_seq();
        trace!("{} queued packet {} ({})", self.actor_id, seq, packet.mode);
        self.outbound.push_front(Outbound { seq, packet });
        Ok(())
    }

    /// Parse a loosely-typed packet record and queue it.
    pub fn send_raw(&mut self, record: Value) -> Result<(), RadioError> {
        let packet = Packet::try_from(record)?;
        self.send(packet)
    }

    /// Oldest delivered application packet, if any.
    pub fn receive(&mut self) -> Option<Packet> {
        self.inbound.pop_back()
    }

    /// Run one tick: handle whatever the medium delivers, then step the state machine.
    pub fn update<R>(&mut self, medium: &mut Medium, rng: &mut R) -> Result<(), RadioError>
    where
        R: Rng,
    {
        self.handle_incoming(medium)?;
        match self.state {
            MacState::Idle => {
                if !self.outbound.is_empty() {
                    self.state = MacState::Pending;
                }
            }
            MacState::Pending => self.outgoing_pending(medium, rng)?,
            MacState::WaitingForAck => self.waiting_for_ack(),
        }
        Ok(())
    }

    fn take_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn enqueue_priority(&mut self, packet: Packet) {
        let seq = self.take_seq();
        self.outbound.push_back(Outbound { seq, packet });
    }

    fn handle_incoming(&mut self, medium: &Medium) -> Result<(), RadioError> {
        let Sense::Packet(packet) = medium.sense(&self.actor_id)? else {
            return Ok(());
        };
        if !packet.is_addressed_to(&self.actor_id) {
            return Ok(());
        }

        if packet.is_ack() {
            trace!("{} heard ACK from {}", self.actor_id, packet.sender_id);
            self.incoming_ack = Some(packet);
            return Ok(());
        }

        if packet.requires_ack() {
            self.enqueue_priority(Packet::ack(self.actor_id.clone(), packet.sender_id.clone()));
        }
        trace!("{} received {} packet from {}", self.actor_id, packet.mode, packet.sender_id);
        self.stats.delivered += 1;
        self.inbound.push_front(packet);
        Ok(())
    }

    fn outgoing_pending<R>(&mut self, medium: &mut Medium, rng: &mut R) -> Result<(), RadioError>
    where
        R: Rng,
    {
        if self.backoff > 0 {
            self.backoff -= 1;
            return Ok(());
        }

        if !medium.sense(&self.actor_id)?.is_clear() {
            self.backoff = rng.random_range(0..=self.config.contention_window);
            self.stats.backoffs += 1;
            trace!("{} found the channel busy, backing off {}", self.actor_id, self.backoff);
            return Ok(());
        }

        if rng.random::<f64>() >= self.config.persistence {
            return Ok(());
        }

        let Some((seq, packet)) = self
            .outbound
            .back()
            .map(|entry| (entry.seq, entry.packet.clone()))
        else {
            self.state = MacState::Idle;
            return Ok(());
        };

        let requires_ack = packet.requires_ack();
        let is_ack = packet.is_ack();
        let mut receivers = packet.receiver_ids.clone();
        receivers.sort();
        receivers.dedup();
        let transmission = medium.transmit(&self.actor_id, packet)?;
        self.stats.transmissions += 1;

        if requires_ack {
            debug!(
                "{} sent packet {} as transmission {}, awaiting ACKs from {:?}",
                self.actor_id, seq, transmission, receivers
            );
            self.expected_acks = receivers;
            self.ack_wait_counter = self.config.ack_wait;
            self.in_flight = Some(seq);
            self.state = MacState::WaitingForAck;
        } else {
            if is_ack {
                self.stats.acks_sent += 1;
            }
            self.outbound.pop_back();
            self.state = if self.outbound.is_empty() {
                MacState::Idle
            } else {
                MacState::Pending
            };
        }
        Ok(())
    }

    fn waiting_for_ack(&mut self) {
        if !self.expected_acks.is_empty() && self.ack_wait_counter > 0 {
            let matched = self.incoming_ack.as_ref().and_then(|ack| {
                self.expected_acks
                    .iter()
                    .position(|id| *id == ack.sender_id)
            });
            if let Some(index) = matched {
                let from = self.expected_acks.remove(index);
                trace!("{} got ACK from {}", self.actor_id, from);
                self.incoming_ack = None;
                self.stats.acks_received += 1;
            }
            self.ack_wait_counter -= 1;
        } else if !self.expected_acks.is_empty() {
            // no retry cap: the packet stays queued until every ACK arrives
            debug!(
                "{} timed out waiting for ACKs from {:?}, retransmitting",
                self.actor_id, self.expected_acks
            );
            self.expected_acks.clear();
            self.in_flight = None;
            self.stats.retransmissions += 1;
            self.state = MacState::Pending;
        } else {
            self.ack_wait_counter = 0;
            if let Some(seq) = self.in_flight.take() {
                self.outbound.retain(|entry| entry.seq != seq);
                debug!("{} delivered packet {}", self.actor_id, seq);
            }
            self.state = if self.outbound.is_empty() {
                MacState::Idle
            } else {
                MacState::Pending
            };
        }
    }
}
