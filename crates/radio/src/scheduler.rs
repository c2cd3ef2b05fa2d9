//! Two-phase tick driver: every MAC layer first, then the medium
//!
//! Within a step each actor senses the medium as it stood after the previous
//! step's medium tick. Transmissions started during the actor phase only become
//! visible once [`TickScheduler::advance_medium`] runs.

use std::collections::BTreeMap;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;

use meshmac_core::{Actor, ActorId, Tick};

use crate::mac::{MacLayer, MacStats};
use crate::medium::Medium;
use crate::{MacConfig, RadioError};

pub struct TickScheduler {
    medium: Medium,
    macs: BTreeMap<ActorId, MacLayer>,
    rng: StdRng,
    tick: Tick,
}

impl TickScheduler {
    /// Register `actors` with a fresh medium and give each one a MAC layer.
    pub fn new(actors: Vec<Actor>, config: MacConfig, seed: u64) -> Result<Self, RadioError> {
        config.validate()?;
        let mut medium = Medium::new();
        let ids: Vec<ActorId> = actors.iter().map(|actor| actor.id.clone()).collect();
        medium.register(actors)?;

        let mut macs = BTreeMap::new();
        for id in ids {
            let mac = MacLayer::new(id.clone(), config.clone())?;
            macs.insert(id, mac);
        }

        debug!("Scheduler created for {} actors (seed {})", macs.len(), seed);
        Ok(Self {
            medium,
            macs,
            rng: StdRng::seed_from_u64(seed),
            tick: 0,
        })
    }

    /// Number of completed steps.
    pub fn tick(&self) -> Tick {
        self.tick
    }

    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    pub fn mac(&self, id: &ActorId) -> Result<&MacLayer, RadioError> {
        self.macs
            .get(id)
            .ok_or_else(|| RadioError::UnknownActor(id.clone()))
    }

    pub fn mac_mut(&mut self, id: &ActorId) -> Result<&mut MacLayer, RadioError> {
        self.macs
            .get_mut(id)
            .ok_or_else(|| RadioError::UnknownActor(id.clone()))
    }

    pub fn macs(&self) -> impl Iterator<Item = &MacLayer> {
        self.macs.values()
    }

    pub fn macs_mut(&mut self) -> impl Iterator<Item = &mut MacLayer> {
        self.macs.values_mut()
    }

    /// Phase one: update every MAC layer in ascending actor-id order.
    pub fn advance_actors(&mut self) -> Result<(), RadioError> {
        for mac in self.macs.values_mut() {
            mac.update(&mut self.medium, &mut self.rng)?;
        }
        Ok(())
    }

    /// Phase two: tick the medium once and close the step.
    pub fn advance_medium(&mut self) {
        self.medium.tick();
        self.tick += 1;
        trace!("Completed tick {}", self.tick);
    }

    pub fn step(&mut self) -> Result<(), RadioError> {
        self.advance_actors()?;
        self.advance_medium();
        Ok(())
    }

    pub fn run_for(&mut self, ticks: u64) -> Result<(), RadioError> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    /// Totals across every MAC layer.
    pub fn mac_stats(&self) -> MacStats {
        self.macs.values().fold(MacStats::default(), |mut total, mac| {
            let stats = mac.stats();
            total.transmissions += stats.transmissions;
            total.retransmissions += stats.retransmissions;
            total.acks_sent += stats.acks_sent;
            total.acks_received += stats.acks_received;
            total.delivered += stats.delivered;
            total.backoffs += stats.backoffs;
            total
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mac::MacState;
    use meshmac_core::Packet;

    fn id(s: &str) -> ActorId {
        ActorId::from(s)
    }

    fn eager() -> MacConfig {
        MacConfig {
            persistence: 1.0,
            ..Default::default()
        }
    }

    fn pair() -> Vec<Actor> {
        vec![
            Actor::new("A", 0.0, 0.0, 5.0),
            Actor::new("B", 3.0, 0.0, 5.0),
        ]
    }

    /// Ticks the medium after every single actor update. This is the wrong
    /// order: transmissions age once per actor instead of once per step.
    fn interleaved_step(scheduler: &mut TickScheduler) {
        let TickScheduler { medium, macs, rng, .. } = scheduler;
        for mac in macs.values_mut() {
            mac.update(medium, &mut *rng).unwrap();
            medium.tick();
        }
    }

    #[test]
    fn test_scheduler_rejects_duplicates_and_bad_config() {
        let actors = vec![
            Actor::new("A", 0.0, 0.0, 1.0),
            Actor::new("A", 1.0, 0.0, 1.0),
        ];
        assert!(matches!(
            TickScheduler::new(actors, MacConfig::default(), 0),
            Err(RadioError::DuplicateActor(_))
        ));

        let config = MacConfig {
            persistence: 2.0,
            ..Default::default()
        };
        assert!(TickScheduler::new(pair(), config, 0).is_err());
    }

    #[test]
    fn test_unicast_delivered_and_acknowledged() {
        let mut scheduler = TickScheduler::new(pair(), eager(), 42).unwrap();
        let packet = Packet::unicast("A", "B", "hello");
        scheduler.mac_mut(&id("A")).unwrap().send(packet.clone()).unwrap();

        scheduler.run_for(4).unwrap();
        assert_eq!(scheduler.mac(&id("B")).unwrap().inbound_len(), 0);
        scheduler.step().unwrap();
        assert_eq!(scheduler.mac(&id("B")).unwrap().inbound_len(), 1);

        scheduler.run_for(5).unwrap();
        let a = scheduler.mac(&id("A")).unwrap();
        assert_eq!(a.state(), MacState::Idle);
        assert_eq!(a.outbound_len(), 0);
        assert_eq!(scheduler.mac_mut(&id("B")).unwrap().receive(), Some(packet));
        assert_eq!(scheduler.tick(), 10);

        let totals = scheduler.mac_stats();
        assert_eq!(totals.transmissions, 2);
        assert_eq!(totals.acks_sent, 1);
        assert_eq!(totals.acks_received, 1);
        assert_eq!(totals.delivered, 1);
    }

    #[test]
    fn test_interleaved_medium_ticks_deliver_too_early() {
        let mut correct = TickScheduler::new(pair(), eager(), 1).unwrap();
        let mut wrong = TickScheduler::new(pair(), eager(), 1).unwrap();
        for scheduler in [&mut correct, &mut wrong] {
            scheduler
                .mac_mut(&id("A"))
                .unwrap()
                .send(Packet::broadcast("A", "beacon"))
                .unwrap();
        }

        for _ in 0..3 {
            correct.step().unwrap();
            interleaved_step(&mut wrong);
        }

        // three ticks of propagation have not elapsed in the two-phase order
        assert_eq!(correct.mac(&id("B")).unwrap().inbound_len(), 0);
        assert_eq!(wrong.mac(&id("B")).unwrap().inbound_len(), 1);

        correct.run_for(2).unwrap();
        assert_eq!(correct.mac(&id("B")).unwrap().inbound_len(), 1);
    }

    #[test]
    fn test_hidden_terminals_collide_at_middle_actor() {
        let actors = vec![
            Actor::new("A", 0.0, 0.0, 2.0),
            Actor::new("B", 4.0, 0.0, 2.0),
            Actor::new("C", 2.0, 0.0, 2.0),
        ];
        let mut scheduler = TickScheduler::new(actors, eager(), 5).unwrap();
        for sender in ["A", "B"] {
            scheduler
                .mac_mut(&id(sender))
                .unwrap()
                .send(Packet::broadcast(sender, "hi"))
                .unwrap();
        }

        scheduler.run_for(12).unwrap();
        assert_eq!(scheduler.mac(&id("C")).unwrap().inbound_len(), 0);
        assert_eq!(scheduler.medium().stats().transmissions, 2);
        assert!(scheduler.medium().stats().collisions >= 2);
    }

    #[test]
    fn test_multicast_eventually_acknowledged_by_all() {
        let actors = vec![
            Actor::new("A", 0.0, 0.0, 5.0),
            Actor::new("B", 3.0, 0.0, 5.0),
            Actor::new("C", 0.0, 3.0, 5.0),
        ];
        let config = MacConfig {
            persistence: 0.5,
            ack_wait: 60,
            ..Default::default()
        };
        let mut scheduler = TickScheduler::new(actors, config, 11).unwrap();
        scheduler
            .mac_mut(&id("A"))
            .unwrap()
            .send(Packet::multicast("A", ["B", "C"], "report"))
            .unwrap();

        for _ in 0..5_000 {
            scheduler.step().unwrap();
            let a = scheduler.mac(&id("A")).unwrap();
            if a.state() == MacState::Idle && a.outbound_len() == 0 {
                break;
            }
        }

        let a = scheduler.mac(&id("A")).unwrap();
        assert_eq!(a.state(), MacState::Idle);
        assert_eq!(a.outbound_len(), 0);
        assert!(a.stats().acks_received >= 2);
        assert!(scheduler.mac(&id("B")).unwrap().inbound_len() >= 1);
        assert!(scheduler.mac(&id("C")).unwrap().inbound_len() >= 1);
    }

    #[test]
    fn test_unknown_mac_lookup() {
        let scheduler = TickScheduler::new(pair(), MacConfig::default(), 0).unwrap();
        assert!(matches!(scheduler.mac(&id("Z")), Err(RadioError::UnknownActor(_))));
    }
}
