//! Canned scenarios exercising the MAC layer over the shared medium

use std::collections::BTreeSet;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use meshmac_core::{Actor, ActorId, Packet, Payload};
use meshmac_radio::RadioError;

use crate::application::{Beacon, Courier, Flood, Sink, REPORT_PREFIX};
use crate::simulation::{Simulation, SimulationReport};
use crate::topology::Topology;
use crate::SimulationConfig;

#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: &'static str,
    pub delivered: usize,
    pub expected: usize,
    pub sim: SimulationReport,
}

impl ScenarioReport {
    pub fn delivery_ratio(&self) -> f64 {
        if self.expected == 0 {
            return 1.0;
        }
        self.delivered as f64 / self.expected as f64
    }

    pub fn is_complete(&self) -> bool {
        self.delivered >= self.expected
    }
}

fn distinct_payloads<'a>(
    packets: impl IntoIterator<Item = &'a Packet>,
) -> BTreeSet<&'a Payload> {
    packets.into_iter().map(|packet| &packet.payload).collect()
}

/// One courier unicasting `messages` distinct payloads to a sink three units away.
pub fn point_to_point(
    config: &SimulationConfig,
    messages: usize,
) -> Result<ScenarioReport, RadioError> {
    let actors = vec![
        Actor::new("A", 0.0, 0.0, 5.0),
        Actor::new("B", 3.0, 0.0, 5.0),
    ];
    let outgoing = (0..messages)
        .map(|i| Packet::unicast("A", "B", format!("msg-{i}")))
        .collect();

    let mut sim = Simulation::new(actors, config)?;
    sim.add_application(Box::new(Courier::new("A", outgoing)))?;
    sim.add_application(Box::new(Sink::new("B")))?;

    let sink = ActorId::from("B");
    let report = sim.run_until(|sim| distinct_payloads(sim.received(&sink)).len() >= messages)?;
    let delivered = distinct_payloads(sim.received(&sink)).len();
    info!("point_to_point: {}/{} delivered in {} ticks", delivered, messages, report.ticks);

    Ok(ScenarioReport {
        name: "point_to_point",
        delivered,
        expected: messages,
        sim: report,
    })
}

/// Two senders out of each other's range, both unicasting to the actor between them.
pub fn hidden_terminal(
    config: &SimulationConfig,
    messages_each: usize,
) -> Result<ScenarioReport, RadioError> {
    let actors = vec![
        Actor::new("A", 0.0, 0.0, 2.0),
        Actor::new("B", 4.0, 0.0, 2.0),
        Actor::new("C", 2.0, 0.0, 2.0),
    ];

    let mut sim = Simulation::new(actors, config)?;
    for sender in ["A", "B"] {
        let outgoing = (0..messages_each)
            .map(|i| Packet::unicast(sender, "C", format!("{sender}-{i}")))
            .collect();
        sim.add_application(Box::new(Courier::new(sender, outgoing)))?;
    }
    sim.add_application(Box::new(Sink::new("C")))?;

    let expected = messages_each * 2;
    let middle = ActorId::from("C");
    let report = sim.run_until(|sim| distinct_payloads(sim.received(&middle)).len() >= expected)?;
    let delivered = distinct_payloads(sim.received(&middle)).len();
    info!(
        "hidden_terminal: {}/{} delivered, {} collisions, {} retransmissions",
        delivered, expected, report.medium.collisions, report.mac.retransmissions
    );

    Ok(ScenarioReport {
        name: "hidden_terminal",
        delivered,
        expected,
        sim: report,
    })
}

/// Every actor on a line beacons every `period` ticks until the tick budget runs out.
///
/// `expected` counts one reception per beacon per in-range neighbour.
pub fn broadcast_storm(
    config: &SimulationConfig,
    nodes: usize,
    period: u64,
) -> Result<ScenarioReport, RadioError> {
    let actors = Topology::line(nodes, 1.0, 1.5);
    let ids: Vec<ActorId> = actors.iter().map(|actor| actor.id.clone()).collect();

    let mut sim = Simulation::new(actors.clone(), config)?;
    for id in &ids {
        sim.add_application(Box::new(Beacon::new(id.clone(), period, format!("beacon-{id}"))))?;
    }
    let report = sim.run()?;

    let mut expected = 0;
    for sender in &actors {
        let reach = sender.radius * sender.radius;
        let neighbours = actors
            .iter()
            .filter(|other| {
                other.id != sender.id && sender.position.distance_squared(&other.position) <= reach
            })
            .count();
        let sent = sim.scheduler().mac(&sender.id)?.stats().transmissions;
        expected += sent as usize * neighbours;
    }
    let delivered = ids.iter().map(|id| sim.received(id).len()).sum();
    info!(
        "broadcast_storm: {}/{} receptions, {} collisions",
        delivered, expected, report.medium.collisions
    );

    Ok(ScenarioReport {
        name: "broadcast_storm",
        delivered,
        expected,
        sim: report,
    })
}

/// Flood a tree over a sparse grid from a sink just outside it and collect one
/// report from every member that can reach the sink.
pub fn convergecast(
    config: &SimulationConfig,
    width: usize,
    height: usize,
    density: f64,
    radius: f64,
) -> Result<ScenarioReport, RadioError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut actors = Topology::grid(width, height, density, radius, &mut rng);
    let sink = ActorId::from("sink");
    actors.push(Actor::new(sink.clone(), width as f64, (height / 2) as f64, radius));

    let expected = Topology::reachable_from(&actors, &sink).len().saturating_sub(1);
    let members: Vec<ActorId> = actors
        .iter()
        .map(|actor| actor.id.clone())
        .filter(|id| id != &sink)
        .collect();

    let mut sim = Simulation::new(actors, config)?;
    sim.add_application(Box::new(Flood::root(sink.clone())))?;
    for id in members {
        sim.add_application(Box::new(Flood::member(id)))?;
    }

    let reports = |sim: &Simulation| {
        sim.received(&sink)
            .iter()
            .filter_map(|packet| match &packet.payload {
                Payload::Data(body) if body.starts_with(REPORT_PREFIX) => Some(body.clone()),
                _ => None,
            })
            .collect::<BTreeSet<_>>()
            .len()
    };
    let report = sim.run_until(|sim| reports(sim) >= expected)?;
    let delivered = reports(&sim);
    info!(
        "convergecast: {}/{} reports at sink after {} ticks",
        delivered, expected, report.ticks
    );

    Ok(ScenarioReport {
        name: "convergecast",
        delivered,
        expected,
        sim: report,
    })
}
