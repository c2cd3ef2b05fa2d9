//! Simulation driver: applications, then MAC layers, then the medium

use std::collections::BTreeMap;

use log::{debug, info};

use meshmac_core::{Actor, ActorId, Packet, Tick};
use meshmac_radio::{MacStats, MediumStats, RadioError, TickScheduler};

use crate::application::Application;
use crate::SimulationConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub ticks: Tick,
    pub medium: MediumStats,
    pub mac: MacStats,
}

pub struct Simulation {
    scheduler: TickScheduler,
    apps: BTreeMap<ActorId, Box<dyn Application>>,
    max_ticks: Tick,
}

impl Simulation {
    pub fn new(actors: Vec<Actor>, config: &SimulationConfig) -> Result<Self, RadioError> {
        let scheduler = TickScheduler::new(actors, config.mac.clone(), config.seed)?;
        Ok(Self {
            scheduler,
            apps: BTreeMap::new(),
            max_ticks: config.max_ticks,
        })
    }

    /// Attach an application to the actor it names. Replaces any previous one.
    pub fn add_application(&mut self, app: Box<dyn Application>) -> Result<(), RadioError> {
        let id = app.actor_id().clone();
        self.scheduler.mac(&id)?;
        self.apps.insert(id, app);
        Ok(())
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn tick(&self) -> Tick {
        self.scheduler.tick()
    }

    pub fn received(&self, id: &ActorId) -> &[Packet] {
        self.apps.get(id).map(|app| app.received()).unwrap_or(&[])
    }

    pub fn step(&mut self) -> Result<(), RadioError> {
        let tick = self.scheduler.tick();
        for (id, app) in self.apps.iter_mut() {
            let mac = self.scheduler.mac_mut(id)?;
            app.on_tick(tick, mac)?;
        }
        self.scheduler.step()
    }

    /// Step until `done` holds or the tick budget runs out.
    pub fn run_until<F>(&mut self, mut done: F) -> Result<SimulationReport, RadioError>
    where
        F: FnMut(&Simulation) -> bool,
    {
        while self.tick() < self.max_ticks {
            if done(self) {
                info!("Simulation finished after {} ticks", self.tick());
                return Ok(self.report());
            }
            self.step()?;
        }
        debug!("Simulation hit the {} tick budget", self.max_ticks);
        Ok(self.report())
    }

    pub fn run(&mut self) -> Result<SimulationReport, RadioError> {
        self.run_until(|_| false)
    }

    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            ticks: self.tick(),
            medium: self.scheduler.medium().stats(),
            mac: self.scheduler.mac_stats(),
        }
    }
}
