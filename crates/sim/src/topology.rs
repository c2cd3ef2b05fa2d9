//! Actor layouts for simulations

use std::collections::{BTreeSet, VecDeque};

use rand::Rng;

use meshmac_core::{Actor, ActorId};

pub struct Topology;

impl Topology {
    /// `count` actors on the x axis, `spacing` apart, ids `n0`, `n1`, ...
    pub fn line(count: usize, spacing: f64, radius: f64) -> Vec<Actor> {
        (0..count)
            .map(|i| Actor::new(format!("n{i}"), i as f64 * spacing, 0.0, radius))
            .collect()
    }

    /// Grid points `(i, j)` each occupied with probability `density`, ids `i_j`.
    pub fn grid<R: Rng>(
        width: usize,
        height: usize,
        density: f64,
        radius: f64,
        rng: &mut R,
    ) -> Vec<Actor> {
        let mut actors = Vec::new();
        for i in 0..width {
            for j in 0..height {
                if rng.random::<f64>() < density {
                    actors.push(Actor::new(format!("{i}_{j}"), i as f64, j as f64, radius));
                }
            }
        }
        actors
    }

    /// Actors reachable from `origin` over links where each end is within the
    /// other's radius. Includes `origin` itself when present.
    pub fn reachable_from(actors: &[Actor], origin: &ActorId) -> BTreeSet<ActorId> {
        let links = |a: &Actor, b: &Actor| {
            let d2 = a.position.distance_squared(&b.position);
            d2 <= a.radius * a.radius && d2 <= b.radius * b.radius
        };

        let mut seen = BTreeSet::new();
        let Some(start) = actors.iter().find(|actor| &actor.id == origin) else {
            return seen;
        };
        seen.insert(start.id.clone());
        let mut frontier = VecDeque::from([start]);
        while let Some(current) = frontier.pop_front() {
            for next in actors {
                if !seen.contains(&next.id) && links(current, next) {
                    seen.insert(next.id.clone());
                    frontier.push_back(next);
                }
            }
        }
        seen
    }
}
