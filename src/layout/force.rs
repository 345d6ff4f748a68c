//! Tick-driven force simulation.
//!
//! Bodies live in an arena indexed by position, with an id → index map for
//! drag handlers. A body whose `pin` is set ignores every force and sits at
//! the pin; handlers write pins between ticks so the next tick sees them.

use std::collections::HashMap;
use std::f32::consts::PI;

use crate::config::{ForceConfig, Viewport};
use crate::graph::EnrichedGraph;
use crate::ir::GraphData;

/// Strength of the collision push, applied to the overlap each tick.
const COLLIDE_STRENGTH: f32 = 0.7;
/// Initial spiral radius for unplaced bodies.
const SEED_RADIUS: f32 = 10.0;
/// Distance at which a new body is placed from its anchoring neighbour.
const NEIGHBOR_SEED_OFFSET: f32 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationState {
    Released,
    Simulating,
    Settled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub vx: f32,
    pub vy: f32,
    pub radius: f32,
    pub pin: Option<(f32, f32)>,
}

impl Body {
    pub fn new(id: impl Into<String>, x: f32, y: f32, radius: f32) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            vx: 0.0,
            vy: 0.0,
            radius,
            pin: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub source: usize,
    pub target: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceParams {
    pub repulsion: f32,
    pub link_strength: f32,
    pub center: Option<(f32, f32)>,
    /// Share of the centroid offset removed each tick.
    pub center_strength: f32,
    /// Per-body pull towards `center`, scaled by alpha. Zero for graph
    /// layouts; cluster packing uses it to keep super-nodes together.
    pub gravity: f32,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub velocity_decay: f32,
}

impl ForceParams {
    pub fn from_config(config: &ForceConfig, center: Option<(f32, f32)>) -> Self {
        Self {
            repulsion: config.repulsion,
            link_strength: config.link_strength,
            center,
            center_strength: config.center_strength,
            gravity: 0.0,
            alpha_min: config.alpha_min,
            alpha_decay: config.alpha_decay,
            velocity_decay: config.velocity_decay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForceSimulation {
    bodies: Vec<Body>,
    index: HashMap<String, usize>,
    links: Vec<Link>,
    params: ForceParams,
    base_repulsion: f32,
    alpha: f32,
    alpha_target: f32,
    state: SimulationState,
    boost_ticks_left: u32,
    settle_window_ticks: u32,
    max_growth_boost: f32,
    drag_alpha_target: f32,
    ticks: u64,
}

impl ForceSimulation {
    /// Build a simulation over `data`. Existing pins are released: the
    /// force layout owns every position it simulates.
    pub fn new(data: &GraphData, config: &ForceConfig, viewport: Viewport) -> Self {
        let center = viewport.center();
        let mut sim = Self::with_bodies(
            Vec::new(),
            Vec::new(),
            ForceParams::from_config(config, Some(center)),
        );
        sim.settle_window_ticks = config.settle_window_ticks;
        sim.max_growth_boost = config.max_growth_boost.max(1.0);
        sim.drag_alpha_target = config.drag_alpha_target;
        sim.rebuild(data, config, center);
        sim.state = SimulationState::Released;
        sim
    }

    pub fn with_bodies(bodies: Vec<Body>, links: Vec<Link>, params: ForceParams) -> Self {
        let index = bodies
            .iter()
            .enumerate()
            .map(|(idx, body)| (body.id.clone(), idx))
            .collect();
        Self {
            bodies,
            index,
            links,
            params,
            base_repulsion: params.repulsion,
            alpha: 1.0,
            alpha_target: 0.0,
            state: SimulationState::Released,
            boost_ticks_left: 0,
            settle_window_ticks: 0,
            max_growth_boost: 1.0,
            drag_alpha_target: 0.3,
            ticks: 0,
        }
    }

    pub fn state(&self) -> SimulationState {
        self.state
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn repulsion(&self) -> f32 {
        self.params.repulsion
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    pub fn body(&self, id: &str) -> Option<&Body> {
        self.index.get(id).map(|idx| &self.bodies[*idx])
    }

    pub fn position(&self, id: &str) -> Option<(f32, f32)> {
        self.body(id).map(|body| (body.x, body.y))
    }

    /// Reconcile the arena with a new node/edge set. Retained bodies keep
    /// position and velocity; new ones are seeded next to an already placed
    /// neighbour, or on a spiral around the center. Growth boosts repulsion
    /// for the settle window.
    pub fn sync_graph(&mut self, data: &GraphData, config: &ForceConfig, viewport: Viewport) {
        let previous = self.bodies.len();
        let center = viewport.center();
        self.params.center = Some(center);
        self.rebuild(data, config, center);
        let current = self.bodies.len();

        if previous > 0 && current > previous {
            let boost = (current as f32 / previous as f32).min(self.max_growth_boost);
            self.params.repulsion = self.base_repulsion * boost;
            self.boost_ticks_left = self.settle_window_ticks;
            tracing::debug!(previous, current, boost, "boosting repulsion for new nodes");
        }
        self.reheat(1.0);
    }

    fn rebuild(&mut self, data: &GraphData, config: &ForceConfig, center: (f32, f32)) {
        let graph = EnrichedGraph::new(data);
        let old_bodies = std::mem::take(&mut self.bodies);
        let old_index = std::mem::take(&mut self.index);

        let mut bodies: Vec<Body> = Vec::with_capacity(data.nodes.len());
        let mut pending: Vec<usize> = Vec::new();
        for node in data.nodes.values() {
            if let Some(old) = old_index.get(&node.id).map(|idx| &old_bodies[*idx]) {
                let mut body = old.clone();
                body.radius = config.collision_radius;
                bodies.push(body);
                continue;
            }
            let mut body = Body::new(node.id.clone(), node.x, node.y, config.collision_radius);
            if node.is_unplaced() {
                pending.push(bodies.len());
                body.x = f32::NAN;
            }
            bodies.push(body);
        }
        let index: HashMap<String, usize> = bodies
            .iter()
            .enumerate()
            .map(|(idx, body)| (body.id.clone(), idx))
            .collect();

        for (order, slot) in pending.iter().enumerate() {
            let id = bodies[*slot].id.clone();
            let anchor = graph
                .neighbors(&id)
                .iter()
                .filter_map(|n| index.get(n.id.as_str()))
                .map(|idx| &bodies[*idx])
                .find(|b| !b.x.is_nan())
                .map(|b| (b.x, b.y));
            let (x, y) = match anchor {
                Some((ax, ay)) => {
                    let angle = order as f32 * PI * (3.0 - 5f32.sqrt());
                    (
                        ax + NEIGHBOR_SEED_OFFSET * angle.cos(),
                        ay + NEIGHBOR_SEED_OFFSET * angle.sin(),
                    )
                }
                None => spiral_point(center, order + old_bodies.len()),
            };
            let body = &mut bodies[*slot];
            body.x = x;
            body.y = y;
        }

        let links = graph
            .edges()
            .iter()
            .filter_map(|edge| {
                let source = *index.get(edge.source.id.as_str())?;
                let target = *index.get(edge.target.id.as_str())?;
                (source != target).then(|| Link {
                    source,
                    target,
                    distance: config.link_distance_for(&edge.edge.kind),
                })
            })
            .collect();

        self.bodies = bodies;
        self.index = index;
        self.links = links;
    }

    pub fn reheat(&mut self, alpha: f32) {
        self.alpha = self.alpha.max(alpha);
        self.state = SimulationState::Simulating;
    }

    /// Stop at a tick boundary; positions stay where they are.
    pub fn stop(&mut self) {
        self.alpha_target = 0.0;
        self.state = SimulationState::Settled;
    }

    /// Advance one tick. Returns false once the simulation has settled.
    pub fn tick(&mut self) -> bool {
        if self.state == SimulationState::Settled {
            return false;
        }
        self.state = SimulationState::Simulating;
        self.ticks += 1;
        self.alpha += (self.alpha_target - self.alpha) * self.params.alpha_decay;

        if self.boost_ticks_left > 0 {
            self.boost_ticks_left -= 1;
            if self.boost_ticks_left == 0 {
                self.params.repulsion = self.base_repulsion;
            }
        }

        self.apply_links();
        self.apply_repulsion();
        self.apply_collision();
        self.apply_gravity();
        self.apply_centering();
        self.integrate();

        if self.alpha < self.params.alpha_min && self.alpha_target < self.params.alpha_min {
            self.state = SimulationState::Settled;
            return false;
        }
        true
    }

    /// Tick until settled or `max_ticks` have run; returns ticks executed.
    pub fn run(&mut self, max_ticks: u32) -> u32 {
        self.reheat(self.alpha);
        let mut count = 0;
        while count < max_ticks {
            count += 1;
            if !self.tick() {
                break;
            }
        }
        count
    }

    pub fn drag_start(&mut self, id: &str) -> bool {
        let Some(idx) = self.index.get(id).copied() else {
            return false;
        };
        let body = &mut self.bodies[idx];
        body.pin = Some((body.x, body.y));
        self.alpha_target = self.drag_alpha_target;
        self.reheat(self.drag_alpha_target);
        true
    }

    pub fn drag_move(&mut self, id: &str, x: f32, y: f32) -> bool {
        let Some(idx) = self.index.get(id).copied() else {
            return false;
        };
        let body = &mut self.bodies[idx];
        body.pin = Some((x, y));
        body.x = x;
        body.y = y;
        true
    }

    pub fn drag_end(&mut self, id: &str) -> bool {
        let Some(idx) = self.index.get(id).copied() else {
            return false;
        };
        self.bodies[idx].pin = None;
        self.alpha_target = 0.0;
        true
    }

    /// Copy positions into `data`. Only bodies still being dragged keep a pin.
    pub fn write_back(&self, data: &mut GraphData) {
        for body in &self.bodies {
            if let Some(node) = data.nodes.get_mut(&body.id) {
                node.x = body.x;
                node.y = body.y;
                match body.pin {
                    Some((fx, fy)) => {
                        node.fx = Some(fx);
                        node.fy = Some(fy);
                    }
                    None => node.release(),
                }
            }
        }
    }

    fn apply_links(&mut self) {
        let strength = self.params.link_strength;
        let alpha = self.alpha;
        let mut degree = vec![0usize; self.bodies.len()];
        for link in &self.links {
            degree[link.source] += 1;
            degree[link.target] += 1;
        }
        for link in &self.links {
            let (s, t) = (&self.bodies[link.source], &self.bodies[link.target]);
            let mut dx = t.x + t.vx - s.x - s.vx;
            let mut dy = t.y + t.vy - s.y - s.vy;
            if dx == 0.0 && dy == 0.0 {
                (dx, dy) = jiggle(link.source, link.target);
            }
            let dist = (dx * dx + dy * dy).sqrt();
            let scale = (dist - link.distance) / dist * alpha * strength;
            let (fx, fy) = (dx * scale, dy * scale);
            let bias =
                degree[link.source] as f32 / (degree[link.source] + degree[link.target]) as f32;
            let target = &mut self.bodies[link.target];
            target.vx -= fx * bias;
            target.vy -= fy * bias;
            let source = &mut self.bodies[link.source];
            source.vx += fx * (1.0 - bias);
            source.vy += fy * (1.0 - bias);
        }
    }

    fn apply_repulsion(&mut self) {
        let strength = self.params.repulsion * self.alpha;
        let count = self.bodies.len();
        for i in 0..count {
            for j in (i + 1)..count {
                let mut dx = self.bodies[j].x - self.bodies[i].x;
                let mut dy = self.bodies[j].y - self.bodies[i].y;
                if dx == 0.0 && dy == 0.0 {
                    (dx, dy) = jiggle(i, j);
                }
                let dist_sq = (dx * dx + dy * dy).max(1.0);
                let w = strength / dist_sq;
                self.bodies[i].vx -= dx * w;
                self.bodies[i].vy -= dy * w;
                self.bodies[j].vx += dx * w;
                self.bodies[j].vy += dy * w;
            }
        }
    }

    fn apply_collision(&mut self) {
        let count = self.bodies.len();
        for i in 0..count {
            for j in (i + 1)..count {
                let (a, b) = (&self.bodies[i], &self.bodies[j]);
                let min_dist = a.radius + b.radius;
                let mut dx = (b.x + b.vx) - (a.x + a.vx);
                let mut dy = (b.y + b.vy) - (a.y + a.vy);
                if dx == 0.0 && dy == 0.0 {
                    (dx, dy) = jiggle(i, j);
                }
                let dist_sq = dx * dx + dy * dy;
                if dist_sq >= min_dist * min_dist {
                    continue;
                }
                let dist = dist_sq.sqrt();
                let overlap = (min_dist - dist) / dist * COLLIDE_STRENGTH;
                let (ra, rb) = (a.radius * a.radius, b.radius * b.radius);
                let share_b = if ra + rb > 0.0 { ra / (ra + rb) } else { 0.5 };
                let (ox, oy) = (dx * overlap, dy * overlap);
                self.bodies[j].vx += ox * share_b;
                self.bodies[j].vy += oy * share_b;
                self.bodies[i].vx -= ox * (1.0 - share_b);
                self.bodies[i].vy -= oy * (1.0 - share_b);
            }
        }
    }

    fn apply_gravity(&mut self) {
        let Some((cx, cy)) = self.params.center else {
            return;
        };
        let k = self.params.gravity * self.alpha;
        if k == 0.0 {
            return;
        }
        for body in &mut self.bodies {
            body.vx += (cx - body.x) * k;
            body.vy += (cy - body.y) * k;
        }
    }

    /// Translate the free bodies so their centroid drifts towards the
    /// center. Relative positions are untouched, so link lengths are too.
    fn apply_centering(&mut self) {
        let Some((cx, cy)) = self.params.center else {
            return;
        };
        let (mut sx, mut sy, mut count) = (0.0f32, 0.0f32, 0usize);
        for body in self.bodies.iter().filter(|b| b.pin.is_none()) {
            sx += body.x;
            sy += body.y;
            count += 1;
        }
        if count == 0 {
            return;
        }
        let k = self.params.center_strength;
        let shift_x = (cx - sx / count as f32) * k;
        let shift_y = (cy - sy / count as f32) * k;
        for body in self.bodies.iter_mut().filter(|b| b.pin.is_none()) {
            body.x += shift_x;
            body.y += shift_y;
        }
    }

    fn integrate(&mut self) {
        let keep = 1.0 - self.params.velocity_decay;
        for body in &mut self.bodies {
            if let Some((px, py)) = body.pin {
                body.x = px;
                body.y = py;
                body.vx = 0.0;
                body.vy = 0.0;
                continue;
            }
            body.vx *= keep;
            body.vy *= keep;
            body.x += body.vx;
            body.y += body.vy;
        }
    }
}

/// Phyllotaxis placement around `center`.
pub fn spiral_point(center: (f32, f32), index: usize) -> (f32, f32) {
    let radius = SEED_RADIUS * (0.5 + index as f32).sqrt();
    let angle = index as f32 * PI * (3.0 - 5f32.sqrt());
    (center.0 + radius * angle.cos(), center.1 + radius * angle.sin())
}

/// Deterministic nudge for coincident bodies.
fn jiggle(i: usize, j: usize) -> (f32, f32) {
    let seed = (i * 31 + j * 17 + 1) as f32;
    ((seed * 0.618).fract() * 1e-3 + 1e-6, (seed * 0.382).fract() * 1e-3 + 1e-6)
}
