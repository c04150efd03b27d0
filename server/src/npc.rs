//! Per-tick NPC movement.
//!
//! Wandering NPCs take occasional random steps and keep state between ticks.
//! Patrolling NPCs are placed purely from absolute server time, so their
//! position never drifts with tick jitter.

use rand::Rng;
use shared::{Npc, NpcArchetype, NpcBehavior, PatrolRoute, WORLD_BOUND};
use std::f32::consts::TAU;

/// Chance per tick that a wandering NPC takes a step.
pub const WANDER_PROBABILITY: f64 = 0.02;

pub const GUARD_PATROL: PatrolRoute = PatrolRoute {
    center_x: 0.0,
    center_z: -10.0,
    radius: 5.0,
    angular_rate: 0.5,
};

/// Static description of an NPC placed when a room starts.
#[derive(Debug, Clone, Copy)]
pub struct NpcSeed {
    pub name: &'static str,
    pub archetype: NpcArchetype,
    pub behavior: NpcBehavior,
    pub x: f32,
    pub z: f32,
    pub patrol: Option<PatrolRoute>,
}

pub const STARTER_NPCS: [NpcSeed; 4] = [
    NpcSeed {
        name: "John",
        archetype: NpcArchetype::Villager,
        behavior: NpcBehavior::Wander,
        x: 5.0,
        z: 5.0,
        patrol: None,
    },
    NpcSeed {
        name: "Merchant Bob",
        archetype: NpcArchetype::Merchant,
        behavior: NpcBehavior::Idle,
        x: -8.0,
        z: 3.0,
        patrol: None,
    },
    NpcSeed {
        name: "Guard Tom",
        archetype: NpcArchetype::Guard,
        behavior: NpcBehavior::Patrol,
        x: 0.0,
        z: -10.0,
        patrol: Some(GUARD_PATROL),
    },
    NpcSeed {
        name: "Dog",
        archetype: NpcArchetype::Animal,
        behavior: NpcBehavior::Wander,
        x: -5.0,
        z: -5.0,
        patrol: None,
    },
];

impl NpcSeed {
    pub fn spawn(&self, id: &str) -> Npc {
        let npc = Npc::new(id, self.name, self.archetype, self.behavior, self.x, self.z);
        match self.patrol {
            Some(route) => npc.with_patrol(route),
            None => npc,
        }
    }
}

/// Advances one NPC by a single tick.
///
/// `server_time_secs` is absolute server time and only matters for patrols;
/// `dt` only matters for wandering.
pub fn advance<R: Rng + ?Sized>(npc: &mut Npc, dt: f32, server_time_secs: f64, rng: &mut R) {
    match npc.behavior {
        NpcBehavior::Idle => {}
        NpcBehavior::Wander => wander(npc, dt, rng),
        NpcBehavior::Patrol => {
            // A patrol without a route stands still
            if let Some(route) = npc.patrol {
                let (x, z, heading) = patrol_position(&route, server_time_secs);
                npc.x = x;
                npc.z = z;
                npc.heading = heading;
            }
        }
    }
}

fn wander<R: Rng + ?Sized>(npc: &mut Npc, dt: f32, rng: &mut R) {
    if !rng.gen_bool(WANDER_PROBABILITY) {
        return;
    }

    let angle = rng.gen_range(0.0..TAU);
    let distance = npc.speed * dt;

    npc.x = (npc.x + angle.cos() * distance).clamp(-WORLD_BOUND, WORLD_BOUND);
    npc.z = (npc.z + angle.sin() * distance).clamp(-WORLD_BOUND, WORLD_BOUND);
    npc.heading = angle;
}

/// Position and heading on a patrol orbit at absolute time `t` (seconds).
pub fn patrol_position(route: &PatrolRoute, t: f64) -> (f32, f32, f32) {
    // Phase in f64: epoch seconds do not fit f32 precision
    let phase = t * route.angular_rate as f64;
    let (sin, cos) = phase.sin_cos();

    let x = route.center_x + (cos * route.radius as f64) as f32;
    let z = route.center_z + (sin * route.radius as f64) as f32;
    let heading = sin.atan2(cos) as f32;

    (x, z, heading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn guard() -> Npc {
        STARTER_NPCS[2].spawn("npc_2")
    }

    fn villager() -> Npc {
        STARTER_NPCS[0].spawn("npc_0")
    }

    #[test]
    fn test_starter_npcs() {
        assert_eq!(STARTER_NPCS.len(), 4);
        let archetypes: Vec<NpcArchetype> = STARTER_NPCS.iter().map(|s| s.archetype).collect();
        assert_eq!(
            archetypes,
            vec![
                NpcArchetype::Villager,
                NpcArchetype::Merchant,
                NpcArchetype::Guard,
                NpcArchetype::Animal
            ]
        );

        let guard = guard();
        assert_eq!(guard.name, "Guard Tom");
        assert_eq!(guard.patrol, Some(GUARD_PATROL));
    }

    #[test]
    fn test_idle_never_moves() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut merchant = STARTER_NPCS[1].spawn("npc_1");
        let before = merchant.clone();

        for i in 0..1_000 {
            advance(&mut merchant, 1.0 / 60.0, i as f64, &mut rng);
        }

        assert_eq!(merchant, before);
    }

    #[test]
    fn test_patrol_stays_on_circle() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut npc = guard();

        for t in [0.0, 0.37, 10.0, 123.456, 1_700_000_000.5, 1_700_000_123.25] {
            advance(&mut npc, 1.0 / 60.0, t, &mut rng);
            let dx = npc.x - GUARD_PATROL.center_x;
            let dz = npc.z - GUARD_PATROL.center_z;
            assert_approx_eq!((dx * dx + dz * dz).sqrt(), GUARD_PATROL.radius, 1e-4);
        }
    }

    #[test]
    fn test_patrol_is_pure_function_of_time() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut a = guard();
        let mut b = guard();

        // Many small steps versus one jump to the same instant
        for i in 0..600 {
            advance(&mut a, 1.0 / 60.0, i as f64 / 60.0, &mut rng);
        }
        advance(&mut b, 10.0, 599.0 / 60.0, &mut rng);

        assert_approx_eq!(a.x, b.x, 1e-6);
        assert_approx_eq!(a.z, b.z, 1e-6);
        assert_approx_eq!(a.heading, b.heading, 1e-6);
    }

    #[test]
    fn test_patrol_heading_follows_phase() {
        let (x, z, heading) = patrol_position(&GUARD_PATROL, 1.0);
        assert_approx_eq!(x, 0.5f32.cos() * 5.0, 1e-5);
        assert_approx_eq!(z, -10.0 + 0.5f32.sin() * 5.0, 1e-5);
        assert_approx_eq!(heading, 0.5, 1e-5);
    }

    #[test]
    fn test_patrol_without_route_stands_still() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut npc = Npc::new("npc_9", "Lost", NpcArchetype::Guard, NpcBehavior::Patrol, 3.0, 3.0);
        advance(&mut npc, 1.0 / 60.0, 42.0, &mut rng);
        assert_eq!((npc.x, npc.z), (3.0, 3.0));
    }

    #[test]
    fn test_wander_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut npc = villager();
        // Fast walker near the edge so clamping actually kicks in
        npc.speed = 500.0;
        npc.x = 44.0;
        npc.z = -44.0;

        for _ in 0..20_000 {
            advance(&mut npc, 1.0 / 60.0, 0.0, &mut rng);
            assert!((-WORLD_BOUND..=WORLD_BOUND).contains(&npc.x));
            assert!((-WORLD_BOUND..=WORLD_BOUND).contains(&npc.z));
        }
    }

    #[test]
    fn test_wander_is_bursty() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut npc = villager();
        let mut moves = 0;

        for _ in 0..6_000 {
            let before = (npc.x, npc.z);
            advance(&mut npc, 1.0 / 60.0, 0.0, &mut rng);
            if (npc.x, npc.z) != before {
                moves += 1;
                let dx = npc.x - before.0;
                let dz = npc.z - before.1;
                assert_approx_eq!((dx * dx + dz * dz).sqrt(), npc.speed / 60.0, 1e-4);
            }
        }

        // Expected 120 steps at p = 0.02
        assert!(moves > 60 && moves < 200, "moves = {}", moves);
    }

    #[test]
    fn test_wander_heading_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut npc = villager();
        for _ in 0..5_000 {
            advance(&mut npc, 1.0 / 60.0, 0.0, &mut rng);
            assert!((0.0..TAU).contains(&npc.heading));
        }
    }
}
