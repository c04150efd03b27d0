//! Scripted movement for a headless client, with change detection so only
//! meaningful updates are sent.

use shared::{
    resolve_circle_collision, CircleCollider, MoveMessage, PLAYER_RADIUS, WORLD_BOUND,
};

const WAYPOINT_REACHED: f32 = 0.1;
const POSITION_EPSILON: f32 = 0.01;
const HEADING_EPSILON: f32 = 0.01;

/// Walks a closed loop of waypoints and turns the walk into move messages.
#[derive(Debug, Clone)]
pub struct BotController {
    waypoints: Vec<(f32, f32)>,
    next_waypoint: usize,
    x: f32,
    z: f32,
    heading: f32,
    speed: f32,
    is_moving: bool,
    last_sent: Option<(f32, f32, f32, bool)>,
}

impl BotController {
    /// A square loop of side `2 * extent` around the starting point.
    pub fn new(x: f32, z: f32, extent: f32, speed: f32) -> Self {
        let waypoints = vec![
            (x + extent, z + extent),
            (x - extent, z + extent),
            (x - extent, z - extent),
            (x + extent, z - extent),
        ];
        Self::with_waypoints(x, z, waypoints, speed)
    }

    pub fn with_waypoints(x: f32, z: f32, waypoints: Vec<(f32, f32)>, speed: f32) -> Self {
        Self {
            waypoints,
            next_waypoint: 0,
            x,
            z,
            heading: 0.0,
            speed,
            is_moving: false,
            last_sent: None,
        }
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.z)
    }

    pub fn heading(&self) -> f32 {
        self.heading
    }

    pub fn is_moving(&self) -> bool {
        self.is_moving
    }

    /// Advances the walk by `dt` seconds, staying clear of `obstacles`.
    /// Returns a move message when position, heading or motion changed.
    pub fn update(&mut self, dt: f32, obstacles: &[CircleCollider]) -> Option<MoveMessage> {
        self.walk(dt);

        for obstacle in obstacles {
            let me = CircleCollider {
                x: self.x,
                z: self.z,
                radius: PLAYER_RADIUS,
            };
            let (x, z) = resolve_circle_collision(&me, obstacle);
            self.x = x;
            self.z = z;
        }
        self.x = self.x.clamp(-WORLD_BOUND, WORLD_BOUND);
        self.z = self.z.clamp(-WORLD_BOUND, WORLD_BOUND);

        self.take_update()
    }

    fn walk(&mut self, dt: f32) {
        let Some(&(tx, tz)) = self.waypoints.get(self.next_waypoint) else {
            self.is_moving = false;
            return;
        };

        let dx = tx - self.x;
        let dz = tz - self.z;
        let distance = (dx * dx + dz * dz).sqrt();

        if distance <= WAYPOINT_REACHED {
            self.next_waypoint = (self.next_waypoint + 1) % self.waypoints.len();
            self.is_moving = false;
            return;
        }

        let step = (self.speed * dt).min(distance);
        self.x += dx / distance * step;
        self.z += dz / distance * step;
        self.heading = dx.atan2(dz);
        self.is_moving = step > 0.0;
    }

    fn take_update(&mut self) -> Option<MoveMessage> {
        let current = (self.x, self.z, self.heading, self.is_moving);

        let changed = match self.last_sent {
            None => true,
            Some((x, z, heading, moving)) => {
                (current.0 - x).abs() > POSITION_EPSILON
                    || (current.1 - z).abs() > POSITION_EPSILON
                    || (current.2 - heading).abs() > HEADING_EPSILON
                    || current.3 != moving
            }
        };

        if !changed {
            return None;
        }

        self.last_sent = Some(current);
        Some(MoveMessage {
            x: Some(self.x),
            y: Some(0.0),
            z: Some(self.z),
            rotation: Some(self.heading),
            is_moving: Some(self.is_moving),
        })
    }
}
