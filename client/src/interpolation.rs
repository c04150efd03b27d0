//! Exponential smoothing of remote entity state between snapshots.

use shared::{normalize_angle, shortest_angle_delta, Npc, Player};

/// Smoothing factors applied once per rendered frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationConfig {
    pub position_factor: f32,
    pub heading_factor: f32,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            position_factor: 0.15,
            heading_factor: 0.2,
        }
    }
}

impl InterpolationConfig {
    /// Keeps both factors inside (0, 1]; anything else falls back to the default.
    pub fn new(position_factor: f32, heading_factor: f32) -> Self {
        let defaults = Self::default();
        Self {
            position_factor: valid_factor(position_factor).unwrap_or(defaults.position_factor),
            heading_factor: valid_factor(heading_factor).unwrap_or(defaults.heading_factor),
        }
    }
}

fn valid_factor(factor: f32) -> Option<f32> {
    (factor.is_finite() && factor > 0.0 && factor <= 1.0).then_some(factor)
}

/// Position, heading and server timestamp of one entity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NetworkState {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub heading: f32,
    pub timestamp: u64,
}

impl From<&Player> for NetworkState {
    fn from(player: &Player) -> Self {
        Self {
            x: player.x,
            y: player.y,
            z: player.z,
            heading: player.heading,
            timestamp: player.last_update,
        }
    }
}

impl NetworkState {
    /// NPCs carry no timestamp of their own; the snapshot's server time is used.
    pub fn from_npc(npc: &Npc, server_time: u64) -> Self {
        Self {
            x: npc.x,
            y: npc.y,
            z: npc.z,
            heading: npc.heading,
            timestamp: server_time,
        }
    }
}

pub fn lerp(current: f32, target: f32, factor: f32) -> f32 {
    current + (target - current) * factor
}

/// Steps `current` toward `target` along the shorter arc. Result is in [0, 2π).
pub fn lerp_angle(current: f32, target: f32, factor: f32) -> f32 {
    let from = normalize_angle(current);
    let delta = shortest_angle_delta(from, normalize_angle(target));
    normalize_angle(from + delta * factor)
}

/// Smoothed view of one remote entity.
///
/// New samples only move the target; `step` moves the current state toward
/// it once per frame and never past it. The current state starts at the
/// origin with heading 0, so a newly seen entity glides in from there.
#[derive(Debug, Clone)]
pub struct Interpolator {
    config: InterpolationConfig,
    current: Option<NetworkState>,
    target: Option<NetworkState>,
}

impl Interpolator {
    pub fn new(config: InterpolationConfig) -> Self {
        Self {
            config,
            current: None,
            target: None,
        }
    }

    /// Records a new authoritative sample. Only the target changes.
    pub fn set_target(&mut self, sample: NetworkState) {
        self.current.get_or_insert_with(NetworkState::default);
        self.target = Some(NetworkState {
            heading: normalize_angle(sample.heading),
            ..sample
        });
    }

    pub fn step(&mut self) -> Option<NetworkState> {
        let target = self.target?;
        let current = self.current.get_or_insert_with(NetworkState::default);

        let position = self.config.position_factor;
        current.x = lerp(current.x, target.x, position);
        current.y = lerp(current.y, target.y, position);
        current.z = lerp(current.z, target.z, position);
        current.heading = lerp_angle(current.heading, target.heading, self.config.heading_factor);
        current.timestamp = target.timestamp;

        Some(*current)
    }

    pub fn current(&self) -> Option<NetworkState> {
        self.current
    }

    pub fn target(&self) -> Option<NetworkState> {
        self.target
    }
}

impl Default for Interpolator {
    fn default() -> Self {
        Self::new(InterpolationConfig::default())
    }
}
