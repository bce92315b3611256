use super::collision::{resolve_collisions, Contact};
use super::ramps::conform_to_ramps;
use crate::config::{VehicleConfig, VehiclePhysics};
use crate::gameplay::world::{Aabb, WorldGeometry};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Component, Debug, Clone, Copy, PartialEq)]
pub struct VehicleState {
    pub position: Vec3,
    pub yaw: f32,
    pub velocity: Vec3,
    pub half_extents: Vec3,
}

impl VehicleState {
    pub fn at_rest(position: Vec3, yaw: f32, half_extents: Vec3) -> Self {
        Self {
            position,
            yaw,
            velocity: Vec3::ZERO,
            half_extents,
        }
    }

    pub fn spawn(config: &VehicleConfig) -> Self {
        Self::at_rest(
            Vec3::from_array(config.spawn_position),
            config.spawn_yaw_degrees.to_radians(),
            config.half_extents(),
        )
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::NEG_Z
    }

    pub fn resting_height(&self) -> f32 {
        self.half_extents.y
    }

    pub fn bounds_at(&self, center: Vec3) -> Aabb {
        Aabb::from_center_half_extents(center, self.half_extents)
    }

    pub fn horizontal_speed(&self) -> f32 {
        Vec2::new(self.velocity.x, self.velocity.z).length()
    }
}

#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInput {
    pub accelerate: bool,
    pub brake: bool,
    pub steer_left: bool,
    pub steer_right: bool,
    pub jump: bool,
}

impl FrameInput {
    // Accelerate wins when both pedals are held.
    pub fn forward_accel(&self, physics: &VehiclePhysics) -> f32 {
        if self.accelerate {
            physics.acceleration_rate
        } else if self.brake {
            -physics.braking_rate
        } else {
            0.0
        }
    }

    pub fn turn(&self, physics: &VehiclePhysics) -> f32 {
        match (self.steer_left, self.steer_right) {
            (true, false) => physics.turn_rate,
            (false, true) => -physics.turn_rate,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameContext {
    pub dt: f32,
    pub reference_dt: f32,
    pub input: FrameInput,
}

impl FrameContext {
    pub fn new(raw_dt: f32, max_dt: f32, reference_dt: f32, input: FrameInput) -> Self {
        // `clamp` panics on a NaN bound.
        let dt = if raw_dt.is_finite() {
            raw_dt.max(0.0).min(max_dt).max(0.0)
        } else {
            0.0
        };
        Self {
            dt,
            reference_dt,
            input,
        }
    }

    pub fn time_scale(&self) -> f32 {
        self.dt / self.reference_dt
    }
}

// The cap acts on the full 3D velocity, vertical component included.
pub fn update_heading_and_velocity(
    vehicle: VehicleState,
    input: &FrameInput,
    physics: &VehiclePhysics,
) -> VehicleState {
    let speed_forward = vehicle.velocity.dot(vehicle.forward());
    let mut yaw = vehicle.yaw;
    if speed_forward.abs() > physics.steer_speed_threshold {
        let authority = (speed_forward.abs() / physics.max_speed).min(1.0);
        yaw += input.turn(physics) * speed_forward.signum() * authority;
    }

    let steered = VehicleState { yaw, ..vehicle };
    let velocity = ((vehicle.velocity + steered.forward() * input.forward_accel(physics))
        * physics.air_drag)
        .clamp_length_max(physics.max_speed);

    VehicleState {
        velocity,
        ..steered
    }
}

pub fn is_near_ground(vehicle: &VehicleState, physics: &VehiclePhysics) -> bool {
    vehicle.position.y <= vehicle.resting_height() + physics.jump_ground_tolerance
}

// Sets (never adds) the jump impulse while the vehicle is near flat ground.
pub fn apply_jump(
    vehicle: VehicleState,
    input: &FrameInput,
    physics: &VehiclePhysics,
) -> VehicleState {
    if !input.jump || !is_near_ground(&vehicle, physics) {
        return vehicle;
    }

    let mut launched = vehicle;
    launched.velocity.y = physics.jump_force;
    launched
}

pub fn integrate_vertical(
    vehicle: VehicleState,
    physics: &VehiclePhysics,
    time_scale: f32,
) -> VehicleState {
    let mut next = vehicle;
    next.velocity.y += physics.gravity * time_scale;
    next.position.y += next.velocity.y * time_scale;

    if next.position.y < next.resting_height() {
        next.position.y = next.resting_height();
        next.velocity.y = 0.0;
    }
    next
}

pub fn sanitize(vehicle: VehicleState, fallback_position: Vec3) -> (VehicleState, bool) {
    let mut clean = vehicle;
    let mut repaired = false;

    if !clean.velocity.is_finite() {
        clean.velocity = Vec3::ZERO;
        repaired = true;
    }
    if !clean.position.is_finite() {
        clean.position = fallback_position;
        repaired = true;
    }
    if !clean.yaw.is_finite() {
        clean.yaw = 0.0;
        repaired = true;
    }

    (clean, repaired)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepOutcome {
    pub vehicle: VehicleState,
    pub contact: Option<Contact>,
    pub ramp_index: Option<usize>,
    pub ramp_snapped: bool,
    pub sanitized: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Simulation<'a> {
    pub physics: &'a VehiclePhysics,
    pub world: &'a WorldGeometry,
}

impl<'a> Simulation<'a> {
    pub fn new(physics: &'a VehiclePhysics, world: &'a WorldGeometry) -> Self {
        Self { physics, world }
    }

    pub fn step(&self, vehicle: VehicleState, frame: &FrameContext) -> StepOutcome {
        let time_scale = frame.time_scale();

        let steered = update_heading_and_velocity(vehicle, &frame.input, self.physics);
        let launched = apply_jump(steered, &frame.input, self.physics);

        let tentative = launched.position + launched.velocity * time_scale;
        let resolution =
            resolve_collisions(&launched, tentative, self.world, self.physics.restitution);
        let moved = VehicleState {
            position: resolution.position,
            velocity: resolution.velocity,
            ..launched
        };

        let (settled, ramp_index, ramp_snapped) =
            match conform_to_ramps(moved, self.world, self.physics) {
                Some(conformance) => (
                    conformance.vehicle,
                    Some(conformance.ramp_index),
                    conformance.snapped,
                ),
                None => (
                    integrate_vertical(moved, self.physics, time_scale),
                    None,
                    false,
                ),
            };

        let (vehicle, sanitized) = sanitize(settled, vehicle.position);
        StepOutcome {
            vehicle,
            contact: resolution.contact,
            ramp_index,
            ramp_snapped,
            sanitized,
        }
    }
}
