use super::physics::VehicleState;
use crate::config::VehiclePhysics;
use crate::gameplay::world::{Aabb, WorldGeometry};
use bevy::math::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampConformance {
    pub vehicle: VehicleState,
    pub ramp_index: usize,
    pub snapped: bool,
}

pub fn footprint(vehicle: &VehicleState, physics: &VehiclePhysics) -> Aabb {
    Aabb::from_center_half_extents(
        Vec3::new(vehicle.position.x, 0.0, vehicle.position.z),
        Vec3::new(
            vehicle.half_extents.x,
            physics.footprint_height * 0.5,
            vehicle.half_extents.z,
        ),
    )
}

// Ramps whose plane is too steep to sample are passed over. Returns `None`
// when no ramp applies and the flat-ground integrator should run instead.
pub fn conform_to_ramps(
    vehicle: VehicleState,
    world: &WorldGeometry,
    physics: &VehiclePhysics,
) -> Option<RampConformance> {
    let footprint = footprint(&vehicle, physics);

    world
        .ramps
        .iter()
        .enumerate()
        .filter(|(_, ramp)| footprint.intersects(&ramp.detection_region()))
        .find_map(|(ramp_index, ramp)| {
            let deck_height = ramp
                .plane()
                .height_at(vehicle.position.x, vehicle.position.z)?;
            let target = deck_height + vehicle.resting_height();

            let mut held = vehicle;
            let snapped = held.position.y < target - physics.ramp_snap_epsilon;
            held.position.y = if snapped {
                target
            } else {
                held.position.y + (target - held.position.y) * physics.ramp_blend
            };
            held.velocity.y = 0.0;

            Some(RampConformance {
                vehicle: held,
                ramp_index,
                snapped,
            })
        })
}
