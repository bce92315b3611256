use super::physics::VehicleState;
use crate::gameplay::world::{Aabb, WorldGeometry};
use bevy::math::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub obstacle_index: usize,
    pub mtv: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionResolution {
    pub position: Vec3,
    pub velocity: Vec3,
    pub contact: Option<Contact>,
}

// Ties prefer x, then y, then z.
pub fn minimum_translation(a: &Aabb, b: &Aabb) -> Option<Vec3> {
    let overlap = a.overlap(b);
    if overlap.x <= 0.0 || overlap.y <= 0.0 || overlap.z <= 0.0 {
        return None;
    }

    let mut axis = 0;
    let mut min_overlap = overlap.x;
    if overlap.y < min_overlap {
        min_overlap = overlap.y;
        axis = 1;
    }
    if overlap.z < min_overlap {
        min_overlap = overlap.z;
        axis = 2;
    }

    let center_a = a.center();
    let center_b = b.center();
    let push = if center_a[axis] < center_b[axis] {
        -min_overlap
    } else {
        min_overlap
    };

    let mut mtv = Vec3::ZERO;
    mtv[axis] = push;
    Some(mtv)
}

// Smaller simultaneous overlaps are left for later frames.
pub fn select_contact(bounds: &Aabb, world: &WorldGeometry) -> Option<Contact> {
    let mut selected: Option<Contact> = None;

    for (obstacle_index, obstacle) in world.obstacles.iter().enumerate() {
        let obstacle_bounds = obstacle.bounding_box();
        if !bounds.intersects(&obstacle_bounds) {
            continue;
        }
        let Some(mtv) = minimum_translation(bounds, &obstacle_bounds) else {
            continue;
        };

        let best_length = selected.map_or(0.0, |contact| contact.mtv.length());
        if mtv.length() > best_length {
            selected = Some(Contact {
                obstacle_index,
                mtv,
            });
        }
    }

    selected
}

// Unit world axis carrying the largest MTV component. Ties prefer x, then y.
pub fn dominant_axis(mtv: Vec3) -> Vec3 {
    let magnitude = mtv.abs();
    if magnitude.x >= magnitude.y && magnitude.x >= magnitude.z {
        Vec3::X
    } else if magnitude.y >= magnitude.x && magnitude.y >= magnitude.z {
        Vec3::Y
    } else {
        Vec3::Z
    }
}

pub fn contact_velocity(velocity: Vec3, mtv: Vec3, restitution: f32) -> Vec3 {
    let axis = dominant_axis(mtv);
    let speed_along_axis = velocity.dot(axis);
    let bounced = if speed_along_axis > 0.0 {
        velocity - axis * ((1.0 + restitution) * speed_along_axis)
    } else {
        velocity
    };

    let push_direction = mtv.normalize_or_zero();
    bounced - push_direction * bounced.dot(push_direction)
}

pub fn resolve_collisions(
    vehicle: &VehicleState,
    tentative: Vec3,
    world: &WorldGeometry,
    restitution: f32,
) -> CollisionResolution {
    let bounds = vehicle.bounds_at(tentative);

    match select_contact(&bounds, world) {
        Some(contact) => CollisionResolution {
            position: tentative + contact.mtv,
            velocity: contact_velocity(vehicle.velocity, contact.mtv, restitution),
            contact: Some(contact),
        },
        None => CollisionResolution {
            position: tentative,
            velocity: vehicle.velocity,
            contact: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gameplay::world::{Obstacle, ObstacleKind};

    const EPSILON: f32 = 1e-4;

    fn box_obstacle(id: &str, min: Vec3, max: Vec3) -> Obstacle {
        Obstacle::new(id, ObstacleKind::Wall, Aabb::new(min, max))
    }

    fn car(velocity: Vec3) -> VehicleState {
        VehicleState {
            position: Vec3::new(0.0, 0.5, 0.0),
            yaw: 0.0,
            velocity,
            half_extents: Vec3::new(1.0, 0.5, 2.0),
        }
    }

    fn max_overlap_depth(a: &Aabb, b: &Aabb) -> f32 {
        a.overlap(b).min_element()
    }

    #[test]
    fn separated_boxes_have_no_mtv() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::splat(2.0), Vec3::splat(3.0));

        assert_eq!(minimum_translation(&a, &b), None);
    }

    #[test]
    fn face_contact_yields_no_mtv() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));

        assert!(a.intersects(&b));
        assert_eq!(minimum_translation(&a, &b), None);
    }

    #[test]
    fn mtv_uses_smallest_overlap_and_points_away_from_obstacle() {
        let a = Aabb::new(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        let b = Aabb::new(Vec3::new(1.7, -1.0, -1.0), Vec3::new(5.0, 5.0, 5.0));

        let mtv = minimum_translation(&a, &b).expect("boxes overlap");
        assert!(mtv.abs_diff_eq(Vec3::new(-0.3, 0.0, 0.0), EPSILON));

        let reversed = minimum_translation(&b, &a).expect("boxes overlap");
        assert!(reversed.abs_diff_eq(Vec3::new(0.3, 0.0, 0.0), EPSILON));
    }

    #[test]
    fn single_obstacle_is_fully_separated() {
        let world = WorldGeometry::default().with_obstacle(box_obstacle(
            "pillar",
            Vec3::new(0.6, 0.0, -1.0),
            Vec3::new(3.0, 4.0, 1.0),
        ));
        let vehicle = car(Vec3::new(0.4, 0.0, 0.0));

        let resolved = resolve_collisions(&vehicle, vehicle.position, &world, 0.3);

        let contact = resolved.contact.expect("vehicle overlaps the pillar");
        assert_eq!(contact.obstacle_index, 0);
        let after = vehicle.bounds_at(resolved.position);
        assert!(max_overlap_depth(&after, &world.obstacles[0].bounding_box()) <= EPSILON);
    }

    #[test]
    fn largest_mtv_wins_and_smaller_overlap_remains() {
        let world = WorldGeometry::default()
            .with_obstacle(box_obstacle(
                "near_rail",
                Vec3::new(-0.5, 0.0, -3.0),
                Vec3::new(0.5, 1.0, -1.7),
            ))
            .with_obstacle(box_obstacle(
                "side_wall",
                Vec3::new(0.2, 0.0, -5.0),
                Vec3::new(5.0, 5.0, 5.0),
            ));
        let vehicle = car(Vec3::ZERO);

        let resolved = resolve_collisions(&vehicle, vehicle.position, &world, 0.3);

        let contact = resolved.contact.expect("vehicle overlaps both obstacles");
        assert_eq!(contact.obstacle_index, 1);
        assert!(contact.mtv.abs_diff_eq(Vec3::new(-0.8, 0.0, 0.0), EPSILON));

        let after = vehicle.bounds_at(resolved.position);
        assert!(max_overlap_depth(&after, &world.obstacles[1].bounding_box()) <= EPSILON);
        let residual = max_overlap_depth(&after, &world.obstacles[0].bounding_box());
        assert!((residual - 0.3).abs() < EPSILON);
    }

    #[test]
    fn contact_velocity_bounces_then_removes_push_component() {
        let velocity = Vec3::new(0.3, 0.0, 0.9);
        let mtv = Vec3::new(0.0, 0.0, -0.5);

        let response = contact_velocity(velocity, mtv, 0.3);

        assert!(response.abs_diff_eq(Vec3::new(0.3, 0.0, 0.0), EPSILON));
    }

    #[test]
    fn contact_velocity_leaves_tangential_motion_when_separating() {
        let velocity = Vec3::new(-0.6, 0.2, 0.0);
        let mtv = Vec3::new(0.25, 0.0, 0.0);

        let response = contact_velocity(velocity, mtv, 0.3);

        assert!(response.abs_diff_eq(Vec3::new(0.0, 0.2, 0.0), EPSILON));
    }

    #[test]
    fn dominant_axis_prefers_x_then_y_on_ties() {
        assert_eq!(dominant_axis(Vec3::new(0.5, 0.5, 0.5)), Vec3::X);
        assert_eq!(dominant_axis(Vec3::new(0.0, -0.5, 0.5)), Vec3::Y);
        assert_eq!(dominant_axis(Vec3::new(0.0, 0.0, -0.1)), Vec3::Z);
    }

    #[test]
    fn no_overlap_accepts_tentative_position() {
        let world = WorldGeometry::default().with_obstacle(box_obstacle(
            "far",
            Vec3::splat(10.0),
            Vec3::splat(12.0),
        ));
        let vehicle = car(Vec3::new(0.0, 0.0, -1.0));
        let tentative = Vec3::new(0.0, 0.5, -1.0);

        let resolved = resolve_collisions(&vehicle, tentative, &world, 0.3);

        assert_eq!(resolved.contact, None);
        assert_eq!(resolved.position, tentative);
        assert_eq!(resolved.velocity, vehicle.velocity);
    }
}
