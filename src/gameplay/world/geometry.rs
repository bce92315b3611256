use crate::config::{ConeConfig, RampConfig, WallConfig, WorldConfig};
use bevy::math::{EulerRot, Mat3, Quat, Vec3};
use bevy::prelude::Resource;

// Normal y-components below this make a ramp plane too steep to sample.
const VERTICAL_PLANE_EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    pub fn from_oriented_box(center: Vec3, rotation: Quat, half_extents: Vec3) -> Self {
        let basis = Mat3::from_quat(rotation);
        let world_half_extents = basis.x_axis.abs() * half_extents.x
            + basis.y_axis.abs() * half_extents.y
            + basis.z_axis.abs() * half_extents.z;
        Self::from_center_half_extents(center, world_half_extents)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    // Inclusive test: boxes sharing a face count as intersecting.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn overlap(&self, other: &Aabb) -> Vec3 {
        self.max.min(other.max) - self.min.max(other.min)
    }

    pub fn expanded_xz(&self, margin: f32) -> Self {
        let grow = Vec3::new(margin, 0.0, margin);
        Self {
            min: self.min - grow,
            max: self.max + grow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleKind {
    Wall,
    RampSideWall,
    Cone,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub id: String,
    pub kind: ObstacleKind,
    bounds: Aabb,
}

impl Obstacle {
    pub fn new(id: impl Into<String>, kind: ObstacleKind, bounds: Aabb) -> Self {
        Self {
            id: id.into(),
            kind,
            bounds,
        }
    }

    pub fn wall(config: &WallConfig) -> Self {
        Self::new(
            config.id.clone(),
            ObstacleKind::Wall,
            Aabb::from_oriented_box(
                Vec3::from_array(config.center),
                euler_degrees_to_quat(config.rotation_degrees),
                Vec3::from_array(config.size) * 0.5,
            ),
        )
    }

    pub fn cone(config: &ConeConfig) -> Self {
        let half_height = config.height * 0.5;
        Self::new(
            config.id.clone(),
            ObstacleKind::Cone,
            Aabb::from_center_half_extents(
                Vec3::new(config.x, half_height, config.z),
                Vec3::new(config.radius, half_height, config.radius),
            ),
        )
    }

    pub fn bounding_box(&self) -> Aabb {
        self.bounds
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampPlane {
    pub normal: Vec3,
    pub anchor: Vec3,
}

impl RampPlane {
    pub fn height_at(&self, x: f32, z: f32) -> Option<f32> {
        let Vec3 {
            x: nx,
            y: ny,
            z: nz,
        } = self.normal;
        if ny.abs() < VERTICAL_PLANE_EPSILON {
            return None;
        }

        Some(self.anchor.y - (nx * (x - self.anchor.x) + nz * (z - self.anchor.z)) / ny)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ramp {
    pub id: String,
    pub center: Vec3,
    pub rotation: Quat,
    pub size: Vec3,
    pub detection_margin: f32,
}

impl Ramp {
    pub fn new(
        id: impl Into<String>,
        center: Vec3,
        incline_radians: f32,
        size: Vec3,
        detection_margin: f32,
    ) -> Self {
        Self {
            id: id.into(),
            center,
            rotation: Quat::from_rotation_x(incline_radians),
            size,
            detection_margin,
        }
    }

    pub fn from_config(config: &RampConfig) -> Self {
        Self::new(
            config.id.clone(),
            Vec3::new(config.x, config.height * 0.5, config.z),
            config.incline_degrees.to_radians(),
            Vec3::new(config.width, config.height, config.length),
            config.detection_margin,
        )
    }

    pub fn plane(&self) -> RampPlane {
        RampPlane {
            normal: self.rotation * Vec3::Y,
            anchor: self.center,
        }
    }

    pub fn deck_bounds(&self) -> Aabb {
        Aabb::from_oriented_box(self.center, self.rotation, self.size * 0.5)
    }

    pub fn detection_region(&self) -> Aabb {
        self.deck_bounds().expanded_xz(self.detection_margin)
    }

    pub fn side_wall_layout(config: &RampConfig) -> [(Vec3, Vec3); 2] {
        let size = Vec3::new(config.wall_thickness, config.wall_height, config.length);
        let lateral = config.width * 0.5 + config.wall_gap;
        let y = config.wall_height * 0.5;
        let z = -config.length * 0.5 + config.wall_inset;
        [
            (Vec3::new(-lateral, y, z), size),
            (Vec3::new(lateral, y, z), size),
        ]
    }

    pub fn side_walls(&self, config: &RampConfig) -> [Obstacle; 2] {
        let [left, right] = Self::side_wall_layout(config);
        let rail = |suffix: &str, (offset, size): (Vec3, Vec3)| {
            Obstacle::new(
                format!("{}_{suffix}", self.id),
                ObstacleKind::RampSideWall,
                Aabb::from_oriented_box(
                    self.center + self.rotation * offset,
                    self.rotation,
                    size * 0.5,
                ),
            )
        };
        [rail("left_wall", left), rail("right_wall", right)]
    }
}

// Static collision world. Order is significant: resolution ties and ramp priority follow it.
#[derive(Resource, Debug, Clone, Default, PartialEq)]
pub struct WorldGeometry {
    pub obstacles: Vec<Obstacle>,
    pub ramps: Vec<Ramp>,
}

impl WorldGeometry {
    pub fn from_config(config: &WorldConfig) -> Self {
        let mut world = config
            .walls
            .iter()
            .map(Obstacle::wall)
            .fold(Self::default(), Self::with_obstacle);

        for ramp_config in &config.ramps {
            let ramp = Ramp::from_config(ramp_config);
            let [left, right] = ramp.side_walls(ramp_config);
            world = world.with_obstacle(left).with_obstacle(right).with_ramp(ramp);
        }

        config
            .cones
            .iter()
            .map(Obstacle::cone)
            .fold(world, Self::with_obstacle)
    }

    pub fn with_obstacle(mut self, obstacle: Obstacle) -> Self {
        self.obstacles.push(obstacle);
        self
    }

    pub fn with_ramp(mut self, ramp: Ramp) -> Self {
        self.ramps.push(ramp);
        self
    }
}

pub fn euler_degrees_to_quat(degrees: [f32; 3]) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        degrees[0].to_radians(),
        degrees[1].to_radians(),
        degrees[2].to_radians(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-4;

    fn corner_bounds(center: Vec3, rotation: Quat, half: Vec3) -> Aabb {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for sx in [-1.0, 1.0] {
            for sy in [-1.0, 1.0] {
                for sz in [-1.0, 1.0] {
                    let corner = center + rotation * (half * Vec3::new(sx, sy, sz));
                    min = min.min(corner);
                    max = max.max(corner);
                }
            }
        }
        Aabb::new(min, max)
    }

    #[test]
    fn oriented_box_bounds_match_transformed_corners() {
        let center = Vec3::new(3.0, 1.0, -2.0);
        let rotation = Quat::from_euler(EulerRot::XYZ, 0.4, -1.1, 0.25);
        let half = Vec3::new(2.5, 1.0, 5.0);

        let fast = Aabb::from_oriented_box(center, rotation, half);
        let exact = corner_bounds(center, rotation, half);

        assert!(fast.min.abs_diff_eq(exact.min, EPSILON));
        assert!(fast.max.abs_diff_eq(exact.max, EPSILON));
    }

    #[test]
    fn touching_boxes_intersect_with_zero_overlap() {
        let a = Aabb::new(Vec3::ZERO, Vec3::ONE);
        let b = Aabb::new(Vec3::new(1.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 1.0));

        assert!(a.intersects(&b));
        assert_eq!(a.overlap(&b).x, 0.0);
    }

    #[test]
    fn reference_world_orders_walls_then_rails_then_cones() {
        let world = WorldGeometry::from_config(&WorldConfig::default());

        let kinds: Vec<ObstacleKind> = world.obstacles.iter().map(|o| o.kind).collect();
        assert_eq!(kinds.len(), 4 + 4 + 3);
        assert!(kinds[..4].iter().all(|kind| *kind == ObstacleKind::Wall));
        assert!(kinds[4..8]
            .iter()
            .all(|kind| *kind == ObstacleKind::RampSideWall));
        assert!(kinds[8..].iter().all(|kind| *kind == ObstacleKind::Cone));
        assert_eq!(world.ramps.len(), 2);
        assert_eq!(world.obstacles[4].id, "ramp_east_left_wall");
    }

    #[test]
    fn cone_bounds_cover_radius_and_height() {
        let world = WorldGeometry::from_config(&WorldConfig::default());
        let cone = world
            .obstacles
            .iter()
            .find(|obstacle| obstacle.id == "cone_c")
            .expect("cone_c exists");

        let bounds = cone.bounding_box();
        assert!(bounds.min.abs_diff_eq(Vec3::new(-0.5, 0.0, 29.5), EPSILON));
        assert!(bounds.max.abs_diff_eq(Vec3::new(0.5, 2.0, 30.5), EPSILON));
    }

    #[test]
    fn ramp_side_walls_follow_deck_rotation() {
        let config = WorldConfig::default().ramps[0].clone();
        let ramp = Ramp::from_config(&config);
        let [left, right] = ramp.side_walls(&config);

        let left_center = left.bounding_box().center();
        let right_center = right.bounding_box().center();
        // Rails sit 2.5 + 0.3 either side of the deck centerline.
        assert!((left_center.x - (20.0 - 2.8)).abs() < EPSILON);
        assert!((right_center.x - (20.0 + 2.8)).abs() < EPSILON);

        let expected = ramp.center + ramp.rotation * Vec3::new(2.8, 1.25, -4.9);
        assert!(right_center.abs_diff_eq(expected, EPSILON));
    }

    #[test]
    fn tilted_ramp_plane_rises_along_its_slope() {
        let config = WorldConfig::default().ramps[0].clone();
        let plane = Ramp::from_config(&config).plane();

        let at_anchor = plane.height_at(20.0, 20.0).expect("plane is not vertical");
        let ahead = plane.height_at(20.0, 22.0).expect("plane is not vertical");

        assert!((at_anchor - 1.0).abs() < EPSILON);
        let expected_rise = 2.0 * 30.0_f32.to_radians().tan();
        assert!((ahead - at_anchor - expected_rise).abs() < EPSILON);
    }

    #[test]
    fn vertical_plane_has_no_height() {
        let plane = RampPlane {
            normal: Vec3::X,
            anchor: Vec3::ZERO,
        };

        assert_eq!(plane.height_at(1.0, 1.0), None);
    }

    #[test]
    fn detection_region_adds_margin_only_on_ground_axes() {
        let ramp = Ramp::new("flat", Vec3::new(0.0, 1.0, 0.0), 0.0, Vec3::new(5.0, 2.0, 10.0), 0.5);
        let region = ramp.detection_region();

        assert!(region.min.abs_diff_eq(Vec3::new(-3.0, 0.0, -5.5), EPSILON));
        assert!(region.max.abs_diff_eq(Vec3::new(3.0, 2.0, 5.5), EPSILON));
    }
}
