use bevy::prelude::*;
use bevy::window::PrimaryWindow;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_DIR: &str = "config";

pub struct ConfigPlugin;

impl Plugin for ConfigPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, load_game_config)
            .add_systems(Update, reload_game_config_hotkey)
            .add_systems(
                Update,
                apply_window_title.run_if(resource_exists_and_changed::<GameConfig>),
            );
    }
}

fn load_game_config(mut commands: Commands) {
    let config = GameConfig::load_from_dir(Path::new(CONFIG_DIR)).unwrap_or_else(|error| {
        panic!("failed to load configuration from `{CONFIG_DIR}`: {error}");
    });

    log_config_summary("Loaded", &config);
    info!("Press F5 to hot-reload config files from `{CONFIG_DIR}`.");

    commands.insert_resource(config);
}

fn reload_game_config_hotkey(
    keyboard: Res<ButtonInput<KeyCode>>,
    game_config: Option<ResMut<GameConfig>>,
) {
    if !keyboard.just_pressed(KeyCode::F5) {
        return;
    }

    let Some(mut current_config) = game_config else {
        warn!("Config hot-reload requested, but `GameConfig` resource is not initialized yet.");
        return;
    };

    match GameConfig::load_from_dir(Path::new(CONFIG_DIR)) {
        Ok(new_config) => {
            *current_config = new_config;
            log_config_summary("Hot-reloaded", &current_config);
        }
        Err(error) => {
            error!("Config hot-reload failed; keeping previous config: {error}");
        }
    }
}

fn apply_window_title(
    config: Res<GameConfig>,
    mut window_query: Query<&mut Window, With<PrimaryWindow>>,
) {
    let Ok(mut window) = window_query.single_mut() else {
        return;
    };

    if window.title != config.game.app.title {
        window.title = config.game.app.title.clone();
    }
}

fn log_config_summary(prefix: &str, config: &GameConfig) {
    info!(
        "{prefix} config: {} walls, {} ramps, {} cones, max speed {:.3}, frame dt cap {:.0} ms.",
        config.world.walls.len(),
        config.world.ramps.len(),
        config.world.cones.len(),
        config.vehicle.physics.max_speed,
        config.game.app.max_frame_dt_ms,
    );
}

#[derive(Resource, Debug, Clone)]
pub struct GameConfig {
    pub game: GameFile,
    pub vehicle: VehicleFile,
    pub world: WorldConfig,
}

impl GameConfig {
    pub fn load_from_dir(config_dir: &Path) -> Result<Self, ConfigError> {
        let game: GameFile = read_toml(&config_dir.join("game.toml"))?;
        let vehicle: VehicleFile = read_toml(&config_dir.join("vehicle.toml"))?;
        let world: WorldConfig = read_toml(&config_dir.join("world.toml"))?;

        let config = Self {
            game,
            vehicle,
            world,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn max_frame_dt(&self) -> f32 {
        self.game.app.max_frame_dt_ms / 1000.0
    }

    pub fn reference_dt(&self) -> f32 {
        1.0 / self.game.app.reference_hz
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let app = &self.game.app;
        if !(app.max_frame_dt_ms > 0.0) {
            return Err(ConfigError::Validation(
                "game.toml::app.max_frame_dt_ms must be > 0".to_string(),
            ));
        }
        if !(app.reference_hz > 0.0 && app.reference_hz.is_finite()) {
            return Err(ConfigError::Validation(
                "game.toml::app.reference_hz must be > 0".to_string(),
            ));
        }
        if !(0.0 < self.game.camera.smoothing && self.game.camera.smoothing <= 1.0) {
            return Err(ConfigError::Validation(
                "game.toml::camera.smoothing must be in (0, 1]".to_string(),
            ));
        }

        let vehicle = &self.vehicle.vehicle;
        if vehicle.size.iter().any(|extent| !(*extent > 0.0)) {
            return Err(ConfigError::Validation(
                "vehicle.toml::vehicle.size must be > 0 on every axis".to_string(),
            ));
        }
        if vehicle.spawn_position.iter().any(|axis| !axis.is_finite()) {
            return Err(ConfigError::Validation(
                "vehicle.toml::vehicle.spawn_position must be finite".to_string(),
            ));
        }
        if !(vehicle.spawn_position[1] >= vehicle.size[1] * 0.5) {
            return Err(ConfigError::Validation(
                "vehicle.toml::vehicle.spawn_position is below resting height".to_string(),
            ));
        }

        self.vehicle.physics.validate()?;
        self.world.validate()?;
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: Box<toml::de::Error>,
    },
    Validation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read `{}`: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse `{}`: {source}", path.display())
            }
            Self::Validation(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source: Box::new(source),
    })
}

fn ensure_unique_ids<T: HasId>(label: &str, rows: &[T]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for row in rows {
        let id = row.id();
        if id.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "{label} contains an empty id"
            )));
        }

        if !seen.insert(id) {
            return Err(ConfigError::Validation(format!(
                "{label} contains duplicate id `{id}`"
            )));
        }
    }

    Ok(())
}

trait HasId {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Deserialize)]
pub struct GameFile {
    pub app: AppConfig,
    #[serde(default)]
    pub camera: CameraConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub title: String,
    pub debug_overlay: bool,
    #[serde(default = "default_max_frame_dt_ms")]
    pub max_frame_dt_ms: f32,
    #[serde(default = "default_reference_hz")]
    pub reference_hz: f32,
}

fn default_max_frame_dt_ms() -> f32 {
    50.0
}

fn default_reference_hz() -> f32 {
    60.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub offset: [f32; 3],
    pub smoothing: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            offset: [0.0, 10.0, 20.0],
            smoothing: 0.05,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleFile {
    pub vehicle: VehicleConfig,
    #[serde(default)]
    pub physics: VehiclePhysics,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub size: [f32; 3],
    pub spawn_position: [f32; 3],
    pub spawn_yaw_degrees: f32,
}

impl VehicleConfig {
    pub fn half_extents(&self) -> Vec3 {
        Vec3::from_array(self.size) * 0.5
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            size: [2.0, 1.0, 4.0],
            spawn_position: [0.0, 0.5, 5.0],
            spawn_yaw_degrees: 0.0,
        }
    }
}

// Rates, drag and gravity are per reference frame, not per second.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct VehiclePhysics {
    pub max_speed: f32,
    pub acceleration_rate: f32,
    pub braking_rate: f32,
    pub turn_rate: f32,
    pub steer_speed_threshold: f32,
    pub air_drag: f32,
    pub gravity: f32,
    pub restitution: f32,
    pub jump_force: f32,
    pub jump_ground_tolerance: f32,
    pub ramp_snap_epsilon: f32,
    pub ramp_blend: f32,
    pub footprint_height: f32,
}

impl Default for VehiclePhysics {
    fn default() -> Self {
        Self {
            max_speed: 1.2,
            acceleration_rate: 0.02,
            braking_rate: 0.04,
            turn_rate: 0.035,
            steer_speed_threshold: 0.02,
            air_drag: 0.995,
            gravity: -0.015,
            restitution: 0.3,
            jump_force: 0.35,
            jump_ground_tolerance: 0.01,
            ramp_snap_epsilon: 0.001,
            ramp_blend: 0.3,
            footprint_height: 0.1,
        }
    }
}

impl VehiclePhysics {
    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("max_speed", self.max_speed),
            ("acceleration_rate", self.acceleration_rate),
            ("braking_rate", self.braking_rate),
            ("footprint_height", self.footprint_height),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "vehicle.toml::physics.{name} must be > 0"
                )));
            }
        }

        let non_negative = [
            ("turn_rate", self.turn_rate),
            ("steer_speed_threshold", self.steer_speed_threshold),
            ("jump_force", self.jump_force),
            ("jump_ground_tolerance", self.jump_ground_tolerance),
            ("ramp_snap_epsilon", self.ramp_snap_epsilon),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(ConfigError::Validation(format!(
                    "vehicle.toml::physics.{name} must be >= 0"
                )));
            }
        }

        if !(0.0 < self.air_drag && self.air_drag <= 1.0) {
            return Err(ConfigError::Validation(
                "vehicle.toml::physics.air_drag must be in (0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(ConfigError::Validation(
                "vehicle.toml::physics.restitution must be in [0, 1]".to_string(),
            ));
        }
        if !(0.0 < self.ramp_blend && self.ramp_blend <= 1.0) {
            return Err(ConfigError::Validation(
                "vehicle.toml::physics.ramp_blend must be in (0, 1]".to_string(),
            ));
        }
        if !(self.gravity <= 0.0) {
            return Err(ConfigError::Validation(
                "vehicle.toml::physics.gravity must be <= 0 (y is up)".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorldConfig {
    #[serde(default)]
    pub ground: GroundConfig,
    #[serde(default)]
    pub walls: Vec<WallConfig>,
    #[serde(default)]
    pub ramps: Vec<RampConfig>,
    #[serde(default)]
    pub cones: Vec<ConeConfig>,
    #[serde(default)]
    pub path: PathConfig,
}

impl WorldConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.ground.size.iter().any(|extent| !(*extent > 0.0)) {
            return Err(ConfigError::Validation(
                "world.toml::ground.size must be > 0".to_string(),
            ));
        }

        ensure_unique_ids("world.toml::walls", &self.walls)?;
        ensure_unique_ids("world.toml::ramps", &self.ramps)?;
        ensure_unique_ids("world.toml::cones", &self.cones)?;

        for (index, wall) in self.walls.iter().enumerate() {
            if wall.size.iter().any(|extent| !(*extent > 0.0)) {
                return Err(ConfigError::Validation(format!(
                    "world.toml::walls[{index}].size must be > 0 on every axis"
                )));
            }
        }

        for (index, ramp) in self.ramps.iter().enumerate() {
            if !(ramp.length > 0.0 && ramp.width > 0.0 && ramp.height > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "world.toml::ramps[{index}] length/width/height must be > 0"
                )));
            }
            if !(ramp.incline_degrees.abs() < 90.0) {
                return Err(ConfigError::Validation(format!(
                    "world.toml::ramps[{index}].incline_degrees must be in (-90, 90)"
                )));
            }
            if !(ramp.detection_margin >= 0.0) {
                return Err(ConfigError::Validation(format!(
                    "world.toml::ramps[{index}].detection_margin must be >= 0"
                )));
            }
            if !(ramp.wall_thickness > 0.0 && ramp.wall_height > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "world.toml::ramps[{index}] side wall thickness/height must be > 0"
                )));
            }
        }

        for (index, cone) in self.cones.iter().enumerate() {
            if !(cone.radius > 0.0 && cone.height > 0.0) {
                return Err(ConfigError::Validation(format!(
                    "world.toml::cones[{index}] radius/height must be > 0"
                )));
            }
        }

        Ok(())
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        let wall_height = 5.0;
        let wall_thickness = 1.0;
        let wall = |id: &str, size: [f32; 3], center: [f32; 3]| WallConfig {
            id: id.to_string(),
            size,
            center,
            rotation_degrees: [0.0; 3],
        };
        let ramp = |id: &str, x: f32, z: f32, incline_degrees: f32| RampConfig {
            id: id.to_string(),
            x,
            z,
            incline_degrees,
            ..RampConfig::default()
        };
        let cone = |id: &str, x: f32, z: f32| ConeConfig {
            id: id.to_string(),
            x,
            z,
            radius: default_cone_radius(),
            height: default_cone_height(),
        };

        Self {
            ground: GroundConfig::default(),
            walls: vec![
                wall(
                    "north",
                    [100.0, wall_height, wall_thickness],
                    [0.0, wall_height / 2.0, -50.0],
                ),
                wall(
                    "south",
                    [100.0, wall_height, wall_thickness],
                    [0.0, wall_height / 2.0, 50.0],
                ),
                wall(
                    "east",
                    [wall_thickness, wall_height, 100.0],
                    [50.0, wall_height / 2.0, 0.0],
                ),
                wall(
                    "west",
                    [wall_thickness, wall_height, 100.0],
                    [-50.0, wall_height / 2.0, 0.0],
                ),
            ],
            ramps: vec![
                ramp("ramp_east", 20.0, 20.0, -30.0),
                ramp("ramp_west", -20.0, -20.0, 30.0),
            ],
            cones: vec![
                cone("cone_a", 10.0, 10.0),
                cone("cone_b", -10.0, -10.0),
                cone("cone_c", 0.0, 30.0),
            ],
            path: PathConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GroundConfig {
    pub size: [f32; 2],
}

impl Default for GroundConfig {
    fn default() -> Self {
        Self {
            size: [100.0, 100.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WallConfig {
    pub id: String,
    pub size: [f32; 3],
    pub center: [f32; 3],
    #[serde(default)]
    pub rotation_degrees: [f32; 3],
}

impl HasId for WallConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RampConfig {
    pub id: String,
    pub x: f32,
    pub z: f32,
    pub incline_degrees: f32,
    #[serde(default = "default_ramp_length")]
    pub length: f32,
    #[serde(default = "default_ramp_width")]
    pub width: f32,
    #[serde(default = "default_ramp_height")]
    pub height: f32,
    #[serde(default = "default_ramp_detection_margin")]
    pub detection_margin: f32,
    #[serde(default = "default_ramp_wall_thickness")]
    pub wall_thickness: f32,
    #[serde(default = "default_ramp_wall_height")]
    pub wall_height: f32,
    #[serde(default = "default_ramp_wall_gap")]
    pub wall_gap: f32,
    #[serde(default = "default_ramp_wall_inset")]
    pub wall_inset: f32,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            x: 0.0,
            z: 0.0,
            incline_degrees: 0.0,
            length: default_ramp_length(),
            width: default_ramp_width(),
            height: default_ramp_height(),
            detection_margin: default_ramp_detection_margin(),
            wall_thickness: default_ramp_wall_thickness(),
            wall_height: default_ramp_wall_height(),
            wall_gap: default_ramp_wall_gap(),
            wall_inset: default_ramp_wall_inset(),
        }
    }
}

fn default_ramp_length() -> f32 {
    10.0
}

fn default_ramp_width() -> f32 {
    5.0
}

fn default_ramp_height() -> f32 {
    2.0
}

fn default_ramp_detection_margin() -> f32 {
    0.5
}

fn default_ramp_wall_thickness() -> f32 {
    0.3
}

fn default_ramp_wall_height() -> f32 {
    2.5
}

fn default_ramp_wall_gap() -> f32 {
    0.3
}

fn default_ramp_wall_inset() -> f32 {
    0.1
}

impl HasId for RampConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConeConfig {
    pub id: String,
    pub x: f32,
    pub z: f32,
    #[serde(default = "default_cone_radius")]
    pub radius: f32,
    #[serde(default = "default_cone_height")]
    pub height: f32,
}

fn default_cone_radius() -> f32 {
    0.5
}

fn default_cone_height() -> f32 {
    2.0
}

impl HasId for ConeConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    pub points: Vec<[f32; 3]>,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            points: vec![
                [-40.0, 0.1, 0.0],
                [-20.0, 0.1, 20.0],
                [0.0, 0.1, 40.0],
                [20.0, 0.1, 20.0],
                [40.0, 0.1, 0.0],
                [20.0, 0.1, -20.0],
                [0.0, 0.1, -40.0],
                [-20.0, 0.1, -20.0],
                [-40.0, 0.1, 0.0],
            ],
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> GameConfig {
    GameConfig {
        game: GameFile {
            app: AppConfig {
                title: "test".to_string(),
                debug_overlay: false,
                max_frame_dt_ms: default_max_frame_dt_ms(),
                reference_hz: default_reference_hz(),
            },
            camera: CameraConfig::default(),
        },
        vehicle: VehicleFile {
            vehicle: VehicleConfig::default(),
            physics: VehiclePhysics::default(),
        },
        world: WorldConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_config_matches_reference_arena() {
        let config_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join(CONFIG_DIR);
        let config = GameConfig::load_from_dir(&config_dir).expect("shipped config should load");
        let reference = WorldConfig::default();

        assert_eq!(config.vehicle.physics, VehiclePhysics::default());
        assert_eq!(config.world.walls.len(), reference.walls.len());
        assert_eq!(config.world.ramps.len(), reference.ramps.len());
        assert_eq!(config.world.cones.len(), reference.cones.len());
        assert_eq!(config.world.path.points, reference.path.points);
        assert!((config.max_frame_dt() - 0.05).abs() < 1e-6);
        assert!((config.reference_dt() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn physics_table_falls_back_to_defaults() {
        let raw = "[vehicle]\nsize = [2.0, 1.0, 4.0]\n\n[physics]\nmax_speed = 2.0\n";
        let file: VehicleFile = toml::from_str(raw).expect("partial vehicle file should parse");

        assert_eq!(file.physics.max_speed, 2.0);
        assert_eq!(file.physics.jump_force, VehiclePhysics::default().jump_force);
        assert_eq!(file.vehicle.spawn_position, [0.0, 0.5, 5.0]);
    }

    #[test]
    fn validation_rejects_restitution_above_one() {
        let mut config = test_config();
        config.vehicle.physics.restitution = 1.5;

        let message = config
            .validate()
            .expect_err("validation should fail")
            .to_string();
        assert!(message.contains("restitution"));
    }

    #[test]
    fn validation_rejects_duplicate_ramp_ids() {
        let mut config = test_config();
        let duplicate = config.world.ramps[0].clone();
        config.world.ramps.push(duplicate);

        let message = config
            .validate()
            .expect_err("validation should fail")
            .to_string();
        assert!(message.contains("duplicate id `ramp_east`"));
    }

    #[test]
    fn validation_rejects_vertical_ramp() {
        let mut config = test_config();
        config.world.ramps[1].incline_degrees = 90.0;

        let message = config
            .validate()
            .expect_err("validation should fail")
            .to_string();
        assert!(message.contains("ramps[1].incline_degrees"));
    }

    #[test]
    fn validation_rejects_nan_frame_timing() {
        let mut config = test_config();
        config.game.app.max_frame_dt_ms = f32::NAN;
        let message = config
            .validate()
            .expect_err("NaN frame cap should fail")
            .to_string();
        assert!(message.contains("max_frame_dt_ms"));

        let mut config = test_config();
        config.game.app.reference_hz = f32::NAN;
        let message = config
            .validate()
            .expect_err("NaN reference rate should fail")
            .to_string();
        assert!(message.contains("reference_hz"));
    }

    #[test]
    fn validation_rejects_nan_sizes() {
        let mut config = test_config();
        config.vehicle.vehicle.size[0] = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.world.ground.size[1] = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.world.walls[0].size[2] = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = test_config();
        config.world.ramps[0].detection_margin = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reference_config_is_valid() {
        test_config()
            .validate()
            .expect("reference config should validate");
    }
}
