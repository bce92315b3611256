use super::physics::{FrameContext, FrameInput, Simulation, VehicleState};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const REPLAY_DIR: &str = "replays";

const MAX_RECORDED_FRAMES: usize = 36_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayFrame {
    // Frame delta as reported by the clock, before clamping.
    pub raw_dt: f32,
    pub input: FrameInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplaySpawn {
    pub position: [f32; 3],
    pub yaw: f32,
    pub half_extents: [f32; 3],
}

impl ReplaySpawn {
    pub fn from_vehicle(vehicle: &VehicleState) -> Self {
        Self {
            position: vehicle.position.to_array(),
            yaw: vehicle.yaw,
            half_extents: vehicle.half_extents.to_array(),
        }
    }

    pub fn vehicle(&self) -> VehicleState {
        VehicleState::at_rest(
            Vec3::from_array(self.position),
            self.yaw,
            Vec3::from_array(self.half_extents),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayLog {
    pub max_frame_dt: f32,
    pub reference_dt: f32,
    pub spawn: ReplaySpawn,
    pub frames: Vec<ReplayFrame>,
}

impl ReplayLog {
    pub fn new(spawn: &VehicleState, max_frame_dt: f32, reference_dt: f32) -> Self {
        Self {
            max_frame_dt,
            reference_dt,
            spawn: ReplaySpawn::from_vehicle(spawn),
            frames: Vec::new(),
        }
    }

    pub fn record(&mut self, raw_dt: f32, input: FrameInput) {
        self.frames.push(ReplayFrame { raw_dt, input });
    }

    pub fn frame_context(&self, frame: &ReplayFrame) -> FrameContext {
        FrameContext::new(
            frame.raw_dt,
            self.max_frame_dt,
            self.reference_dt,
            frame.input,
        )
    }

    pub fn run(&self, simulation: &Simulation) -> Vec<VehicleState> {
        let mut vehicle = self.spawn.vehicle();
        self.frames
            .iter()
            .map(|frame| {
                vehicle = simulation
                    .step(vehicle, &self.frame_context(frame))
                    .vehicle;
                vehicle
            })
            .collect()
    }

    pub fn to_json(&self) -> Result<String, ReplayError> {
        serde_json::to_string_pretty(self).map_err(ReplayError::Json)
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf, ReplayError> {
        fs::create_dir_all(dir).map_err(|source| ReplayError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let path = dir.join(format!("replay_{stamp}.json"));
        fs::write(&path, self.to_json()?).map_err(|source| ReplayError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

#[derive(Debug)]
pub enum ReplayError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Json(serde_json::Error),
}

impl Display for ReplayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "replay file `{}`: {source}", path.display())
            }
            Self::Json(source) => write!(f, "replay json: {source}"),
        }
    }
}

impl Error for ReplayError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json(source) => Some(source),
        }
    }
}

#[derive(Resource, Debug, Default)]
pub struct ReplayRecorder {
    log: Option<ReplayLog>,
    dropped_frames: usize,
}

impl ReplayRecorder {
    pub fn start(&mut self, spawn: &VehicleState, max_frame_dt: f32, reference_dt: f32) {
        self.log = Some(ReplayLog::new(spawn, max_frame_dt, reference_dt));
        self.dropped_frames = 0;
    }

    pub fn record(&mut self, raw_dt: f32, input: FrameInput) {
        let Some(log) = self.log.as_mut() else {
            return;
        };
        if log.frames.len() >= MAX_RECORDED_FRAMES {
            self.dropped_frames += 1;
            return;
        }
        log.record(raw_dt, input);
    }

    pub fn log(&self) -> Option<&ReplayLog> {
        self.log.as_ref()
    }

    pub fn dropped_frames(&self) -> usize {
        self.dropped_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{VehiclePhysics, WorldConfig};
    use crate::gameplay::world::WorldGeometry;

    fn scripted_log() -> ReplayLog {
        let spawn =
            VehicleState::at_rest(Vec3::new(0.0, 0.5, 5.0), 0.0, Vec3::new(1.0, 0.5, 2.0));
        let mut log = ReplayLog::new(&spawn, 0.05, 1.0 / 60.0);

        let drive = FrameInput {
            accelerate: true,
            ..default()
        };
        let drive_left = FrameInput {
            steer_left: true,
            ..drive
        };
        let hop = FrameInput {
            jump: true,
            ..drive
        };
        for frame in 0..240 {
            let input = match frame % 60 {
                0 => hop,
                1..=20 => drive_left,
                _ => drive,
            };
            // Uneven clock, including one hitch the clamp has to absorb.
            let raw_dt = if frame == 100 {
                0.3
            } else {
                0.014 + (frame % 5) as f32 * 0.001
            };
            log.record(raw_dt, input);
        }
        log
    }

    #[test]
    fn replaying_the_same_log_is_bit_identical() {
        let physics = VehiclePhysics::default();
        let world = WorldGeometry::from_config(&WorldConfig::default());
        let simulation = Simulation::new(&physics, &world);
        let log = scripted_log();

        let first = log.run(&simulation);
        let second = log.run(&simulation);

        assert_eq!(first.len(), 240);
        assert_eq!(first, second);
        assert_ne!(first[239].position, log.spawn.vehicle().position);
    }

    #[test]
    fn json_log_replays_to_the_same_trajectory() {
        let physics = VehiclePhysics::default();
        let world = WorldGeometry::from_config(&WorldConfig::default());
        let simulation = Simulation::new(&physics, &world);
        let log = scripted_log();

        let raw = log.to_json().expect("log serializes");
        let restored: ReplayLog = serde_json::from_str(&raw).expect("log deserializes");

        assert_eq!(restored, log);
        assert_eq!(restored.run(&simulation), log.run(&simulation));
    }

    #[test]
    fn hitch_frame_is_clamped_on_replay() {
        let log = scripted_log();

        let context = log.frame_context(&log.frames[100]);

        assert_eq!(context.dt, 0.05);
    }

    #[test]
    fn recorder_ignores_frames_before_start() {
        let mut recorder = ReplayRecorder::default();
        recorder.record(0.016, FrameInput::default());
        assert!(recorder.log().is_none());

        let spawn =
            VehicleState::at_rest(Vec3::new(0.0, 0.5, 5.0), 0.0, Vec3::new(1.0, 0.5, 2.0));
        recorder.start(&spawn, 0.05, 1.0 / 60.0);
        recorder.record(0.016, FrameInput::default());

        let log = recorder.log().expect("recording started");
        assert_eq!(log.frames.len(), 1);
        assert_eq!(recorder.dropped_frames(), 0);
    }
}
