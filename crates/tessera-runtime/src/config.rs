use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use serde::Deserialize;
use tessera_io::FormatVersion;
use tessera_mesh_cpu::ExtractOptions;
use tessera_world::WorldGenConfig;

#[derive(Clone, Debug, Deserialize)]
pub struct StreamingConfig {
    /// Chebyshev radius in chunks around the reference chunk.
    #[serde(default = "default_view_radius")]
    pub view_radius: i32,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: f32,
    #[serde(default = "default_max_loads")]
    pub max_loads_per_tick: usize,
}

fn default_view_radius() -> i32 {
    4
}
fn default_tick_interval() -> f32 {
    0.25
}
fn default_max_loads() -> usize {
    32
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            view_radius: default_view_radius(),
            tick_interval_secs: default_tick_interval(),
            max_loads_per_tick: default_max_loads(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
    #[serde(default = "default_save_interval")]
    pub save_interval_secs: f32,
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    #[serde(default)]
    pub format: FormatVersion,
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("saves")
}
fn default_save_interval() -> f32 {
    300.0
}
fn default_cache_capacity() -> usize {
    1024
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            save_interval_secs: default_save_interval(),
            cache_capacity: default_cache_capacity(),
            format: FormatVersion::default(),
        }
    }
}

/// Worker counts per lane. Zero derives a count from the machine.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub load: usize,
    #[serde(default)]
    pub mesh: usize,
}

impl WorkerConfig {
    /// `(load, mesh)` with zeros replaced: half the cores load, the rest mesh,
    /// at least one each.
    pub fn resolve(&self) -> (usize, usize) {
        let cores = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        let load = if self.load > 0 {
            self.load
        } else {
            (cores / 2).max(1)
        };
        let mesh = if self.mesh > 0 {
            self.mesh
        } else {
            cores.saturating_sub(load).max(1)
        };
        (load, mesh)
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub world: WorldGenConfig,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub meshing: ExtractOptions,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
}

impl SessionConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: SessionConfig = toml::from_str(toml_str)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.world.validate()?;
        if self.streaming.view_radius < 0 {
            return Err(format!(
                "view_radius must not be negative, got {}",
                self.streaming.view_radius
            ));
        }
        let tick = self.streaming.tick_interval_secs;
        if tick.is_nan() || tick < 0.0 {
            return Err("tick_interval_secs must be a non-negative number".into());
        }
        if self.streaming.max_loads_per_tick == 0 {
            return Err("max_loads_per_tick must be at least 1".into());
        }
        let save = self.persistence.save_interval_secs;
        if save.is_nan() || save <= 0.0 {
            return Err("save_interval_secs must be positive".into());
        }
        Ok(())
    }
}

pub fn load_config_from_path(path: &Path) -> Result<SessionConfig, Box<dyn Error>> {
    let s = fs::read_to_string(path)?;
    SessionConfig::from_toml_str(&s)
}
