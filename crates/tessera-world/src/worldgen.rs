use std::error::Error;
use std::fs;
use std::path::Path;

use fastnoise_lite::{FastNoiseLite, NoiseType};
use serde::Deserialize;
use tessera_blocks::MaterialId;

/// One Perlin layer sampled at `((w + offset) * zoom)`.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
pub struct NoiseLayer {
    #[serde(default)]
    pub offset_x: f32,
    #[serde(default)]
    pub offset_z: f32,
    #[serde(default = "default_zoom")]
    pub zoom: f32,
}

fn default_zoom() -> f32 {
    0.01
}

impl Default for NoiseLayer {
    fn default() -> Self {
        Self {
            offset_x: 0.0,
            offset_z: 0.0,
            zoom: default_zoom(),
        }
    }
}

fn default_layer_a() -> NoiseLayer {
    NoiseLayer {
        offset_x: 0.0,
        offset_z: 0.0,
        zoom: 0.01,
    }
}

fn default_layer_b() -> NoiseLayer {
    NoiseLayer {
        offset_x: 1000.0,
        offset_z: 1000.0,
        zoom: 0.03,
    }
}

// Continental layer: very low frequency, anisotropic, not configurable.
const CONTINENTAL_ZOOM_X: f32 = 0.001;
const CONTINENTAL_ZOOM_Z: f32 = 0.0001;

const LAYER_B_SALT: i32 = 0x5BD1_E995;
const CONTINENTAL_SALT: i32 = 0x27D4_EB2D;

#[derive(Clone, Debug, Deserialize)]
pub struct WorldGenConfig {
    #[serde(default = "default_seed")]
    pub seed: i32,
    #[serde(default = "default_chunk_edge")]
    pub chunk_edge: usize,
    /// Exclusive upper bound of generated terrain in voxels.
    #[serde(default = "default_world_height")]
    pub world_height: i32,
    #[serde(default = "default_sea_level")]
    pub sea_level: i32,
    /// Surface cells at or above this height are grass, below it dirt.
    #[serde(default = "default_grass_level")]
    pub grass_level: i32,
    #[serde(default = "default_dirt_depth")]
    pub dirt_depth: i32,
    #[serde(default = "default_height_multiplier")]
    pub height_multiplier: f32,
    #[serde(default = "default_height_offset")]
    pub height_offset: f32,
    #[serde(default = "default_layer_a")]
    pub layer_a: NoiseLayer,
    #[serde(default = "default_layer_b")]
    pub layer_b: NoiseLayer,
}

fn default_seed() -> i32 {
    1337
}
fn default_chunk_edge() -> usize {
    16
}
fn default_world_height() -> i32 {
    128
}
fn default_sea_level() -> i32 {
    60
}
fn default_grass_level() -> i32 {
    60
}
fn default_dirt_depth() -> i32 {
    5
}
fn default_height_multiplier() -> f32 {
    160.0
}
fn default_height_offset() -> f32 {
    40.0
}

impl Default for WorldGenConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            chunk_edge: default_chunk_edge(),
            world_height: default_world_height(),
            sea_level: default_sea_level(),
            grass_level: default_grass_level(),
            dirt_depth: default_dirt_depth(),
            height_multiplier: default_height_multiplier(),
            height_offset: default_height_offset(),
            layer_a: default_layer_a(),
            layer_b: default_layer_b(),
        }
    }
}

impl WorldGenConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_edge == 0 || self.chunk_edge > 256 {
            return Err(format!("chunk_edge {} out of range 1..=256", self.chunk_edge));
        }
        if self.world_height <= 0 {
            return Err(format!("world_height must be positive, got {}", self.world_height));
        }
        if self.dirt_depth < 0 {
            return Err("dirt_depth must not be negative".into());
        }
        Ok(())
    }

    /// Number of chunk layers stacked vertically to cover `world_height`.
    #[inline]
    pub fn vertical_chunks(&self) -> i32 {
        let e = self.chunk_edge as i32;
        (self.world_height + e - 1) / e
    }
}

pub fn load_config_from_path(path: &Path) -> Result<WorldGenConfig, Box<dyn Error>> {
    let s = fs::read_to_string(path)?;
    let cfg: WorldGenConfig = toml::from_str(&s)?;
    cfg.validate()?;
    Ok(cfg)
}

fn perlin(seed: i32) -> FastNoiseLite {
    let mut n = FastNoiseLite::with_seed(seed);
    n.set_noise_type(Some(NoiseType::Perlin));
    // Coordinates are pre-scaled by each layer's zoom.
    n.set_frequency(Some(1.0));
    n
}

#[inline]
fn unit(n: f32) -> f32 {
    ((n + 1.0) * 0.5).clamp(0.0, 1.0)
}

/// Heightmap terrain. Stateless after construction; share it across workers
/// behind an `Arc`.
pub struct TerrainGenerator {
    cfg: WorldGenConfig,
    layer_a: FastNoiseLite,
    layer_b: FastNoiseLite,
    continental: FastNoiseLite,
}

impl TerrainGenerator {
    pub fn new(cfg: WorldGenConfig) -> Self {
        Self {
            layer_a: perlin(cfg.seed),
            layer_b: perlin(cfg.seed ^ LAYER_B_SALT),
            continental: perlin(cfg.seed ^ CONTINENTAL_SALT),
            cfg,
        }
    }

    #[inline]
    pub fn config(&self) -> &WorldGenConfig {
        &self.cfg
    }

    #[inline]
    pub fn chunk_edge(&self) -> usize {
        self.cfg.chunk_edge
    }

    #[inline]
    pub fn world_height(&self) -> i32 {
        self.cfg.world_height
    }

    #[inline]
    fn sample(noise: &FastNoiseLite, layer: &NoiseLayer, wx: i32, wz: i32) -> f32 {
        let x = (wx as f32 + layer.offset_x) * layer.zoom;
        let z = (wz as f32 + layer.offset_z) * layer.zoom;
        unit(noise.get_noise_2d(x, z))
    }

    /// Combined noise in `[0, 1]` for a world column. Layers multiply so
    /// flat low regions dominate.
    pub fn column_noise(&self, wx: i32, wz: i32) -> f32 {
        let a = Self::sample(&self.layer_a, &self.cfg.layer_a, wx, wz);
        let b = Self::sample(&self.layer_b, &self.cfg.layer_b, wx, wz);
        let c = unit(
            self.continental
                .get_noise_2d(wx as f32 * CONTINENTAL_ZOOM_X, wz as f32 * CONTINENTAL_ZOOM_Z),
        );
        a * b * c
    }

    /// Surface height of the column at world `(wx, wz)`.
    pub fn column_height(&self, wx: i32, wz: i32) -> i32 {
        let n = self.column_noise(wx, wz);
        (n * self.cfg.height_multiplier + self.cfg.height_offset).round() as i32
    }

    /// Rasterizes one cell of a column whose surface sits at `height`.
    pub fn material_at(&self, wy: i32, height: i32) -> MaterialId {
        let cfg = &self.cfg;
        if wy < 0 || wy >= cfg.world_height {
            return MaterialId::Air;
        }
        if wy == height {
            if height >= cfg.grass_level {
                MaterialId::Grass
            } else {
                MaterialId::Dirt
            }
        } else if wy < height - cfg.dirt_depth {
            MaterialId::Stone
        } else if wy < height {
            MaterialId::Dirt
        } else if wy <= cfg.sea_level {
            MaterialId::Water
        } else {
            MaterialId::Air
        }
    }
}
