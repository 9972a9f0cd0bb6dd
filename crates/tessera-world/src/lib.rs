//! Chunk addressing, worldgen parameters, and terrain sampling.
#![forbid(unsafe_code)]

pub mod coord;
pub mod worldgen;

pub use coord::{ChunkCoord, LocalPos};
pub use worldgen::{NoiseLayer, TerrainGenerator, WorldGenConfig, load_config_from_path};
