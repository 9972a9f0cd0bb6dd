//! Chunk voxel storage, residency bookkeeping, and grid generation.
#![forbid(unsafe_code)]

mod chunk;
mod generate;
mod grid;
mod pool;

pub use chunk::Chunk;
pub use generate::{fill_generated, generate_grid};
pub use grid::{ChunkOccupancy, VoxelGrid};
pub use pool::{ChunkPool, ChunkPoolStats};
