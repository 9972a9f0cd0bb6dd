//! Voxel cells and the material catalog.
#![forbid(unsafe_code)]

pub mod material;
pub mod voxel;

pub use material::{AtlasLayout, FaceTiles, MaterialCatalog, MaterialDef, UvRect};
pub use voxel::{DamageOutcome, FaceRole, MaterialId, StateClass, Voxel};
