use std::collections::HashMap;
use std::error::Error;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::voxel::{FaceRole, MaterialId, StateClass, Voxel};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaceTiles {
    pub top: u16,
    pub bottom: u16,
    pub side: u16,
}

impl FaceTiles {
    #[inline]
    pub fn uniform(tile: u16) -> Self {
        Self {
            top: tile,
            bottom: tile,
            side: tile,
        }
    }

    #[inline]
    pub fn for_role(&self, role: FaceRole) -> u16 {
        match role {
            FaceRole::Top => self.top,
            FaceRole::Bottom => self.bottom,
            FaceRole::Side => self.side,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MaterialDef {
    pub id: MaterialId,
    pub key: &'static str,
    pub state: StateClass,
    pub hardness: f32,
    pub max_health: f32,
    pub tiles: FaceTiles,
}

/// Atlas grid; tile `i` sits at column `i % columns`, row `i / columns`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub struct AtlasLayout {
    pub columns: u16,
    pub rows: u16,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvRect {
    pub u0: f32,
    pub v0: f32,
    pub u1: f32,
    pub v1: f32,
}

impl AtlasLayout {
    pub fn tile_rect(&self, tile: u16) -> UvRect {
        let cols = self.columns.max(1);
        let rows = self.rows.max(1);
        let col = tile % cols;
        let row = (tile / cols).min(rows - 1);
        let w = 1.0 / f32::from(cols);
        let h = 1.0 / f32::from(rows);
        UvRect {
            u0: f32::from(col) * w,
            v0: f32::from(row) * h,
            u1: f32::from(col + 1) * w,
            v1: f32::from(row + 1) * h,
        }
    }
}

/// Material properties, resolved once at startup and passed by reference.
#[derive(Clone, Debug)]
pub struct MaterialCatalog {
    defs: Vec<MaterialDef>,
    pub atlas: AtlasLayout,
}

impl Default for MaterialCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl MaterialCatalog {
    /// The eight stock materials on an eight-tile strip; the material id
    /// selects the tile for every face.
    pub fn builtin() -> Self {
        let defs = MaterialId::ALL
            .iter()
            .map(|&id| {
                let (hardness, max_health) = match id {
                    MaterialId::Air => (0.0, 0.0),
                    MaterialId::Water => (0.0, 1.0),
                    MaterialId::Dirt | MaterialId::Grass => (1.0, 1.0),
                    MaterialId::Stone | MaterialId::Cobblestone => (2.0, 3.0),
                    MaterialId::WoodLog => (1.5, 2.0),
                    MaterialId::WoodPlanks => (1.0, 2.0),
                };
                MaterialDef {
                    id,
                    key: id.key(),
                    state: id.default_state(),
                    hardness,
                    max_health,
                    tiles: FaceTiles::uniform(u16::from(id.as_u8())),
                }
            })
            .collect();
        Self {
            defs,
            atlas: AtlasLayout {
                columns: MaterialId::COUNT as u16,
                rows: 1,
            },
        }
    }

    #[inline]
    pub fn get(&self, id: MaterialId) -> &MaterialDef {
        &self.defs[id.index()]
    }

    pub fn get_id(&self, key: &str) -> Option<MaterialId> {
        self.defs.iter().find(|d| d.key == key).map(|d| d.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MaterialDef> {
        self.defs.iter()
    }

    /// Fresh voxel of `id` at full health.
    #[inline]
    pub fn voxel(&self, id: MaterialId) -> Voxel {
        let def = self.get(id);
        Voxel::new(id, def.state, def.max_health, def.hardness)
    }

    /// Repairs a voxel whose state breaks `state == Air` iff `material == Air`,
    /// using the catalog's default state for the material.
    pub fn normalize(&self, v: Voxel) -> Voxel {
        if v.material == MaterialId::Air {
            return Voxel::AIR;
        }
        if v.is_air() {
            return Voxel {
                state: self.state_of(v.material),
                ..v
            };
        }
        v
    }

    /// Default state class for `id`, used to repair records with a bad state byte.
    #[inline]
    pub fn state_of(&self, id: MaterialId) -> StateClass {
        self.get(id).state
    }

    #[inline]
    pub fn tile_uv(&self, id: MaterialId, role: FaceRole) -> UvRect {
        self.atlas.tile_rect(self.get(id).tiles.for_role(role))
    }

    /// Applies overrides from TOML on top of the builtin table.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: MaterialsConfig = toml::from_str(toml_str)?;
        let mut catalog = Self::builtin();
        if let Some(atlas) = cfg.atlas {
            if atlas.columns == 0 || atlas.rows == 0 {
                return Err("atlas columns and rows must be non-zero".into());
            }
            catalog.atlas = atlas;
        }
        // Sorted so errors are reported deterministically.
        let mut entries: Vec<(String, MaterialEntry)> = cfg.materials.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, entry) in entries {
            let Some(id) = MaterialId::from_key(&key) else {
                return Err(format!("unknown material '{key}'").into());
            };
            let def = &mut catalog.defs[id.index()];
            if let Some(state) = entry.state {
                if (state == StateClass::Air) != (id == MaterialId::Air) {
                    return Err(format!("material '{key}' cannot use state {state:?}").into());
                }
                def.state = state;
            }
            if let Some(h) = entry.hardness {
                def.hardness = h;
            }
            if let Some(h) = entry.health {
                def.max_health = h;
            }
            match entry.tiles {
                Some(TilesEntry::Uniform(t)) => def.tiles = FaceTiles::uniform(t),
                Some(TilesEntry::PerFace { top, bottom, side }) => {
                    def.tiles = FaceTiles { top, bottom, side }
                }
                None => {}
            }
        }
        Ok(catalog)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }
}

// --- Config ---

#[derive(Deserialize)]
pub struct MaterialsConfig {
    #[serde(default)]
    pub atlas: Option<AtlasLayout>,
    #[serde(default)]
    pub materials: HashMap<String, MaterialEntry>,
}

#[derive(Deserialize)]
pub struct MaterialEntry {
    pub state: Option<StateClass>,
    pub hardness: Option<f32>,
    pub health: Option<f32>,
    pub tiles: Option<TilesEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub enum TilesEntry {
    // tiles = 4
    Uniform(u16),
    // tiles = { top = 0, bottom = 1, side = 2 }
    PerFace { top: u16, bottom: u16, side: u16 },
}
