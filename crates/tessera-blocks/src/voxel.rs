use serde::Deserialize;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(u8)]
pub enum MaterialId {
    #[default]
    Air = 0,
    Dirt = 1,
    Grass = 2,
    Water = 3,
    Stone = 4,
    WoodLog = 5,
    Cobblestone = 6,
    WoodPlanks = 7,
}

impl MaterialId {
    pub const COUNT: usize = 8;

    pub const ALL: [MaterialId; Self::COUNT] = [
        MaterialId::Air,
        MaterialId::Dirt,
        MaterialId::Grass,
        MaterialId::Water,
        MaterialId::Stone,
        MaterialId::WoodLog,
        MaterialId::Cobblestone,
        MaterialId::WoodPlanks,
    ];

    #[inline]
    pub fn from_u8(v: u8) -> Option<MaterialId> {
        Self::ALL.get(v as usize).copied()
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn key(self) -> &'static str {
        match self {
            MaterialId::Air => "air",
            MaterialId::Dirt => "dirt",
            MaterialId::Grass => "grass",
            MaterialId::Water => "water",
            MaterialId::Stone => "stone",
            MaterialId::WoodLog => "wood_log",
            MaterialId::Cobblestone => "cobblestone",
            MaterialId::WoodPlanks => "wood_planks",
        }
    }

    pub fn from_key(key: &str) -> Option<MaterialId> {
        Self::ALL.iter().copied().find(|m| m.key() == key)
    }

    /// State class of the stock material table.
    pub fn default_state(self) -> StateClass {
        match self {
            MaterialId::Air => StateClass::Air,
            MaterialId::Water => StateClass::Liquid,
            _ => StateClass::Solid,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum StateClass {
    #[default]
    Air = 0,
    Solid = 1,
    Liquid = 2,
}

impl StateClass {
    #[inline]
    pub fn from_u8(v: u8) -> Option<StateClass> {
        match v {
            0 => Some(StateClass::Air),
            1 => Some(StateClass::Solid),
            2 => Some(StateClass::Liquid),
            _ => None,
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

// Used by cube faces to pick an atlas tile
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FaceRole {
    Top,
    Bottom,
    Side,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DamageOutcome {
    /// Air and liquids do not take damage.
    Unaffected,
    Damaged { remaining: f32 },
    Destroyed,
}

/// A single world cell. Stored flat in chunk grids, so it stays `Copy`.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct Voxel {
    pub material: MaterialId,
    pub state: StateClass,
    pub health: f32,
    pub hardness: f32,
}

impl Voxel {
    pub const AIR: Voxel = Voxel {
        material: MaterialId::Air,
        state: StateClass::Air,
        health: 0.0,
        hardness: 0.0,
    };

    /// Solid stand-in returned for cells below the bottom of the world.
    pub const BOUNDARY: Voxel = Voxel {
        material: MaterialId::Stone,
        state: StateClass::Solid,
        health: f32::INFINITY,
        hardness: f32::INFINITY,
    };

    /// Builds a voxel, keeping `state == Air` iff `material == Air`.
    /// A non-air material tagged as air falls back to its stock state; use
    /// `MaterialCatalog::normalize` to apply a configured one instead.
    pub fn new(material: MaterialId, state: StateClass, health: f32, hardness: f32) -> Self {
        if material == MaterialId::Air {
            return Voxel::AIR;
        }
        let state = if state == StateClass::Air {
            material.default_state()
        } else {
            state
        };
        Voxel {
            material,
            state,
            health,
            hardness,
        }
    }

    #[inline]
    pub fn is_air(&self) -> bool {
        self.state == StateClass::Air
    }

    #[inline]
    pub fn is_solid(&self) -> bool {
        self.state == StateClass::Solid
    }

    #[inline]
    pub fn is_liquid(&self) -> bool {
        self.state == StateClass::Liquid
    }

    /// Applies `amount` of damage scaled down by hardness. Solid voxels whose
    /// health drops to zero or below become air.
    pub fn deal_damage(&mut self, amount: f32) -> DamageOutcome {
        if !self.is_solid() || !amount.is_finite() || amount < 0.0 {
            return DamageOutcome::Unaffected;
        }
        let effective = if self.hardness > 0.0 {
            amount / self.hardness
        } else {
            amount
        };
        self.health -= effective;
        if self.health <= 0.0 {
            *self = Voxel::AIR;
            DamageOutcome::Destroyed
        } else {
            DamageOutcome::Damaged {
                remaining: self.health,
            }
        }
    }
}
