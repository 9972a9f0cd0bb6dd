use std::fmt;

use serde::Deserialize;
use tessera_blocks::{MaterialCatalog, MaterialId, StateClass, Voxel};
use tessera_chunk::VoxelGrid;
use tessera_world::ChunkCoord;

pub const MAGIC: [u8; 4] = *b"TSRA";
pub const DURABLE_VERSION: u8 = 1;

const COORD_HEADER: usize = 12;

/// On-disk layout of one chunk file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatVersion {
    /// Bare `{material, state}` cells.
    Raw,
    /// Little-endian `cx, cy, cz` header, then raw cells.
    Located,
    /// Magic, version byte, coordinate header, then cells with health.
    #[default]
    Durable,
}

impl FormatVersion {
    #[inline]
    fn header_len(self) -> usize {
        match self {
            FormatVersion::Raw => 0,
            FormatVersion::Located => COORD_HEADER,
            FormatVersion::Durable => MAGIC.len() + 1 + COORD_HEADER,
        }
    }

    #[inline]
    fn cell_len(self) -> usize {
        match self {
            FormatVersion::Raw | FormatVersion::Located => 2,
            FormatVersion::Durable => 6,
        }
    }

    /// Exact byte length of an encoded chunk with the given edge.
    pub fn encoded_len(self, edge: usize) -> usize {
        self.header_len() + edge * edge * edge * self.cell_len()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum CodecError {
    Length { expected: usize, actual: usize },
    BadMagic,
    UnsupportedVersion(u8),
    CoordMismatch { expected: ChunkCoord, found: ChunkCoord },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Length { expected, actual } => {
                write!(f, "chunk record is {actual} bytes, expected {expected}")
            }
            CodecError::BadMagic => write!(f, "chunk record has a bad magic number"),
            CodecError::UnsupportedVersion(v) => write!(f, "unsupported chunk record version {v}"),
            CodecError::CoordMismatch { expected, found } => {
                write!(f, "chunk record for {found} stored under {expected}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Records that were repaired while decoding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub unknown_materials: usize,
    pub repaired_states: usize,
}

impl DecodeReport {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.unknown_materials == 0 && self.repaired_states == 0
    }
}

/// Cells are written x outer, then y, then z inner.
pub fn encode(grid: &VoxelGrid, coord: ChunkCoord, format: FormatVersion) -> Vec<u8> {
    let edge = grid.edge();
    let mut out = Vec::with_capacity(format.encoded_len(edge));
    if format == FormatVersion::Durable {
        out.extend_from_slice(&MAGIC);
        out.push(DURABLE_VERSION);
    }
    if format != FormatVersion::Raw {
        out.extend_from_slice(&coord.cx.to_le_bytes());
        out.extend_from_slice(&coord.cy.to_le_bytes());
        out.extend_from_slice(&coord.cz.to_le_bytes());
    }
    for x in 0..edge {
        for y in 0..edge {
            for z in 0..edge {
                let v = grid.get(x, y, z);
                out.push(v.material.as_u8());
                out.push(v.state.as_u8());
                if format == FormatVersion::Durable {
                    out.extend_from_slice(&v.health.to_le_bytes());
                }
            }
        }
    }
    out
}

#[inline]
fn read_i32(b: &[u8]) -> i32 {
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

#[inline]
fn read_f32(b: &[u8]) -> f32 {
    f32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn decode_cell(
    catalog: &MaterialCatalog,
    material: u8,
    state: u8,
    health: Option<f32>,
    report: &mut DecodeReport,
) -> Voxel {
    let Some(material) = MaterialId::from_u8(material) else {
        report.unknown_materials += 1;
        return Voxel::AIR;
    };
    let def = catalog.get(material);
    let state = match StateClass::from_u8(state) {
        Some(s) if (s == StateClass::Air) == (material == MaterialId::Air) => s,
        _ => {
            report.repaired_states += 1;
            def.state
        }
    };
    if material == MaterialId::Air {
        return Voxel::AIR;
    }
    let health = match health {
        Some(h) if h.is_finite() && h > 0.0 => h,
        _ => def.max_health,
    };
    Voxel::new(material, state, health, def.hardness)
}

/// Decodes `bytes` into `grid`, overwriting every cell. The grid's edge
/// decides the expected record length.
pub fn decode_into(
    bytes: &[u8],
    coord: ChunkCoord,
    format: FormatVersion,
    catalog: &MaterialCatalog,
    grid: &mut VoxelGrid,
) -> Result<DecodeReport, CodecError> {
    let edge = grid.edge();
    let expected = format.encoded_len(edge);
    if bytes.len() != expected {
        return Err(CodecError::Length {
            expected,
            actual: bytes.len(),
        });
    }
    let mut body = bytes;
    if format == FormatVersion::Durable {
        if body[..MAGIC.len()] != MAGIC {
            return Err(CodecError::BadMagic);
        }
        let version = body[MAGIC.len()];
        if version != DURABLE_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        body = &body[MAGIC.len() + 1..];
    }
    if format != FormatVersion::Raw {
        let found = ChunkCoord::new(
            read_i32(&body[0..4]),
            read_i32(&body[4..8]),
            read_i32(&body[8..12]),
        );
        if found != coord {
            return Err(CodecError::CoordMismatch {
                expected: coord,
                found,
            });
        }
        body = &body[COORD_HEADER..];
    }
    let cell_len = format.cell_len();
    let mut report = DecodeReport::default();
    let mut cells = body.chunks_exact(cell_len);
    for x in 0..edge {
        for y in 0..edge {
            for z in 0..edge {
                let Some(c) = cells.next() else {
                    return Err(CodecError::Length {
                        expected,
                        actual: bytes.len(),
                    });
                };
                let health = (cell_len == 6).then(|| read_f32(&c[2..6]));
                let v = decode_cell(catalog, c[0], c[1], health, &mut report);
                grid.set(x, y, z, v);
            }
        }
    }
    Ok(report)
}

/// Allocating form of [`decode_into`].
pub fn decode(
    bytes: &[u8],
    coord: ChunkCoord,
    edge: usize,
    format: FormatVersion,
    catalog: &MaterialCatalog,
) -> Result<(VoxelGrid, DecodeReport), CodecError> {
    let mut grid = VoxelGrid::new_air(edge);
    let report = decode_into(bytes, coord, format, catalog, &mut grid)?;
    Ok((grid, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(cat: &MaterialCatalog) -> VoxelGrid {
        let mut g = VoxelGrid::new_air(3);
        g.set(0, 0, 0, cat.voxel(MaterialId::Stone));
        g.set(2, 1, 0, cat.voxel(MaterialId::Water));
        g.set(1, 2, 2, cat.voxel(MaterialId::WoodLog));
        g
    }

    #[test]
    fn lengths_per_format() {
        assert_eq!(FormatVersion::Raw.encoded_len(2), 16);
        assert_eq!(FormatVersion::Located.encoded_len(2), 28);
        assert_eq!(FormatVersion::Durable.encoded_len(2), 17 + 48);
    }

    #[test]
    fn x_is_the_outer_axis() {
        let cat = MaterialCatalog::builtin();
        let mut g = VoxelGrid::new_air(2);
        g.set(1, 0, 0, cat.voxel(MaterialId::Dirt));
        g.set(0, 0, 1, cat.voxel(MaterialId::Grass));
        let bytes = encode(&g, ChunkCoord::new(0, 0, 0), FormatVersion::Raw);
        // cell (0,0,1) is second, (1,0,0) is fifth
        assert_eq!(bytes[2], MaterialId::Grass.as_u8());
        assert_eq!(bytes[8], MaterialId::Dirt.as_u8());
    }

    #[test]
    fn located_header_is_little_endian() {
        let cat = MaterialCatalog::builtin();
        let bytes = encode(&sample(&cat), ChunkCoord::new(-2, 3, 258), FormatVersion::Located);
        assert_eq!(&bytes[0..4], &(-2i32).to_le_bytes());
        assert_eq!(&bytes[4..8], &3i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &[2, 1, 0, 0]);
    }

    #[test]
    fn unknown_material_becomes_air() {
        let cat = MaterialCatalog::builtin();
        let mut bytes = encode(&sample(&cat), ChunkCoord::new(0, 0, 0), FormatVersion::Raw);
        bytes[0] = 200;
        let (g, report) = decode(&bytes, ChunkCoord::new(0, 0, 0), 3, FormatVersion::Raw, &cat).unwrap();
        assert_eq!(g.get(0, 0, 0), Voxel::AIR);
        assert_eq!(report.unknown_materials, 1);
    }

    #[test]
    fn contradictory_state_uses_catalog_default() {
        let cat = MaterialCatalog::builtin();
        let mut bytes = encode(&sample(&cat), ChunkCoord::new(0, 0, 0), FormatVersion::Raw);
        // stone tagged as air
        bytes[1] = StateClass::Air.as_u8();
        // unknown state byte on an air cell
        bytes[3] = 9;
        let (g, report) = decode(&bytes, ChunkCoord::new(0, 0, 0), 3, FormatVersion::Raw, &cat).unwrap();
        assert_eq!(g.get(0, 0, 0).state, StateClass::Solid);
        assert!(g.get(0, 0, 1).is_air());
        assert_eq!(report.repaired_states, 2);
    }

    #[test]
    fn durable_keeps_damage() {
        let cat = MaterialCatalog::builtin();
        let mut g = sample(&cat);
        let mut stone = g.get(0, 0, 0);
        stone.deal_damage(1.0);
        g.set(0, 0, 0, stone);
        let c = ChunkCoord::new(4, 0, -4);
        let bytes = encode(&g, c, FormatVersion::Durable);
        let (back, report) = decode(&bytes, c, 3, FormatVersion::Durable, &cat).unwrap();
        assert!(report.is_clean());
        assert_eq!(back, g);
        let (lossy, _) = decode(
            &encode(&g, c, FormatVersion::Located),
            c,
            3,
            FormatVersion::Located,
            &cat,
        )
        .unwrap();
        assert_eq!(lossy.get(0, 0, 0).health, cat.get(MaterialId::Stone).max_health);
    }

    #[test]
    fn header_errors() {
        let cat = MaterialCatalog::builtin();
        let c = ChunkCoord::new(1, 1, 1);
        let mut bytes = encode(&sample(&cat), c, FormatVersion::Durable);
        assert_eq!(
            decode(&bytes[1..], c, 3, FormatVersion::Durable, &cat).unwrap_err(),
            CodecError::Length {
                expected: bytes.len(),
                actual: bytes.len() - 1
            }
        );
        assert_eq!(
            decode(&bytes, ChunkCoord::new(0, 1, 1), 3, FormatVersion::Durable, &cat).unwrap_err(),
            CodecError::CoordMismatch {
                expected: ChunkCoord::new(0, 1, 1),
                found: c
            }
        );
        bytes[4] = 7;
        assert_eq!(
            decode(&bytes, c, 3, FormatVersion::Durable, &cat).unwrap_err(),
            CodecError::UnsupportedVersion(7)
        );
        bytes[0] = b'X';
        assert_eq!(
            decode(&bytes, c, 3, FormatVersion::Durable, &cat).unwrap_err(),
            CodecError::BadMagic
        );
    }
}
