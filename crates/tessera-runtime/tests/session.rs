use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use tessera_blocks::{DamageOutcome, MaterialCatalog, MaterialId, StateClass, Voxel};
use tessera_geom::Vec3;
use tessera_mesh_cpu::{ExtractInput, ExtractorKind, MeshBuffer, SurfaceExtractor};
use tessera_runtime::{
    ChunkState, MAX_MESH_ATTEMPTS, MeshEvent, SessionConfig, SessionError, WorkerConfig,
    WorldSession,
};
use tessera_world::ChunkCoord;

const SETTLE: Duration = Duration::from_secs(20);

fn test_config(dir: &Path) -> SessionConfig {
    let mut cfg = SessionConfig::default();
    cfg.world.chunk_edge = 8;
    cfg.world.world_height = 32;
    cfg.streaming.view_radius = 1;
    cfg.streaming.tick_interval_secs = 0.0;
    cfg.streaming.max_loads_per_tick = 64;
    cfg.persistence.save_dir = dir.to_path_buf();
    cfg.workers = WorkerConfig { load: 2, mesh: 2 };
    cfg
}

fn session(dir: &Path) -> WorldSession {
    WorldSession::new(test_config(dir), MaterialCatalog::builtin()).unwrap()
}

fn settle_at(s: &mut WorldSession, pos: Vec3) {
    s.update(0.0, pos);
    assert!(s.pump_until_idle(SETTLE), "workers did not go idle");
}

fn origin() -> Vec3 {
    Vec3::new(4.0, 20.0, 4.0)
}

fn attached_coords(events: &[MeshEvent]) -> Vec<ChunkCoord> {
    events
        .iter()
        .filter_map(|e| match e {
            MeshEvent::Attached { coord, .. } => Some(*coord),
            MeshEvent::Detached { .. } => None,
        })
        .collect()
}

#[test]
fn streaming_loads_every_layer_within_radius() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    settle_at(&mut s, origin());
    // 3x3 columns, 4 layers of 8 in a 32-high world
    assert_eq!(s.streaming().resident_count(), 36);
    assert_eq!(s.streaming().loading_count(), 0);
    for cx in -1..=1 {
        for cz in -1..=1 {
            for cy in 0..4 {
                let c = ChunkCoord::new(cx, cy, cz);
                assert_eq!(s.streaming().state(c), ChunkState::Resident, "{c}");
            }
        }
    }
    assert_eq!(s.streaming().state(ChunkCoord::new(2, 0, 0)), ChunkState::Unloaded);
    assert_eq!(s.streaming().state(ChunkCoord::new(0, 4, 0)), ChunkState::Unloaded);
    assert_eq!(s.stats().generated, 36);
}

#[test]
fn every_resident_chunk_gets_a_mesh() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    settle_at(&mut s, origin());
    let attached: HashSet<ChunkCoord> = attached_coords(&s.drain_mesh_events()).into_iter().collect();
    let resident: HashSet<ChunkCoord> = s.streaming().resident_coords().collect();
    assert_eq!(attached, resident);
    for c in &resident {
        let chunk = s.streaming().chunk(*c).unwrap();
        assert!(!chunk.is_dirty());
        assert_eq!(chunk.attached_version(), chunk.mesh_version());
    }
}

#[test]
fn border_edit_remeshes_the_neighbor() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    settle_at(&mut s, origin());
    s.drain_mesh_events();

    // x = 7 is the last column of chunk 0 with edge 8
    let prev = s.set_voxel(7, 10, 3, s.catalog().voxel(MaterialId::Air)).unwrap();
    assert!(!prev.is_air());
    assert!(s.get_voxel(7, 10, 3).unwrap().is_air());
    let owner = ChunkCoord::new(0, 1, 0);
    assert!(s.streaming().chunk(owner).unwrap().is_dirty());
    assert!(s.streaming().chunk(ChunkCoord::new(1, 1, 0)).unwrap().is_dirty());
    assert!(!s.streaming().chunk(ChunkCoord::new(-1, 1, 0)).unwrap().is_dirty());

    s.update(0.0, origin());
    assert!(s.pump_until_idle(SETTLE));
    let attached: HashSet<ChunkCoord> = attached_coords(&s.drain_mesh_events()).into_iter().collect();
    assert!(attached.contains(&owner));
    assert!(attached.contains(&ChunkCoord::new(1, 1, 0)));
    assert!(!attached.contains(&ChunkCoord::new(-1, 1, 0)));
    assert_eq!(s.stats().edits.edits, 1);
}

#[test]
fn edits_survive_unload_and_reload() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    settle_at(&mut s, origin());
    let log = s.catalog().voxel(MaterialId::WoodLog);
    s.set_voxel(2, 10, 2, log).unwrap();

    let far = Vec3::new(84.0, 20.0, 4.0);
    settle_at(&mut s, far);
    assert!(matches!(
        s.get_voxel(2, 10, 2),
        Err(SessionError::NotResident(c)) if c == ChunkCoord::new(0, 1, 0)
    ));
    let detached = s
        .drain_mesh_events()
        .iter()
        .filter(|e| matches!(e, MeshEvent::Detached { .. }))
        .count();
    assert_eq!(detached, 36);

    settle_at(&mut s, origin());
    assert_eq!(s.get_voxel(2, 10, 2).unwrap(), log);
    assert!(s.stats().loaded_from_disk >= 36);
}

#[test]
fn duplicate_remesh_attaches_once() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    settle_at(&mut s, origin());
    s.drain_mesh_events();

    let c = ChunkCoord::new(0, 3, 0);
    let before = s.streaming().chunk(c).unwrap().attached_version();
    assert!(s.request_remesh(c));
    assert!(s.request_remesh(c));
    assert!(s.pump_until_idle(SETTLE));
    let attached = attached_coords(&s.drain_mesh_events());
    assert_eq!(attached, vec![c]);
    let chunk = s.streaming().chunk(c).unwrap();
    assert_eq!(chunk.attached_version(), before + 1);
    assert!(s.stats().meshes_discarded >= 1);
}

#[test]
fn edit_api_rejects_bad_positions() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    settle_at(&mut s, origin());
    assert!(matches!(s.get_voxel(0, -1, 0), Err(SessionError::OutOfWorld { wy: -1 })));
    assert!(matches!(s.get_voxel(0, 32, 0), Err(SessionError::OutOfWorld { wy: 32 })));
    let air = s.catalog().voxel(MaterialId::Air);
    assert!(matches!(
        s.set_voxel(1000, 5, 0, air),
        Err(SessionError::NotResident(c)) if c == ChunkCoord::new(125, 0, 0)
    ));
    // negative positions floor into the chunk at -1
    assert!(s.get_voxel(-1, 5, -8).is_ok());
    assert!(s.get_voxel(-9, 5, 0).is_err());
}

#[test]
fn damage_destroys_and_marks_dirty() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    settle_at(&mut s, origin());
    let target = s.get_voxel(3, 5, 3).unwrap();
    assert!(target.is_solid());
    assert!(matches!(
        s.damage_voxel(3, 5, 3, 0.01).unwrap(),
        DamageOutcome::Damaged { .. }
    ));
    assert!(!s.streaming().chunk(ChunkCoord::new(0, 0, 0)).unwrap().is_dirty());
    assert_eq!(s.damage_voxel(3, 5, 3, 1.0e6).unwrap(), DamageOutcome::Destroyed);
    assert!(s.get_voxel(3, 5, 3).unwrap().is_air());
    assert!(s.streaming().chunk(ChunkCoord::new(0, 0, 0)).unwrap().is_dirty());
}

#[test]
fn extract_now_uses_resident_neighbors() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    settle_at(&mut s, origin());
    // the world is solid below 32 with these settings; only the top layer
    // has faces, and only toward the open sky
    let buried = s.extract_now(ChunkCoord::new(0, 0, 0)).unwrap();
    assert!(buried.is_empty());
    let top = s.extract_now(ChunkCoord::new(0, 3, 0)).unwrap();
    assert!(!top.is_empty());
    assert!(s.extract_now(ChunkCoord::new(9, 0, 9)).is_none());
}

#[test]
fn shutdown_writes_every_resident_chunk() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    settle_at(&mut s, origin());
    let report = s.shutdown();
    assert_eq!(report.failed, 0);
    assert_eq!(report.written, 36);
    assert!(tmp.path().join("chunk_0_0_0.dat").is_file());
    assert!(tmp.path().join("chunk_-1_3_1.dat").is_file());

    let s = session(tmp.path());
    assert_eq!(s.clear_saves().unwrap(), 36);
    assert!(!tmp.path().join("chunk_0_0_0.dat").exists());
}

#[test]
fn periodic_save_flushes_through_io_lane() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = test_config(tmp.path());
    cfg.persistence.save_interval_secs = 1.0;
    let mut s = WorldSession::new(cfg, MaterialCatalog::builtin()).unwrap();
    settle_at(&mut s, origin());
    s.update(1.5, origin());
    assert!(s.pump_until_idle(SETTLE));
    assert_eq!(s.stats().flushes, 1);
    assert!(tmp.path().join("chunk_1_2_1.dat").is_file());
}

struct Exploding;

impl SurfaceExtractor for Exploding {
    fn kind(&self) -> ExtractorKind {
        ExtractorKind::Faces
    }

    fn extract(&self, _input: &ExtractInput) -> MeshBuffer {
        panic!("extractor exploded")
    }
}

#[test]
fn mesh_panics_become_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = WorldSession::with_extractor(
        test_config(tmp.path()),
        MaterialCatalog::builtin(),
        Box::new(Exploding),
    )
    .unwrap();
    s.update(0.0, origin());
    assert!(s.pump_until_idle(SETTLE), "failing meshes kept the lanes busy");
    let stats = s.stats();
    assert_eq!(stats.resident, 36);
    assert!(stats.failures >= 36 * u64::from(MAX_MESH_ATTEMPTS));
    assert_eq!(stats.meshes_attached, 0);
    assert!(attached_coords(&s.drain_mesh_events()).is_empty());
    for c in s.streaming().resident_coords() {
        let chunk = s.streaming().chunk(c).unwrap();
        assert!(!chunk.is_dirty(), "{c}");
        assert_eq!(s.streaming().mesh_attempts(c), MAX_MESH_ATTEMPTS, "{c}");
    }

    // an edit gives the chunk a fresh set of attempts
    let before = s.stats().failures;
    s.set_voxel(3, 12, 3, s.catalog().voxel(MaterialId::Air)).unwrap();
    let c = ChunkCoord::new(0, 1, 0);
    assert!(s.streaming().chunk(c).unwrap().is_dirty());
    assert_eq!(s.streaming().mesh_attempts(c), 0);
    assert!(s.pump_until_idle(SETTLE));
    assert!(s.stats().failures >= before + u64::from(MAX_MESH_ATTEMPTS));
    assert_eq!(s.streaming().mesh_attempts(c), MAX_MESH_ATTEMPTS);
}

#[test]
fn invalid_config_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = test_config(tmp.path());
    cfg.world.chunk_edge = 0;
    assert!(matches!(
        WorldSession::new(cfg, MaterialCatalog::builtin()),
        Err(SessionError::Config(_))
    ));
}

#[test]
fn walking_back_and_forth_keeps_one_load_per_chunk() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    let far = Vec3::new(84.0, 20.0, 4.0);
    for pos in [origin(), far, origin(), far, origin()] {
        s.update(0.0, pos);
        let stats = s.stats();
        let tracked = stats.loading + stats.cancelled;
        let q = s.stats().queues.load;
        let on_lane = q.queued + q.inflight;
        // every job still on the lane belongs to a tracked ticket
        assert!(on_lane <= tracked, "{on_lane} on lane, {tracked} tracked");
        assert!(stats.resident + tracked <= 72);
    }
    assert!(s.pump_until_idle(SETTLE));
    s.update(0.0, origin());
    assert!(s.pump_until_idle(SETTLE));
    let stats = s.stats();
    assert_eq!(stats.resident, 36);
    assert_eq!(stats.loading, 0);
    assert_eq!(stats.cancelled, 0);
    let resident: HashSet<ChunkCoord> = s.streaming().resident_coords().collect();
    assert!(resident.contains(&ChunkCoord::new(-1, 0, 1)));
}

#[test]
fn marching_cubes_closes_seams_between_resident_chunks() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = test_config(tmp.path());
    cfg.meshing.extractor = ExtractorKind::MarchingCubes;
    let mut s = WorldSession::new(cfg, MaterialCatalog::builtin()).unwrap();
    settle_at(&mut s, origin());

    let mut latest = HashMap::new();
    for ev in s.drain_mesh_events() {
        if let MeshEvent::Attached { coord, mesh } = ev {
            latest.insert(coord, mesh);
        }
    }
    // the world is solid up to its top, so the surface is one flat sheet at
    // the top layer: two triangles per lattice cell
    let inner = ChunkCoord::new(0, 3, 0);
    assert_eq!(latest[&inner].triangle_count(), 8 * 8 * 2);
    // cells reaching into the unloaded ring beyond +x and +z are skipped
    let corner = ChunkCoord::new(1, 3, 1);
    assert_eq!(latest[&corner].triangle_count(), 7 * 7 * 2);
    let west = ChunkCoord::new(-1, 3, 0);
    assert_eq!(latest[&west].triangle_count(), 8 * 8 * 2);
    assert_eq!(latest[&ChunkCoord::new(0, 0, 0)].triangle_count(), 0);

    // the attached mesh is the one a fresh extraction gives
    let now = s.extract_now(inner).unwrap();
    assert_eq!(now.triangle_count(), latest[&inner].triangle_count());
}

#[test]
fn set_voxel_repairs_state_from_the_catalog() {
    let tmp = tempfile::tempdir().unwrap();
    let mut s = session(tmp.path());
    settle_at(&mut s, origin());
    let mut water = s.catalog().voxel(MaterialId::Water);
    water.state = StateClass::Air;
    s.set_voxel(2, 30, 2, water).unwrap();
    let stored = s.get_voxel(2, 30, 2).unwrap();
    assert_eq!(stored.material, MaterialId::Water);
    assert_eq!(stored.state, StateClass::Liquid);

    let mut ghost = s.catalog().voxel(MaterialId::Stone);
    ghost.material = MaterialId::Air;
    s.set_voxel(2, 29, 2, ghost).unwrap();
    assert_eq!(s.get_voxel(2, 29, 2).unwrap(), Voxel::AIR);
}
