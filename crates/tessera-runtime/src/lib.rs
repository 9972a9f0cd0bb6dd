//! Chunk streaming, background worker lanes, and the session facade.
#![forbid(unsafe_code)]

pub mod config;
pub mod events;
pub mod lanes;
pub mod session;
pub mod streaming;

pub use config::{
    PersistenceConfig, SessionConfig, StreamingConfig, WorkerConfig, load_config_from_path,
};
pub use events::MeshEvent;
pub use lanes::{
    IoJob, JobFailure, JobKind, JobOut, LaneCounts, LoadJob, LoadOut, LoadSource, MeshJob, MeshOut,
    QueueCounts, Runtime, WorkerCtx,
};
pub use session::{SessionError, SessionStats, WorldSession};
pub use streaming::{ChunkState, MAX_MESH_ATTEMPTS, StreamCtx, StreamingManager, TickReport};
