//! Chunk persistence: binary chunk records and a write-back file store.
#![forbid(unsafe_code)]

pub mod codec;
pub mod store;

pub use codec::{CodecError, DecodeReport, FormatVersion, decode, decode_into, encode};
pub use store::{FlushReport, PersistenceStore, StoreError, StoreStats};
