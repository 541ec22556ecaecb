//! Common types, protocol definitions, and errors shared across `fieldcrypt` crates.

pub mod error;
pub mod protocol;

pub use error::EngineError;
pub use protocol::{
    Direction, MigrationReport, MigrationRequest, RecordFailure, TypeReport, TypeStatus, DEFAULT_BATCH_SIZE,
    MAX_REPORTED_FAILURES,
};
