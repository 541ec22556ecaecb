//! Request and response types of the batch operation surface.
//!
//! These are consumed by whatever front end drives a migration (the bundled
//! `fieldcrypt-migrate` binary, or a host application's own tooling) and are
//! serialisable so reports can be emitted as JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way a record's encryptable fields are transformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Plaintext → marked ciphertext.
    Encrypt,
    /// Marked ciphertext → plaintext.
    Decrypt,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Encrypt => f.write_str("encrypt"),
            Direction::Decrypt => f.write_str("decrypt"),
        }
    }
}

// ---------------------------------------------------------------------------
// Migration request / report
// ---------------------------------------------------------------------------

/// Default number of rows committed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Failures kept per type in a [`TypeReport`]; the rest are only counted.
pub const MAX_REPORTED_FAILURES: usize = 100;

/// Parameters of one batch migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    /// Target state of every encryptable value.
    pub direction: Direction,
    /// Optional cipher alias to run with instead of the configured one.
    #[serde(default)]
    pub cipher: Option<String>,
    /// Rows per committed batch. Must be > 0.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl MigrationRequest {
    /// A request in `direction` with the configured cipher and default batch size.
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            cipher: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// A record that could not be transformed and was left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Record type of the row.
    pub entity_type: String,
    /// Display form of the row's key.
    pub record_key: String,
    /// Field that failed, when known.
    pub field: Option<String>,
    /// Machine-readable error kind, e.g. `integrity`.
    pub code: String,
    /// Error description (no data).
    pub reason: String,
}

/// Running counters for one record type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeReport {
    /// Record type.
    pub entity_type: String,
    /// Rows read from the store.
    pub rows_scanned: u64,
    /// Non-empty string values seen in encryptable fields.
    pub values_found: u64,
    /// Values actually transformed.
    pub values_processed: u64,
    /// Batches durably committed.
    pub batches_committed: u64,
    /// Rows skipped because of an integrity failure.
    #[serde(default)]
    pub failed_rows: u64,
    /// The first [`MAX_REPORTED_FAILURES`] of those rows.
    pub failures: Vec<RecordFailure>,
}

impl TypeReport {
    /// Count a skipped row, keeping its details while the sample has room.
    pub fn record_failure(&mut self, failure: RecordFailure) {
        self.failed_rows += 1;
        if self.failures.len() < MAX_REPORTED_FAILURES {
            self.failures.push(failure);
        }
    }
}

/// Outcome of a whole migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    /// Direction the run migrated towards.
    pub direction: Direction,
    /// Per-type counters, in processing order.
    pub types: Vec<TypeReport>,
}

impl MigrationReport {
    /// Number of record types that were scanned.
    pub fn types_processed(&self) -> usize {
        self.types.len()
    }

    /// Total values found across all types.
    pub fn values_found(&self) -> u64 {
        self.types.iter().map(|t| t.values_found).sum()
    }

    /// Total values transformed across all types.
    pub fn values_processed(&self) -> u64 {
        self.types.iter().map(|t| t.values_processed).sum()
    }

    /// Total rows skipped across all types.
    pub fn failed_rows(&self) -> u64 {
        self.types.iter().map(|t| t.failed_rows).sum()
    }

    /// The sampled record failures across all types.
    pub fn failures(&self) -> impl Iterator<Item = &RecordFailure> {
        self.types.iter().flat_map(|t| t.failures.iter())
    }
}

/// Static description of one mapped record type, as reported by a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeStatus {
    /// Record type.
    pub entity_type: String,
    /// `true` for abstract base types that are never scanned on their own.
    pub is_abstract: bool,
    /// Number of fields carrying the encryption tag.
    pub encrypted_fields: usize,
    /// Number of embedded value objects that are traversed.
    pub embedded_fields: usize,
}
