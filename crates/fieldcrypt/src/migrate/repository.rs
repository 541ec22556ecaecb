//! The seam between the batch migrator and a data store.

use std::fmt::Display;

use common::{Direction, EngineError, RecordFailure, TypeReport, TypeStatus};
use tracing::{info, info_span, warn};

use super::MigrationObserver;
use crate::{engine::EncryptionEngine, schema::Encryptable};

/// Keyset-paginated access to every stored record of one type.
///
/// Implementations must return rows in ascending key order so that a run can
/// page forward with constant memory, and must make each
/// [`EntityRepository::write_batch`] call durable on its own.
pub trait EntityRepository {
    /// The record type stored.
    type Record: Encryptable;
    /// Stable, ordered row identity.
    type Key: Clone + Display;

    /// A record used only to resolve the type's descriptor.
    fn blank(&self) -> Self::Record;

    /// Number of stored rows, for progress reporting.
    fn count(&mut self) -> Result<u64, EngineError>;

    /// Key of `record`.
    fn key_of(&self, record: &Self::Record) -> Self::Key;

    /// Up to `limit` rows with keys strictly greater than `after`, ascending.
    fn fetch_after(&mut self, after: Option<&Self::Key>, limit: usize) -> Result<Vec<Self::Record>, EngineError>;

    /// Persist `records` in one transaction.
    fn write_batch(&mut self, records: &[Self::Record]) -> Result<(), EngineError>;
}

/// A type-erased repository, so one run can span many record types.
pub trait MigrationTarget {
    /// Record type name.
    fn entity_type(&self) -> String;

    /// Static description of the record type.
    fn status(&self, engine: &EncryptionEngine) -> Result<TypeStatus, EngineError>;

    /// Transform every stored row, committing every `batch_size` rows.
    fn migrate(
        &mut self,
        engine: &EncryptionEngine,
        direction: Direction,
        batch_size: usize,
        observer: &mut dyn MigrationObserver,
    ) -> Result<TypeReport, EngineError>;
}

impl<R: EntityRepository> MigrationTarget for R {
    fn entity_type(&self) -> String {
        self.blank().entity_type().to_owned()
    }

    fn status(&self, engine: &EncryptionEngine) -> Result<TypeStatus, EngineError> {
        let descriptor = engine.describe(&self.blank())?;
        Ok(TypeStatus {
            entity_type: descriptor.entity_type.clone(),
            is_abstract: descriptor.is_abstract,
            encrypted_fields: descriptor.encrypted_fields(),
            embedded_fields: descriptor.embedded_fields(),
        })
    }

    fn migrate(
        &mut self,
        engine: &EncryptionEngine,
        direction: Direction,
        batch_size: usize,
        observer: &mut dyn MigrationObserver,
    ) -> Result<TypeReport, EngineError> {
        let entity_type = MigrationTarget::entity_type(self);
        let _span = info_span!("migrate_type", %entity_type, %direction).entered();
        let total_rows = self.count()?;
        observer.type_started(&entity_type, total_rows);
        info!(%entity_type, total_rows, %direction, "migrating record type");

        let mut report = TypeReport {
            entity_type: entity_type.clone(),
            ..TypeReport::default()
        };
        let mut cursor: Option<R::Key> = None;

        loop {
            let batch = self.fetch_after(cursor.as_ref(), batch_size)?;
            let fetched = batch.len();
            if fetched == 0 {
                break;
            }
            cursor = batch.last().map(|record| self.key_of(record));

            let mut dirty = Vec::new();
            for mut record in batch {
                report.rows_scanned += 1;
                match engine.process_entity_detailed(&mut record, direction) {
                    Ok(outcome) => {
                        report.values_found += outcome.found as u64;
                        report.values_processed += outcome.processed as u64;
                        if outcome.processed > 0 {
                            dirty.push(record);
                        }
                    }
                    Err(err) if !err.is_fatal() => {
                        let failure = contained_failure(&entity_type, self.key_of(&record).to_string(), &err);
                        warn!(
                            %entity_type,
                            record_key = %failure.record_key,
                            field = ?failure.field,
                            error_code = err.code(),
                            reason = %failure.reason,
                            "record left untouched"
                        );
                        observer.record_failed(&failure);
                        report.record_failure(failure);
                    }
                    Err(err) => return Err(err),
                }
            }

            if !dirty.is_empty() {
                self.write_batch(&dirty)?;
            }
            report.batches_committed += 1;
            observer.batch_committed(&report);
            info!(
                %entity_type,
                rows_scanned = report.rows_scanned,
                rows_written = dirty.len(),
                values_processed = report.values_processed,
                "batch committed"
            );

            if fetched < batch_size {
                break;
            }
        }

        Ok(report)
    }
}

/// Describe a row-contained engine error. Failures inside an embedded object
/// are reported as `owner.field`.
fn contained_failure(entity_type: &str, record_key: String, err: &EngineError) -> RecordFailure {
    let (field, reason) = match err {
        EngineError::Integrity {
            entity_type: owner,
            field,
            reason,
        } if owner == entity_type => (Some(field.clone()), reason.clone()),
        EngineError::Integrity {
            entity_type: owner,
            field,
            reason,
        } => (Some(format!("{owner}.{field}")), reason.clone()),
        other => (None, other.to_string()),
    };
    RecordFailure {
        entity_type: entity_type.to_owned(),
        record_key,
        field,
        code: err.code().to_owned(),
        reason,
    }
}
