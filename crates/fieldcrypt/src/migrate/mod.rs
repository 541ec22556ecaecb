//! Bulk migration of an existing data store.
//!
//! [`BatchMigrator::run`] drives the engine over every row of every mapped
//! record type, committing every `batch_size` rows. Because the engine is
//! idempotent against the marker, an interrupted run is completed by simply
//! running it again: committed batches are already in the target form and are
//! skipped, the remainder is untouched.
//!
//! A cipher override never touches the configured engine. The run uses a
//! derived engine view, so the configured cipher is back in effect on every
//! exit path and concurrent callers never observe the override.

pub mod repository;

pub use repository::{EntityRepository, MigrationTarget};

use std::sync::Arc;

use common::{Direction, EngineError, MigrationReport, MigrationRequest, RecordFailure, TypeReport, TypeStatus};
use tracing::{debug, info};

use crate::{
    config::DecryptTarget,
    crypto::{CipherProvider, CipherRegistry},
    engine::EncryptionEngine,
    secret::SensitiveValue,
};

/// Progress callbacks of a migration run. Every method defaults to a no-op.
pub trait MigrationObserver {
    /// Scanning of `entity_type` is starting.
    fn type_started(&mut self, _entity_type: &str, _total_rows: u64) {}

    /// A batch was committed; `report` holds the running totals of its type.
    fn batch_committed(&mut self, _report: &TypeReport) {}

    /// A row was left untouched because of an integrity failure.
    fn record_failed(&mut self, _failure: &RecordFailure) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl MigrationObserver for NoopObserver {}

struct CipherSource {
    registry: CipherRegistry,
    key: SensitiveValue,
}

/// Runs ENCRYPT or DECRYPT over whole data stores.
pub struct BatchMigrator {
    engine: EncryptionEngine,
    ciphers: Option<CipherSource>,
}

impl BatchMigrator {
    /// Migrator over `engine`. Requests naming a cipher alias are rejected
    /// unless a registry is supplied with [`BatchMigrator::with_cipher_registry`].
    pub fn new(engine: EncryptionEngine) -> Self {
        Self { engine, ciphers: None }
    }

    /// Resolve request cipher aliases through `registry` using `key`.
    pub fn with_cipher_registry(mut self, registry: CipherRegistry, key: SensitiveValue) -> Self {
        self.ciphers = Some(CipherSource { registry, key });
        self
    }

    /// The configured engine.
    pub fn engine(&self) -> &EncryptionEngine {
        &self.engine
    }

    /// Describe every target without touching data.
    pub fn status(&self, targets: &[&dyn MigrationTarget]) -> Result<Vec<TypeStatus>, EngineError> {
        targets.iter().map(|t| t.status(&self.engine)).collect()
    }

    /// Migrate every target towards `request.direction`.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Configuration`] for a zero batch size, an unknown
    ///   cipher alias, or an ENCRYPT run on a decrypt-only cipher.
    /// - [`EngineError::Store`] if a batch cannot be read or committed. Batches
    ///   committed before the failure stay committed.
    ///
    /// Integrity failures are contained per row and reported.
    pub fn run(
        &self,
        targets: &mut [&mut dyn MigrationTarget],
        request: &MigrationRequest,
        observer: &mut dyn MigrationObserver,
    ) -> Result<MigrationReport, EngineError> {
        let engine = match &request.cipher {
            None => self.engine.clone(),
            Some(alias) => {
                let source = self.ciphers.as_ref().ok_or_else(|| {
                    EngineError::configuration(format!(
                        "cipher override `{alias}` requested but no cipher registry is configured"
                    ))
                })?;
                self.engine.with_cipher(source.registry.by_alias(alias, &source.key)?)
            }
        };
        self.execute(engine, targets, request, observer)
    }

    /// Like [`BatchMigrator::run`], with an explicit cipher instance instead of
    /// an alias.
    pub fn run_with_cipher(
        &self,
        targets: &mut [&mut dyn MigrationTarget],
        request: &MigrationRequest,
        cipher: Arc<dyn CipherProvider>,
        observer: &mut dyn MigrationObserver,
    ) -> Result<MigrationReport, EngineError> {
        self.execute(self.engine.with_cipher(cipher), targets, request, observer)
    }

    fn execute(
        &self,
        engine: EncryptionEngine,
        targets: &mut [&mut dyn MigrationTarget],
        request: &MigrationRequest,
        observer: &mut dyn MigrationObserver,
    ) -> Result<MigrationReport, EngineError> {
        if request.batch_size == 0 {
            return Err(EngineError::configuration("batch_size must be > 0"));
        }
        if request.direction == Direction::Encrypt && !engine.cipher().supports_encryption() {
            return Err(EngineError::configuration(format!(
                "cipher {} is decrypt-only",
                engine.cipher().algorithm()
            )));
        }

        // A DECRYPT migration must persist plaintext into the stored column.
        let engine = engine.with_decrypt_target(DecryptTarget::Canonical);

        info!(
            direction = %request.direction,
            cipher = engine.cipher().algorithm(),
            batch_size = request.batch_size,
            types = targets.len(),
            "starting migration"
        );

        let mut report = MigrationReport {
            direction: request.direction,
            types: Vec::new(),
        };
        for target in targets.iter_mut() {
            let status = target.status(&engine)?;
            if status.is_abstract || status.encrypted_fields + status.embedded_fields == 0 {
                debug!(entity_type = %status.entity_type, "nothing to migrate");
                continue;
            }
            let type_report = target.migrate(&engine, request.direction, request.batch_size, observer)?;
            info!(
                entity_type = %type_report.entity_type,
                rows_scanned = type_report.rows_scanned,
                values_found = type_report.values_found,
                values_processed = type_report.values_processed,
                failed_rows = type_report.failed_rows,
                "record type migrated"
            );
            report.types.push(type_report);
        }

        info!(
            types_processed = report.types_processed(),
            values_found = report.values_found(),
            values_processed = report.values_processed(),
            failed_rows = report.failed_rows(),
            "migration finished"
        );
        Ok(report)
    }
}
