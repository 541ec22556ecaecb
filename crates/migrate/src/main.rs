//! `fieldcrypt-migrate`: encrypt, decrypt or describe the encrypted columns of
//! a SQLite database.
//!
//! Startup sequence:
//! 1. Load and validate [`Settings`] from environment variables.
//! 2. Initialise structured JSON logging.
//! 3. Build the configured cipher and the engine.
//! 4. Open the database and bind one repository per configured table.
//! 5. Report status, or run the migration and log the report.

mod settings;
mod sqlite;
mod telemetry;

use anyhow::{Context, Result};
use common::{MigrationRequest, RecordFailure, TypeReport};
use fieldcrypt::{BatchMigrator, CipherRegistry, EncryptionEngine, MigrationObserver, MigrationTarget};
use rusqlite::Connection;
use tracing::{info, warn};

use settings::Settings;
use sqlite::SqliteRepository;

fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Settings::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;

    // -----------------------------------------------------------------------
    // 3. Cipher and engine
    // -----------------------------------------------------------------------
    let registry = CipherRegistry::with_builtins();
    let cipher = registry
        .build(&cfg.cipher_selection(), &cfg.secret_key)
        .context("failed to build the configured cipher")?;
    info!(cipher = cipher.algorithm(), "cipher ready");
    let engine = EncryptionEngine::new(cipher, cfg.engine_config())?;
    let migrator = BatchMigrator::new(engine).with_cipher_registry(registry, cfg.secret_key.clone());

    // -----------------------------------------------------------------------
    // 4. Storage
    // -----------------------------------------------------------------------
    let conn = Connection::open(&cfg.database_path)
        .with_context(|| format!("failed to open database {}", cfg.database_path))?;
    let mut repos = cfg
        .table_specs()?
        .into_iter()
        .map(|spec| SqliteRepository::open(&conn, spec))
        .collect::<Result<Vec<_>, _>>()?;

    // -----------------------------------------------------------------------
    // 5. Run
    // -----------------------------------------------------------------------
    let Some(direction) = cfg.mode.direction() else {
        let targets: Vec<&dyn MigrationTarget> = repos.iter().map(|r| r as &dyn MigrationTarget).collect();
        for status in migrator.status(&targets)? {
            info!(
                entity_type = %status.entity_type,
                is_abstract = status.is_abstract,
                encrypted_fields = status.encrypted_fields,
                embedded_fields = status.embedded_fields,
                "mapped record type"
            );
        }
        return Ok(());
    };

    let request = MigrationRequest {
        direction,
        cipher: cfg.migration_cipher.clone(),
        batch_size: cfg.batch_size,
    };
    let mut targets: Vec<&mut dyn MigrationTarget> =
        repos.iter_mut().map(|r| r as &mut dyn MigrationTarget).collect();
    let report = migrator.run(&mut targets, &request, &mut ProgressLog::default())?;

    info!(
        report = %serde_json::to_string(&report).context("failed to encode report")?,
        "migration report"
    );

    let failed = report.failed_rows();
    if failed > 0 {
        anyhow::bail!("{failed} record(s) could not be migrated and were left untouched");
    }
    Ok(())
}

/// Logs progress of a migration run.
#[derive(Default)]
struct ProgressLog {
    total_rows: u64,
}

impl MigrationObserver for ProgressLog {
    fn type_started(&mut self, entity_type: &str, total_rows: u64) {
        self.total_rows = total_rows;
        info!(entity_type, total_rows, "scanning table");
    }

    fn batch_committed(&mut self, report: &TypeReport) {
        let percent = if self.total_rows == 0 {
            100
        } else {
            (report.rows_scanned.min(self.total_rows) * 100) / self.total_rows
        };
        info!(
            entity_type = %report.entity_type,
            rows_scanned = report.rows_scanned,
            percent,
            "progress"
        );
    }

    fn record_failed(&mut self, failure: &RecordFailure) {
        warn!(
            entity_type = %failure.entity_type,
            record_key = %failure.record_key,
            "row skipped"
        );
    }
}
