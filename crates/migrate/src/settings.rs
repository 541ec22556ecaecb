//! Configuration loading and validation for the migration binary.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use anyhow::{Context, Result};
use common::{Direction, DEFAULT_BATCH_SIZE};
use fieldcrypt::{CipherSelection, DecryptTarget, EngineConfig, SensitiveValue};
use serde::Deserialize;

/// What the binary does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Encrypt every plaintext value of the configured columns.
    Encrypt,
    /// Decrypt every ciphertext value of the configured columns.
    Decrypt,
    /// Report the configured tables without touching data.
    Status,
}

impl Mode {
    /// Migration direction, `None` for [`Mode::Status`].
    pub fn direction(self) -> Option<Direction> {
        match self {
            Mode::Encrypt => Some(Direction::Encrypt),
            Mode::Decrypt => Some(Direction::Decrypt),
            Mode::Status => None,
        }
    }
}

/// One table and its encrypted columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name.
    pub name: String,
    /// Columns holding encrypted values, in declaration order.
    pub columns: Vec<String>,
}

/// Validated migration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Secret key of the configured cipher. **Required.**
    pub secret_key: SensitiveValue,

    /// Cipher alias, e.g. `aes-256-cbc`.
    #[serde(default)]
    pub cipher: Option<String>,

    /// Fully qualified cipher identifier. Wins over `CIPHER`.
    #[serde(default)]
    pub cipher_impl: Option<String>,

    /// Path of the SQLite database. **Required.**
    pub database_path: String,

    /// Encrypted columns per table: `table=col1|col2;other=col`. **Required.**
    pub tables: String,

    /// `encrypt`, `decrypt` or `status`.
    #[serde(default = "default_mode")]
    pub mode: Mode,

    /// Cipher alias to migrate with instead of the configured one.
    #[serde(default)]
    pub migration_cipher: Option<String>,

    /// Rows committed per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_mode() -> Mode {
    Mode::Status
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_log_level() -> String {
    "info".into()
}

impl Settings {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::load(config::Environment::default())
    }

    fn load(source: config::Environment) -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(source)
            .build()
            .context("failed to build configuration from environment")?;

        let s: Settings = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        s.validate()?;
        Ok(s)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        if self.secret_key.is_empty() {
            anyhow::bail!("SECRET_KEY is required and must not be empty");
        }
        ensure_non_empty(&self.database_path, "DATABASE_PATH")?;
        if self.batch_size == 0 {
            anyhow::bail!("BATCH_SIZE must be > 0");
        }
        self.table_specs()?;
        Ok(())
    }

    /// Parsed `TABLES`.
    pub fn table_specs(&self) -> Result<Vec<TableSpec>> {
        parse_tables(&self.tables)
    }

    /// Engine settings. Rows carry no embedded objects, and decrypted values
    /// always go back into their column.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            decrypt_target: DecryptTarget::Canonical,
            ..EngineConfig::default()
        }
    }

    /// The configured cipher.
    pub fn cipher_selection(&self) -> CipherSelection {
        CipherSelection {
            cipher: self.cipher.clone(),
            cipher_impl: self.cipher_impl.clone(),
        }
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}

/// Parse `table=col1|col2;other=col`.
pub fn parse_tables(raw: &str) -> Result<Vec<TableSpec>> {
    let mut specs: Vec<TableSpec> = Vec::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, columns) = entry
            .split_once('=')
            .with_context(|| format!("TABLES entry `{entry}` must look like table=col1|col2"))?;
        let name = name.trim();
        ensure_identifier(name)?;

        let columns: Vec<String> = columns
            .split('|')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_owned)
            .collect();
        if columns.is_empty() {
            anyhow::bail!("TABLES entry for `{name}` names no columns");
        }
        for column in &columns {
            ensure_identifier(column)?;
        }

        if specs.iter().any(|s| s.name == name) {
            anyhow::bail!("table `{name}` appears more than once in TABLES");
        }
        specs.push(TableSpec {
            name: name.to_owned(),
            columns,
        });
    }
    if specs.is_empty() {
        anyhow::bail!("TABLES is required and must name at least one table");
    }
    Ok(specs)
}

/// `[A-Za-z_][A-Za-z0-9_]*`; names are interpolated into SQL.
fn ensure_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        anyhow::bail!("`{name}` is not a valid SQL identifier");
    }
    Ok(())
}
