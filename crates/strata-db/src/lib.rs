//! Versioned, transactional schema migrations for SQLite.
//!
//! A [`MigrationSource`] describes the steps a database needs given the
//! version it records in `PRAGMA user_version`. A [`Migrator`] applies those
//! steps inside one exclusive transaction, bumping the version after each,
//! and commits only once every step has succeeded. [`SqliteDatabase`] wraps
//! this for async callers.
//!
//! ```no_run
//! use strata_db::{CancelSignal, MigrationStep, SqliteDatabase, ThresholdSource};
//!
//! # async fn run() -> Result<(), strata_db::MigrationError> {
//! let source = ThresholdSource::new()
//!     .step(1, MigrationStep::new("CREATE TABLE person (id INTEGER PRIMARY KEY)")?)?
//!     .step(2, MigrationStep::new("ALTER TABLE person ADD COLUMN name TEXT")?)?;
//!
//! let report = SqliteDatabase::new("data.db")
//!     .migrate(source, &CancelSignal::never())
//!     .await?;
//! assert_eq!(report.to_version, 2);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod database;
pub mod engine;
pub mod error;
pub mod migrations;
pub mod observe;
pub mod source;

/// Number of migration steps durably applied to a database.
pub type SchemaVersion = u32;

pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use database::SqliteDatabase;
pub use engine::{DEFAULT_STEP_TIMEOUT, MigrationReport, Migrator, read_version};
pub use error::{MigrationError, Result};
pub use migrations::{ExecutionMode, MigrationStep, StepParams};
pub use observe::{LoggedSource, MigrationSourceExt, ObservedSource, PlanObserver, TracingObserver};
pub use source::{MigrationPlan, MigrationSource, ThresholdSource};
