use std::time::{Duration, Instant};

use rusqlite::{Batch, Connection, Statement, ToSql, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::SchemaVersion;
use crate::cancel::CancelSignal;
use crate::error::{MigrationError, Result};
use crate::migrations::{ExecutionMode, MigrationStep, StepParams};
use crate::source::MigrationSource;

/// Timeout for steps that don't declare one.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Number of SQLite VM instructions between deadline checks.
const PROGRESS_INTERVAL: i32 = 1_000;

/// Outcome of a committed migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub from_version: SchemaVersion,
    pub to_version: SchemaVersion,
    pub steps_applied: usize,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.steps_applied == 0
    }
}

/// Applies a source's plan to a connection inside one exclusive transaction.
#[derive(Debug, Clone)]
pub struct Migrator {
    default_timeout: Duration,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Migrator {
    pub fn new() -> Self {
        Self {
            default_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    /// Timeout for steps without their own. `Duration::ZERO` disables it.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Bring `conn` up to the latest version `source` knows about.
    ///
    /// Either every pending step and its version bump commit together, or
    /// the transaction is rolled back and the database keeps its previous
    /// version. Cancellation is honoured before the transaction starts,
    /// before each step and before the commit.
    pub fn run(
        &self,
        conn: &mut Connection,
        source: &dyn MigrationSource,
        cancel: &CancelSignal,
    ) -> Result<MigrationReport> {
        cancel.check()?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Exclusive)
            .map_err(|e| MigrationError::storage("begin migration transaction", e))?;

        let from_version = read_version(&tx)?;
        debug!(from_version, "read schema version");

        let outcome = self
            .apply_plan(&tx, source, from_version, cancel)
            .and_then(|report| cancel.check().map(|()| report));

        let report = match outcome {
            Ok(report) => report,
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("rollback after failed migration also failed: {rollback_err}");
                }
                return Err(e);
            }
        };

        tx.commit()
            .map_err(|source| MigrationError::CommitFailed { source })?;

        if report.is_noop() {
            debug!(version = report.to_version, "schema already up to date");
        } else {
            info!(
                from_version = report.from_version,
                to_version = report.to_version,
                "applied {} migration step(s)",
                report.steps_applied
            );
        }
        Ok(report)
    }

    fn apply_plan(
        &self,
        tx: &Transaction<'_>,
        source: &dyn MigrationSource,
        from_version: SchemaVersion,
        cancel: &CancelSignal,
    ) -> Result<MigrationReport> {
        let mut version = from_version;
        let mut steps_applied = 0;

        for (step_index, step) in source.steps_for(from_version).enumerate() {
            cancel.check()?;

            let target_version = next_version(version)?;
            let step_failed = |source: rusqlite::Error| MigrationError::StepExecutionFailed {
                step_index,
                target_version,
                source,
            };

            let timeout = step.timeout().unwrap_or(self.default_timeout);
            let changed = execute_step(tx, &step, timeout).map_err(step_failed)?;
            write_version(tx, target_version).map_err(step_failed)?;

            debug!(step = step_index, version = target_version, changed, "step applied");
            version = target_version;
            steps_applied += 1;
        }

        Ok(MigrationReport {
            from_version,
            to_version: version,
            steps_applied,
        })
    }
}

/// Read `PRAGMA user_version` on `conn`.
pub fn read_version(conn: &Connection) -> Result<SchemaVersion> {
    let raw: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| MigrationError::storage("read schema version", e))?;
    SchemaVersion::try_from(raw).map_err(|_| MigrationError::InvalidVersion(raw))
}

fn write_version(conn: &Connection, version: SchemaVersion) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}

/// `user_version` is a signed 32-bit slot.
fn next_version(version: SchemaVersion) -> Result<SchemaVersion> {
    let next = i64::from(version) + 1;
    if next > i64::from(i32::MAX) {
        return Err(MigrationError::InvalidVersion(next));
    }
    Ok(version + 1)
}

fn execute_step(
    conn: &Connection,
    step: &MigrationStep,
    timeout: Duration,
) -> rusqlite::Result<usize> {
    let _deadline = Deadline::arm(conn, timeout);

    match step.effective_mode() {
        ExecutionMode::Batch => {
            conn.execute_batch(step.sql())?;
            Ok(conn.changes() as usize)
        }
        ExecutionMode::Statement => {
            let mut stmt = prepare_single(conn, step.sql())?;
            match step.params() {
                StepParams::None => stmt.execute([]),
                StepParams::Positional(values) => {
                    stmt.execute(rusqlite::params_from_iter(values.iter()))
                }
                StepParams::Named(values) => {
                    let named: Vec<(&str, &dyn ToSql)> = values
                        .iter()
                        .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
                        .collect();
                    stmt.execute(named.as_slice())
                }
            }
        }
    }
}

/// Prepare `sql`, which must hold exactly one statement. Trailing
/// whitespace and comments are allowed.
fn prepare_single<'c>(conn: &'c Connection, sql: &str) -> rusqlite::Result<Statement<'c>> {
    let mut statements = 0;
    let mut batch = Batch::new(conn, sql);
    while batch.next()?.is_some() {
        statements += 1;
        if statements > 1 {
            return Err(rusqlite::Error::MultipleStatement);
        }
    }
    conn.prepare(sql)
}

/// Interrupts the running statement once the step's time is up. Removed
/// again when dropped.
struct Deadline<'c> {
    conn: &'c Connection,
}

impl<'c> Deadline<'c> {
    fn arm(conn: &'c Connection, timeout: Duration) -> Option<Self> {
        if timeout.is_zero() {
            return None;
        }
        let expires = Instant::now().checked_add(timeout)?;
        conn.progress_handler(
            PROGRESS_INTERVAL,
            Some(move || {
                let expired = Instant::now() >= expires;
                if expired {
                    warn!("migration step exceeded its {timeout:?} timeout, interrupting");
                }
                expired
            }),
        );
        Some(Self { conn })
    }
}

impl Drop for Deadline<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}
