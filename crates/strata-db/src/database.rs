use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tokio::task::JoinError;
use tracing::{debug, info};

use crate::SchemaVersion;
use crate::cancel::CancelSignal;
use crate::engine::{MigrationReport, Migrator, read_version};
use crate::error::{MigrationError, Result};
use crate::source::MigrationSource;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A SQLite database file that can be migrated.
///
/// Each call opens its own connection and closes it before returning.
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    path: PathBuf,
    busy_timeout: Duration,
    wal: bool,
    migrator: Migrator,
}

impl SqliteDatabase {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            wal: false,
            migrator: Migrator::new(),
        }
    }

    /// How long to wait for another connection's lock before failing.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }

    pub fn with_migrator(mut self, migrator: Migrator) -> Self {
        self.migrator = migrator;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }

    /// Open a connection on the blocking pool. Gives up with `Canceled` if
    /// `cancel` fires first.
    pub async fn connect(&self, cancel: &CancelSignal) -> Result<Connection> {
        cancel.check()?;

        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        let wal = self.wal;
        let signal = cancel.clone();
        // If cancellation wins the race below, this task keeps running and
        // drops its connection when done.
        let open = tokio::task::spawn_blocking(move || {
            open_connection(&path, busy_timeout, wal, &signal)
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MigrationError::Canceled),
            joined = open => joined.map_err(join_failed)?,
        }
    }

    /// Migrate the database to the latest version `source` defines.
    ///
    /// The connection and transaction are owned by this call and released on
    /// every return path.
    pub async fn migrate<S>(&self, source: S, cancel: &CancelSignal) -> Result<MigrationReport>
    where
        S: MigrationSource + 'static,
    {
        let mut conn = self.connect(cancel).await?;
        let migrator = self.migrator.clone();
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || migrator.run(&mut conn, &source, &cancel))
            .await
            .map_err(join_failed)?
    }

    /// The version currently recorded in the database, or `None` if the file
    /// does not exist yet. Opens the file read-only and never creates it.
    pub async fn schema_version(&self) -> Result<Option<SchemaVersion>> {
        let path = self.path.clone();
        let busy_timeout = self.busy_timeout;
        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Ok(None);
            }
            let conn = open_read_only(&path, busy_timeout)?;
            read_version(&conn).map(Some)
        })
        .await
        .map_err(join_failed)?
    }

    /// Delete the database file and its journal companions. Missing files are
    /// ignored.
    pub async fn remove_files(&self) -> std::io::Result<()> {
        for path in companion_paths(&self.path) {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => info!("removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn connection_failed(path: &Path) -> impl Fn(rusqlite::Error) -> MigrationError + '_ {
    move |source| MigrationError::Connection {
        path: path.to_path_buf(),
        source,
    }
}

fn open_connection(
    path: &Path,
    busy_timeout: Duration,
    wal: bool,
    cancel: &CancelSignal,
) -> Result<Connection> {
    cancel.check()?;
    debug!("opening database at {}", path.display());
    let connection_failed = connection_failed(path);

    let conn = Connection::open(path).map_err(&connection_failed)?;
    conn.busy_timeout(busy_timeout).map_err(&connection_failed)?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .map_err(&connection_failed)?;
    if wal {
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(&connection_failed)?;
    }
    Ok(conn)
}

fn open_read_only(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    debug!("opening database at {} read-only", path.display());
    let connection_failed = connection_failed(path);

    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(path, flags).map_err(&connection_failed)?;
    conn.busy_timeout(busy_timeout).map_err(&connection_failed)?;
    Ok(conn)
}

fn companion_paths(path: &Path) -> [PathBuf; 3] {
    let with_suffix = |suffix: &str| {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}

fn join_failed(e: JoinError) -> MigrationError {
    if e.is_panic() {
        std::panic::resume_unwind(e.into_panic());
    }
    // Only happens when the runtime shuts down underneath us.
    MigrationError::Canceled
}
