use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rusqlite::Connection;
use strata_db::{
    CancelSignal, MigrationError, MigrationSourceExt, MigrationStep, Migrator, PlanObserver,
    SchemaVersion, SqliteDatabase, ThresholdSource, cancel_pair,
};

fn ledger_steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::new("CREATE TABLE account (id INTEGER PRIMARY KEY, owner TEXT NOT NULL)")
            .unwrap(),
        MigrationStep::new(
            "CREATE TABLE entry (
                id INTEGER PRIMARY KEY,
                account_id INTEGER NOT NULL REFERENCES account(id),
                amount INTEGER NOT NULL
            );
            CREATE INDEX idx_entry_account ON entry(account_id);",
        )
        .unwrap(),
        MigrationStep::new("ALTER TABLE account ADD COLUMN closed_at TEXT").unwrap(),
    ]
}

fn ledger_source() -> ThresholdSource {
    ledger_steps()
        .into_iter()
        .zip(1..)
        .try_fold(ThresholdSource::new(), |source, (step, threshold)| {
            source.step(threshold, step)
        })
        .unwrap()
}

#[derive(Default)]
struct CountingObserver {
    plans: AtomicUsize,
    steps: AtomicUsize,
}

impl PlanObserver for CountingObserver {
    fn plan_started(&self, _from: SchemaVersion) {
        self.plans.fetch_add(1, Ordering::SeqCst);
    }

    fn step_yielded(&self, _index: usize, _step: &MigrationStep) {
        self.steps.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn repeated_runs_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = SqliteDatabase::new(dir.path().join("ledger.db"));
    let observer = Arc::new(CountingObserver::default());
    let source = Arc::new(ledger_source().observed(observer.clone()));

    let first = db.migrate(source.clone(), &CancelSignal::never()).await.unwrap();
    let second = db.migrate(source.clone(), &CancelSignal::never()).await.unwrap();

    assert_eq!(first.steps_applied, 3);
    assert_eq!(first.to_version, 3);
    assert!(second.is_noop());
    assert_eq!(second.to_version, 3);
    assert_eq!(observer.plans.load(Ordering::SeqCst), 2);
    assert_eq!(observer.steps.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn failed_run_leaves_file_at_previous_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let db = SqliteDatabase::new(&path);

    let partial = ThresholdSource::from_steps(ledger_steps().into_iter().take(2));
    db.migrate(partial, &CancelSignal::never()).await.unwrap();

    let mut steps = ledger_steps();
    steps.push(
        MigrationStep::new("INSERT INTO entry (account_id, amount) VALUES (99, 1)").unwrap(),
    );
    let broken = ThresholdSource::from_steps(steps);
    let err = db.migrate(broken, &CancelSignal::never()).await.unwrap_err();
    assert!(matches!(
        err,
        MigrationError::StepExecutionFailed {
            step_index: 1,
            target_version: 4,
            ..
        }
    ));

    assert_eq!(db.schema_version().await.unwrap(), Some(2));
    let conn = Connection::open(&path).unwrap();
    let has_closed_at: i64 = conn
        .query_row(
            "SELECT count(*) FROM pragma_table_info('account') WHERE name = 'closed_at'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(has_closed_at, 0);
}

#[tokio::test]
async fn cancelled_run_never_opens_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let (handle, signal) = cancel_pair();
    handle.cancel();

    let result = SqliteDatabase::new(&path)
        .migrate(ledger_source(), &signal)
        .await;

    assert!(matches!(result, Err(MigrationError::Canceled)));
    assert!(!path.exists());
}

#[tokio::test]
async fn concurrent_runs_apply_each_step_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    let db = SqliteDatabase::new(&path).with_busy_timeout(Duration::from_secs(10));

    let runs: Vec<_> = (0..4)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move { db.migrate(ledger_source(), &CancelSignal::never()).await })
        })
        .collect();

    let mut applied = 0;
    for run in runs {
        applied += run.await.unwrap().unwrap().steps_applied;
    }

    assert_eq!(applied, 3);
    assert_eq!(db.schema_version().await.unwrap(), Some(3));
}

#[test]
fn sync_migrator_works_on_caller_owned_connection() {
    let dir = tempfile::tempdir().unwrap();
    let mut conn = Connection::open(dir.path().join("ledger.db")).unwrap();

    let report = Migrator::new()
        .with_default_timeout(Duration::ZERO)
        .run(&mut conn, &ledger_source(), &CancelSignal::never())
        .unwrap();

    assert_eq!(report.to_version, 3);
    assert!(conn.is_autocommit());
}
