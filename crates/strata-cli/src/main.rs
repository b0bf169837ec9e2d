mod catalog;
mod summary;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use strata_config::{AppConfig, ConfigLoader, LogFormat};
use strata_db::{MigrationSource, MigrationSourceExt, Migrator, SqliteDatabase, cancel_pair};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata", version, about = "Apply schema migrations to a SQLite database")]
struct Cli {
    /// Path to a TOML or YAML config file
    #[arg(short, long, global = true, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(short, long, global = true, env = "STRATA_DATABASE")]
    database: Option<PathBuf>,

    /// Log output format: pretty or json
    #[arg(long, global = true, env = "STRATA_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Bring the database up to the latest schema version (default)
    Migrate {
        /// Delete the database file before migrating
        #[arg(long)]
        fresh: bool,

        /// Don't log each step's SQL
        #[arg(short, long)]
        quiet: bool,

        /// Print the report as JSON instead of a summary box
        #[arg(long)]
        json: bool,
    },
    /// Show the recorded and latest schema versions
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = ConfigLoader::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    if let Some(format) = cli.log_format {
        config.log.format = format;
    }
    Ok(config)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log.format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn database(config: &AppConfig) -> SqliteDatabase {
    let migrator = Migrator::new().with_default_timeout(config.migration.default_step_timeout());
    SqliteDatabase::new(&config.database.path)
        .with_busy_timeout(config.database.busy_timeout())
        .with_wal(config.database.wal)
        .with_migrator(migrator)
}

async fn run(cli: Cli, config: AppConfig) -> Result<()> {
    let command = cli.command.unwrap_or(Command::Migrate {
        fresh: false,
        quiet: false,
        json: false,
    });

    match command {
        Command::Migrate { fresh, quiet, json } => migrate(&config, fresh, quiet, json).await,
        Command::Status => status(&config).await,
    }
}

async fn migrate(config: &AppConfig, fresh: bool, quiet: bool, json: bool) -> Result<()> {
    let db = database(config);
    if fresh {
        db.remove_files()
            .await
            .with_context(|| format!("failed to remove {}", db.path().display()))?;
    }

    let catalog = catalog::person_catalog().context("invalid migration catalog")?;
    let (handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling migration");
            handle.cancel();
        }
    });

    info!("migrating {}", db.path().display());
    let result = if quiet || !config.migration.log_steps {
        db.migrate(catalog, &cancel).await
    } else {
        db.migrate(catalog.logged(), &cancel).await
    };
    let report =
        result.with_context(|| format!("migration of {} failed", db.path().display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        summary::print_migration(db.path(), &report);
    }
    Ok(())
}

async fn status(config: &AppConfig) -> Result<()> {
    let db = database(config);
    let catalog = catalog::person_catalog().context("invalid migration catalog")?;

    let current = db
        .schema_version()
        .await
        .with_context(|| format!("failed to read {}", db.path().display()))?;
    let pending = catalog.steps_for(current.unwrap_or(0)).count();

    summary::print_status(db.path(), current, catalog.latest_version(), pending);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_flags_override_config() {
        let cli = Cli::try_parse_from([
            "strata",
            "--database",
            "/tmp/other.db",
            "--log-format",
            "json",
            "status",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Status)));

        let config = load_config(&cli).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn migrate_flags_parse() {
        let cli = Cli::try_parse_from(["strata", "migrate", "--fresh", "-q"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Migrate {
                fresh: true,
                quiet: true,
                json: false
            })
        ));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(Cli::try_parse_from(["strata", "--log-format", "xml"]).is_err());
    }

    #[tokio::test]
    async fn migrate_command_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.path = dir.path().join("cli.db");

        migrate(&config, false, true, false).await.unwrap();
        migrate(&config, true, true, true).await.unwrap();

        let version = database(&config).schema_version().await.unwrap();
        assert_eq!(version, Some(4));
    }

    #[tokio::test]
    async fn status_does_not_create_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.database.path = dir.path().join("absent.db");

        status(&config).await.unwrap();
        assert!(!config.database.path.exists());
    }

    #[test]
    fn database_uses_configured_timeouts() {
        let mut config = AppConfig::default();
        config.migration.default_step_timeout_secs = 7;
        config.database.path = PathBuf::from("configured.db");

        let db = database(&config);
        assert_eq!(db.path(), std::path::Path::new("configured.db"));
        assert_eq!(
            db.migrator().default_timeout(),
            std::time::Duration::from_secs(7)
        );
    }
}
