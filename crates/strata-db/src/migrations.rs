use std::time::Duration;

use rusqlite::types::Value;

use crate::error::{MigrationError, Result};

/// A single schema change.
///
/// Steps carry no version number of their own; a step's version is its
/// position in the plan produced by a [`MigrationSource`](crate::MigrationSource).
/// Once shipped, a step's SQL must never change.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStep {
    sql: String,
    params: StepParams,
    mode: Option<ExecutionMode>,
    timeout: Option<Duration>,
}

/// Bound parameters for a [`ExecutionMode::Statement`] step.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum StepParams {
    #[default]
    None,
    /// Bound to `?1`, `?2`, ... in order.
    Positional(Vec<Value>),
    /// Bound by name; names include their prefix (`:name`, `@name`, `$name`).
    Named(Vec<(String, Value)>),
}

impl StepParams {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::None => true,
            Self::Positional(values) => values.is_empty(),
            Self::Named(values) => values.is_empty(),
        }
    }
}

/// How the engine hands a step's SQL to SQLite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Any number of `;`-separated statements, no parameters.
    Batch,
    /// Exactly one statement, prepared and executed with its parameters.
    Statement,
}

impl MigrationStep {
    /// A step with no execution-mode hint. It runs as a batch.
    pub fn new(sql: impl Into<String>) -> Result<Self> {
        let sql = validate_sql(sql.into())?;
        Ok(Self {
            sql,
            params: StepParams::None,
            mode: None,
            timeout: None,
        })
    }

    pub fn batch(sql: impl Into<String>) -> Result<Self> {
        let mut step = Self::new(sql)?;
        step.mode = Some(ExecutionMode::Batch);
        Ok(step)
    }

    /// A single prepared statement executed with `params`.
    pub fn statement(sql: impl Into<String>, params: StepParams) -> Result<Self> {
        if let StepParams::Named(named) = &params {
            for (name, _) in named {
                if !name.starts_with([':', '@', '$']) || name.len() < 2 {
                    return Err(MigrationError::Definition(format!(
                        "parameter name {name:?} must start with ':', '@' or '$'"
                    )));
                }
            }
        }

        let mut step = Self::new(sql)?;
        step.params = params;
        step.mode = Some(ExecutionMode::Statement);
        Ok(step)
    }

    /// Limit how long the step may run. `Duration::ZERO` removes the limit.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &StepParams {
        &self.params
    }

    /// The hint given at construction, if any.
    pub fn mode(&self) -> Option<ExecutionMode> {
        self.mode
    }

    /// The mode the engine will actually use.
    pub fn effective_mode(&self) -> ExecutionMode {
        self.mode.unwrap_or(ExecutionMode::Batch)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

fn validate_sql(sql: String) -> Result<String> {
    if sql.trim().is_empty() {
        return Err(MigrationError::Definition(
            "migration step SQL cannot be empty".into(),
        ));
    }
    Ok(sql)
}
