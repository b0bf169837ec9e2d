use std::sync::Arc;

use crate::SchemaVersion;
use crate::error::{MigrationError, Result};
use crate::migrations::MigrationStep;

/// The steps still needed from some starting version, in execution order.
///
/// Built fresh by every call to [`MigrationSource::steps_for`].
pub type MigrationPlan<'a> = Box<dyn Iterator<Item = MigrationStep> + 'a>;

/// Produces the remaining migration steps for a database at `current`.
///
/// Implementations must be pure: the same `current` always yields the same
/// steps, and a version past the newest step yields an empty plan.
pub trait MigrationSource: Send + Sync {
    fn steps_for(&self, current: SchemaVersion) -> MigrationPlan<'_>;
}

impl<S: MigrationSource + ?Sized> MigrationSource for &S {
    fn steps_for(&self, current: SchemaVersion) -> MigrationPlan<'_> {
        (**self).steps_for(current)
    }
}

impl<S: MigrationSource + ?Sized> MigrationSource for Box<S> {
    fn steps_for(&self, current: SchemaVersion) -> MigrationPlan<'_> {
        (**self).steps_for(current)
    }
}

impl<S: MigrationSource + ?Sized> MigrationSource for Arc<S> {
    fn steps_for(&self, current: SchemaVersion) -> MigrationPlan<'_> {
        (**self).steps_for(current)
    }
}

/// Steps registered under ascending thresholds; a step applies while the
/// database version is below its threshold.
///
/// Thresholds must be registered as `1, 2, 3, ...` so that the stored
/// version always equals the number of steps applied.
#[derive(Debug, Clone, Default)]
pub struct ThresholdSource {
    steps: Vec<MigrationStep>,
}

impl ThresholdSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `step` for databases below version `threshold`.
    pub fn step(mut self, threshold: SchemaVersion, step: MigrationStep) -> Result<Self> {
        let expected = self.latest_version() + 1;
        if threshold != expected {
            return Err(MigrationError::Definition(format!(
                "threshold {threshold} registered out of order, expected {expected}"
            )));
        }
        self.steps.push(step);
        Ok(self)
    }

    /// Build from steps listed in threshold order, starting at 1.
    pub fn from_steps(steps: impl IntoIterator<Item = MigrationStep>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// The version a database reaches once every step has run.
    pub fn latest_version(&self) -> SchemaVersion {
        // Definitions never approach u32::MAX steps.
        self.steps.len() as SchemaVersion
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl MigrationSource for ThresholdSource {
    fn steps_for(&self, current: SchemaVersion) -> MigrationPlan<'_> {
        let applied = usize::try_from(current).unwrap_or(usize::MAX);
        Box::new(self.steps.iter().skip(applied).cloned())
    }
}
