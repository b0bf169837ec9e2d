use std::sync::Arc;

use tracing::info;

use crate::SchemaVersion;
use crate::migrations::MigrationStep;
use crate::source::{MigrationPlan, MigrationSource};

/// Receives a notification for every plan built and every step handed out.
pub trait PlanObserver: Send + Sync {
    fn plan_started(&self, _from: SchemaVersion) {}

    /// Called just before `step` is yielded to the engine.
    fn step_yielded(&self, _index: usize, _step: &MigrationStep) {}
}

impl<O: PlanObserver + ?Sized> PlanObserver for &O {
    fn plan_started(&self, from: SchemaVersion) {
        (**self).plan_started(from);
    }

    fn step_yielded(&self, index: usize, step: &MigrationStep) {
        (**self).step_yielded(index, step);
    }
}

impl<O: PlanObserver + ?Sized> PlanObserver for Arc<O> {
    fn plan_started(&self, from: SchemaVersion) {
        (**self).plan_started(from);
    }

    fn step_yielded(&self, index: usize, step: &MigrationStep) {
        (**self).step_yielded(index, step);
    }
}

/// Wraps a source and reports its plans to an observer. Steps pass through
/// unchanged and in order. Wrap an `ObservedSource` again to add more
/// observers.
#[derive(Debug, Clone)]
pub struct ObservedSource<S, O> {
    inner: S,
    observer: O,
}

impl<S, O> ObservedSource<S, O> {
    pub fn new(inner: S, observer: O) -> Self {
        Self { inner, observer }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }
}

impl<S: MigrationSource, O: PlanObserver> MigrationSource for ObservedSource<S, O> {
    fn steps_for(&self, current: SchemaVersion) -> MigrationPlan<'_> {
        self.observer.plan_started(current);
        let observer = &self.observer;
        Box::new(
            self.inner
                .steps_for(current)
                .enumerate()
                .map(move |(index, step)| {
                    observer.step_yielded(index, &step);
                    step
                }),
        )
    }
}

/// Logs the starting version and each step's SQL through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PlanObserver for TracingObserver {
    fn plan_started(&self, from: SchemaVersion) {
        info!(from_version = from, "running migrations from version {from}");
    }

    fn step_yielded(&self, index: usize, step: &MigrationStep) {
        info!(step = index, "{}", step.sql().trim());
    }
}

pub type LoggedSource<S> = ObservedSource<S, TracingObserver>;

/// Decorator constructors available on every source.
pub trait MigrationSourceExt: MigrationSource + Sized {
    fn observed<O: PlanObserver>(self, observer: O) -> ObservedSource<Self, O> {
        ObservedSource::new(self, observer)
    }

    fn logged(self) -> LoggedSource<Self> {
        ObservedSource::new(self, TracingObserver)
    }
}

impl<S: MigrationSource> MigrationSourceExt for S {}
