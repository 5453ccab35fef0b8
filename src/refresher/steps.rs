//! Guarded execution of individual invalidation steps.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::cache::{EntityType, MessageKind, mutex_lock};
use crate::domain::ContentId;

pub(crate) const METRIC_STEP_FAILED: &str = "cachewire_refresh_step_failed_total";

const SOURCE: &str = "refresher::steps";

/// One region operation in an invalidation sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStep {
    ClearIdKeyMap,
    ClearIdKeyEntry(ContentId),
    WipeRegion(EntityType),
    ClearRegionById(EntityType, ContentId),
    ClearRegionByKey(EntityType, Uuid),
    LoadDocument(ContentId),
    UpdateSortOrder(ContentId),
    RebuildDocument(ContentId),
    UpdatePreview(ContentId),
    /// Sort-order and projection entries of a deleted document.
    DropDocument(ContentId),
    ClearPreview(ContentId),
    ClearAllPreview,
    ClearDomainCache,
    RaiseEvent(MessageKind),
}

impl RefreshStep {
    pub fn name(&self) -> &'static str {
        match self {
            RefreshStep::ClearIdKeyMap => "clear_id_key_map",
            RefreshStep::ClearIdKeyEntry(_) => "clear_id_key_entry",
            RefreshStep::WipeRegion(_) => "wipe_region",
            RefreshStep::ClearRegionById(..) => "clear_region_by_id",
            RefreshStep::ClearRegionByKey(..) => "clear_region_by_key",
            RefreshStep::LoadDocument(_) => "load_document",
            RefreshStep::UpdateSortOrder(_) => "update_sort_order",
            RefreshStep::RebuildDocument(_) => "rebuild_document",
            RefreshStep::UpdatePreview(_) => "update_preview",
            RefreshStep::DropDocument(_) => "drop_document",
            RefreshStep::ClearPreview(_) => "clear_preview",
            RefreshStep::ClearAllPreview => "clear_all_preview",
            RefreshStep::ClearDomainCache => "clear_domain_cache",
            RefreshStep::RaiseEvent(_) => "raise_event",
        }
    }
}

impl fmt::Display for RefreshStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshStep::WipeRegion(region) => write!(f, "{}({region})", self.name()),
            RefreshStep::ClearRegionById(region, id) => {
                write!(f, "{}({region}, {id})", self.name())
            }
            RefreshStep::ClearRegionByKey(region, key) => {
                write!(f, "{}({region}, {key})", self.name())
            }
            RefreshStep::ClearIdKeyEntry(id)
            | RefreshStep::LoadDocument(id)
            | RefreshStep::UpdateSortOrder(id)
            | RefreshStep::RebuildDocument(id)
            | RefreshStep::UpdatePreview(id)
            | RefreshStep::DropDocument(id)
            | RefreshStep::ClearPreview(id) => write!(f, "{}({id})", self.name()),
            RefreshStep::RaiseEvent(kind) => write!(f, "{}({kind})", self.name()),
            _ => f.write_str(self.name()),
        }
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("content store failed: {0}")]
    Source(#[from] RepoError),
    #[error("step panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: RefreshStep,
    pub reason: String,
}

/// Outcome of one refresher operation. Never an error: failed steps are
/// listed and the caches they guard may stay stale until the next refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub operation: &'static str,
    pub steps_run: usize,
    pub failures: Vec<StepFailure>,
    /// Set when the payload could not be decoded; nothing was touched.
    pub rejected: Option<String>,
}

impl RefreshReport {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            steps_run: 0,
            failures: Vec::new(),
            rejected: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.rejected.is_none()
    }
}

/// Sees every executed step, in execution order, after it completes.
pub trait StepObserver: Send + Sync {
    fn on_step(&self, step: &RefreshStep, succeeded: bool);
}

/// Observer that keeps the executed steps in memory.
#[derive(Default)]
pub struct RecordingObserver {
    steps: Mutex<Vec<RefreshStep>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> Vec<RefreshStep> {
        mutex_lock(&self.steps, SOURCE, "steps").clone()
    }

    pub fn take(&self) -> Vec<RefreshStep> {
        std::mem::take(&mut *mutex_lock(&self.steps, SOURCE, "take"))
    }

    pub fn count(&self, step: &RefreshStep) -> usize {
        mutex_lock(&self.steps, SOURCE, "count")
            .iter()
            .filter(|seen| *seen == step)
            .count()
    }

    /// Position of the first occurrence of `step`.
    pub fn position(&self, step: &RefreshStep) -> Option<usize> {
        mutex_lock(&self.steps, SOURCE, "position")
            .iter()
            .position(|seen| seen == step)
    }
}

impl StepObserver for RecordingObserver {
    fn on_step(&self, step: &RefreshStep, _succeeded: bool) {
        mutex_lock(&self.steps, SOURCE, "on_step").push(step.clone());
    }
}

/// Runs steps so that one failing step never prevents the next.
pub(crate) struct StepRunner<'a> {
    pub(crate) report: RefreshReport,
    observer: Option<&'a Arc<dyn StepObserver>>,
}

impl<'a> StepRunner<'a> {
    pub(crate) fn new(
        operation: &'static str,
        observer: Option<&'a Arc<dyn StepObserver>>,
    ) -> Self {
        Self {
            report: RefreshReport::new(operation),
            observer,
        }
    }

    pub(crate) fn run<F>(&mut self, step: RefreshStep, action: F)
    where
        F: FnOnce() -> Result<(), StepError>,
    {
        let result = catch_unwind(AssertUnwindSafe(action))
            .unwrap_or_else(|panic| Err(StepError::Panicked(panic_message(panic.as_ref()))));

        self.report.steps_run += 1;
        if let Some(observer) = self.observer {
            observer.on_step(&step, result.is_ok());
        }

        match result {
            Ok(()) => debug!(operation = self.report.operation, step = %step, "Refresh step done"),
            Err(err) => {
                warn!(
                    operation = self.report.operation,
                    step = %step,
                    error = %err,
                    "Refresh step failed; continuing with remaining steps"
                );
                counter!(METRIC_STEP_FAILED, "step" => step.name()).increment(1);
                self.report.failures.push(StepFailure {
                    step,
                    reason: err.to_string(),
                });
            }
        }
    }

    pub(crate) fn finish(self) -> RefreshReport {
        self.report
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
