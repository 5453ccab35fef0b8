//! Refreshers turn change notifications into ordered cache invalidations.
//!
//! Each operation runs a fixed sequence of [`RefreshStep`]s against the
//! [`CacheRegistry`](crate::cache::CacheRegistry). Steps are guarded one by
//! one, so a refresher never fails: it returns a [`RefreshReport`] listing
//! what did not go through.

mod collection;
mod content;
mod operation;
mod steps;

use uuid::Uuid;

pub use collection::RefresherCollection;
pub use content::{CONTENT_REFRESHER_ID, ContentRefresher};
pub use operation::OperationKind;
pub use steps::{
    RecordingObserver, RefreshReport, RefreshStep, StepError, StepFailure, StepObserver,
};

pub(crate) use content::METRIC_REFRESH_MS;
pub(crate) use steps::{METRIC_STEP_FAILED, panic_message};

/// A cache refresher addressable by a stable id across the cluster.
pub trait Refresher: Send + Sync {
    fn id(&self) -> Uuid;

    fn name(&self) -> &'static str;

    fn execute(&self, operation: OperationKind) -> RefreshReport;
}
