//! The rectification engine: single rectifications, the per-deployment queue
//! set, and the resolve recorder.

pub mod queue_set;
pub mod recorder;
pub mod rectification;

pub use queue_set::{
    DeployQueueSet, QueuedRectification, QueuedSummary, R11nId, RectificationHandler,
};
pub use recorder::{ResolveRecorder, ResolveSink};
pub use rectification::{Rectification, RectifyContext};
