//! # Rudder Orchestration
//!
//! The rectification engine: the subsystem that computes the diff between
//! intended and actual deployments, serializes per-deployment work through
//! bounded queues with at-most-one-in-flight semantics, records resolution
//! status, and serves the HTTP surface that clients poll.
//!
//! ## Module Organization
//!
//! - [`rectify`] - single rectifications, the per-deployment queue set, and
//!   the resolve recorder
//! - [`resolver`] - the auto-resolve loop and its status board
//! - [`web`] - the axum server surface (`/servers`, `/gdm`, `/status`,
//!   queue inspection, single-deployment read/write)
//! - [`dev`] - in-memory scheduler and registry stand-ins for development

pub mod dev;
pub mod rectify;
pub mod resolver;
pub mod web;

pub use rectify::{
    DeployQueueSet, QueuedRectification, R11nId, Rectification, RectificationHandler,
    RectifyContext, ResolveRecorder,
};
pub use resolver::{AutoResolver, RectifyHandler, StatusBoard};
