//! HTTP handlers for the server surface.

pub mod gdm;
pub mod queues;
pub mod single_deployment;
