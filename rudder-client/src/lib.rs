//! # Rudder Client
//!
//! Client-side status polling for Rudder deployments.
//!
//! The [`StatusPoller`] watches a deployment (narrowed by a
//! [`rudder_shared::ResolveFilter`]) across every cluster until each reaches
//! a terminal state, tolerating transient resolution errors, flaky HTTP, and
//! older server response formats along the way.
//!
//! ```rust,no_run
//! use rudder_client::{PollerClientConfig, StatusPoller};
//! use rudder_shared::{FieldMatcher, ResolveFilter};
//!
//! # async fn example() -> Result<(), rudder_client::ClientError> {
//! let filter = ResolveFilter {
//!     repo: FieldMatcher::equals("github.com/example/app"),
//!     tag: FieldMatcher::equals("1.2.0"),
//!     ..Default::default()
//! };
//! let poller = StatusPoller::new(PollerClientConfig::default(), filter)?;
//! let (_cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
//! let state = poller.wait(cancel_rx).await?;
//! println!("deployment is {state}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod poller;
pub mod states;

pub use config::PollerClientConfig;
pub use error::{ClientError, ClientResult};
pub use poller::StatusPoller;
pub use states::ResolveState;
