//! Nomad service SDK
//!
//! Contracts between the control-plane handlers and the systems they drive:
//!
//! - [`SchedulerClient`]: the Nomad CLI (variables, node membership, job submission)
//! - [`CloudClient`]: the AWS CLI (instance lookup, health, lifecycle hooks)
//! - [`CalloutClient`]: direct HTTP calls (SNS confirmation, peer reloads)
//! - [`ProgressSink`]: where handlers write human-readable progress lines
//!
//! Every collaborator sits behind a narrow trait so handlers can be exercised
//! against fakes instead of real subprocesses.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod callout;
pub mod cloud;
pub mod error;
pub mod models;
pub mod progress;
pub mod scheduler;

pub use callout::CalloutClient;
pub use cloud::CloudClient;
pub use error::{CalloutError, CommandError};
pub use models::{InstanceHealth, LifecycleEvent, LifecycleTransition, ServiceInstance};
pub use progress::{ProgressChunk, ProgressSink, StreamAborted};
pub use scheduler::SchedulerClient;
