// === PUBLIC API (from SDK) ===
pub use nomad_service_sdk::{
    CalloutClient, CalloutError, CloudClient, CommandError, InstanceHealth, LifecycleEvent,
    LifecycleTransition, ProgressSink, SchedulerClient, ServiceInstance,
};

// === MODULE DEFINITION ===
pub mod module;
pub use module::NomadServiceModule;

// === INTERNAL MODULES ===
#[doc(hidden)]
pub mod api;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod domain;
#[doc(hidden)]
pub mod infra;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
