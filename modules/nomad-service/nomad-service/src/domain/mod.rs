pub mod autoscaling;
pub mod credentials;
pub mod deploy;
pub mod error;
pub mod instances;
pub mod jobspec;
pub mod reload;
pub mod runner;
pub mod snapshot;
