pub mod autoscaling;
pub mod deploy;
pub mod health;
pub mod reload;
