pub mod aws;
pub mod http;
pub mod nomad;
pub mod process;

pub use aws::AwsCli;
pub use http::HttpCallout;
pub use nomad::NomadCli;
pub use process::ProcessRunner;
