pub mod app;
pub mod backup;
pub mod config;
pub mod confirm;
pub mod context;
pub mod error;
pub mod infra;
pub mod local;
pub mod plan;
pub mod preflight;
pub mod prerequisites;
pub mod run_log;
pub mod session;
pub mod status;
pub mod teardown;
pub mod test_runner;
pub mod validate;
pub mod verify;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{EnvironmentSettings, EnvironmentTarget, PipelineConfig, ToolSet};
pub use confirm::{Confirmer, DenyAll};
pub use context::{StageContext, StageReport};
pub use error::StageError;
pub use run_log::{log_file_name, RunLog};
pub use session::{Pipeline, PipelineResult};
pub use status::{query_status, StatusReport, StatusSection};
