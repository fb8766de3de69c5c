pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{cli::LocalStorage, CliConfig};

pub use app::pipelines::AnalysisPipeline;
pub use config::{toml_config::AnalysisConfig, RunConfig};
pub use core::engine::AnalysisEngine;
pub use utils::error::{AnalyzerError, Result};
