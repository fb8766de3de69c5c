#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::core::correction::CorrectionMethod;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{AnalyzerError, Result};
use crate::utils::validation::{self, Validate};
use toml_config::AnalysisConfig;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "ms-analyzer")]
#[command(about = "Quantify FAMES and cholesterol from GC/MS exports")]
pub struct CliConfig {
    /// Data export (CSV) and template directory, in any order
    #[arg(required = true, num_args = 2)]
    pub files: Vec<String>,

    /// Path to a TOML analysis configuration
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the internal reference ion (e.g. C19:0)
    #[arg(long)]
    pub internal_ref: Option<String>,

    /// Override the isotope tracer atom
    #[arg(long)]
    pub tracer: Option<String>,

    /// Override the tracer purity vector (e.g. 0.01,0.99)
    #[arg(long, value_delimiter = ',')]
    pub purity: Option<Vec<f64>>,

    /// Override the natural abundance correction method (lsc or smc)
    #[arg(long)]
    pub method: Option<CorrectionMethod>,

    /// Normalize quantities by sample weight only
    #[arg(long)]
    pub weight_only: bool,

    /// Directory receiving the results folder (defaults to the data file's directory)
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Show the detected experiment without writing results
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long, help = "Log CPU and memory usage per stage")]
    pub monitor: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 載入 TOML (或預設值) 並套用命令列覆蓋設定
    pub fn resolve(&self) -> Result<RunConfig> {
        let mut analysis = match &self.config {
            Some(path) => {
                tracing::info!("📁 Loading analysis configuration from: {}", path);
                AnalysisConfig::from_file(path)?
            }
            None => AnalysisConfig::default(),
        };

        if let Some(internal_ref) = &self.internal_ref {
            tracing::info!("🔧 Internal reference overridden to: {}", internal_ref);
            analysis.analysis.internal_reference = internal_ref.clone();
        }
        if let Some(tracer) = &self.tracer {
            tracing::info!("🔧 Tracer overridden to: {}", tracer);
            analysis.correction.tracer = tracer.clone();
        }
        if let Some(purity) = &self.purity {
            tracing::info!("🔧 Tracer purity overridden to: {:?}", purity);
            analysis.correction.purity = purity.clone();
        }
        if let Some(method) = self.method {
            tracing::info!("🔧 Correction method overridden to: {}", method);
            analysis.correction.method = method;
        }
        if self.weight_only {
            analysis.normalization.weight_only = true;
        }

        let run = RunConfig {
            files: self.files.clone(),
            output_dir: self.output_dir.clone(),
            analysis,
        };
        run.validate()?;
        Ok(run)
    }
}

/// Fully resolved settings of one analysis run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub files: Vec<String>,
    pub output_dir: Option<String>,
    pub analysis: AnalysisConfig,
}

impl RunConfig {
    pub fn new(files: Vec<String>, analysis: AnalysisConfig) -> Self {
        Self {
            files,
            output_dir: None,
            analysis,
        }
    }
}

impl ConfigProvider for RunConfig {
    fn input_files(&self) -> &[String] {
        &self.files
    }

    fn output_dir(&self) -> Option<&str> {
        self.output_dir.as_deref()
    }

    fn analysis(&self) -> &AnalysisConfig {
        &self.analysis
    }
}

impl Validate for RunConfig {
    fn validate(&self) -> Result<()> {
        if self.files.len() != 2 {
            return Err(AnalyzerError::InputError {
                message: format!("You must choose 2 files, got {}", self.files.len()),
            });
        }
        for file in &self.files {
            validation::validate_path("files", file)?;
        }
        if let Some(dir) = &self.output_dir {
            validation::validate_path("output_dir", dir)?;
        }
        self.analysis.validate()
    }
}
