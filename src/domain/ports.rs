use crate::config::toml_config::AnalysisConfig;
use crate::domain::model::{AnalysisReport, RawExperiment};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn is_dir(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
}

pub trait ConfigProvider: Send + Sync {
    /// The two paths given on the command line (data export and template).
    fn input_files(&self) -> &[String];
    /// Root for the results folder; the data file's directory when unset.
    fn output_dir(&self) -> Option<&str>;
    fn analysis(&self) -> &AnalysisConfig;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<RawExperiment>;
    async fn transform(&self, raw: RawExperiment) -> Result<AnalysisReport>;
    async fn load(&self, report: AnalysisReport) -> Result<String>;
}
